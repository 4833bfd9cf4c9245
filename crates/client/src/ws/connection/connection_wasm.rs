//! Web (WASM) push channel using the browser WebSocket API.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::StreamExt;
use rideshare_shared::{ClientCommand, ServerEvent, WsEnvelope};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::{js_sys, CloseEvent, MessageEvent, WebSocket};

use super::{ChannelError, ChannelHandle, ChannelSignal, Connector, ReconnectConfig};

/// Opens a reconnecting socket to a fixed URL (browser implementation).
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    reconnect: ReconnectConfig,
}

impl WsConnector {
    pub fn new(url: impl Into<String>, reconnect: ReconnectConfig) -> Self {
        Self {
            url: url.into(),
            reconnect,
        }
    }
}

type CurrentSocket = Rc<RefCell<Option<WebSocket>>>;

impl Connector for WsConnector {
    fn open(&self, signals: UnboundedSender<ChannelSignal>) -> Result<ChannelHandle, ChannelError> {
        let (sender, receiver) = unbounded();
        let handle = ChannelHandle::new(sender);
        let current: CurrentSocket = Rc::new(RefCell::new(None));

        spawn_local(send_loop(receiver, current.clone()));
        spawn_local(connection_loop(
            self.url.clone(),
            current,
            handle.clone(),
            signals,
            self.reconnect.clone(),
        ));

        Ok(handle)
    }
}

/// Forward commands to whichever socket is currently open. Commands issued
/// while no socket is open are dropped; room membership is re-announced on
/// the next `Connected` signal.
async fn send_loop(mut commands: UnboundedReceiver<WsEnvelope<ClientCommand>>, current: CurrentSocket) {
    while let Some(cmd) = commands.next().await {
        let socket = current.borrow().clone();
        let Some(ws) = socket.filter(|ws| ws.ready_state() == WebSocket::OPEN) else {
            crate::log_warn!("Push channel not open, dropping {:?}", cmd.payload);
            continue;
        };
        match serde_json::to_string(&cmd) {
            Ok(json) => {
                if let Err(e) = ws.send_with_str(&json) {
                    crate::log_error!("Send failed: {:?}", e);
                }
            }
            Err(e) => crate::log_error!("Serialize failed: {}", e),
        }
    }

    if let Some(ws) = current.borrow_mut().take() {
        let _ = ws.close();
    }
}

async fn connection_loop(
    url: String,
    current: CurrentSocket,
    handle: ChannelHandle,
    signals: UnboundedSender<ChannelSignal>,
    reconnect: ReconnectConfig,
) {
    let mut attempt = 0u32;

    while !handle.is_closed() && !signals.is_closed() {
        match connect_websocket(&url, signals.clone()).await {
            Ok((ws, mut closed)) => {
                *current.borrow_mut() = Some(ws);
                crate::log_info!("Push channel connected to {}", url);
                let _ = signals.unbounded_send(ChannelSignal::Connected);

                let started = js_sys::Date::now();
                let reason = closed.next().await.flatten();
                current.borrow_mut().take();
                if handle.is_closed() {
                    break;
                }
                crate::log_warn!("Push channel to {} closed: {:?}", url, reason);
                let _ = signals.unbounded_send(ChannelSignal::Disconnected { reason });
                let uptime = (js_sys::Date::now() - started).max(0.0);
                if reconnect.recovered_after(Duration::from_millis(uptime as u64)) {
                    attempt = 0;
                }
            }
            Err(e) => {
                crate::log_error!("Push channel error for {}: {}", url, e);
                let _ = signals.unbounded_send(ChannelSignal::Error(e));
            }
        }

        if reconnect.exhausted(attempt) {
            crate::log_warn!("Giving up on {} after {} attempts", url, attempt);
            handle.close();
            let _ = signals.unbounded_send(ChannelSignal::Disconnected {
                reason: Some(reconnect.gave_up_reason()),
            });
            break;
        }

        let delay = reconnect.delay_for_attempt(attempt);
        crate::log_info!(
            "Reconnecting to {} in {}ms (attempt {})",
            url,
            delay,
            attempt + 1
        );
        gloo_timers::future::TimeoutFuture::new(delay).await;
        attempt += 1;
    }
}

/// Open a socket and wait until it is ready. Returns the socket and a stream
/// that yields once, with the close reason, when the socket closes.
async fn connect_websocket(
    url: &str,
    signals: UnboundedSender<ChannelSignal>,
) -> Result<(WebSocket, UnboundedReceiver<Option<String>>), String> {
    let ws = WebSocket::new(url).map_err(|e| format!("Failed to create WebSocket: {:?}", e))?;

    let is_open = Rc::new(RefCell::new(false));
    let error_reason = Rc::new(RefCell::new(None::<String>));
    let (close_tx, close_rx) = unbounded::<Option<String>>();

    let is_open_clone = is_open.clone();
    let onopen_callback = Closure::wrap(Box::new(move |_: web_sys::Event| {
        *is_open_clone.borrow_mut() = true;
    }) as Box<dyn FnMut(web_sys::Event)>);
    ws.set_onopen(Some(onopen_callback.as_ref().unchecked_ref()));
    onopen_callback.forget();

    let error_reason_close = error_reason.clone();
    let onclose_callback = Closure::wrap(Box::new(move |e: CloseEvent| {
        let reason = if e.reason().is_empty() {
            format!("Code {}", e.code())
        } else {
            e.reason()
        };
        *error_reason_close.borrow_mut() = Some(reason.clone());
        let _ = close_tx.unbounded_send(Some(reason));
    }) as Box<dyn FnMut(CloseEvent)>);
    ws.set_onclose(Some(onclose_callback.as_ref().unchecked_ref()));
    onclose_callback.forget();

    let error_reason_err = error_reason.clone();
    let onerror_callback = Closure::wrap(Box::new(move |_: web_sys::ErrorEvent| {
        *error_reason_err.borrow_mut() = Some("WebSocket error".to_string());
    }) as Box<dyn FnMut(web_sys::ErrorEvent)>);
    ws.set_onerror(Some(onerror_callback.as_ref().unchecked_ref()));
    onerror_callback.forget();

    let onmessage_callback = Closure::wrap(Box::new(move |e: MessageEvent| {
        if let Ok(text) = e.data().dyn_into::<js_sys::JsString>() {
            let text: String = text.into();
            match serde_json::from_str::<WsEnvelope<ServerEvent>>(&text) {
                Ok(event) => {
                    let _ = signals.unbounded_send(ChannelSignal::Event(event));
                }
                Err(e) => crate::log_warn!("Failed to parse push event: {}", e),
            }
        }
    }) as Box<dyn FnMut(MessageEvent)>);
    ws.set_onmessage(Some(onmessage_callback.as_ref().unchecked_ref()));
    onmessage_callback.forget();

    // 5 second timeout
    for _ in 0..500 {
        if *is_open.borrow() {
            return Ok((ws, close_rx));
        }
        if let Some(reason) = error_reason.borrow().clone() {
            return Err(reason);
        }
        gloo_timers::future::TimeoutFuture::new(10).await;
    }

    let _ = ws.close();
    Err("Connection timeout".to_string())
}
