//! Native/Desktop push channel using tokio-tungstenite.

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{SinkExt, StreamExt};
use rideshare_shared::{ClientCommand, ServerEvent, WsEnvelope};
use tokio::time::{Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{ChannelError, ChannelHandle, ChannelSignal, Connector, ReconnectConfig};

/// Opens a reconnecting socket to a fixed URL (native implementation).
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

impl Connector for WsConnector {
    fn open(&self, signals: UnboundedSender<ChannelSignal>) -> Result<ChannelHandle, ChannelError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ChannelError::Unavailable(e.to_string()))?;
        let (sender, receiver) = unbounded();
        let handle = ChannelHandle::new(sender);

        runtime.spawn(connection_loop(
            self.url.clone(),
            receiver,
            signals,
            self.reconnect.clone(),
        ));

        Ok(handle)
    }
}

enum SessionEnd {
    /// Socket dropped; reconnect.
    Lost(Option<String>),
    /// Owner closed the handle or stopped listening; stop for good.
    Shutdown,
}

/// Connect, pump commands and events, and reconnect with backoff until the
/// handle is closed. Giving up closes the command channel so the owner sees
/// a closed handle.
async fn connection_loop(
    url: String,
    mut commands: UnboundedReceiver<WsEnvelope<ClientCommand>>,
    signals: UnboundedSender<ChannelSignal>,
    reconnect: ReconnectConfig,
) {
    let mut attempt = 0u32;

    loop {
        if signals.is_closed() {
            break;
        }

        match connect_async(url.as_str()).await {
            Ok((ws_stream, _response)) => {
                crate::log_info!("Push channel connected to {}", url);
                if signals.unbounded_send(ChannelSignal::Connected).is_err() {
                    break;
                }

                let started = Instant::now();
                match run_session(ws_stream, &mut commands, &signals).await {
                    SessionEnd::Shutdown => {
                        crate::log_info!("Push channel to {} shut down", url);
                        break;
                    }
                    SessionEnd::Lost(reason) => {
                        crate::log_warn!("Push channel to {} lost: {:?}", url, reason);
                        if signals
                            .unbounded_send(ChannelSignal::Disconnected { reason })
                            .is_err()
                        {
                            break;
                        }
                        if reconnect.recovered_after(started.elapsed()) {
                            attempt = 0;
                        }
                    }
                }
            }
            Err(e) => {
                crate::log_error!("Push channel error for {}: {}", url, e);
                let _ = signals.unbounded_send(ChannelSignal::Error(e.to_string()));
            }
        }

        if reconnect.exhausted(attempt) {
            crate::log_warn!("Giving up on {} after {} attempts", url, attempt);
            commands.close();
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
        tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        attempt += 1;
    }
}

async fn run_session<S>(
    ws_stream: tokio_tungstenite::WebSocketStream<S>,
    commands: &mut UnboundedReceiver<WsEnvelope<ClientCommand>>,
    signals: &UnboundedSender<ChannelSignal>,
) -> SessionEnd
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            cmd = commands.next() => match cmd {
                Some(cmd) => match serde_json::to_string(&cmd) {
                    Ok(json) => {
                        crate::log_debug!("Sending: {}", json);
                        if let Err(e) = write.send(Message::text(json)).await {
                            return SessionEnd::Lost(Some(e.to_string()));
                        }
                    }
                    Err(e) => crate::log_error!("Serialize failed: {}", e),
                },
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                }
            },
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<WsEnvelope<ServerEvent>>(text.as_str()) {
                        Ok(event) => {
                            if signals.unbounded_send(ChannelSignal::Event(event)).is_err() {
                                return SessionEnd::Shutdown;
                            }
                        }
                        Err(e) => crate::log_warn!("Failed to parse push event: {}", e),
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    return SessionEnd::Lost(frame.map(|f| f.reason.to_string()));
                }
                Some(Ok(_)) => {
                    // Pings are answered by tungstenite; binary frames are not part of the protocol.
                }
                Some(Err(e)) => return SessionEnd::Lost(Some(e.to_string())),
                None => return SessionEnd::Lost(None),
            },
        }
    }
}
