//! Owner of the single push channel connection for a session.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures_channel::mpsc::UnboundedSender;
use rideshare_shared::ClientCommand;

use super::connection::{ChannelError, ChannelHandle, ChannelSignal, ConnectionState, Connector};

pub type StateListener = Rc<dyn Fn(&ConnectionState)>;

/// Identifies a registered state listener so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

/// Lazily opens the connection, hands out the shared handle and fans out
/// connection state changes to any number of observers.
pub struct ConnectionManager {
    connector: Rc<dyn Connector>,
    signals: UnboundedSender<ChannelSignal>,
    handle: RefCell<Option<ChannelHandle>>,
    state: RefCell<ConnectionState>,
    listeners: RefCell<Vec<(ListenerId, StateListener)>>,
    next_listener: Cell<u64>,
}

impl ConnectionManager {
    pub fn new(connector: Rc<dyn Connector>, signals: UnboundedSender<ChannelSignal>) -> Self {
        Self {
            connector,
            signals,
            handle: RefCell::new(None),
            state: RefCell::new(ConnectionState::Disconnected),
            listeners: RefCell::new(Vec::new()),
            next_listener: Cell::new(0),
        }
    }

    /// The shared connection handle, opening the connection on first use.
    pub fn get_connection(&self) -> Result<ChannelHandle, ChannelError> {
        if let Some(handle) = self.handle.borrow().as_ref() {
            if !handle.is_closed() {
                return Ok(handle.clone());
            }
        }

        crate::log_info!("ConnectionManager: opening push channel");
        match self.connector.open(self.signals.clone()) {
            Ok(handle) => {
                *self.handle.borrow_mut() = Some(handle.clone());
                self.set_state(ConnectionState::Connecting);
                Ok(handle)
            }
            Err(e) => {
                crate::log_warn!("ConnectionManager: {}; continuing without push updates", e);
                self.set_state(ConnectionState::Failed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Open the connection unless one is already open or opening.
    pub fn ensure_connected(&self) -> Result<(), ChannelError> {
        self.get_connection().map(|_| ())
    }

    /// Close the connection. No-op when there is none.
    pub fn disconnect(&self) {
        let Some(handle) = self.handle.borrow_mut().take() else {
            crate::log_debug!("ConnectionManager: disconnect with no connection");
            return;
        };
        handle.close();
        self.set_state(ConnectionState::Disconnected);
    }

    pub fn has_connection(&self) -> bool {
        self.handle
            .borrow()
            .as_ref()
            .is_some_and(|h| !h.is_closed())
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }

    /// Send a control command if a connection exists.
    pub fn send(&self, cmd: ClientCommand) -> Result<(), ChannelError> {
        let handle = self.handle.borrow().clone();
        match handle {
            Some(handle) => handle.send(cmd),
            None => Err(ChannelError::Closed),
        }
    }

    /// Fold a lifecycle signal from the connection loop into the state.
    /// Events are ignored here.
    pub fn apply_signal(&self, signal: &ChannelSignal) {
        let next = match signal {
            ChannelSignal::Connected => ConnectionState::Connected,
            ChannelSignal::Disconnected { .. } | ChannelSignal::Error(_) => {
                let gave_up = self
                    .handle
                    .borrow()
                    .as_ref()
                    .is_some_and(|h| h.is_closed());
                if gave_up {
                    let reason = match signal {
                        ChannelSignal::Disconnected { reason: Some(r) } => r.clone(),
                        ChannelSignal::Error(e) => e.clone(),
                        _ => ChannelError::Closed.to_string(),
                    };
                    ConnectionState::Failed { reason }
                } else if !self.has_connection() {
                    ConnectionState::Disconnected
                } else {
                    match self.state() {
                        ConnectionState::Reconnecting { attempt } => {
                            ConnectionState::Reconnecting {
                                attempt: attempt + 1,
                            }
                        }
                        _ => ConnectionState::Reconnecting { attempt: 1 },
                    }
                }
            }
            ChannelSignal::Event(_) => return,
        };
        self.set_state(next);
    }

    pub fn on_state_change(&self, listener: impl Fn(&ConnectionState) + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener.get());
        self.next_listener.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, Rc::new(listener)));
        id
    }

    pub fn remove_state_listener(&self, id: ListenerId) {
        self.listeners.borrow_mut().retain(|(lid, _)| *lid != id);
    }

    fn set_state(&self, next: ConnectionState) {
        if *self.state.borrow() == next {
            return;
        }
        crate::log_debug!("ConnectionManager: state -> {:?}", next);
        *self.state.borrow_mut() = next.clone();

        // Listeners may register or remove listeners while being notified.
        let listeners: Vec<StateListener> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(&next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_channel::mpsc::{unbounded, UnboundedReceiver};
    use rideshare_shared::WsEnvelope;

    struct CountingConnector {
        opens: Cell<u32>,
        fail: bool,
        loops: RefCell<Vec<UnboundedReceiver<WsEnvelope<ClientCommand>>>>,
    }

    impl Connector for CountingConnector {
        fn open(&self, _signals: UnboundedSender<ChannelSignal>) -> Result<ChannelHandle, ChannelError> {
            self.opens.set(self.opens.get() + 1);
            if self.fail {
                return Err(ChannelError::Unavailable("no transport".into()));
            }
            let (tx, rx) = unbounded();
            self.loops.borrow_mut().push(rx);
            Ok(ChannelHandle::new(tx))
        }
    }

    fn manager(fail: bool) -> (Rc<CountingConnector>, ConnectionManager) {
        let connector = Rc::new(CountingConnector {
            opens: Cell::new(0),
            fail,
            loops: RefCell::new(Vec::new()),
        });
        let (tx, _rx) = unbounded();
        (connector.clone(), ConnectionManager::new(connector, tx))
    }

    #[test]
    fn connection_is_created_once() {
        let (connector, mgr) = manager(false);
        mgr.get_connection().unwrap();
        mgr.ensure_connected().unwrap();
        mgr.get_connection().unwrap();
        assert_eq!(connector.opens.get(), 1);
        assert_eq!(mgr.state(), ConnectionState::Connecting);
    }

    #[test]
    fn disconnect_is_idempotent_and_allows_reopen() {
        let (connector, mgr) = manager(false);
        mgr.disconnect();
        mgr.ensure_connected().unwrap();
        mgr.disconnect();
        mgr.disconnect();
        assert_eq!(mgr.state(), ConnectionState::Disconnected);
        mgr.ensure_connected().unwrap();
        assert_eq!(connector.opens.get(), 2);
    }

    #[test]
    fn state_changes_reach_every_listener_once() {
        let (_connector, mgr) = manager(false);
        let seen = Rc::new(RefCell::new(Vec::new()));
        for _ in 0..2 {
            let seen = seen.clone();
            mgr.on_state_change(move |s| seen.borrow_mut().push(s.clone()));
        }
        mgr.ensure_connected().unwrap();
        mgr.apply_signal(&ChannelSignal::Connected);
        mgr.apply_signal(&ChannelSignal::Connected);
        assert_eq!(
            *seen.borrow(),
            vec![
                ConnectionState::Connecting,
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Connected,
            ]
        );
    }

    #[test]
    fn lost_connection_reports_reconnecting() {
        let (_connector, mgr) = manager(false);
        mgr.ensure_connected().unwrap();
        mgr.apply_signal(&ChannelSignal::Connected);
        mgr.apply_signal(&ChannelSignal::Disconnected { reason: None });
        assert_eq!(mgr.state(), ConnectionState::Reconnecting { attempt: 1 });
        mgr.apply_signal(&ChannelSignal::Error("refused".into()));
        assert_eq!(mgr.state(), ConnectionState::Reconnecting { attempt: 2 });
    }

    #[test]
    fn exhausted_reconnects_fail_and_allow_reopen() {
        let (connector, mgr) = manager(false);
        mgr.ensure_connected().unwrap();
        mgr.apply_signal(&ChannelSignal::Connected);

        connector.loops.borrow_mut()[0].close();
        mgr.apply_signal(&ChannelSignal::Disconnected {
            reason: Some("Max reconnect attempts (3) exceeded".into()),
        });

        assert_eq!(
            mgr.state(),
            ConnectionState::Failed {
                reason: "Max reconnect attempts (3) exceeded".into()
            }
        );
        assert!(!mgr.has_connection());
        mgr.ensure_connected().unwrap();
        assert_eq!(connector.opens.get(), 2);
        assert_eq!(mgr.state(), ConnectionState::Connecting);
    }

    #[test]
    fn unavailable_transport_degrades() {
        let (_connector, mgr) = manager(true);
        assert!(mgr.ensure_connected().is_err());
        assert!(matches!(mgr.state(), ConnectionState::Failed { .. }));
        assert!(mgr.send(ClientCommand::LeaveRideRoom { ride_id: "x".into() }).is_err());
    }
}
