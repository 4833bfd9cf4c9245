//! Event handler bindings that are attached once per connection lifetime.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use rideshare_shared::{EventName, ServerEvent};

use crate::sync::SyncAction;

pub type EventHandler = Rc<dyn Fn(&ServerEvent) -> SyncAction>;

/// A set of named handlers bound to the push channel.
///
/// Any number of consumers may call [`attach_once`](Self::attach_once); only the
/// first call binds anything. Unmounting a consumer never detaches: only an
/// explicit [`detach_all`](Self::detach_all) (logout, connection teardown) does.
#[derive(Default)]
pub struct ListenerRegistry {
    attached: Cell<bool>,
    bindings: RefCell<HashMap<EventName, EventHandler>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handlers` unless this registry is already attached.
    /// Returns whether anything was bound.
    pub fn attach_once<I>(&self, handlers: I) -> bool
    where
        I: IntoIterator<Item = (EventName, EventHandler)>,
    {
        if self.attached.get() {
            crate::log_debug!("ListenerRegistry: already attached, skipping");
            return false;
        }

        let mut bindings = self.bindings.borrow_mut();
        for (name, handler) in handlers {
            if bindings.contains_key(&name) {
                crate::log_warn!("ListenerRegistry: {} listed twice, keeping the first", name);
                continue;
            }
            bindings.insert(name, handler);
        }
        self.attached.set(true);
        crate::log_info!("ListenerRegistry: attached {} handlers", bindings.len());
        true
    }

    /// Unbind every handler and allow a later `attach_once` to bind again.
    pub fn detach_all(&self) {
        if !self.attached.get() {
            return;
        }
        self.bindings.borrow_mut().clear();
        self.attached.set(false);
        crate::log_info!("ListenerRegistry: detached all handlers");
    }

    pub fn is_attached(&self) -> bool {
        self.attached.get()
    }

    pub fn is_bound(&self, name: EventName) -> bool {
        self.bindings.borrow().contains_key(&name)
    }

    pub fn bound_count(&self) -> usize {
        self.bindings.borrow().len()
    }

    /// Run the handler bound for this event, if any.
    pub fn dispatch(&self, event: &ServerEvent) -> Option<SyncAction> {
        // Handlers may call back into the registry, so release the borrow first.
        let handler = self.bindings.borrow().get(&event.name()).cloned()?;
        Some(handler(event))
    }
}
