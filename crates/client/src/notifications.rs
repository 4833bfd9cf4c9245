//! User-facing notices raised by the synchronization core.
//!
//! Errors never propagate out of the hook boundary; they end up here and the
//! UI renders them as banners or toasts.

use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// What a "retry" button on a notice should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryAction {
    RefetchActiveRide,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub retry: Option<RetryAction>,
}

/// Shared queue of pending notices.
#[derive(Debug, Default, Clone)]
pub struct NotificationCenter {
    notices: Rc<RefCell<Vec<Notice>>>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&self, message: impl Into<String>) {
        self.push(Notice {
            level: NoticeLevel::Info,
            message: message.into(),
            retry: None,
        });
    }

    pub fn error(&self, message: impl Into<String>, retry: Option<RetryAction>) {
        self.push(Notice {
            level: NoticeLevel::Error,
            message: message.into(),
            retry,
        });
    }

    pub fn push(&self, notice: Notice) {
        crate::log_debug!("notice: {:?}", notice);
        self.notices.borrow_mut().push(notice);
    }

    /// Current notices, oldest first.
    pub fn list(&self) -> Vec<Notice> {
        self.notices.borrow().clone()
    }

    /// Remove and return every pending notice.
    pub fn drain(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.borrow_mut())
    }

    pub fn is_empty(&self) -> bool {
        self.notices.borrow().is_empty()
    }
}
