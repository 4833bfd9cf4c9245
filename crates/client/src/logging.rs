//! Cross-platform logging.
//!
//! The `log_*` macros format once and hand the line to the platform backend:
//! `web_sys::console` in the browser, `tracing` everywhere else.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

#[cfg(target_arch = "wasm32")]
pub fn emit(level: Level, msg: &str) {
    let msg = wasm_bindgen::JsValue::from_str(msg);
    match level {
        Level::Debug => web_sys::console::debug_1(&msg),
        Level::Info => web_sys::console::log_1(&msg),
        Level::Warn => web_sys::console::warn_1(&msg),
        Level::Error => web_sys::console::error_1(&msg),
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub fn emit(level: Level, msg: &str) {
    match level {
        Level::Debug => tracing::debug!("{}", msg),
        Level::Info => tracing::info!("{}", msg),
        Level::Warn => tracing::warn!("{}", msg),
        Level::Error => tracing::error!("{}", msg),
    }
}

/// Install the native subscriber. `RUST_LOG` overrides the default filter.
#[cfg(not(target_arch = "wasm32"))]
pub fn init() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("rideshare_client=debug")),
        )
        .try_init();
}

#[cfg(target_arch = "wasm32")]
pub fn init() {}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Level::Info, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Level::Error, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Level::Warn, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Level::Debug, &format!($($arg)*))
    };
}
