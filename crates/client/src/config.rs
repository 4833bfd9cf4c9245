//! Client configuration from environment variables.

use std::time::Duration;

use crate::ws::ReconnectConfig;

const DEFAULT_API_URL: &str = "http://localhost:8080";
const WS_PATH: &str = "/api/ws";

/// Runtime settings for the ride channel session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the ride API, e.g. `https://api.example.com`
    pub api_base_url: String,
    /// Push channel endpoint
    pub ws_url: String,
    /// Bearer token for API requests and the socket handshake
    pub auth_token: Option<String>,
    /// Length of the cosmetic driver-search countdown
    pub search_timeout: Duration,
    /// Minimum spacing between geocoding requests
    pub geocode_interval: Duration,
    /// How often the active ride is refetched in the background
    pub poll_interval: Duration,
    pub reconnect: ReconnectConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            ws_url: ws_url_for(DEFAULT_API_URL),
            auth_token: None,
            search_timeout: Duration::from_secs(600),
            geocode_interval: Duration::from_millis(1000),
            poll_interval: Duration::from_secs(30),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Read configuration from the environment.
    ///
    /// Environment variables:
    /// - `RIDESHARE_API_URL`: API base URL (default: "http://localhost:8080")
    /// - `RIDESHARE_WS_URL`: push channel URL (default: derived from the API URL)
    /// - `RIDESHARE_AUTH_TOKEN`: bearer token (default: none)
    /// - `RIDESHARE_SEARCH_TIMEOUT_SECS`: driver search countdown (default: 600)
    /// - `RIDESHARE_GEOCODE_INTERVAL_MS`: geocoder spacing (default: 1000)
    /// - `RIDESHARE_POLL_INTERVAL_SECS`: background refetch period (default: 30)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let api_base_url = lookup("RIDESHARE_API_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_base_url);
        let ws_url = lookup("RIDESHARE_WS_URL").unwrap_or_else(|| ws_url_for(&api_base_url));
        let auth_token = lookup("RIDESHARE_AUTH_TOKEN").filter(|t| !t.is_empty());

        let search_timeout = lookup("RIDESHARE_SEARCH_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.search_timeout);
        let geocode_interval = lookup("RIDESHARE_GEOCODE_INTERVAL_MS")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.geocode_interval);
        let poll_interval = lookup("RIDESHARE_POLL_INTERVAL_SECS")
            .and_then(|v| v.parse().ok())
            .filter(|secs: &u64| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.poll_interval);

        Self {
            api_base_url,
            ws_url,
            auth_token,
            search_timeout,
            geocode_interval,
            poll_interval,
            reconnect: defaults.reconnect,
        }
    }

    /// Socket URL including the auth token, if any.
    pub fn ws_connect_url(&self) -> String {
        match &self.auth_token {
            Some(token) => {
                let sep = if self.ws_url.contains('?') { '&' } else { '?' };
                format!("{}{}token={}", self.ws_url, sep, urlencoding::encode(token))
            }
            None => self.ws_url.clone(),
        }
    }
}

/// Derive the push channel URL from an HTTP base URL.
pub fn ws_url_for(api_base_url: &str) -> String {
    match url::Url::parse(api_base_url) {
        Ok(mut url) => {
            let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
            // http(s) -> ws(s) is always accepted by the url crate
            let _ = url.set_scheme(scheme);
            url.set_path(WS_PATH);
            url.to_string()
        }
        Err(_) => format!("ws://localhost:8080{}", WS_PATH),
    }
}
