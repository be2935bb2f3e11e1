use std::time::Duration;

/// Reconnection budget: bounded retries with a fixed delay between them.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(5000),
        }
    }
}

/// Client connection settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Full relay endpoint, e.g. `ws://127.0.0.1:8080/ws`.
    pub url: String,
    pub reconnect: ReconnectPolicy,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Relay endpoint for a host, with the scheme matching the enclosing
/// application's transport security.
pub fn relay_url(host: &str, secure: bool) -> String {
    let scheme = if secure { "wss" } else { "ws" };
    format!("{scheme}://{host}/ws")
}
