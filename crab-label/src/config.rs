//! Print agent configuration
//!
//! # Environment variables
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | LABEL_AGENT_URL | http://127.0.0.1:18080/WebPrintSDK/ | agent base URL, scheme selects transport |
//! | LABEL_REQUEST_TIMEOUT_MS | 40000 | per HTTP request timeout |
//! | LABEL_POLL_MAX_ATTEMPTS | 120 | status check attempt cap |
//! | LABEL_POLL_DEADLINE_SECS | 300 | wall-clock limit for one print confirmation |
//! | LABEL_QUEUED_SEND_POLICY | last-write-wins | `last-write-wins` or `queue-all` |

use std::str::FromStr;
use std::time::Duration;

use crate::error::{LabelError, LabelResult};

/// Default agent address
pub const DEFAULT_AGENT_URL: &str = "http://127.0.0.1:18080/WebPrintSDK/";

/// Long-poll hint sent with every status check, in seconds
pub const STATUS_TIMEOUT_HINT_SECS: u64 = 30;

/// How payloads reach the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// `http:` / `https:` request, then status polling
    HttpPoll,
    /// `ws:` / `wss:` long-lived connection, completion pushed by the agent
    PersistentSocket,
}

impl TransportMode {
    pub fn from_url(url: &str) -> LabelResult<Self> {
        let scheme = url
            .split_once(':')
            .map(|(s, _)| s.to_ascii_lowercase())
            .unwrap_or_default();
        match scheme.as_str() {
            "http" | "https" => Ok(TransportMode::HttpPoll),
            "ws" | "wss" => Ok(TransportMode::PersistentSocket),
            _ => Err(LabelError::InvalidConfig(format!(
                "Unsupported agent URL scheme: {}",
                url
            ))),
        }
    }
}

/// What happens to a payload queued on a socket that is still opening
/// when another send arrives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueuedSendPolicy {
    /// Only the latest payload is flushed on open; the earlier one is
    /// reported as superseded and never transmitted
    #[default]
    LastWriteWins,
    /// Every queued payload is flushed on open, in send order
    QueueAll,
}

impl FromStr for QueuedSendPolicy {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "last-write-wins" => Ok(QueuedSendPolicy::LastWriteWins),
            "queue-all" => Ok(QueuedSendPolicy::QueueAll),
            other => Err(LabelError::InvalidConfig(format!(
                "Unknown queued send policy: {}",
                other
            ))),
        }
    }
}

/// Limits for the status polling loop
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Maximum status checks per request (including the first)
    pub max_attempts: u32,
    /// Wall-clock limit from the first status check
    pub deadline: Duration,
    /// Pause between checks; the agent long-polls so zero is normal
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 120,
            deadline: Duration::from_secs(300),
            interval: Duration::ZERO,
        }
    }
}

/// Agent connection configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Base URL ending in `/`, printer name is appended
    pub server_url: String,
    pub mode: TransportMode,
    /// Per HTTP request timeout, must exceed the status long-poll hint
    pub request_timeout: Duration,
    pub poll: PollPolicy,
    pub queued_send_policy: QueuedSendPolicy,
}

impl AgentConfig {
    pub fn new(server_url: impl Into<String>) -> LabelResult<Self> {
        let mut server_url: String = server_url.into();
        if !server_url.ends_with('/') {
            server_url.push('/');
        }
        let mode = TransportMode::from_url(&server_url)?;
        Ok(Self {
            server_url,
            mode,
            request_timeout: Duration::from_secs(STATUS_TIMEOUT_HINT_SECS + 10),
            poll: PollPolicy::default(),
            queued_send_policy: QueuedSendPolicy::default(),
        })
    }

    /// Load from environment variables, defaults for anything unset
    pub fn from_env() -> LabelResult<Self> {
        let url = std::env::var("LABEL_AGENT_URL").unwrap_or_else(|_| DEFAULT_AGENT_URL.into());
        let mut config = Self::new(url)?;

        if let Some(ms) = std::env::var("LABEL_REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = std::env::var("LABEL_POLL_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.poll.max_attempts = n;
        }
        if let Some(secs) = std::env::var("LABEL_POLL_DEADLINE_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.poll.deadline = Duration::from_secs(secs);
        }
        if let Ok(policy) = std::env::var("LABEL_QUEUED_SEND_POLICY") {
            config.queued_send_policy = policy.parse()?;
        }

        Ok(config)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_queued_send_policy(mut self, policy: QueuedSendPolicy) -> Self {
        self.queued_send_policy = policy;
        self
    }

    /// `{server}{printer}{suffix}`
    pub fn endpoint_url(&self, printer: &str, suffix: &str) -> String {
        format!("{}{}{}", self.server_url, printer, suffix)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_AGENT_URL.to_string(),
            mode: TransportMode::HttpPoll,
            request_timeout: Duration::from_secs(STATUS_TIMEOUT_HINT_SECS + 10),
            poll: PollPolicy::default(),
            queued_send_policy: QueuedSendPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_scheme() {
        assert_eq!(
            TransportMode::from_url("https://127.0.0.1:18080/").unwrap(),
            TransportMode::HttpPoll
        );
        assert_eq!(
            TransportMode::from_url("WSS://127.0.0.1:18080/").unwrap(),
            TransportMode::PersistentSocket
        );
        assert!(TransportMode::from_url("ftp://host/").is_err());
        assert!(TransportMode::from_url("no-scheme").is_err());
    }

    #[test]
    fn test_endpoint_url() {
        let config = AgentConfig::new("ws://127.0.0.1:18080/WebPrintSDK").unwrap();
        assert_eq!(config.mode, TransportMode::PersistentSocket);
        assert_eq!(
            config.endpoint_url("Printer1", "/requestMSRData"),
            "ws://127.0.0.1:18080/WebPrintSDK/Printer1/requestMSRData"
        );
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(
            "queue-all".parse::<QueuedSendPolicy>().unwrap(),
            QueuedSendPolicy::QueueAll
        );
        assert!("first-wins".parse::<QueuedSendPolicy>().is_err());
        assert_eq!(QueuedSendPolicy::default(), QueuedSendPolicy::LastWriteWins);
    }

    #[test]
    fn test_default_timeout_exceeds_hint() {
        let config = AgentConfig::default();
        assert!(config.request_timeout > Duration::from_secs(STATUS_TIMEOUT_HINT_SECS));
    }
}
