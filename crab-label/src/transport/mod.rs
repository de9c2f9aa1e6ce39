//! Delivery of encoded payloads to the print agent
//!
//! The agent URL scheme picks one of two mutually exclusive modes:
//! - HTTP: POST, then poll `checkStatus` until a terminal status
//! - WebSocket: one persistent connection per printer, completion pushed

pub mod http;
pub mod socket;

pub use http::HttpTransport;
pub use socket::{MSR_SUFFIX, PRINT_SUFFIX, ReplyReceiver, SocketKey, SocketRegistry};

use crate::config::{AgentConfig, TransportMode};
use crate::error::LabelResult;

/// Transport selected by configuration
#[derive(Debug, Clone)]
pub enum TransportClient {
    Http(HttpTransport),
    Socket(SocketRegistry),
}

impl TransportClient {
    pub fn new(config: &AgentConfig) -> LabelResult<Self> {
        Ok(match config.mode {
            TransportMode::HttpPoll => TransportClient::Http(HttpTransport::new(config)?),
            TransportMode::PersistentSocket => TransportClient::Socket(SocketRegistry::new(config)),
        })
    }

    pub fn mode(&self) -> TransportMode {
        match self {
            TransportClient::Http(_) => TransportMode::HttpPoll,
            TransportClient::Socket(_) => TransportMode::PersistentSocket,
        }
    }
}
