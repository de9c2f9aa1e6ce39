//! # crab-label
//!
//! Label printer integration through a local SDK-compatible print agent.
//!
//! ## Scope
//!
//! - Command accumulation for one label, with range checks on typed helpers
//! - Wire encoding of the accumulated batch
//! - Delivery over HTTP (request + status polling) or a persistent WebSocket
//! - A tagged outcome per request, with a legacy string boundary
//!
//! The agent drives the hardware; nothing here talks to a printer directly.
//!
//! ## Example
//!
//! ```ignore
//! use crab_label::{AgentConfig, CommandAccumulator, PrintRequestCoordinator, QrCode};
//!
//! let coordinator = PrintRequestCoordinator::new(AgentConfig::from_env()?)?;
//!
//! let mut label = CommandAccumulator::new();
//! label.set_width(812)?;
//! label.draw_qr_code(&QrCode::new("https://x", 200, 1000))?;
//! label.print_buffer();
//!
//! let outcome = coordinator
//!     .print_label("Printer1", &mut label, 1, |event| println!("{event:?}"))
//!     .await?;
//! ```

mod batch;
mod command;
mod config;
mod coordinator;
mod error;
pub mod logger;
pub mod outcome;
mod poller;
mod protocol;
pub mod transport;

// Re-exports
pub use batch::{CommandBatch, EncodedPayload, LabelBatchEncoder};
pub use command::{
    Arg, Barcode1D, BlockOption, Command, CommandAccumulator, DeviceFont, MediaType, Orientation,
    Pdf417, QrCode, QrEcc, SequencedCommand, VectorFont,
};
pub use config::{
    AgentConfig, DEFAULT_AGENT_URL, PollPolicy, QueuedSendPolicy, STATUS_TIMEOUT_HINT_SECS,
    TransportMode,
};
pub use coordinator::PrintRequestCoordinator;
pub use error::{LabelError, LabelResult, TransportError, TransportResult};
pub use outcome::{PrintEvent, PrintOutcome};
pub use poller::{ResultPoller, StatusChecker};
pub use protocol::{AckStatus, AgentReply, MsrTracks};
