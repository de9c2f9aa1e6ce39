//! Print request outcomes
//!
//! Every failure mode is a variant here. Legacy sentinel strings are only
//! produced in [`legacy`].

use crate::error::TransportError;
use crate::protocol::{AgentReply, MsrTracks};

/// Terminal result of one print or card-reader request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintOutcome {
    /// Agent reported a terminal status (success or printer-side error)
    Completed { response_id: String, result: String },
    /// Card-reader data
    CardData {
        response_id: String,
        result: String,
        tracks: MsrTracks,
    },
    /// Agent already has this request id queued or in flight
    Duplicated(String),
    /// Initial acknowledgement was neither pending nor duplicated
    Unexpected(String),
    /// Agent has no printer under that name (HTTP 404)
    PrinterNotFound,
    /// Agent unreachable, or socket closed before opening
    ConnectionFailed,
    /// Agent reply was not valid JSON
    ParseFailed,
    /// Socket closed while the request was waiting
    Disconnected,
    /// Queued socket payload replaced before it was sent
    Superseded,
    /// Caller cancelled while waiting for completion
    Cancelled,
    /// Poll attempt cap or deadline reached
    PollLimitExceeded { response_id: String },
}

impl PrintOutcome {
    pub(crate) fn from_terminal_reply(reply: AgentReply) -> Self {
        let response_id = reply.response_id().to_string();
        match reply.tracks() {
            Some(tracks) => PrintOutcome::CardData {
                response_id,
                result: reply.result,
                tracks,
            },
            None => PrintOutcome::Completed {
                response_id,
                result: reply.result,
            },
        }
    }

    /// Agent finished the job without an error status
    pub fn is_success(&self) -> bool {
        match self {
            PrintOutcome::Completed { result, .. } | PrintOutcome::CardData { result, .. } => {
                !result.starts_with("error")
            }
            _ => false,
        }
    }
}

impl From<TransportError> for PrintOutcome {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::PrinterNotFound(_) => PrintOutcome::PrinterNotFound,
            TransportError::Connection(_) => PrintOutcome::ConnectionFailed,
            TransportError::Parse(_) => PrintOutcome::ParseFailed,
            TransportError::ConnectionClosed => PrintOutcome::Disconnected,
            TransportError::Superseded => PrintOutcome::Superseded,
        }
    }
}

/// Progress reported through the caller's callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrintEvent {
    /// Request accepted, nothing sent yet
    Accepted,
    /// Exactly once per request
    Finished(PrintOutcome),
}

/// Compatibility boundary for consumers of the string callback contract
pub mod legacy {
    use super::{PrintEvent, PrintOutcome};
    use crate::protocol::MsrTracks;

    pub const NO_PRINTERS: &str = "No printers";
    pub const CANNOT_CONNECT: &str = "Cannot connect to server";
    pub const CANNOT_PARSE: &str = "Cannot parse server response";
    pub const CANCELLED: &str = "Print request cancelled";
    pub const POLL_TIMEOUT: &str = "Print status timed out";

    /// Legacy string for an outcome, `None` where the legacy channel stayed silent
    pub fn result_string(outcome: &PrintOutcome) -> Option<String> {
        match outcome {
            PrintOutcome::Completed {
                response_id,
                result,
            }
            | PrintOutcome::CardData {
                response_id,
                result,
                ..
            } => Some(format!("{}:{}", response_id, result)),
            PrintOutcome::Duplicated(raw) | PrintOutcome::Unexpected(raw) => Some(raw.clone()),
            PrintOutcome::PrinterNotFound => Some(NO_PRINTERS.to_string()),
            PrintOutcome::ConnectionFailed => Some(CANNOT_CONNECT.to_string()),
            PrintOutcome::ParseFailed => Some(CANNOT_PARSE.to_string()),
            PrintOutcome::Cancelled => Some(CANCELLED.to_string()),
            PrintOutcome::PollLimitExceeded { .. } => Some(POLL_TIMEOUT.to_string()),
            PrintOutcome::Disconnected | PrintOutcome::Superseded => None,
        }
    }

    /// Adapt a `(result, tracks)` callback to [`PrintEvent`]s
    ///
    /// `Accepted` is reported as an empty string.
    pub fn callback<F>(mut f: F) -> impl FnMut(PrintEvent) + Send
    where
        F: FnMut(&str, Option<&MsrTracks>) + Send,
    {
        move |event| match event {
            PrintEvent::Accepted => f("", None),
            PrintEvent::Finished(outcome) => {
                if let Some(result) = result_string(&outcome) {
                    let tracks = match &outcome {
                        PrintOutcome::CardData { tracks, .. } => Some(tracks),
                        _ => None,
                    };
                    f(&result, tracks);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_strings() {
        let done = PrintOutcome::Completed {
            response_id: "r1".into(),
            result: "success".into(),
        };
        assert_eq!(legacy::result_string(&done).unwrap(), "r1:success");
        assert_eq!(
            legacy::result_string(&PrintOutcome::PrinterNotFound).unwrap(),
            "No printers"
        );
        assert_eq!(
            legacy::result_string(&PrintOutcome::ConnectionFailed).unwrap(),
            "Cannot connect to server"
        );
        assert_eq!(
            legacy::result_string(&PrintOutcome::ParseFailed).unwrap(),
            "Cannot parse server response"
        );
        assert_eq!(
            legacy::result_string(&PrintOutcome::Duplicated("duplicated:abc".into())).unwrap(),
            "duplicated:abc"
        );
        assert!(legacy::result_string(&PrintOutcome::Disconnected).is_none());
    }

    #[test]
    fn test_legacy_callback_passes_tracks() {
        let mut seen = Vec::new();
        {
            let mut cb = legacy::callback(|result: &str, tracks: Option<&MsrTracks>| {
                seen.push((result.to_string(), tracks.map(|t| t.track2.clone())));
            });
            cb(PrintEvent::Accepted);
            cb(PrintEvent::Finished(PrintOutcome::CardData {
                response_id: "m1".into(),
                result: "success".into(),
                tracks: MsrTracks {
                    track2: ";4111=".into(),
                    ..Default::default()
                },
            }));
            cb(PrintEvent::Finished(PrintOutcome::Superseded));
        }
        assert_eq!(
            seen,
            vec![
                (String::new(), None),
                ("m1:success".to_string(), Some(";4111=".to_string())),
            ]
        );
    }

    #[test]
    fn test_is_success() {
        let err = PrintOutcome::Completed {
            response_id: "r".into(),
            result: "error:cover open".into(),
        };
        assert!(!err.is_success());
        assert!(!PrintOutcome::Cancelled.is_success());
    }
}
