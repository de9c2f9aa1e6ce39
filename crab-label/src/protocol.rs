//! Agent wire messages
//!
//! Replies look like `{"Result":"<status[:detail]>","RequestID":7,"ResponseID":"r1"}`;
//! card-reader replies add `Track1`/`Track2`/`Track3`.

use serde::{Deserialize, Serialize};

use crate::error::{TransportError, TransportResult};

/// Reply body from the print, status-check and card-reader endpoints
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AgentReply {
    #[serde(rename = "Result")]
    pub result: String,
    #[serde(rename = "RequestID", default)]
    pub request_id: Option<u64>,
    #[serde(rename = "ResponseID", default)]
    pub response_id: Option<String>,
    #[serde(rename = "Track1", default)]
    pub track1: Option<String>,
    #[serde(rename = "Track2", default)]
    pub track2: Option<String>,
    #[serde(rename = "Track3", default)]
    pub track3: Option<String>,
}

impl AgentReply {
    pub fn parse(text: &str) -> TransportResult<Self> {
        serde_json::from_str(text).map_err(|e| TransportError::Parse(e.to_string()))
    }

    pub fn status(&self) -> AckStatus {
        AckStatus::classify(&self.result)
    }

    pub fn response_id(&self) -> &str {
        self.response_id.as_deref().unwrap_or_default()
    }

    /// Card-reader replies are recognised by the presence of track fields
    pub fn tracks(&self) -> Option<MsrTracks> {
        if self.track1.is_none() && self.track2.is_none() && self.track3.is_none() {
            return None;
        }
        Some(MsrTracks {
            track1: self.track1.clone().unwrap_or_default(),
            track2: self.track2.clone().unwrap_or_default(),
            track3: self.track3.clone().unwrap_or_default(),
        })
    }
}

/// Classification of a `Result` value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    Ready,
    InProgress,
    Duplicated,
    /// Anything else ends the request
    Terminal,
}

impl AckStatus {
    /// Substring match, the agent appends detail after a colon
    pub fn classify(result: &str) -> Self {
        if result.contains("ready") {
            AckStatus::Ready
        } else if result.contains("in-progress") {
            AckStatus::InProgress
        } else if result.contains("duplicated") {
            AckStatus::Duplicated
        } else {
            AckStatus::Terminal
        }
    }

    pub fn is_pending(self) -> bool {
        matches!(self, AckStatus::Ready | AckStatus::InProgress)
    }
}

/// Magnetic stripe tracks read by the card reader
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MsrTracks {
    pub track1: String,
    pub track2: String,
    pub track3: String,
}

/// Body of `.../checkStatus`
#[derive(Debug, Clone, Serialize)]
pub struct StatusCheck<'a> {
    #[serde(rename = "RequestID")]
    pub request_id: u64,
    #[serde(rename = "ResponseID")]
    pub response_id: &'a str,
    #[serde(rename = "Timeout")]
    pub timeout: u64,
}

/// Body of `.../requestMSRData`
#[derive(Debug, Clone, Serialize)]
pub struct MsrRequest {
    #[serde(rename = "Timeout")]
    pub timeout: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(AckStatus::classify("ready"), AckStatus::Ready);
        assert_eq!(AckStatus::classify("in-progress:1/3"), AckStatus::InProgress);
        assert_eq!(AckStatus::classify("duplicated:abc"), AckStatus::Duplicated);
        assert_eq!(AckStatus::classify("success"), AckStatus::Terminal);
        assert_eq!(AckStatus::classify("error:paper empty"), AckStatus::Terminal);
    }

    #[test]
    fn test_parse_reply() {
        let reply =
            AgentReply::parse(r#"{"Result":"duplicated:abc","RequestID":7,"ResponseID":"r1"}"#)
                .unwrap();
        assert_eq!(reply.request_id, Some(7));
        assert_eq!(reply.response_id(), "r1");
        assert_eq!(reply.status(), AckStatus::Duplicated);
        assert!(reply.tracks().is_none());

        assert!(matches!(
            AgentReply::parse("<html>"),
            Err(TransportError::Parse(_))
        ));
        assert!(AgentReply::parse(r#"{"RequestID":7}"#).is_err());
    }

    #[test]
    fn test_tracks_discriminator() {
        let reply = AgentReply::parse(
            r#"{"Result":"success","ResponseID":"m1","Track1":"B4111","Track2":";4111="}"#,
        )
        .unwrap();
        let tracks = reply.tracks().unwrap();
        assert_eq!(tracks.track1, "B4111");
        assert_eq!(tracks.track3, "");
    }

    #[test]
    fn test_status_check_body() {
        let body = serde_json::to_string(&StatusCheck {
            request_id: 3,
            response_id: "r9",
            timeout: 30,
        })
        .unwrap();
        assert_eq!(body, r#"{"RequestID":3,"ResponseID":"r9","Timeout":30}"#);
    }
}
