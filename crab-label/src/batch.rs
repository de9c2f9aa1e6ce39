//! Label batch and its wire encoding
//!
//! Wire shape:
//! `{"id":<id>,"functions":{"func0":{"<name>":[args...]},"func1":{...}}}`
//! with keys in accumulation order.

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};

use crate::command::{Command, SequencedCommand};
use crate::error::LabelResult;

/// Snapshot of one label's commands plus the caller's request id
///
/// The agent uses the request id to detect duplicate submissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBatch {
    request_id: u64,
    commands: Vec<SequencedCommand>,
}

impl CommandBatch {
    pub(crate) fn new(request_id: u64, commands: Vec<SequencedCommand>) -> Self {
        Self {
            request_id,
            commands,
        }
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn commands(&self) -> &[SequencedCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// `{"<name>": [args...]}`
struct CommandEntry<'a>(&'a Command);

impl Serialize for CommandEntry<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.0.name(), self.0.args())?;
        map.end()
    }
}

/// Ordered `funcN` map; serialized entry by entry so no sorting happens
struct Functions<'a>(&'a [SequencedCommand]);

impl Serialize for Functions<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for cmd in self.0 {
            map.serialize_entry(&cmd.key(), &CommandEntry(&cmd.command))?;
        }
        map.end()
    }
}

impl Serialize for CommandBatch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("CommandBatch", 2)?;
        s.serialize_field("id", &self.request_id)?;
        s.serialize_field("functions", &Functions(&self.commands))?;
        s.end()
    }
}

/// Serialized batch ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    request_id: u64,
    body: String,
}

impl EncodedPayload {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn as_str(&self) -> &str {
        &self.body
    }

    pub fn into_string(self) -> String {
        self.body
    }
}

/// Pure, deterministic batch serializer
pub struct LabelBatchEncoder;

impl LabelBatchEncoder {
    pub fn encode(batch: &CommandBatch) -> LabelResult<EncodedPayload> {
        let body = serde_json::to_string(batch)?;
        Ok(EncodedPayload {
            request_id: batch.request_id,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandAccumulator, QrCode, QrEcc};

    #[test]
    fn test_encode_exact_payload() {
        let mut acc = CommandAccumulator::new();
        acc.set_width(812).unwrap();
        acc.draw_qr_code(&QrCode {
            data: "https://x",
            x: 200,
            y: 1000,
            model: 1,
            ecc: QrEcc::H,
            size: 4,
            rotation: 1,
        })
        .unwrap();
        acc.print_buffer();

        let payload = acc.finish(42).unwrap();
        assert_eq!(
            payload.as_str(),
            r#"{"id":42,"functions":{"func0":{"setWidth":[812]},"func1":{"drawQRCode":["https://x",200,1000,1,"H",4,1]},"func2":{"printBuffer":[]}}}"#
        );
        assert_eq!(payload.request_id(), 42);
        assert!(acc.is_empty());
    }

    #[test]
    fn test_encode_preserves_types() {
        let mut acc = CommandAccumulator::new();
        acc.append("setAutoCutter", [crate::Arg::Bool(false), crate::Arg::Int(1)]);
        acc.append("drawDeviceFont", ["12"]);

        let payload = acc.finish(1).unwrap();
        assert!(payload.as_str().contains(r#"{"setAutoCutter":[false,1]}"#));
        assert!(payload.as_str().contains(r#"{"drawDeviceFont":["12"]}"#));
    }

    #[test]
    fn test_encode_empty_batch() {
        let mut acc = CommandAccumulator::new();
        let payload = acc.finish(9).unwrap();
        assert_eq!(payload.as_str(), r#"{"id":9,"functions":{}}"#);
    }

    #[test]
    fn test_many_keys_not_sorted() {
        let mut acc = CommandAccumulator::new();
        for _ in 0..12 {
            acc.clear_buffer();
        }
        let body = acc.finish(1).unwrap().into_string();
        let func2 = body.find("\"func2\"").unwrap();
        let func10 = body.find("\"func10\"").unwrap();
        assert!(func2 < func10);
    }
}
