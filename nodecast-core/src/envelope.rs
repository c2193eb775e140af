//! Packet envelope and record format.
//!
//! A packet is a multipart envelope of 2 or 3 frames: `(topic, address?,
//! payload)`. The payload is either a serialized [`Record`] or one of the
//! fixed [`ControlWord`]s. Records are schemaless maps of named fields with
//! one mandatory key, `time_s`; binary blobs (camera frames, IMU vectors)
//! carry their own shape and element-type annotation so a consumer with no
//! shared schema can reconstruct them.

use crate::control::ControlWord;
use crate::message_builder::Message;
use bytes::Bytes;
use std::collections::BTreeMap;
use thiserror::Error;

/// Mandatory field name: host wall-clock seconds at emission.
pub const TIME_S: &str = "time_s";

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("packet must have 2 or 3 frames, got {0}")]
    WrongFrameCount(usize),
    #[error("record encode failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("record decode failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("record is missing mandatory field `time_s`")]
    MissingTimeS,
}

/// A typed binary blob: raw bytes plus enough metadata to reconstruct a
/// multi-dimensional array without a shared schema (e.g. a camera frame or
/// an IMU sample vector).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Blob {
    /// Element type, e.g. `"u8"`, `"f32"`, `"i16"`.
    pub dtype: String,
    /// Array shape, row-major.
    pub shape: Vec<usize>,
    #[serde(with = "serde_bytes")]
    pub bytes: Vec<u8>,
}

impl Blob {
    #[must_use]
    pub fn new(dtype: impl Into<String>, shape: Vec<usize>, bytes: Vec<u8>) -> Self {
        Self {
            dtype: dtype.into(),
            shape,
            bytes,
        }
    }
}

/// A single schemaless field value.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Blob(Blob),
    List(Vec<Value>),
    Null,
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Blob> for Value {
    fn from(v: Blob) -> Self {
        Self::Blob(v)
    }
}

/// A schemaless map of named fields. Mandatory: `time_s`.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Start a record at the given host wall-clock time.
    #[must_use]
    pub fn new(time_s: f64) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(TIME_S.to_string(), Value::Float(time_s));
        Self { fields }
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Mandatory `time_s` field. Panics only if a `Record` was hand-built
    /// without going through [`Record::new`] or deserialization of a
    /// conforming payload; both paths guarantee it is present.
    pub fn time_s(&self) -> Result<f64, EnvelopeError> {
        match self.fields.get(TIME_S) {
            Some(Value::Float(f)) => Ok(*f),
            Some(Value::Int(i)) => Ok(*i as f64),
            _ => Err(EnvelopeError::MissingTimeS),
        }
    }

    /// Encode to the binary self-describing wire format (msgpack).
    pub fn encode(&self) -> Result<Bytes, EnvelopeError> {
        Ok(Bytes::from(rmp_serde::to_vec_named(self)?))
    }

    /// Decode from the wire. `decode(encode(x)) == x` for any `Record`
    /// built through the public API.
    pub fn decode(buf: &[u8]) -> Result<Self, EnvelopeError> {
        let record: Self = rmp_serde::from_slice(buf)?;
        if !record.fields.contains_key(TIME_S) {
            return Err(EnvelopeError::MissingTimeS);
        }
        Ok(record)
    }
}

/// The payload frame: either a serialized record or a fixed control word.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Record(Record),
    Control(ControlWord),
}

/// A full packet envelope: `(topic, address?, payload)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Dotted routing key, e.g. `"imu.left_foot.data"`.
    pub topic: Bytes,
    /// Identity frame for REQ/REP-style sync replies; empty for pure pub/sub.
    pub address: Option<Bytes>,
    pub payload: Payload,
}

impl Packet {
    #[must_use]
    pub fn data(topic: impl Into<Bytes>, record: Record) -> Self {
        Self {
            topic: topic.into(),
            address: None,
            payload: Payload::Record(record),
        }
    }

    #[must_use]
    pub fn control(topic: impl Into<Bytes>, word: ControlWord) -> Self {
        Self {
            topic: topic.into(),
            address: None,
            payload: Payload::Control(word),
        }
    }

    #[must_use]
    pub fn with_address(mut self, address: impl Into<Bytes>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Encode into the 2- or 3-frame wire representation.
    pub fn into_frames(self) -> Result<Vec<Bytes>, EnvelopeError> {
        let payload = match self.payload {
            Payload::Record(r) => r.encode()?,
            Payload::Control(w) => w.as_bytes(),
        };

        let mut msg = Message::new().push(self.topic);
        if let Some(addr) = self.address {
            msg = msg.push(addr);
        }
        Ok(msg.push(payload).into_frames())
    }

    /// Decode a 2- or 3-frame multipart message back into a `Packet`.
    pub fn from_frames(mut frames: Vec<Bytes>) -> Result<Self, EnvelopeError> {
        match frames.len() {
            2 => {
                let payload_bytes = frames.pop().unwrap();
                let topic = frames.pop().unwrap();
                Ok(Self {
                    topic,
                    address: None,
                    payload: decode_payload(&payload_bytes)?,
                })
            }
            3 => {
                let payload_bytes = frames.pop().unwrap();
                let address = frames.pop().unwrap();
                let topic = frames.pop().unwrap();
                Ok(Self {
                    topic,
                    address: Some(address),
                    payload: decode_payload(&payload_bytes)?,
                })
            }
            n => Err(EnvelopeError::WrongFrameCount(n)),
        }
    }
}

fn decode_payload(bytes: &Bytes) -> Result<Payload, EnvelopeError> {
    if let Some(word) = ControlWord::parse(bytes) {
        return Ok(Payload::Control(word));
    }
    Ok(Payload::Record(Record::decode(bytes)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_roundtrip_with_scalars_and_blob() {
        let record = Record::new(1.5)
            .with_field("counter", 42i64)
            .with_field("label", "imu".to_string())
            .with_field(
                "frame",
                Blob::new("u8", vec![2, 2], vec![1, 2, 3, 4]),
            );

        let encoded = record.encode().unwrap();
        let decoded = Record::decode(&encoded).unwrap();
        assert_eq!(record, decoded);
        assert_eq!(decoded.time_s().unwrap(), 1.5);
    }

    #[test]
    fn data_packet_roundtrips_through_frames() {
        let record = Record::new(0.2).with_field("x", 1.0);
        let packet = Packet::data("imu.left.data", record).with_address("node-1");
        let frames = packet.clone().into_frames().unwrap();
        assert_eq!(frames.len(), 3);
        let decoded = Packet::from_frames(frames).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn control_packet_has_two_frames_and_parses_back() {
        let packet = Packet::control("imu.left.data", ControlWord::End);
        let frames = packet.clone().into_frames().unwrap();
        assert_eq!(frames.len(), 2);
        let decoded = Packet::from_frames(frames).unwrap();
        assert_eq!(decoded.payload, Payload::Control(ControlWord::End));
    }

    #[test]
    fn malformed_frame_count_is_rejected() {
        let err = Packet::from_frames(vec![Bytes::from_static(b"only-one")]).unwrap_err();
        assert!(matches!(err, EnvelopeError::WrongFrameCount(1)));
    }
}
