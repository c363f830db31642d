use serde::{Deserialize, Serialize};

use coupler_core::Settings;

use crate::error::CommError;

/// A tagged sum over the shapes a user payload can take. The `Settings`
/// variant is what the abstract `CONFIGURATION` extension tag becomes in a
/// statically-typed encoding: a payload that started life as a `Settings`
/// object round-trips through this variant instead of a raw extension byte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PayloadValue {
    Bytes(Vec<u8>),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<PayloadValue>),
    Settings(Settings),
}

/// The message a submodel author sends and receives. `settings` carries the
/// overlay attached on receive; it is `None` on a freshly constructed
/// outgoing message, since the communicator fills it in from the
/// `SettingsStore` at send time.
#[derive(Debug, Clone)]
pub struct Message {
    pub timestamp: f64,
    pub next_timestamp: Option<f64>,
    pub data: PayloadValue,
    pub settings: Option<Settings>,
}

impl Message {
    pub fn new(timestamp: f64, next_timestamp: Option<f64>, data: PayloadValue) -> Self {
        Self {
            timestamp,
            next_timestamp,
            data,
            settings: None,
        }
    }
}

/// The opaque per-wire envelope, distinct from the user-visible [`Message`].
/// Carries sender/receiver refs, timestamps and the encoded overlay/payload,
/// matching the abstract layout of `{timestamp, next_timestamp, overlay,
/// payload}` plus the addressing the transport needs to route it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub sender: String,
    pub receiver: String,
    pub timestamp: f64,
    pub next_timestamp: Option<f64>,
    #[serde(with = "serde_bytes")]
    pub overlay: Vec<u8>,
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
}

impl WireMessage {
    pub fn encode(
        sender: &str,
        receiver: &str,
        message: &Message,
        overlay: &Settings,
    ) -> Result<Self, CommError> {
        Ok(Self {
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            timestamp: message.timestamp,
            next_timestamp: message.next_timestamp,
            overlay: rmp_serde::to_vec(overlay)?,
            payload: rmp_serde::to_vec(&message.data)?,
        })
    }

    pub fn decode(&self) -> Result<(Message, Settings), CommError> {
        let overlay: Settings = rmp_serde::from_slice(&self.overlay)?;
        let data: PayloadValue = rmp_serde::from_slice(&self.payload)?;
        let message = Message {
            timestamp: self.timestamp,
            next_timestamp: self.next_timestamp,
            data,
            settings: Some(overlay.clone()),
        };
        Ok((message, overlay))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CommError> {
        Ok(rmp_serde::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CommError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

mod serde_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let bytes: &[u8] = Deserialize::deserialize(d)?;
        Ok(bytes.to_vec())
    }
}
