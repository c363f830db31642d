use thiserror::Error;

use coupler_core::CoreError;

/// Errors surfaced by the transport, endpoint-resolution, communicator and
/// manager-client layers. Wraps [`CoreError`] for failures that originate in
/// the reference/settings layer below the wire.
#[derive(Error, Debug)]
pub enum CommError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("invalid port name: {0}")]
    InvalidPortName(String),

    #[error("port not connected: {0}")]
    PortNotConnected(String),

    #[error("no matching transport for locations {0:?}")]
    NoMatchingTransport(Vec<String>),

    #[error("settings overlay crosses parallel universes on port {port}")]
    CrossUniverse { port: String },

    #[error("transport timeout after {0:?}")]
    TransportTimeout(std::time::Duration),

    #[error("transport error: {0}")]
    TransportError(String),

    #[error("manager unreachable: {0}")]
    ManagerUnreachable(String),

    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CommResult<T> = Result<T, CommError>;
