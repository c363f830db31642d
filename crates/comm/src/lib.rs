pub mod communicator;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod logging;
pub mod manager;
pub mod message;
pub mod outbox;
pub mod post_office;
pub mod transport;
pub mod transports;

pub use communicator::Communicator;
pub use config::{CommConfig, ManagerConfig, TransportConfig};
pub use endpoint::{resolve_peer, Conduit, Endpoint, PeerTable};
pub use error::{CommError, CommResult};
pub use manager::ManagerClient;
pub use message::{Message, PayloadValue, WireMessage};
pub use outbox::Outbox;
pub use post_office::PostOffice;
pub use transport::{TransportClient, TransportRegistration, TransportRegistry, TransportServer};
