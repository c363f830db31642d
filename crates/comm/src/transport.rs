use async_trait::async_trait;

use crate::error::CommError;
use crate::message::WireMessage;

/// The server half of a transport: owns an accept loop, advertises a
/// location string of the form `<scheme>:<opaque>`, and lets remote peers
/// drain the owning instance's outboxes.
#[async_trait]
pub trait TransportServer: Send + Sync {
    /// The location this server is reachable at, e.g. `tcp:host:9000`.
    fn location(&self) -> String;

    /// Stop accepting connections and drain outstanding handler tasks.
    async fn shutdown(&self);
}

/// The client half of a transport: connects to one peer location and fetches
/// queued messages destined for a given receiver reference.
#[async_trait]
pub trait TransportClient: Send + Sync {
    /// Whether this client implementation can connect to `location`.
    /// Typically `location.starts_with(scheme + ":")`.
    fn can_connect_to(location: &str) -> bool
    where
        Self: Sized;

    /// Round-trips to the peer's server and returns the next queued message
    /// addressed to `receiver_ref`.
    async fn receive(&self, receiver_ref: &str) -> Result<WireMessage, CommError>;
}

/// Either half of a pluggable transport's construction functions, registered
/// at startup so the communicator can discover and instantiate transports by
/// scheme without knowing their concrete type.
///
/// Replaces a registry-by-class-object with a table of function pointers,
/// one entry per protocol.
pub struct TransportRegistration {
    pub scheme: &'static str,
    pub can_connect_to: fn(&str) -> bool,
    pub make_client: fn(&str) -> Result<Box<dyn TransportClient>, CommError>,
}

#[derive(Default)]
pub struct TransportRegistry {
    entries: Vec<TransportRegistration>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entry: TransportRegistration) {
        self.entries.push(entry);
    }

    /// Scans registered transports in registration order; for the first one
    /// that accepts any advertised location, instantiates a client for that
    /// location. Transport priority wins over location order, matching
    /// `communicator.py`'s `__get_client` (`ClientType` outer, `location`
    /// inner). Fails `NoMatchingTransport` if no registered scheme accepts
    /// any advertised location.
    pub fn make_client_for(
        &self,
        locations: &[String],
    ) -> Result<Box<dyn TransportClient>, CommError> {
        for entry in &self.entries {
            for location in locations {
                if (entry.can_connect_to)(location) {
                    return (entry.make_client)(location);
                }
            }
        }
        Err(CommError::NoMatchingTransport(locations.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeClient(String);

    #[async_trait]
    impl TransportClient for FakeClient {
        fn can_connect_to(location: &str) -> bool {
            location.starts_with("fake:")
        }

        async fn receive(&self, _receiver_ref: &str) -> Result<WireMessage, CommError> {
            Err(CommError::TransportError("fake".to_string()))
        }
    }

    struct OtherClient(String);

    #[async_trait]
    impl TransportClient for OtherClient {
        fn can_connect_to(location: &str) -> bool {
            location.starts_with("other:")
        }

        async fn receive(&self, _receiver_ref: &str) -> Result<WireMessage, CommError> {
            Err(CommError::TransportError("other".to_string()))
        }
    }

    #[test]
    fn selects_first_matching_scheme_and_ignores_the_rest() {
        let mut registry = TransportRegistry::new();
        registry.register(TransportRegistration {
            scheme: "fake",
            can_connect_to: FakeClient::can_connect_to,
            make_client: |loc| Ok(Box::new(FakeClient(loc.to_string()))),
        });

        let locations = vec!["udp:host:1".to_string(), "fake:host:9000".to_string()];
        assert!(registry.make_client_for(&locations).is_ok());
    }

    #[tokio::test]
    async fn transport_priority_wins_over_location_order() {
        // "fake" is registered first (higher priority) but its matching
        // location comes second; "other" is registered second but its
        // location comes first. The registered order must win, matching
        // `communicator.py`'s `__get_client` (ClientType outer, location
        // inner) rather than picking whichever location string appears
        // first.
        let mut registry = TransportRegistry::new();
        registry.register(TransportRegistration {
            scheme: "fake",
            can_connect_to: FakeClient::can_connect_to,
            make_client: |loc| Ok(Box::new(FakeClient(loc.to_string()))),
        });
        registry.register(TransportRegistration {
            scheme: "other",
            can_connect_to: OtherClient::can_connect_to,
            make_client: |loc| Ok(Box::new(OtherClient(loc.to_string()))),
        });

        let locations = vec!["other:host:1".to_string(), "fake:host:9000".to_string()];
        let client = registry.make_client_for(&locations).unwrap();
        let err = client.receive("x").await.unwrap_err();
        assert!(matches!(err, CommError::TransportError(msg) if msg == "fake"));
    }

    #[test]
    fn fails_when_no_scheme_matches() {
        let registry = TransportRegistry::new();
        let locations = vec!["udp:host:1".to_string()];
        assert!(matches!(
            registry.make_client_for(&locations),
            Err(CommError::NoMatchingTransport(_))
        ));
    }
}
