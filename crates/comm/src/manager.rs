use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::time::Instant;

use coupler_core::{Identifier, Reference};

use crate::endpoint::Conduit;
use crate::error::CommError;
use crate::transports::framing::{read_frame, write_frame};

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(30);
const DEFAULT_DEADLINE: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Serialize, Deserialize)]
struct WireConduit {
    sender: Reference,
    receiver: Reference,
}

#[derive(Debug, Serialize, Deserialize)]
enum ManagerRequest {
    RegisterInstance {
        name: Reference,
        locations: Vec<String>,
        declared_ports: Vec<String>,
    },
    RequestPeers {
        name: Reference,
    },
    DeregisterInstance {
        name: Reference,
    },
}

#[derive(Debug, Serialize, Deserialize)]
enum ManagerResponse {
    Ack,
    Peers {
        conduits: Vec<WireConduit>,
        peer_dims: HashMap<Reference, Vec<i64>>,
        peer_locations: HashMap<Reference, Vec<String>>,
    },
    /// Peers are not complete yet; retry after backoff.
    Pending,
    Err(String),
}

/// The transport-level round trip a [`ManagerClient`] needs: send one
/// request, get back one response. Kept separate from [`ManagerClient`]
/// itself so the retry/backoff policy around `request_peers` is testable
/// against a fake transport.
#[async_trait]
trait ManagerTransport: Send + Sync {
    async fn call(&self, request: &ManagerRequest) -> Result<ManagerResponse, CommError>;
}

/// One-shot TCP connection per call; the manager is a single long-lived
/// process so connection setup cost is immaterial next to `request_peers`'s
/// own backoff loop.
struct TcpManagerTransport {
    addr: String,
}

#[async_trait]
impl ManagerTransport for TcpManagerTransport {
    async fn call(&self, request: &ManagerRequest) -> Result<ManagerResponse, CommError> {
        let mut stream = TcpStream::connect(&self.addr).await?;
        let bytes = rmp_serde::to_vec(request)?;
        write_frame(&mut stream, &bytes).await?;
        let response = read_frame(&mut stream).await?;
        Ok(rmp_serde::from_slice(&response)?)
    }
}

/// Registers the instance, fetches peer locations, and deregisters on
/// shutdown. The communicator depends on this only for one-shot bootstrap.
pub struct ManagerClient {
    transport: Box<dyn ManagerTransport>,
    deadline: Duration,
}

impl ManagerClient {
    pub fn connect(location: &str) -> Result<Self, CommError> {
        let addr = location
            .strip_prefix("tcp:")
            .unwrap_or(location)
            .to_string();
        Ok(Self {
            transport: Box::new(TcpManagerTransport { addr }),
            deadline: DEFAULT_DEADLINE,
        })
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Idempotent. Failure is fatal to the instance.
    #[tracing::instrument(skip(self, locations, declared_ports), fields(%name))]
    pub async fn register_instance(
        &self,
        name: &Reference,
        locations: &[String],
        declared_ports: &[Identifier],
    ) -> Result<(), CommError> {
        let request = ManagerRequest::RegisterInstance {
            name: name.clone(),
            locations: locations.to_vec(),
            declared_ports: declared_ports.iter().map(|p| p.to_string()).collect(),
        };
        match self.transport.call(&request).await? {
            ManagerResponse::Ack => {
                tracing::info!("instance registered with manager");
                Ok(())
            }
            ManagerResponse::Err(msg) => Err(CommError::ManagerUnreachable(msg)),
            other => Err(CommError::ProtocolMismatch(format!(
                "unexpected response to register_instance: {other:?}"
            ))),
        }
    }

    /// Blocking; retries with capped exponential backoff until the manager
    /// reports peers complete, or `deadline` elapses.
    #[tracing::instrument(skip(self), fields(%name))]
    pub async fn request_peers(
        &self,
        name: &Reference,
    ) -> Result<
        (
            Vec<Conduit>,
            HashMap<Reference, Vec<i64>>,
            HashMap<Reference, Vec<String>>,
        ),
        CommError,
    > {
        let request = ManagerRequest::RequestPeers { name: name.clone() };
        let start = Instant::now();
        let mut wait = BACKOFF_BASE;

        loop {
            let remaining = self.deadline.saturating_sub(start.elapsed());
            let response = match tokio::time::timeout(remaining, self.transport.call(&request)).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(CommError::ManagerUnreachable(
                        "timed out waiting for peers".to_string(),
                    ))
                }
            };
            match response {
                ManagerResponse::Peers {
                    conduits,
                    peer_dims,
                    peer_locations,
                } => {
                    let conduits = conduits
                        .into_iter()
                        .map(|c| Conduit {
                            sender: c.sender,
                            receiver: c.receiver,
                        })
                        .collect();
                    return Ok((conduits, peer_dims, peer_locations));
                }
                ManagerResponse::Pending => {
                    if start.elapsed() + wait > self.deadline {
                        return Err(CommError::ManagerUnreachable(
                            "timed out waiting for peers".to_string(),
                        ));
                    }
                    tracing::warn!(?wait, "peers not yet complete, retrying");
                    tokio::time::sleep(wait).await;
                    wait = (wait * 2).min(BACKOFF_CAP);
                }
                ManagerResponse::Err(msg) => return Err(CommError::ManagerUnreachable(msg)),
                other => {
                    return Err(CommError::ProtocolMismatch(format!(
                        "unexpected response to request_peers: {other:?}"
                    )))
                }
            }
        }
    }

    /// Best-effort on shutdown: failures are logged, not propagated.
    #[tracing::instrument(skip(self), fields(%name))]
    pub async fn deregister_instance(&self, name: &Reference) {
        let request = ManagerRequest::DeregisterInstance { name: name.clone() };
        if let Err(err) = self.transport.call(&request).await {
            tracing::warn!(%err, "deregister_instance failed, continuing shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeTransport {
        pending_until: usize,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ManagerTransport for FakeTransport {
        async fn call(&self, request: &ManagerRequest) -> Result<ManagerResponse, CommError> {
            match request {
                ManagerRequest::RequestPeers { .. } => {
                    let n = self.calls.fetch_add(1, Ordering::SeqCst);
                    if n < self.pending_until {
                        Ok(ManagerResponse::Pending)
                    } else {
                        Ok(ManagerResponse::Peers {
                            conduits: vec![],
                            peer_dims: HashMap::new(),
                            peer_locations: HashMap::new(),
                        })
                    }
                }
                _ => Ok(ManagerResponse::Ack),
            }
        }
    }

    #[tokio::test]
    async fn request_peers_retries_until_complete() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = ManagerClient {
            transport: Box::new(FakeTransport {
                pending_until: 2,
                calls: calls.clone(),
            }),
            deadline: Duration::from_secs(5),
        };

        let name: Reference = "first".parse().unwrap();
        let result = client.request_peers(&name).await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn request_peers_fails_after_deadline() {
        let calls = Arc::new(AtomicUsize::new(0));
        let client = ManagerClient {
            transport: Box::new(FakeTransport {
                pending_until: usize::MAX,
                calls,
            }),
            deadline: Duration::from_millis(1),
        };
        let name: Reference = "first".parse().unwrap();
        assert!(matches!(
            client.request_peers(&name).await,
            Err(CommError::ManagerUnreachable(_))
        ));
    }
}
