use std::collections::{HashMap, HashSet};

use coupler_core::{Identifier, Operator, PortSet, Reference, Settings, SettingsStore};

use crate::endpoint::{resolve_peer, Conduit, Endpoint, PeerTable};
use crate::error::CommError;
use crate::manager::ManagerClient;
use crate::message::Message;
use crate::post_office::PostOffice;
use crate::transport::{TransportClient, TransportRegistry, TransportServer};
use crate::transports::local::{LocalTransportClient, LocalTransportServer};
use crate::transports::tcp::{TcpTransportClient, TcpTransportServer};

/// The instance-facing engine: composes the reference/settings layer with
/// the post office and transport layer. Owns its servers, its settings
/// store, its outboxes (via the [`PostOffice`]) and its cache of peer
/// transport clients; none of it is shared across instances.
pub struct Communicator {
    kernel: Reference,
    index: Vec<i64>,
    ports: PortSet,
    settings: SettingsStore,
    post_office: PostOffice,
    peer_table: PeerTable,
    clients: HashMap<Reference, Box<dyn TransportClient>>,
    servers: Vec<Box<dyn TransportServer>>,
    transport_registry: TransportRegistry,
    connected: bool,
    current_iteration_overlay: Option<Settings>,
    warned_disconnected: HashSet<String>,
    sent_counts: HashMap<String, u64>,
    received_counts: HashMap<String, u64>,
}

/// Default transport registration table: local (in-process) and tcp,
/// matching the two transport implementations the comm crate ships.
fn default_registry() -> TransportRegistry {
    let mut registry = TransportRegistry::new();
    registry.register(crate::transport::TransportRegistration {
        scheme: "local",
        can_connect_to: LocalTransportClient::can_connect_to,
        make_client: |loc| Ok(Box::new(LocalTransportClient::connect(loc)?)),
    });
    registry.register(crate::transport::TransportRegistration {
        scheme: "tcp",
        can_connect_to: TcpTransportClient::can_connect_to,
        make_client: |loc| Ok(Box::new(TcpTransportClient::new(loc)?)),
    });
    registry
}

impl Communicator {
    pub fn new(kernel: Reference, index: Vec<i64>, base: Settings) -> Self {
        Self {
            kernel,
            index,
            ports: PortSet::new(),
            settings: SettingsStore::new(base),
            post_office: PostOffice::new(),
            peer_table: PeerTable::default(),
            clients: HashMap::new(),
            servers: Vec::new(),
            transport_registry: default_registry(),
            connected: false,
            current_iteration_overlay: None,
            warned_disconnected: HashSet::new(),
            sent_counts: HashMap::new(),
            received_counts: HashMap::new(),
        }
    }

    pub fn declare_port(&mut self, name: Identifier, operator: Operator) {
        self.ports.declare(name, operator);
    }

    /// The instance reference this communicator addresses: `kernel[i0]...`.
    pub fn instance_ref(&self) -> Reference {
        self.kernel.clone() + Reference::from_indices(&self.index)
    }

    pub async fn start_local_server(&mut self, name: &str) {
        let server = LocalTransportServer::bind(name, self.post_office.clone());
        self.servers.push(Box::new(server));
    }

    pub async fn start_tcp_server(&mut self, addr: &str) -> Result<(), CommError> {
        let server = TcpTransportServer::bind(addr, self.post_office.clone()).await?;
        self.servers.push(Box::new(server));
        Ok(())
    }

    pub fn locations(&self) -> Vec<String> {
        self.servers.iter().map(|s| s.location()).collect()
    }

    /// `register_instance` -> `request_peers` -> `connect`, in that order.
    /// Only after this may user code send or receive.
    pub async fn bootstrap(
        &mut self,
        manager: &ManagerClient,
        declared_ports: &[Identifier],
    ) -> Result<(), CommError> {
        let locations = self.locations();
        let instance = self.instance_ref();
        manager
            .register_instance(&instance, &locations, declared_ports)
            .await?;
        let (conduits, peer_dims, peer_locations) = manager.request_peers(&instance).await?;
        self.connect(conduits, peer_dims, peer_locations)
    }

    /// Idempotent: calling it twice with identical arguments is equivalent
    /// to calling it once.
    pub fn connect(
        &mut self,
        conduits: Vec<Conduit>,
        peer_dims: HashMap<Reference, Vec<i64>>,
        peer_locations: HashMap<Reference, Vec<String>>,
    ) -> Result<(), CommError> {
        let table = PeerTable::from_conduits(&conduits, &self.kernel, peer_dims, peer_locations);
        if self.connected && table == self.peer_table {
            return Ok(());
        }

        let kernel = self.kernel.clone();
        let connected_ports: Vec<String> = self
            .ports
            .iter()
            .filter(|p| {
                let port_ref = kernel.clone() + p.name.clone();
                table.peers.contains_key(&port_ref)
            })
            .map(|p| p.name.to_string())
            .collect();
        let refs: Vec<&str> = connected_ports.iter().map(|s| s.as_str()).collect();
        self.ports.connect(&refs);

        self.peer_table = table;
        self.connected = true;
        Ok(())
    }

    /// Silent no-op on a disconnected port (warns once per port for the
    /// lifetime of this communicator).
    pub async fn send_message(
        &mut self,
        port: &str,
        message: Message,
        slot: Option<i64>,
    ) -> Result<(), CommError> {
        let port_id =
            Identifier::new(port).map_err(|_| CommError::InvalidPortName(port.to_string()))?;

        let is_connected = self
            .ports
            .get(port)
            .map(|p| p.is_connected())
            .unwrap_or(false);
        if !is_connected {
            if self.warned_disconnected.insert(port.to_string()) {
                tracing::warn!(port, "send on disconnected port dropped");
            }
            return Ok(());
        }

        let slot_vec = slot.map(|s| vec![s]).unwrap_or_default();
        let local = Endpoint::new(self.kernel.clone(), self.index.clone(), port_id, slot_vec);
        let peer = resolve_peer(&local, &self.peer_table)?;

        let overlay = self.settings.overlay().clone();
        let wire = crate::message::WireMessage::encode(
            &local.reference().to_string(),
            &peer.reference().to_string(),
            &message,
            &overlay,
        )?;
        self.post_office
            .deposit(&peer.reference().to_string(), wire)
            .await;
        *self.sent_counts.entry(port.to_string()).or_insert(0) += 1;
        Ok(())
    }

    pub async fn receive_message(
        &mut self,
        port: &str,
        slot: Option<i64>,
        default: Option<Message>,
    ) -> Result<Message, CommError> {
        let port_id =
            Identifier::new(port).map_err(|_| CommError::InvalidPortName(port.to_string()))?;

        let port_obj = self.ports.get(port).cloned_operator();
        let is_connected = self
            .ports
            .get(port)
            .map(|p| p.is_connected())
            .unwrap_or(false);

        if !is_connected {
            return match default {
                Some(d) => Ok(d),
                None => Err(CommError::PortNotConnected(port.to_string())),
            };
        }

        let slot_vec = slot.map(|s| vec![s]).unwrap_or_default();
        let local = Endpoint::new(self.kernel.clone(), self.index.clone(), port_id, slot_vec);
        let peer = resolve_peer(&local, &self.peer_table)?;

        self.ensure_client(&peer.instance()).await?;
        let client = self
            .clients
            .get(&peer.instance())
            .expect("ensure_client populates this entry");
        let wire = client.receive(&local.reference().to_string()).await?;
        let (mut message, overlay) = wire.decode()?;

        self.check_parallel_universe(port, port_obj, &overlay)?;
        message.settings = Some(overlay);

        *self.received_counts.entry(port.to_string()).or_insert(0) += 1;
        Ok(message)
    }

    fn check_parallel_universe(
        &mut self,
        port: &str,
        operator: Option<Operator>,
        overlay: &Settings,
    ) -> Result<(), CommError> {
        match &self.current_iteration_overlay {
            None => {
                if matches!(
                    operator,
                    Some(Operator::FInit) | Some(Operator::MuscleSettingsIn)
                ) {
                    self.settings.set_overlay(overlay.clone());
                    self.current_iteration_overlay = Some(overlay.clone());
                }
                Ok(())
            }
            Some(installed) if installed == overlay => Ok(()),
            Some(_) => Err(CommError::CrossUniverse {
                port: port.to_string(),
            }),
        }
    }

    async fn ensure_client(&mut self, peer_instance: &Reference) -> Result<(), CommError> {
        if self.clients.contains_key(peer_instance) {
            return Ok(());
        }
        let locations = self
            .peer_table
            .peer_locations
            .get(peer_instance)
            .cloned()
            .unwrap_or_default();
        let client = self.transport_registry.make_client_for(&locations)?;
        self.clients.insert(peer_instance.clone(), client);
        Ok(())
    }

    /// Marks the start of a new reuse iteration: the next F_INIT (or
    /// `muscle_settings_in`) receive is free to install a new overlay.
    pub fn begin_reuse_iteration(&mut self) {
        self.current_iteration_overlay = None;
    }

    /// `reuse_instance()`: receives on `muscle_settings_in` if connected and
    /// returns whether to proceed; an unconnected (or closed) pseudo-port
    /// means termination.
    pub async fn reuse_instance(&mut self) -> bool {
        self.begin_reuse_iteration();
        let connected = self
            .ports
            .get("muscle_settings_in")
            .map(|p| p.is_connected())
            .unwrap_or(false);
        if !connected {
            return false;
        }
        self.receive_message("muscle_settings_in", None, None)
            .await
            .is_ok()
    }

    /// Per-port counts of messages sent since construction or the last
    /// `restore_message_counts`, for the snapshot subsystem.
    pub fn sent_message_counts(&self) -> HashMap<String, u64> {
        self.sent_counts.clone()
    }

    /// Per-port counts of messages received since construction or the last
    /// `restore_message_counts`.
    pub fn received_message_counts(&self) -> HashMap<String, u64> {
        self.received_counts.clone()
    }

    pub fn restore_message_counts(
        &mut self,
        sent: HashMap<String, u64>,
        received: HashMap<String, u64>,
    ) {
        self.sent_counts = sent;
        self.received_counts = received;
    }

    pub async fn shutdown(&mut self, manager: Option<&ManagerClient>) {
        for server in &self.servers {
            server.shutdown().await;
        }
        if let Some(manager) = manager {
            manager.deregister_instance(&self.instance_ref()).await;
        }
    }
}

trait PortOperatorExt {
    fn cloned_operator(&self) -> Option<Operator>;
}

impl PortOperatorExt for Option<&coupler_core::Port> {
    fn cloned_operator(&self) -> Option<Operator> {
        self.map(|p| p.operator)
    }
}
