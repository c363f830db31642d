use std::collections::HashMap;

use coupler_core::{Identifier, Reference};

use crate::error::CommError;

/// The runtime resolution of a conduit side for a specific instance and
/// slot: `(kernel, index, port, slot)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub kernel: Reference,
    pub index: Vec<i64>,
    pub port: Identifier,
    pub slot: Vec<i64>,
}

impl Endpoint {
    pub fn new(kernel: Reference, index: Vec<i64>, port: Identifier, slot: Vec<i64>) -> Self {
        Self {
            kernel,
            index,
            port,
            slot,
        }
    }

    /// The instance reference this endpoint belongs to: `kernel[i0][i1]...`.
    pub fn instance(&self) -> Reference {
        self.kernel.clone() + Reference::from_indices(&self.index)
    }

    /// The full reference this endpoint addresses: `instance.port[s0][s1]...`.
    pub fn reference(&self) -> Reference {
        self.instance() + self.port.clone() + Reference::from_indices(&self.slot)
    }
}

/// A declarative edge between `(sender_kernel, sender_port)` and
/// `(receiver_kernel, receiver_port)`, loaded once from config.
#[derive(Debug, Clone)]
pub struct Conduit {
    pub sender: Reference,
    pub receiver: Reference,
}

/// `port-ref -> peer port-ref`, `kernel-ref -> ensemble shape`, and
/// `instance-ref -> advertised locations`, populated once by `connect`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeerTable {
    pub peers: HashMap<Reference, Reference>,
    pub peer_dims: HashMap<Reference, Vec<i64>>,
    pub peer_locations: HashMap<Reference, Vec<String>>,
}

impl PeerTable {
    pub fn from_conduits(
        conduits: &[Conduit],
        local_kernel: &Reference,
        peer_dims: HashMap<Reference, Vec<i64>>,
        peer_locations: HashMap<Reference, Vec<String>>,
    ) -> Self {
        let mut peers = HashMap::new();
        for conduit in conduits {
            if let Ok((sender_kernel, _)) = conduit.sender.split_last() {
                if &sender_kernel == local_kernel {
                    peers.insert(conduit.sender.clone(), conduit.receiver.clone());
                }
            }
            if let Ok((receiver_kernel, _)) = conduit.receiver.split_last() {
                if &receiver_kernel == local_kernel {
                    peers.insert(conduit.receiver.clone(), conduit.sender.clone());
                }
            }
        }
        Self {
            peers,
            peer_dims,
            peer_locations,
        }
    }
}

/// Resolves the peer endpoint for a local endpoint per the positional
/// partitioning rule: given `total = index ++ slot` and the peer kernel's
/// ensemble dimensionality `d`, the peer index is `total[:d]` and the peer
/// slot is `total[d:]`.
pub fn resolve_peer(local: &Endpoint, table: &PeerTable) -> Result<Endpoint, CommError> {
    let local_port_ref = local.kernel.clone() + local.port.clone();
    let peer_port_ref = table
        .peers
        .get(&local_port_ref)
        .ok_or_else(|| CommError::PortNotConnected(local.port.to_string()))?;

    let (peer_kernel, peer_port_name) = peer_port_ref.split_last().map_err(CommError::Core)?;

    let mut total = local.index.clone();
    total.extend(local.slot.iter().copied());

    let d = table
        .peer_dims
        .get(&peer_kernel)
        .map(|dims| dims.len())
        .unwrap_or(0);
    let d = d.min(total.len());

    let peer_index = total[..d].to_vec();
    let peer_slot = total[d..].to_vec();

    Ok(Endpoint::new(
        peer_kernel,
        peer_index,
        peer_port_name,
        peer_slot,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(s: &str) -> Reference {
        s.parse().unwrap()
    }

    fn id(s: &str) -> Identifier {
        Identifier::new(s).unwrap()
    }

    #[test]
    fn ensemble_routing_partitions_index_and_slot() {
        let conduits = vec![Conduit {
            sender: r("A.out"),
            receiver: r("B.in"),
        }];
        let mut dims = HashMap::new();
        dims.insert(r("B"), vec![4]);

        let table = PeerTable::from_conduits(&conduits, &r("A"), dims, HashMap::new());

        let local = Endpoint::new(r("A"), vec![], id("out"), vec![3]);
        let peer = resolve_peer(&local, &table).unwrap();

        assert_eq!(peer.kernel, r("B"));
        assert_eq!(peer.index, vec![3]);
        assert_eq!(peer.port, id("in"));
        assert_eq!(peer.slot, Vec::<i64>::new());
    }

    #[test]
    fn resolution_is_symmetric() {
        let conduits = vec![Conduit {
            sender: r("A.out"),
            receiver: r("B.in"),
        }];
        let mut dims_for_b = HashMap::new();
        dims_for_b.insert(r("B"), vec![4]);
        let table_a = PeerTable::from_conduits(&conduits, &r("A"), dims_for_b, HashMap::new());

        let local_a = Endpoint::new(r("A"), vec![], id("out"), vec![3]);
        let peer_from_a = resolve_peer(&local_a, &table_a).unwrap();

        let mut dims_for_a = HashMap::new();
        dims_for_a.insert(r("A"), vec![]);
        let table_b = PeerTable::from_conduits(&conduits, &r("B"), dims_for_a, HashMap::new());

        let local_b = Endpoint::new(
            peer_from_a.kernel.clone(),
            peer_from_a.index.clone(),
            peer_from_a.port.clone(),
            peer_from_a.slot.clone(),
        );
        let peer_from_b = resolve_peer(&local_b, &table_b).unwrap();

        assert_eq!(peer_from_b.kernel, r("A"));
        assert_eq!(peer_from_b.index, Vec::<i64>::new());
        assert_eq!(peer_from_b.port, id("out"));
        assert_eq!(peer_from_b.slot, vec![3]);
    }

    #[test]
    fn unconnected_port_fails() {
        let table = PeerTable::default();
        let local = Endpoint::new(r("A"), vec![], id("out"), vec![]);
        assert!(matches!(
            resolve_peer(&local, &table),
            Err(CommError::PortNotConnected(_))
        ));
    }
}
