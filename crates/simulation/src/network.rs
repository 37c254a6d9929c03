//! In-process transport with configurable faults.

use ledgerbft_core::{Inbox, NetworkError, NetworkPort};
use ledgerbft_messages::{decode_message, encode_message, ConsensusMessage};
use ledgerbft_types::ValidatorId;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Configuration for the simulated network.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Probability (0.0 to 1.0) that a single delivery is dropped.
    pub packet_loss_rate: f64,

    /// Probability (0.0 to 1.0) that a delivery arrives twice.
    pub duplicate_rate: f64,

    /// Encode and decode every message as it would go over the wire.
    pub wire_roundtrip: bool,

    /// Seed for loss and duplication decisions.
    pub seed: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            packet_loss_rate: 0.0,
            duplicate_rate: 0.0,
            wire_roundtrip: true,
            seed: 12345,
        }
    }
}

impl NetworkConfig {
    pub fn with_packet_loss(mut self, rate: f64) -> Self {
        self.packet_loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_duplicates(mut self, rate: f64) -> Self {
        self.duplicate_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_wire_roundtrip(mut self, enabled: bool) -> Self {
        self.wire_roundtrip = enabled;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStats {
    /// Messages handed to the network.
    pub sent: u64,
    /// Copies placed in an inbox.
    pub delivered: u64,
    /// Copies lost to packet loss or partitions.
    pub dropped: u64,
    /// Extra copies delivered.
    pub duplicated: u64,
}

struct Faults {
    rng: ChaCha8Rng,
    /// Unordered pairs that cannot reach each other.
    cut: BTreeSet<(ValidatorId, ValidatorId)>,
}

/// Hub connecting the inboxes of a fixed committee.
///
/// Routing uses the endpoint a message was sent from, never the envelope's
/// claimed sender.
pub struct InMemoryNetwork {
    config: NetworkConfig,
    leader: ValidatorId,
    inboxes: BTreeMap<ValidatorId, Arc<Inbox>>,
    faults: Mutex<Faults>,
    stats: Mutex<NetworkStats>,
    closed: AtomicBool,
}

impl InMemoryNetwork {
    /// Create a network for `committee`, routing `send_to_leader` to `leader`.
    pub fn new(config: NetworkConfig, committee: &[ValidatorId], leader: ValidatorId) -> Arc<Self> {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Arc::new(Self {
            config,
            leader,
            inboxes: committee
                .iter()
                .map(|id| (*id, Arc::new(Inbox::new())))
                .collect(),
            faults: Mutex::new(Faults {
                rng,
                cut: BTreeSet::new(),
            }),
            stats: Mutex::new(NetworkStats::default()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn leader(&self) -> ValidatorId {
        self.leader
    }

    /// Port for validator `id`.
    pub fn endpoint(self: &Arc<Self>, id: ValidatorId) -> Result<Arc<Endpoint>, NetworkError> {
        let inbox = self
            .inboxes
            .get(&id)
            .cloned()
            .ok_or(NetworkError::UnknownPeer(id))?;
        Ok(Arc::new(Endpoint {
            id,
            network: Arc::clone(self),
            inbox,
        }))
    }

    /// Cut every link between `a` and `b`.
    pub fn partition(&self, a: &[ValidatorId], b: &[ValidatorId]) {
        let mut faults = self.faults.lock();
        for x in a {
            for y in b {
                if x != y {
                    faults.cut.insert(link(*x, *y));
                }
            }
        }
    }

    /// Cut `id` off from everyone else.
    pub fn isolate(&self, id: ValidatorId) {
        let others: Vec<ValidatorId> = self.inboxes.keys().copied().filter(|v| *v != id).collect();
        self.partition(&[id], &others);
    }

    /// Restore all links.
    pub fn heal(&self) {
        self.faults.lock().cut.clear();
    }

    /// Refuse all further sends.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn stats(&self) -> NetworkStats {
        *self.stats.lock()
    }

    /// Whether every inbox is empty.
    pub fn is_idle(&self) -> bool {
        self.inboxes.values().all(|inbox| inbox.is_empty())
    }

    fn send(
        &self,
        from: ValidatorId,
        targets: &[ValidatorId],
        message: ConsensusMessage,
    ) -> Result<(), NetworkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(NetworkError::Closed);
        }
        let wire = if self.config.wire_roundtrip {
            Some(encode_message(&message)?)
        } else {
            None
        };
        self.stats.lock().sent += 1;

        for to in targets {
            let inbox = self.inboxes.get(to).ok_or(NetworkError::UnknownPeer(*to))?;
            let copies = self.copies(from, *to);
            if copies == 0 {
                trace!(from = from.0, to = to.0, kind = message.type_name(), "Dropped");
                continue;
            }
            for _ in 0..copies {
                let copy = match &wire {
                    Some(bytes) => decode_message(bytes)?,
                    None => message.clone(),
                };
                inbox.push(copy);
            }
        }
        Ok(())
    }

    /// How many copies of one delivery arrive.
    fn copies(&self, from: ValidatorId, to: ValidatorId) -> u32 {
        let mut faults = self.faults.lock();
        let mut stats = self.stats.lock();

        if from != to && faults.cut.contains(&link(from, to)) {
            stats.dropped += 1;
            return 0;
        }
        if self.config.packet_loss_rate > 0.0 && faults.rng.gen::<f64>() < self.config.packet_loss_rate {
            stats.dropped += 1;
            return 0;
        }
        stats.delivered += 1;
        if self.config.duplicate_rate > 0.0 && faults.rng.gen::<f64>() < self.config.duplicate_rate {
            stats.delivered += 1;
            stats.duplicated += 1;
            return 2;
        }
        1
    }
}

fn link(a: ValidatorId, b: ValidatorId) -> (ValidatorId, ValidatorId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl std::fmt::Debug for InMemoryNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryNetwork")
            .field("validators", &self.inboxes.len())
            .field("leader", &self.leader)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// One validator's port onto an [`InMemoryNetwork`].
pub struct Endpoint {
    id: ValidatorId,
    network: Arc<InMemoryNetwork>,
    inbox: Arc<Inbox>,
}

impl Endpoint {
    pub fn id(&self) -> ValidatorId {
        self.id
    }
}

impl NetworkPort for Endpoint {
    fn broadcast(&self, message: ConsensusMessage) -> Result<(), NetworkError> {
        let targets: Vec<ValidatorId> = self.network.inboxes.keys().copied().collect();
        self.network.send(self.id, &targets, message)
    }

    fn send_to_leader(&self, message: ConsensusMessage) -> Result<(), NetworkError> {
        self.network.send(self.id, &[self.network.leader], message)
    }

    fn inbox(&self) -> &Inbox {
        &self.inbox
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerbft_messages::MessageType;
    use ledgerbft_test_helpers::TestPeer;
    use ledgerbft_types::{BlockBuilder, BlockHeight, Hash};

    fn committee(n: u64) -> Vec<ValidatorId> {
        (0..n).map(ValidatorId).collect()
    }

    fn signed_echo() -> ConsensusMessage {
        let block = BlockBuilder::new(BlockHeight(1), Hash::ZERO).finalize();
        TestPeer::new(0).message(MessageType::Echo, &block, ConsensusMessage::ROUND_ECHO)
    }

    #[test]
    fn test_broadcast_reaches_everyone_over_the_wire() {
        let network = InMemoryNetwork::new(NetworkConfig::default(), &committee(3), ValidatorId(0));
        let endpoints: Vec<_> = committee(3)
            .into_iter()
            .map(|id| network.endpoint(id).unwrap())
            .collect();

        let message = signed_echo();
        endpoints[1].broadcast(message.clone()).unwrap();

        for endpoint in &endpoints {
            assert_eq!(endpoint.inbox().try_drain(), vec![message.clone()]);
        }
        assert_eq!(network.stats().delivered, 3);
    }

    #[test]
    fn test_send_to_leader() {
        let network = InMemoryNetwork::new(NetworkConfig::default(), &committee(3), ValidatorId(2));
        let sender = network.endpoint(ValidatorId(0)).unwrap();
        let leader = network.endpoint(ValidatorId(2)).unwrap();

        sender.send_to_leader(signed_echo()).unwrap();
        assert_eq!(leader.inbox().len(), 1);
        assert!(sender.inbox().is_empty());
    }

    #[test]
    fn test_isolation_and_heal() {
        let network = InMemoryNetwork::new(NetworkConfig::default(), &committee(3), ValidatorId(0));
        let a = network.endpoint(ValidatorId(0)).unwrap();
        let b = network.endpoint(ValidatorId(1)).unwrap();

        network.isolate(ValidatorId(0));
        a.broadcast(signed_echo()).unwrap();
        assert_eq!(a.inbox().len(), 1);
        assert!(b.inbox().is_empty());
        assert_eq!(network.stats().dropped, 2);

        network.heal();
        a.broadcast(signed_echo()).unwrap();
        assert_eq!(b.inbox().len(), 1);
    }

    #[test]
    fn test_full_duplication() {
        let config = NetworkConfig::default().with_duplicates(1.0);
        let network = InMemoryNetwork::new(config, &committee(2), ValidatorId(0));
        let a = network.endpoint(ValidatorId(0)).unwrap();
        a.broadcast(signed_echo()).unwrap();
        assert_eq!(a.inbox().len(), 2);
        assert_eq!(network.stats().duplicated, 2);
    }

    #[test]
    fn test_total_loss() {
        let config = NetworkConfig::default().with_packet_loss(1.0);
        let network = InMemoryNetwork::new(config, &committee(2), ValidatorId(0));
        let a = network.endpoint(ValidatorId(0)).unwrap();
        a.broadcast(signed_echo()).unwrap();
        assert!(network.is_idle());
    }

    #[test]
    fn test_closed_and_unknown() {
        let network = InMemoryNetwork::new(NetworkConfig::default(), &committee(2), ValidatorId(0));
        assert!(matches!(
            network.endpoint(ValidatorId(5)),
            Err(NetworkError::UnknownPeer(ValidatorId(5)))
        ));
        let a = network.endpoint(ValidatorId(0)).unwrap();
        network.close();
        assert!(matches!(a.broadcast(signed_echo()), Err(NetworkError::Closed)));
    }
}
