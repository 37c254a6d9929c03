//! Per-run vote bookkeeping.

use indexmap::IndexMap;
use ledgerbft_types::Hash;
use std::collections::HashSet;

/// Where a validator stands in the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    /// No authenticated SEND or ECHO seen yet.
    Waiting,
    /// Voting on at least one block.
    Voting,
    /// A block was delivered. Terminal.
    Delivered,
}

/// Tallies for one consensus run.
///
/// Counts are not deduplicated by sender: a duplicated ECHO or READY counts
/// twice. Iteration order is first-seen order, so the end-of-round step is
/// deterministic.
#[derive(Debug, Clone)]
pub struct RoundState {
    echo_counts: IndexMap<Hash, u64>,
    ready_counts: IndexMap<Hash, u64>,
    ready_sent: HashSet<Hash>,
    pending_send: Option<Hash>,
    voted_hash: Option<Hash>,
    phase: RoundPhase,
}

impl Default for RoundState {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundState {
    pub fn new() -> Self {
        Self {
            echo_counts: IndexMap::new(),
            ready_counts: IndexMap::new(),
            ready_sent: HashSet::new(),
            pending_send: None,
            voted_hash: None,
            phase: RoundPhase::Waiting,
        }
    }

    fn start_voting(&mut self) {
        if self.phase == RoundPhase::Waiting {
            self.phase = RoundPhase::Voting;
        }
    }

    /// A SEND for `hash` arrived. Replaces any earlier pending SEND.
    pub fn record_send(&mut self, hash: Hash) {
        self.pending_send = Some(hash);
        self.start_voting();
    }

    /// An ECHO for `hash` arrived. Returns the new count.
    pub fn record_echo(&mut self, hash: Hash) -> u64 {
        self.start_voting();
        let count = self.echo_counts.entry(hash).or_insert(0);
        *count += 1;
        *count
    }

    /// A READY for `hash` arrived. Returns the new count.
    pub fn record_ready(&mut self, hash: Hash) -> u64 {
        let count = self.ready_counts.entry(hash).or_insert(0);
        *count += 1;
        *count
    }

    /// Drop a SEND left over from an earlier batch.
    pub fn clear_pending_send(&mut self) {
        self.pending_send = None;
    }

    /// Take the SEND waiting to be echoed.
    pub fn take_pending_send(&mut self) -> Option<Hash> {
        self.pending_send.take()
    }

    pub fn pending_send(&self) -> Option<Hash> {
        self.pending_send
    }

    pub fn echo_count(&self, hash: &Hash) -> u64 {
        self.echo_counts.get(hash).copied().unwrap_or(0)
    }

    pub fn ready_count(&self, hash: &Hash) -> u64 {
        self.ready_counts.get(hash).copied().unwrap_or(0)
    }

    /// Hashes with at least `quorum` ECHOs, in first-seen order.
    pub fn echoes_reaching(&self, quorum: u64) -> Vec<Hash> {
        self.echo_counts
            .iter()
            .filter(|(_, count)| **count >= quorum)
            .map(|(hash, _)| *hash)
            .collect()
    }

    /// Snapshot of READY tallies, in first-seen order.
    pub fn ready_tallies(&self) -> Vec<(Hash, u64)> {
        self.ready_counts.iter().map(|(h, c)| (*h, *c)).collect()
    }

    /// Record that we sent READY for `hash`. Returns false if already sent.
    pub fn mark_ready_sent(&mut self, hash: Hash) -> bool {
        self.ready_sent.insert(hash)
    }

    pub fn ready_sent(&self, hash: &Hash) -> bool {
        self.ready_sent.contains(hash)
    }

    /// Deliver `hash`: record the vote and drop its counters.
    pub fn deliver(&mut self, hash: Hash) {
        self.voted_hash = Some(hash);
        self.phase = RoundPhase::Delivered;
        self.echo_counts.shift_remove(&hash);
        self.ready_counts.shift_remove(&hash);
    }

    pub fn voted_hash(&self) -> Option<Hash> {
        self.voted_hash
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn is_delivered(&self) -> bool {
        self.phase == RoundPhase::Delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_transitions() {
        let mut round = RoundState::new();
        let hash = Hash::from_bytes(b"block");
        assert_eq!(round.phase(), RoundPhase::Waiting);

        round.record_ready(hash);
        assert_eq!(round.phase(), RoundPhase::Waiting);

        round.record_echo(hash);
        assert_eq!(round.phase(), RoundPhase::Voting);

        round.deliver(hash);
        assert!(round.is_delivered());
        assert_eq!(round.voted_hash(), Some(hash));
        assert_eq!(round.echo_count(&hash), 0);
        assert_eq!(round.ready_count(&hash), 0);
    }

    #[test]
    fn test_later_send_supersedes() {
        let mut round = RoundState::new();
        round.record_send(Hash::from_bytes(b"a"));
        round.record_send(Hash::from_bytes(b"b"));
        assert_eq!(round.take_pending_send(), Some(Hash::from_bytes(b"b")));
        assert_eq!(round.pending_send(), None);
    }

    #[test]
    fn test_ready_sent_once() {
        let mut round = RoundState::new();
        let hash = Hash::from_bytes(b"block");
        assert!(round.mark_ready_sent(hash));
        assert!(!round.mark_ready_sent(hash));
        assert!(round.ready_sent(&hash));
    }

    #[test]
    fn test_duplicates_count_twice() {
        let mut round = RoundState::new();
        let hash = Hash::from_bytes(b"block");
        round.record_echo(hash);
        assert_eq!(round.record_echo(hash), 2);
        assert_eq!(round.echoes_reaching(2), vec![hash]);
        assert!(round.echoes_reaching(3).is_empty());
    }
}
