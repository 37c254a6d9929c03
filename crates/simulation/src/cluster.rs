//! A committee of threaded validators on one in-memory network.

use crate::{Endpoint, InMemoryNetwork, NetworkConfig};
use ledgerbft_core::NetworkError;
use ledgerbft_mempool::{MempoolError, TransactionPool};
use ledgerbft_node::{NetworkSettings, SettingsError, Validator, ValidatorError, ValidatorHandle};
use ledgerbft_types::{Block, BlockBuilder, BlockHeight, Hash, Transaction, ValidatorId};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

/// How often delivery is polled.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Errors driving a cluster.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Validator(#[from] ValidatorError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("Height {height}: only {delivered} of {expected} honest validators delivered in time")]
    Timeout {
        height: BlockHeight,
        delivered: usize,
        expected: usize,
    },

    #[error("Height {height}: validators delivered different blocks")]
    Disagreement { height: BlockHeight },
}

/// What one consensus run produced.
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    /// The proposed and delivered block, with the signatures the leader
    /// collected for it.
    pub block: Block,
    /// Voted hash of every validator, in committee order.
    pub votes: Vec<(ValidatorId, Option<Hash>)>,
    /// Time from proposal to the last honest delivery.
    pub elapsed: Duration,
}

impl RoundOutcome {
    /// Validators that delivered the proposed block.
    pub fn agreeing(&self) -> usize {
        let id = self.block.id();
        self.votes.iter().filter(|(_, v)| *v == Some(id)).count()
    }
}

/// A full committee plus the leader's transaction pool.
///
/// Every validator runs on its own thread. The leader's pool is the ledger
/// view every validator is started with at each height.
pub struct Cluster {
    settings: NetworkSettings,
    network: Arc<InMemoryNetwork>,
    validators: Vec<ValidatorHandle<Endpoint>>,
    pool: TransactionPool,
    height: BlockHeight,
    prev_digest: Hash,
}

impl Cluster {
    /// Validate `settings`, fund the wallets and start every validator.
    pub fn start(settings: NetworkSettings, config: NetworkConfig) -> Result<Self, ClusterError> {
        settings.validate()?;

        let committee = settings.committee();
        let network = InMemoryNetwork::new(config, &committee, settings.leader_id());

        let mut validators = Vec::with_capacity(committee.len());
        for id in &committee {
            let endpoint = network.endpoint(*id)?;
            validators.push(Validator::from_settings(&settings, *id, endpoint)?.spawn()?);
        }

        let mut pool = TransactionPool::new(settings.mempool.clone(), settings.wallet_ids());
        pool.initialize_coins(settings.initial_coins);

        info!(
            validators = committee.len(),
            max_faulty = settings.max_faulty(),
            faulty = settings.num_faulty_validators(),
            "Cluster started"
        );

        Ok(Self {
            settings,
            network,
            validators,
            pool,
            height: BlockHeight(1),
            prev_digest: Hash::ZERO,
        })
    }

    pub fn settings(&self) -> &NetworkSettings {
        &self.settings
    }

    pub fn network(&self) -> &InMemoryNetwork {
        &self.network
    }

    pub fn validators(&self) -> &[ValidatorHandle<Endpoint>] {
        &self.validators
    }

    pub fn validator(&self, id: ValidatorId) -> Option<&ValidatorHandle<Endpoint>> {
        self.validators.iter().find(|v| v.id() == id)
    }

    pub fn pool(&self) -> &TransactionPool {
        &self.pool
    }

    /// Height the next run agrees on.
    pub fn height(&self) -> BlockHeight {
        self.height
    }

    /// Digest the next block builds on.
    pub fn prev_digest(&self) -> Hash {
        self.prev_digest
    }

    /// Offer a transaction to the leader's pool.
    pub fn submit(&mut self, tx: Transaction) -> Result<(), MempoolError> {
        self.pool.on_transaction(tx)
    }

    /// Build the next block from the pool, or an empty one if nothing is
    /// queued.
    pub fn next_block(&mut self) -> Block {
        self.pool
            .build_block(self.height, self.prev_digest)
            .unwrap_or_else(|| BlockBuilder::new(self.height, self.prev_digest).finalize())
    }

    /// Run consensus on `block` at the current height.
    ///
    /// Waits until every participating validator has delivered, or until
    /// `timeout`. Timing out is only an error when an honest validator has
    /// not delivered. On success the block is applied to the pool and the
    /// height advances.
    pub fn run_round(&mut self, block: Block, timeout: Duration) -> Result<RoundOutcome, ClusterError> {
        self.settle(timeout);

        let utxos = self.pool.utxos().clone();
        let receivers = self.pool.known_receivers().clone();
        for validator in &self.validators {
            validator.start_run(utxos.clone(), receivers.clone());
        }

        let height = self.height;
        let started = Instant::now();
        self.leader()?.propose(block.clone())?;

        let participating: Vec<&ValidatorHandle<Endpoint>> = self
            .validators
            .iter()
            .filter(|v| v.role().participates())
            .collect();
        let deadline = started + timeout;
        while Instant::now() < deadline && !participating.iter().all(|v| v.is_delivered()) {
            thread::sleep(POLL_INTERVAL);
        }
        let elapsed = started.elapsed();

        let honest: Vec<&ValidatorHandle<Endpoint>> = self
            .validators
            .iter()
            .filter(|v| v.role().behavior().is_empty())
            .collect();
        let delivered = honest.iter().filter(|v| v.is_delivered()).count();
        if delivered < honest.len() {
            return Err(ClusterError::Timeout {
                height,
                delivered,
                expected: honest.len(),
            });
        }

        let votes: Vec<(ValidatorId, Option<Hash>)> = self
            .validators
            .iter()
            .map(|v| (v.id(), v.voted_hash()))
            .collect();
        let expected = block.id();
        if honest.iter().any(|v| v.voted_hash() != Some(expected)) {
            return Err(ClusterError::Disagreement { height });
        }

        let delivered_block = self.leader()?.take_delivered_blocks().pop().unwrap_or(block);
        for validator in &self.validators {
            validator.take_delivered_blocks();
        }

        self.pool.apply_block(&delivered_block);
        self.prev_digest = expected;
        self.height = height.next();

        info!(
            height = height.0,
            block = %expected.short(),
            transactions = delivered_block.transactions().len(),
            signatures = delivered_block.validator_signatures().len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Round complete"
        );

        Ok(RoundOutcome {
            block: delivered_block,
            votes,
            elapsed,
        })
    }

    /// Build the next block and run consensus on it.
    pub fn run_next(&mut self, timeout: Duration) -> Result<RoundOutcome, ClusterError> {
        let block = self.next_block();
        self.run_round(block, timeout)
    }

    /// Stop every validator and wait for their threads.
    pub fn shutdown(self) -> Result<(), ClusterError> {
        self.network.close();
        for validator in self.validators {
            validator.join()?;
        }
        Ok(())
    }

    fn leader(&self) -> Result<&ValidatorHandle<Endpoint>, ClusterError> {
        let id = self.settings.leader_id();
        self.validator(id)
            .ok_or(ClusterError::Validator(ValidatorError::UnknownValidator(id)))
    }

    /// Wait for in-flight messages of the previous run to drain.
    fn settle(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        let mut quiet_polls = 0;
        while quiet_polls < 3 && Instant::now() < deadline {
            if self.network.is_idle() {
                quiet_polls += 1;
            } else {
                quiet_polls = 0;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("validators", &self.validators.len())
            .field("height", &self.height)
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}
