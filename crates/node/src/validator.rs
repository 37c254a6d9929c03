//! Dedicated worker thread driving one validator's state machine.

use crate::NetworkSettings;
use ledgerbft_bft::{BftError, BrachaState, Role, RoundPhase};
use ledgerbft_core::{Action, NetworkError, NetworkPort, RunFlag, StateMachine};
use ledgerbft_types::{
    Block, ForwardSigner, Hash, SignatureError, UtxoSet, ValidatorId, WalletId,
};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Errors from running a validator.
#[derive(Debug, thiserror::Error)]
pub enum ValidatorError {
    #[error("Failed to spawn worker for {id}: {source}")]
    Spawn {
        id: ValidatorId,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is not configured")]
    UnknownValidator(ValidatorId),

    #[error("Worker of {0} panicked")]
    WorkerPanicked(ValidatorId),

    #[error(transparent)]
    Consensus(#[from] BftError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("Key generation failed: {0}")]
    Signature(#[from] SignatureError),
}

/// Builds a validator and starts its worker.
pub struct Validator<N> {
    state: BrachaState,
    network: Arc<N>,
    send_delay: Option<Duration>,
}

impl<N: NetworkPort + 'static> Validator<N> {
    /// Wrap an existing state machine.
    pub fn new(state: BrachaState, network: Arc<N>) -> Self {
        let send_delay = state.role().behavior().send_delay();
        Self {
            state,
            network,
            send_delay,
        }
    }

    /// Build validator `id` of a deployment with a fresh key chain.
    pub fn from_settings(
        settings: &NetworkSettings,
        id: ValidatorId,
        network: Arc<N>,
    ) -> Result<Self, ValidatorError> {
        if settings.validator(id).is_none() {
            return Err(ValidatorError::UnknownValidator(id));
        }
        let role = settings.role_of(id);
        let state = BrachaState::new(
            id,
            role,
            settings.bracha_config(),
            settings.committee(),
            ForwardSigner::new()?,
        );
        let validator = Self::new(state, network);
        let send_delay = role.behavior().send_delay().map(|_| settings.fault_delay());
        Ok(validator.with_send_delay(send_delay))
    }

    /// Override how long outbound batches are held. `None` sends immediately.
    pub fn with_send_delay(mut self, send_delay: Option<Duration>) -> Self {
        self.send_delay = send_delay;
        self
    }

    /// Start the worker thread.
    pub fn spawn(self) -> Result<ValidatorHandle<N>, ValidatorError> {
        let id = self.state.validator_id();
        let role = self.state.role();
        let state = Arc::new(Mutex::new(self.state));
        let outbound = Arc::new(Mutex::new(()));
        let flag = RunFlag::new();

        let worker = Worker {
            id,
            state: Arc::clone(&state),
            outbound: Arc::clone(&outbound),
            network: Arc::clone(&self.network),
            flag: flag.clone(),
            send_delay: self.send_delay,
        };
        let thread = thread::Builder::new()
            .name(format!("validator-{}", id.0))
            .spawn(move || worker.run())
            .map_err(|source| ValidatorError::Spawn { id, source })?;

        info!(validator = id.0, role = %role, "Validator started");
        Ok(ValidatorHandle {
            id,
            role,
            state,
            outbound,
            network: self.network,
            flag,
            send_delay: self.send_delay,
            thread: Some(thread),
        })
    }
}

struct Worker<N> {
    id: ValidatorId,
    state: Arc<Mutex<BrachaState>>,
    outbound: Arc<Mutex<()>>,
    network: Arc<N>,
    flag: RunFlag,
    send_delay: Option<Duration>,
}

impl<N: NetworkPort> Worker<N> {
    fn run(self) {
        while self.flag.is_running() {
            let batch = self.network.inbox().wait_drain(&self.flag);
            if batch.is_empty() {
                continue;
            }
            trace!(validator = self.id.0, messages = batch.len(), "Drained batch");

            let _sending = self.outbound.lock();
            let actions = self.state.lock().handle_batch(batch);
            execute(self.id, self.network.as_ref(), actions, self.send_delay);
        }
        debug!(validator = self.id.0, "Worker stopped");
    }
}

/// Perform actions outside the state lock.
fn execute<N: NetworkPort + ?Sized>(
    id: ValidatorId,
    network: &N,
    actions: Vec<Action>,
    send_delay: Option<Duration>,
) {
    if let Some(delay) = send_delay {
        if actions.iter().any(Action::is_send) {
            thread::sleep(delay);
        }
    }

    for action in actions {
        let kind = action.type_name();
        let result = match action {
            Action::Broadcast { message } => network.broadcast(message),
            Action::SendToLeader { message } => network.send_to_leader(message),
            Action::Delivered { block_hash, height } => {
                debug!(validator = id.0, block = %block_hash.short(), height = height.0, "Run finished");
                Ok(())
            }
        };
        if let Err(e) = result {
            warn!(validator = id.0, action = kind, error = %e, "Failed to send");
        }
    }
}

/// Control of a running validator.
///
/// Dropping the handle stops the worker and joins it.
pub struct ValidatorHandle<N: NetworkPort> {
    id: ValidatorId,
    role: Role,
    state: Arc<Mutex<BrachaState>>,
    /// Held from signing until the signed messages are sent, so peers see one
    /// validator's messages in key-chain order. Always taken before `state`.
    outbound: Arc<Mutex<()>>,
    network: Arc<N>,
    flag: RunFlag,
    send_delay: Option<Duration>,
    thread: Option<JoinHandle<()>>,
}

impl<N: NetworkPort> ValidatorHandle<N> {
    pub fn id(&self) -> ValidatorId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn network(&self) -> &Arc<N> {
        &self.network
    }

    /// Reset the engine for a new run against the given ledger view.
    pub fn start_run(&self, utxos: UtxoSet, known_receivers: BTreeSet<WalletId>) {
        self.state.lock().start_run(utxos, known_receivers);
    }

    /// Propose `block` and broadcast the SEND.
    pub fn propose(&self, block: Block) -> Result<(), ValidatorError> {
        let _sending = self.outbound.lock();
        let actions = self.state.lock().propose(block)?;
        execute(self.id, self.network.as_ref(), actions, self.send_delay);
        Ok(())
    }

    pub fn voted_hash(&self) -> Option<Hash> {
        self.state.lock().voted_hash()
    }

    pub fn phase(&self) -> RoundPhase {
        self.state.lock().phase()
    }

    pub fn is_delivered(&self) -> bool {
        self.state.lock().is_delivered()
    }

    /// Whether the worker has nothing left to do this run.
    pub fn is_finished(&self) -> bool {
        self.state.lock().is_finished()
    }

    /// Delivered blocks, leaving them in place.
    pub fn delivered_blocks(&self) -> Vec<Block> {
        self.state.lock().delivered_blocks()
    }

    pub fn take_delivered_blocks(&self) -> Vec<Block> {
        self.state.lock().take_delivered_blocks()
    }

    /// Run `f` with the engine locked.
    pub fn with_state<R>(&self, f: impl FnOnce(&BrachaState) -> R) -> R {
        f(&*self.state.lock())
    }

    pub fn is_running(&self) -> bool {
        self.flag.is_running()
    }

    /// Ask the worker to stop after its current batch.
    pub fn stop(&self) {
        self.flag.stop();
        self.network.inbox().interrupt();
    }

    /// Stop the worker and wait for it to exit.
    pub fn join(mut self) -> Result<(), ValidatorError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), ValidatorError> {
        self.stop();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| ValidatorError::WorkerPanicked(self.id)),
            None => Ok(()),
        }
    }
}

impl<N: NetworkPort> Drop for ValidatorHandle<N> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(validator = self.id.0, error = %e, "Validator did not shut down cleanly");
        }
    }
}

impl<N: NetworkPort> std::fmt::Debug for ValidatorHandle<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorHandle")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("running", &self.flag.is_running())
            .finish_non_exhaustive()
    }
}
