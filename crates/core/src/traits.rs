//! Seams between the consensus state machine, the runner and the transport.

use crate::{Action, Inbox, NetworkError};
use ledgerbft_messages::ConsensusMessage;

/// A state machine that consumes batches of inbound messages.
///
/// - **Synchronous**: no blocking, no I/O
/// - **Batch-driven**: the end-of-round step runs once per drained batch
///
/// All sending is performed by the runner via the returned actions.
pub trait StateMachine {
    /// Process a drained batch and run the end-of-round step.
    fn handle_batch(&mut self, batch: Vec<ConsensusMessage>) -> Vec<Action>;

    /// Whether the current run has finished and the runner may stop.
    fn is_finished(&self) -> bool;
}

/// Opaque message transport used by a validator.
///
/// Delivery is FIFO per sender and at least once. Duplicates reach the inbox
/// unchanged.
pub trait NetworkPort: Send + Sync {
    /// Fan a message out to every validator, including the sender.
    fn broadcast(&self, message: ConsensusMessage) -> Result<(), NetworkError>;

    /// Send a message to the designated leader only.
    fn send_to_leader(&self, message: ConsensusMessage) -> Result<(), NetworkError>;

    /// Inbound queue of this validator.
    fn inbox(&self) -> &Inbox;
}
