//! Outputs of the consensus state machine.

use ledgerbft_messages::ConsensusMessage;
use ledgerbft_types::{BlockHeight, Hash};

/// Something the runner must do after a batch has been processed.
///
/// The state machine never performs I/O itself. It returns actions, and the
/// runner executes them once the round-state lock has been released.
#[derive(Debug, Clone)]
pub enum Action {
    /// Send a message to every validator, including ourselves.
    Broadcast { message: ConsensusMessage },

    /// Send a message to the designated leader only.
    SendToLeader { message: ConsensusMessage },

    /// A block was delivered. The run is over for this validator.
    Delivered { block_hash: Hash, height: BlockHeight },
}

impl Action {
    /// Get a human-readable name for this action.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Broadcast { .. } => "Broadcast",
            Action::SendToLeader { .. } => "SendToLeader",
            Action::Delivered { .. } => "Delivered",
        }
    }

    /// The outbound message, if this action sends one.
    pub fn message(&self) -> Option<&ConsensusMessage> {
        match self {
            Action::Broadcast { message } | Action::SendToLeader { message } => Some(message),
            Action::Delivered { .. } => None,
        }
    }

    /// Mutable access to the outbound message, if any.
    pub fn message_mut(&mut self) -> Option<&mut ConsensusMessage> {
        match self {
            Action::Broadcast { message } | Action::SendToLeader { message } => Some(message),
            Action::Delivered { .. } => None,
        }
    }

    /// Check if this action puts a message on the network.
    pub fn is_send(&self) -> bool {
        self.message().is_some()
    }
}
