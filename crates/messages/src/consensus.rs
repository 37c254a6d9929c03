//! The Bracha message envelope.

use ledgerbft_types::{Block, Hash, ValidatorId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase of reliable broadcast a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Initial proposal from the leader.
    Send,
    /// Acknowledgement of a proposal.
    Echo,
    /// Commitment to deliver once enough peers agree.
    Ready,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::Send => "SEND",
            MessageType::Echo => "ECHO",
            MessageType::Ready => "READY",
        };
        f.write_str(name)
    }
}

/// A signed block travelling through one phase of the protocol.
///
/// The block carries the sender's seal: its one-time signature and the key it
/// will use next. `sender_id` is the envelope's claimed origin; the seal's
/// validator ID is what signatures are checked against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusMessage {
    pub message_type: MessageType,
    pub block: Block,
    pub sender_id: ValidatorId,
    pub round: u16,
}

impl ConsensusMessage {
    /// Round tag of a leader's proposal.
    pub const ROUND_SEND: u16 = 0;
    /// Round tag of an ECHO answering a proposal.
    pub const ROUND_ECHO: u16 = 1;
    /// Round tag of a READY triggered by an echo quorum.
    pub const ROUND_READY_FROM_ECHO: u16 = 2;
    /// Round tag of a READY amplified from other READYs.
    pub const ROUND_READY_FROM_READY: u16 = 3;

    pub fn new(
        message_type: MessageType,
        block: Block,
        sender_id: ValidatorId,
        round: u16,
    ) -> Self {
        Self {
            message_type,
            block,
            sender_id,
            round,
        }
    }

    /// Header ID of the carried block.
    pub fn block_hash(&self) -> Hash {
        self.block.id()
    }

    /// Get a human-readable name for this message type.
    pub fn type_name(&self) -> &'static str {
        match self.message_type {
            MessageType::Send => "Send",
            MessageType::Echo => "Echo",
            MessageType::Ready => "Ready",
        }
    }
}
