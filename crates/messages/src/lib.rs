//! Network messages for the consensus protocol.
//!
//! Validators exchange a single envelope type, [`ConsensusMessage`], tagged
//! with the Bracha phase it belongs to. [`codec`] turns envelopes into wire
//! bytes and back.

pub mod codec;
mod consensus;

pub use codec::{decode_message, encode_message, CodecError};
pub use consensus::{ConsensusMessage, MessageType};
