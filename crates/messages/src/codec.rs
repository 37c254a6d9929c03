//! Message encoding and decoding for network transport.
//!
//! # Wire Format
//!
//! Envelopes are bincode-encoded then LZ4-compressed, with the uncompressed
//! length prepended by `lz4_flex`:
//!
//! ```text
//! [u32 LE uncompressed length][LZ4 compressed bincode payload]
//! ```
//!
//! One-time keys and signatures are length-checked while decoding, so a
//! decoded message never carries a malformed key.

use crate::ConsensusMessage;
use thiserror::Error;

/// Errors that can occur during message encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Message too short")]
    MessageTooShort,

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Decompression error: {0}")]
    Decompress(String),

    #[error("Trailing bytes after message: {0}")]
    TrailingBytes(usize),
}

fn config() -> bincode::config::Configuration {
    bincode::config::standard()
}

/// Encode a message to wire format.
pub fn encode_message(message: &ConsensusMessage) -> Result<Vec<u8>, CodecError> {
    let payload = bincode::serde::encode_to_vec(message, config())
        .map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(lz4_flex::compress_prepend_size(&payload))
}

/// Decode a message from wire format.
pub fn decode_message(data: &[u8]) -> Result<ConsensusMessage, CodecError> {
    if data.len() < 4 {
        return Err(CodecError::MessageTooShort);
    }

    let payload = lz4_flex::decompress_size_prepended(data)
        .map_err(|e| CodecError::Decompress(e.to_string()))?;

    let (message, read): (ConsensusMessage, usize) =
        bincode::serde::decode_from_slice(&payload, config())
            .map_err(|e| CodecError::Decode(e.to_string()))?;

    if read != payload.len() {
        return Err(CodecError::TrailingBytes(payload.len() - read));
    }

    Ok(message)
}
