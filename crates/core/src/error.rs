//! Transport errors.

use ledgerbft_messages::CodecError;
use ledgerbft_types::ValidatorId;

/// Errors a [`NetworkPort`](crate::NetworkPort) can report.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Unknown peer {0}")]
    UnknownPeer(ValidatorId),

    #[error("Network has shut down")]
    Closed,

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}
