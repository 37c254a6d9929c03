//! Digests that one-time signatures are computed over.
//!
//! A one-time signature covers exactly [`MESSAGE_BYTES`](crate::MESSAGE_BYTES)
//! bytes, so every signed object is first reduced to a single [`Hash`] that
//! also commits to the signer's disclosed next public key.
//!
//! | Digest | Format |
//! |--------|--------|
//! | block | `header_id` ‖ `validator_id` ‖ `next_public_key`? |
//! | transaction | `ledger_tx:` ‖ `tx_digest` ‖ `next_public_key`? |

use crate::{Hash, OneTimePublicKey, ValidatorId};

/// Domain tag for wallet transaction signatures.
pub const DOMAIN_TRANSACTION: &[u8] = b"ledger_tx:";

fn push_key<'a>(parts: &mut Vec<&'a [u8]>, key: Option<&'a OneTimePublicKey>) {
    if let Some(key) = key {
        parts.extend(key.components().map(|h| h.as_bytes().as_slice()));
    }
}

/// Digest a validator signs when sealing a block.
pub fn block_signing_digest(
    header_id: &Hash,
    validator_id: ValidatorId,
    next_public_key: Option<&OneTimePublicKey>,
) -> Hash {
    let validator = validator_id.to_le_bytes();
    let mut parts: Vec<&[u8]> = Vec::with_capacity(2 + 2 * crate::KEY_BITS);
    parts.push(header_id.as_bytes());
    parts.push(&validator);
    push_key(&mut parts, next_public_key);
    Hash::from_parts(&parts)
}

/// Digest a wallet signs when authorizing a transaction.
pub fn transaction_signing_digest(
    tx_digest: &Hash,
    next_public_key: Option<&OneTimePublicKey>,
) -> Hash {
    let mut parts: Vec<&[u8]> = Vec::with_capacity(2 + 2 * crate::KEY_BITS);
    parts.push(DOMAIN_TRANSACTION);
    parts.push(tx_digest.as_bytes());
    push_key(&mut parts, next_public_key);
    Hash::from_parts(&parts)
}
