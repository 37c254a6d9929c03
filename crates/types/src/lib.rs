//! Core types for the Bracha block-agreement engine.
//!
//! This crate holds everything a vote depends on besides the protocol itself:
//!
//! - [`Hash`] and the identifier newtypes
//! - One-time signatures ([`OneTimeKeyPair`]) and forward key chains
//!   ([`ForwardSigner`], [`KeyChain`])
//! - The ledger model: [`Transaction`], [`UtxoSet`], [`Header`],
//!   [`BlockBuilder`] and [`Block`]

mod block;
mod crypto;
mod error;
mod hash;
mod identifiers;
mod key_chain;
pub mod merkle;
pub mod signing;
mod transaction;
mod utxo;

pub use block::{Block, BlockBuilder, BlockSignature, Header, ValidatorSeal};
pub use crypto::{
    verify, OneTimeKeyPair, OneTimePrivateKey, OneTimePublicKey, OneTimeSignature, Preimage,
    SignatureError, Verification, KEY_BITS, MESSAGE_BYTES,
};
pub use error::LedgerError;
pub use hash::Hash;
pub use identifiers::{BlockHeight, TxId, ValidatorId, WalletId};
pub use key_chain::{ChainCheck, ForwardSigner, KeyChain};
pub use transaction::Transaction;
pub use utxo::{Input, Output, Utxo, UtxoSet};
