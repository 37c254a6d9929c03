//! Transaction pool for the block proposer.
//!
//! The pool admits signed transactions from wallets, assembles blocks from
//! them and keeps the local UTXO view in step with delivered blocks.
//!
//! ```text
//! wallet ──► on_transaction ──► queue ──► build_block ──► proposer
//!                                                            │
//!            apply_block ◄── delivered block ◄── consensus ◄─┘
//! ```
//!
//! Wallets sign with a forward key chain, just like validators: each
//! transaction discloses the key its sender will sign the next one with. The
//! pool checks every signature against the key disclosed last time, and
//! trusts a wallet's first transaction.

mod config;
mod pool;

pub use config::MempoolConfig;
pub use pool::{MempoolError, TransactionPool};
