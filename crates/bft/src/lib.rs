//! Bracha reliable-broadcast consensus state machine.
//!
//! This crate provides a synchronous implementation of Bracha's protocol
//! that agrees on one block per run.
//!
//! # Architecture
//!
//! The state machine processes batches of messages synchronously:
//!
//! - `SEND` from the proposer → remembered, echoed at the end of the batch
//! - `ECHO` → counted; at `⌊(n+f+1)/2⌋` we send `READY`
//! - `READY` → counted; at `f+1` we amplify with our own `READY`, above
//!   `2f+1` the block is delivered
//!
//! Every inbound message is authenticated against the sender's forward key
//! chain and every block is checked against the local UTXO set before it is
//! counted. All I/O is performed by the runner via returned `Action`s.

mod config;
mod role;
mod round;
mod state;

pub use config::BrachaConfig;
pub use role::{ByzantineBehavior, Role, UnknownBehavior};
pub use round::{RoundPhase, RoundState};
pub use state::{BftError, BrachaState};
