//! Validator runtime.
//!
//! This crate turns a [`BrachaState`](ledgerbft_bft::BrachaState) into a
//! running validator: a dedicated thread blocks on the transport's inbox,
//! drains batches, runs them through the state machine under a single lock
//! and performs the resulting sends once the lock is released.
//!
//! Deployments are described by [`NetworkSettings`], loaded from TOML.

mod settings;
mod validator;

pub use settings::{NetworkSettings, SettingsError, ValidatorSettings};
pub use validator::{Validator, ValidatorError, ValidatorHandle};
