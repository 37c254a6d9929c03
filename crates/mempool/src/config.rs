//! Configuration for the transaction pool.

use serde::{Deserialize, Serialize};

/// Limits applied when assembling blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MempoolConfig {
    /// Maximum transactions placed in one block.
    ///
    /// Transactions beyond the limit stay queued for the next block.
    pub max_block_transactions: usize,

    /// Maximum queued transactions. Admission fails when full.
    pub max_pending: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_block_transactions: 256,
            max_pending: 4096,
        }
    }
}

impl MempoolConfig {
    /// Set the per-block transaction limit.
    pub fn with_max_block_transactions(mut self, max_block_transactions: usize) -> Self {
        self.max_block_transactions = max_block_transactions;
        self
    }

    /// Set the queue limit.
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }
}
