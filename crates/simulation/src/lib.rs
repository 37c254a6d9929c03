//! In-process cluster runner.
//!
//! Runs a whole committee inside one process: every validator gets its own
//! worker thread and an [`Endpoint`] on a shared [`InMemoryNetwork`]. The
//! [`Cluster`] harness owns the leader's transaction pool, builds a block per
//! height, has the leader propose it and waits for the honest validators to
//! deliver.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        Cluster                           │
//! │                                                          │
//! │  TransactionPool ──build_block──► leader.propose(block)  │
//! │                                                          │
//! │  ┌────────────┐  ┌────────────┐        ┌────────────┐    │
//! │  │ validator 0│  │ validator 1│  ...   │ validator n│    │
//! │  │  (thread)  │  │  (thread)  │        │  (thread)  │    │
//! │  └─────┬──────┘  └─────┬──────┘        └─────┬──────┘    │
//! │        │ Endpoint      │ Endpoint            │ Endpoint  │
//! │        ▼               ▼                     ▼           │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │  InMemoryNetwork                                   │  │
//! │  │  wire round-trip, loss, duplication, partitions    │  │
//! │  └────────────────────────────────────────────────────┘  │
//! │                                                          │
//! │  all honest delivered ──apply_block──► TransactionPool   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Loss and duplication decisions come from a seeded ChaCha RNG. Thread
//! scheduling is not deterministic, so runs agree on outcomes, not on
//! message interleavings.

mod cluster;
mod network;
mod workload;

pub use cluster::{Cluster, ClusterError, RoundOutcome};
pub use network::{Endpoint, InMemoryNetwork, NetworkConfig, NetworkStats};
pub use workload::{TransferWorkload, Wallet, WalletPool};
