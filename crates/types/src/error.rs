//! Ledger verification errors.

use crate::{Hash, Input, SignatureError, TxId, WalletId};

/// Reasons a transaction or block fails ledger rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Coinbase transaction {0} must not have outputs")]
    CoinbaseWithOutputs(TxId),

    #[error("Input {input:?} of {tx_id} is not in the unspent set")]
    UnknownInput { tx_id: TxId, input: Input },

    #[error("{tx_id} spends {inputs} but pays out {outputs}")]
    ValueMismatch {
        tx_id: TxId,
        inputs: u64,
        outputs: u64,
    },

    #[error("Value overflow in {0}")]
    ValueOverflow(TxId),

    #[error("Output of {tx_id} pays unknown receiver {receiver}")]
    UnknownReceiver { tx_id: TxId, receiver: WalletId },

    #[error("Input {input:?} is spent twice in the same block")]
    DuplicateInput { input: Input },

    #[error("Merkle root mismatch: header has {header:?}, transactions give {computed:?}")]
    MerkleMismatch {
        header: Option<Hash>,
        computed: Option<Hash>,
    },

    #[error("Signing failed: {0}")]
    Signature(#[from] SignatureError),
}
