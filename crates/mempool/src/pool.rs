//! Admission, block assembly and UTXO application.

use crate::MempoolConfig;
use ledgerbft_types::{
    Block, BlockBuilder, BlockHeight, Hash, Input, KeyChain, LedgerError, Transaction, TxId,
    Utxo, UtxoSet, WalletId,
};
use std::collections::{BTreeSet, VecDeque};
use tracing::{debug, info, warn};

/// Reasons a transaction is refused by the pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MempoolError {
    #[error("{0} carries no sender signature")]
    Unsigned(TxId),

    #[error("Signature of {tx_id} does not match the key chain of {wallet}")]
    BadSignature { tx_id: TxId, wallet: WalletId },

    #[error("{tx_id} spends {input:?}, which {sender} does not own")]
    NotOwner {
        tx_id: TxId,
        sender: WalletId,
        input: Input,
    },

    #[error("{0} is already in use by an unspent output or a queued transaction")]
    DuplicateTxId(TxId),

    #[error("Pool is full ({0} pending)")]
    PoolFull(usize),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Queue of admitted transactions plus the local UTXO view they are
/// checked against.
///
/// The view only changes through [`TransactionPool::initialize_coins`] and
/// [`TransactionPool::apply_block`], so queued transactions may conflict with
/// each other. Conflicts are resolved when a block is built.
#[derive(Debug)]
pub struct TransactionPool {
    config: MempoolConfig,
    utxos: UtxoSet,
    known_receivers: BTreeSet<WalletId>,
    wallet_keys: KeyChain<WalletId>,
    pending: VecDeque<Transaction>,
}

impl TransactionPool {
    /// Create an empty pool for the given wallets.
    pub fn new(config: MempoolConfig, wallets: impl IntoIterator<Item = WalletId>) -> Self {
        Self {
            config,
            utxos: UtxoSet::new(),
            known_receivers: wallets.into_iter().collect(),
            wallet_keys: KeyChain::new(),
            pending: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &MempoolConfig {
        &self.config
    }

    pub fn utxos(&self) -> &UtxoSet {
        &self.utxos
    }

    pub fn known_receivers(&self) -> &BTreeSet<WalletId> {
        &self.known_receivers
    }

    pub fn balance_of(&self, wallet: WalletId) -> u64 {
        self.utxos.balance_of(wallet)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Fund every known wallet with one genesis output of `coins`.
    ///
    /// Wallets are funded in ID order by transactions numbered from zero, so
    /// the `i`-th wallet owns `(TxId(i), 0)`.
    pub fn initialize_coins(&mut self, coins: u64) {
        let wallets: Vec<WalletId> = self.known_receivers.iter().copied().collect();
        for utxo in UtxoSet::genesis(&wallets, coins).iter() {
            self.utxos.add(utxo);
        }
        info!(wallets = wallets.len(), coins, "Initialized coins");
    }

    /// Admit a signed transaction.
    ///
    /// The sender's chain advances even when the transaction is refused for
    /// any reason after the signature check.
    pub fn on_transaction(&mut self, tx: Transaction) -> Result<(), MempoolError> {
        if self.pending.len() >= self.config.max_pending {
            return Err(MempoolError::PoolFull(self.pending.len()));
        }

        let Some(signature) = tx.sender_signature.as_ref() else {
            return Err(MempoolError::Unsigned(tx.tx_id));
        };
        let digest = tx.signing_digest();
        let check = self.wallet_keys.check_and_advance(
            tx.sender,
            digest.as_bytes(),
            signature,
            tx.sender_public_key.as_ref(),
        );
        if !check.is_accepted() {
            warn!(tx = %tx.tx_id, wallet = %tx.sender, "Transaction signature rejected");
            return Err(MempoolError::BadSignature {
                tx_id: tx.tx_id,
                wallet: tx.sender,
            });
        }

        if let Some(input) = tx.inputs.iter().find(|input| {
            self.utxos
                .get(input)
                .is_some_and(|output| output.receiver != tx.sender)
        }) {
            return Err(MempoolError::NotOwner {
                tx_id: tx.tx_id,
                sender: tx.sender,
                input: *input,
            });
        }

        if self.tx_id_in_use(tx.tx_id) {
            warn!(tx = %tx.tx_id, wallet = %tx.sender, "Transaction id already in use");
            return Err(MempoolError::DuplicateTxId(tx.tx_id));
        }

        tx.check_spending(&self.utxos, &self.known_receivers)?;

        debug!(
            tx = %tx.tx_id,
            wallet = %tx.sender,
            inputs = tx.inputs.len(),
            outputs = tx.outputs.len(),
            "Transaction admitted"
        );
        self.pending.push_back(tx);
        Ok(())
    }

    /// Outputs are keyed by `(tx_id, index)`, so a reused id would shadow
    /// live entries once its block is applied.
    fn tx_id_in_use(&self, tx_id: TxId) -> bool {
        self.pending.iter().any(|queued| queued.tx_id == tx_id)
            || self.utxos.iter().any(|utxo| utxo.tx_id == tx_id)
    }

    /// Assemble a block from queued transactions, oldest first.
    ///
    /// Transactions that no longer satisfy their spending conditions, or that
    /// spend an input already used by the block, are discarded. Returns `None`
    /// when nothing is queued.
    pub fn build_block(&mut self, height: BlockHeight, prev_block_digest: Hash) -> Option<Block> {
        if self.pending.is_empty() {
            return None;
        }

        let mut builder = BlockBuilder::new(height, prev_block_digest);
        let mut discarded = 0usize;
        while builder.len() < self.config.max_block_transactions {
            let Some(tx) = self.pending.pop_front() else {
                break;
            };

            if let Err(e) = tx.check_spending(&self.utxos, &self.known_receivers) {
                debug!(tx = %tx.tx_id, error = %e, "Discarding transaction inconsistent with UTXO set");
                discarded += 1;
                continue;
            }

            if let Err(e) = builder.try_add_transaction(tx) {
                debug!(error = %e, "Discarding transaction inconsistent with block");
                discarded += 1;
            }
        }

        let block = builder.finalize();
        info!(
            height = height.0,
            block = %block.id().short(),
            transactions = block.transactions().len(),
            discarded,
            remaining = self.pending.len(),
            "Built block"
        );
        Some(block)
    }

    /// Apply a delivered block to the local view.
    ///
    /// Spent inputs are removed and every output becomes a new unspent entry.
    /// An output whose key is already unspent is skipped rather than
    /// overwriting the live entry. Queued transactions that spend a removed
    /// input are dropped. Returns the number of inputs that were missing from
    /// the view.
    pub fn apply_block(&mut self, block: &Block) -> usize {
        let mut missing = 0usize;
        let mut collisions = 0usize;
        for tx in block.transactions() {
            for input in &tx.inputs {
                if self.utxos.remove(input).is_none() {
                    warn!(tx = %tx.tx_id, input = ?input, "Spent input missing from UTXO set");
                    missing += 1;
                }
            }
            for (index, output) in tx.outputs.iter().enumerate() {
                let key = Input::new(tx.tx_id, index as u32);
                if self.utxos.contains(&key) {
                    warn!(tx = %tx.tx_id, output = index, "Output key already unspent");
                    collisions += 1;
                    continue;
                }
                self.utxos.add(Utxo::new(tx.tx_id, index as u32, *output));
            }
        }

        let before = self.pending.len();
        let utxos = &self.utxos;
        self.pending
            .retain(|tx| tx.inputs.iter().all(|input| utxos.contains(input)));

        info!(
            height = block.height().0,
            block = %block.id().short(),
            transactions = block.transactions().len(),
            pruned = before - self.pending.len(),
            collisions,
            "Applied block"
        );
        missing
    }
}
