//! Wallets and transfer generation for simulations.

use ledgerbft_types::{
    ForwardSigner, Input, Output, SignatureError, Transaction, TxId, UtxoSet, WalletId,
};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::warn;

/// A wallet that signs its transactions with a forward key chain.
#[derive(Debug)]
pub struct Wallet {
    pub id: WalletId,
    signer: ForwardSigner,
}

impl Wallet {
    pub fn new(id: WalletId) -> Result<Self, SignatureError> {
        Ok(Self {
            id,
            signer: ForwardSigner::new()?,
        })
    }

    /// Pay `amount` to `to` from this wallet's unspent outputs, returning
    /// the change to ourselves.
    ///
    /// Returns `Ok(None)` when the wallet cannot cover the amount.
    pub fn transfer(
        &mut self,
        utxos: &UtxoSet,
        tx_id: TxId,
        to: WalletId,
        amount: u64,
    ) -> Result<Option<Transaction>, SignatureError> {
        let mut inputs: Vec<Input> = Vec::new();
        let mut gathered = 0u64;
        for utxo in utxos.owned_by(self.id).iter() {
            if gathered >= amount {
                break;
            }
            inputs.push(utxo.input());
            gathered = gathered.saturating_add(utxo.output.value);
        }
        if gathered < amount || inputs.is_empty() {
            return Ok(None);
        }

        let mut outputs = vec![Output::new(amount, to)];
        if gathered > amount {
            outputs.push(Output::new(gathered - amount, self.id));
        }

        let mut tx = Transaction::new(tx_id, self.id, inputs, outputs);
        tx.sign_with(&mut self.signer)?;
        Ok(Some(tx))
    }
}

/// All wallets of a simulation.
#[derive(Debug)]
pub struct WalletPool {
    wallets: Vec<Wallet>,
    next_tx_id: u32,
}

impl WalletPool {
    /// Create wallets for `ids`. Transaction IDs start above the genesis
    /// range so they never collide with funding outputs.
    pub fn new(ids: &[WalletId]) -> Result<Self, SignatureError> {
        let wallets = ids
            .iter()
            .map(|id| Wallet::new(*id))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            next_tx_id: ids.len() as u32,
            wallets,
        })
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    pub fn ids(&self) -> Vec<WalletId> {
        self.wallets.iter().map(|w| w.id).collect()
    }

    pub fn get_mut(&mut self, id: WalletId) -> Option<&mut Wallet> {
        self.wallets.iter_mut().find(|w| w.id == id)
    }

    fn next_tx_id(&mut self) -> TxId {
        let id = TxId(self.next_tx_id);
        self.next_tx_id += 1;
        id
    }

    /// Signed transfer between two wallets, if the sender can pay.
    pub fn transfer(
        &mut self,
        utxos: &UtxoSet,
        from: WalletId,
        to: WalletId,
        amount: u64,
    ) -> Option<Transaction> {
        let tx_id = self.next_tx_id();
        let wallet = self.get_mut(from)?;
        match wallet.transfer(utxos, tx_id, to, amount) {
            Ok(tx) => tx,
            Err(e) => {
                warn!(wallet = %from, error = %e, "Failed to sign transfer");
                None
            }
        }
    }
}

/// Generates random transfers between distinct wallets.
#[derive(Debug, Clone)]
pub struct TransferWorkload {
    /// Upper bound of a single transfer amount.
    max_amount: u64,
}

impl Default for TransferWorkload {
    fn default() -> Self {
        Self { max_amount: 10 }
    }
}

impl TransferWorkload {
    pub fn new(max_amount: u64) -> Self {
        Self {
            max_amount: max_amount.max(1),
        }
    }

    /// Up to `count` transfers, each from a different sender so none of
    /// them conflict.
    pub fn generate_batch(
        &self,
        wallets: &mut WalletPool,
        utxos: &UtxoSet,
        count: usize,
        rng: &mut impl Rng,
    ) -> Vec<Transaction> {
        if wallets.len() < 2 {
            return Vec::new();
        }
        let mut senders = wallets.ids();
        senders.shuffle(rng);

        let ids = wallets.ids();
        let mut transactions = Vec::new();
        for from in senders.into_iter().take(count) {
            let to = loop {
                let candidate = ids[rng.gen_range(0..ids.len())];
                if candidate != from {
                    break candidate;
                }
            };
            let amount = rng.gen_range(1..=self.max_amount);
            if let Some(tx) = wallets.transfer(utxos, from, to, amount) {
                transactions.push(tx);
            }
        }
        transactions
    }
}
