//! Transaction inputs, outputs and the unspent-output set.

use crate::{TxId, WalletId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reference to an output of an earlier transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Input {
    /// Transaction that created the output.
    pub tx_id: TxId,
    /// Position of the output in that transaction.
    pub output_index: u32,
}

impl Input {
    pub fn new(tx_id: TxId, output_index: u32) -> Self {
        Self {
            tx_id,
            output_index,
        }
    }
}

/// Value assigned to a receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Output {
    pub value: u64,
    pub receiver: WalletId,
}

impl Output {
    pub fn new(value: u64, receiver: WalletId) -> Self {
        Self { value, receiver }
    }
}

/// An entry of the unspent set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub tx_id: TxId,
    pub output_index: u32,
    pub output: Output,
}

impl Utxo {
    pub fn new(tx_id: TxId, output_index: u32, output: Output) -> Self {
        Self {
            tx_id,
            output_index,
            output,
        }
    }

    /// The input that would spend this entry.
    pub fn input(&self) -> Input {
        Input::new(self.tx_id, self.output_index)
    }
}

/// Unspent outputs keyed by `(tx_id, output_index)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoSet {
    entries: BTreeMap<Input, Output>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// One funding entry of `coins` per wallet, created by transactions
    /// numbered from zero in wallet order.
    pub fn genesis(wallets: &[WalletId], coins: u64) -> Self {
        wallets
            .iter()
            .enumerate()
            .map(|(i, wallet)| Utxo::new(TxId(i as u32), 0, Output::new(coins, *wallet)))
            .collect()
    }

    /// Insert an entry, returning the output it replaced.
    pub fn add(&mut self, utxo: Utxo) -> Option<Output> {
        self.entries.insert(utxo.input(), utxo.output)
    }

    /// Look up the output an input refers to.
    pub fn get(&self, input: &Input) -> Option<&Output> {
        self.entries.get(input)
    }

    pub fn contains(&self, input: &Input) -> bool {
        self.entries.contains_key(input)
    }

    /// Remove the entry an input refers to.
    pub fn remove(&mut self, input: &Input) -> Option<Utxo> {
        self.entries
            .remove(input)
            .map(|output| Utxo::new(input.tx_id, input.output_index, output))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Utxo> + '_ {
        self.entries
            .iter()
            .map(|(input, output)| Utxo::new(input.tx_id, input.output_index, *output))
    }

    /// Entries paying `wallet`.
    pub fn owned_by(&self, wallet: WalletId) -> UtxoSet {
        self.iter().filter(|u| u.output.receiver == wallet).collect()
    }

    /// Total value paying `wallet`. Saturates on overflow.
    pub fn balance_of(&self, wallet: WalletId) -> u64 {
        self.entries
            .values()
            .filter(|o| o.receiver == wallet)
            .fold(0u64, |acc, o| acc.saturating_add(o.value))
    }
}

impl FromIterator<Utxo> for UtxoSet {
    fn from_iter<I: IntoIterator<Item = Utxo>>(iter: I) -> Self {
        let mut set = UtxoSet::new();
        for utxo in iter {
            set.add(utxo);
        }
        set
    }
}
