//! Value transfers between wallets.

use crate::signing::transaction_signing_digest;
use crate::{
    ForwardSigner, Hash, Input, LedgerError, OneTimePublicKey, OneTimeSignature, Output,
    SignatureError, TxId, UtxoSet, WalletId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A transfer spending earlier outputs into new ones.
///
/// A transaction with no inputs is a coinbase and is only well formed when it
/// also has no outputs. The sender's signature and disclosed next public key
/// are absent until the wallet signs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub tx_id: TxId,
    pub sender: WalletId,
    pub inputs: Vec<Input>,
    pub outputs: Vec<Output>,
    /// Key the sender will sign its next transaction with.
    pub sender_public_key: Option<OneTimePublicKey>,
    pub sender_signature: Option<OneTimeSignature>,
}

impl Transaction {
    /// Create an unsigned transaction.
    pub fn new(tx_id: TxId, sender: WalletId, inputs: Vec<Input>, outputs: Vec<Output>) -> Self {
        Self {
            tx_id,
            sender,
            inputs,
            outputs,
            sender_public_key: None,
            sender_signature: None,
        }
    }

    /// Order-sensitive hash over the id, inputs and outputs.
    pub fn digest(&self) -> Hash {
        let mut data = Vec::with_capacity(12 + self.inputs.len() * 8 + self.outputs.len() * 12);
        data.extend_from_slice(&self.tx_id.0.to_le_bytes());
        data.extend_from_slice(&(self.inputs.len() as u32).to_le_bytes());
        for input in &self.inputs {
            data.extend_from_slice(&input.tx_id.0.to_le_bytes());
            data.extend_from_slice(&input.output_index.to_le_bytes());
        }
        data.extend_from_slice(&(self.outputs.len() as u32).to_le_bytes());
        for output in &self.outputs {
            data.extend_from_slice(&output.value.to_le_bytes());
            data.extend_from_slice(&output.receiver.0.to_le_bytes());
        }
        Hash::from_bytes(&data)
    }

    /// Digest the sender's signature covers.
    pub fn signing_digest(&self) -> Hash {
        transaction_signing_digest(&self.digest(), self.sender_public_key.as_ref())
    }

    /// Sign with the wallet's chain, disclosing its next key.
    pub fn sign_with(&mut self, signer: &mut ForwardSigner) -> Result<(), SignatureError> {
        let (current, next) = signer.rotate()?;
        self.sender_public_key = Some(next);
        let digest = self.signing_digest();
        self.sender_signature = Some(current.sign(digest.as_bytes())?);
        Ok(())
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Check the transaction against the unspent set and known receivers.
    ///
    /// Every input must resolve, the resolved values must sum to exactly the
    /// output total, and every receiver must be known.
    pub fn check_spending(
        &self,
        utxos: &UtxoSet,
        known_receivers: &BTreeSet<WalletId>,
    ) -> Result<(), LedgerError> {
        if self.is_coinbase() {
            return if self.outputs.is_empty() {
                Ok(())
            } else {
                Err(LedgerError::CoinbaseWithOutputs(self.tx_id))
            };
        }

        let mut input_total = 0u64;
        for input in &self.inputs {
            let output = utxos.get(input).ok_or(LedgerError::UnknownInput {
                tx_id: self.tx_id,
                input: *input,
            })?;
            input_total = input_total
                .checked_add(output.value)
                .ok_or(LedgerError::ValueOverflow(self.tx_id))?;
        }

        let output_total = self
            .outputs
            .iter()
            .try_fold(0u64, |acc, o| acc.checked_add(o.value))
            .ok_or(LedgerError::ValueOverflow(self.tx_id))?;

        if input_total != output_total {
            return Err(LedgerError::ValueMismatch {
                tx_id: self.tx_id,
                inputs: input_total,
                outputs: output_total,
            });
        }

        if let Some(output) = self
            .outputs
            .iter()
            .find(|o| !known_receivers.contains(&o.receiver))
        {
            return Err(LedgerError::UnknownReceiver {
                tx_id: self.tx_id,
                receiver: output.receiver,
            });
        }

        Ok(())
    }

    /// Boolean form of [`Transaction::check_spending`].
    pub fn check_spending_conditions(
        &self,
        utxos: &UtxoSet,
        known_receivers: &BTreeSet<WalletId>,
    ) -> bool {
        self.check_spending(utxos, known_receivers).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{KeyChain, OneTimeKeyPair, Utxo};

    fn setup() -> (UtxoSet, BTreeSet<WalletId>) {
        let utxos: UtxoSet = [
            Utxo::new(TxId(1), 0, Output::new(30, WalletId(1))),
            Utxo::new(TxId(1), 1, Output::new(20, WalletId(1))),
        ]
        .into_iter()
        .collect();
        let receivers = [WalletId(1), WalletId(2)].into_iter().collect();
        (utxos, receivers)
    }

    fn transfer(values: &[u64]) -> Transaction {
        Transaction::new(
            TxId(10),
            WalletId(1),
            vec![Input::new(TxId(1), 0), Input::new(TxId(1), 1)],
            values.iter().map(|v| Output::new(*v, WalletId(2))).collect(),
        )
    }

    #[test]
    fn test_balanced_transfer_passes() {
        let (utxos, receivers) = setup();
        assert!(transfer(&[35, 15]).check_spending_conditions(&utxos, &receivers));
    }

    #[test]
    fn test_output_decreased_by_one_fails() {
        let (utxos, receivers) = setup();
        assert_eq!(
            transfer(&[35, 14]).check_spending(&utxos, &receivers),
            Err(LedgerError::ValueMismatch {
                tx_id: TxId(10),
                inputs: 50,
                outputs: 49
            })
        );
    }

    #[test]
    fn test_unknown_input_fails() {
        let (utxos, receivers) = setup();
        let mut tx = transfer(&[50]);
        tx.inputs.push(Input::new(TxId(99), 0));
        assert!(matches!(
            tx.check_spending(&utxos, &receivers),
            Err(LedgerError::UnknownInput { .. })
        ));
    }

    #[test]
    fn test_unknown_receiver_fails() {
        let (utxos, receivers) = setup();
        let mut tx = transfer(&[50]);
        tx.outputs[0].receiver = WalletId(7);
        assert_eq!(
            tx.check_spending(&utxos, &receivers),
            Err(LedgerError::UnknownReceiver {
                tx_id: TxId(10),
                receiver: WalletId(7)
            })
        );
    }

    #[test]
    fn test_coinbase_rules() {
        let (utxos, receivers) = setup();
        let empty = Transaction::new(TxId(0), WalletId(1), vec![], vec![]);
        assert!(empty.check_spending_conditions(&utxos, &receivers));

        let minting = Transaction::new(
            TxId(0),
            WalletId(1),
            vec![],
            vec![Output::new(5, WalletId(1))],
        );
        assert_eq!(
            minting.check_spending(&utxos, &receivers),
            Err(LedgerError::CoinbaseWithOutputs(TxId(0)))
        );
    }

    #[test]
    fn test_output_overflow_fails() {
        let (utxos, receivers) = setup();
        let tx = transfer(&[u64::MAX, 1]);
        assert_eq!(
            tx.check_spending(&utxos, &receivers),
            Err(LedgerError::ValueOverflow(TxId(10)))
        );
    }

    #[test]
    fn test_digest_is_order_sensitive() {
        let tx = transfer(&[35, 15]);
        let swapped = transfer(&[15, 35]);
        assert_ne!(tx.digest(), swapped.digest());
        assert_eq!(tx.digest(), transfer(&[35, 15]).digest());
    }

    #[test]
    fn test_signed_transactions_chain() {
        let mut signer = ForwardSigner::from_key_pair(OneTimeKeyPair::from_seed(11));
        let mut chain = KeyChain::new();

        for values in [[35u64, 15], [10, 40]] {
            let mut tx = transfer(&values);
            tx.sign_with(&mut signer).unwrap();
            let check = chain.check_and_advance(
                tx.sender,
                tx.signing_digest().as_bytes(),
                tx.sender_signature.as_ref().unwrap(),
                tx.sender_public_key.as_ref(),
            );
            assert!(check.is_accepted());
        }
    }
}
