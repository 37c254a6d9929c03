//! Blocks, headers and validator signatures.
//!
//! A block starts life as a [`BlockBuilder`], which accepts transactions.
//! [`BlockBuilder::finalize`] computes the Merkle root and returns an
//! immutable [`Block`]; only a `Block` can be signed, digested or sent.

use crate::merkle::merkle_root;
use crate::signing::block_signing_digest;
use crate::{
    BlockHeight, ForwardSigner, Hash, Input, LedgerError, OneTimePrivateKey, OneTimePublicKey,
    OneTimeSignature, SignatureError, Transaction, UtxoSet, ValidatorId, WalletId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Block header: the parent digest and the transaction commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// ID of the previous block's header.
    pub prev_block_digest: Hash,

    /// Merkle root of the transactions. `None` for an empty block.
    pub merkle_root: Option<Hash>,
}

impl Header {
    /// Merkle root over the digests of `transactions`.
    pub fn calculate_merkle_root(transactions: &[Transaction]) -> Option<Hash> {
        let leaves: Vec<Hash> = transactions.iter().map(Transaction::digest).collect();
        merkle_root(&leaves)
    }

    /// `hash(prev_block_digest ‖ merkle_root)`; an empty root contributes no bytes.
    pub fn id(&self) -> Hash {
        match &self.merkle_root {
            Some(root) => Hash::from_parts(&[self.prev_block_digest.as_bytes(), root.as_bytes()]),
            None => Hash::from_bytes(self.prev_block_digest.as_bytes()),
        }
    }
}

/// Returns true if no input of `tx` is already spent by `existing`.
fn inputs_disjoint(existing: &[Transaction], tx: &Transaction) -> bool {
    !existing
        .iter()
        .flat_map(|t| t.inputs.iter())
        .any(|spent| tx.inputs.contains(spent))
}

// ═══════════════════════════════════════════════════════════════════════════
// Mutable builder
// ═══════════════════════════════════════════════════════════════════════════

/// A block still accepting transactions.
#[derive(Debug, Clone)]
pub struct BlockBuilder {
    height: BlockHeight,
    prev_block_digest: Hash,
    transactions: Vec<Transaction>,
}

impl BlockBuilder {
    /// Start a block on top of `prev_block_digest`.
    pub fn new(height: BlockHeight, prev_block_digest: Hash) -> Self {
        Self {
            height,
            prev_block_digest,
            transactions: Vec::new(),
        }
    }

    /// Append a transaction without any checks.
    pub fn add_transaction(&mut self, tx: Transaction) {
        self.transactions.push(tx);
    }

    /// Append a transaction if it does not spend an input already in the block.
    pub fn try_add_transaction(&mut self, tx: Transaction) -> Result<(), LedgerError> {
        if let Some(input) = self.first_conflict(&tx) {
            return Err(LedgerError::DuplicateInput { input });
        }
        self.transactions.push(tx);
        Ok(())
    }

    /// Whether `tx` spends only inputs not yet used by this block.
    pub fn verify_tx_consist(&self, tx: &Transaction) -> bool {
        inputs_disjoint(&self.transactions, tx)
    }

    fn first_conflict(&self, tx: &Transaction) -> Option<Input> {
        let spent: BTreeSet<&Input> = self.transactions.iter().flat_map(|t| &t.inputs).collect();
        tx.inputs.iter().find(|i| spent.contains(i)).copied()
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Freeze the block, computing its Merkle root.
    pub fn finalize(self) -> Block {
        let merkle_root = Header::calculate_merkle_root(&self.transactions);
        Block {
            header: Header {
                prev_block_digest: self.prev_block_digest,
                merkle_root,
            },
            height: self.height,
            transactions: self.transactions,
            seal: None,
            validator_signatures: Vec::new(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Immutable block
// ═══════════════════════════════════════════════════════════════════════════

/// The signature of the validator that last sent the block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSeal {
    pub validator_id: ValidatorId,
    pub signature: OneTimeSignature,
    /// Key the validator will sign its next message with.
    pub next_public_key: Option<OneTimePublicKey>,
}

/// A vote message's signature collected for a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSignature {
    pub validator_id: ValidatorId,
    pub signature: OneTimeSignature,
    /// Key the signature was checked against. `None` on first contact.
    pub public_key: Option<OneTimePublicKey>,
    /// Protocol round tag of the message that carried the signature.
    pub round: u16,
}

/// A finalized block.
///
/// Collected [`BlockSignature`]s are local bookkeeping and are not part of the
/// wire form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    header: Header,
    height: BlockHeight,
    transactions: Vec<Transaction>,
    seal: Option<ValidatorSeal>,
    #[serde(skip)]
    validator_signatures: Vec<BlockSignature>,
}

impl Block {
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Header ID. This is the value validators vote on.
    pub fn id(&self) -> Hash {
        self.header.id()
    }

    pub fn height(&self) -> BlockHeight {
        self.height
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    pub fn seal(&self) -> Option<&ValidatorSeal> {
        self.seal.as_ref()
    }

    pub fn validator_id(&self) -> Option<ValidatorId> {
        self.seal.as_ref().map(|s| s.validator_id)
    }

    /// Digest covered by the current seal, if the block is signed.
    pub fn digest(&self) -> Option<Hash> {
        self.seal.as_ref().map(|seal| {
            block_signing_digest(&self.id(), seal.validator_id, seal.next_public_key.as_ref())
        })
    }

    /// Seal the block, replacing any previous seal.
    pub fn sign(
        &mut self,
        private_key: OneTimePrivateKey,
        validator_id: ValidatorId,
        next_public_key: Option<OneTimePublicKey>,
    ) -> Result<(), SignatureError> {
        let digest = block_signing_digest(&self.id(), validator_id, next_public_key.as_ref());
        let signature = private_key.sign(digest.as_bytes())?;
        self.seal = Some(ValidatorSeal {
            validator_id,
            signature,
            next_public_key,
        });
        Ok(())
    }

    /// Seal the block with the next key of `signer`'s chain.
    pub fn sign_with(
        &mut self,
        signer: &mut ForwardSigner,
        validator_id: ValidatorId,
    ) -> Result<(), SignatureError> {
        let (current, next) = signer.rotate()?;
        self.sign(current, validator_id, Some(next))
    }

    /// Check the seal against `public_key`.
    pub fn verify_signature(&self, public_key: &OneTimePublicKey) -> bool {
        match (&self.seal, self.digest()) {
            (Some(seal), Some(digest)) => public_key
                .verify(digest.as_bytes(), &seal.signature)
                .is_valid(),
            _ => false,
        }
    }

    /// Whether `tx` spends only inputs not used by this block.
    pub fn verify_tx_consist(&self, tx: &Transaction) -> bool {
        inputs_disjoint(&self.transactions, tx)
    }

    /// Check the block against the unspent set.
    ///
    /// The Merkle root must match the transactions, every transaction must
    /// satisfy its spending conditions, and no input may appear twice across
    /// the block.
    pub fn check(
        &self,
        utxos: &UtxoSet,
        known_receivers: &BTreeSet<WalletId>,
    ) -> Result<(), LedgerError> {
        let computed = Header::calculate_merkle_root(&self.transactions);
        if computed != self.header.merkle_root {
            return Err(LedgerError::MerkleMismatch {
                header: self.header.merkle_root,
                computed,
            });
        }

        for tx in &self.transactions {
            tx.check_spending(utxos, known_receivers)?;
        }

        let total_inputs: usize = self.transactions.iter().map(|t| t.inputs.len()).sum();
        let mut seen = BTreeSet::new();
        let mut duplicate = None;
        for input in self.transactions.iter().flat_map(|t| &t.inputs) {
            if !seen.insert(*input) && duplicate.is_none() {
                duplicate = Some(*input);
            }
        }
        if seen.len() != total_inputs {
            if let Some(input) = duplicate {
                return Err(LedgerError::DuplicateInput { input });
            }
        }

        Ok(())
    }

    /// Boolean form of [`Block::check`].
    pub fn verify(&self, utxos: &UtxoSet, known_receivers: &BTreeSet<WalletId>) -> bool {
        self.check(utxos, known_receivers).is_ok()
    }

    pub fn add_validator_signature(&mut self, signature: BlockSignature) {
        self.validator_signatures.push(signature);
    }

    pub fn validator_signatures(&self) -> &[BlockSignature] {
        &self.validator_signatures
    }

    pub fn clear_validator_signatures(&mut self) {
        self.validator_signatures.clear();
    }

    /// Every input spent by the block.
    pub fn spent_inputs(&self) -> impl Iterator<Item = &Input> {
        self.transactions.iter().flat_map(|t| t.inputs.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{OneTimeKeyPair, Output, TxId, Utxo};

    fn funded() -> (UtxoSet, BTreeSet<WalletId>) {
        let utxos: UtxoSet = [
            Utxo::new(TxId(1), 0, Output::new(10, WalletId(1))),
            Utxo::new(TxId(2), 0, Output::new(20, WalletId(2))),
        ]
        .into_iter()
        .collect();
        (utxos, [WalletId(1), WalletId(2)].into_iter().collect())
    }

    fn spend(tx_id: u32, from: (u32, u64), to: u32) -> Transaction {
        Transaction::new(
            TxId(tx_id),
            WalletId(from.0),
            vec![Input::new(TxId(from.0), 0)],
            vec![Output::new(from.1, WalletId(to))],
        )
    }

    #[test]
    fn test_empty_block_has_empty_root() {
        let block = BlockBuilder::new(BlockHeight(1), Hash::ZERO).finalize();
        assert_eq!(block.header().merkle_root, None);
        assert_eq!(block.id(), Hash::from_bytes(Hash::ZERO.as_bytes()));
    }

    #[test]
    fn test_finalize_computes_root() {
        let mut builder = BlockBuilder::new(BlockHeight(1), Hash::ZERO);
        let tx = spend(10, (1, 10), 2);
        let digest = tx.digest();
        builder.add_transaction(tx);
        let block = builder.finalize();

        let mut pair = [0u8; 64];
        pair[..32].copy_from_slice(digest.as_bytes());
        pair[32..].copy_from_slice(digest.as_bytes());
        assert_eq!(block.header().merkle_root, Some(Hash::from_bytes(&pair)));
    }

    #[test]
    fn test_verify_tx_consist_rejects_spent_input() {
        let mut builder = BlockBuilder::new(BlockHeight(1), Hash::ZERO);
        builder.try_add_transaction(spend(10, (1, 10), 2)).unwrap();

        let conflicting = spend(11, (1, 10), 1);
        assert!(!builder.verify_tx_consist(&conflicting));
        assert_eq!(
            builder.try_add_transaction(conflicting),
            Err(LedgerError::DuplicateInput {
                input: Input::new(TxId(1), 0)
            })
        );
        assert!(builder.verify_tx_consist(&spend(12, (2, 20), 1)));
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn test_verify_balanced_block() {
        let (utxos, receivers) = funded();
        let mut builder = BlockBuilder::new(BlockHeight(1), Hash::ZERO);
        builder.add_transaction(spend(10, (1, 10), 2));
        builder.add_transaction(spend(11, (2, 20), 1));
        assert!(builder.finalize().verify(&utxos, &receivers));
    }

    #[test]
    fn test_duplicate_input_across_transactions_rejected() {
        let (utxos, receivers) = funded();
        let first = spend(10, (1, 10), 2);
        let second = spend(11, (1, 10), 1);
        assert!(first.check_spending_conditions(&utxos, &receivers));
        assert!(second.check_spending_conditions(&utxos, &receivers));

        let mut builder = BlockBuilder::new(BlockHeight(1), Hash::ZERO);
        builder.add_transaction(first);
        builder.add_transaction(second);
        let block = builder.finalize();

        assert!(!block.verify(&utxos, &receivers));
        assert_eq!(
            block.check(&utxos, &receivers),
            Err(LedgerError::DuplicateInput {
                input: Input::new(TxId(1), 0)
            })
        );
    }

    #[test]
    fn test_tampered_transactions_fail_merkle_check() {
        let (utxos, receivers) = funded();
        let mut builder = BlockBuilder::new(BlockHeight(1), Hash::ZERO);
        builder.add_transaction(spend(10, (1, 10), 2));
        let mut block = builder.finalize();
        block.transactions[0].outputs[0].receiver = WalletId(1);

        assert!(matches!(
            block.check(&utxos, &receivers),
            Err(LedgerError::MerkleMismatch { .. })
        ));
    }

    #[test]
    fn test_sign_and_verify_signature() {
        let mut builder = BlockBuilder::new(BlockHeight(1), Hash::ZERO);
        builder.add_transaction(spend(10, (1, 10), 2));
        let mut block = builder.finalize();
        assert_eq!(block.digest(), None);

        let current = OneTimeKeyPair::from_seed(1);
        let next = OneTimeKeyPair::from_seed(2);
        let (private_key, public_key) = current.into_parts();
        block
            .sign(private_key, ValidatorId(4), Some(next.public_key().clone()))
            .unwrap();

        assert_eq!(block.validator_id(), Some(ValidatorId(4)));
        assert!(block.verify_signature(&public_key));
        assert!(!block.verify_signature(next.public_key()));
    }

    #[test]
    fn test_sign_with_chain_discloses_next_key() {
        let mut signer = ForwardSigner::from_key_pair(OneTimeKeyPair::from_seed(3));
        let first_key = signer.next_public_key().clone();
        let mut block = BlockBuilder::new(BlockHeight(1), Hash::ZERO).finalize();

        block.sign_with(&mut signer, ValidatorId(0)).unwrap();
        assert!(block.verify_signature(&first_key));

        let seal = block.seal().unwrap();
        assert_eq!(seal.next_public_key.as_ref(), Some(signer.next_public_key()));
    }
}
