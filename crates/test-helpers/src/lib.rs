//! Fixtures shared by the workspace's tests.
//!
//! Everything here is deterministic except one-time key rotation, which
//! always draws fresh keys from the OS.

use ledgerbft_messages::{ConsensusMessage, MessageType};
use ledgerbft_types::{
    Block, BlockBuilder, BlockHeight, ForwardSigner, Hash, Input, OneTimeKeyPair, Output,
    Transaction, TxId, UtxoSet, ValidatorId, WalletId,
};
use std::collections::BTreeSet;

/// Coins every wallet starts with.
pub const GENESIS_COINS: u64 = 100;

/// Wallet IDs `0..count`.
pub fn wallets(count: u32) -> Vec<WalletId> {
    (0..count).map(WalletId).collect()
}

/// A genesis ledger funding `count` wallets with [`GENESIS_COINS`] each.
///
/// Wallet `i` owns the output `(TxId(i), 0)`.
pub fn funded_ledger(count: u32) -> (UtxoSet, BTreeSet<WalletId>) {
    let ids = wallets(count);
    let utxos = UtxoSet::genesis(&ids, GENESIS_COINS);
    (utxos, ids.into_iter().collect())
}

/// Unsigned transfer of `amount` from `from`'s genesis output to `to`, with
/// the change paid back to `from`.
pub fn genesis_transfer(tx_id: u32, from: WalletId, to: WalletId, amount: u64) -> Transaction {
    Transaction::new(
        TxId(tx_id),
        from,
        vec![Input::new(TxId(from.0), 0)],
        vec![
            Output::new(amount, to),
            Output::new(GENESIS_COINS - amount, from),
        ],
    )
}

/// Finalized block at height 1 holding two balanced transfers between
/// wallets 0 and 1 of a [`funded_ledger`].
pub fn two_transfer_block() -> Block {
    let mut builder = BlockBuilder::new(BlockHeight(1), Hash::ZERO);
    builder.add_transaction(genesis_transfer(1000, WalletId(0), WalletId(1), 30));
    builder.add_transaction(genesis_transfer(1001, WalletId(1), WalletId(0), 45));
    builder.finalize()
}

/// A validator identity that signs outbound messages with its own key chain.
pub struct TestPeer {
    pub id: ValidatorId,
    signer: ForwardSigner,
}

impl TestPeer {
    /// Peer whose first key is derived from `id`.
    pub fn new(id: u64) -> Self {
        Self {
            id: ValidatorId(id),
            signer: ForwardSigner::from_key_pair(OneTimeKeyPair::from_seed(1_000 + id)),
        }
    }

    /// Sign a copy of `block` and wrap it in an envelope from this peer.
    pub fn message(&mut self, message_type: MessageType, block: &Block, round: u16) -> ConsensusMessage {
        let mut block = block.clone();
        block.clear_validator_signatures();
        if let Err(e) = block.sign_with(&mut self.signer, self.id) {
            panic!("test peer failed to sign: {e}");
        }
        ConsensusMessage::new(message_type, block, self.id, round)
    }

    /// Produce a signed message, advancing the chain, and throw it away.
    pub fn skip(&mut self, block: &Block) {
        let _ = self.message(MessageType::Echo, block, ConsensusMessage::ROUND_ECHO);
    }

    pub fn send(&mut self, block: &Block) -> ConsensusMessage {
        self.message(MessageType::Send, block, ConsensusMessage::ROUND_SEND)
    }

    pub fn echo(&mut self, block: &Block) -> ConsensusMessage {
        self.message(MessageType::Echo, block, ConsensusMessage::ROUND_ECHO)
    }

    pub fn ready(&mut self, block: &Block) -> ConsensusMessage {
        self.message(
            MessageType::Ready,
            block,
            ConsensusMessage::ROUND_READY_FROM_ECHO,
        )
    }
}
