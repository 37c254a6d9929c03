//! The per-validator Bracha state machine.

use crate::{BrachaConfig, Role, RoundPhase, RoundState};
use indexmap::IndexMap;
use ledgerbft_core::{Action, StateMachine};
use ledgerbft_messages::{ConsensusMessage, MessageType};
use ledgerbft_types::{
    Block, BlockHeight, BlockSignature, ChainCheck, ForwardSigner, Hash, KeyChain, SignatureError, UtxoSet,
    ValidatorId, WalletId,
};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, error, info, trace, warn};

/// Errors surfaced to callers of the state machine.
#[derive(Debug, thiserror::Error)]
pub enum BftError {
    #[error("{0} is not the proposer")]
    NotProposer(ValidatorId),

    #[error("Signing failed: {0}")]
    Signature(#[from] SignatureError),
}

/// Bracha reliable-broadcast state for one validator.
///
/// Feed it batches of inbound messages through [`StateMachine::handle_batch`];
/// it verifies each message, tallies votes and returns the ECHO/READY
/// broadcasts the runner must perform. Every outbound message re-signs the
/// block with the next key of this validator's chain.
pub struct BrachaState {
    /// Our identity.
    validator_id: ValidatorId,

    role: Role,

    config: BrachaConfig,

    /// All validators, in a fixed order.
    committee: Vec<ValidatorId>,

    /// Signing side of our key chain.
    signer: ForwardSigner,

    /// Next expected key of every validator we have heard from.
    key_chain: KeyChain<ValidatorId>,

    /// Local view of unspent outputs used to verify blocks.
    utxos: UtxoSet,

    /// Receivers outputs may pay.
    known_receivers: BTreeSet<WalletId>,

    /// Blocks that passed ledger verification this run.
    verified: HashSet<Hash>,

    /// First copy of every verified block, with the signatures collected for it.
    blocks: IndexMap<Hash, Block>,

    /// Tallies for the current run.
    round: RoundState,

    /// Delivered blocks not yet taken by the caller.
    delivered: Vec<Hash>,

    /// Every hash delivered so far, across runs.
    finalized: HashSet<Hash>,
}

impl BrachaState {
    /// Create the state for `validator_id`.
    pub fn new(
        validator_id: ValidatorId,
        role: Role,
        config: BrachaConfig,
        committee: Vec<ValidatorId>,
        signer: ForwardSigner,
    ) -> Self {
        Self {
            validator_id,
            role,
            config,
            committee,
            signer,
            key_chain: KeyChain::new(),
            utxos: UtxoSet::new(),
            known_receivers: BTreeSet::new(),
            verified: HashSet::new(),
            blocks: IndexMap::new(),
            round: RoundState::new(),
            delivered: Vec::new(),
            finalized: HashSet::new(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn validator_id(&self) -> ValidatorId {
        self.validator_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn config(&self) -> &BrachaConfig {
        &self.config
    }

    pub fn round_state(&self) -> &RoundState {
        &self.round
    }

    pub fn phase(&self) -> RoundPhase {
        self.round.phase()
    }

    /// Hash of the delivered block, once delivered.
    pub fn voted_hash(&self) -> Option<Hash> {
        self.round.voted_hash()
    }

    pub fn is_delivered(&self) -> bool {
        self.round.is_delivered()
    }

    pub fn utxos(&self) -> &UtxoSet {
        &self.utxos
    }

    pub fn key_chain(&self) -> &KeyChain<ValidatorId> {
        &self.key_chain
    }

    /// A received block with the signatures collected for it so far.
    pub fn received_block(&self, hash: &Hash) -> Option<&Block> {
        self.blocks.get(hash)
    }

    /// Delivered blocks, leaving them in place.
    pub fn delivered_blocks(&self) -> Vec<Block> {
        self.delivered
            .iter()
            .filter_map(|hash| self.blocks.get(hash).cloned())
            .collect()
    }

    /// Delivered blocks, clearing the list.
    pub fn take_delivered_blocks(&mut self) -> Vec<Block> {
        let blocks = self.delivered_blocks();
        self.delivered.clear();
        blocks
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Run lifecycle
    // ═══════════════════════════════════════════════════════════════════════════

    /// Begin a new run against the given ledger view.
    ///
    /// Tallies and the verified-block cache are reset. Key chains and
    /// delivered blocks not yet taken survive.
    pub fn start_run(&mut self, utxos: UtxoSet, known_receivers: BTreeSet<WalletId>) {
        self.utxos = utxos;
        self.known_receivers = known_receivers;
        self.verified.clear();
        self.round = RoundState::new();
        let delivered = &self.delivered;
        self.blocks.retain(|hash, _| delivered.contains(hash));
        debug!(validator = self.validator_id.0, role = %self.role, "Run started");
    }

    /// Sign `block` and produce the SEND that starts a run.
    pub fn propose(&mut self, block: Block) -> Result<Vec<Action>, BftError> {
        if !self.role.is_proposer() {
            return Err(BftError::NotProposer(self.validator_id));
        }

        info!(
            validator = self.validator_id.0,
            block = %block.id().short(),
            height = block.height().0,
            transactions = block.transactions().len(),
            "Proposing block"
        );

        let message = self.sign_message(MessageType::Send, block, ConsensusMessage::ROUND_SEND)?;
        Ok(vec![Action::Broadcast { message }])
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Inbound processing
    // ═══════════════════════════════════════════════════════════════════════════

    /// Verify and tally one message. Returns whether it was counted.
    pub fn on_message(&mut self, message: ConsensusMessage) -> bool {
        let Some(seal) = message.block.seal().cloned() else {
            warn!(
                validator = self.validator_id.0,
                sender = message.sender_id.0,
                "Dropping unsigned block"
            );
            return false;
        };
        let Some(digest) = message.block.digest() else {
            return false;
        };
        let hash = message.block.id();

        let check = self.key_chain.check_and_advance(
            seal.validator_id,
            digest.as_bytes(),
            &seal.signature,
            seal.next_public_key.as_ref(),
        );
        if !check.is_accepted() {
            warn!(
                validator = self.validator_id.0,
                signer = seal.validator_id.0,
                block = %hash.short(),
                check = check_outcome(&check),
                "Block signature rejected"
            );
            return false;
        }

        if self.finalized.contains(&hash) {
            trace!(
                validator = self.validator_id.0,
                block = %hash.short(),
                "Ignoring vote for a delivered block"
            );
            return false;
        }

        if !self.verified.contains(&hash) {
            if let Err(e) = message.block.check(&self.utxos, &self.known_receivers) {
                warn!(
                    validator = self.validator_id.0,
                    block = %hash.short(),
                    error = %e,
                    "Block verification failed"
                );
                return false;
            }
            self.verified.insert(hash);
        }

        let signature = BlockSignature {
            validator_id: seal.validator_id,
            signature: seal.signature,
            public_key: check.verifying_key().cloned(),
            round: message.round,
        };
        let message_type = message.message_type;
        self.blocks
            .entry(hash)
            .or_insert_with(|| {
                let mut block = message.block;
                block.clear_validator_signatures();
                block
            })
            .add_validator_signature(signature);

        match message_type {
            MessageType::Send => self.round.record_send(hash),
            MessageType::Echo => {
                let count = self.round.record_echo(hash);
                trace!(validator = self.validator_id.0, block = %hash.short(), count, "ECHO");
            }
            MessageType::Ready => {
                let count = self.round.record_ready(hash);
                trace!(validator = self.validator_id.0, block = %hash.short(), count, "READY");
            }
        }
        true
    }

    /// Process a drained batch. A SEND from an earlier batch is forgotten.
    pub fn process_batch(&mut self, batch: Vec<ConsensusMessage>) {
        self.round.clear_pending_send();
        debug!(
            validator = self.validator_id.0,
            messages = batch.len(),
            "Processing batch"
        );
        for message in batch {
            self.on_message(message);
        }
    }

    /// Apply Bracha's thresholds once per batch.
    pub fn end_of_round(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();

        if let Some(hash) = self.round.take_pending_send() {
            actions.extend(self.vote(MessageType::Echo, hash, ConsensusMessage::ROUND_ECHO));
        }

        for hash in self.round.echoes_reaching(self.config.echo_quorum()) {
            if self.round.mark_ready_sent(hash) {
                actions.extend(self.vote(
                    MessageType::Ready,
                    hash,
                    ConsensusMessage::ROUND_READY_FROM_ECHO,
                ));
            }
        }

        for (hash, count) in self.round.ready_tallies() {
            if count >= self.config.ready_quorum() && self.round.mark_ready_sent(hash) {
                actions.extend(self.vote(
                    MessageType::Ready,
                    hash,
                    ConsensusMessage::ROUND_READY_FROM_READY,
                ));
            }

            if self.config.delivers(count) {
                actions.push(self.deliver(hash, count));
                break;
            }
        }

        actions
    }

    fn deliver(&mut self, hash: Hash, ready_count: u64) -> Action {
        self.round.deliver(hash);
        self.delivered.push(hash);
        self.finalized.insert(hash);

        let height = self.blocks.get(&hash).map(Block::height).unwrap_or(BlockHeight::GENESIS);
        let signatures = self
            .blocks
            .get(&hash)
            .map(|b| b.validator_signatures().len())
            .unwrap_or(0);
        info!(
            validator = self.validator_id.0,
            block = %hash.short(),
            height = height.0,
            ready_count,
            signatures,
            "Delivered block"
        );

        Action::Delivered {
            block_hash: hash,
            height,
        }
    }

    /// Build a signed vote for a block we hold.
    fn vote(&mut self, message_type: MessageType, hash: Hash, round: u16) -> Option<Action> {
        let Some(block) = self.blocks.get(&hash).cloned() else {
            error!(
                validator = self.validator_id.0,
                block = %hash.short(),
                "Voting on a block that was never stored"
            );
            return None;
        };

        match self.sign_message(message_type, block, round) {
            Ok(message) => {
                debug!(
                    validator = self.validator_id.0,
                    block = %hash.short(),
                    kind = %message_type,
                    round,
                    "Broadcasting vote"
                );
                Some(Action::Broadcast { message })
            }
            Err(e) => {
                error!(validator = self.validator_id.0, error = %e, "Failed to sign vote");
                None
            }
        }
    }

    fn sign_message(
        &mut self,
        message_type: MessageType,
        mut block: Block,
        round: u16,
    ) -> Result<ConsensusMessage, SignatureError> {
        block.clear_validator_signatures();
        block.sign_with(&mut self.signer, self.validator_id)?;
        Ok(ConsensusMessage::new(
            message_type,
            block,
            self.validator_id,
            round,
        ))
    }
}

fn check_outcome(check: &ChainCheck) -> &'static str {
    match check {
        ChainCheck::FirstContact => "first_contact",
        ChainCheck::Checked { verification, .. } if verification.is_valid() => "valid",
        ChainCheck::Checked { .. } => "mismatch",
        ChainCheck::Exhausted => "exhausted",
    }
}

impl StateMachine for BrachaState {
    fn handle_batch(&mut self, batch: Vec<ConsensusMessage>) -> Vec<Action> {
        if !self.role.participates() {
            return Vec::new();
        }
        if self.round.is_delivered() {
            // Keep following key chains so the next run verifies.
            for message in batch {
                self.on_message(message);
            }
            return Vec::new();
        }
        self.process_batch(batch);
        let actions = self.end_of_round();
        self.role
            .shape_outbound(actions, self.validator_id, &self.committee)
    }

    fn is_finished(&self) -> bool {
        !self.role.participates() || self.round.is_delivered()
    }
}

impl std::fmt::Debug for BrachaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrachaState")
            .field("validator_id", &self.validator_id)
            .field("role", &self.role)
            .field("phase", &self.round.phase())
            .field("voted_hash", &self.round.voted_hash())
            .finish_non_exhaustive()
    }
}
