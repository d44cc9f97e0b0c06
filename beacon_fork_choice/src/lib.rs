//! The LMD-GHOST fork choice rule.
//!
//! Objects that cannot be processed yet are not dropped: blocks whose parent
//! is unknown and attestations for blocks or epochs that have not arrived
//! are delayed and retried once the prerequisite is known.

use core::mem;
use std::collections::{BTreeMap, HashMap};
use std::convert::TryFrom as _;

use anyhow::{ensure, Result};
use log::{debug, info};
use maplit::{btreemap, hashmap};
use thiserror::Error;

use helper_functions::beacon_state_accessors::{
    get_active_validator_indices, get_current_epoch, get_indexed_attestation,
};
use helper_functions::crypto::hash_tree_root;
use helper_functions::misc::{compute_epoch_at_slot, compute_start_slot_at_epoch};
use helper_functions::predicates::validate_indexed_attestation;
use transition_functions::process_slot::{process_slots, state_transition};
use types::beacon_state::BeaconState;
use types::config::Config;
use types::primitives::{Epoch, Gwei, Slot, ValidatorIndex, H256};
use types::types::{Attestation, BeaconBlock, Checkpoint, SignedBeaconBlock};

#[allow(clippy::large_enum_variant)]
#[derive(Debug, Error)]
enum Error<C: Config> {
    #[error("slot {new_slot} is not later than {old_slot}")]
    SlotNotLater { old_slot: Slot, new_slot: Slot },
    #[error("block is not a descendant of the finalized block (block: {block:?})")]
    BlockNotDescendantOfFinalized { block: SignedBeaconBlock<C> },
    #[error("attestation votes for a checkpoint in the wrong epoch (attestation: {attestation:?})")]
    AttestationTargetsWrongEpoch { attestation: Attestation<C> },
    #[error("attestation votes for a block from the future (attestation: {attestation:?})")]
    AttestationForFutureBlock { attestation: Attestation<C> },
    #[error("attestation does not match its committee: {error:?}")]
    AttestationInvalid { error: helper_functions::Error },
}

/// The freshest attestation target accepted for a validator.
type LatestMessage = Checkpoint;

#[allow(clippy::large_enum_variant)]
#[derive(Debug)]
enum DelayedObject<C: Config> {
    Block(SignedBeaconBlock<C>),
    Attestation(Attestation<C>),
}

pub struct Store<C: Config> {
    slot: Slot,
    justified_checkpoint: Checkpoint,
    finalized_checkpoint: Checkpoint,
    best_justified_checkpoint: Checkpoint,
    // Whole signed blocks are kept because the network stack serves them back
    // in response to queries.
    blocks: HashMap<H256, SignedBeaconBlock<C>>,
    block_states: HashMap<H256, BeaconState<C>>,
    checkpoint_states: HashMap<Checkpoint, BeaconState<C>>,
    latest_messages: HashMap<ValidatorIndex, LatestMessage>,

    delayed_until_block: HashMap<H256, Vec<DelayedObject<C>>>,
    delayed_until_slot: BTreeMap<Slot, Vec<DelayedObject<C>>>,
}

impl<C: Config> Store<C> {
    pub fn new(anchor_state: BeaconState<C>, anchor_block: SignedBeaconBlock<C>) -> Self {
        let epoch = get_current_epoch(&anchor_state);
        let root = hash_tree_root(&anchor_block.message);
        let checkpoint = Checkpoint { epoch, root };

        Self {
            slot: anchor_state.slot,
            justified_checkpoint: checkpoint,
            finalized_checkpoint: checkpoint,
            best_justified_checkpoint: checkpoint,
            blocks: hashmap! {root => anchor_block},
            block_states: hashmap! {root => anchor_state.clone()},
            checkpoint_states: hashmap! {checkpoint => anchor_state},
            latest_messages: hashmap! {},

            delayed_until_block: hashmap! {},
            delayed_until_slot: btreemap! {},
        }
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn justified_checkpoint(&self) -> Checkpoint {
        self.justified_checkpoint
    }

    pub fn finalized_checkpoint(&self) -> Checkpoint {
        self.finalized_checkpoint
    }

    pub fn head_state(&self) -> &BeaconState<C> {
        &self.block_states[&self.get_head()]
    }

    pub fn block(&self, root: H256) -> Option<&SignedBeaconBlock<C>> {
        self.blocks.get(&root)
    }

    pub fn contains_block(&self, root: H256) -> bool {
        self.blocks.contains_key(&root)
    }

    /// Roots of every block in the store, in no particular order.
    pub fn block_roots(&self) -> Vec<H256> {
        self.blocks.keys().copied().collect()
    }

    pub fn block_state(&self, root: H256) -> Option<&BeaconState<C>> {
        self.block_states.get(&root)
    }

    /// The summed effective balance voting for `root` through its
    /// descendants. `None` for unknown blocks.
    pub fn weight(&self, root: H256) -> Option<Gwei> {
        let block = self.blocks.get(&root)?;
        Some(self.latest_attesting_balance(root, &block.message))
    }

    /// Unlike `on_tick` in the specification this is called once per slot;
    /// the fork choice rule does not need a precise timestamp.
    pub fn on_slot(&mut self, slot: Slot) -> Result<()> {
        ensure!(
            self.slot < slot,
            Error::<C>::SlotNotLater {
                old_slot: self.slot,
                new_slot: slot,
            },
        );

        self.slot = slot;

        // A conflicting better checkpoint held back by the bouncing-attack
        // guard is adopted at the epoch boundary.
        if self.slots_since_epoch_start() == 0
            && self.justified_checkpoint.epoch < self.best_justified_checkpoint.epoch
        {
            self.justified_checkpoint = self.best_justified_checkpoint;
        }

        self.retry_delayed_until_slot(slot)
    }

    pub fn on_block(&mut self, signed_block: SignedBeaconBlock<C>) -> Result<()> {
        let block = &signed_block.message;

        let mut finalized_slot = Self::start_of_epoch(self.finalized_checkpoint.epoch);

        // Blocks from slots not later than the finalized block are ignored.
        // This accepts the genesis block and blocks received twice.
        if block.slot <= finalized_slot {
            return Ok(());
        }

        let pre_state = if let Some(state) = self.block_states.get(&block.parent_root) {
            state
        } else {
            self.delay_until_block(block.parent_root, DelayedObject::Block(signed_block));
            return Ok(());
        };

        // Blocks cannot be in the future; their consideration is delayed
        // until their slot arrives.
        if self.slot < block.slot {
            self.delay_until_slot(block.slot, DelayedObject::Block(signed_block));
            return Ok(());
        }

        let block_root = hash_tree_root(block);

        ensure!(
            self.ancestor_without_lookup(block_root, block, finalized_slot)
                == self.finalized_checkpoint.root,
            Error::BlockNotDescendantOfFinalized {
                block: signed_block,
            },
        );

        // Check the block is valid and compute the post-state.
        let state = state_transition(pre_state, &signed_block, true)?;
        self.block_states.insert(block_root, state);
        let state = &self.block_states[&block_root];

        // The block joins the tree only after it has passed every check.
        self.blocks.insert(block_root, signed_block);
        debug!("block {:?} added to the fork choice store", block_root);

        if self.justified_checkpoint.epoch < state.current_justified_checkpoint.epoch {
            if self.best_justified_checkpoint.epoch < state.current_justified_checkpoint.epoch {
                self.best_justified_checkpoint = state.current_justified_checkpoint;
            }
            if self.should_update_justified_checkpoint(state.current_justified_checkpoint) {
                self.justified_checkpoint = state.current_justified_checkpoint;
            }
        }

        if self.finalized_checkpoint.epoch < state.finalized_checkpoint.epoch {
            info!(
                "finalized checkpoint advanced to epoch {}",
                state.finalized_checkpoint.epoch,
            );
            self.finalized_checkpoint = state.finalized_checkpoint;
            finalized_slot = Self::start_of_epoch(self.finalized_checkpoint.epoch);

            // Update justified if the new justified is later than the stored
            // one or if the stored one is not in the finalized chain.
            if self.justified_checkpoint.epoch < state.current_justified_checkpoint.epoch
                || self.ancestor(self.justified_checkpoint.root, finalized_slot)
                    != self.finalized_checkpoint.root
            {
                self.justified_checkpoint = state.current_justified_checkpoint;
            }
        }

        self.retry_delayed_until_block(block_root)
    }

    pub fn on_attestation(&mut self, attestation: Attestation<C>) -> Result<()> {
        self.process_attestation_internal(attestation, true)
    }

    fn process_attestation_internal(
        &mut self,
        attestation: Attestation<C>,
        verify_signature: bool,
    ) -> Result<()> {
        let target = attestation.data.target;
        let target_epoch_start = Self::start_of_epoch(target.epoch);

        // Attestations must be from the current or previous epoch.
        let current_epoch = Self::epoch_at_slot(self.slot);
        // Use the genesis epoch for previous near genesis to avoid underflow.
        let previous_epoch = current_epoch.saturating_sub(1).max(C::genesis_epoch());
        if target.epoch < previous_epoch {
            return Ok(());
        }
        if current_epoch < target.epoch {
            self.delay_until_slot(target_epoch_start, DelayedObject::Attestation(attestation));
            return Ok(());
        }
        ensure!(
            target.epoch == Self::epoch_at_slot(attestation.data.slot),
            Error::<C>::AttestationTargetsWrongEpoch { attestation },
        );

        // The target must be a known block; if not, consideration is delayed
        // until the block is found.
        if !self.block_states.contains_key(&target.root) {
            self.delay_until_block(target.root, DelayedObject::Attestation(attestation));
            return Ok(());
        }
        if self.slot < target_epoch_start {
            self.delay_until_slot(target_epoch_start, DelayedObject::Attestation(attestation));
            return Ok(());
        }

        // The LMD vote must also be for a known block that is not from the
        // future.
        if let Some(ghost_vote_block) = self.blocks.get(&attestation.data.beacon_block_root) {
            ensure!(
                ghost_vote_block.message.slot <= attestation.data.slot,
                Error::<C>::AttestationForFutureBlock { attestation },
            );
        } else {
            self.delay_until_block(
                attestation.data.beacon_block_root,
                DelayedObject::Attestation(attestation),
            );
            return Ok(());
        }

        // Attestations can only affect the fork choice of later slots.
        if self.slot <= attestation.data.slot {
            self.delay_until_slot(
                attestation.data.slot,
                DelayedObject::Attestation(attestation),
            );
            return Ok(());
        }

        // The checkpoint state fully validates the attestation.
        if !self.checkpoint_states.contains_key(&target) {
            let mut target_state = self.block_states[&target.root].clone();
            process_slots(&mut target_state, target_epoch_start)?;
            self.checkpoint_states.insert(target, target_state);
        }
        let target_state = &self.checkpoint_states[&target];

        let indexed_attestation = get_indexed_attestation(target_state, &attestation)
            .map_err(|error| Error::<C>::AttestationInvalid { error })?;
        validate_indexed_attestation(target_state, &indexed_attestation, verify_signature)
            .map_err(|error| Error::<C>::AttestationInvalid { error })?;

        let new_message = LatestMessage {
            epoch: target.epoch,
            root: attestation.data.beacon_block_root,
        };
        for index in indexed_attestation.attesting_indices.iter().copied() {
            self.latest_messages
                .entry(index)
                .and_modify(|old_message| {
                    if old_message.epoch < new_message.epoch {
                        *old_message = new_message;
                    }
                })
                .or_insert(new_message);
        }

        Ok(())
    }

    fn slots_since_epoch_start(&self) -> Slot {
        self.slot - Self::start_of_epoch(Self::epoch_at_slot(self.slot))
    }

    fn ancestor(&self, root: H256, slot: Slot) -> H256 {
        self.ancestor_without_lookup(root, &self.blocks[&root].message, slot)
    }

    // The extra `block` parameter makes it possible to walk from a block that
    // has not been added to the tree yet. Its parent must be present.
    fn ancestor_without_lookup(&self, root: H256, block: &BeaconBlock<C>, slot: Slot) -> H256 {
        if block.slot <= slot {
            root
        } else {
            self.ancestor(block.parent_root, slot)
        }
    }

    fn latest_attesting_balance(&self, root: H256, block: &BeaconBlock<C>) -> Gwei {
        let justified_state = &self.checkpoint_states[&self.justified_checkpoint];
        let active_indices = get_active_validator_indices(
            justified_state,
            get_current_epoch(justified_state),
        );

        active_indices
            .into_iter()
            .filter_map(|index| {
                let latest_message = self.latest_messages.get(&index)?;
                if self.ancestor(latest_message.root, block.slot) == root {
                    let index = usize::try_from(index)
                        .expect("validator indices fit in usize");
                    Some(justified_state.validators[index].effective_balance)
                } else {
                    None
                }
            })
            .sum()
    }

    /// The block tree restricted to branches whose leaf states agree with
    /// the store's justified and finalized checkpoints.
    fn filtered_block_tree(&self) -> HashMap<H256, &SignedBeaconBlock<C>> {
        let base = self.justified_checkpoint.root;
        let mut blocks = hashmap! {};
        self.filter_block_tree(base, &mut blocks);
        blocks
    }

    fn filter_block_tree<'s>(
        &'s self,
        root: H256,
        blocks: &mut HashMap<H256, &'s SignedBeaconBlock<C>>,
    ) -> bool {
        let block = &self.blocks[&root];
        let mut children = self
            .blocks
            .iter()
            .filter(|(_, signed_block)| signed_block.message.parent_root == root)
            .map(|(child_root, _)| *child_root)
            .peekable();

        if children.peek().is_some() {
            let mut any_viable = false;
            for child in children {
                if self.filter_block_tree(child, blocks) {
                    any_viable = true;
                }
            }
            if any_viable {
                blocks.insert(root, block);
            }
            return any_viable;
        }

        // A leaf block is viable when its checkpoints match the store's.
        let head_state = &self.block_states[&root];
        let correct_justified = self.justified_checkpoint.epoch == C::genesis_epoch()
            || self.justified_checkpoint == head_state.current_justified_checkpoint;
        let correct_finalized = self.finalized_checkpoint.epoch == C::genesis_epoch()
            || self.finalized_checkpoint == head_state.finalized_checkpoint;
        if correct_justified && correct_finalized {
            blocks.insert(root, block);
            return true;
        }

        false
    }

    pub fn get_head(&self) -> H256 {
        let blocks = self.filtered_block_tree();

        let mut head = self.justified_checkpoint.root;
        let justified_slot = Self::start_of_epoch(self.justified_checkpoint.epoch);

        loop {
            // The child with the greatest attesting balance wins; ties break
            // toward the lexicographically greater root.
            let child_with_plurality = blocks
                .iter()
                .filter_map(|(root, signed_block)| {
                    let child = &signed_block.message;
                    if child.parent_root == head && justified_slot < child.slot {
                        Some((self.latest_attesting_balance(*root, child), *root))
                    } else {
                        None
                    }
                })
                .max();

            match child_with_plurality {
                Some((_, root)) => head = root,
                None => break head,
            }
        }
    }

    /// To address the bouncing attack, conflicting justified checkpoints are
    /// only adopted in the early slots of an epoch.
    fn should_update_justified_checkpoint(&self, new_justified_checkpoint: Checkpoint) -> bool {
        if self.slots_since_epoch_start() < C::safe_slots_to_update_justified() {
            return true;
        }

        let justified_slot = Self::start_of_epoch(self.justified_checkpoint.epoch);
        self.ancestor(new_justified_checkpoint.root, justified_slot)
            == self.justified_checkpoint.root
    }

    fn start_of_epoch(epoch: Epoch) -> Slot {
        compute_start_slot_at_epoch::<C>(epoch)
    }

    fn epoch_at_slot(slot: Slot) -> Epoch {
        compute_epoch_at_slot::<C>(slot)
    }

    fn delay_until_block(&mut self, block_root: H256, object: DelayedObject<C>) {
        debug!("object delayed until block {:?}: {:?}", block_root, object);
        self.delayed_until_block
            .entry(block_root)
            .or_default()
            .push(object)
    }

    fn delay_until_slot(&mut self, slot: Slot, object: DelayedObject<C>) {
        debug!("object delayed until slot {}: {:?}", slot, object);
        self.delayed_until_slot
            .entry(slot)
            .or_default()
            .push(object)
    }

    fn retry_delayed_until_block(&mut self, block_root: H256) -> Result<()> {
        if let Some(delayed_objects) = self.delayed_until_block.remove(&block_root) {
            self.retry_delayed(delayed_objects)?;
        }
        Ok(())
    }

    fn retry_delayed_until_slot(&mut self, slot: Slot) -> Result<()> {
        let later_slots = self.delayed_until_slot.split_off(&(slot + 1));
        let fulfilled_slots = mem::replace(&mut self.delayed_until_slot, later_slots);
        for (_, objects) in fulfilled_slots {
            self.retry_delayed(objects)?;
        }
        Ok(())
    }

    fn retry_delayed(&mut self, objects: Vec<DelayedObject<C>>) -> Result<()> {
        for object in objects {
            debug!("retrying delayed object: {:?}", object);
            match object {
                DelayedObject::Block(signed_block) => self.on_block(signed_block)?,
                DelayedObject::Attestation(attestation) => {
                    self.process_attestation_internal(attestation, true)?
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bls::{Keypair, Signature};
    use ssz_types::BitList;
    use helper_functions::beacon_state_accessors::{
        get_beacon_committee, get_beacon_proposer_index, get_domain,
    };
    use transition_functions::block_processing::process_block;
    use transition_functions::genesis;
    use types::config::MinimalConfig;
    use types::primitives::SignatureBytes;
    use types::types::AttestationData;

    use super::*;

    const BALANCE: Gwei = 32_000_000_000;

    fn genesis_setup() -> (Vec<Keypair>, BeaconState<MinimalConfig>, H256) {
        let keypairs = genesis::interop_keypairs(16);
        let deposits = genesis::interop_deposits::<MinimalConfig>(&keypairs, BALANCE);
        let state = genesis::initialize_beacon_state_from_eth1(H256::zero(), 0, &deposits)
            .expect("interop deposits carry valid proofs");
        let block = genesis::genesis_block(&state);
        let root = hash_tree_root(&block.message);
        (keypairs, state, root)
    }

    fn make_child(
        parent_state: &BeaconState<MinimalConfig>,
        keypairs: &[Keypair],
        slot: Slot,
        graffiti: H256,
    ) -> SignedBeaconBlock<MinimalConfig> {
        let mut block = SignedBeaconBlock::<MinimalConfig>::default();
        block.message.slot = slot;
        block.message.body.graffiti = graffiti;

        let mut scratch = parent_state.clone();
        process_slots(&mut scratch, slot).expect("the parent state advances cleanly");
        block.message.parent_root = hash_tree_root(&scratch.latest_block_header);

        let proposer_index =
            get_beacon_proposer_index(&scratch).expect("the active set is not empty");
        let proposer_sk = &keypairs[proposer_index as usize].sk;

        let epoch = compute_epoch_at_slot::<MinimalConfig>(slot);
        let randao_domain = get_domain(
            &scratch,
            <MinimalConfig as Config>::domain_randao(),
            None,
        );
        let reveal = Signature::new(
            hash_tree_root(&epoch).as_bytes(),
            randao_domain.to_integer(),
            proposer_sk,
        );
        block.message.body.randao_reveal = SignatureBytes::from_bytes(&reveal.as_bytes())
            .expect("the signature round-trips through bytes");

        block.message.state_root = {
            let mut working = scratch.clone();
            process_block(&mut working, &block, false)
                .expect("the unsigned block applies cleanly");
            hash_tree_root(&working)
        };
        let proposer_domain = get_domain(
            &scratch,
            <MinimalConfig as Config>::domain_beacon_proposer(),
            None,
        );
        let signature = Signature::new(
            hash_tree_root(&block.message).as_bytes(),
            proposer_domain.to_integer(),
            proposer_sk,
        );
        block.signature = SignatureBytes::from_bytes(&signature.as_bytes())
            .expect("the signature round-trips through bytes");

        block
    }

    fn vote(
        state: &BeaconState<MinimalConfig>,
        slot: Slot,
        beacon_block_root: H256,
        target: Checkpoint,
    ) -> Attestation<MinimalConfig> {
        let committee =
            get_beacon_committee(state, slot, 0).expect("the committee is computable");
        let mut bits =
            BitList::with_capacity(committee.len()).expect("the committee fits the bound");
        for i in 0..committee.len() {
            bits.set(i, true).expect("the index is in range");
        }
        Attestation {
            aggregation_bits: bits,
            data: AttestationData {
                slot,
                index: 0,
                beacon_block_root,
                source: Checkpoint::default(),
                target,
            },
            signature: types::primitives::AggregateSignatureBytes::empty(),
        }
    }

    #[test]
    fn the_heavier_sibling_wins_and_new_votes_can_reorg() {
        let (keypairs, genesis_state, genesis_root) = genesis_setup();
        let mut store = Store::new(genesis_state.clone(), genesis::genesis_block(&genesis_state));

        let block_1 = make_child(&genesis_state, &keypairs, 1, H256::from_low_u64_be(1));
        let block_2 = make_child(&genesis_state, &keypairs, 1, H256::from_low_u64_be(2));
        let root_1 = hash_tree_root(&block_1.message);
        let root_2 = hash_tree_root(&block_2.message);

        store.on_slot(8).expect("slot 8 is later than the anchor slot");
        store.on_block(block_1).expect("the first sibling is valid");
        store.on_block(block_2).expect("the second sibling is valid");

        let target = Checkpoint {
            epoch: 0,
            root: genesis_root,
        };

        // Two committees (four validators) vote for the first sibling, three
        // committees (six validators) for the second.
        for slot in &[1, 2] {
            store
                .process_attestation_internal(
                    vote(&genesis_state, *slot, root_1, target),
                    false,
                )
                .expect("the vote matches its committee");
        }
        for slot in &[3, 4, 5] {
            store
                .process_attestation_internal(
                    vote(&genesis_state, *slot, root_2, target),
                    false,
                )
                .expect("the vote matches its committee");
        }

        assert_eq!(store.weight(root_1), Some(4 * BALANCE));
        assert_eq!(store.weight(root_2), Some(6 * BALANCE));
        assert_eq!(store.get_head(), root_2);

        // Additional weight flips the head back.
        for slot in &[6, 7] {
            store
                .process_attestation_internal(
                    vote(&genesis_state, *slot, root_1, target),
                    false,
                )
                .expect("the vote matches its committee");
        }

        assert_eq!(store.weight(root_1), Some(8 * BALANCE));
        assert_eq!(store.get_head(), root_1);
    }

    #[test]
    fn equal_weights_break_ties_toward_the_greater_root() {
        let (keypairs, genesis_state, genesis_root) = genesis_setup();
        let mut store = Store::new(genesis_state.clone(), genesis::genesis_block(&genesis_state));

        let block_1 = make_child(&genesis_state, &keypairs, 1, H256::from_low_u64_be(1));
        let block_2 = make_child(&genesis_state, &keypairs, 1, H256::from_low_u64_be(2));
        let root_1 = hash_tree_root(&block_1.message);
        let root_2 = hash_tree_root(&block_2.message);

        store.on_slot(8).expect("slot 8 is later than the anchor slot");
        store.on_block(block_1).expect("the first sibling is valid");
        store.on_block(block_2).expect("the second sibling is valid");

        let target = Checkpoint {
            epoch: 0,
            root: genesis_root,
        };
        for slot in &[1, 2] {
            store
                .process_attestation_internal(
                    vote(&genesis_state, *slot, root_1, target),
                    false,
                )
                .expect("the vote matches its committee");
        }
        for slot in &[3, 4] {
            store
                .process_attestation_internal(
                    vote(&genesis_state, *slot, root_2, target),
                    false,
                )
                .expect("the vote matches its committee");
        }

        assert_eq!(store.weight(root_1), store.weight(root_2));
        assert_eq!(store.get_head(), root_1.max(root_2));
    }

    #[test]
    fn a_block_with_an_unknown_parent_is_delayed_until_the_parent_arrives() {
        let (keypairs, genesis_state, _) = genesis_setup();
        let mut store = Store::new(genesis_state.clone(), genesis::genesis_block(&genesis_state));

        let block_1 = make_child(&genesis_state, &keypairs, 1, H256::from_low_u64_be(1));
        let state_1 = state_transition(&genesis_state, &block_1, true)
            .expect("the first block is valid");
        let block_2 = make_child(&state_1, &keypairs, 2, H256::from_low_u64_be(2));
        let root_1 = hash_tree_root(&block_1.message);
        let root_2 = hash_tree_root(&block_2.message);

        store.on_slot(8).expect("slot 8 is later than the anchor slot");

        store.on_block(block_2).expect("an orphan block is delayed, not rejected");
        assert!(!store.contains_block(root_2));

        store.on_block(block_1).expect("the parent is valid");
        assert!(store.contains_block(root_1));
        assert!(store.contains_block(root_2));
        assert_eq!(store.get_head(), root_2);
    }

    #[test]
    fn an_attestation_for_the_wrong_epoch_is_rejected() {
        let (_, genesis_state, genesis_root) = genesis_setup();
        let mut store = Store::new(genesis_state.clone(), genesis::genesis_block(&genesis_state));
        store.on_slot(8).expect("slot 8 is later than the anchor slot");

        // The target says epoch 0 but the attestation slot is in epoch 1.
        let attestation = vote(
            &genesis_state,
            1,
            genesis_root,
            Checkpoint {
                epoch: 0,
                root: genesis_root,
            },
        );
        let mut wrong = attestation;
        wrong.data.slot = 8;

        assert!(store.process_attestation_internal(wrong, false).is_err());
    }

    #[test]
    fn on_slot_rejects_going_backwards() {
        let (_, genesis_state, _) = genesis_setup();
        let mut store = Store::new(genesis_state.clone(), genesis::genesis_block(&genesis_state));
        store.on_slot(5).expect("slot 5 is later than the anchor slot");
        assert!(store.on_slot(5).is_err());
    }
}
