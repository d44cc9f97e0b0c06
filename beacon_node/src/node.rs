//! The engine task. It owns the mutable fork-choice store and the chain
//! database; every other component reaches them through this type, so
//! inbound blocks and attestations are applied strictly in arrival order.

use std::sync::Arc;

use anyhow::Result;
use log::info;

use beacon_fork_choice::Store;
use chain_db::{BeaconChainDB, MemoryDB};
use eth2_network::sync::Chain;
use eth2_network::{Networked, Status};
use helper_functions::crypto::hash_tree_root;
use helper_functions::misc::compute_start_slot_at_epoch;
use transition_functions::genesis;
use types::beacon_state::BeaconState;
use types::config::Config;
use types::primitives::{Slot, H256};
use types::types::{Attestation, Checkpoint, SignedBeaconBlock};

pub struct Node<C: Config> {
    store: Store<C>,
    chain_db: BeaconChainDB<C, MemoryDB>,
}

impl<C: Config> Node<C> {
    pub fn new(genesis_state: BeaconState<C>) -> Result<Self> {
        let genesis_block = genesis::genesis_block(&genesis_state);
        let chain_db = BeaconChainDB::new(Arc::new(MemoryDB::open()));
        chain_db.persist_state(&genesis_state)?;
        chain_db.persist_block(genesis_block.clone(), 0)?;

        Ok(Self {
            store: Store::new(genesis_state, genesis_block),
            chain_db,
        })
    }

    pub fn head_state(&self) -> &BeaconState<C> {
        self.store.head_state()
    }

    pub fn chain_db(&self) -> &BeaconChainDB<C, MemoryDB> {
        &self.chain_db
    }

    pub fn handle_slot_start(&mut self, slot: Slot) -> Result<()> {
        info!("slot {} started", slot);
        self.store.on_slot(slot)?;
        // Blocks delayed until this slot may have entered the store.
        self.reconcile_chain_db()
    }

    pub fn handle_slot_midpoint(&mut self, slot: Slot) {
        info!("slot {} midpoint", slot);
    }

    /// Persist any block the store accepted that is not durable yet. The
    /// score of a block is its parent's score plus its own weight, so a
    /// heavier branch overtakes the canonical index.
    fn reconcile_chain_db(&self) -> Result<()> {
        let mut roots = self.store.block_roots();
        roots.sort_by_key(|root| {
            self.store
                .block(*root)
                .map(|block| block.message.slot)
                .unwrap_or(0)
        });

        for root in roots {
            if self.chain_db.block_exists(root)? {
                continue;
            }
            let block = self
                .store
                .block(root)
                .expect("the root was just listed by the store")
                .clone();

            let parent_score = if block.message.parent_root == H256::zero() {
                0
            } else {
                self.chain_db.get_score(block.message.parent_root)?
            };
            let weight = self.store.weight(root).unwrap_or(0);
            self.chain_db.persist_block(block, parent_score + 1 + weight)?;

            if let Some(state) = self.store.block_state(root) {
                self.chain_db.persist_state(state)?;
            }
        }
        Ok(())
    }
}

impl<C: Config> Networked<C> for Node<C> {
    fn accept_beacon_block(&mut self, block: SignedBeaconBlock<C>) -> Result<()> {
        info!("received beacon block for slot {}", block.message.slot);
        self.store.on_block(block)?;
        self.reconcile_chain_db()
    }

    fn accept_beacon_attestation(&mut self, attestation: Attestation<C>) -> Result<()> {
        info!(
            "received beacon attestation for slot {}",
            attestation.data.slot,
        );
        self.store.on_attestation(attestation)
    }

    fn get_status(&self) -> Status {
        let head_state = self.store.head_state();
        let Checkpoint { epoch, root } = self.store.finalized_checkpoint();
        Status {
            fork_version: head_state.fork.current_version,
            finalized_root: root,
            finalized_epoch: epoch,
            head_root: self.store.get_head(),
            head_slot: head_state.slot,
        }
    }

    fn get_beacon_block(&self, root: H256) -> Option<SignedBeaconBlock<C>> {
        self.store.block(root).cloned()
    }
}

impl<C: Config> Chain<C> for Node<C> {
    fn finalized_slot(&self) -> Slot {
        compute_start_slot_at_epoch::<C>(self.store.finalized_checkpoint().epoch)
    }

    fn canonical_block_root(&self, slot: Slot) -> Option<H256> {
        self.chain_db.get_canonical_block_hash(slot).ok()
    }

    fn import_blocks(&mut self, blocks: Vec<SignedBeaconBlock<C>>) -> Result<()> {
        // Validate the whole batch before anything becomes durable.
        for block in blocks {
            self.store.on_block(block)?;
        }
        self.reconcile_chain_db()
    }
}
