//! The block chain database: a content-addressed block and state store over
//! an ordered key-value backend, with a sparse slot-to-hash canonical index
//! and a per-block fork-choice score. All writes of a `persist_*` call land
//! in one atomic batch, so a crash or cancellation between calls leaves the
//! database consistent.

pub mod memory;
pub mod schema;

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use log::info;
use ssz::{Decode as _, Encode as _};
use thiserror::Error;

use helper_functions::crypto::hash_tree_root;
use types::beacon_state::BeaconState;
use types::config::Config;
use types::primitives::{Slot, H256};
use types::types::SignedBeaconBlock;

pub use crate::memory::{BatchOp, ClientDB, MemoryDB};

#[derive(Clone, PartialEq, Debug, Error)]
#[error("database failure: {message}")]
pub struct DbError {
    pub message: String,
}

impl DbError {
    pub(crate) fn poisoned() -> Self {
        Self {
            message: "a writer panicked while holding the lock".to_string(),
        }
    }
}

#[derive(Debug, PartialEq, Error)]
pub enum Error {
    #[error("block not found")]
    BlockNotFound,
    #[error("no canonical head has been set")]
    CanonicalHeadNotFound,
    #[error("state not found")]
    StateNotFound,
    #[error("cannot persist a block chain with an unknown parent")]
    ParentNotFound,
    #[error("blocks do not form a contiguous chain")]
    NonContiguousChain,
    #[error("stored value cannot be decoded: {0:?}")]
    Corrupted(ssz::DecodeError),
    #[error("{0}")]
    Database(#[from] DbError),
}

/// A block annotated with its fork-choice score at persist time.
pub struct ScoredBlock<C: Config> {
    pub block: SignedBeaconBlock<C>,
    pub score: u64,
}

pub struct BeaconChainDB<C: Config, DB: ClientDB> {
    db: Arc<DB>,
    phantom: PhantomData<C>,
}

impl<C: Config, DB: ClientDB> BeaconChainDB<C, DB> {
    pub fn new(db: Arc<DB>) -> Self {
        Self {
            db,
            phantom: PhantomData,
        }
    }

    /// Persist one block. Re-organizes the canonical index if the block's
    /// score beats the current head's.
    pub fn persist_block(
        &self,
        block: SignedBeaconBlock<C>,
        score: u64,
    ) -> Result<(Vec<H256>, Vec<H256>), Error> {
        self.persist_block_chain(vec![ScoredBlock { block, score }])
    }

    /// Persist a contiguous chain of blocks in one atomic batch.
    ///
    /// Returns the roots that became canonical and the roots that ceased to
    /// be, oldest first. Re-orgs rewrite the slot-to-hash index from the new
    /// head back to the fork point and delete entries of the displaced
    /// branch that the new branch does not cover.
    pub fn persist_block_chain(
        &self,
        blocks: Vec<ScoredBlock<C>>,
    ) -> Result<(Vec<H256>, Vec<H256>), Error> {
        let first = match blocks.first() {
            Some(scored) => &scored.block,
            None => return Ok((vec![], vec![])),
        };

        for window in blocks.windows(2) {
            let parent = &window[0].block;
            let child = &window[1].block;
            if child.message.parent_root != hash_tree_root(&parent.message) {
                return Err(Error::NonContiguousChain);
            }
        }

        let is_genesis = first.message.parent_root == H256::zero();
        if !is_genesis && !self.block_exists(first.message.parent_root)? {
            return Err(Error::ParentNotFound);
        }

        let mut batch = Vec::new();
        let mut pending: HashMap<H256, &SignedBeaconBlock<C>> = HashMap::new();
        let mut tip_root = H256::zero();
        let mut tip_score = 0;

        for scored in &blocks {
            let root = hash_tree_root(&scored.block.message);
            batch.push(BatchOp::Put {
                key: schema::block_key(root),
                value: scored.block.as_ssz_bytes(),
            });
            batch.push(BatchOp::Put {
                key: schema::score_key(root),
                value: scored.score.to_be_bytes().to_vec(),
            });
            pending.insert(root, &scored.block);
            tip_root = root;
            tip_score = scored.score;
        }

        let reindexed = match self.head_score()? {
            Some(head_score) if tip_score <= head_score => (vec![], vec![]),
            _ => self.plan_canonical_head(tip_root, &pending, &mut batch)?,
        };

        self.db.write_batch(batch)?;
        Ok(reindexed)
    }

    /// Extend `batch` with the index writes that make `head_root` canonical.
    fn plan_canonical_head(
        &self,
        head_root: H256,
        pending: &HashMap<H256, &SignedBeaconBlock<C>>,
        batch: &mut Vec<BatchOp>,
    ) -> Result<(Vec<H256>, Vec<H256>), Error> {
        let old_head_slot = match self.get_canonical_head_root()? {
            Some(root) => Some(self.lookup_block(root, pending)?.message.slot),
            None => None,
        };

        // Walk from the new head down to the first ancestor that is already
        // canonical.
        let mut new_canonical: Vec<(Slot, H256)> = Vec::new();
        let mut cursor = head_root;
        let fork_slot = loop {
            let block = self.lookup_block(cursor, pending)?;
            if self.canonical_hash_at_slot(block.message.slot)? == Some(cursor) {
                break block.message.slot;
            }
            new_canonical.push((block.message.slot, cursor));
            if block.message.parent_root == H256::zero() {
                break 0;
            }
            cursor = block.message.parent_root;
        };
        new_canonical.reverse();

        let new_slots: HashMap<Slot, H256> = new_canonical.iter().copied().collect();

        // Displaced entries of the old branch above the fork point are
        // deleted, not merely overwritten.
        let mut old_canonical = Vec::new();
        if let Some(old_head_slot) = old_head_slot {
            for slot in fork_slot + 1..=old_head_slot {
                if let Some(old_root) = self.canonical_hash_at_slot(slot)? {
                    if new_slots.get(&slot) != Some(&old_root) {
                        old_canonical.push(old_root);
                        if !new_slots.contains_key(&slot) {
                            batch.push(BatchOp::Delete {
                                key: schema::slot_to_hash_key(slot),
                            });
                        }
                    }
                }
            }
        }

        for (slot, root) in &new_canonical {
            batch.push(BatchOp::Put {
                key: schema::slot_to_hash_key(*slot),
                value: root.as_bytes().to_vec(),
            });
        }
        batch.push(BatchOp::Put {
            key: schema::HEAD_ROOT_KEY.to_vec(),
            value: head_root.as_bytes().to_vec(),
        });

        if !old_canonical.is_empty() {
            info!(
                "re-org: {} blocks displaced, new head {:?}",
                old_canonical.len(),
                head_root,
            );
        }

        Ok((
            new_canonical.into_iter().map(|(_, root)| root).collect(),
            old_canonical,
        ))
    }

    fn lookup_block(
        &self,
        root: H256,
        pending: &HashMap<H256, &SignedBeaconBlock<C>>,
    ) -> Result<SignedBeaconBlock<C>, Error> {
        if let Some(block) = pending.get(&root) {
            return Ok((*block).clone());
        }
        self.get_block_by_root(root)
    }

    pub fn get_block_by_root(&self, root: H256) -> Result<SignedBeaconBlock<C>, Error> {
        let bytes = self
            .db
            .get(&schema::block_key(root))?
            .ok_or(Error::BlockNotFound)?;
        SignedBeaconBlock::from_ssz_bytes(&bytes).map_err(Error::Corrupted)
    }

    pub fn block_exists(&self, root: H256) -> Result<bool, Error> {
        Ok(self.db.exists(&schema::block_key(root))?)
    }

    pub fn get_score(&self, root: H256) -> Result<u64, Error> {
        let bytes = self
            .db
            .get(&schema::score_key(root))?
            .ok_or(Error::BlockNotFound)?;
        let mut array = [0; 8];
        if bytes.len() != 8 {
            return Err(Error::Corrupted(ssz::DecodeError::InvalidByteLength {
                len: bytes.len(),
                expected: 8,
            }));
        }
        array.copy_from_slice(&bytes);
        Ok(u64::from_be_bytes(array))
    }

    fn canonical_hash_at_slot(&self, slot: Slot) -> Result<Option<H256>, Error> {
        Ok(self
            .db
            .get(&schema::slot_to_hash_key(slot))?
            .map(|bytes| H256::from_slice(&bytes)))
    }

    /// The canonical block root at `slot`. Slots with no canonical block
    /// fail with `BlockNotFound`.
    pub fn get_canonical_block_hash(&self, slot: Slot) -> Result<H256, Error> {
        self.canonical_hash_at_slot(slot)?.ok_or(Error::BlockNotFound)
    }

    pub fn get_canonical_block_by_slot(&self, slot: Slot) -> Result<SignedBeaconBlock<C>, Error> {
        let root = self.get_canonical_block_hash(slot)?;
        self.get_block_by_root(root)
    }

    fn get_canonical_head_root(&self) -> Result<Option<H256>, Error> {
        Ok(self
            .db
            .get(schema::HEAD_ROOT_KEY)?
            .map(|bytes| H256::from_slice(&bytes)))
    }

    fn head_score(&self) -> Result<Option<u64>, Error> {
        match self.get_canonical_head_root()? {
            Some(root) => Ok(Some(self.get_score(root)?)),
            None => Ok(None),
        }
    }

    /// Fails with `CanonicalHeadNotFound` only before genesis is written.
    pub fn get_canonical_head(&self) -> Result<SignedBeaconBlock<C>, Error> {
        let root = self
            .get_canonical_head_root()?
            .ok_or(Error::CanonicalHeadNotFound)?;
        self.get_block_by_root(root)
    }

    pub fn persist_state(&self, state: &BeaconState<C>) -> Result<H256, Error> {
        let root = hash_tree_root(state);
        self.db.put(&schema::state_key(root), &state.as_ssz_bytes())?;
        Ok(root)
    }

    pub fn get_state_by_root(&self, root: H256) -> Result<BeaconState<C>, Error> {
        let bytes = self
            .db
            .get(&schema::state_key(root))?
            .ok_or(Error::StateNotFound)?;
        BeaconState::from_ssz_bytes(&bytes).map_err(Error::Corrupted)
    }

    /// States older than finalization may be dropped.
    pub fn delete_state(&self, root: H256) -> Result<(), Error> {
        Ok(self.db.delete(&schema::state_key(root))?)
    }
}
