//! The block-sync loop: pull contiguous batches from the best peer until the
//! local chain is linked to the peer's head.

use anyhow::{ensure, Result};
use log::{debug, info};
use thiserror::Error;

use helper_functions::crypto::hash_tree_root;
use types::config::Config;
use types::primitives::{Slot, H256};
use types::types::SignedBeaconBlock;

use crate::MAX_BLOCKS_PER_REQUEST;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("the canonical block before the sync start is unknown")]
    UnknownStartBlock,
    #[error("the peer's chain disagrees with the finalized block at slot {slot}")]
    FirstBatchNotLinked { slot: Slot },
    #[error("a received batch is not linked to the previous one")]
    BatchNotLinked,
}

/// A peer able to serve ranges of its canonical chain.
pub trait SyncPeer<C: Config> {
    fn head_slot(&self) -> Slot;

    /// Up to `max_blocks` canonical blocks starting at `start_slot`, in
    /// ascending slot order. Missing blocks mean a short or empty response,
    /// not an error.
    fn request_beacon_blocks(
        &self,
        start_slot: Slot,
        max_blocks: u64,
    ) -> Result<Vec<SignedBeaconBlock<C>>>;
}

/// The local chain as seen by the syncer.
pub trait Chain<C: Config> {
    fn finalized_slot(&self) -> Slot;

    fn canonical_block_root(&self, slot: Slot) -> Option<H256>;

    /// Validate and persist a batch atomically. An invalid batch must leave
    /// the chain untouched.
    fn import_blocks(&mut self, blocks: Vec<SignedBeaconBlock<C>>) -> Result<()>;
}

/// Sync from the local finalized head toward the best peer's head.
pub struct BeaconChainSyncer<'a, C: Config, P: SyncPeer<C>, Ch: Chain<C>> {
    chain: &'a mut Ch,
    peers: &'a [P],
    phantom: std::marker::PhantomData<C>,
}

impl<'a, C: Config, P: SyncPeer<C>, Ch: Chain<C>> BeaconChainSyncer<'a, C, P, Ch> {
    pub fn new(chain: &'a mut Ch, peers: &'a [P]) -> Self {
        Self {
            chain,
            peers,
            phantom: std::marker::PhantomData,
        }
    }

    pub fn run(mut self) -> Result<()> {
        let sync_peer = match self.select_sync_peer() {
            Some(peer) => peer,
            None => {
                info!("no suitable peers to sync with");
                return Ok(());
            }
        };

        info!(
            "syncing (peer head slot: {}, our finalized slot: {})",
            sync_peer.head_slot(),
            self.chain.finalized_slot(),
        );
        self.sync(sync_peer)
    }

    /// The peer with the greatest advertised head slot, provided it is ahead
    /// of the local finalized head.
    fn select_sync_peer(&self) -> Option<&'a P> {
        let best_peer = self.peers.iter().max_by_key(|peer| peer.head_slot())?;
        if best_peer.head_slot() <= self.chain.finalized_slot() {
            return None;
        }
        Some(best_peer)
    }

    fn sync(&mut self, peer: &P) -> Result<()> {
        let start_slot = self.chain.finalized_slot() + 1;
        let mut slot = start_slot;
        let mut previous_tail: Option<H256> = None;

        loop {
            debug!("requesting blocks starting at slot {}", slot);
            let batch = peer.request_beacon_blocks(slot, MAX_BLOCKS_PER_REQUEST)?;
            let batch_tail = match batch.last() {
                Some(block) => block.message.slot,
                None => break,
            };

            match previous_tail {
                None => self.validate_first_batch(&batch, start_slot)?,
                Some(tail_root) => ensure!(
                    batch[0].message.parent_root == tail_root,
                    SyncError::BatchNotLinked,
                ),
            }
            previous_tail = Some(hash_tree_root(
                &batch.last().expect("the batch is not empty").message,
            ));

            // No partial commit: the whole batch is validated and persisted
            // or none of it is.
            self.chain.import_blocks(batch)?;
            slot = batch_tail + 1;
        }

        Ok(())
    }

    /// The first batch must attach to our canonical chain right after the
    /// finalized head.
    fn validate_first_batch(
        &self,
        batch: &[SignedBeaconBlock<C>],
        start_slot: Slot,
    ) -> Result<()> {
        let expected = self
            .chain
            .canonical_block_root(start_slot - 1)
            .ok_or(SyncError::UnknownStartBlock)?;
        ensure!(
            batch[0].message.parent_root == expected,
            SyncError::FirstBatchNotLinked {
                slot: start_slot - 1,
            },
        );
        Ok(())
    }
}
