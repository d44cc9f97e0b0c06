use typenum::marker_traits::Unsigned as _;
use types::beacon_state::BeaconState;
use types::config::Config;
use types::primitives::{Slot, H256};
use types::types::SignedBeaconBlock;

use helper_functions::crypto::hash_tree_root;

use crate::block_processing;
use crate::epoch_processing;
use crate::error::Error;

/// Advance `state` to the block's slot and apply the block. The input state
/// is never mutated: a failed transition leaves the caller's value intact.
///
/// `validate_state_root` is true in production; block producers turn it off
/// while they are still computing the root to put in the block.
pub fn state_transition<C: Config>(
    state: &BeaconState<C>,
    signed_block: &SignedBeaconBlock<C>,
    validate_state_root: bool,
) -> Result<BeaconState<C>, Error> {
    let mut post = state.clone();

    process_slots(&mut post, signed_block.message.slot)?;
    block_processing::process_block(&mut post, signed_block, true)?;

    if validate_state_root {
        let computed = hash_tree_root(&post);
        if signed_block.message.state_root != computed {
            return Err(Error::StateRootMismatch {
                in_block: signed_block.message.state_root,
                computed,
            });
        }
    }

    Ok(post)
}

/// Advance through empty slots, processing the epoch boundary where one is
/// crossed.
pub fn process_slots<C: Config>(state: &mut BeaconState<C>, slot: Slot) -> Result<(), Error> {
    if slot < state.slot {
        return Err(Error::SlotsOutOfOrder {
            current: state.slot,
            target: slot,
        });
    }
    while state.slot < slot {
        process_slot(state);
        // Process the epoch on the start slot of the next epoch.
        if (state.slot + 1) % C::SlotsPerEpoch::U64 == 0 {
            epoch_processing::process_epoch(state)?;
        }
        state.slot += 1;
    }
    Ok(())
}

fn process_slot<C: Config>(state: &mut BeaconState<C>) {
    let slots_per_historical_root = C::SlotsPerHistoricalRoot::U64;

    // Cache the state root.
    let previous_state_root = hash_tree_root(state);
    state.state_roots[(state.slot % slots_per_historical_root) as usize] = previous_state_root;

    // The header of the previous block is stored with a zeroed state root
    // until the state at its slot is known.
    if state.latest_block_header.state_root == H256::zero() {
        state.latest_block_header.state_root = previous_state_root;
    }

    // Cache the block root.
    let previous_block_root = hash_tree_root(&state.latest_block_header);
    state.block_roots[(state.slot % slots_per_historical_root) as usize] = previous_block_root;
}
