use itertools::{Either, Itertools as _};
use log::debug;
use ssz_types::VariableList;
use std::cmp;
use std::mem;
use typenum::marker_traits::Unsigned as _;
use types::beacon_state::BeaconState;
use types::config::Config;
use types::consts::JUSTIFICATION_BITS_LENGTH;
use types::primitives::{Epoch, Gwei, ValidatorIndex};
use types::types::{Checkpoint, HistoricalBatch, Validator};

use helper_functions::beacon_state_accessors::{
    get_active_validator_indices, get_block_root, get_current_epoch, get_previous_epoch,
    get_randao_mix, get_total_active_balance, get_validator_churn_limit,
};
use helper_functions::beacon_state_mutators::{decrease_balance, initiate_validator_exit};
use helper_functions::crypto::hash_tree_root;
use helper_functions::misc::compute_activation_exit_epoch;
use helper_functions::predicates::is_active_validator;

use crate::attestations::AttestableBlock as _;
use crate::error::Error;
use crate::rewards_and_penalties::StakeholderBlock as _;

/// The epoch-boundary pipeline, in order.
pub fn process_epoch<C: Config>(state: &mut BeaconState<C>) -> Result<(), Error> {
    debug!("processing the boundary of epoch {}", get_current_epoch(state));
    process_justification_and_finalization(state)?;
    state.process_rewards_and_penalties()?;
    process_registry_updates(state)?;
    process_slashings(state)?;
    process_final_updates(state)?;
    Ok(())
}

pub fn process_justification_and_finalization<C: Config>(
    state: &mut BeaconState<C>,
) -> Result<(), Error> {
    let current_epoch = get_current_epoch(state);
    if current_epoch <= C::genesis_epoch() + 1 {
        return Ok(());
    }
    let previous_epoch = get_previous_epoch(state);

    let old_previous_justified = state.previous_justified_checkpoint;
    let old_current_justified = state.current_justified_checkpoint;

    let total_active_balance = get_total_active_balance(state)?;

    // The newest bit tracks the current epoch; the oldest falls off.
    state.previous_justified_checkpoint = state.current_justified_checkpoint;
    shift_justification_bits(state);

    let previous_target_attestations = state.get_matching_target_attestations(previous_epoch)?;
    let previous_target_balance = state.get_attesting_balance(&previous_target_attestations)?;
    if previous_target_balance * 3 >= total_active_balance * 2 {
        state.current_justified_checkpoint = Checkpoint {
            epoch: previous_epoch,
            root: get_block_root(state, previous_epoch)?,
        };
        set_justification_bit(state, 1);
    }

    let current_target_attestations = state.get_matching_target_attestations(current_epoch)?;
    let current_target_balance = state.get_attesting_balance(&current_target_attestations)?;
    if current_target_balance * 3 >= total_active_balance * 2 {
        state.current_justified_checkpoint = Checkpoint {
            epoch: current_epoch,
            root: get_block_root(state, current_epoch)?,
        };
        set_justification_bit(state, 0);
    }

    let mut bits = [false; JUSTIFICATION_BITS_LENGTH];
    for (index, bit) in bits.iter_mut().enumerate() {
        *bit = state
            .justification_bits
            .get(index)
            .expect("justification bit index is in range");
    }

    // The 2nd/3rd/4th most recent epochs are justified, the 4th was just
    // justified two epochs back.
    if bits[1] && bits[2] && bits[3] && old_previous_justified.epoch + 3 == current_epoch {
        state.finalized_checkpoint = old_previous_justified;
    }
    // The 2nd/3rd most recent epochs are justified, the 3rd was just
    // justified last epoch.
    if bits[1] && bits[2] && old_previous_justified.epoch + 2 == current_epoch {
        state.finalized_checkpoint = old_previous_justified;
    }
    // The 1st/2nd/3rd most recent epochs are justified, the 3rd was just
    // justified two epochs back.
    if bits[0] && bits[1] && bits[2] && old_current_justified.epoch + 2 == current_epoch {
        state.finalized_checkpoint = old_current_justified;
    }
    // The 1st/2nd most recent epochs are justified, the 2nd was just
    // justified last epoch.
    if bits[0] && bits[1] && old_current_justified.epoch + 1 == current_epoch {
        state.finalized_checkpoint = old_current_justified;
    }

    Ok(())
}

fn shift_justification_bits<C: Config>(state: &mut BeaconState<C>) {
    for index in (1..JUSTIFICATION_BITS_LENGTH).rev() {
        let lower = state
            .justification_bits
            .get(index - 1)
            .expect("justification bit index is in range");
        state
            .justification_bits
            .set(index, lower)
            .expect("justification bit index is in range");
    }
    state
        .justification_bits
        .set(0, false)
        .expect("justification bit index is in range");
}

fn set_justification_bit<C: Config>(state: &mut BeaconState<C>, index: usize) {
    state
        .justification_bits
        .set(index, true)
        .expect("justification bit index is in range");
}

pub fn process_registry_updates<C: Config>(state: &mut BeaconState<C>) -> Result<(), Error> {
    let current_epoch = get_current_epoch(state);

    let is_eligible = |validator: &Validator| {
        validator.activation_eligibility_epoch == C::far_future_epoch()
            && validator.effective_balance == C::max_effective_balance()
    };
    let is_ejectable = |validator: &Validator| {
        is_active_validator(validator, current_epoch)
            && validator.effective_balance <= C::ejection_balance()
    };

    let (eligible, ejectable): (Vec<_>, Vec<_>) = state
        .validators
        .iter()
        .enumerate()
        .filter(|(_, validator)| is_eligible(validator) || is_ejectable(validator))
        .partition_map(|(index, validator)| {
            if is_eligible(validator) {
                Either::Left(index)
            } else {
                Either::Right(index)
            }
        });

    for index in eligible {
        state.validators[index].activation_eligibility_epoch = current_epoch;
    }
    for index in ejectable {
        match initiate_validator_exit(state, index as ValidatorIndex) {
            Ok(()) | Err(helper_functions::Error::ValidatorExitAlreadyInitiated) => {}
            Err(error) => return Err(Error::Helper(error)),
        }
    }

    // Validators eligible at or before finalization enter the activation
    // queue ordered by when they became eligible, oldest first.
    let mut activation_queue: Vec<(Epoch, usize)> = state
        .validators
        .iter()
        .enumerate()
        .filter(|(_, validator)| {
            validator.activation_eligibility_epoch <= state.finalized_checkpoint.epoch
                && validator.activation_epoch == C::far_future_epoch()
        })
        .map(|(index, validator)| (validator.activation_eligibility_epoch, index))
        .collect();
    activation_queue.sort();

    let churn_limit = get_validator_churn_limit(state);
    let activation_epoch = compute_activation_exit_epoch::<C>(current_epoch);
    for (_, index) in activation_queue.into_iter().take(churn_limit as usize) {
        state.validators[index].activation_epoch = activation_epoch;
    }

    Ok(())
}

pub fn process_slashings<C: Config>(state: &mut BeaconState<C>) -> Result<(), Error> {
    let epoch = get_current_epoch(state);
    let total_balance = get_total_active_balance(state)?;
    let slashings_sum: Gwei = state.slashings.iter().sum();

    for index in 0..state.validators.len() {
        let validator = &state.validators[index];
        if validator.slashed
            && epoch + C::EpochsPerSlashingsVector::U64 / 2 == validator.withdrawable_epoch
        {
            let increment = C::effective_balance_increment();
            let penalty_numerator = validator.effective_balance / increment
                * cmp::min(slashings_sum * 3, total_balance);
            let penalty = penalty_numerator / total_balance * increment;
            decrease_balance(state, index as ValidatorIndex, penalty)?;
        }
    }
    Ok(())
}

pub fn process_final_updates<C: Config>(state: &mut BeaconState<C>) -> Result<(), Error> {
    let current_epoch = get_current_epoch(state);
    let next_epoch = current_epoch + 1;

    // Reset eth1 data votes at the end of a voting period.
    if (state.slot + 1) % C::SlotsPerEth1VotingPeriod::U64 == 0 {
        state.eth1_data_votes = VariableList::from(vec![]);
    }

    // Update effective balances with hysteresis.
    for (index, validator) in state.validators.iter_mut().enumerate() {
        let balance = state.balances[index];
        let half_increment = C::effective_balance_increment() / 2;
        if balance < validator.effective_balance
            || validator.effective_balance + 3 * half_increment < balance
        {
            validator.effective_balance = cmp::min(
                balance - balance % C::effective_balance_increment(),
                C::max_effective_balance(),
            );
        }
    }

    // Reset the slashings bucket the next epoch will accumulate into.
    let slashings_index = (next_epoch % C::EpochsPerSlashingsVector::U64) as usize;
    state.slashings[slashings_index] = 0;

    // Carry the RANDAO mix over into the next epoch.
    let randao_index = (next_epoch % C::EpochsPerHistoricalVector::U64) as usize;
    state.randao_mixes[randao_index] = get_randao_mix(state, current_epoch)?;

    // Snapshot the active-index root used by seeds after the lookahead.
    let index_root_position =
        ((next_epoch + C::activation_exit_delay()) % C::EpochsPerHistoricalVector::U64) as usize;
    let active_indices: VariableList<ValidatorIndex, C::ValidatorRegistryLimit> =
        get_active_validator_indices(state, next_epoch).into();
    state.active_index_roots[index_root_position] = hash_tree_root(&active_indices);

    // Accumulate finalized history.
    if next_epoch % (C::SlotsPerHistoricalRoot::U64 / C::SlotsPerEpoch::U64) == 0 {
        let historical_batch = HistoricalBatch::<C> {
            block_roots: state.block_roots.clone(),
            state_roots: state.state_roots.clone(),
        };
        state
            .historical_roots
            .push(hash_tree_root(&historical_batch))?;
    }

    // Rotate the attestation buffers.
    state.previous_epoch_attestations = mem::replace(
        &mut state.current_epoch_attestations,
        VariableList::from(vec![]),
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use ssz_types::{BitList, FixedVector};
    use types::config::MinimalConfig;
    use types::primitives::H256;
    use types::types::{AttestationData, PendingAttestation};

    use super::*;

    const BALANCE: Gwei = 32_000_000_000;

    fn active_validator() -> Validator {
        Validator {
            effective_balance: BALANCE,
            activation_eligibility_epoch: 0,
            activation_epoch: 0,
            exit_epoch: u64::max_value(),
            withdrawable_epoch: u64::max_value(),
            ..Validator::default()
        }
    }

    fn state_with_validators(count: usize, slot: u64) -> BeaconState<MinimalConfig> {
        BeaconState {
            slot,
            validators: VariableList::from(vec![active_validator(); count]),
            balances: VariableList::from(vec![BALANCE; count]),
            block_roots: FixedVector::from(vec![H256::from([0xaa; 32]); 64]),
            ..BeaconState::default()
        }
    }

    // One attestation per (slot, committee 0) pair of `epoch`, with every
    // committee member voting, pointing at the uniform block root.
    fn full_attestations(
        state: &BeaconState<MinimalConfig>,
        epoch: Epoch,
    ) -> Vec<PendingAttestation<MinimalConfig>> {
        let root = H256::from([0xaa; 32]);
        (epoch * 8..(epoch + 1) * 8)
            .map(|slot| {
                let mut bits = BitList::with_capacity(2)
                    .expect("two bits fit within the committee bound");
                bits.set(0, true).expect("bit 0 is in range");
                bits.set(1, true).expect("bit 1 is in range");
                PendingAttestation {
                    aggregation_bits: bits,
                    data: AttestationData {
                        slot,
                        index: 0,
                        beacon_block_root: root,
                        source: Checkpoint::default(),
                        target: Checkpoint { epoch, root },
                    },
                    inclusion_delay: 1,
                    proposer_index: 0,
                }
            })
            .collect()
    }

    #[test]
    fn justification_is_skipped_near_genesis() {
        let mut state = state_with_validators(16, 8);
        let before = state.clone();
        process_justification_and_finalization(&mut state)
            .expect("early epochs are skipped without error");
        assert_eq!(state, before);
    }

    #[test]
    fn two_supermajority_epochs_justify_without_finalizing() {
        // The last slot of epoch 2, with full target votes for epochs 1 and 2.
        let mut state = state_with_validators(16, 23);
        for attestation in full_attestations(&state, 1) {
            state
                .previous_epoch_attestations
                .push(attestation)
                .expect("the attestation list is not full");
        }
        for attestation in full_attestations(&state, 2) {
            state
                .current_epoch_attestations
                .push(attestation)
                .expect("the attestation list is not full");
        }

        process_justification_and_finalization(&mut state)
            .expect("justification processes cleanly");

        let bit = |index| {
            state
                .justification_bits
                .get(index)
                .expect("the index is in range")
        };
        assert!(bit(0));
        assert!(bit(1));
        assert!(!bit(2));
        assert!(!bit(3));
        assert_eq!(state.current_justified_checkpoint.epoch, 2);
        assert_eq!(state.finalized_checkpoint.epoch, 0);
    }

    #[test]
    fn a_third_supermajority_epoch_finalizes() {
        let mut state = state_with_validators(16, 23);
        for attestation in full_attestations(&state, 1) {
            state
                .previous_epoch_attestations
                .push(attestation)
                .expect("the attestation list is not full");
        }
        for attestation in full_attestations(&state, 2) {
            state
                .current_epoch_attestations
                .push(attestation)
                .expect("the attestation list is not full");
        }

        process_epoch(&mut state).expect("the epoch boundary processes cleanly");
        assert_eq!(state.current_justified_checkpoint.epoch, 2);
        assert_eq!(state.finalized_checkpoint.epoch, 0);

        // Advance through epoch 3 with another supermajority.
        state.slot = 31;
        for attestation in full_attestations(&state, 3) {
            state
                .current_epoch_attestations
                .push(attestation)
                .expect("the attestation list is not full");
        }

        process_epoch(&mut state).expect("the epoch boundary processes cleanly");
        assert_eq!(state.current_justified_checkpoint.epoch, 3);
        assert_eq!(state.finalized_checkpoint.epoch, 2);
    }

    #[test]
    fn registry_marks_new_validators_eligible_and_activates_from_the_queue() {
        let mut state = state_with_validators(16, 8 * 8);
        let deposited = Validator {
            effective_balance: BALANCE,
            activation_eligibility_epoch: u64::max_value(),
            activation_epoch: u64::max_value(),
            exit_epoch: u64::max_value(),
            withdrawable_epoch: u64::max_value(),
            ..Validator::default()
        };
        state
            .validators
            .push(deposited)
            .expect("the registry is not full");
        state
            .balances
            .push(BALANCE)
            .expect("the balance list is not full");

        process_registry_updates(&mut state).expect("registry updates process cleanly");
        assert_eq!(state.validators[16].activation_eligibility_epoch, 8);
        assert_eq!(state.validators[16].activation_epoch, u64::max_value());

        // Once finality catches up the validator is dequeued.
        state.finalized_checkpoint.epoch = 8;
        process_registry_updates(&mut state).expect("registry updates process cleanly");
        assert_eq!(
            state.validators[16].activation_epoch,
            compute_activation_exit_epoch::<MinimalConfig>(8),
        );
    }

    #[test]
    fn registry_ejects_under_balance_validators() {
        let mut state = state_with_validators(16, 8);
        state.validators[3].effective_balance = MinimalConfig::ejection_balance();

        process_registry_updates(&mut state).expect("registry updates process cleanly");
        assert_ne!(state.validators[3].exit_epoch, u64::max_value());
    }

    #[test]
    fn slashings_settlement_burns_proportionally() {
        let mut state = state_with_validators(16, 8);
        let epoch = get_current_epoch(&state);
        state.validators[0].slashed = true;
        state.validators[0].withdrawable_epoch = epoch + 64 / 2;
        state.slashings[0] = BALANCE;

        process_slashings(&mut state).expect("slashings settle cleanly");

        let total = 16 * BALANCE;
        let expected_penalty = BALANCE / 1_000_000_000
            * cmp::min(3 * BALANCE, total)
            / total
            * 1_000_000_000;
        assert_eq!(state.balances[0], BALANCE - expected_penalty);
        assert_eq!(state.balances[1], BALANCE);
    }

    #[test]
    fn final_updates_rotate_buffers_and_mixes() {
        let mut state = state_with_validators(16, 23);
        state.randao_mixes = FixedVector::from(vec![H256::from([0x11; 32]); 64]);
        state
            .current_epoch_attestations
            .push(full_attestations(&state, 2).remove(0))
            .expect("the attestation list is not full");

        process_final_updates(&mut state).expect("final updates process cleanly");

        assert!(state.current_epoch_attestations.is_empty());
        assert_eq!(state.previous_epoch_attestations.len(), 1);
        assert_eq!(state.randao_mixes[3], H256::from([0x11; 32]));
        assert_ne!(state.active_index_roots[3 + 4], H256::zero());
    }

    #[test]
    fn effective_balance_hysteresis_rounds_down() {
        let mut state = state_with_validators(2, 23);
        state.balances[0] = 31_200_000_000;
        // A small surplus does not move the effective balance.
        state.balances[1] = 32_400_000_000;
        state.validators[1].effective_balance = 32_000_000_000;

        process_final_updates(&mut state).expect("final updates process cleanly");

        assert_eq!(state.validators[0].effective_balance, 31_000_000_000);
        assert_eq!(state.validators[1].effective_balance, 32_000_000_000);
    }
}
