use ssz_types::BitList;
use std::cmp;
use std::collections::BTreeSet;
use std::convert::TryFrom as _;
use typenum::marker_traits::Unsigned as _;
use types::beacon_state::BeaconState;
use types::config::Config;
use types::primitives::*;
use types::types::*;

use crate::{
    crypto::hash,
    error::Error,
    math::{int_to_bytes, int_to_bytes_32},
    misc::*,
    predicates::is_active_validator,
};

pub fn get_current_epoch<C: Config>(state: &BeaconState<C>) -> Epoch {
    compute_epoch_at_slot::<C>(state.slot)
}

pub fn get_previous_epoch<C: Config>(state: &BeaconState<C>) -> Epoch {
    let current_epoch = get_current_epoch(state);
    let genesis_epoch = C::genesis_epoch();

    if current_epoch > genesis_epoch {
        current_epoch - 1
    } else {
        genesis_epoch
    }
}

pub fn get_block_root<C: Config>(state: &BeaconState<C>, epoch: Epoch) -> Result<H256, Error> {
    get_block_root_at_slot(state, compute_start_slot_at_epoch::<C>(epoch))
}

pub fn get_block_root_at_slot<C: Config>(
    state: &BeaconState<C>,
    slot: Slot,
) -> Result<H256, Error> {
    if !(slot < state.slot && state.slot <= slot + C::SlotsPerHistoricalRoot::U64) {
        return Err(Error::SlotOutOfRange);
    }
    let index = usize::try_from(slot % C::SlotsPerHistoricalRoot::U64)
        .map_err(|_| Error::ConversionToUsize)?;
    state
        .block_roots
        .get(index)
        .copied()
        .ok_or(Error::IndexOutOfRange)
}

pub fn get_randao_mix<C: Config>(state: &BeaconState<C>, epoch: Epoch) -> Result<H256, Error> {
    let index = usize::try_from(epoch % C::EpochsPerHistoricalVector::U64)
        .map_err(|_| Error::ConversionToUsize)?;
    Ok(state.randao_mixes[index])
}

pub fn get_active_index_root<C: Config>(
    state: &BeaconState<C>,
    epoch: Epoch,
) -> Result<H256, Error> {
    let index = usize::try_from(epoch % C::EpochsPerHistoricalVector::U64)
        .map_err(|_| Error::ConversionToUsize)?;
    Ok(state.active_index_roots[index])
}

pub fn get_active_validator_indices<C: Config>(
    state: &BeaconState<C>,
    epoch: Epoch,
) -> Vec<ValidatorIndex> {
    let mut active_validator_indices = Vec::new();
    for (i, validator) in state.validators.iter().enumerate() {
        if is_active_validator(validator, epoch) {
            active_validator_indices.push(i as ValidatorIndex);
        }
    }
    active_validator_indices
}

pub fn get_validator_churn_limit<C: Config>(state: &BeaconState<C>) -> u64 {
    let active_validator_indices = get_active_validator_indices(state, get_current_epoch(state));

    cmp::max(
        C::min_per_epoch_churn_limit(),
        active_validator_indices.len() as u64 / C::churn_limit_quotient(),
    )
}

/// The shuffling seed for `epoch`: the domain tag mixed with a RANDAO mix
/// from before the lookahead window and the active-index root of the epoch.
pub fn get_seed<C: Config>(
    state: &BeaconState<C>,
    epoch: Epoch,
    domain_type: DomainType,
) -> Result<H256, Error> {
    let mix = get_randao_mix(
        state,
        epoch + C::EpochsPerHistoricalVector::U64 - C::min_seed_lookahead() - 1,
    )?;
    let active_index_root = get_active_index_root(state, epoch)?;

    let mut input = [0; 68];
    input[0..4].copy_from_slice(&int_to_bytes_32(domain_type, 4));
    input[4..36].copy_from_slice(mix.as_bytes());
    input[36..68].copy_from_slice(active_index_root.as_bytes());

    Ok(H256::from_slice(&hash(&input)))
}

pub fn get_beacon_proposer_index<C: Config>(
    state: &BeaconState<C>,
) -> Result<ValidatorIndex, Error> {
    let epoch = get_current_epoch(state);
    let seed = get_seed(state, epoch, C::domain_beacon_proposer())?;

    let mut input = seed.as_bytes().to_vec();
    input.append(&mut int_to_bytes(state.slot, 8));
    let slot_seed = H256::from_slice(&hash(&input));

    let indices = get_active_validator_indices(state, epoch);
    compute_proposer_index::<C>(&state.validators, &indices, &slot_seed)
}

pub fn get_committee_count_at_slot<C: Config>(state: &BeaconState<C>, slot: Slot) -> u64 {
    let epoch = compute_epoch_at_slot::<C>(slot);
    cmp::max(
        1,
        cmp::min(
            C::max_committees_per_slot(),
            get_active_validator_indices(state, epoch).len() as u64
                / C::SlotsPerEpoch::U64
                / C::target_committee_size(),
        ),
    )
}

pub fn get_beacon_committee<C: Config>(
    state: &BeaconState<C>,
    slot: Slot,
    index: CommitteeIndex,
) -> Result<Vec<ValidatorIndex>, Error> {
    let epoch = compute_epoch_at_slot::<C>(slot);
    let committees_per_slot = get_committee_count_at_slot(state, slot);
    let indices = get_active_validator_indices(state, epoch);
    if indices.is_empty() {
        return Err(Error::NoActiveValidators);
    }
    compute_committee::<C>(
        &indices,
        &get_seed(state, epoch, C::domain_beacon_attester())?,
        (slot % C::SlotsPerEpoch::U64) * committees_per_slot + index,
        committees_per_slot * C::SlotsPerEpoch::U64,
    )
}

pub fn get_total_balance<C: Config>(
    state: &BeaconState<C>,
    indices: &[ValidatorIndex],
) -> Result<Gwei, Error> {
    let mut sum = 0;
    for index in indices {
        let index = usize::try_from(*index).map_err(|_| Error::ConversionToUsize)?;
        let validator = state.validators.get(index).ok_or(Error::IndexOutOfRange)?;
        sum += validator.effective_balance;
    }
    Ok(sum)
}

pub fn get_total_active_balance<C: Config>(state: &BeaconState<C>) -> Result<Gwei, Error> {
    get_total_balance(
        state,
        &get_active_validator_indices(state, get_current_epoch(state)),
    )
}

pub fn get_domain<C: Config>(
    state: &BeaconState<C>,
    domain_type: DomainType,
    message_epoch: Option<Epoch>,
) -> Domain {
    let epoch = message_epoch.unwrap_or_else(|| get_current_epoch(state));
    let fork_version = if epoch < state.fork.epoch {
        &state.fork.previous_version
    } else {
        &state.fork.current_version
    };
    compute_domain(domain_type, Some(fork_version))
}

pub fn get_indexed_attestation<C: Config>(
    state: &BeaconState<C>,
    attestation: &Attestation<C>,
) -> Result<IndexedAttestation<C>, Error> {
    let attesting_indices =
        get_attesting_indices(state, &attestation.data, &attestation.aggregation_bits)?;

    // A `BTreeSet` iterates in ascending order.
    let indices: Vec<ValidatorIndex> = attesting_indices.into_iter().collect();

    Ok(IndexedAttestation {
        attesting_indices: indices.into(),
        data: attestation.data.clone(),
        signature: attestation.signature.clone(),
    })
}

pub fn get_attesting_indices<C: Config>(
    state: &BeaconState<C>,
    data: &AttestationData,
    bits: &BitList<C::MaxValidatorsPerCommittee>,
) -> Result<BTreeSet<ValidatorIndex>, Error> {
    let committee = get_beacon_committee(state, data.slot, data.index)?;
    if bits.len() != committee.len() {
        return Err(Error::AttestationBitsInvalid);
    }
    let mut attesting_indices = BTreeSet::new();
    for (i, index) in committee.iter().enumerate() {
        if bits.get(i).unwrap_or(false) {
            attesting_indices.insert(*index);
        }
    }
    Ok(attesting_indices)
}
