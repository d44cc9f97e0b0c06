use std::cmp;
use std::convert::TryFrom as _;
use typenum::marker_traits::Unsigned as _;
use types::beacon_state::BeaconState;
use types::config::Config;
use types::primitives::{Gwei, ValidatorIndex};

use crate::beacon_state_accessors::{
    get_beacon_proposer_index, get_current_epoch, get_validator_churn_limit,
};
use crate::error::Error;
use crate::misc::compute_activation_exit_epoch;

pub fn increase_balance<C: Config>(
    state: &mut BeaconState<C>,
    index: ValidatorIndex,
    delta: Gwei,
) -> Result<(), Error> {
    let index = usize::try_from(index).map_err(|_| Error::ConversionToUsize)?;
    if index >= state.balances.len() {
        return Err(Error::IndexOutOfRange);
    }
    state.balances[index] += delta;
    Ok(())
}

pub fn decrease_balance<C: Config>(
    state: &mut BeaconState<C>,
    index: ValidatorIndex,
    delta: Gwei,
) -> Result<(), Error> {
    let index = usize::try_from(index).map_err(|_| Error::ConversionToUsize)?;
    if index >= state.balances.len() {
        return Err(Error::IndexOutOfRange);
    }
    state.balances[index] = state.balances[index].saturating_sub(delta);
    Ok(())
}

/// Queue the validator for exit at the earliest epoch the churn limit allows.
pub fn initiate_validator_exit<C: Config>(
    state: &mut BeaconState<C>,
    index: ValidatorIndex,
) -> Result<(), Error> {
    let id = usize::try_from(index).map_err(|_| Error::ConversionToUsize)?;
    if id >= state.validators.len() {
        return Err(Error::IndexOutOfRange);
    }

    if state.validators[id].exit_epoch != C::far_future_epoch() {
        return Err(Error::ValidatorExitAlreadyInitiated);
    }

    let max_exit_epoch = state
        .validators
        .iter()
        .filter(|validator| validator.exit_epoch != C::far_future_epoch())
        .map(|validator| validator.exit_epoch)
        .fold(0, cmp::max);

    let mut exit_queue_epoch = max_exit_epoch.max(compute_activation_exit_epoch::<C>(
        get_current_epoch(state),
    ));
    let exit_queue_churn = state
        .validators
        .iter()
        .filter(|validator| validator.exit_epoch == exit_queue_epoch)
        .count() as u64;
    if exit_queue_churn >= get_validator_churn_limit(state) {
        exit_queue_epoch += 1;
    }

    let validator = &mut state.validators[id];
    validator.exit_epoch = exit_queue_epoch;
    validator.withdrawable_epoch = exit_queue_epoch + C::min_validator_withdrawability_delay();

    Ok(())
}

/// Exit, mark and penalise a misbehaving validator, rewarding the
/// whistleblower and the block proposer.
pub fn slash_validator<C: Config>(
    state: &mut BeaconState<C>,
    slashed_index: ValidatorIndex,
    whistleblower_index: Option<ValidatorIndex>,
) -> Result<(), Error> {
    let epoch = get_current_epoch(state);
    initiate_validator_exit(state, slashed_index)?;

    let id = usize::try_from(slashed_index).map_err(|_| Error::ConversionToUsize)?;

    let effective_balance = {
        let validator = &mut state.validators[id];
        validator.slashed = true;
        validator.withdrawable_epoch = cmp::max(
            validator.withdrawable_epoch,
            epoch + C::EpochsPerSlashingsVector::U64,
        );
        validator.effective_balance
    };

    let slashings_index = usize::try_from(epoch % C::EpochsPerSlashingsVector::U64)
        .map_err(|_| Error::ConversionToUsize)?;
    state.slashings[slashings_index] += effective_balance;
    decrease_balance(
        state,
        slashed_index,
        effective_balance / C::min_slashing_penalty_quotient(),
    )?;

    let proposer_index = get_beacon_proposer_index(state)?;
    let whistleblower = whistleblower_index.unwrap_or(proposer_index);
    let whistleblower_reward = effective_balance / C::whistleblower_reward_quotient();
    let proposer_reward = whistleblower_reward / C::proposer_reward_quotient();
    increase_balance(state, proposer_index, proposer_reward)?;
    increase_balance(state, whistleblower, whistleblower_reward - proposer_reward)?;

    Ok(())
}
