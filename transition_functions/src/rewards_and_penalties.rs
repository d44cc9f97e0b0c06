use typenum::marker_traits::Unsigned as _;
use types::beacon_state::BeaconState;
use types::config::Config;
use types::consts::BASE_REWARDS_PER_EPOCH;
use types::primitives::{Gwei, ValidatorIndex};

use helper_functions::beacon_state_accessors::{
    get_attesting_indices, get_current_epoch, get_previous_epoch, get_total_active_balance,
};
use helper_functions::beacon_state_mutators::{decrease_balance, increase_balance};
use helper_functions::math::integer_squareroot;
use helper_functions::predicates::is_active_validator;

use crate::attestations::AttestableBlock;
use crate::error::Error;

pub trait StakeholderBlock<C>
where
    C: Config,
{
    fn get_base_reward(&self, index: ValidatorIndex) -> Result<Gwei, Error>;
    fn get_attestation_deltas(&self) -> Result<(Vec<Gwei>, Vec<Gwei>), Error>;
    fn process_rewards_and_penalties(&mut self) -> Result<(), Error>;
}

impl<C> StakeholderBlock<C> for BeaconState<C>
where
    C: Config,
{
    fn get_base_reward(&self, index: ValidatorIndex) -> Result<Gwei, Error> {
        let total_balance = get_total_active_balance(self)?;
        let effective_balance = self.validators[index as usize].effective_balance;
        Ok(effective_balance * C::base_reward_factor()
            / integer_squareroot(total_balance)
            / BASE_REWARDS_PER_EPOCH)
    }

    fn get_attestation_deltas(&self) -> Result<(Vec<Gwei>, Vec<Gwei>), Error> {
        let previous_epoch = get_previous_epoch(self);
        let total_balance = get_total_active_balance(self)?;
        let mut rewards = vec![0 as Gwei; self.validators.len()];
        let mut penalties = vec![0 as Gwei; self.validators.len()];

        let mut eligible_validator_indices = Vec::new();
        for (index, validator) in self.validators.iter().enumerate() {
            if is_active_validator(validator, previous_epoch)
                || (validator.slashed && previous_epoch + 1 < validator.withdrawable_epoch)
            {
                eligible_validator_indices.push(index as ValidatorIndex);
            }
        }

        // Micro-incentives for matching FFG source, FFG target, and head.
        let matching_source_attestations =
            self.get_matching_source_attestations(previous_epoch)?;
        let matching_target_attestations =
            self.get_matching_target_attestations(previous_epoch)?;
        let matching_head_attestations = self.get_matching_head_attestations(previous_epoch)?;

        for attestations in &[
            &matching_source_attestations,
            &matching_target_attestations,
            &matching_head_attestations,
        ] {
            let unslashed_attesting_indices = self.get_unslashed_attesting_indices(attestations)?;
            let attesting_balance = self.get_attesting_balance(attestations)?;

            for index in &eligible_validator_indices {
                if unslashed_attesting_indices.contains(index) {
                    rewards[*index as usize] +=
                        self.get_base_reward(*index)? * attesting_balance / total_balance;
                } else {
                    penalties[*index as usize] += self.get_base_reward(*index)?;
                }
            }
        }

        // Proposer and inclusion-delay micro-rewards, paid against the
        // earliest inclusion of each attester's vote.
        for index in self.get_unslashed_attesting_indices(&matching_source_attestations)? {
            let mut earliest: Option<&_> = None;
            for attestation in &matching_source_attestations {
                let indices = get_attesting_indices(
                    self,
                    &attestation.data,
                    &attestation.aggregation_bits,
                )?;
                if !indices.contains(&index) {
                    continue;
                }
                match earliest {
                    Some(other) if other.inclusion_delay <= attestation.inclusion_delay => {}
                    _ => earliest = Some(attestation),
                }
            }
            let attestation = earliest.expect("every attester appears in some attestation");

            let base_reward = self.get_base_reward(index)?;
            rewards[attestation.proposer_index as usize] +=
                base_reward / C::proposer_reward_quotient();
            rewards[index as usize] += base_reward
                * (C::SlotsPerEpoch::U64 - attestation.inclusion_delay)
                / C::SlotsPerEpoch::U64;
        }

        // Quadratic inactivity leak once finality is too far in the past.
        let finality_delay = previous_epoch - self.finalized_checkpoint.epoch;
        if finality_delay > C::min_epochs_to_inactivity_penalty() {
            let matching_target_attesting_indices =
                self.get_unslashed_attesting_indices(&matching_target_attestations)?;
            for index in &eligible_validator_indices {
                penalties[*index as usize] +=
                    BASE_REWARDS_PER_EPOCH * self.get_base_reward(*index)?;
                if !matching_target_attesting_indices.contains(index) {
                    penalties[*index as usize] += self.validators[*index as usize]
                        .effective_balance
                        * finality_delay
                        / C::inactivity_penalty_quotient();
                }
            }
        }

        Ok((rewards, penalties))
    }

    fn process_rewards_and_penalties(&mut self) -> Result<(), Error> {
        if get_current_epoch(self) == C::genesis_epoch() {
            return Ok(());
        }

        let (rewards, penalties) = self.get_attestation_deltas()?;
        for index in 0..self.validators.len() {
            increase_balance(self, index as u64, rewards[index])?;
            decrease_balance(self, index as u64, penalties[index])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ssz_types::VariableList;
    use types::config::MinimalConfig;
    use types::types::Validator;

    use super::*;

    #[test]
    fn base_reward_scales_with_effective_balance() {
        let heavy = Validator {
            effective_balance: 32_000_000_000,
            activation_epoch: 0,
            exit_epoch: u64::max_value(),
            ..Validator::default()
        };
        let light = Validator {
            effective_balance: 16_000_000_000,
            activation_epoch: 0,
            exit_epoch: u64::max_value(),
            ..Validator::default()
        };
        let state: BeaconState<MinimalConfig> = BeaconState {
            validators: VariableList::from(vec![heavy, light]),
            ..BeaconState::default()
        };

        let heavy_reward = state.get_base_reward(0).expect("index 0 exists");
        let light_reward = state.get_base_reward(1).expect("index 1 exists");
        assert_eq!(heavy_reward, 2 * light_reward);

        let total = 48_000_000_000_u64;
        assert_eq!(
            heavy_reward,
            32_000_000_000 * 64 / integer_squareroot(total) / BASE_REWARDS_PER_EPOCH,
        );
    }

    #[test]
    fn rewards_are_skipped_at_genesis() {
        let mut state = BeaconState::<MinimalConfig>::default();
        let before = state.clone();
        state
            .process_rewards_and_penalties()
            .expect("the genesis epoch has no deltas");
        assert_eq!(state, before);
    }
}
