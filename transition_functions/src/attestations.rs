use std::collections::BTreeSet;

use types::beacon_state::BeaconState;
use types::config::Config;
use types::primitives::{Epoch, Gwei, ValidatorIndex};
use types::types::PendingAttestation;

use helper_functions::beacon_state_accessors::{
    get_attesting_indices, get_block_root, get_block_root_at_slot, get_current_epoch,
    get_previous_epoch, get_total_balance,
};

use crate::error::Error;

/// Attestation-matching queries used by justification and reward processing.
pub trait AttestableBlock<C>
where
    C: Config,
{
    fn get_matching_source_attestations(
        &self,
        epoch: Epoch,
    ) -> Result<Vec<PendingAttestation<C>>, Error>;
    fn get_matching_target_attestations(
        &self,
        epoch: Epoch,
    ) -> Result<Vec<PendingAttestation<C>>, Error>;
    fn get_matching_head_attestations(
        &self,
        epoch: Epoch,
    ) -> Result<Vec<PendingAttestation<C>>, Error>;
    fn get_unslashed_attesting_indices(
        &self,
        attestations: &[PendingAttestation<C>],
    ) -> Result<BTreeSet<ValidatorIndex>, Error>;
    fn get_attesting_balance(
        &self,
        attestations: &[PendingAttestation<C>],
    ) -> Result<Gwei, Error>;
}

impl<C> AttestableBlock<C> for BeaconState<C>
where
    C: Config,
{
    fn get_matching_source_attestations(
        &self,
        epoch: Epoch,
    ) -> Result<Vec<PendingAttestation<C>>, Error> {
        if epoch == get_current_epoch(self) {
            Ok(self.current_epoch_attestations.iter().cloned().collect())
        } else if epoch == get_previous_epoch(self) {
            Ok(self.previous_epoch_attestations.iter().cloned().collect())
        } else {
            Err(Error::InvalidAttestation {
                reason: "epoch is neither current nor previous",
            })
        }
    }

    fn get_matching_target_attestations(
        &self,
        epoch: Epoch,
    ) -> Result<Vec<PendingAttestation<C>>, Error> {
        let target_root = get_block_root(self, epoch)?;
        Ok(self
            .get_matching_source_attestations(epoch)?
            .into_iter()
            .filter(|attestation| attestation.data.target.root == target_root)
            .collect())
    }

    fn get_matching_head_attestations(
        &self,
        epoch: Epoch,
    ) -> Result<Vec<PendingAttestation<C>>, Error> {
        let mut head_attestations = Vec::new();
        for attestation in self.get_matching_source_attestations(epoch)? {
            if attestation.data.beacon_block_root
                == get_block_root_at_slot(self, attestation.data.slot)?
            {
                head_attestations.push(attestation);
            }
        }
        Ok(head_attestations)
    }

    fn get_unslashed_attesting_indices(
        &self,
        attestations: &[PendingAttestation<C>],
    ) -> Result<BTreeSet<ValidatorIndex>, Error> {
        let mut output = BTreeSet::new();
        for attestation in attestations {
            let indices =
                get_attesting_indices(self, &attestation.data, &attestation.aggregation_bits)?;
            for index in indices {
                if !self.validators[index as usize].slashed {
                    output.insert(index);
                }
            }
        }
        Ok(output)
    }

    fn get_attesting_balance(
        &self,
        attestations: &[PendingAttestation<C>],
    ) -> Result<Gwei, Error> {
        let indices = self.get_unslashed_attesting_indices(attestations)?;
        let indices: Vec<ValidatorIndex> = indices.into_iter().collect();
        get_total_balance(self, &indices).map_err(Error::Helper)
    }
}

#[cfg(test)]
mod tests {
    use types::config::MinimalConfig;

    use super::*;

    #[test]
    fn source_attestations_come_from_the_matching_buffer() {
        let mut state = BeaconState::<MinimalConfig>::default();
        state
            .current_epoch_attestations
            .push(PendingAttestation {
                aggregation_bits: Default::default(),
                data: Default::default(),
                inclusion_delay: 1,
                proposer_index: 0,
            })
            .expect("the attestation list is not full");

        let current = state
            .get_matching_source_attestations(0)
            .expect("epoch 0 is the current epoch");
        assert_eq!(current.len(), 1);
    }

    #[test]
    fn source_attestations_reject_older_epochs() {
        let state: BeaconState<MinimalConfig> = BeaconState {
            slot: 3 * 8,
            ..BeaconState::default()
        };
        assert!(state.get_matching_source_attestations(0).is_err());
    }

    #[test]
    fn previous_epoch_attestations_are_matched_once_an_epoch_passes() {
        let mut state: BeaconState<MinimalConfig> = BeaconState {
            slot: 8,
            ..BeaconState::default()
        };
        state
            .previous_epoch_attestations
            .push(PendingAttestation {
                aggregation_bits: Default::default(),
                data: Default::default(),
                inclusion_delay: 1,
                proposer_index: 0,
            })
            .expect("the attestation list is not full");

        let previous = state
            .get_matching_source_attestations(0)
            .expect("epoch 0 is the previous epoch");
        assert_eq!(previous.len(), 1);
    }
}
