use std::convert::{TryFrom as _, TryInto as _};
use typenum::marker_traits::Unsigned as _;
use types::beacon_state::BeaconState;
use types::config::Config;
use types::primitives::*;
use types::types::{AttestationData, AttestationDataAndCustodyBit, IndexedAttestation, Validator};

use crate::beacon_state_accessors::get_domain;
use crate::crypto::{bls_verify, hash, hash_tree_root};
use crate::error::Error;

pub fn is_active_validator(validator: &Validator, epoch: Epoch) -> bool {
    validator.activation_epoch <= epoch && epoch < validator.exit_epoch
}

pub fn is_slashable_validator(validator: &Validator, epoch: Epoch) -> bool {
    !validator.slashed
        && validator.activation_epoch <= epoch
        && epoch < validator.withdrawable_epoch
}

pub fn is_slashable_attestation_data(data_1: &AttestationData, data_2: &AttestationData) -> bool {
    // Double vote
    (data_1 != data_2 && data_1.target.epoch == data_2.target.epoch) ||
    // Surround vote
    (data_1.source.epoch < data_2.source.epoch && data_2.target.epoch < data_1.target.epoch)
}

/// Check the shape of an `IndexedAttestation` and, optionally, its aggregate
/// signature over the custody-bit message.
pub fn validate_indexed_attestation<C: Config>(
    state: &BeaconState<C>,
    indexed_attestation: &IndexedAttestation<C>,
    verify_signature: bool,
) -> Result<(), Error> {
    let indices = &indexed_attestation.attesting_indices;

    if indices.len() > C::MaxValidatorsPerCommittee::USIZE {
        return Err(Error::IndicesExceedMaxValidators);
    }

    // Sorted ascending with no duplicates.
    let is_sorted = indices.windows(2).all(|window| window[0] < window[1]);
    if !is_sorted {
        return Err(Error::IndicesNotSorted);
    }

    if !verify_signature {
        return Ok(());
    }

    let mut pubkeys = AggregatePublicKey::new();
    for index in indices.iter() {
        let index = usize::try_from(*index).map_err(|_| Error::ConversionToUsize)?;
        let validator = state.validators.get(index).ok_or(Error::IndexOutOfRange)?;
        pubkeys.add(&(&validator.pubkey).try_into()?);
    }

    let pubkey_bytes = PublicKeyBytes::from_bytes(pubkeys.as_raw().as_bytes().as_slice())?;

    let message = AttestationDataAndCustodyBit {
        data: indexed_attestation.data.clone(),
        custody_bit: false,
    };
    let domain = get_domain(
        state,
        C::domain_beacon_attester(),
        Some(indexed_attestation.data.target.epoch),
    );

    let is_valid = bls_verify(
        &pubkey_bytes,
        hash_tree_root(&message).as_bytes(),
        &indexed_attestation.signature,
        domain,
    )?;

    if !is_valid {
        return Err(Error::InvalidSignature);
    }

    Ok(())
}

pub fn is_valid_merkle_branch(
    leaf: &H256,
    branch: &[H256],
    depth: u64,
    index: u64,
    root: &H256,
) -> bool {
    let mut value = *leaf;
    for (height, node) in branch.iter().enumerate().take(depth as usize) {
        let mut input = [0; 64];
        if index >> height & 1 == 0 {
            input[0..32].copy_from_slice(value.as_bytes());
            input[32..64].copy_from_slice(node.as_bytes());
        } else {
            input[0..32].copy_from_slice(node.as_bytes());
            input[32..64].copy_from_slice(value.as_bytes());
        }
        value = H256::from_slice(&hash(&input));
    }
    value == *root
}

#[cfg(test)]
mod tests {
    use ssz_types::VariableList;
    use types::config::MainnetConfig;
    use types::types::Checkpoint;

    use super::*;

    #[test]
    fn test_is_active_validator() {
        let validator = Validator {
            activation_epoch: 0,
            exit_epoch: 1,
            ..Validator::default()
        };
        assert!(is_active_validator(&validator, 0));
        assert!(!is_active_validator(&validator, 1));
    }

    #[test]
    fn test_is_active_validator_activation_epoch_greater_than_epoch() {
        let validator = Validator {
            activation_epoch: 1,
            exit_epoch: 2,
            ..Validator::default()
        };
        assert!(!is_active_validator(&validator, 0));
    }

    #[test]
    fn test_is_slashable_validator() {
        let validator = Validator {
            slashed: false,
            activation_epoch: 0,
            withdrawable_epoch: 1,
            ..Validator::default()
        };
        assert!(is_slashable_validator(&validator, 0));
        assert!(!is_slashable_validator(&validator, 1));
    }

    #[test]
    fn test_is_slashable_validator_already_slashed() {
        let validator = Validator {
            slashed: true,
            activation_epoch: 0,
            withdrawable_epoch: 1,
            ..Validator::default()
        };
        assert!(!is_slashable_validator(&validator, 0));
    }

    #[test]
    fn test_is_slashable_attestation_data_double_vote() {
        let data_1 = AttestationData {
            target: Checkpoint {
                epoch: 1,
                root: H256::from([0; 32]),
            },
            ..AttestationData::default()
        };
        let data_2 = AttestationData {
            target: Checkpoint {
                epoch: 1,
                root: H256::from([1; 32]),
            },
            ..AttestationData::default()
        };
        assert!(is_slashable_attestation_data(&data_1, &data_2));
        assert!(!is_slashable_attestation_data(&data_1, &data_1));
    }

    #[test]
    fn test_is_slashable_attestation_data_surround_vote() {
        let data_1 = AttestationData {
            source: Checkpoint {
                epoch: 0,
                root: H256::from([0; 32]),
            },
            target: Checkpoint {
                epoch: 3,
                root: H256::from([0; 32]),
            },
            ..AttestationData::default()
        };
        let data_2 = AttestationData {
            source: Checkpoint {
                epoch: 1,
                root: H256::from([1; 32]),
            },
            target: Checkpoint {
                epoch: 2,
                root: H256::from([0; 32]),
            },
            ..AttestationData::default()
        };
        assert!(is_slashable_attestation_data(&data_1, &data_2));
    }

    #[test]
    fn validate_indexed_attestation_rejects_unsorted_indices() {
        let state = BeaconState::<MainnetConfig>::default();
        let attestation: IndexedAttestation<MainnetConfig> = IndexedAttestation {
            attesting_indices: VariableList::from(vec![66, 65]),
            ..IndexedAttestation::default()
        };
        assert_eq!(
            validate_indexed_attestation(&state, &attestation, false),
            Err(Error::IndicesNotSorted),
        );
    }

    #[test]
    fn validate_indexed_attestation_rejects_duplicate_indices() {
        let state = BeaconState::<MainnetConfig>::default();
        let attestation: IndexedAttestation<MainnetConfig> = IndexedAttestation {
            attesting_indices: VariableList::from(vec![7, 7]),
            ..IndexedAttestation::default()
        };
        assert_eq!(
            validate_indexed_attestation(&state, &attestation, false),
            Err(Error::IndicesNotSorted),
        );
    }

    #[test]
    fn validate_indexed_attestation_accepts_sorted_indices_without_signature_check() {
        let state = BeaconState::<MainnetConfig>::default();
        let attestation: IndexedAttestation<MainnetConfig> = IndexedAttestation {
            attesting_indices: VariableList::from(vec![1, 2, 5]),
            ..IndexedAttestation::default()
        };
        assert_eq!(
            validate_indexed_attestation(&state, &attestation, false),
            Ok(()),
        );
    }

    #[test]
    fn merkle_branch_of_depth_zero_is_the_leaf_itself() {
        let leaf = H256::from([0xab; 32]);
        assert!(is_valid_merkle_branch(&leaf, &[], 0, 0, &leaf));
    }

    #[test]
    fn merkle_branch_verifies_a_two_leaf_tree() {
        let left = H256::from([1; 32]);
        let right = H256::from([2; 32]);

        let mut input = [0; 64];
        input[0..32].copy_from_slice(left.as_bytes());
        input[32..64].copy_from_slice(right.as_bytes());
        let root = H256::from_slice(&hash(&input));

        assert!(is_valid_merkle_branch(&left, &[right], 1, 0, &root));
        assert!(is_valid_merkle_branch(&right, &[left], 1, 1, &root));
        assert!(!is_valid_merkle_branch(&left, &[right], 1, 1, &root));
    }
}
