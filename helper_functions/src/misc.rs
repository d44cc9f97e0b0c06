use log::warn;
use std::convert::TryFrom as _;
use typenum::marker_traits::Unsigned as _;
use types::config::Config;
use types::primitives::*;
use types::types::Validator;

use crate::{
    crypto::hash,
    error::Error,
    math::{bytes_to_int, int_to_bytes, int_to_bytes_32},
};

/// Indices above this cannot be permuted: the swap-or-not pivot is drawn from
/// only eight hash bytes.
pub const MAX_INDEX_COUNT: u64 = 1 << 40;

const MAX_RANDOM_BYTE: u64 = u8::max_value() as u64;

/// The swap-or-not permutation. O(rounds) per index, O(1) memory.
pub fn compute_shuffled_index<C: Config>(
    mut index: ValidatorIndex,
    index_count: u64,
    seed: &H256,
) -> Result<ValidatorIndex, Error> {
    if index_count == 0 || index_count > MAX_INDEX_COUNT {
        return Err(Error::ShufflingOverflow);
    }
    if index >= index_count {
        return Err(Error::IndexOutOfRange);
    }
    for current_round in 0..C::shuffle_round_count() {
        let pivot = bytes_to_int(hash_seed_round(seed, current_round)) % index_count;
        let flip = (pivot + index_count - index) % index_count;
        let position = index.max(flip);
        let source = hash_seed_round_position(seed, current_round, position);
        let byte = source[((position % 256) / 8) as usize];
        let bit = (byte >> (position % 8)) % 2;
        if bit == 1 {
            index = flip;
        }
    }
    Ok(index)
}

fn hash_seed_round(seed: &H256, current_round: u64) -> [u8; 8] {
    let mut input = seed.as_bytes().to_vec();
    input.append(&mut int_to_bytes(current_round, 1));
    let mut bytes = [0; 8];
    bytes.copy_from_slice(&hash(&input)[..8]);
    bytes
}

fn hash_seed_round_position(seed: &H256, current_round: u64, position: u64) -> Vec<u8> {
    let mut input = seed.as_bytes().to_vec();
    input.append(&mut int_to_bytes(current_round, 1));
    input.append(&mut int_to_bytes(position / 256, 4));
    hash(&input)
}

pub fn compute_epoch_at_slot<C: Config>(slot: Slot) -> Epoch {
    slot / C::SlotsPerEpoch::U64
}

pub fn compute_start_slot_at_epoch<C: Config>(epoch: Epoch) -> Slot {
    epoch * C::SlotsPerEpoch::U64
}

pub fn compute_activation_exit_epoch<C: Config>(epoch: Epoch) -> Epoch {
    epoch + 1 + C::activation_exit_delay()
}

/// The committee with number `index` out of `count` committees drawn from
/// `indices` under `seed`.
pub fn compute_committee<C: Config>(
    indices: &[ValidatorIndex],
    seed: &H256,
    index: u64,
    count: u64,
) -> Result<Vec<ValidatorIndex>, Error> {
    let length = indices.len() as u64;
    let start = length * index / count;
    let end = length * (index + 1) / count;

    let mut committee = Vec::with_capacity((end - start) as usize);
    for i in start..end {
        let shuffled = compute_shuffled_index::<C>(i, length, seed)?;
        committee.push(indices[shuffled as usize]);
    }
    Ok(committee)
}

/// Candidate proposers are drawn through the shuffling and accepted with
/// probability proportional to their effective balance.
pub fn compute_proposer_index<C: Config>(
    validators: &[Validator],
    indices: &[ValidatorIndex],
    seed: &H256,
) -> Result<ValidatorIndex, Error> {
    if indices.is_empty() {
        return Err(Error::NoActiveValidators);
    }
    let total = indices.len() as u64;
    let mut i = 0;
    loop {
        let shuffled = compute_shuffled_index::<C>(i % total, total, seed)?;
        let candidate = indices[shuffled as usize];
        let candidate_usize =
            usize::try_from(candidate).map_err(|_| Error::ConversionToUsize)?;
        let validator = validators
            .get(candidate_usize)
            .ok_or(Error::IndexOutOfRange)?;

        let mut input = seed.as_bytes().to_vec();
        input.append(&mut int_to_bytes(i / 32, 8));
        let random_byte = u64::from(hash(&input)[(i % 32) as usize]);

        if validator.effective_balance * MAX_RANDOM_BYTE
            >= C::max_effective_balance() * random_byte
        {
            return Ok(candidate);
        }
        i += 1;
        if i == total {
            // The loop terminates with probability 1 as long as some active
            // validator has a nonzero effective balance.
            warn!(
                "no proposer accepted after {} candidates; the active set may have zero balances",
                total,
            );
        }
    }
}

pub fn compute_domain(domain_type: DomainType, fork_version: Option<&Version>) -> Domain {
    let mut bytes = [0; 8];
    bytes[0..4].copy_from_slice(&int_to_bytes_32(domain_type, 4));
    if let Some(version) = fork_version {
        bytes[4..8].copy_from_slice(version.as_array());
    }
    Domain::from(u64::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use types::config::{MainnetConfig, MinimalConfig};

    use super::*;

    #[test]
    fn shuffled_index_matches_fixed_vector() {
        // 12 indices, a seed of 32 0x23 bytes and 90 rounds.
        let seed = H256::from([0x23; 32]);
        let expected = [11, 4, 9, 5, 7, 10, 2, 8, 0, 6, 3, 1];
        for (index, expected) in expected.iter().enumerate() {
            assert_eq!(
                compute_shuffled_index::<MainnetConfig>(index as u64, 12, &seed),
                Ok(*expected),
            );
        }
    }

    #[test]
    fn shuffled_indices_form_a_permutation() {
        let seed = H256::from([0x42; 32]);
        let count = 100;
        let mut seen = vec![false; count as usize];
        for index in 0..count {
            let shuffled = compute_shuffled_index::<MinimalConfig>(index, count, &seed)
                .expect("indices below the count are shuffled");
            assert!(shuffled < count);
            assert!(!seen[shuffled as usize]);
            seen[shuffled as usize] = true;
        }
    }

    #[test]
    fn shuffled_index_rejects_out_of_range_index() {
        assert_eq!(
            compute_shuffled_index::<MainnetConfig>(1, 1, &H256::zero()),
            Err(Error::IndexOutOfRange),
        );
    }

    #[test]
    fn shuffled_index_rejects_oversized_index_count() {
        assert_eq!(
            compute_shuffled_index::<MainnetConfig>(0, MAX_INDEX_COUNT + 1, &H256::zero()),
            Err(Error::ShufflingOverflow),
        );
        assert_eq!(
            compute_shuffled_index::<MainnetConfig>(0, 0, &H256::zero()),
            Err(Error::ShufflingOverflow),
        );
    }

    #[test]
    fn test_compute_epoch_at_slot() {
        assert_eq!(compute_epoch_at_slot::<MainnetConfig>(17), 0);
        assert_eq!(compute_epoch_at_slot::<MainnetConfig>(64), 2);
        assert_eq!(compute_epoch_at_slot::<MinimalConfig>(17), 2);
    }

    #[test]
    fn test_compute_start_slot_at_epoch() {
        assert_eq!(compute_start_slot_at_epoch::<MainnetConfig>(10), 320);
        assert_eq!(compute_start_slot_at_epoch::<MinimalConfig>(10), 80);
    }

    #[test]
    fn test_compute_activation_exit_epoch() {
        assert_eq!(compute_activation_exit_epoch::<MainnetConfig>(0), 5);
    }

    #[test]
    fn committees_partition_the_index_list() {
        let indices: Vec<ValidatorIndex> = (0..23).collect();
        let seed = H256::from([0x17; 32]);
        let count = 4;

        let mut all = Vec::new();
        for index in 0..count {
            all.extend(
                compute_committee::<MinimalConfig>(&indices, &seed, index, count)
                    .expect("committee indices are in range"),
            );
        }

        all.sort();
        assert_eq!(all, indices);
    }

    #[test]
    fn proposer_selection_is_deterministic() {
        let validators = vec![
            Validator {
                effective_balance: 32_000_000_000,
                activation_epoch: 0,
                exit_epoch: u64::max_value(),
                ..Validator::default()
            };
            8
        ];
        let indices: Vec<ValidatorIndex> = (0..8).collect();
        let seed = H256::from([0x01; 32]);

        let first = compute_proposer_index::<MinimalConfig>(&validators, &indices, &seed);
        let second = compute_proposer_index::<MinimalConfig>(&validators, &indices, &seed);
        assert!(first.is_ok());
        assert_eq!(first, second);
    }

    #[test]
    fn proposer_selection_fails_without_active_validators() {
        assert_eq!(
            compute_proposer_index::<MinimalConfig>(&[], &[], &H256::zero()),
            Err(Error::NoActiveValidators),
        );
    }

    #[test]
    fn test_compute_domain_with_fork_version() {
        let version = Version::from([0, 0, 0, 1]);
        let expected = Domain::from(0x0100_0000_0000_0002);
        assert_eq!(compute_domain(2, Some(&version)), expected);
    }

    #[test]
    fn test_compute_domain_without_fork_version() {
        assert_eq!(compute_domain(3, None), Domain::from(3));
    }
}
