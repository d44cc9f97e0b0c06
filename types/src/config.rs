use core::fmt::Debug;

use typenum::marker_traits::Unsigned;

use crate::consts::{FAR_FUTURE_EPOCH, GENESIS_EPOCH, GENESIS_SLOT};
use crate::primitives::{DomainType, Epoch, Gwei, Slot, UnixSeconds};

/// Protocol constants. Passed explicitly (as a type parameter) to every
/// function that depends on them instead of living in module-level state.
pub trait Config: Clone + PartialEq + Debug + Default + Send + Sync + 'static {
    type EpochsPerHistoricalVector: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type EpochsPerSlashingsVector: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type HistoricalRootsLimit: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type MaxAttestations: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type MaxAttestationsPerEpoch: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type MaxAttesterSlashings: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type MaxDeposits: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type MaxProposerSlashings: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type MaxTransfers: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type MaxValidatorsPerCommittee: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type MaxVoluntaryExits: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type SlotsPerEpoch: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type SlotsPerEth1VotingPeriod: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type SlotsPerHistoricalRoot: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;
    type ValidatorRegistryLimit: Unsigned + Clone + Sync + Send + Debug + PartialEq + Eq;

    fn genesis_slot() -> Slot {
        GENESIS_SLOT
    }

    fn genesis_epoch() -> Epoch {
        GENESIS_EPOCH
    }

    fn far_future_epoch() -> Epoch {
        FAR_FUTURE_EPOCH
    }

    fn activation_exit_delay() -> u64 {
        4
    }

    fn base_reward_factor() -> u64 {
        64
    }

    fn bls_withdrawal_prefix_byte() -> u8 {
        0x00
    }

    fn churn_limit_quotient() -> u64 {
        65_536
    }

    fn effective_balance_increment() -> Gwei {
        1_000_000_000
    }

    fn ejection_balance() -> Gwei {
        16_000_000_000
    }

    fn inactivity_penalty_quotient() -> u64 {
        33_554_432
    }

    fn max_effective_balance() -> Gwei {
        32_000_000_000
    }

    fn min_attestation_inclusion_delay() -> u64 {
        1
    }

    fn min_deposit_amount() -> Gwei {
        1_000_000_000
    }

    fn min_epochs_to_inactivity_penalty() -> u64 {
        4
    }

    fn min_genesis_active_validator_count() -> u64;

    fn min_genesis_time() -> UnixSeconds;

    fn min_per_epoch_churn_limit() -> u64 {
        4
    }

    fn min_seed_lookahead() -> u64 {
        1
    }

    fn min_slashing_penalty_quotient() -> u64 {
        32
    }

    fn min_validator_withdrawability_delay() -> u64 {
        256
    }

    fn max_committees_per_slot() -> u64;

    fn persistent_committee_period() -> u64 {
        2_048
    }

    fn proposer_reward_quotient() -> u64 {
        8
    }

    fn safe_slots_to_update_justified() -> u64;

    fn seconds_per_slot() -> u64 {
        6
    }

    fn shuffle_round_count() -> u64;

    fn target_committee_size() -> u64;

    fn whistleblower_reward_quotient() -> u64 {
        512
    }

    fn domain_beacon_proposer() -> DomainType {
        0
    }

    fn domain_beacon_attester() -> DomainType {
        1
    }

    fn domain_randao() -> DomainType {
        2
    }

    fn domain_deposit() -> DomainType {
        3
    }

    fn domain_voluntary_exit() -> DomainType {
        4
    }

    fn domain_transfer() -> DomainType {
        5
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct MainnetConfig;

impl Config for MainnetConfig {
    type EpochsPerHistoricalVector = typenum::U65536;
    type EpochsPerSlashingsVector = typenum::U8192;
    type HistoricalRootsLimit = typenum::U16777216;
    type MaxAttestations = typenum::U128;
    type MaxAttestationsPerEpoch = typenum::U4096;
    type MaxAttesterSlashings = typenum::U1;
    type MaxDeposits = typenum::U16;
    type MaxProposerSlashings = typenum::U16;
    type MaxTransfers = typenum::U0;
    type MaxValidatorsPerCommittee = typenum::U2048;
    type MaxVoluntaryExits = typenum::U16;
    type SlotsPerEpoch = typenum::U32;
    type SlotsPerEth1VotingPeriod = typenum::U1024;
    type SlotsPerHistoricalRoot = typenum::U8192;
    type ValidatorRegistryLimit = typenum::U1099511627776;

    fn min_genesis_active_validator_count() -> u64 {
        65_536
    }

    fn min_genesis_time() -> UnixSeconds {
        1_578_009_600
    }

    fn max_committees_per_slot() -> u64 {
        64
    }

    fn safe_slots_to_update_justified() -> u64 {
        8
    }

    fn shuffle_round_count() -> u64 {
        90
    }

    fn target_committee_size() -> u64 {
        128
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct MinimalConfig;

impl Config for MinimalConfig {
    type EpochsPerHistoricalVector = typenum::U64;
    type EpochsPerSlashingsVector = typenum::U64;
    type HistoricalRootsLimit = typenum::U16777216;
    type MaxAttestations = typenum::U128;
    type MaxAttestationsPerEpoch = typenum::U1024;
    type MaxAttesterSlashings = typenum::U1;
    type MaxDeposits = typenum::U16;
    type MaxProposerSlashings = typenum::U16;
    type MaxTransfers = typenum::U0;
    type MaxValidatorsPerCommittee = typenum::U2048;
    type MaxVoluntaryExits = typenum::U16;
    type SlotsPerEpoch = typenum::U8;
    type SlotsPerEth1VotingPeriod = typenum::U16;
    type SlotsPerHistoricalRoot = typenum::U64;
    type ValidatorRegistryLimit = typenum::U1099511627776;

    fn min_genesis_active_validator_count() -> u64 {
        16
    }

    fn min_genesis_time() -> UnixSeconds {
        0
    }

    fn max_committees_per_slot() -> u64 {
        4
    }

    fn safe_slots_to_update_justified() -> u64 {
        2
    }

    fn shuffle_round_count() -> u64 {
        10
    }

    fn target_committee_size() -> u64 {
        4
    }
}
