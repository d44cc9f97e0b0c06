use ssz_types::Error as SszTypesError;
use thiserror::Error;
use types::primitives::H256;

#[derive(PartialEq, Debug, Error)]
pub enum Error {
    #[error("block is invalid: {reason}")]
    InvalidBlock { reason: &'static str },
    #[error("attestation is invalid: {reason}")]
    InvalidAttestation { reason: &'static str },
    #[error("deposit Merkle proof does not match the deposit root")]
    InvalidDepositProof,
    #[error("attester slashing did not slash any validator")]
    SlashingHadNoEffect,
    #[error("attester slashing is invalid: {reason}")]
    InvalidAttesterSlashing { reason: &'static str },
    #[error("proposer slashing is invalid: {reason}")]
    InvalidProposerSlashing { reason: &'static str },
    #[error("voluntary exit is invalid: {reason}")]
    InvalidVoluntaryExit { reason: &'static str },
    #[error("transfer is invalid: {reason}")]
    InvalidTransfer { reason: &'static str },
    #[error("genesis state is invalid: {reason}")]
    InvalidGenesis { reason: &'static str },
    #[error("state root in block ({in_block}) does not match the computed root ({computed})")]
    StateRootMismatch { in_block: H256, computed: H256 },
    #[error("slot {target} is earlier than the state slot {current}")]
    SlotsOutOfOrder { current: u64, target: u64 },
    #[error("state capacity exceeded")]
    CapacityExceeded,
    #[error("helper failure: {0:?}")]
    Helper(helper_functions::Error),
}

impl From<helper_functions::Error> for Error {
    fn from(error: helper_functions::Error) -> Self {
        Error::Helper(error)
    }
}

impl From<ssz::DecodeError> for Error {
    fn from(error: ssz::DecodeError) -> Self {
        Error::Helper(helper_functions::Error::SszDecode(error))
    }
}

impl From<SszTypesError> for Error {
    fn from(_error: SszTypesError) -> Self {
        Error::CapacityExceeded
    }
}
