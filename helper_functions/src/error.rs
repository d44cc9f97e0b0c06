use derive_more::From;
use ssz::DecodeError;

#[derive(PartialEq, Debug, From)]
pub enum Error {
    SlotOutOfRange,
    IndexOutOfRange,
    IndicesNotSorted,
    IndicesExceedMaxValidators,
    InvalidSignature,
    ShufflingOverflow,
    NoActiveValidators,
    AttestationBitsInvalid,
    ConversionToUsize,
    ValidatorExitAlreadyInitiated,

    SszDecode(DecodeError),
}
