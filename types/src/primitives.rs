use core::ops::Index;

use derive_more::Display;
use ethereum_types::{H32, H64};
use serde::{Deserialize, Serialize};
use ssz::{Decode, DecodeError, Encode};
use tree_hash::{TreeHash, TreeHashType};

pub use bls::{AggregatePublicKey, AggregateSignature, PublicKey, SecretKey, Signature};
pub use bls::{PublicKeyBytes, SignatureBytes};
pub use ethereum_types::H256;

pub type AggregateSignatureBytes = SignatureBytes;
pub type CommitteeIndex = u64;
pub type DomainType = u32;
pub type Epoch = u64;
pub type Gwei = u64;
pub type Slot = u64;
pub type UnixSeconds = u64;
pub type ValidatorIndex = u64;

// `Version` and `Domain` are wrappers around hash types from `ethereum-types`
// because `tree_hash` does not implement `TreeHash` for all of them.

type VersionAsArray = [u8; 4];

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug, Display, Deserialize, Serialize)]
#[display(fmt = "{}", _0)]
pub struct Version(H32);

impl Version {
    pub fn as_array(&self) -> &VersionAsArray {
        self.0.as_fixed_bytes()
    }
}

impl From<VersionAsArray> for Version {
    fn from(array: VersionAsArray) -> Self {
        Self(array.into())
    }
}

impl From<Version> for VersionAsArray {
    fn from(version: Version) -> Self {
        version.0.to_fixed_bytes()
    }
}

impl Index<usize> for Version {
    type Output = u8;

    fn index(&self, index: usize) -> &Self::Output {
        self.as_array().index(index)
    }
}

impl Decode for Version {
    fn is_ssz_fixed_len() -> bool {
        <VersionAsArray as Decode>::is_ssz_fixed_len()
    }

    fn ssz_fixed_len() -> usize {
        <VersionAsArray as Decode>::ssz_fixed_len()
    }

    fn from_ssz_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        VersionAsArray::from_ssz_bytes(bytes).map(Self::from)
    }
}

impl Encode for Version {
    fn is_ssz_fixed_len() -> bool {
        <VersionAsArray as Encode>::is_ssz_fixed_len()
    }

    fn ssz_fixed_len() -> usize {
        <VersionAsArray as Encode>::ssz_fixed_len()
    }

    fn ssz_append(&self, buf: &mut Vec<u8>) {
        self.as_array().ssz_append(buf)
    }
}

impl TreeHash for Version {
    fn tree_hash_type() -> TreeHashType {
        VersionAsArray::tree_hash_type()
    }

    fn tree_hash_packed_encoding(&self) -> Vec<u8> {
        self.as_array().tree_hash_packed_encoding()
    }

    fn tree_hash_packing_factor() -> usize {
        VersionAsArray::tree_hash_packing_factor()
    }

    fn tree_hash_root(&self) -> Vec<u8> {
        self.as_array().tree_hash_root()
    }
}

type DomainAsInteger = u64;

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug, Deserialize, Serialize)]
pub struct Domain(H64);

impl Domain {
    pub fn to_integer(self) -> DomainAsInteger {
        self.0.to_low_u64_le()
    }
}

impl From<DomainAsInteger> for Domain {
    fn from(integer: DomainAsInteger) -> Self {
        Self(H64::from_low_u64_le(integer))
    }
}

impl Decode for Domain {
    fn is_ssz_fixed_len() -> bool {
        <DomainAsInteger as Decode>::is_ssz_fixed_len()
    }

    fn ssz_fixed_len() -> usize {
        <DomainAsInteger as Decode>::ssz_fixed_len()
    }

    fn from_ssz_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        DomainAsInteger::from_ssz_bytes(bytes).map(Self::from)
    }
}

impl Encode for Domain {
    fn is_ssz_fixed_len() -> bool {
        <DomainAsInteger as Encode>::is_ssz_fixed_len()
    }

    fn ssz_fixed_len() -> usize {
        <DomainAsInteger as Encode>::ssz_fixed_len()
    }

    fn ssz_append(&self, buf: &mut Vec<u8>) {
        self.to_integer().ssz_append(buf)
    }
}

impl TreeHash for Domain {
    fn tree_hash_type() -> TreeHashType {
        DomainAsInteger::tree_hash_type()
    }

    fn tree_hash_packed_encoding(&self) -> Vec<u8> {
        self.to_integer().tree_hash_packed_encoding()
    }

    fn tree_hash_packing_factor() -> usize {
        DomainAsInteger::tree_hash_packing_factor()
    }

    fn tree_hash_root(&self) -> Vec<u8> {
        self.to_integer().tree_hash_root()
    }
}
