//! The beacon-sync wire protocol and the traits connecting the network
//! stack, the sync loop and the engine.

pub mod sync;

use anyhow::Result;
use ssz::{Decode, DecodeError, Encode};
use ssz_derive::{Decode as SszDecode, Encode as SszEncode};
use ssz_types::VariableList;
use types::config::Config;
use types::primitives::{Epoch, Slot, Version, H256};
use types::types::{Attestation, SignedBeaconBlock};

pub const MAX_BLOCKS_PER_REQUEST: u64 = 64;

pub type MaxRequestBlocks = typenum::U64;
pub type MaxAttestationsPerMessage = typenum::U1024;

/// What a node advertises about its chain.
#[derive(Clone, PartialEq, Eq, Debug, SszEncode, SszDecode)]
pub struct Status {
    pub fork_version: Version,
    pub finalized_root: H256,
    pub finalized_epoch: Epoch,
    pub head_root: H256,
    pub head_slot: Slot,
}

/// Either a starting slot or a block root. Encoded as a one-byte selector
/// followed by the value.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BlockQuery {
    Slot(Slot),
    Root(H256),
}

const BLOCK_QUERY_SLOT_SELECTOR: u8 = 0;
const BLOCK_QUERY_ROOT_SELECTOR: u8 = 1;

impl Encode for BlockQuery {
    fn is_ssz_fixed_len() -> bool {
        false
    }

    fn ssz_append(&self, buf: &mut Vec<u8>) {
        match self {
            BlockQuery::Slot(slot) => {
                buf.push(BLOCK_QUERY_SLOT_SELECTOR);
                slot.ssz_append(buf);
            }
            BlockQuery::Root(root) => {
                buf.push(BLOCK_QUERY_ROOT_SELECTOR);
                buf.extend_from_slice(root.as_bytes());
            }
        }
    }
}

impl Decode for BlockQuery {
    fn is_ssz_fixed_len() -> bool {
        false
    }

    fn from_ssz_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let (selector, rest) = bytes.split_first().ok_or(DecodeError::InvalidByteLength {
            len: 0,
            expected: 1,
        })?;
        match *selector {
            BLOCK_QUERY_SLOT_SELECTOR => Slot::from_ssz_bytes(rest).map(BlockQuery::Slot),
            BLOCK_QUERY_ROOT_SELECTOR => {
                if rest.len() != 32 {
                    return Err(DecodeError::InvalidByteLength {
                        len: rest.len(),
                        expected: 32,
                    });
                }
                Ok(BlockQuery::Root(H256::from_slice(rest)))
            }
            selector => Err(DecodeError::BytesInvalid(format!(
                "unknown block query selector: {}",
                selector,
            ))),
        }
    }
}

/// A request for blocks from the canonical chain in ascending slot order.
/// A server that has none responds with an empty list, not an error.
#[derive(Clone, PartialEq, Debug, SszEncode, SszDecode)]
pub struct GetBeaconBlocks {
    pub request_id: u64,
    pub query: BlockQuery,
    pub max_blocks: u64,
}

#[derive(Clone, PartialEq, Debug, SszEncode, SszDecode)]
pub struct BeaconBlocks<C: Config> {
    pub request_id: u64,
    pub blocks: VariableList<SignedBeaconBlock<C>, MaxRequestBlocks>,
}

#[derive(Clone, PartialEq, Debug, SszEncode, SszDecode)]
pub struct Attestations<C: Config> {
    pub attestations: VariableList<Attestation<C>, MaxAttestationsPerMessage>,
}

/// The engine as seen by the network stack.
pub trait Networked<C: Config> {
    fn accept_beacon_block(&mut self, block: SignedBeaconBlock<C>) -> Result<()>;

    fn accept_beacon_attestation(&mut self, attestation: Attestation<C>) -> Result<()>;

    fn get_status(&self) -> Status;

    fn get_beacon_block(&self, root: H256) -> Option<SignedBeaconBlock<C>>;
}
