//! Key layout of the chain database.

use types::primitives::{Slot, H256};

pub const HEAD_ROOT_KEY: &[u8] = b"head_root";

pub fn block_key(root: H256) -> Vec<u8> {
    let mut key = b"block:".to_vec();
    key.extend_from_slice(root.as_bytes());
    key
}

pub fn state_key(root: H256) -> Vec<u8> {
    let mut key = b"state:".to_vec();
    key.extend_from_slice(root.as_bytes());
    key
}

pub fn slot_to_hash_key(slot: Slot) -> Vec<u8> {
    let mut key = b"slot_to_hash:".to_vec();
    key.extend_from_slice(&slot.to_be_bytes());
    key
}

pub fn score_key(root: H256) -> Vec<u8> {
    let mut key = b"score:".to_vec();
    key.extend_from_slice(root.as_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_keys_sort_in_slot_order() {
        assert!(slot_to_hash_key(1) < slot_to_hash_key(2));
        assert!(slot_to_hash_key(255) < slot_to_hash_key(256));
    }

    #[test]
    fn block_and_state_keys_do_not_collide() {
        let root = H256::from([7; 32]);
        assert_ne!(block_key(root), state_key(root));
        assert_ne!(block_key(root), score_key(root));
    }
}
