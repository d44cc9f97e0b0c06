use bls::Keypair;
use merkle_proof::MerkleTree;
use ssz_types::{FixedVector, VariableList};
use std::cmp;
use typenum::marker_traits::Unsigned as _;
use types::beacon_state::BeaconState;
use types::config::Config;
use types::consts::{DEPOSIT_CONTRACT_TREE_DEPTH, SECONDS_PER_DAY};
use types::primitives::*;
use types::types::*;

use helper_functions::beacon_state_accessors::get_active_validator_indices;
use helper_functions::crypto::{hash, hash_tree_root};
use helper_functions::misc::compute_domain;

use crate::block_processing;
use crate::error::Error;

/// Build the genesis state from the Eth1 deposit log.
pub fn initialize_beacon_state_from_eth1<C: Config>(
    eth1_block_hash: H256,
    eth1_timestamp: UnixSeconds,
    deposits: &[Deposit],
) -> Result<BeaconState<C>, Error> {
    let mut state: BeaconState<C> = BeaconState {
        genesis_time: eth1_timestamp - eth1_timestamp % SECONDS_PER_DAY + 2 * SECONDS_PER_DAY,
        eth1_data: Eth1Data {
            deposit_root: H256::zero(),
            deposit_count: deposits.len() as u64,
            block_hash: eth1_block_hash,
        },
        latest_block_header: BeaconBlockHeader {
            body_root: hash_tree_root(&BeaconBlockBody::<C>::default()),
            ..BeaconBlockHeader::default()
        },
        ..BeaconState::default()
    };

    // Each deposit is validated against the root of the deposit tree as of
    // its own inclusion.
    let mut leaves = Vec::with_capacity(deposits.len());
    for deposit in deposits {
        leaves.push(hash_tree_root(&deposit.data));
        state.eth1_data.deposit_root = deposit_root(&leaves);
        block_processing::process_deposit(&mut state, deposit)?;
    }

    // Bootstrap validators with a full balance are active at genesis.
    for index in 0..state.validators.len() {
        let balance = state.balances[index];
        let validator = &mut state.validators[index];
        validator.effective_balance = cmp::min(
            balance - balance % C::effective_balance_increment(),
            C::max_effective_balance(),
        );
        if validator.effective_balance == C::max_effective_balance() {
            validator.activation_eligibility_epoch = C::genesis_epoch();
            validator.activation_epoch = C::genesis_epoch();
        }
    }

    // Seed every slot of the active-index history with the genesis root.
    let active_indices: VariableList<ValidatorIndex, C::ValidatorRegistryLimit> =
        get_active_validator_indices(&state, C::genesis_epoch()).into();
    let genesis_active_index_root = hash_tree_root(&active_indices);
    state.active_index_roots = FixedVector::from(vec![
        genesis_active_index_root;
        C::EpochsPerHistoricalVector::USIZE
    ]);

    Ok(state)
}

pub fn is_valid_genesis_state<C: Config>(state: &BeaconState<C>) -> bool {
    if state.genesis_time < C::min_genesis_time() {
        return false;
    }
    let active = get_active_validator_indices(state, C::genesis_epoch());
    active.len() as u64 >= C::min_genesis_active_validator_count()
}

/// The genesis block, constructed so that any party can produce it
/// independently. Note that `body.eth1_data` is left empty rather than set
/// to the state's.
pub fn genesis_block<C: Config>(state: &BeaconState<C>) -> SignedBeaconBlock<C> {
    let mut block = SignedBeaconBlock::default();
    block.message.state_root = hash_tree_root(state);
    block
}

/// The root of the deposit tree over `leaves` with the leaf count mixed in,
/// as the deposit contract reports it.
pub fn deposit_root(leaves: &[H256]) -> H256 {
    let tree = MerkleTree::create(leaves, DEPOSIT_CONTRACT_TREE_DEPTH as usize);
    mix_in_deposit_count(tree.hash(), leaves.len() as u64)
}

fn mix_in_deposit_count(root: H256, count: u64) -> H256 {
    let mut input = [0; 64];
    input[0..32].copy_from_slice(root.as_bytes());
    input[32..40].copy_from_slice(&count.to_le_bytes());
    H256::from_slice(&hash(&input))
}

fn deposit_count_leaf(count: u64) -> H256 {
    let mut bytes = [0; 32];
    bytes[0..8].copy_from_slice(&count.to_le_bytes());
    H256::from(bytes)
}

/// Wrap raw deposit data in `Deposit`s whose branches prove inclusion in the
/// tree as of each deposit.
pub fn deposits_from_data(data: &[DepositData]) -> Vec<Deposit> {
    let leaves: Vec<H256> = data.iter().map(hash_tree_root).collect();

    data.iter()
        .enumerate()
        .map(|(index, data)| {
            let tree = MerkleTree::create(
                &leaves[0..=index],
                DEPOSIT_CONTRACT_TREE_DEPTH as usize,
            );
            let (_, mut proof) =
                tree.generate_proof(index, DEPOSIT_CONTRACT_TREE_DEPTH as usize);
            proof.push(deposit_count_leaf(index as u64 + 1));
            Deposit {
                proof: FixedVector::from(proof),
                data: data.clone(),
            }
        })
        .collect()
}

/// Deterministic keypairs for local testnets and tests.
pub fn interop_keypairs(count: usize) -> Vec<Keypair> {
    (0..count)
        .map(|index| {
            let mut bytes = [0; 48];
            bytes[40..48].copy_from_slice(&(index as u64 + 1).to_be_bytes());
            let sk = SecretKey::from_bytes(&bytes)
                .expect("small integers are below the curve order");
            let pk = PublicKey::from_secret_key(&sk);
            Keypair { sk, pk }
        })
        .collect()
}

/// Full deposits (valid proofs of possession included) for the given keys.
pub fn interop_deposits<C: Config>(keypairs: &[Keypair], amount: Gwei) -> Vec<Deposit> {
    let data: Vec<DepositData> = keypairs
        .iter()
        .map(|keypair| {
            let pubkey = PublicKeyBytes::from_bytes(&keypair.pk.as_bytes())
                .expect("the public key round-trips through bytes");
            let mut credentials = hash(&keypair.pk.as_bytes());
            credentials[0] = C::bls_withdrawal_prefix_byte();
            let withdrawal_credentials = H256::from_slice(&credentials);

            let message = DepositMessage {
                pubkey: pubkey.clone(),
                withdrawal_credentials,
                amount,
            };
            let domain = compute_domain(C::domain_deposit(), None);
            let signature = Signature::new(
                hash_tree_root(&message).as_bytes(),
                domain.to_integer(),
                &keypair.sk,
            );

            DepositData {
                pubkey,
                withdrawal_credentials,
                amount,
                signature: SignatureBytes::from_bytes(&signature.as_bytes())
                    .expect("the signature round-trips through bytes"),
            }
        })
        .collect();

    deposits_from_data(&data)
}

#[cfg(test)]
mod tests {
    use helper_functions::predicates::is_active_validator;
    use types::config::MinimalConfig;

    use super::*;

    const DEPOSIT_AMOUNT: Gwei = 32_000_000_000;

    #[test]
    fn genesis_from_sixteen_mock_deposits() {
        let keypairs = interop_keypairs(16);
        let deposits = interop_deposits::<MinimalConfig>(&keypairs, DEPOSIT_AMOUNT);

        let state = initialize_beacon_state_from_eth1::<MinimalConfig>(
            H256::zero(),
            0,
            &deposits,
        )
        .expect("every deposit carries a valid proof");

        assert_eq!(state.slot, MinimalConfig::genesis_slot());
        assert_eq!(state.validators.len(), 16);
        assert_eq!(state.balances.len(), 16);
        assert_eq!(state.eth1_deposit_index, 16);
        assert_eq!(
            state.fork.previous_version,
            Version::from([0, 0, 0, 0]),
        );
        assert_eq!(state.fork.current_version, Version::from([0, 0, 0, 0]));
        for index in 0..16 {
            assert_eq!(state.balances[index], DEPOSIT_AMOUNT);
            assert!(is_active_validator(
                &state.validators[index],
                MinimalConfig::genesis_epoch(),
            ));
        }
        assert!(is_valid_genesis_state(&state));
    }

    #[test]
    fn deposit_with_invalid_possession_proof_is_skipped_but_counted() {
        let keypairs = interop_keypairs(2);
        let mut deposits = interop_deposits::<MinimalConfig>(&keypairs, DEPOSIT_AMOUNT);

        // Corrupt the second proof of possession. The deposit data changes,
        // so its branch has to be rebuilt as well.
        let mut data: Vec<DepositData> =
            deposits.iter().map(|deposit| deposit.data.clone()).collect();
        data[1].signature = SignatureBytes::empty();
        deposits = deposits_from_data(&data);

        let state = initialize_beacon_state_from_eth1::<MinimalConfig>(
            H256::zero(),
            0,
            &deposits,
        )
        .expect("an invalid proof of possession does not fail genesis");

        assert_eq!(state.validators.len(), 1);
        assert_eq!(state.eth1_deposit_index, 2);
    }

    #[test]
    fn too_few_validators_do_not_make_a_valid_genesis_state() {
        let keypairs = interop_keypairs(4);
        let deposits = interop_deposits::<MinimalConfig>(&keypairs, DEPOSIT_AMOUNT);
        let state = initialize_beacon_state_from_eth1::<MinimalConfig>(
            H256::zero(),
            0,
            &deposits,
        )
        .expect("every deposit carries a valid proof");
        assert!(!is_valid_genesis_state(&state));
    }

    #[test]
    fn genesis_block_commits_to_the_genesis_state() {
        let state = BeaconState::<MinimalConfig>::default();
        let block = genesis_block(&state);
        assert_eq!(block.message.state_root, hash_tree_root(&state));
        assert_eq!(block.message.slot, MinimalConfig::genesis_slot());
    }
}
