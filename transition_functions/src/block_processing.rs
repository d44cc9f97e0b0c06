use rayon::prelude::*;
use std::collections::BTreeSet;
use std::convert::{TryFrom as _, TryInto as _};
use tree_hash_derive::TreeHash;
use typenum::marker_traits::Unsigned as _;
use types::beacon_state::BeaconState;
use types::config::Config;
use types::consts::DEPOSIT_CONTRACT_TREE_DEPTH;
use types::primitives::*;
use types::types::*;

use helper_functions::beacon_state_accessors::{
    get_beacon_committee, get_beacon_proposer_index, get_committee_count_at_slot,
    get_current_epoch, get_domain, get_indexed_attestation, get_previous_epoch, get_randao_mix,
};
use helper_functions::beacon_state_mutators::{
    decrease_balance, increase_balance, initiate_validator_exit, slash_validator,
};
use helper_functions::crypto::{bls_verify, hash, hash_tree_root};
use helper_functions::math::xor;
use helper_functions::misc::{compute_domain, compute_epoch_at_slot};
use helper_functions::predicates::{
    is_active_validator, is_slashable_attestation_data, is_slashable_validator,
    is_valid_merkle_branch, validate_indexed_attestation,
};

use crate::error::Error;

/// Apply a block to a state already advanced to the block's slot.
///
/// `verify_proposer_signature` is false while a producer is still filling in
/// the state root; the canonical path always verifies.
pub fn process_block<C: Config>(
    state: &mut BeaconState<C>,
    signed_block: &SignedBeaconBlock<C>,
    verify_proposer_signature: bool,
) -> Result<(), Error> {
    process_block_header(state, &signed_block.message)?;
    if verify_proposer_signature {
        verify_block_signature(state, signed_block)?;
    }
    process_randao(state, &signed_block.message.body)?;
    process_eth1_data(state, &signed_block.message.body)?;
    process_operations(state, &signed_block.message.body)
}

pub fn process_block_header<C: Config>(
    state: &mut BeaconState<C>,
    block: &BeaconBlock<C>,
) -> Result<(), Error> {
    if block.slot != state.slot {
        return Err(Error::InvalidBlock {
            reason: "block slot does not match the state slot",
        });
    }
    if block.parent_root != hash_tree_root(&state.latest_block_header) {
        return Err(Error::InvalidBlock {
            reason: "parent root does not match the latest block header",
        });
    }

    state.latest_block_header = BeaconBlockHeader {
        slot: block.slot,
        parent_root: block.parent_root,
        // Zeroed and filled in by the next `process_slot` call.
        state_root: H256::zero(),
        body_root: hash_tree_root(&block.body),
    };

    let proposer_index = get_beacon_proposer_index(state)?;
    let proposer = &state.validators[usize::try_from(proposer_index)
        .map_err(|_| Error::Helper(helper_functions::Error::ConversionToUsize))?];
    if proposer.slashed {
        return Err(Error::InvalidBlock {
            reason: "proposer is slashed",
        });
    }

    Ok(())
}

fn verify_block_signature<C: Config>(
    state: &BeaconState<C>,
    signed_block: &SignedBeaconBlock<C>,
) -> Result<(), Error> {
    let proposer_index = get_beacon_proposer_index(state)?;
    let proposer = &state.validators[proposer_index as usize];

    let valid = bls_verify(
        &proposer.pubkey,
        hash_tree_root(&signed_block.message).as_bytes(),
        &signed_block.signature,
        get_domain(state, C::domain_beacon_proposer(), None),
    )?;
    if !valid {
        return Err(Error::InvalidBlock {
            reason: "proposer signature is invalid",
        });
    }
    Ok(())
}

pub fn process_randao<C: Config>(
    state: &mut BeaconState<C>,
    body: &BeaconBlockBody<C>,
) -> Result<(), Error> {
    let epoch = get_current_epoch(state);

    let proposer_index = get_beacon_proposer_index(state)?;
    let proposer = &state.validators[proposer_index as usize];
    let valid = bls_verify(
        &proposer.pubkey,
        hash_tree_root(&epoch).as_bytes(),
        &body.randao_reveal,
        get_domain(state, C::domain_randao(), None),
    )?;
    if !valid {
        return Err(Error::InvalidBlock {
            reason: "randao reveal does not verify against the proposer key",
        });
    }

    // Mix in the reveal.
    let reveal_hash: [u8; 32] = hash(&body.randao_reveal.as_bytes())
        .as_slice()
        .try_into()
        .expect("SHA-256 output is 32 bytes");
    let mix = xor(get_randao_mix(state, epoch)?.as_fixed_bytes(), &reveal_hash);
    let index = (epoch % C::EpochsPerHistoricalVector::U64) as usize;
    state.randao_mixes[index] = H256::from(mix);

    Ok(())
}

pub fn process_eth1_data<C: Config>(
    state: &mut BeaconState<C>,
    body: &BeaconBlockBody<C>,
) -> Result<(), Error> {
    state.eth1_data_votes.push(body.eth1_data.clone())?;
    let num_votes = state
        .eth1_data_votes
        .iter()
        .filter(|vote| **vote == body.eth1_data)
        .count();

    if num_votes * 2 > C::SlotsPerEth1VotingPeriod::USIZE {
        state.eth1_data = body.eth1_data.clone();
    }
    Ok(())
}

pub fn process_operations<C: Config>(
    state: &mut BeaconState<C>,
    body: &BeaconBlockBody<C>,
) -> Result<(), Error> {
    // Outstanding deposits must be processed up to the per-block maximum.
    let expected_deposits = std::cmp::min(
        C::MaxDeposits::U64,
        state
            .eth1_data
            .deposit_count
            .saturating_sub(state.eth1_deposit_index),
    );
    if body.deposits.len() as u64 != expected_deposits {
        return Err(Error::InvalidBlock {
            reason: "block does not include the expected number of deposits",
        });
    }

    for proposer_slashing in body.proposer_slashings.iter() {
        process_proposer_slashing(state, proposer_slashing, true)?;
    }
    for attester_slashing in body.attester_slashings.iter() {
        process_attester_slashing(state, attester_slashing, true)?;
    }

    // Attestation signatures are independent of each other and of the
    // pending-attestation bookkeeping, so they are checked in parallel
    // before any attestation is applied.
    verify_attestation_signatures(state, &body.attestations)?;
    for attestation in body.attestations.iter() {
        process_attestation(state, attestation, false)?;
    }

    for deposit in body.deposits.iter() {
        process_deposit(state, deposit)?;
    }
    for voluntary_exit in body.voluntary_exits.iter() {
        process_voluntary_exit(state, voluntary_exit, true)?;
    }

    let mut seen_transfers = BTreeSet::new();
    for transfer in body.transfers.iter() {
        if !seen_transfers.insert(hash_tree_root(transfer)) {
            return Err(Error::InvalidTransfer {
                reason: "transfer is included twice in the block",
            });
        }
        process_transfer(state, transfer, true)?;
    }

    Ok(())
}

fn verify_attestation_signatures<C: Config>(
    state: &BeaconState<C>,
    attestations: &[Attestation<C>],
) -> Result<(), Error> {
    let indexed = attestations
        .iter()
        .map(|attestation| get_indexed_attestation(state, attestation))
        .collect::<Result<Vec<_>, _>>()?;

    indexed
        .par_iter()
        .try_for_each(|indexed_attestation| {
            validate_indexed_attestation(state, indexed_attestation, true)
        })
        .map_err(attestation_error)
}

fn attestation_error(error: helper_functions::Error) -> Error {
    match error {
        helper_functions::Error::InvalidSignature => Error::InvalidAttestation {
            reason: "aggregate signature does not verify",
        },
        other => Error::Helper(other),
    }
}

pub fn process_attestation<C: Config>(
    state: &mut BeaconState<C>,
    attestation: &Attestation<C>,
    verify_signature: bool,
) -> Result<(), Error> {
    let data = &attestation.data;

    if data.index >= get_committee_count_at_slot(state, data.slot) {
        return Err(Error::InvalidAttestation {
            reason: "committee index is out of range",
        });
    }
    if data.target.epoch != get_previous_epoch(state)
        && data.target.epoch != get_current_epoch(state)
    {
        return Err(Error::InvalidAttestation {
            reason: "target epoch is neither current nor previous",
        });
    }
    if state.slot < data.slot + C::min_attestation_inclusion_delay()
        || data.slot + C::SlotsPerEpoch::U64 < state.slot
    {
        return Err(Error::InvalidAttestation {
            reason: "attestation is outside its inclusion window",
        });
    }

    let expected_source = if data.target.epoch == get_current_epoch(state) {
        state.current_justified_checkpoint
    } else {
        state.previous_justified_checkpoint
    };
    if data.source != expected_source {
        return Err(Error::InvalidAttestation {
            reason: "source does not match the justified checkpoint",
        });
    }

    let committee = get_beacon_committee(state, data.slot, data.index)?;
    if attestation.aggregation_bits.len() != committee.len() {
        return Err(Error::InvalidAttestation {
            reason: "aggregation bitfield length does not match the committee",
        });
    }

    validate_indexed_attestation(
        state,
        &get_indexed_attestation(state, attestation)?,
        verify_signature,
    )
    .map_err(attestation_error)?;

    let pending_attestation = PendingAttestation {
        data: data.clone(),
        aggregation_bits: attestation.aggregation_bits.clone(),
        inclusion_delay: state.slot - data.slot,
        proposer_index: get_beacon_proposer_index(state)?,
    };

    if data.target.epoch == get_current_epoch(state) {
        state.current_epoch_attestations.push(pending_attestation)?;
    } else {
        state
            .previous_epoch_attestations
            .push(pending_attestation)?;
    }

    Ok(())
}

pub fn process_deposit<C: Config>(
    state: &mut BeaconState<C>,
    deposit: &Deposit,
) -> Result<(), Error> {
    let valid_proof = is_valid_merkle_branch(
        &hash_tree_root(&deposit.data),
        &deposit.proof,
        DEPOSIT_CONTRACT_TREE_DEPTH + 1,
        state.eth1_deposit_index,
        &state.eth1_data.deposit_root,
    );
    if !valid_proof {
        return Err(Error::InvalidDepositProof);
    }

    // Deposits must be processed in order.
    state.eth1_deposit_index += 1;

    let DepositData {
        pubkey,
        withdrawal_credentials,
        amount,
        signature,
    } = &deposit.data;

    let existing = state
        .validators
        .iter()
        .position(|validator| validator.pubkey == *pubkey);
    if let Some(index) = existing {
        // Top-up of an existing validator.
        return increase_balance(state, index as u64, *amount).map_err(Error::Helper);
    }

    // Verify the proof of possession for new validators. The deposit contract
    // does not check signatures, and deposits predate the genesis fork, so
    // the domain carries no fork version. An invalid proof skips the deposit
    // without invalidating the block.
    let deposit_message = DepositMessage {
        pubkey: pubkey.clone(),
        withdrawal_credentials: *withdrawal_credentials,
        amount: *amount,
    };
    let domain = compute_domain(C::domain_deposit(), None);
    match bls_verify(
        pubkey,
        hash_tree_root(&deposit_message).as_bytes(),
        signature,
        domain,
    ) {
        Ok(true) => {}
        Ok(false) | Err(_) => return Ok(()),
    }

    state.validators.push(Validator {
        pubkey: pubkey.clone(),
        withdrawal_credentials: *withdrawal_credentials,
        activation_eligibility_epoch: C::far_future_epoch(),
        activation_epoch: C::far_future_epoch(),
        exit_epoch: C::far_future_epoch(),
        withdrawable_epoch: C::far_future_epoch(),
        effective_balance: std::cmp::min(
            amount - amount % C::effective_balance_increment(),
            C::max_effective_balance(),
        ),
        slashed: false,
    })?;
    state.balances.push(*amount)?;

    Ok(())
}

pub fn process_proposer_slashing<C: Config>(
    state: &mut BeaconState<C>,
    proposer_slashing: &ProposerSlashing,
    verify_signatures: bool,
) -> Result<(), Error> {
    let proposer_index = usize::try_from(proposer_slashing.proposer_index)
        .map_err(|_| Error::Helper(helper_functions::Error::ConversionToUsize))?;
    let proposer = state
        .validators
        .get(proposer_index)
        .ok_or(Error::InvalidProposerSlashing {
            reason: "proposer index is out of range",
        })?
        .clone();

    let header_1 = &proposer_slashing.signed_header_1;
    let header_2 = &proposer_slashing.signed_header_2;

    if header_1.message.slot != header_2.message.slot {
        return Err(Error::InvalidProposerSlashing {
            reason: "headers are for different slots",
        });
    }
    if header_1 == header_2 {
        return Err(Error::InvalidProposerSlashing {
            reason: "headers are identical",
        });
    }
    if !is_slashable_validator(&proposer, get_current_epoch(state)) {
        return Err(Error::InvalidProposerSlashing {
            reason: "proposer is not slashable",
        });
    }

    if verify_signatures {
        for signed_header in &[header_1, header_2] {
            let domain = get_domain(
                state,
                C::domain_beacon_proposer(),
                Some(compute_epoch_at_slot::<C>(signed_header.message.slot)),
            );
            let valid = bls_verify(
                &proposer.pubkey,
                hash_tree_root(&signed_header.message).as_bytes(),
                &signed_header.signature,
                domain,
            )?;
            if !valid {
                return Err(Error::InvalidProposerSlashing {
                    reason: "header signature is invalid",
                });
            }
        }
    }

    slash_validator(state, proposer_slashing.proposer_index, None)?;
    Ok(())
}

pub fn process_attester_slashing<C: Config>(
    state: &mut BeaconState<C>,
    attester_slashing: &AttesterSlashing<C>,
    verify_signatures: bool,
) -> Result<(), Error> {
    let attestation_1 = &attester_slashing.attestation_1;
    let attestation_2 = &attester_slashing.attestation_2;

    if !is_slashable_attestation_data(&attestation_1.data, &attestation_2.data) {
        return Err(Error::InvalidAttesterSlashing {
            reason: "attestation data is not slashable",
        });
    }
    validate_indexed_attestation(state, attestation_1, verify_signatures)
        .map_err(|_| Error::InvalidAttesterSlashing {
            reason: "first attestation fails validation",
        })?;
    validate_indexed_attestation(state, attestation_2, verify_signatures)
        .map_err(|_| Error::InvalidAttesterSlashing {
            reason: "second attestation fails validation",
        })?;

    let attesting_indices_1 = attestation_1
        .attesting_indices
        .iter()
        .copied()
        .collect::<BTreeSet<_>>();
    let attesting_indices_2 = attestation_2
        .attesting_indices
        .iter()
        .copied()
        .collect::<BTreeSet<_>>();

    let mut slashed_any = false;
    for index in &attesting_indices_1 & &attesting_indices_2 {
        let validator = &state.validators[usize::try_from(index)
            .map_err(|_| Error::Helper(helper_functions::Error::ConversionToUsize))?];
        if is_slashable_validator(validator, get_current_epoch(state)) {
            slash_validator(state, index, None)?;
            slashed_any = true;
        }
    }

    if !slashed_any {
        return Err(Error::SlashingHadNoEffect);
    }
    Ok(())
}

pub fn process_voluntary_exit<C: Config>(
    state: &mut BeaconState<C>,
    signed_voluntary_exit: &SignedVoluntaryExit,
    verify_signature: bool,
) -> Result<(), Error> {
    let voluntary_exit = &signed_voluntary_exit.message;
    let index = usize::try_from(voluntary_exit.validator_index)
        .map_err(|_| Error::Helper(helper_functions::Error::ConversionToUsize))?;
    let validator = state
        .validators
        .get(index)
        .ok_or(Error::InvalidVoluntaryExit {
            reason: "validator index is out of range",
        })?;

    if !is_active_validator(validator, get_current_epoch(state)) {
        return Err(Error::InvalidVoluntaryExit {
            reason: "validator is not active",
        });
    }
    if validator.exit_epoch != C::far_future_epoch() {
        return Err(Error::InvalidVoluntaryExit {
            reason: "exit has already been initiated",
        });
    }
    // Exits specify the epoch when they become valid.
    if get_current_epoch(state) < voluntary_exit.epoch {
        return Err(Error::InvalidVoluntaryExit {
            reason: "exit is not yet valid",
        });
    }
    if get_current_epoch(state)
        < validator.activation_epoch + C::persistent_committee_period()
    {
        return Err(Error::InvalidVoluntaryExit {
            reason: "validator has not been active long enough",
        });
    }

    if verify_signature {
        let domain = get_domain(state, C::domain_voluntary_exit(), Some(voluntary_exit.epoch));
        let valid = bls_verify(
            &validator.pubkey,
            hash_tree_root(voluntary_exit).as_bytes(),
            &signed_voluntary_exit.signature,
            domain,
        )?;
        if !valid {
            return Err(Error::InvalidVoluntaryExit {
                reason: "signature is invalid",
            });
        }
    }

    initiate_validator_exit(state, voluntary_exit.validator_index)?;
    Ok(())
}

// The message covered by a transfer signature: every field but the signature.
#[derive(TreeHash)]
struct TransferMessage {
    sender: ValidatorIndex,
    recipient: ValidatorIndex,
    amount: Gwei,
    fee: Gwei,
    slot: Slot,
    pubkey: PublicKeyBytes,
}

pub fn process_transfer<C: Config>(
    state: &mut BeaconState<C>,
    transfer: &Transfer,
    verify_signature: bool,
) -> Result<(), Error> {
    let sender = usize::try_from(transfer.sender)
        .map_err(|_| Error::Helper(helper_functions::Error::ConversionToUsize))?;
    let sender_validator = state
        .validators
        .get(sender)
        .ok_or(Error::InvalidTransfer {
            reason: "sender index is out of range",
        })?;
    let sender_balance = *state.balances.get(sender).ok_or(Error::InvalidTransfer {
        reason: "sender index is out of range",
    })?;

    if transfer.slot != state.slot {
        return Err(Error::InvalidTransfer {
            reason: "transfer is for a different slot",
        });
    }
    let total = transfer
        .amount
        .checked_add(transfer.fee)
        .ok_or(Error::InvalidTransfer {
            reason: "amount plus fee overflows",
        })?;
    if sender_balance < total {
        return Err(Error::InvalidTransfer {
            reason: "sender balance is insufficient",
        });
    }

    // Only withdrawable or never-activated balances may move; an active
    // validator may spend only what exceeds its maximum effective balance.
    let withdrawable = sender_validator.withdrawable_epoch <= get_current_epoch(state);
    let never_activated =
        sender_validator.activation_eligibility_epoch == C::far_future_epoch();
    let surplus_only = total + C::max_effective_balance() <= sender_balance;
    if !withdrawable && !never_activated && !surplus_only {
        return Err(Error::InvalidTransfer {
            reason: "sender funds are locked",
        });
    }

    let mut expected_credentials = hash(&transfer.pubkey.as_bytes());
    expected_credentials[0] = C::bls_withdrawal_prefix_byte();
    if sender_validator.withdrawal_credentials != H256::from_slice(&expected_credentials) {
        return Err(Error::InvalidTransfer {
            reason: "pubkey does not match the withdrawal credentials",
        });
    }

    if verify_signature {
        let message = TransferMessage {
            sender: transfer.sender,
            recipient: transfer.recipient,
            amount: transfer.amount,
            fee: transfer.fee,
            slot: transfer.slot,
            pubkey: transfer.pubkey.clone(),
        };
        let domain = get_domain(state, C::domain_transfer(), None);
        let valid = bls_verify(
            &transfer.pubkey,
            hash_tree_root(&message).as_bytes(),
            &transfer.signature,
            domain,
        )?;
        if !valid {
            return Err(Error::InvalidTransfer {
                reason: "signature is invalid",
            });
        }
    }

    decrease_balance(state, transfer.sender, total)?;
    increase_balance(state, transfer.recipient, transfer.amount)?;
    let proposer_index = get_beacon_proposer_index(state)?;
    increase_balance(state, proposer_index, transfer.fee)?;

    Ok(())
}
