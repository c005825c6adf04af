use im::hashmap::HashMap as ImHashMap;

use common::canonical_serialize::CanonicalSerialize;

use proto::channel::messages::{ChannelConfig, OffchainState, StateProposal, UpdateKind};
use proto::crypto::{ChannelId, PublicKey, Signature};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    UnknownParticipant,
    SelfTransfer,
    /// Balance would drop below zero or below the channel reserve.
    InsufficientFunds,
    BalanceOverflow,
    RoundOverflow,
    WrongChannelId,
    NonMonotonicRound,
    /// The proposed balances do not match the locally recomputed ones.
    BalancesMismatch,
    MissingProposerSignature,
    /// An inbound proposal must name the counterparty as its proposer.
    WrongProposer,
}

/// The round 0 state: configured funding amounts, no signatures.
pub fn initial_state(config: &ChannelConfig, channel_id: ChannelId) -> OffchainState {
    let mut balances = ImHashMap::new();
    balances.insert(config.initiator_id.clone(), config.initiator_amount);
    balances.insert(config.responder_id.clone(), config.responder_amount);
    OffchainState {
        channel_id,
        round: 0,
        balances,
        initiator_signature: None,
        responder_signature: None,
    }
}

/// Apply a balance rule to a state, producing the unsigned successor state.
/// Checks the reserve invariant for every balance decrease.
pub fn apply_kind(
    state: &OffchainState,
    kind: &UpdateKind,
    proposer: &PublicKey,
    channel_reserve: u128,
) -> Result<OffchainState, TransitionError> {
    let mut balances = state.balances.clone();

    match kind {
        UpdateKind::Transfer { from, to, amount } => {
            if from == to {
                return Err(TransitionError::SelfTransfer);
            }
            let from_balance = *balances.get(from).ok_or(TransitionError::UnknownParticipant)?;
            let to_balance = *balances.get(to).ok_or(TransitionError::UnknownParticipant)?;
            let new_from = from_balance
                .checked_sub(*amount)
                .ok_or(TransitionError::InsufficientFunds)?;
            if new_from < channel_reserve {
                return Err(TransitionError::InsufficientFunds);
            }
            let new_to = to_balance
                .checked_add(*amount)
                .ok_or(TransitionError::BalanceOverflow)?;
            balances.insert(from.clone(), new_from);
            balances.insert(to.clone(), new_to);
        }
        UpdateKind::Deposit { amount } => {
            let balance = *balances
                .get(proposer)
                .ok_or(TransitionError::UnknownParticipant)?;
            let new_balance = balance
                .checked_add(*amount)
                .ok_or(TransitionError::BalanceOverflow)?;
            balances.insert(proposer.clone(), new_balance);
        }
        UpdateKind::Withdraw { amount } => {
            let balance = *balances
                .get(proposer)
                .ok_or(TransitionError::UnknownParticipant)?;
            let new_balance = balance
                .checked_sub(*amount)
                .ok_or(TransitionError::InsufficientFunds)?;
            if new_balance < channel_reserve {
                return Err(TransitionError::InsufficientFunds);
            }
            balances.insert(proposer.clone(), new_balance);
        }
        // A shutdown round freezes the balances; only the round advances.
        UpdateKind::Shutdown => {}
    }

    let round = state
        .round
        .checked_add(1)
        .ok_or(TransitionError::RoundOverflow)?;

    Ok(OffchainState {
        channel_id: state.channel_id.clone(),
        round,
        balances,
        initiator_signature: None,
        responder_signature: None,
    })
}

/// Validate an inbound proposal against our current state by recomputing the
/// expected successor and comparing canonical encodings. Verifies the
/// proposer's signature slot is filled; signature verification itself is the
/// signer's concern.
pub fn validate_proposal(
    current: &OffchainState,
    proposal: &StateProposal,
    config: &ChannelConfig,
) -> Result<(), TransitionError> {
    if proposal.state.channel_id != current.channel_id {
        return Err(TransitionError::WrongChannelId);
    }
    // Only the counterparty may stand behind an inbound proposal. A peer
    // naming the local party as proposer would trick us into committing a
    // round we never proposed, carrying only our own signature.
    if proposal.proposer != *config.remote_id() {
        return Err(TransitionError::WrongProposer);
    }

    let expected = apply_kind(current, &proposal.kind, &proposal.proposer, config.channel_reserve)?;
    if proposal.state.round != expected.round {
        return Err(TransitionError::NonMonotonicRound);
    }
    if proposal.state.canonical_serialize() != expected.canonical_serialize() {
        return Err(TransitionError::BalancesMismatch);
    }

    let proposer_signature = if proposal.proposer == config.initiator_id {
        &proposal.state.initiator_signature
    } else {
        &proposal.state.responder_signature
    };
    if proposer_signature.is_none() {
        return Err(TransitionError::MissingProposerSignature);
    }

    Ok(())
}

/// Attach `signature` to the slot belonging to `id`.
pub fn attach_signature(
    state: &mut OffchainState,
    config: &ChannelConfig,
    id: &PublicKey,
    signature: Signature,
) -> Result<(), TransitionError> {
    if *id == config.initiator_id {
        state.initiator_signature = Some(signature);
    } else if *id == config.responder_id {
        state.responder_signature = Some(signature);
    } else {
        return Err(TransitionError::UnknownParticipant);
    }
    Ok(())
}
