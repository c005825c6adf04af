use std::collections::HashMap;

use common::canonical_serialize::CanonicalSerialize;

use crypto::hash::hash_buffer;

use proto::channel::messages::{OffchainState, PoiEntry, ProofOfInclusion};
use proto::crypto::PublicKey;

use crate::transition::TransitionError;

/// Balances of the requested addresses, taken from the given state.
/// Unknown addresses are simply absent from the result.
pub fn project_balances(
    state: &OffchainState,
    addresses: &[PublicKey],
) -> HashMap<PublicKey, u128> {
    addresses
        .iter()
        .filter_map(|address| {
            state
                .balance(address)
                .map(|amount| (address.clone(), amount))
        })
        .collect()
}

/// Build a proof of inclusion for the given accounts over the given state.
/// Both parties derive the same proof from the same round, because the
/// entries are ordered by account and the hash covers only the signed part
/// of the state.
pub fn build_proof(
    state: &OffchainState,
    accounts: &[PublicKey],
) -> Result<ProofOfInclusion, TransitionError> {
    let mut entries = Vec::new();
    for account in accounts {
        let amount = state
            .balance(account)
            .ok_or(TransitionError::UnknownParticipant)?;
        entries.push(PoiEntry {
            account: account.clone(),
            amount,
        });
    }
    entries.sort_by(|a, b| a.account.cmp(&b.account));
    entries.dedup();

    Ok(ProofOfInclusion {
        channel_id: state.channel_id.clone(),
        round: state.round,
        entries,
        state_hash: hash_buffer(&state.canonical_serialize()),
    })
}
