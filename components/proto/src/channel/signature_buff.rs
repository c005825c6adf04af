use common::canonical_serialize::CanonicalSerialize;

use crate::channel::messages::{ChannelConfig, OffchainState};

pub const FUNDING_PREFIX: &[u8] = b"CHANNEL_FUNDING";
pub const STATE_PREFIX: &[u8] = b"CHANNEL_STATE";
pub const ONCHAIN_PREFIX: &[u8] = b"CHANNEL_ONCHAIN";

/// The funding transaction both parties sign at open.
/// Role, transport address and resume data are local matters and are not
/// part of the buffer, so both sides produce identical bytes.
pub fn funding_tx_buffer(config: &ChannelConfig) -> Vec<u8> {
    let mut buff = Vec::new();
    buff.extend_from_slice(FUNDING_PREFIX);
    buff.extend_from_slice(&config.initiator_id.canonical_serialize());
    buff.extend_from_slice(&config.responder_id.canonical_serialize());
    buff.extend_from_slice(&config.initiator_amount.canonical_serialize());
    buff.extend_from_slice(&config.responder_amount.canonical_serialize());
    buff.extend_from_slice(&config.channel_reserve.canonical_serialize());
    buff.extend_from_slice(&config.push_amount.canonical_serialize());
    buff.extend_from_slice(&config.lock_period.canonical_serialize());
    buff
}

/// The buffer a participant signs when proposing or accepting a round.
pub fn state_signing_buffer(state: &OffchainState) -> Vec<u8> {
    let mut buff = Vec::new();
    buff.extend_from_slice(STATE_PREFIX);
    buff.extend_from_slice(&state.canonical_serialize());
    buff
}

/// The co-signed transaction submitted on chain for deposit, withdraw and
/// close rounds. Unlike the signing buffer, this one carries both
/// signatures.
pub fn cosigned_tx_buffer(state: &OffchainState) -> Vec<u8> {
    let mut buff = Vec::new();
    buff.extend_from_slice(ONCHAIN_PREFIX);
    buff.extend_from_slice(&state.canonical_serialize());
    buff.extend_from_slice(&state.initiator_signature.canonical_serialize());
    buff.extend_from_slice(&state.responder_signature.canonical_serialize());
    buff
}
