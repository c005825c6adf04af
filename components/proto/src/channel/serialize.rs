use derive_more::From;

use common::ser_string::{data_to_string, string_to_data, SerStringError};

use crate::channel::messages::{OffchainState, ProofOfInclusion};

#[derive(Debug, From)]
pub enum SerializeError {
    SerStringError(SerStringError),
    JsonError(serde_json::Error),
}

/// Encode an off-chain state into the opaque blob handed to the
/// application by `state()`, `leave()` and the negotiation results.
pub fn state_to_blob(state: &OffchainState) -> Result<String, SerializeError> {
    Ok(data_to_string(&serde_json::to_vec(state)?))
}

/// Decode a blob created by `state_to_blob`.
pub fn blob_to_state(blob: &str) -> Result<OffchainState, SerializeError> {
    let data = string_to_data(blob)?;
    Ok(serde_json::from_slice(&data)?)
}

/// Encode a proof of inclusion into its opaque external form.
pub fn poi_to_blob(poi: &ProofOfInclusion) -> Result<String, SerializeError> {
    Ok(data_to_string(&serde_json::to_vec(poi)?))
}

/// Decode a blob created by `poi_to_blob`.
pub fn blob_to_poi(blob: &str) -> Result<ProofOfInclusion, SerializeError> {
    let data = string_to_data(blob)?;
    Ok(serde_json::from_slice(&data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    use im::hashmap::HashMap as ImHashMap;

    use crate::crypto::{ChannelId, PublicKey, Signature};

    fn example_state() -> OffchainState {
        let mut balances = ImHashMap::new();
        balances.insert(PublicKey::from(&[0xaa; PublicKey::len()]), 150u128);
        balances.insert(PublicKey::from(&[0xbb; PublicKey::len()]), 50u128);
        OffchainState {
            channel_id: ChannelId::from(&[0x11; ChannelId::len()]),
            round: 7,
            balances,
            initiator_signature: Some(Signature::from(&[0x01; Signature::len()])),
            responder_signature: None,
        }
    }

    #[test]
    fn test_state_blob_round_trip() {
        let state = example_state();
        let blob = state_to_blob(&state).unwrap();
        assert_eq!(blob_to_state(&blob).unwrap(), state);
    }

    #[test]
    fn test_blob_to_state_invalid() {
        assert!(blob_to_state("???").is_err());
        assert!(blob_to_state(&data_to_string(b"{}")).is_err());
    }
}
