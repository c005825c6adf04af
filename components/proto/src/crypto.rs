use serde::{Deserialize, Serialize};

use common::b64_array::B64Array;
use common::canonical_serialize::CanonicalSerialize;
use common::define_fixed_bytes;

pub const HASH_RESULT_LEN: usize = 32;
define_fixed_bytes!(HashResult, HASH_RESULT_LEN);

pub const PUBLIC_KEY_LEN: usize = 32;
define_fixed_bytes!(PublicKey, PUBLIC_KEY_LEN);

pub const SIGNATURE_LEN: usize = 64;
define_fixed_bytes!(Signature, SIGNATURE_LEN);

pub const CHANNEL_ID_LEN: usize = 32;

// Identifier of a channel, assigned by the ledger when the funding
// transaction is included on chain.
define_fixed_bytes!(ChannelId, CHANNEL_ID_LEN);

pub const TX_ID_LEN: usize = 32;

// Identifier of an on chain transaction.
define_fixed_bytes!(TxId, TX_ID_LEN);

impl CanonicalSerialize for HashResult {
    fn canonical_serialize(&self) -> Vec<u8> {
        self.as_ref().to_vec()
    }
}

impl CanonicalSerialize for PublicKey {
    fn canonical_serialize(&self) -> Vec<u8> {
        self.as_ref().to_vec()
    }
}

impl CanonicalSerialize for Signature {
    fn canonical_serialize(&self) -> Vec<u8> {
        self.as_ref().to_vec()
    }
}

impl CanonicalSerialize for ChannelId {
    fn canonical_serialize(&self) -> Vec<u8> {
        self.as_ref().to_vec()
    }
}

impl CanonicalSerialize for TxId {
    fn canonical_serialize(&self) -> Vec<u8> {
        self.as_ref().to_vec()
    }
}
