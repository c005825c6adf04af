use serde::de::{Deserialize, Deserializer, Error};
use serde::ser::Serializer;

use base64::{self, URL_SAFE_NO_PAD};

/// Serde support for byte arrays larger than 32 elements.
/// Required for the `Signature` type, which is 64 bytes long.
pub trait B64Array<'de>: Sized {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer;
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>;
}

macro_rules! b64_array {
    ($($len:expr,)+) => {
        $(
            impl<'de,> B64Array<'de> for [u8; $len] {
                fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
                    where S: Serializer
                {
                    let base64_str = base64::encode_config(&self.as_ref(), URL_SAFE_NO_PAD);
                    serializer.serialize_str(&base64_str)
                }

                fn deserialize<D>(deserializer: D) -> Result<[u8; $len], D::Error>
                    where D: Deserializer<'de>
                {
                    let string = String::deserialize(deserializer)?;
                    let vec = base64::decode_config(&string, URL_SAFE_NO_PAD)
                        .map_err(|err| Error::custom(err.to_string()))?;

                    if vec.len() != $len {
                        Err(Error::custom("Length mismatch"))
                    } else {
                        let mut inner = [0u8; $len];
                        inner.copy_from_slice(&vec[..]);
                        Ok(inner)
                    }
                }
            }
        )+
    }
}

b64_array! {
    16,
    32,
    64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode32(array: &[u8; 32]) -> String {
        let mut out = Vec::new();
        let mut serializer = serde_json::Serializer::new(&mut out);
        B64Array::serialize(array, &mut serializer).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn decode32(json: &str) -> Result<[u8; 32], serde_json::Error> {
        let mut deserializer = serde_json::Deserializer::from_str(json);
        <[u8; 32] as B64Array>::deserialize(&mut deserializer)
    }

    #[test]
    fn test_b64_array_round_trip() {
        let array = [0x5au8; 32];
        assert_eq!(decode32(&encode32(&array)).unwrap(), array);
    }

    #[test]
    fn test_b64_array_requires_exact_length() {
        // 31 and 33 byte payloads must both be rejected; no silent
        // truncation of oversized input.
        for len in &[31usize, 33] {
            let encoded = base64::encode_config(&vec![0u8; *len], URL_SAFE_NO_PAD);
            let json = format!("\"{}\"", encoded);
            assert!(decode32(&json).is_err());
        }
    }
}
