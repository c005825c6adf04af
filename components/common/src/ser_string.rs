use base64::{self, URL_SAFE_NO_PAD};

#[derive(Debug, PartialEq, Eq)]
pub struct SerStringError;

/// Encode a binary buffer as an opaque, url safe string.
pub fn data_to_string(data: &[u8]) -> String {
    base64::encode_config(data, URL_SAFE_NO_PAD)
}

/// Decode a string created by `data_to_string`.
pub fn string_to_data(input_str: &str) -> Result<Vec<u8>, SerStringError> {
    base64::decode_config(input_str, URL_SAFE_NO_PAD).map_err(|_| SerStringError)
}
