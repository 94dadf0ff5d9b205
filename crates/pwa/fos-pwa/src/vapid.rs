//! VAPID key decoding
//!
//! Application server keys arrive as base64url text with or without padding.
//! The platform subscribe call wants raw bytes.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::error::{PwaError, Result};

/// Length of an uncompressed P-256 public key
pub const P256_PUBLIC_KEY_LEN: usize = 65;

/// Decode a base64url server key into raw bytes.
///
/// `-` and `_` are mapped onto the standard alphabet and the input is padded
/// to a multiple of four before decoding.
pub fn decode_server_key(key: &str) -> Result<Vec<u8>> {
    let key = key.trim();
    if key.is_empty() {
        return Err(PwaError::MissingKey);
    }

    let mut normalized: String = key
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    let padding = (4 - normalized.len() % 4) % 4;
    normalized.extend(std::iter::repeat_n('=', padding));

    let bytes = STANDARD
        .decode(normalized.as_bytes())
        .map_err(|e| PwaError::InvalidKey(e.to_string()))?;
    if bytes.is_empty() {
        return Err(PwaError::InvalidKey("key decodes to zero bytes".into()));
    }
    Ok(bytes)
}

/// Whether the decoded key looks like an uncompressed P-256 point
pub fn is_uncompressed_p256(bytes: &[u8]) -> bool {
    bytes.len() == P256_PUBLIC_KEY_LEN && bytes[0] == 0x04
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_without_padding() {
        // "hello?" encodes to "aGVsbG8_" in base64url
        assert_eq!(decode_server_key("aGVsbG8_").unwrap(), b"hello?");
        // "hi" needs two padding characters
        assert_eq!(decode_server_key("aGk").unwrap(), b"hi");
    }

    #[test]
    fn test_decode_url_safe_characters() {
        assert_eq!(decode_server_key("-_8").unwrap(), vec![0xfb, 0xff]);
        assert_eq!(decode_server_key("+/8=").unwrap(), vec![0xfb, 0xff]);
    }

    #[test]
    fn test_decode_p256_key() {
        let key = "BEl62iUYgUivxIkv69yViEuiBIa-Ib9-SkvMeAtA3LFgDzkrxZJjSgSnfckjBJuBkr3qBUYIHBQFLXYp5Nksh8U";
        let bytes = decode_server_key(key).unwrap();
        assert!(is_uncompressed_p256(&bytes));
    }

    #[test]
    fn test_invalid_input() {
        assert_eq!(decode_server_key("   "), Err(PwaError::MissingKey));
        assert!(matches!(decode_server_key("a"), Err(PwaError::InvalidKey(_))));
        assert!(matches!(decode_server_key("ab$d"), Err(PwaError::InvalidKey(_))));
    }
}
