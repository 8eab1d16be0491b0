//! URL-safe base64 without padding.
//!
//! Encoding runs the standard alphabet and then swaps `+`/`/` for `-`/`_`
//! and strips the trailing `=`.  Decoding reverses the substitution and
//! re-pads to a multiple of four before handing off to the standard engine.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use thiserror::Error;

/// Failure to decode a base64url string.
#[derive(Debug, Error)]
pub enum Base64UrlError {
    /// A length of `4n + 1` can never come out of the encoder.
    #[error("Illegal base64url string length {0}")]
    IllegalLength(usize),

    /// Characters outside the alphabet, or bad trailing bits.
    #[error("Invalid base64url string: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),
}

/// Encode `bytes` as base64url with the padding removed.
pub fn encode(bytes: &[u8]) -> String {
    BASE64_STANDARD
        .encode(bytes)
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect()
}

/// Decode a base64url string produced by [`encode`].
pub fn decode(encoded: &str) -> Result<Vec<u8>, Base64UrlError> {
    let mut standard: String = encoded
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();

    match standard.len() % 4 {
        0 => {}
        2 => standard.push_str("=="),
        3 => standard.push('='),
        _ => return Err(Base64UrlError::IllegalLength(encoded.len())),
    }

    Ok(BASE64_STANDARD.decode(standard.as_bytes())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_substitutes_and_strips() {
        // 0xfb 0xff encodes to "+/8=" in the standard alphabet.
        assert_eq!(encode(&[0xfb, 0xff]), "-_8");
        assert_eq!(encode(b""), "");
        assert_eq!(encode(b"f"), "Zg");
        assert_eq!(encode(b"fo"), "Zm8");
        assert_eq!(encode(b"foo"), "Zm9v");
    }

    #[test]
    fn test_decode_repads() {
        assert_eq!(decode("Zg").unwrap(), b"f");
        assert_eq!(decode("Zm8").unwrap(), b"fo");
        assert_eq!(decode("Zm9v").unwrap(), b"foo");
        assert_eq!(decode("-_8").unwrap(), vec![0xfb, 0xff]);
        assert!(decode("").unwrap().is_empty());
    }

    #[test]
    fn test_round_trip_all_lengths() {
        let data: Vec<u8> = (0..=255u8).collect();
        for len in 0..data.len() {
            let slice = &data[..len];
            assert_eq!(decode(&encode(slice)).unwrap(), slice, "len {len}");
        }
    }

    #[test]
    fn test_decode_illegal_length() {
        let err = decode("Zm9vY").unwrap_err();
        assert!(matches!(err, Base64UrlError::IllegalLength(5)));
    }

    #[test]
    fn test_decode_invalid_characters() {
        let err = decode("Zm9*").unwrap_err();
        assert!(matches!(err, Base64UrlError::InvalidEncoding(_)));
        // Padding in the middle of the input.
        assert!(decode("Zg=a").is_err());
    }
}
