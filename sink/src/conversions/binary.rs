use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use config::shared::BinaryFormat;

use crate::bail;
use crate::error::{ErrorKind, SinkResult};

/// Decodes `0x`-prefixed hex into bytes.
///
/// Each pair of hex digits after the prefix represents one byte, in either case.
pub fn parse_hex(text: &str) -> SinkResult<Vec<u8>> {
    let Some(digits) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) else {
        bail!(
            ErrorKind::ConversionError,
            "Could not convert hex string to bytes",
            "The prefix '0x' is missing"
        );
    };

    if digits.len() % 2 != 0 {
        bail!(
            ErrorKind::ConversionError,
            "Could not convert hex string to bytes",
            "The number of digits is odd"
        );
    }

    let mut bytes = Vec::with_capacity(digits.len() / 2);
    for index in (0..digits.len()).step_by(2) {
        let Some(pair) = digits.get(index..index + 2) else {
            bail!(
                ErrorKind::ConversionError,
                "Could not convert hex string to bytes",
                "The string contains non-ASCII characters"
            );
        };
        bytes.push(u8::from_str_radix(pair, 16)?);
    }

    Ok(bytes)
}

/// Encodes bytes as `0x`-prefixed lower-case hex.
pub fn format_hex(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity(2 + bytes.len() * 2);
    encoded.push_str("0x");
    for byte in bytes {
        encoded.push_str(&format!("{byte:02x}"));
    }
    encoded
}

/// Decodes text as hex when it carries the `0x` prefix, base64 otherwise.
pub fn parse_binary(text: &str) -> SinkResult<Vec<u8>> {
    let trimmed = text.trim();
    if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
        parse_hex(trimmed)
    } else {
        Ok(STANDARD.decode(trimmed)?)
    }
}

pub fn format_binary(bytes: &[u8], format: BinaryFormat) -> String {
    match format {
        BinaryFormat::Base64 => STANDARD.encode(bytes),
        BinaryFormat::Hex => format_hex(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_multiple_bytes() {
        assert_eq!(parse_hex("0x48656c6c6f").unwrap(), b"Hello");
    }

    #[test]
    fn parse_hex_empty() {
        assert_eq!(parse_hex("0x").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn parse_hex_mixed_case() {
        assert_eq!(parse_hex("0XaBcD").unwrap(), vec![0xab, 0xcd]);
    }

    #[test]
    fn parse_hex_missing_prefix() {
        let err = parse_hex("41").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConversionError);
        assert!(err.to_string().contains("prefix '0x' is missing"));
    }

    #[test]
    fn parse_hex_odd_digits() {
        let err = parse_hex("0x123").unwrap_err();
        assert!(err.to_string().contains("number of digits is odd"));
    }

    #[test]
    fn parse_hex_invalid_digit() {
        assert_eq!(parse_hex("0xzz").unwrap_err().kind(), ErrorKind::ConversionError);
    }

    #[test]
    fn parse_binary_detects_encoding() {
        assert_eq!(parse_binary("0x0102").unwrap(), vec![1, 2]);
        assert_eq!(parse_binary("AQI=").unwrap(), vec![1, 2]);
        assert_eq!(
            parse_binary("not base64!").unwrap_err().kind(),
            ErrorKind::ConversionError
        );
    }

    #[test]
    fn format_binary_follows_configuration() {
        assert_eq!(format_binary(&[1, 2], BinaryFormat::Base64), "AQI=");
        assert_eq!(format_binary(&[0xca, 0xfe], BinaryFormat::Hex), "0xcafe");
    }
}
