//! Legacy-encoding collaborator (spec §6).
//!
//! The spec treats `iconv_s2u`/`iconv_u2s` as an externally supplied pair of
//! conversion functions; the legacy encoding's lead-byte ranges
//! (0x81-0x9F, 0xE0-0xFC) are exactly Shift_JIS's, so `encoding_rs` backs
//! the conversion here rather than a hand-rolled table.

use encoding_rs::SHIFT_JIS;

/// True if `b` starts a two-byte legacy-encoding sequence.
pub fn is_lead_byte(b: u8) -> bool {
    (0x81..=0x9f).contains(&b) || (0xe0..=0xfc).contains(&b)
}

/// Converts legacy-encoded bytes to a Unicode `String`.
///
/// Returns `Err(())` on any byte sequence `encoding_rs` cannot represent,
/// matching the `< 0` failure contract of `iconv_s2u`.
pub fn iconv_s2u(src: &[u8]) -> Result<String, ()> {
    let (cow, _enc, had_errors) = SHIFT_JIS.decode(src);
    if had_errors { Err(()) } else { Ok(cow.into_owned()) }
}

/// Converts a Unicode string to legacy-encoded bytes.
///
/// Returns `Err(())` on any character with no legacy-encoding
/// representation, matching the `< 0` failure contract of `iconv_u2s`.
pub fn iconv_u2s(src: &str) -> Result<Vec<u8>, ()> {
    let (cow, _enc, had_errors) = SHIFT_JIS.encode(src);
    if had_errors { Err(()) } else { Ok(cow.into_owned()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plain_ascii() {
        let encoded = iconv_u2s("HELLO.TXT").unwrap();
        assert_eq!(iconv_s2u(&encoded).unwrap(), "HELLO.TXT");
    }

    #[test]
    fn round_trips_two_byte_sequences() {
        let original = "日本語";
        let encoded = iconv_u2s(original).unwrap();
        assert!(encoded.iter().any(|&b| is_lead_byte(b)));
        assert_eq!(iconv_s2u(&encoded).unwrap(), original);
    }

    #[test]
    fn lead_byte_ranges_match_legacy_encoding() {
        assert!(is_lead_byte(0x81));
        assert!(is_lead_byte(0x9f));
        assert!(is_lead_byte(0xe0));
        assert!(is_lead_byte(0xfc));
        assert!(!is_lead_byte(0x20));
        assert!(!is_lead_byte(0x7f));
        assert!(!is_lead_byte(0xa0));
    }
}
