//! UTF-16 to UTF-8 conversion for name and label slots

use encoding_rs::UTF_16LE;

use crate::error::{DentError, DentResult};

/// Converts a UTF-16 segment of a directory slot into UTF-8
pub trait Utf16Decoder {
    /// Decode at most `max_units` units of `units`.
    ///
    /// The result never exceeds `capacity` bytes; output that would is an
    /// error rather than a truncation. `inum` and `label` identify the slot
    /// in error messages.
    fn decode(
        &self,
        units: &[u16],
        max_units: usize,
        capacity: usize,
        inum: u64,
        label: &str,
    ) -> DentResult<String>;
}

/// Default decoder backed by `encoding_rs`
#[derive(Debug, Clone, Copy)]
pub struct EncodingRsDecoder {
    replace_control_chars: bool,
}

impl Default for EncodingRsDecoder {
    fn default() -> Self {
        Self {
            replace_control_chars: true,
        }
    }
}

impl EncodingRsDecoder {
    pub const fn new(replace_control_chars: bool) -> Self {
        Self {
            replace_control_chars,
        }
    }
}

impl Utf16Decoder for EncodingRsDecoder {
    fn decode(
        &self,
        units: &[u16],
        max_units: usize,
        capacity: usize,
        inum: u64,
        label: &str,
    ) -> DentResult<String> {
        let conversion_error = |reason: String| DentError::Conversion {
            inum,
            label: label.to_string(),
            reason,
        };

        // Names are NUL-terminated when shorter than the slot
        let bytes: Vec<u8> = units
            .iter()
            .take(max_units)
            .take_while(|&&unit| unit != 0)
            .flat_map(|unit| unit.to_le_bytes())
            .collect();

        let decoded = UTF_16LE
            .decode_without_bom_handling_and_without_replacement(&bytes)
            .ok_or_else(|| conversion_error("unpaired surrogate".to_string()))?;

        let text: String = if self.replace_control_chars {
            decoded
                .chars()
                .map(|c| if c.is_control() { '^' } else { c })
                .collect()
        } else {
            decoded.into_owned()
        };

        if text.len() > capacity {
            return Err(conversion_error(format!(
                "{} bytes do not fit in {} remaining",
                text.len(),
                capacity
            )));
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    #[test]
    fn test_utf16_decode() {
        let decoder = EncodingRsDecoder::default();
        let name = decoder
            .decode(&units("test.txt"), 15, 100, 3, "file name segment")
            .unwrap();
        assert_eq!(name, "test.txt");
    }

    #[test]
    fn test_stops_at_max_units_and_nul() {
        let decoder = EncodingRsDecoder::default();
        assert_eq!(
            decoder.decode(&units("abcdef"), 3, 100, 3, "x").unwrap(),
            "abc"
        );

        let mut with_nul = units("ab");
        with_nul.extend([0, b'c' as u16]);
        assert_eq!(decoder.decode(&with_nul, 15, 100, 3, "x").unwrap(), "ab");
    }

    #[test]
    fn test_non_ascii_names() {
        let decoder = EncodingRsDecoder::default();
        let name = decoder
            .decode(&units("résumé😀"), 15, 100, 3, "x")
            .unwrap();
        assert_eq!(name, "résumé😀");
    }

    #[test]
    fn test_unpaired_surrogate_is_error() {
        let decoder = EncodingRsDecoder::default();
        let err = decoder
            .decode(&[b'a' as u16, 0xD800, b'b' as u16], 15, 100, 42, "file name segment")
            .unwrap_err();
        assert!(matches!(err, DentError::Conversion { inum: 42, .. }));
    }

    #[test]
    fn test_capacity_is_enforced() {
        let decoder = EncodingRsDecoder::default();
        // 3 characters of 2 bytes each
        assert!(decoder.decode(&units("ééé"), 15, 5, 3, "x").is_err());
        assert_eq!(decoder.decode(&units("ééé"), 15, 6, 3, "x").unwrap(), "ééé");
    }

    #[test]
    fn test_control_characters() {
        let raw = [b'a' as u16, 0x07, b'b' as u16];
        assert_eq!(
            EncodingRsDecoder::default().decode(&raw, 15, 10, 3, "x").unwrap(),
            "a^b"
        );
        assert_eq!(
            EncodingRsDecoder::new(false).decode(&raw, 15, 10, 3, "x").unwrap(),
            "a\u{7}b"
        );
    }
}
