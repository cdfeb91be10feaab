//! Text Conversion
//!
//! Converts between UTF-8 bytes and UTF-16 code units for display.
//! Conversion is best effort: absent or malformed input yields an empty
//! result instead of an error.

/// Converts text between UTF-8 and UTF-16.
///
/// Construct one where it is needed; it carries no state.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextConverter;

impl TextConverter {
    /// Create a new converter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode UTF-8 bytes. Absent or invalid input yields an empty string.
    #[must_use]
    pub fn decode_utf8(&self, bytes: Option<&[u8]>) -> String {
        bytes
            .and_then(|b| std::str::from_utf8(b).ok())
            .map(str::to_owned)
            .unwrap_or_default()
    }

    /// Encode text as UTF-16 code units.
    #[must_use]
    pub fn encode_utf16(&self, text: &str) -> Vec<u16> {
        text.encode_utf16().collect()
    }

    /// Decode UTF-16 code units. Absent input or unpaired surrogates yield
    /// an empty string.
    #[must_use]
    pub fn decode_utf16(&self, units: Option<&[u16]>) -> String {
        units
            .and_then(|u| String::from_utf16(u).ok())
            .unwrap_or_default()
    }

    /// Convert a single UTF-8 byte to a UTF-16 code unit.
    ///
    /// NUL, and bytes that are not a complete character on their own, map to 0.
    #[must_use]
    pub fn byte_to_unit(&self, byte: u8) -> u16 {
        if byte == 0 {
            return 0;
        }
        self.encode_utf16(&self.decode_utf8(Some(&[byte])))
            .first()
            .copied()
            .unwrap_or(0)
    }

    /// Convert a single UTF-16 code unit to a character.
    ///
    /// NUL and lone surrogates yield `None`.
    #[must_use]
    pub fn unit_to_char(&self, unit: u16) -> Option<char> {
        if unit == 0 {
            return None;
        }
        self.decode_utf16(Some(&[unit])).chars().next()
    }
}
