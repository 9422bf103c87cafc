//! Resumable read cursors.

use std::fmt;
use std::str::FromStr;

/// Size of an encoded [`Address`] in bytes.
pub const ADDRESS_SIZE: usize = 8;

/// A position in the logical stream: a segment index and a byte offset
/// inside that segment.
///
/// Addresses are issued by the store (`store`, `retrieve`, `retrieve_next`)
/// and handed back to it (`retrieve`, `clean`). Ordering is by segment, then
/// offset. On the wire an address is a big-endian `u64` with the segment in
/// the upper 32 bits and the offset in the lower 32 bits.
///
/// ```rust
/// use eventspool_core::Address;
///
/// let cursor = Address::from_bytes(&[0, 0, 0, 2, 0, 0, 0, 14]).unwrap();
/// assert_eq!((cursor.segment(), cursor.offset()), (2, 14));
/// assert_eq!(cursor.to_string(), "2:14");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address {
    segment: u32,
    offset: u32,
}

impl Address {
    /// The beginning of the stream.
    pub const ZERO: Self = Self::new(0, 0);

    pub(crate) const fn new(segment: u32, offset: u32) -> Self {
        Self { segment, offset }
    }

    /// Segment index.
    #[must_use]
    pub const fn segment(self) -> u32 {
        self.segment
    }

    /// Byte offset inside the segment.
    #[must_use]
    pub const fn offset(self) -> u32 {
        self.offset
    }

    /// Returns true for the beginning-of-stream address.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.segment == 0 && self.offset == 0
    }

    /// Packs the address into its `u64` form.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        ((self.segment as u64) << 32) | self.offset as u64
    }

    /// Rehydrates an address from its `u64` form.
    #[must_use]
    pub const fn from_u64(value: u64) -> Self {
        Self::new((value >> 32) as u32, (value & 0xFFFF_FFFF) as u32)
    }

    /// Encodes the address as 8 big-endian bytes.
    #[must_use]
    pub const fn to_bytes(self) -> [u8; ADDRESS_SIZE] {
        self.as_u64().to_be_bytes()
    }

    /// Decodes an address from exactly 8 big-endian bytes.
    ///
    /// Returns `None` if the slice has any other length.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; ADDRESS_SIZE] = bytes.try_into().ok()?;
        Some(Self::from_u64(u64::from_be_bytes(raw)))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment, self.offset)
    }
}

/// Error returned when parsing an [`Address`] from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAddressError(String);

impl fmt::Display for ParseAddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid address {:?}: expected segment:offset, a decimal u64 or 0x-prefixed hex",
            self.0
        )
    }
}

impl std::error::Error for ParseAddressError {}

impl FromStr for Address {
    type Err = ParseAddressError;

    /// Accepts `segment:offset`, a decimal `u64`, or `0x`-prefixed hex.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseAddressError(s.to_string());
        let s = s.trim();

        if let Some((segment, offset)) = s.split_once(':') {
            let segment = segment.parse().map_err(|_| err())?;
            let offset = offset.parse().map_err(|_| err())?;
            return Ok(Self::new(segment, offset));
        }

        let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => s.parse(),
        }
        .map_err(|_| err())?;
        Ok(Self::from_u64(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_segment_then_offset() {
        let a = Address::new(0, 900);
        let b = Address::new(1, 0);
        let c = Address::new(1, 14);
        assert!(a < b && b < c);
        assert!(Address::ZERO < a);
    }

    #[test]
    fn wire_layout_is_big_endian_segment_high() {
        let addr = Address::new(3, 0x0102);
        assert_eq!(addr.as_u64(), (3 << 32) | 0x0102);
        assert_eq!(addr.to_bytes(), [0, 0, 0, 3, 0, 0, 1, 2]);
        assert_eq!(Address::from_bytes(&addr.to_bytes()), Some(addr));
    }

    #[test]
    fn from_bytes_rejects_wrong_length() {
        assert_eq!(Address::from_bytes(&[0; 7]), None);
        assert_eq!(Address::from_bytes(&[0; 9]), None);
    }

    #[test]
    fn parse_accepts_all_text_forms() {
        let expected = Address::new(1, 14);
        assert_eq!("1:14".parse::<Address>().unwrap(), expected);
        assert_eq!("4294967310".parse::<Address>().unwrap(), expected);
        assert_eq!("0x10000000e".parse::<Address>().unwrap(), expected);
        assert!("1:".parse::<Address>().is_err());
        assert!("seg".parse::<Address>().is_err());
    }

    #[test]
    fn zero_is_default() {
        assert!(Address::default().is_zero());
        assert!(!Address::new(0, 1).is_zero());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn ordering_matches_packed_value(a in any::<u64>(), b in any::<u64>()) {
                let (x, y) = (Address::from_u64(a), Address::from_u64(b));
                prop_assert_eq!(x.cmp(&y), a.cmp(&b));
                prop_assert_eq!(x.to_bytes().cmp(&y.to_bytes()), a.cmp(&b));
            }

            #[test]
            fn display_form_parses_back(segment in any::<u32>(), offset in any::<u32>()) {
                let addr = Address::new(segment, offset);
                prop_assert_eq!(addr.to_string().parse::<Address>().unwrap(), addr);
            }
        }
    }
}
