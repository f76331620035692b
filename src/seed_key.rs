//! GM Global-A 5-byte seed/key algorithm.
//!
//! The key is derived from the seed with a shift/fold of the upper 24 bits, an
//! additive constant, and re-insertion of the seed's trailing byte. The same
//! routine backs the on-bus handshake and the offline firmware scan.

use crate::errors::ParseHexError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Only the low 40 bits of a seed or key are significant
pub const VALUE_MASK: u64 = 0xFF_FFFF_FFFF;

/// Trailing byte observed on Global-A programming seeds
pub const GLOBAL_A_SEED_TRAILER: u8 = 0x06;

/// Additive constant of the Global-A algorithm
const KEY_CONSTANT: u32 = 0xA7C5;

/// 40-bit SecurityAccess challenge issued by the ECM
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Seed(u64);

impl Seed {
    /// Build a seed, discarding anything above bit 39
    pub fn new(raw: u64) -> Self {
        Self(raw & VALUE_MASK)
    }

    pub fn from_be_bytes(bytes: [u8; 5]) -> Self {
        Self(be_bytes_to_u64(bytes))
    }

    pub fn to_be_bytes(self) -> [u8; 5] {
        u64_to_be_bytes(self.0)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn trailing_byte(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// Advisory only: atypical seeds are still processed
    pub fn is_global_a_typical(self) -> bool {
        self.trailing_byte() == GLOBAL_A_SEED_TRAILER
    }

    pub fn from_hex(input: &str) -> Result<Self, ParseHexError> {
        parse_hex_u40(input).map(Self)
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:010X}", self.0)
    }
}

/// 40-bit SecurityAccess response computed by the tester
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key(u64);

impl Key {
    pub fn new(raw: u64) -> Self {
        Self(raw & VALUE_MASK)
    }

    pub fn from_be_bytes(bytes: [u8; 5]) -> Self {
        Self(be_bytes_to_u64(bytes))
    }

    pub fn to_be_bytes(self) -> [u8; 5] {
        u64_to_be_bytes(self.0)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn from_hex(input: &str) -> Result<Self, ParseHexError> {
        parse_hex_u40(input).map(Self)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:010X}", self.0)
    }
}

/// Derive the unlock key for a seed.
///
/// Intermediate arithmetic is confined to 32 bits; the trailing seed byte is
/// appended afterwards.
pub fn derive_key(seed: Seed) -> Key {
    let seed = seed.value() & VALUE_MASK;
    let hi = (seed >> 16) as u32;
    let lo = (seed & 0xFFFF) as u32;

    let mut key32 = (hi << 11) | (hi >> 5);
    key32 = key32.wrapping_add(lo).wrapping_add(KEY_CONSTANT);

    Key::new(((key32 as u64) << 8) | (seed & 0xFF))
}

/// A candidate seed and its derived key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeedKeyPair {
    pub seed: Seed,
    pub key: Key,
}

impl fmt::Display for SeedKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.seed, self.key)
    }
}

/// Collect every 5-byte window ending in 0x06 as a big-endian seed.
///
/// Result is de-duplicated and sorted by seed ascending. Buffers shorter than
/// five bytes yield nothing.
pub fn scan_for_seeds(data: &[u8]) -> Vec<SeedKeyPair> {
    let mut pairs = BTreeSet::new();

    for window in data.windows(5) {
        if window[4] != GLOBAL_A_SEED_TRAILER {
            continue;
        }
        let mut bytes = [0u8; 5];
        bytes.copy_from_slice(window);
        let seed = Seed::from_be_bytes(bytes);
        pairs.insert(SeedKeyPair {
            seed,
            key: derive_key(seed),
        });
    }

    pairs.into_iter().collect()
}

fn be_bytes_to_u64(bytes: [u8; 5]) -> u64 {
    bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)
}

fn u64_to_be_bytes(value: u64) -> [u8; 5] {
    let full = value.to_be_bytes();
    [full[3], full[4], full[5], full[6], full[7]]
}

/// Parse a hex string (optional `0x` prefix, `_` separators allowed)
fn parse_hex_u40(input: &str) -> Result<u64, ParseHexError> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed)
        .replace('_', "");

    if digits.is_empty() {
        return Err(ParseHexError::Empty);
    }

    // from_str_radix alone would let a sign through
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ParseHexError::InvalidDigit(input.to_string()));
    }

    // only overflow can fail once every digit is hex
    let value = u64::from_str_radix(&digits, 16)
        .map_err(|_| ParseHexError::TooWide(input.to_string()))?;

    if value > VALUE_MASK {
        return Err(ParseHexError::TooWide(input.to_string()));
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_reference_vector() {
        let seed = Seed::new(0xA3A3859E06);
        assert_eq!(derive_key(seed), Key::new(0x1D1E82E706));
    }

    #[test]
    fn test_boundary_vectors() {
        assert_eq!(derive_key(Seed::new(0)).value(), 0x0000A7C500);
        assert_eq!(derive_key(Seed::new(0xFFFFFFFFFF)).value(), 0x0001A7C3FF);
        assert_eq!(derive_key(Seed::new(0x1122334406)).value(), 0x891284DC06);
        // trailing byte other than 0x06 is still processed
        assert_eq!(derive_key(Seed::new(0x123456789A)).value(), 0x91A3D2019A);
    }

    #[test]
    fn test_seed_masks_wide_input() {
        let seed = Seed::new(0xFFFF_A3A3859E06);
        assert_eq!(seed.value(), 0xA3A3859E06);
        assert_eq!(derive_key(seed), derive_key(Seed::new(0xA3A3859E06)));
    }

    #[test]
    fn test_derivation_is_deterministic_and_contained() {
        let mut rng = StdRng::seed_from_u64(0x5EED);
        for _ in 0..10_000 {
            let seed = Seed::new(rng.r#gen::<u64>());
            let first = derive_key(seed);
            let second = derive_key(seed);
            assert_eq!(first, second);
            assert!(first.value() <= VALUE_MASK);
            assert_eq!(first.value() & 0xFF, seed.value() & 0xFF);
        }
    }

    #[test]
    fn test_byte_conversion() {
        let seed = Seed::from_be_bytes([0xA3, 0xA3, 0x85, 0x9E, 0x06]);
        assert_eq!(seed.value(), 0xA3A3859E06);
        assert_eq!(seed.to_be_bytes(), [0xA3, 0xA3, 0x85, 0x9E, 0x06]);
        assert_eq!(
            derive_key(seed).to_be_bytes(),
            [0x1D, 0x1E, 0x82, 0xE7, 0x06]
        );
    }

    #[test]
    fn test_display_is_ten_hex_digits() {
        assert_eq!(Seed::new(0x106).to_string(), "0000000106");
        assert_eq!(Key::new(0x1D1E82E706).to_string(), "1D1E82E706");
    }

    #[test]
    fn test_global_a_trailer_is_advisory() {
        assert!(Seed::new(0xA3A3859E06).is_global_a_typical());
        assert!(!Seed::new(0xA3A3859E07).is_global_a_typical());
    }

    #[test]
    fn test_hex_parsing() {
        assert_eq!(Seed::from_hex("0xA3A3859E06").unwrap().value(), 0xA3A3859E06);
        assert_eq!(Seed::from_hex("a3a3859e06").unwrap().value(), 0xA3A3859E06);
        assert_eq!(Key::from_hex("0x1D1E_82E7_06").unwrap().value(), 0x1D1E82E706);
        assert_eq!(Seed::from_hex("0x"), Err(ParseHexError::Empty));
        assert!(matches!(Seed::from_hex("xyz"), Err(ParseHexError::InvalidDigit(_))));
        assert!(matches!(Seed::from_hex("0x+5"), Err(ParseHexError::InvalidDigit(_))));
        assert!(matches!(Key::from_hex("+A3A3859E06"), Err(ParseHexError::InvalidDigit(_))));
        assert!(matches!(Seed::from_hex("0x-1"), Err(ParseHexError::InvalidDigit(_))));
        assert!(matches!(Seed::from_hex("0xA3 A3"), Err(ParseHexError::InvalidDigit(_))));
        assert!(matches!(
            Seed::from_hex("0x11223344556677889900"),
            Err(ParseHexError::TooWide(_))
        ));
        assert!(matches!(
            Seed::from_hex("0x1A3A3859E06"),
            Err(ParseHexError::TooWide(_))
        ));
    }

    #[test]
    fn test_scan_finds_nothing_without_trailer() {
        let data = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x07];
        assert!(scan_for_seeds(&data).is_empty());
        assert!(scan_for_seeds(&[]).is_empty());
        assert!(scan_for_seeds(&[0x01, 0x02, 0x03, 0x06]).is_empty());
    }

    #[test]
    fn test_scan_collects_sorted_unique_pairs() {
        let mut data = vec![0xA3, 0xA3, 0x85, 0x9E, 0x06];
        data.extend_from_slice(&[0xFF, 0x11, 0x22, 0x33, 0x44, 0x06]);
        data.extend_from_slice(&[0xA3, 0xA3, 0x85, 0x9E, 0x06]);

        let pairs = scan_for_seeds(&data);
        let seeds: Vec<u64> = pairs.iter().map(|p| p.seed.value()).collect();

        // windows ending in 0x06: A3A3859E06, 1122334406, A3A3859E06 (duplicate)
        assert_eq!(seeds, vec![0x1122334406, 0xA3A3859E06]);
        for pair in &pairs {
            assert_eq!(pair.key, derive_key(pair.seed));
        }
    }

    #[test]
    fn test_scan_overlapping_windows() {
        // 06 06 06 06 06 06 produces the same seed twice
        let data = [0x06u8; 6];
        let pairs = scan_for_seeds(&data);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].seed.value(), 0x0606060606);
    }

    #[test]
    fn test_pair_display() {
        let seed = Seed::new(0xA3A3859E06);
        let pair = SeedKeyPair {
            seed,
            key: derive_key(seed),
        };
        assert_eq!(pair.to_string(), "A3A3859E06 = 1D1E82E706");
    }
}
