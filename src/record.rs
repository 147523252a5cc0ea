//! The element type sorted by this crate, and the radix parameters that
//! slice its key into digits.

use bytemuck::{Pod, Zeroable};
use std::fmt;

/// Marker for types that may live in symmetric memory and be moved around
/// by raw `memcpy`: bitwise-copyable, no indirect ownership, thread-mobile.
///
/// This is the crate-local analogue of the original's "all records are the
/// same size; records are bitwise-copyable" data-model rule.
pub trait Record: Pod + Zeroable + Send + Sync {}

impl Record for i64 {}
impl Record for u64 {}
impl Record for SortElement {}

/// A record: `key` participates in ordering, `val` is carried along
/// unchanged. Stability is only guaranteed on `key`.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct SortElement {
    pub key: u64,
    pub val: u64,
}

impl SortElement {
    pub const fn new(key: u64, val: u64) -> Self {
        Self { key, val }
    }

    /// The digit-`d` bucket of this element under the given radix parameters.
    #[inline]
    pub fn bucket(&self, digit: u32, radix: &RadixParams) -> usize {
        ((self.key >> (radix.bits * digit)) & radix.mask) as usize
    }
}

impl fmt::Debug for SortElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:#018x},{})", self.key, self.val)
    }
}

/// Orders by `key` only, per the data model's ordering rule.
impl PartialOrd for SortElement {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for SortElement {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

/// The radix-bit-width partition of a 64-bit key into digits.
///
/// `bits` must divide 64, and the resulting digit count must be even (the
/// sort driver processes digits in pairs, alternating source/destination
/// arrays). Default is 16 bits, giving 4 digits of 65536 buckets each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadixParams {
    pub bits: u32,
    pub digits: u32,
    pub buckets: usize,
    pub mask: u64,
}

impl RadixParams {
    pub fn new(bits: u32) -> Self {
        assert!(bits > 0 && bits <= 64, "radix_bits must be in 1..=64");
        assert_eq!(64 % bits, 0, "radix_bits must divide 64");
        let digits = 64 / bits;
        assert_eq!(digits % 2, 0, "the digit count (64/radix_bits) must be even");
        let buckets = 1usize << bits;
        let mask = (buckets - 1) as u64;
        Self { bits, digits, buckets, mask }
    }
}

impl Default for RadixParams {
    fn default() -> Self {
        Self::new(16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_extracts_correct_slice() {
        let radix = RadixParams::new(16);
        let e = SortElement::new(0x0001_0002_0003_0004, 0);
        assert_eq!(e.bucket(0, &radix), 0x0004);
        assert_eq!(e.bucket(1, &radix), 0x0003);
        assert_eq!(e.bucket(2, &radix), 0x0002);
        assert_eq!(e.bucket(3, &radix), 0x0001);
    }

    #[test]
    fn ordering_ignores_val() {
        let a = SortElement::new(5, 100);
        let b = SortElement::new(5, 1);
        assert_eq!(a.cmp(&b), std::cmp::Ordering::Equal);
    }

    #[test]
    #[should_panic(expected = "must divide 64")]
    fn odd_divisor_panics() {
        RadixParams::new(7);
    }
}
