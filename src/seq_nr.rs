use std::{cmp::Ordering, ops::Deref};

use crate::utils::seq_nr_offset;

/// TCP sequence number. Comparisons are done modulo 2^32.
#[derive(PartialEq, Eq, Clone, Copy, Default, Hash)]
pub struct SeqNr(pub u32);

impl Deref for SeqNr {
    type Target = u32;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<u32> for SeqNr {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for SeqNr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Debug for SeqNr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::ops::Add<u32> for SeqNr {
    type Output = SeqNr;

    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0.wrapping_add(rhs))
    }
}

impl std::ops::Sub<u32> for SeqNr {
    type Output = SeqNr;

    fn sub(self, rhs: u32) -> Self::Output {
        Self(self.0.wrapping_sub(rhs))
    }
}

impl std::ops::Sub<SeqNr> for SeqNr {
    type Output = i64;

    fn sub(self, rhs: SeqNr) -> Self::Output {
        seq_nr_offset(self.0, rhs.0)
    }
}

impl std::ops::AddAssign<u32> for SeqNr {
    fn add_assign(&mut self, rhs: u32) {
        *self = *self + rhs;
    }
}

impl std::cmp::PartialOrd for SeqNr {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl std::cmp::Ord for SeqNr {
    fn cmp(&self, other: &Self) -> Ordering {
        let offset = *self - *other;
        offset.cmp(&0)
    }
}

impl SeqNr {
    /// Number of bytes from `other` up to `self`, or 0 if `self` is not after `other`.
    pub fn bytes_since(self, other: SeqNr) -> u32 {
        (self - other).max(0) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::SeqNr;

    #[test]
    fn test_ordering_wraps() {
        assert!(SeqNr(1) > SeqNr(0));
        assert!(SeqNr(0) > SeqNr(u32::MAX));
        assert!(SeqNr(u32::MAX - 10) < SeqNr(5));
        assert_eq!(SeqNr(u32::MAX) + 2, SeqNr(1));
    }

    #[test]
    fn test_bytes_since() {
        assert_eq!(SeqNr(1500).bytes_since(SeqNr(1000)), 500);
        assert_eq!(SeqNr(1000).bytes_since(SeqNr(1500)), 0);
        assert_eq!(SeqNr(100).bytes_since(SeqNr(u32::MAX - 99)), 200);
    }
}
