//! Half-open spot intervals returned by the bucket predictor.

use serde::{Deserialize, Serialize};

/// A half-open spot range `[begin, end)` with the warrant price anchored to
/// it and the predictor's theoretical bucket size.
///
/// The empty interval uses sentinel bounds so that `is_empty` needs no
/// `Option` wrapping on the hot path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotInterval {
    pub begin: i64,
    pub end: i64,
    /// Warrant price (scaled ×1000) the predictor associates with the range.
    pub anchor_price: i32,
    pub theo_bucket_size: i64,
}

pub const NULL_BEGIN: i64 = i64::MAX;
pub const NULL_END: i64 = i64::MIN;
pub const NULL_ANCHOR: i32 = i32::MIN;

impl SpotInterval {
    pub fn empty() -> Self {
        Self {
            begin: NULL_BEGIN,
            end: NULL_END,
            anchor_price: NULL_ANCHOR,
            theo_bucket_size: 0,
        }
    }

    pub fn new(begin: i64, end: i64, anchor_price: i32) -> Self {
        Self {
            begin,
            end,
            anchor_price,
            theo_bucket_size: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.begin == NULL_BEGIN && self.end == NULL_END
    }

    pub fn clear(&mut self) {
        *self = Self::empty();
    }

    pub fn contains(&self, spot: i64) -> bool {
        !self.is_empty() && spot >= self.begin && spot < self.end
    }

    /// Last spot inside the range; only meaningful when non-empty.
    pub fn last(&self) -> i64 {
        self.end - 1
    }
}

impl Default for SpotInterval {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_interval_contains_nothing() {
        let iv = SpotInterval::empty();
        assert!(iv.is_empty());
        assert!(!iv.contains(0));
        assert!(!iv.contains(i64::MAX - 1));
    }

    #[test]
    fn contains_is_half_open() {
        let iv = SpotInterval::new(100, 200, 50_000);
        assert!(iv.contains(100));
        assert!(iv.contains(199));
        assert!(!iv.contains(200));
        assert_eq!(iv.last(), 199);
    }
}
