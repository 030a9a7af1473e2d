//! Certainty-factor calculus.
//!
//! Combines independent evidence strengths in `[0, 1]` into one aggregate
//! confidence. The combinator is the classic `a + b·(1 − a)`, commutative and
//! associative over the unit interval, so the aggregate is folded in a
//! canonical rule-id order to keep results independent of firing order.

use serde::{Deserialize, Serialize};

/// Combine two certainty factors: `a + b·(1 − a)`.
pub fn combine(a: f32, b: f32) -> f32 {
    a + b * (1.0 - a)
}

/// Fold a contribution set into one aggregate, in rule-id-sorted order.
///
/// An empty set yields 0.0; a single contribution passes through unchanged.
pub fn aggregate<'a, I>(contributions: I) -> f32
where
    I: IntoIterator<Item = (&'a str, f32)>,
{
    let mut sorted: Vec<(&str, f32)> = contributions.into_iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    sorted.iter().fold(0.0, |acc, &(_, cf)| combine(acc, cf))
}

// ---------------------------------------------------------------------------
// Qualitative bands
// ---------------------------------------------------------------------------

/// Qualitative confidence label for an aggregate CF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ConfidenceLevel {
    pub const ALL: [Self; 5] = [
        Self::VeryLow,
        Self::Low,
        Self::Medium,
        Self::High,
        Self::VeryHigh,
    ];
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::VeryLow => "very_low",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::VeryHigh => "very_high",
        };
        write!(f, "{label}")
    }
}

/// Authored band thresholds. A CF below a threshold falls in the band
/// beneath it; `very_high` is everything at or above `high`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceBands {
    pub very_low: f32,
    pub low: f32,
    pub medium: f32,
    pub high: f32,
}

impl Default for ConfidenceBands {
    fn default() -> Self {
        Self {
            very_low: 0.3,
            low: 0.5,
            medium: 0.7,
            high: 0.9,
        }
    }
}

impl ConfidenceBands {
    /// Map a CF to its qualitative band.
    pub fn classify(&self, cf: f32) -> ConfidenceLevel {
        if cf < self.very_low {
            ConfidenceLevel::VeryLow
        } else if cf < self.low {
            ConfidenceLevel::Low
        } else if cf < self.medium {
            ConfidenceLevel::Medium
        } else if cf < self.high {
            ConfidenceLevel::High
        } else {
            ConfidenceLevel::VeryHigh
        }
    }

    /// Histogram a CF set over the five bands.
    pub fn distribution<I>(&self, cfs: I) -> Distribution
    where
        I: IntoIterator<Item = f32>,
    {
        let mut counts = [0usize; 5];
        for cf in cfs {
            counts[self.classify(cf) as usize] += 1;
        }
        Distribution { counts }
    }
}

/// Per-band CF counts, indexed by [`ConfidenceLevel`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    counts: [usize; 5],
}

impl Distribution {
    pub fn count(&self, level: ConfidenceLevel) -> usize {
        self.counts[level as usize]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_matches_worked_example() {
        // 0.8 + 0.7·(1 − 0.8) = 0.94
        let combined = combine(0.8, 0.7);
        assert!((combined - 0.94).abs() < 1e-6);
        assert_eq!(
            ConfidenceBands::default().classify(combined),
            ConfidenceLevel::VeryHigh
        );
    }

    #[test]
    fn empty_contribution_set_is_very_low_zero() {
        let agg = aggregate(std::iter::empty::<(&str, f32)>());
        assert_eq!(agg, 0.0);
        assert_eq!(
            ConfidenceBands::default().classify(agg),
            ConfidenceLevel::VeryLow
        );
    }

    #[test]
    fn single_contribution_passes_through() {
        assert!((aggregate([("r1", 0.75)]) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn aggregate_is_order_independent() {
        let forward = aggregate([("a", 0.8), ("b", 0.7), ("c", 0.5)]);
        let reversed = aggregate([("c", 0.5), ("b", 0.7), ("a", 0.8)]);
        let shuffled = aggregate([("b", 0.7), ("c", 0.5), ("a", 0.8)]);
        assert!((forward - reversed).abs() < 1e-6);
        assert!((forward - shuffled).abs() < 1e-6);
    }

    #[test]
    fn aggregate_never_exceeds_one() {
        let agg = aggregate([("a", 1.0), ("b", 1.0), ("c", 0.99)]);
        assert!(agg <= 1.0 + 1e-6);
    }

    #[test]
    fn band_edges_classify_into_the_upper_band() {
        let bands = ConfidenceBands::default();
        assert_eq!(bands.classify(0.0), ConfidenceLevel::VeryLow);
        assert_eq!(bands.classify(0.3), ConfidenceLevel::Low);
        assert_eq!(bands.classify(0.5), ConfidenceLevel::Medium);
        assert_eq!(bands.classify(0.7), ConfidenceLevel::High);
        assert_eq!(bands.classify(0.9), ConfidenceLevel::VeryHigh);
        assert_eq!(bands.classify(1.0), ConfidenceLevel::VeryHigh);
    }

    #[test]
    fn distribution_counts_per_band() {
        let bands = ConfidenceBands::default();
        let dist = bands.distribution([0.1, 0.2, 0.4, 0.6, 0.95]);
        assert_eq!(dist.count(ConfidenceLevel::VeryLow), 2);
        assert_eq!(dist.count(ConfidenceLevel::Low), 1);
        assert_eq!(dist.count(ConfidenceLevel::Medium), 1);
        assert_eq!(dist.count(ConfidenceLevel::High), 0);
        assert_eq!(dist.count(ConfidenceLevel::VeryHigh), 1);
        assert_eq!(dist.total(), 5);
    }
}
