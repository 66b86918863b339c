//! Score normalization.
//!
//! Raw plugin scores have no fixed upper bound. Before scores from different
//! plugins are weighted and summed they are rescaled linearly onto a target
//! range:
//!
//! ```text
//! highest == lowest  →  every node gets range.min
//! otherwise          →  (score - lowest) * (max - min) / (highest - lowest) + min
//! ```
//!
//! Division truncates toward zero, uniformly for every node, so relative
//! order is preserved except where truncation produces ties.

use serde::{Deserialize, Serialize};

use crate::error::{FrameworkError, FrameworkResult};
use crate::types::NodeName;

/// Score assigned to a single node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeScore {
    pub name: NodeName,
    pub score: i64,
}

impl NodeScore {
    pub fn new(name: impl Into<String>, score: i64) -> Self {
        Self {
            name: name.into(),
            score,
        }
    }
}

/// Inclusive target range for normalized scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRange {
    pub min: i64,
    pub max: i64,
}

impl ScoreRange {
    pub fn new(min: i64, max: i64) -> FrameworkResult<Self> {
        let range = Self { min, max };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> FrameworkResult<()> {
        if self.min >= self.max {
            return Err(FrameworkError::InvalidScoreRange {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

impl Default for ScoreRange {
    fn default() -> Self {
        Self { min: 0, max: 100 }
    }
}

/// Rescales raw scores onto a configured [`ScoreRange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreNormalizer {
    range: ScoreRange,
}

impl ScoreNormalizer {
    pub fn new(range: ScoreRange) -> Self {
        Self { range }
    }

    pub fn range(&self) -> ScoreRange {
        self.range
    }

    /// Normalize `scores` in place. An empty slice is left untouched.
    pub fn normalize(&self, scores: &mut [NodeScore]) {
        let Some(highest) = scores.iter().map(|s| s.score).max() else {
            return;
        };
        let lowest = scores.iter().map(|s| s.score).min().unwrap_or(highest);

        if highest == lowest {
            for s in scores.iter_mut() {
                s.score = self.range.min;
            }
            return;
        }

        // i128 keeps (score - lowest) * span from overflowing for any i64 input.
        let span = i128::from(self.range.max) - i128::from(self.range.min);
        let spread = i128::from(highest) - i128::from(lowest);
        for s in scores.iter_mut() {
            let offset = i128::from(s.score) - i128::from(lowest);
            let scaled = offset * span / spread + i128::from(self.range.min);
            s.score = scaled as i64;
        }
    }
}

impl Default for ScoreNormalizer {
    fn default() -> Self {
        Self::new(ScoreRange::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(raw: &[i64]) -> Vec<NodeScore> {
        raw.iter()
            .enumerate()
            .map(|(i, &s)| NodeScore::new(format!("n{i}"), s))
            .collect()
    }

    fn values(scores: &[NodeScore]) -> Vec<i64> {
        scores.iter().map(|s| s.score).collect()
    }

    #[test]
    fn rescales_onto_target_range() {
        let mut s = scores(&[0, 2, 4]);
        ScoreNormalizer::default().normalize(&mut s);
        assert_eq!(values(&s), vec![0, 50, 100]);
    }

    #[test]
    fn uniform_scores_collapse_to_min() {
        let normalizer = ScoreNormalizer::new(ScoreRange::new(10, 20).unwrap());
        let mut s = scores(&[7, 7, 7]);
        normalizer.normalize(&mut s);
        assert_eq!(values(&s), vec![10, 10, 10]);

        // A second pass over the uniform output stays at the minimum.
        normalizer.normalize(&mut s);
        assert_eq!(values(&s), vec![10, 10, 10]);
    }

    #[test]
    fn truncation_is_consistent() {
        let mut s = scores(&[0, 1, 3]);
        ScoreNormalizer::default().normalize(&mut s);
        // 1 * 100 / 3 = 33 (truncated)
        assert_eq!(values(&s), vec![0, 33, 100]);
    }

    #[test]
    fn preserves_order() {
        let raw = [5, 0, 17, 3, 17, 1, 900, 42];
        let mut s = scores(&raw);
        ScoreNormalizer::default().normalize(&mut s);

        for i in 0..raw.len() {
            for j in 0..raw.len() {
                if raw[i] > raw[j] {
                    assert!(
                        s[i].score >= s[j].score,
                        "raw {} > {} but normalized {} < {}",
                        raw[i], raw[j], s[i].score, s[j].score
                    );
                }
            }
        }
        assert_eq!(s[6].score, 100);
        assert_eq!(s[1].score, 0);
    }

    #[test]
    fn non_zero_minimum_offsets_scores() {
        let normalizer = ScoreNormalizer::new(ScoreRange::new(-10, 10).unwrap());
        let mut s = scores(&[1, 3]);
        normalizer.normalize(&mut s);
        assert_eq!(values(&s), vec![-10, 10]);
    }

    #[test]
    fn extreme_inputs_do_not_overflow() {
        let mut s = scores(&[i64::MIN, 0, i64::MAX]);
        ScoreNormalizer::default().normalize(&mut s);
        assert_eq!(s[0].score, 0);
        assert_eq!(s[1].score, 49);
        assert_eq!(s[2].score, 100);
    }

    #[test]
    fn empty_input_is_noop() {
        let mut s: Vec<NodeScore> = Vec::new();
        ScoreNormalizer::default().normalize(&mut s);
        assert!(s.is_empty());
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(ScoreRange::new(100, 0).is_err());
        assert!(ScoreRange::new(5, 5).is_err());
    }
}
