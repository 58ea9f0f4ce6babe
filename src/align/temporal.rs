//! Temporal alignment of feature sequences with dynamic time warping.
//!
//! Two recordings of the same movement rarely run at the same speed. DTW
//! finds the monotonic correspondence between their per-frame feature
//! vectors (joint-angle vectors in this engine) that minimizes the total
//! feature distance:
//!
//! ```text
//! cum(i, j) = d(i, j) + min(cum(i−1, j), cum(i, j−1), cum(i−1, j−1))
//! ```
//!
//! with Euclidean local distance `d`. The backtracked path is monotonic
//! in both indices and covers (0,0) through (n−1,m−1), so every frame of
//! both sequences appears in at least one pair.
//!
//! A Sakoe-Chiba band `|i − j| ≤ band` bounds the search to a diagonal
//! corridor, keeping cost near-linear for long recordings; the band is
//! widened to at least the length difference so a path always exists.
//! The full dynamic-programming loop checks a cancellation flag between
//! rows so sequence-scale work can be aborted early.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AlignError, EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DtwConfig {
    /// Sakoe-Chiba band half-width in frames; `None` searches the full
    /// matrix.
    pub band: Option<usize>,
    /// Normalized cost at or below which equal-length sequences count as
    /// already aligned.
    pub zero_cost_epsilon: f64,
}

impl Default for DtwConfig {
    fn default() -> Self {
        Self {
            band: Some(64),
            zero_cost_epsilon: 1e-9,
        }
    }
}

impl DtwConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if !self.zero_cost_epsilon.is_finite() || self.zero_cost_epsilon < 0.0 {
            return Err(EngineError::config(
                "zero_cost_epsilon must be finite and non-negative",
            ));
        }
        Ok(())
    }
}

/// Result of one temporal alignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DtwAlignment {
    /// Warping path as (subject index, reference index) pairs, monotonic
    /// in both, from (0,0) to (n−1,m−1).
    pub path: Vec<(usize, usize)>,
    /// Total accumulated feature distance along the path.
    pub cost: f64,
    /// `cost` divided by the path length.
    pub normalized_cost: f64,
    /// The sequences were already aligned: equal length, diagonal path,
    /// near-zero cost. Lets callers tell trivial from real warping.
    pub zero_cost: bool,
}

impl DtwAlignment {
    /// Resample subject features onto the reference timeline: reference
    /// index `j` receives the mean of all subject features paired with it.
    ///
    /// # Panics
    ///
    /// Panics if `subject` is not the sequence this alignment was
    /// computed from.
    pub fn warp_subject(&self, subject: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let Some(&(_, last_j)) = self.path.last() else {
            return Vec::new();
        };
        let dim = subject.first().map_or(0, Vec::len);
        let mut out = vec![vec![0.0; dim]; last_j + 1];
        let mut counts = vec![0usize; last_j + 1];
        for &(i, j) in &self.path {
            for (acc, v) in out[j].iter_mut().zip(&subject[i]) {
                *acc += v;
            }
            counts[j] += 1;
        }
        for (row, count) in out.iter_mut().zip(counts) {
            if count > 1 {
                let inv = 1.0 / count as f64;
                for v in row.iter_mut() {
                    *v *= inv;
                }
            }
        }
        out
    }
}

#[derive(Debug)]
pub struct TemporalAligner {
    config: DtwConfig,
}

impl TemporalAligner {
    pub fn new(config: DtwConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn with_defaults() -> Self {
        Self {
            config: DtwConfig::default(),
        }
    }

    pub fn config(&self) -> &DtwConfig {
        &self.config
    }

    /// Align `subject` features to `reference` features.
    ///
    /// `cancel` is observed between dynamic-programming rows; setting it
    /// makes the aligner stop with [`AlignError::Cancelled`].
    pub fn align(
        &self,
        subject: &[Vec<f64>],
        reference: &[Vec<f64>],
        cancel: Option<&AtomicBool>,
    ) -> EngineResult<DtwAlignment> {
        if subject.is_empty() {
            return Err(AlignError::EmptySequence {
                which: "subject".into(),
            }
            .into());
        }
        if reference.is_empty() {
            return Err(AlignError::EmptySequence {
                which: "reference".into(),
            }
            .into());
        }
        let dim = subject[0].len();
        for features in subject.iter().chain(reference) {
            if features.len() != dim {
                return Err(EngineError::config(format!(
                    "feature dimension {} does not match {dim}",
                    features.len()
                )));
            }
        }

        let n = subject.len();
        let m = reference.len();

        // Already-aligned fast path: equal length, near-zero diagonal.
        if n == m {
            let total: f64 = subject
                .iter()
                .zip(reference)
                .map(|(a, b)| distance(a, b))
                .sum();
            let normalized = total / n as f64;
            if normalized <= self.config.zero_cost_epsilon {
                return Ok(DtwAlignment {
                    path: (0..n).map(|i| (i, i)).collect(),
                    cost: total,
                    normalized_cost: normalized,
                    zero_cost: true,
                });
            }
        }

        // A band narrower than the length difference has no complete
        // path; widen it.
        let band = self.config.band.map(|b| b.max(n.abs_diff(m)));

        let width = m + 1;
        let mut cum = vec![f64::INFINITY; (n + 1) * width];
        cum[0] = 0.0;
        for i in 1..=n {
            if let Some(flag) = cancel {
                if flag.load(Ordering::Relaxed) {
                    debug!("temporal alignment cancelled at row {}/{n}", i - 1);
                    return Err(AlignError::Cancelled { rows_done: i - 1 }.into());
                }
            }
            let (lo, hi) = match band {
                Some(b) => (i.saturating_sub(b).max(1), (i + b).min(m)),
                None => (1, m),
            };
            for j in lo..=hi {
                let cost = distance(&subject[i - 1], &reference[j - 1]);
                let best = cum[(i - 1) * width + j - 1]
                    .min(cum[(i - 1) * width + j])
                    .min(cum[i * width + j - 1]);
                cum[i * width + j] = cost + best;
            }
        }
        let cost = cum[n * width + m];

        // Backtrack, preferring the diagonal so ties do not produce
        // staircase paths.
        let mut path = Vec::with_capacity(n.max(m));
        let (mut i, mut j) = (n, m);
        while i > 1 || j > 1 {
            path.push((i - 1, j - 1));
            let diag = if i > 1 && j > 1 {
                cum[(i - 1) * width + j - 1]
            } else {
                f64::INFINITY
            };
            let up = if i > 1 {
                cum[(i - 1) * width + j]
            } else {
                f64::INFINITY
            };
            let left = if j > 1 {
                cum[i * width + j - 1]
            } else {
                f64::INFINITY
            };
            if diag <= up && diag <= left {
                i -= 1;
                j -= 1;
            } else if up <= left {
                i -= 1;
            } else {
                j -= 1;
            }
        }
        path.push((0, 0));
        path.reverse();

        let normalized_cost = cost / path.len() as f64;
        let zero_cost = n == m
            && normalized_cost <= self.config.zero_cost_epsilon
            && path.iter().enumerate().all(|(k, &(a, b))| a == k && b == k);
        debug!(
            "temporal alignment {n}x{m}: path {} pairs, normalized cost {:.4}",
            path.len(),
            normalized_cost
        );

        Ok(DtwAlignment {
            path,
            cost,
            normalized_cost,
            zero_cost,
        })
    }
}

impl Default for TemporalAligner {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Euclidean distance between two feature vectors.
#[inline]
fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}
