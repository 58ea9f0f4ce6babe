//! Whole-recording comparison of two movements.
//!
//! Composes the pipeline stages end to end: normalize both recordings,
//! reduce each frame to a joint-angle feature vector, warp the two
//! feature sequences onto each other with the temporal aligner, and
//! rigidly align the landmark sets at every matched pair.
//!
//! ```text
//! subject   --normalize--> angles --+
//!                                   +--DTW--> pairs --rigid--> report
//! reference --normalize--> angles --+
//! ```
//!
//! Joints that never measure in one of the recordings are left out of
//! the feature vector; a joint that fails on some frames carries its
//! last measured value forward. An angle is never invented as 0°.

use std::sync::atomic::AtomicBool;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::align::{DtwConfig, RigidAligner, RigidConfig, TemporalAligner};
use crate::error::{AlignError, EngineError, EngineResult};
use crate::goniometer::Goniometer;
use crate::normalize::{NormalizeConfig, PoseNormalizer};
use crate::pose::PoseSequence;
use crate::schema::Joint;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareConfig {
    /// Joints contributing to the per-frame feature vector.
    pub joints: Vec<Joint>,
    pub normalize: NormalizeConfig,
    pub rigid: RigidConfig,
    pub dtw: DtwConfig,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            joints: Joint::ALL.to_vec(),
            normalize: NormalizeConfig::default(),
            rigid: RigidConfig::default(),
            dtw: DtwConfig::default(),
        }
    }
}

impl CompareConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if self.joints.is_empty() {
            return Err(EngineError::config("joints must not be empty"));
        }
        self.normalize.validate()?;
        self.rigid.validate()?;
        self.dtw.validate()
    }
}

/// One matched pair on the warping path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairReport {
    pub subject_index: usize,
    pub reference_index: usize,
    /// Mean absolute joint-angle difference at this pair, degrees.
    pub angle_delta_deg: f64,
    /// Residual position error of the rigid alignment at this pair.
    /// Absent when the pair had too few usable correspondences.
    pub mpjpe: Option<f64>,
}

/// Comparison report for two recordings of a movement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementComparison {
    /// Joint columns that were measurable in both recordings, in feature
    /// order.
    pub joints: Vec<Joint>,
    pub pairs: Vec<PairReport>,
    pub mean_angle_delta_deg: f64,
    /// Mean MPJPE over the pairs whose rigid alignment succeeded.
    pub mean_mpjpe: Option<f64>,
    pub dtw_cost_normalized: f64,
    /// The recordings were already frame-for-frame aligned.
    pub zero_cost: bool,
    pub subject_frames_dropped: usize,
    pub reference_frames_dropped: usize,
}

/// Composes goniometer, normalizer and both aligners into a single
/// recording-versus-recording operation.
pub struct MovementComparator {
    goniometer: Goniometer,
    normalizer: PoseNormalizer,
    rigid: RigidAligner,
    temporal: TemporalAligner,
    joints: Vec<Joint>,
}

impl MovementComparator {
    pub fn new(goniometer: Goniometer, config: CompareConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            goniometer,
            normalizer: PoseNormalizer::new(config.normalize)?,
            rigid: RigidAligner::new(config.rigid)?,
            temporal: TemporalAligner::new(config.dtw)?,
            joints: config.joints,
        })
    }

    pub fn with_defaults(goniometer: Goniometer) -> EngineResult<Self> {
        Self::new(goniometer, CompareConfig::default())
    }

    /// Compare a subject recording against a reference recording.
    ///
    /// `cancel` is handed to the temporal aligner, which observes it
    /// between dynamic-programming rows.
    pub fn compare(
        &self,
        subject: &PoseSequence,
        reference: &PoseSequence,
        cancel: Option<&AtomicBool>,
    ) -> EngineResult<MovementComparison> {
        let (subject_norm, subject_dropped) = self.normalizer.normalize_sequence(subject);
        let (reference_norm, reference_dropped) = self.normalizer.normalize_sequence(reference);
        if subject_norm.is_empty() {
            return Err(AlignError::EmptySequence {
                which: "subject".into(),
            }
            .into());
        }
        if reference_norm.is_empty() {
            return Err(AlignError::EmptySequence {
                which: "reference".into(),
            }
            .into());
        }

        let subject_angles = self.measure_all(&subject_norm);
        let reference_angles = self.measure_all(&reference_norm);

        // A joint participates only if it measured at least once in both
        // recordings; absence is never reported as 0°.
        let mut joints = Vec::new();
        let mut columns = Vec::new();
        for (c, &joint) in self.joints.iter().enumerate() {
            let in_subject = subject_angles.iter().any(|row| row[c].is_some());
            let in_reference = reference_angles.iter().any(|row| row[c].is_some());
            if in_subject && in_reference {
                joints.push(joint);
                columns.push(c);
            } else {
                debug!("joint {} not measurable in both recordings", joint.name());
            }
        }
        if joints.is_empty() {
            return Err(AlignError::InsufficientLandmarks {
                operation: "movement comparison".into(),
                required: 1,
                found: 0,
            }
            .into());
        }

        let subject_features = carry_forward(&subject_angles, &columns);
        let reference_features = carry_forward(&reference_angles, &columns);
        let warp = self
            .temporal
            .align(&subject_features, &reference_features, cancel)?;

        let mut pairs = Vec::with_capacity(warp.path.len());
        let mut delta_sum = 0.0;
        let mut mpjpe_sum = 0.0;
        let mut mpjpe_count = 0usize;
        for &(i, j) in &warp.path {
            let angle_delta_deg = mean_abs_delta(&subject_features[i], &reference_features[j]);
            let mpjpe = match self
                .rigid
                .align(&subject_norm.frames()[i], &reference_norm.frames()[j])
            {
                Ok(alignment) => {
                    mpjpe_sum += alignment.mpjpe;
                    mpjpe_count += 1;
                    Some(alignment.mpjpe)
                }
                Err(err) => {
                    debug!("rigid alignment failed at pair ({i},{j}): {err}");
                    None
                }
            };
            delta_sum += angle_delta_deg;
            pairs.push(PairReport {
                subject_index: i,
                reference_index: j,
                angle_delta_deg,
                mpjpe,
            });
        }

        Ok(MovementComparison {
            joints,
            mean_angle_delta_deg: delta_sum / pairs.len() as f64,
            mean_mpjpe: (mpjpe_count > 0).then(|| mpjpe_sum / mpjpe_count as f64),
            dtw_cost_normalized: warp.normalized_cost,
            zero_cost: warp.zero_cost,
            pairs,
            subject_frames_dropped: subject_dropped,
            reference_frames_dropped: reference_dropped,
        })
    }

    /// Per-frame, per-joint angles; `None` where the joint did not
    /// measure.
    fn measure_all(&self, sequence: &PoseSequence) -> Vec<Vec<Option<f64>>> {
        sequence
            .frames()
            .iter()
            .map(|frame| {
                self.joints
                    .iter()
                    .map(|&joint| match self.goniometer.measure(joint, frame) {
                        Ok(angle) => Some(angle.degrees),
                        Err(_) => None,
                    })
                    .collect()
            })
            .collect()
    }
}

/// Select the given columns and fill holes with the joint's last (or
/// first) measured value. Every selected column has at least one
/// measurement.
fn carry_forward(angles: &[Vec<Option<f64>>], columns: &[usize]) -> Vec<Vec<f64>> {
    let mut carried: Vec<Option<f64>> = columns
        .iter()
        .map(|&c| angles.iter().find_map(|row| row[c]))
        .collect();
    angles
        .iter()
        .map(|row| {
            columns
                .iter()
                .zip(carried.iter_mut())
                .map(|(&c, carry)| {
                    if let Some(v) = row[c] {
                        *carry = Some(v);
                    }
                    carry.unwrap_or(0.0)
                })
                .collect()
        })
        .collect()
}

fn mean_abs_delta(a: &[f64], b: &[f64]) -> f64 {
    let sum: f64 = a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum();
    sum / a.len() as f64
}
