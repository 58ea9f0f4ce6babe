//! Body-size normalization of landmark sets.
//!
//! Landmarks arrive in capture space, so subject distance and body size
//! are confounded: a tall subject far from the camera and a short one
//! close up produce very different coordinates for the same movement.
//! Normalization removes this bias before any cross-recording comparison.
//!
//! Two modes:
//!
//! - **Global scale** measures one trunk reference length (mid-shoulder
//!   to mid-hip) and scales every landmark uniformly about the body root
//!   until the trunk matches the configured target. Cheap and exact for
//!   same-proportioned bodies.
//! - **Per-segment** retargets each skeleton segment to a canonical
//!   length while keeping its direction, walking the chains root-outward
//!   so the skeleton stays connected:
//!
//! ```text
//! new_child = new_parent + canonical_length * (child - parent) / |child - parent|
//! ```
//!
//!   Directions are untouched, so every joint angle survives the
//!   operation while limb proportions are normalized across body shapes.
//!
//! Both modes keep the body root (mid-hip) where the capture put it;
//! removing translation is the rigid aligner's job.

use std::collections::HashMap;

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AlignError, EngineError, EngineResult, GeometryError};
use crate::pose::{Landmark, LandmarkSet, PoseSequence};
use crate::schema::names;

/// Below this trunk length the subject geometry carries no usable scale.
const MIN_TRUNK_LENGTH: f64 = 1e-6;

/// Below this length a segment has collapsed in the capture and its
/// child is placed directly at the parent.
const MIN_SEGMENT_LENGTH: f64 = 1e-9;

/// Landmarks that define the trunk reference length. All four must be
/// present and confident for either mode to run.
const REFERENCE_LANDMARKS: [&str; 4] = [
    names::LEFT_SHOULDER,
    names::RIGHT_SHOULDER,
    names::LEFT_HIP,
    names::RIGHT_HIP,
];

/// Canonical segment lengths as fractions of the trunk length.
const HIP_HALF: f64 = 0.34;
const SHOULDER_HALF: f64 = 0.40;
const UPPER_ARM: f64 = 0.60;
const FOREARM: f64 = 0.50;
const THIGH: f64 = 0.82;
const SHANK: f64 = 0.80;
const FOOT: f64 = 0.30;

/// Where a landmark hangs off the skeleton.
#[derive(Debug, Clone, Copy)]
enum Attach {
    /// The mid-hip body root.
    Root,
    /// The virtual mid-shoulder point.
    MidShoulder,
    Landmark(&'static str),
}

struct Segment {
    parent: Attach,
    child: &'static str,
    fraction: f64,
}

/// Skeleton segments in root-outward order, so every landmark parent is
/// retargeted before its children.
#[rustfmt::skip]
const SEGMENTS: [Segment; 14] = [
    Segment { parent: Attach::Root, child: names::LEFT_HIP, fraction: HIP_HALF },
    Segment { parent: Attach::Root, child: names::RIGHT_HIP, fraction: HIP_HALF },
    Segment { parent: Attach::MidShoulder, child: names::LEFT_SHOULDER, fraction: SHOULDER_HALF },
    Segment { parent: Attach::MidShoulder, child: names::RIGHT_SHOULDER, fraction: SHOULDER_HALF },
    Segment { parent: Attach::Landmark(names::LEFT_SHOULDER), child: names::LEFT_ELBOW, fraction: UPPER_ARM },
    Segment { parent: Attach::Landmark(names::LEFT_ELBOW), child: names::LEFT_WRIST, fraction: FOREARM },
    Segment { parent: Attach::Landmark(names::RIGHT_SHOULDER), child: names::RIGHT_ELBOW, fraction: UPPER_ARM },
    Segment { parent: Attach::Landmark(names::RIGHT_ELBOW), child: names::RIGHT_WRIST, fraction: FOREARM },
    Segment { parent: Attach::Landmark(names::LEFT_HIP), child: names::LEFT_KNEE, fraction: THIGH },
    Segment { parent: Attach::Landmark(names::LEFT_KNEE), child: names::LEFT_ANKLE, fraction: SHANK },
    Segment { parent: Attach::Landmark(names::LEFT_ANKLE), child: names::LEFT_FOOT_INDEX, fraction: FOOT },
    Segment { parent: Attach::Landmark(names::RIGHT_HIP), child: names::RIGHT_KNEE, fraction: THIGH },
    Segment { parent: Attach::Landmark(names::RIGHT_KNEE), child: names::RIGHT_ANKLE, fraction: SHANK },
    Segment { parent: Attach::Landmark(names::RIGHT_ANKLE), child: names::RIGHT_FOOT_INDEX, fraction: FOOT },
];

/// Carrier for landmarks that are not themselves skeleton segment ends.
/// They keep their offset from the carrier, scaled by the global ratio.
fn carrier_for(name: &str) -> Attach {
    match name {
        "nose" | "left_eye" | "right_eye" | "left_eye_inner" | "left_eye_outer"
        | "right_eye_inner" | "right_eye_outer" | "left_ear" | "right_ear" | "mouth_left"
        | "mouth_right" => Attach::MidShoulder,
        "left_pinky" | "left_index" | "left_thumb" => Attach::Landmark(names::LEFT_WRIST),
        "right_pinky" | "right_index" | "right_thumb" => Attach::Landmark(names::RIGHT_WRIST),
        "left_heel" => Attach::Landmark(names::LEFT_ANKLE),
        "right_heel" => Attach::Landmark(names::RIGHT_ANKLE),
        _ => Attach::Root,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalizeMode {
    GlobalScale,
    PerSegment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizeConfig {
    pub mode: NormalizeMode,
    /// Trunk length (mid-shoulder to mid-hip) after normalization. The
    /// canonical unit is one trunk length, so the default is 1.0.
    pub target_trunk: f64,
    /// Reference landmarks below this confidence count as missing.
    pub min_confidence: f64,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            mode: NormalizeMode::PerSegment,
            target_trunk: 1.0,
            min_confidence: 0.5,
        }
    }
}

impl NormalizeConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if !self.target_trunk.is_finite() || self.target_trunk <= 0.0 {
            return Err(EngineError::config("target_trunk must be positive"));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(EngineError::config("min_confidence must lie in [0, 1]"));
        }
        Ok(())
    }
}

/// Trunk reference geometry measured from one landmark set.
struct TrunkGeometry {
    root: Point3<f64>,
    mid_shoulder: Point3<f64>,
    length: f64,
}

#[derive(Debug)]
pub struct PoseNormalizer {
    config: NormalizeConfig,
}

impl PoseNormalizer {
    pub fn new(config: NormalizeConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn with_defaults() -> Self {
        Self {
            config: NormalizeConfig::default(),
        }
    }

    pub fn config(&self) -> &NormalizeConfig {
        &self.config
    }

    /// Normalize one capture frame.
    pub fn normalize_set(&self, set: &LandmarkSet) -> EngineResult<LandmarkSet> {
        let trunk = self.reference_points(set)?;
        Ok(match self.config.mode {
            NormalizeMode::GlobalScale => self.global(set, &trunk),
            NormalizeMode::PerSegment => self.per_segment(set, &trunk),
        })
    }

    /// Normalize a whole recording, dropping the frames whose reference
    /// landmarks are unusable. Returns the normalized sequence and the
    /// number of dropped frames.
    pub fn normalize_sequence(&self, sequence: &PoseSequence) -> (PoseSequence, usize) {
        let mut out = PoseSequence::new();
        let mut dropped = 0usize;
        for frame in sequence.frames() {
            match self.normalize_set(frame) {
                // Timestamps are preserved, so pushes stay in order.
                Ok(normalized) => {
                    let _ = out.push(normalized);
                }
                Err(err) => {
                    dropped += 1;
                    debug!("dropping frame at {} ms: {}", frame.timestamp_ms(), err);
                }
            }
        }
        (out, dropped)
    }

    fn reference_points(&self, set: &LandmarkSet) -> EngineResult<TrunkGeometry> {
        let mut points = [Point3::origin(); 4];
        let mut found = 0usize;
        for (i, name) in REFERENCE_LANDMARKS.iter().enumerate() {
            if let Some(lm) = set.get(name) {
                if lm.confidence >= self.config.min_confidence {
                    points[i] = lm.position;
                    found += 1;
                }
            }
        }
        if found < REFERENCE_LANDMARKS.len() {
            return Err(AlignError::InsufficientLandmarks {
                operation: "normalize".into(),
                required: REFERENCE_LANDMARKS.len(),
                found,
            }
            .into());
        }

        let mid_shoulder = nalgebra::center(&points[0], &points[1]);
        let root = nalgebra::center(&points[2], &points[3]);
        let length = (mid_shoulder - root).norm();
        if length < MIN_TRUNK_LENGTH {
            return Err(GeometryError::degenerate(
                "normalization",
                "trunk reference length is zero",
            )
            .into());
        }
        Ok(TrunkGeometry {
            root,
            mid_shoulder,
            length,
        })
    }

    fn global(&self, set: &LandmarkSet, trunk: &TrunkGeometry) -> LandmarkSet {
        let ratio = self.config.target_trunk / trunk.length;
        let mut out = LandmarkSet::with_capacity(set.timestamp_ms(), set.len());
        for lm in set.iter() {
            let position = trunk.root + ratio * (lm.position - trunk.root);
            out.insert(Landmark::new(lm.name.clone(), position, lm.confidence));
        }
        out
    }

    fn per_segment(&self, set: &LandmarkSet, trunk: &TrunkGeometry) -> LandmarkSet {
        let ratio = self.config.target_trunk / trunk.length;
        let new_root = trunk.root;
        let trunk_dir: Vector3<f64> = (trunk.mid_shoulder - trunk.root) / trunk.length;
        let new_mid_shoulder = new_root + self.config.target_trunk * trunk_dir;

        let mut retargeted: HashMap<&str, Point3<f64>> = HashMap::new();
        for segment in &SEGMENTS {
            let (old_parent, new_parent) = match segment.parent {
                Attach::Root => (trunk.root, new_root),
                Attach::MidShoulder => (trunk.mid_shoulder, new_mid_shoulder),
                Attach::Landmark(name) => match (set.point(name), retargeted.get(name)) {
                    (Some(old), Some(&new)) => (old, new),
                    // Broken chain: the child falls back to its carrier.
                    _ => continue,
                },
            };
            let Some(old_child) = set.point(segment.child) else {
                continue;
            };
            let offset = old_child - old_parent;
            let norm = offset.norm();
            let new_child = if norm < MIN_SEGMENT_LENGTH {
                new_parent
            } else {
                new_parent + (segment.fraction * self.config.target_trunk / norm) * offset
            };
            retargeted.insert(segment.child, new_child);
        }

        let mut out = LandmarkSet::with_capacity(set.timestamp_ms(), set.len());
        for lm in set.iter() {
            let position = match retargeted.get(lm.name.as_str()) {
                Some(&p) => p,
                None => {
                    let (old_anchor, new_anchor) = match carrier_for(&lm.name) {
                        Attach::MidShoulder => (trunk.mid_shoulder, new_mid_shoulder),
                        Attach::Landmark(name) => {
                            match (set.point(name), retargeted.get(name)) {
                                (Some(old), Some(&new)) => (old, new),
                                _ => (trunk.root, new_root),
                            }
                        }
                        Attach::Root => (trunk.root, new_root),
                    };
                    new_anchor + ratio * (lm.position - old_anchor)
                }
            };
            out.insert(Landmark::new(lm.name.clone(), position, lm.confidence));
        }
        out
    }
}

impl Default for PoseNormalizer {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Subject with trunk length 1.0, twice the 0.5 target the tests
    /// configure, so every expected ratio is 0.5.
    fn tall_body(timestamp_ms: u64) -> LandmarkSet {
        LandmarkSet::new(timestamp_ms)
            .with("nose", Point3::new(0.0, 3.4, 0.1), 0.95)
            .with("left_shoulder", Point3::new(-0.4, 3.0, 0.0), 0.95)
            .with("right_shoulder", Point3::new(0.4, 3.0, 0.0), 0.95)
            .with("left_elbow", Point3::new(-0.5, 2.4, 0.0), 0.9)
            .with("right_elbow", Point3::new(0.5, 2.4, 0.0), 0.9)
            .with("left_wrist", Point3::new(-0.54, 1.9, 0.0), 0.9)
            .with("right_wrist", Point3::new(0.54, 1.9, 0.0), 0.9)
            .with("left_hip", Point3::new(-0.34, 2.0, 0.0), 0.95)
            .with("right_hip", Point3::new(0.34, 2.0, 0.0), 0.95)
            .with("left_knee", Point3::new(-0.34, 1.1, 0.0), 0.9)
            .with("right_knee", Point3::new(0.34, 1.1, 0.0), 0.9)
            .with("left_ankle", Point3::new(-0.34, 0.24, 0.0), 0.9)
            .with("right_ankle", Point3::new(0.34, 0.24, 0.0), 0.9)
    }

    fn trunk_length(set: &LandmarkSet) -> f64 {
        let ms = nalgebra::center(
            &set.point("left_shoulder").unwrap(),
            &set.point("right_shoulder").unwrap(),
        );
        let mh = nalgebra::center(
            &set.point("left_hip").unwrap(),
            &set.point("right_hip").unwrap(),
        );
        (ms - mh).norm()
    }

    fn elbow_angle(set: &LandmarkSet) -> f64 {
        let s = set.point("left_shoulder").unwrap();
        let e = set.point("left_elbow").unwrap();
        let w = set.point("left_wrist").unwrap();
        let u = (s - e).normalize();
        let v = (w - e).normalize();
        u.dot(&v).clamp(-1.0, 1.0).acos()
    }

    /// Half-size target so the ratios in the assertions are visible.
    fn normalizer(mode: NormalizeMode) -> PoseNormalizer {
        PoseNormalizer::new(NormalizeConfig {
            mode,
            target_trunk: 0.5,
            min_confidence: 0.5,
        })
        .unwrap()
    }

    #[test]
    fn test_global_scale_hits_the_target_trunk() {
        let out = normalizer(NormalizeMode::GlobalScale)
            .normalize_set(&tall_body(0))
            .unwrap();
        assert_relative_eq!(trunk_length(&out), 0.5, epsilon = 1e-9);
        // The root stays where the capture put it.
        let root = nalgebra::center(
            &out.point("left_hip").unwrap(),
            &out.point("right_hip").unwrap(),
        );
        assert_relative_eq!(root, Point3::new(0.0, 2.0, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn test_global_scale_preserves_joint_angles() {
        let body = tall_body(0);
        let out = normalizer(NormalizeMode::GlobalScale)
            .normalize_set(&body)
            .unwrap();
        assert_relative_eq!(elbow_angle(&out), elbow_angle(&body), epsilon = 1e-12);
    }

    #[test]
    fn test_per_segment_sets_canonical_lengths() {
        let out = normalizer(NormalizeMode::PerSegment)
            .normalize_set(&tall_body(0))
            .unwrap();
        let upper_arm =
            (out.point("left_elbow").unwrap() - out.point("left_shoulder").unwrap()).norm();
        let forearm = (out.point("left_wrist").unwrap() - out.point("left_elbow").unwrap()).norm();
        let thigh = (out.point("left_knee").unwrap() - out.point("left_hip").unwrap()).norm();
        assert_relative_eq!(upper_arm, UPPER_ARM * 0.5, epsilon = 1e-9);
        assert_relative_eq!(forearm, FOREARM * 0.5, epsilon = 1e-9);
        assert_relative_eq!(thigh, THIGH * 0.5, epsilon = 1e-9);
        assert_relative_eq!(trunk_length(&out), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_per_segment_preserves_segment_directions() {
        let body = tall_body(0);
        let out = normalizer(NormalizeMode::PerSegment).normalize_set(&body).unwrap();
        for (parent, child) in [
            ("left_shoulder", "left_elbow"),
            ("left_elbow", "left_wrist"),
            ("right_hip", "right_knee"),
        ] {
            let old = (body.point(child).unwrap() - body.point(parent).unwrap()).normalize();
            let new = (out.point(child).unwrap() - out.point(parent).unwrap()).normalize();
            assert_relative_eq!(old, new, epsilon = 1e-9);
        }
        assert_relative_eq!(elbow_angle(&out), elbow_angle(&body), epsilon = 1e-9);
    }

    #[test]
    fn test_carried_landmarks_follow_their_anchor() {
        let body = tall_body(0);
        let out = normalizer(NormalizeMode::PerSegment).normalize_set(&body).unwrap();
        // The nose keeps its mid-shoulder offset at the global ratio 0.5.
        let new_mid_shoulder = nalgebra::center(
            &out.point("left_shoulder").unwrap(),
            &out.point("right_shoulder").unwrap(),
        );
        let expected = new_mid_shoulder + 0.5 * Vector3::new(0.0, 0.4, 0.1);
        assert_relative_eq!(out.point("nose").unwrap(), expected, epsilon = 1e-9);
    }

    #[test]
    fn test_missing_reference_landmark_is_insufficient() {
        let mut body = LandmarkSet::new(0);
        for lm in tall_body(0).iter().filter(|l| l.name != "right_hip") {
            body.insert(lm.clone());
        }
        let err = PoseNormalizer::with_defaults().normalize_set(&body).unwrap_err();
        match err {
            EngineError::Align(AlignError::InsufficientLandmarks {
                required, found, ..
            }) => {
                assert_eq!(required, 4);
                assert_eq!(found, 3);
            }
            other => panic!("expected InsufficientLandmarks, got {other:?}"),
        }
    }

    #[test]
    fn test_low_confidence_reference_counts_as_missing() {
        let body = tall_body(0).with("right_hip", Point3::new(0.34, 2.0, 0.0), 0.2);
        let err = PoseNormalizer::with_defaults().normalize_set(&body).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Align(AlignError::InsufficientLandmarks { found: 3, .. })
        ));
    }

    #[test]
    fn test_zero_trunk_is_degenerate() {
        let body = LandmarkSet::new(0)
            .with("left_shoulder", Point3::new(-0.2, 1.0, 0.0), 1.0)
            .with("right_shoulder", Point3::new(0.2, 1.0, 0.0), 1.0)
            .with("left_hip", Point3::new(-0.2, 1.0, 0.0), 1.0)
            .with("right_hip", Point3::new(0.2, 1.0, 0.0), 1.0);
        let err = PoseNormalizer::with_defaults().normalize_set(&body).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Geometry(GeometryError::DegenerateGeometry { .. })
        ));
    }

    #[test]
    fn test_sequence_normalization_drops_unusable_frames() {
        let mut seq = PoseSequence::new();
        seq.push(tall_body(0)).unwrap();
        let mut occluded = LandmarkSet::new(33);
        for lm in tall_body(33).iter().filter(|l| !l.name.ends_with("hip")) {
            occluded.insert(lm.clone());
        }
        seq.push(occluded).unwrap();
        seq.push(tall_body(66)).unwrap();

        let (normalized, dropped) = PoseNormalizer::with_defaults().normalize_sequence(&seq);
        assert_eq!(normalized.len(), 2);
        assert_eq!(dropped, 1);
        assert_eq!(normalized.frames()[1].timestamp_ms(), 66);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let err = PoseNormalizer::new(NormalizeConfig {
            target_trunk: 0.0,
            ..NormalizeConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
