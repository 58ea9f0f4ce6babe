//! Goniometry: joint angle measurement from landmark sets.
//!
//! Planar measurement projects the vertex-to-proximal and vertex-to-
//! distal rays onto a plane of the parent segment's frame and takes their
//! signed angle, so the reading matches what a handheld goniometer laid
//! on that plane would show: a straight limb reads toward ±180°, a right
//! angle reads 90°. The plane, parent frame and sign convention per joint
//! are a closed table.
//!
//! Ball joints (shoulder, hip) additionally get a Y-X-Y Euler
//! decomposition of the child frame relative to its parent. With the arm
//! hanging at the side the elevation is near zero and the two Y rotations
//! collapse; such measurements are flagged and their confidence capped
//! rather than guessed.
//!
//! Captures arriving under a non-canonical coordinate convention (see
//! [`CoordinateConvention`]) are mirrored into the engine's right-handed
//! space first, so angle signs do not depend on the detector's axes.
//!
//! Every failure is local to the joint being measured: one occluded wrist
//! never poisons the other joints of the same capture frame.

use std::borrow::Cow;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{CacheConfig, CacheStats, FrameCache};
use crate::error::{AlignError, EngineError, EngineResult, GeometryError, SchemaError};
use crate::geometry::{
    decompose_yxy, signed_angle_in_plane, AnatomicalFrame, AnatomicalPlane, AnchorPoints,
    FrameKind,
};
use crate::pose::{Landmark, LandmarkSet, PoseSequence};
use crate::schema::{CoordinateConvention, Joint, SchemaId, SchemaRegistry};

/// Confidence ceiling applied to gimbal-locked Euler measurements, so
/// they rank below any honestly measured angle.
pub const GIMBAL_LOCK_CONFIDENCE: f64 = 0.25;

/// Measurement tuning knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoniometerConfig {
    /// Landmarks below this confidence reject the measurement.
    pub min_confidence: f64,
}

impl Default for GoniometerConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
        }
    }
}

impl GoniometerConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(EngineError::config(
                "min_confidence must lie in [0, 1]",
            ));
        }
        Ok(())
    }
}

/// Y-X-Y decomposition of a ball joint, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EulerAngles {
    pub plane_of_elevation: f64,
    pub elevation: f64,
    pub axial_rotation: f64,
    /// The elevation was too close to 0° or 180° to separate the plane
    /// of elevation from the axial rotation.
    pub gimbal_lock: bool,
}

/// One joint angle measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointAngle {
    pub joint: Joint,
    /// Signed in-plane angle in degrees, range (-180, 180]. For Euler
    /// measurements this is the elevation.
    pub degrees: f64,
    pub plane: AnatomicalPlane,
    /// Minimum confidence over every landmark and frame involved.
    pub confidence: f64,
    pub timestamp_ms: u64,
    /// Present for ball joints measured with [`Goniometer::measure_euler`].
    pub euler: Option<EulerAngles>,
}

/// Range of motion of one joint over a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RomSummary {
    pub joint: Joint,
    pub min_deg: f64,
    pub max_deg: f64,
    /// `max_deg - min_deg`, the measured movement range.
    pub extent_deg: f64,
    /// Frames that produced a measurement.
    pub samples: usize,
    pub mean_confidence: f64,
}

/// Static measurement profile of a joint.
struct JointProfile {
    plane: AnatomicalPlane,
    parent_frame: FrameKind,
    /// Orientation of the in-plane angle so the clinical positive
    /// direction (flexion, abduction) reads positive on both sides.
    sign: f64,
}

fn profile(joint: Joint) -> JointProfile {
    use AnatomicalPlane::{Coronal, Sagittal};
    use FrameKind::*;
    let (plane, parent_frame, sign) = match joint {
        // Hinge joints measure in the parent segment's sagittal plane.
        Joint::LeftElbow => (Sagittal, LeftUpperArm, 1.0),
        Joint::RightElbow => (Sagittal, RightUpperArm, 1.0),
        Joint::LeftKnee => (Sagittal, LeftThigh, -1.0),
        Joint::RightKnee => (Sagittal, RightThigh, -1.0),
        Joint::LeftAnkle => (Sagittal, LeftShank, 1.0),
        Joint::RightAnkle => (Sagittal, RightShank, 1.0),
        // Abduction-type joints measure in the trunk's coronal plane.
        Joint::LeftShoulder => (Coronal, Thorax, -1.0),
        Joint::RightShoulder => (Coronal, Thorax, 1.0),
        Joint::LeftHip => (Coronal, Pelvis, 1.0),
        Joint::RightHip => (Coronal, Pelvis, -1.0),
    };
    JointProfile {
        plane,
        parent_frame,
        sign,
    }
}

/// Parent and child frames for joints with a Y-X-Y decomposition.
fn ball_joint_frames(joint: Joint) -> Option<(FrameKind, FrameKind)> {
    match joint {
        Joint::LeftShoulder => Some((FrameKind::Thorax, FrameKind::LeftUpperArm)),
        Joint::RightShoulder => Some((FrameKind::Thorax, FrameKind::RightUpperArm)),
        Joint::LeftHip => Some((FrameKind::Pelvis, FrameKind::LeftThigh)),
        Joint::RightHip => Some((FrameKind::Pelvis, FrameKind::RightThigh)),
        _ => None,
    }
}

/// Joint angle measurement engine for one schema.
pub struct Goniometer {
    registry: Arc<SchemaRegistry>,
    schema_id: SchemaId,
    convention: CoordinateConvention,
    cache: FrameCache,
    config: GoniometerConfig,
}

impl Goniometer {
    pub fn new(
        registry: Arc<SchemaRegistry>,
        schema_id: SchemaId,
        config: GoniometerConfig,
        cache_config: CacheConfig,
    ) -> EngineResult<Self> {
        config.validate()?;
        // Fail fast on an unregistered schema rather than on first use.
        let convention = registry.get(schema_id)?.convention();
        Ok(Self {
            registry,
            schema_id,
            convention,
            cache: FrameCache::new(cache_config)?,
            config,
        })
    }

    pub fn with_defaults(registry: Arc<SchemaRegistry>, schema_id: SchemaId) -> EngineResult<Self> {
        Self::new(
            registry,
            schema_id,
            GoniometerConfig::default(),
            CacheConfig::default(),
        )
    }

    pub fn schema_id(&self) -> SchemaId {
        self.schema_id
    }

    pub fn convention(&self) -> CoordinateConvention {
        self.convention
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// The capture mapped into the engine's measurement space. Captures
    /// under the canonical convention are borrowed unchanged.
    pub fn canonicalize<'a>(&self, set: &'a LandmarkSet) -> Cow<'a, LandmarkSet> {
        if self.convention.is_canonical() {
            Cow::Borrowed(set)
        } else {
            Cow::Owned(self.convention.set_to_canonical(set))
        }
    }

    /// Measure the planar angle of a joint in one capture frame.
    pub fn measure(&self, joint: Joint, set: &LandmarkSet) -> EngineResult<JointAngle> {
        let set = self.canonicalize(set);
        self.measure_canonical(joint, &set)
    }

    fn measure_canonical(&self, joint: Joint, set: &LandmarkSet) -> EngineResult<JointAngle> {
        let resolved = self.registry.resolve_joint(joint, self.schema_id)?;
        let proximal = self.checked_landmark(set, &resolved.proximal)?;
        let vertex = self.checked_landmark(set, &resolved.vertex)?;
        let distal = self.checked_landmark(set, &resolved.distal)?;

        let profile = profile(joint);
        let frame = self.segment_frame(profile.parent_frame, joint, set)?;
        let normal = frame.plane_normal(profile.plane);

        let u = proximal.position - vertex.position;
        let v = distal.position - vertex.position;
        let radians = signed_angle_in_plane(&u, &v, &normal)?;

        let confidence = proximal
            .confidence
            .min(vertex.confidence)
            .min(distal.confidence)
            .min(frame.confidence);

        Ok(JointAngle {
            joint,
            degrees: (radians * profile.sign).to_degrees(),
            plane: profile.plane,
            confidence,
            timestamp_ms: set.timestamp_ms(),
            euler: None,
        })
    }

    /// Measure a joint by its logical name, for configuration-driven
    /// callers.
    pub fn measure_named(&self, name: &str, set: &LandmarkSet) -> EngineResult<JointAngle> {
        let joint =
            Joint::from_name(name).ok_or_else(|| SchemaError::unknown_joint(name.to_owned()))?;
        self.measure(joint, set)
    }

    /// Measure a ball joint with the Y-X-Y sequence.
    ///
    /// `degrees` carries the elevation; the full decomposition is in
    /// `euler`. A gimbal-locked result keeps its angles but has its
    /// confidence capped at [`GIMBAL_LOCK_CONFIDENCE`].
    pub fn measure_euler(&self, joint: Joint, set: &LandmarkSet) -> EngineResult<JointAngle> {
        let (parent_kind, child_kind) = ball_joint_frames(joint).ok_or_else(|| {
            SchemaError::unknown_joint(format!("{} (no ball-joint definition)", joint.name()))
        })?;
        let set = self.canonicalize(set);
        let parent = self.segment_frame(parent_kind, joint, &set)?;
        let child = self.segment_frame(child_kind, joint, &set)?;

        let relative = parent.anatomical_basis().transpose() * child.anatomical_basis();
        let yxy = decompose_yxy(&relative);

        let mut confidence = parent.confidence.min(child.confidence);
        if yxy.gimbal_lock {
            warn!(
                "gimbal lock measuring {}: plane of elevation and axial rotation not separable",
                joint.name()
            );
            confidence = confidence.min(GIMBAL_LOCK_CONFIDENCE);
        }

        let euler = EulerAngles {
            plane_of_elevation: yxy.plane_of_elevation.to_degrees(),
            elevation: yxy.elevation.to_degrees(),
            axial_rotation: yxy.axial_rotation.to_degrees(),
            gimbal_lock: yxy.gimbal_lock,
        };

        Ok(JointAngle {
            joint,
            degrees: euler.elevation,
            plane: profile(joint).plane,
            confidence,
            timestamp_ms: set.timestamp_ms(),
            euler: Some(euler),
        })
    }

    /// Measure several joints on one capture frame. Failures stay local:
    /// each joint carries its own result.
    pub fn measure_joints(
        &self,
        joints: &[Joint],
        set: &LandmarkSet,
    ) -> Vec<(Joint, EngineResult<JointAngle>)> {
        let set = self.canonicalize(set);
        joints
            .iter()
            .map(|&joint| (joint, self.measure_canonical(joint, &set)))
            .collect()
    }

    /// Reduce a recording to one joint's range of motion. Frames that
    /// fail to measure are skipped; a joint that never measures is an
    /// error, never a zero-width range.
    pub fn summarize_rom(
        &self,
        joint: Joint,
        sequence: &PoseSequence,
    ) -> EngineResult<RomSummary> {
        let mut min_deg = f64::INFINITY;
        let mut max_deg = f64::NEG_INFINITY;
        let mut samples = 0usize;
        let mut confidence_sum = 0.0;
        for frame in sequence.frames() {
            match self.measure(joint, frame) {
                Ok(angle) => {
                    min_deg = min_deg.min(angle.degrees);
                    max_deg = max_deg.max(angle.degrees);
                    confidence_sum += angle.confidence;
                    samples += 1;
                }
                Err(err) => {
                    debug!(
                        "skipping {} at {} ms: {}",
                        joint.name(),
                        frame.timestamp_ms(),
                        err
                    );
                }
            }
        }
        if samples == 0 {
            return Err(AlignError::InsufficientLandmarks {
                operation: format!("range-of-motion summary for {}", joint.name()),
                required: 1,
                found: 0,
            }
            .into());
        }
        Ok(RomSummary {
            joint,
            min_deg,
            max_deg,
            extent_deg: max_deg - min_deg,
            samples,
            mean_confidence: confidence_sum / samples as f64,
        })
    }

    fn checked_landmark<'a>(
        &self,
        set: &'a LandmarkSet,
        name: &str,
    ) -> EngineResult<&'a Landmark> {
        let landmark = set
            .get(name)
            .ok_or_else(|| SchemaError::missing_landmark("capture frame", name.to_owned()))?;
        self.check_confidence(landmark)?;
        Ok(landmark)
    }

    fn check_confidence(&self, landmark: &Landmark) -> EngineResult<()> {
        if landmark.confidence < self.config.min_confidence {
            return Err(GeometryError::LowConfidence {
                landmark: landmark.name.clone(),
                confidence: landmark.confidence,
                minimum: self.config.min_confidence,
            }
            .into());
        }
        Ok(())
    }

    /// Obtain a segment frame through the cache, gating the anchor
    /// landmarks first. Anchors absent from the capture mean the frame
    /// cannot exist for this joint.
    fn segment_frame(
        &self,
        kind: FrameKind,
        joint: Joint,
        set: &LandmarkSet,
    ) -> EngineResult<AnatomicalFrame> {
        let resolved = self.registry.resolve_frame(kind, self.schema_id)?;
        for anchor in &resolved.anchors {
            for name in anchor.landmark_names() {
                match set.get(name) {
                    None => {
                        return Err(GeometryError::MissingFrame {
                            frame: kind.name().to_owned(),
                            joint: joint.name().to_owned(),
                        }
                        .into())
                    }
                    Some(landmark) => self.check_confidence(landmark)?,
                }
            }
        }

        let (a, conf_a) = resolved.anchors[0].lookup(set)?;
        let (b, conf_b) = resolved.anchors[1].lookup(set)?;
        let (c, conf_c) = resolved.anchors[2].lookup(set)?;
        let anchors = AnchorPoints::new(a, b, c, conf_a.min(conf_b).min(conf_c));
        self.cache.get_or_build(kind, &anchors)
    }
}
