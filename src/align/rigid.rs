//! Rigid (Procrustes/Kabsch) alignment of corresponding landmark sets.
//!
//! Finds the proper rotation, uniform scale and translation that best
//! superimpose the subject landmarks onto the reference:
//!
//! ```text
//! H = Σ sᵢ · rᵢᵀ            (centered correspondences)
//! H = U Σ Vᵀ
//! R = V · diag(1, 1, d) · Uᵀ,   d = sign(det(V·Uᵀ))
//! s = (σ₀ + σ₁ + d·σ₂) / Σ|sᵢ|²
//! t = c_ref − s·R·c_subj
//! ```
//!
//! The determinant correction `d` is what keeps near-planar and mirrored
//! configurations from producing a reflection instead of a rotation.
//! Correspondences are matched by landmark name in sorted order, so the
//! result does not depend on detector emission order.

use nalgebra::{Matrix3, Point3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AlignError, EngineError, EngineResult, GeometryError};
use crate::pose::{Landmark, LandmarkSet};

/// Correspondences below this count cannot determine a rotation.
const MIN_CORRESPONDENCES: usize = 3;

/// Ratio of the second to the largest singular value below which the
/// correspondences are treated as collinear.
const COLLINEARITY_RATIO: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigidConfig {
    /// Landmarks below this confidence in either set are left out of the
    /// correspondence.
    pub min_confidence: f64,
    /// Solve for a uniform scale (Umeyama); `false` fixes scale at 1.
    pub with_scale: bool,
}

impl Default for RigidConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            with_scale: true,
        }
    }
}

impl RigidConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(EngineError::config("min_confidence must lie in [0, 1]"));
        }
        Ok(())
    }
}

/// Result of one rigid alignment.
#[derive(Debug, Clone)]
pub struct RigidAlignment {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
    pub scale: f64,
    /// The whole subject set mapped through the transform, including
    /// landmarks that had no counterpart in the reference.
    pub transformed: LandmarkSet,
    /// Mean per-joint position error over the correspondences after the
    /// transform.
    pub mpjpe: f64,
    /// Number of landmark pairs the transform was estimated from.
    pub correspondences: usize,
}

impl RigidAlignment {
    /// Map one point through the recovered transform.
    #[inline]
    pub fn apply(&self, point: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.scale * (self.rotation * point.coords) + self.translation)
    }
}

#[derive(Debug)]
pub struct RigidAligner {
    config: RigidConfig,
}

impl RigidAligner {
    pub fn new(config: RigidConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn with_defaults() -> Self {
        Self {
            config: RigidConfig::default(),
        }
    }

    pub fn config(&self) -> &RigidConfig {
        &self.config
    }

    /// Align `subject` onto `reference`.
    pub fn align(
        &self,
        subject: &LandmarkSet,
        reference: &LandmarkSet,
    ) -> EngineResult<RigidAlignment> {
        let pairs = self.correspondences(subject, reference);
        if pairs.len() < MIN_CORRESPONDENCES {
            return Err(AlignError::InsufficientCorrespondence {
                detail: format!(
                    "{} usable corresponding landmarks, need {MIN_CORRESPONDENCES}",
                    pairs.len()
                ),
            }
            .into());
        }

        let inv_n = 1.0 / pairs.len() as f64;
        let c_subj: Vector3<f64> = pairs.iter().map(|(s, _)| s.coords).sum::<Vector3<f64>>() * inv_n;
        let c_ref: Vector3<f64> = pairs.iter().map(|(_, r)| r.coords).sum::<Vector3<f64>>() * inv_n;

        let mut h = Matrix3::zeros();
        let mut subject_variance = 0.0;
        for (s, r) in &pairs {
            let sc = s.coords - c_subj;
            let rc = r.coords - c_ref;
            h += sc * rc.transpose();
            subject_variance += sc.norm_squared();
        }

        let mut svd = h.svd(true, true);
        svd.sort_by_singular_values();
        let (u, v_t) = match (svd.u, svd.v_t) {
            (Some(u), Some(v_t)) => (u, v_t),
            _ => {
                return Err(GeometryError::degenerate(
                    "rigid alignment",
                    "singular value decomposition failed",
                )
                .into())
            }
        };
        let sigma = svd.singular_values;
        if sigma[1] <= COLLINEARITY_RATIO * sigma[0] {
            return Err(AlignError::InsufficientCorrespondence {
                detail: "corresponding landmarks are collinear".into(),
            }
            .into());
        }

        let d = (u.determinant() * v_t.determinant()).signum();
        let correction = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, d));
        let rotation = v_t.transpose() * correction * u.transpose();

        let scale = if self.config.with_scale {
            (sigma[0] + sigma[1] + d * sigma[2]) / subject_variance
        } else {
            1.0
        };
        let translation = c_ref - scale * (rotation * c_subj);
        let apply =
            |p: &Point3<f64>| Point3::from(scale * (rotation * p.coords) + translation);

        let mut transformed = LandmarkSet::with_capacity(subject.timestamp_ms(), subject.len());
        for lm in subject.iter() {
            transformed.insert(Landmark::new(
                lm.name.clone(),
                apply(&lm.position),
                lm.confidence,
            ));
        }
        let mpjpe = pairs.iter().map(|(s, r)| (apply(s) - r).norm()).sum::<f64>() * inv_n;
        debug!(
            "rigid alignment over {} pairs: scale {:.3}, mpjpe {:.4}",
            pairs.len(),
            scale,
            mpjpe
        );

        Ok(RigidAlignment {
            rotation,
            translation,
            scale,
            transformed,
            mpjpe,
            correspondences: pairs.len(),
        })
    }

    /// Confidence-filtered name matches, sorted by name.
    fn correspondences(
        &self,
        subject: &LandmarkSet,
        reference: &LandmarkSet,
    ) -> Vec<(Point3<f64>, Point3<f64>)> {
        let mut names: Vec<&str> = subject
            .iter()
            .filter(|lm| lm.confidence >= self.config.min_confidence)
            .map(|lm| lm.name.as_str())
            .collect();
        names.sort_unstable();

        let mut pairs = Vec::with_capacity(names.len());
        for name in names {
            let Some(r) = reference.get(name) else {
                continue;
            };
            if r.confidence < self.config.min_confidence {
                continue;
            }
            if let Some(s) = subject.get(name) {
                pairs.push((s.position, r.position));
            }
        }
        pairs
    }
}

impl Default for RigidAligner {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Rotation3;

    fn cloud(timestamp_ms: u64) -> LandmarkSet {
        LandmarkSet::new(timestamp_ms)
            .with("left_shoulder", Point3::new(-0.2, 1.5, 0.0), 1.0)
            .with("right_shoulder", Point3::new(0.2, 1.5, 0.05), 1.0)
            .with("left_hip", Point3::new(-0.17, 1.0, 0.02), 1.0)
            .with("right_hip", Point3::new(0.17, 1.0, 0.0), 1.0)
            .with("left_knee", Point3::new(-0.17, 0.55, 0.08), 1.0)
            .with("right_knee", Point3::new(0.17, 0.55, -0.03), 1.0)
    }

    fn transform_cloud(
        set: &LandmarkSet,
        rotation: &Rotation3<f64>,
        scale: f64,
        translation: Vector3<f64>,
    ) -> LandmarkSet {
        let mut out = LandmarkSet::new(set.timestamp_ms());
        for lm in set.iter() {
            let p = Point3::from(scale * (rotation * lm.position).coords + translation);
            out.insert(Landmark::new(lm.name.clone(), p, lm.confidence));
        }
        out
    }

    #[test]
    fn test_recovers_an_applied_rigid_transform() {
        let subject = cloud(0);
        let rotation = Rotation3::from_euler_angles(0.3, -0.5, 0.9);
        let translation = Vector3::new(0.4, -0.2, 1.1);
        let reference = transform_cloud(&subject, &rotation, 1.0, translation);

        let result = RigidAligner::with_defaults().align(&subject, &reference).unwrap();
        assert_relative_eq!(result.rotation, rotation.into_inner(), epsilon = 1e-9);
        assert_relative_eq!(result.translation, translation, epsilon = 1e-9);
        assert_relative_eq!(result.scale, 1.0, epsilon = 1e-9);
        assert!(result.mpjpe < 1e-9);
        assert_eq!(result.correspondences, 6);
    }

    #[test]
    fn test_recovers_scale() {
        let subject = cloud(0);
        let rotation = Rotation3::from_euler_angles(-0.2, 0.7, 0.1);
        let reference = transform_cloud(&subject, &rotation, 2.0, Vector3::new(0.0, 0.5, 0.0));

        let result = RigidAligner::with_defaults().align(&subject, &reference).unwrap();
        assert_relative_eq!(result.scale, 2.0, epsilon = 1e-9);
        assert!(result.mpjpe < 1e-9);
    }

    #[test]
    fn test_scale_estimation_can_be_disabled() {
        let subject = cloud(0);
        let reference = transform_cloud(
            &subject,
            &Rotation3::identity(),
            2.0,
            Vector3::zeros(),
        );
        let aligner = RigidAligner::new(RigidConfig {
            with_scale: false,
            ..RigidConfig::default()
        })
        .unwrap();
        let result = aligner.align(&subject, &reference).unwrap();
        assert_eq!(result.scale, 1.0);
        // Without scale the size mismatch remains as residual.
        assert!(result.mpjpe > 0.05);
    }

    #[test]
    fn test_planar_configuration_still_yields_a_proper_rotation() {
        // All points in the z = 0 plane: the smallest singular value
        // vanishes and the determinant correction decides the sign.
        let subject = LandmarkSet::new(0)
            .with("a", Point3::new(0.0, 0.0, 0.0), 1.0)
            .with("b", Point3::new(1.0, 0.0, 0.0), 1.0)
            .with("c", Point3::new(0.0, 1.0, 0.0), 1.0)
            .with("d", Point3::new(1.0, 1.0, 0.0), 1.0)
            .with("e", Point3::new(0.3, 0.6, 0.0), 1.0);
        let rotation = Rotation3::from_euler_angles(0.0, 0.0, 1.2);
        let reference = transform_cloud(&subject, &rotation, 1.0, Vector3::new(0.2, 0.1, 0.0));

        let result = RigidAligner::with_defaults().align(&subject, &reference).unwrap();
        assert_relative_eq!(result.rotation.determinant(), 1.0, epsilon = 1e-9);
        assert!(result.mpjpe < 1e-9);
    }

    #[test]
    fn test_mirrored_reference_never_produces_a_reflection() {
        let subject = cloud(0);
        let mut reference = LandmarkSet::new(0);
        for lm in subject.iter() {
            let mirrored = Point3::new(lm.position.x, lm.position.y, -lm.position.z);
            reference.insert(Landmark::new(lm.name.clone(), mirrored, lm.confidence));
        }
        let result = RigidAligner::with_defaults().align(&subject, &reference).unwrap();
        assert_relative_eq!(result.rotation.determinant(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_too_few_shared_names_is_insufficient() {
        let subject = LandmarkSet::new(0)
            .with("a", Point3::new(0.0, 0.0, 0.0), 1.0)
            .with("b", Point3::new(1.0, 0.0, 0.0), 1.0)
            .with("x", Point3::new(0.0, 1.0, 0.0), 1.0);
        let reference = LandmarkSet::new(0)
            .with("a", Point3::new(0.0, 0.0, 0.0), 1.0)
            .with("b", Point3::new(1.0, 0.0, 0.0), 1.0)
            .with("y", Point3::new(0.0, 1.0, 0.0), 1.0);
        let err = RigidAligner::with_defaults().align(&subject, &reference).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Align(AlignError::InsufficientCorrespondence { .. })
        ));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_collinear_correspondences_are_rejected() {
        let mut subject = LandmarkSet::new(0);
        let mut reference = LandmarkSet::new(0);
        for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
            let p = Point3::new(i as f64, 0.0, 0.0);
            subject.insert(Landmark::new(*name, p, 1.0));
            reference.insert(Landmark::new(*name, Point3::new(0.0, i as f64, 0.0), 1.0));
        }
        let err = RigidAligner::with_defaults().align(&subject, &reference).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Align(AlignError::InsufficientCorrespondence { .. })
        ));
    }

    #[test]
    fn test_low_confidence_pairs_are_left_out() {
        let subject = cloud(0).with("right_knee", Point3::new(5.0, 5.0, 5.0), 0.1);
        let rotation = Rotation3::from_euler_angles(0.1, 0.2, 0.3);
        let reference = transform_cloud(&cloud(0), &rotation, 1.0, Vector3::zeros());

        let result = RigidAligner::with_defaults().align(&subject, &reference).unwrap();
        // The outlier never entered the estimate.
        assert_eq!(result.correspondences, 5);
        assert!(result.mpjpe < 1e-9);
    }

    #[test]
    fn test_transform_covers_unmatched_landmarks() {
        let subject = cloud(0).with("nose", Point3::new(0.0, 1.7, 0.1), 1.0);
        let rotation = Rotation3::from_euler_angles(0.0, 0.4, 0.0);
        let reference = transform_cloud(&cloud(0), &rotation, 1.0, Vector3::new(1.0, 0.0, 0.0));

        let result = RigidAligner::with_defaults().align(&subject, &reference).unwrap();
        let nose = result.transformed.get("nose").unwrap();
        let expected = result.apply(&Point3::new(0.0, 1.7, 0.1));
        assert_relative_eq!(nose.position, expected, epsilon = 1e-12);
        assert_eq!(result.transformed.len(), subject.len());
    }
}
