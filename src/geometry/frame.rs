//! Anatomical coordinate frames.
//!
//! A frame is a right-handed orthonormal basis attached to a body region.
//! The builder constructs the axes in a fixed order (primary, secondary,
//! tertiary); each [`FrameKind`] then carries a fixed layout mapping those
//! constructed axes onto the anatomical directions:
//!
//! ```text
//! X = lateral   (toward the subject's right)
//! Y = superior  (up the trunk, or proximal along a limb segment)
//! Z = anterior  (out of the chest)
//! ```
//!
//! The layouts are static tables, not inferred from data, so the same
//! anchors always produce the same anatomical interpretation. Plane
//! normals follow from the basis: sagittal ⟂ lateral, coronal ⟂ anterior,
//! transverse ⟂ superior.

use nalgebra::{Matrix3, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Maximum deviation from unit length / mutual orthogonality for a frame
/// to count as valid.
pub const ORTHONORMALITY_TOLERANCE: f64 = 1e-4;

/// Body region a frame is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameKind {
    Pelvis,
    Thorax,
    LeftUpperArm,
    RightUpperArm,
    LeftForearm,
    RightForearm,
    LeftThigh,
    RightThigh,
    LeftShank,
    RightShank,
}

/// Planes of motion, named by the anatomical axis they are orthogonal to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnatomicalPlane {
    /// Divides left from right; flexion/extension happens here.
    Sagittal,
    /// Divides front from back; abduction/adduction happens here.
    Coronal,
    /// Divides top from bottom; internal/external rotation happens here.
    Transverse,
}

/// Mapping from constructed axis order to anatomical directions.
///
/// Each anatomical axis is (constructed index, sign). The signs keep every
/// layout a proper rotation (determinant +1) and make left and right limb
/// frames share one lateral convention, so joint sign conventions hold on
/// both sides.
#[derive(Debug, Clone, Copy)]
struct AxisLayout {
    lateral: (usize, f64),
    superior: (usize, f64),
    anterior: (usize, f64),
}

/// Trunk frame built lateral-first with a superior provisional axis.
const LAYOUT_PELVIS: AxisLayout = AxisLayout {
    lateral: (0, 1.0),
    superior: (1, 1.0),
    anterior: (2, 1.0),
};

/// Thorax is built with an inferior provisional axis (toward the hips),
/// which flips the constructed secondary and tertiary axes.
const LAYOUT_THORAX: AxisLayout = AxisLayout {
    lateral: (0, 1.0),
    superior: (1, -1.0),
    anterior: (2, -1.0),
};

/// Left-side limb segments: longitudinal-first with a provisional axis
/// toward the contralateral side.
const LAYOUT_LIMB_LEFT: AxisLayout = AxisLayout {
    lateral: (1, 1.0),
    superior: (0, 1.0),
    anterior: (2, -1.0),
};

/// Right-side mirror of [`LAYOUT_LIMB_LEFT`].
const LAYOUT_LIMB_RIGHT: AxisLayout = AxisLayout {
    lateral: (1, -1.0),
    superior: (0, 1.0),
    anterior: (2, 1.0),
};

impl FrameKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pelvis => "pelvis",
            Self::Thorax => "thorax",
            Self::LeftUpperArm => "left_upper_arm",
            Self::RightUpperArm => "right_upper_arm",
            Self::LeftForearm => "left_forearm",
            Self::RightForearm => "right_forearm",
            Self::LeftThigh => "left_thigh",
            Self::RightThigh => "right_thigh",
            Self::LeftShank => "left_shank",
            Self::RightShank => "right_shank",
        }
    }

    /// Trunk frames have their origin at the midpoint of the primary
    /// anchor pair; limb frames sit at the distal anchor.
    pub fn origin_at_midpoint(&self) -> bool {
        matches!(self, Self::Pelvis | Self::Thorax)
    }

    fn layout(&self) -> AxisLayout {
        match self {
            Self::Pelvis => LAYOUT_PELVIS,
            Self::Thorax => LAYOUT_THORAX,
            Self::LeftUpperArm | Self::LeftForearm | Self::LeftThigh | Self::LeftShank => {
                LAYOUT_LIMB_LEFT
            }
            Self::RightUpperArm | Self::RightForearm | Self::RightThigh | Self::RightShank => {
                LAYOUT_LIMB_RIGHT
            }
        }
    }

    /// All frame kinds, in the fixed computation order: trunk frames
    /// first, then limb segments proximal to distal.
    pub const ALL: [FrameKind; 10] = [
        Self::Pelvis,
        Self::Thorax,
        Self::LeftUpperArm,
        Self::RightUpperArm,
        Self::LeftForearm,
        Self::RightForearm,
        Self::LeftThigh,
        Self::RightThigh,
        Self::LeftShank,
        Self::RightShank,
    ];
}

/// A right-handed orthonormal frame attached to a body region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnatomicalFrame {
    pub kind: FrameKind,
    pub origin: Point3<f64>,
    /// Unit axes in construction order (primary, secondary, tertiary).
    pub axes: [Vector3<f64>; 3],
    /// Minimum confidence of the anchor landmarks.
    pub confidence: f64,
}

impl AnatomicalFrame {
    /// Rotation whose columns are the anatomical X (lateral), Y (superior)
    /// and Z (anterior) directions in capture space.
    pub fn anatomical_basis(&self) -> Matrix3<f64> {
        let layout = self.kind.layout();
        let (xi, xs) = layout.lateral;
        let (yi, ys) = layout.superior;
        let (zi, zs) = layout.anterior;
        Matrix3::from_columns(&[self.axes[xi] * xs, self.axes[yi] * ys, self.axes[zi] * zs])
    }

    /// Unit normal of one of this frame's planes of motion.
    pub fn plane_normal(&self, plane: AnatomicalPlane) -> Vector3<f64> {
        let layout = self.kind.layout();
        let (i, s) = match plane {
            AnatomicalPlane::Sagittal => layout.lateral,
            AnatomicalPlane::Coronal => layout.anterior,
            AnatomicalPlane::Transverse => layout.superior,
        };
        self.axes[i] * s
    }

    /// Largest deviation of the axes from unit length and mutual
    /// orthogonality.
    pub fn orthonormality_error(&self) -> f64 {
        let mut worst: f64 = 0.0;
        for i in 0..3 {
            for j in 0..3 {
                let dot = self.axes[i].dot(&self.axes[j]);
                let expected = if i == j { 1.0 } else { 0.0 };
                worst = worst.max((dot - expected).abs());
            }
        }
        worst
    }

    pub fn is_valid(&self) -> bool {
        self.orthonormality_error() < ORTHONORMALITY_TOLERANCE
    }
}
