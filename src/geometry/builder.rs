//! Construction of anatomical frames from anchor landmarks.
//!
//! Given anchors `a`, `b` and a provisional reference `c`:
//!
//! ```text
//! primary   = (b - a) / |b - a|
//! w         = (c - origin) / |c - origin|
//! tertiary  = (primary × w) / |primary × w|
//! secondary = tertiary × primary
//! ```
//!
//! The secondary axis is always recomputed from the cross product; `w` is
//! never used directly, so the result is orthonormal even when the anchors
//! are not exactly perpendicular.

use nalgebra::{Point3, Vector3};

use crate::error::{EngineResult, GeometryError};
use crate::geometry::frame::{AnatomicalFrame, FrameKind};

/// Anchors below this separation cannot define an axis.
const MIN_ANCHOR_SEPARATION: f64 = 1e-6;

/// Cross products of the unit axes below this norm mean the anchors are
/// collinear and the frame orientation is undetermined.
const MIN_CROSS_NORM: f64 = 1e-6;

/// Resolved anchor positions for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorPoints {
    pub a: Point3<f64>,
    pub b: Point3<f64>,
    pub c: Point3<f64>,
    /// Minimum confidence of the source landmarks.
    pub confidence: f64,
}

impl AnchorPoints {
    pub fn new(a: Point3<f64>, b: Point3<f64>, c: Point3<f64>, confidence: f64) -> Self {
        Self { a, b, c, confidence }
    }
}

/// Build a right-handed orthonormal frame of the given kind.
///
/// Trunk kinds place the origin at the midpoint of `a` and `b`; limb kinds
/// at `a` (the distal anchor). Returns [`GeometryError::DegenerateGeometry`]
/// when anchors coincide or are collinear.
pub fn build_frame(kind: FrameKind, anchors: &AnchorPoints) -> EngineResult<AnatomicalFrame> {
    let origin = if kind.origin_at_midpoint() {
        nalgebra::center(&anchors.a, &anchors.b)
    } else {
        anchors.a
    };

    let primary = unit(anchors.b - anchors.a, kind, "primary anchors coincide")?;
    let provisional = unit(anchors.c - origin, kind, "reference anchor coincides with origin")?;

    let cross = primary.cross(&provisional);
    if cross.norm() < MIN_CROSS_NORM {
        return Err(GeometryError::degenerate(
            format!("{} frame", kind.name()),
            "anchors are collinear",
        )
        .into());
    }
    let tertiary = cross.normalize();
    // Unit by construction: tertiary ⟂ primary and both are unit length.
    let secondary = tertiary.cross(&primary);

    Ok(AnatomicalFrame {
        kind,
        origin,
        axes: [primary, secondary, tertiary],
        confidence: anchors.confidence,
    })
}

fn unit(v: Vector3<f64>, kind: FrameKind, detail: &str) -> EngineResult<Vector3<f64>> {
    let norm = v.norm();
    if norm < MIN_ANCHOR_SEPARATION {
        return Err(GeometryError::degenerate(format!("{} frame", kind.name()), detail).into());
    }
    Ok(v / norm)
}
