//! Projection onto planes of motion and in-plane signed angles.

use nalgebra::Vector3;

use crate::error::{EngineResult, GeometryError};

/// A segment whose in-plane component is shorter than this lies along the
/// plane normal; its direction inside the plane is undetermined.
const MIN_PROJECTED_NORM: f64 = 1e-6;

/// Remove the component of `v` along the unit `normal`.
#[inline]
pub fn project_onto_plane(v: &Vector3<f64>, normal: &Vector3<f64>) -> Vector3<f64> {
    v - normal * v.dot(normal)
}

/// Signed angle from `u` to `v` measured inside the plane with the given
/// unit normal, in radians, range (-π, π].
///
/// Both vectors are projected onto the plane first; the sign follows the
/// right-hand rule about `normal`:
///
/// ```text
/// angle = atan2((u' × v') · n, u' · v')
/// ```
pub fn signed_angle_in_plane(
    u: &Vector3<f64>,
    v: &Vector3<f64>,
    normal: &Vector3<f64>,
) -> EngineResult<f64> {
    let pu = project_onto_plane(u, normal);
    let pv = project_onto_plane(v, normal);

    if pu.norm() < MIN_PROJECTED_NORM || pv.norm() < MIN_PROJECTED_NORM {
        return Err(GeometryError::degenerate(
            "plane projection",
            "segment lies along the plane normal",
        )
        .into());
    }

    Ok(pu.cross(&pv).dot(normal).atan2(pu.dot(&pv)))
}
