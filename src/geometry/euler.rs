//! Y-X-Y Euler sequence for ball-joint rotations.
//!
//! The relative rotation of a limb frame with respect to its parent is
//! decomposed as
//!
//! ```text
//! R = Ry(φ) · Rx(θ) · Ry(ψ)
//! ```
//!
//! with φ the plane of elevation, θ the elevation and ψ the axial
//! rotation. The sequence matches the clinical convention for the
//! shoulder and hip, where the first rotation picks the vertical plane
//! the limb moves in, the second lifts the limb inside it and the third
//! spins the limb about its own long axis.
//!
//! Extraction uses the matrix entries directly:
//!
//! ```text
//! θ = arccos(R[1][1])
//! φ = atan2(R[0][1], R[2][1])
//! ψ = atan2(R[1][0], -R[1][2])
//! ```

use nalgebra::Matrix3;

/// Below this value of sin(θ) the two Y rotations are not separable and
/// the decomposition is flagged as gimbal locked. Corresponds to an
/// elevation within about one degree of the poles.
pub const GIMBAL_SIN_THRESHOLD: f64 = 0.0175;

/// A Y-X-Y decomposition, all angles in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YxyAngles {
    /// φ, rotation about the parent's superior axis selecting the plane
    /// of elevation. Range (-π, π].
    pub plane_of_elevation: f64,
    /// θ, elevation inside that plane. Range [0, π].
    pub elevation: f64,
    /// ψ, rotation about the limb's own long axis. Range (-π, π].
    pub axial_rotation: f64,
    /// Set when the elevation is so close to 0 or π that φ and ψ are not
    /// individually observable. In that case ψ is reported as 0 and φ
    /// carries the observable combined rotation.
    pub gimbal_lock: bool,
}

#[inline]
fn rot_x(a: f64) -> Matrix3<f64> {
    let (s, c) = a.sin_cos();
    #[rustfmt::skip]
    let m = Matrix3::new(
        1.0, 0.0, 0.0,
        0.0,   c,  -s,
        0.0,   s,   c,
    );
    m
}

#[inline]
fn rot_y(a: f64) -> Matrix3<f64> {
    let (s, c) = a.sin_cos();
    #[rustfmt::skip]
    let m = Matrix3::new(
          c, 0.0,   s,
        0.0, 1.0, 0.0,
         -s, 0.0,   c,
    );
    m
}

/// Compose a rotation from Y-X-Y angles.
pub fn compose_yxy(plane_of_elevation: f64, elevation: f64, axial_rotation: f64) -> Matrix3<f64> {
    rot_y(plane_of_elevation) * rot_x(elevation) * rot_y(axial_rotation)
}

/// Decompose a rotation into Y-X-Y angles.
///
/// `r` must be a rotation matrix; the entry used for the elevation is
/// clamped so slightly de-normalized inputs do not produce NaN.
pub fn decompose_yxy(r: &Matrix3<f64>) -> YxyAngles {
    let cos_elev = r[(1, 1)].clamp(-1.0, 1.0);
    let elevation = cos_elev.acos();
    // Elevation lies in [0, π], so sin(θ) = sqrt(1 - cos²) is exact.
    let sin_elev = (1.0 - cos_elev * cos_elev).sqrt();

    if sin_elev < GIMBAL_SIN_THRESHOLD {
        // Near the poles R collapses to a single Y rotation: Ry(φ+ψ) at
        // θ≈0, Ry(φ-ψ)·Rx(π) at θ≈π. Report the observable combination
        // as φ and zero ψ.
        let plane = if cos_elev > 0.0 {
            r[(0, 2)].atan2(r[(0, 0)])
        } else {
            (-r[(0, 2)]).atan2(r[(0, 0)])
        };
        return YxyAngles {
            plane_of_elevation: plane,
            elevation,
            axial_rotation: 0.0,
            gimbal_lock: true,
        };
    }

    YxyAngles {
        plane_of_elevation: r[(0, 1)].atan2(r[(2, 1)]),
        elevation,
        axial_rotation: r[(1, 0)].atan2(-r[(1, 2)]),
        gimbal_lock: false,
    }
}
