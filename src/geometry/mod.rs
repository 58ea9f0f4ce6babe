//! Geometry of anatomical frames: construction, planes, Euler sequences.

pub mod builder;
pub mod euler;
pub mod frame;
pub mod plane;

pub use builder::{build_frame, AnchorPoints};
pub use euler::{compose_yxy, decompose_yxy, YxyAngles};
pub use frame::{AnatomicalFrame, AnatomicalPlane, FrameKind, ORTHONORMALITY_TOLERANCE};
pub use plane::{project_onto_plane, signed_angle_in_plane};
