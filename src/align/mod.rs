//! Spatial and temporal alignment of captures.
//!
//! [`rigid`] superimposes two landmark sets of the same instant;
//! [`temporal`] warps two recordings of the same movement onto a shared
//! timeline. Both operate on normalized data.

pub mod rigid;
pub mod temporal;

pub use rigid::{RigidAligner, RigidAlignment, RigidConfig};
pub use temporal::{DtwAlignment, DtwConfig, TemporalAligner};
