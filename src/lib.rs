pub mod align;
pub mod cache;
pub mod compare;
pub mod error;
pub mod geometry;
pub mod goniometer;
pub mod normalize;
pub mod pose;
pub mod schema;

pub use error::{EngineError, EngineResult};
