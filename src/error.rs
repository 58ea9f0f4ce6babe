//! Error taxonomy for the measurement engine.
//!
//! Errors are grouped by concern: schema resolution, geometry, and
//! alignment. Every public operation returns [`EngineResult`]. A quantity
//! that cannot be measured is absent (an error), never reported as 0.

use thiserror::Error;

/// Result alias used across the crate.
pub type EngineResult<T> = Result<T, EngineError>;

/// Failures while resolving logical names against a pose schema.
///
/// These fail fast at resolution time and indicate a configuration or
/// integration problem, not a bad capture frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SchemaError {
    /// No definition exists for the requested logical joint.
    #[error("unknown joint: {name}")]
    UnknownJoint { name: String },

    /// The schema id was never registered.
    #[error("unsupported schema id {id}")]
    UnsupportedSchema { id: u32 },

    /// The schema does not provide a landmark the definition needs,
    /// or the capture frame lacks it.
    #[error("landmark {landmark} not available in {context}")]
    MissingLandmark { context: String, landmark: String },
}

/// Failures of the geometric computations themselves.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum GeometryError {
    /// Anchor landmarks are coincident or collinear; no frame or plane
    /// is determined by them.
    #[error("degenerate geometry in {context}: {detail}")]
    DegenerateGeometry { context: String, detail: String },

    /// A landmark fell below the configured confidence minimum. Distinct
    /// from geometry failures so callers can prompt the user to adjust
    /// the camera instead of retrying.
    #[error("landmark {landmark} confidence {confidence:.2} below minimum {minimum:.2}")]
    LowConfidence {
        landmark: String,
        confidence: f64,
        minimum: f64,
    },

    /// A coordinate frame required by the measurement could not be
    /// obtained because its anchors are not present in the capture.
    #[error("no {frame} frame available for measuring {joint}")]
    MissingFrame { frame: String, joint: String },
}

/// Failures of the rigid and temporal aligners and the normalizer.
///
/// All variants here are recoverable: callers skip the frame or pair and
/// continue with the rest of the recording.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum AlignError {
    /// Too few usable landmarks for the operation.
    #[error("{operation} needs {required} landmarks, found {found}")]
    InsufficientLandmarks {
        operation: String,
        required: usize,
        found: usize,
    },

    /// Fewer than three non-collinear correspondences; the rotation is
    /// not determined.
    #[error("insufficient correspondence: {detail}")]
    InsufficientCorrespondence { detail: String },

    /// One of the sequences to align contains no frames.
    #[error("empty {which} sequence")]
    EmptySequence { which: String },

    /// The aligner observed the cancellation flag and stopped.
    #[error("temporal alignment cancelled after {rows_done} rows")]
    Cancelled { rows_done: usize },
}

/// Top-level error type of the engine.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("alignment error: {0}")]
    Align(#[from] AlignError),

    /// A capture frame arrived with a timestamp at or before its
    /// predecessor.
    #[error("out-of-order timestamp {timestamp_ms} ms after {previous_ms} ms")]
    OutOfOrderTimestamp { timestamp_ms: u64, previous_ms: u64 },

    /// An invalid configuration value was supplied.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SchemaError {
    pub fn unknown_joint(name: impl Into<String>) -> Self {
        Self::UnknownJoint { name: name.into() }
    }

    pub fn missing_landmark(context: impl Into<String>, landmark: impl Into<String>) -> Self {
        Self::MissingLandmark {
            context: context.into(),
            landmark: landmark.into(),
        }
    }
}

impl GeometryError {
    pub fn degenerate(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::DegenerateGeometry {
            context: context.into(),
            detail: detail.into(),
        }
    }
}

impl EngineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether a caller processing a stream should skip this frame or
    /// pair and continue.
    ///
    /// Schema and configuration errors are integration mistakes and stay
    /// unrecoverable; everything tied to the content of a single capture
    /// frame is recoverable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Schema(_) | Self::Config(_) => false,
            Self::Geometry(_) | Self::Align(_) | Self::OutOfOrderTimestamp { .. } => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_errors_are_not_recoverable() {
        let err: EngineError = SchemaError::unknown_joint("left_wing").into();
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("left_wing"));
    }

    #[test]
    fn test_per_frame_errors_are_recoverable() {
        let geom: EngineError = GeometryError::degenerate("pelvis frame", "collinear anchors").into();
        assert!(geom.is_recoverable());

        let align: EngineError = AlignError::EmptySequence {
            which: "subject".into(),
        }
        .into();
        assert!(align.is_recoverable());

        let order = EngineError::OutOfOrderTimestamp {
            timestamp_ms: 10,
            previous_ms: 20,
        };
        assert!(order.is_recoverable());
    }

    #[test]
    fn test_low_confidence_message_names_the_landmark() {
        let err = GeometryError::LowConfidence {
            landmark: "left_elbow".into(),
            confidence: 0.12,
            minimum: 0.5,
        };
        let msg = err.to_string();
        assert!(msg.contains("left_elbow"));
        assert!(msg.contains("0.12"));
    }
}
