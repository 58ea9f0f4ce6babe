//! Landmark and pose containers.
//!
//! A [`LandmarkSet`] is one capture frame from a pose detector; a
//! [`PoseSequence`] is a time-ordered recording of them. Positions are
//! 3-D in the capture space; pseudo-3-D sources (2-D plus inferred depth)
//! use the same representation.

use std::collections::HashMap;

use nalgebra::Point3;

use crate::error::{EngineError, EngineResult};

/// A single named landmark observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Landmark {
    /// Canonical landmark name under the capture's schema.
    pub name: String,
    /// Position in the capture (camera/world) space.
    pub position: Point3<f64>,
    /// Detector visibility/quality score, clamped to [0, 1].
    pub confidence: f64,
}

impl Landmark {
    pub fn new(name: impl Into<String>, position: Point3<f64>, confidence: f64) -> Self {
        Self {
            name: name.into(),
            position,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// One frame of capture: landmarks keyed by name plus a timestamp.
///
/// Iteration follows insertion order, which integrators are expected to
/// keep equal to the schema order, so downstream consumers see a
/// deterministic layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LandmarkSet {
    timestamp_ms: u64,
    landmarks: Vec<Landmark>,
    index: HashMap<String, usize>,
}

impl LandmarkSet {
    pub fn new(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            landmarks: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn with_capacity(timestamp_ms: u64, capacity: usize) -> Self {
        Self {
            timestamp_ms,
            landmarks: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    /// Insert a landmark. Re-inserting a name replaces the previous
    /// observation in place (the last detector output wins).
    pub fn insert(&mut self, landmark: Landmark) {
        match self.index.get(&landmark.name) {
            Some(&i) => self.landmarks[i] = landmark,
            None => {
                self.index.insert(landmark.name.clone(), self.landmarks.len());
                self.landmarks.push(landmark);
            }
        }
    }

    /// Builder-style insert, mainly for tests and fixtures.
    #[must_use]
    pub fn with(mut self, name: &str, position: Point3<f64>, confidence: f64) -> Self {
        self.insert(Landmark::new(name, position, confidence));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Landmark> {
        self.index.get(name).map(|&i| &self.landmarks[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Position lookup without the confidence.
    pub fn point(&self, name: &str) -> Option<Point3<f64>> {
        self.get(name).map(|l| l.position)
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Landmark> {
        self.landmarks.iter()
    }

    /// Names present in this set, in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.landmarks.iter().map(|l| l.name.as_str())
    }
}

/// A time-ordered series of landmark sets from one recording.
///
/// Timestamps must be strictly increasing; a frame that arrives out of
/// order is rejected and the caller decides whether to drop it.
#[derive(Debug, Clone, Default)]
pub struct PoseSequence {
    frames: Vec<LandmarkSet>,
}

impl PoseSequence {
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub fn push(&mut self, frame: LandmarkSet) -> EngineResult<()> {
        if let Some(last) = self.frames.last() {
            if frame.timestamp_ms() <= last.timestamp_ms() {
                return Err(EngineError::OutOfOrderTimestamp {
                    timestamp_ms: frame.timestamp_ms(),
                    previous_ms: last.timestamp_ms(),
                });
            }
        }
        self.frames.push(frame);
        Ok(())
    }

    pub fn frames(&self) -> &[LandmarkSet] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Duration between first and last frame, zero for fewer than two.
    pub fn duration_ms(&self) -> u64 {
        match (self.frames.first(), self.frames.last()) {
            (Some(first), Some(last)) => last.timestamp_ms() - first.timestamp_ms(),
            _ => 0,
        }
    }
}

impl FromIterator<LandmarkSet> for PoseSequence {
    /// Collects frames in order, dropping any that arrive out of order.
    fn from_iter<I: IntoIterator<Item = LandmarkSet>>(iter: I) -> Self {
        let mut seq = Self::new();
        for frame in iter {
            let _ = seq.push(frame);
        }
        seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_replaces_by_name() {
        let mut set = LandmarkSet::new(0);
        set.insert(Landmark::new("nose", Point3::new(0.0, 1.0, 0.0), 0.9));
        set.insert(Landmark::new("nose", Point3::new(0.1, 1.0, 0.0), 0.8));
        assert_eq!(set.len(), 1);
        assert_eq!(set.point("nose"), Some(Point3::new(0.1, 1.0, 0.0)));
    }

    #[test]
    fn test_confidence_is_clamped() {
        let lm = Landmark::new("nose", Point3::origin(), 1.7);
        assert_eq!(lm.confidence, 1.0);
        let lm = Landmark::new("nose", Point3::origin(), -0.2);
        assert_eq!(lm.confidence, 0.0);
    }

    #[test]
    fn test_iteration_preserves_insertion_order() {
        let set = LandmarkSet::new(0)
            .with("a", Point3::origin(), 1.0)
            .with("b", Point3::origin(), 1.0)
            .with("c", Point3::origin(), 1.0);
        let names: Vec<&str> = set.names().collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_sequence_rejects_out_of_order_timestamps() {
        let mut seq = PoseSequence::new();
        seq.push(LandmarkSet::new(100)).unwrap();
        let err = seq.push(LandmarkSet::new(100)).unwrap_err();
        assert!(matches!(err, EngineError::OutOfOrderTimestamp { .. }));
        assert!(err.is_recoverable());
        assert_eq!(seq.len(), 1);
    }

    #[test]
    fn test_duration_spans_first_to_last() {
        let mut seq = PoseSequence::new();
        seq.push(LandmarkSet::new(100)).unwrap();
        seq.push(LandmarkSet::new(133)).unwrap();
        seq.push(LandmarkSet::new(166)).unwrap();
        assert_eq!(seq.duration_ms(), 66);
    }
}
