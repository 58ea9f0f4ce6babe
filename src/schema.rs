//! Pose schemas, the schema registry, and logical-name resolution.
//!
//! A schema describes the landmark layout of one pose-estimation model.
//! The engine never guesses landmark meanings: every logical joint and
//! frame definition lives in a closed table here, and resolution against
//! a schema either succeeds with concrete names or fails fast.
//!
//! The registry is append-only and populated once at startup by the
//! embedding application; [`SchemaRegistry::with_builtins`] seeds the two
//! standard layouts so integrators do not retype them.

use std::collections::HashMap;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult, SchemaError};
use crate::geometry::FrameKind;
use crate::pose::{Landmark, LandmarkSet};

/// Canonical landmark names shared by the definition tables.
pub mod names {
    pub const NOSE: &str = "nose";
    pub const LEFT_SHOULDER: &str = "left_shoulder";
    pub const RIGHT_SHOULDER: &str = "right_shoulder";
    pub const LEFT_ELBOW: &str = "left_elbow";
    pub const RIGHT_ELBOW: &str = "right_elbow";
    pub const LEFT_WRIST: &str = "left_wrist";
    pub const RIGHT_WRIST: &str = "right_wrist";
    pub const LEFT_HIP: &str = "left_hip";
    pub const RIGHT_HIP: &str = "right_hip";
    pub const LEFT_KNEE: &str = "left_knee";
    pub const RIGHT_KNEE: &str = "right_knee";
    pub const LEFT_ANKLE: &str = "left_ankle";
    pub const RIGHT_ANKLE: &str = "right_ankle";
    pub const LEFT_HEEL: &str = "left_heel";
    pub const RIGHT_HEEL: &str = "right_heel";
    pub const LEFT_FOOT_INDEX: &str = "left_foot_index";
    pub const RIGHT_FOOT_INDEX: &str = "right_foot_index";
}

/// Identifier of a registered pose schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaId(pub u32);

impl std::fmt::Display for SchemaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether the third coordinate of a schema's landmarks is measured or
/// inferred by the detector from a 2-D image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepthKind {
    Measured,
    Inferred,
}

/// Axis convention of the space a schema's landmarks arrive in.
///
/// The engine measures in a right-handed space: x lateral (toward the
/// subject's right), y up, z toward the camera. Captures under any other
/// registered convention are mirrored into that space before measurement;
/// without the declaration a mirrored capture would negate every signed
/// angle. Each non-canonical convention is a single-axis mirror, so the
/// mapping is its own inverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinateConvention {
    /// The canonical space; captures pass through untouched.
    RightHandedYUp,
    /// Image-style axes with y growing downward.
    LeftHandedYDown,
    /// Depth mirrored: z grows away from the camera.
    LeftHandedZMirrored,
}

impl CoordinateConvention {
    pub fn is_canonical(self) -> bool {
        matches!(self, Self::RightHandedYUp)
    }

    /// Map one capture-space point into the canonical space.
    #[inline]
    pub fn point_to_canonical(self, p: Point3<f64>) -> Point3<f64> {
        match self {
            Self::RightHandedYUp => p,
            Self::LeftHandedYDown => Point3::new(p.x, -p.y, p.z),
            Self::LeftHandedZMirrored => Point3::new(p.x, p.y, -p.z),
        }
    }

    /// Map a whole capture into the canonical space. Names, confidences
    /// and the timestamp are preserved.
    pub fn set_to_canonical(self, set: &LandmarkSet) -> LandmarkSet {
        let mut out = LandmarkSet::with_capacity(set.timestamp_ms(), set.len());
        for lm in set.iter() {
            out.insert(Landmark::new(
                lm.name.clone(),
                self.point_to_canonical(lm.position),
                lm.confidence,
            ));
        }
        out
    }
}

/// Landmark layout of one pose-estimation model.
#[derive(Debug, Clone)]
pub struct PoseSchema {
    id: SchemaId,
    name: String,
    landmarks: Vec<String>,
    index: HashMap<String, usize>,
    /// Canonical name -> this schema's concrete name, for models that use
    /// their own vocabulary. Names absent from the map pass through.
    aliases: HashMap<String, String>,
    depth: DepthKind,
    convention: CoordinateConvention,
}

impl PoseSchema {
    pub fn new(
        id: SchemaId,
        name: impl Into<String>,
        landmarks: Vec<String>,
        depth: DepthKind,
    ) -> Self {
        let index = landmarks
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        Self {
            id,
            name: name.into(),
            landmarks,
            index,
            aliases: HashMap::new(),
            depth,
            convention: CoordinateConvention::RightHandedYUp,
        }
    }

    /// Add canonical-to-concrete name aliases for a model with its own
    /// landmark vocabulary.
    #[must_use]
    pub fn with_aliases(mut self, aliases: HashMap<String, String>) -> Self {
        self.aliases = aliases;
        self
    }

    /// Declare the axis convention the model emits in. Defaults to the
    /// canonical right-handed space.
    #[must_use]
    pub fn with_convention(mut self, convention: CoordinateConvention) -> Self {
        self.convention = convention;
        self
    }

    /// The 17-landmark COCO layout (2-D models with inferred depth).
    pub fn coco17(id: SchemaId) -> Self {
        let landmarks = [
            "nose",
            "left_eye",
            "right_eye",
            "left_ear",
            "right_ear",
            "left_shoulder",
            "right_shoulder",
            "left_elbow",
            "right_elbow",
            "left_wrist",
            "right_wrist",
            "left_hip",
            "right_hip",
            "left_knee",
            "right_knee",
            "left_ankle",
            "right_ankle",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        Self::new(id, "coco17", landmarks, DepthKind::Inferred)
    }

    /// The 33-landmark full-body layout emitted by common 3-D detectors.
    pub fn motion33(id: SchemaId) -> Self {
        let landmarks = [
            "nose",
            "left_eye_inner",
            "left_eye",
            "left_eye_outer",
            "right_eye_inner",
            "right_eye",
            "right_eye_outer",
            "left_ear",
            "right_ear",
            "mouth_left",
            "mouth_right",
            "left_shoulder",
            "right_shoulder",
            "left_elbow",
            "right_elbow",
            "left_wrist",
            "right_wrist",
            "left_pinky",
            "right_pinky",
            "left_index",
            "right_index",
            "left_thumb",
            "right_thumb",
            "left_hip",
            "right_hip",
            "left_knee",
            "right_knee",
            "left_ankle",
            "right_ankle",
            "left_heel",
            "right_heel",
            "left_foot_index",
            "right_foot_index",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        Self::new(id, "motion33", landmarks, DepthKind::Measured)
    }

    pub fn id(&self) -> SchemaId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn depth(&self) -> DepthKind {
        self.depth
    }

    pub fn convention(&self) -> CoordinateConvention {
        self.convention
    }

    pub fn landmark_names(&self) -> impl Iterator<Item = &str> {
        self.landmarks.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    /// Map a canonical name through the alias table and verify the schema
    /// actually emits it. Unaliased names pass through borrowed.
    pub fn concrete_name<'a>(&'a self, canonical: &'a str) -> Option<&'a str> {
        let concrete = self
            .aliases
            .get(canonical)
            .map(String::as_str)
            .unwrap_or(canonical);
        self.index.contains_key(concrete).then_some(concrete)
    }
}

/// Logical, side-specific joints the engine measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Joint {
    LeftElbow,
    RightElbow,
    LeftKnee,
    RightKnee,
    LeftShoulder,
    RightShoulder,
    LeftHip,
    RightHip,
    LeftAnkle,
    RightAnkle,
}

impl Joint {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LeftElbow => "left_elbow",
            Self::RightElbow => "right_elbow",
            Self::LeftKnee => "left_knee",
            Self::RightKnee => "right_knee",
            Self::LeftShoulder => "left_shoulder",
            Self::RightShoulder => "right_shoulder",
            Self::LeftHip => "left_hip",
            Self::RightHip => "right_hip",
            Self::LeftAnkle => "left_ankle",
            Self::RightAnkle => "right_ankle",
        }
    }

    /// Parse a logical joint name as used by the resolver API.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|j| j.name() == name)
    }

    pub const ALL: [Joint; 10] = [
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftAnkle,
        Self::RightAnkle,
    ];
}

impl std::fmt::Display for Joint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Canonical `[proximal, vertex, distal]` landmark names for a joint.
pub(crate) fn joint_landmark_names(joint: Joint) -> [&'static str; 3] {
    use names::*;
    match joint {
        Joint::LeftElbow => [LEFT_SHOULDER, LEFT_ELBOW, LEFT_WRIST],
        Joint::RightElbow => [RIGHT_SHOULDER, RIGHT_ELBOW, RIGHT_WRIST],
        Joint::LeftKnee => [LEFT_HIP, LEFT_KNEE, LEFT_ANKLE],
        Joint::RightKnee => [RIGHT_HIP, RIGHT_KNEE, RIGHT_ANKLE],
        Joint::LeftShoulder => [LEFT_HIP, LEFT_SHOULDER, LEFT_ELBOW],
        Joint::RightShoulder => [RIGHT_HIP, RIGHT_SHOULDER, RIGHT_ELBOW],
        Joint::LeftHip => [LEFT_SHOULDER, LEFT_HIP, LEFT_KNEE],
        Joint::RightHip => [RIGHT_SHOULDER, RIGHT_HIP, RIGHT_KNEE],
        Joint::LeftAnkle => [LEFT_KNEE, LEFT_ANKLE, LEFT_FOOT_INDEX],
        Joint::RightAnkle => [RIGHT_KNEE, RIGHT_ANKLE, RIGHT_FOOT_INDEX],
    }
}

/// Canonical anchor references `[a, b, c]` for a frame kind, matching the
/// builder's construction order.
pub(crate) fn frame_anchor_refs(kind: FrameKind) -> [AnchorRef; 3] {
    use names::*;
    use AnchorRef::{Midpoint, Point};
    match kind {
        FrameKind::Pelvis => [
            Point(LEFT_HIP),
            Point(RIGHT_HIP),
            Midpoint(LEFT_SHOULDER, RIGHT_SHOULDER),
        ],
        FrameKind::Thorax => [
            Point(LEFT_SHOULDER),
            Point(RIGHT_SHOULDER),
            Midpoint(LEFT_HIP, RIGHT_HIP),
        ],
        // Limb provisional references sit off the segment line in every
        // reachable pose: an arm can align with the shoulder line at full
        // abduction, so arm segments reference the hip, and a thigh can
        // align with the hip line, so thigh segments reference the
        // contralateral shoulder.
        FrameKind::LeftUpperArm => [Point(LEFT_ELBOW), Point(LEFT_SHOULDER), Point(LEFT_HIP)],
        FrameKind::RightUpperArm => [
            Point(RIGHT_ELBOW),
            Point(RIGHT_SHOULDER),
            Point(RIGHT_HIP),
        ],
        FrameKind::LeftForearm => [Point(LEFT_WRIST), Point(LEFT_ELBOW), Point(LEFT_HIP)],
        FrameKind::RightForearm => [Point(RIGHT_WRIST), Point(RIGHT_ELBOW), Point(RIGHT_HIP)],
        FrameKind::LeftThigh => [Point(LEFT_KNEE), Point(LEFT_HIP), Point(RIGHT_SHOULDER)],
        FrameKind::RightThigh => [Point(RIGHT_KNEE), Point(RIGHT_HIP), Point(LEFT_SHOULDER)],
        FrameKind::LeftShank => [Point(LEFT_ANKLE), Point(LEFT_KNEE), Point(RIGHT_HIP)],
        FrameKind::RightShank => [Point(RIGHT_ANKLE), Point(RIGHT_KNEE), Point(LEFT_HIP)],
    }
}

/// Canonical anchor reference used by the definition tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AnchorRef {
    Point(&'static str),
    Midpoint(&'static str, &'static str),
}

/// A schema-resolved anchor: concrete landmark name(s), possibly the
/// midpoint of a pair (e.g. mid-hip).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    Point(String),
    Midpoint(String, String),
}

impl Anchor {
    /// Look the anchor up in a capture frame, returning its position and
    /// the minimum confidence of the landmarks involved.
    pub fn lookup(&self, set: &LandmarkSet) -> EngineResult<(Point3<f64>, f64)> {
        match self {
            Anchor::Point(name) => {
                let lm = set
                    .get(name)
                    .ok_or_else(|| SchemaError::missing_landmark("capture frame", name.clone()))?;
                Ok((lm.position, lm.confidence))
            }
            Anchor::Midpoint(first, second) => {
                let a = set
                    .get(first)
                    .ok_or_else(|| SchemaError::missing_landmark("capture frame", first.clone()))?;
                let b = set.get(second).ok_or_else(|| {
                    SchemaError::missing_landmark("capture frame", second.clone())
                })?;
                Ok((
                    nalgebra::center(&a.position, &b.position),
                    a.confidence.min(b.confidence),
                ))
            }
        }
    }

    /// Landmark names this anchor reads.
    pub fn landmark_names(&self) -> impl Iterator<Item = &str> {
        let (first, second) = match self {
            Anchor::Point(name) => (name.as_str(), None),
            Anchor::Midpoint(a, b) => (a.as_str(), Some(b.as_str())),
        };
        std::iter::once(first).chain(second)
    }
}

/// A joint definition resolved against one schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedJoint {
    pub proximal: String,
    pub vertex: String,
    pub distal: String,
}

/// A frame definition resolved against one schema, in builder anchor
/// order `[a, b, c]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFrame {
    pub anchors: [Anchor; 3],
}

/// Process-wide, append-only table of registered schemas.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<SchemaId, PoseSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-seeded with [`PoseSchema::coco17`] as id 1 and
    /// [`PoseSchema::motion33`] as id 2.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        // Ids are fixed; registering built-ins cannot collide in an empty
        // registry.
        let _ = registry.register(PoseSchema::coco17(SchemaId(1)));
        let _ = registry.register(PoseSchema::motion33(SchemaId(2)));
        registry
    }

    /// Register a schema. The table is append-only: re-registering an id
    /// is a configuration error, never a silent overwrite.
    pub fn register(&mut self, schema: PoseSchema) -> EngineResult<()> {
        let id = schema.id();
        if self.schemas.contains_key(&id) {
            return Err(EngineError::config(format!(
                "schema id {id} is already registered"
            )));
        }
        self.schemas.insert(id, schema);
        Ok(())
    }

    pub fn get(&self, id: SchemaId) -> EngineResult<&PoseSchema> {
        self.schemas
            .get(&id)
            .ok_or_else(|| SchemaError::UnsupportedSchema { id: id.0 }.into())
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Resolve a joint's `[proximal, vertex, distal]` landmark names under
    /// a schema.
    pub fn resolve_joint(&self, joint: Joint, schema_id: SchemaId) -> EngineResult<ResolvedJoint> {
        let schema = self.get(schema_id)?;
        let [proximal, vertex, distal] = joint_landmark_names(joint);
        Ok(ResolvedJoint {
            proximal: self.concrete(schema, proximal)?,
            vertex: self.concrete(schema, vertex)?,
            distal: self.concrete(schema, distal)?,
        })
    }

    /// Resolve a joint by its logical name, for callers driven by
    /// configuration rather than the [`Joint`] enum.
    pub fn resolve_named(&self, name: &str, schema_id: SchemaId) -> EngineResult<ResolvedJoint> {
        let joint =
            Joint::from_name(name).ok_or_else(|| SchemaError::unknown_joint(name.to_owned()))?;
        self.resolve_joint(joint, schema_id)
    }

    /// Resolve a frame's anchors under a schema.
    pub fn resolve_frame(
        &self,
        kind: FrameKind,
        schema_id: SchemaId,
    ) -> EngineResult<ResolvedFrame> {
        let schema = self.get(schema_id)?;
        let [a, b, c] = frame_anchor_refs(kind);
        Ok(ResolvedFrame {
            anchors: [
                self.anchor(schema, a)?,
                self.anchor(schema, b)?,
                self.anchor(schema, c)?,
            ],
        })
    }

    fn anchor(&self, schema: &PoseSchema, anchor_ref: AnchorRef) -> EngineResult<Anchor> {
        Ok(match anchor_ref {
            AnchorRef::Point(name) => Anchor::Point(self.concrete(schema, name)?),
            AnchorRef::Midpoint(first, second) => Anchor::Midpoint(
                self.concrete(schema, first)?,
                self.concrete(schema, second)?,
            ),
        })
    }

    fn concrete(&self, schema: &PoseSchema, canonical: &str) -> EngineResult<String> {
        schema
            .concrete_name(canonical)
            .map(str::to_owned)
            .ok_or_else(|| {
                SchemaError::missing_landmark(schema.name().to_owned(), canonical.to_owned()).into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_layouts_have_expected_sizes() {
        let registry = SchemaRegistry::with_builtins();
        assert_eq!(registry.get(SchemaId(1)).unwrap().len(), 17);
        assert_eq!(registry.get(SchemaId(2)).unwrap().len(), 33);
        assert_eq!(registry.get(SchemaId(1)).unwrap().depth(), DepthKind::Inferred);
        assert_eq!(registry.get(SchemaId(2)).unwrap().depth(), DepthKind::Measured);
    }

    #[test]
    fn test_registry_is_append_only() {
        let mut registry = SchemaRegistry::with_builtins();
        let err = registry.register(PoseSchema::coco17(SchemaId(1))).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        assert!(!err.is_recoverable());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unknown_schema_fails_fast() {
        let registry = SchemaRegistry::with_builtins();
        let err = registry
            .resolve_joint(Joint::LeftElbow, SchemaId(99))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Schema(SchemaError::UnsupportedSchema { id: 99 })
        ));
    }

    #[test]
    fn test_resolve_joint_returns_ordered_names() {
        let registry = SchemaRegistry::with_builtins();
        let resolved = registry
            .resolve_joint(Joint::LeftElbow, SchemaId(1))
            .unwrap();
        assert_eq!(resolved.proximal, "left_shoulder");
        assert_eq!(resolved.vertex, "left_elbow");
        assert_eq!(resolved.distal, "left_wrist");
    }

    #[test]
    fn test_ankle_needs_a_foot_landmark() {
        // The 17-landmark layout has no foot landmark, so ankle joints
        // cannot be resolved against it; the 33-landmark layout can.
        let registry = SchemaRegistry::with_builtins();
        let err = registry
            .resolve_joint(Joint::LeftAnkle, SchemaId(1))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Schema(SchemaError::MissingLandmark { .. })
        ));
        assert!(registry.resolve_joint(Joint::LeftAnkle, SchemaId(2)).is_ok());
    }

    #[test]
    fn test_unknown_logical_name_is_reported() {
        let registry = SchemaRegistry::with_builtins();
        let err = registry.resolve_named("left_wing", SchemaId(1)).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Schema(SchemaError::UnknownJoint { .. })
        ));
    }

    #[test]
    fn test_concrete_name_passes_unaliased_names_through() {
        let schema = PoseSchema::coco17(SchemaId(1));
        assert_eq!(schema.concrete_name("nose"), Some("nose"));
        assert_eq!(schema.concrete_name("left_wing"), None);
    }

    #[test]
    fn test_conventions_map_points_into_canonical_space() {
        use nalgebra::Point3;
        let p = Point3::new(1.0, 2.0, 3.0);
        assert_eq!(CoordinateConvention::RightHandedYUp.point_to_canonical(p), p);
        assert_eq!(
            CoordinateConvention::LeftHandedYDown.point_to_canonical(p),
            Point3::new(1.0, -2.0, 3.0)
        );
        assert_eq!(
            CoordinateConvention::LeftHandedZMirrored.point_to_canonical(p),
            Point3::new(1.0, 2.0, -3.0)
        );
    }

    #[test]
    fn test_schemas_default_to_the_canonical_convention() {
        assert!(PoseSchema::coco17(SchemaId(1)).convention().is_canonical());
        let schema = PoseSchema::motion33(SchemaId(2))
            .with_convention(CoordinateConvention::LeftHandedYDown);
        assert_eq!(schema.convention(), CoordinateConvention::LeftHandedYDown);
    }

    #[test]
    fn test_set_conversion_keeps_names_and_confidence() {
        use nalgebra::Point3;
        let set = crate::pose::LandmarkSet::new(42)
            .with("left_wrist", Point3::new(-0.2, 1.1, 0.3), 0.7);
        let canonical = CoordinateConvention::LeftHandedZMirrored.set_to_canonical(&set);
        assert_eq!(canonical.timestamp_ms(), 42);
        let lm = canonical.get("left_wrist").unwrap();
        assert_eq!(lm.position, Point3::new(-0.2, 1.1, -0.3));
        assert_eq!(lm.confidence, 0.7);
    }

    #[test]
    fn test_aliases_map_canonical_names() {
        let mut registry = SchemaRegistry::new();
        let schema = PoseSchema::new(
            SchemaId(7),
            "clinical",
            vec!["LSHO".into(), "LELB".into(), "LWRI".into()],
            DepthKind::Measured,
        )
        .with_aliases(
            [
                ("left_shoulder".to_string(), "LSHO".to_string()),
                ("left_elbow".to_string(), "LELB".to_string()),
                ("left_wrist".to_string(), "LWRI".to_string()),
            ]
            .into(),
        );
        registry.register(schema).unwrap();

        let resolved = registry
            .resolve_joint(Joint::LeftElbow, SchemaId(7))
            .unwrap();
        assert_eq!(resolved.proximal, "LSHO");
        assert_eq!(resolved.vertex, "LELB");
        assert_eq!(resolved.distal, "LWRI");
    }

    #[test]
    fn test_frame_resolution_produces_midpoint_anchors() {
        let registry = SchemaRegistry::with_builtins();
        let resolved = registry
            .resolve_frame(FrameKind::Pelvis, SchemaId(1))
            .unwrap();
        assert_eq!(resolved.anchors[0], Anchor::Point("left_hip".into()));
        assert_eq!(
            resolved.anchors[2],
            Anchor::Midpoint("left_shoulder".into(), "right_shoulder".into())
        );
    }

    #[test]
    fn test_anchor_lookup_takes_min_confidence_of_pair() {
        use nalgebra::Point3;
        let set = crate::pose::LandmarkSet::new(0)
            .with("left_hip", Point3::new(-0.2, 1.0, 0.0), 0.9)
            .with("right_hip", Point3::new(0.2, 1.0, 0.0), 0.4);
        let anchor = Anchor::Midpoint("left_hip".into(), "right_hip".into());
        let (mid, conf) = anchor.lookup(&set).unwrap();
        assert_eq!(mid, Point3::new(0.0, 1.0, 0.0));
        assert_eq!(conf, 0.4);
    }

    #[test]
    fn test_anchor_lookup_reports_missing_landmark() {
        let set = crate::pose::LandmarkSet::new(0);
        let anchor = Anchor::Point("left_hip".into());
        let err = anchor.lookup(&set).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Schema(SchemaError::MissingLandmark { .. })
        ));
    }
}
