use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of points in the body topology emitted by pose detectors.
pub const POSE_LANDMARK_COUNT: usize = 33;

/// A landmark in normalized frame coordinates (`0.0..=1.0` on both axes).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LandmarkPoint {
    pub x: f32,
    pub y: f32,
    /// Detector confidence that the point is visible, when reported.
    pub visibility: Option<f32>,
}

impl LandmarkPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, visibility: None }
    }

    pub fn with_visibility(mut self, visibility: f32) -> Self {
        self.visibility = Some(visibility);
        self
    }

    /// Points without a reported visibility count as visible.
    pub fn is_visible(&self, min_visibility: f32) -> bool {
        self.visibility.map_or(true, |v| v > min_visibility)
    }

    /// Euclidean distance in normalized space.
    pub fn distance(&self, other: &LandmarkPoint) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Named points of the 33-point body topology.
///
/// "Left" and "right" are the subject's sides, not the viewer's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum PoseLandmark {
    Nose = 0,
    LeftEyeInner,
    LeftEye,
    LeftEyeOuter,
    RightEyeInner,
    RightEye,
    RightEyeOuter,
    LeftEar,
    RightEar,
    MouthLeft,
    MouthRight,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftPinky,
    RightPinky,
    LeftIndex,
    RightIndex,
    LeftThumb,
    RightThumb,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    LeftHeel,
    RightHeel,
    LeftFootIndex,
    RightFootIndex,
}

impl PoseLandmark {
    /// Landmarks that belong to the head, used by the head-crop check.
    pub const HEAD: [PoseLandmark; 11] = [
        PoseLandmark::Nose,
        PoseLandmark::LeftEyeInner,
        PoseLandmark::LeftEye,
        PoseLandmark::LeftEyeOuter,
        PoseLandmark::RightEyeInner,
        PoseLandmark::RightEye,
        PoseLandmark::RightEyeOuter,
        PoseLandmark::LeftEar,
        PoseLandmark::RightEar,
        PoseLandmark::MouthLeft,
        PoseLandmark::MouthRight,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Fixed-size, index-addressed set of pose landmarks for one subject.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseLandmarks {
    points: [Option<LandmarkPoint>; POSE_LANDMARK_COUNT],
}

impl Default for PoseLandmarks {
    fn default() -> Self {
        Self {
            points: [None; POSE_LANDMARK_COUNT],
        }
    }
}

impl PoseLandmarks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a detector's raw output, in topology order.
    /// Points beyond [`POSE_LANDMARK_COUNT`] are ignored.
    pub fn from_points(points: impl IntoIterator<Item = LandmarkPoint>) -> Self {
        let mut pose = Self::default();
        for (slot, point) in pose.points.iter_mut().zip(points) {
            *slot = Some(point);
        }
        pose
    }

    pub fn with(mut self, landmark: PoseLandmark, point: LandmarkPoint) -> Self {
        self.set(landmark, point);
        self
    }

    pub fn set(&mut self, landmark: PoseLandmark, point: LandmarkPoint) {
        self.points[landmark.index()] = Some(point);
    }

    pub fn remove(&mut self, landmark: PoseLandmark) {
        self.points[landmark.index()] = None;
    }

    pub fn get(&self, landmark: PoseLandmark) -> Option<&LandmarkPoint> {
        self.points[landmark.index()].as_ref()
    }

    /// The landmark, if present and above `min_visibility`.
    pub fn visible(&self, landmark: PoseLandmark, min_visibility: f32) -> Option<&LandmarkPoint> {
        self.get(landmark).filter(|p| p.is_visible(min_visibility))
    }
}

/// Face-mesh points used for the face-direction check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub nose_tip: LandmarkPoint,
    pub left_cheek: LandmarkPoint,
    pub right_cheek: LandmarkPoint,
}

/// Face rectangle from a single-face detector, in normalized coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Eye landmarks as points, when the detector supplied them.
    pub fn eyes(&self) -> Option<(LandmarkPoint, LandmarkPoint)> {
        self.landmarks.map(|lms| {
            (
                LandmarkPoint::new(lms[0].0, lms[0].1),
                LandmarkPoint::new(lms[1].0, lms[1].1),
            )
        })
    }
}

/// Normalized rectangle the face box is expected to fill.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GuideZone {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl GuideZone {
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Detector output for the primary subject.
#[derive(Debug, Clone, PartialEq)]
pub enum Subject {
    Pose {
        pose: PoseLandmarks,
        face: Option<FaceLandmarks>,
    },
    FaceBox(BoundingBox),
}

/// One tick's worth of detector output.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkFrame {
    /// How many subjects the detector saw (0, 1, or more).
    pub subject_count: usize,
    /// Landmarks of the primary subject, absent when nobody was detected.
    pub subject: Option<Subject>,
}

impl LandmarkFrame {
    pub fn empty() -> Self {
        Self {
            subject_count: 0,
            subject: None,
        }
    }

    pub fn pose(subject_count: usize, pose: PoseLandmarks, face: Option<FaceLandmarks>) -> Self {
        Self {
            subject_count,
            subject: Some(Subject::Pose { pose, face }),
        }
    }

    pub fn face_box(subject_count: usize, face: BoundingBox) -> Self {
        Self {
            subject_count,
            subject: Some(Subject::FaceBox(face)),
        }
    }
}

/// Pixel dimensions of the frame the landmarks were taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameDims {
    pub width: u32,
    pub height: u32,
}

impl FrameDims {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Borrowed RGB8 pixel data handed to landmark sources.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    /// Packed RGB, `width * height * 3` bytes.
    pub rgb: &'a [u8],
    pub width: u32,
    pub height: u32,
}

impl FrameView<'_> {
    pub fn dims(&self) -> FrameDims {
        FrameDims::new(self.width, self.height)
    }
}

/// Framing quality reported to the user during live capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentStatus {
    Initializing,
    NoSubject,
    MultipleSubjects,
    TooSmall,
    TooLarge,
    OffCenter,
    Tilted,
    HandsNotVisible,
    OneHandVisible,
    BodyNotVisible,
    Perfect,
    Manual,
}

impl AlignmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AlignmentStatus::Initializing => "initializing",
            AlignmentStatus::NoSubject => "no_subject",
            AlignmentStatus::MultipleSubjects => "multiple_subjects",
            AlignmentStatus::TooSmall => "too_small",
            AlignmentStatus::TooLarge => "too_large",
            AlignmentStatus::OffCenter => "off_center",
            AlignmentStatus::Tilted => "tilted",
            AlignmentStatus::HandsNotVisible => "hands_not_visible",
            AlignmentStatus::OneHandVisible => "one_hand_visible",
            AlignmentStatus::BodyNotVisible => "body_not_visible",
            AlignmentStatus::Perfect => "perfect",
            AlignmentStatus::Manual => "manual",
        }
    }
}

impl fmt::Display for AlignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCategory {
    Head,
    Hands,
    Body,
    Face,
    Dimensions,
    Pose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

/// One framing rule that a frame can violate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    NoSubject,
    MultipleSubjects,
    HeadCropped,
    HeadTilted,
    NotLookingAtCamera,
    ShouldersNotVisible,
    HandsNotVisible,
    OneHandVisible,
    HandsNotClasped,
    BodyNotVisible,
    LeftArmCut,
    RightArmCut,
    TooSmall,
    TooLarge,
    OffCenter,
    ImageTooSmall,
}

impl WarningKind {
    pub fn category(self) -> WarningCategory {
        match self {
            WarningKind::HeadCropped | WarningKind::HeadTilted => WarningCategory::Head,
            WarningKind::NotLookingAtCamera => WarningCategory::Face,
            WarningKind::HandsNotVisible
            | WarningKind::OneHandVisible
            | WarningKind::HandsNotClasped => WarningCategory::Hands,
            WarningKind::ShouldersNotVisible
            | WarningKind::BodyNotVisible
            | WarningKind::LeftArmCut
            | WarningKind::RightArmCut => WarningCategory::Body,
            WarningKind::NoSubject
            | WarningKind::MultipleSubjects
            | WarningKind::TooSmall
            | WarningKind::TooLarge
            | WarningKind::OffCenter => WarningCategory::Pose,
            WarningKind::ImageTooSmall => WarningCategory::Dimensions,
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            WarningKind::NoSubject
            | WarningKind::MultipleSubjects
            | WarningKind::HeadCropped
            | WarningKind::ShouldersNotVisible
            | WarningKind::BodyNotVisible
            | WarningKind::ImageTooSmall => Severity::Error,
            _ => Severity::Warning,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            WarningKind::NoSubject => "No person detected in the frame",
            WarningKind::MultipleSubjects => "More than one person is in the frame",
            WarningKind::HeadCropped => "The top of the head is cut off",
            WarningKind::HeadTilted => "Head is tilted, keep your eyes level",
            WarningKind::NotLookingAtCamera => "Face is turned away from the camera",
            WarningKind::ShouldersNotVisible => "Shoulders are not fully visible",
            WarningKind::HandsNotVisible => "Hands are not visible",
            WarningKind::OneHandVisible => "Only one hand is visible",
            WarningKind::HandsNotClasped => "Hands are apart, rest them together in front of you",
            WarningKind::BodyNotVisible => "Body is not visible from the waist up",
            WarningKind::LeftArmCut => "Left arm is cut off at the edge of the frame",
            WarningKind::RightArmCut => "Right arm is cut off at the edge of the frame",
            WarningKind::TooSmall => "Move closer to the camera",
            WarningKind::TooLarge => "Move further from the camera",
            WarningKind::OffCenter => "Center yourself in the frame",
            WarningKind::ImageTooSmall => "Image resolution is too low",
        }
    }

    /// Live status this rule reports, or `None` for still-only advisories.
    pub fn live_status(self) -> Option<AlignmentStatus> {
        match self {
            WarningKind::NoSubject => Some(AlignmentStatus::NoSubject),
            WarningKind::MultipleSubjects => Some(AlignmentStatus::MultipleSubjects),
            WarningKind::HeadCropped
            | WarningKind::LeftArmCut
            | WarningKind::RightArmCut
            | WarningKind::OffCenter => Some(AlignmentStatus::OffCenter),
            WarningKind::HeadTilted => Some(AlignmentStatus::Tilted),
            WarningKind::ShouldersNotVisible | WarningKind::BodyNotVisible => {
                Some(AlignmentStatus::BodyNotVisible)
            }
            WarningKind::HandsNotVisible => Some(AlignmentStatus::HandsNotVisible),
            WarningKind::OneHandVisible => Some(AlignmentStatus::OneHandVisible),
            WarningKind::TooSmall => Some(AlignmentStatus::TooSmall),
            WarningKind::TooLarge => Some(AlignmentStatus::TooLarge),
            WarningKind::NotLookingAtCamera
            | WarningKind::HandsNotClasped
            | WarningKind::ImageTooSmall => None,
        }
    }
}

/// Advisory shown in the review checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub category: WarningCategory,
    pub message: String,
    pub severity: Severity,
}

impl From<WarningKind> for Warning {
    fn from(kind: WarningKind) -> Self {
        Self {
            kind,
            category: kind.category(),
            message: kind.message().to_string(),
            severity: kind.severity(),
        }
    }
}

/// What the landmark source can do on this platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    PoseAndFace,
    FaceOnly,
    None,
}

impl Capability {
    pub fn supports_guidance(self) -> bool {
        !matches!(self, Capability::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_visibility_default_visible() {
        let p = LandmarkPoint::new(0.5, 0.5);
        assert!(p.is_visible(0.5));
        assert!(!p.with_visibility(0.4).is_visible(0.5));
        assert!(p.with_visibility(0.9).is_visible(0.5));
    }

    #[test]
    fn test_point_distance() {
        let a = LandmarkPoint::new(0.0, 0.0);
        let b = LandmarkPoint::new(0.3, 0.4);
        assert!((a.distance(&b) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_pose_from_points_fills_in_order() {
        let points = (0..POSE_LANDMARK_COUNT).map(|i| LandmarkPoint::new(i as f32 / 100.0, 0.0));
        let pose = PoseLandmarks::from_points(points);
        let wrist = pose.get(PoseLandmark::RightWrist).unwrap();
        assert!((wrist.x - 0.16).abs() < 1e-6);
    }

    #[test]
    fn test_pose_visible_filters_low_confidence() {
        let pose = PoseLandmarks::new()
            .with(PoseLandmark::LeftWrist, LandmarkPoint::new(0.4, 0.6).with_visibility(0.2));
        assert!(pose.get(PoseLandmark::LeftWrist).is_some());
        assert!(pose.visible(PoseLandmark::LeftWrist, 0.5).is_none());
        assert!(pose.visible(PoseLandmark::RightWrist, 0.5).is_none());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let value = toml::Value::try_from(AlignmentStatus::HandsNotVisible).unwrap();
        assert_eq!(value.as_str(), Some("hands_not_visible"));
        assert_eq!(AlignmentStatus::OneHandVisible.to_string(), "one_hand_visible");
    }

    #[test]
    fn test_warning_from_kind() {
        let w = Warning::from(WarningKind::ImageTooSmall);
        assert_eq!(w.category, WarningCategory::Dimensions);
        assert_eq!(w.severity, Severity::Error);
        assert!(WarningKind::ImageTooSmall.live_status().is_none());
    }

    #[test]
    fn test_box_geometry() {
        let b = BoundingBox {
            x: 0.2,
            y: 0.1,
            width: 0.4,
            height: 0.5,
            confidence: 0.9,
            landmarks: None,
        };
        assert!((b.area() - 0.2).abs() < 1e-6);
        let (cx, cy) = b.center();
        assert!((cx - 0.4).abs() < 1e-6);
        assert!((cy - 0.35).abs() < 1e-6);
        assert!(b.eyes().is_none());
    }
}
