//! Geometric framing rules for pose skeletons and face boxes.
//!
//! The same ordered check tables back both entry points: live evaluation
//! stops at the first rule that maps to an [`AlignmentStatus`], still
//! evaluation collects every rule that fails.

use crate::thresholds::Thresholds;
use crate::types::{
    AlignmentStatus, BoundingBox, FaceLandmarks, FrameDims, LandmarkFrame, LandmarkPoint,
    PoseLandmark, PoseLandmarks, Subject, Warning, WarningKind,
};

struct PoseContext<'a> {
    pose: &'a PoseLandmarks,
    face: Option<&'a FaceLandmarks>,
    t: &'a Thresholds,
}

impl PoseContext<'_> {
    fn visible(&self, landmark: PoseLandmark) -> Option<&LandmarkPoint> {
        self.pose.visible(landmark, self.t.min_visibility)
    }

    fn shoulders(&self) -> Option<(&LandmarkPoint, &LandmarkPoint)> {
        Some((
            self.visible(PoseLandmark::LeftShoulder)?,
            self.visible(PoseLandmark::RightShoulder)?,
        ))
    }
}

struct BoxContext<'a> {
    face: &'a BoundingBox,
    t: &'a Thresholds,
}

type PoseCheck = fn(&PoseContext<'_>) -> Option<WarningKind>;
type BoxCheck = fn(&BoxContext<'_>) -> Option<WarningKind>;

/// Pose rules, highest priority first.
const POSE_CHECKS: [PoseCheck; 10] = [
    check_head_crop,
    check_head_tilt,
    check_face_direction,
    check_shoulders,
    check_hands,
    check_lower_body,
    check_left_arm,
    check_right_arm,
    check_pose_size,
    check_pose_center,
];

/// Face-box rules, highest priority first.
const BOX_CHECKS: [BoxCheck; 4] = [
    check_box_head_crop,
    check_box_tilt,
    check_box_size,
    check_box_center,
];

// --- Shared geometry ---

fn is_head_cropped(y: f32, t: &Thresholds) -> bool {
    y < t.head_crop_y
}

/// Vertical over horizontal offset between two eyes, in normalized coordinates.
fn tilt_ratio(a: &LandmarkPoint, b: &LandmarkPoint) -> Option<f32> {
    let dx = (b.x - a.x).abs();
    let dy = (b.y - a.y).abs();
    (dx > f32::EPSILON).then(|| dy / dx)
}

fn is_tilted(a: &LandmarkPoint, b: &LandmarkPoint, t: &Thresholds) -> bool {
    tilt_ratio(a, b).is_some_and(|ratio| ratio > t.max_tilt_ratio)
}

fn outside_margin(v: f32, t: &Thresholds) -> bool {
    v < t.edge_margin || v > 1.0 - t.edge_margin
}

/// Horizontal nose offset from the cheek midpoint, normalized by face width.
fn gaze_offset(face: &FaceLandmarks) -> Option<f32> {
    let width = (face.right_cheek.x - face.left_cheek.x).abs();
    if width <= f32::EPSILON {
        return None;
    }
    let mid = (face.left_cheek.x + face.right_cheek.x) / 2.0;
    Some((face.nose_tip.x - mid).abs() / width)
}

fn size_finding(value: f32, min: f32, max: f32) -> Option<WarningKind> {
    if value < min {
        Some(WarningKind::TooSmall)
    } else if value > max {
        Some(WarningKind::TooLarge)
    } else {
        None
    }
}

// --- Pose rules ---

fn check_head_crop(ctx: &PoseContext<'_>) -> Option<WarningKind> {
    PoseLandmark::HEAD
        .iter()
        .filter_map(|&lm| ctx.pose.get(lm))
        .any(|p| is_head_cropped(p.y, ctx.t))
        .then_some(WarningKind::HeadCropped)
}

fn check_head_tilt(ctx: &PoseContext<'_>) -> Option<WarningKind> {
    let left = ctx.visible(PoseLandmark::LeftEye)?;
    let right = ctx.visible(PoseLandmark::RightEye)?;
    is_tilted(left, right, ctx.t).then_some(WarningKind::HeadTilted)
}

fn check_face_direction(ctx: &PoseContext<'_>) -> Option<WarningKind> {
    let offset = gaze_offset(ctx.face?)?;
    (offset > ctx.t.max_gaze_offset).then_some(WarningKind::NotLookingAtCamera)
}

fn check_shoulders(ctx: &PoseContext<'_>) -> Option<WarningKind> {
    ctx.shoulders()
        .is_none()
        .then_some(WarningKind::ShouldersNotVisible)
}

fn check_hands(ctx: &PoseContext<'_>) -> Option<WarningKind> {
    match (
        ctx.visible(PoseLandmark::LeftWrist),
        ctx.visible(PoseLandmark::RightWrist),
    ) {
        (None, None) => Some(WarningKind::HandsNotVisible),
        (Some(_), None) | (None, Some(_)) => Some(WarningKind::OneHandVisible),
        (Some(left), Some(right)) => (left.distance(right) > ctx.t.max_wrist_distance)
            .then_some(WarningKind::HandsNotClasped),
    }
}

/// Waist-up framing is fine: knees may be missing as long as a hip shows.
fn check_lower_body(ctx: &PoseContext<'_>) -> Option<WarningKind> {
    let any_visible = |lms: [PoseLandmark; 2]| lms.iter().any(|&lm| ctx.visible(lm).is_some());
    let knees = any_visible([PoseLandmark::LeftKnee, PoseLandmark::RightKnee]);
    let hips = any_visible([PoseLandmark::LeftHip, PoseLandmark::RightHip]);
    (!knees && !hips).then_some(WarningKind::BodyNotVisible)
}

fn check_left_arm(ctx: &PoseContext<'_>) -> Option<WarningKind> {
    let elbow = ctx.visible(PoseLandmark::LeftElbow)?;
    outside_margin(elbow.x, ctx.t).then_some(WarningKind::LeftArmCut)
}

fn check_right_arm(ctx: &PoseContext<'_>) -> Option<WarningKind> {
    let elbow = ctx.visible(PoseLandmark::RightElbow)?;
    outside_margin(elbow.x, ctx.t).then_some(WarningKind::RightArmCut)
}

fn check_pose_size(ctx: &PoseContext<'_>) -> Option<WarningKind> {
    let (left, right) = ctx.shoulders()?;
    let framing = &ctx.t.pose;
    size_finding(
        (left.x - right.x).abs(),
        framing.min_shoulder_width,
        framing.max_shoulder_width,
    )
}

fn check_pose_center(ctx: &PoseContext<'_>) -> Option<WarningKind> {
    let (left, right) = ctx.shoulders()?;
    let mid = (left.x + right.x) / 2.0;
    ((mid - 0.5).abs() > ctx.t.pose.max_center_offset).then_some(WarningKind::OffCenter)
}

// --- Face-box rules ---

fn check_box_head_crop(ctx: &BoxContext<'_>) -> Option<WarningKind> {
    is_head_cropped(ctx.face.y, ctx.t).then_some(WarningKind::HeadCropped)
}

fn check_box_tilt(ctx: &BoxContext<'_>) -> Option<WarningKind> {
    let (left, right) = ctx.face.eyes()?;
    is_tilted(&left, &right, ctx.t).then_some(WarningKind::HeadTilted)
}

fn check_box_size(ctx: &BoxContext<'_>) -> Option<WarningKind> {
    let framing = &ctx.t.face_box;
    let guide_area = framing.guide.area();
    if guide_area <= 0.0 {
        return None;
    }
    size_finding(
        ctx.face.area() / guide_area,
        framing.min_area_ratio,
        framing.max_area_ratio,
    )
}

fn check_box_center(ctx: &BoxContext<'_>) -> Option<WarningKind> {
    let framing = &ctx.t.face_box;
    let (cx, cy) = ctx.face.center();
    let (gx, gy) = framing.guide.center();
    let off_x = (cx - gx).abs() / framing.guide.width;
    let off_y = (cy - gy).abs() / framing.guide.height;
    (off_x > framing.max_center_offset || off_y > framing.max_center_offset)
        .then_some(WarningKind::OffCenter)
}

fn subject_count_finding(frame: &LandmarkFrame) -> Option<WarningKind> {
    match frame.subject_count {
        0 => Some(WarningKind::NoSubject),
        1 => None,
        _ => Some(WarningKind::MultipleSubjects),
    }
}

/// Pure framing evaluator over a fixed threshold table.
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    thresholds: Thresholds,
}

impl Evaluator {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// The single highest-priority problem with this frame, or `Perfect`.
    ///
    /// Every rule works on normalized landmark coordinates, so the verdict
    /// does not depend on the frame's pixel dimensions.
    pub fn evaluate_live(&self, frame: &LandmarkFrame, _dims: FrameDims) -> AlignmentStatus {
        if let Some(status) = subject_count_finding(frame).and_then(WarningKind::live_status) {
            return status;
        }
        let t = &self.thresholds;
        let first = match &frame.subject {
            None => return AlignmentStatus::NoSubject,
            Some(Subject::Pose { pose, face }) => {
                let ctx = PoseContext { pose, face: face.as_ref(), t };
                POSE_CHECKS
                    .iter()
                    .filter_map(|check| check(&ctx))
                    .find_map(WarningKind::live_status)
            }
            Some(Subject::FaceBox(face)) => {
                let ctx = BoxContext { face, t };
                BOX_CHECKS
                    .iter()
                    .filter_map(|check| check(&ctx))
                    .find_map(WarningKind::live_status)
            }
        };
        first.unwrap_or(AlignmentStatus::Perfect)
    }

    /// Every rule this frame violates, in priority order.
    pub fn evaluate_still(&self, frame: &LandmarkFrame, _dims: FrameDims) -> Vec<Warning> {
        let t = &self.thresholds;
        let mut kinds: Vec<WarningKind> = subject_count_finding(frame).into_iter().collect();
        match &frame.subject {
            None => {
                if kinds.is_empty() {
                    kinds.push(WarningKind::NoSubject);
                }
            }
            Some(Subject::Pose { pose, face }) => {
                let ctx = PoseContext { pose, face: face.as_ref(), t };
                kinds.extend(POSE_CHECKS.iter().filter_map(|check| check(&ctx)));
            }
            Some(Subject::FaceBox(face)) => {
                let ctx = BoxContext { face, t };
                kinds.extend(BOX_CHECKS.iter().filter_map(|check| check(&ctx)));
            }
        }
        kinds.into_iter().map(Warning::from).collect()
    }
}

/// [`Evaluator::evaluate_live`] with the default threshold table.
pub fn evaluate_live(frame: &LandmarkFrame, dims: FrameDims) -> AlignmentStatus {
    Evaluator::default().evaluate_live(frame, dims)
}

/// [`Evaluator::evaluate_still`] with the default threshold table.
pub fn evaluate_still(frame: &LandmarkFrame, dims: FrameDims) -> Vec<Warning> {
    Evaluator::default().evaluate_still(frame, dims)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::types::*;

    pub const DIMS: FrameDims = FrameDims { width: 1080, height: 1440 };

    fn pt(x: f32, y: f32) -> LandmarkPoint {
        LandmarkPoint::new(x, y).with_visibility(0.9)
    }

    /// A centred, waist-up subject with clasped hands.
    pub fn good_pose() -> PoseLandmarks {
        use PoseLandmark::*;
        PoseLandmarks::new()
            .with(Nose, pt(0.5, 0.25))
            .with(LeftEye, pt(0.47, 0.22))
            .with(RightEye, pt(0.53, 0.22))
            .with(LeftEar, pt(0.44, 0.23))
            .with(RightEar, pt(0.56, 0.23))
            .with(MouthLeft, pt(0.48, 0.28))
            .with(MouthRight, pt(0.52, 0.28))
            .with(LeftShoulder, pt(0.38, 0.4))
            .with(RightShoulder, pt(0.62, 0.4))
            .with(LeftElbow, pt(0.33, 0.55))
            .with(RightElbow, pt(0.67, 0.55))
            .with(LeftWrist, pt(0.46, 0.68))
            .with(RightWrist, pt(0.54, 0.68))
            .with(LeftHip, pt(0.42, 0.75))
            .with(RightHip, pt(0.58, 0.75))
    }

    pub fn good_face() -> FaceLandmarks {
        FaceLandmarks {
            nose_tip: pt(0.5, 0.25),
            left_cheek: pt(0.44, 0.25),
            right_cheek: pt(0.56, 0.25),
        }
    }

    pub fn good_frame() -> LandmarkFrame {
        LandmarkFrame::pose(1, good_pose(), Some(good_face()))
    }

    /// Face box that fills 80% of the default guide zone, centred on it.
    pub fn good_box() -> BoundingBox {
        BoundingBox {
            x: 0.3,
            y: 0.15,
            width: 0.4,
            height: 0.6,
            confidence: 0.95,
            landmarks: None,
        }
    }
}
