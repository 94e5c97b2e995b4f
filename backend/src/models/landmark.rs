//! Landmark, image and camera view types.
//!
//! Coordinates are normalized image-space values: `x` grows to the right,
//! `y` grows downward, both in `[0, 1]`. Lateral views expose the landmarks of
//! the side facing the camera.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::algorithms::geometry::Point;

crate::define_id_type!(i64, ImageId);

/// Fixed camera views of a postural assessment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum View {
    Anterior,
    Posterior,
    LateralLeft,
    LateralRight,
}

impl View {
    /// All views in canonical order.
    pub const ALL: [View; 4] = [
        View::Anterior,
        View::Posterior,
        View::LateralLeft,
        View::LateralRight,
    ];

    /// Side of the body facing the camera in a lateral view.
    pub fn visible_side(self) -> Option<Side> {
        match self {
            View::LateralLeft => Some(Side::Left),
            View::LateralRight => Some(Side::Right),
            _ => None,
        }
    }

    /// Sign of the patient's forward direction along the image x axis.
    ///
    /// Frontal views have no forward axis and return `0.0`.
    pub fn forward_sign(self) -> f64 {
        match self {
            View::LateralLeft => -1.0,
            View::LateralRight => 1.0,
            _ => 0.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            View::Anterior => "Anterior",
            View::Posterior => "Posterior",
            View::LateralLeft => "Left lateral",
            View::LateralRight => "Right lateral",
        }
    }
}

impl std::fmt::Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Body side.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Anatomical landmark names produced by the detector.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkName {
    Nose,
    EyeLeft,
    EyeRight,
    EarLeft,
    EarRight,
    C7,
    T8,
    T12,
    L3,
    Sacrum,
    ShoulderLeft,
    ShoulderRight,
    AsisLeft,
    AsisRight,
    PsisLeft,
    PsisRight,
    HipLeft,
    HipRight,
    KneeLeft,
    KneeRight,
    CalfLeft,
    CalfRight,
    AnkleLeft,
    AnkleRight,
    HeelLeft,
    HeelRight,
}

impl LandmarkName {
    pub const ALL: [LandmarkName; 26] = [
        LandmarkName::Nose,
        LandmarkName::EyeLeft,
        LandmarkName::EyeRight,
        LandmarkName::EarLeft,
        LandmarkName::EarRight,
        LandmarkName::C7,
        LandmarkName::T8,
        LandmarkName::T12,
        LandmarkName::L3,
        LandmarkName::Sacrum,
        LandmarkName::ShoulderLeft,
        LandmarkName::ShoulderRight,
        LandmarkName::AsisLeft,
        LandmarkName::AsisRight,
        LandmarkName::PsisLeft,
        LandmarkName::PsisRight,
        LandmarkName::HipLeft,
        LandmarkName::HipRight,
        LandmarkName::KneeLeft,
        LandmarkName::KneeRight,
        LandmarkName::CalfLeft,
        LandmarkName::CalfRight,
        LandmarkName::AnkleLeft,
        LandmarkName::AnkleRight,
        LandmarkName::HeelLeft,
        LandmarkName::HeelRight,
    ];

    /// Side of a bilateral landmark, `None` for midline landmarks.
    pub fn side(self) -> Option<Side> {
        use LandmarkName::*;
        match self {
            EyeLeft | EarLeft | ShoulderLeft | AsisLeft | PsisLeft | HipLeft | KneeLeft
            | CalfLeft | AnkleLeft | HeelLeft => Some(Side::Left),
            EyeRight | EarRight | ShoulderRight | AsisRight | PsisRight | HipRight | KneeRight
            | CalfRight | AnkleRight | HeelRight => Some(Side::Right),
            Nose | C7 | T8 | T12 | L3 | Sacrum => None,
        }
    }

    /// Views in which the detector can place this landmark.
    pub fn views(self) -> &'static [View] {
        use LandmarkName::*;
        const FRONTAL: &[View] = &[View::Anterior, View::Posterior];
        const ANTERIOR: &[View] = &[View::Anterior];
        const POSTERIOR: &[View] = &[View::Posterior];
        const SPINE: &[View] = &[View::Posterior, View::LateralLeft, View::LateralRight];
        const ALL_LEFT: &[View] = &[View::Anterior, View::Posterior, View::LateralLeft];
        const ALL_RIGHT: &[View] = &[View::Anterior, View::Posterior, View::LateralRight];
        const ANTERIOR_LEFT: &[View] = &[View::Anterior, View::LateralLeft];
        const ANTERIOR_RIGHT: &[View] = &[View::Anterior, View::LateralRight];
        const POSTERIOR_LEFT: &[View] = &[View::Posterior, View::LateralLeft];
        const POSTERIOR_RIGHT: &[View] = &[View::Posterior, View::LateralRight];
        match self {
            Nose => ANTERIOR,
            EyeLeft | EyeRight => ANTERIOR,
            EarLeft => ALL_LEFT,
            EarRight => ALL_RIGHT,
            C7 | T8 | T12 | L3 | Sacrum => SPINE,
            ShoulderLeft | HipLeft | KneeLeft | AnkleLeft => ALL_LEFT,
            ShoulderRight | HipRight | KneeRight | AnkleRight => ALL_RIGHT,
            AsisLeft => ANTERIOR_LEFT,
            AsisRight => ANTERIOR_RIGHT,
            PsisLeft => POSTERIOR_LEFT,
            PsisRight => POSTERIOR_RIGHT,
            CalfLeft | CalfRight | HeelLeft | HeelRight => POSTERIOR,
        }
    }

    pub fn applies_to(self, view: View) -> bool {
        self.views().contains(&view)
    }

    /// Landmarks applicable to a view, in canonical order.
    pub fn for_view(view: View) -> Vec<LandmarkName> {
        Self::ALL
            .iter()
            .copied()
            .filter(|name| name.applies_to(view))
            .collect()
    }
}

/// Bilateral body parts, resolved to a concrete landmark by side.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BodyPart {
    Eye,
    Ear,
    Shoulder,
    Asis,
    Psis,
    Hip,
    Knee,
    Calf,
    Ankle,
    Heel,
}

impl BodyPart {
    pub fn on(self, side: Side) -> LandmarkName {
        use LandmarkName::*;
        match (self, side) {
            (BodyPart::Eye, Side::Left) => EyeLeft,
            (BodyPart::Eye, Side::Right) => EyeRight,
            (BodyPart::Ear, Side::Left) => EarLeft,
            (BodyPart::Ear, Side::Right) => EarRight,
            (BodyPart::Shoulder, Side::Left) => ShoulderLeft,
            (BodyPart::Shoulder, Side::Right) => ShoulderRight,
            (BodyPart::Asis, Side::Left) => AsisLeft,
            (BodyPart::Asis, Side::Right) => AsisRight,
            (BodyPart::Psis, Side::Left) => PsisLeft,
            (BodyPart::Psis, Side::Right) => PsisRight,
            (BodyPart::Hip, Side::Left) => HipLeft,
            (BodyPart::Hip, Side::Right) => HipRight,
            (BodyPart::Knee, Side::Left) => KneeLeft,
            (BodyPart::Knee, Side::Right) => KneeRight,
            (BodyPart::Calf, Side::Left) => CalfLeft,
            (BodyPart::Calf, Side::Right) => CalfRight,
            (BodyPart::Ankle, Side::Left) => AnkleLeft,
            (BodyPart::Ankle, Side::Right) => AnkleRight,
            (BodyPart::Heel, Side::Left) => HeelLeft,
            (BodyPart::Heel, Side::Right) => HeelRight,
        }
    }
}

/// A detected (or manually placed) anatomical landmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Landmark {
    pub name: LandmarkName,
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
    pub confidence: f64,
    #[serde(default)]
    pub is_manual: bool,
    /// Detector position before the first manual edit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_y: Option<f64>,
}

impl Landmark {
    pub fn new(name: LandmarkName, x: f64, y: f64, confidence: f64) -> Self {
        Self {
            name,
            x,
            y,
            z: None,
            confidence,
            is_manual: false,
            original_x: None,
            original_y: None,
        }
    }

    pub fn with_z(mut self, z: f64) -> Self {
        self.z = Some(z);
        self
    }

    pub fn point(&self) -> Point {
        Point {
            x: self.x,
            y: self.y,
            z: self.z,
        }
    }

    pub fn is_confident(&self, min_confidence: f64) -> bool {
        self.confidence >= min_confidence
    }

    /// Move the landmark to a practitioner-chosen position.
    ///
    /// The detector position is kept from the first edit only; later edits
    /// overwrite the position but never the original.
    pub fn apply_manual_override(&mut self, x: f64, y: f64) {
        if !self.is_manual {
            self.original_x = Some(self.x);
            self.original_y = Some(self.y);
        }
        self.x = x;
        self.y = y;
        self.is_manual = true;
        self.confidence = 1.0;
    }
}

/// Metadata reported by the landmark detector for one image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorMetadata {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub model_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Whether landmark detection has run on an image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStatus {
    pub analyzed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detector: Option<DetectorMetadata>,
}

/// A photograph of one view with its landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ImageId>,
    pub view: View,
    #[serde(default)]
    pub landmarks: Vec<Landmark>,
    #[serde(default)]
    pub status: AnalysisStatus,
}

impl Image {
    pub fn new(view: View) -> Self {
        Self {
            id: None,
            view,
            landmarks: Vec::new(),
            status: AnalysisStatus::default(),
        }
    }

    /// Record detector output. Landmarks with a repeated name replace the
    /// earlier entry so names stay unique.
    pub fn with_detection(
        mut self,
        landmarks: Vec<Landmark>,
        detector: DetectorMetadata,
        analyzed_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.landmarks.clear();
        for landmark in landmarks {
            self.upsert_landmark(landmark);
        }
        self.status = AnalysisStatus {
            analyzed: true,
            analyzed_at,
            detector: Some(detector),
        };
        self
    }

    pub fn is_analyzed(&self) -> bool {
        self.status.analyzed
    }

    pub fn landmark(&self, name: LandmarkName) -> Option<&Landmark> {
        self.landmarks.iter().find(|l| l.name == name)
    }

    pub fn landmark_mut(&mut self, name: LandmarkName) -> Option<&mut Landmark> {
        self.landmarks.iter_mut().find(|l| l.name == name)
    }

    pub fn upsert_landmark(&mut self, landmark: Landmark) {
        match self.landmark_mut(landmark.name) {
            Some(existing) => *existing = landmark,
            None => self.landmarks.push(landmark),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_serializes_screaming_case() {
        let json = serde_json::to_string(&View::LateralLeft).unwrap();
        assert_eq!(json, "\"LATERAL_LEFT\"");
        let view: View = serde_json::from_str("\"POSTERIOR\"").unwrap();
        assert_eq!(view, View::Posterior);
    }

    #[test]
    fn test_landmark_names_snake_case() {
        let json = serde_json::to_string(&LandmarkName::ShoulderLeft).unwrap();
        assert_eq!(json, "\"shoulder_left\"");
        let name: LandmarkName = serde_json::from_str("\"c7\"").unwrap();
        assert_eq!(name, LandmarkName::C7);
    }

    #[test]
    fn test_lateral_views_only_expose_visible_side() {
        let left = LandmarkName::for_view(View::LateralLeft);
        assert!(left.contains(&LandmarkName::ShoulderLeft));
        assert!(!left.contains(&LandmarkName::ShoulderRight));
        assert!(left.contains(&LandmarkName::C7));
        assert!(!left.contains(&LandmarkName::Nose));
    }

    #[test]
    fn test_body_part_resolves_side() {
        assert_eq!(BodyPart::Knee.on(Side::Left), LandmarkName::KneeLeft);
        assert_eq!(BodyPart::Heel.on(Side::Right), LandmarkName::HeelRight);
        assert_eq!(LandmarkName::HeelRight.side(), Some(Side::Right));
        assert_eq!(LandmarkName::Sacrum.side(), None);
    }

    #[test]
    fn test_manual_override_keeps_first_original() {
        let mut landmark = Landmark::new(LandmarkName::KneeLeft, 0.4, 0.7, 0.6);
        landmark.apply_manual_override(0.41, 0.71);
        landmark.apply_manual_override(0.42, 0.72);

        assert!(landmark.is_manual);
        assert_eq!(landmark.original_x, Some(0.4));
        assert_eq!(landmark.original_y, Some(0.7));
        assert_eq!(landmark.x, 0.42);
        assert_eq!(landmark.y, 0.72);
    }

    #[test]
    fn test_with_detection_keeps_names_unique() {
        let image = Image::new(View::Anterior).with_detection(
            vec![
                Landmark::new(LandmarkName::Nose, 0.5, 0.1, 0.5),
                Landmark::new(LandmarkName::Nose, 0.52, 0.1, 0.9),
            ],
            DetectorMetadata::default(),
            None,
        );

        assert!(image.is_analyzed());
        assert_eq!(image.landmarks.len(), 1);
        assert_eq!(image.landmark(LandmarkName::Nose).unwrap().confidence, 0.9);
    }
}
