//! Assessments, deviations and detector payload ingestion.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::catalog::DeviationType;
use super::landmark::{DetectorMetadata, Image, Landmark, LandmarkName, Side, View};
use super::severity::{self, MeasurementUnit, Severity};
use crate::algorithms::geometry::ScaleContext;
use crate::error::{EngineError, EngineResult};

crate::define_id_type!(i64, PatientId);
crate::define_id_type!(i64, AssessmentId);

/// Side or direction qualifier attached to a deviation.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DeviationDirection {
    #[default]
    Neutral,
    Left,
    Right,
    Forward,
    Backward,
    Increased,
    Decreased,
}

impl DeviationDirection {
    pub fn from_side(side: Side) -> Self {
        match side {
            Side::Left => DeviationDirection::Left,
            Side::Right => DeviationDirection::Right,
        }
    }

    pub fn side(self) -> Option<Side> {
        match self {
            DeviationDirection::Left => Some(Side::Left),
            DeviationDirection::Right => Some(Side::Right),
            _ => None,
        }
    }

    /// Direction relative to a normal range.
    pub fn relative_to_range(value: f64, min: f64, max: f64) -> Self {
        if value > max {
            DeviationDirection::Increased
        } else if value < min {
            DeviationDirection::Decreased
        } else {
            DeviationDirection::Neutral
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DeviationDirection::Neutral => "",
            DeviationDirection::Left => "left",
            DeviationDirection::Right => "right",
            DeviationDirection::Forward => "forward",
            DeviationDirection::Backward => "backward",
            DeviationDirection::Increased => "increased",
            DeviationDirection::Decreased => "decreased",
        }
    }
}

/// Identity of a deviation across assessments.
///
/// Side-specific types are keyed by side as well; the side of other types
/// may flip between assessments without breaking the match.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviationKey {
    pub view: View,
    pub deviation_type: DeviationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
}

/// One measured postural deviation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deviation {
    pub deviation_type: DeviationType,
    pub view: View,
    pub measurement_value: f64,
    pub measurement_unit: MeasurementUnit,
    pub normal_range_min: f64,
    pub normal_range_max: f64,
    pub deviation_amount: f64,
    pub severity: Severity,
    #[serde(default)]
    pub direction: DeviationDirection,
    /// Real-world size of a level difference, when the scale allows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measurement_cm: Option<f64>,
}

impl Deviation {
    /// Build a deviation from a raw measurement using the catalog range.
    pub fn from_measurement(
        deviation_type: DeviationType,
        view: View,
        measurement_value: f64,
        direction: DeviationDirection,
        scale: &ScaleContext,
    ) -> Self {
        let (normal_range_min, normal_range_max) = deviation_type.normal_range();
        let measurement_unit = deviation_type.unit();
        let measurement_cm = match measurement_unit {
            MeasurementUnit::LevelDifference => scale
                .to_centimeters(measurement_value)
                .map(|cm| cm.value()),
            MeasurementUnit::Degrees => None,
        };
        Self {
            deviation_type,
            view,
            measurement_value,
            measurement_unit,
            normal_range_min,
            normal_range_max,
            deviation_amount: 0.0,
            severity: Severity::Minimal,
            direction,
            measurement_cm,
        }
        .reclassified()
    }

    /// Recompute amount and severity from value, range and unit.
    pub fn reclassified(mut self) -> Self {
        self.deviation_amount = severity::deviation_amount(
            self.measurement_value,
            self.normal_range_min,
            self.normal_range_max,
        );
        self.severity = self
            .measurement_unit
            .thresholds()
            .classify(self.deviation_amount);
        self
    }

    pub fn is_out_of_range(&self) -> bool {
        self.deviation_amount > 0.0
    }

    pub fn key(&self) -> DeviationKey {
        let side = if self.deviation_type.is_side_specific() {
            self.direction.side()
        } else {
            None
        };
        DeviationKey {
            view: self.view,
            deviation_type: self.deviation_type,
            side,
        }
    }

    /// Amount expressed on the common scale used for aggregation.
    pub fn normalized_amount(&self) -> f64 {
        self.deviation_amount / self.measurement_unit.normalizer()
    }
}

/// A postural assessment: up to one image per view and derived deviations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AssessmentId>,
    pub patient_id: PatientId,
    pub assessment_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_height_cm: Option<f64>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub deviations: Vec<Deviation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Checksum of the landmarks the stored deviations were computed from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmark_checksum: Option<String>,
}

impl Assessment {
    pub fn new(patient_id: PatientId, assessment_date: DateTime<Utc>) -> Self {
        Self {
            id: None,
            patient_id,
            assessment_date,
            patient_height_cm: None,
            images: Vec::new(),
            completed: false,
            deviations: Vec::new(),
            overall_severity: None,
            summary: None,
            landmark_checksum: None,
        }
    }

    pub fn with_id(mut self, id: AssessmentId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn image(&self, view: View) -> Option<&Image> {
        self.images.iter().find(|i| i.view == view)
    }

    pub fn analyzed_images(&self) -> impl Iterator<Item = &Image> {
        self.images.iter().filter(|i| i.is_analyzed())
    }

    fn ensure_editable(&self) -> EngineResult<()> {
        if self.completed {
            return Err(EngineError::locked(self.id));
        }
        Ok(())
    }

    /// Attach an image, replacing any existing image of the same view.
    pub fn attach_image(&mut self, image: Image) -> EngineResult<()> {
        self.ensure_editable()?;
        match self.images.iter_mut().find(|i| i.view == image.view) {
            Some(existing) => *existing = image,
            None => self.images.push(image),
        }
        self.images.sort_by_key(|i| i.view);
        Ok(())
    }

    /// Move one landmark to a practitioner-chosen position.
    pub fn override_landmark(
        &mut self,
        view: View,
        name: LandmarkName,
        x: f64,
        y: f64,
    ) -> EngineResult<()> {
        self.ensure_editable()?;
        if !(0.0..=1.0).contains(&x) || !(0.0..=1.0).contains(&y) {
            return Err(EngineError::precondition(format!(
                "landmark position ({}, {}) outside normalized image space",
                x, y
            )));
        }
        let image = self
            .images
            .iter_mut()
            .find(|i| i.view == view)
            .ok_or_else(|| EngineError::precondition(format!("no {} image", view)))?;
        match image.landmark_mut(name) {
            Some(landmark) => landmark.apply_manual_override(x, y),
            None => {
                let mut landmark = Landmark::new(name, x, y, 1.0);
                landmark.is_manual = true;
                image.landmarks.push(landmark);
            }
        }
        Ok(())
    }

    /// Mark the assessment complete. Completion is terminal for edits.
    pub fn complete(&mut self) {
        self.completed = true;
    }

    pub fn deviations_for_view(&self, view: View) -> impl Iterator<Item = &Deviation> {
        self.deviations.iter().filter(move |d| d.view == view)
    }

    /// Checksum of the current landmarks of every analyzed image.
    pub fn compute_landmark_checksum(&self) -> String {
        landmark_checksum(&self.images)
    }

    /// Whether stored deviations were computed from the current landmarks.
    pub fn is_analysis_current(&self) -> bool {
        self.landmark_checksum.as_deref() == Some(self.compute_landmark_checksum().as_str())
    }
}

/// SHA-256 over the canonical JSON of every analyzed image's landmarks.
///
/// Images and landmarks are ordered by view and name first so the checksum
/// does not depend on collection order.
pub fn landmark_checksum(images: &[Image]) -> String {
    #[derive(Serialize)]
    struct CanonicalImage<'a> {
        view: View,
        landmarks: Vec<&'a Landmark>,
    }

    let mut canonical: Vec<CanonicalImage<'_>> = images
        .iter()
        .filter(|image| image.is_analyzed())
        .map(|image| {
            let mut landmarks: Vec<&Landmark> = image.landmarks.iter().collect();
            landmarks.sort_by_key(|l| l.name);
            CanonicalImage {
                view: image.view,
                landmarks,
            }
        })
        .collect();
    canonical.sort_by_key(|c| c.view);

    let content = serde_json::to_string(&canonical).unwrap_or_default();
    crate::db::checksum::calculate_checksum(&content)
}

// ============================================================================
// Detector payload parsing
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssessmentInput {
    id: Option<i64>,
    patient_id: i64,
    assessment_date: DateTime<Utc>,
    #[serde(default)]
    patient_height_cm: Option<f64>,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    images: Vec<ImageInput>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageInput {
    view: View,
    #[serde(default)]
    landmarks: Vec<LandmarkInput>,
    #[serde(default)]
    detector: Option<DetectorMetadata>,
    #[serde(default)]
    analyzed_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct LandmarkInput {
    name: LandmarkName,
    x: f64,
    y: f64,
    #[serde(default)]
    z: Option<f64>,
    confidence: f64,
}

fn validate_image_input(image: &ImageInput) -> Result<()> {
    let mut seen = HashSet::new();
    for landmark in &image.landmarks {
        if !seen.insert(landmark.name) {
            anyhow::bail!(
                "Duplicate landmark {:?} in {} image",
                landmark.name,
                image.view
            );
        }
        if !(0.0..=1.0).contains(&landmark.x) || !(0.0..=1.0).contains(&landmark.y) {
            anyhow::bail!(
                "Landmark {:?} in {} image has coordinates ({}, {}) outside [0, 1]",
                landmark.name,
                image.view,
                landmark.x,
                landmark.y
            );
        }
        if !(0.0..=1.0).contains(&landmark.confidence) {
            anyhow::bail!(
                "Landmark {:?} in {} image has confidence {} outside [0, 1]",
                landmark.name,
                image.view,
                landmark.confidence
            );
        }
        if !landmark.name.applies_to(image.view) {
            log::warn!(
                "Landmark {:?} is not expected in the {} view; it will be ignored by analysis",
                landmark.name,
                image.view
            );
        }
    }
    Ok(())
}

/// Parse an assessment with detector output from JSON.
///
/// Images with a `detector` block (or an `analyzedAt` timestamp) are marked
/// analyzed. At most one image per view is accepted and landmark names must
/// be unique within an image.
pub fn parse_assessment_json(json: &str) -> Result<Assessment> {
    let input: AssessmentInput =
        serde_json::from_str(json).context("Failed to deserialize assessment JSON")?;

    let mut views = HashSet::new();
    let mut images = Vec::with_capacity(input.images.len());
    for image_input in input.images {
        if !views.insert(image_input.view) {
            anyhow::bail!("More than one {} image in assessment", image_input.view);
        }
        validate_image_input(&image_input)?;

        let landmarks: Vec<Landmark> = image_input
            .landmarks
            .into_iter()
            .map(|l| {
                let landmark = Landmark::new(l.name, l.x, l.y, l.confidence);
                match l.z {
                    Some(z) => landmark.with_z(z),
                    None => landmark,
                }
            })
            .collect();

        let image = match (image_input.detector, image_input.analyzed_at) {
            (None, None) => {
                let mut image = Image::new(image_input.view);
                image.landmarks = landmarks;
                image
            }
            (detector, analyzed_at) => Image::new(image_input.view).with_detection(
                landmarks,
                detector.unwrap_or_default(),
                analyzed_at,
            ),
        };
        images.push(image);
    }
    images.sort_by_key(|i| i.view);

    Ok(Assessment {
        id: input.id.map(AssessmentId::new),
        patient_id: PatientId::new(input.patient_id),
        assessment_date: input.assessment_date,
        patient_height_cm: input.patient_height_cm,
        images,
        completed: input.completed,
        deviations: Vec::new(),
        overall_severity: None,
        summary: None,
        landmark_checksum: None,
    })
}

/// Parse an assessment payload from a file.
pub fn parse_assessment_file(path: &std::path::Path) -> Result<Assessment> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read assessment file {}", path.display()))?;
    parse_assessment_json(&content)
        .with_context(|| format!("Invalid assessment file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, 9, 0, 0).unwrap()
    }

    const PAYLOAD: &str = r#"{
        "id": 11,
        "patientId": 3,
        "assessmentDate": "2026-03-02T09:00:00Z",
        "patientHeightCm": 172.0,
        "completed": true,
        "images": [
            {
                "view": "POSTERIOR",
                "landmarks": [
                    {"name": "shoulder_left", "x": 0.4, "y": 0.3, "confidence": 0.9}
                ]
            },
            {
                "view": "ANTERIOR",
                "detector": {"method": "pose-v2", "modelVersion": "2.1.0", "processingTimeMs": 840, "warnings": []},
                "landmarks": [
                    {"name": "shoulder_left", "x": 0.6, "y": 0.40, "confidence": 0.9},
                    {"name": "shoulder_right", "x": 0.4, "y": 0.45, "z": 0.1, "confidence": 0.9}
                ]
            }
        ]
    }"#;

    #[test]
    fn test_parse_assessment_payload() {
        let assessment = parse_assessment_json(PAYLOAD).unwrap();
        assert_eq!(assessment.id, Some(AssessmentId::new(11)));
        assert_eq!(assessment.patient_id, PatientId::new(3));
        assert_eq!(assessment.patient_height_cm, Some(172.0));
        assert!(assessment.completed);
        assert_eq!(assessment.images.len(), 2);
        // Sorted by view order.
        assert_eq!(assessment.images[0].view, View::Anterior);
        assert!(assessment.images[0].is_analyzed());
        assert!(!assessment.images[1].is_analyzed());
        assert_eq!(
            assessment.images[0]
                .landmark(LandmarkName::ShoulderRight)
                .unwrap()
                .z,
            Some(0.1)
        );
        assert_eq!(assessment.analyzed_images().count(), 1);
    }

    #[test]
    fn test_parse_rejects_duplicate_view() {
        let json = r#"{
            "patientId": 1,
            "assessmentDate": "2026-03-02T09:00:00Z",
            "images": [{"view": "ANTERIOR"}, {"view": "ANTERIOR"}]
        }"#;
        let err = parse_assessment_json(json).unwrap_err();
        assert!(err.to_string().contains("More than one"));
    }

    #[test]
    fn test_parse_rejects_out_of_range_coordinates() {
        let json = r#"{
            "patientId": 1,
            "assessmentDate": "2026-03-02T09:00:00Z",
            "images": [{"view": "ANTERIOR", "landmarks": [
                {"name": "nose", "x": 1.4, "y": 0.1, "confidence": 0.9}
            ]}]
        }"#;
        assert!(parse_assessment_json(json).is_err());
    }

    #[test]
    fn test_parse_rejects_duplicate_landmark() {
        let json = r#"{
            "patientId": 1,
            "assessmentDate": "2026-03-02T09:00:00Z",
            "images": [{"view": "ANTERIOR", "landmarks": [
                {"name": "nose", "x": 0.5, "y": 0.1, "confidence": 0.9},
                {"name": "nose", "x": 0.5, "y": 0.1, "confidence": 0.8}
            ]}]
        }"#;
        assert!(parse_assessment_json(json).is_err());
    }

    #[test]
    fn test_completed_assessment_rejects_edits() {
        let mut assessment = Assessment::new(PatientId::new(1), date(1));
        assessment
            .attach_image(Image::new(View::Anterior))
            .unwrap();
        assessment.complete();

        let err = assessment
            .attach_image(Image::new(View::Posterior))
            .unwrap_err();
        assert_eq!(err.code(), "PRECONDITION_NOT_MET");
        assert!(assessment
            .override_landmark(View::Anterior, LandmarkName::Nose, 0.5, 0.1)
            .is_err());
    }

    #[test]
    fn test_override_landmark_records_original() {
        let mut assessment = Assessment::new(PatientId::new(1), date(1));
        let image = Image::new(View::Anterior).with_detection(
            vec![Landmark::new(LandmarkName::Nose, 0.5, 0.1, 0.4)],
            DetectorMetadata::default(),
            None,
        );
        assessment.attach_image(image).unwrap();
        assessment
            .override_landmark(View::Anterior, LandmarkName::Nose, 0.51, 0.12)
            .unwrap();

        let nose = assessment
            .image(View::Anterior)
            .and_then(|i| i.landmark(LandmarkName::Nose))
            .unwrap();
        assert!(nose.is_manual);
        assert_eq!(nose.original_x, Some(0.5));
        assert_eq!(nose.x, 0.51);
    }

    #[test]
    fn test_landmark_checksum_ignores_ordering() {
        let a = parse_assessment_json(PAYLOAD).unwrap();
        let mut b = a.clone();
        b.images[0].landmarks.reverse();
        assert_eq!(a.compute_landmark_checksum(), b.compute_landmark_checksum());

        b.images[0].landmarks[0].y += 0.01;
        assert_ne!(a.compute_landmark_checksum(), b.compute_landmark_checksum());
    }

    #[test]
    fn test_deviation_from_measurement_classifies() {
        let deviation = Deviation::from_measurement(
            DeviationType::ShoulderUneven,
            View::Anterior,
            0.05,
            DeviationDirection::Right,
            &ScaleContext::unscaled(),
        );
        assert!((deviation.deviation_amount - 0.03).abs() < 1e-12);
        assert_eq!(deviation.severity, Severity::Mild);
        assert!(deviation.measurement_cm.is_none());
        assert_eq!(deviation.key().side, None);
    }

    #[test]
    fn test_side_specific_key_includes_side() {
        let deviation = Deviation::from_measurement(
            DeviationType::KneeValgus,
            View::Anterior,
            9.0,
            DeviationDirection::Left,
            &ScaleContext::unscaled(),
        );
        assert_eq!(deviation.key().side, Some(Side::Left));
        assert_eq!(deviation.severity, Severity::Mild);
    }
}
