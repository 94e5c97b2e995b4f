//! Public API surface of the engine.
//!
//! This file consolidates the result records returned to the service layer.
//! All types derive Serialize/Deserialize for JSON serialization.

pub use crate::algorithms::geometry::ScaleContext;
pub use crate::models::{
    Assessment, AssessmentId, BodyRegion, Deviation, DeviationDirection, DeviationKey,
    DeviationType, Image, ImageId, Landmark, LandmarkName, MeasurementUnit, PatientId, Severity,
    Side, View,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =========================================================
// Analysis
// =========================================================

/// Why a deviation type could not be measured.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    MissingLandmark,
    LowConfidence,
    DegenerateGeometry,
}

/// Non-fatal insufficient-data notice recorded by the analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisWarning {
    pub view: View,
    pub deviation_type: DeviationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
    pub kind: WarningKind,
    /// Landmarks responsible for the warning.
    #[serde(default)]
    pub landmarks: Vec<LandmarkName>,
    pub message: String,
}

/// Result of analyzing a single view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewAnalysis {
    pub view: View,
    pub deviations: Vec<Deviation>,
    pub warnings: Vec<AnalysisWarning>,
    pub scale: ScaleContext,
}

/// Result of analyzing a whole assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentAnalysis {
    pub deviations: Vec<Deviation>,
    pub overall_severity: Severity,
    pub summary: String,
    pub warnings: Vec<AnalysisWarning>,
    /// Checksum of the landmarks the deviations were computed from.
    pub landmark_checksum: String,
}

// =========================================================
// Comparison
// =========================================================

/// Classification of one deviation between two assessments.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonStatus {
    Improved,
    Worsened,
    Stable,
    Resolved,
    New,
    /// The view was analyzed on only one of the two visits.
    NotMeasured,
}

impl ComparisonStatus {
    pub fn label(self) -> &'static str {
        match self {
            ComparisonStatus::Improved => "improved",
            ComparisonStatus::Worsened => "worsened",
            ComparisonStatus::Stable => "stable",
            ComparisonStatus::Resolved => "resolved",
            ComparisonStatus::New => "new",
            ComparisonStatus::NotMeasured => "not measured",
        }
    }

    /// Whether the pair was measured on both visits.
    pub fn is_tracked(self) -> bool {
        self != ComparisonStatus::NotMeasured
    }
}

impl std::fmt::Display for ComparisonStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Previous vs. current measurement for one deviation key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviationComparison {
    pub deviation_type: DeviationType,
    pub view: View,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
    pub status: ComparisonStatus,
    pub unit: MeasurementUnit,
    pub previous: Option<Deviation>,
    pub current: Option<Deviation>,
    /// `current.value - previous.value` when both sides were measured.
    pub value_delta: Option<f64>,
    /// Effective amounts; an absent side counts as zero.
    pub previous_amount: f64,
    pub current_amount: f64,
    pub amount_delta: f64,
    /// Ordinal difference `current - previous` of severity ranks.
    pub severity_delta: i32,
}

impl DeviationComparison {
    pub fn previous_severity(&self) -> Severity {
        self.previous.as_ref().map(|d| d.severity).unwrap_or_default()
    }

    pub fn current_severity(&self) -> Severity {
        self.current.as_ref().map(|d| d.severity).unwrap_or_default()
    }
}

/// Comparisons for one view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewComparison {
    pub view: View,
    pub previous_analyzed: bool,
    pub current_analyzed: bool,
    pub comparisons: Vec<DeviationComparison>,
}

/// Status tallies across all views.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonCounts {
    pub improved: usize,
    pub worsened: usize,
    pub stable: usize,
    pub resolved: usize,
    pub new: usize,
    /// Entries of views analyzed on one visit only; not part of `total`.
    #[serde(default)]
    pub not_measured: usize,
}

impl ComparisonCounts {
    pub fn record(&mut self, status: ComparisonStatus) {
        match status {
            ComparisonStatus::Improved => self.improved += 1,
            ComparisonStatus::Worsened => self.worsened += 1,
            ComparisonStatus::Stable => self.stable += 1,
            ComparisonStatus::Resolved => self.resolved += 1,
            ComparisonStatus::New => self.new += 1,
            ComparisonStatus::NotMeasured => self.not_measured += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.improved + self.worsened + self.stable + self.resolved + self.new
    }

    /// Tracked deviations that got better, resolutions included.
    pub fn better(&self) -> usize {
        self.improved + self.resolved
    }

    /// Tracked deviations that got worse, new findings included.
    pub fn worse(&self) -> usize {
        self.worsened + self.new
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    /// Worsened or newly found deviation.
    Address,
    /// Persisting deviation of moderate severity or worse.
    Monitor,
    /// Maintenance of achieved improvements.
    Maintain,
}

/// Ranked recommendation derived from the comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    /// 1-based rank.
    pub rank: usize,
    pub kind: RecommendationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deviation_type: Option<DeviationType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<View>,
    pub text: String,
}

/// Comparison of two assessments of the same patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    pub patient_id: PatientId,
    pub previous_assessment_id: Option<AssessmentId>,
    pub current_assessment_id: Option<AssessmentId>,
    pub previous_date: DateTime<Utc>,
    pub current_date: DateTime<Utc>,
    pub days_between: i64,
    pub views: Vec<ViewComparison>,
    pub counts: ComparisonCounts,
    pub previous_overall_severity: Severity,
    pub current_overall_severity: Severity,
    /// 0-100, higher is better.
    pub improvement_score: f64,
    pub summary: String,
    pub recommendations: Vec<Recommendation>,
}

impl ComparisonResult {
    pub fn view(&self, view: View) -> Option<&ViewComparison> {
        self.views.iter().find(|v| v.view == view)
    }

    pub fn all_comparisons(&self) -> impl Iterator<Item = &DeviationComparison> {
        self.views.iter().flat_map(|v| v.comparisons.iter())
    }
}

// =========================================================
// Trends
// =========================================================

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Worsening,
    Stable,
    InsufficientData,
}

/// One assessment's measurement in a trend series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub assessment_id: Option<AssessmentId>,
    pub date: DateTime<Utc>,
    pub view: View,
    pub value: f64,
    pub deviation_amount: f64,
    pub severity: Severity,
    /// Value change since the previous point of the series.
    pub change_from_previous: Option<f64>,
}

/// Time series of one deviation type (and side, for side-specific types).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendSeries {
    pub deviation_type: DeviationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
    pub unit: MeasurementUnit,
    pub normal_range_min: f64,
    pub normal_range_max: f64,
    pub points: Vec<TrendPoint>,
    pub direction: TrendDirection,
    /// `last.value - first.value`.
    pub change_from_first: Option<f64>,
    /// `last.value - previous.value`.
    pub change_from_previous: Option<f64>,
    /// `last.amount - first.amount`.
    pub amount_change_from_first: Option<f64>,
}

// =========================================================
// Overlay
// =========================================================

/// Similarity transform mapping previous-image onto current-image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityTransform {
    pub scale: f64,
    pub rotation: qtty::Degrees,
    pub translation_x: f64,
    pub translation_y: f64,
}

impl SimilarityTransform {
    pub fn identity() -> Self {
        Self {
            scale: 1.0,
            rotation: qtty::Degrees::new(0.0),
            translation_x: 0.0,
            translation_y: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayAlignment {
    pub view: View,
    pub transform: SimilarityTransform,
    pub common_landmark_count: usize,
    pub common_landmarks: Vec<LandmarkName>,
    /// Weighted RMS distance after the transform, in normalized units.
    pub rms_residual: f64,
    /// Set when fewer than three common landmarks were available.
    pub low_confidence: bool,
}

// =========================================================
// Reports
// =========================================================

/// Identity strings supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportIdentities {
    pub patient_name: String,
    pub practitioner_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub practitioner_title: Option<String>,
    pub organization_name: String,
}

/// Treatment-goal progress row supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreatmentGoalProgress {
    pub goal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportHeader {
    pub title: String,
    pub organization_name: String,
    pub patient_name: String,
    pub practitioner_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub practitioner_title: Option<String>,
    pub previous_date: String,
    pub current_date: String,
    pub days_between: i64,
    pub improvement_score: f64,
    pub overall_change: String,
}

/// Before/after summary for one view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewSummary {
    pub view: View,
    pub label: String,
    pub before: String,
    pub after: String,
    pub counts: ComparisonCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementRow {
    pub deviation: String,
    pub previous: String,
    pub current: String,
    pub change: String,
    pub normal_range: String,
    pub previous_severity: Severity,
    pub current_severity: Severity,
    pub status: ComparisonStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementTable {
    pub view: View,
    pub title: String,
    pub rows: Vec<MeasurementRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureBlock {
    pub practitioner_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub practitioner_title: Option<String>,
    pub organization_name: String,
    pub statement: String,
}

/// Structured progress report. The HTML rendering is a projection of this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub header: ReportHeader,
    pub view_summaries: Vec<ViewSummary>,
    pub measurement_tables: Vec<MeasurementTable>,
    pub narrative: String,
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub goals: Vec<TreatmentGoalProgress>,
    pub signature: SignatureBlock,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportBundle {
    pub report: ProgressReport,
    pub html: String,
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod api_tests;
