use chrono::{TimeZone, Utc};

use super::repositories::LocalRepository;
use super::repository::{AnalysisRepository, AssessmentRepository};
use super::services::{self, ServiceError};
use crate::api::{ComparisonStatus, ReportIdentities, TrendDirection};
use crate::config::EngineConfig;
use crate::models::{
    Assessment, AssessmentId, DetectorMetadata, DeviationType, Image, Landmark,
    LandmarkName as L, PatientId, Side, View,
};

fn anterior(knee_left_x: f64) -> Image {
    let points = [
        (L::Nose, 0.50, 0.10),
        (L::EyeLeft, 0.52, 0.08),
        (L::EyeRight, 0.48, 0.08),
        (L::EarLeft, 0.54, 0.09),
        (L::EarRight, 0.46, 0.09),
        (L::ShoulderLeft, 0.60, 0.25),
        (L::ShoulderRight, 0.40, 0.25),
        (L::AsisLeft, 0.55, 0.50),
        (L::AsisRight, 0.45, 0.50),
        (L::HipLeft, 0.57, 0.52),
        (L::HipRight, 0.43, 0.52),
        (L::KneeLeft, knee_left_x, 0.72),
        (L::KneeRight, 0.44, 0.72),
        (L::AnkleLeft, 0.55, 0.92),
        (L::AnkleRight, 0.45, 0.92),
    ];
    let landmarks = points
        .iter()
        .map(|(name, x, y)| Landmark::new(*name, *x, *y, 0.95))
        .collect();
    Image::new(View::Anterior).with_detection(landmarks, DetectorMetadata::default(), None)
}

fn visit(day: u32, knee_left_x: f64) -> Assessment {
    let mut assessment = Assessment::new(
        PatientId::new(12),
        Utc.with_ymd_and_hms(2026, 6, day, 14, 0, 0).unwrap(),
    );
    assessment.patient_height_cm = Some(168.0);
    assessment.attach_image(anterior(knee_left_x)).unwrap();
    assessment
}

async fn completed_visit(repo: &LocalRepository, day: u32, knee_left_x: f64) -> AssessmentId {
    let config = EngineConfig::default();
    let id = services::store_assessment(repo, &visit(day, knee_left_x))
        .await
        .unwrap();
    services::complete_assessment(repo, id, &config.analysis)
        .await
        .unwrap();
    id
}

#[tokio::test]
async fn test_analyze_and_store_replaces_deviations() {
    let repo = LocalRepository::new();
    let config = EngineConfig::default();
    let id = services::store_assessment(&repo, &visit(1, 0.545))
        .await
        .unwrap();

    let analysis = services::analyze_and_store(&repo, id, &config.analysis)
        .await
        .unwrap();
    assert_eq!(analysis.deviations.len(), 10);
    assert!(analysis.warnings.is_empty());

    let stored = repo.get_deviations(id).await.unwrap();
    assert_eq!(stored, analysis.deviations);
    assert!(repo.has_current_analysis(id).await.unwrap());

    // Running it again yields the same stored state.
    let again = services::analyze_and_store(&repo, id, &config.analysis)
        .await
        .unwrap();
    assert_eq!(again, analysis);
}

#[tokio::test]
async fn test_stale_analysis_is_recomputed() {
    let repo = LocalRepository::new();
    let config = EngineConfig::default();
    let id = services::store_assessment(&repo, &visit(1, 0.56))
        .await
        .unwrap();
    services::analyze_and_store(&repo, id, &config.analysis)
        .await
        .unwrap();

    services::attach_image(&repo, id, anterior(0.545))
        .await
        .unwrap();
    assert!(!repo.has_current_analysis(id).await.unwrap());

    let refreshed = services::ensure_analysis(&repo, id, &config.analysis)
        .await
        .unwrap();
    assert!(refreshed.is_analysis_current());
    assert!(refreshed
        .deviations
        .iter()
        .any(|d| d.deviation_type == DeviationType::KneeValgus && d.deviation_amount > 0.0));
}

#[tokio::test]
async fn test_analysis_without_images_is_rejected() {
    let repo = LocalRepository::new();
    let config = EngineConfig::default();
    let empty = Assessment::new(PatientId::new(1), Utc::now());
    let id = repo.store_assessment(&empty).await.unwrap();

    let err = services::analyze_and_store(&repo, id, &config.analysis)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "PRECONDITION_NOT_MET");

    let missing = services::analyze_and_store(&repo, AssessmentId::new(404), &config.analysis)
        .await
        .unwrap_err();
    assert_eq!(missing.code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_compare_by_id_and_report() {
    let repo = LocalRepository::new();
    let config = EngineConfig::default();
    let first = completed_visit(&repo, 1, 0.545).await;
    let second = completed_visit(&repo, 29, 0.56).await;

    let result = services::compare_assessments(&repo, first, second, &config.comparison)
        .await
        .unwrap();
    let valgus = result
        .all_comparisons()
        .find(|c| c.deviation_type == DeviationType::KneeValgus && c.side == Some(Side::Left))
        .unwrap();
    assert_eq!(valgus.status, ComparisonStatus::Resolved);
    assert_eq!(result.counts.resolved, 1);
    assert_eq!(result.improvement_score, 100.0);

    let latest = services::compare_latest(&repo, PatientId::new(12), &config.comparison)
        .await
        .unwrap();
    assert_eq!(latest, result);

    let identities = ReportIdentities {
        patient_name: "Sam Lee".to_string(),
        practitioner_name: "Dr. Kim".to_string(),
        practitioner_title: None,
        organization_name: "Northside Clinic".to_string(),
    };
    let bundle = services::progress_report(
        &repo,
        first,
        second,
        &config.comparison,
        &identities,
        &[],
    )
    .await
    .unwrap();
    assert_eq!(bundle.report.header.days_between, 28);
    assert!(bundle.html.contains("Northside Clinic"));
}

#[tokio::test]
async fn test_compare_rejects_reversed_and_incomplete() {
    let repo = LocalRepository::new();
    let config = EngineConfig::default();
    let first = completed_visit(&repo, 1, 0.545).await;
    let second = completed_visit(&repo, 15, 0.56).await;

    let err = services::compare_assessments(&repo, second, first, &config.comparison)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_ORDERING");

    let open = services::store_assessment(&repo, &visit(20, 0.56))
        .await
        .unwrap();
    let err = services::compare_assessments(&repo, second, open, &config.comparison)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Engine(_)));
    assert_eq!(err.code(), "PRECONDITION_NOT_MET");
}

#[tokio::test]
async fn test_patient_trends_skip_open_assessments() {
    let repo = LocalRepository::new();
    let config = EngineConfig::default();
    completed_visit(&repo, 1, 0.545).await;
    completed_visit(&repo, 10, 0.55).await;
    completed_visit(&repo, 20, 0.56).await;
    services::store_assessment(&repo, &visit(25, 0.50))
        .await
        .unwrap();

    let series = services::patient_trends(
        &repo,
        PatientId::new(12),
        Some(DeviationType::KneeValgus),
        &config.trend,
    )
    .await
    .unwrap();
    let left = series.iter().find(|s| s.side == Some(Side::Left)).unwrap();
    assert_eq!(left.points.len(), 3);
    assert_eq!(left.direction, TrendDirection::Improving);
}

#[tokio::test]
async fn test_overlay_for_view() {
    let repo = LocalRepository::new();
    let first = completed_visit(&repo, 1, 0.545).await;
    let second = completed_visit(&repo, 8, 0.56).await;

    let alignment = services::overlay_for_view(&repo, first, second, View::Anterior)
        .await
        .unwrap();
    assert_eq!(alignment.common_landmark_count, 15);
    assert!(!alignment.low_confidence);
    assert!((alignment.transform.scale - 1.0).abs() < 0.05);

    let err = services::overlay_for_view(&repo, first, second, View::Posterior)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "PRECONDITION_NOT_MET");
}
