use crate::api::*;

#[test]
fn test_comparison_counts() {
    let mut counts = ComparisonCounts::default();
    for status in [
        ComparisonStatus::Improved,
        ComparisonStatus::Resolved,
        ComparisonStatus::New,
        ComparisonStatus::Stable,
        ComparisonStatus::Worsened,
        ComparisonStatus::Improved,
        ComparisonStatus::NotMeasured,
    ] {
        counts.record(status);
    }

    assert_eq!(counts.total(), 6);
    assert_eq!(counts.not_measured, 1);
    assert_eq!(counts.better(), 3);
    assert_eq!(counts.worse(), 2);
    assert_eq!(counts.stable, 1);
}

#[test]
fn test_status_serializes_snake_case() {
    let json = serde_json::to_string(&ComparisonStatus::Resolved).unwrap();
    assert_eq!(json, "\"resolved\"");
    let direction: TrendDirection = serde_json::from_str("\"insufficient_data\"").unwrap();
    assert_eq!(direction, TrendDirection::InsufficientData);
}

#[test]
fn test_identity_transform() {
    let transform = SimilarityTransform::identity();
    assert_eq!(transform.scale, 1.0);
    assert_eq!(transform.rotation.value(), 0.0);
    assert_eq!(transform.translation_x, 0.0);
    assert_eq!(transform.translation_y, 0.0);
}

#[test]
fn test_warning_serializes_camel_case() {
    let warning = AnalysisWarning {
        view: View::Anterior,
        deviation_type: DeviationType::KneeValgus,
        side: Some(Side::Left),
        kind: WarningKind::LowConfidence,
        landmarks: vec![LandmarkName::KneeLeft],
        message: "knee_left below confidence threshold".to_string(),
    };
    let value = serde_json::to_value(&warning).unwrap();
    assert_eq!(value["deviationType"], "knee_valgus");
    assert_eq!(value["kind"], "low_confidence");
    assert_eq!(value["landmarks"][0], "knee_left");
}

#[test]
fn test_report_identities_optional_title() {
    let identities: ReportIdentities = serde_json::from_str(
        r#"{"patientName": "A. Patient", "practitionerName": "Dr. B", "organizationName": "Clinic"}"#,
    )
    .unwrap();
    assert!(identities.practitioner_title.is_none());
    assert_eq!(identities.organization_name, "Clinic");
}
