use crate::api::WarningKind;
use crate::config::AnalysisSettings;
use crate::models::{
    DetectorMetadata, DeviationDirection, DeviationType, Image, Landmark, LandmarkName as L,
    Severity, Side, View,
};
use crate::services::analysis::{analyze_assessment, analyze_image, summarize_deviations};

fn lm(name: L, x: f64, y: f64) -> Landmark {
    Landmark::new(name, x, y, 0.9)
}

fn analyzed(view: View, landmarks: Vec<Landmark>) -> Image {
    Image::new(view).with_detection(landmarks, DetectorMetadata::default(), None)
}

fn neutral_anterior() -> Vec<Landmark> {
    vec![
        lm(L::Nose, 0.50, 0.10),
        lm(L::EyeLeft, 0.52, 0.08),
        lm(L::EyeRight, 0.48, 0.08),
        lm(L::EarLeft, 0.54, 0.09),
        lm(L::EarRight, 0.46, 0.09),
        lm(L::ShoulderLeft, 0.60, 0.25),
        lm(L::ShoulderRight, 0.40, 0.25),
        lm(L::AsisLeft, 0.55, 0.50),
        lm(L::AsisRight, 0.45, 0.50),
        lm(L::HipLeft, 0.57, 0.52),
        lm(L::HipRight, 0.43, 0.52),
        lm(L::KneeLeft, 0.56, 0.72),
        lm(L::KneeRight, 0.44, 0.72),
        lm(L::AnkleLeft, 0.55, 0.92),
        lm(L::AnkleRight, 0.45, 0.92),
    ]
}

fn right_lateral() -> Vec<Landmark> {
    vec![
        lm(L::EarRight, 0.55, 0.10),
        lm(L::C7, 0.50, 0.20),
        lm(L::T8, 0.47, 0.32),
        lm(L::T12, 0.48, 0.44),
        lm(L::L3, 0.50, 0.52),
        lm(L::Sacrum, 0.48, 0.60),
        lm(L::ShoulderRight, 0.52, 0.24),
        lm(L::HipRight, 0.50, 0.58),
        lm(L::AsisRight, 0.56, 0.56),
        lm(L::PsisRight, 0.44, 0.54),
        lm(L::KneeRight, 0.48, 0.75),
        lm(L::AnkleRight, 0.50, 0.94),
    ]
}

fn settings() -> AnalysisSettings {
    AnalysisSettings::default()
}

#[test]
fn test_neutral_anterior_is_within_limits() {
    let image = analyzed(View::Anterior, neutral_anterior());
    let result = analyze_image(&image, None, &settings());

    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    assert_eq!(result.deviations.len(), 10);
    assert!(result.scale.body_normalized);
    for deviation in &result.deviations {
        assert_eq!(deviation.deviation_amount, 0.0, "{:?}", deviation);
        assert_eq!(deviation.severity, Severity::Minimal);
        assert_eq!(deviation.view, View::Anterior);
    }
    assert_eq!(
        summarize_deviations(&result.deviations),
        "All 10 measured deviations are within normal limits."
    );
}

#[test]
fn test_uneven_shoulders_scenario() {
    let image = analyzed(
        View::Anterior,
        vec![
            lm(L::ShoulderLeft, 0.60, 0.40),
            lm(L::ShoulderRight, 0.40, 0.45),
        ],
    );
    let analysis = analyze_assessment(&[image], None, &settings()).unwrap();

    let shoulders: Vec<_> = analysis
        .deviations
        .iter()
        .filter(|d| d.deviation_type == DeviationType::ShoulderUneven)
        .collect();
    assert_eq!(shoulders.len(), 1);
    let deviation = shoulders[0];
    assert!((deviation.measurement_value - 0.05).abs() < 1e-9);
    assert_eq!(deviation.severity, Severity::Mild);
    assert_eq!(deviation.direction, DeviationDirection::Right);
    assert_eq!(analysis.overall_severity, Severity::Mild);

    // Everything else lacks landmarks and is reported, not failed.
    assert!(!analysis.warnings.is_empty());
    assert!(analysis
        .warnings
        .iter()
        .all(|w| w.kind == WarningKind::MissingLandmark));
    assert!(analysis.summary.contains("Shoulders"));
}

#[test]
fn test_low_confidence_landmark_skips_dependent_types() {
    let mut landmarks = neutral_anterior();
    for l in landmarks.iter_mut() {
        if l.name == L::KneeLeft {
            l.confidence = 0.3;
        }
    }
    let result = analyze_image(&analyzed(View::Anterior, landmarks), None, &settings());

    assert_eq!(result.deviations.len(), 8);
    assert_eq!(result.warnings.len(), 2);
    for warning in &result.warnings {
        assert_eq!(warning.kind, WarningKind::LowConfidence);
        assert_eq!(warning.side, Some(Side::Left));
        assert_eq!(warning.landmarks, vec![L::KneeLeft]);
    }
    assert!(result
        .deviations
        .iter()
        .any(|d| d.deviation_type == DeviationType::KneeValgus
            && d.direction == DeviationDirection::Right));
}

#[test]
fn test_knee_valgus_detected_on_medial_knee() {
    let mut landmarks = neutral_anterior();
    for l in landmarks.iter_mut() {
        if l.name == L::KneeLeft {
            l.x = 0.545;
        }
    }
    let result = analyze_image(&analyzed(View::Anterior, landmarks), None, &settings());

    let find = |t: DeviationType, side: DeviationDirection| {
        result
            .deviations
            .iter()
            .find(|d| d.deviation_type == t && d.direction == side)
            .unwrap()
    };
    let valgus_left = find(DeviationType::KneeValgus, DeviationDirection::Left);
    assert!(valgus_left.measurement_value > 8.0 && valgus_left.measurement_value < 9.0);
    assert_eq!(valgus_left.severity, Severity::Mild);
    assert_eq!(
        find(DeviationType::KneeVarus, DeviationDirection::Left).measurement_value,
        0.0
    );
    assert_eq!(
        find(DeviationType::KneeValgus, DeviationDirection::Right).measurement_value,
        0.0
    );
}

#[test]
fn test_lateral_measurements() {
    let image = analyzed(View::LateralRight, right_lateral());
    let result = analyze_image(&image, Some(170.0), &settings());
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);

    let get = |t: DeviationType| {
        result
            .deviations
            .iter()
            .find(|d| d.deviation_type == t)
            .unwrap()
    };

    let head = get(DeviationType::HeadForward);
    assert!((head.measurement_value - 26.565).abs() < 0.01);
    assert_eq!(head.direction, DeviationDirection::Forward);
    assert_eq!(head.severity, Severity::Minimal);

    let pelvis = get(DeviationType::PelvicTiltAnterior);
    assert!((pelvis.measurement_value - 9.46).abs() < 0.01);
    assert_eq!(pelvis.deviation_amount, 0.0);

    let knee = get(DeviationType::KneeHyperextension);
    assert!(knee.measurement_value > 12.0 && knee.measurement_value < 13.5);
    assert_eq!(knee.direction, DeviationDirection::Backward);
    assert_eq!(knee.severity, Severity::Moderate);

    let shoulder = get(DeviationType::ShoulderProtracted);
    assert_eq!(shoulder.direction, DeviationDirection::Forward);
    assert!(shoulder.measurement_cm.is_some());
}

#[test]
fn test_retracted_shoulder_is_not_protraction() {
    let image = analyzed(
        View::LateralRight,
        vec![lm(L::ShoulderRight, 0.46, 0.25), lm(L::HipRight, 0.50, 0.52)],
    );
    let result = analyze_image(&image, None, &settings());
    let shoulder = result
        .deviations
        .iter()
        .find(|d| d.deviation_type == DeviationType::ShoulderProtracted)
        .unwrap();
    assert_eq!(shoulder.measurement_value, 0.0);
    assert_eq!(shoulder.deviation_amount, 0.0);
    assert_eq!(shoulder.direction, DeviationDirection::Neutral);
    assert_eq!(shoulder.severity, Severity::Minimal);
}

#[test]
fn test_left_lateral_mirrors_forward_axis() {
    let image = analyzed(
        View::LateralLeft,
        vec![lm(L::C7, 0.50, 0.20), lm(L::EarLeft, 0.45, 0.10)],
    );
    let result = analyze_image(&image, None, &settings());
    let head = result
        .deviations
        .iter()
        .find(|d| d.deviation_type == DeviationType::HeadForward)
        .unwrap();
    assert_eq!(head.direction, DeviationDirection::Forward);
}

#[test]
fn test_posterior_scoliosis_and_pronation() {
    let image = analyzed(
        View::Posterior,
        vec![
            lm(L::C7, 0.50, 0.20),
            lm(L::T8, 0.53, 0.35),
            lm(L::Sacrum, 0.50, 0.60),
            lm(L::CalfLeft, 0.42, 0.78),
            lm(L::AnkleLeft, 0.435, 0.90),
            lm(L::HeelLeft, 0.42, 0.96),
        ],
    );
    let result = analyze_image(&image, None, &settings());

    let scoliosis = result
        .deviations
        .iter()
        .find(|d| d.deviation_type == DeviationType::Scoliosis)
        .unwrap();
    assert_eq!(scoliosis.direction, DeviationDirection::Right);
    assert_eq!(scoliosis.severity, Severity::Severe);

    let pronation = result
        .deviations
        .iter()
        .find(|d| d.deviation_type == DeviationType::AnklePronation)
        .unwrap();
    assert_eq!(pronation.direction, DeviationDirection::Left);
    assert!(pronation.measurement_value > 4.0);

    let supination = result
        .deviations
        .iter()
        .find(|d| d.deviation_type == DeviationType::AnkleSupination)
        .unwrap();
    assert_eq!(supination.measurement_value, 0.0);
}

#[test]
fn test_degenerate_geometry_is_a_warning() {
    let image = analyzed(
        View::LateralRight,
        vec![
            lm(L::C7, 0.50, 0.20),
            lm(L::T8, 0.50, 0.20),
            lm(L::T12, 0.50, 0.40),
        ],
    );
    let result = analyze_image(&image, None, &settings());
    let kyphosis = result
        .warnings
        .iter()
        .find(|w| w.deviation_type == DeviationType::Kyphosis)
        .unwrap();
    assert_eq!(kyphosis.kind, WarningKind::DegenerateGeometry);
}

#[test]
fn test_analysis_is_idempotent() {
    let images = vec![
        analyzed(View::LateralRight, right_lateral()),
        analyzed(View::Anterior, neutral_anterior()),
    ];
    let first = analyze_assessment(&images, Some(165.0), &settings()).unwrap();
    let second = analyze_assessment(&images, Some(165.0), &settings()).unwrap();

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first.deviations).unwrap(),
        serde_json::to_string(&second.deviations).unwrap()
    );
    // View order, regardless of image order.
    assert_eq!(first.deviations[0].view, View::Anterior);
    assert_eq!(first.deviations.last().unwrap().view, View::LateralRight);
}

#[test]
fn test_no_analyzed_images_is_rejected() {
    let err = analyze_assessment(&[], None, &settings()).unwrap_err();
    assert_eq!(err.code(), "PRECONDITION_NOT_MET");

    let pending = Image::new(View::Anterior);
    assert!(analyze_assessment(&[pending], None, &settings()).is_err());
}

#[test]
fn test_summary_groups_by_region() {
    let image = analyzed(View::LateralRight, right_lateral());
    let result = analyze_image(&image, None, &settings());
    let summary = summarize_deviations(&result.deviations);
    assert!(summary.starts_with("Overall severity is moderate."));
    assert!(summary.contains("Knees: knee hyperextension in Right lateral view (moderate"));
}
