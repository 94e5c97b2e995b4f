//! Property tests for severity, scoring and overlay alignment.

mod support;

use proptest::prelude::*;

use posture_engine::config::ComparisonSettings;
use posture_engine::models::severity::{classify, deviation_amount};
use posture_engine::models::{
    DetectorMetadata, Image, Landmark, LandmarkName as L, MeasurementUnit, View,
};
use posture_engine::services::{align_overlay, compare, score_from_burden};
use support::{anterior, completed, date};

/// Left knee x on the hip-ankle line of the `anterior` fixture.
const KNEE_ON_LINE: f64 = 0.56;

const SKELETON: [(L, f64, f64); 8] = [
    (L::ShoulderLeft, 0.60, 0.25),
    (L::ShoulderRight, 0.40, 0.25),
    (L::HipLeft, 0.57, 0.52),
    (L::HipRight, 0.43, 0.52),
    (L::KneeLeft, 0.56, 0.72),
    (L::KneeRight, 0.44, 0.72),
    (L::AnkleLeft, 0.55, 0.92),
    (L::AnkleRight, 0.45, 0.92),
];

fn jittered_image(jitter: &[(f64, f64)], scale: f64, dx: f64, dy: f64) -> Image {
    let landmarks = SKELETON
        .iter()
        .zip(jitter)
        .map(|((name, x, y), (jx, jy))| {
            Landmark::new(*name, (x + jx) * scale + dx, (y + jy) * scale + dy, 0.9)
        })
        .collect();
    Image::new(View::Anterior).with_detection(landmarks, DetectorMetadata::default(), None)
}

fn unit() -> impl Strategy<Value = MeasurementUnit> {
    prop_oneof![
        Just(MeasurementUnit::Degrees),
        Just(MeasurementUnit::LevelDifference)
    ]
}

proptest! {
    #[test]
    fn severity_never_decreases_with_larger_values(
        unit in unit(),
        max in 0.0f64..20.0,
        value in 0.0f64..60.0,
        extra in 0.0f64..30.0,
    ) {
        let lower = classify(value, 0.0, max, unit);
        let higher = classify(value + extra, 0.0, max, unit);
        prop_assert!(higher >= lower);
    }

    #[test]
    fn deviation_amount_is_zero_inside_range(
        min in -10.0f64..10.0,
        width in 0.0f64..20.0,
        t in 0.0f64..=1.0,
    ) {
        let max = min + width;
        prop_assert_eq!(deviation_amount(min + t * width, min, max), 0.0);
    }

    #[test]
    fn improvement_score_is_bounded(
        previous in 0.0f64..50.0,
        current in 0.0f64..50.0,
    ) {
        let score = score_from_burden(previous, current);
        prop_assert!((0.0..=100.0).contains(&score));
    }

    #[test]
    fn smaller_current_burden_never_scores_lower(
        previous in 0.0f64..50.0,
        current in 0.0f64..50.0,
        reduction in 0.0f64..=1.0,
    ) {
        let reduced = current * (1.0 - reduction);
        prop_assert!(score_from_burden(previous, reduced) >= score_from_burden(previous, current));
    }

    #[test]
    fn smaller_current_deviations_never_score_lower(
        previous_knee in 0.52f64..=KNEE_ON_LINE,
        current_knee in 0.52f64..KNEE_ON_LINE,
        toward_line in 0.01f64..=1.0,
    ) {
        let settings = ComparisonSettings::default();
        let corrected_knee = current_knee + toward_line * (KNEE_ON_LINE - current_knee);
        let previous = completed(date(1, 5), vec![anterior(previous_knee)]);
        let current = completed(date(2, 5), vec![anterior(current_knee)]);
        let corrected = completed(date(2, 5), vec![anterior(corrected_knee)]);

        let score = compare(&previous, &current, &settings).unwrap().improvement_score;
        let corrected_score = compare(&previous, &corrected, &settings).unwrap().improvement_score;
        prop_assert!((0.0..=100.0).contains(&score));
        prop_assert!((0.0..=100.0).contains(&corrected_score));
        prop_assert!(corrected_score >= score, "{} < {}", corrected_score, score);
    }

    #[test]
    fn identical_landmarks_align_to_identity(
        jitter in prop::collection::vec((-0.03f64..0.03, -0.03f64..0.03), SKELETON.len()),
    ) {
        let before = jittered_image(&jitter, 1.0, 0.0, 0.0);
        let after = jittered_image(&jitter, 1.0, 0.0, 0.0);

        let alignment = align_overlay(&before, &after).unwrap();
        prop_assert!((alignment.transform.scale - 1.0).abs() < 1e-6);
        prop_assert!(alignment.transform.rotation.value().abs() < 1e-6);
        prop_assert!(alignment.transform.translation_x.abs() < 1e-6);
        prop_assert!(alignment.transform.translation_y.abs() < 1e-6);
        prop_assert!(!alignment.low_confidence);
    }

    #[test]
    fn scaled_and_shifted_photo_is_recovered(
        jitter in prop::collection::vec((-0.03f64..0.03, -0.03f64..0.03), SKELETON.len()),
        scale in 0.8f64..1.2,
        dx in -0.05f64..0.05,
        dy in -0.05f64..0.05,
    ) {
        let before = jittered_image(&jitter, 1.0, 0.0, 0.0);
        let after = jittered_image(&jitter, scale, dx, dy);

        let alignment = align_overlay(&before, &after).unwrap();
        prop_assert!((alignment.transform.scale - scale).abs() < 1e-6);
        prop_assert!(alignment.transform.rotation.value().abs() < 1e-6);
        prop_assert!((alignment.transform.translation_x - dx).abs() < 1e-6);
        prop_assert!((alignment.transform.translation_y - dy).abs() < 1e-6);
        prop_assert!(alignment.rms_residual < 1e-6);
    }
}
