#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{DateTime, TimeZone, Utc};
use posture_engine::config::AnalysisSettings;
use posture_engine::models::{
    Assessment, DetectorMetadata, Image, Landmark, LandmarkName as L, PatientId, View,
};
use posture_engine::services::{analyze_assessment, apply_analysis};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Runs `f` with environment variables temporarily modified.
///
/// Restores the previous values on unwind and serializes access to the
/// process-global environment across parallel tests.
///
/// `changes` is a list of `(key, value)` pairs:
/// - `Some(v)` sets the variable to `v`
/// - `None` removes the variable
pub fn with_scoped_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let _guard = ScopedEnv::new(changes);
    f()
}

struct ScopedEnv {
    snapshot: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    fn new(changes: &[(&str, Option<&str>)]) -> Self {
        let keys: HashSet<&str> = changes.iter().map(|(k, _)| *k).collect();
        let snapshot = keys
            .into_iter()
            .map(|k| (k.to_string(), std::env::var(k).ok()))
            .collect::<Vec<_>>();

        for (k, v) in changes {
            match v {
                Some(val) => std::env::set_var(k, val),
                None => std::env::remove_var(k),
            }
        }

        Self { snapshot }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (k, v) in self.snapshot.drain(..) {
            match v {
                Some(val) => std::env::set_var(&k, val),
                None => std::env::remove_var(&k),
            }
        }
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn date(month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, month, day, 10, 30, 0).unwrap()
}

pub fn analyzed(view: View, points: &[(L, f64, f64)]) -> Image {
    let landmarks = points
        .iter()
        .map(|(name, x, y)| Landmark::new(*name, *x, *y, 0.92))
        .collect();
    Image::new(view).with_detection(landmarks, DetectorMetadata::default(), None)
}

/// Anterior view standing straight, with the left knee displaced along x.
///
/// `knee_left_x = 0.56` keeps the knee on the hip-ankle line.
pub fn anterior(knee_left_x: f64) -> Image {
    analyzed(
        View::Anterior,
        &[
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
        ],
    )
}

/// Assessment of patient 7 holding the given images, analyzed and completed.
pub fn completed(date: DateTime<Utc>, images: Vec<Image>) -> Assessment {
    let mut assessment = Assessment::new(PatientId::new(7), date);
    assessment.images = images;
    let analysis = analyze_assessment(&assessment.images, None, &AnalysisSettings::default())
        .expect("fixture images are analyzed");
    apply_analysis(&mut assessment, &analysis);
    assessment.complete();
    assessment
}
