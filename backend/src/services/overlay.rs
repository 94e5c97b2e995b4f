//! Overlay Aligner.
//!
//! Estimates the similarity transform that maps the previous image's
//! landmarks onto the current image's, so before/after photos of one view can
//! be drawn on top of each other.

use log::debug;

use crate::algorithms::{fit_similarity, PointPair, SimilarityFit};
use crate::api::{OverlayAlignment, SimilarityTransform};
use crate::error::{EngineError, EngineResult};
use crate::models::{Image, LandmarkName};

/// Below this many common landmarks the fit is underdetermined or exact.
pub const MIN_CONFIDENT_POINTS: usize = 3;

impl From<SimilarityFit> for SimilarityTransform {
    fn from(fit: SimilarityFit) -> Self {
        Self {
            scale: fit.scale,
            rotation: qtty::Degrees::new(fit.rotation.to_degrees()),
            translation_x: fit.translation_x,
            translation_y: fit.translation_y,
        }
    }
}

/// Landmarks present in both images, paired and weighted by the lower of
/// the two confidences. Ordered by landmark name.
fn common_pairs(previous: &Image, current: &Image) -> Vec<(LandmarkName, PointPair)> {
    let mut pairs: Vec<(LandmarkName, PointPair)> = previous
        .landmarks
        .iter()
        .filter_map(|before| {
            current.landmark(before.name).map(|after| {
                (
                    before.name,
                    PointPair::new(
                        before.point(),
                        after.point(),
                        before.confidence.min(after.confidence),
                    ),
                )
            })
        })
        .collect();
    pairs.sort_by_key(|(name, _)| *name);
    pairs
}

/// Align `previous` onto `current`.
///
/// Both images must show the same view. With fewer than three common
/// landmarks of positive confidence the result is still returned but
/// flagged `low_confidence`, as is the identity fallback when nothing can
/// be fitted.
pub fn align_overlay(previous: &Image, current: &Image) -> EngineResult<OverlayAlignment> {
    if previous.view != current.view {
        return Err(EngineError::ViewMismatch {
            previous: previous.view,
            current: current.view,
        });
    }

    let named = common_pairs(previous, current);
    let pairs: Vec<PointPair> = named.iter().map(|(_, pair)| *pair).collect();
    let weighted = pairs.iter().filter(|p| p.weight > 0.0).count();
    let fitted = fit_similarity(&pairs);
    let low_confidence = fitted.is_none() || weighted < MIN_CONFIDENT_POINTS;
    let fit = fitted.unwrap_or_else(SimilarityFit::identity);

    debug!(
        "Aligned {} overlay on {} common landmarks, {} weighted (rms {:.4})",
        current.view,
        named.len(),
        weighted,
        fit.rms_residual
    );

    Ok(OverlayAlignment {
        view: current.view,
        transform: fit.into(),
        common_landmark_count: named.len(),
        common_landmarks: named.into_iter().map(|(name, _)| name).collect(),
        rms_residual: fit.rms_residual,
        low_confidence,
    })
}
