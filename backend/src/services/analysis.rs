//! Deviation Analyzer.
//!
//! Per view, every applicable deviation type from the catalog is measured
//! from its required landmarks. Missing or low-confidence landmarks and
//! degenerate geometry skip the measurement with a warning; they never fail
//! the analysis. Per assessment, view results are flattened in view order,
//! reduced to an overall severity and summarized by body region.

use log::{debug, warn};

use crate::algorithms::geometry::{
    bow_angle, horizontal_offset_from_line, inclination_from_vertical, level_difference,
    tilt_from_horizontal, Axis, Point, ScaleContext,
};
use crate::api::{AnalysisWarning, AssessmentAnalysis, ViewAnalysis, WarningKind};
use crate::config::AnalysisSettings;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    landmark_checksum, view_deviation_types, Assessment, BodyRegion, Deviation,
    DeviationDirection, DeviationType, Image, Landmark, LandmarkName, MeasurementPlan,
    Severity, Side, View,
};

const EPSILON: f64 = 1e-9;

/// Sign of the image x axis pointing toward the patient's `side`.
///
/// Facing the camera (anterior) the patient's left appears on the image right.
fn patient_side_sign(view: View, side: Side) -> f64 {
    match (view, side) {
        (View::Anterior, Side::Left) | (View::Posterior, Side::Right) => 1.0,
        (View::Anterior, Side::Right) | (View::Posterior, Side::Left) => -1.0,
        _ => 0.0,
    }
}

/// Patient side an x displacement points to in a frontal view.
fn side_of_offset(view: View, offset: f64) -> DeviationDirection {
    if offset.abs() < EPSILON {
        return DeviationDirection::Neutral;
    }
    if offset * patient_side_sign(view, Side::Left) > 0.0 {
        DeviationDirection::Left
    } else {
        DeviationDirection::Right
    }
}

/// The lower of two bilateral landmarks (larger y), or neutral when level.
fn lower_side(left: Point, right: Point) -> DeviationDirection {
    let dy = left.y - right.y;
    if dy.abs() < EPSILON {
        DeviationDirection::Neutral
    } else if dy > 0.0 {
        DeviationDirection::Left
    } else {
        DeviationDirection::Right
    }
}

fn forward_or_backward(offset: f64) -> DeviationDirection {
    if offset > EPSILON {
        DeviationDirection::Forward
    } else if offset < -EPSILON {
        DeviationDirection::Backward
    } else {
        DeviationDirection::Neutral
    }
}

/// Raw measurement for one plan: value in the type's unit plus direction.
///
/// `points` follow the order of `plan.landmarks`. Returns `None` for
/// degenerate configurations.
fn measure(
    deviation_type: DeviationType,
    view: View,
    plan: &MeasurementPlan,
    points: &[Point],
    scale: &ScaleContext,
) -> Option<(f64, DeviationDirection)> {
    use DeviationType::*;

    let forward = view.forward_sign();
    let range_direction = |value: f64| {
        let (min, max) = deviation_type.normal_range();
        DeviationDirection::relative_to_range(value, min, max)
    };

    match deviation_type {
        HeadForward => {
            let (c7, ear) = (points[0], points[1]);
            let angle = inclination_from_vertical(c7, ear)?.value();
            Some((angle, forward_or_backward((ear.x - c7.x) * forward)))
        }
        HeadTilt | PelvicTiltLateral => {
            let (left, right) = (points[0], points[1]);
            let tilt = tilt_from_horizontal(left, right)?.value();
            Some((tilt, lower_side(left, right)))
        }
        HeadRotation => {
            let (nose, eye_left, eye_right) = (points[0], points[1], points[2]);
            let d_left = nose.distance(eye_left);
            let d_right = nose.distance(eye_right);
            let total = d_left + d_right;
            if total < EPSILON {
                return None;
            }
            let ratio = ((d_left - d_right) / total).clamp(-1.0, 1.0);
            let angle = ratio.asin().to_degrees();
            let direction = if angle.abs() < EPSILON {
                DeviationDirection::Neutral
            } else if angle > 0.0 {
                DeviationDirection::Right
            } else {
                DeviationDirection::Left
            };
            Some((angle.abs(), direction))
        }
        ShoulderUneven | HipUneven => {
            let (left, right) = (points[0], points[1]);
            let diff = level_difference(left, right, Axis::Vertical, scale);
            Some((diff.abs(), lower_side(left, right)))
        }
        ShoulderProtracted => {
            // Retracted shoulders measure as zero protraction.
            let (shoulder, hip) = (points[0], points[1]);
            let offset = ((shoulder.x - hip.x) * forward * scale.factor).max(0.0);
            Some((offset, forward_or_backward(offset)))
        }
        Kyphosis | Lordosis => {
            let angle = bow_angle(points[0], points[1], points[2])?.value();
            Some((angle, range_direction(angle)))
        }
        Scoliosis => {
            let (c7, t8, sacrum) = (points[0], points[1], points[2]);
            let angle = bow_angle(c7, t8, sacrum)?.value();
            let direction = horizontal_offset_from_line(t8, c7, sacrum)
                .map(|offset| side_of_offset(view, offset))
                .unwrap_or_default();
            Some((angle, direction))
        }
        PelvicTiltAnterior => {
            let (asis, psis) = (points[0], points[1]);
            let run = ((asis.x - psis.x) * forward).abs();
            let drop = asis.y - psis.y;
            if run < EPSILON && drop.abs() < EPSILON {
                return None;
            }
            let angle = drop.atan2(run).to_degrees();
            Some((angle, range_direction(angle)))
        }
        KneeValgus | KneeVarus | AnklePronation | AnkleSupination => {
            let side = plan.side?;
            let (proximal, joint, distal) = (points[0], points[1], points[2]);
            let bow = bow_angle(proximal, joint, distal)?.value();
            let offset = horizontal_offset_from_line(joint, proximal, distal)?;
            let medial = offset * patient_side_sign(view, side.opposite());
            let inward = matches!(deviation_type, KneeValgus | AnklePronation);
            let applies = if inward { medial > EPSILON } else { medial < -EPSILON };
            let value = if applies { bow } else { 0.0 };
            Some((value, DeviationDirection::from_side(side)))
        }
        KneeHyperextension => {
            let (hip, knee, ankle) = (points[0], points[1], points[2]);
            let bow = bow_angle(hip, knee, ankle)?.value();
            let offset = horizontal_offset_from_line(knee, hip, ankle)?;
            if offset * forward < -EPSILON {
                Some((bow, DeviationDirection::Backward))
            } else {
                Some((0.0, DeviationDirection::Neutral))
            }
        }
        WeightShift => {
            let shoulders = points[0].midpoint(points[1]);
            let ankles = points[2].midpoint(points[3]);
            let offset = (shoulders.x - ankles.x) * scale.factor;
            Some((offset.abs(), side_of_offset(view, offset)))
        }
    }
}

fn format_names(names: &[LandmarkName]) -> String {
    names
        .iter()
        .map(|n| format!("{:?}", n))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolve a plan's landmarks, or explain why it cannot be measured.
fn resolve_plan(
    landmarks: &[Landmark],
    plan: &MeasurementPlan,
    min_confidence: f64,
) -> Result<Vec<Point>, (WarningKind, Vec<LandmarkName>)> {
    let mut missing = Vec::new();
    let mut weak = Vec::new();
    let mut points = Vec::with_capacity(plan.landmarks.len());

    for name in &plan.landmarks {
        match landmarks.iter().find(|l| l.name == *name) {
            None => missing.push(*name),
            Some(l) if !l.x.is_finite() || !l.y.is_finite() => missing.push(*name),
            Some(l) if !l.is_confident(min_confidence) => weak.push(*name),
            Some(l) => points.push(l.point()),
        }
    }

    if !missing.is_empty() {
        Err((WarningKind::MissingLandmark, missing))
    } else if !weak.is_empty() {
        Err((WarningKind::LowConfidence, weak))
    } else {
        Ok(points)
    }
}

/// Measure every deviation type applicable to `view`.
pub fn analyze_view(
    landmarks: &[Landmark],
    view: View,
    scale: &ScaleContext,
    settings: &AnalysisSettings,
) -> ViewAnalysis {
    let mut deviations = Vec::new();
    let mut warnings = Vec::new();

    for deviation_type in view_deviation_types(view) {
        for plan in deviation_type.measurement_plans(view) {
            let warning = |kind: WarningKind, names: Vec<LandmarkName>, message: String| {
                AnalysisWarning {
                    view,
                    deviation_type,
                    side: plan.side,
                    kind,
                    landmarks: names,
                    message,
                }
            };

            let points = match resolve_plan(landmarks, &plan, settings.min_landmark_confidence) {
                Ok(points) => points,
                Err((kind, names)) => {
                    let reason = match kind {
                        WarningKind::MissingLandmark => "missing",
                        _ => "below confidence threshold",
                    };
                    let message = format!(
                        "{} not measured in {} view: {} {}",
                        deviation_type.label(),
                        view,
                        reason,
                        format_names(&names)
                    );
                    debug!("{}", message);
                    warnings.push(warning(kind, names, message));
                    continue;
                }
            };

            match measure(deviation_type, view, &plan, &points, scale) {
                Some((value, direction)) if value.is_finite() => {
                    deviations.push(Deviation::from_measurement(
                        deviation_type,
                        view,
                        value,
                        direction,
                        scale,
                    ));
                }
                _ => {
                    let message = format!(
                        "{} not measured in {} view: degenerate landmark geometry",
                        deviation_type.label(),
                        view
                    );
                    debug!("{}", message);
                    warnings.push(warning(
                        WarningKind::DegenerateGeometry,
                        plan.landmarks.clone(),
                        message,
                    ));
                }
            }
        }
    }

    ViewAnalysis {
        view,
        deviations,
        warnings,
        scale: *scale,
    }
}

/// Analyze one image, deriving its reference scale from its own landmarks.
pub fn analyze_image(
    image: &Image,
    patient_height_cm: Option<f64>,
    settings: &AnalysisSettings,
) -> ViewAnalysis {
    let scale = ScaleContext::from_landmarks(
        &image.landmarks,
        settings.min_landmark_confidence,
        settings.min_body_extent,
        patient_height_cm,
    );
    if !scale.body_normalized {
        debug!(
            "{} view: body extent {:.3} below {:.3}, level differences stay in image units",
            image.view, scale.body_extent, settings.min_body_extent
        );
    }
    analyze_view(&image.landmarks, image.view, &scale, settings)
}

/// Maximum severity over all deviations; `Minimal` when there are none.
pub fn overall_severity(deviations: &[Deviation]) -> Severity {
    deviations
        .iter()
        .map(|d| d.severity)
        .max()
        .unwrap_or_default()
}

fn describe(deviation: &Deviation) -> String {
    let mut detail = vec![
        deviation.severity.label().to_string(),
        deviation
            .measurement_unit
            .format_value(deviation.measurement_value),
    ];
    let direction = deviation.direction.label();
    if !direction.is_empty() {
        detail.push(direction.to_string());
    }
    if let Some(cm) = deviation.measurement_cm {
        detail.push(format!("{:.1} cm", cm.abs()));
    }
    format!(
        "{} in {} view ({})",
        deviation.deviation_type.label().to_lowercase(),
        deviation.view,
        detail.join(", ")
    )
}

/// Human-readable summary grouping out-of-range deviations by body region.
pub fn summarize_deviations(deviations: &[Deviation]) -> String {
    if deviations.is_empty() {
        return "No deviations could be measured from the analyzed images.".to_string();
    }

    let flagged: Vec<&Deviation> = deviations.iter().filter(|d| d.is_out_of_range()).collect();
    if flagged.is_empty() {
        return format!(
            "All {} measured deviations are within normal limits.",
            deviations.len()
        );
    }

    let mut parts = vec![format!(
        "Overall severity is {}. {} of {} measurements fall outside normal limits.",
        overall_severity(deviations),
        flagged.len(),
        deviations.len()
    )];

    for region in BodyRegion::ALL {
        let mut in_region: Vec<&Deviation> = flagged
            .iter()
            .copied()
            .filter(|d| d.deviation_type.region() == region)
            .collect();
        if in_region.is_empty() {
            continue;
        }
        in_region.sort_by(|a, b| b.severity.cmp(&a.severity));
        let items: Vec<String> = in_region.iter().map(|d| describe(d)).collect();
        parts.push(format!("{}: {}.", region.label(), items.join("; ")));
    }

    parts.join(" ")
}

/// Combine per-view results into the assessment-level analysis.
///
/// View results are reordered by view so the output does not depend on the
/// order in which concurrent per-image work completed.
pub fn aggregate_views(mut views: Vec<ViewAnalysis>, landmark_checksum: String) -> AssessmentAnalysis {
    views.sort_by_key(|v| v.view);

    let mut deviations = Vec::new();
    let mut warnings = Vec::new();
    for view in views {
        deviations.extend(view.deviations);
        warnings.extend(view.warnings);
    }

    let overall_severity = overall_severity(&deviations);
    let summary = summarize_deviations(&deviations);
    AssessmentAnalysis {
        deviations,
        overall_severity,
        summary,
        warnings,
        landmark_checksum,
    }
}

/// Analyze every analyzed image of an assessment.
///
/// Rejects with `PreconditionNotMet` when no image has been analyzed.
/// Zero resulting deviations is a valid outcome.
pub fn analyze_assessment(
    images: &[Image],
    patient_height_cm: Option<f64>,
    settings: &AnalysisSettings,
) -> EngineResult<AssessmentAnalysis> {
    let analyzed: Vec<&Image> = images.iter().filter(|i| i.is_analyzed()).collect();
    if analyzed.is_empty() {
        warn!("Analysis requested with no analyzed images");
        return Err(EngineError::no_analyzed_images());
    }

    let views = analyzed
        .iter()
        .map(|image| analyze_image(image, patient_height_cm, settings))
        .collect();
    let analysis = aggregate_views(views, landmark_checksum(images));
    debug!(
        "Analyzed {} images: {} deviations, {} warnings, overall {}",
        analyzed.len(),
        analysis.deviations.len(),
        analysis.warnings.len(),
        analysis.overall_severity
    );
    Ok(analysis)
}

/// Store an analysis on its assessment, replacing earlier results.
pub fn apply_analysis(assessment: &mut Assessment, analysis: &AssessmentAnalysis) {
    assessment.deviations = analysis.deviations.clone();
    assessment.overall_severity = Some(analysis.overall_severity);
    assessment.summary = Some(analysis.summary.clone());
    assessment.landmark_checksum = Some(analysis.landmark_checksum.clone());
}

#[cfg(test)]
#[path = "analysis_tests.rs"]
mod analysis_tests;
