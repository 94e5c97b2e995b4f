//! Trend Analyzer.
//!
//! Turns an ordered sequence of completed assessments into one time series
//! per deviation type (and side for per-leg types) with a direction.

use std::collections::BTreeMap;

use log::{debug, warn};

use crate::api::{TrendDirection, TrendPoint, TrendSeries};
use crate::config::TrendSettings;
use crate::error::{EngineError, EngineResult};
use crate::models::{Assessment, Deviation, DeviationType, Side};

type SeriesKey = (DeviationType, Option<Side>);

/// Check that assessments share a patient and have strictly ascending dates.
pub fn check_sequence(assessments: &[Assessment]) -> EngineResult<()> {
    let Some(first) = assessments.first() else {
        return Ok(());
    };
    for pair in assessments.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);
        if current.patient_id != first.patient_id {
            return Err(EngineError::PatientMismatch {
                previous: first.patient_id,
                current: current.patient_id,
            });
        }
        if previous.assessment_date >= current.assessment_date {
            return Err(EngineError::invalid_ordering(format!(
                "assessments must be in strictly ascending date order ({} is not before {})",
                previous.assessment_date.format("%Y-%m-%d %H:%M"),
                current.assessment_date.format("%Y-%m-%d %H:%M")
            )));
        }
    }
    Ok(())
}

fn series_key(deviation: &Deviation) -> SeriesKey {
    (deviation.deviation_type, deviation.key().side)
}

/// The worst measurement of each key within one assessment.
fn worst_per_key<'a>(
    assessment: &'a Assessment,
    filter: Option<DeviationType>,
) -> BTreeMap<SeriesKey, &'a Deviation> {
    let mut worst: BTreeMap<SeriesKey, &Deviation> = BTreeMap::new();
    for deviation in assessment
        .deviations
        .iter()
        .filter(|d| filter.map_or(true, |t| d.deviation_type == t))
    {
        worst
            .entry(series_key(deviation))
            .and_modify(|existing| {
                if deviation.deviation_amount > existing.deviation_amount {
                    *existing = deviation;
                }
            })
            .or_insert(deviation);
    }
    worst
}

/// Direction of a series from its first and last points.
///
/// A change in value below `threshold` is stable. Otherwise the series is
/// judged on deviation amount, so values moving back toward the normal range
/// from either side count as improving.
pub fn classify_direction(points: &[TrendPoint], threshold: f64) -> TrendDirection {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return TrendDirection::InsufficientData;
    };
    if points.len() < 2 {
        return TrendDirection::InsufficientData;
    }
    if (last.value - first.value).abs() < threshold {
        return TrendDirection::Stable;
    }
    if last.deviation_amount < first.deviation_amount {
        TrendDirection::Improving
    } else if last.deviation_amount > first.deviation_amount {
        TrendDirection::Worsening
    } else {
        TrendDirection::Stable
    }
}

fn build_series(key: SeriesKey, points: Vec<TrendPoint>, settings: &TrendSettings) -> TrendSeries {
    let (deviation_type, side) = key;
    let unit = deviation_type.unit();
    let (normal_range_min, normal_range_max) = deviation_type.normal_range();
    let direction = classify_direction(&points, settings.threshold(unit));

    let (change_from_first, change_from_previous, amount_change_from_first) =
        match (points.first(), points.last()) {
            (Some(first), Some(last)) if points.len() >= 2 => (
                Some(last.value - first.value),
                last.change_from_previous,
                Some(last.deviation_amount - first.deviation_amount),
            ),
            _ => (None, None, None),
        };

    TrendSeries {
        deviation_type,
        side,
        unit,
        normal_range_min,
        normal_range_max,
        points,
        direction,
        change_from_first,
        change_from_previous,
        amount_change_from_first,
    }
}

/// Build trend series over assessments of one patient in date order.
///
/// Only completed assessments contribute points. Types observed in fewer
/// than two of them are still reported, as `InsufficientData`.
pub fn trend(
    assessments: &[Assessment],
    deviation_type: Option<DeviationType>,
    settings: &TrendSettings,
) -> EngineResult<Vec<TrendSeries>> {
    check_sequence(assessments)?;

    let mut points: BTreeMap<SeriesKey, Vec<TrendPoint>> = BTreeMap::new();
    for assessment in assessments {
        if !assessment.completed {
            warn!(
                "Skipping incomplete assessment {:?} dated {} in trend",
                assessment.id,
                assessment.assessment_date.format("%Y-%m-%d")
            );
            continue;
        }
        for (key, deviation) in worst_per_key(assessment, deviation_type) {
            let series = points.entry(key).or_default();
            let change_from_previous = series
                .last()
                .map(|p| deviation.measurement_value - p.value);
            series.push(TrendPoint {
                assessment_id: assessment.id,
                date: assessment.assessment_date,
                view: deviation.view,
                value: deviation.measurement_value,
                deviation_amount: deviation.deviation_amount,
                severity: deviation.severity,
                change_from_previous,
            });
        }
    }

    let series: Vec<TrendSeries> = points
        .into_iter()
        .map(|(key, points)| build_series(key, points, settings))
        .collect();
    debug!(
        "Built {} trend series from {} assessments",
        series.len(),
        assessments.len()
    );
    Ok(series)
}

#[cfg(test)]
#[path = "trends_tests.rs"]
mod trends_tests;
