//! Comparison Engine.
//!
//! Matches the deviations of two assessments of one patient view by view,
//! classifies each pair, scores the overall improvement and derives a
//! deterministic narrative with ranked recommendations.

use std::collections::BTreeMap;

use log::debug;

use crate::api::{
    ComparisonCounts, ComparisonResult, ComparisonStatus, DeviationComparison, Recommendation,
    RecommendationKind, ViewComparison,
};
use crate::config::ComparisonSettings;
use crate::error::{EngineError, EngineResult};
use crate::models::{
    view_deviation_types, Assessment, Deviation, DeviationKey, Severity, View,
};

/// Severity-weighted, unit-normalized size of a deviation.
pub fn weighted_amount(deviation: &Deviation) -> f64 {
    deviation.severity.weight() * deviation.normalized_amount()
}

fn weighted(deviation: Option<&Deviation>) -> f64 {
    deviation.map(weighted_amount).unwrap_or(0.0)
}

/// Validate that two assessments can be compared.
///
/// Ordering problems are reported before completeness so callers see the
/// most fundamental rejection first.
pub fn check_comparable(previous: &Assessment, current: &Assessment) -> EngineResult<()> {
    if previous.patient_id != current.patient_id {
        return Err(EngineError::PatientMismatch {
            previous: previous.patient_id,
            current: current.patient_id,
        });
    }
    if previous.assessment_date >= current.assessment_date {
        return Err(EngineError::invalid_ordering(format!(
            "previous assessment ({}) must be dated strictly before current assessment ({})",
            previous.assessment_date.format("%Y-%m-%d %H:%M"),
            current.assessment_date.format("%Y-%m-%d %H:%M")
        )));
    }
    if !previous.completed {
        return Err(EngineError::not_completed(previous.id));
    }
    if !current.completed {
        return Err(EngineError::not_completed(current.id));
    }
    Ok(())
}

/// Deviations of `view` restricted to the view's catalog types, keyed for
/// matching. Repeated keys keep the larger amount.
fn keyed_deviations(deviations: &[Deviation], view: View) -> BTreeMap<DeviationKey, &Deviation> {
    let types = view_deviation_types(view);
    let mut keyed: BTreeMap<DeviationKey, &Deviation> = BTreeMap::new();
    for deviation in deviations
        .iter()
        .filter(|d| d.view == view && types.contains(&d.deviation_type))
    {
        keyed
            .entry(deviation.key())
            .and_modify(|existing| {
                if deviation.deviation_amount > existing.deviation_amount {
                    *existing = deviation;
                }
            })
            .or_insert(deviation);
    }
    keyed
}

/// Classify one matched pair. An absent side counts as zero amount.
pub fn classify_change(
    previous: Option<&Deviation>,
    current: Option<&Deviation>,
    tolerance: f64,
) -> ComparisonStatus {
    let before = previous.map(|d| d.deviation_amount).unwrap_or(0.0);
    let after = current.map(|d| d.deviation_amount).unwrap_or(0.0);

    if before == 0.0 && after == 0.0 {
        ComparisonStatus::Stable
    } else if after == 0.0 {
        ComparisonStatus::Resolved
    } else if before == 0.0 {
        ComparisonStatus::New
    } else {
        let delta = after - before;
        if delta.abs() <= tolerance {
            ComparisonStatus::Stable
        } else if delta < 0.0 {
            ComparisonStatus::Improved
        } else {
            ComparisonStatus::Worsened
        }
    }
}

fn compare_pair(
    key: DeviationKey,
    previous: Option<&Deviation>,
    current: Option<&Deviation>,
    measured_both: bool,
    settings: &ComparisonSettings,
) -> DeviationComparison {
    let unit = key.deviation_type.unit();
    let status = if measured_both {
        classify_change(previous, current, settings.tolerance(unit))
    } else {
        ComparisonStatus::NotMeasured
    };
    let previous_amount = previous.map(|d| d.deviation_amount).unwrap_or(0.0);
    let current_amount = current.map(|d| d.deviation_amount).unwrap_or(0.0);
    let severity_of = |d: Option<&Deviation>| d.map(|d| d.severity).unwrap_or_default().rank();

    DeviationComparison {
        deviation_type: key.deviation_type,
        view: key.view,
        side: key.side,
        status,
        unit,
        previous: previous.cloned(),
        current: current.cloned(),
        value_delta: match (previous, current) {
            (Some(p), Some(c)) => Some(c.measurement_value - p.measurement_value),
            _ => None,
        },
        previous_amount,
        current_amount,
        amount_delta: current_amount - previous_amount,
        severity_delta: severity_of(current) - severity_of(previous),
    }
}

fn is_view_analyzed(assessment: &Assessment, view: View) -> bool {
    assessment.image(view).is_some_and(|i| i.is_analyzed())
}

/// Compare the deviations of one view.
///
/// When the view was analyzed on only one visit every entry is
/// `NotMeasured`: an absent image is missing data, not a resolution.
pub fn compare_view(
    view: View,
    previous: &Assessment,
    current: &Assessment,
    settings: &ComparisonSettings,
) -> ViewComparison {
    let previous_analyzed = is_view_analyzed(previous, view);
    let current_analyzed = is_view_analyzed(current, view);
    let measured_both = previous_analyzed && current_analyzed;
    let before = keyed_deviations(&previous.deviations, view);
    let after = keyed_deviations(&current.deviations, view);

    let mut keys: Vec<DeviationKey> = before.keys().chain(after.keys()).copied().collect();
    keys.sort();
    keys.dedup();

    let comparisons = keys
        .into_iter()
        .map(|key| {
            compare_pair(
                key,
                before.get(&key).copied(),
                after.get(&key).copied(),
                measured_both,
                settings,
            )
        })
        .collect();

    ViewComparison {
        view,
        previous_analyzed,
        current_analyzed,
        comparisons,
    }
}

/// Improvement score in `[0, 100]` from previous and current burdens.
///
/// `B` and `C` are the severity-weighted normalized amounts before and after.
/// With a previous burden the score is `50 + 50·(B − C)/B`, clamped; without
/// one it is 100 when nothing was found and decays from 50 as new burden
/// grows. Rounded to one decimal.
pub fn score_from_burden(previous_burden: f64, current_burden: f64) -> f64 {
    let raw = if previous_burden > 0.0 {
        50.0 + 50.0 * (previous_burden - current_burden) / previous_burden
    } else if current_burden > 0.0 {
        50.0 / (1.0 + current_burden)
    } else {
        100.0
    };
    (raw.clamp(0.0, 100.0) * 10.0).round() / 10.0
}

/// Improvement score over a set of matched comparisons. `NotMeasured`
/// entries carry no burden on either side.
pub fn improvement_score<'a, I>(comparisons: I) -> f64
where
    I: IntoIterator<Item = &'a DeviationComparison>,
{
    let (before, after) = comparisons
        .into_iter()
        .filter(|cmp| cmp.status.is_tracked())
        .fold((0.0, 0.0), |(b, c), cmp| {
            (
                b + weighted(cmp.previous.as_ref()),
                c + weighted(cmp.current.as_ref()),
            )
        });
    score_from_burden(before, after)
}

fn elapsed_phrase(days: i64) -> String {
    match days {
        0 => "on the same day".to_string(),
        1 => "over 1 day".to_string(),
        n => format!("over {} days", n),
    }
}

/// Narrative summary, a pure function of the comparison data.
pub fn build_summary(
    counts: &ComparisonCounts,
    score: f64,
    days_between: i64,
    previous_severity: Severity,
    current_severity: Severity,
) -> String {
    if counts.total() == 0 {
        return format!(
            "No comparable measurements were found {}.",
            elapsed_phrase(days_between)
        );
    }

    let mut text = format!(
        "{} of {} tracked measurements improved {} ({} resolved), {} worsened ({} new) and {} remained stable.",
        counts.better(),
        counts.total(),
        elapsed_phrase(days_between),
        counts.resolved,
        counts.worse(),
        counts.new,
        counts.stable
    );
    text.push_str(&format!(" Improvement score: {:.1}/100.", score));
    if counts.not_measured > 0 {
        text.push_str(&format!(
            " {} measurement{} could not be compared because the view was analyzed on one visit only.",
            counts.not_measured,
            if counts.not_measured == 1 { "" } else { "s" }
        ));
    }
    if previous_severity == current_severity {
        text.push_str(&format!(" Overall severity remains {}.", current_severity));
    } else {
        text.push_str(&format!(
            " Overall severity moved from {} to {}.",
            previous_severity, current_severity
        ));
    }
    text
}

fn subject(cmp: &DeviationComparison) -> String {
    match cmp.side {
        Some(side) => format!(
            "{} ({}, {} view)",
            cmp.deviation_type.label(),
            side,
            cmp.view
        ),
        None => format!("{} ({} view)", cmp.deviation_type.label(), cmp.view),
    }
}

fn format_deviation(deviation: Option<&Deviation>) -> String {
    match deviation {
        Some(d) => d.measurement_unit.format_value(d.measurement_value),
        None => "not measured".to_string(),
    }
}

/// Ranked recommendations: worsened and new first by weighted increase,
/// then persisting moderate-or-worse deviations, then a maintenance note.
pub fn build_recommendations(comparisons: &[&DeviationComparison]) -> Vec<Recommendation> {
    let mut items: Vec<(RecommendationKind, &DeviationComparison, String)> = Vec::new();

    let mut worse: Vec<&DeviationComparison> = comparisons
        .iter()
        .copied()
        .filter(|c| matches!(c.status, ComparisonStatus::Worsened | ComparisonStatus::New))
        .collect();
    worse.sort_by(|a, b| {
        let increase = |c: &DeviationComparison| {
            weighted(c.current.as_ref()) - weighted(c.previous.as_ref())
        };
        increase(b).total_cmp(&increase(a))
    });
    for cmp in worse {
        let text = match cmp.status {
            ComparisonStatus::New => format!(
                "New finding: {} at {} severity ({}). {}.",
                subject(cmp),
                cmp.current_severity(),
                format_deviation(cmp.current.as_ref()),
                cmp.deviation_type.recommendation()
            ),
            _ => format!(
                "{} worsened from {} to {}. {}.",
                subject(cmp),
                format_deviation(cmp.previous.as_ref()),
                format_deviation(cmp.current.as_ref()),
                cmp.deviation_type.recommendation()
            ),
        };
        items.push((RecommendationKind::Address, cmp, text));
    }

    let mut persisting: Vec<&DeviationComparison> = comparisons
        .iter()
        .copied()
        .filter(|c| {
            matches!(c.status, ComparisonStatus::Improved | ComparisonStatus::Stable)
                && c.current_severity() >= Severity::Moderate
        })
        .collect();
    persisting.sort_by(|a, b| {
        b.current_severity()
            .cmp(&a.current_severity())
            .then_with(|| weighted(b.current.as_ref()).total_cmp(&weighted(a.current.as_ref())))
    });
    for cmp in persisting {
        let text = format!(
            "{} remains {} ({}). Continue: {}.",
            subject(cmp),
            cmp.current_severity(),
            format_deviation(cmp.current.as_ref()),
            cmp.deviation_type.recommendation().to_lowercase()
        );
        items.push((RecommendationKind::Monitor, cmp, text));
    }

    // One entry per deviation type and side within a kind; the first is the
    // highest ranked.
    let mut seen = std::collections::HashSet::new();
    let mut recommendations: Vec<Recommendation> = Vec::new();
    for (kind, cmp, text) in items {
        if !seen.insert((kind, cmp.deviation_type, cmp.side)) {
            continue;
        }
        recommendations.push(Recommendation {
            rank: recommendations.len() + 1,
            kind,
            deviation_type: Some(cmp.deviation_type),
            view: Some(cmp.view),
            text,
        });
    }

    let better = comparisons
        .iter()
        .filter(|c| matches!(c.status, ComparisonStatus::Improved | ComparisonStatus::Resolved))
        .count();
    let maintenance = if better > 0 {
        Some(format!(
            "Maintain the current care plan to consolidate {} improved measurement{}.",
            better,
            if better == 1 { "" } else { "s" }
        ))
    } else if recommendations.is_empty() {
        Some("No worsening detected. Continue the current care plan and reassess at the next visit.".to_string())
    } else {
        None
    };
    if let Some(text) = maintenance {
        recommendations.push(Recommendation {
            rank: recommendations.len() + 1,
            kind: RecommendationKind::Maintain,
            deviation_type: None,
            view: None,
            text,
        });
    }

    recommendations
}

/// Overall severity over the views analyzed on both visits.
fn measured_severity(assessment: &Assessment, views: &[ViewComparison]) -> Severity {
    views
        .iter()
        .filter(|v| v.previous_analyzed && v.current_analyzed)
        .flat_map(|v| assessment.deviations_for_view(v.view))
        .map(|d| d.severity)
        .max()
        .unwrap_or_default()
}

/// Compare two completed assessments of one patient.
///
/// Rejects with `InvalidOrdering` when the patients differ or the previous
/// assessment is not strictly earlier, and with `PreconditionNotMet` when
/// either assessment is incomplete. Nothing is computed in those cases.
pub fn compare(
    previous: &Assessment,
    current: &Assessment,
    settings: &ComparisonSettings,
) -> EngineResult<ComparisonResult> {
    check_comparable(previous, current)?;

    let views: Vec<ViewComparison> = View::ALL
        .iter()
        .map(|view| compare_view(*view, previous, current, settings))
        .collect();

    let mut counts = ComparisonCounts::default();
    for cmp in views.iter().flat_map(|v| v.comparisons.iter()) {
        counts.record(cmp.status);
    }

    let all: Vec<&DeviationComparison> = views.iter().flat_map(|v| v.comparisons.iter()).collect();
    let improvement_score = improvement_score(all.iter().copied());
    let days_between = (current.assessment_date - previous.assessment_date).num_days();
    let previous_overall_severity = measured_severity(previous, &views);
    let current_overall_severity = measured_severity(current, &views);
    let summary = build_summary(
        &counts,
        improvement_score,
        days_between,
        previous_overall_severity,
        current_overall_severity,
    );
    let recommendations = build_recommendations(&all);

    debug!(
        "Compared assessments {:?} -> {:?}: {} comparisons, score {:.1}",
        previous.id,
        current.id,
        counts.total(),
        improvement_score
    );

    Ok(ComparisonResult {
        patient_id: current.patient_id,
        previous_assessment_id: previous.id,
        current_assessment_id: current.id,
        previous_date: previous.assessment_date,
        current_date: current.assessment_date,
        days_between,
        views,
        counts,
        previous_overall_severity,
        current_overall_severity,
        improvement_score,
        summary,
        recommendations,
    })
}

#[cfg(test)]
#[path = "compare_tests.rs"]
mod compare_tests;
