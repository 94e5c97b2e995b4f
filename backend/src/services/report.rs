//! Report Generator.
//!
//! Projects a [`ComparisonResult`] plus caller-supplied identities into a
//! structured [`ProgressReport`] and renders it as a self-contained HTML
//! document. Both are pure functions of their inputs.

use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::api::{
    ComparisonCounts, ComparisonResult, ComparisonStatus, DeviationComparison, MeasurementRow,
    MeasurementTable, ProgressReport, ReportBundle, ReportHeader, ReportIdentities,
    SignatureBlock, TreatmentGoalProgress, ViewComparison, ViewSummary,
};
use crate::models::{Deviation, Severity};

pub const REPORT_TITLE: &str = "Postural Progress Report";

fn format_date(date: DateTime<Utc>) -> String {
    date.format("%B %-d, %Y").to_string()
}

fn overall_change(previous: Severity, current: Severity) -> String {
    match current.cmp(&previous) {
        std::cmp::Ordering::Less => format!("Improved from {} to {}", previous, current),
        std::cmp::Ordering::Greater => format!("Worsened from {} to {}", previous, current),
        std::cmp::Ordering::Equal => format!("Unchanged at {}", current),
    }
}

fn deviation_name(cmp: &DeviationComparison) -> String {
    match cmp.side {
        Some(side) => format!("{} ({})", cmp.deviation_type.label(), side),
        None => cmp.deviation_type.label().to_string(),
    }
}

fn value_text(deviation: Option<&Deviation>) -> String {
    deviation
        .map(|d| d.measurement_unit.format_value(d.measurement_value))
        .unwrap_or_else(|| "n/a".to_string())
}

fn change_text(cmp: &DeviationComparison) -> String {
    match cmp.value_delta {
        Some(delta) => {
            let formatted = cmp.unit.format_value(delta);
            if delta > 0.0 {
                format!("+{}", formatted)
            } else {
                formatted
            }
        }
        None => cmp.status.label().to_string(),
    }
}

/// One-line state of a view at one end of the comparison.
fn view_state<'a, I>(analyzed: bool, deviations: I) -> String
where
    I: Iterator<Item = &'a Deviation>,
{
    if !analyzed {
        return "Not analyzed".to_string();
    }
    let outside: Vec<&Deviation> = deviations.filter(|d| d.is_out_of_range()).collect();
    match outside.iter().map(|d| d.severity).max() {
        None => "Within normal limits".to_string(),
        Some(worst) => format!(
            "{} deviation{} outside normal limits (worst: {})",
            outside.len(),
            if outside.len() == 1 { "" } else { "s" },
            worst
        ),
    }
}

fn view_summary(view: &ViewComparison) -> ViewSummary {
    let mut counts = ComparisonCounts::default();
    for cmp in &view.comparisons {
        counts.record(cmp.status);
    }
    ViewSummary {
        view: view.view,
        label: view.view.label().to_string(),
        before: view_state(
            view.previous_analyzed,
            view.comparisons.iter().filter_map(|c| c.previous.as_ref()),
        ),
        after: view_state(
            view.current_analyzed,
            view.comparisons.iter().filter_map(|c| c.current.as_ref()),
        ),
        counts,
    }
}

fn measurement_table(view: &ViewComparison) -> MeasurementTable {
    let rows = view
        .comparisons
        .iter()
        .map(|cmp| {
            let (min, max) = cmp.deviation_type.normal_range();
            MeasurementRow {
                deviation: deviation_name(cmp),
                previous: value_text(cmp.previous.as_ref()),
                current: value_text(cmp.current.as_ref()),
                change: change_text(cmp),
                normal_range: format!(
                    "{} to {}",
                    cmp.unit.format_value(min),
                    cmp.unit.format_value(max)
                ),
                previous_severity: cmp.previous_severity(),
                current_severity: cmp.current_severity(),
                status: cmp.status,
            }
        })
        .collect();
    MeasurementTable {
        view: view.view,
        title: format!("{} view measurements", view.view.label()),
        rows,
    }
}

fn largest_change<'a>(
    comparison: &'a ComparisonResult,
    statuses: &[ComparisonStatus],
    decrease: bool,
) -> Option<&'a DeviationComparison> {
    comparison
        .all_comparisons()
        .filter(|c| statuses.contains(&c.status))
        .max_by(|a, b| {
            if decrease {
                b.amount_delta.total_cmp(&a.amount_delta)
            } else {
                a.amount_delta.total_cmp(&b.amount_delta)
            }
        })
}

/// Narrative paragraph: the comparison summary plus the largest single
/// improvement and worsening.
fn narrative(comparison: &ComparisonResult) -> String {
    let mut text = comparison.summary.clone();

    let improved = [ComparisonStatus::Improved, ComparisonStatus::Resolved];
    if let Some(cmp) = largest_change(comparison, &improved, true) {
        text.push_str(&format!(
            " The largest improvement was in {} on the {} view, from {} to {}.",
            deviation_name(cmp).to_lowercase(),
            cmp.view.label().to_lowercase(),
            value_text(cmp.previous.as_ref()),
            value_text(cmp.current.as_ref())
        ));
    }
    let worsened = [ComparisonStatus::Worsened, ComparisonStatus::New];
    if let Some(cmp) = largest_change(comparison, &worsened, false) {
        text.push_str(&format!(
            " The largest increase was in {} on the {} view, from {} to {}.",
            deviation_name(cmp).to_lowercase(),
            cmp.view.label().to_lowercase(),
            value_text(cmp.previous.as_ref()),
            value_text(cmp.current.as_ref())
        ));
    }
    text
}

/// Assemble the structured report.
pub fn build_progress_report(
    comparison: &ComparisonResult,
    identities: &ReportIdentities,
    goals: &[TreatmentGoalProgress],
) -> ProgressReport {
    let header = ReportHeader {
        title: REPORT_TITLE.to_string(),
        organization_name: identities.organization_name.clone(),
        patient_name: identities.patient_name.clone(),
        practitioner_name: identities.practitioner_name.clone(),
        practitioner_title: identities.practitioner_title.clone(),
        previous_date: format_date(comparison.previous_date),
        current_date: format_date(comparison.current_date),
        days_between: comparison.days_between,
        improvement_score: comparison.improvement_score,
        overall_change: overall_change(
            comparison.previous_overall_severity,
            comparison.current_overall_severity,
        ),
    };

    let analyzed_views = comparison
        .views
        .iter()
        .filter(|v| v.previous_analyzed || v.current_analyzed || !v.comparisons.is_empty());

    let signed_by = match &identities.practitioner_title {
        Some(title) => format!("{}, {}", identities.practitioner_name, title),
        None => identities.practitioner_name.clone(),
    };

    ProgressReport {
        header,
        view_summaries: analyzed_views.clone().map(view_summary).collect(),
        measurement_tables: analyzed_views
            .filter(|v| !v.comparisons.is_empty())
            .map(measurement_table)
            .collect(),
        narrative: narrative(comparison),
        recommendations: comparison
            .recommendations
            .iter()
            .map(|r| r.text.clone())
            .collect(),
        goals: goals.to_vec(),
        signature: SignatureBlock {
            practitioner_name: identities.practitioner_name.clone(),
            practitioner_title: identities.practitioner_title.clone(),
            organization_name: identities.organization_name.clone(),
            statement: format!(
                "Assessed and reported by {} for {}.",
                signed_by, identities.organization_name
            ),
        },
    }
}

/// Build the report and its HTML rendering.
pub fn build_report(
    comparison: &ComparisonResult,
    identities: &ReportIdentities,
    goals: &[TreatmentGoalProgress],
) -> ReportBundle {
    let report = build_progress_report(comparison, identities, goals);
    let html = render_html(&report);
    ReportBundle { report, html }
}

/// Escape text for HTML element and attribute content.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

const STYLE: &str = "body{font-family:sans-serif;margin:2em;color:#222}\
table{border-collapse:collapse;margin:1em 0}\
th,td{border:1px solid #ccc;padding:4px 8px;text-align:left}\
.improved,.resolved{color:#1a7f37}.worsened,.new{color:#b42318}.not-measured{color:#667085}";

fn optional(text: &Option<String>) -> String {
    text.as_deref().map(escape_html).unwrap_or_default()
}

fn write_document(out: &mut String, report: &ProgressReport) -> std::fmt::Result {
    let h = &report.header;
    writeln!(out, "<!DOCTYPE html>")?;
    writeln!(out, "<html lang=\"en\">")?;
    writeln!(
        out,
        "<head><meta charset=\"utf-8\"><title>{} - {}</title><style>{}</style></head>",
        escape_html(&h.title),
        escape_html(&h.patient_name),
        STYLE
    )?;
    writeln!(out, "<body>")?;

    writeln!(out, "<header>")?;
    writeln!(out, "<h1>{}</h1>", escape_html(&h.title))?;
    writeln!(out, "<p class=\"organization\">{}</p>", escape_html(&h.organization_name))?;
    writeln!(
        out,
        "<p>Patient: <strong>{}</strong></p>",
        escape_html(&h.patient_name)
    )?;
    writeln!(
        out,
        "<p>Assessments: {} and {} ({} days apart)</p>",
        escape_html(&h.previous_date),
        escape_html(&h.current_date),
        h.days_between
    )?;
    writeln!(
        out,
        "<p>Improvement score: <strong>{:.1}</strong> / 100. {}.</p>",
        h.improvement_score,
        escape_html(&h.overall_change)
    )?;
    writeln!(out, "</header>")?;

    writeln!(out, "<section><h2>Summary</h2><p>{}</p></section>", escape_html(&report.narrative))?;

    if !report.view_summaries.is_empty() {
        writeln!(out, "<section><h2>Views</h2><table>")?;
        writeln!(
            out,
            "<tr><th>View</th><th>Before</th><th>After</th><th>Improved</th><th>Worsened</th></tr>"
        )?;
        for summary in &report.view_summaries {
            writeln!(
                out,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_html(&summary.label),
                escape_html(&summary.before),
                escape_html(&summary.after),
                summary.counts.better(),
                summary.counts.worse()
            )?;
        }
        writeln!(out, "</table></section>")?;
    }

    for table in &report.measurement_tables {
        writeln!(out, "<section><h2>{}</h2><table>", escape_html(&table.title))?;
        writeln!(
            out,
            "<tr><th>Measurement</th><th>Previous</th><th>Current</th><th>Change</th>\
             <th>Normal range</th><th>Severity</th><th>Status</th></tr>"
        )?;
        for row in &table.rows {
            writeln!(
                out,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{} &rarr; {}</td><td class=\"{}\">{}</td></tr>",
                escape_html(&row.deviation),
                escape_html(&row.previous),
                escape_html(&row.current),
                escape_html(&row.change),
                escape_html(&row.normal_range),
                row.previous_severity,
                row.current_severity,
                row.status.label().replace(' ', "-"),
                row.status.label()
            )?;
        }
        writeln!(out, "</table></section>")?;
    }

    if !report.recommendations.is_empty() {
        writeln!(out, "<section><h2>Recommendations</h2><ol>")?;
        for recommendation in &report.recommendations {
            writeln!(out, "<li>{}</li>", escape_html(recommendation))?;
        }
        writeln!(out, "</ol></section>")?;
    }

    if !report.goals.is_empty() {
        writeln!(out, "<section><h2>Treatment goals</h2><table>")?;
        writeln!(
            out,
            "<tr><th>Goal</th><th>Baseline</th><th>Target</th><th>Current</th><th>Progress</th><th>Status</th></tr>"
        )?;
        for goal in &report.goals {
            let progress = goal
                .progress_percent
                .map(|p| format!("{:.0}%", p))
                .unwrap_or_default();
            writeln!(
                out,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_html(&goal.goal),
                optional(&goal.baseline),
                optional(&goal.target),
                optional(&goal.current),
                progress,
                optional(&goal.status)
            )?;
        }
        writeln!(out, "</table></section>")?;
    }

    let s = &report.signature;
    writeln!(out, "<footer class=\"signature\">")?;
    writeln!(out, "<p>{}</p>", escape_html(&s.statement))?;
    writeln!(
        out,
        "<p>{}<br>{}<br>{}</p>",
        escape_html(&s.practitioner_name),
        optional(&s.practitioner_title),
        escape_html(&s.organization_name)
    )?;
    writeln!(out, "</footer>")?;
    writeln!(out, "</body>")?;
    writeln!(out, "</html>")
}

/// Render the report as a standalone HTML document.
pub fn render_html(report: &ProgressReport) -> String {
    let mut html = String::new();
    write_document(&mut html, report).expect("formatting into a String is infallible");
    html
}
