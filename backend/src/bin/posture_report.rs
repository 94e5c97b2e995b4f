//! Posture progress report tool.
//!
//! Reads two assessment payloads with detector output, analyzes and completes
//! both through the in-memory repository, compares them and prints the
//! structured progress report as JSON.
//!
//! # Usage
//!
//! ```bash
//! posture-report previous.json current.json \
//!     --patient "Jane Doe" --practitioner "Dr. A. Smith" \
//!     --organization "Harbor Spine & Posture" --html report.html
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Log level (default: info)
//! - `POSTURE_*`: Engine settings, see `engine.toml`

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use posture_engine::api::ReportIdentities;
use posture_engine::db::{services, LocalRepository};
use posture_engine::models::parse_assessment_file;
use posture_engine::EngineConfig;

#[derive(Parser, Debug)]
#[command(name = "posture-report")]
#[command(version, about = "Compare two posture assessments and print a progress report", long_about = None)]
struct Args {
    /// Earlier assessment payload
    previous: PathBuf,

    /// Later assessment payload
    current: PathBuf,

    /// Also write the HTML report to this file
    #[arg(long)]
    html: Option<PathBuf>,

    /// Patient name shown in the report header
    #[arg(long, default_value = "Patient")]
    patient: String,

    /// Practitioner signing the report
    #[arg(long, default_value = "Practitioner")]
    practitioner: String,

    /// Practitioner title, e.g. DC
    #[arg(long)]
    title: Option<String>,

    /// Clinic or organization name
    #[arg(long, default_value = "Clinic")]
    organization: String,
}

impl Args {
    fn identities(&self) -> ReportIdentities {
        ReportIdentities {
            patient_name: self.patient.clone(),
            practitioner_name: self.practitioner.clone(),
            practitioner_title: self.title.clone(),
            organization_name: self.organization.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    FmtSubscriber::builder()
        .with_max_level(
            env::var("RUST_LOG")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(Level::INFO),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let config = EngineConfig::load().context("Failed to load engine configuration")?;

    let repo = LocalRepository::new();
    let mut ids = Vec::with_capacity(2);
    for path in [&args.previous, &args.current] {
        let mut assessment = parse_assessment_file(path)?;
        // Stored fresh so analysis and completion run through the service layer.
        assessment.id = None;
        assessment.completed = false;
        let id = services::store_assessment(&repo, &assessment).await?;
        let completed = services::complete_assessment(&repo, id, &config.analysis).await?;
        info!(
            "{}: {} deviations, overall {}",
            path.display(),
            completed.deviations.len(),
            completed
                .overall_severity
                .map(|s| s.to_string())
                .unwrap_or_default()
        );
        ids.push(id);
    }

    let bundle = services::progress_report(
        &repo,
        ids[0],
        ids[1],
        &config.comparison,
        &args.identities(),
        &[],
    )
    .await?;

    println!("{}", serde_json::to_string_pretty(&bundle.report)?);

    if let Some(path) = &args.html {
        std::fs::write(path, &bundle.html)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("HTML report written to {}", path.display());
    }

    Ok(())
}
