//! Pure computation services.
//!
//! Every function here works on in-memory assessments and images and has no
//! I/O. Repository-backed orchestration lives in [`crate::db::services`].
//!
//! - [`analysis`]: Deviation Analyzer
//! - [`compare`]: Comparison Engine
//! - [`trends`]: Trend Analyzer
//! - [`overlay`]: Overlay Aligner
//! - [`report`]: Report Generator

pub mod analysis;

pub mod compare;

pub mod overlay;

pub mod report;

pub mod trends;

pub use analysis::{
    aggregate_views, analyze_assessment, analyze_image, analyze_view, apply_analysis,
    overall_severity, summarize_deviations,
};
pub use compare::{compare, improvement_score, score_from_burden};
pub use overlay::align_overlay;
pub use report::{build_progress_report, build_report, render_html};
pub use trends::trend;
