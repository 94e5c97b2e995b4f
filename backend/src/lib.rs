//! # Posture Engine
//!
//! Postural deviation analysis and longitudinal comparison for clinical
//! posture assessments.
//!
//! Landmark detection happens elsewhere; this crate takes detected body
//! landmarks per photographed view and turns them into measured deviations,
//! visit-to-visit comparisons, multi-visit trends, overlay alignments and
//! patient-facing progress reports.
//!
//! ## Architecture
//!
//! - [`models`]: Landmarks, images, assessments and the deviation catalog
//! - [`algorithms`]: Plane geometry and similarity fitting
//! - [`services`]: Pure analysis, comparison, trend, overlay and report logic
//! - [`db`]: Repository pattern, in-memory storage and async orchestration
//! - [`api`]: Serializable result types shared by every layer
//! - [`config`]: `engine.toml` plus environment overrides
//! - [`error`]: Typed rejections of the computation core

// RepositoryError carries an ErrorContext for debugging
#![allow(clippy::result_large_err)]

pub mod algorithms;
pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
