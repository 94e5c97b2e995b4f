//! Geometric algorithms over landmark coordinates.
//!
//! # Components
//!
//! - [`geometry`]: angles, level differences and reference scale
//! - [`procrustes`]: closed-form weighted similarity fit between point sets

pub mod geometry;
pub mod procrustes;

pub use geometry::{
    angle_between, bow_angle, horizontal_offset_from_line, inclination_from_vertical,
    level_difference, tilt_from_horizontal, Axis, Point, ScaleContext,
};
pub use procrustes::{fit_similarity, PointPair, SimilarityFit};
