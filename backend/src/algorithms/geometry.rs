//! Geometry primitives over normalized landmark coordinates.
//!
//! All functions are pure. Degenerate configurations (coincident points,
//! zero-length segments) yield `None` rather than `NaN` so callers can record
//! the measurement as insufficient data.

use qtty::Degrees;
use serde::{Deserialize, Serialize};

use crate::models::landmark::Landmark;

const EPSILON: f64 = 1e-9;

/// A point in normalized image space, optionally carrying depth.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    pub fn with_z(mut self, z: f64) -> Self {
        self.z = Some(z);
        self
    }

    pub fn midpoint(self, other: Point) -> Point {
        let z = match (self.z, other.z) {
            (Some(a), Some(b)) => Some((a + b) / 2.0),
            _ => None,
        };
        Point {
            x: (self.x + other.x) / 2.0,
            y: (self.y + other.y) / 2.0,
            z,
        }
    }

    pub fn distance(self, other: Point) -> f64 {
        let dz = match (self.z, other.z) {
            (Some(a), Some(b)) => a - b,
            _ => 0.0,
        };
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + dz.powi(2)).sqrt()
    }
}

/// Image axis along which a level difference is measured.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    /// y axis: height difference between bilateral landmarks.
    Vertical,
    /// x axis: horizontal displacement.
    Horizontal,
}

/// Angle in degrees at `vertex` subtended by `a` and `b`.
///
/// The computation is 3D only when all three points carry `z`.
pub fn angle_between(a: Point, vertex: Point, b: Point) -> Option<Degrees> {
    let depth = match (a.z, vertex.z, b.z) {
        (Some(az), Some(vz), Some(bz)) => Some((az - vz, bz - vz)),
        _ => None,
    };
    let (az, bz) = depth.unwrap_or((0.0, 0.0));

    let va = (a.x - vertex.x, a.y - vertex.y, az);
    let vb = (b.x - vertex.x, b.y - vertex.y, bz);

    let norm_a = (va.0 * va.0 + va.1 * va.1 + va.2 * va.2).sqrt();
    let norm_b = (vb.0 * vb.0 + vb.1 * vb.1 + vb.2 * vb.2).sqrt();
    if norm_a < EPSILON || norm_b < EPSILON {
        return None;
    }

    let dot = va.0 * vb.0 + va.1 * vb.1 + va.2 * vb.2;
    let cos = (dot / (norm_a * norm_b)).clamp(-1.0, 1.0);
    let radians = cos.acos();
    if radians.is_nan() {
        return None;
    }
    Some(Degrees::new(radians.to_degrees()))
}

/// Deviation from a straight line at `vertex`: `180° - angle(a, vertex, b)`.
pub fn bow_angle(a: Point, vertex: Point, b: Point) -> Option<Degrees> {
    angle_between(a, vertex, b).map(|angle| Degrees::new(180.0 - angle.value()))
}

/// Unsigned tilt of the segment `a`-`b` relative to the horizontal, in `[0, 90]`.
pub fn tilt_from_horizontal(a: Point, b: Point) -> Option<Degrees> {
    let a = Point::new(a.x, a.y);
    let b = Point::new(b.x, b.y);
    let reference = Point::new(a.x + 1.0, a.y);
    let angle = angle_between(b, a, reference)?.value();
    Some(Degrees::new(angle.min(180.0 - angle)))
}

/// Unsigned inclination of `lower -> upper` from the vertical, in `[0, 180]`.
pub fn inclination_from_vertical(lower: Point, upper: Point) -> Option<Degrees> {
    let lower = Point::new(lower.x, lower.y);
    let upper = Point::new(upper.x, upper.y);
    let plumb = Point::new(lower.x, lower.y - 1.0);
    angle_between(upper, lower, plumb)
}

/// Horizontal offset of `p` from the line through `a` and `b`, measured at
/// `p.y`. Positive means `p` lies to the right (+x) of the line.
///
/// Returns `None` for lines without vertical extent.
pub fn horizontal_offset_from_line(p: Point, a: Point, b: Point) -> Option<f64> {
    let dy = b.y - a.y;
    if dy.abs() < EPSILON {
        return None;
    }
    let t = (p.y - a.y) / dy;
    let line_x = a.x + t * (b.x - a.x);
    Some(p.x - line_x)
}

/// Scaled, signed difference `left - right` along `axis`.
pub fn level_difference(left: Point, right: Point, axis: Axis, scale: &ScaleContext) -> f64 {
    let raw = match axis {
        Axis::Vertical => left.y - right.y,
        Axis::Horizontal => left.x - right.x,
    };
    raw * scale.factor
}

/// Normalization applied to level differences so images with different zoom
/// or crop stay comparable.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleContext {
    /// Multiplier applied to raw normalized differences.
    pub factor: f64,
    /// Vertical extent of the confident landmarks in the image.
    pub body_extent: f64,
    /// Whether `factor` normalizes by body extent (full body visible).
    pub body_normalized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_height_cm: Option<f64>,
}

impl Default for ScaleContext {
    fn default() -> Self {
        Self::unscaled()
    }
}

impl ScaleContext {
    /// No correction: differences stay in image units.
    pub fn unscaled() -> Self {
        Self {
            factor: 1.0,
            body_extent: 0.0,
            body_normalized: false,
            patient_height_cm: None,
        }
    }

    /// Derive the scale from the vertical extent of confident landmarks.
    ///
    /// When the extent covers at least `min_body_extent` of the frame the
    /// factor is `1 / extent`, making level differences fractions of the
    /// visible body height. Partial captures keep raw image units.
    pub fn from_landmarks(
        landmarks: &[Landmark],
        min_confidence: f64,
        min_body_extent: f64,
        patient_height_cm: Option<f64>,
    ) -> Self {
        let (min_y, max_y) = landmarks
            .iter()
            .filter(|l| l.is_confident(min_confidence))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), l| {
                (lo.min(l.y), hi.max(l.y))
            });

        let patient_height_cm = patient_height_cm.filter(|h| *h > 0.0);
        if !min_y.is_finite() || !max_y.is_finite() {
            return Self {
                patient_height_cm,
                ..Self::unscaled()
            };
        }

        let body_extent = max_y - min_y;
        if body_extent >= min_body_extent && body_extent > EPSILON {
            Self {
                factor: 1.0 / body_extent,
                body_extent,
                body_normalized: true,
                patient_height_cm,
            }
        } else {
            Self {
                factor: 1.0,
                body_extent,
                body_normalized: false,
                patient_height_cm,
            }
        }
    }

    /// Convert a scaled level difference to centimetres.
    ///
    /// Only meaningful when the scale is body-normalized and the patient
    /// height is known.
    pub fn to_centimeters(&self, level: f64) -> Option<qtty::Centimeters> {
        match (self.body_normalized, self.patient_height_cm) {
            (true, Some(height)) => Some(qtty::Centimeters::new(level * height)),
            _ => None,
        }
    }
}
