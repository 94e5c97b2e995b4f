//! Weighted 2D similarity Procrustes.
//!
//! Finds the scale `s`, rotation `θ` and translation `t` minimizing
//! `Σ wᵢ |s·R(θ)·pᵢ + t − qᵢ|²` in closed form. Reflections are never
//! produced.

use super::geometry::Point;

const EPSILON: f64 = 1e-12;

/// A source/target correspondence with a non-negative weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointPair {
    pub source: Point,
    pub target: Point,
    pub weight: f64,
}

impl PointPair {
    pub fn new(source: Point, target: Point, weight: f64) -> Self {
        Self {
            source,
            target,
            weight,
        }
    }
}

/// Fitted similarity transform and its weighted RMS residual.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityFit {
    pub scale: f64,
    /// Counter-clockwise in image axes, radians.
    pub rotation: f64,
    pub translation_x: f64,
    pub translation_y: f64,
    pub rms_residual: f64,
}

impl SimilarityFit {
    pub fn identity() -> Self {
        Self {
            scale: 1.0,
            rotation: 0.0,
            translation_x: 0.0,
            translation_y: 0.0,
            rms_residual: 0.0,
        }
    }

    pub fn apply(&self, p: Point) -> Point {
        let (sin, cos) = self.rotation.sin_cos();
        Point::new(
            self.scale * (cos * p.x - sin * p.y) + self.translation_x,
            self.scale * (sin * p.x + cos * p.y) + self.translation_y,
        )
    }

    fn with_residual(mut self, pairs: &[PointPair], total_weight: f64) -> Self {
        let weighted_sq: f64 = pairs
            .iter()
            .map(|pair| {
                let mapped = self.apply(pair.source);
                let dx = mapped.x - pair.target.x;
                let dy = mapped.y - pair.target.y;
                pair.weight * (dx * dx + dy * dy)
            })
            .sum();
        self.rms_residual = (weighted_sq / total_weight).sqrt();
        self
    }
}

fn weighted_centroid(pairs: &[PointPair], total_weight: f64) -> (Point, Point) {
    let (mut sx, mut sy, mut tx, mut ty) = (0.0, 0.0, 0.0, 0.0);
    for pair in pairs {
        sx += pair.weight * pair.source.x;
        sy += pair.weight * pair.source.y;
        tx += pair.weight * pair.target.x;
        ty += pair.weight * pair.target.y;
    }
    (
        Point::new(sx / total_weight, sy / total_weight),
        Point::new(tx / total_weight, ty / total_weight),
    )
}

/// Closed-form weighted similarity fit.
///
/// Returns `None` when the pairs carry no positive total weight. A single
/// effective point (all sources coincide) yields a pure translation.
pub fn fit_similarity(pairs: &[PointPair]) -> Option<SimilarityFit> {
    let total_weight: f64 = pairs.iter().map(|p| p.weight.max(0.0)).sum();
    if !(total_weight > EPSILON) {
        return None;
    }
    let pairs: Vec<PointPair> = pairs
        .iter()
        .map(|p| PointPair {
            weight: p.weight.max(0.0),
            ..*p
        })
        .collect();

    let (source_mean, target_mean) = weighted_centroid(&pairs, total_weight);

    let (mut a, mut b, mut spread) = (0.0, 0.0, 0.0);
    for pair in &pairs {
        let px = pair.source.x - source_mean.x;
        let py = pair.source.y - source_mean.y;
        let qx = pair.target.x - target_mean.x;
        let qy = pair.target.y - target_mean.y;
        a += pair.weight * (px * qx + py * qy);
        b += pair.weight * (px * qy - py * qx);
        spread += pair.weight * (px * px + py * py);
    }

    let fit = if spread < EPSILON {
        SimilarityFit {
            translation_x: target_mean.x - source_mean.x,
            translation_y: target_mean.y - source_mean.y,
            ..SimilarityFit::identity()
        }
    } else {
        let rotation = b.atan2(a);
        let scale = (a * a + b * b).sqrt() / spread;
        let (sin, cos) = rotation.sin_cos();
        SimilarityFit {
            scale,
            rotation,
            translation_x: target_mean.x - scale * (cos * source_mean.x - sin * source_mean.y),
            translation_y: target_mean.y - scale * (sin * source_mean.x + cos * source_mean.y),
            rms_residual: 0.0,
        }
    };

    Some(fit.with_residual(&pairs, total_weight))
}
