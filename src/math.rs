use nalgebra as na;

use crate::bbox::{BBox, Ltrb};

/// Score used when the motion is too slow to say anything about direction
pub const NEUTRAL_DIRECTION_SCORE: f32 = 0.3;

/// `min(wa/wb, wb/wa) * min(ha/hb, hb/ha)`; `1.0` for identical extents,
/// `0.0` when either box is empty
pub fn size_ratio(a: &BBox<Ltrb>, b: &BBox<Ltrb>) -> f32 {
    let (wa, ha) = (a.width(), a.height());
    let (wb, hb) = (b.width(), b.height());

    if !(wa > 0.0 && ha > 0.0 && wb > 0.0 && hb > 0.0) {
        return 0.0;
    }

    (wa / wb).min(wb / wa) * (ha / hb).min(hb / ha)
}

/// `max(0, 1 - dist / max_dim)` between the box centers, where `max_dim` is
/// the largest side of either box
pub fn center_proximity(a: &BBox<Ltrb>, b: &BBox<Ltrb>) -> f32 {
    let dist = na::distance(&a.center(), &b.center());
    let max_dim = a.width().max(a.height()).max(b.width().max(b.height()));

    if max_dim <= 0.0 {
        return 0.0;
    }

    (1.0 - dist / max_dim).max(0.0)
}

/// Agreement between a velocity and the displacement `from -> to`.
///
/// Cosine similarity remapped from `[-1, 1]` to `[0, 1]` and squared, so
/// aligned motion scores close to 1 and opposed motion close to 0.
pub fn direction_score(
    velocity: &na::Vector2<f32>,
    from: &na::Point2<f32>,
    to: &na::Point2<f32>,
    min_speed: f32,
) -> f32 {
    let speed = velocity.norm();
    if speed <= min_speed {
        return NEUTRAL_DIRECTION_SCORE;
    }

    let actual = to - from;
    let actual_mag = actual.norm();
    if actual_mag <= 0.0 {
        return NEUTRAL_DIRECTION_SCORE;
    }

    let cosine = (velocity.dot(&actual) / (speed * actual_mag)).clamp(-1.0, 1.0);
    let normalized = (cosine + 1.0) / 2.0;

    normalized * normalized
}

/// Signed distance from `p` to the infinite line through `a` and `b`.
///
/// The sign tells the side: for a line drawn right-to-left, points below it
/// (larger `y` in image coordinates) are positive.
pub fn signed_distance_to_line(
    p: &na::Point2<f32>,
    a: &na::Point2<f32>,
    b: &na::Point2<f32>,
) -> f32 {
    let length = na::distance(a, b);
    if length <= 0.0 {
        return 0.0;
    }

    let signed_area = (b.y - a.y) * p.x - (b.x - a.x) * p.y + b.x * a.y - b.y * a.x;

    signed_area / length
}
