//! Chord-tolerance curve flattening for circles, ellipses, and regular
//! polygons.

use docengine_geom::Vec2;

const MIN_SEGMENTS: u32 = 12;
const MAX_SEGMENTS: u32 = 256;

/// Flattens a (possibly rotated, non-uniformly radiused) ellipse into a
/// closed vertex ring such that the chord never deviates from the true
/// curve by more than `tolerance` world units.
///
/// `sides`, when nonzero, requests a regular polygon with exactly that
/// many vertices instead of a tolerance-derived smooth approximation
/// (used for [`EntityKind::Polygon`](docengine_core::record::EntityKind::Polygon)).
#[must_use]
pub fn flatten_ellipse(
    center: Vec2,
    rx: f32,
    ry: f32,
    rotation: f32,
    tolerance: f32,
    sides: u32,
) -> Vec<Vec2> {
    let segments = if sides >= 3 {
        sides
    } else {
        segment_count(rx.max(ry), tolerance)
    };
    let (sin_r, cos_r) = rotation.sin_cos();
    (0..segments)
        .map(|i| {
            let theta = (i as f32 / segments as f32) * std::f32::consts::TAU;
            let (sin_t, cos_t) = theta.sin_cos();
            let local = Vec2::new(rx * cos_t, ry * sin_t);
            Vec2::new(
                center.x() + local.x() * cos_r - local.y() * sin_r,
                center.y() + local.x() * sin_r + local.y() * cos_r,
            )
        })
        .collect()
}

/// Segment count for a circle of radius `r` such that the midpoint of
/// each chord is within `tolerance` of the true arc.
fn segment_count(r: f32, tolerance: f32) -> u32 {
    if !r.is_finite() || r <= 0.0 || !tolerance.is_finite() || tolerance <= 0.0 {
        return MIN_SEGMENTS;
    }
    let ratio = (1.0 - (tolerance / r).min(1.0)).max(-1.0);
    let angle_step = 2.0 * ratio.acos();
    if !angle_step.is_finite() || angle_step <= 0.0 {
        return MAX_SEGMENTS;
    }
    let raw = (std::f32::consts::TAU / angle_step).ceil() as u32;
    raw.clamp(MIN_SEGMENTS, MAX_SEGMENTS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regular_polygon_honors_explicit_side_count() {
        let ring = flatten_ellipse(Vec2::ZERO, 10.0, 10.0, 0.0, 0.1, 6);
        assert_eq!(ring.len(), 6);
    }

    #[test]
    fn tighter_tolerance_yields_more_segments() {
        let coarse = flatten_ellipse(Vec2::ZERO, 100.0, 100.0, 0.0, 5.0, 0);
        let fine = flatten_ellipse(Vec2::ZERO, 100.0, 100.0, 0.0, 0.01, 0);
        assert!(fine.len() > coarse.len());
    }

    #[test]
    fn output_is_always_finite_for_degenerate_radius() {
        let ring = flatten_ellipse(Vec2::ZERO, 0.0, 0.0, 0.0, 0.25, 0);
        assert!(ring.iter().all(|p| p.x().is_finite() && p.y().is_finite()));
    }

    #[test]
    fn segment_count_is_clamped() {
        assert!(segment_count(1e6, 1e-6) <= MAX_SEGMENTS);
        assert!(segment_count(1.0, 1e6) >= MIN_SEGMENTS);
    }
}
