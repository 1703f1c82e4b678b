//! Stroke expansion: a polyline plus a width becomes a list of quads, one
//! per segment, each emitted as two triangles. There is no separate line
//! primitive in the render vertex buffer; every stroke is filled
//! geometry.
//!
//! Joints are left as simple butt ends between adjacent quads rather than
//! mitered or rounded — acceptable for the chord-tolerance-flattened
//! curves this feeds from, where segments are already short enough that
//! the gap is sub-pixel at the view scales the engine targets.

use docengine_geom::Vec2;

/// Expands `points` (an open or closed polyline) into a stroke, returned
/// as point triples forming two triangles per segment.
///
/// A width of zero or a polyline with fewer than two vertices yields no
/// triangles.
#[must_use]
pub fn expand_stroke(points: &[Vec2], closed: bool, width: f32) -> Vec<[Vec2; 3]> {
    if points.len() < 2 || width <= 0.0 {
        return Vec::new();
    }
    let half = width * 0.5;
    let segment_count = if closed { points.len() } else { points.len() - 1 };
    let mut triangles = Vec::with_capacity(segment_count * 2);

    for i in 0..segment_count {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        let direction = b.sub(&a);
        if direction.length_squared() <= docengine_geom::EPSILON {
            continue;
        }
        let normal = Vec2::new(-direction.y(), direction.x()).normalize().scale(half);
        let a0 = a.add(&normal);
        let a1 = a.sub(&normal);
        let b0 = b.add(&normal);
        let b1 = b.sub(&normal);
        triangles.push([a0, b0, b1]);
        triangles.push([a0, b1, a1]);
    }
    triangles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_polyline_produces_two_triangles_per_segment() {
        let points = [Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0), Vec2::new(10.0, 10.0)];
        assert_eq!(expand_stroke(&points, false, 2.0).len(), 4);
    }

    #[test]
    fn closed_polyline_includes_the_closing_segment() {
        let points = [Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0), Vec2::new(10.0, 10.0)];
        assert_eq!(expand_stroke(&points, true, 2.0).len(), 6);
    }

    #[test]
    fn zero_width_yields_nothing() {
        let points = [Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0)];
        assert!(expand_stroke(&points, false, 0.0).is_empty());
    }

    #[test]
    fn output_is_always_finite() {
        let points = [Vec2::new(0.0, 0.0), Vec2::new(1e-8, 1e-8), Vec2::new(10.0, 0.0)];
        for tri in expand_stroke(&points, false, 3.0) {
            for v in tri {
                assert!(v.x().is_finite() && v.y().is_finite());
            }
        }
    }
}
