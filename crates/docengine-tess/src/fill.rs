//! Concave-polygon fill tessellation via ear-clipping.

use docengine_geom::Vec2;

/// Triangulates a simple polygon ring (no self-intersections) into a
/// triangle list, returned as point triples in the same winding as the
/// input.
///
/// Degenerate input (fewer than 3 vertices, or zero signed area) yields
/// no triangles rather than an error — consistent with the
/// non-NaN/non-infinite finite-input guarantee the renderer depends on.
#[must_use]
pub fn triangulate_fill(points: &[Vec2]) -> Vec<[Vec2; 3]> {
    if points.len() < 3 {
        return Vec::new();
    }
    let mut ring: Vec<Vec2> = points.to_vec();
    if signed_area(&ring) < 0.0 {
        ring.reverse();
    }

    let mut indices: Vec<usize> = (0..ring.len()).collect();
    let mut triangles = Vec::with_capacity(ring.len().saturating_sub(2));

    // Ear-clipping: repeatedly remove a convex vertex whose triangle with
    // its neighbors contains no other remaining vertex, until three
    // vertices remain. Falls back to a fan from the first remaining
    // vertex if no ear is found in a full pass (self-intersecting or
    // near-degenerate input), which still produces a finite, non-NaN
    // result even if visually imperfect.
    let mut guard = indices.len() * indices.len() + 8;
    while indices.len() > 3 && guard > 0 {
        guard -= 1;
        let mut clipped = false;
        for i in 0..indices.len() {
            let prev = indices[(i + indices.len() - 1) % indices.len()];
            let cur = indices[i];
            let next = indices[(i + 1) % indices.len()];
            if !is_ear(&ring, &indices, prev, cur, next) {
                continue;
            }
            triangles.push([ring[prev], ring[cur], ring[next]]);
            indices.remove(i);
            clipped = true;
            break;
        }
        if !clipped {
            break;
        }
    }
    fan_remaining(&ring, &indices, &mut triangles);
    triangles
}

fn fan_remaining(ring: &[Vec2], indices: &[usize], out: &mut Vec<[Vec2; 3]>) {
    if indices.len() < 3 {
        return;
    }
    let anchor = indices[0];
    for pair in indices[1..].windows(2) {
        out.push([ring[anchor], ring[pair[0]], ring[pair[1]]]);
    }
}

fn is_ear(ring: &[Vec2], indices: &[usize], prev: usize, cur: usize, next: usize) -> bool {
    let a = ring[prev];
    let b = ring[cur];
    let c = ring[next];
    if cross2(a, b, c) <= 0.0 {
        return false;
    }
    indices
        .iter()
        .copied()
        .filter(|&i| i != prev && i != cur && i != next)
        .all(|i| !point_in_triangle(ring[i], a, b, c))
}

fn cross2(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    b.sub(&a).cross(&c.sub(&a))
}

fn point_in_triangle(p: Vec2, a: Vec2, b: Vec2, c: Vec2) -> bool {
    let d1 = cross2(a, b, p);
    let d2 = cross2(b, c, p);
    let d3 = cross2(c, a, p);
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}

fn signed_area(ring: &[Vec2]) -> f32 {
    let mut area = 0.0;
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[(i + 1) % ring.len()];
        area += a.x() * b.y() - b.x() * a.y();
    }
    area * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangulates_convex_square_into_two_triangles() {
        let square = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ];
        assert_eq!(triangulate_fill(&square).len(), 2);
    }

    #[test]
    fn triangulates_concave_l_shape() {
        let l_shape = [
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(2.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 2.0),
            Vec2::new(0.0, 2.0),
        ];
        let triangles = triangulate_fill(&l_shape);
        assert_eq!(triangles.len(), 4);
        for tri in &triangles {
            for v in tri {
                assert!(v.x().is_finite() && v.y().is_finite());
            }
        }
    }

    #[test]
    fn degenerate_input_yields_no_triangles() {
        assert!(triangulate_fill(&[Vec2::ZERO, Vec2::ZERO]).is_empty());
    }

    #[test]
    fn clockwise_winding_is_normalized_before_clipping() {
        let square_cw = [
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 0.0),
        ];
        assert_eq!(triangulate_fill(&square_cw).len(), 2);
    }
}
