//! Generic geometric primitives behind the pick index: handle corner
//! ordering, segment/rect intersection, and nearest-point helpers.
//!
//! This module is entity-agnostic: it knows about AABBs, segments, and
//! points, but nothing about entity kinds, layers, or flags. The engine
//! wires these primitives to the entity store to implement the full
//! `pick`/`pick_ex`/`query_marquee` contract.

use crate::types::{Aabb, Vec2};

/// What a pick hit landed on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SubTarget {
    /// The entity's filled/stroked body.
    Body,
    /// A vertex-drag handle on a line-like entity.
    VertexHandle,
    /// An edge-drag handle (midpoint of a polygon/polyline edge).
    EdgeHandle,
    /// A resize-handle corner on the selection AABB.
    ResizeHandle,
}

/// Which sub-targets a pick query should consider, as a bitmask.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PickMask(u8);

impl PickMask {
    /// Consider only entity bodies.
    pub const BODY: Self = Self(1 << 0);
    /// Consider vertex-drag handles.
    pub const VERTEX_HANDLE: Self = Self(1 << 1);
    /// Consider edge-drag handles.
    pub const EDGE_HANDLE: Self = Self(1 << 2);
    /// Consider resize-handle corners.
    pub const RESIZE_HANDLE: Self = Self(1 << 3);
    /// Consider everything.
    pub const ALL: Self = Self(0b1111);

    /// Returns `true` if `target` is included in the mask.
    #[must_use]
    pub fn includes(&self, target: SubTarget) -> bool {
        let bit = match target {
            SubTarget::Body => Self::BODY,
            SubTarget::VertexHandle => Self::VERTEX_HANDLE,
            SubTarget::EdgeHandle => Self::EDGE_HANDLE,
            SubTarget::ResizeHandle => Self::RESIZE_HANDLE,
        };
        self.0 & bit.0 != 0
    }

    /// Bitwise-ORs two masks together.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// Resize-handle corner on a selection AABB. The numeric order is fixed by
/// the wire protocol: `0=BottomLeft, 1=BottomRight, 2=TopRight, 3=TopLeft`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum HandleCorner {
    BottomLeft = 0,
    BottomRight = 1,
    TopRight = 2,
    TopLeft = 3,
}

impl HandleCorner {
    /// All four corners in fixed protocol order.
    pub const ALL: [Self; 4] = [
        Self::BottomLeft,
        Self::BottomRight,
        Self::TopRight,
        Self::TopLeft,
    ];

    /// Numeric tag for this corner.
    #[must_use]
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Builds a corner from its numeric tag, if valid.
    #[must_use]
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::BottomLeft),
            1 => Some(Self::BottomRight),
            2 => Some(Self::TopRight),
            3 => Some(Self::TopLeft),
            _ => None,
        }
    }

    /// The corner of `aabb` that grabbing this handle manipulates.
    #[must_use]
    pub fn point_on(self, aabb: &Aabb) -> Vec2 {
        match self {
            Self::BottomLeft => Vec2::new(aabb.min().x(), aabb.min().y()),
            Self::BottomRight => Vec2::new(aabb.max().x(), aabb.min().y()),
            Self::TopRight => Vec2::new(aabb.max().x(), aabb.max().y()),
            Self::TopLeft => Vec2::new(aabb.min().x(), aabb.max().y()),
        }
    }

    /// The corner diagonally opposite this one — the resize anchor.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::BottomLeft => Self::TopRight,
            Self::BottomRight => Self::TopLeft,
            Self::TopRight => Self::BottomLeft,
            Self::TopLeft => Self::BottomRight,
        }
    }
}

/// Shortest distance from `point` to the segment `a`-`b`.
#[must_use]
pub fn distance_point_to_segment(point: Vec2, a: Vec2, b: Vec2) -> f32 {
    let ab = b.sub(&a);
    let len_sq = ab.length_squared();
    if len_sq <= crate::types::EPSILON {
        return point.distance(&a);
    }
    let t = point.sub(&a).dot(&ab) / len_sq;
    let t = t.clamp(0.0, 1.0);
    let closest = a.add(&ab.scale(t));
    point.distance(&closest)
}

/// Finds the nearest resize-handle corner of `aabb` to `point` within
/// `tolerance`, returning its index and distance.
#[must_use]
pub fn nearest_resize_handle(aabb: &Aabb, point: Vec2, tolerance: f32) -> Option<(HandleCorner, f32)> {
    HandleCorner::ALL
        .into_iter()
        .map(|corner| (corner, point.distance(&corner.point_on(aabb))))
        .filter(|(_, dist)| *dist <= tolerance)
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

/// Finds the nearest vertex in `vertices` to `point` within `tolerance`,
/// returning its index and distance.
#[must_use]
pub fn nearest_vertex(vertices: &[Vec2], point: Vec2, tolerance: f32) -> Option<(u32, f32)> {
    vertices
        .iter()
        .enumerate()
        .map(|(i, v)| (i as u32, point.distance(v)))
        .filter(|(_, dist)| *dist <= tolerance)
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

/// Finds the nearest edge (between consecutive vertices, including the
/// closing edge if `closed`) in `vertices` to `point` within `tolerance`,
/// returning the edge's starting vertex index, the midpoint, and distance.
#[must_use]
pub fn nearest_edge(
    vertices: &[Vec2],
    closed: bool,
    point: Vec2,
    tolerance: f32,
) -> Option<(u32, Vec2, f32)> {
    if vertices.len() < 2 {
        return None;
    }
    let edge_count = if closed {
        vertices.len()
    } else {
        vertices.len() - 1
    };
    (0..edge_count)
        .map(|i| {
            let a = vertices[i];
            let b = vertices[(i + 1) % vertices.len()];
            let dist = distance_point_to_segment(point, a, b);
            (i as u32, a.lerp(&b, 0.5), dist)
        })
        .filter(|(_, _, dist)| *dist <= tolerance)
        .min_by(|a, b| a.2.total_cmp(&b.2))
}

/// Marquee selection mode.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MarqueeMode {
    /// Entity must lie fully inside the marquee AABB.
    Window,
    /// Entity is selected if any part of its geometry intersects the
    /// marquee, tested exactly via segment/rect intersection for line-like
    /// entities and AABB-overlap for filled entities.
    Crossing,
}

/// Tests whether the segment `a`-`b` intersects `rect`, using the
/// Liang–Barsky line-clipping algorithm restricted to `t in [0, 1]`.
#[must_use]
pub fn segment_intersects_rect(a: Vec2, b: Vec2, rect: &Aabb) -> bool {
    let direction = b.sub(&a);
    let mut t_min = 0.0f32;
    let mut t_max = 1.0f32;

    let checks = [
        (-direction.x(), a.x() - rect.min().x()),
        (direction.x(), rect.max().x() - a.x()),
        (-direction.y(), a.y() - rect.min().y()),
        (direction.y(), rect.max().y() - a.y()),
    ];

    for (p, q) in checks {
        if p.abs() <= crate::types::EPSILON {
            if q < 0.0 {
                return false;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t_max {
                return false;
            }
            if r > t_min {
                t_min = r;
            }
        } else {
            if r < t_min {
                return false;
            }
            if r < t_max {
                t_max = r;
            }
        }
    }
    t_min <= t_max
}

/// Tests whether a polyline (open or closed) crosses `rect` under
/// [`MarqueeMode::Crossing`]: true if any edge intersects the rect, or any
/// vertex lies inside it.
#[must_use]
pub fn polyline_crosses_rect(vertices: &[Vec2], closed: bool, rect: &Aabb) -> bool {
    if vertices.iter().any(|v| rect.contains_point(*v)) {
        return true;
    }
    if vertices.len() < 2 {
        return false;
    }
    let edge_count = if closed {
        vertices.len()
    } else {
        vertices.len() - 1
    };
    (0..edge_count).any(|i| {
        let a = vertices[i];
        let b = vertices[(i + 1) % vertices.len()];
        segment_intersects_rect(a, b, rect)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x0: f32, y0: f32, x1: f32, y1: f32) -> Aabb {
        Aabb::new(Vec2::new(x0, y0), Vec2::new(x1, y1))
    }

    #[test]
    fn handle_corner_indices_match_protocol_order() {
        assert_eq!(HandleCorner::BottomLeft.index(), 0);
        assert_eq!(HandleCorner::BottomRight.index(), 1);
        assert_eq!(HandleCorner::TopRight.index(), 2);
        assert_eq!(HandleCorner::TopLeft.index(), 3);
    }

    #[test]
    fn handle_corner_opposite_is_diagonal() {
        assert_eq!(HandleCorner::BottomLeft.opposite(), HandleCorner::TopRight);
        assert_eq!(HandleCorner::TopLeft.opposite(), HandleCorner::BottomRight);
    }

    #[test]
    fn nearest_resize_handle_picks_closest_corner() {
        let aabb = rect(0.0, 0.0, 10.0, 10.0);
        let (corner, dist) = nearest_resize_handle(&aabb, Vec2::new(9.5, 9.5), 2.0).unwrap();
        assert_eq!(corner, HandleCorner::TopRight);
        assert!(dist < 2.0);
    }

    #[test]
    fn distance_point_to_segment_handles_degenerate_segment() {
        let d = distance_point_to_segment(Vec2::new(3.0, 4.0), Vec2::ZERO, Vec2::ZERO);
        assert!((d - 5.0).abs() < 1e-5);
    }

    #[test]
    fn liang_barsky_detects_crossing_segment() {
        let r = rect(0.0, 0.0, 10.0, 10.0);
        assert!(segment_intersects_rect(
            Vec2::new(-5.0, 5.0),
            Vec2::new(15.0, 5.0),
            &r
        ));
    }

    #[test]
    fn liang_barsky_rejects_segment_outside_rect() {
        let r = rect(0.0, 0.0, 10.0, 10.0);
        assert!(!segment_intersects_rect(
            Vec2::new(20.0, 20.0),
            Vec2::new(30.0, 30.0),
            &r
        ));
    }

    #[test]
    fn polyline_crosses_rect_via_contained_vertex() {
        let r = rect(0.0, 0.0, 10.0, 10.0);
        let verts = [Vec2::new(-5.0, -5.0), Vec2::new(5.0, 5.0), Vec2::new(-5.0, 20.0)];
        assert!(polyline_crosses_rect(&verts, false, &r));
    }

    #[test]
    fn nearest_edge_respects_closed_flag() {
        let verts = [
            Vec2::new(0.0, 0.0),
            Vec2::new(10.0, 0.0),
            Vec2::new(10.0, 10.0),
        ];
        // Closing edge from (10,10) back to (0,0) only exists when closed.
        assert!(nearest_edge(&verts, false, Vec2::new(5.0, 5.0), 1.0).is_none());
        assert!(nearest_edge(&verts, true, Vec2::new(5.0, 5.0), 8.0).is_some());
    }
}
