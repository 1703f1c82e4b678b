//! Overlay primitive streams: selection outline, selection handles, and
//! snap feedback, each consumed by the renderer as a flat primitive list
//! plus a shared `f32` point array.

use bytemuck::{Pod, Zeroable};
use docengine_core::geometry;
use docengine_core::record::EntityKind;
use docengine_core::DocEngine;
use docengine_geom::{HandleCorner, Vec2};

use crate::flatten::flatten_ellipse;

/// What shape a primitive's referenced points describe.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u16)]
pub enum OverlayKind {
    Polyline = 0,
    Polygon = 1,
    Segment = 2,
    Rect = 3,
    Point = 4,
}

/// One overlay primitive: a kind tag, a renderer-defined flag byte, and a
/// `(count, offset)` pair into the stream's shared point array.
///
/// Wire-stable layout: `u16, u16, u32, u32`, 12 bytes, matching
/// `OVERLAY_PRIMITIVE_BYTES`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct OverlayPrimitive {
    pub kind: u16,
    pub flags: u16,
    pub count: u32,
    pub offset: u32,
}

const _: () = assert!(size_of::<OverlayPrimitive>() == 12);

/// A primitive list plus the shared point data the primitives index into,
/// the core-side counterpart of the `{primitive_count, float_count,
/// primitives_ptr, data_ptr}` meta external consumers see.
#[derive(Debug, Clone, Default)]
pub struct OverlayStream {
    pub primitives: Vec<OverlayPrimitive>,
    pub data: Vec<f32>,
}

impl OverlayStream {
    fn push(&mut self, kind: OverlayKind, flags: u16, points: &[Vec2]) {
        let offset = self.data.len() as u32;
        for p in points {
            self.data.push(p.x());
            self.data.push(p.y());
        }
        self.primitives.push(OverlayPrimitive {
            kind: kind as u16,
            flags,
            count: points.len() as u32,
            offset,
        });
    }
}

/// Builds the selection-outline stream: one primitive per selected,
/// live entity, shaped to match what kind of geometry it is.
#[must_use]
pub fn selection_outline(engine: &DocEngine, tolerance: f32) -> OverlayStream {
    let mut stream = OverlayStream::default();
    for &id in engine.store().selection() {
        let Some(kind) = engine.store().kind_of(id) else {
            continue;
        };
        match kind {
            EntityKind::Rect => {
                if let Some(aabb) = geometry::entity_aabb(engine.store(), engine.text(), id) {
                    stream.push(OverlayKind::Rect, 0, &[aabb.min(), aabb.max()]);
                }
            }
            EntityKind::Line | EntityKind::Arrow | EntityKind::Polyline => {
                if let Some(vertices) = geometry::entity_vertices(engine.store(), id) {
                    stream.push(OverlayKind::Polyline, 0, &vertices);
                }
            }
            EntityKind::Circle | EntityKind::Polygon => {
                let ring = circle_ring(engine, id, kind, tolerance);
                if !ring.is_empty() {
                    stream.push(OverlayKind::Polygon, 0, &ring);
                }
            }
            EntityKind::Text => {
                if let Some(aabb) = geometry::entity_aabb(engine.store(), engine.text(), id) {
                    stream.push(OverlayKind::Rect, 0, &[aabb.min(), aabb.max()]);
                }
            }
        }
    }
    stream
}

fn circle_ring(engine: &DocEngine, id: docengine_core::ident::EntityId, kind: EntityKind, tolerance: f32) -> Vec<Vec2> {
    let row = match kind {
        EntityKind::Circle => engine.store().get_circle(id),
        _ => engine.store().get_polygon(id),
    };
    let Some(row) = row else {
        return Vec::new();
    };
    let sides = if matches!(kind, EntityKind::Polygon) {
        row.sides
    } else {
        0
    };
    flatten_ellipse(
        Vec2::new(row.cx, row.cy),
        row.rx * row.scale,
        row.ry * row.scale,
        row.rotation,
        tolerance,
        sides,
    )
}

/// Builds the selection-handles stream: four resize-handle corners for a
/// multi-entity or resizable selection, or per-vertex handles when
/// exactly one line-like entity is selected.
#[must_use]
pub fn selection_handles(engine: &DocEngine) -> OverlayStream {
    let mut stream = OverlayStream::default();
    let selection = engine.store().selection();
    if selection.len() == 1 {
        if let Some(kind) = engine.store().kind_of(selection[0]) {
            if kind.is_line_like() {
                if let Some(vertices) = geometry::entity_vertices(engine.store(), selection[0]) {
                    for v in vertices {
                        stream.push(OverlayKind::Point, 1, &[v]);
                    }
                }
                return stream;
            }
        }
    }
    if let Some(bounds) = geometry::selection_bounds(engine.store(), engine.text(), selection) {
        for corner in HandleCorner::ALL {
            stream.push(OverlayKind::Point, 0, &[corner.point_on(&bounds)]);
        }
    }
    stream
}

/// Builds the snap-feedback stream: a single point primitive at the
/// active snap candidate, or an empty stream when no snap is active.
#[must_use]
pub fn snap_feedback(engine: &DocEngine) -> OverlayStream {
    let mut stream = OverlayStream::default();
    if let Some(point) = engine.session().active_snap() {
        stream.push(OverlayKind::Point, 0, &[point]);
    }
    stream
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_selection_yields_empty_outline() {
        let engine = DocEngine::new();
        let stream = selection_outline(&engine, 0.25);
        assert!(stream.primitives.is_empty());
        assert!(stream.data.is_empty());
    }

    #[test]
    fn empty_selection_yields_no_handles() {
        let engine = DocEngine::new();
        assert!(selection_handles(&engine).primitives.is_empty());
    }

    #[test]
    fn no_active_snap_yields_empty_stream() {
        let engine = DocEngine::new();
        assert!(snap_feedback(&engine).primitives.is_empty());
    }
}
