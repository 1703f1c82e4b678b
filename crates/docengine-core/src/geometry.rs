//! Per-kind geometry queries shared by the pick index and the
//! interaction session.
//!
//! Kept separate from [`crate::entity_store`] so both consumers read
//! world-space shapes through one path instead of re-deriving AABBs or
//! vertex lists from raw rows independently.

use crate::entity_store::EntityStore;
use crate::ident::EntityId;
use crate::record::{CircleRow, EntityKind};
use crate::text::TextStore;
use docengine_geom::{Aabb, Vec2};

/// The world-space AABB of a live entity, or `None` if `id` is not live.
#[must_use]
pub fn entity_aabb(store: &EntityStore, text: &TextStore, id: EntityId) -> Option<Aabb> {
    match store.kind_of(id)? {
        EntityKind::Rect => {
            let row = store.get_rect(id)?;
            Some(Aabb::new(
                Vec2::new(row.x, row.y),
                Vec2::new(row.x + row.w, row.y + row.h),
            ))
        }
        EntityKind::Line => {
            let row = store.get_line(id)?;
            Some(Aabb::new(Vec2::new(row.ax, row.ay), Vec2::new(row.bx, row.by)))
        }
        EntityKind::Arrow => {
            let row = store.get_arrow(id)?;
            Some(Aabb::new(Vec2::new(row.ax, row.ay), Vec2::new(row.bx, row.by)))
        }
        EntityKind::Polyline => {
            let row = store.get_polyline(id)?;
            Aabb::from_points(store.polyline_points(row))
        }
        EntityKind::Circle => Some(ellipse_aabb(store.get_circle(id)?)),
        EntityKind::Polygon => Some(ellipse_aabb(store.get_polygon(id)?)),
        EntityKind::Text => {
            let position = text.position(id)?;
            Some(Aabb::new(position, position))
        }
    }
}

/// The bounding box of a rotated, uniformly-scaled ellipse.
pub(crate) fn ellipse_aabb(row: &CircleRow) -> Aabb {
    let (sin, cos) = row.rotation.sin_cos();
    let rx = row.rx * row.scale;
    let ry = row.ry * row.scale;
    let extent_x = (rx * cos).hypot(ry * sin);
    let extent_y = (rx * sin).hypot(ry * cos);
    let center = Vec2::new(row.cx, row.cy);
    Aabb::new(
        Vec2::new(center.x() - extent_x, center.y() - extent_y),
        Vec2::new(center.x() + extent_x, center.y() + extent_y),
    )
}

/// The ordered vertex list of a line-like entity (line/arrow endpoints,
/// polyline points). `None` for kinds that have no vertex handles.
#[must_use]
pub fn entity_vertices(store: &EntityStore, id: EntityId) -> Option<Vec<Vec2>> {
    match store.kind_of(id)? {
        EntityKind::Line => {
            let row = store.get_line(id)?;
            Some(vec![Vec2::new(row.ax, row.ay), Vec2::new(row.bx, row.by)])
        }
        EntityKind::Arrow => {
            let row = store.get_arrow(id)?;
            Some(vec![Vec2::new(row.ax, row.ay), Vec2::new(row.bx, row.by)])
        }
        EntityKind::Polyline => {
            let row = store.get_polyline(id)?;
            Some(store.polyline_points(row).to_vec())
        }
        _ => None,
    }
}

/// The AABB of the union of every live id in `ids`, skipping dead ids.
#[must_use]
pub fn selection_bounds(store: &EntityStore, text: &TextStore, ids: &[EntityId]) -> Option<Aabb> {
    ids.iter()
        .filter_map(|&id| entity_aabb(store, text, id))
        .reduce(|acc, aabb| acc.union(&aabb))
}
