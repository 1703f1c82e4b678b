//! Structure-of-arrays-by-kind entity storage.
//!
//! Each entity kind owns its own dense `Vec` of geometry rows plus a
//! parallel `Vec<EntityId>` reverse-lookup for swap-remove deletion. A
//! single sparse id map resolves an [`EntityId`] to its kind and index.
//! Headers (layer assignment, visibility/lock flags) are common to every
//! kind and live in their own map rather than being duplicated per-kind.

use crate::ident::{EntityId, IdAllocator};
use crate::record::{CircleRow, EntityHeader, EntityKind, LineRow, PolylineRow, RectRow};
use docengine_geom::Vec2;
use rustc_hash::FxHashMap;

/// Where a live entity's geometry row lives.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct Slot {
    kind: EntityKind,
    index: u32,
}

/// Owns every non-text entity's geometry, the shared point pool, the
/// draw-order sequence, and the current selection.
///
/// Text entities are owned by [`crate::text::TextStore`]; the entity
/// store only tracks their id/header/draw-order presence so that pick,
/// selection, and draw-order logic can treat all kinds uniformly.
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    id_map: FxHashMap<EntityId, Slot>,
    headers: FxHashMap<EntityId, EntityHeader>,

    rects: Vec<RectRow>,
    rect_ids: Vec<EntityId>,
    lines: Vec<LineRow>,
    line_ids: Vec<EntityId>,
    arrows: Vec<LineRow>,
    arrow_ids: Vec<EntityId>,
    polylines: Vec<PolylineRow>,
    polyline_ids: Vec<EntityId>,
    circles: Vec<CircleRow>,
    circle_ids: Vec<EntityId>,
    polygons: Vec<CircleRow>,
    polygon_ids: Vec<EntityId>,
    /// Ids of live `Text` entities. Geometry lives in the text store;
    /// this only participates in the id map / draw order / headers so
    /// generic queries (selection, draw order, layer cascade) see them.
    text_ids: Vec<EntityId>,

    point_pool: Vec<Vec2>,

    draw_order: Vec<EntityId>,
    selection: Vec<EntityId>,

    allocator: IdAllocator,
}

macro_rules! kind_accessors {
    ($kind:ident, $row:ty, $rows:ident, $ids:ident, $get:ident, $get_mut:ident, $upsert:ident) => {
        /// Returns the row for `id` if it is a live entity of this kind.
        #[must_use]
        pub fn $get(&self, id: EntityId) -> Option<&$row> {
            match self.id_map.get(&id) {
                Some(slot) if slot.kind == EntityKind::$kind => {
                    Some(&self.$rows[slot.index as usize])
                }
                _ => None,
            }
        }

        /// Returns a mutable row for `id` if it is a live entity of this
        /// kind.
        pub fn $get_mut(&mut self, id: EntityId) -> Option<&mut $row> {
            match self.id_map.get(&id) {
                Some(slot) if slot.kind == EntityKind::$kind => {
                    Some(&mut self.$rows[slot.index as usize])
                }
                _ => None,
            }
        }

        /// Creates `id` fresh as this kind, or overwrites its row and
        /// header in place if it already exists as this kind. Overwriting
        /// an id that exists as a *different* kind first deletes the old
        /// entity.
        pub fn $upsert(&mut self, id: EntityId, row: $row, header: EntityHeader) {
            if let Some(slot) = self.id_map.get(&id).copied() {
                if slot.kind == EntityKind::$kind {
                    self.$rows[slot.index as usize] = row;
                    self.headers.insert(id, header);
                    return;
                }
                self.delete(id);
            }
            let index = self.$rows.len() as u32;
            self.$rows.push(row);
            self.$ids.push(id);
            self.id_map.insert(
                id,
                Slot {
                    kind: EntityKind::$kind,
                    index,
                },
            );
            self.headers.insert(id, header);
            self.draw_order.push(id);
        }
    };
}

impl EntityStore {
    kind_accessors!(Rect, RectRow, rects, rect_ids, get_rect, get_rect_mut, upsert_rect);
    kind_accessors!(Line, LineRow, lines, line_ids, get_line, get_line_mut, upsert_line);
    kind_accessors!(
        Arrow,
        LineRow,
        arrows,
        arrow_ids,
        get_arrow,
        get_arrow_mut,
        upsert_arrow
    );
    kind_accessors!(
        Polyline,
        PolylineRow,
        polylines,
        polyline_ids,
        get_polyline,
        get_polyline_mut,
        upsert_polyline
    );
    kind_accessors!(
        Circle,
        CircleRow,
        circles,
        circle_ids,
        get_circle,
        get_circle_mut,
        upsert_circle
    );
    kind_accessors!(
        Polygon,
        CircleRow,
        polygons,
        polygon_ids,
        get_polygon,
        get_polygon_mut,
        upsert_polygon
    );

    /// Creates a new, empty store with the id allocator at its start
    /// position.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates and reserves a fresh id without creating a record for it
    /// yet (the caller is expected to immediately upsert it).
    pub fn allocate_id(&mut self) -> EntityId {
        self.allocator.allocate()
    }

    /// Advances the id allocator so it never reissues `id` or anything
    /// below it. Used when an `Upsert` op names an explicit id (e.g.
    /// replayed from history or a snapshot).
    pub fn observe_id(&mut self, id: EntityId) {
        self.allocator.observe(id);
    }

    #[must_use]
    pub fn next_id_hint(&self) -> u32 {
        self.allocator.peek_next()
    }

    /// Registers a bare id as a live `Text` entity for the purposes of
    /// the id map, headers, and draw order. Geometry is owned by the
    /// text store.
    pub fn register_text(&mut self, id: EntityId, header: EntityHeader) {
        if self.id_map.contains_key(&id) {
            self.headers.insert(id, header);
            return;
        }
        self.text_ids.push(id);
        self.id_map.insert(
            id,
            Slot {
                kind: EntityKind::Text,
                index: (self.text_ids.len() - 1) as u32,
            },
        );
        self.headers.insert(id, header);
        self.draw_order.push(id);
    }

    #[must_use]
    pub fn kind_of(&self, id: EntityId) -> Option<EntityKind> {
        self.id_map.get(&id).map(|s| s.kind)
    }

    #[must_use]
    pub fn header(&self, id: EntityId) -> Option<EntityHeader> {
        self.headers.get(&id).copied()
    }

    pub fn set_header(&mut self, id: EntityId, header: EntityHeader) -> bool {
        if self.headers.contains_key(&id) {
            self.headers.insert(id, header);
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn is_live(&self, id: EntityId) -> bool {
        self.id_map.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.id_map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id_map.is_empty()
    }

    /// Deletes `id` if it is live. Idempotent: deleting a missing id is a
    /// silent no-op per the semantic-no-op error taxonomy.
    ///
    /// Returns `true` if an entity was actually removed.
    pub fn delete(&mut self, id: EntityId) -> bool {
        let Some(slot) = self.id_map.remove(&id) else {
            return false;
        };
        self.headers.remove(&id);
        self.draw_order.retain(|&e| e != id);
        self.selection.retain(|&e| e != id);

        macro_rules! swap_remove_kind {
            ($rows:ident, $ids:ident) => {{
                let removed_index = slot.index as usize;
                self.$rows.swap_remove(removed_index);
                self.$ids.swap_remove(removed_index);
                if let Some(&moved_id) = self.$ids.get(removed_index) {
                    if let Some(moved_slot) = self.id_map.get_mut(&moved_id) {
                        moved_slot.index = removed_index as u32;
                    }
                }
            }};
        }

        match slot.kind {
            EntityKind::Rect => swap_remove_kind!(rects, rect_ids),
            EntityKind::Line => swap_remove_kind!(lines, line_ids),
            EntityKind::Arrow => swap_remove_kind!(arrows, arrow_ids),
            EntityKind::Polyline => swap_remove_kind!(polylines, polyline_ids),
            EntityKind::Circle => swap_remove_kind!(circles, circle_ids),
            EntityKind::Polygon => swap_remove_kind!(polygons, polygon_ids),
            EntityKind::Text => {
                let removed_index = slot.index as usize;
                self.text_ids.swap_remove(removed_index);
                if let Some(&moved_id) = self.text_ids.get(removed_index) {
                    if let Some(moved_slot) = self.id_map.get_mut(&moved_id) {
                        moved_slot.index = removed_index as u32;
                    }
                }
            }
        }
        true
    }

    /// Drops every entity, keeping layers untouched (the caller owns the
    /// `LayerStore` separately).
    pub fn clear_all(&mut self) {
        self.id_map.clear();
        self.headers.clear();
        self.rects.clear();
        self.rect_ids.clear();
        self.lines.clear();
        self.line_ids.clear();
        self.arrows.clear();
        self.arrow_ids.clear();
        self.polylines.clear();
        self.polyline_ids.clear();
        self.circles.clear();
        self.circle_ids.clear();
        self.polygons.clear();
        self.polygon_ids.clear();
        self.text_ids.clear();
        self.point_pool.clear();
        self.draw_order.clear();
        self.selection.clear();
    }

    /// Cascades deletion of every entity on `layer_id`, called when that
    /// layer is removed.
    pub fn delete_layer_cascade(&mut self, layer_id: u32) {
        let victims: Vec<EntityId> = self
            .headers
            .iter()
            .filter(|(_, header)| header.layer_id == layer_id)
            .map(|(&id, _)| id)
            .collect();
        for id in victims {
            self.delete(id);
        }
    }

    // -- point pool ---------------------------------------------------

    /// Appends `points` to the pool and returns `(offset, count)` for use
    /// in a [`PolylineRow`].
    pub fn push_points(&mut self, points: &[Vec2]) -> (u32, u32) {
        let offset = self.point_pool.len() as u32;
        self.point_pool.extend_from_slice(points);
        (offset, points.len() as u32)
    }

    #[must_use]
    pub fn point_pool(&self) -> &[Vec2] {
        &self.point_pool
    }

    #[must_use]
    pub fn polyline_points(&self, row: &PolylineRow) -> &[Vec2] {
        let start = row.offset as usize;
        let end = start + row.count as usize;
        &self.point_pool[start..end]
    }

    /// Rebuilds the point pool from only the polylines currently live,
    /// in ascending id order, rewriting each polyline's `offset`.
    ///
    /// Must run after every command buffer that may have deleted or
    /// shrunk polylines, per invariant 3.
    pub fn compact_point_pool(&mut self) {
        let mut order: Vec<usize> = (0..self.polyline_ids.len()).collect();
        order.sort_unstable_by_key(|&i| self.polyline_ids[i]);

        let mut new_pool = Vec::with_capacity(self.point_pool.len());
        for i in order {
            let row = &mut self.polylines[i];
            let start = row.offset as usize;
            let end = start + row.count as usize;
            let new_offset = new_pool.len() as u32;
            new_pool.extend_from_slice(&self.point_pool[start..end]);
            row.offset = new_offset;
        }
        self.point_pool = new_pool;
    }

    // -- draw order -----------------------------------------------------

    #[must_use]
    pub fn draw_order(&self) -> &[EntityId] {
        &self.draw_order
    }

    /// Replaces the draw order with `ids`, deduplicated and filtered to
    /// live entities, keeping the relative order of any live ids omitted
    /// from `ids` at the back (open-question resolution: omission does
    /// not move an entity to the front or drop it from the order).
    pub fn set_draw_order(&mut self, ids: &[EntityId]) {
        let mut seen: FxHashMap<EntityId, ()> = FxHashMap::default();
        let mut new_order = Vec::with_capacity(self.draw_order.len());
        for &id in ids {
            if self.is_live(id) && seen.insert(id, ()).is_none() {
                new_order.push(id);
            }
        }
        for &id in &self.draw_order {
            if !seen.contains_key(&id) {
                new_order.push(id);
            }
        }
        self.draw_order = new_order;
    }

    /// Returns the z-rank (position in draw order) of `id`, if live.
    #[must_use]
    pub fn z_rank(&self, id: EntityId) -> Option<usize> {
        self.draw_order.iter().position(|&e| e == id)
    }

    // -- selection ------------------------------------------------------

    #[must_use]
    pub fn selection(&self) -> &[EntityId] {
        &self.selection
    }

    /// Replaces the selection with `ids`, deduplicated and filtered to
    /// live ids. Layer visibility/lock pruning (invariant 5) is applied
    /// separately by the caller, which has access to the `LayerStore`.
    pub fn set_selection_raw(&mut self, ids: Vec<EntityId>) {
        let mut seen: FxHashMap<EntityId, ()> = FxHashMap::default();
        self.selection = ids
            .into_iter()
            .filter(|id| self.is_live(*id) && seen.insert(*id, ()).is_none())
            .collect();
    }

    /// Removes from the selection any id that is not live, layer-visible,
    /// layer-unlocked, entity-visible, or entity-unlocked.
    pub fn prune_selection(&mut self, layers: &crate::layer::LayerStore) {
        self.selection.retain(|&id| {
            let Some(header) = self.headers.get(&id) else {
                return false;
            };
            if header.flags.is_locked() || !header.flags.is_visible() {
                return false;
            }
            match layers.get(header.layer_id) {
                Some(layer) => layer.flags.is_visible() && !layer.flags.is_locked(),
                None => false,
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{EntityFlags, Rgba};

    fn rect_row() -> RectRow {
        RectRow {
            x: 0.0,
            y: 0.0,
            w: 10.0,
            h: 10.0,
            fill: Rgba::TRANSPARENT,
            stroke: Rgba::TRANSPARENT,
            stroke_enabled: 0,
            stroke_width: 0.0,
            _pad: [0; 2],
        }
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let mut store = EntityStore::new();
        let id = store.allocate_id();
        store.upsert_rect(id, rect_row(), EntityHeader::default());
        assert_eq!(store.get_rect(id).unwrap().w, 10.0);
        assert_eq!(store.kind_of(id), Some(EntityKind::Rect));
    }

    #[test]
    fn delete_is_idempotent() {
        let mut store = EntityStore::new();
        let id = store.allocate_id();
        store.upsert_rect(id, rect_row(), EntityHeader::default());
        assert!(store.delete(id));
        assert!(!store.delete(id));
        assert!(!store.is_live(id));
    }

    #[test]
    fn delete_fixes_up_swapped_slot_index() {
        let mut store = EntityStore::new();
        let a = store.allocate_id();
        let b = store.allocate_id();
        let c = store.allocate_id();
        store.upsert_rect(a, rect_row(), EntityHeader::default());
        store.upsert_rect(b, rect_row(), EntityHeader::default());
        store.upsert_rect(c, rect_row(), EntityHeader::default());
        store.delete(a);
        // b and c must both still resolve correctly after the swap-remove.
        assert!(store.get_rect(b).is_some());
        assert!(store.get_rect(c).is_some());
    }

    #[test]
    fn draw_order_tracks_live_ids_as_permutation() {
        let mut store = EntityStore::new();
        let a = store.allocate_id();
        let b = store.allocate_id();
        store.upsert_rect(a, rect_row(), EntityHeader::default());
        store.upsert_rect(b, rect_row(), EntityHeader::default());
        assert_eq!(store.draw_order(), &[a, b]);
        store.delete(a);
        assert_eq!(store.draw_order(), &[b]);
    }

    #[test]
    fn set_draw_order_keeps_omitted_ids_at_back_in_relative_order() {
        let mut store = EntityStore::new();
        let a = store.allocate_id();
        let b = store.allocate_id();
        let c = store.allocate_id();
        store.upsert_rect(a, rect_row(), EntityHeader::default());
        store.upsert_rect(b, rect_row(), EntityHeader::default());
        store.upsert_rect(c, rect_row(), EntityHeader::default());
        store.set_draw_order(&[c]);
        assert_eq!(store.draw_order(), &[c, a, b]);
    }

    #[test]
    fn compact_point_pool_rewrites_offsets_in_id_order() {
        let mut store = EntityStore::new();
        let a = store.allocate_id();
        let b = store.allocate_id();
        let (offset_a, count_a) = store.push_points(&[Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0)]);
        let (offset_b, count_b) = store.push_points(&[Vec2::new(2.0, 2.0), Vec2::new(3.0, 3.0)]);
        store.upsert_polyline(
            b,
            PolylineRow {
                offset: offset_b,
                count: count_b,
                stroke: Rgba::TRANSPARENT,
                stroke_enabled: 0,
                stroke_width: 0.0,
                _pad: [0; 2],
            },
            EntityHeader::default(),
        );
        store.upsert_polyline(
            a,
            PolylineRow {
                offset: offset_a,
                count: count_a,
                stroke: Rgba::TRANSPARENT,
                stroke_enabled: 0,
                stroke_width: 0.0,
                _pad: [0; 2],
            },
            EntityHeader::default(),
        );
        store.compact_point_pool();
        let row_a = *store.get_polyline(a).unwrap();
        assert_eq!(row_a.offset, 0);
        assert_eq!(store.polyline_points(&row_a)[0], Vec2::new(0.0, 0.0));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::record::Rgba;
    use proptest::prelude::*;

    fn rect_row() -> RectRow {
        RectRow {
            x: 0.0,
            y: 0.0,
            w: 10.0,
            h: 10.0,
            fill: Rgba::TRANSPARENT,
            stroke: Rgba::TRANSPARENT,
            stroke_enabled: 0,
            stroke_width: 0.0,
            _pad: [0; 2],
        }
    }

    #[derive(Debug, Clone, Copy)]
    enum Op {
        Upsert,
        Delete(u8),
        Reorder(u8),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Upsert),
            any::<u8>().prop_map(Op::Delete),
            any::<u8>().prop_map(Op::Reorder),
        ]
    }

    proptest! {
        /// Draw order is always a permutation of the live entity ids,
        /// regardless of the sequence of upsert/delete/reorder ops.
        #[test]
        fn draw_order_is_always_a_permutation_of_live_ids(ops in proptest::collection::vec(op_strategy(), 0..64)) {
            let mut store = EntityStore::new();
            let mut live: Vec<EntityId> = Vec::new();

            for op in ops {
                match op {
                    Op::Upsert => {
                        let id = store.allocate_id();
                        store.upsert_rect(id, rect_row(), EntityHeader::default());
                        live.push(id);
                    }
                    Op::Delete(pick) => {
                        if !live.is_empty() {
                            let index = pick as usize % live.len();
                            let id = live.remove(index);
                            store.delete(id);
                        }
                    }
                    Op::Reorder(seed) => {
                        if !live.is_empty() {
                            let mut order = store.draw_order().to_vec();
                            let split = seed as usize % order.len();
                            order.rotate_left(split);
                            store.set_draw_order(&order);
                        }
                    }
                }
            }

            let mut draw_order = store.draw_order().to_vec();
            let mut expected = live.clone();
            draw_order.sort_by_key(EntityId::get);
            expected.sort_by_key(EntityId::get);
            prop_assert_eq!(draw_order, expected);
            prop_assert_eq!(store.len(), live.len());
        }
    }
}
