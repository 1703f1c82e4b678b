//! Grouped undo/redo with deterministic replay.
//!
//! History is an ordered sequence of entries, each a set of before/after
//! deltas captured exactly once per entity/layer/selection/draw-order per
//! entry. `HistoryOp` is a closed enum with exhaustive `apply_inverse` /
//! `apply_forward` so a new op can never silently fall through a
//! wildcard arm. `undo` replays every op's `before`; `redo` replays every
//! op's `after`.

use crate::entity_store::EntityStore;
use crate::ident::EntityId;
use crate::layer::{Layer, LayerStore};
use crate::record::{CircleRow, EntityHeader, LineRow, PolylineRow, RectRow};
use docengine_geom::Vec2;
use rustc_hash::FxHashMap;

/// A captured, kind-tagged geometry+header snapshot sufficient to
/// recreate or restore an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum EntitySnapshot {
    Rect(RectRow, EntityHeader),
    Line(LineRow, EntityHeader),
    Arrow(LineRow, EntityHeader),
    Polyline(PolylineRow, Vec<Vec2>, EntityHeader),
    Circle(CircleRow, EntityHeader),
    Polygon(CircleRow, EntityHeader),
    /// Opaque serialized text record, produced and consumed by
    /// [`crate::text::TextStore::export_entity`] /
    /// [`crate::text::TextStore::import_entity`].
    Text(Vec<u8>, EntityHeader),
}

impl EntitySnapshot {
    /// Captures the current state of `id` from the store, if live.
    #[must_use]
    pub fn capture(
        store: &EntityStore,
        text: &crate::text::TextStore,
        id: EntityId,
    ) -> Option<Self> {
        use crate::record::EntityKind;
        let header = store.header(id)?;
        match store.kind_of(id)? {
            EntityKind::Rect => Some(Self::Rect(*store.get_rect(id)?, header)),
            EntityKind::Line => Some(Self::Line(*store.get_line(id)?, header)),
            EntityKind::Arrow => Some(Self::Arrow(*store.get_arrow(id)?, header)),
            EntityKind::Polyline => {
                let row = *store.get_polyline(id)?;
                let points = store.polyline_points(&row).to_vec();
                Some(Self::Polyline(row, points, header))
            }
            EntityKind::Circle => Some(Self::Circle(*store.get_circle(id)?, header)),
            EntityKind::Polygon => Some(Self::Polygon(*store.get_polygon(id)?, header)),
            EntityKind::Text => Some(Self::Text(text.export_entity(id)?, header)),
        }
    }

    /// Restores this snapshot's geometry and header for `id`, recreating
    /// the entity if it is not currently live.
    pub fn restore(&self, store: &mut EntityStore, text: &mut crate::text::TextStore, id: EntityId) {
        match self {
            Self::Rect(row, header) => store.upsert_rect(id, *row, *header),
            Self::Line(row, header) => store.upsert_line(id, *row, *header),
            Self::Arrow(row, header) => store.upsert_arrow(id, *row, *header),
            Self::Polyline(row, points, header) => {
                let (offset, count) = store.push_points(points);
                let mut row = *row;
                row.offset = offset;
                row.count = count;
                store.upsert_polyline(id, row, *header);
            }
            Self::Circle(row, header) => store.upsert_circle(id, *row, *header),
            Self::Polygon(row, header) => store.upsert_polygon(id, *row, *header),
            Self::Text(bytes, header) => {
                text.import_entity(id, bytes);
                store.register_text(id, *header);
            }
        }
    }
}

/// A single reversible change captured during a history entry. Every
/// variant carries both the pre-entry (`before`) and post-entry
/// (`after`) state so undo and redo are symmetric replays rather than
/// derived inverses.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryOp {
    /// An entity's existence/geometry/header changed. `before: None`
    /// means the entity did not exist before the entry; `after: None`
    /// means it was deleted by the entry.
    Entity {
        id: EntityId,
        before: Option<EntitySnapshot>,
        after: Option<EntitySnapshot>,
    },
    /// The selection changed.
    Selection {
        before: Vec<EntityId>,
        after: Vec<EntityId>,
    },
    /// The draw order changed.
    DrawOrder {
        before: Vec<EntityId>,
        after: Vec<EntityId>,
    },
    /// A layer's existence/fields changed. `before: None` means created;
    /// `after: None` means deleted.
    Layer {
        layer_id: u32,
        before: Option<Layer>,
        after: Option<Layer>,
    },
}

/// Runtime context an op needs to apply its inverse or forward delta.
pub struct HistoryContext<'a> {
    pub store: &'a mut EntityStore,
    pub layers: &'a mut LayerStore,
    pub text: &'a mut crate::text::TextStore,
}

impl HistoryOp {
    fn apply_entity_state(
        ctx: &mut HistoryContext<'_>,
        id: EntityId,
        state: &Option<EntitySnapshot>,
    ) {
        match state {
            Some(snapshot) => snapshot.restore(ctx.store, ctx.text, id),
            None => {
                ctx.store.delete(id);
                ctx.layers.clear_all_overrides(id.get());
            }
        }
    }

    fn apply_layer_state(ctx: &mut HistoryContext<'_>, layer_id: u32, state: &Option<Layer>) {
        match state {
            Some(layer) => ctx.layers.insert(layer.clone()),
            None => {
                ctx.layers.remove(layer_id);
            }
        }
    }

    /// Restores the state this op captured *before* the entry ran.
    pub fn apply_inverse(&self, ctx: &mut HistoryContext<'_>) {
        match self {
            Self::Entity { id, before, .. } => Self::apply_entity_state(ctx, *id, before),
            Self::Selection { before, .. } => ctx.store.set_selection_raw(before.clone()),
            Self::DrawOrder { before, .. } => ctx.store.set_draw_order(before),
            Self::Layer {
                layer_id, before, ..
            } => Self::apply_layer_state(ctx, *layer_id, before),
        }
    }

    /// Restores the state this op captured *after* the entry ran.
    pub fn apply_forward(&self, ctx: &mut HistoryContext<'_>) {
        match self {
            Self::Entity { id, after, .. } => Self::apply_entity_state(ctx, *id, after),
            Self::Selection { after, .. } => ctx.store.set_selection_raw(after.clone()),
            Self::DrawOrder { after, .. } => ctx.store.set_draw_order(after),
            Self::Layer {
                layer_id, after, ..
            } => Self::apply_layer_state(ctx, *layer_id, after),
        }
    }
}

/// A group of ops recorded between `begin_entry` and `commit_entry`.
#[derive(Debug, Clone, Default)]
pub struct HistoryEntry {
    ops: Vec<HistoryOp>,
}

impl HistoryEntry {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    #[must_use]
    pub fn ops(&self) -> &[HistoryOp] {
        &self.ops
    }
}

#[derive(Debug, Clone, Default)]
struct InProgressEntry {
    entity_before: FxHashMap<u32, (EntityId, Option<EntitySnapshot>)>,
    layer_before: FxHashMap<u32, Option<Layer>>,
    selection_before: Option<Vec<EntityId>>,
    draw_order_before: Option<Vec<EntityId>>,
}

/// The ordered entry list plus cursor and in-progress entry builder.
#[derive(Debug, Clone, Default)]
pub struct HistoryEngine {
    entries: Vec<HistoryEntry>,
    /// Number of entries currently applied, i.e. `entries[0..cursor]`.
    cursor: usize,
    depth: u32,
    building: Option<InProgressEntry>,
}

impl HistoryEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Opens an entry. Nested opens coalesce into the outermost: only
    /// the first call truncates forward history and starts a builder.
    pub fn begin_entry(&mut self) {
        if self.depth == 0 {
            self.entries.truncate(self.cursor);
            self.building = Some(InProgressEntry::default());
        }
        self.depth += 1;
    }

    fn building_mut(&mut self) -> &mut InProgressEntry {
        self.building.as_mut().expect("begin_entry not called")
    }

    /// Records that `id` did not exist (or existed as `before`) prior to
    /// this entry's first touch of it. Safe to call more than once per
    /// entry; only the first call for a given id is kept.
    pub fn record_entity_before(&mut self, id: EntityId, before: Option<EntitySnapshot>) {
        self.building_mut()
            .entity_before
            .entry(id.get())
            .or_insert((id, before));
    }

    pub fn record_selection_before(&mut self, before: Vec<EntityId>) {
        let building = self.building_mut();
        if building.selection_before.is_none() {
            building.selection_before = Some(before);
        }
    }

    pub fn record_draw_order_before(&mut self, before: Vec<EntityId>) {
        let building = self.building_mut();
        if building.draw_order_before.is_none() {
            building.draw_order_before = Some(before);
        }
    }

    /// Records a layer's state (`None` if it did not exist) prior to
    /// this entry's first touch of it.
    pub fn record_layer_before(&mut self, layer_id: u32, before: Option<Layer>) {
        self.building_mut()
            .layer_before
            .entry(layer_id)
            .or_insert(before);
    }

    /// Closes the current entry, capturing each touched id/layer's
    /// post-entry state from `ctx` to pair with the pre-entry state
    /// recorded via `record_*_before`. An entry that ends up with no
    /// ops (nothing actually changed) is discarded. Only the outermost
    /// `commit_entry` of a nested group finalizes anything.
    pub fn commit_entry(&mut self, ctx: &HistoryContext<'_>) {
        if self.depth == 0 {
            return;
        }
        self.depth -= 1;
        if self.depth > 0 {
            return;
        }
        let Some(building) = self.building.take() else {
            return;
        };

        let mut ops = Vec::new();
        for (_, (id, before)) in building.entity_before {
            let after = EntitySnapshot::capture(ctx.store, ctx.text, id);
            if before != after {
                ops.push(HistoryOp::Entity { id, before, after });
            }
        }
        for (layer_id, before) in building.layer_before {
            let after = ctx.layers.get(layer_id).cloned();
            if before != after {
                ops.push(HistoryOp::Layer {
                    layer_id,
                    before,
                    after,
                });
            }
        }
        if let Some(before) = building.selection_before {
            let after = ctx.store.selection().to_vec();
            if before != after {
                ops.push(HistoryOp::Selection { before, after });
            }
        }
        if let Some(before) = building.draw_order_before {
            let after = ctx.store.draw_order().to_vec();
            if before != after {
                ops.push(HistoryOp::DrawOrder { before, after });
            }
        }

        if !ops.is_empty() {
            self.entries.truncate(self.cursor);
            self.entries.push(HistoryEntry { ops });
            self.cursor = self.entries.len();
        }
    }

    /// Discards the currently building entry without recording it, e.g.
    /// when a command buffer aborts before any mutation took effect.
    pub fn discard_entry(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        if self.depth == 0 {
            self.building = None;
        }
    }

    /// Applies the entry before `cursor` in reverse and moves the cursor
    /// back by one.
    pub fn undo(&mut self, ctx: &mut HistoryContext<'_>) -> Result<(), crate::error::HistoryError> {
        if self.cursor == 0 {
            return Err(crate::error::HistoryError::NothingToUndo);
        }
        let entry = self.entries[self.cursor - 1].clone();
        for op in entry.ops().iter().rev() {
            op.apply_inverse(ctx);
        }
        self.cursor -= 1;
        Ok(())
    }

    /// Re-applies the entry at `cursor` forward and advances the cursor.
    pub fn redo(&mut self, ctx: &mut HistoryContext<'_>) -> Result<(), crate::error::HistoryError> {
        if self.cursor >= self.entries.len() {
            return Err(crate::error::HistoryError::NothingToRedo);
        }
        let entry = self.entries[self.cursor].clone();
        for op in entry.ops() {
            op.apply_forward(ctx);
        }
        self.cursor += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Rgba;
    use crate::text::TextStore;

    fn rect_row(x: f32) -> RectRow {
        RectRow {
            x,
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

    fn ctx<'a>(
        store: &'a mut EntityStore,
        layers: &'a mut LayerStore,
        text: &'a mut TextStore,
    ) -> HistoryContext<'a> {
        HistoryContext { store, layers, text }
    }

    #[test]
    fn nested_begin_entry_coalesces_into_one_commit() {
        let mut history = HistoryEngine::new();
        let mut store = EntityStore::new();
        let mut layers = LayerStore::with_default_layer();
        let mut text = TextStore::new();
        let id = EntityId::new(1).unwrap();

        history.begin_entry();
        history.begin_entry();
        history.record_entity_before(id, None);
        store.upsert_rect(id, rect_row(1.0), EntityHeader::default());
        {
            let c = ctx(&mut store, &mut layers, &mut text);
            history.commit_entry(&c);
        }
        assert_eq!(history.entry_count(), 0, "inner commit must not finalize");
        {
            let c = ctx(&mut store, &mut layers, &mut text);
            history.commit_entry(&c);
        }
        assert_eq!(history.entry_count(), 1);
    }

    #[test]
    fn empty_entry_is_discarded() {
        let mut history = HistoryEngine::new();
        let mut store = EntityStore::new();
        let mut layers = LayerStore::with_default_layer();
        let mut text = TextStore::new();
        history.begin_entry();
        let c = ctx(&mut store, &mut layers, &mut text);
        history.commit_entry(&c);
        assert_eq!(history.entry_count(), 0);
    }

    #[test]
    fn undo_restores_deleted_entity() {
        let mut history = HistoryEngine::new();
        let mut store = EntityStore::new();
        let mut layers = LayerStore::with_default_layer();
        let mut text = TextStore::new();
        let id = EntityId::new(1).unwrap();

        store.upsert_rect(id, rect_row(1.0), EntityHeader::default());

        history.begin_entry();
        history.record_entity_before(
            id,
            EntitySnapshot::capture(&store, &text, id),
        );
        store.delete(id);
        {
            let c = ctx(&mut store, &mut layers, &mut text);
            history.commit_entry(&c);
        }
        assert!(!store.is_live(id));

        {
            let mut c = ctx(&mut store, &mut layers, &mut text);
            history.undo(&mut c).unwrap();
        }
        assert!(store.is_live(id));
        assert_eq!(store.get_rect(id).unwrap().x, 1.0);
    }

    #[test]
    fn redo_reapplies_forward_state() {
        let mut history = HistoryEngine::new();
        let mut store = EntityStore::new();
        let mut layers = LayerStore::with_default_layer();
        let mut text = TextStore::new();
        let id = EntityId::new(1).unwrap();

        history.begin_entry();
        history.record_entity_before(id, None);
        store.upsert_rect(id, rect_row(5.0), EntityHeader::default());
        {
            let c = ctx(&mut store, &mut layers, &mut text);
            history.commit_entry(&c);
        }

        {
            let mut c = ctx(&mut store, &mut layers, &mut text);
            history.undo(&mut c).unwrap();
        }
        assert!(!store.is_live(id));

        {
            let mut c = ctx(&mut store, &mut layers, &mut text);
            history.redo(&mut c).unwrap();
        }
        assert!(store.is_live(id));
        assert_eq!(store.get_rect(id).unwrap().x, 5.0);
    }

    #[test]
    fn second_mutation_in_one_entry_keeps_first_before_state() {
        let mut history = HistoryEngine::new();
        let mut store = EntityStore::new();
        let mut layers = LayerStore::with_default_layer();
        let mut text = TextStore::new();
        let id = EntityId::new(1).unwrap();
        store.upsert_rect(id, rect_row(0.0), EntityHeader::default());

        history.begin_entry();
        history.record_entity_before(id, EntitySnapshot::capture(&store, &text, id));
        store.upsert_rect(id, rect_row(1.0), EntityHeader::default());
        history.record_entity_before(id, EntitySnapshot::capture(&store, &text, id));
        store.upsert_rect(id, rect_row(2.0), EntityHeader::default());
        {
            let c = ctx(&mut store, &mut layers, &mut text);
            history.commit_entry(&c);
        }

        {
            let mut c = ctx(&mut store, &mut layers, &mut text);
            history.undo(&mut c).unwrap();
        }
        assert_eq!(store.get_rect(id).unwrap().x, 0.0);
    }

    #[test]
    fn undo_then_new_entry_truncates_redo_stack() {
        let mut history = HistoryEngine::new();
        let mut store = EntityStore::new();
        let mut layers = LayerStore::with_default_layer();
        let mut text = TextStore::new();

        for i in 0..3u32 {
            let id = EntityId::new(i + 1).unwrap();
            history.begin_entry();
            history.record_entity_before(id, None);
            store.upsert_rect(id, rect_row(i as f32), EntityHeader::default());
            let c = ctx(&mut store, &mut layers, &mut text);
            history.commit_entry(&c);
        }
        assert_eq!(history.entry_count(), 3);

        {
            let mut c = ctx(&mut store, &mut layers, &mut text);
            history.undo(&mut c).unwrap();
            history.undo(&mut c).unwrap();
        }

        let id = EntityId::new(99).unwrap();
        history.begin_entry();
        history.record_entity_before(id, None);
        store.upsert_rect(id, rect_row(42.0), EntityHeader::default());
        let c = ctx(&mut store, &mut layers, &mut text);
        history.commit_entry(&c);

        assert_eq!(history.entry_count(), 2);
        assert!(!history.can_redo());
    }
}
