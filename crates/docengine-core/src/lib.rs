// SPDX-License-Identifier: Apache-2.0

//! Authoritative in-process document engine for a 2D CAD editor.
//!
//! [`DocEngine`] is the single entry point external callers (an FFI
//! boundary, a test harness, or an embedding host) drive: apply a binary
//! command buffer, query picks, drive an interaction gesture, undo/redo,
//! and read back snapshots/events/digest. Every other module in this
//! crate is a subsystem `DocEngine` composes; none of them know about
//! each other directly.

pub mod command;
pub mod constants;
pub mod digest;
pub mod entity_store;
pub mod error;
pub mod events;
pub mod geometry;
pub mod history;
pub mod ident;
pub mod layer;
pub mod protocol;
pub mod record;
pub mod session;
pub mod snapshot;
pub mod text;

#[cfg(feature = "telemetry")]
mod telemetry;

use command::{CommandOp, ParsedCommand};
use digest::Digest;
use docengine_geom::{Aabb, BroadPhase, HandleCorner, MarqueeMode as GeomMarqueeMode, PickMask, SubTarget, Vec2};
use entity_store::EntityStore;
use error::{CommandError, EngineError, ErrorKind};
use events::{ChangeMask, EventRecord, EventRing, EpochAccumulator};
use history::{EntitySnapshot, HistoryContext, HistoryEngine};
use ident::EntityId;
use layer::LayerStore;
use protocol::{MarqueeMode, ProtocolInfo, ReorderAction, SelectionMode, SelectionModifier};
use record::{CircleRow, EntityFlags, EntityHeader, EntityHeaderRow, EntityKind, LineRow, PolylineRow, RectRow, Rgba};
use rustc_hash::FxHashSet;
use session::{InteractionSession, SnapPolicy, TransformCommit, TransformMode, TransformOpCode, TransformRecord};
use text::{TextAlignment as TextAlign, TextBoxMode, TextRunFlags as RunFlags, TextStyleRun as StyleRun, TextStore};

/// Upper bound on pending event-ring records before a poll consumer must
/// resync from a full snapshot.
const EVENT_RING_CAPACITY: usize = 2048;

// ---------------------------------------------------------------------
// Command buffer decoding
// ---------------------------------------------------------------------

/// A byte cursor over one command's payload, used to decode the
/// variable-length and multi-field fixed payloads the op table names.
/// Mirrors the private cursor [`text::TextStore::import_entity`] reads
/// snapshot-exported text bytes with.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.pos + n > self.bytes.len() {
            return None;
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Some(slice)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn u32(&mut self) -> Option<u32> {
        let b = self.take(4)?;
        Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn f32(&mut self) -> Option<f32> {
        self.u32().map(f32::from_bits)
    }

    fn rgba(&mut self) -> Option<Rgba> {
        Some(Rgba::new(self.f32()?, self.f32()?, self.f32()?, self.f32()?))
    }

    fn header_row(&mut self) -> Option<EntityHeaderRow> {
        Some(EntityHeaderRow {
            layer_id: self.u32()?,
            flags: self.u32()?,
        })
    }
}

fn truncated(record_index: usize, detail: &'static str) -> CommandError {
    CommandError::InvariantViolated { record_index, detail }
}

fn require_id(record_index: usize, raw: u32) -> Result<EntityId, CommandError> {
    EntityId::new(raw).ok_or(CommandError::InvariantViolated {
        record_index,
        detail: "command targets id 0, which is never valid",
    })
}

/// Every op fully decoded ahead of any mutation, so a malformed record
/// anywhere in the buffer is caught before the first live edit — the
/// same atomicity guarantee [`command::parse_buffer`] already gives the
/// header/fixed-size path, extended to variable payloads.
enum Decoded {
    ClearAll,
    DeleteEntity { id: EntityId },
    SetViewScale { scale: f32 },
    SetDrawOrder { ids: Vec<EntityId> },
    UpsertRect { id: EntityId, header: EntityHeader, row: RectRow },
    UpsertLine { id: EntityId, header: EntityHeader, row: LineRow },
    UpsertArrow { id: EntityId, header: EntityHeader, row: LineRow },
    UpsertPolyline {
        id: EntityId,
        header: EntityHeader,
        stroke: Rgba,
        stroke_enabled: u32,
        stroke_width: f32,
        points: Vec<Vec2>,
    },
    UpsertCircle { id: EntityId, header: EntityHeader, row: CircleRow },
    UpsertPolygon { id: EntityId, header: EntityHeader, row: CircleRow },
    UpsertText {
        id: EntityId,
        header: EntityHeader,
        position: Vec2,
        rotation: f32,
        box_mode: TextBoxMode,
        alignment: TextAlign,
        constraint_width: f32,
        content: Vec<u8>,
        runs: Vec<StyleRun>,
    },
    DeleteText { id: EntityId },
    SetTextCaret { id: EntityId, at: u32 },
    SetTextSelection { id: EntityId, anchor: u32, caret: u32 },
    InsertTextContent { id: EntityId, at: u32, content: Vec<u8> },
    DeleteTextContent { id: EntityId, start: u32, end: u32 },
    ApplyTextStyle {
        id: EntityId,
        start: u32,
        end: u32,
        flags: RunFlags,
        set: bool,
        color: Option<Rgba>,
    },
    SetTextAlign { id: EntityId, alignment: TextAlign },
}

fn decode_command(record_index: usize, cmd: &ParsedCommand<'_>) -> Result<Decoded, CommandError> {
    match cmd.op {
        CommandOp::ClearAll => Ok(Decoded::ClearAll),
        CommandOp::DeleteEntity => Ok(Decoded::DeleteEntity {
            id: require_id(record_index, cmd.id)?,
        }),
        CommandOp::SetViewScale => {
            let mut cursor = Cursor::new(cmd.payload);
            let scale = cursor.f32().ok_or(truncated(record_index, "SetViewScale payload"))?;
            Ok(Decoded::SetViewScale { scale })
        }
        CommandOp::SetDrawOrder => {
            if cmd.payload.len() % 4 != 0 {
                return Err(truncated(record_index, "SetDrawOrder payload is not a multiple of 4 bytes"));
            }
            let mut cursor = Cursor::new(cmd.payload);
            let mut ids = Vec::with_capacity(cmd.payload.len() / 4);
            while cursor.remaining() > 0 {
                let raw = cursor.u32().ok_or(truncated(record_index, "SetDrawOrder id"))?;
                if let Some(id) = EntityId::new(raw) {
                    ids.push(id);
                }
            }
            Ok(Decoded::SetDrawOrder { ids })
        }
        CommandOp::UpsertRect => {
            let id = require_id(record_index, cmd.id)?;
            let header_bytes = cmd
                .payload
                .get(..size_of::<EntityHeaderRow>())
                .ok_or(truncated(record_index, "UpsertRect header"))?;
            let row_bytes = cmd
                .payload
                .get(size_of::<EntityHeaderRow>()..)
                .ok_or(truncated(record_index, "UpsertRect row"))?;
            let header: EntityHeader = (*bytemuck::from_bytes::<EntityHeaderRow>(header_bytes)).into();
            let row: RectRow = *bytemuck::from_bytes(row_bytes);
            Ok(Decoded::UpsertRect { id, header, row })
        }
        CommandOp::UpsertLine | CommandOp::UpsertArrow => {
            let id = require_id(record_index, cmd.id)?;
            let header_bytes = cmd
                .payload
                .get(..size_of::<EntityHeaderRow>())
                .ok_or(truncated(record_index, "Upsert line/arrow header"))?;
            let row_bytes = cmd
                .payload
                .get(size_of::<EntityHeaderRow>()..)
                .ok_or(truncated(record_index, "Upsert line/arrow row"))?;
            let header: EntityHeader = (*bytemuck::from_bytes::<EntityHeaderRow>(header_bytes)).into();
            let row: LineRow = *bytemuck::from_bytes(row_bytes);
            if cmd.op == CommandOp::UpsertLine {
                Ok(Decoded::UpsertLine { id, header, row })
            } else {
                Ok(Decoded::UpsertArrow { id, header, row })
            }
        }
        CommandOp::UpsertPolyline => {
            let id = require_id(record_index, cmd.id)?;
            let mut cursor = Cursor::new(cmd.payload);
            let header_row = cursor.header_row().ok_or(truncated(record_index, "UpsertPolyline header"))?;
            let stroke = cursor.rgba().ok_or(truncated(record_index, "UpsertPolyline stroke"))?;
            let stroke_enabled = cursor.u32().ok_or(truncated(record_index, "UpsertPolyline stroke_enabled"))?;
            let stroke_width = cursor.f32().ok_or(truncated(record_index, "UpsertPolyline stroke_width"))?;
            let point_count = cursor.u32().ok_or(truncated(record_index, "UpsertPolyline point_count"))? as usize;
            let mut points = Vec::with_capacity(point_count);
            for _ in 0..point_count {
                let x = cursor.f32().ok_or(truncated(record_index, "UpsertPolyline point x"))?;
                let y = cursor.f32().ok_or(truncated(record_index, "UpsertPolyline point y"))?;
                points.push(Vec2::new(x, y));
            }
            if cursor.remaining() != 0 {
                return Err(truncated(record_index, "UpsertPolyline payload has trailing bytes"));
            }
            Ok(Decoded::UpsertPolyline {
                id,
                header: header_row.into(),
                stroke,
                stroke_enabled,
                stroke_width,
                points,
            })
        }
        CommandOp::UpsertCircle | CommandOp::UpsertPolygon => {
            let id = require_id(record_index, cmd.id)?;
            let header_bytes = cmd
                .payload
                .get(..size_of::<EntityHeaderRow>())
                .ok_or(truncated(record_index, "Upsert circle/polygon header"))?;
            let row_bytes = cmd
                .payload
                .get(size_of::<EntityHeaderRow>()..)
                .ok_or(truncated(record_index, "Upsert circle/polygon row"))?;
            let header: EntityHeader = (*bytemuck::from_bytes::<EntityHeaderRow>(header_bytes)).into();
            let row: CircleRow = *bytemuck::from_bytes(row_bytes);
            if cmd.op == CommandOp::UpsertCircle {
                Ok(Decoded::UpsertCircle { id, header, row })
            } else {
                Ok(Decoded::UpsertPolygon { id, header, row })
            }
        }
        CommandOp::UpsertText => {
            let id = require_id(record_index, cmd.id)?;
            let mut cursor = Cursor::new(cmd.payload);
            let header_row = cursor.header_row().ok_or(truncated(record_index, "UpsertText header"))?;
            let position = Vec2::new(
                cursor.f32().ok_or(truncated(record_index, "UpsertText position.x"))?,
                cursor.f32().ok_or(truncated(record_index, "UpsertText position.y"))?,
            );
            let rotation = cursor.f32().ok_or(truncated(record_index, "UpsertText rotation"))?;
            let box_mode_tag = cursor.u8().ok_or(truncated(record_index, "UpsertText box_mode"))?;
            let alignment_tag = cursor.u8().ok_or(truncated(record_index, "UpsertText alignment"))?;
            cursor
                .take(2)
                .ok_or(truncated(record_index, "UpsertText reserved bytes"))?;
            let constraint_width = cursor.f32().ok_or(truncated(record_index, "UpsertText constraint_width"))?;
            let content_len = cursor.u32().ok_or(truncated(record_index, "UpsertText content_len"))? as usize;
            let content = cursor
                .take(content_len)
                .ok_or(truncated(record_index, "UpsertText content"))?
                .to_vec();
            let run_count = cursor.u32().ok_or(truncated(record_index, "UpsertText run_count"))? as usize;
            let mut runs = Vec::with_capacity(run_count);
            for _ in 0..run_count {
                let start_byte = cursor.u32().ok_or(truncated(record_index, "UpsertText run start_byte"))?;
                let length = cursor.u32().ok_or(truncated(record_index, "UpsertText run length"))?;
                let font_id = cursor.u32().ok_or(truncated(record_index, "UpsertText run font_id"))?;
                let font_size = cursor.f32().ok_or(truncated(record_index, "UpsertText run font_size"))?;
                let color = cursor.rgba().ok_or(truncated(record_index, "UpsertText run color"))?;
                let flags = cursor.u8().ok_or(truncated(record_index, "UpsertText run flags"))?;
                cursor
                    .take(3)
                    .ok_or(truncated(record_index, "UpsertText run reserved bytes"))?;
                runs.push(StyleRun {
                    start_byte,
                    length,
                    font_id,
                    font_size,
                    color,
                    flags: RunFlags(flags),
                });
            }
            if cursor.remaining() != 0 {
                return Err(truncated(record_index, "UpsertText payload has trailing bytes"));
            }
            let box_mode = if box_mode_tag == 0 { TextBoxMode::AutoWidth } else { TextBoxMode::FixedWidth };
            let alignment = match alignment_tag {
                0 => TextAlign::Start,
                1 => TextAlign::Center,
                _ => TextAlign::End,
            };
            Ok(Decoded::UpsertText {
                id,
                header: header_row.into(),
                position,
                rotation,
                box_mode,
                alignment,
                constraint_width,
                content,
                runs,
            })
        }
        CommandOp::DeleteText => Ok(Decoded::DeleteText {
            id: require_id(record_index, cmd.id)?,
        }),
        CommandOp::SetTextCaret => {
            let mut cursor = Cursor::new(cmd.payload);
            let at = cursor.u32().ok_or(truncated(record_index, "SetTextCaret payload"))?;
            Ok(Decoded::SetTextCaret { id: require_id(record_index, cmd.id)?, at })
        }
        CommandOp::SetTextSelection => {
            let mut cursor = Cursor::new(cmd.payload);
            let anchor = cursor.u32().ok_or(truncated(record_index, "SetTextSelection anchor"))?;
            let caret = cursor.u32().ok_or(truncated(record_index, "SetTextSelection caret"))?;
            Ok(Decoded::SetTextSelection { id: require_id(record_index, cmd.id)?, anchor, caret })
        }
        CommandOp::InsertTextContent => {
            let id = require_id(record_index, cmd.id)?;
            let mut cursor = Cursor::new(cmd.payload);
            let at = cursor.u32().ok_or(truncated(record_index, "InsertTextContent at"))?;
            let content = cursor.take(cursor.remaining()).unwrap_or(&[]).to_vec();
            Ok(Decoded::InsertTextContent { id, at, content })
        }
        CommandOp::DeleteTextContent => {
            let mut cursor = Cursor::new(cmd.payload);
            let start = cursor.u32().ok_or(truncated(record_index, "DeleteTextContent start"))?;
            let end = cursor.u32().ok_or(truncated(record_index, "DeleteTextContent end"))?;
            Ok(Decoded::DeleteTextContent { id: require_id(record_index, cmd.id)?, start, end })
        }
        CommandOp::ApplyTextStyle => {
            let mut cursor = Cursor::new(cmd.payload);
            let start = cursor.u32().ok_or(truncated(record_index, "ApplyTextStyle start"))?;
            let end = cursor.u32().ok_or(truncated(record_index, "ApplyTextStyle end"))?;
            let flags = cursor.u8().ok_or(truncated(record_index, "ApplyTextStyle flags"))?;
            let set = cursor.u8().ok_or(truncated(record_index, "ApplyTextStyle set"))? != 0;
            let has_color = cursor.u8().ok_or(truncated(record_index, "ApplyTextStyle has_color"))? != 0;
            let color = cursor.rgba().ok_or(truncated(record_index, "ApplyTextStyle color"))?;
            Ok(Decoded::ApplyTextStyle {
                id: require_id(record_index, cmd.id)?,
                start,
                end,
                flags: RunFlags(flags),
                set,
                color: has_color.then_some(color),
            })
        }
        CommandOp::SetTextAlign => {
            let mut cursor = Cursor::new(cmd.payload);
            let tag = cursor.u32().ok_or(truncated(record_index, "SetTextAlign payload"))?;
            let alignment = match tag {
                0 => TextAlign::Start,
                1 => TextAlign::Center,
                _ => TextAlign::End,
            };
            Ok(Decoded::SetTextAlign { id: require_id(record_index, cmd.id)?, alignment })
        }
    }
}

// ---------------------------------------------------------------------
// DocEngine
// ---------------------------------------------------------------------

/// The authoritative document engine: owns every subsystem and exposes
/// the operations the wire protocol names.
///
/// Every mutating method is atomic: on failure the document is left
/// exactly as it was before the call, `last_error` is populated, and no
/// events are emitted. Read methods never fail.
pub struct DocEngine {
    store: EntityStore,
    layers: LayerStore,
    text: TextStore,
    history: HistoryEngine,
    session: InteractionSession,
    events: EventRing,
    pick_index: docengine_geom::AabbIndex,
    pick_dirty: bool,
    snap_policy: SnapPolicy,
    generation: u32,
    view_scale: f32,
    last_error: Option<EngineError>,
    last_apply_ms: u32,
}

impl Default for DocEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DocEngine {
    /// Creates a fresh, empty document: one default layer, no entities,
    /// no history, generation 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: EntityStore::new(),
            layers: LayerStore::with_default_layer(),
            text: TextStore::new(),
            history: HistoryEngine::new(),
            session: InteractionSession::new(),
            events: EventRing::new(EVENT_RING_CAPACITY),
            pick_index: docengine_geom::AabbIndex::new(),
            pick_dirty: true,
            snap_policy: SnapPolicy::default(),
            generation: 0,
            view_scale: 1.0,
            last_error: None,
            last_apply_ms: 0,
        }
    }

    #[must_use]
    pub fn protocol_info(&self) -> ProtocolInfo {
        ProtocolInfo::current()
    }

    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&EngineError> {
        self.last_error.as_ref()
    }

    #[must_use]
    pub fn last_error_kind(&self) -> ErrorKind {
        self.last_error.as_ref().map_or(ErrorKind::Ok, EngineError::kind)
    }

    /// Wall-clock duration of the most recent [`Self::apply_commands`]
    /// call that actually mutated the document, in milliseconds. Stays
    /// `0` for a call that was rejected before any mutation took place.
    #[must_use]
    pub fn last_apply_ms(&self) -> u32 {
        self.last_apply_ms
    }

    #[must_use]
    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    #[must_use]
    pub fn layers(&self) -> &LayerStore {
        &self.layers
    }

    #[must_use]
    pub fn text(&self) -> &TextStore {
        &self.text
    }

    #[must_use]
    pub fn session(&self) -> &InteractionSession {
        &self.session
    }

    #[must_use]
    pub fn snap_policy(&self) -> SnapPolicy {
        self.snap_policy
    }

    pub fn set_snap_policy(&mut self, policy: SnapPolicy) {
        self.snap_policy = policy;
    }

    #[must_use]
    pub fn view_scale(&self) -> f32 {
        self.view_scale
    }

    /// The document digest: [`digest::compute_digest`] over every
    /// non-text entity, extended with [`digest::fold_text_entity`] per
    /// live text entity in draw order so the fold stays deterministic.
    #[must_use]
    pub fn digest(&self) -> Digest {
        let mut seed = digest::compute_digest(&self.store, &self.layers).0;
        for &id in self.store.draw_order() {
            if self.store.kind_of(id) != Some(EntityKind::Text) {
                continue;
            }
            let Some(record) = self.text.get(id) else {
                continue;
            };
            let mut run_tags = Vec::with_capacity(record.content.runs().len() * 6);
            for run in record.content.runs() {
                run_tags.push(u64::from(run.start_byte));
                run_tags.push(u64::from(run.length));
                run_tags.push(u64::from(run.font_id));
                run_tags.push(u64::from(run.font_size.to_bits()));
                run_tags.push(u64::from(run.color.r.to_bits()));
                run_tags.push(u64::from(run.color.g.to_bits()));
                run_tags.push(u64::from(run.color.b.to_bits()));
                run_tags.push(u64::from(run.color.a.to_bits()));
                run_tags.push(u64::from(run.flags.0));
            }
            seed = digest::fold_text_entity(seed, id.get(), record.content.bytes(), &run_tags);
        }
        Digest(seed)
    }

    fn bump_generation(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    fn mark_pick_dirty(&mut self) {
        self.pick_dirty = true;
    }

    /// Rebuilds the pick broad-phase index from every visible, live
    /// entity if it was marked dirty by a prior mutation. Lazy per the
    /// `{generation, byte_count, pointer}`-cache discipline every other
    /// derived buffer in this engine follows.
    fn ensure_pick_index(&mut self) {
        if !self.pick_dirty {
            return;
        }
        self.pick_index.clear();
        for &id in self.store.draw_order() {
            let Some(header) = self.store.header(id) else {
                continue;
            };
            if !header.flags.is_visible() {
                continue;
            }
            if let Some(aabb) = geometry::entity_aabb(&self.store, &self.text, id) {
                self.pick_index.upsert(id.get(), aabb);
            }
        }
        self.pick_dirty = false;
    }

    // -- command buffer ------------------------------------------------

    /// Applies a binary command buffer atomically: either every command
    /// takes effect and one history entry/event epoch is produced, or
    /// none do and `last_error` is populated.
    pub fn apply_commands(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        self.last_apply_ms = 0;
        let start = std::time::Instant::now();
        let result = self.try_apply_commands(bytes);
        match &result {
            Ok(()) => {
                self.last_error = None;
                self.last_apply_ms = u32::try_from(start.elapsed().as_millis()).unwrap_or(u32::MAX);
            }
            Err(e) => self.last_error = Some(e.clone()),
        }
        #[cfg(feature = "telemetry")]
        telemetry::apply(self.generation, self.last_apply_ms, result.is_ok());
        result
    }

    fn try_apply_commands(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        let parsed = command::parse_buffer(bytes)?;
        let mut decoded = Vec::with_capacity(parsed.len());
        for (record_index, cmd) in parsed.iter().enumerate() {
            decoded.push(decode_command(record_index, cmd)?);
        }

        self.history.begin_entry();
        let mut epoch = EpochAccumulator::new();
        for item in decoded {
            self.apply_decoded(item, &mut epoch);
        }
        self.store.compact_point_pool();

        let ctx = HistoryContext {
            store: &mut self.store,
            layers: &mut self.layers,
            text: &mut self.text,
        };
        let entries_before = self.history.entry_count();
        self.history.commit_entry(&ctx);
        if self.history.entry_count() > entries_before {
            epoch.history_changed();
            #[cfg(feature = "telemetry")]
            telemetry::history_entry(self.generation, self.history.entry_count() as u32);
        }

        if !epoch.is_empty() {
            self.mark_pick_dirty();
            self.bump_generation();
            self.events.push_epoch(epoch.flush(), u64::from(self.generation));
            #[cfg(feature = "telemetry")]
            if self.events.is_overflowed() {
                telemetry::event_overflow(self.generation);
            }
        }
        Ok(())
    }

    fn apply_decoded(&mut self, item: Decoded, epoch: &mut EpochAccumulator) {
        match item {
            Decoded::ClearAll => self.apply_clear_all(epoch),
            Decoded::DeleteEntity { id } => self.apply_delete_entity(id, epoch),
            Decoded::SetViewScale { scale } => self.view_scale = scale,
            Decoded::SetDrawOrder { ids } => {
                self.history.record_draw_order_before(self.store.draw_order().to_vec());
                self.store.set_draw_order(&ids);
                epoch.order_changed();
            }
            Decoded::UpsertRect { id, header, row } => {
                self.before_entity(id);
                self.store.upsert_rect(id, row, header);
                self.after_upsert(id, epoch);
            }
            Decoded::UpsertLine { id, header, row } => {
                self.before_entity(id);
                self.store.upsert_line(id, row, header);
                self.after_upsert(id, epoch);
            }
            Decoded::UpsertArrow { id, header, row } => {
                self.before_entity(id);
                self.store.upsert_arrow(id, row, header);
                self.after_upsert(id, epoch);
            }
            Decoded::UpsertPolyline { id, header, stroke, stroke_enabled, stroke_width, points } => {
                self.before_entity(id);
                let (offset, count) = self.store.push_points(&points);
                self.store.upsert_polyline(
                    id,
                    PolylineRow {
                        offset,
                        count,
                        stroke,
                        stroke_enabled,
                        stroke_width,
                        _pad: [0; 2],
                    },
                    header,
                );
                self.after_upsert(id, epoch);
            }
            Decoded::UpsertCircle { id, header, row } => {
                self.before_entity(id);
                self.store.upsert_circle(id, row, header);
                self.after_upsert(id, epoch);
            }
            Decoded::UpsertPolygon { id, header, row } => {
                self.before_entity(id);
                self.store.upsert_polygon(id, row, header);
                self.after_upsert(id, epoch);
            }
            Decoded::UpsertText { id, header, position, rotation, box_mode, alignment, constraint_width, content, runs } => {
                self.before_entity(id);
                self.text.upsert(id, position, rotation, box_mode, alignment, constraint_width, content, runs);
                self.store.register_text(id, header);
                self.after_upsert(id, epoch);
            }
            Decoded::DeleteText { id } => self.apply_delete_entity(id, epoch),
            Decoded::SetTextCaret { id, at } => {
                if self.text.set_caret(id, at) {
                    epoch.doc_changed(ChangeMask::RENDER_DATA);
                    epoch.entity_changed(id, ChangeMask::RENDER_DATA);
                }
            }
            Decoded::SetTextSelection { id, anchor, caret } => {
                if self.text.set_selection(id, anchor, caret) {
                    epoch.doc_changed(ChangeMask::RENDER_DATA);
                    epoch.entity_changed(id, ChangeMask::RENDER_DATA);
                }
            }
            Decoded::InsertTextContent { id, at, content } => {
                self.before_entity(id);
                if self.text.insert_content(id, at as usize, &content) {
                    epoch.entity_changed(id, ChangeMask::TEXT.union(ChangeMask::BOUNDS));
                }
            }
            Decoded::DeleteTextContent { id, start, end } => {
                self.before_entity(id);
                if self.text.delete_content(id, start as usize, end as usize) {
                    epoch.entity_changed(id, ChangeMask::TEXT.union(ChangeMask::BOUNDS));
                }
            }
            Decoded::ApplyTextStyle { id, start, end, flags, set, color } => {
                self.before_entity(id);
                if self.text.apply_style(id, start as usize, end as usize, flags, set, color) {
                    epoch.entity_changed(id, ChangeMask::TEXT);
                }
            }
            Decoded::SetTextAlign { id, alignment } => {
                self.before_entity(id);
                if self.text.set_align(id, alignment) {
                    epoch.entity_changed(id, ChangeMask::TEXT.union(ChangeMask::BOUNDS));
                }
            }
        }
    }

    /// Records `id`'s pre-mutation snapshot exactly once for the entry
    /// currently building.
    fn before_entity(&mut self, id: EntityId) {
        let before = EntitySnapshot::capture(&self.store, &self.text, id);
        self.history.record_entity_before(id, before);
    }

    fn after_upsert(&mut self, id: EntityId, epoch: &mut EpochAccumulator) {
        epoch.entity_changed(id, ChangeMask::GEOMETRY.union(ChangeMask::STYLE).union(ChangeMask::BOUNDS));
    }

    fn apply_clear_all(&mut self, epoch: &mut EpochAccumulator) {
        self.history.record_selection_before(self.store.selection().to_vec());
        self.history.record_draw_order_before(self.store.draw_order().to_vec());
        for id in self.store.draw_order().to_vec() {
            self.before_entity(id);
            if self.store.kind_of(id) == Some(EntityKind::Text) {
                self.text.delete(id);
            }
            self.layers.clear_all_overrides(id.get());
            epoch.entity_deleted(id);
        }
        self.store.clear_all();
        epoch.selection_changed();
        epoch.order_changed();
    }

    fn apply_delete_entity(&mut self, id: EntityId, epoch: &mut EpochAccumulator) {
        if !self.store.is_live(id) {
            return;
        }
        self.before_entity(id);
        if self.store.kind_of(id) == Some(EntityKind::Text) {
            self.text.delete(id);
        }
        self.layers.clear_all_overrides(id.get());
        self.store.delete(id);
        epoch.entity_deleted(id);
    }

    // -- selection / draw order -----------------------------------------

    /// Replaces or combines the selection with `ids` per `mode`, pruned
    /// to live, visible, unlocked entities.
    pub fn set_selection(&mut self, ids: &[EntityId], mode: SelectionMode) {
        let before = self.store.selection().to_vec();
        let combined = combine_selection(&before, ids, mode);
        self.store.set_selection_raw(combined);
        self.store.prune_selection(&self.layers);
        if self.store.selection() != before.as_slice() {
            self.history.begin_entry();
            self.history.record_selection_before(before);
            let ctx = HistoryContext {
                store: &mut self.store,
                layers: &mut self.layers,
                text: &mut self.text,
            };
            self.history.commit_entry(&ctx);
            let mut epoch = EpochAccumulator::new();
            epoch.selection_changed();
            self.bump_generation();
            self.events.push_epoch(epoch.flush(), u64::from(self.generation));
        }
    }

    /// Selects every live, visible, unlocked entity whose shape
    /// satisfies `marquee_mode` against `rect`, then combines the result
    /// into the selection per `selection_mode`.
    pub fn marquee_select(&mut self, rect: Aabb, marquee_mode: MarqueeMode, selection_mode: SelectionMode) {
        let geom_mode: GeomMarqueeMode = marquee_mode.into();
        let mut hits = Vec::new();
        for &id in self.store.draw_order() {
            let Some(header) = self.store.header(id) else {
                continue;
            };
            if !header.flags.is_visible() || header.flags.is_locked() {
                continue;
            }
            if let Some(layer) = self.layers.get(header.layer_id) {
                if !layer.flags.is_visible() || layer.flags.is_locked() {
                    continue;
                }
            }
            let Some(kind) = self.store.kind_of(id) else {
                continue;
            };
            let hit = if let Some(vertices) = geometry::entity_vertices(&self.store, id) {
                match geom_mode {
                    GeomMarqueeMode::Window => geometry::entity_aabb(&self.store, &self.text, id)
                        .is_some_and(|aabb| rect.contains(&aabb)),
                    GeomMarqueeMode::Crossing => {
                        docengine_geom::polyline_crosses_rect(&vertices, false, &rect)
                            || geometry::entity_aabb(&self.store, &self.text, id).is_some_and(|aabb| rect.overlaps(&aabb))
                    }
                }
            } else {
                let Some(aabb) = geometry::entity_aabb(&self.store, &self.text, id) else {
                    continue;
                };
                match geom_mode {
                    GeomMarqueeMode::Window => rect.contains(&aabb),
                    GeomMarqueeMode::Crossing => rect.overlaps(&aabb),
                }
            };
            if hit {
                hits.push(id);
            }
            let _ = kind;
        }
        self.set_selection(&hits, selection_mode);
    }

    /// Reorders `ids` within the draw order per `action`, as a single
    /// history entry.
    pub fn reorder(&mut self, ids: &[EntityId], action: ReorderAction) {
        let before = self.store.draw_order().to_vec();
        let target: FxHashSet<EntityId> = ids.iter().copied().collect();
        let mut new_order = before.clone();
        match action {
            ReorderAction::BringToFront => {
                new_order.retain(|id| !target.contains(id));
                new_order.extend(ids.iter().filter(|id| self.store.is_live(**id)));
            }
            ReorderAction::SendToBack => {
                let mut front: Vec<EntityId> = ids.iter().copied().filter(|id| self.store.is_live(*id)).collect();
                new_order.retain(|id| !target.contains(id));
                front.append(&mut new_order);
                new_order = front;
            }
            ReorderAction::BringForward => {
                for i in (0..new_order.len().saturating_sub(1)).rev() {
                    if target.contains(&new_order[i]) && !target.contains(&new_order[i + 1]) {
                        new_order.swap(i, i + 1);
                    }
                }
            }
            ReorderAction::SendBackward => {
                for i in 1..new_order.len() {
                    if target.contains(&new_order[i]) && !target.contains(&new_order[i - 1]) {
                        new_order.swap(i, i - 1);
                    }
                }
            }
        }
        if new_order == before {
            return;
        }
        self.history.begin_entry();
        self.history.record_draw_order_before(before);
        self.store.set_draw_order(&new_order);
        let ctx = HistoryContext {
            store: &mut self.store,
            layers: &mut self.layers,
            text: &mut self.text,
        };
        self.history.commit_entry(&ctx);
        self.mark_pick_dirty();
        self.bump_generation();
        let mut epoch = EpochAccumulator::new();
        epoch.order_changed();
        self.events.push_epoch(epoch.flush(), u64::from(self.generation));
    }

    // -- pick index ------------------------------------------------------

    /// Returns the topmost live entity whose pick geometry (body or
    /// handle, per `mask`) contains `point` within `tolerance`, honoring
    /// draw-order precedence (last drawn wins ties).
    #[must_use]
    pub fn pick(&mut self, point: Vec2, tolerance: f32, mask: PickMask) -> Option<(EntityId, SubTarget)> {
        self.ensure_pick_index();
        let query_box = Aabb::new(
            Vec2::new(point.x() - tolerance, point.y() - tolerance),
            Vec2::new(point.x() + tolerance, point.y() + tolerance),
        );
        let mut candidates = self.pick_index.query(&query_box);
        candidates.sort_unstable();
        let mut best: Option<(EntityId, SubTarget)> = None;
        let mut best_rank = usize::MAX;
        for raw_id in candidates {
            let Some(id) = EntityId::new(raw_id) else {
                continue;
            };
            if let Some(hit) = self.pick_one(id, point, tolerance, mask) {
                let rank = self.store.z_rank(id).unwrap_or(0);
                if rank >= best_rank || best.is_none() {
                    best_rank = rank;
                    best = Some(hit);
                }
            }
        }
        best
    }

    fn pick_one(&self, id: EntityId, point: Vec2, tolerance: f32, mask: PickMask) -> Option<(EntityId, SubTarget)> {
        let aabb = geometry::entity_aabb(&self.store, &self.text, id)?;
        if mask.includes(SubTarget::ResizeHandle) && geometry::entity_vertices(&self.store, id).is_none() {
            if docengine_geom::nearest_resize_handle(&aabb, point, tolerance).is_some() {
                return Some((id, SubTarget::ResizeHandle));
            }
        }
        if let Some(vertices) = geometry::entity_vertices(&self.store, id) {
            if mask.includes(SubTarget::VertexHandle) {
                if docengine_geom::nearest_vertex(&vertices, point, tolerance).is_some() {
                    return Some((id, SubTarget::VertexHandle));
                }
            }
            if mask.includes(SubTarget::EdgeHandle) {
                if docengine_geom::nearest_edge(&vertices, false, point, tolerance).is_some() {
                    return Some((id, SubTarget::EdgeHandle));
                }
            }
            return None;
        }
        if mask.includes(SubTarget::Body) && aabb.inflate(tolerance).contains_point(point) {
            return Some((id, SubTarget::Body));
        }
        None
    }

    // -- interaction session ---------------------------------------------

    /// Opens a transform gesture, wrapping the session's own before-state
    /// capture in a history entry so `commit_transform` produces undo.
    #[allow(clippy::too_many_arguments)]
    pub fn begin_transform(
        &mut self,
        ids: &[EntityId],
        mode: TransformMode,
        specific_id: Option<EntityId>,
        handle_or_vertex_index: u32,
        start_screen_xy: Vec2,
        view_xy: Vec2,
        view_scale: f32,
        view_size: Vec2,
        modifiers: SelectionModifier,
    ) -> bool {
        let before_order: FxHashSet<EntityId> = self.store.draw_order().iter().copied().collect();
        let started = self.session.begin_transform(
            &mut self.store,
            &mut self.text,
            ids,
            mode,
            specific_id,
            handle_or_vertex_index,
            start_screen_xy,
            view_xy,
            view_scale,
            view_size,
            modifiers,
        );
        if !started {
            return false;
        }
        self.history.begin_entry();
        self.history.record_selection_before(self.store.selection().to_vec());
        for &id in ids {
            self.before_entity(id);
        }
        for &id in self.store.draw_order() {
            if !before_order.contains(&id) {
                self.history.record_entity_before(id, None);
            }
        }
        true
    }

    pub fn update_transform(&mut self, cur_screen_xy: Vec2, modifiers: SelectionModifier) -> bool {
        let snap = self.snap_policy;
        self.session.update_transform(&mut self.store, &mut self.text, cur_screen_xy, modifiers, &snap)
    }

    pub fn add_draft_vertex(&mut self, screen_xy: Vec2) -> bool {
        self.session.add_draft_vertex(screen_xy)
    }

    #[must_use]
    pub fn active_snap(&self) -> Option<Vec2> {
        self.session.active_snap()
    }

    #[must_use]
    pub fn is_transform_active(&self) -> bool {
        self.session.is_active()
    }

    /// Finalizes the active gesture. A sub-threshold or no-op drag
    /// discards the history entry the matching `begin_transform` opened;
    /// an effective drag commits it and fires `EntityChanged` per
    /// touched id.
    pub fn commit_transform(&mut self) -> TransformCommit {
        let commit = self.session.commit_transform(&mut self.store, &mut self.text);
        match &commit {
            TransformCommit::None => self.history.discard_entry(),
            TransformCommit::Draft { .. } => self.history.discard_entry(),
            TransformCommit::Entities(records) => {
                self.store.compact_point_pool();
                let ctx = HistoryContext {
                    store: &mut self.store,
                    layers: &mut self.layers,
                    text: &mut self.text,
                };
                let entries_before = self.history.entry_count();
                self.history.commit_entry(&ctx);
                let mut epoch = EpochAccumulator::new();
                for record in records {
                    let mask = transform_op_mask(record.op);
                    epoch.entity_changed(record.id, mask);
                }
                if self.history.entry_count() > entries_before {
                    epoch.history_changed();
                }
                if !epoch.is_empty() {
                    self.mark_pick_dirty();
                    self.bump_generation();
                    self.events.push_epoch(epoch.flush(), u64::from(self.generation));
                }
            }
        }
        commit
    }

    /// Cancels the active gesture, restoring every target's pre-gesture
    /// geometry and discarding the history entry the matching
    /// `begin_transform` opened.
    pub fn cancel_transform(&mut self) -> bool {
        let cancelled = self.session.cancel_transform(&mut self.store, &mut self.text);
        if cancelled {
            self.history.discard_entry();
        }
        cancelled
    }

    // -- undo/redo --------------------------------------------------------

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) -> Result<(), EngineError> {
        let mut ctx = HistoryContext {
            store: &mut self.store,
            layers: &mut self.layers,
            text: &mut self.text,
        };
        self.history.undo(&mut ctx)?;
        self.finish_history_navigation();
        Ok(())
    }

    pub fn redo(&mut self) -> Result<(), EngineError> {
        let mut ctx = HistoryContext {
            store: &mut self.store,
            layers: &mut self.layers,
            text: &mut self.text,
        };
        self.history.redo(&mut ctx)?;
        self.finish_history_navigation();
        Ok(())
    }

    fn finish_history_navigation(&mut self) {
        self.store.compact_point_pool();
        self.store.prune_selection(&self.layers);
        self.mark_pick_dirty();
        self.bump_generation();
        let mut epoch = EpochAccumulator::new();
        epoch.doc_changed(ChangeMask::GEOMETRY);
        epoch.history_changed();
        self.events.push_epoch(epoch.flush(), u64::from(self.generation));
        #[cfg(feature = "telemetry")]
        if self.events.is_overflowed() {
            telemetry::event_overflow(self.generation);
        }
    }

    // -- snapshot ----------------------------------------------------------

    #[must_use]
    pub fn save_snapshot(&self) -> Vec<u8> {
        snapshot::build(&self.store, &self.layers, &self.text, self.generation)
    }

    /// Replaces the entire document with a loaded snapshot. History is
    /// reset: a snapshot is a resync point, not a replayable delta.
    pub fn load_snapshot(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        let loaded = match snapshot::parse(bytes) {
            Ok(loaded) => loaded,
            Err(e) => {
                let err = EngineError::from(e);
                self.last_error = Some(err.clone());
                return Err(err);
            }
        };
        self.store = loaded.store;
        self.layers = loaded.layers;
        self.text = loaded.text;
        self.generation = loaded.generation;
        self.history = HistoryEngine::new();
        self.session = InteractionSession::new();
        self.mark_pick_dirty();
        self.last_error = None;
        let mut epoch = EpochAccumulator::new();
        epoch.doc_changed(ChangeMask::GEOMETRY.union(ChangeMask::STYLE).union(ChangeMask::LAYER));
        self.events.push_epoch(epoch.flush(), u64::from(self.generation));
        #[cfg(feature = "telemetry")]
        if self.events.is_overflowed() {
            telemetry::event_overflow(self.generation);
        }
        Ok(())
    }

    // -- events --------------------------------------------------------

    #[must_use]
    pub fn poll_events(&self, max: usize) -> &[EventRecord] {
        self.events.poll(max)
    }

    pub fn consume_events(&mut self, n: usize) {
        self.events.consume(n);
    }

    #[must_use]
    pub fn is_event_stream_overflowed(&self) -> bool {
        self.events.is_overflowed()
    }

    pub fn ack_resync(&mut self, generation: u64) {
        self.events.ack_resync(generation);
    }
}

fn transform_op_mask(op: TransformOpCode) -> ChangeMask {
    match op {
        TransformOpCode::Move | TransformOpCode::VertexSet => ChangeMask::GEOMETRY.union(ChangeMask::BOUNDS),
        TransformOpCode::Resize | TransformOpCode::SideResize => ChangeMask::GEOMETRY.union(ChangeMask::BOUNDS),
        TransformOpCode::Rotate => ChangeMask::GEOMETRY.union(ChangeMask::BOUNDS),
    }
}

fn combine_selection(before: &[EntityId], ids: &[EntityId], mode: SelectionMode) -> Vec<EntityId> {
    match mode {
        SelectionMode::Replace => ids.to_vec(),
        SelectionMode::Add => {
            let mut out = before.to_vec();
            for &id in ids {
                if !out.contains(&id) {
                    out.push(id);
                }
            }
            out
        }
        SelectionMode::Remove => before.iter().copied().filter(|id| !ids.contains(id)).collect(),
        SelectionMode::Toggle => {
            let mut out = before.to_vec();
            for &id in ids {
                if let Some(pos) = out.iter().position(|&e| e == id) {
                    out.remove(pos);
                } else {
                    out.push(id);
                }
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use constants::{COMMAND_MAGIC, COMMAND_VERSION};

    fn padded(n: usize) -> usize {
        (n + 3) & !3
    }

    fn build_buffer(records: &[(CommandOp, u32, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&COMMAND_MAGIC.to_le_bytes());
        out.extend_from_slice(&COMMAND_VERSION.to_le_bytes());
        out.extend_from_slice(&(records.len() as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        for (op, id, payload) in records {
            out.extend_from_slice(&op.tag().to_le_bytes());
            out.extend_from_slice(&id.to_le_bytes());
            out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(payload);
            while out.len() % 4 != 0 {
                out.push(0);
            }
        }
        out
    }

    fn rect_payload(id: u32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&1u32.to_le_bytes()); // layer_id
        out.extend_from_slice(&EntityFlags::DEFAULT.0.to_le_bytes());
        out.extend_from_slice(&[0u8; 3]);
        out.extend_from_slice(&0.0f32.to_le_bytes()); // x
        out.extend_from_slice(&0.0f32.to_le_bytes()); // y
        out.extend_from_slice(&10.0f32.to_le_bytes()); // w
        out.extend_from_slice(&10.0f32.to_le_bytes()); // h
        out.extend_from_slice(&[0u8; 16]); // fill
        out.extend_from_slice(&[0u8; 16]); // stroke
        out.extend_from_slice(&0u32.to_le_bytes()); // stroke_enabled
        out.extend_from_slice(&0.0f32.to_le_bytes()); // stroke_width
        out.extend_from_slice(&[0u8; 8]); // pad
        let _ = id;
        out
    }

    #[test]
    fn clear_all_then_upsert_rect_round_trips_through_apply_and_digest() {
        let mut engine = DocEngine::new();
        let buf = build_buffer(&[
            (CommandOp::ClearAll, 0, &[]),
            (CommandOp::UpsertRect, 1, &rect_payload(1)),
        ]);
        engine.apply_commands(&buf).unwrap();
        assert!(engine.store().is_live(EntityId::new(1).unwrap()));
        assert_eq!(engine.generation(), 1);
        assert!(engine.can_undo());
    }

    #[test]
    fn bad_magic_leaves_generation_unchanged() {
        let mut engine = DocEngine::new();
        let mut buf = build_buffer(&[(CommandOp::ClearAll, 0, &[])]);
        buf[0] = 0xFF;
        let generation_before = engine.generation();
        assert!(engine.apply_commands(&buf).is_err());
        assert_eq!(engine.generation(), generation_before);
        assert_eq!(engine.last_error_kind(), ErrorKind::InvalidHeader);
    }

    #[test]
    fn undo_after_upsert_restores_prior_digest() {
        let mut engine = DocEngine::new();
        let digest_before = engine.digest();
        let buf = build_buffer(&[(CommandOp::UpsertRect, 1, &rect_payload(1))]);
        engine.apply_commands(&buf).unwrap();
        assert_ne!(engine.digest(), digest_before);
        engine.undo().unwrap();
        assert_eq!(engine.digest(), digest_before);
    }

    #[test]
    fn set_draw_order_with_truncated_payload_is_invariant_violation() {
        let mut engine = DocEngine::new();
        let buf = build_buffer(&[(CommandOp::SetDrawOrder, 0, &[1, 2, 3])]);
        let err = engine.apply_commands(&buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    }

    #[test]
    fn malformed_second_command_leaves_first_commands_effect_unapplied() {
        let mut engine = DocEngine::new();
        let buf = build_buffer(&[
            (CommandOp::UpsertRect, 1, &rect_payload(1)),
            (CommandOp::SetDrawOrder, 0, &[1, 2, 3]),
        ]);
        assert!(engine.apply_commands(&buf).is_err());
        assert!(!engine.store().is_live(EntityId::new(1).unwrap()));
    }
}
