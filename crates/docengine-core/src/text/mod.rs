//! Text subsystem: content/style runs, caret navigation, layout, and the
//! glyph atlas contract.

pub mod atlas;
pub mod caret;
pub mod content;
pub mod layout;

use docengine_geom::Vec2;
use rustc_hash::FxHashMap;

use crate::ident::EntityId;
use atlas::GlyphAtlas;
use caret::CaretState;
use content::{RunFlags, StyleRun, TextContent};
use layout::{compute_layout, BoxMode, TextAlign, TextLayout};

pub use atlas::{AtlasMeta, GlyphEntry, UvRect};
pub use caret::CaretState as Caret;
pub use content::{RunFlags as TextRunFlags, StyleRun as TextStyleRun};
pub use layout::{BoxMode as TextBoxMode, GlyphInstance, LineInfo, TextAlign as TextAlignment, TextLayout as TextLayoutResult};

/// One text entity's full state.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRecord {
    pub position: Vec2,
    pub rotation: f32,
    pub box_mode: BoxMode,
    pub alignment: TextAlign,
    pub constraint_width: f32,
    pub content: TextContent,
    pub caret: Option<CaretState>,
    layout: Option<TextLayout>,
    layout_dirty: bool,
}

impl TextRecord {
    #[must_use]
    fn new() -> Self {
        Self {
            position: Vec2::ZERO,
            rotation: 0.0,
            box_mode: BoxMode::AutoWidth,
            alignment: TextAlign::Start,
            constraint_width: 0.0,
            content: TextContent::new(),
            caret: None,
            layout: None,
            layout_dirty: true,
        }
    }

    fn mark_dirty(&mut self) {
        self.layout_dirty = true;
    }
}

/// Owns every text entity's content/layout/caret state and the shared
/// glyph atlas.
#[derive(Default)]
pub struct TextStore {
    records: FxHashMap<u32, TextRecord>,
    atlas: GlyphAtlas,
}

impl TextStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_live(&self, id: EntityId) -> bool {
        self.records.contains_key(&id.get())
    }

    #[must_use]
    pub fn atlas(&self) -> &GlyphAtlas {
        &self.atlas
    }

    pub fn atlas_mut(&mut self) -> &mut GlyphAtlas {
        &mut self.atlas
    }

    /// Creates or replaces `id`'s text record wholesale.
    pub fn upsert(
        &mut self,
        id: EntityId,
        position: Vec2,
        rotation: f32,
        box_mode: BoxMode,
        alignment: TextAlign,
        constraint_width: f32,
        content_bytes: Vec<u8>,
        runs: Vec<StyleRun>,
    ) {
        let mut record = self.records.remove(&id.get()).unwrap_or_else(TextRecord::new);
        record.position = position;
        record.rotation = rotation;
        record.box_mode = box_mode;
        record.alignment = alignment;
        record.constraint_width = constraint_width;
        record.content.set(content_bytes, runs);
        record.mark_dirty();
        self.records.insert(id.get(), record);
    }

    pub fn delete(&mut self, id: EntityId) -> bool {
        self.records.remove(&id.get()).is_some()
    }

    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&TextRecord> {
        self.records.get(&id.get())
    }

    /// The anchor position of `id`'s text box, if live.
    #[must_use]
    pub fn position(&self, id: EntityId) -> Option<Vec2> {
        self.records.get(&id.get()).map(|r| r.position)
    }

    /// Moves `id`'s text box to `position` in place. Does not dirty
    /// layout: position is an external anchor, not a layout input.
    pub fn set_position(&mut self, id: EntityId, position: Vec2) -> bool {
        let Some(record) = self.records.get_mut(&id.get()) else {
            return false;
        };
        record.position = position;
        true
    }

    /// The rotation (radians) of `id`'s text box, if live.
    #[must_use]
    pub fn rotation(&self, id: EntityId) -> Option<f32> {
        self.records.get(&id.get()).map(|r| r.rotation)
    }

    /// Sets `id`'s text box rotation in place.
    pub fn set_rotation(&mut self, id: EntityId, rotation: f32) -> bool {
        let Some(record) = self.records.get_mut(&id.get()) else {
            return false;
        };
        record.rotation = rotation;
        true
    }

    pub fn set_caret(&mut self, id: EntityId, at: u32) -> bool {
        let Some(record) = self.records.get_mut(&id.get()) else {
            return false;
        };
        let len = record.content.len() as u32;
        record.caret = Some(CaretState::collapsed(at).clamp(len));
        true
    }

    pub fn set_selection(&mut self, id: EntityId, anchor: u32, caret: u32) -> bool {
        let Some(record) = self.records.get_mut(&id.get()) else {
            return false;
        };
        let len = record.content.len() as u32;
        record.caret = Some(
            CaretState {
                caret,
                anchor: Some(anchor),
            }
            .clamp(len),
        );
        true
    }

    pub fn insert_content(&mut self, id: EntityId, at: usize, bytes: &[u8]) -> bool {
        let Some(record) = self.records.get_mut(&id.get()) else {
            return false;
        };
        record.content.insert(at, bytes);
        record.mark_dirty();
        true
    }

    pub fn delete_content(&mut self, id: EntityId, start: usize, end: usize) -> bool {
        let Some(record) = self.records.get_mut(&id.get()) else {
            return false;
        };
        record.content.delete(start, end);
        record.mark_dirty();
        true
    }

    pub fn apply_style(
        &mut self,
        id: EntityId,
        start: usize,
        end: usize,
        flags: RunFlags,
        set: bool,
        color: Option<crate::record::Rgba>,
    ) -> bool {
        let Some(record) = self.records.get_mut(&id.get()) else {
            return false;
        };
        record.content.apply_style(start, end, flags, set, color);
        record.mark_dirty();
        true
    }

    pub fn set_align(&mut self, id: EntityId, alignment: TextAlign) -> bool {
        let Some(record) = self.records.get_mut(&id.get()) else {
            return false;
        };
        record.alignment = alignment;
        record.mark_dirty();
        true
    }

    /// Returns the current layout for `id`, rebuilding it first if dirty.
    pub fn layout(&mut self, id: EntityId) -> Option<&TextLayout> {
        let record = self.records.get_mut(&id.get())?;
        if record.layout_dirty || record.layout.is_none() {
            let layout = compute_layout(
                &record.content,
                &mut self.atlas,
                record.box_mode,
                record.constraint_width,
            );
            record.layout = Some(layout);
            record.layout_dirty = false;
        }
        record.layout.as_ref()
    }

    /// Serializes `id`'s full record (content, runs, box/align/position,
    /// caret) to an opaque byte blob, used by history snapshots and the
    /// document snapshot codec's text section.
    #[must_use]
    pub fn export_entity(&self, id: EntityId) -> Option<Vec<u8>> {
        let record = self.records.get(&id.get())?;
        let mut out = Vec::new();
        out.extend_from_slice(&record.position.x().to_le_bytes());
        out.extend_from_slice(&record.position.y().to_le_bytes());
        out.extend_from_slice(&record.rotation.to_le_bytes());
        out.push(match record.box_mode {
            BoxMode::AutoWidth => 0,
            BoxMode::FixedWidth => 1,
        });
        out.push(match record.alignment {
            TextAlign::Start => 0,
            TextAlign::Center => 1,
            TextAlign::End => 2,
        });
        out.extend_from_slice(&record.constraint_width.to_le_bytes());

        let content_bytes = record.content.bytes();
        out.extend_from_slice(&(content_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(content_bytes);

        let runs = record.content.runs();
        out.extend_from_slice(&(runs.len() as u32).to_le_bytes());
        for run in runs {
            out.extend_from_slice(&run.start_byte.to_le_bytes());
            out.extend_from_slice(&run.length.to_le_bytes());
            out.extend_from_slice(&run.font_id.to_le_bytes());
            out.extend_from_slice(&run.font_size.to_le_bytes());
            out.extend_from_slice(&run.color.r.to_le_bytes());
            out.extend_from_slice(&run.color.g.to_le_bytes());
            out.extend_from_slice(&run.color.b.to_le_bytes());
            out.extend_from_slice(&run.color.a.to_le_bytes());
            out.push(run.flags.0);
        }

        match record.caret {
            Some(caret) => {
                out.push(1);
                out.extend_from_slice(&caret.caret.to_le_bytes());
                match caret.anchor {
                    Some(a) => {
                        out.push(1);
                        out.extend_from_slice(&a.to_le_bytes());
                    }
                    None => out.push(0),
                }
            }
            None => out.push(0),
        }
        Some(out)
    }

    /// Restores a record previously produced by [`Self::export_entity`].
    pub fn import_entity(&mut self, id: EntityId, bytes: &[u8]) {
        let mut cursor = Cursor(bytes);
        let x = cursor.f32();
        let y = cursor.f32();
        let rotation = cursor.f32();
        let box_mode = if cursor.u8() == 0 {
            BoxMode::AutoWidth
        } else {
            BoxMode::FixedWidth
        };
        let alignment = match cursor.u8() {
            1 => TextAlign::Center,
            2 => TextAlign::End,
            _ => TextAlign::Start,
        };
        let constraint_width = cursor.f32();

        let content_len = cursor.u32() as usize;
        let content_bytes = cursor.bytes(content_len).to_vec();

        let run_count = cursor.u32() as usize;
        let mut runs = Vec::with_capacity(run_count);
        for _ in 0..run_count {
            let start_byte = cursor.u32();
            let length = cursor.u32();
            let font_id = cursor.u32();
            let font_size = cursor.f32();
            let r = cursor.f32();
            let g = cursor.f32();
            let b = cursor.f32();
            let a = cursor.f32();
            let flags = RunFlags(cursor.u8());
            runs.push(StyleRun {
                start_byte,
                length,
                font_id,
                font_size,
                color: crate::record::Rgba::new(r, g, b, a),
                flags,
            });
        }

        let caret = if cursor.u8() == 1 {
            let caret_pos = cursor.u32();
            let anchor = if cursor.u8() == 1 {
                Some(cursor.u32())
            } else {
                None
            };
            Some(CaretState {
                caret: caret_pos,
                anchor,
            })
        } else {
            None
        };

        let mut record = TextRecord::new();
        record.position = Vec2::new(x, y);
        record.rotation = rotation;
        record.box_mode = box_mode;
        record.alignment = alignment;
        record.constraint_width = constraint_width;
        record.content.set(content_bytes, runs);
        record.caret = caret;
        self.records.insert(id.get(), record);
    }
}

struct Cursor<'a>(&'a [u8]);

impl<'a> Cursor<'a> {
    fn bytes(&mut self, n: usize) -> &'a [u8] {
        let (head, tail) = self.0.split_at(n);
        self.0 = tail;
        head
    }

    fn u8(&mut self) -> u8 {
        self.bytes(1)[0]
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.bytes(4).try_into().unwrap())
    }

    fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.bytes(4).try_into().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_import_round_trips() {
        let mut store = TextStore::new();
        let id = EntityId::new(1).unwrap();
        store.upsert(
            id,
            Vec2::new(1.0, 2.0),
            0.5,
            BoxMode::FixedWidth,
            TextAlign::Center,
            100.0,
            b"hello".to_vec(),
            vec![StyleRun {
                start_byte: 0,
                length: 5,
                font_id: 0,
                font_size: 16.0,
                color: crate::record::Rgba::new(1.0, 1.0, 1.0, 1.0),
                flags: RunFlags::default(),
            }],
        );
        store.set_caret(id, 3);

        let bytes = store.export_entity(id).unwrap();
        let mut restored = TextStore::new();
        restored.import_entity(id, &bytes);

        let original = store.get(id).unwrap();
        let back = restored.get(id).unwrap();
        assert_eq!(original.position, back.position);
        assert_eq!(original.content.bytes(), back.content.bytes());
        assert_eq!(original.caret, back.caret);
    }

    #[test]
    fn layout_recomputes_only_when_dirty() {
        let mut store = TextStore::new();
        let id = EntityId::new(1).unwrap();
        store.upsert(
            id,
            Vec2::ZERO,
            0.0,
            BoxMode::AutoWidth,
            TextAlign::Start,
            0.0,
            b"hi".to_vec(),
            vec![StyleRun {
                start_byte: 0,
                length: 2,
                font_id: 0,
                font_size: 16.0,
                color: crate::record::Rgba::new(0.0, 0.0, 0.0, 1.0),
                flags: RunFlags::default(),
            }],
        );
        let first = store.layout(id).cloned();
        assert!(first.is_some());
        assert!(!store.records.get(&id.get()).unwrap().layout_dirty);
    }
}
