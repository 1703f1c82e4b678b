//! Document snapshot codec.
//!
//! A self-describing byte block: a fixed header, a fixed-size directory
//! of `(offset, len)` sections, then the sections themselves. Every
//! geometry section is a dense array of fixed-width `Pod` rows in draw
//! order; text content, point-pool coordinates, and layer names live in
//! trailing blob/array sections referenced by offset and length so the
//! fixed-width rows never grow.
//!
//! `parse(build(state)) == state` and `build(parse(bytes)) == bytes` for
//! any well-formed snapshot: every field the engine tracks round-trips,
//! and the section layout is written in a single deterministic order so
//! re-encoding produces byte-identical output.

use crate::constants::{SNAPSHOT_MAGIC, SNAPSHOT_VERSION};
use crate::entity_store::EntityStore;
use crate::error::SnapshotError;
use crate::ident::EntityId;
use crate::layer::{Layer, LayerStore, LayerStyle, StyleSlot, StyleTarget};
use crate::record::{
    CircleRow, EntityFlags, EntityHeader, EntityHeaderRow, LineRow, PolylineRow, RectRow, Rgba,
};
use crate::text::TextStore;
use bytemuck::{Pod, Zeroable};
use docengine_geom::Vec2;

const SECTION_COUNT: usize = 13;

#[repr(u32)]
#[derive(Debug, Copy, Clone)]
enum Section {
    Layers = 0,
    LayerNames = 1,
    Rects = 2,
    Lines = 3,
    Arrows = 4,
    Polylines = 5,
    Circles = 6,
    Polygons = 7,
    StyleOverrides = 8,
    PointPool = 9,
    TextEntries = 10,
    TextBlob = 11,
    DrawOrderAndSelection = 12,
}

const SECTION_NAMES: [&str; SECTION_COUNT] = [
    "layers",
    "layer_names",
    "rects",
    "lines",
    "arrows",
    "polylines",
    "circles",
    "polygons",
    "style_overrides",
    "point_pool",
    "text_entries",
    "text_blob",
    "draw_order_and_selection",
];

/// One `(offset, len)` entry in the section directory.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Pod, Zeroable, Default)]
#[repr(C)]
struct SectionRange {
    offset_le: u64,
    len_le: u64,
}

impl SectionRange {
    fn new(offset: usize, len: usize) -> Self {
        Self {
            offset_le: (offset as u64).to_le(),
            len_le: (len as u64).to_le(),
        }
    }

    fn offset(self) -> u64 {
        u64::from_le(self.offset_le)
    }

    fn len(self) -> u64 {
        u64::from_le(self.len_le)
    }
}

/// Fixed snapshot header, immediately followed by a `SECTION_COUNT`-entry
/// [`SectionRange`] directory.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
struct SnapshotHeader {
    magic: [u8; 8],
    version: u32,
    entity_count: u32,
    next_id: u32,
    generation: u32,
    section_count: u32,
    reserved: u32,
}

const _: () = assert!(size_of::<SnapshotHeader>() == 32);
const DIRECTORY_BYTES: usize = SECTION_COUNT * size_of::<SectionRange>();

macro_rules! geometry_row {
    ($name:ident, $inner:ty) => {
        #[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
        #[repr(C)]
        struct $name {
            id: u32,
            header: EntityHeaderRow,
            row: $inner,
        }
    };
}

geometry_row!(RectSnapshotRow, RectRow);
geometry_row!(LineSnapshotRow, LineRow);
geometry_row!(PolylineSnapshotRow, PolylineRow);
geometry_row!(CircleSnapshotRow, CircleRow);

#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct LayerRow {
    id: u32,
    order_index: u32,
    flags: u32,
    name_offset: u32,
    name_len: u32,
    stroke: Rgba,
    stroke_enabled: u32,
    fill: Rgba,
    fill_enabled: u32,
    text_color: Rgba,
    text_color_enabled: u32,
    text_background: Rgba,
    text_background_enabled: u32,
}

const _: () = assert!(size_of::<LayerRow>() == 100);

#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct StyleOverrideRow {
    entity_id: u32,
    target: u32,
    color: Rgba,
    enabled: u32,
    _pad: u32,
}

const _: () = assert!(size_of::<StyleOverrideRow>() == 32);

#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct PointRow {
    x: f32,
    y: f32,
}

const _: () = assert!(size_of::<PointRow>() == 8);

#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct TextIndexRow {
    id: u32,
    layer_id: u32,
    flags: u32,
    blob_offset: u32,
    blob_len: u32,
    _pad: u32,
}

const _: () = assert!(size_of::<TextIndexRow>() == 24);

fn style_target_tag(target: StyleTarget) -> u32 {
    target as u32
}

fn style_target_from_tag(tag: u32) -> Option<StyleTarget> {
    match tag {
        0 => Some(StyleTarget::Stroke),
        1 => Some(StyleTarget::Fill),
        2 => Some(StyleTarget::TextColor),
        3 => Some(StyleTarget::TextBackground),
        _ => None,
    }
}

fn pad_to_align(buf: &mut Vec<u8>) {
    while buf.len() % 8 != 0 {
        buf.push(0);
    }
}

fn push_section<T: Pod>(buf: &mut Vec<u8>, rows: &[T]) -> SectionRange {
    pad_to_align(buf);
    let offset = buf.len();
    buf.extend_from_slice(bytemuck::cast_slice(rows));
    SectionRange::new(offset, buf.len() - offset)
}

fn push_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> SectionRange {
    pad_to_align(buf);
    let offset = buf.len();
    buf.extend_from_slice(bytes);
    SectionRange::new(offset, buf.len() - offset)
}

/// Serializes the full document into a self-contained byte block.
#[must_use]
pub fn build(store: &EntityStore, layers: &LayerStore, text: &TextStore, generation: u32) -> Vec<u8> {
    // Layer rows + concatenated name bytes.
    let mut layer_rows = Vec::new();
    let mut name_bytes = Vec::new();
    for layer in layers.by_id() {
        let name_offset = name_bytes.len() as u32;
        name_bytes.extend_from_slice(layer.name.as_bytes());
        let style = layer.style;
        layer_rows.push(LayerRow {
            id: layer.id,
            order_index: layer.order_index,
            flags: u32::from(layer.flags.0),
            name_offset,
            name_len: layer.name.len() as u32,
            stroke: style.stroke.color,
            stroke_enabled: u32::from(style.stroke.enabled),
            fill: style.fill.color,
            fill_enabled: u32::from(style.fill.enabled),
            text_color: style.text_color.color,
            text_color_enabled: u32::from(style.text_color.enabled),
            text_background: style.text_background.color,
            text_background_enabled: u32::from(style.text_background.enabled),
        });
    }

    let draw_order = store.draw_order();
    let rect_rows: Vec<RectSnapshotRow> = draw_order
        .iter()
        .filter_map(|&id| {
            let row = store.get_rect(id)?;
            Some(RectSnapshotRow {
                id: id.get(),
                header: store.header(id)?.into(),
                row: *row,
            })
        })
        .collect();
    let line_rows: Vec<LineSnapshotRow> = draw_order
        .iter()
        .filter_map(|&id| {
            let row = store.get_line(id)?;
            Some(LineSnapshotRow {
                id: id.get(),
                header: store.header(id)?.into(),
                row: *row,
            })
        })
        .collect();
    let arrow_rows: Vec<LineSnapshotRow> = draw_order
        .iter()
        .filter_map(|&id| {
            let row = store.get_arrow(id)?;
            Some(LineSnapshotRow {
                id: id.get(),
                header: store.header(id)?.into(),
                row: *row,
            })
        })
        .collect();
    let polyline_rows: Vec<PolylineSnapshotRow> = draw_order
        .iter()
        .filter_map(|&id| {
            let row = store.get_polyline(id)?;
            Some(PolylineSnapshotRow {
                id: id.get(),
                header: store.header(id)?.into(),
                row: *row,
            })
        })
        .collect();
    let circle_rows: Vec<CircleSnapshotRow> = draw_order
        .iter()
        .filter_map(|&id| {
            let row = store.get_circle(id)?;
            Some(CircleSnapshotRow {
                id: id.get(),
                header: store.header(id)?.into(),
                row: *row,
            })
        })
        .collect();
    let polygon_rows: Vec<CircleSnapshotRow> = draw_order
        .iter()
        .filter_map(|&id| {
            let row = store.get_polygon(id)?;
            Some(CircleSnapshotRow {
                id: id.get(),
                header: store.header(id)?.into(),
                row: *row,
            })
        })
        .collect();

    let override_rows: Vec<StyleOverrideRow> = layers
        .overrides_sorted()
        .into_iter()
        .map(|(entity_id, target, slot)| StyleOverrideRow {
            entity_id,
            target: style_target_tag(target),
            color: slot.color,
            enabled: u32::from(slot.enabled),
            _pad: 0,
        })
        .collect();

    let point_rows: Vec<PointRow> = store
        .point_pool()
        .iter()
        .map(|p| PointRow { x: p.x(), y: p.y() })
        .collect();

    let mut text_index = Vec::new();
    let mut text_blob = Vec::new();
    for &id in draw_order {
        if !text.is_live(id) {
            continue;
        }
        let Some(header) = store.header(id) else {
            continue;
        };
        let Some(bytes) = text.export_entity(id) else {
            continue;
        };
        let blob_offset = text_blob.len() as u32;
        text_blob.extend_from_slice(&bytes);
        text_index.push(TextIndexRow {
            id: id.get(),
            layer_id: header.layer_id,
            flags: u32::from(header.flags.0),
            blob_offset,
            blob_len: bytes.len() as u32,
            _pad: 0,
        });
    }

    let draw_order_ids: Vec<u32> = draw_order.iter().map(EntityId::get).collect();
    let selection_ids: Vec<u32> = store.selection().iter().map(EntityId::get).collect();
    let mut order_and_selection = Vec::new();
    order_and_selection.extend_from_slice(&(draw_order_ids.len() as u32).to_le_bytes());
    for id in &draw_order_ids {
        order_and_selection.extend_from_slice(&id.to_le_bytes());
    }
    order_and_selection.extend_from_slice(&(selection_ids.len() as u32).to_le_bytes());
    for id in &selection_ids {
        order_and_selection.extend_from_slice(&id.to_le_bytes());
    }

    let mut body = Vec::new();
    let mut ranges = [SectionRange::default(); SECTION_COUNT];
    ranges[Section::Layers as usize] = push_section(&mut body, &layer_rows);
    ranges[Section::LayerNames as usize] = push_bytes(&mut body, &name_bytes);
    ranges[Section::Rects as usize] = push_section(&mut body, &rect_rows);
    ranges[Section::Lines as usize] = push_section(&mut body, &line_rows);
    ranges[Section::Arrows as usize] = push_section(&mut body, &arrow_rows);
    ranges[Section::Polylines as usize] = push_section(&mut body, &polyline_rows);
    ranges[Section::Circles as usize] = push_section(&mut body, &circle_rows);
    ranges[Section::Polygons as usize] = push_section(&mut body, &polygon_rows);
    ranges[Section::StyleOverrides as usize] = push_section(&mut body, &override_rows);
    ranges[Section::PointPool as usize] = push_section(&mut body, &point_rows);
    ranges[Section::TextEntries as usize] = push_section(&mut body, &text_index);
    ranges[Section::TextBlob as usize] = push_bytes(&mut body, &text_blob);
    ranges[Section::DrawOrderAndSelection as usize] = push_bytes(&mut body, &order_and_selection);

    let header = SnapshotHeader {
        magic: SNAPSHOT_MAGIC,
        version: SNAPSHOT_VERSION,
        entity_count: store.len() as u32,
        next_id: store.next_id_hint(),
        generation,
        section_count: SECTION_COUNT as u32,
        reserved: 0,
    };

    let mut out = Vec::with_capacity(size_of::<SnapshotHeader>() + DIRECTORY_BYTES + body.len());
    out.extend_from_slice(bytemuck::bytes_of(&header));
    out.extend_from_slice(bytemuck::cast_slice(&ranges));
    out.extend_from_slice(&body);
    out
}

/// Everything reconstructed from a parsed snapshot.
pub struct LoadedSnapshot {
    pub store: EntityStore,
    pub layers: LayerStore,
    pub text: TextStore,
    pub generation: u32,
}

fn section_slice<'a>(
    bytes: &'a [u8],
    range: SectionRange,
    name: &'static str,
) -> Result<&'a [u8], SnapshotError> {
    let offset = range.offset() as usize;
    let len = range.len() as usize;
    let end = offset.checked_add(len).ok_or(SnapshotError::Truncated {
        section: name,
        needed: usize::MAX,
        available: bytes.len(),
    })?;
    if end > bytes.len() {
        return Err(SnapshotError::Truncated {
            section: name,
            needed: end,
            available: bytes.len(),
        });
    }
    Ok(&bytes[offset..end])
}

fn cast_section<'a, T: Pod>(
    bytes: &'a [u8],
    range: SectionRange,
    name: &'static str,
) -> Result<&'a [T], SnapshotError> {
    let slice = section_slice(bytes, range, name)?;
    bytemuck::try_cast_slice(slice).map_err(|_| SnapshotError::Truncated {
        section: name,
        needed: slice.len(),
        available: slice.len(),
    })
}

/// Parses a snapshot byte block back into live document state.
pub fn parse(bytes: &[u8]) -> Result<LoadedSnapshot, SnapshotError> {
    let header_len = size_of::<SnapshotHeader>();
    if bytes.len() < header_len {
        return Err(SnapshotError::Truncated {
            section: "header",
            needed: header_len,
            available: bytes.len(),
        });
    }
    let header: SnapshotHeader = *bytemuck::from_bytes(&bytes[..header_len]);
    if header.magic != SNAPSHOT_MAGIC {
        return Err(SnapshotError::InvalidHeader {
            expected_magic: SNAPSHOT_MAGIC,
            found_magic: header.magic,
            expected_version: SNAPSHOT_VERSION,
            found_version: header.version,
        });
    }
    if header.version != SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion {
            version: header.version,
        });
    }

    let directory_end = header_len + DIRECTORY_BYTES;
    if bytes.len() < directory_end {
        return Err(SnapshotError::Truncated {
            section: "directory",
            needed: directory_end,
            available: bytes.len(),
        });
    }
    let ranges: &[SectionRange] =
        bytemuck::cast_slice(&bytes[header_len..directory_end]);

    let mut store = EntityStore::new();
    let mut layers = LayerStore::default();
    let mut text = TextStore::new();

    let layer_rows: &[LayerRow] =
        cast_section(bytes, ranges[Section::Layers as usize], SECTION_NAMES[Section::Layers as usize])?;
    let name_bytes = section_slice(
        bytes,
        ranges[Section::LayerNames as usize],
        SECTION_NAMES[Section::LayerNames as usize],
    )?;
    for row in layer_rows {
        let start = row.name_offset as usize;
        let end = start + row.name_len as usize;
        if end > name_bytes.len() {
            return Err(SnapshotError::Truncated {
                section: "layer_names",
                needed: end,
                available: name_bytes.len(),
            });
        }
        let name = String::from_utf8_lossy(&name_bytes[start..end]).into_owned();
        let mut style = LayerStyle::default();
        style.stroke = StyleSlot {
            color: row.stroke,
            enabled: row.stroke_enabled != 0,
        };
        style.fill = StyleSlot {
            color: row.fill,
            enabled: row.fill_enabled != 0,
        };
        style.text_color = StyleSlot {
            color: row.text_color,
            enabled: row.text_color_enabled != 0,
        };
        style.text_background = StyleSlot {
            color: row.text_background,
            enabled: row.text_background_enabled != 0,
        };
        layers.insert(Layer {
            id: row.id,
            name,
            flags: EntityFlags(row.flags as u8),
            order_index: row.order_index,
            style,
        });
    }

    macro_rules! load_geometry {
        ($section:expr, $row_ty:ty, $upsert:ident) => {{
            let rows: &[$row_ty] = cast_section(bytes, ranges[$section as usize], SECTION_NAMES[$section as usize])?;
            for row in rows {
                let Some(id) = EntityId::new(row.id) else {
                    continue;
                };
                store.observe_id(id);
                let header: EntityHeader = row.header.into();
                store.$upsert(id, row.row, header);
            }
        }};
    }
    load_geometry!(Section::Rects, RectSnapshotRow, upsert_rect);
    load_geometry!(Section::Lines, LineSnapshotRow, upsert_line);
    load_geometry!(Section::Arrows, LineSnapshotRow, upsert_arrow);
    load_geometry!(Section::Circles, CircleSnapshotRow, upsert_circle);
    load_geometry!(Section::Polygons, CircleSnapshotRow, upsert_polygon);

    let point_rows: &[PointRow] = cast_section(
        bytes,
        ranges[Section::PointPool as usize],
        SECTION_NAMES[Section::PointPool as usize],
    )?;
    let points: Vec<Vec2> = point_rows.iter().map(|p| Vec2::new(p.x, p.y)).collect();

    let polyline_rows: &[PolylineSnapshotRow] = cast_section(
        bytes,
        ranges[Section::Polylines as usize],
        SECTION_NAMES[Section::Polylines as usize],
    )?;
    for row in polyline_rows {
        let Some(id) = EntityId::new(row.id) else {
            continue;
        };
        let start = row.row.offset as usize;
        let end = start + row.row.count as usize;
        if end > points.len() {
            return Err(SnapshotError::PointPoolOutOfRange {
                entity_id: row.id,
                offset: row.row.offset,
                offset_plus_count: end as u32,
                pool_len: points.len() as u32,
            });
        }
        store.observe_id(id);
        let (offset, count) = store.push_points(&points[start..end]);
        let mut geometry_row = row.row;
        geometry_row.offset = offset;
        geometry_row.count = count;
        store.upsert_polyline(id, geometry_row, row.header.into());
    }

    let override_rows: &[StyleOverrideRow] = cast_section(
        bytes,
        ranges[Section::StyleOverrides as usize],
        SECTION_NAMES[Section::StyleOverrides as usize],
    )?;
    for row in override_rows {
        let Some(target) = style_target_from_tag(row.target) else {
            continue;
        };
        layers.set_override(
            row.entity_id,
            target,
            StyleSlot {
                color: row.color,
                enabled: row.enabled != 0,
            },
        );
    }

    let text_index: &[TextIndexRow] = cast_section(
        bytes,
        ranges[Section::TextEntries as usize],
        SECTION_NAMES[Section::TextEntries as usize],
    )?;
    let text_blob = section_slice(
        bytes,
        ranges[Section::TextBlob as usize],
        SECTION_NAMES[Section::TextBlob as usize],
    )?;
    for row in text_index {
        let Some(id) = EntityId::new(row.id) else {
            continue;
        };
        let start = row.blob_offset as usize;
        let end = start + row.blob_len as usize;
        if end > text_blob.len() {
            return Err(SnapshotError::Truncated {
                section: "text_blob",
                needed: end,
                available: text_blob.len(),
            });
        }
        store.observe_id(id);
        text.import_entity(id, &text_blob[start..end]);
        store.register_text(
            id,
            EntityHeader {
                layer_id: row.layer_id,
                flags: EntityFlags(row.flags as u8),
            },
        );
    }

    let order_bytes = section_slice(
        bytes,
        ranges[Section::DrawOrderAndSelection as usize],
        SECTION_NAMES[Section::DrawOrderAndSelection as usize],
    )?;
    let mut cursor = 0usize;
    let read_u32 = |bytes: &[u8], cursor: &mut usize| -> Result<u32, SnapshotError> {
        let end = *cursor + 4;
        if end > bytes.len() {
            return Err(SnapshotError::Truncated {
                section: "draw_order_and_selection",
                needed: end,
                available: bytes.len(),
            });
        }
        let v = u32::from_le_bytes(bytes[*cursor..end].try_into().unwrap());
        *cursor = end;
        Ok(v)
    };

    let draw_order_len = read_u32(order_bytes, &mut cursor)? as usize;
    let mut draw_order_ids = Vec::with_capacity(draw_order_len);
    for _ in 0..draw_order_len {
        let id = read_u32(order_bytes, &mut cursor)?;
        if let Some(id) = EntityId::new(id) {
            draw_order_ids.push(id);
        }
    }
    let selection_len = read_u32(order_bytes, &mut cursor)? as usize;
    let mut selection_ids = Vec::with_capacity(selection_len);
    for _ in 0..selection_len {
        let id = read_u32(order_bytes, &mut cursor)?;
        if let Some(id) = EntityId::new(id) {
            selection_ids.push(id);
        }
    }
    store.set_draw_order(&draw_order_ids);
    store.set_selection_raw(selection_ids);

    if let Some(id) = EntityId::new(header.next_id) {
        store.observe_id(id);
    }

    Ok(LoadedSnapshot {
        store,
        layers,
        text,
        generation: header.generation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use docengine_geom::Vec2 as V2;

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

    #[test]
    fn round_trips_rect_layer_and_point_pool() {
        let mut store = EntityStore::new();
        let mut layers = LayerStore::with_default_layer();
        let text = TextStore::new();

        let id = store.allocate_id();
        store.upsert_rect(id, rect_row(4.0), EntityHeader::default());

        let poly_id = store.allocate_id();
        let (offset, count) = store.push_points(&[V2::new(0.0, 0.0), V2::new(1.0, 2.0)]);
        store.upsert_polyline(
            poly_id,
            PolylineRow {
                offset,
                count,
                stroke: Rgba::TRANSPARENT,
                stroke_enabled: 0,
                stroke_width: 0.0,
                _pad: [0; 2],
            },
            EntityHeader::default(),
        );

        layers.set_override(
            id.get(),
            StyleTarget::Fill,
            StyleSlot {
                color: Rgba::new(1.0, 0.0, 0.0, 1.0),
                enabled: true,
            },
        );

        let bytes = build(&store, &layers, &text, 7);
        let loaded = parse(&bytes).unwrap();

        assert_eq!(loaded.generation, 7);
        assert_eq!(loaded.store.get_rect(id).unwrap().x, 4.0);
        assert_eq!(
            loaded.store.polyline_points(loaded.store.get_polyline(poly_id).unwrap()),
            &[V2::new(0.0, 0.0), V2::new(1.0, 2.0)]
        );
        assert!(loaded
            .layers
            .overrides_sorted()
            .iter()
            .any(|(eid, target, slot)| *eid == id.get()
                && *target == StyleTarget::Fill
                && slot.enabled));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = build(
            &EntityStore::new(),
            &LayerStore::with_default_layer(),
            &TextStore::new(),
            0,
        );
        bytes[0] = b'X';
        let err = parse(&bytes).unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidHeader { .. }));
    }

    #[test]
    fn rejects_truncated_buffer() {
        let bytes = build(
            &EntityStore::new(),
            &LayerStore::with_default_layer(),
            &TextStore::new(),
            0,
        );
        let err = parse(&bytes[..bytes.len() - 4]).unwrap_err();
        assert!(matches!(err, SnapshotError::Truncated { .. }));
    }

    #[test]
    fn rebuild_from_parsed_state_is_byte_identical() {
        let mut store = EntityStore::new();
        let layers = LayerStore::with_default_layer();
        let text = TextStore::new();
        let id = store.allocate_id();
        store.upsert_rect(id, rect_row(1.0), EntityHeader::default());

        let first = build(&store, &layers, &text, 3);
        let loaded = parse(&first).unwrap();
        let second = build(&loaded.store, &loaded.layers, &loaded.text, loaded.generation);
        assert_eq!(first, second);
    }
}
