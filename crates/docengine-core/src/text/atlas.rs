//! Glyph atlas contract: shelf packing, dirty bit, and monotonic version.
//!
//! Font rasterization itself is an opaque external collaborator; this
//! module only tracks *where* a glyph's bitmap would live in the atlas
//! texture and how big it is, deriving placeholder metrics from the
//! font size since the actual glyph bitmaps are produced upstream.

use rustc_hash::FxHashMap;

/// Normalized UV rectangle within the atlas texture.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct UvRect {
    pub u0: f32,
    pub v0: f32,
    pub u1: f32,
    pub v1: f32,
}

/// One packed glyph's placement and shaping metrics.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GlyphEntry {
    pub uv_rect: UvRect,
    pub atlas_wh: (f32, f32),
    pub bearing: (f32, f32),
    pub advance: f32,
}

/// `(width, height, data_ptr, version)` meta exported to the renderer.
/// `data_ptr` is left as a byte length here; the FFI layer is
/// responsible for exposing the actual backing buffer pointer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AtlasMeta {
    pub width: u32,
    pub height: u32,
    pub byte_count: u32,
    pub version: u64,
}

const SHELF_PADDING: u32 = 1;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct GlyphKey {
    font_id: u32,
    glyph_id: u32,
    size_bits: u32,
}

struct Shelf {
    y: u32,
    height: u32,
    cursor_x: u32,
}

/// Shelf-packed glyph atlas with a dirty bit and monotonic version,
/// lazily packing glyphs on first request.
pub struct GlyphAtlas {
    width: u32,
    height: u32,
    shelves: Vec<Shelf>,
    entries: FxHashMap<GlyphKey, GlyphEntry>,
    dirty: bool,
    version: u64,
}

impl Default for GlyphAtlas {
    fn default() -> Self {
        Self::new()
    }
}

impl GlyphAtlas {
    #[must_use]
    pub fn new() -> Self {
        Self {
            width: 1024,
            height: 1024,
            shelves: Vec::new(),
            entries: FxHashMap::default(),
            dirty: false,
            version: 0,
        }
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Clears the dirty bit after the renderer has uploaded the current
    /// atlas contents.
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    #[must_use]
    pub fn meta(&self) -> AtlasMeta {
        AtlasMeta {
            width: self.width,
            height: self.height,
            byte_count: self.width * self.height * 4,
            version: self.version,
        }
    }

    /// Returns the packed entry for `(font_id, glyph_id)` at `font_size`,
    /// packing it into a shelf if this is the first request for that
    /// combination.
    pub fn get_glyph(&mut self, font_id: u32, glyph_id: u32, font_size: f32) -> GlyphEntry {
        let key = GlyphKey {
            font_id,
            glyph_id,
            size_bits: font_size.to_bits(),
        };
        if let Some(entry) = self.entries.get(&key) {
            return *entry;
        }

        // Placeholder metrics: glyph cell is proportional to font size.
        // Real rasterized dimensions would come from the font backend;
        // this contract only needs stable, packable extents.
        let w = (font_size * 0.6).ceil().max(1.0);
        let h = font_size.ceil().max(1.0);
        let advance = w;

        let (x, y) = self.allocate(w as u32, h as u32);
        let entry = GlyphEntry {
            uv_rect: UvRect {
                u0: x as f32 / self.width as f32,
                v0: y as f32 / self.height as f32,
                u1: (x as f32 + w) / self.width as f32,
                v1: (y as f32 + h) / self.height as f32,
            },
            atlas_wh: (w, h),
            bearing: (0.0, h),
            advance,
        };
        self.entries.insert(key, entry);
        self.dirty = true;
        self.version += 1;
        entry
    }

    fn allocate(&mut self, w: u32, h: u32) -> (u32, u32) {
        for shelf in &mut self.shelves {
            if shelf.height >= h && shelf.cursor_x + w <= self.width {
                let x = shelf.cursor_x;
                shelf.cursor_x += w + SHELF_PADDING;
                return (x, shelf.y);
            }
        }
        let y = self.shelves.last().map_or(0, |s| s.y + s.height + SHELF_PADDING);
        self.shelves.push(Shelf {
            y,
            height: h,
            cursor_x: w + SHELF_PADDING,
        });
        (0, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_request_reuses_packed_entry() {
        let mut atlas = GlyphAtlas::new();
        let a = atlas.get_glyph(0, 65, 16.0);
        let version_after_first = atlas.version();
        let b = atlas.get_glyph(0, 65, 16.0);
        assert_eq!(a, b);
        assert_eq!(atlas.version(), version_after_first);
    }

    #[test]
    fn new_glyph_marks_dirty_and_bumps_version() {
        let mut atlas = GlyphAtlas::new();
        assert!(!atlas.is_dirty());
        atlas.get_glyph(0, 65, 16.0);
        assert!(atlas.is_dirty());
        assert_eq!(atlas.version(), 1);
    }

    #[test]
    fn clear_dirty_resets_flag_without_touching_version() {
        let mut atlas = GlyphAtlas::new();
        atlas.get_glyph(0, 65, 16.0);
        atlas.clear_dirty();
        assert!(!atlas.is_dirty());
        assert_eq!(atlas.version(), 1);
    }

    #[test]
    fn distinct_glyphs_get_non_overlapping_uv_rects() {
        let mut atlas = GlyphAtlas::new();
        let a = atlas.get_glyph(0, 65, 16.0);
        let b = atlas.get_glyph(0, 66, 16.0);
        assert_ne!(a.uv_rect.u0, b.uv_rect.u0);
    }
}
