//! Text layout: line-breaking and glyph placement.

use docengine_geom::Vec2;

use super::atlas::GlyphAtlas;
use super::content::TextContent;

/// How a text box's width is determined.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BoxMode {
    /// Width grows to fit content; never wraps.
    AutoWidth,
    /// Width is fixed at `constraint_width`; content word-wraps.
    FixedWidth,
}

/// Horizontal alignment within the text box.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TextAlign {
    Start,
    Center,
    End,
}

/// One placed glyph.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GlyphInstance {
    pub glyph_id: u32,
    pub font_id: u32,
    pub pen_x: f32,
    pub pen_y: f32,
    pub advance: f32,
    pub w: f32,
    pub h: f32,
}

/// One laid-out line.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LineInfo {
    pub byte_start: u32,
    pub byte_end: u32,
    pub baseline_y: f32,
    pub ascent: f32,
    pub height: f32,
}

/// The derived layout for one text entity.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLayout {
    pub width: f32,
    pub height: f32,
    pub min: Vec2,
    pub max: Vec2,
    pub glyphs: Vec<GlyphInstance>,
    pub lines: Vec<LineInfo>,
}

impl TextLayout {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            width: 0.0,
            height: 0.0,
            min: Vec2::ZERO,
            max: Vec2::ZERO,
            glyphs: Vec::new(),
            lines: vec![LineInfo {
                byte_start: 0,
                byte_end: 0,
                baseline_y: 0.0,
                ascent: 0.0,
                height: 0.0,
            }],
        }
    }
}

/// Splits `content`'s bytes into line spans according to `box_mode`.
/// Explicit `\n` always breaks; `FixedWidth` additionally wraps at
/// whitespace once a line would exceed `constraint_width` given a running
/// pen advance; `AutoWidth` never wraps.
fn break_lines(
    content: &TextContent,
    atlas: &mut GlyphAtlas,
    box_mode: BoxMode,
    constraint_width: f32,
    font_id: u32,
    font_size: f32,
) -> Vec<(usize, usize)> {
    let bytes = content.bytes();
    let mut lines = Vec::new();
    let mut line_start = 0usize;
    let mut pen_x = 0.0f32;
    let mut last_space: Option<usize> = None;
    let mut i = 0usize;

    while i < bytes.len() {
        let b = bytes[i];
        if b == b'\n' {
            lines.push((line_start, i));
            line_start = i + 1;
            pen_x = 0.0;
            last_space = None;
            i += 1;
            continue;
        }

        let glyph = atlas.get_glyph(font_id, u32::from(b), font_size);
        let advance = glyph.advance;

        if box_mode == BoxMode::FixedWidth && pen_x + advance > constraint_width && i > line_start
        {
            if let Some(space) = last_space {
                lines.push((line_start, space));
                line_start = space + 1;
            } else {
                lines.push((line_start, i));
                line_start = i;
            }
            pen_x = 0.0;
            last_space = None;
            continue;
        }

        if b.is_ascii_whitespace() {
            last_space = Some(i);
        }
        pen_x += advance;
        i += 1;
    }
    lines.push((line_start, bytes.len()));
    lines
}

/// Computes the full layout for `content`, lazily packing any glyphs the
/// atlas has not seen yet.
pub fn compute_layout(
    content: &TextContent,
    atlas: &mut GlyphAtlas,
    box_mode: BoxMode,
    constraint_width: f32,
) -> TextLayout {
    let font_id = content
        .runs()
        .first()
        .map_or(0, |r| r.font_id);
    let font_size = content
        .runs()
        .first()
        .map_or(16.0, |r| r.font_size);

    if content.is_empty() {
        return TextLayout::empty();
    }

    let line_spans = break_lines(content, atlas, box_mode, constraint_width, font_id, font_size);
    let bytes = content.bytes();

    let mut glyphs = Vec::new();
    let mut lines = Vec::with_capacity(line_spans.len());
    let mut pen_y = 0.0f32;
    let mut max_width = 0.0f32;
    let line_height = font_size * 1.2;
    let ascent = font_size * 0.8;

    for (start, end) in line_spans {
        let mut pen_x = 0.0f32;
        for (offset, &b) in bytes[start..end].iter().enumerate() {
            let run = content
                .runs()
                .iter()
                .find(|r| {
                    let byte = (start + offset) as u32;
                    r.start_byte <= byte && byte < r.end_byte()
                })
                .copied();
            let (glyph_font, glyph_size) = run.map_or((font_id, font_size), |r| (r.font_id, r.font_size));
            let entry = atlas.get_glyph(glyph_font, u32::from(b), glyph_size);
            glyphs.push(GlyphInstance {
                glyph_id: u32::from(b),
                font_id: glyph_font,
                pen_x,
                pen_y: pen_y + ascent,
                advance: entry.advance,
                w: entry.atlas_wh.0,
                h: entry.atlas_wh.1,
            });
            pen_x += entry.advance;
        }
        max_width = max_width.max(pen_x);
        lines.push(LineInfo {
            byte_start: start as u32,
            byte_end: end as u32,
            baseline_y: pen_y + ascent,
            ascent,
            height: line_height,
        });
        pen_y += line_height;
    }

    let width = match box_mode {
        BoxMode::AutoWidth => max_width,
        BoxMode::FixedWidth => constraint_width,
    };

    TextLayout {
        width,
        height: pen_y,
        min: Vec2::ZERO,
        max: Vec2::new(width, pen_y),
        glyphs,
        lines,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::content::{RunFlags, StyleRun};

    fn content_with(bytes: &[u8]) -> TextContent {
        let mut c = TextContent::new();
        c.set(
            bytes.to_vec(),
            vec![StyleRun {
                start_byte: 0,
                length: bytes.len() as u32,
                font_id: 0,
                font_size: 16.0,
                color: crate::record::Rgba::new(0.0, 0.0, 0.0, 1.0),
                flags: RunFlags::default(),
            }],
        );
        c
    }

    #[test]
    fn explicit_newline_always_breaks() {
        let content = content_with(b"ab\ncd");
        let mut atlas = GlyphAtlas::new();
        let layout = compute_layout(&content, &mut atlas, BoxMode::AutoWidth, 1000.0);
        assert_eq!(layout.lines.len(), 2);
        assert_eq!(layout.lines[0].byte_end, 2);
        assert_eq!(layout.lines[1].byte_start, 3);
    }

    #[test]
    fn auto_width_never_wraps() {
        let content = content_with(b"a long line with many words in it");
        let mut atlas = GlyphAtlas::new();
        let layout = compute_layout(&content, &mut atlas, BoxMode::AutoWidth, 10.0);
        assert_eq!(layout.lines.len(), 1);
    }

    #[test]
    fn fixed_width_wraps_at_whitespace() {
        let content = content_with(b"aaaa bbbb cccc dddd");
        let mut atlas = GlyphAtlas::new();
        let layout = compute_layout(&content, &mut atlas, BoxMode::FixedWidth, 60.0);
        assert!(layout.lines.len() > 1);
    }

    #[test]
    fn empty_content_produces_single_empty_line() {
        let content = TextContent::new();
        let mut atlas = GlyphAtlas::new();
        let layout = compute_layout(&content, &mut atlas, BoxMode::AutoWidth, 100.0);
        assert_eq!(layout.lines.len(), 1);
        assert_eq!(layout.height, 0.0);
    }
}
