// SPDX-License-Identifier: Apache-2.0

//! Tessellation and overlay buffer assembly for the document engine.
//!
//! [`Tessellator`] owns the fill/stroke vertex buffers as a
//! generation-gated lazy cache, mirroring the core crate's pick-index
//! dirty-flag discipline: callers rebuild on demand rather than on every
//! mutation, and the cache is only ever invalidated by comparing against
//! [`DocEngine::generation`].
//!
//! Overlay queries (selection outline, selection handles, snap feedback)
//! are cheap enough to assemble fresh on every call and are exposed as
//! free functions in [`overlay`] instead.

pub mod error;
pub mod fill;
pub mod flatten;
pub mod overlay;
pub mod stroke;
pub mod vertex;

use docengine_core::record::{EntityKind, Rgba};
use docengine_core::DocEngine;
use docengine_geom::Vec2;
pub use error::TessError;
pub use overlay::{selection_handles, selection_outline, snap_feedback, OverlayKind, OverlayPrimitive, OverlayStream};
pub use vertex::Vertex;

/// Default chord tolerance in device pixels, divided by view scale to
/// get the world-space tolerance curve flattening targets.
pub const DEFAULT_TOLERANCE_PX: f32 = 0.25;

/// The render-epoch fill/stroke vertex buffers, rebuilt from the live
/// document on demand.
#[derive(Debug, Clone, Default)]
pub struct RenderBuffers {
    pub generation: u32,
    pub fill: Vec<Vertex>,
    pub stroke: Vec<Vertex>,
}

impl RenderBuffers {
    #[must_use]
    pub fn fill_byte_count(&self) -> usize {
        vertex::byte_count(&self.fill)
    }

    #[must_use]
    pub fn stroke_byte_count(&self) -> usize {
        vertex::byte_count(&self.stroke)
    }
}

/// Owns the cached [`RenderBuffers`] and the generation they were last
/// built against.
#[derive(Debug, Clone, Default)]
pub struct Tessellator {
    cache: RenderBuffers,
    built: bool,
}

impl Tessellator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the fill/stroke vertex buffers for `engine`'s current
    /// state, rebuilding only if the document changed since the last
    /// call.
    pub fn ensure_fresh(&mut self, engine: &DocEngine, tolerance_px: f32) -> Result<&RenderBuffers, TessError> {
        let generation = engine.generation();
        if !self.built || self.cache.generation != generation {
            self.cache = rebuild(engine, tolerance_px)?;
            self.built = true;
        }
        Ok(&self.cache)
    }
}

/// Rebuilds the fill/stroke vertex buffers from scratch against
/// `engine`'s current draw order, independent of any cache.
pub fn rebuild(engine: &DocEngine, tolerance_px: f32) -> Result<RenderBuffers, TessError> {
    let view_scale = engine.view_scale();
    if !view_scale.is_finite() || view_scale <= 0.0 {
        return Err(TessError::InvalidViewScale { view_scale });
    }
    let tolerance = tolerance_px / view_scale;

    let store = engine.store();
    let draw_order = store.draw_order();
    let total = draw_order.len().max(1);

    let mut buffers = RenderBuffers {
        generation: engine.generation(),
        fill: Vec::new(),
        stroke: Vec::new(),
    };

    for (rank, &id) in draw_order.iter().enumerate() {
        let Some(header) = store.header(id) else {
            continue;
        };
        if !header.flags.is_visible() {
            continue;
        }
        let Some(kind) = store.kind_of(id) else {
            continue;
        };
        let z = 1.0 - (rank as f32 / total as f32);

        match kind {
            EntityKind::Rect => {
                if let Some(row) = store.get_rect(id) {
                    let corners = [
                        Vec2::new(row.x, row.y),
                        Vec2::new(row.x + row.w, row.y),
                        Vec2::new(row.x + row.w, row.y + row.h),
                        Vec2::new(row.x, row.y + row.h),
                    ];
                    push_fill(&mut buffers.fill, &corners, z, row.fill);
                    if row.stroke_enabled != 0 {
                        push_stroke(&mut buffers.stroke, &corners, true, row.stroke_width, z, row.stroke);
                    }
                }
            }
            EntityKind::Line | EntityKind::Arrow => {
                let row = if kind == EntityKind::Line {
                    store.get_line(id)
                } else {
                    store.get_arrow(id)
                };
                if let Some(row) = row {
                    let points = [Vec2::new(row.ax, row.ay), Vec2::new(row.bx, row.by)];
                    if row.stroke_enabled != 0 {
                        push_stroke(&mut buffers.stroke, &points, false, row.stroke_width, z, row.stroke);
                    }
                }
            }
            EntityKind::Polyline => {
                if let Some(row) = store.get_polyline(id) {
                    let points = store.polyline_points(row).to_vec();
                    if row.stroke_enabled != 0 {
                        push_stroke(&mut buffers.stroke, &points, false, row.stroke_width, z, row.stroke);
                    }
                }
            }
            EntityKind::Circle | EntityKind::Polygon => {
                let row = if kind == EntityKind::Circle {
                    store.get_circle(id)
                } else {
                    store.get_polygon(id)
                };
                if let Some(row) = row {
                    let sides = if kind == EntityKind::Polygon { row.sides } else { 0 };
                    let ring = flatten::flatten_ellipse(
                        Vec2::new(row.cx, row.cy),
                        row.rx * row.scale,
                        row.ry * row.scale,
                        row.rotation,
                        tolerance,
                        sides,
                    );
                    push_fill(&mut buffers.fill, &ring, z, row.fill);
                    if row.stroke_enabled != 0 {
                        push_stroke(&mut buffers.stroke, &ring, true, row.stroke_width, z, row.stroke);
                    }
                }
            }
            EntityKind::Text => {
                // Glyph rendering is driven by the text atlas directly;
                // text entities contribute no fill/stroke geometry here.
            }
        }
    }

    Ok(buffers)
}

fn push_fill(out: &mut Vec<Vertex>, ring: &[Vec2], z: f32, color: Rgba) {
    for triangle in fill::triangulate_fill(ring) {
        for point in triangle {
            out.push(Vertex::new(point, z, color));
        }
    }
}

fn push_stroke(out: &mut Vec<Vertex>, points: &[Vec2], closed: bool, width: f32, z: f32, color: Rgba) {
    for triangle in stroke::expand_stroke(points, closed, width) {
        for point in triangle {
            out.push(Vertex::new(point, z, color));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebuild_on_empty_document_yields_empty_buffers() {
        let engine = DocEngine::new();
        let buffers = rebuild(&engine, DEFAULT_TOLERANCE_PX).unwrap();
        assert!(buffers.fill.is_empty());
        assert!(buffers.stroke.is_empty());
    }

    #[test]
    fn rebuild_rejects_non_positive_view_scale() {
        use docengine_core::command::CommandOp;
        use docengine_core::constants::{COMMAND_MAGIC, COMMAND_VERSION};

        let mut buf = Vec::new();
        buf.extend_from_slice(&COMMAND_MAGIC.to_le_bytes());
        buf.extend_from_slice(&COMMAND_VERSION.to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&CommandOp::SetViewScale.tag().to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&4u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&0.0f32.to_le_bytes());

        let mut engine = DocEngine::new();
        engine.apply_commands(&buf).unwrap();
        let err = rebuild(&engine, DEFAULT_TOLERANCE_PX).unwrap_err();
        assert_eq!(err, TessError::InvalidViewScale { view_scale: 0.0 });
    }

    #[test]
    fn tessellator_cache_rebuilds_only_on_generation_change() {
        let engine = DocEngine::new();
        let mut tess = Tessellator::new();
        let first = tess.ensure_fresh(&engine, DEFAULT_TOLERANCE_PX).unwrap().generation;
        let second = tess.ensure_fresh(&engine, DEFAULT_TOLERANCE_PX).unwrap().generation;
        assert_eq!(first, second);
    }
}
