//! Render vertex format shared by fill and stroke buffers.

use bytemuck::{Pod, Zeroable};
use docengine_core::record::Rgba;
use docengine_geom::Vec2;

/// One interleaved render vertex: position, a reserved depth channel, and
/// straight RGBA color.
///
/// `z` is not used for true 3D — the engine is 2D throughout — but
/// carries a normalized draw-order depth (0.0 topmost, approaching 1.0
/// at the back) so a depth-tested renderer can composite without manual
/// painter's-algorithm ordering.
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Vertex {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

const _: () = assert!(size_of::<Vertex>() == 28);

impl Vertex {
    #[must_use]
    pub fn new(point: Vec2, z: f32, color: Rgba) -> Self {
        Self {
            x: point.x(),
            y: point.y(),
            z,
            r: color.r,
            g: color.g,
            b: color.b,
            a: color.a,
        }
    }
}

/// Byte-level view of a vertex list, for the `{generation, byte_count,
/// pointer}` meta every external-facing buffer exposes. `docengine-tess`
/// itself only hands back the owned `Vec<Vertex>`; constructing the raw
/// pointer is the FFI boundary's job, same split as the core crate's
/// command/snapshot/event buffers.
#[must_use]
pub fn byte_count(vertices: &[Vertex]) -> usize {
    std::mem::size_of_val(vertices)
}
