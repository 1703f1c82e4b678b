// SPDX-License-Identifier: Apache-2.0

//! 2D math primitives, AABBs, and the geometric primitives behind the
//! document engine's pick index.
//!
//! This crate is entity-agnostic: it has no notion of layers, entity
//! kinds, or the document history. `docengine-core` wires these
//! primitives to the entity store to implement the full pick/marquee
//! contract.

pub mod broad;
pub mod pick;
pub mod types;

pub use broad::{AabbIndex, BroadPhase};
pub use pick::{
    distance_point_to_segment, nearest_edge, nearest_resize_handle, nearest_vertex,
    polyline_crosses_rect, segment_intersects_rect, HandleCorner, MarqueeMode, PickMask,
    SubTarget,
};
pub use types::{Aabb, Transform2D, Vec2, EPSILON};
