// SPDX-License-Identifier: Apache-2.0
#![deny(missing_docs)]

//! C-compatible bindings for the document engine.
//!
//! This module exposes a minimal ABI that higher-level languages (C++
//! hosts, Swift, C#, a JS native addon) can use to drive the engine
//! without knowing its internal Rust types. It follows the same opaque-
//! handle-plus-plain-data-struct shape as the rest of this workspace's
//! FFI boundaries: every entry point takes and returns `#[repr(C)]`
//! values or raw pointer/length pairs, null pointers are checked rather
//! than dereferenced, and nothing ever unwinds across the boundary.
//!
//! Every buffer a caller reads back (snapshot bytes, polled events, an
//! overlay stream, tessellated vertices) is cached on the handle itself
//! and stays valid only until the next mutating call on that same
//! handle — callers must re-fetch the meta after every call that can
//! bump `generation`, exactly as the in-process API documents.

use std::slice;

use docengine_core::digest::Digest;
use docengine_core::error::ErrorKind;
use docengine_core::events::EventRecord;
use docengine_core::ident::EntityId;
use docengine_core::protocol::{MarqueeMode as CoreMarqueeMode, ProtocolInfo, ReorderAction, SelectionModifier, SelectionMode};
use docengine_core::session::{TransformCommit, TransformMode};
use docengine_core::DocEngine;
use docengine_geom::{Aabb, PickMask, SubTarget, Vec2};
use docengine_tess::overlay::{selection_handles, selection_outline, snap_feedback, OverlayPrimitive, OverlayStream};
use docengine_tess::vertex::Vertex;
use docengine_tess::{rebuild, RenderBuffers};

/// Opaque engine handle exposed over the C ABI.
///
/// Owns the document engine plus the byte/record caches every
/// buffer-producing entry point writes into, so pointers returned to
/// the caller stay alive without per-call allocation bookkeeping on
/// their side.
pub struct DocEngineHandle {
    inner: DocEngine,
    snapshot_cache: Vec<u8>,
    event_cache: Vec<EventRecordFfi>,
    overlay_outline_cache: OverlayCache,
    overlay_handles_cache: OverlayCache,
    overlay_snap_cache: OverlayCache,
    render_cache: RenderBuffers,
    draft_points: Vec<f32>,
}

#[derive(Default)]
struct OverlayCache {
    primitives: Vec<OverlayPrimitive>,
    data: Vec<f32>,
}

impl OverlayCache {
    fn store(&mut self, stream: OverlayStream) {
        self.primitives = stream.primitives;
        self.data = stream.data;
    }
}

/// A 128-bit document digest split into two 64-bit halves for C ABI
/// friendliness.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct docengine_digest {
    /// High 64 bits of the digest.
    pub hi: u64,
    /// Low 64 bits of the digest.
    pub lo: u64,
}

impl From<Digest> for docengine_digest {
    fn from(digest: Digest) -> Self {
        Self {
            hi: (digest.0 >> 64) as u64,
            lo: digest.0 as u64,
        }
    }
}

/// Constant protocol/version/feature-flag record, mirroring
/// [`docengine_core::protocol::ProtocolInfo`] as a plain C struct.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct docengine_protocol_info {
    /// Wire protocol version.
    pub protocol_version: u32,
    /// Command buffer format version.
    pub command_version: u32,
    /// Snapshot format version.
    pub snapshot_version: u32,
    /// Event stream format version.
    pub event_stream_version: u32,
    /// FNV fold over every wire-stable numeric tag and struct size.
    pub abi_hash: u64,
    /// Bitmask of advertised feature flags.
    pub feature_flags: u32,
}

impl From<ProtocolInfo> for docengine_protocol_info {
    fn from(info: ProtocolInfo) -> Self {
        Self {
            protocol_version: info.protocol_version,
            command_version: info.command_version,
            snapshot_version: info.snapshot_version,
            event_stream_version: info.event_stream_version,
            abi_hash: info.abi_hash,
            feature_flags: info.feature_flags,
        }
    }
}

/// A byte buffer owned by the engine handle: snapshot bytes today, any
/// future raw-byte export tomorrow.
#[repr(C)]
pub struct docengine_buffer {
    /// The document generation this buffer was produced at.
    pub generation: u32,
    /// Number of bytes at `pointer`.
    pub byte_count: u32,
    /// Pointer to `byte_count` bytes, valid until the next mutating call
    /// on the handle that produced it. Null if `byte_count` is zero.
    pub pointer: *const u8,
}

/// Wire-stable 20-byte event record, `u16, u16, u32, u32, u32, u32`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct EventRecordFfi {
    /// [`docengine_core::events::EventType`] numeric tag.
    pub event_type: u16,
    /// Per-record flag bits.
    pub flags: u16,
    /// First payload word.
    pub a: u32,
    /// Second payload word.
    pub b: u32,
    /// Third payload word.
    pub c: u32,
    /// Fourth payload word.
    pub d: u32,
}

impl From<&EventRecord> for EventRecordFfi {
    fn from(record: &EventRecord) -> Self {
        Self {
            event_type: record.event_type as u16,
            flags: record.flags,
            a: record.a,
            b: record.b,
            c: record.c,
            d: record.d,
        }
    }
}

/// Event ring header: `{generation, count, pointer}`.
#[repr(C)]
pub struct docengine_event_buffer {
    /// The document generation current when this batch was polled.
    pub generation: u32,
    /// Number of [`EventRecordFfi`] values at `pointer`.
    pub count: u32,
    /// Pointer to `count` records, valid until the next mutating call.
    /// Null if `count` is zero.
    pub pointer: *const EventRecordFfi,
}

/// Overlay primitive stream header: `{primitive_count, float_count,
/// primitives_ptr, data_ptr}`.
#[repr(C)]
pub struct docengine_overlay_buffer {
    /// Number of [`OverlayPrimitive`] values at `primitives_ptr`.
    pub primitive_count: u32,
    /// Number of `f32` values at `data_ptr`.
    pub float_count: u32,
    /// Pointer to `primitive_count` primitives. Null if empty.
    pub primitives_ptr: *const OverlayPrimitive,
    /// Pointer to the shared point data the primitives index into. Null
    /// if empty.
    pub data_ptr: *const f32,
}

fn overlay_meta(cache: &OverlayCache) -> docengine_overlay_buffer {
    docengine_overlay_buffer {
        primitive_count: cache.primitives.len() as u32,
        float_count: cache.data.len() as u32,
        primitives_ptr: if cache.primitives.is_empty() {
            std::ptr::null()
        } else {
            cache.primitives.as_ptr()
        },
        data_ptr: if cache.data.is_empty() {
            std::ptr::null()
        } else {
            cache.data.as_ptr()
        },
    }
}

/// Render vertex buffer header for one of the fill/stroke streams.
#[repr(C)]
pub struct docengine_render_buffer {
    /// The document generation this buffer was rebuilt against.
    pub generation: u32,
    /// Number of fill vertices at `fill_ptr`.
    pub fill_count: u32,
    /// Number of stroke vertices at `stroke_ptr`.
    pub stroke_count: u32,
    /// Pointer to `fill_count` interleaved `{x,y,z,r,g,b,a}` vertices.
    pub fill_ptr: *const Vertex,
    /// Pointer to `stroke_count` interleaved `{x,y,z,r,g,b,a}` vertices.
    pub stroke_ptr: *const Vertex,
}

/// Result of [`docengine_commit_transform`].
#[repr(u32)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum docengine_transform_commit_kind {
    /// The gesture changed nothing.
    None = 0,
    /// Ordinary per-entity transform records were committed; read them
    /// back from the event stream via [`docengine_poll_events`].
    Entities = 1,
    /// A draft entity's accumulated waypoints are ready via
    /// [`docengine_take_draft_points`].
    Draft = 2,
}

/// Creates a new, empty document engine.
///
/// # Safety
/// The caller assumes ownership of the returned pointer and must release
/// it via [`docengine_free`] to avoid leaking memory.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_new() -> *mut DocEngineHandle {
    Box::into_raw(Box::new(DocEngineHandle {
        inner: DocEngine::new(),
        snapshot_cache: Vec::new(),
        event_cache: Vec::new(),
        overlay_outline_cache: OverlayCache::default(),
        overlay_handles_cache: OverlayCache::default(),
        overlay_snap_cache: OverlayCache::default(),
        render_cache: RenderBuffers::default(),
        draft_points: Vec::new(),
    }))
}

/// Releases the engine allocation created by [`docengine_new`].
///
/// # Safety
/// `engine` must be a pointer previously returned by [`docengine_new`]
/// that has not already been freed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_free(engine: *mut DocEngineHandle) {
    if engine.is_null() {
        return;
    }
    unsafe {
        drop(Box::from_raw(engine));
    }
}

/// Returns the constant protocol/version/feature-flag record.
///
/// # Safety
/// `engine` must be a valid pointer from [`docengine_new`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_protocol_info(engine: *const DocEngineHandle) -> docengine_protocol_info {
    match unsafe { engine.as_ref() } {
        Some(handle) => handle.inner.protocol_info().into(),
        None => ProtocolInfo::current().into(),
    }
}

/// Returns the current document generation.
///
/// # Safety
/// `engine` must be a valid pointer from [`docengine_new`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_generation(engine: *const DocEngineHandle) -> u32 {
    match unsafe { engine.as_ref() } {
        Some(handle) => handle.inner.generation(),
        None => 0,
    }
}

/// Returns the coarse [`ErrorKind`] tag of the last mutating call's
/// result, `Ok` (0) if it succeeded.
///
/// # Safety
/// `engine` must be a valid pointer from [`docengine_new`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_last_error_kind(engine: *const DocEngineHandle) -> u32 {
    match unsafe { engine.as_ref() } {
        Some(handle) => handle.inner.last_error_kind() as u32,
        None => ErrorKind::InvalidOperation as u32,
    }
}

/// Returns the current view scale.
///
/// # Safety
/// `engine` must be a valid pointer from [`docengine_new`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_view_scale(engine: *const DocEngineHandle) -> f32 {
    match unsafe { engine.as_ref() } {
        Some(handle) => handle.inner.view_scale(),
        None => 0.0,
    }
}

/// Returns the content-addressed document digest.
///
/// # Safety
/// `engine` must be a valid pointer from [`docengine_new`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_digest(engine: *const DocEngineHandle) -> docengine_digest {
    match unsafe { engine.as_ref() } {
        Some(handle) => handle.inner.digest().into(),
        None => docengine_digest { hi: 0, lo: 0 },
    }
}

/// Applies a binary command buffer atomically and returns the event
/// records it produced.
///
/// Call [`docengine_last_error_kind`] afterward to tell a no-op success
/// from a rejected buffer; on rejection the returned meta has
/// `count == 0` and the document is left unchanged.
///
/// # Safety
/// `engine` must be valid. `bytes` must point to at least `len` readable
/// bytes, or be null if `len` is zero.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_apply_commands(
    engine: *mut DocEngineHandle,
    bytes: *const u8,
    len: usize,
) -> docengine_event_buffer {
    let Some(handle) = (unsafe { engine.as_mut() }) else {
        return docengine_event_buffer { generation: 0, count: 0, pointer: std::ptr::null() };
    };
    let slice = read_slice(bytes, len);
    let _ = handle.inner.apply_commands(slice);
    refresh_event_cache(handle, usize::MAX)
}

/// Replaces the current selection.
///
/// # Safety
/// `engine` must be valid. `ids` must point to at least `len` readable
/// `u32` values, or be null if `len` is zero.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_set_selection(
    engine: *mut DocEngineHandle,
    ids: *const u32,
    len: usize,
    mode: u32,
) -> bool {
    let Some(handle) = (unsafe { engine.as_mut() }) else {
        return false;
    };
    let Some(mode) = selection_mode_from_u32(mode) else {
        return false;
    };
    let targets = entity_ids_from_raw(unsafe { read_u32_slice(ids, len) });
    handle.inner.set_selection(&targets, mode);
    true
}

/// Selects every live entity whose bounds interact with `[min, max]`
/// under the given marquee/selection modes.
///
/// # Safety
/// `engine` must be valid.
#[unsafe(no_mangle)]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn docengine_marquee_select(
    engine: *mut DocEngineHandle,
    min_x: f32,
    min_y: f32,
    max_x: f32,
    max_y: f32,
    marquee_mode: u32,
    selection_mode: u32,
) -> bool {
    let Some(handle) = (unsafe { engine.as_mut() }) else {
        return false;
    };
    let Some(selection_mode) = selection_mode_from_u32(selection_mode) else {
        return false;
    };
    let marquee_mode = if marquee_mode == 1 { CoreMarqueeMode::Crossing } else { CoreMarqueeMode::Window };
    let rect = Aabb::new(Vec2::new(min_x, min_y), Vec2::new(max_x, max_y));
    handle.inner.marquee_select(rect, marquee_mode, selection_mode);
    true
}

/// Reorders `ids` within the draw order per `action`.
///
/// # Safety
/// `engine` must be valid. `ids` must point to at least `len` readable
/// `u32` values, or be null if `len` is zero.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_reorder(engine: *mut DocEngineHandle, ids: *const u32, len: usize, action: u32) -> bool {
    let Some(handle) = (unsafe { engine.as_mut() }) else {
        return false;
    };
    let Some(action) = reorder_action_from_u32(action) else {
        return false;
    };
    let targets = entity_ids_from_raw(unsafe { read_u32_slice(ids, len) });
    handle.inner.reorder(&targets, action);
    true
}

/// Picks the topmost entity under `point`, writing its id and matched
/// sub-target out. Returns `false` (leaving the out params untouched) if
/// nothing was hit.
///
/// # Safety
/// `engine`, `out_id`, and `out_sub_target` must be valid pointers.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_pick(
    engine: *mut DocEngineHandle,
    x: f32,
    y: f32,
    tolerance: f32,
    mask: u32,
    out_id: *mut u32,
    out_sub_target: *mut u32,
) -> bool {
    let Some(handle) = (unsafe { engine.as_mut() }) else {
        return false;
    };
    if out_id.is_null() || out_sub_target.is_null() {
        return false;
    }
    let Some((id, sub_target)) = handle.inner.pick(Vec2::new(x, y), tolerance, pick_mask_from_u32(mask)) else {
        return false;
    };
    unsafe {
        *out_id = id.get();
        *out_sub_target = sub_target_to_u32(sub_target);
    }
    true
}

/// Opens a transform gesture.
///
/// `specific_id` of `0` means "no single specific target" (translated to
/// `None`).
///
/// # Safety
/// `engine` must be valid. `ids` must point to at least `ids_len`
/// readable `u32` values, or be null if `ids_len` is zero.
#[unsafe(no_mangle)]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn docengine_begin_transform(
    engine: *mut DocEngineHandle,
    ids: *const u32,
    ids_len: usize,
    mode: u32,
    specific_id: u32,
    handle_or_vertex_index: u32,
    start_x: f32,
    start_y: f32,
    view_x: f32,
    view_y: f32,
    view_scale: f32,
    view_w: f32,
    view_h: f32,
    modifiers: u32,
) -> bool {
    let Some(handle) = (unsafe { engine.as_mut() }) else {
        return false;
    };
    let Some(mode) = transform_mode_from_u32(mode) else {
        return false;
    };
    let targets = entity_ids_from_raw(unsafe { read_u32_slice(ids, ids_len) });
    handle.inner.begin_transform(
        &targets,
        mode,
        EntityId::new(specific_id),
        handle_or_vertex_index,
        Vec2::new(start_x, start_y),
        Vec2::new(view_x, view_y),
        view_scale,
        Vec2::new(view_w, view_h),
        SelectionModifier(modifiers),
    )
}

/// Advances the active transform gesture to a new cursor position.
///
/// # Safety
/// `engine` must be valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_update_transform(engine: *mut DocEngineHandle, x: f32, y: f32, modifiers: u32) -> bool {
    let Some(handle) = (unsafe { engine.as_mut() }) else {
        return false;
    };
    handle.inner.update_transform(Vec2::new(x, y), SelectionModifier(modifiers))
}

/// Appends a waypoint to the active draft-authoring gesture.
///
/// # Safety
/// `engine` must be valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_add_draft_vertex(engine: *mut DocEngineHandle, x: f32, y: f32) -> bool {
    let Some(handle) = (unsafe { engine.as_mut() }) else {
        return false;
    };
    handle.inner.add_draft_vertex(Vec2::new(x, y))
}

/// Reads the active snap candidate, if any.
///
/// # Safety
/// `engine`, `out_x`, and `out_y` must be valid pointers.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_active_snap(engine: *const DocEngineHandle, out_x: *mut f32, out_y: *mut f32) -> bool {
    let Some(handle) = (unsafe { engine.as_ref() }) else {
        return false;
    };
    if out_x.is_null() || out_y.is_null() {
        return false;
    }
    let Some(point) = handle.inner.active_snap() else {
        return false;
    };
    unsafe {
        *out_x = point.x();
        *out_y = point.y();
    }
    true
}

/// Returns `true` if a transform gesture is currently active.
///
/// # Safety
/// `engine` must be a valid pointer from [`docengine_new`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_is_transform_active(engine: *const DocEngineHandle) -> bool {
    match unsafe { engine.as_ref() } {
        Some(handle) => handle.inner.is_transform_active(),
        None => false,
    }
}

/// Finalizes the active transform gesture.
///
/// Per-entity results are read back via [`docengine_poll_events`]
/// (`EntityChanged` records); draft waypoints, which have no event-
/// stream representation, are read back via
/// [`docengine_take_draft_points`].
///
/// # Safety
/// `engine` must be valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_commit_transform(engine: *mut DocEngineHandle) -> docengine_transform_commit_kind {
    let Some(handle) = (unsafe { engine.as_mut() }) else {
        return docengine_transform_commit_kind::None;
    };
    match handle.inner.commit_transform() {
        TransformCommit::None => docengine_transform_commit_kind::None,
        TransformCommit::Entities(_) => docengine_transform_commit_kind::Entities,
        TransformCommit::Draft { points, .. } => {
            handle.draft_points.clear();
            for point in &points {
                handle.draft_points.push(point.x());
                handle.draft_points.push(point.y());
            }
            docengine_transform_commit_kind::Draft
        }
    }
}

/// Reads back the waypoints from the most recent `Draft` transform
/// commit, as flat `[x0, y0, x1, y1, ...]` pairs.
///
/// # Safety
/// `engine` must be a valid pointer from [`docengine_new`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_take_draft_points(engine: *const DocEngineHandle) -> docengine_buffer {
    let Some(handle) = (unsafe { engine.as_ref() }) else {
        return docengine_buffer { generation: 0, byte_count: 0, pointer: std::ptr::null() };
    };
    docengine_buffer {
        generation: handle.inner.generation(),
        byte_count: (handle.draft_points.len() * size_of::<f32>()) as u32,
        pointer: if handle.draft_points.is_empty() {
            std::ptr::null()
        } else {
            handle.draft_points.as_ptr().cast::<u8>()
        },
    }
}

/// Cancels the active transform gesture, restoring every target's pre-
/// gesture geometry.
///
/// # Safety
/// `engine` must be valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_cancel_transform(engine: *mut DocEngineHandle) -> bool {
    let Some(handle) = (unsafe { engine.as_mut() }) else {
        return false;
    };
    handle.inner.cancel_transform()
}

/// Returns `true` if an undo entry is available.
///
/// # Safety
/// `engine` must be a valid pointer from [`docengine_new`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_can_undo(engine: *const DocEngineHandle) -> bool {
    match unsafe { engine.as_ref() } {
        Some(handle) => handle.inner.can_undo(),
        None => false,
    }
}

/// Returns `true` if a redo entry is available.
///
/// # Safety
/// `engine` must be a valid pointer from [`docengine_new`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_can_redo(engine: *const DocEngineHandle) -> bool {
    match unsafe { engine.as_ref() } {
        Some(handle) => handle.inner.can_redo(),
        None => false,
    }
}

/// Undoes the most recent history entry.
///
/// # Safety
/// `engine` must be valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_undo(engine: *mut DocEngineHandle) -> bool {
    let Some(handle) = (unsafe { engine.as_mut() }) else {
        return false;
    };
    handle.inner.undo().is_ok()
}

/// Redoes the most recently undone history entry.
///
/// # Safety
/// `engine` must be valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_redo(engine: *mut DocEngineHandle) -> bool {
    let Some(handle) = (unsafe { engine.as_mut() }) else {
        return false;
    };
    handle.inner.redo().is_ok()
}

/// Serializes the document to a versioned snapshot byte block.
///
/// # Safety
/// `engine` must be valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_snapshot_bytes(engine: *mut DocEngineHandle) -> docengine_buffer {
    let Some(handle) = (unsafe { engine.as_mut() }) else {
        return docengine_buffer { generation: 0, byte_count: 0, pointer: std::ptr::null() };
    };
    handle.snapshot_cache = handle.inner.save_snapshot();
    docengine_buffer {
        generation: handle.inner.generation(),
        byte_count: handle.snapshot_cache.len() as u32,
        pointer: if handle.snapshot_cache.is_empty() {
            std::ptr::null()
        } else {
            handle.snapshot_cache.as_ptr()
        },
    }
}

/// Loads a document from a snapshot byte block, replacing the current
/// document only if the whole block parses successfully.
///
/// # Safety
/// `engine` must be valid. `bytes` must point to at least `len` readable
/// bytes, or be null if `len` is zero.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_load_snapshot(engine: *mut DocEngineHandle, bytes: *const u8, len: usize) -> bool {
    let Some(handle) = (unsafe { engine.as_mut() }) else {
        return false;
    };
    handle.inner.load_snapshot(read_slice(bytes, len)).is_ok()
}

/// Polls up to `max` pending event records without consuming them.
///
/// # Safety
/// `engine` must be valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_poll_events(engine: *mut DocEngineHandle, max: usize) -> docengine_event_buffer {
    let Some(handle) = (unsafe { engine.as_mut() }) else {
        return docengine_event_buffer { generation: 0, count: 0, pointer: std::ptr::null() };
    };
    refresh_event_cache(handle, max)
}

/// Drops the first `n` previously polled event records.
///
/// # Safety
/// `engine` must be valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_consume_events(engine: *mut DocEngineHandle, n: usize) {
    if let Some(handle) = unsafe { engine.as_mut() } {
        handle.inner.consume_events(n);
    }
}

/// Returns `true` if the event ring has overflowed and the consumer must
/// resync from a full snapshot.
///
/// # Safety
/// `engine` must be a valid pointer from [`docengine_new`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_is_event_stream_overflowed(engine: *const DocEngineHandle) -> bool {
    match unsafe { engine.as_ref() } {
        Some(handle) => handle.inner.is_event_stream_overflowed(),
        None => false,
    }
}

/// Acknowledges a resync at `generation`, clearing the overflow flag if
/// it matches the generation that triggered it.
///
/// # Safety
/// `engine` must be valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_ack_resync(engine: *mut DocEngineHandle, generation: u64) {
    if let Some(handle) = unsafe { engine.as_mut() } {
        handle.inner.ack_resync(generation);
    }
}

/// Builds the selection-outline overlay stream.
///
/// # Safety
/// `engine` must be valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_overlay_selection_outline(engine: *mut DocEngineHandle, tolerance: f32) -> docengine_overlay_buffer {
    let Some(handle) = (unsafe { engine.as_mut() }) else {
        return docengine_overlay_buffer { primitive_count: 0, float_count: 0, primitives_ptr: std::ptr::null(), data_ptr: std::ptr::null() };
    };
    handle.overlay_outline_cache.store(selection_outline(&handle.inner, tolerance));
    overlay_meta(&handle.overlay_outline_cache)
}

/// Builds the selection-handles overlay stream.
///
/// # Safety
/// `engine` must be valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_overlay_selection_handles(engine: *mut DocEngineHandle) -> docengine_overlay_buffer {
    let Some(handle) = (unsafe { engine.as_mut() }) else {
        return docengine_overlay_buffer { primitive_count: 0, float_count: 0, primitives_ptr: std::ptr::null(), data_ptr: std::ptr::null() };
    };
    handle.overlay_handles_cache.store(selection_handles(&handle.inner));
    overlay_meta(&handle.overlay_handles_cache)
}

/// Builds the snap-feedback overlay stream.
///
/// # Safety
/// `engine` must be valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_overlay_snap_feedback(engine: *mut DocEngineHandle) -> docengine_overlay_buffer {
    let Some(handle) = (unsafe { engine.as_mut() }) else {
        return docengine_overlay_buffer { primitive_count: 0, float_count: 0, primitives_ptr: std::ptr::null(), data_ptr: std::ptr::null() };
    };
    handle.overlay_snap_cache.store(snap_feedback(&handle.inner));
    overlay_meta(&handle.overlay_snap_cache)
}

/// Rebuilds (if the document changed since the last call) and returns
/// the fill/stroke render vertex buffers.
///
/// # Safety
/// `engine` must be valid.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn docengine_tessellate(engine: *mut DocEngineHandle, tolerance_px: f32) -> docengine_render_buffer {
    let Some(handle) = (unsafe { engine.as_mut() }) else {
        return docengine_render_buffer { generation: 0, fill_count: 0, stroke_count: 0, fill_ptr: std::ptr::null(), stroke_ptr: std::ptr::null() };
    };
    match rebuild(&handle.inner, tolerance_px) {
        Ok(buffers) => handle.render_cache = buffers,
        Err(_) => return docengine_render_buffer {
            generation: handle.render_cache.generation,
            fill_count: 0,
            stroke_count: 0,
            fill_ptr: std::ptr::null(),
            stroke_ptr: std::ptr::null(),
        },
    }
    docengine_render_buffer {
        generation: handle.render_cache.generation,
        fill_count: handle.render_cache.fill.len() as u32,
        stroke_count: handle.render_cache.stroke.len() as u32,
        fill_ptr: if handle.render_cache.fill.is_empty() { std::ptr::null() } else { handle.render_cache.fill.as_ptr() },
        stroke_ptr: if handle.render_cache.stroke.is_empty() { std::ptr::null() } else { handle.render_cache.stroke.as_ptr() },
    }
}

fn refresh_event_cache(handle: &mut DocEngineHandle, max: usize) -> docengine_event_buffer {
    handle.event_cache = handle.inner.poll_events(max).iter().map(EventRecordFfi::from).collect();
    docengine_event_buffer {
        generation: handle.inner.generation(),
        count: handle.event_cache.len() as u32,
        pointer: if handle.event_cache.is_empty() {
            std::ptr::null()
        } else {
            handle.event_cache.as_ptr()
        },
    }
}

unsafe fn read_slice<'a>(ptr: *const u8, len: usize) -> &'a [u8] {
    if ptr.is_null() || len == 0 {
        &[]
    } else {
        unsafe { slice::from_raw_parts(ptr, len) }
    }
}

unsafe fn read_u32_slice<'a>(ptr: *const u32, len: usize) -> &'a [u32] {
    if ptr.is_null() || len == 0 {
        &[]
    } else {
        unsafe { slice::from_raw_parts(ptr, len) }
    }
}

fn entity_ids_from_raw(raw: &[u32]) -> Vec<EntityId> {
    raw.iter().filter_map(|&v| EntityId::new(v)).collect()
}

fn selection_mode_from_u32(mode: u32) -> Option<SelectionMode> {
    match mode {
        0 => Some(SelectionMode::Replace),
        1 => Some(SelectionMode::Add),
        2 => Some(SelectionMode::Remove),
        3 => Some(SelectionMode::Toggle),
        _ => None,
    }
}

fn reorder_action_from_u32(action: u32) -> Option<ReorderAction> {
    match action {
        1 => Some(ReorderAction::BringToFront),
        2 => Some(ReorderAction::SendToBack),
        3 => Some(ReorderAction::BringForward),
        4 => Some(ReorderAction::SendBackward),
        _ => None,
    }
}

fn transform_mode_from_u32(mode: u32) -> Option<TransformMode> {
    match mode {
        0 => Some(TransformMode::Move),
        1 => Some(TransformMode::VertexDrag),
        2 => Some(TransformMode::EdgeDrag),
        3 => Some(TransformMode::Resize),
        4 => Some(TransformMode::Rotate),
        5 => Some(TransformMode::Draft),
        _ => None,
    }
}

fn pick_mask_from_u32(mask: u32) -> PickMask {
    let mut out = PickMask::BODY;
    let mut first = true;
    for (bit, target) in [
        (1u32 << 0, PickMask::BODY),
        (1u32 << 1, PickMask::VERTEX_HANDLE),
        (1u32 << 2, PickMask::EDGE_HANDLE),
        (1u32 << 3, PickMask::RESIZE_HANDLE),
    ] {
        if mask & bit != 0 {
            out = if first { target } else { out.union(target) };
            first = false;
        }
    }
    if first {
        PickMask::ALL
    } else {
        out
    }
}

fn sub_target_to_u32(target: SubTarget) -> u32 {
    match target {
        SubTarget::Body => 0,
        SubTarget::VertexHandle => 1,
        SubTarget::EdgeHandle => 2,
        SubTarget::ResizeHandle => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_create_and_free_does_not_crash() {
        unsafe {
            let engine = docengine_new();
            assert!(!engine.is_null());
            assert_eq!(docengine_generation(engine), 0);
            docengine_free(engine);
        }
    }

    #[test]
    fn null_engine_pointers_return_sentinel_values() {
        unsafe {
            assert_eq!(docengine_generation(std::ptr::null()), 0);
            assert!(!docengine_can_undo(std::ptr::null()));
            assert!(!docengine_is_transform_active(std::ptr::null()));
            assert_eq!(docengine_last_error_kind(std::ptr::null()), ErrorKind::InvalidOperation as u32);
        }
    }

    #[test]
    fn apply_commands_rejects_bad_header_without_panicking() {
        unsafe {
            let engine = docengine_new();
            let bogus = [0u8; 4];
            let meta = docengine_apply_commands(engine, bogus.as_ptr(), bogus.len());
            assert_eq!(meta.count, 0);
            assert_ne!(docengine_last_error_kind(engine), ErrorKind::Ok as u32);
            docengine_free(engine);
        }
    }

    #[test]
    fn snapshot_round_trip_preserves_generation_digest() {
        unsafe {
            let engine = docengine_new();
            let digest_before = docengine_digest(engine);
            let meta = docengine_snapshot_bytes(engine);
            assert!(!meta.pointer.is_null() || meta.byte_count == 0);
            let bytes = slice::from_raw_parts(meta.pointer, meta.byte_count as usize).to_vec();
            assert!(docengine_load_snapshot(engine, bytes.as_ptr(), bytes.len()));
            let digest_after = docengine_digest(engine);
            assert_eq!(digest_before.hi, digest_after.hi);
            assert_eq!(digest_before.lo, digest_after.lo);
            docengine_free(engine);
        }
    }

    #[test]
    fn overlay_queries_on_empty_document_yield_empty_streams() {
        unsafe {
            let engine = docengine_new();
            let outline = docengine_overlay_selection_outline(engine, 0.25);
            assert_eq!(outline.primitive_count, 0);
            let handles = docengine_overlay_selection_handles(engine);
            assert_eq!(handles.primitive_count, 0);
            let snap = docengine_overlay_snap_feedback(engine);
            assert_eq!(snap.primitive_count, 0);
            docengine_free(engine);
        }
    }

    #[test]
    fn tessellate_on_empty_document_yields_empty_buffers() {
        unsafe {
            let engine = docengine_new();
            let buffers = docengine_tessellate(engine, 0.25);
            assert_eq!(buffers.fill_count, 0);
            assert_eq!(buffers.stroke_count, 0);
            docengine_free(engine);
        }
    }

    #[test]
    fn protocol_info_is_stable_across_calls() {
        unsafe {
            let engine = docengine_new();
            let a = docengine_protocol_info(engine);
            let b = docengine_protocol_info(engine);
            assert_eq!(a.abi_hash, b.abi_hash);
            docengine_free(engine);
        }
    }

    #[test]
    fn pick_mask_all_bits_set_matches_all_constant() {
        assert_eq!(pick_mask_from_u32(0b1111), PickMask::ALL);
    }
}
