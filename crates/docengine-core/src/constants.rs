//! Wire-protocol constants shared across the command, snapshot, event, and
//! overlay codecs.

/// Magic number for command buffers.
pub const COMMAND_MAGIC: u32 = 0x4344_5745;

/// Current command buffer wire version.
pub const COMMAND_VERSION: u32 = 2;

/// Magic byte string for snapshot byte blocks.
pub const SNAPSHOT_MAGIC: [u8; 8] = *b"CADSNAP\x01";

/// Current snapshot wire version.
pub const SNAPSHOT_VERSION: u32 = 2;

/// Event stream wire version.
pub const EVENT_STREAM_VERSION: u32 = 1;

/// Overall protocol version, bumped when the command, snapshot, or event
/// schemas change in an incompatible way together.
pub const PROTOCOL_VERSION: u32 = 1;

/// Size in bytes of a command buffer header.
pub const COMMAND_HEADER_BYTES: usize = 16;

/// Size in bytes of a single command record (excluding its payload).
pub const COMMAND_RECORD_BYTES: usize = 16;

/// Size in bytes of one event ring record.
pub const EVENT_RECORD_BYTES: usize = 20;

/// Size in bytes of one overlay primitive record.
pub const OVERLAY_PRIMITIVE_BYTES: usize = 12;

/// Minimum width/height an entity's bounds are allowed to shrink to during
/// a resize, in world units.
pub const MIN_RESIZE_EXTENT: f32 = 1e-3;

/// Default entity layer id when none is specified.
pub const DEFAULT_LAYER_ID: u32 = 1;
