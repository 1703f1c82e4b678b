//! Error taxonomy.
//!
//! Protocol errors fail an entire command buffer or snapshot load
//! atomically; semantic no-ops (deleting a missing id, re-upserting an
//! identical record) are not errors at all and simply produce no events.

use thiserror::Error;

/// The coarse error kind surfaced to external consumers via `last_error`.
///
/// Mirrors the wire-stable enum from the protocol contract: consumers on
/// the other side of the FFI boundary match on this tag rather than a
/// formatted message.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorKind {
    /// No error; the previous call succeeded.
    Ok = 0,
    /// Command or snapshot header magic/version did not match.
    InvalidHeader = 1,
    /// A declared payload length did not match the op's expected size.
    InvalidPayloadSize = 2,
    /// An op code the dispatcher does not recognize.
    UnknownCommand = 3,
    /// The operation is not valid given current state (e.g. transform
    /// commit with no active session).
    InvalidOperation = 4,
    /// An internal allocation or pool limit was exceeded.
    OutOfMemory = 5,
}

/// Errors raised while applying a command buffer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    /// Buffer shorter than a header, or header magic/version mismatch.
    #[error("invalid command header: expected magic {expected_magic:#010x} version {expected_version}, found magic {found_magic:#010x} version {found_version}")]
    InvalidHeader {
        expected_magic: u32,
        found_magic: u32,
        expected_version: u32,
        found_version: u32,
    },

    /// Buffer too short to contain the declared record/payload bytes.
    #[error("command buffer truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    /// An op code outside the recognized set.
    #[error("unknown command op {op} at record {record_index}")]
    UnknownCommand { record_index: usize, op: u32 },

    /// Declared payload size did not match what the op expects.
    #[error("invalid payload size for op {op} at record {record_index}: expected {expected}, got {actual}")]
    InvalidPayloadSize {
        record_index: usize,
        op: u32,
        expected: usize,
        actual: usize,
    },

    /// A fatal invariant violation (e.g. point pool overrun) that leaves
    /// the store unchanged and aborts the buffer.
    #[error("invariant violated applying record {record_index}: {detail}")]
    InvariantViolated {
        record_index: usize,
        detail: &'static str,
    },
}

impl CommandError {
    /// Maps this error to its wire-stable coarse kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidHeader { .. } | Self::Truncated { .. } => ErrorKind::InvalidHeader,
            Self::UnknownCommand { .. } => ErrorKind::UnknownCommand,
            Self::InvalidPayloadSize { .. } => ErrorKind::InvalidPayloadSize,
            Self::InvariantViolated { .. } => ErrorKind::InvalidOperation,
        }
    }
}

/// Errors raised while parsing a snapshot byte block.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("invalid snapshot header: expected magic {expected_magic:?} version {expected_version}, found magic {found_magic:?} version {found_version}")]
    InvalidHeader {
        expected_magic: [u8; 8],
        found_magic: [u8; 8],
        expected_version: u32,
        found_version: u32,
    },

    #[error("snapshot truncated in section {section}: need {needed} bytes, have {available}")]
    Truncated {
        section: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("unsupported snapshot version {version}")]
    UnsupportedVersion { version: u32 },

    #[error("corrupt polyline point-pool range [{offset}, {offset_plus_count}) for entity {entity_id}, pool length {pool_len}")]
    PointPoolOutOfRange {
        entity_id: u32,
        offset: u32,
        offset_plus_count: u32,
        pool_len: u32,
    },
}

/// Errors raised applying a history entry's inverse or forward deltas.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum HistoryError {
    #[error("no entry open; begin_entry() was never called")]
    NoOpenEntry,

    #[error("cannot undo: cursor already at the start of history")]
    NothingToUndo,

    #[error("cannot redo: cursor already at the end of history")]
    NothingToRedo,

    #[error("delta referenced unknown entity {entity_id} during replay")]
    UnknownEntity { entity_id: u32 },
}

/// The engine's top-level error, readable via `last_error` after any
/// mutating call that did not succeed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    History(#[from] HistoryError),
}

impl EngineError {
    /// Maps this error to its wire-stable coarse kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Command(e) => e.kind(),
            Self::Snapshot(_) => ErrorKind::InvalidHeader,
            Self::History(_) => ErrorKind::InvalidOperation,
        }
    }
}
