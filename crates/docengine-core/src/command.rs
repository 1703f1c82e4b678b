//! Binary command buffer parsing.
//!
//! Buffer layout: a 16-byte header, `command_count` 16-byte records, each
//! followed by `payload_bytes` of little-endian payload padded to 4-byte
//! alignment. Parsing never panics on malformed input; every failure
//! mode returns a [`CommandError`] so the dispatcher can abort the whole
//! buffer atomically.

use crate::constants::{COMMAND_HEADER_BYTES, COMMAND_MAGIC, COMMAND_RECORD_BYTES, COMMAND_VERSION};
use crate::error::CommandError;
use bytemuck::{Pod, Zeroable};

/// Recognized command op codes. Unknown tags fail the whole buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum CommandOp {
    ClearAll = 0,
    DeleteEntity = 1,
    SetViewScale = 2,
    SetDrawOrder = 3,
    UpsertRect = 4,
    UpsertLine = 5,
    UpsertPolyline = 6,
    UpsertCircle = 7,
    UpsertPolygon = 8,
    UpsertArrow = 9,
    UpsertText = 10,
    DeleteText = 11,
    SetTextCaret = 12,
    SetTextSelection = 13,
    InsertTextContent = 14,
    DeleteTextContent = 15,
    ApplyTextStyle = 16,
    SetTextAlign = 17,
}

impl CommandOp {
    pub const ALL: [Self; 18] = [
        Self::ClearAll,
        Self::DeleteEntity,
        Self::SetViewScale,
        Self::SetDrawOrder,
        Self::UpsertRect,
        Self::UpsertLine,
        Self::UpsertPolyline,
        Self::UpsertCircle,
        Self::UpsertPolygon,
        Self::UpsertArrow,
        Self::UpsertText,
        Self::DeleteText,
        Self::SetTextCaret,
        Self::SetTextSelection,
        Self::InsertTextContent,
        Self::DeleteTextContent,
        Self::ApplyTextStyle,
        Self::SetTextAlign,
    ];

    #[must_use]
    pub const fn tag(self) -> u32 {
        self as u32
    }

    #[must_use]
    pub const fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::ClearAll),
            1 => Some(Self::DeleteEntity),
            2 => Some(Self::SetViewScale),
            3 => Some(Self::SetDrawOrder),
            4 => Some(Self::UpsertRect),
            5 => Some(Self::UpsertLine),
            6 => Some(Self::UpsertPolyline),
            7 => Some(Self::UpsertCircle),
            8 => Some(Self::UpsertPolygon),
            9 => Some(Self::UpsertArrow),
            10 => Some(Self::UpsertText),
            11 => Some(Self::DeleteText),
            12 => Some(Self::SetTextCaret),
            13 => Some(Self::SetTextSelection),
            14 => Some(Self::InsertTextContent),
            15 => Some(Self::DeleteTextContent),
            16 => Some(Self::ApplyTextStyle),
            17 => Some(Self::SetTextAlign),
            _ => None,
        }
    }

    /// Fixed payload size for ops with a single, statically-sized
    /// payload. `None` for ops whose payload length is variable (text
    /// content ops, `SetDrawOrder`, `UpsertText`) — those are validated
    /// against a header-declared count/stride instead, by the
    /// dispatcher rather than the parser.
    #[must_use]
    pub const fn fixed_payload_size(self) -> Option<usize> {
        let header = size_of::<crate::record::EntityHeaderRow>();
        match self {
            Self::ClearAll => Some(0),
            Self::DeleteEntity => Some(0),
            Self::SetViewScale => Some(4),
            Self::SetDrawOrder => None,
            Self::UpsertRect => Some(header + size_of::<crate::record::RectRow>()),
            Self::UpsertLine | Self::UpsertArrow => {
                Some(header + size_of::<crate::record::LineRow>())
            }
            Self::UpsertPolyline => None,
            Self::UpsertCircle | Self::UpsertPolygon => {
                Some(header + size_of::<crate::record::CircleRow>())
            }
            Self::UpsertText => None,
            Self::DeleteText => Some(0),
            Self::SetTextCaret => Some(4),
            Self::SetTextSelection => Some(8),
            Self::InsertTextContent => None,
            Self::DeleteTextContent => Some(8),
            // start_byte:u32, end_byte:u32, run_flags:u8, set:u8,
            // has_color:u8, color:Rgba(16) — color is always present in
            // the payload; `has_color` selects whether it is applied.
            Self::ApplyTextStyle => Some(4 + 4 + 1 + 1 + 1 + size_of::<crate::record::Rgba>()),
            Self::SetTextAlign => Some(4),
        }
    }
}

/// Command buffer header.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct CommandHeader {
    pub magic: u32,
    pub version: u32,
    pub command_count: u32,
    pub reserved: u32,
}

const _: () = assert!(size_of::<CommandHeader>() == COMMAND_HEADER_BYTES);

/// One command record's fixed fields (excludes payload bytes).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct CommandRecordHeader {
    pub op: u32,
    pub id: u32,
    pub payload_bytes: u32,
    pub reserved: u32,
}

const _: () = assert!(size_of::<CommandRecordHeader>() == COMMAND_RECORD_BYTES);

/// A single parsed command: op, target id (0 if not applicable), and a
/// borrowed view of its payload bytes.
#[derive(Debug, Copy, Clone)]
pub struct ParsedCommand<'a> {
    pub op: CommandOp,
    pub id: u32,
    pub payload: &'a [u8],
}

fn padded_len(n: usize) -> usize {
    (n + 3) & !3
}

/// Parses a command buffer, validating the header, every record's op
/// code, and every record's declared payload size, without applying any
/// of them.
///
/// Returns every parsed command in order, or the first [`CommandError`]
/// encountered (the caller must treat any error as aborting the whole
/// buffer — nothing parsed so far should be applied).
pub fn parse_buffer(bytes: &[u8]) -> Result<Vec<ParsedCommand<'_>>, CommandError> {
    if bytes.len() < COMMAND_HEADER_BYTES {
        return Err(CommandError::Truncated {
            needed: COMMAND_HEADER_BYTES,
            available: bytes.len(),
        });
    }
    let header: CommandHeader =
        *bytemuck::from_bytes(&bytes[..COMMAND_HEADER_BYTES]);
    if header.magic != COMMAND_MAGIC || header.version != COMMAND_VERSION {
        return Err(CommandError::InvalidHeader {
            expected_magic: COMMAND_MAGIC,
            found_magic: header.magic,
            expected_version: COMMAND_VERSION,
            found_version: header.version,
        });
    }

    let mut cursor = COMMAND_HEADER_BYTES;
    let mut out = Vec::with_capacity(header.command_count as usize);

    for record_index in 0..header.command_count as usize {
        if cursor + COMMAND_RECORD_BYTES > bytes.len() {
            return Err(CommandError::Truncated {
                needed: cursor + COMMAND_RECORD_BYTES,
                available: bytes.len(),
            });
        }
        let record_header: CommandRecordHeader =
            *bytemuck::from_bytes(&bytes[cursor..cursor + COMMAND_RECORD_BYTES]);
        cursor += COMMAND_RECORD_BYTES;

        let Some(op) = CommandOp::from_tag(record_header.op) else {
            return Err(CommandError::UnknownCommand {
                record_index,
                op: record_header.op,
            });
        };

        let payload_bytes = record_header.payload_bytes as usize;
        if let Some(expected) = op.fixed_payload_size() {
            if payload_bytes != expected {
                return Err(CommandError::InvalidPayloadSize {
                    record_index,
                    op: op.tag(),
                    expected,
                    actual: payload_bytes,
                });
            }
        }

        let padded = padded_len(payload_bytes);
        if cursor + padded > bytes.len() {
            return Err(CommandError::Truncated {
                needed: cursor + padded,
                available: bytes.len(),
            });
        }
        let payload = &bytes[cursor..cursor + payload_bytes];
        cursor += padded;

        out.push(ParsedCommand {
            op,
            id: record_header.id,
            payload,
        });
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_buffer(records: &[(CommandOp, u32, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&CommandHeader {
            magic: COMMAND_MAGIC,
            version: COMMAND_VERSION,
            command_count: records.len() as u32,
            reserved: 0,
        }.magic.to_le_bytes());
        out.extend_from_slice(&COMMAND_VERSION.to_le_bytes());
        out.extend_from_slice(&(records.len() as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        for (op, id, payload) in records {
            out.extend_from_slice(&op.tag().to_le_bytes());
            out.extend_from_slice(&id.to_le_bytes());
            out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(payload);
            while out.len() % 4 != 0 {
                out.push(0);
            }
        }
        out
    }

    #[test]
    fn parses_clear_all_with_empty_payload() {
        let buf = build_buffer(&[(CommandOp::ClearAll, 0, &[])]);
        let parsed = parse_buffer(&buf).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].op, CommandOp::ClearAll);
    }

    #[test]
    fn bad_magic_is_invalid_header() {
        let mut buf = build_buffer(&[(CommandOp::ClearAll, 0, &[])]);
        buf[0] = 0xAD;
        buf[1] = 0xDE;
        buf[2] = 0xAD;
        buf[3] = 0xDE;
        let err = parse_buffer(&buf).unwrap_err();
        assert!(matches!(err, CommandError::InvalidHeader { .. }));
    }

    #[test]
    fn wrong_fixed_payload_size_is_rejected() {
        let buf = build_buffer(&[(CommandOp::SetViewScale, 0, &[0, 0, 0])]);
        let err = parse_buffer(&buf).unwrap_err();
        assert!(matches!(err, CommandError::InvalidPayloadSize { .. }));
    }

    #[test]
    fn unknown_op_is_rejected() {
        let mut buf = build_buffer(&[(CommandOp::ClearAll, 0, &[])]);
        // Overwrite the op field of the only record with an unknown tag.
        buf[16] = 0xFF;
        buf[17] = 0xFF;
        buf[18] = 0xFF;
        buf[19] = 0xFF;
        let err = parse_buffer(&buf).unwrap_err();
        assert!(matches!(err, CommandError::UnknownCommand { .. }));
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let buf = build_buffer(&[(CommandOp::SetViewScale, 0, &[1, 2, 3, 4])]);
        let err = parse_buffer(&buf[..buf.len() - 2]).unwrap_err();
        assert!(matches!(err, CommandError::Truncated { .. }));
    }
}
