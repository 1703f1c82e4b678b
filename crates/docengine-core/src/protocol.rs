//! Wire-stable enums and the protocol info record.

use crate::command::CommandOp;
use crate::constants::{
    COMMAND_VERSION, EVENT_STREAM_VERSION, PROTOCOL_VERSION, SNAPSHOT_VERSION,
};
use crate::events::EventType;
use crate::record::EntityFlags;

/// Feature flag bit positions advertised in [`ProtocolInfo`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FeatureFlags(pub u32);

impl FeatureFlags {
    pub const PROTOCOL: Self = Self(1 << 0);
    pub const LAYERS_FLAGS: Self = Self(1 << 1);
    pub const SELECTION_ORDER: Self = Self(1 << 2);
    pub const SNAPSHOT_VNEXT: Self = Self(1 << 3);
    pub const EVENT_STREAM: Self = Self(1 << 4);
    pub const OVERLAY_QUERIES: Self = Self(1 << 5);
    pub const INTERACTIVE_TRANSFORM: Self = Self(1 << 6);

    #[must_use]
    pub fn all() -> Self {
        Self(
            Self::PROTOCOL.0
                | Self::LAYERS_FLAGS.0
                | Self::SELECTION_ORDER.0
                | Self::SNAPSHOT_VNEXT.0
                | Self::EVENT_STREAM.0
                | Self::OVERLAY_QUERIES.0
                | Self::INTERACTIVE_TRANSFORM.0,
        )
    }
}

/// How a selection-affecting op should combine with the current
/// selection.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum SelectionMode {
    Replace = 0,
    Add = 1,
    Remove = 2,
    Toggle = 3,
}

/// Marquee selection test mode.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum MarqueeMode {
    Window = 0,
    Crossing = 1,
}

impl From<MarqueeMode> for docengine_geom::MarqueeMode {
    fn from(mode: MarqueeMode) -> Self {
        match mode {
            MarqueeMode::Window => docengine_geom::MarqueeMode::Window,
            MarqueeMode::Crossing => docengine_geom::MarqueeMode::Crossing,
        }
    }
}

/// Draw-order reorder action.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum ReorderAction {
    BringToFront = 1,
    SendToBack = 2,
    BringForward = 3,
    SendBackward = 4,
}

/// Modifier-key bitmask used by interaction session calls.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SelectionModifier(pub u32);

impl SelectionModifier {
    pub const SHIFT: Self = Self(1 << 0);
    pub const CTRL: Self = Self(1 << 1);
    pub const ALT: Self = Self(1 << 2);
    pub const META: Self = Self(1 << 3);

    #[must_use]
    pub fn has(self, bit: Self) -> bool {
        self.0 & bit.0 != 0
    }
}

/// Constant record describing the wire protocol's versions and feature
/// set, with an `abi_hash` consumers must check before talking to the
/// engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ProtocolInfo {
    pub protocol_version: u32,
    pub command_version: u32,
    pub snapshot_version: u32,
    pub event_stream_version: u32,
    pub abi_hash: u64,
    pub feature_flags: u32,
}

/// Folds the exact numeric tags of every wire-stable enum, plus the
/// fixed payload struct sizes, into an FNV-1a 64-bit hash. A consumer
/// built against a mismatched layout gets a different hash and must
/// fail fast rather than misinterpret bytes.
#[must_use]
pub fn compute_abi_hash() -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01B3;
    let mut hash = OFFSET_BASIS;
    let mut fold = |v: u64| {
        hash ^= v;
        hash = hash.wrapping_mul(PRIME);
    };

    for op in CommandOp::ALL {
        fold(u64::from(op.tag()));
    }
    for event in [
        EventType::DocChanged,
        EventType::EntityCreated,
        EventType::EntityChanged,
        EventType::EntityDeleted,
        EventType::LayerChanged,
        EventType::SelectionChanged,
        EventType::OrderChanged,
        EventType::HistoryChanged,
        EventType::Overflow,
    ] {
        fold(event as u64);
    }
    fold(u64::from(EntityFlags::VISIBLE.0));
    fold(u64::from(EntityFlags::LOCKED.0));
    for mode in [SelectionMode::Replace, SelectionMode::Add, SelectionMode::Remove, SelectionMode::Toggle] {
        fold(mode as u64);
    }
    for mode in [MarqueeMode::Window, MarqueeMode::Crossing] {
        fold(mode as u64);
    }
    for action in [
        ReorderAction::BringToFront,
        ReorderAction::SendToBack,
        ReorderAction::BringForward,
        ReorderAction::SendBackward,
    ] {
        fold(action as u64);
    }
    fold(u64::from(crate::constants::COMMAND_HEADER_BYTES as u32));
    fold(u64::from(crate::constants::COMMAND_RECORD_BYTES as u32));
    fold(u64::from(crate::constants::EVENT_RECORD_BYTES as u32));
    fold(u64::from(crate::constants::OVERLAY_PRIMITIVE_BYTES as u32));
    hash
}

impl ProtocolInfo {
    #[must_use]
    pub fn current() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            command_version: COMMAND_VERSION,
            snapshot_version: SNAPSHOT_VERSION,
            event_stream_version: EVENT_STREAM_VERSION,
            abi_hash: compute_abi_hash(),
            feature_flags: FeatureFlags::all().0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abi_hash_is_deterministic_across_calls() {
        assert_eq!(compute_abi_hash(), compute_abi_hash());
    }

    #[test]
    fn protocol_info_advertises_every_feature_flag() {
        let info = ProtocolInfo::current();
        assert_eq!(info.feature_flags, FeatureFlags::all().0);
    }
}
