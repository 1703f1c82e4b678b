//! Fixed-width, `Pod` entity record schemas.
//!
//! Every kind's wire row is a `#[repr(C)]` struct of plain f32/u32 fields
//! so it can be memcpy'd directly into the snapshot byte block and read
//! back with `bytemuck` without a parsing pass. Layout is asserted at
//! compile time so a field addition is caught immediately rather than
//! silently shifting the wire format.

use bytemuck::{Pod, Zeroable};

/// Straight (non-premultiplied) RGBA color, channels in `[0,1]`.
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const TRANSPARENT: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    #[must_use]
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }
}

const _: () = assert!(size_of::<Rgba>() == 16);

/// Per-entity flag bits.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EntityFlags(pub u8);

impl EntityFlags {
    pub const VISIBLE: Self = Self(1 << 0);
    pub const LOCKED: Self = Self(1 << 1);
    pub const DEFAULT: Self = Self::VISIBLE;

    #[must_use]
    pub fn is_visible(self) -> bool {
        self.0 & Self::VISIBLE.0 != 0
    }

    #[must_use]
    pub fn is_locked(self) -> bool {
        self.0 & Self::LOCKED.0 != 0
    }

    #[must_use]
    pub fn with(self, bit: Self, set: bool) -> Self {
        if set {
            Self(self.0 | bit.0)
        } else {
            Self(self.0 & !bit.0)
        }
    }
}

impl Default for EntityFlags {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// The tagged entity kind. Numeric tags are wire-stable.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum EntityKind {
    Rect = 0,
    Line = 1,
    Polyline = 2,
    Circle = 3,
    Polygon = 4,
    Arrow = 5,
    Text = 6,
}

impl EntityKind {
    #[must_use]
    pub const fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::Rect),
            1 => Some(Self::Line),
            2 => Some(Self::Polyline),
            3 => Some(Self::Circle),
            4 => Some(Self::Polygon),
            5 => Some(Self::Arrow),
            6 => Some(Self::Text),
            _ => None,
        }
    }

    #[must_use]
    pub const fn tag(self) -> u32 {
        self as u32
    }

    /// Line-like entities resolve pick-handle precedence to vertex
    /// handles rather than resize-handle corners.
    #[must_use]
    pub const fn is_line_like(self) -> bool {
        matches!(self, Self::Line | Self::Polyline | Self::Arrow)
    }
}

/// Common attributes every entity carries regardless of kind.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct EntityHeader {
    pub layer_id: u32,
    pub flags: EntityFlags,
}

impl Default for EntityHeader {
    fn default() -> Self {
        Self {
            layer_id: crate::constants::DEFAULT_LAYER_ID,
            flags: EntityFlags::default(),
        }
    }
}

/// Wire row for [`EntityHeader`], prefixed to every upsert command's
/// payload ahead of the kind-specific geometry row.
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct EntityHeaderRow {
    pub layer_id: u32,
    pub flags: u32,
}

const _: () = assert!(size_of::<EntityHeaderRow>() == 8);

impl From<EntityHeader> for EntityHeaderRow {
    fn from(header: EntityHeader) -> Self {
        Self {
            layer_id: header.layer_id,
            flags: u32::from(header.flags.0),
        }
    }
}

impl From<EntityHeaderRow> for EntityHeader {
    fn from(row: EntityHeaderRow) -> Self {
        Self {
            layer_id: row.layer_id,
            flags: EntityFlags(row.flags as u8),
        }
    }
}

/// Rect geometry row.
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct RectRow {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub fill: Rgba,
    pub stroke: Rgba,
    pub stroke_enabled: u32,
    pub stroke_width: f32,
    pub _pad: [u32; 2],
}

const _: () = assert!(size_of::<RectRow>() == 64);

/// Line/Arrow endpoint + stroke row. Arrows additionally carry
/// `head_size`; lines leave it zero.
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct LineRow {
    pub ax: f32,
    pub ay: f32,
    pub bx: f32,
    pub by: f32,
    pub stroke: Rgba,
    pub stroke_enabled: u32,
    pub stroke_width: f32,
    pub head_size: f32,
    pub _pad: u32,
}

const _: () = assert!(size_of::<LineRow>() == 48);

/// Polyline row: offset/count into the shared point pool plus stroke
/// attributes.
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct PolylineRow {
    pub offset: u32,
    pub count: u32,
    pub stroke: Rgba,
    pub stroke_enabled: u32,
    pub stroke_width: f32,
    pub _pad: [u32; 2],
}

const _: () = assert!(size_of::<PolylineRow>() == 40);

/// Circle/Polygon row. `sides` is ignored for circles (ellipses).
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct CircleRow {
    pub cx: f32,
    pub cy: f32,
    pub rx: f32,
    pub ry: f32,
    pub rotation: f32,
    pub scale: f32,
    pub sides: u32,
    pub fill: Rgba,
    pub stroke: Rgba,
    pub stroke_enabled: u32,
    pub stroke_width: f32,
}

const _: () = assert!(size_of::<CircleRow>() == 68);

/// Regular polygons share the circle/ellipse row shape; `sides` is
/// meaningful here rather than ignored.
pub type PolygonRow = CircleRow;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_kind_round_trips_through_tag() {
        for kind in [
            EntityKind::Rect,
            EntityKind::Line,
            EntityKind::Polyline,
            EntityKind::Circle,
            EntityKind::Polygon,
            EntityKind::Arrow,
            EntityKind::Text,
        ] {
            assert_eq!(EntityKind::from_tag(kind.tag()), Some(kind));
        }
    }

    #[test]
    fn unknown_tag_is_none() {
        assert!(EntityKind::from_tag(999).is_none());
    }

    #[test]
    fn line_like_excludes_fillable_kinds() {
        assert!(EntityKind::Arrow.is_line_like());
        assert!(!EntityKind::Rect.is_line_like());
        assert!(!EntityKind::Circle.is_line_like());
    }

    #[test]
    fn flags_default_is_visible_and_unlocked() {
        let flags = EntityFlags::default();
        assert!(flags.is_visible());
        assert!(!flags.is_locked());
    }

    #[test]
    fn flags_with_toggles_a_single_bit() {
        let flags = EntityFlags::default().with(EntityFlags::LOCKED, true);
        assert!(flags.is_visible());
        assert!(flags.is_locked());
    }
}
