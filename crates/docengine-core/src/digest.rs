//! Content-addressed document digest.
//!
//! The digest is a 128-bit FNV-1a fold over the canonicalized document
//! content: layers in id order, entities in draw order, style overrides
//! in id order, and the draw-order id sequence itself. Two documents that
//! load to the same observable state produce the same digest regardless
//! of the mutation path used to reach it, because the fold only ever
//! consumes canonicalized bytes, never internal bookkeeping like
//! `generation` or allocator position.

use crate::entity_store::EntityStore;
use crate::layer::LayerStore;
use crate::record::EntityKind;

const FNV_OFFSET_BASIS: u128 = 0x6c62_272e_07bb_0142_62b8_2175_6295_c58d;
const FNV_PRIME: u128 = 0x0000_0000_0100_0000_0000_0000_0000_013B;

/// A 128-bit document fingerprint.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Digest(pub u128);

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

struct Fold(u128);

impl Fold {
    fn new() -> Self {
        Self(FNV_OFFSET_BASIS)
    }

    fn byte(&mut self, b: u8) {
        self.0 ^= u128::from(b);
        self.0 = self.0.wrapping_mul(FNV_PRIME);
    }

    fn bytes(&mut self, bs: &[u8]) {
        for &b in bs {
            self.byte(b);
        }
    }

    fn u32(&mut self, v: u32) {
        self.bytes(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.bytes(&v.to_le_bytes());
    }

    /// Canonical float encoding: folds `-0.0` into `+0.0` and collapses
    /// every NaN bit pattern to a single representative, so that two
    /// documents differing only in which NaN payload they carry still
    /// digest identically.
    fn f32(&mut self, v: f32) {
        let canonical = if v == 0.0 {
            0.0f32
        } else if v.is_nan() {
            f32::NAN
        } else {
            v
        };
        self.u32(canonical.to_bits());
    }

    fn finish(self) -> Digest {
        Digest(self.0)
    }
}

/// Computes the document digest over entities, layers, and overrides.
#[must_use]
pub fn compute_digest(store: &EntityStore, layers: &LayerStore) -> Digest {
    let mut fold = Fold::new();

    for layer in layers.by_id() {
        fold.u32(layer.id);
        fold.bytes(layer.name.as_bytes());
        fold.byte(layer.flags.0);
        fold.u32(layer.order_index);
        fold.f32(layer.style.stroke.color.r);
        fold.f32(layer.style.stroke.color.g);
        fold.f32(layer.style.stroke.color.b);
        fold.f32(layer.style.stroke.color.a);
        fold.byte(u8::from(layer.style.stroke.enabled));
        fold.f32(layer.style.fill.color.r);
        fold.f32(layer.style.fill.color.g);
        fold.f32(layer.style.fill.color.b);
        fold.f32(layer.style.fill.color.a);
        fold.byte(u8::from(layer.style.fill.enabled));
    }

    for &id in store.draw_order() {
        let Some(kind) = store.kind_of(id) else {
            continue;
        };
        let Some(header) = store.header(id) else {
            continue;
        };
        fold.u32(id.get());
        fold.u32(kind.tag());
        fold.byte(header.flags.0);
        fold.u32(header.layer_id);

        match kind {
            EntityKind::Rect => {
                if let Some(row) = store.get_rect(id) {
                    fold.f32(row.x);
                    fold.f32(row.y);
                    fold.f32(row.w);
                    fold.f32(row.h);
                    fold_rgba(&mut fold, row.fill);
                    fold_rgba(&mut fold, row.stroke);
                    fold.u32(row.stroke_enabled);
                    fold.f32(row.stroke_width);
                }
            }
            EntityKind::Line | EntityKind::Arrow => {
                let row = if kind == EntityKind::Line {
                    store.get_line(id)
                } else {
                    store.get_arrow(id)
                };
                if let Some(row) = row {
                    fold.f32(row.ax);
                    fold.f32(row.ay);
                    fold.f32(row.bx);
                    fold.f32(row.by);
                    fold_rgba(&mut fold, row.stroke);
                    fold.u32(row.stroke_enabled);
                    fold.f32(row.stroke_width);
                    fold.f32(row.head_size);
                }
            }
            EntityKind::Polyline => {
                if let Some(row) = store.get_polyline(id) {
                    for point in store.polyline_points(row) {
                        fold.f32(point.x());
                        fold.f32(point.y());
                    }
                    fold_rgba(&mut fold, row.stroke);
                    fold.u32(row.stroke_enabled);
                    fold.f32(row.stroke_width);
                }
            }
            EntityKind::Circle | EntityKind::Polygon => {
                let row = if kind == EntityKind::Circle {
                    store.get_circle(id)
                } else {
                    store.get_polygon(id)
                };
                if let Some(row) = row {
                    fold.f32(row.cx);
                    fold.f32(row.cy);
                    fold.f32(row.rx);
                    fold.f32(row.ry);
                    fold.f32(row.rotation);
                    fold.f32(row.scale);
                    fold.u32(row.sides);
                    fold_rgba(&mut fold, row.fill);
                    fold_rgba(&mut fold, row.stroke);
                    fold.u32(row.stroke_enabled);
                    fold.f32(row.stroke_width);
                }
            }
            EntityKind::Text => {
                // Text geometry/content lives in the text store and is
                // folded by the caller via `fold_text_into`.
            }
        }
    }

    for (entity_id, target, slot) in layers.overrides_sorted() {
        fold.u32(entity_id);
        fold.u32(target as u32);
        fold_rgba(&mut fold, slot.color);
        fold.byte(u8::from(slot.enabled));
    }

    for &id in store.draw_order() {
        fold.u32(id.get());
    }

    fold.finish()
}

fn fold_rgba(fold: &mut Fold, c: crate::record::Rgba) {
    fold.f32(c.r);
    fold.f32(c.g);
    fold.f32(c.b);
    fold.f32(c.a);
}

/// Folds a single text entity's content and run table into an
/// in-progress digest computation. Exposed so [`crate::DocEngine`] can
/// extend [`compute_digest`]'s fold with text-store state without this
/// module depending on `crate::text`.
pub fn fold_text_entity(digest_seed: u128, entity_id: u32, content: &[u8], run_tags: &[u64]) -> u128 {
    let mut fold = Fold(digest_seed);
    fold.u32(entity_id);
    fold.u64(content.len() as u64);
    fold.bytes(content);
    for &tag in run_tags {
        fold.u64(tag);
    }
    fold.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::EntityId;
    use crate::record::{EntityHeader, RectRow, Rgba};

    fn rect_row(x: f32) -> RectRow {
        RectRow {
            x,
            y: 0.0,
            w: 10.0,
            h: 10.0,
            fill: Rgba::TRANSPARENT,
            stroke: Rgba::TRANSPARENT,
            stroke_enabled: 0,
            stroke_width: 0.0,
            _pad: [0; 2],
        }
    }

    #[test]
    fn identical_state_digests_identically() {
        let mut a = EntityStore::new();
        let id = EntityId::new(1).unwrap();
        a.observe_id(id);
        a.upsert_rect(id, rect_row(5.0), EntityHeader::default());
        let layers = LayerStore::with_default_layer();

        let mut b = EntityStore::new();
        b.observe_id(id);
        b.upsert_rect(id, rect_row(5.0), EntityHeader::default());

        assert_eq!(compute_digest(&a, &layers), compute_digest(&b, &layers));
    }

    #[test]
    fn different_geometry_digests_differently() {
        let mut a = EntityStore::new();
        let id = EntityId::new(1).unwrap();
        a.upsert_rect(id, rect_row(5.0), EntityHeader::default());
        let mut b = EntityStore::new();
        b.upsert_rect(id, rect_row(6.0), EntityHeader::default());
        let layers = LayerStore::with_default_layer();
        assert_ne!(compute_digest(&a, &layers), compute_digest(&b, &layers));
    }

    #[test]
    fn negative_zero_and_positive_zero_digest_identically() {
        let mut a = EntityStore::new();
        let id = EntityId::new(1).unwrap();
        a.upsert_rect(id, rect_row(0.0), EntityHeader::default());
        let mut b = EntityStore::new();
        b.upsert_rect(id, rect_row(-0.0), EntityHeader::default());
        let layers = LayerStore::with_default_layer();
        assert_eq!(compute_digest(&a, &layers), compute_digest(&b, &layers));
    }

    #[test]
    fn digest_independent_of_mutation_path_for_equal_end_state() {
        let id = EntityId::new(1).unwrap();
        let layers = LayerStore::with_default_layer();

        let mut direct = EntityStore::new();
        direct.upsert_rect(id, rect_row(5.0), EntityHeader::default());

        let mut via_edit = EntityStore::new();
        via_edit.upsert_rect(id, rect_row(1.0), EntityHeader::default());
        via_edit.upsert_rect(id, rect_row(5.0), EntityHeader::default());

        assert_eq!(
            compute_digest(&direct, &layers),
            compute_digest(&via_edit, &layers)
        );
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::record::{EntityHeader, RectRow, Rgba};
    use crate::text::TextStore;
    use proptest::prelude::*;

    fn rect_row(x: f32, y: f32, w: f32, h: f32) -> RectRow {
        RectRow {
            x,
            y,
            w,
            h,
            fill: Rgba::TRANSPARENT,
            stroke: Rgba::TRANSPARENT,
            stroke_enabled: 0,
            stroke_width: 0.0,
            _pad: [0; 2],
        }
    }

    proptest! {
        /// The document digest is invariant under a snapshot save/load
        /// round trip, for an arbitrary sequence of live rects.
        #[test]
        fn digest_is_invariant_under_snapshot_round_trip(
            coords in proptest::collection::vec((-1000.0f32..1000.0, -1000.0f32..1000.0, 0.0f32..200.0, 0.0f32..200.0), 0..16)
        ) {
            let mut store = EntityStore::new();
            for (x, y, w, h) in coords {
                let id = store.allocate_id();
                store.upsert_rect(id, rect_row(x, y, w, h), EntityHeader::default());
            }
            let layers = LayerStore::with_default_layer();
            let text = TextStore::new();

            let before = compute_digest(&store, &layers);
            let bytes = crate::snapshot::build(&store, &layers, &text, 0);
            let loaded = crate::snapshot::parse(&bytes).unwrap();
            let after = compute_digest(&loaded.store, &loaded.layers);

            prop_assert_eq!(before, after);
        }
    }
}
