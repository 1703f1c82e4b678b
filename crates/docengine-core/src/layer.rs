//! Layer records and the sparse per-entity style-override table.

use crate::record::{EntityFlags, Rgba};
use rustc_hash::FxHashMap;

/// A named style target that an entity or layer can carry colors/flags
/// for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum StyleTarget {
    Stroke = 0,
    Fill = 1,
    TextColor = 2,
    TextBackground = 3,
}

/// A color plus an explicit enabled bit, as carried by both layer
/// defaults and per-entity overrides.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct StyleSlot {
    pub color: Rgba,
    pub enabled: bool,
}

impl Default for StyleSlot {
    fn default() -> Self {
        Self {
            color: Rgba::TRANSPARENT,
            enabled: false,
        }
    }
}

/// A layer's default style block: one [`StyleSlot`] per target.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct LayerStyle {
    pub stroke: StyleSlot,
    pub fill: StyleSlot,
    pub text_color: StyleSlot,
    pub text_background: StyleSlot,
}

impl LayerStyle {
    #[must_use]
    pub fn slot(&self, target: StyleTarget) -> StyleSlot {
        match target {
            StyleTarget::Stroke => self.stroke,
            StyleTarget::Fill => self.fill,
            StyleTarget::TextColor => self.text_color,
            StyleTarget::TextBackground => self.text_background,
        }
    }

    pub fn set_slot(&mut self, target: StyleTarget, slot: StyleSlot) {
        match target {
            StyleTarget::Stroke => self.stroke = slot,
            StyleTarget::Fill => self.fill = slot,
            StyleTarget::TextColor => self.text_color = slot,
            StyleTarget::TextBackground => self.text_background = slot,
        }
    }
}

/// A layer: id, name, flags, order index, and style defaults inherited by
/// entities that do not carry an override.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub id: u32,
    pub name: String,
    pub flags: EntityFlags,
    pub order_index: u32,
    pub style: LayerStyle,
}

impl Layer {
    #[must_use]
    pub fn new(id: u32, name: impl Into<String>, order_index: u32) -> Self {
        Self {
            id,
            name: name.into(),
            flags: EntityFlags::default(),
            order_index,
            style: LayerStyle::default(),
        }
    }
}

/// Owns every [`Layer`] in id order and the sparse per-entity style
/// override table.
///
/// The override table is sparse by design: most entities inherit their
/// layer's style untouched, so a `FxHashMap` keyed by `(entity_id,
/// target)` avoids paying for four style slots per entity up front.
#[derive(Debug, Clone, Default)]
pub struct LayerStore {
    layers: FxHashMap<u32, Layer>,
    overrides: FxHashMap<(u32, StyleTarget), StyleSlot>,
}

impl LayerStore {
    /// Creates a store seeded with the default layer (id 1).
    #[must_use]
    pub fn with_default_layer() -> Self {
        let mut store = Self::default();
        store.insert(Layer::new(
            crate::constants::DEFAULT_LAYER_ID,
            "Layer 1",
            0,
        ));
        store
    }

    pub fn insert(&mut self, layer: Layer) {
        self.layers.insert(layer.id, layer);
    }

    #[must_use]
    pub fn get(&self, id: u32) -> Option<&Layer> {
        self.layers.get(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut Layer> {
        self.layers.get_mut(&id)
    }

    /// Removes a layer and every style override entities had registered
    /// against any of its targets is left untouched — the caller is
    /// responsible for cascading entity deletion separately.
    pub fn remove(&mut self, id: u32) -> Option<Layer> {
        self.layers.remove(&id)
    }

    /// All layers, ordered by `order_index` then id for determinism.
    #[must_use]
    pub fn ordered(&self) -> Vec<&Layer> {
        let mut out: Vec<&Layer> = self.layers.values().collect();
        out.sort_unstable_by_key(|l| (l.order_index, l.id));
        out
    }

    /// All layers in ascending id order, used by digest canonicalization.
    #[must_use]
    pub fn by_id(&self) -> Vec<&Layer> {
        let mut out: Vec<&Layer> = self.layers.values().collect();
        out.sort_unstable_by_key(|l| l.id);
        out
    }

    pub fn set_override(&mut self, entity_id: u32, target: StyleTarget, slot: StyleSlot) {
        self.overrides.insert((entity_id, target), slot);
    }

    pub fn clear_override(&mut self, entity_id: u32, target: StyleTarget) {
        self.overrides.remove(&(entity_id, target));
    }

    /// Removes every override registered for `entity_id`, across all
    /// targets. Called when an entity is deleted.
    pub fn clear_all_overrides(&mut self, entity_id: u32) {
        for target in [
            StyleTarget::Stroke,
            StyleTarget::Fill,
            StyleTarget::TextColor,
            StyleTarget::TextBackground,
        ] {
            self.overrides.remove(&(entity_id, target));
        }
    }

    /// The effective style for `entity_id` on layer `layer_id`:
    /// override if present, else the layer default.
    #[must_use]
    pub fn effective_style(&self, entity_id: u32, layer_id: u32, target: StyleTarget) -> StyleSlot {
        if let Some(slot) = self.overrides.get(&(entity_id, target)) {
            return *slot;
        }
        self.get(layer_id)
            .map(|l| l.style.slot(target))
            .unwrap_or_default()
    }

    /// Every `(entity_id, target, slot)` override, in ascending
    /// `(entity_id, target)` order, used by digest canonicalization and
    /// the snapshot codec.
    #[must_use]
    pub fn overrides_sorted(&self) -> Vec<(u32, StyleTarget, StyleSlot)> {
        let mut out: Vec<(u32, StyleTarget, StyleSlot)> = self
            .overrides
            .iter()
            .map(|(&(id, target), &slot)| (id, target, slot))
            .collect();
        out.sort_unstable_by_key(|(id, target, _)| (*id, *target as u32));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_style_falls_back_to_layer_default() {
        let mut store = LayerStore::with_default_layer();
        let mut layer_style = LayerStyle::default();
        layer_style.fill = StyleSlot {
            color: Rgba::new(1.0, 0.0, 0.0, 1.0),
            enabled: true,
        };
        store.get_mut(1).unwrap().style = layer_style;

        let effective = store.effective_style(42, 1, StyleTarget::Fill);
        assert!(effective.enabled);
        assert_eq!(effective.color, Rgba::new(1.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn override_takes_precedence_over_layer_default() {
        let mut store = LayerStore::with_default_layer();
        store.set_override(
            7,
            StyleTarget::Stroke,
            StyleSlot {
                color: Rgba::new(0.0, 1.0, 0.0, 1.0),
                enabled: true,
            },
        );
        let effective = store.effective_style(7, 1, StyleTarget::Stroke);
        assert_eq!(effective.color, Rgba::new(0.0, 1.0, 0.0, 1.0));
    }

    #[test]
    fn clear_all_overrides_removes_every_target() {
        let mut store = LayerStore::with_default_layer();
        store.set_override(7, StyleTarget::Fill, StyleSlot::default());
        store.set_override(7, StyleTarget::Stroke, StyleSlot::default());
        store.clear_all_overrides(7);
        assert!(store.overrides_sorted().is_empty());
    }

    #[test]
    fn ordered_sorts_by_order_index_then_id() {
        let mut store = LayerStore::default();
        store.insert(Layer::new(5, "b", 1));
        store.insert(Layer::new(2, "a", 1));
        store.insert(Layer::new(1, "first", 0));
        let ids: Vec<u32> = store.ordered().iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![1, 2, 5]);
    }
}
