//! Bounded event ring with per-epoch coalescing and overflow/resync.

use crate::ident::EntityId;
use std::collections::BTreeMap;

/// Bitmask of what changed about an entity or the document as a whole.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ChangeMask(pub u32);

impl ChangeMask {
    pub const GEOMETRY: Self = Self(1 << 0);
    pub const STYLE: Self = Self(1 << 1);
    pub const FLAGS: Self = Self(1 << 2);
    pub const LAYER: Self = Self(1 << 3);
    pub const ORDER: Self = Self(1 << 4);
    pub const TEXT: Self = Self(1 << 5);
    pub const BOUNDS: Self = Self(1 << 6);
    pub const RENDER_DATA: Self = Self(1 << 7);
    pub const NONE: Self = Self(0);

    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// Wire-stable event type tags.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u16)]
pub enum EventType {
    DocChanged = 0,
    EntityCreated = 1,
    EntityChanged = 2,
    EntityDeleted = 3,
    LayerChanged = 4,
    SelectionChanged = 5,
    OrderChanged = 6,
    HistoryChanged = 7,
    Overflow = 8,
}

/// One event ring record: `{type, flags, a, b, c, d}`, 20 bytes on the
/// wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub event_type: EventType,
    pub flags: u16,
    pub a: u32,
    pub b: u32,
    pub c: u32,
    pub d: u32,
}

impl EventRecord {
    #[must_use]
    fn simple(event_type: EventType, a: u32, b: u32) -> Self {
        Self {
            event_type,
            flags: 0,
            a,
            b,
            c: 0,
            d: 0,
        }
    }
}

/// Accumulates per-entity and document-level change masks within a
/// single mutation epoch (a command buffer or a transform commit),
/// keyed so that repeated touches to the same entity OR within one
/// entity in one epoch.
#[derive(Debug, Default)]
pub struct EpochAccumulator {
    doc_mask: ChangeMask,
    entity_created: BTreeMap<u32, ()>,
    entity_changed: BTreeMap<u32, ChangeMask>,
    entity_deleted: BTreeMap<u32, ()>,
    layer_changed: BTreeMap<u32, u32>,
    selection_changed: bool,
    order_changed: bool,
    history_changed: bool,
}

impl EpochAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn doc_changed(&mut self, mask: ChangeMask) {
        self.doc_mask = self.doc_mask.union(mask);
    }

    pub fn entity_created(&mut self, id: EntityId) {
        self.entity_created.insert(id.get(), ());
    }

    pub fn entity_changed(&mut self, id: EntityId, mask: ChangeMask) {
        let entry = self.entity_changed.entry(id.get()).or_insert(ChangeMask::NONE);
        *entry = entry.union(mask);
    }

    pub fn entity_deleted(&mut self, id: EntityId) {
        self.entity_created.remove(&id.get());
        self.entity_changed.remove(&id.get());
        self.entity_deleted.insert(id.get(), ());
    }

    pub fn layer_changed(&mut self, layer_id: u32, prop_mask: u32) {
        let entry = self.layer_changed.entry(layer_id).or_insert(0);
        *entry |= prop_mask;
    }

    pub fn selection_changed(&mut self) {
        self.selection_changed = true;
    }

    pub fn order_changed(&mut self) {
        self.order_changed = true;
    }

    pub fn history_changed(&mut self) {
        self.history_changed = true;
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.doc_mask.0 == 0
            && self.entity_created.is_empty()
            && self.entity_changed.is_empty()
            && self.entity_deleted.is_empty()
            && self.layer_changed.is_empty()
            && !self.selection_changed
            && !self.order_changed
            && !self.history_changed
    }

    /// Flattens the accumulated epoch into ordered event records:
    /// `DocChanged`, then created/changed/deleted in id order, then
    /// layer, then selection, then order, then history.
    #[must_use]
    pub fn flush(self) -> Vec<EventRecord> {
        let mut out = Vec::new();
        if self.doc_mask.0 != 0 {
            out.push(EventRecord::simple(EventType::DocChanged, self.doc_mask.0, 0));
        }
        for id in self.entity_created.keys() {
            out.push(EventRecord::simple(EventType::EntityCreated, *id, 0));
        }
        for (id, mask) in &self.entity_changed {
            out.push(EventRecord::simple(EventType::EntityChanged, *id, mask.0));
        }
        for id in self.entity_deleted.keys() {
            out.push(EventRecord::simple(EventType::EntityDeleted, *id, 0));
        }
        for (layer_id, prop_mask) in &self.layer_changed {
            out.push(EventRecord::simple(EventType::LayerChanged, *layer_id, *prop_mask));
        }
        if self.selection_changed {
            out.push(EventRecord::simple(EventType::SelectionChanged, 0, 0));
        }
        if self.order_changed {
            out.push(EventRecord::simple(EventType::OrderChanged, 0, 0));
        }
        if self.history_changed {
            out.push(EventRecord::simple(EventType::HistoryChanged, 0, 0));
        }
        out
    }
}

/// A bounded ring of flushed event records.
///
/// When a flush would push the ring past capacity, every pending record
/// is discarded in favor of a single `Overflow(resync_generation)`
/// record; subsequent flushes are dropped until the consumer calls
/// [`EventRing::ack_resync`] with that generation.
pub struct EventRing {
    capacity: usize,
    records: Vec<EventRecord>,
    overflowed: bool,
    resync_generation: u64,
}

impl EventRing {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: Vec::new(),
            overflowed: false,
            resync_generation: 0,
        }
    }

    /// Appends a flushed epoch's records, stamped with the generation
    /// that produced them. Overflows into a single `Overflow` event if
    /// the ring would exceed capacity.
    pub fn push_epoch(&mut self, records: Vec<EventRecord>, generation: u64) {
        if self.overflowed {
            return;
        }
        if self.records.len() + records.len() > self.capacity {
            self.records.clear();
            self.records.push(EventRecord {
                event_type: EventType::Overflow,
                flags: 0,
                a: generation as u32,
                b: (generation >> 32) as u32,
                c: 0,
                d: 0,
            });
            self.overflowed = true;
            self.resync_generation = generation;
            return;
        }
        self.records.extend(records);
    }

    /// Returns up to `max` pending records without removing them, paired
    /// with the generation the caller should stamp the poll response
    /// with.
    #[must_use]
    pub fn poll(&self, max: usize) -> &[EventRecord] {
        let n = max.min(self.records.len());
        &self.records[..n]
    }

    /// Drops the first `n` polled records (the consumer's delivery
    /// acknowledgment), leaving the rest for the next poll.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.records.len());
        self.records.drain(..n);
    }

    #[must_use]
    pub fn is_overflowed(&self) -> bool {
        self.overflowed
    }

    /// Clears the overflow state once the consumer has reloaded from a
    /// full snapshot at `generation`.
    pub fn ack_resync(&mut self, generation: u64) {
        if self.overflowed && generation == self.resync_generation {
            self.overflowed = false;
            self.records.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_coalesces_repeated_touches_to_one_entity() {
        let mut epoch = EpochAccumulator::new();
        let id = EntityId::new(1).unwrap();
        epoch.entity_changed(id, ChangeMask::GEOMETRY);
        epoch.entity_changed(id, ChangeMask::STYLE);
        let flushed = epoch.flush();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].b, ChangeMask::GEOMETRY.0 | ChangeMask::STYLE.0);
    }

    #[test]
    fn flush_orders_doc_then_entities_then_layer_then_selection_order_history() {
        let mut epoch = EpochAccumulator::new();
        epoch.history_changed();
        epoch.order_changed();
        epoch.selection_changed();
        epoch.layer_changed(1, 1);
        epoch.entity_deleted(EntityId::new(2).unwrap());
        epoch.entity_changed(EntityId::new(3).unwrap(), ChangeMask::GEOMETRY);
        epoch.entity_created(EntityId::new(4).unwrap());
        epoch.doc_changed(ChangeMask::GEOMETRY);

        let flushed = epoch.flush();
        let kinds: Vec<EventType> = flushed.iter().map(|r| r.event_type).collect();
        assert_eq!(
            kinds,
            vec![
                EventType::DocChanged,
                EventType::EntityCreated,
                EventType::EntityChanged,
                EventType::EntityDeleted,
                EventType::LayerChanged,
                EventType::SelectionChanged,
                EventType::OrderChanged,
                EventType::HistoryChanged,
            ]
        );
    }

    #[test]
    fn overflow_collapses_pending_records_to_one_event() {
        let mut ring = EventRing::new(2);
        let mut epoch = EpochAccumulator::new();
        epoch.entity_created(EntityId::new(1).unwrap());
        epoch.entity_created(EntityId::new(2).unwrap());
        epoch.entity_created(EntityId::new(3).unwrap());
        ring.push_epoch(epoch.flush(), 42);
        assert!(ring.is_overflowed());
        assert_eq!(ring.poll(10).len(), 1);
        assert_eq!(ring.poll(10)[0].event_type, EventType::Overflow);
    }

    #[test]
    fn ack_resync_clears_overflow_for_matching_generation() {
        let mut ring = EventRing::new(1);
        let mut epoch = EpochAccumulator::new();
        epoch.entity_created(EntityId::new(1).unwrap());
        epoch.entity_created(EntityId::new(2).unwrap());
        ring.push_epoch(epoch.flush(), 7);
        assert!(ring.is_overflowed());
        ring.ack_resync(99);
        assert!(ring.is_overflowed(), "wrong generation must not clear overflow");
        ring.ack_resync(7);
        assert!(!ring.is_overflowed());
    }
}
