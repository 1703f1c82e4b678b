//! End-to-end scenarios driving [`DocEngine`] the way an external host
//! would: raw command buffers in, transform gestures, undo/redo, and the
//! event/overflow/resync cycle.

use docengine_core::command::CommandOp;
use docengine_core::constants::{COMMAND_MAGIC, COMMAND_VERSION};
use docengine_core::error::ErrorKind;
use docengine_core::events::EventType;
use docengine_core::ident::EntityId;
use docengine_core::protocol::{SelectionMode, SelectionModifier};
use docengine_core::session::{SnapPolicy, TransformMode};
use docengine_core::DocEngine;
use docengine_geom::Vec2;

const ENTITY_FLAG_VISIBLE: u32 = 1;

fn command_buffer(records: &[(u32, u32, Vec<u8>)]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&COMMAND_MAGIC.to_le_bytes());
    buf.extend_from_slice(&COMMAND_VERSION.to_le_bytes());
    buf.extend_from_slice(&(records.len() as u32).to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());
    for (op, id, payload) in records {
        buf.extend_from_slice(&op.to_le_bytes());
        buf.extend_from_slice(&id.to_le_bytes());
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(payload);
        while buf.len() % 4 != 0 {
            buf.push(0);
        }
    }
    buf
}

fn rect_payload(
    x: f32,
    y: f32,
    w: f32,
    h: f32,
    fill: (f32, f32, f32, f32),
    stroke_enabled: u32,
    stroke_width: f32,
    stroke: (f32, f32, f32, f32),
) -> Vec<u8> {
    let mut v = Vec::new();
    v.extend_from_slice(&1u32.to_le_bytes()); // layer_id
    v.extend_from_slice(&ENTITY_FLAG_VISIBLE.to_le_bytes());
    for f in [x, y, w, h] {
        v.extend_from_slice(&f.to_le_bytes());
    }
    for c in [fill.0, fill.1, fill.2, fill.3] {
        v.extend_from_slice(&c.to_le_bytes());
    }
    for c in [stroke.0, stroke.1, stroke.2, stroke.3] {
        v.extend_from_slice(&c.to_le_bytes());
    }
    v.extend_from_slice(&stroke_enabled.to_le_bytes());
    v.extend_from_slice(&stroke_width.to_le_bytes());
    v.extend_from_slice(&0u32.to_le_bytes());
    v.extend_from_slice(&0u32.to_le_bytes());
    v
}

fn upsert_rect_buffer(id: u32, x: f32, y: f32, w: f32, h: f32) -> Vec<u8> {
    command_buffer(&[(
        CommandOp::UpsertRect.tag(),
        id,
        rect_payload(x, y, w, h, (1.0, 0.5, 0.0, 1.0), 0, 0.0, (0.0, 0.0, 0.0, 0.0)),
    )])
}

/// 1. A cleared document gets one rect; the tessellated buffers carry
/// exactly the fill/stroke triangle counts a single stroked quad
/// produces.
#[test]
fn scenario_clear_then_upsert_rect_yields_expected_triangle_counts() {
    let mut engine = DocEngine::new();
    let buf = command_buffer(&[
        (CommandOp::ClearAll.tag(), 0, Vec::new()),
        (
            CommandOp::UpsertRect.tag(),
            10,
            rect_payload(100.0, 100.0, 20.0, 20.0, (1.0, 0.5, 0.0, 1.0), 1, 2.0, (0.0, 1.0, 0.0, 1.0)),
        ),
    ]);

    engine.apply_commands(&buf).unwrap();
    assert_eq!(engine.store().len(), 1);

    let buffers = docengine_tess::rebuild(&engine, docengine_tess::DEFAULT_TOLERANCE_PX).unwrap();
    assert_eq!(buffers.fill.len(), 6);
    assert_eq!(buffers.stroke.len(), 24);
    assert_eq!(buffers.fill.len() + buffers.stroke.len(), 30);
}

/// 2. A buffer with a bad magic number is rejected wholesale: the
/// generation does not move and the timing field stays at its reset
/// value since no mutation took effect.
#[test]
fn scenario_bad_magic_is_rejected_without_mutating_generation() {
    let mut engine = DocEngine::new();
    let generation_before = engine.generation();

    let mut buf = command_buffer(&[(CommandOp::ClearAll.tag(), 0, Vec::new())]);
    buf[0..4].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());

    let result = engine.apply_commands(&buf);
    assert!(result.is_err());
    assert_ne!(engine.last_error_kind(), ErrorKind::Ok);
    assert_eq!(engine.generation(), generation_before);
    assert_eq!(engine.last_apply_ms(), 0);
}

/// 3. A committed move produces one history entry and a digest change;
/// undo restores the original digest exactly.
#[test]
fn scenario_move_commits_one_history_entry_and_undo_restores_digest() {
    let mut engine = DocEngine::new();
    engine.apply_commands(&upsert_rect_buffer(1, 0.0, 0.0, 10.0, 10.0)).unwrap();
    let id = EntityId::new(1).unwrap();
    let digest_before = engine.digest();

    let started = engine.begin_transform(
        &[id],
        TransformMode::Move,
        None,
        0,
        Vec2::new(0.0, 0.0),
        Vec2::new(0.0, 0.0),
        1.0,
        Vec2::new(800.0, 600.0),
        SelectionModifier(0),
    );
    assert!(started);
    engine.update_transform(Vec2::new(5.0, 0.0), SelectionModifier(0));
    engine.commit_transform();

    assert_eq!(engine.store().get_rect(id).unwrap().x, 5.0);
    assert_ne!(engine.digest(), digest_before);
    assert!(engine.can_undo());

    engine.undo().unwrap();
    assert_eq!(engine.digest(), digest_before);
}

/// 4. A move near another entity snaps to its nearest feature within
/// tolerance.
#[test]
fn scenario_move_snaps_to_nearby_entity_within_tolerance() {
    let mut engine = DocEngine::new();
    engine.apply_commands(&upsert_rect_buffer(1, 0.0, 0.0, 10.0, 10.0)).unwrap();
    engine.apply_commands(&upsert_rect_buffer(2, 30.0, 0.0, 10.0, 10.0)).unwrap();
    let id1 = EntityId::new(1).unwrap();

    engine.set_selection(&[id1], SelectionMode::Replace);
    engine.set_snap_policy(SnapPolicy {
        enabled: true,
        grid_enabled: false,
        grid_size: 10.0,
        tolerance_px: 5.0,
        endpoint: true,
        midpoint: false,
        center: false,
        nearest: false,
    });

    engine.begin_transform(
        &[id1],
        TransformMode::Move,
        None,
        0,
        Vec2::new(0.0, 0.0),
        Vec2::new(0.0, 0.0),
        1.0,
        Vec2::new(800.0, 600.0),
        SelectionModifier(0),
    );
    engine.update_transform(Vec2::new(19.0, 0.0), SelectionModifier(0));
    engine.commit_transform();

    assert_eq!(engine.store().get_rect(id1).unwrap().x, 20.0);
}

/// 5. Creating enough entities to overflow the event ring collapses
/// everything pending into a single `Overflow` event; acking its resync
/// generation clears the overflow.
#[test]
fn scenario_event_ring_overflow_then_resync() {
    let mut engine = DocEngine::new();
    for i in 1..=3000u32 {
        engine.apply_commands(&upsert_rect_buffer(i, 0.0, 0.0, 10.0, 10.0)).unwrap();
    }

    assert!(engine.is_event_stream_overflowed());
    let pending = engine.poll_events(1024);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].event_type, EventType::Overflow);
    let resync_generation = u64::from(pending[0].a) | (u64::from(pending[0].b) << 32);

    engine.ack_resync(resync_generation);
    assert!(!engine.is_event_stream_overflowed());
    assert!(engine.poll_events(1024).is_empty());
}

/// 6. Alt+drag duplicates the selection; undo removes the duplicate and
/// restores the sole original selection.
#[test]
fn scenario_alt_drag_duplicates_then_undo_restores_original_selection() {
    let mut engine = DocEngine::new();
    engine.apply_commands(&upsert_rect_buffer(1, 0.0, 0.0, 10.0, 10.0)).unwrap();
    let id1 = EntityId::new(1).unwrap();
    engine.set_selection(&[id1], SelectionMode::Replace);

    engine.begin_transform(
        &[id1],
        TransformMode::Move,
        None,
        0,
        Vec2::new(0.0, 0.0),
        Vec2::new(0.0, 0.0),
        1.0,
        Vec2::new(800.0, 600.0),
        SelectionModifier::ALT,
    );
    engine.update_transform(Vec2::new(10.0, 0.0), SelectionModifier::ALT);
    engine.commit_transform();

    assert_eq!(engine.store().len(), 2);
    let selection = engine.store().selection().to_vec();
    assert_eq!(selection.len(), 1);
    assert_ne!(selection[0], id1);
    let duplicate_id = selection[0];

    assert_eq!(engine.store().get_rect(id1).unwrap().x, 0.0);
    assert_eq!(engine.store().get_rect(duplicate_id).unwrap().x, 10.0);

    engine.undo().unwrap();
    assert!(!engine.store().is_live(duplicate_id));
    assert_eq!(engine.store().selection(), &[id1]);
}
