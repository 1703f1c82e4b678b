//! JSONL telemetry, emitted to stdout when the `telemetry` feature is on.
//!
//! Mirrors the teacher crate's `telemetry` module shape: one `Event`
//! struct per call site, serialized with `serde_json` and written as a
//! single line. Off by default; callers pay nothing unless the feature
//! is enabled.

use serde::Serialize;

#[derive(Serialize)]
struct ApplyEvent {
    timestamp_micros: u128,
    event: &'static str,
    generation: u32,
    elapsed_ms: u32,
    ok: bool,
}

#[derive(Serialize)]
struct HistoryEvent {
    timestamp_micros: u128,
    event: &'static str,
    generation: u32,
    entry_count: u32,
}

#[derive(Serialize)]
struct OverflowEvent {
    timestamp_micros: u128,
    event: &'static str,
    generation: u32,
}

fn ts_micros() -> u128 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_micros()).unwrap_or(0)
}

fn emit<T: Serialize>(value: &T) {
    // Intentionally ignore errors; stdout is best-effort telemetry.
    let _ = serde_json::to_writer(std::io::stdout(), value);
    let _ = std::io::Write::write_all(&mut std::io::stdout(), b"\n");
}

pub fn apply(generation: u32, elapsed_ms: u32, ok: bool) {
    emit(&ApplyEvent {
        timestamp_micros: ts_micros(),
        event: "apply_commands",
        generation,
        elapsed_ms,
        ok,
    });
}

pub fn history_entry(generation: u32, entry_count: u32) {
    emit(&HistoryEvent {
        timestamp_micros: ts_micros(),
        event: "history_entry",
        generation,
        entry_count,
    });
}

pub fn event_overflow(generation: u32) {
    emit(&OverflowEvent {
        timestamp_micros: ts_micros(),
        event: "event_overflow",
        generation,
    });
}
