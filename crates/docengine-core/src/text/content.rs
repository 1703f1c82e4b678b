//! Text content storage: UTF-8 bytes plus an ordered, range-partitioning
//! style run table.

use bytemuck::{Pod, Zeroable};

use crate::record::Rgba;

/// Style run flag bits.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RunFlags(pub u8);

impl RunFlags {
    pub const BOLD: Self = Self(1 << 0);
    pub const ITALIC: Self = Self(1 << 1);
    pub const UNDERLINE: Self = Self(1 << 2);
    pub const STRIKE: Self = Self(1 << 3);

    #[must_use]
    pub fn has(self, bit: Self) -> bool {
        self.0 & bit.0 != 0
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

impl Default for RunFlags {
    fn default() -> Self {
        Self(0)
    }
}

/// A style run over a byte range of the content.
///
/// Run ranges partition `[0, len)`, with one exception: a permitted
/// zero-length "typing" run at the caret, carrying the pending style for
/// the next inserted byte.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct StyleRun {
    pub start_byte: u32,
    pub length: u32,
    pub font_id: u32,
    pub font_size: f32,
    pub color: Rgba,
    pub flags: RunFlags,
}

impl StyleRun {
    #[must_use]
    pub fn end_byte(&self) -> u32 {
        self.start_byte + self.length
    }

    #[must_use]
    pub fn is_typing_run(&self) -> bool {
        self.length == 0
    }
}

/// Wire row for a style run, used by the snapshot codec.
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct StyleRunRow {
    pub start_byte: u32,
    pub length: u32,
    pub font_id: u32,
    pub font_size: f32,
    pub color: Rgba,
    pub flags: u32,
    pub _pad: u32,
}

impl From<StyleRun> for StyleRunRow {
    fn from(run: StyleRun) -> Self {
        Self {
            start_byte: run.start_byte,
            length: run.length,
            font_id: run.font_id,
            font_size: run.font_size,
            color: run.color,
            flags: u32::from(run.flags.0),
            _pad: 0,
        }
    }
}

impl From<StyleRunRow> for StyleRun {
    fn from(row: StyleRunRow) -> Self {
        Self {
            start_byte: row.start_byte,
            length: row.length,
            font_id: row.font_id,
            font_size: row.font_size,
            color: row.color,
            flags: RunFlags(row.flags as u8),
        }
    }
}

/// Content bytes plus its ordered style run table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextContent {
    bytes: Vec<u8>,
    runs: Vec<StyleRun>,
}

impl TextContent {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn runs(&self) -> &[StyleRun] {
        &self.runs
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Replaces the entire content and run table, used by `UpsertText`
    /// and snapshot load.
    pub fn set(&mut self, bytes: Vec<u8>, runs: Vec<StyleRun>) {
        self.bytes = bytes;
        self.runs = runs;
    }

    /// Inserts `content` at byte offset `at`, splitting or extending runs
    /// so every inserted byte belongs to exactly one run.
    ///
    /// If a zero-length typing run exists at `at`, its style is used for
    /// the inserted bytes and the typing run is consumed (extended to
    /// cover them).
    pub fn insert(&mut self, at: usize, content: &[u8]) {
        let at = at.min(self.bytes.len());
        let insert_len = content.len() as u32;

        if let Some(run_index) = self.runs.iter().position(|r| {
            r.is_typing_run() && r.start_byte as usize == at
        }) {
            self.runs[run_index].length += insert_len;
        } else if let Some(run_index) = self.run_containing_or_before(at) {
            let run = self.runs[run_index];
            if (run.start_byte as usize) < at && at < run.end_byte() as usize {
                // Splitting inside a run: both halves keep the style,
                // widen in place (no actual split needed since style is
                // uniform).
                self.runs[run_index].length += insert_len;
            } else if run.end_byte() as usize == at {
                self.runs[run_index].length += insert_len;
            } else {
                self.insert_default_run(at, insert_len);
            }
        } else {
            self.insert_default_run(at, insert_len);
        }

        for run in &mut self.runs {
            if run.start_byte as usize > at {
                run.start_byte += insert_len;
            }
        }

        self.bytes.splice(at..at, content.iter().copied());
    }

    fn insert_default_run(&mut self, at: usize, length: u32) {
        self.runs.push(StyleRun {
            start_byte: at as u32,
            length,
            font_id: 0,
            font_size: 16.0,
            color: Rgba::new(0.0, 0.0, 0.0, 1.0),
            flags: RunFlags::default(),
        });
        self.runs.sort_unstable_by_key(|r| r.start_byte);
    }

    fn run_containing_or_before(&self, byte: usize) -> Option<usize> {
        self.runs
            .iter()
            .enumerate()
            .filter(|(_, r)| (r.start_byte as usize) <= byte)
            .max_by_key(|(_, r)| r.start_byte)
            .map(|(i, _)| i)
    }

    /// Deletes `[start, end)`, shrinking/removing runs that overlap the
    /// range and shifting later runs left.
    pub fn delete(&mut self, start: usize, end: usize) {
        let start = start.min(self.bytes.len());
        let end = end.min(self.bytes.len()).max(start);
        if start == end {
            return;
        }
        let removed = (end - start) as u32;

        let mut next_runs = Vec::with_capacity(self.runs.len());
        for mut run in std::mem::take(&mut self.runs) {
            let run_start = run.start_byte as usize;
            let run_end = run.end_byte() as usize;

            if run_end <= start {
                next_runs.push(run);
                continue;
            }
            if run_start >= end {
                run.start_byte -= removed;
                next_runs.push(run);
                continue;
            }
            let overlap_start = run_start.max(start);
            let overlap_end = run_end.min(end);
            let overlap = (overlap_end - overlap_start) as u32;
            let new_length = run.length.saturating_sub(overlap);
            if new_length == 0 && !run.is_typing_run() {
                continue;
            }
            run.start_byte = run_start.min(start) as u32;
            run.length = new_length;
            next_runs.push(run);
        }
        self.runs = next_runs;
        self.bytes.drain(start..end);
    }

    /// Toggles `flags` (and optionally recolors) every run overlapping
    /// `[start, end)`, splitting runs at the range boundary as needed.
    pub fn apply_style(&mut self, start: usize, end: usize, flags: RunFlags, set: bool, color: Option<Rgba>) {
        if start >= end {
            return;
        }
        let mut next_runs = Vec::with_capacity(self.runs.len() + 2);
        for run in std::mem::take(&mut self.runs) {
            let run_start = run.start_byte as usize;
            let run_end = run.end_byte() as usize;
            if run_end <= start || run_start >= end || run.is_typing_run() {
                next_runs.push(run);
                continue;
            }

            if run_start < start {
                next_runs.push(StyleRun {
                    length: (start - run_start) as u32,
                    ..run
                });
            }

            let mid_start = run_start.max(start);
            let mid_end = run_end.min(end);
            let mut mid = StyleRun {
                start_byte: mid_start as u32,
                length: (mid_end - mid_start) as u32,
                ..run
            };
            mid.flags = mid.flags.with(flags, set);
            if let Some(color) = color {
                mid.color = color;
            }
            next_runs.push(mid);

            if run_end > end {
                next_runs.push(StyleRun {
                    start_byte: end as u32,
                    length: (run_end - end) as u32,
                    ..run
                });
            }
        }
        next_runs.sort_unstable_by_key(|r| r.start_byte);
        self.runs = next_runs;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_run(start: u32, length: u32) -> StyleRun {
        StyleRun {
            start_byte: start,
            length,
            font_id: 0,
            font_size: 16.0,
            color: Rgba::new(0.0, 0.0, 0.0, 1.0),
            flags: RunFlags::default(),
        }
    }

    #[test]
    fn insert_into_empty_creates_one_run() {
        let mut content = TextContent::new();
        content.insert(0, b"hi");
        assert_eq!(content.bytes(), b"hi");
        assert_eq!(content.runs().len(), 1);
        assert_eq!(content.runs()[0].length, 2);
    }

    #[test]
    fn insert_extends_existing_run_in_place() {
        let mut content = TextContent::new();
        content.set(b"ab".to_vec(), vec![default_run(0, 2)]);
        content.insert(2, b"cd");
        assert_eq!(content.bytes(), b"abcd");
        assert_eq!(content.runs().len(), 1);
        assert_eq!(content.runs()[0].length, 4);
    }

    #[test]
    fn delete_shrinks_overlapping_run_and_shifts_later_runs() {
        let mut content = TextContent::new();
        content.set(
            b"abcdef".to_vec(),
            vec![default_run(0, 3), default_run(3, 3)],
        );
        content.delete(1, 4);
        assert_eq!(content.bytes(), b"aef");
        assert_eq!(content.runs()[0].length, 1);
        assert_eq!(content.runs()[1].start_byte, 1);
        assert_eq!(content.runs()[1].length, 2);
    }

    #[test]
    fn apply_style_splits_run_at_range_boundary() {
        let mut content = TextContent::new();
        content.set(b"abcdef".to_vec(), vec![default_run(0, 6)]);
        content.apply_style(2, 4, RunFlags::BOLD, true, None);
        assert_eq!(content.runs().len(), 3);
        assert!(!content.runs()[0].flags.has(RunFlags::BOLD));
        assert!(content.runs()[1].flags.has(RunFlags::BOLD));
        assert!(!content.runs()[2].flags.has(RunFlags::BOLD));
    }

    #[test]
    fn typing_run_absorbs_inserted_bytes() {
        let mut content = TextContent::new();
        content.set(
            b"ab".to_vec(),
            vec![
                default_run(0, 2),
                StyleRun {
                    flags: RunFlags::BOLD,
                    ..default_run(2, 0)
                },
            ],
        );
        content.insert(2, b"X");
        assert_eq!(content.bytes(), b"abX");
        let typing = content.runs().iter().find(|r| r.start_byte == 2).unwrap();
        assert_eq!(typing.length, 1);
        assert!(typing.flags.has(RunFlags::BOLD));
    }
}
