//! Tessellation error taxonomy.

use thiserror::Error;

/// Errors raised while rebuilding render or overlay buffers.
///
/// Tessellation itself never fails on a per-entity basis — a degenerate
/// polygon or zero-length stroke simply contributes no vertices, per the
/// "non-NaN, non-infinite for all finite inputs" requirement. The one
/// real failure mode is a caller-supplied parameter that would poison
/// every entity's output (an invalid view scale divides the chord
/// tolerance by zero or a negative number).
#[derive(Debug, Clone, Copy, Error, PartialEq)]
pub enum TessError {
    /// `view_scale` was not finite and positive; the chord-tolerance
    /// computation (`tolerance_px / view_scale`) would not be either.
    #[error("invalid view scale {view_scale}: must be finite and positive")]
    InvalidViewScale { view_scale: f32 },
}
