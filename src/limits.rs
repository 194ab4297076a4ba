//! Hard bounds. Everything user- or network-supplied is checked against
//! these before it can grow engine state.

/// Widest visible window a grid may be loaded for (inclusive days).
pub const MAX_WINDOW_DAYS: usize = 366;

/// Most rooms one grid session will index.
pub const MAX_ROOMS_PER_GRID: usize = 500;

/// Widest date span a single bulk selection may cover.
pub const MAX_BULK_SPAN_DAYS: usize = 62;

/// Most rooms one bulk selection may target.
pub const MAX_BULK_ROOMS: usize = 100;

/// Upper bound for a minimum-stay restriction (nights).
pub const MAX_MIN_STAY: u32 = 30;

/// Upper bound for a nightly rate override.
pub const MAX_NIGHTLY_RATE: f64 = 100_000.0;

/// Guest names longer than this are truncated for span labels.
pub const MAX_GUEST_NAME_LEN: usize = 120;

/// Remote error messages are truncated before being attached to a cell.
pub const MAX_SYNC_ERROR_LEN: usize = 512;

/// Truncate in place to at most `max` bytes, never splitting a UTF-8
/// character.
pub fn truncate_utf8(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}
