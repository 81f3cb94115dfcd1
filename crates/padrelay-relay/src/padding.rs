//! Padding policy.
//!
//! A write of `L` bytes padded by `p` produces units of length `L + p`, so a
//! negative `low` could ask for a unit of zero or negative length. The floor
//! `1 - L` keeps every unit at least one byte long.

use padrelay_config::PaddingRange;

/// Bounds actually used for a write of `len` bytes: `(max(low, 1 - len), high)`.
///
/// For `len == 0` with `high <= 0` the result has `low > high`; the send
/// primitive then pads by exactly `low`.
pub fn effective_range(len: usize, range: PaddingRange) -> (i64, i64) {
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let floor = 1 - len;
    (i64::from(range.low).max(floor), i64::from(range.high))
}
