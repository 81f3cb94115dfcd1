//! Length-hiding units.
//!
//! Once both peers agree on [`LENGTH_HIDING_ALPN`], every application-data
//! write on the session carries one or more units:
//!
//! ```text
//! +-------------+-------------+---------+----------------+
//! | payload_len | padding_len | payload | padding (zero) |
//! |  u16 (BE)   |  u16 (BE)   |         |                |
//! +-------------+-------------+---------+----------------+
//! ```
//!
//! The length of a unit is `payload_len + padding_len`; the four header
//! bytes are a fixed overhead and not counted.

use std::io;

use bytes::{BufMut, BytesMut};
use rand::Rng;
use tokio::io::{AsyncRead, AsyncReadExt};

/// ALPN protocol id both peers must agree on to use length hiding.
pub const LENGTH_HIDING_ALPN: &[u8] = b"lh/1";

pub const UNIT_HEADER_LEN: usize = 4;
pub const MAX_UNIT_PAYLOAD: usize = u16::MAX as usize;
pub const MAX_UNIT_PADDING: usize = u16::MAX as usize;

/// Pick the unit length for a write of `len` bytes.
///
/// `p` is drawn uniformly from `[low, high]`; when `low > high` the range is
/// empty and `low` is used as is. The result is `len + p`, never below one.
pub fn target_unit_len<R: Rng + ?Sized>(len: usize, low: i64, high: i64, rng: &mut R) -> usize {
    let p = if low > high {
        low
    } else {
        rng.gen_range(low..=high)
    };
    let target = i64::try_from(len).unwrap_or(i64::MAX).saturating_add(p);
    usize::try_from(target.max(1)).unwrap_or(usize::MAX)
}

/// Split `data` into `(payload, padding_len)` pairs of length `unit_len`.
///
/// A target at least as long as `data` yields one unit padded up to it; a
/// shorter target yields `ceil(len / unit_len)` units of exactly `unit_len`,
/// the last one padded. Empty data still yields one (all padding) unit.
pub fn units(data: &[u8], unit_len: usize) -> impl Iterator<Item = (&[u8], usize)> + '_ {
    let unit_len = unit_len.max(1);
    let step = unit_len.min(MAX_UNIT_PAYLOAD);
    let empty = data
        .is_empty()
        .then_some((&data[..0], unit_len.min(MAX_UNIT_PADDING)));
    data.chunks(step)
        .map(move |chunk| (chunk, (unit_len - chunk.len()).min(MAX_UNIT_PADDING)))
        .chain(empty)
}

/// Append one unit to `out`.
pub fn encode_unit(payload: &[u8], padding: usize, out: &mut BytesMut) {
    debug_assert!(payload.len() <= MAX_UNIT_PAYLOAD);
    debug_assert!(padding <= MAX_UNIT_PADDING);
    out.reserve(UNIT_HEADER_LEN + payload.len() + padding);
    out.put_u16(payload.len() as u16);
    out.put_u16(padding as u16);
    out.extend_from_slice(payload);
    out.put_bytes(0, padding);
}

/// Append every unit of `data` at `unit_len` to `out`.
pub fn encode_units(data: &[u8], unit_len: usize, out: &mut BytesMut) {
    for (payload, padding) in units(data, unit_len) {
        encode_unit(payload, padding, out);
    }
}

/// Incremental unit reader.
///
/// State survives between calls, so a read that returns early never loses
/// the position within a unit.
#[derive(Debug, Default)]
pub struct UnitDecoder {
    header: [u8; UNIT_HEADER_LEN],
    header_filled: usize,
    payload_left: usize,
    padding_left: usize,
}

impl UnitDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read payload bytes into `buf`, stripping headers and padding.
    ///
    /// Returns `Ok(0)` only on end of stream at a unit boundary. End of
    /// stream inside a unit is `UnexpectedEof`.
    pub async fn read<R>(&mut self, io: &mut R, buf: &mut [u8]) -> io::Result<usize>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.payload_left > 0 {
                let want = buf.len().min(self.payload_left);
                let n = io.read(&mut buf[..want]).await?;
                if n == 0 {
                    return Err(truncated());
                }
                self.payload_left -= n;
                return Ok(n);
            }

            if self.padding_left > 0 {
                let mut sink = [0u8; 512];
                let want = sink.len().min(self.padding_left);
                let n = io.read(&mut sink[..want]).await?;
                if n == 0 {
                    return Err(truncated());
                }
                self.padding_left -= n;
                continue;
            }

            while self.header_filled < UNIT_HEADER_LEN {
                let n = io.read(&mut self.header[self.header_filled..]).await?;
                if n == 0 {
                    if self.header_filled == 0 {
                        return Ok(0);
                    }
                    return Err(truncated());
                }
                self.header_filled += n;
            }
            self.header_filled = 0;
            self.payload_left = u16::from_be_bytes([self.header[0], self.header[1]]) as usize;
            self.padding_left = u16::from_be_bytes([self.header[2], self.header[3]]) as usize;
        }
    }

    /// True when no unit is partially consumed.
    #[cfg(test)]
    fn at_boundary(&self) -> bool {
        self.header_filled == 0 && self.payload_left == 0 && self.padding_left == 0
    }
}

fn truncated() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "truncated length-hiding unit")
}
