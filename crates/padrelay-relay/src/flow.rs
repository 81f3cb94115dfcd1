//! One-directional forwarding between two endpoints.

use std::fmt;

use padrelay_config::PaddingRange;
use padrelay_tls::{EndpointReader, EndpointWriter, Session};
use tracing::trace;

use crate::error::FlowError;
use crate::padding;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Origin to destination.
    NearToFar,
    /// Destination to origin.
    FarToNear,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::NearToFar => "near->far",
            Direction::FarToNear => "far->near",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Copy chunks of at most `buffer_size` bytes from `source` to `sink` until
/// end of stream, returning the number of payload bytes forwarded.
///
/// With `padding` set every chunk is sent range-padded, otherwise plain.
/// Teardown is left to the caller, which learns from the error variant which
/// side failed.
pub async fn forward<R, W>(
    direction: Direction,
    source: &mut EndpointReader<R>,
    sink: &mut EndpointWriter<W>,
    buffer_size: usize,
    padding: Option<PaddingRange>,
) -> Result<u64, FlowError>
where
    R: Session,
    W: Session,
{
    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut total = 0u64;
    loop {
        let n = source.read_chunk(&mut buf).await.map_err(FlowError::Reader)?;
        if n == 0 {
            trace!(direction = %direction, bytes = total, "end of stream");
            return Ok(total);
        }
        let chunk = &buf[..n];
        let written = match padding {
            Some(range) => {
                let (low, high) = padding::effective_range(n, range);
                sink.write_padded(chunk, low, high).await
            }
            None => sink.write_plain(chunk).await,
        };
        written.map_err(FlowError::Writer)?;
        total += n as u64;
        trace!(direction = %direction, bytes = n, "forwarded");
    }
}
