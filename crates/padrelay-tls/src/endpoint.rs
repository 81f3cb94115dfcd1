//! Established sessions and their reader / writer halves.
//!
//! An [`Endpoint`] is split once, after establishment, into an
//! [`EndpointReader`] and an [`EndpointWriter`]. Both halves share the session
//! behind a mutex that is only held for the duration of a single poll, so a
//! read blocked on the network never holds up a write.
//!
//! Teardown is three separate, idempotent, best-effort operations:
//! close-notify (queue and flush a TLS close_notify alert), shutdown (shut the
//! TCP transport down in both directions) and close (mark the endpoint closed;
//! later writes fail with `NotConnected`).

use std::future::poll_fn;
use std::io;
use std::net::Shutdown;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};

use bytes::BytesMut;
use parking_lot::Mutex;
use rustls::pki_types::CertificateDer;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tracing::trace;

use crate::length_hiding::{self, LENGTH_HIDING_ALPN, UnitDecoder};
use crate::session::{Role, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Established,
    /// close-notify or shutdown issued, close not yet called.
    Closing,
    Closed,
}

#[derive(Debug)]
struct Status {
    role: Role,
    state: Mutex<EndpointState>,
    close_notify_sent: AtomicBool,
    transport_shut: AtomicBool,
    close_calls: AtomicUsize,
}

impl Status {
    fn state(&self) -> EndpointState {
        *self.state.lock()
    }

    fn begin_closing(&self) {
        let mut state = self.state.lock();
        if *state == EndpointState::Established {
            *state = EndpointState::Closing;
        }
    }
}

struct Shared<S> {
    session: Mutex<S>,
    length_hiding: bool,
    status: Arc<Status>,
}

impl<S: Session> Shared<S> {
    async fn close_notify(&self) -> io::Result<()> {
        if self.status.state() == EndpointState::Closed {
            return Ok(());
        }
        if !self.status.close_notify_sent.swap(true, Ordering::AcqRel) {
            self.status.begin_closing();
            self.session.lock().send_close_notify();
            trace!(role = self.status.role.as_str(), "close_notify queued");
        }
        poll_fn(|cx| Pin::new(&mut *self.session.lock()).poll_flush(cx)).await
    }

    fn shutdown(&self) -> io::Result<()> {
        self.status.begin_closing();
        if self.status.transport_shut.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.session.lock().shutdown_transport(Shutdown::Both)
    }

    fn close(&self) {
        self.status.close_calls.fetch_add(1, Ordering::AcqRel);
        *self.status.state.lock() = EndpointState::Closed;
    }
}

/// Per-poll locking view of the shared session.
struct SharedIo<S>(Arc<Shared<S>>);

impl<S: Session> AsyncRead for SharedIo<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut session = self.0.session.lock();
        Pin::new(&mut *session).poll_read(cx, buf)
    }
}

impl<S: Session> AsyncWrite for SharedIo<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.0.status.state() == EndpointState::Closed {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "endpoint closed",
            )));
        }
        let mut session = self.0.session.lock();
        Pin::new(&mut *session).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut session = self.0.session.lock();
        Pin::new(&mut *session).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut session = self.0.session.lock();
        Pin::new(&mut *session).poll_shutdown(cx)
    }
}

/// An established TLS session, before it is split for forwarding.
pub struct Endpoint<S> {
    shared: Arc<Shared<S>>,
}

impl<S: Session> Endpoint<S> {
    pub fn new(session: S) -> Self {
        let role = session.role();
        let length_hiding = session.alpn_protocol() == Some(LENGTH_HIDING_ALPN);
        Self {
            shared: Arc::new(Shared {
                session: Mutex::new(session),
                length_hiding,
                status: Arc::new(Status {
                    role,
                    state: Mutex::new(EndpointState::Established),
                    close_notify_sent: AtomicBool::new(false),
                    transport_shut: AtomicBool::new(false),
                    close_calls: AtomicUsize::new(0),
                }),
            }),
        }
    }

    /// Whether both peers agreed to use length hiding on this session.
    pub fn can_use_length_hiding(&self) -> bool {
        self.shared.length_hiding
    }

    pub fn peer_certificates(&self) -> Vec<CertificateDer<'static>> {
        self.shared
            .session
            .lock()
            .peer_certificates()
            .map(<[_]>::to_vec)
            .unwrap_or_default()
    }

    pub fn monitor(&self) -> EndpointMonitor {
        EndpointMonitor {
            status: self.shared.status.clone(),
        }
    }

    /// Abort path: shut the transport down and close, without close-notify.
    pub fn release(self) {
        if let Err(e) = self.shared.shutdown() {
            trace!(role = self.shared.status.role.as_str(), error = %e, "shutdown during release failed");
        }
        self.shared.close();
    }

    pub fn into_halves(self) -> (EndpointReader<S>, EndpointWriter<S>) {
        let decoder = self.shared.length_hiding.then(UnitDecoder::new);
        (
            EndpointReader {
                io: SharedIo(self.shared.clone()),
                decoder,
            },
            EndpointWriter {
                io: SharedIo(self.shared),
                scratch: BytesMut::new(),
            },
        )
    }
}

/// Read half of an endpoint.
pub struct EndpointReader<S> {
    io: SharedIo<S>,
    decoder: Option<UnitDecoder>,
}

impl<S: Session> EndpointReader<S> {
    /// Read the next chunk of application data. `Ok(0)` means end of stream.
    ///
    /// On a length-hiding session headers and padding are stripped.
    pub async fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.decoder {
            Some(decoder) => decoder.read(&mut self.io, buf).await,
            None => tokio::io::AsyncReadExt::read(&mut self.io, buf).await,
        }
    }

    pub fn monitor(&self) -> EndpointMonitor {
        EndpointMonitor {
            status: self.io.0.status.clone(),
        }
    }
}

/// Write half of an endpoint. The only handle able to write, shut down or
/// close, so a single task owns the transport's write side.
pub struct EndpointWriter<S> {
    io: SharedIo<S>,
    scratch: BytesMut,
}

impl<S: Session> EndpointWriter<S> {
    /// Send `data` unpadded. On a length-hiding session this is a single
    /// unit with no padding.
    pub async fn write_plain(&mut self, data: &[u8]) -> io::Result<()> {
        if self.io.0.length_hiding {
            self.scratch.clear();
            length_hiding::encode_units(data, data.len(), &mut self.scratch);
            self.io.write_all(&self.scratch).await?;
        } else {
            self.io.write_all(data).await?;
        }
        self.io.flush().await
    }

    /// Send `data` padded by an amount drawn from `[low, high]`.
    ///
    /// Each unit goes out as its own flushed write.
    pub async fn write_padded(&mut self, data: &[u8], low: i64, high: i64) -> io::Result<()> {
        if !self.io.0.length_hiding {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "length hiding not negotiated",
            ));
        }
        let unit_len = length_hiding::target_unit_len(data.len(), low, high, &mut rand::thread_rng());
        for (payload, padding) in length_hiding::units(data, unit_len) {
            self.scratch.clear();
            length_hiding::encode_unit(payload, padding, &mut self.scratch);
            self.io.write_all(&self.scratch).await?;
            self.io.flush().await?;
        }
        Ok(())
    }

    pub async fn close_notify(&mut self) -> io::Result<()> {
        self.io.0.close_notify().await
    }

    pub fn shutdown(&mut self) -> io::Result<()> {
        self.io.0.shutdown()
    }

    pub fn close(&mut self) {
        self.io.0.close();
    }
}

/// Read-only view of an endpoint's teardown progress.
#[derive(Debug, Clone)]
pub struct EndpointMonitor {
    status: Arc<Status>,
}

impl EndpointMonitor {
    pub fn state(&self) -> EndpointState {
        self.status.state()
    }

    pub fn close_notify_sent(&self) -> bool {
        self.status.close_notify_sent.load(Ordering::Acquire)
    }

    pub fn transport_shut(&self) -> bool {
        self.status.transport_shut.load(Ordering::Acquire)
    }

    /// Number of times close has been called. One after an orderly teardown.
    pub fn close_calls(&self) -> usize {
        self.status.close_calls.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::length_hiding::UNIT_HEADER_LEN;
    use crate::testing::memory_session;

    #[tokio::test]
    async fn plain_session_passes_bytes_through() {
        let (session, mut peer, _log) = memory_session(Role::Server, false);
        let endpoint = Endpoint::new(session);
        assert!(!endpoint.can_use_length_hiding());
        let (mut reader, mut writer) = endpoint.into_halves();

        writer.write_plain(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        peer.write_all(b"pong").await.unwrap();
        let n = reader.read_chunk(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"pong");
    }

    #[tokio::test]
    async fn padded_write_emits_units_within_range() {
        let (session, mut peer, _log) = memory_session(Role::Client, true);
        let endpoint = Endpoint::new(session);
        assert!(endpoint.can_use_length_hiding());
        let (_reader, mut writer) = endpoint.into_halves();

        for _ in 0..50 {
            writer.write_padded(b"GET /\r\n\r\n", 5, 10).await.unwrap();
            let mut header = [0u8; UNIT_HEADER_LEN];
            peer.read_exact(&mut header).await.unwrap();
            let payload = u16::from_be_bytes([header[0], header[1]]) as usize;
            let padding = u16::from_be_bytes([header[2], header[3]]) as usize;
            assert_eq!(payload, 9);
            assert!((14..=19).contains(&(payload + padding)));
            let mut body = vec![0u8; payload + padding];
            peer.read_exact(&mut body).await.unwrap();
            assert_eq!(&body[..9], b"GET /\r\n\r\n");
        }
    }

    #[tokio::test]
    async fn padded_write_requires_length_hiding() {
        let (session, _peer, _log) = memory_session(Role::Client, false);
        let (_reader, mut writer) = Endpoint::new(session).into_halves();
        let err = writer.write_padded(b"x", 0, 0).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn reader_decodes_units() {
        let (session, mut peer, _log) = memory_session(Role::Server, true);
        let (mut reader, _writer) = Endpoint::new(session).into_halves();

        let mut wire = BytesMut::new();
        length_hiding::encode_units(b"hello", 2, &mut wire);
        peer.write_all(&wire).await.unwrap();
        drop(peer);

        let mut out = Vec::new();
        let mut buf = [0u8; 16];
        loop {
            let n = reader.read_chunk(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn teardown_is_idempotent() {
        let (session, _peer, log) = memory_session(Role::Server, false);
        let endpoint = Endpoint::new(session);
        let monitor = endpoint.monitor();
        let (_reader, mut writer) = endpoint.into_halves();

        assert_eq!(monitor.state(), EndpointState::Established);
        writer.close_notify().await.unwrap();
        writer.close_notify().await.unwrap();
        assert_eq!(monitor.state(), EndpointState::Closing);
        assert_eq!(log.close_notifies(), 1);

        writer.shutdown().unwrap();
        writer.shutdown().unwrap();
        assert_eq!(log.shutdowns(), 1);

        writer.close();
        assert_eq!(monitor.state(), EndpointState::Closed);
        assert_eq!(monitor.close_calls(), 1);

        // after close everything is a no-op, writes fail
        writer.close_notify().await.unwrap();
        let err = writer.write_plain(b"late").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn release_skips_close_notify() {
        let (session, _peer, log) = memory_session(Role::Client, false);
        let endpoint = Endpoint::new(session);
        let monitor = endpoint.monitor();
        endpoint.release();
        assert_eq!(log.close_notifies(), 0);
        assert_eq!(log.shutdowns(), 1);
        assert_eq!(monitor.state(), EndpointState::Closed);
        assert_eq!(monitor.close_calls(), 1);
    }
}
