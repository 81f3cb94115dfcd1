//! In-memory sessions for tests.

use std::io;
use std::net::Shutdown;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};

use rustls::pki_types::CertificateDer;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

use crate::length_hiding::LENGTH_HIDING_ALPN;
use crate::session::{Role, Session};

/// Records the teardown calls a [`MemorySession`] received.
#[derive(Debug, Default)]
pub struct SessionLog {
    close_notifies: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl SessionLog {
    pub fn close_notifies(&self) -> usize {
        self.close_notifies.load(Ordering::Acquire)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::Acquire)
    }
}

/// A session over an in-memory duplex pipe. Bytes are not encrypted.
pub struct MemorySession {
    io: DuplexStream,
    role: Role,
    alpn: Option<Vec<u8>>,
    log: Arc<SessionLog>,
}

/// Create a session plus the raw peer end of its pipe.
pub fn memory_session(
    role: Role,
    length_hiding: bool,
) -> (MemorySession, DuplexStream, Arc<SessionLog>) {
    let (io, peer) = tokio::io::duplex(64 * 1024);
    let log = Arc::new(SessionLog::default());
    let session = MemorySession {
        io,
        role,
        alpn: length_hiding.then(|| LENGTH_HIDING_ALPN.to_vec()),
        log: log.clone(),
    };
    (session, peer, log)
}

impl AsyncRead for MemorySession {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_read(cx, buf)
    }
}

impl AsyncWrite for MemorySession {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.io).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_shutdown(cx)
    }
}

impl Session for MemorySession {
    fn role(&self) -> Role {
        self.role
    }

    fn send_close_notify(&mut self) {
        self.log.close_notifies.fetch_add(1, Ordering::AcqRel);
    }

    fn peer_certificates(&self) -> Option<&[CertificateDer<'static>]> {
        None
    }

    fn alpn_protocol(&self) -> Option<&[u8]> {
        self.alpn.as_deref()
    }

    fn shutdown_transport(&self, _how: Shutdown) -> io::Result<()> {
        self.log.shutdowns.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}
