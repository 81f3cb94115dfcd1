//! The capabilities an endpoint needs from an established TLS session.

use std::io;
use std::net::Shutdown;

use rustls::pki_types::CertificateDer;
use socket2::SockRef;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Session facing the origin; the relay is the TLS server.
pub type NearSession = tokio_rustls::server::TlsStream<TcpStream>;
/// Session facing the destination; the relay is the TLS client.
pub type FarSession = tokio_rustls::client::TlsStream<TcpStream>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Server => "server",
            Role::Client => "client",
        }
    }
}

/// An established TLS session over a stream transport.
pub trait Session: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    fn role(&self) -> Role;

    /// Queue a TLS close_notify alert. It is written on the next flush.
    fn send_close_notify(&mut self);

    /// Certificate chain presented by the peer, end entity first.
    fn peer_certificates(&self) -> Option<&[CertificateDer<'static>]>;

    /// ALPN protocol agreed during the handshake.
    fn alpn_protocol(&self) -> Option<&[u8]>;

    /// Shut down the underlying transport without touching TLS state.
    fn shutdown_transport(&self, how: Shutdown) -> io::Result<()>;
}

impl Session for NearSession {
    fn role(&self) -> Role {
        Role::Server
    }

    fn send_close_notify(&mut self) {
        self.get_mut().1.send_close_notify();
    }

    fn peer_certificates(&self) -> Option<&[CertificateDer<'static>]> {
        self.get_ref().1.peer_certificates()
    }

    fn alpn_protocol(&self) -> Option<&[u8]> {
        self.get_ref().1.alpn_protocol()
    }

    fn shutdown_transport(&self, how: Shutdown) -> io::Result<()> {
        SockRef::from(self.get_ref().0).shutdown(how)
    }
}

impl Session for FarSession {
    fn role(&self) -> Role {
        Role::Client
    }

    fn send_close_notify(&mut self) {
        self.get_mut().1.send_close_notify();
    }

    fn peer_certificates(&self) -> Option<&[CertificateDer<'static>]> {
        self.get_ref().1.peer_certificates()
    }

    fn alpn_protocol(&self) -> Option<&[u8]> {
        self.get_ref().1.alpn_protocol()
    }

    fn shutdown_transport(&self, how: Shutdown) -> io::Result<()> {
        SockRef::from(self.get_ref().0).shutdown(how)
    }
}
