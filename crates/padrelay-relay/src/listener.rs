//! Per-relay listening endpoint and accept loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use padrelay_config::defaults::DEFAULT_CONNECTION_BACKLOG;
use padrelay_config::{RelayConfig, validate_relay};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::connection::{FlowSettings, ended_locally};
use crate::dial;
use crate::error::ListenerError;
use crate::establish::{RelayContext, establish};
use crate::report::ReportLock;

/// Pause after a failed accept, so a persistent error such as fd exhaustion
/// does not spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// A bound relay, ready to accept origins.
pub struct Listener {
    listener: TcpListener,
    local_addr: SocketAddr,
    context: Arc<RelayContext>,
}

impl Listener {
    /// Validate `config`, build its TLS contexts and bind its listen address.
    pub async fn bind(
        name: &str,
        config: RelayConfig,
        lock: ReportLock,
    ) -> Result<Self, ListenerError> {
        validate_relay(name, &config)?;
        let context = RelayContext::new(name, config, lock)?;

        let listen = &context.config.listen_address;
        let addr = dial::resolve(listen)
            .await
            .map_err(|e| ListenerError::Address(listen.to_string(), e))?;
        let listener = create_listener(addr, DEFAULT_CONNECTION_BACKLOG)
            .map_err(|e| ListenerError::Bind(addr.to_string(), e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ListenerError::Bind(addr.to_string(), e))?;

        Ok(Self {
            listener,
            local_addr,
            context: Arc::new(context),
        })
    }

    pub fn name(&self) -> &str {
        &self.context.name
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept origins until `shutdown` is cancelled. Each accepted socket is
    /// handled on its own task, which is never awaited.
    pub async fn serve(self, shutdown: CancellationToken) {
        let relay = self.context.name.clone();
        info!(
            relay = %relay,
            listen = %self.local_addr,
            destination = %self.context.config.server_address,
            "listener started"
        );
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!(relay = %relay, "listener stopped");
                    return;
                }
                accepted = self.listener.accept() => {
                    let (tcp, peer) = match accepted {
                        Ok(v) => v,
                        Err(e) => {
                            accept_failed(&relay, &e).await;
                            continue;
                        }
                    };
                    let context = self.context.clone();
                    tokio::spawn(
                        handle_connection(tcp, context)
                            .instrument(info_span!("conn", relay = %relay, peer = %peer)),
                    );
                }
            }
        }
    }
}

async fn accept_failed(relay: &str, err: &std::io::Error) {
    warn!(relay = %relay, error = %err, "accept failed");
    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
}

async fn handle_connection(tcp: TcpStream, ctx: Arc<RelayContext>) {
    if let Err(e) = tcp.set_nodelay(true) {
        debug!(error = %e, "failed to set TCP_NODELAY");
    }
    let connection = match establish(tcp, &ctx).await {
        Ok(connection) => connection,
        Err(e) => {
            ctx.reporter
                .report("establishment failed", e.error_type(), &e);
            return;
        }
    };
    debug!("connection established");

    let (near, _) = connection.monitors();
    let settings = FlowSettings::from(&ctx.config);
    match connection.run(settings, ctx.reporter.clone()).await {
        Ok(()) => {}
        Err(e) if ended_locally(&e, &near) => {}
        Err(e) => ctx
            .reporter
            .report("forwarding failed (near->far)", e.error_type(), &e),
    }
}

/// Bind a listening socket with `SO_REUSEADDR` and the given backlog.
fn create_listener(addr: SocketAddr, backlog: u32) -> std::io::Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog as i32)?;
    TcpListener::from_std(std::net::TcpListener::from(socket))
}
