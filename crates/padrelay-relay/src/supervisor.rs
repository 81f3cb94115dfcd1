//! Process supervisor: one listener per configured relay.

use std::net::SocketAddr;

use padrelay_config::Config;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::SupervisorError;
use crate::listener::Listener;
use crate::report::ReportLock;

/// A relay whose accept loop is running.
pub struct RunningRelay {
    pub name: String,
    pub local_addr: SocketAddr,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Registry of running relays.
pub struct Supervisor {
    relays: Vec<RunningRelay>,
}

impl Supervisor {
    /// Start a listener for every relay in name order.
    ///
    /// A relay whose listener cannot be created is reported and skipped; the
    /// others still start. Fails only when no relay started at all.
    pub async fn start(config: &Config) -> Result<Self, SupervisorError> {
        let lock = ReportLock::default();
        let mut relays = Vec::with_capacity(config.relays.len());

        for (name, relay) in &config.relays {
            let listener = match Listener::bind(name, relay.clone(), lock.clone()).await {
                Ok(listener) => listener,
                Err(e) => {
                    error!(
                        relay = %name,
                        error = %e,
                        error_type = e.error_type(),
                        "could not create relay"
                    );
                    continue;
                }
            };
            let local_addr = listener.local_addr();
            let token = CancellationToken::new();
            let handle = tokio::spawn(listener.serve(token.clone()));
            relays.push(RunningRelay {
                name: name.clone(),
                local_addr,
                token,
                handle,
            });
        }

        if relays.is_empty() {
            return Err(SupervisorError::NoRelayStarted);
        }
        info!(count = relays.len(), "relays started");
        Ok(Self { relays })
    }

    pub fn relays(&self) -> &[RunningRelay] {
        &self.relays
    }

    pub fn local_addr(&self, name: &str) -> Option<SocketAddr> {
        self.relays
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.local_addr)
    }

    /// Stop accepting on every relay. Established connections are left alone.
    pub fn shutdown(&self) {
        for relay in &self.relays {
            relay.token.cancel();
        }
    }

    /// Wait for every accept loop to return.
    pub async fn join(self) {
        for relay in self.relays {
            if let Err(e) = relay.handle.await {
                error!(relay = %relay.name, error = %e, "listener task failed");
            }
        }
    }
}
