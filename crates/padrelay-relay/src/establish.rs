//! Session establishment.
//!
//! Steps run strictly in order and nothing towards the destination is
//! started before the origin's session has been accepted and checked:
//!
//! ```text
//! NearHandshake -> [NearAuth] -> [NearLengthHiding]
//!   -> DialFar -> FarHandshake -> [FarAuth] -> [FarLengthHiding]
//! ```
//!
//! Bracketed steps run only when enabled for the relay. The first failing
//! step aborts establishment; everything created so far is released before
//! the error is returned.

use std::net::Shutdown;

use padrelay_config::RelayConfig;
use padrelay_tls::{
    ClientTlsContext, Endpoint, FarSession, NearSession, ServerTlsContext, Session,
};
use socket2::SockRef;
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::connection::Connection;
use crate::dial;
use crate::error::{EstablishFailure, EstablishStep, EstablishmentError, ListenerError};
use crate::report::{FailureReporter, ReportLock};

/// Everything a relay needs to establish and run its connections.
pub struct RelayContext {
    pub name: String,
    pub config: RelayConfig,
    pub server_tls: ServerTlsContext,
    pub client_tls: ClientTlsContext,
    pub reporter: FailureReporter,
}

impl RelayContext {
    pub fn new(name: &str, config: RelayConfig, lock: ReportLock) -> Result<Self, ListenerError> {
        let server_tls = ServerTlsContext::new(
            &config.as_server,
            config.verify_client_identity,
            config.use_length_hiding_with_client,
        )?;
        let client_tls = ClientTlsContext::new(
            &config.as_client,
            config.server_name(),
            config.use_length_hiding_with_server,
        )?;
        let reporter = FailureReporter::new(name, config.suppress_exceptions, lock);
        Ok(Self {
            name: name.to_string(),
            config,
            server_tls,
            client_tls,
            reporter,
        })
    }
}

/// The steps establishment runs for `config`, in order.
pub fn plan(config: &RelayConfig) -> Vec<EstablishStep> {
    let mut steps = vec![EstablishStep::NearHandshake];
    if config.verify_client_identity {
        steps.push(EstablishStep::NearAuth);
    }
    if config.use_length_hiding_with_client {
        steps.push(EstablishStep::NearLengthHiding);
    }
    steps.push(EstablishStep::DialFar);
    steps.push(EstablishStep::FarHandshake);
    if config.verify_server_identity {
        steps.push(EstablishStep::FarAuth);
    }
    if config.use_length_hiding_with_server {
        steps.push(EstablishStep::FarLengthHiding);
    }
    steps
}

/// Establish both sessions for an accepted origin socket.
pub async fn establish(
    inbound: TcpStream,
    ctx: &RelayContext,
) -> Result<Connection<NearSession, FarSession>, EstablishmentError> {
    let mut scope = Scope {
        inbound: Some(inbound),
        near: None,
        far_tcp: None,
        far: None,
    };
    let steps = plan(&ctx.config);
    for &step in &steps {
        trace!(step = %step, "establishing");
        if let Err(kind) = scope.run(step, ctx).await {
            debug!(step = %step, error = %kind, "establishment aborted");
            scope.release();
            return Err(EstablishmentError::new(step, kind));
        }
    }
    match (scope.near.take(), scope.far.take()) {
        (Some(near), Some(far)) => Ok(Connection::new(near, far)),
        (near, far) => {
            if let Some(near) = near {
                near.release();
            }
            if let Some(far) = far {
                far.release();
            }
            let last = steps.last().copied().unwrap_or(EstablishStep::NearHandshake);
            Err(EstablishmentError::new(
                last,
                EstablishFailure::Io(std::io::Error::other("establishment incomplete")),
            ))
        }
    }
}

/// Resources created so far by an establishment in progress.
struct Scope {
    inbound: Option<TcpStream>,
    near: Option<Endpoint<NearSession>>,
    far_tcp: Option<TcpStream>,
    far: Option<Endpoint<FarSession>>,
}

impl Scope {
    async fn run(&mut self, step: EstablishStep, ctx: &RelayContext) -> Result<(), EstablishFailure> {
        match step {
            EstablishStep::NearHandshake => {
                let tcp = self.inbound.take().ok_or_else(missing)?;
                self.near = Some(ctx.server_tls.accept(tcp).await?);
            }
            EstablishStep::NearAuth => {
                let near = self.near.as_ref().ok_or_else(missing)?;
                ctx.server_tls
                    .verify_client(near)
                    .map_err(EstablishFailure::Verification)?;
            }
            EstablishStep::NearLengthHiding => {
                require_length_hiding(self.near.as_ref().ok_or_else(missing)?)?;
            }
            EstablishStep::DialFar => {
                let config = &ctx.config;
                self.far_tcp =
                    Some(dial::connect(&config.server_address, config.proxy.as_ref()).await?);
            }
            EstablishStep::FarHandshake => {
                let tcp = self.far_tcp.take().ok_or_else(missing)?;
                self.far = Some(ctx.client_tls.connect(tcp).await?);
            }
            EstablishStep::FarAuth => {
                let far = self.far.as_ref().ok_or_else(missing)?;
                ctx.client_tls
                    .verify_server(far)
                    .map_err(EstablishFailure::Verification)?;
            }
            EstablishStep::FarLengthHiding => {
                require_length_hiding(self.far.as_ref().ok_or_else(missing)?)?;
            }
        }
        Ok(())
    }

    /// Release everything created so far, far side first.
    fn release(&mut self) {
        if let Some(far) = self.far.take() {
            far.release();
        }
        if let Some(tcp) = self.far_tcp.take() {
            let _ = SockRef::from(&tcp).shutdown(Shutdown::Both);
        }
        if let Some(near) = self.near.take() {
            near.release();
        }
        if let Some(tcp) = self.inbound.take() {
            let _ = SockRef::from(&tcp).shutdown(Shutdown::Both);
        }
    }
}

fn require_length_hiding<S: Session>(endpoint: &Endpoint<S>) -> Result<(), EstablishFailure> {
    if endpoint.can_use_length_hiding() {
        Ok(())
    } else {
        Err(EstablishFailure::LengthHidingUnsupported)
    }
}

fn missing() -> EstablishFailure {
    EstablishFailure::Io(std::io::Error::other("establishment step out of order"))
}

#[cfg(test)]
mod tests {
    use padrelay_config::HostPort;

    use super::*;

    fn config() -> RelayConfig {
        RelayConfig::new(
            HostPort::parse("127.0.0.1:0").unwrap(),
            HostPort::parse("127.0.0.1:443").unwrap(),
        )
    }

    #[test]
    fn minimal_plan() {
        assert_eq!(
            plan(&config()),
            vec![
                EstablishStep::NearHandshake,
                EstablishStep::DialFar,
                EstablishStep::FarHandshake,
            ]
        );
    }

    #[test]
    fn full_plan_is_near_side_first() {
        let mut cfg = config();
        cfg.verify_client_identity = true;
        cfg.verify_server_identity = true;
        cfg.use_length_hiding_with_client = true;
        cfg.use_length_hiding_with_server = true;
        assert_eq!(
            plan(&cfg),
            vec![
                EstablishStep::NearHandshake,
                EstablishStep::NearAuth,
                EstablishStep::NearLengthHiding,
                EstablishStep::DialFar,
                EstablishStep::FarHandshake,
                EstablishStep::FarAuth,
                EstablishStep::FarLengthHiding,
            ]
        );
    }

    #[test]
    fn far_steps_follow_every_near_step() {
        let mut cfg = config();
        for bits in 0..16u8 {
            cfg.verify_client_identity = bits & 1 != 0;
            cfg.verify_server_identity = bits & 2 != 0;
            cfg.use_length_hiding_with_client = bits & 4 != 0;
            cfg.use_length_hiding_with_server = bits & 8 != 0;
            let steps = plan(&cfg);
            let dial = steps
                .iter()
                .position(|s| *s == EstablishStep::DialFar)
                .unwrap();
            assert!(steps[..dial].iter().all(|s| matches!(
                s,
                EstablishStep::NearHandshake
                    | EstablishStep::NearAuth
                    | EstablishStep::NearLengthHiding
            )));
            assert_eq!(steps[0], EstablishStep::NearHandshake);
            assert_eq!(steps[dial + 1], EstablishStep::FarHandshake);
        }
    }
}
