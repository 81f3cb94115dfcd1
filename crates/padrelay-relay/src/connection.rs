//! Connection lifecycle: two forwarding flows and their teardown.
//!
//! The near→far flow runs on the caller's task, the far→near flow on its own
//! task. Each flow is the only one that writes to, shuts down and closes its
//! destination endpoint. When the near→far flow wants close-notify sent to
//! the near endpoint it asks the far→near flow to do it, which then stops
//! forwarding and tears the near endpoint down.
//!
//! | flow      | outcome      | teardown                                              |
//! |-----------|--------------|-------------------------------------------------------|
//! | far→near  | end of stream| near: close-notify, shutdown, close                   |
//! | far→near  | any error    | report; near: shutdown, close                         |
//! | near→far  | end of stream| far: close-notify, shutdown, close; near: close-notify |
//! | near→far  | read error   | far: close-notify, shutdown, close; propagate         |
//! | near→far  | write error  | far: shutdown, close; near: close-notify; propagate   |

use padrelay_config::{PaddingRange, RelayConfig};
use padrelay_tls::{Endpoint, EndpointMonitor, EndpointReader, EndpointWriter, Session};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, trace};

use crate::error::FlowError;
use crate::flow::{Direction, forward};
use crate::report::FailureReporter;

#[derive(Debug, Clone, Copy)]
pub struct FlowSettings {
    pub buffer_size: usize,
    /// Padding for data written to the near endpoint.
    pub towards_near: Option<PaddingRange>,
    /// Padding for data written to the far endpoint.
    pub towards_far: Option<PaddingRange>,
}

impl From<&RelayConfig> for FlowSettings {
    fn from(cfg: &RelayConfig) -> Self {
        Self {
            buffer_size: cfg.buffer_size,
            towards_near: cfg.padding_towards_client(),
            towards_far: cfg.padding_towards_server(),
        }
    }
}

/// A fully established pair of endpoints.
pub struct Connection<N, F> {
    near: Endpoint<N>,
    far: Endpoint<F>,
}

impl<N: Session, F: Session> Connection<N, F> {
    pub fn new(near: Endpoint<N>, far: Endpoint<F>) -> Self {
        Self { near, far }
    }

    /// Monitors for the near and far endpoints, in that order.
    pub fn monitors(&self) -> (EndpointMonitor, EndpointMonitor) {
        (self.near.monitor(), self.far.monitor())
    }

    /// Forward in both directions.
    ///
    /// Returns when the near→far flow finishes. The far→near flow keeps
    /// running on its own task and reports its own failures.
    pub async fn run(
        self,
        settings: FlowSettings,
        reporter: FailureReporter,
    ) -> Result<(), FlowError> {
        let (near_reader, near_writer) = self.near.into_halves();
        let (far_reader, far_writer) = self.far.into_halves();
        let notify_near = CancellationToken::new();

        tokio::spawn(
            far_to_near(
                far_reader,
                near_writer,
                settings.buffer_size,
                settings.towards_near,
                notify_near.clone(),
                reporter,
            )
            .in_current_span(),
        );

        near_to_far(
            near_reader,
            far_writer,
            notify_near,
            settings.buffer_size,
            settings.towards_far,
        )
        .await
    }
}

async fn far_to_near<N: Session, F: Session>(
    mut far: EndpointReader<F>,
    mut near: EndpointWriter<N>,
    buffer_size: usize,
    padding: Option<PaddingRange>,
    notify_near: CancellationToken,
    reporter: FailureReporter,
) {
    let flow = forward(Direction::FarToNear, &mut far, &mut near, buffer_size, padding);
    let result = tokio::select! {
        result = flow => Some(result),
        _ = notify_near.cancelled() => None,
    };
    let send_close_notify = match result {
        None => {
            debug!(direction = %Direction::FarToNear, "origin finished, ending towards origin");
            true
        }
        Some(Ok(bytes)) => {
            debug!(direction = %Direction::FarToNear, bytes, "destination finished");
            true
        }
        Some(Err(e)) => {
            if ended_locally(&e, &far.monitor()) {
                debug!(direction = %Direction::FarToNear, error = %e, "far endpoint already shut down");
            } else {
                reporter.report("forwarding failed (far->near)", e.error_type(), &e);
            }
            // an error racing the near→far flow's request still honours it
            notify_near.is_cancelled()
        }
    };
    if send_close_notify {
        close_notify(&mut near).await;
    }
    shutdown(&mut near);
    near.close();
}

async fn near_to_far<N: Session, F: Session>(
    mut near: EndpointReader<N>,
    mut far: EndpointWriter<F>,
    notify_near: CancellationToken,
    buffer_size: usize,
    padding: Option<PaddingRange>,
) -> Result<(), FlowError> {
    let result = forward(Direction::NearToFar, &mut near, &mut far, buffer_size, padding).await;
    match &result {
        Ok(bytes) => {
            debug!(direction = %Direction::NearToFar, bytes, "origin finished");
            notify_near.cancel();
            close_notify(&mut far).await;
            shutdown(&mut far);
            far.close();
        }
        Err(FlowError::Reader(e)) => {
            if near.monitor().transport_shut() {
                debug!(direction = %Direction::NearToFar, error = %e, "near endpoint already shut down");
            }
            close_notify(&mut far).await;
            shutdown(&mut far);
            far.close();
        }
        Err(FlowError::Writer(_)) => {
            notify_near.cancel();
            shutdown(&mut far);
            far.close();
        }
    }
    result.map(|_| ())
}

/// A read that fails because the other flow already shut the source's
/// transport down is the end of the connection, not a failure.
pub(crate) fn ended_locally(err: &FlowError, source: &EndpointMonitor) -> bool {
    matches!(err, FlowError::Reader(_)) && source.transport_shut()
}

async fn close_notify<S: Session>(writer: &mut EndpointWriter<S>) {
    if let Err(e) = writer.close_notify().await {
        trace!(error = %e, "close_notify failed");
    }
}

fn shutdown<S: Session>(writer: &mut EndpointWriter<S>) {
    if let Err(e) = writer.shutdown() {
        trace!(error = %e, "shutdown failed");
    }
}
