//! Relay runtime for padrelay.
//!
//! - [`listener`] accepts origins for one relay and hands each socket to
//!   [`establish`], which brings up the near and far TLS sessions.
//! - [`connection`] forwards between the two sessions and tears them down.
//! - [`supervisor`] runs one listener per configured relay.

pub mod cli;
pub mod connection;
pub mod dial;
pub mod error;
pub mod establish;
pub mod flow;
pub mod listener;
pub mod padding;
pub mod report;
pub mod supervisor;

pub use connection::{Connection, FlowSettings};
pub use error::{
    EstablishFailure, EstablishStep, EstablishmentError, FlowError, ListenerError,
    SupervisorError,
};
pub use establish::{RelayContext, establish, plan};
pub use listener::Listener;
pub use report::{FailureReporter, ReportLock};
pub use supervisor::{RunningRelay, Supervisor};
