//! sonarsync-core: converge remote resources to a declared state.
//!
//! The crate has two layers:
//! - [`transport`]: one authenticated HTTP exchange per call, with failures
//!   classified into the [`Error`] taxonomy.
//! - [`reconciler`]: lookup, decide, act. At most one mutating call per
//!   reconciliation; repeated runs against an unchanged remote are no-ops.
//!
//! [`sonarqube`] provides the resource kinds for SonarQube.

pub mod endpoint;
pub mod error;
pub mod reconciler;
pub mod sonarqube;
pub mod state;
pub mod transport;

pub use endpoint::{RemoteEndpoint, Token, TransportConfig};
pub use error::{Error, ErrorKind, Failure, RemoteError, Result};
pub use reconciler::{KeyedGate, Reconciler, ResourceKind};
pub use state::{
    Action, DesiredState, ObservedState, Outcome, Plan, Presence, RemoteId, ResourceKey,
};
pub use transport::{Call, HttpTransport, Method, Payload, Transport};
