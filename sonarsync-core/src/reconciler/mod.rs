//! Idempotent reconciliation of named remote resources.
//!
//! A [`Reconciler`] compares a caller's desired state with the state the
//! remote system reports right now and issues at most one mutating call to
//! converge them. Nothing is cached between calls.

mod gate;

pub use gate::KeyedGate;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::state::{
    Action, DesiredState, ObservedState, Outcome, Plan, Presence, RemoteId, ResourceKey,
};
use crate::transport::{Method, Transport};

/// One kind of remote resource addressed by a unique name.
#[async_trait]
pub trait ResourceKind: Send + Sync {
    /// Lower-case singular noun used in messages, e.g. `"group"`.
    fn noun(&self) -> &'static str;

    /// Route of the collection search, used in error context.
    fn search_path(&self) -> &'static str;

    /// Query the collection for `key`. May return fuzzy matches; the
    /// reconciler filters for the exact name.
    async fn search(
        &self,
        transport: &dyn Transport,
        key: &ResourceKey,
    ) -> Result<Vec<ObservedState>>;

    /// Create the resource, returning its id when the remote reports one.
    async fn create(
        &self,
        transport: &dyn Transport,
        desired: &DesiredState,
    ) -> Result<Option<RemoteId>>;

    async fn delete(&self, transport: &dyn Transport, observed: &ObservedState) -> Result<()>;
}

/// Converges resources of one kind. Stateless between calls.
pub struct Reconciler<K> {
    transport: Arc<dyn Transport>,
    kind: K,
    gate: Option<Arc<KeyedGate>>,
}

impl<K: ResourceKind> Reconciler<K> {
    pub fn new(transport: Arc<dyn Transport>, kind: K) -> Self {
        Self {
            transport,
            kind,
            gate: None,
        }
    }

    /// Serialize reconciliations of the same key through `gate`.
    pub fn with_gate(mut self, gate: Arc<KeyedGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }

    /// Resolve `key` to the single remote resource with exactly that name.
    pub async fn lookup(&self, key: &ResourceKey) -> Result<Option<ObservedState>> {
        let candidates = self.kind.search(self.transport.as_ref(), key).await?;
        let total = candidates.len();
        let mut matches: Vec<ObservedState> =
            candidates.into_iter().filter(|c| &c.key == key).collect();
        debug!(
            "Lookup of {} '{}': {} candidates, {} exact",
            self.kind.noun(),
            key,
            total,
            matches.len()
        );

        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            n => {
                warn!("{} '{}' resolved to {} remote resources", self.kind.noun(), key, n);
                Err(Error::malformed(
                    Method::Get,
                    self.kind.search_path(),
                    format!("{n} {}s named '{key}', expected at most one", self.kind.noun()),
                ))
            }
        }
    }

    /// Lookup and decide, without mutating anything.
    pub async fn plan(&self, desired: &DesiredState) -> Result<Plan> {
        let observed = self.lookup(&desired.key).await?;
        Ok(Plan::decide(observed, desired.presence))
    }

    /// Report what [`reconcile`](Self::reconcile) would do, without doing it.
    pub async fn check(&self, desired: &DesiredState) -> Result<Outcome> {
        let plan = self.plan(desired).await?;
        let name = self.name(&desired.key);
        let message = match plan.action {
            Action::Create => format!("{name} would be created"),
            Action::Delete => format!("{name} would be deleted"),
            Action::NoOp => self.satisfied_message(&name, desired),
        };
        Ok(Outcome {
            changed: plan.action.changes(),
            action: plan.action,
            message,
            remote_id: plan.observed.map(|o| o.remote_id),
        })
    }

    /// Converge the remote resource to `desired`.
    ///
    /// Lookup errors, authorization failures included, are returned before
    /// any mutating call is attempted.
    pub async fn reconcile(&self, desired: &DesiredState) -> Result<Outcome> {
        let _guard = match &self.gate {
            Some(gate) => Some(gate.acquire(&desired.key).await),
            None => None,
        };

        let plan = self.plan(desired).await?;
        let name = self.name(&desired.key);

        match (plan.action, plan.observed) {
            (Action::Create, _) => {
                let remote_id = self.kind.create(self.transport.as_ref(), desired).await?;
                info!("Created {}", name);
                Ok(Outcome {
                    changed: true,
                    action: Action::Create,
                    message: format!("{name} created"),
                    remote_id,
                })
            }
            (Action::Delete, Some(observed)) => {
                self.kind.delete(self.transport.as_ref(), &observed).await?;
                info!("Deleted {} ({})", name, observed.remote_id);
                Ok(Outcome {
                    changed: true,
                    action: Action::Delete,
                    message: format!("{name} deleted"),
                    remote_id: Some(observed.remote_id),
                })
            }
            (_, observed) => {
                debug!("{} already {}", name, desired.presence);
                Ok(Outcome {
                    changed: false,
                    action: Action::NoOp,
                    message: self.satisfied_message(&name, desired),
                    remote_id: observed.map(|o| o.remote_id),
                })
            }
        }
    }

    /// [`reconcile`](Self::reconcile), abandoned as soon as `cancel` fires.
    pub async fn reconcile_with_cancel(
        &self,
        desired: &DesiredState,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Reconciliation of {} cancelled", self.name(&desired.key));
                Err(Error::Cancelled)
            }
            outcome = self.reconcile(desired) => outcome,
        }
    }

    /// [`check`](Self::check), abandoned as soon as `cancel` fires.
    pub async fn check_with_cancel(
        &self,
        desired: &DesiredState,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Check of {} cancelled", self.name(&desired.key));
                Err(Error::Cancelled)
            }
            outcome = self.check(desired) => outcome,
        }
    }

    fn name(&self, key: &ResourceKey) -> String {
        let noun = self.kind.noun();
        let mut chars = noun.chars();
        let noun = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        };
        format!("{noun} '{key}'")
    }

    fn satisfied_message(&self, name: &str, desired: &DesiredState) -> String {
        match desired.presence {
            Presence::Present => format!("{name} already exists"),
            Presence::Absent => format!("{name} does not exist"),
        }
    }
}
