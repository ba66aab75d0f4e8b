//! Event execution
//!
//! A [`Registry`] maps every entity kind to an executor implementing
//! [`Crud`]. The solver dispatches events through the registry without
//! knowing whether they hit the remote admin API or the in-memory dry-run
//! executor. Executors receive typed [`Payload`]s; a kind mismatch between
//! an event and its executor surfaces as a typed error, never a panic.

pub mod dry;
pub mod remote;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::api::{AdminClient, ApiError};
use crate::diff::{Event, EventOp};
use crate::state::types::{Kind, Payload, PayloadError};
use crate::state::{GatewayState, ResolveError};

/// Shared context for one reconciliation run.
///
/// `current` is mutated by the solver between levels as operations land;
/// executors only read it, to resolve references deferred from the diff.
pub struct ExecutionContext {
    pub client: Option<AdminClient>,
    pub current: Arc<RwLock<GatewayState>>,
}

impl ExecutionContext {
    pub fn new(client: Option<AdminClient>, current: GatewayState) -> Self {
        Self {
            client,
            current: Arc::new(RwLock::new(current)),
        }
    }
}

/// Error executing a single event. Sibling events are unaffected.
#[derive(Debug)]
pub enum ExecError {
    /// The event's payload kind did not match the executor's kind.
    Payload(PayloadError),
    /// No executor is registered for the event's kind.
    Unregistered(Kind),
    /// A deferred reference could not be resolved at dispatch time.
    Resolve(ResolveError),
    /// The executor needed a server identifier the payload does not carry.
    MissingId { kind: Kind, key: String },
    /// An executor that talks to the network was run without a client.
    NoClient(Kind),
    /// The admin API rejected or failed the operation.
    Api { event: String, source: ApiError },
    /// The admin API answered with a body that does not decode as the
    /// entity.
    Decode { kind: Kind, source: serde_json::Error },
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Payload(err) => err.fmt(f),
            Self::Unregistered(kind) => write!(f, "no executor registered for kind {}", kind),
            Self::Resolve(err) => err.fmt(f),
            Self::MissingId { kind, key } => {
                write!(f, "{} '{}' has no server identifier", kind, key)
            }
            Self::NoClient(kind) => {
                write!(f, "executor for {} requires an API client", kind)
            }
            Self::Api { event, source } => write!(f, "{}: {}", event, source),
            Self::Decode { kind, source } => {
                write!(f, "response for {} did not decode: {}", kind, source)
            }
        }
    }
}

impl std::error::Error for ExecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Payload(err) => Some(err),
            Self::Resolve(err) => Some(err),
            Self::Api { source, .. } => Some(source),
            Self::Decode { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<PayloadError> for ExecError {
    fn from(err: PayloadError) -> Self {
        Self::Payload(err)
    }
}

impl From<ResolveError> for ExecError {
    fn from(err: ResolveError) -> Self {
        Self::Resolve(err)
    }
}

/// One executor for one entity kind.
#[async_trait]
pub trait Crud: Send + Sync {
    /// Create the entity, returning it as the server now knows it.
    async fn create(&self, ctx: &ExecutionContext, payload: Payload) -> Result<Payload, ExecError>;

    /// Update the entity in place, returning the stored form.
    async fn update(&self, ctx: &ExecutionContext, payload: Payload) -> Result<Payload, ExecError>;

    /// Delete the entity, returning the form that was removed.
    async fn delete(&self, ctx: &ExecutionContext, payload: Payload) -> Result<Payload, ExecError>;
}

/// Registration-time error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    AlreadyRegistered(Kind),
    NotRegistered(Kind),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRegistered(kind) => {
                write!(f, "executor for {} registered twice", kind)
            }
            Self::NotRegistered(kind) => write!(f, "no executor registered for {}", kind),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Kind-to-executor table.
#[derive(Default)]
pub struct Registry {
    executors: HashMap<Kind, Arc<dyn Crud>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor for a kind. Double registration is an error.
    pub fn register(&mut self, kind: Kind, executor: Arc<dyn Crud>) -> Result<(), RegistryError> {
        if self.executors.contains_key(&kind) {
            return Err(RegistryError::AlreadyRegistered(kind));
        }
        self.executors.insert(kind, executor);
        Ok(())
    }

    /// Check that every kind in `kinds` has an executor.
    pub fn validate(&self, kinds: &[Kind]) -> Result<(), RegistryError> {
        for kind in kinds {
            if !self.executors.contains_key(kind) {
                return Err(RegistryError::NotRegistered(*kind));
            }
        }
        Ok(())
    }

    /// Dispatch one event to its kind's executor.
    pub async fn do_event(
        &self,
        ctx: &ExecutionContext,
        event: &Event,
    ) -> Result<Payload, ExecError> {
        let executor = self
            .executors
            .get(&event.kind)
            .ok_or(ExecError::Unregistered(event.kind))?;
        match event.op {
            EventOp::Create => executor.create(ctx, event.obj.clone()).await,
            EventOp::Update => executor.update(ctx, event.obj.clone()).await,
            EventOp::Delete => executor.delete(ctx, event.obj.clone()).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::types::Service;

    struct Echo;

    #[async_trait]
    impl Crud for Echo {
        async fn create(
            &self,
            _ctx: &ExecutionContext,
            payload: Payload,
        ) -> Result<Payload, ExecError> {
            Ok(payload)
        }

        async fn update(
            &self,
            _ctx: &ExecutionContext,
            payload: Payload,
        ) -> Result<Payload, ExecError> {
            Ok(payload)
        }

        async fn delete(
            &self,
            _ctx: &ExecutionContext,
            payload: Payload,
        ) -> Result<Payload, ExecError> {
            Ok(payload)
        }
    }

    #[test]
    fn test_double_registration_rejected() {
        let mut registry = Registry::new();
        registry.register(Kind::Service, Arc::new(Echo)).unwrap();
        let err = registry
            .register(Kind::Service, Arc::new(Echo))
            .unwrap_err();
        assert_eq!(err, RegistryError::AlreadyRegistered(Kind::Service));
    }

    #[test]
    fn test_validate_reports_missing_kind() {
        let mut registry = Registry::new();
        registry.register(Kind::Service, Arc::new(Echo)).unwrap();
        assert!(registry.validate(&[Kind::Service]).is_ok());
        let err = registry
            .validate(&[Kind::Service, Kind::Route])
            .unwrap_err();
        assert_eq!(err, RegistryError::NotRegistered(Kind::Route));
    }

    #[tokio::test]
    async fn test_dispatch_unregistered_kind_is_typed_error() {
        let registry = Registry::new();
        let ctx = ExecutionContext::new(None, GatewayState::new());
        let event = Event {
            op: EventOp::Create,
            kind: Kind::Service,
            obj: Service::default().into(),
            old_obj: None,
        };
        let err = registry.do_event(&ctx, &event).await.unwrap_err();
        assert!(matches!(err, ExecError::Unregistered(Kind::Service)));
    }
}
