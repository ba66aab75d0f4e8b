//! Dry-run executor
//!
//! Performs no I/O. Creates synthesize a server identifier when the payload
//! carries none, so reference resolution at later levels behaves exactly as
//! it would against a live system and the simulated run converges.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::crud::{Crud, ExecError, ExecutionContext, Registry, RegistryError};
use crate::state::types::{Kind, Payload};

pub struct DryCrud;

#[async_trait]
impl Crud for DryCrud {
    async fn create(
        &self,
        ctx: &ExecutionContext,
        mut payload: Payload,
    ) -> Result<Payload, ExecError> {
        {
            let current = ctx.current.read().await;
            current.resolve_payload_references(&mut payload)?;
        }
        if payload.id().is_none() {
            payload.set_id(Some(Uuid::new_v4().to_string()));
        }
        Ok(payload)
    }

    async fn update(
        &self,
        ctx: &ExecutionContext,
        mut payload: Payload,
    ) -> Result<Payload, ExecError> {
        {
            let current = ctx.current.read().await;
            current.resolve_payload_references(&mut payload)?;
        }
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

/// Register the dry-run executor for every kind.
pub fn register_all(registry: &mut Registry) -> Result<(), RegistryError> {
    let executor = Arc::new(DryCrud);
    for kind in Kind::all() {
        registry.register(*kind, executor.clone())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::GatewayState;
    use crate::state::types::Service;

    #[tokio::test]
    async fn test_create_synthesizes_identifier() {
        let ctx = ExecutionContext::new(None, GatewayState::new());
        let created = DryCrud
            .create(
                &ctx,
                Service {
                    name: "web".to_string(),
                    ..Default::default()
                }
                .into(),
            )
            .await
            .unwrap();
        assert!(created.id().is_some());
    }

    #[tokio::test]
    async fn test_create_keeps_declared_identifier() {
        let ctx = ExecutionContext::new(None, GatewayState::new());
        let created = DryCrud
            .create(
                &ctx,
                Service {
                    id: Some("s1".to_string()),
                    name: "web".to_string(),
                    ..Default::default()
                }
                .into(),
            )
            .await
            .unwrap();
        assert_eq!(created.id(), Some("s1"));
    }
}
