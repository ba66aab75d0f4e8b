//! Admin API executors
//!
//! One generic [`RemoteCrud`] serves every kind; the per-kind knowledge is
//! the endpoint layout, expressed through [`ApiResource`]. Nested kinds
//! (credentials, targets, versions, documents, endpoint permissions) build
//! their paths from the parent reference, which the differ or the solver has
//! resolved by the time the event is dispatched.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::crud::{Crud, ExecError, ExecutionContext, Registry, RegistryError};
use crate::state::types::{
    AclGroup, BasicAuth, CACertificate, Certificate, Consumer, ConsumerGroup, Document,
    GatewayEntity, HmacAuth, JwtAuth, Key, KeyAuth, KeySet, Kind, Payload, PayloadError, Plugin,
    RbacEndpointPermission, RbacRole, Reference, Route, Service, ServicePackage, ServiceVersion,
    Sni, Target, Upstream, Vault,
};

/// URL segment for a resolved parent reference, preferring the stable id.
fn parent_segment(reference: &Option<Reference>, kind: Kind) -> Result<String, ExecError> {
    let reference = reference
        .as_ref()
        .filter(|r| !r.is_empty())
        .ok_or(ExecError::MissingId {
            kind,
            key: String::new(),
        })?;
    let key = reference
        .id
        .as_deref()
        .or(reference.name.as_deref())
        .unwrap_or_default();
    Ok(urlencoding::encode(key).into_owned())
}

/// Endpoint layout of one entity kind.
pub trait ApiResource: GatewayEntity {
    /// Collection endpoint, with parent segments filled in.
    fn collection_path(&self) -> Result<String, ExecError>;

    /// Key identifying this entity within its collection.
    fn item_key(&self) -> Result<String, ExecError> {
        Ok(self
            .id()
            .map(str::to_string)
            .unwrap_or_else(|| self.natural_key()))
    }

    /// Item endpoint.
    fn item_path(&self) -> Result<String, ExecError> {
        Ok(format!(
            "{}/{}",
            self.collection_path()?,
            urlencoding::encode(&self.item_key()?)
        ))
    }
}

macro_rules! flat_resource {
    ($($ty:ty => $path:literal),+ $(,)?) => {
        $(
            impl ApiResource for $ty {
                fn collection_path(&self) -> Result<String, ExecError> {
                    Ok($path.to_string())
                }
            }
        )+
    };
}

flat_resource!(
    ServicePackage => "/service_packages",
    Certificate => "/certificates",
    CACertificate => "/ca_certificates",
    Consumer => "/consumers",
    ConsumerGroup => "/consumer_groups",
    RbacRole => "/rbac/roles",
    Vault => "/vaults",
    KeySet => "/key-sets",
    Service => "/services",
    Upstream => "/upstreams",
    Sni => "/snis",
    Key => "/keys",
    Route => "/routes",
);

impl ApiResource for Plugin {
    fn collection_path(&self) -> Result<String, ExecError> {
        Ok("/plugins".to_string())
    }

    fn item_key(&self) -> Result<String, ExecError> {
        // The composite natural key is not addressable; mutations need the
        // server identifier.
        self.id
            .clone()
            .ok_or_else(|| ExecError::MissingId {
                kind: Kind::Plugin,
                key: self.natural_key(),
            })
    }
}

impl ApiResource for Target {
    fn collection_path(&self) -> Result<String, ExecError> {
        Ok(format!(
            "/upstreams/{}/targets",
            parent_segment(&self.upstream, Kind::Upstream)?
        ))
    }

    fn item_key(&self) -> Result<String, ExecError> {
        Ok(self
            .id
            .clone()
            .unwrap_or_else(|| self.target.clone()))
    }
}

impl ApiResource for KeyAuth {
    fn collection_path(&self) -> Result<String, ExecError> {
        Ok(format!(
            "/consumers/{}/key-auth",
            parent_segment(&self.consumer, Kind::Consumer)?
        ))
    }
}

impl ApiResource for BasicAuth {
    fn collection_path(&self) -> Result<String, ExecError> {
        Ok(format!(
            "/consumers/{}/basic-auth",
            parent_segment(&self.consumer, Kind::Consumer)?
        ))
    }
}

impl ApiResource for JwtAuth {
    fn collection_path(&self) -> Result<String, ExecError> {
        Ok(format!(
            "/consumers/{}/jwt",
            parent_segment(&self.consumer, Kind::Consumer)?
        ))
    }
}

impl ApiResource for HmacAuth {
    fn collection_path(&self) -> Result<String, ExecError> {
        Ok(format!(
            "/consumers/{}/hmac-auth",
            parent_segment(&self.consumer, Kind::Consumer)?
        ))
    }
}

impl ApiResource for AclGroup {
    fn collection_path(&self) -> Result<String, ExecError> {
        Ok(format!(
            "/consumers/{}/acls",
            parent_segment(&self.consumer, Kind::Consumer)?
        ))
    }

    fn item_key(&self) -> Result<String, ExecError> {
        Ok(self.id.clone().unwrap_or_else(|| self.group.clone()))
    }
}

impl ApiResource for RbacEndpointPermission {
    fn collection_path(&self) -> Result<String, ExecError> {
        Ok(format!(
            "/rbac/roles/{}/endpoints",
            parent_segment(&self.role, Kind::RbacRole)?
        ))
    }

    fn item_path(&self) -> Result<String, ExecError> {
        let endpoint = if self.endpoint.starts_with('/') {
            self.endpoint.clone()
        } else {
            format!("/{}", self.endpoint)
        };
        Ok(format!(
            "{}/{}{}",
            self.collection_path()?,
            self.workspace.as_deref().unwrap_or("*"),
            endpoint
        ))
    }
}

impl ApiResource for ServiceVersion {
    fn collection_path(&self) -> Result<String, ExecError> {
        Ok(format!(
            "/service_packages/{}/service_versions",
            parent_segment(&self.package, Kind::ServicePackage)?
        ))
    }

    fn item_key(&self) -> Result<String, ExecError> {
        Ok(self.id.clone().unwrap_or_else(|| self.version.clone()))
    }
}

impl ApiResource for Document {
    fn collection_path(&self) -> Result<String, ExecError> {
        Ok(format!(
            "/service_packages/{}/documents",
            parent_segment(&self.package, Kind::ServicePackage)?
        ))
    }

    fn item_key(&self) -> Result<String, ExecError> {
        Ok(self.id.clone().unwrap_or_else(|| self.path.clone()))
    }
}

fn decode_response<E: GatewayEntity>(response: Value, sent: E) -> Result<E, ExecError> {
    if response.is_null() {
        return Ok(sent);
    }
    serde_json::from_value(response).map_err(|source| ExecError::Decode {
        kind: E::KIND,
        source,
    })
}

/// Executor that performs events against the admin API.
pub struct RemoteCrud<E> {
    _marker: PhantomData<E>,
}

impl<E> RemoteCrud<E> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<E> Default for RemoteCrud<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E> Crud for RemoteCrud<E>
where
    E: ApiResource + TryFrom<Payload, Error = PayloadError>,
    Payload: From<E>,
{
    async fn create(&self, ctx: &ExecutionContext, payload: Payload) -> Result<Payload, ExecError> {
        let mut entity: E = payload.try_into()?;
        {
            let current = ctx.current.read().await;
            current.resolve_entity_references(&mut entity)?;
        }
        let client = ctx.client.as_ref().ok_or(ExecError::NoClient(E::KIND))?;
        let body = serde_json::to_value(&entity).map_err(|source| ExecError::Decode {
            kind: E::KIND,
            source,
        })?;
        // Caller-assigned identifiers are honored via PUT to the item path.
        let response = if entity.id().is_some() {
            client.put(&entity.item_path()?, &body).await
        } else {
            client.post(&entity.collection_path()?, &body).await
        }
        .map_err(|source| ExecError::Api {
            event: format!("create {}", entity.display_name()),
            source,
        })?;
        decode_response(response, entity).map(Payload::from)
    }

    async fn update(&self, ctx: &ExecutionContext, payload: Payload) -> Result<Payload, ExecError> {
        let mut entity: E = payload.try_into()?;
        {
            let current = ctx.current.read().await;
            current.resolve_entity_references(&mut entity)?;
        }
        let client = ctx.client.as_ref().ok_or(ExecError::NoClient(E::KIND))?;
        let body = serde_json::to_value(&entity).map_err(|source| ExecError::Decode {
            kind: E::KIND,
            source,
        })?;
        let response = client
            .patch(&entity.item_path()?, &body)
            .await
            .map_err(|source| ExecError::Api {
                event: format!("update {}", entity.display_name()),
                source,
            })?;
        decode_response(response, entity).map(Payload::from)
    }

    async fn delete(&self, ctx: &ExecutionContext, payload: Payload) -> Result<Payload, ExecError> {
        let entity: E = payload.try_into()?;
        let client = ctx.client.as_ref().ok_or(ExecError::NoClient(E::KIND))?;
        client
            .delete(&entity.item_path()?)
            .await
            .map_err(|source| ExecError::Api {
                event: format!("delete {}", entity.display_name()),
                source,
            })?;
        Ok(entity.into())
    }
}

/// Register a remote executor for every kind.
pub fn register_all(registry: &mut Registry) -> Result<(), RegistryError> {
    macro_rules! register {
        ($($ty:ident),+ $(,)?) => {
            $(registry.register(Kind::$ty, Arc::new(RemoteCrud::<$ty>::new()))?;)+
        };
    }
    register!(
        ServicePackage,
        Certificate,
        CACertificate,
        Consumer,
        ConsumerGroup,
        RbacRole,
        Vault,
        KeySet,
        Service,
        Upstream,
        Sni,
        Key,
        RbacEndpointPermission,
        KeyAuth,
        BasicAuth,
        JwtAuth,
        HmacAuth,
        AclGroup,
        Route,
        Target,
        ServiceVersion,
        Plugin,
        Document,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_item_path_prefers_id() {
        let service = Service {
            id: Some("s1".to_string()),
            name: "web".to_string(),
            ..Default::default()
        };
        assert_eq!(service.item_path().unwrap(), "/services/s1");

        let unnamed = Service {
            name: "web".to_string(),
            ..Default::default()
        };
        assert_eq!(unnamed.item_path().unwrap(), "/services/web");
    }

    #[test]
    fn test_nested_target_path_uses_parent_id() {
        let target = Target {
            target: "10.0.0.1:8080".to_string(),
            upstream: Some(Reference {
                id: Some("u1".to_string()),
                name: Some("backend".to_string()),
            }),
            ..Default::default()
        };
        assert_eq!(target.collection_path().unwrap(), "/upstreams/u1/targets");
        assert_eq!(
            target.item_path().unwrap(),
            "/upstreams/u1/targets/10.0.0.1%3A8080"
        );
    }

    #[test]
    fn test_plugin_mutation_requires_id() {
        let plugin = Plugin {
            name: "cors".to_string(),
            ..Default::default()
        };
        let err = plugin.item_path().unwrap_err();
        assert!(matches!(err, ExecError::MissingId { kind: Kind::Plugin, .. }));
    }

    #[test]
    fn test_endpoint_permission_path_layout() {
        let permission = RbacEndpointPermission {
            endpoint: "/services".to_string(),
            role: Some(Reference::by_name("read-only")),
            ..Default::default()
        };
        assert_eq!(
            permission.item_path().unwrap(),
            "/rbac/roles/read-only/endpoints/*/services"
        );
    }

    #[test]
    fn test_credential_path_missing_consumer() {
        let credential = KeyAuth {
            key: "secret".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            credential.collection_path().unwrap_err(),
            ExecError::MissingId { kind: Kind::Consumer, .. }
        ));
    }

    #[test]
    fn test_register_all_covers_every_kind() {
        let mut registry = Registry::new();
        register_all(&mut registry).unwrap();
        assert!(registry.validate(Kind::all()).is_ok());
    }
}
