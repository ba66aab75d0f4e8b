//! State snapshots of a gateway installation
//!
//! A [`GatewayState`] owns one [`EntityStore`] per entity kind. Two of them
//! exist per reconciliation run: the current state (dumped from the remote
//! system) and the target state (rendered from declarative configuration).
//! The current state is additionally mutated by the solver's post-action
//! hooks as operations succeed, so later dependency levels observe the
//! effect of earlier ones.

pub mod dump;
pub mod load;
pub mod store;
pub mod types;

use std::fmt;

use crate::state::store::{EntityStore, StoreError};
use crate::state::types::{
    AclGroup, BasicAuth, CACertificate, Certificate, Consumer, ConsumerGroup, Document,
    GatewayEntity, HmacAuth, JwtAuth, Key, KeyAuth, KeySet, Kind, Payload, Plugin,
    RbacEndpointPermission, RbacRole, Reference, Route, Service, ServicePackage, ServiceVersion,
    Sni, Target, Upstream, Vault,
};

/// A full snapshot of gateway configuration, one store per kind.
#[derive(Debug, Clone, Default)]
pub struct GatewayState {
    pub service_packages: EntityStore<ServicePackage>,
    pub certificates: EntityStore<Certificate>,
    pub ca_certificates: EntityStore<CACertificate>,
    pub consumers: EntityStore<Consumer>,
    pub consumer_groups: EntityStore<ConsumerGroup>,
    pub rbac_roles: EntityStore<RbacRole>,
    pub vaults: EntityStore<Vault>,
    pub key_sets: EntityStore<KeySet>,
    pub services: EntityStore<Service>,
    pub upstreams: EntityStore<Upstream>,
    pub snis: EntityStore<Sni>,
    pub keys: EntityStore<Key>,
    pub rbac_endpoint_permissions: EntityStore<RbacEndpointPermission>,
    pub key_auths: EntityStore<KeyAuth>,
    pub basic_auths: EntityStore<BasicAuth>,
    pub jwt_auths: EntityStore<JwtAuth>,
    pub hmac_auths: EntityStore<HmacAuth>,
    pub acl_groups: EntityStore<AclGroup>,
    pub routes: EntityStore<Route>,
    pub targets: EntityStore<Target>,
    pub service_versions: EntityStore<ServiceVersion>,
    pub plugins: EntityStore<Plugin>,
    pub documents: EntityStore<Document>,
}

/// Typed access to the store for one entity kind.
pub trait StateSlice<E: GatewayEntity> {
    fn store(&self) -> &EntityStore<E>;
    fn store_mut(&mut self) -> &mut EntityStore<E>;
}

macro_rules! state_kinds {
    ($(($variant:ident, $field:ident)),+ $(,)?) => {
        $(
            impl StateSlice<$variant> for GatewayState {
                fn store(&self) -> &EntityStore<$variant> {
                    &self.$field
                }

                fn store_mut(&mut self) -> &mut EntityStore<$variant> {
                    &mut self.$field
                }
            }
        )+

        impl GatewayState {
            /// Insert the payload into its kind's store (post-create hook).
            pub fn apply_create(&mut self, payload: Payload) -> Result<(), StoreError> {
                match payload {
                    $(Payload::$variant(e) => self.$field.add(e)),+
                }
            }

            /// Replace the payload in its kind's store (post-update hook).
            pub fn apply_update(&mut self, payload: Payload) -> Result<(), StoreError> {
                match payload {
                    $(Payload::$variant(e) => self.$field.update(e)),+
                }
            }

            /// Remove the payload from its kind's store (post-delete hook).
            pub fn apply_delete(&mut self, payload: &Payload) -> Result<(), StoreError> {
                match payload {
                    $(Payload::$variant(e) => self.$field.delete(&e.natural_key()).map(|_| ())),+
                }
            }

            /// Resolve the foreign references of a payload of any kind.
            pub fn resolve_payload_references(
                &self,
                payload: &mut Payload,
            ) -> Result<(), ResolveError> {
                match payload {
                    $(Payload::$variant(e) => self.resolve_entity_references(e)),+
                }
            }

            /// Whether an entity of `kind` exists under `key` (id or natural key).
            pub fn contains(&self, kind: Kind, key: &str) -> bool {
                match kind {
                    $(Kind::$variant => self.$field.get(key).is_ok()),+
                }
            }

            /// Number of entities of one kind.
            pub fn count(&self, kind: Kind) -> usize {
                match kind {
                    $(Kind::$variant => self.$field.len()),+
                }
            }

            /// Total number of entities across all kinds.
            pub fn total(&self) -> usize {
                Kind::all().iter().map(|k| self.count(*k)).sum()
            }
        }
    };
}

state_kinds!(
    (ServicePackage, service_packages),
    (Certificate, certificates),
    (CACertificate, ca_certificates),
    (Consumer, consumers),
    (ConsumerGroup, consumer_groups),
    (RbacRole, rbac_roles),
    (Vault, vaults),
    (KeySet, key_sets),
    (Service, services),
    (Upstream, upstreams),
    (Sni, snis),
    (Key, keys),
    (RbacEndpointPermission, rbac_endpoint_permissions),
    (KeyAuth, key_auths),
    (BasicAuth, basic_auths),
    (JwtAuth, jwt_auths),
    (HmacAuth, hmac_auths),
    (AclGroup, acl_groups),
    (Route, routes),
    (Target, targets),
    (ServiceVersion, service_versions),
    (Plugin, plugins),
    (Document, documents),
);

/// A foreign key on a target entity could not be resolved against the
/// current state. Fatal for that entity's event only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveError {
    /// Display name of the entity whose reference failed.
    pub entity: String,
    pub parent_kind: Kind,
    pub parent_key: String,
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} references {} '{}' which does not exist",
            self.entity, self.parent_kind, self.parent_key
        )
    }
}

impl std::error::Error for ResolveError {}

fn fill_from<E: GatewayEntity>(
    store: &EntityStore<E>,
    reference: &mut Reference,
) -> Result<(), StoreError> {
    let key = reference
        .key()
        .ok_or(StoreError::MissingKey { kind: E::KIND })?
        .to_string();
    let entity = store.get(&key)?;
    if let Some(id) = entity.id() {
        reference.id = Some(id.to_string());
    }
    if reference.name.is_none()
        && let Some(name) = entity.ref_name()
    {
        reference.name = Some(name.to_string());
    }
    Ok(())
}

impl GatewayState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill in the stable identifier (and canonical name) of a reference by
    /// looking its key up in this state's store for the referenced kind.
    pub fn resolve_reference(
        &self,
        kind: Kind,
        reference: &mut Reference,
    ) -> Result<(), StoreError> {
        match kind {
            Kind::Service => fill_from(&self.services, reference),
            Kind::Route => fill_from(&self.routes, reference),
            Kind::Consumer => fill_from(&self.consumers, reference),
            Kind::Certificate => fill_from(&self.certificates, reference),
            Kind::Upstream => fill_from(&self.upstreams, reference),
            Kind::KeySet => fill_from(&self.key_sets, reference),
            Kind::RbacRole => fill_from(&self.rbac_roles, reference),
            Kind::ServicePackage => fill_from(&self.service_packages, reference),
            Kind::ConsumerGroup => fill_from(&self.consumer_groups, reference),
            other => Err(StoreError::NotFound {
                kind: other,
                key: reference.key().unwrap_or_default().to_string(),
            }),
        }
    }

    /// Resolve every foreign reference on `entity` against this state.
    ///
    /// Failure names both the referencing entity and the missing parent, and
    /// must not abort sibling entities.
    pub fn resolve_entity_references<E: GatewayEntity>(
        &self,
        entity: &mut E,
    ) -> Result<(), ResolveError> {
        let display = entity.display_name();
        for (kind, reference) in entity.references_mut() {
            if reference.is_empty() {
                continue;
            }
            let key = reference.key().unwrap_or_default().to_string();
            self.resolve_reference(kind, reference)
                .map_err(|_| ResolveError {
                    entity: display.clone(),
                    parent_kind: kind,
                    parent_key: key,
                })?;
        }
        Ok(())
    }
}
