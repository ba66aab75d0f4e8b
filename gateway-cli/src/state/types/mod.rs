//! Typed gateway entities
//!
//! Every object the reconciler manages implements [`GatewayEntity`]: it has a
//! kind tag, an optional server-assigned identifier, a natural key, foreign
//! references to parent entities, and volatile fields that are excluded from
//! structural comparison. The [`Payload`] sum type carries any entity through
//! the event pipeline without type erasure.

mod credentials;
mod konnect;
mod rbac;

pub use credentials::{AclGroup, BasicAuth, HmacAuth, JwtAuth, KeyAuth};
pub use konnect::{Document, ServicePackage, ServiceVersion};
pub use rbac::{RbacEndpointPermission, RbacRole};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::state::GatewayState;

/// The kind tag of a gateway entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
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
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServicePackage => "service_package",
            Self::Certificate => "certificate",
            Self::CACertificate => "ca_certificate",
            Self::Consumer => "consumer",
            Self::ConsumerGroup => "consumer_group",
            Self::RbacRole => "rbac_role",
            Self::Vault => "vault",
            Self::KeySet => "key_set",
            Self::Service => "service",
            Self::Upstream => "upstream",
            Self::Sni => "sni",
            Self::Key => "key",
            Self::RbacEndpointPermission => "rbac_endpoint_permission",
            Self::KeyAuth => "key_auth",
            Self::BasicAuth => "basic_auth",
            Self::JwtAuth => "jwt_auth",
            Self::HmacAuth => "hmac_auth",
            Self::AclGroup => "acl_group",
            Self::Route => "route",
            Self::Target => "target",
            Self::ServiceVersion => "service_version",
            Self::Plugin => "plugin",
            Self::Document => "document",
        }
    }

    /// Every kind the reconciler knows about.
    pub fn all() -> &'static [Kind] {
        &[
            Self::ServicePackage,
            Self::Certificate,
            Self::CACertificate,
            Self::Consumer,
            Self::ConsumerGroup,
            Self::RbacRole,
            Self::Vault,
            Self::KeySet,
            Self::Service,
            Self::Upstream,
            Self::Sni,
            Self::Key,
            Self::RbacEndpointPermission,
            Self::KeyAuth,
            Self::BasicAuth,
            Self::JwtAuth,
            Self::HmacAuth,
            Self::AclGroup,
            Self::Route,
            Self::Target,
            Self::ServiceVersion,
            Self::Plugin,
            Self::Document,
        ]
    }

    /// Kinds this kind may hold foreign references to.
    pub fn reference_kinds(&self) -> &'static [Kind] {
        match self {
            Self::Service => &[Kind::Certificate],
            Self::Sni => &[Kind::Certificate],
            Self::Key => &[Kind::KeySet],
            Self::RbacEndpointPermission => &[Kind::RbacRole],
            Self::KeyAuth | Self::BasicAuth | Self::JwtAuth | Self::HmacAuth | Self::AclGroup => {
                &[Kind::Consumer]
            }
            Self::Route => &[Kind::Service],
            Self::Target => &[Kind::Upstream],
            Self::ServiceVersion => &[Kind::ServicePackage],
            Self::Plugin => &[Kind::Service, Kind::Route, Kind::Consumer],
            Self::Document => &[Kind::ServicePackage],
            _ => &[],
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A foreign reference to a parent entity, by stable id, natural key, or both.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Reference {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
        }
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: None,
        }
    }

    /// The lookup key for this reference: natural key when known, else id.
    pub fn key(&self) -> Option<&str> {
        self.name.as_deref().or(self.id.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.name.is_none()
    }
}

/// Key fragment for an optional reference inside a composite natural key.
///
/// An absent reference yields the empty string, which is distinct from any
/// concrete key, so a global plugin never collides with a scoped one.
pub(crate) fn ref_key(r: &Option<Reference>) -> &str {
    r.as_ref().and_then(Reference::key).unwrap_or("")
}

/// Behavior shared by all gateway entities.
pub trait GatewayEntity:
    Clone + PartialEq + fmt::Debug + Default + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const KIND: Kind;

    /// The server-assigned stable identifier, if known.
    fn id(&self) -> Option<&str>;

    fn set_id(&mut self, id: Option<String>);

    /// The natural key used to match entities across state snapshots.
    fn natural_key(&self) -> String;

    /// Human-readable identifier for logs and error context.
    fn display_name(&self) -> String {
        format!("{} '{}'", Self::KIND, self.natural_key())
    }

    /// The name other entities use when referencing this one, if any.
    fn ref_name(&self) -> Option<&str> {
        None
    }

    /// Drop server-maintained fields that must not participate in equality.
    fn clear_volatile(&mut self);

    /// Foreign references carried by this entity, with their target kinds.
    fn references_mut(&mut self) -> Vec<(Kind, &mut Reference)> {
        Vec::new()
    }

    /// Kind-specific fixup applied to the outgoing update payload.
    fn prepare_for_update(&mut self, _current: &Self, _state: &GatewayState) {}

    /// Copy of this entity normalized for structural comparison: identifier
    /// and volatile fields stripped, references reduced to natural-key form.
    fn normalized_for_compare(&self) -> Self {
        let mut copy = self.clone();
        copy.set_id(None);
        copy.clear_volatile();
        for (_, reference) in copy.references_mut() {
            if reference.name.is_some() {
                reference.id = None;
            }
        }
        copy
    }
}

/// A service exposed through the gateway.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_timeout: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_certificate: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl GatewayEntity for Service {
    const KIND: Kind = Kind::Service;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn natural_key(&self) -> String {
        self.name.clone()
    }

    fn ref_name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn clear_volatile(&mut self) {
        self.created_at = None;
        self.updated_at = None;
    }

    fn references_mut(&mut self) -> Vec<(Kind, &mut Reference)> {
        let mut refs = Vec::new();
        if let Some(r) = self.client_certificate.as_mut() {
            refs.push((Kind::Certificate, r));
        }
        refs
    }
}

/// A route binding request matching rules to a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocols: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methods: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosts: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strip_path: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preserve_host: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl GatewayEntity for Route {
    const KIND: Kind = Kind::Route;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn natural_key(&self) -> String {
        self.name.clone()
    }

    fn ref_name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn clear_volatile(&mut self) {
        self.created_at = None;
        self.updated_at = None;
    }

    fn references_mut(&mut self) -> Vec<(Kind, &mut Reference)> {
        let mut refs = Vec::new();
        if let Some(r) = self.service.as_mut() {
            refs.push((Kind::Service, r));
        }
        refs
    }
}

/// A load-balancing upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Upstream {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slots: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthchecks: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl GatewayEntity for Upstream {
    const KIND: Kind = Kind::Upstream;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn natural_key(&self) -> String {
        self.name.clone()
    }

    fn ref_name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn clear_volatile(&mut self) {
        self.created_at = None;
        self.updated_at = None;
    }
}

/// A backend address within an upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Target {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl GatewayEntity for Target {
    const KIND: Kind = Kind::Target;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn natural_key(&self) -> String {
        format!("{}/{}", ref_key(&self.upstream), self.target)
    }

    fn clear_volatile(&mut self) {
        self.created_at = None;
        self.updated_at = None;
    }

    fn references_mut(&mut self) -> Vec<(Kind, &mut Reference)> {
        let mut refs = Vec::new();
        if let Some(r) = self.upstream.as_mut() {
            refs.push((Kind::Upstream, r));
        }
        refs
    }
}

/// A TLS certificate, identified by caller-assigned id.
///
/// `snis` mirrors the SNI entities currently attached to the certificate. It
/// is excluded from comparison (SNIs are reconciled as their own kind) but
/// carried on updates, because the remote API disassociates any SNI omitted
/// from a certificate update payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub cert: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snis: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl GatewayEntity for Certificate {
    const KIND: Kind = Kind::Certificate;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn natural_key(&self) -> String {
        self.id.clone().unwrap_or_default()
    }

    fn clear_volatile(&mut self) {
        self.created_at = None;
        self.updated_at = None;
        self.snis = None;
    }

    fn prepare_for_update(&mut self, current: &Self, state: &GatewayState) {
        // Re-attach the SNIs currently associated with this certificate, or
        // the remote system silently drops them on update.
        let id = current.id.as_deref().unwrap_or_default();
        let mut snis: Vec<String> = state
            .snis
            .iter()
            .filter(|s| {
                s.certificate
                    .as_ref()
                    .and_then(|r| r.id.as_deref())
                    .is_some_and(|cert_id| cert_id == id)
            })
            .map(|s| s.name.clone())
            .collect();
        snis.sort();
        if !snis.is_empty() {
            self.snis = Some(snis);
        }
    }
}

/// A trusted CA certificate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CACertificate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub cert: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl GatewayEntity for CACertificate {
    const KIND: Kind = Kind::CACertificate;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn natural_key(&self) -> String {
        self.id.clone().unwrap_or_default()
    }

    fn clear_volatile(&mut self) {
        self.created_at = None;
        self.updated_at = None;
        // Server-computed from the cert body.
        self.cert_digest = None;
    }
}

/// A server name indication entry, attached to a certificate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sni {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl GatewayEntity for Sni {
    const KIND: Kind = Kind::Sni;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn natural_key(&self) -> String {
        self.name.clone()
    }

    fn clear_volatile(&mut self) {
        self.created_at = None;
        self.updated_at = None;
    }

    fn references_mut(&mut self) -> Vec<(Kind, &mut Reference)> {
        let mut refs = Vec::new();
        if let Some(r) = self.certificate.as_mut() {
            refs.push((Kind::Certificate, r));
        }
        refs
    }
}

/// An API consumer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Consumer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl GatewayEntity for Consumer {
    const KIND: Kind = Kind::Consumer;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn natural_key(&self) -> String {
        self.username
            .clone()
            .or_else(|| self.custom_id.clone())
            .unwrap_or_default()
    }

    fn ref_name(&self) -> Option<&str> {
        self.username.as_deref().or(self.custom_id.as_deref())
    }

    fn clear_volatile(&mut self) {
        self.created_at = None;
        self.updated_at = None;
    }
}

/// A named group of consumers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsumerGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl GatewayEntity for ConsumerGroup {
    const KIND: Kind = Kind::ConsumerGroup;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn natural_key(&self) -> String {
        self.name.clone()
    }

    fn ref_name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn clear_volatile(&mut self) {
        self.created_at = None;
        self.updated_at = None;
    }
}

/// A secret-store backend configuration, keyed by prefix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vault {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub prefix: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl GatewayEntity for Vault {
    const KIND: Kind = Kind::Vault;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn natural_key(&self) -> String {
        self.prefix.clone()
    }

    fn clear_volatile(&mut self) {
        self.created_at = None;
        self.updated_at = None;
    }
}

/// A named set of cryptographic keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeySet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl GatewayEntity for KeySet {
    const KIND: Kind = Kind::KeySet;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn natural_key(&self) -> String {
        self.name.clone()
    }

    fn ref_name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn clear_volatile(&mut self) {
        self.created_at = None;
        self.updated_at = None;
    }
}

/// A cryptographic key, optionally scoped to a key set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Key {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub kid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl GatewayEntity for Key {
    const KIND: Kind = Kind::Key;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn natural_key(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.kid.clone())
    }

    fn clear_volatile(&mut self) {
        self.created_at = None;
        self.updated_at = None;
    }

    fn references_mut(&mut self) -> Vec<(Kind, &mut Reference)> {
        let mut refs = Vec::new();
        if let Some(r) = self.set.as_mut() {
            refs.push((Kind::KeySet, r));
        }
        refs
    }
}

/// A plugin instance, optionally scoped to a service, route, and/or consumer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plugin {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocols: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl GatewayEntity for Plugin {
    const KIND: Kind = Kind::Plugin;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn natural_key(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.name,
            ref_key(&self.service),
            ref_key(&self.route),
            ref_key(&self.consumer),
        )
    }

    fn display_name(&self) -> String {
        let mut scope = Vec::new();
        if let Some(s) = self.service.as_ref().and_then(Reference::key) {
            scope.push(format!("service {}", s));
        }
        if let Some(r) = self.route.as_ref().and_then(Reference::key) {
            scope.push(format!("route {}", r));
        }
        if let Some(c) = self.consumer.as_ref().and_then(Reference::key) {
            scope.push(format!("consumer {}", c));
        }
        if scope.is_empty() {
            format!("plugin '{}' (global)", self.name)
        } else {
            format!("plugin '{}' on {}", self.name, scope.join(", "))
        }
    }

    fn clear_volatile(&mut self) {
        self.created_at = None;
        self.updated_at = None;
    }

    fn references_mut(&mut self) -> Vec<(Kind, &mut Reference)> {
        let mut refs = Vec::new();
        if let Some(r) = self.service.as_mut() {
            refs.push((Kind::Service, r));
        }
        if let Some(r) = self.route.as_mut() {
            refs.push((Kind::Route, r));
        }
        if let Some(r) = self.consumer.as_mut() {
            refs.push((Kind::Consumer, r));
        }
        refs
    }
}

/// Error converting a [`Payload`] back into a concrete entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadError {
    pub expected: Kind,
    pub got: Kind,
}

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "payload kind mismatch: expected {}, got {}",
            self.expected, self.got
        )
    }
}

impl std::error::Error for PayloadError {}

macro_rules! payloads {
    ($($variant:ident),+ $(,)?) => {
        /// A gateway entity of any kind, carried through the event pipeline.
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(untagged)]
        pub enum Payload {
            $($variant($variant)),+
        }

        impl Payload {
            pub fn kind(&self) -> Kind {
                match self {
                    $(Self::$variant(_) => <$variant as GatewayEntity>::KIND),+
                }
            }

            pub fn id(&self) -> Option<&str> {
                match self {
                    $(Self::$variant(e) => e.id()),+
                }
            }

            pub fn set_id(&mut self, id: Option<String>) {
                match self {
                    $(Self::$variant(e) => e.set_id(id)),+
                }
            }

            pub fn natural_key(&self) -> String {
                match self {
                    $(Self::$variant(e) => e.natural_key()),+
                }
            }

            pub fn display_name(&self) -> String {
                match self {
                    $(Self::$variant(e) => e.display_name()),+
                }
            }

            /// JSON rendering for diff display and reports.
            pub fn to_value(&self) -> Value {
                match self {
                    $(Self::$variant(e) => serde_json::to_value(e).unwrap_or(Value::Null)),+
                }
            }
        }

        $(
            impl From<$variant> for Payload {
                fn from(e: $variant) -> Self {
                    Self::$variant(e)
                }
            }

            impl TryFrom<Payload> for $variant {
                type Error = PayloadError;

                fn try_from(p: Payload) -> Result<Self, Self::Error> {
                    match p {
                        Payload::$variant(e) => Ok(e),
                        other => Err(PayloadError {
                            expected: <$variant as GatewayEntity>::KIND,
                            got: other.kind(),
                        }),
                    }
                }
            }
        )+
    };
}

payloads!(
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
