//! Target-state loader
//!
//! Reads a declarative YAML state file (JSON works too, being a YAML
//! subset) into typed entities and builds a [`GatewayState`]. Duplicate
//! natural keys in the file are a hard error.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::state::GatewayState;
use crate::state::store::StoreError;
use crate::state::types::{
    AclGroup, BasicAuth, CACertificate, Certificate, Consumer, ConsumerGroup, Document, HmacAuth,
    JwtAuth, Key, KeyAuth, KeySet, Plugin, RbacEndpointPermission, RbacRole, Route, Service,
    ServicePackage, ServiceVersion, Sni, Target, Upstream, Vault,
};

#[derive(Debug)]
pub enum LoadError {
    Io(std::io::Error),
    Parse(serde_yaml::Error),
    State(StoreError),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "reading state file: {}", err),
            Self::Parse(err) => write!(f, "parsing state file: {}", err),
            Self::State(err) => write!(f, "invalid state file: {}", err),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::State(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for LoadError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_yaml::Error> for LoadError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Parse(err)
    }
}

impl From<StoreError> for LoadError {
    fn from(err: StoreError) -> Self {
        Self::State(err)
    }
}

/// On-disk shape of a declarative state file.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct StateFile {
    #[serde(
        default,
        rename = "_format_version",
        skip_serializing_if = "Option::is_none"
    )]
    pub format_version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_packages: Vec<ServicePackage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certificates: Vec<Certificate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ca_certificates: Vec<CACertificate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consumers: Vec<Consumer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consumer_groups: Vec<ConsumerGroup>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rbac_roles: Vec<RbacRole>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vaults: Vec<Vault>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_sets: Vec<KeySet>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<Service>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upstreams: Vec<Upstream>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snis: Vec<Sni>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<Key>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rbac_endpoint_permissions: Vec<RbacEndpointPermission>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_auths: Vec<KeyAuth>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub basic_auths: Vec<BasicAuth>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub jwt_auths: Vec<JwtAuth>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hmac_auths: Vec<HmacAuth>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acl_groups: Vec<AclGroup>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<Target>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_versions: Vec<ServiceVersion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<Plugin>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub documents: Vec<Document>,
}

impl StateFile {
    pub fn parse(text: &str) -> Result<Self, LoadError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Build the target [`GatewayState`], rejecting duplicate natural keys.
    pub fn build(self) -> Result<GatewayState, LoadError> {
        let mut state = GatewayState::new();
        macro_rules! fill {
            ($($field:ident),+ $(,)?) => {
                $(
                    for entity in self.$field {
                        state.$field.add(entity)?;
                    }
                )+
            };
        }
        fill!(
            service_packages,
            certificates,
            ca_certificates,
            consumers,
            consumer_groups,
            rbac_roles,
            vaults,
            key_sets,
            services,
            upstreams,
            snis,
            keys,
            rbac_endpoint_permissions,
            key_auths,
            basic_auths,
            jwt_auths,
            hmac_auths,
            acl_groups,
            routes,
            targets,
            service_versions,
            plugins,
            documents,
        );
        Ok(state)
    }

    /// Snapshot a state back into file form, for `dump`.
    pub fn from_state(state: &GatewayState) -> Self {
        let mut file = StateFile {
            format_version: Some("1.1".to_string()),
            ..Default::default()
        };
        macro_rules! drain {
            ($($field:ident),+ $(,)?) => {
                $(file.$field = state.$field.sorted().into_iter().cloned().collect();)+
            };
        }
        drain!(
            service_packages,
            certificates,
            ca_certificates,
            consumers,
            consumer_groups,
            rbac_roles,
            vaults,
            key_sets,
            services,
            upstreams,
            snis,
            keys,
            rbac_endpoint_permissions,
            key_auths,
            basic_auths,
            jwt_auths,
            hmac_auths,
            acl_groups,
            routes,
            targets,
            service_versions,
            plugins,
            documents,
        );
        file
    }
}

/// Read and build the target state from a file path.
pub fn load_state(path: &Path) -> Result<GatewayState, LoadError> {
    let text = std::fs::read_to_string(path)?;
    StateFile::parse(&text)?.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
_format_version: "1.1"
services:
  - name: web
    host: example.test
    port: 443
routes:
  - name: r1
    paths: ["/api"]
    service:
      name: web
"#;

    #[test]
    fn test_parse_yaml_state_file() {
        let state = StateFile::parse(SAMPLE).unwrap().build().unwrap();
        assert_eq!(state.services.get("web").unwrap().port, Some(443));
        let route = state.routes.get("r1").unwrap();
        assert_eq!(
            route.service.as_ref().unwrap().name.as_deref(),
            Some("web")
        );
    }

    #[test]
    fn test_json_is_accepted() {
        let text = r#"{"services": [{"name": "web"}]}"#;
        let state = StateFile::parse(text).unwrap().build().unwrap();
        assert_eq!(state.services.len(), 1);
    }

    #[test]
    fn test_duplicate_natural_key_rejected() {
        let text = r#"
services:
  - name: web
  - name: web
"#;
        let err = StateFile::parse(text).unwrap().build().unwrap_err();
        assert!(matches!(err, LoadError::State(StoreError::Duplicate { .. })));
    }

    #[test]
    fn test_round_trip_through_file_form() {
        let state = StateFile::parse(SAMPLE).unwrap().build().unwrap();
        let file = StateFile::from_state(&state);
        assert_eq!(file.services.len(), 1);
        assert_eq!(file.routes.len(), 1);
        let rebuilt = file.build().unwrap();
        assert_eq!(rebuilt.total(), 2);
    }
}
