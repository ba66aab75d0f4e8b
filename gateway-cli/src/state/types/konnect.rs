//! Service-catalog entities (packages, versions, documents)

use serde::{Deserialize, Serialize};

use super::{GatewayEntity, Kind, Reference, ref_key};

/// A catalog entry grouping versions of one service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServicePackage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl GatewayEntity for ServicePackage {
    const KIND: Kind = Kind::ServicePackage;

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

/// One version of a service package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceVersion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl GatewayEntity for ServiceVersion {
    const KIND: Kind = Kind::ServiceVersion;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn natural_key(&self) -> String {
        format!("{}/{}", ref_key(&self.package), self.version)
    }

    fn display_name(&self) -> String {
        format!(
            "service_version '{}' of package '{}'",
            self.version,
            ref_key(&self.package)
        )
    }

    fn clear_volatile(&mut self) {
        self.created_at = None;
        self.updated_at = None;
    }

    fn references_mut(&mut self) -> Vec<(Kind, &mut Reference)> {
        let mut refs = Vec::new();
        if let Some(r) = self.package.as_mut() {
            refs.push((Kind::ServicePackage, r));
        }
        refs
    }
}

/// A documentation page attached to a service package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl GatewayEntity for Document {
    const KIND: Kind = Kind::Document;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn natural_key(&self) -> String {
        format!("{}/{}", ref_key(&self.package), self.path)
    }

    fn display_name(&self) -> String {
        format!(
            "document '{}' of package '{}'",
            self.path,
            ref_key(&self.package)
        )
    }

    fn clear_volatile(&mut self) {
        self.created_at = None;
        self.updated_at = None;
    }

    fn references_mut(&mut self) -> Vec<(Kind, &mut Reference)> {
        let mut refs = Vec::new();
        if let Some(r) = self.package.as_mut() {
            refs.push((Kind::ServicePackage, r));
        }
        refs
    }
}
