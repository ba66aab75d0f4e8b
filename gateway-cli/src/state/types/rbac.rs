//! RBAC entities

use serde::{Deserialize, Serialize};

use super::{GatewayEntity, Kind, Reference, ref_key};

/// A named RBAC role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RbacRole {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl GatewayEntity for RbacRole {
    const KIND: Kind = Kind::RbacRole;

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

/// An endpoint permission attached to a role.
///
/// Endpoint permissions have no server-assigned identifier; the
/// role + workspace + endpoint composite identifies them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RbacEndpointPermission {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl GatewayEntity for RbacEndpointPermission {
    const KIND: Kind = Kind::RbacEndpointPermission;

    fn id(&self) -> Option<&str> {
        None
    }

    fn set_id(&mut self, _id: Option<String>) {}

    fn natural_key(&self) -> String {
        format!(
            "{}/{}/{}",
            ref_key(&self.role),
            self.workspace.as_deref().unwrap_or("*"),
            self.endpoint,
        )
    }

    fn display_name(&self) -> String {
        format!(
            "rbac_endpoint_permission '{}' for role '{}'",
            self.endpoint,
            ref_key(&self.role)
        )
    }

    fn clear_volatile(&mut self) {
        self.created_at = None;
        self.updated_at = None;
    }

    fn references_mut(&mut self) -> Vec<(Kind, &mut Reference)> {
        let mut refs = Vec::new();
        if let Some(r) = self.role.as_mut() {
            refs.push((Kind::RbacRole, r));
        }
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_permission_key_includes_workspace() {
        let default_ws = RbacEndpointPermission {
            endpoint: "/services".to_string(),
            role: Some(Reference::by_name("read-only")),
            ..Default::default()
        };
        let scoped_ws = RbacEndpointPermission {
            workspace: Some("team-a".to_string()),
            endpoint: "/services".to_string(),
            role: Some(Reference::by_name("read-only")),
            ..Default::default()
        };
        assert_ne!(default_ws.natural_key(), scoped_ws.natural_key());
    }
}
