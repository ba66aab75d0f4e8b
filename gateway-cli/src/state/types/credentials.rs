//! Consumer credential entities
//!
//! All credential kinds are parented by a consumer and keyed either by their
//! own unique field (API key, JWT key) or by a consumer-scoped composite.

use serde::{Deserialize, Serialize};

use super::{GatewayEntity, Kind, Reference, ref_key};

/// An API-key credential.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl GatewayEntity for KeyAuth {
    const KIND: Kind = Kind::KeyAuth;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn natural_key(&self) -> String {
        self.key.clone()
    }

    fn display_name(&self) -> String {
        format!(
            "key_auth for consumer '{}'",
            ref_key(&self.consumer)
        )
    }

    fn clear_volatile(&mut self) {
        self.created_at = None;
        self.updated_at = None;
    }

    fn references_mut(&mut self) -> Vec<(Kind, &mut Reference)> {
        let mut refs = Vec::new();
        if let Some(r) = self.consumer.as_mut() {
            refs.push((Kind::Consumer, r));
        }
        refs
    }
}

/// A username/password credential.
///
/// The remote system stores the password hashed, so it cannot be read back
/// and is excluded from comparison; password rotation requires recreating
/// the credential.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasicAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl GatewayEntity for BasicAuth {
    const KIND: Kind = Kind::BasicAuth;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn natural_key(&self) -> String {
        self.username.clone()
    }

    fn clear_volatile(&mut self) {
        self.created_at = None;
        self.updated_at = None;
        self.password = None;
    }

    fn references_mut(&mut self) -> Vec<(Kind, &mut Reference)> {
        let mut refs = Vec::new();
        if let Some(r) = self.consumer.as_mut() {
            refs.push((Kind::Consumer, r));
        }
        refs
    }
}

/// A JWT credential.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JwtAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rsa_public_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl GatewayEntity for JwtAuth {
    const KIND: Kind = Kind::JwtAuth;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn natural_key(&self) -> String {
        self.key.clone()
    }

    fn clear_volatile(&mut self) {
        self.created_at = None;
        self.updated_at = None;
    }

    fn references_mut(&mut self) -> Vec<(Kind, &mut Reference)> {
        let mut refs = Vec::new();
        if let Some(r) = self.consumer.as_mut() {
            refs.push((Kind::Consumer, r));
        }
        refs
    }
}

/// An HMAC signature credential.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HmacAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl GatewayEntity for HmacAuth {
    const KIND: Kind = Kind::HmacAuth;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn natural_key(&self) -> String {
        self.username.clone()
    }

    fn clear_volatile(&mut self) {
        self.created_at = None;
        self.updated_at = None;
    }

    fn references_mut(&mut self) -> Vec<(Kind, &mut Reference)> {
        let mut refs = Vec::new();
        if let Some(r) = self.consumer.as_mut() {
            refs.push((Kind::Consumer, r));
        }
        refs
    }
}

/// Membership of a consumer in an access-control group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AclGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl GatewayEntity for AclGroup {
    const KIND: Kind = Kind::AclGroup;

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }

    fn natural_key(&self) -> String {
        format!("{}/{}", ref_key(&self.consumer), self.group)
    }

    fn display_name(&self) -> String {
        format!(
            "acl_group '{}' for consumer '{}'",
            self.group,
            ref_key(&self.consumer)
        )
    }

    fn clear_volatile(&mut self) {
        self.created_at = None;
        self.updated_at = None;
    }

    fn references_mut(&mut self) -> Vec<(Kind, &mut Reference)> {
        let mut refs = Vec::new();
        if let Some(r) = self.consumer.as_mut() {
            refs.push((Kind::Consumer, r));
        }
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_auth_password_excluded_from_comparison() {
        let stored = BasicAuth {
            username: "alice".to_string(),
            password: Some("$2b$09$hashedhashedhashed".to_string()),
            ..Default::default()
        };
        let declared = BasicAuth {
            username: "alice".to_string(),
            password: Some("plaintext".to_string()),
            ..Default::default()
        };
        assert_eq!(
            stored.normalized_for_compare(),
            declared.normalized_for_compare()
        );
    }

    #[test]
    fn test_acl_group_scoped_by_consumer() {
        let a = AclGroup {
            group: "admins".to_string(),
            consumer: Some(Reference::by_name("alice")),
            ..Default::default()
        };
        let b = AclGroup {
            group: "admins".to_string(),
            consumer: Some(Reference::by_name("bob")),
            ..Default::default()
        };
        assert_ne!(a.natural_key(), b.natural_key());
    }
}
