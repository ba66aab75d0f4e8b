//! Indexed in-memory collections of gateway entities
//!
//! An [`EntityStore`] holds all entities of one kind for a state snapshot.
//! Entities are keyed by their natural key (name, username, or a composite
//! for parent-scoped kinds) and secondarily indexed by the server-assigned
//! identifier, so lookups work with either.

use std::collections::HashMap;

use crate::state::types::{GatewayEntity, Kind};

/// Error returned by store lookups and mutations.
///
/// `NotFound` is a positive signal for the differ (it drives create/delete
/// decisions) and must never be conflated with the other variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No entity with the given id or natural key exists.
    NotFound { kind: Kind, key: String },
    /// An entity with the same natural key is already present.
    Duplicate { kind: Kind, key: String },
    /// The entity has no usable natural key (all key fields empty).
    MissingKey { kind: Kind },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { kind, key } => write!(f, "{} '{}' not found", kind, key),
            Self::Duplicate { kind, key } => {
                write!(f, "duplicate {} '{}'", kind, key)
            }
            Self::MissingKey { kind } => write!(f, "{} has no identifying key", kind),
        }
    }
}

impl std::error::Error for StoreError {}

impl StoreError {
    /// Whether this is the not-found sentinel.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// An indexed collection of entities of a single kind.
#[derive(Debug, Clone)]
pub struct EntityStore<E: GatewayEntity> {
    /// Natural key -> entity.
    by_key: HashMap<String, E>,
    /// Server-assigned identifier -> natural key.
    by_id: HashMap<String, String>,
}

impl<E: GatewayEntity> Default for EntityStore<E> {
    fn default() -> Self {
        Self {
            by_key: HashMap::new(),
            by_id: HashMap::new(),
        }
    }
}

impl<E: GatewayEntity> EntityStore<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an entity by primary identifier or natural key.
    pub fn get(&self, key: &str) -> Result<&E, StoreError> {
        if let Some(natural) = self.by_id.get(key)
            && let Some(entity) = self.by_key.get(natural)
        {
            return Ok(entity);
        }
        self.by_key.get(key).ok_or_else(|| StoreError::NotFound {
            kind: E::KIND,
            key: key.to_string(),
        })
    }

    /// Insert a new entity. Fails on a duplicate natural key.
    pub fn add(&mut self, entity: E) -> Result<(), StoreError> {
        let key = entity.natural_key();
        if key.is_empty() {
            return Err(StoreError::MissingKey { kind: E::KIND });
        }
        if self.by_key.contains_key(&key) {
            return Err(StoreError::Duplicate { kind: E::KIND, key });
        }
        if let Some(id) = entity.id() {
            self.by_id.insert(id.to_string(), key.clone());
        }
        self.by_key.insert(key, entity);
        Ok(())
    }

    /// Replace an existing entity, matched by natural key.
    pub fn update(&mut self, entity: E) -> Result<(), StoreError> {
        let key = entity.natural_key();
        if !self.by_key.contains_key(&key) {
            return Err(StoreError::NotFound { kind: E::KIND, key });
        }
        if let Some(id) = entity.id() {
            self.by_id.insert(id.to_string(), key.clone());
        }
        self.by_key.insert(key, entity);
        Ok(())
    }

    /// Remove an entity by identifier or natural key.
    pub fn delete(&mut self, key: &str) -> Result<E, StoreError> {
        let natural = match self.by_id.get(key) {
            Some(natural) => natural.clone(),
            None => key.to_string(),
        };
        let entity = self
            .by_key
            .remove(&natural)
            .ok_or_else(|| StoreError::NotFound {
                kind: E::KIND,
                key: key.to_string(),
            })?;
        if let Some(id) = entity.id() {
            self.by_id.remove(id);
        }
        Ok(entity)
    }

    /// Iterate over all entities, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.by_key.values()
    }

    /// All entities sorted by natural key, for deterministic traversal.
    pub fn sorted(&self) -> Vec<&E> {
        let mut entries: Vec<(&String, &E)> = self.by_key.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter().map(|(_, e)| e).collect()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::types::{Plugin, Reference, Service};

    fn service(id: &str, name: &str) -> Service {
        Service {
            id: Some(id.to_string()),
            name: name.to_string(),
            host: Some("example.test".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_get_by_id_and_natural_key() {
        let mut store = EntityStore::new();
        store.add(service("s1", "web")).unwrap();

        assert_eq!(store.get("web").unwrap().id.as_deref(), Some("s1"));
        assert_eq!(store.get("s1").unwrap().name, "web");
    }

    #[test]
    fn test_not_found_is_sentinel() {
        let store: EntityStore<Service> = EntityStore::new();
        let err = store.get("missing").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(
            err,
            StoreError::NotFound {
                kind: Kind::Service,
                key: "missing".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_add_rejected() {
        let mut store = EntityStore::new();
        store.add(service("s1", "web")).unwrap();
        let err = store.add(service("s2", "web")).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }

    #[test]
    fn test_delete_by_id_removes_both_indexes() {
        let mut store = EntityStore::new();
        store.add(service("s1", "web")).unwrap();

        let removed = store.delete("s1").unwrap();
        assert_eq!(removed.name, "web");
        assert!(store.get("web").unwrap_err().is_not_found());
        assert!(store.get("s1").unwrap_err().is_not_found());
    }

    #[test]
    fn test_update_replaces_entity() {
        let mut store = EntityStore::new();
        store.add(service("s1", "web")).unwrap();

        let mut changed = service("s1", "web");
        changed.host = Some("other.test".to_string());
        store.update(changed).unwrap();

        assert_eq!(store.get("web").unwrap().host.as_deref(), Some("other.test"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_global_plugin_distinct_from_scoped() {
        let mut store = EntityStore::new();
        let global = Plugin {
            name: "rate-limiting".to_string(),
            ..Default::default()
        };
        let scoped = Plugin {
            name: "rate-limiting".to_string(),
            service: Some(Reference::by_name("web")),
            ..Default::default()
        };
        store.add(global).unwrap();
        // An absent scope component is distinct from any concrete value.
        store.add(scoped).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_sorted_is_deterministic() {
        let mut store = EntityStore::new();
        store.add(service("s2", "beta")).unwrap();
        store.add(service("s1", "alpha")).unwrap();
        let names: Vec<&str> = store.sorted().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }
}
