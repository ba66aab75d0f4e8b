//! Per-kind state comparison
//!
//! The differ walks one entity kind at a time and emits events describing
//! how to move the current state toward the target state. Matching is by
//! natural key; equality is structural over the normalized form (identifier,
//! timestamps and other volatile fields stripped, references reduced to
//! natural keys). A reference that resolves against neither the current
//! state nor the target state fails that entity's event only.

pub mod order;

use serde::Serialize;
use std::fmt;

use crate::state::types::{
    AclGroup, BasicAuth, CACertificate, Certificate, Consumer, ConsumerGroup, Document,
    GatewayEntity, HmacAuth, JwtAuth, Key, KeyAuth, KeySet, Kind, Payload, Plugin,
    RbacEndpointPermission, RbacRole, Route, Service, ServicePackage, ServiceVersion, Sni, Target,
    Upstream, Vault,
};
use crate::state::{GatewayState, ResolveError, StateSlice};

/// The action an event performs against the remote system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOp {
    Create,
    Update,
    Delete,
}

impl EventOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for EventOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of reconciliation work.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub op: EventOp,
    pub kind: Kind,
    /// The entity to send: target form for creates and updates (identifier
    /// and references resolved), current form for deletes.
    pub obj: Payload,
    /// The current form of the entity, present on updates only.
    pub old_obj: Option<Payload>,
}

impl Event {
    pub fn describe(&self) -> String {
        format!("{} {}", self.op, self.obj.display_name())
    }
}

/// Resolve the foreign references of an outgoing entity.
///
/// Resolution is against the current state; a parent missing there but
/// present in the target state is pending creation at a lower level, so the
/// reference is left in natural-key form for the executor to resolve after
/// that level lands.
fn resolve_refs<E: GatewayEntity>(
    current: &GatewayState,
    target: &GatewayState,
    entity: &mut E,
) -> Result<(), ResolveError> {
    let display = entity.display_name();
    for (kind, reference) in entity.references_mut() {
        if reference.is_empty() {
            continue;
        }
        let key = reference.key().unwrap_or_default().to_string();
        if current.resolve_reference(kind, reference).is_ok() {
            continue;
        }
        if target.contains(kind, &key) {
            continue;
        }
        return Err(ResolveError {
            entity: display,
            parent_kind: kind,
            parent_key: key,
        });
    }
    Ok(())
}

/// Diff a single kind: deletes for current entities absent from the target,
/// creates for target entities absent from the current state, updates where
/// the normalized forms differ.
pub fn events_for_kind<E>(
    current: &GatewayState,
    target: &GatewayState,
) -> (Vec<Event>, Vec<ResolveError>)
where
    E: GatewayEntity,
    GatewayState: StateSlice<E>,
    Payload: From<E>,
{
    let current_store = StateSlice::<E>::store(current);
    let target_store = StateSlice::<E>::store(target);
    let mut events = Vec::new();
    let mut errors = Vec::new();

    for existing in current_store.sorted() {
        if target_store.get(&existing.natural_key()).is_err() {
            events.push(Event {
                op: EventOp::Delete,
                kind: E::KIND,
                obj: existing.clone().into(),
                old_obj: None,
            });
        }
    }

    for desired in target_store.sorted() {
        match current_store.get(&desired.natural_key()) {
            Err(_) => {
                let mut obj = desired.clone();
                match resolve_refs(current, target, &mut obj) {
                    Ok(()) => events.push(Event {
                        op: EventOp::Create,
                        kind: E::KIND,
                        obj: obj.into(),
                        old_obj: None,
                    }),
                    Err(err) => errors.push(err),
                }
            }
            Ok(existing) => {
                if existing.normalized_for_compare() == desired.normalized_for_compare() {
                    continue;
                }
                let mut obj = desired.clone();
                obj.set_id(existing.id().map(str::to_string));
                match resolve_refs(current, target, &mut obj) {
                    Ok(()) => {
                        obj.prepare_for_update(existing, current);
                        events.push(Event {
                            op: EventOp::Update,
                            kind: E::KIND,
                            obj: obj.into(),
                            old_obj: Some(existing.clone().into()),
                        });
                    }
                    Err(err) => errors.push(err),
                }
            }
        }
    }

    (events, errors)
}

/// Diff one kind chosen at runtime.
pub fn events_for(
    kind: Kind,
    current: &GatewayState,
    target: &GatewayState,
) -> (Vec<Event>, Vec<ResolveError>) {
    macro_rules! dispatch {
        ($($variant:ident),+ $(,)?) => {
            match kind {
                $(Kind::$variant => events_for_kind::<$variant>(current, target)),+
            }
        };
    }
    dispatch!(
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
    )
}

/// The full ordered plan: deletes walking levels downward, then creates and
/// updates walking levels upward. This is the order the solver executes in.
pub fn plan(current: &GatewayState, target: &GatewayState) -> (Vec<Event>, Vec<ResolveError>) {
    let mut events = Vec::new();
    let mut errors = Vec::new();
    for kinds in order::delete_order() {
        for kind in kinds {
            let (evs, _) = events_for(*kind, current, target);
            events.extend(evs.into_iter().filter(|e| e.op == EventOp::Delete));
        }
    }
    for kinds in order::insert_order() {
        for kind in kinds {
            let (evs, errs) = events_for(*kind, current, target);
            events.extend(evs.into_iter().filter(|e| e.op != EventOp::Delete));
            errors.extend(errs);
        }
    }
    (events, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::types::Reference;

    fn current_with_service() -> GatewayState {
        let mut state = GatewayState::new();
        state
            .services
            .add(Service {
                id: Some("s1".to_string()),
                name: "web".to_string(),
                host: Some("old.test".to_string()),
                created_at: Some(1000),
                ..Default::default()
            })
            .unwrap();
        state
    }

    #[test]
    fn test_update_copies_current_id() {
        let current = current_with_service();
        let mut target = GatewayState::new();
        target
            .services
            .add(Service {
                name: "web".to_string(),
                host: Some("new.test".to_string()),
                ..Default::default()
            })
            .unwrap();

        let (events, errors) = events_for_kind::<Service>(&current, &target);
        assert!(errors.is_empty());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].op, EventOp::Update);
        assert_eq!(events[0].obj.id(), Some("s1"));
        assert!(events[0].old_obj.is_some());
    }

    #[test]
    fn test_create_resolves_reference_to_current_parent() {
        let current = current_with_service();
        let mut target = current.clone();
        target
            .routes
            .add(Route {
                name: "r1".to_string(),
                service: Some(Reference::by_name("web")),
                ..Default::default()
            })
            .unwrap();

        let (events, errors) = events_for_kind::<Route>(&current, &target);
        assert!(errors.is_empty());
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].op, EventOp::Create);
        let route = Route::try_from(events[0].obj.clone()).unwrap();
        assert_eq!(route.service.unwrap().id.as_deref(), Some("s1"));
    }

    #[test]
    fn test_pending_parent_is_not_an_error() {
        let current = GatewayState::new();
        let mut target = GatewayState::new();
        target
            .services
            .add(Service {
                name: "web".to_string(),
                ..Default::default()
            })
            .unwrap();
        target
            .routes
            .add(Route {
                name: "r1".to_string(),
                service: Some(Reference::by_name("web")),
                ..Default::default()
            })
            .unwrap();

        let (events, errors) = events_for_kind::<Route>(&current, &target);
        assert!(errors.is_empty());
        assert_eq!(events.len(), 1);
        // Left in natural-key form until the service level lands.
        let route = Route::try_from(events[0].obj.clone()).unwrap();
        assert!(route.service.as_ref().unwrap().id.is_none());
    }

    #[test]
    fn test_missing_parent_fails_only_that_entity() {
        let current = GatewayState::new();
        let mut target = GatewayState::new();
        target
            .routes
            .add(Route {
                name: "bad".to_string(),
                service: Some(Reference::by_name("ghost")),
                ..Default::default()
            })
            .unwrap();
        target
            .routes
            .add(Route {
                name: "good".to_string(),
                ..Default::default()
            })
            .unwrap();

        let (events, errors) = events_for_kind::<Route>(&current, &target);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].parent_key, "ghost");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].obj.natural_key(), "good");
    }

    #[test]
    fn test_identical_states_produce_no_events() {
        let current = current_with_service();
        let mut target = GatewayState::new();
        // Same entity without server-maintained fields.
        target
            .services
            .add(Service {
                name: "web".to_string(),
                host: Some("old.test".to_string()),
                ..Default::default()
            })
            .unwrap();

        let (events, errors) = plan(&current, &target);
        assert!(errors.is_empty());
        assert!(events.is_empty());
    }

    #[test]
    fn test_delete_carries_current_entity() {
        let current = current_with_service();
        let target = GatewayState::new();

        let (events, _) = events_for_kind::<Service>(&current, &target);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].op, EventOp::Delete);
        assert_eq!(events[0].obj.id(), Some("s1"));
    }

    #[test]
    fn test_certificate_update_reattaches_current_snis() {
        let mut current = GatewayState::new();
        current
            .certificates
            .add(Certificate {
                id: Some("c1".to_string()),
                cert: "OLD".to_string(),
                key: "K".to_string(),
                ..Default::default()
            })
            .unwrap();
        current
            .snis
            .add(Sni {
                id: Some("n1".to_string()),
                name: "api.example.test".to_string(),
                certificate: Some(Reference::by_id("c1")),
                ..Default::default()
            })
            .unwrap();

        let mut target = GatewayState::new();
        target
            .certificates
            .add(Certificate {
                id: Some("c1".to_string()),
                cert: "NEW".to_string(),
                key: "K".to_string(),
                ..Default::default()
            })
            .unwrap();

        let (events, errors) = events_for_kind::<Certificate>(&current, &target);
        assert!(errors.is_empty());
        assert_eq!(events.len(), 1);
        let cert = Certificate::try_from(events[0].obj.clone()).unwrap();
        assert_eq!(cert.snis, Some(vec!["api.example.test".to_string()]));
    }

    #[test]
    fn test_plan_orders_deletes_before_creates() {
        // Consumer delete must be planned after its credential delete, and
        // all deletes precede creates.
        let mut current = GatewayState::new();
        current
            .consumers
            .add(Consumer {
                id: Some("u1".to_string()),
                username: Some("alice".to_string()),
                ..Default::default()
            })
            .unwrap();
        current
            .key_auths
            .add(KeyAuth {
                id: Some("k1".to_string()),
                key: "secret".to_string(),
                consumer: Some(Reference::by_name("alice")),
                ..Default::default()
            })
            .unwrap();

        let mut target = GatewayState::new();
        target
            .services
            .add(Service {
                name: "web".to_string(),
                ..Default::default()
            })
            .unwrap();

        let (events, errors) = plan(&current, &target);
        assert!(errors.is_empty());
        let ops: Vec<(EventOp, Kind)> = events.iter().map(|e| (e.op, e.kind)).collect();
        assert_eq!(
            ops,
            vec![
                (EventOp::Delete, Kind::KeyAuth),
                (EventOp::Delete, Kind::Consumer),
                (EventOp::Create, Kind::Service),
            ]
        );
    }
}
