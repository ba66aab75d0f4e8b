//! Current-state dump
//!
//! Fetches every collection from the admin API and assembles a
//! [`GatewayState`]. Top-level collections are fetched concurrently; nested
//! collections (targets, endpoint permissions, versions, documents) fan out
//! per parent. Entities are inserted in dependency order so reference names
//! can be backfilled from parents already in the state, keeping composite
//! natural keys identical between dumped and declared snapshots.

use anyhow::{Context, Result};
use futures::future::try_join_all;
use log::debug;
use serde_json::Value;

use crate::api::AdminClient;
use crate::state::types::{
    AclGroup, BasicAuth, CACertificate, Certificate, Consumer, ConsumerGroup, Document,
    GatewayEntity, HmacAuth, JwtAuth, Key, KeyAuth, KeySet, Plugin, RbacEndpointPermission,
    RbacRole, Reference, Route, Service, ServicePackage, ServiceVersion, Sni, Target, Upstream,
    Vault,
};
use crate::state::{GatewayState, StateSlice};

/// What to include in a dump.
#[derive(Debug, Clone, Default)]
pub struct DumpOptions {
    /// Keep only entities carrying at least one of these tags.
    pub select_tags: Vec<String>,
    /// Leave out consumers and their credentials.
    pub skip_consumers: bool,
    /// Dump RBAC roles and endpoint permissions, nothing else.
    pub rbac_resources_only: bool,
}

fn tags_match(value: &Value, select: &[String]) -> bool {
    if select.is_empty() {
        return true;
    }
    value
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .any(|tag| select.iter().any(|s| s == tag))
        })
        .unwrap_or(false)
}

fn decode<E: GatewayEntity>(items: Vec<Value>, select: &[String]) -> Result<Vec<E>> {
    items
        .into_iter()
        .filter(|value| tags_match(value, select))
        .map(|value| {
            serde_json::from_value(value).with_context(|| format!("decoding {} entity", E::KIND))
        })
        .collect()
}

/// Insert entities, backfilling reference names from parents already in the
/// state. A reference whose parent was filtered out of the dump is left
/// as-is.
fn insert_all<E>(state: &mut GatewayState, entities: Vec<E>) -> Result<()>
where
    E: GatewayEntity,
    GatewayState: StateSlice<E>,
{
    for mut entity in entities {
        if let Err(err) = state.resolve_entity_references(&mut entity) {
            debug!("dump: {}", err);
        }
        let display = entity.display_name();
        StateSlice::<E>::store_mut(state)
            .add(entity)
            .with_context(|| format!("inserting {}", display))?;
    }
    Ok(())
}

/// Parent segment for nested collection fetches.
fn parent_key(id: Option<&str>, name: Option<&str>) -> Option<String> {
    id.or(name).map(|k| urlencoding::encode(k).into_owned())
}

async fn fetch_nested(
    client: &AdminClient,
    parents: &[(String, Reference)],
    path: impl Fn(&str) -> String,
) -> Result<Vec<(Reference, Vec<Value>)>> {
    let fetches = parents.iter().map(|(key, reference)| {
        let path = path(key);
        async move {
            let items = client.list_all(&path).await?;
            Ok::<_, crate::api::ApiError>((reference.clone(), items))
        }
    });
    try_join_all(fetches)
        .await
        .context("fetching nested collections")
}

/// Fetch the complete current state from the admin API.
pub async fn fetch_state(client: &AdminClient, options: &DumpOptions) -> Result<GatewayState> {
    let select = &options.select_tags;
    let mut state = GatewayState::new();

    let rbac_roles: Vec<RbacRole> = decode(
        client
            .list_all("/rbac/roles")
            .await
            .context("fetching rbac roles")?,
        &[],
    )?;

    let role_parents: Vec<(String, Reference)> = rbac_roles
        .iter()
        .filter_map(|role| {
            parent_key(role.id.as_deref(), Some(role.name.as_str())).map(|key| {
                (
                    key,
                    Reference {
                        id: role.id.clone(),
                        name: Some(role.name.clone()),
                    },
                )
            })
        })
        .collect();

    insert_all(&mut state, rbac_roles)?;

    for (role, items) in fetch_nested(client, &role_parents, |key| {
        format!("/rbac/roles/{}/endpoints", key)
    })
    .await?
    {
        let mut permissions: Vec<RbacEndpointPermission> = decode(items, &[])?;
        for permission in &mut permissions {
            if permission.role.as_ref().is_none_or(Reference::is_empty) {
                permission.role = Some(role.clone());
            }
        }
        insert_all(&mut state, permissions)?;
    }

    if options.rbac_resources_only {
        return Ok(state);
    }

    let (
        service_packages,
        certificates,
        ca_certificates,
        consumer_groups,
        vaults,
        key_sets,
        services,
        upstreams,
        snis,
        keys,
        routes,
        plugins,
    ) = tokio::try_join!(
        client.list_all("/service_packages"),
        client.list_all("/certificates"),
        client.list_all("/ca_certificates"),
        client.list_all("/consumer_groups"),
        client.list_all("/vaults"),
        client.list_all("/key-sets"),
        client.list_all("/services"),
        client.list_all("/upstreams"),
        client.list_all("/snis"),
        client.list_all("/keys"),
        client.list_all("/routes"),
        client.list_all("/plugins"),
    )
    .context("fetching collections")?;

    // Level 0.
    let service_packages: Vec<ServicePackage> = decode(service_packages, select)?;
    let package_parents: Vec<(String, Reference)> = service_packages
        .iter()
        .filter_map(|package| {
            parent_key(package.id.as_deref(), Some(package.name.as_str())).map(|key| {
                (
                    key,
                    Reference {
                        id: package.id.clone(),
                        name: Some(package.name.clone()),
                    },
                )
            })
        })
        .collect();
    insert_all(&mut state, service_packages)?;
    insert_all(&mut state, decode::<Certificate>(certificates, select)?)?;
    insert_all(&mut state, decode::<CACertificate>(ca_certificates, select)?)?;
    insert_all(&mut state, decode::<ConsumerGroup>(consumer_groups, select)?)?;
    insert_all(&mut state, decode::<Vault>(vaults, select)?)?;
    insert_all(&mut state, decode::<KeySet>(key_sets, select)?)?;

    if !options.skip_consumers {
        let (consumers, key_auths, basic_auths, jwt_auths, hmac_auths, acl_groups) = tokio::try_join!(
            client.list_all("/consumers"),
            client.list_all("/key-auths"),
            client.list_all("/basic-auths"),
            client.list_all("/jwts"),
            client.list_all("/hmac-auths"),
            client.list_all("/acls"),
        )
        .context("fetching consumers")?;
        insert_all(&mut state, decode::<Consumer>(consumers, select)?)?;
        insert_all(&mut state, decode::<KeyAuth>(key_auths, &[])?)?;
        insert_all(&mut state, decode::<BasicAuth>(basic_auths, &[])?)?;
        insert_all(&mut state, decode::<JwtAuth>(jwt_auths, &[])?)?;
        insert_all(&mut state, decode::<HmacAuth>(hmac_auths, &[])?)?;
        insert_all(&mut state, decode::<AclGroup>(acl_groups, &[])?)?;
    }

    // Level 1.
    let upstreams: Vec<Upstream> = decode(upstreams, select)?;
    let upstream_parents: Vec<(String, Reference)> = upstreams
        .iter()
        .filter_map(|upstream| {
            parent_key(upstream.id.as_deref(), Some(upstream.name.as_str())).map(|key| {
                (
                    key,
                    Reference {
                        id: upstream.id.clone(),
                        name: Some(upstream.name.clone()),
                    },
                )
            })
        })
        .collect();
    insert_all(&mut state, decode::<Service>(services, select)?)?;
    insert_all(&mut state, upstreams)?;
    insert_all(&mut state, decode::<Sni>(snis, select)?)?;
    insert_all(&mut state, decode::<Key>(keys, select)?)?;

    // Level 2.
    insert_all(&mut state, decode::<Route>(routes, select)?)?;
    for (upstream, items) in fetch_nested(client, &upstream_parents, |key| {
        format!("/upstreams/{}/targets", key)
    })
    .await?
    {
        let mut targets: Vec<Target> = decode(items, select)?;
        for target in &mut targets {
            if target.upstream.as_ref().is_none_or(Reference::is_empty) {
                target.upstream = Some(upstream.clone());
            }
        }
        insert_all(&mut state, targets)?;
    }
    for (package, items) in fetch_nested(client, &package_parents, |key| {
        format!("/service_packages/{}/service_versions", key)
    })
    .await?
    {
        let mut versions: Vec<ServiceVersion> = decode(items, &[])?;
        for version in &mut versions {
            if version.package.as_ref().is_none_or(Reference::is_empty) {
                version.package = Some(package.clone());
            }
        }
        insert_all(&mut state, versions)?;
    }

    // Level 3.
    insert_all(&mut state, decode::<Plugin>(plugins, select)?)?;
    for (package, items) in fetch_nested(client, &package_parents, |key| {
        format!("/service_packages/{}/documents", key)
    })
    .await?
    {
        let mut documents: Vec<Document> = decode(items, &[])?;
        for document in &mut documents {
            if document.package.as_ref().is_none_or(Reference::is_empty) {
                document.package = Some(package.clone());
            }
        }
        insert_all(&mut state, documents)?;
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tags_match_empty_selects_everything() {
        assert!(tags_match(&json!({"name": "web"}), &[]));
    }

    #[test]
    fn test_tags_match_requires_intersection() {
        let tagged = json!({"name": "web", "tags": ["team-a", "prod"]});
        let untagged = json!({"name": "web"});
        let select = vec!["prod".to_string()];
        assert!(tags_match(&tagged, &select));
        assert!(!tags_match(&untagged, &select));
    }

    #[test]
    fn test_decode_filters_then_types() {
        let items = vec![
            json!({"name": "web", "tags": ["prod"]}),
            json!({"name": "internal", "tags": ["dev"]}),
        ];
        let services: Vec<Service> = decode(items, &["prod".to_string()]).unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].name, "web");
    }

    #[test]
    fn test_insert_backfills_reference_names() {
        let mut state = GatewayState::new();
        state
            .services
            .add(Service {
                id: Some("s1".to_string()),
                name: "web".to_string(),
                ..Default::default()
            })
            .unwrap();

        // Dumped routes reference parents by id only.
        let routes = vec![Route {
            id: Some("r1".to_string()),
            name: "r1".to_string(),
            service: Some(Reference::by_id("s1")),
            ..Default::default()
        }];
        insert_all(&mut state, routes).unwrap();
        let route = state.routes.get("r1").unwrap();
        assert_eq!(route.service.as_ref().unwrap().name.as_deref(), Some("web"));
    }
}
