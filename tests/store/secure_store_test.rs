//! Guarded secure store scenarios.

use std::collections::{BTreeMap, BTreeSet};

use keygate::app::Services;
use keygate::authz::loader::AuthorizerRegistry;
use keygate::authz::AuthzError;
use keygate::config::{BootstrapConfig, Config};
use keygate::context::RequestContext;
use keygate::identity::{Action, ResourceId};
use keygate::store::StoreError;

fn config(cache_max_entries: i64) -> Config {
    let mut config = Config::default();
    config.security.enabled = true;
    config.security.master_principal = Some("keygate".to_owned());
    config.security.authorization.enabled = true;
    config.security.authorization.extension = Some("in-memory".to_owned());
    config.security.authorization.cache_max_entries = cache_max_entries;
    config
}

async fn started(cache_max_entries: i64) -> Services {
    let services = Services::build(&config(cache_max_entries), &AuthorizerRegistry::with_builtins())
        .expect("build");
    services
        .spawn_bootstrap(std::time::Duration::ZERO)
        .await
        .expect("join")
        .expect("bootstrap");
    services
        .wait_for_default_namespace(&BootstrapConfig::default())
        .await
        .expect("default namespace");
    services
}

async fn grant(services: &Services, ctx: &RequestContext, resource: &ResourceId, action: Action) {
    services
        .authorizer()
        .grant(
            &resource.to_authorizable(),
            ctx.principal(),
            &BTreeSet::from([action]),
        )
        .await
        .expect("grant");
}

fn names(list: &[keygate::store::SecureStoreMetadata]) -> Vec<&str> {
    list.iter().map(|m| m.name.as_str()).collect()
}

async fn lifecycle(cache_max_entries: i64) {
    let services = started(cache_max_entries).await;
    let store = services.secure_store();
    let alice = RequestContext::user("alice");
    let bob = RequestContext::user("bob");
    let ns = ResourceId::namespace("default");
    let key1 = ResourceId::secure_key("default", "key1");

    // Alice starts with nothing.
    let err = store
        .put(&alice, "default", "key1", "caskisgreat", "desc", BTreeMap::new())
        .await
        .expect_err("no privileges");
    assert!(err.is_denied());

    // ADMIN on the key lets her store it.
    grant(&services, &alice, &key1, Action::Admin).await;
    store
        .put(&alice, "default", "key1", "caskisgreat", "desc", BTreeMap::new())
        .await
        .expect("put");
    let listed = store.list(&alice, "default").await.expect("list");
    assert_eq!(names(&listed), vec!["key1"]);
    assert_eq!(listed[0].description, "desc");

    // Revoking everything hides the key from her listing.
    services
        .authorizer()
        .revoke_all(&key1.to_authorizable(), alice.principal())
        .await
        .expect("revoke all");
    let listed = store.list(&alice, "default").await.expect("list");
    assert!(listed.is_empty());

    // READ on namespace and key lets Bob read but not delete.
    grant(&services, &bob, &ns, Action::Read).await;
    grant(&services, &bob, &key1, Action::Read).await;
    let got = store.get(&bob, "default", "key1").await.expect("get");
    assert_eq!(got.data.expose(), b"caskisgreat");
    assert_eq!(got.metadata.name, "key1");
    let err = store
        .delete(&bob, "default", "key1")
        .await
        .expect_err("needs admin");
    assert!(err.is_denied());

    // With ADMIN he can delete it.
    grant(&services, &bob, &key1, Action::Admin).await;
    store.delete(&bob, "default", "key1").await.expect("delete");
    let listed = store.list(&bob, "default").await.expect("list");
    assert!(listed.is_empty());
}

#[tokio::test]
async fn key_lifecycle_without_cache() {
    lifecycle(0).await;
}

#[tokio::test]
async fn key_lifecycle_with_cache() {
    lifecycle(10_000).await;
}

#[tokio::test]
async fn get_needs_namespace_read_as_well() {
    let services = started(0).await;
    let bob = RequestContext::user("bob");
    let key1 = ResourceId::secure_key("default", "key1");
    grant(&services, &bob, &key1, Action::Read).await;

    let err = services
        .secure_store()
        .get(&bob, "default", "key1")
        .await
        .expect_err("namespace read missing");
    match err {
        StoreError::Authz(AuthzError::Denied { resource, action, .. }) => {
            assert_eq!(resource, ResourceId::namespace("default").to_authorizable());
            assert_eq!(action, Action::Read);
        }
        other => panic!("expected denial, got {other:?}"),
    }
}

#[tokio::test]
async fn denial_comes_before_existence() {
    let services = started(0).await;
    let mallory = RequestContext::user("mallory");

    let err = services
        .secure_store()
        .delete(&mallory, "default", "missing")
        .await
        .expect_err("denied");
    assert!(err.is_denied());

    let err = services
        .secure_store()
        .get(&mallory, "nowhere", "missing")
        .await
        .expect_err("denied");
    assert!(err.is_denied());
}

#[tokio::test]
async fn missing_key_and_namespace_are_reported_to_authorized_callers() {
    let services = started(0).await;
    let alice = RequestContext::user("alice");
    grant(&services, &alice, &ResourceId::namespace("default"), Action::Read).await;
    grant(&services, &alice, &ResourceId::secure_key("default", "ghost"), Action::Read).await;
    grant(&services, &alice, &ResourceId::secure_key("other", "k"), Action::Admin).await;

    let err = services
        .secure_store()
        .get(&alice, "default", "ghost")
        .await
        .expect_err("absent");
    assert!(matches!(err, StoreError::NotFound { .. }));

    let err = services
        .secure_store()
        .put(&alice, "other", "k", "v", "", BTreeMap::new())
        .await
        .expect_err("no namespace");
    assert!(matches!(err, StoreError::NamespaceNotFound(ns) if ns == "other"));
}

#[tokio::test]
async fn invalid_key_name_is_rejected() {
    let services = started(0).await;
    let alice = RequestContext::user("alice");
    grant(&services, &alice, &ResourceId::secure_key("default", "bad/name"), Action::Admin).await;

    let err = services
        .secure_store()
        .put(&alice, "default", "bad/name", "v", "", BTreeMap::new())
        .await
        .expect_err("invalid");
    assert!(matches!(err, StoreError::InvalidName(_)));
}

#[tokio::test]
async fn listing_only_shows_keys_with_some_privilege() {
    let services = started(0).await;
    let store = services.secure_store();
    let owner = RequestContext::user("owner");
    let viewer = RequestContext::user("viewer");
    for key in ["alpha", "beta", "gamma"] {
        let resource = ResourceId::secure_key("default", key);
        grant(&services, &owner, &resource, Action::Admin).await;
        store
            .put(&owner, "default", key, "v", "", BTreeMap::new())
            .await
            .expect("put");
    }
    grant(
        &services,
        &viewer,
        &ResourceId::secure_key("default", "gamma"),
        Action::Execute,
    )
    .await;

    let all = store.list(&owner, "default").await.expect("list");
    assert_eq!(names(&all), vec!["alpha", "beta", "gamma"]);
    let some = store.list(&viewer, "default").await.expect("list");
    assert_eq!(names(&some), vec!["gamma"]);
}
