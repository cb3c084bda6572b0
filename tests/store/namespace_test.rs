//! Namespace administration through the enforcer.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use keygate::app::Services;
use keygate::authz::loader::AuthorizerRegistry;
use keygate::config::{BootstrapConfig, Config};
use keygate::context::RequestContext;
use keygate::identity::{Action, ResourceId};
use keygate::namespace::{NamespaceError, NamespaceMeta, DEFAULT_NAMESPACE};

async fn services() -> Services {
    let mut config = Config::default();
    config.security.enabled = true;
    config.security.master_principal = Some("keygate".to_owned());
    config.security.authorization.enabled = true;
    config.security.authorization.extension = Some("in-memory".to_owned());
    let services =
        Services::build(&config, &AuthorizerRegistry::with_builtins()).expect("build");
    let task = services.spawn_bootstrap(Duration::ZERO);
    services
        .wait_for_default_namespace(&BootstrapConfig::default())
        .await
        .expect("default namespace");
    task.await.expect("join").expect("bootstrap");
    services
}

async fn grant_admin(services: &Services, ctx: &RequestContext, name: &str) {
    services
        .authorizer()
        .grant(
            &ResourceId::namespace(name).to_authorizable(),
            ctx.principal(),
            &BTreeSet::from([Action::Admin]),
        )
        .await
        .expect("grant");
}

#[tokio::test]
async fn create_requires_admin() {
    let services = services().await;
    let ops = RequestContext::user("ops");

    let err = services
        .namespaces()
        .create(&ops, NamespaceMeta::new("payments", "payment keys"))
        .await
        .expect_err("denied");
    assert!(err.is_denied());
    assert!(!services.namespaces().exists("payments").await);

    grant_admin(&services, &ops, "payments").await;
    services
        .namespaces()
        .create(&ops, NamespaceMeta::new("payments", "payment keys"))
        .await
        .expect("create");
    let meta = services
        .namespaces()
        .get(&ops, "payments")
        .await
        .expect("get");
    assert_eq!(meta.description, "payment keys");

    let err = services
        .namespaces()
        .create(&ops, NamespaceMeta::new("payments", "again"))
        .await
        .expect_err("duplicate");
    assert!(matches!(err, NamespaceError::AlreadyExists(_)));
}

#[tokio::test]
async fn list_is_filtered() {
    let services = services().await;
    let ops = RequestContext::user("ops");
    grant_admin(&services, &ops, "payments").await;
    services
        .namespaces()
        .create(&ops, NamespaceMeta::new("payments", ""))
        .await
        .expect("create");

    let visible: Vec<String> = services
        .namespaces()
        .list(&ops)
        .await
        .expect("list")
        .into_iter()
        .map(|m| m.name)
        .collect();
    assert_eq!(visible, vec!["payments"]);

    let nobody = RequestContext::user("nobody");
    assert!(services.namespaces().list(&nobody).await.expect("list").is_empty());
}

#[tokio::test]
async fn delete_drops_keys_and_protects_default() {
    let services = services().await;
    let ops = RequestContext::user("ops");
    grant_admin(&services, &ops, "scratch").await;
    grant_admin(&services, &ops, DEFAULT_NAMESPACE).await;
    services
        .authorizer()
        .grant(
            &ResourceId::secure_key("scratch", "k").to_authorizable(),
            ops.principal(),
            &BTreeSet::from([Action::Admin]),
        )
        .await
        .expect("grant");

    services
        .namespaces()
        .create(&ops, NamespaceMeta::new("scratch", ""))
        .await
        .expect("create");
    services
        .secure_store()
        .put(&ops, "scratch", "k", "v", "", BTreeMap::new())
        .await
        .expect("put");

    services
        .namespaces()
        .delete(&ops, "scratch")
        .await
        .expect("delete");
    assert!(!services.namespaces().exists("scratch").await);

    let err = services
        .namespaces()
        .delete(&ops, DEFAULT_NAMESPACE)
        .await
        .expect_err("protected");
    assert!(matches!(err, NamespaceError::Protected(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn keys_written_during_delete_do_not_survive_recreation() {
    let services =
        Services::build(&Config::default(), &AuthorizerRegistry::with_builtins()).expect("build");
    let ops = RequestContext::user("ops");
    services
        .namespaces()
        .create(&ops, NamespaceMeta::new("scratch", ""))
        .await
        .expect("create");

    let store = std::sync::Arc::clone(services.secure_store());
    let writer_ctx = ops.clone();
    let writer = tokio::spawn(async move {
        for i in 0..200 {
            let key = format!("k{i}");
            let _ = store
                .put(&writer_ctx, "scratch", &key, "v", "", BTreeMap::new())
                .await;
            tokio::task::yield_now().await;
        }
    });
    tokio::task::yield_now().await;
    services
        .namespaces()
        .delete(&ops, "scratch")
        .await
        .expect("delete");
    writer.await.expect("writer");

    services
        .namespaces()
        .create(&ops, NamespaceMeta::new("scratch", "recreated"))
        .await
        .expect("recreate");
    let leftover = services
        .secure_store()
        .list(&ops, "scratch")
        .await
        .expect("list");
    assert!(leftover.is_empty(), "orphaned keys: {leftover:?}");
}
