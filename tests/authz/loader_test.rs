//! Authorizer selection and startup failure.

use std::collections::BTreeSet;
use std::sync::Arc;

use keygate::authz::loader::{
    AuthorizerInstantiator, AuthorizerRegistry, ExtensionContext, IN_MEMORY_EXTENSION,
    NOOP_EXTENSION,
};
use keygate::authz::memory::InMemoryAuthorizer;
use keygate::authz::{Authorizer, AuthzError};
use keygate::config::SecurityConfig;
use keygate::identity::{Action, Authorizable, Principal};

fn enabled(extension: Option<&str>) -> SecurityConfig {
    let mut security = SecurityConfig::default();
    security.enabled = true;
    security.authorization.enabled = true;
    security.authorization.extension = extension.map(str::to_owned);
    security
}

fn failing_factory(_ctx: &ExtensionContext) -> Result<Arc<dyn Authorizer>, AuthzError> {
    Err(AuthzError::Backend("policy store offline".to_owned()))
}

fn requires_property(ctx: &ExtensionContext) -> Result<Arc<dyn Authorizer>, AuthzError> {
    if ctx.properties.get("policy").map(String::as_str) != Some("strict") {
        return Err(AuthzError::Backend("missing policy property".to_owned()));
    }
    Ok(Arc::new(InMemoryAuthorizer::new()))
}

#[tokio::test]
async fn disabled_security_loads_noop() {
    let instantiator = AuthorizerInstantiator::load(
        &SecurityConfig::default(),
        &AuthorizerRegistry::with_builtins(),
    )
    .expect("noop");
    assert_eq!(instantiator.extension(), NOOP_EXTENSION);

    let allowed = instantiator
        .get()
        .enforce(
            &Authorizable::new("namespace", vec!["default".to_owned()]),
            &Principal::user("anyone"),
            Action::Admin,
        )
        .await;
    assert!(allowed.is_ok());
}

#[test]
fn authorization_needs_security_enabled() {
    let mut security = enabled(Some(IN_MEMORY_EXTENSION));
    security.enabled = false;
    let instantiator =
        AuthorizerInstantiator::load(&security, &AuthorizerRegistry::with_builtins())
            .expect("noop");
    assert_eq!(instantiator.extension(), NOOP_EXTENSION);
}

#[test]
fn unknown_extension_is_unavailable() {
    let err = AuthorizerInstantiator::load(
        &enabled(Some("ldap")),
        &AuthorizerRegistry::with_builtins(),
    )
    .expect_err("unknown");
    assert!(matches!(err, AuthzError::Unavailable(msg) if msg.contains("ldap")));
}

#[test]
fn missing_extension_is_unavailable() {
    let err = AuthorizerInstantiator::load(&enabled(None), &AuthorizerRegistry::with_builtins())
        .expect_err("missing");
    assert!(matches!(err, AuthzError::Unavailable(_)));
}

#[test]
fn factory_failure_is_unavailable() {
    let mut registry = AuthorizerRegistry::empty();
    registry.register("broken", failing_factory);
    let err = AuthorizerInstantiator::load(&enabled(Some("broken")), &registry)
        .expect_err("broken");
    assert!(matches!(err, AuthzError::Unavailable(msg) if msg.contains("policy store offline")));
}

#[tokio::test]
async fn custom_extension_receives_properties() {
    let mut registry = AuthorizerRegistry::with_builtins();
    registry.register("strict", requires_property);
    assert_eq!(registry.names(), vec!["in-memory", "strict"]);

    let mut security = enabled(Some("strict"));
    security
        .authorization
        .extension_properties
        .insert("policy".to_owned(), "strict".to_owned());
    let instantiator = AuthorizerInstantiator::load(&security, &registry).expect("load");
    assert_eq!(instantiator.extension(), "strict");

    let authorizer = instantiator.get();
    let alice = Principal::user("alice");
    let ns = Authorizable::new("namespace", vec!["default".to_owned()]);
    authorizer
        .grant(&ns, &alice, &BTreeSet::from([Action::Read]))
        .await
        .expect("grant");
    assert!(authorizer.enforce(&ns, &alice, Action::Read).await.is_ok());
}
