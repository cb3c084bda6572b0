//! Keygate: a secure credential store guarded by a pluggable authorization
//! engine.
//!
//! Every operation on a namespace or secure key is checked by the
//! [`authz::enforcer::AuthorizationEnforcer`] against the single
//! [`authz::Authorizer`] loaded at startup. Decisions may be served from a
//! per-principal LRU cache that is invalidated whenever privileges change.
//!
//! See `DESIGN.md` for the architecture notes.

#![forbid(unsafe_code)]

pub mod config;
pub mod context;
pub mod identity;
pub mod logging;

pub mod authz;

pub mod namespace;
pub mod store;

pub mod app;
pub mod bootstrap;
