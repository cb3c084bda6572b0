//! Principals, resource identifiers, and the plugin-facing `Authorizable` form.
//!
//! `ResourceId` is the typed identifier the store and namespace services use.
//! Authorizer plugins never see it: they only receive the string-based
//! [`Authorizable`] projection, which stays stable when new resource kinds
//! are added.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Principal
// ---------------------------------------------------------------------------

/// Kind of identity a [`Principal`] names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    /// An individual user.
    User,
    /// A group of users.
    Group,
    /// A role that can be assigned to other principals.
    Role,
}

impl fmt::Display for PrincipalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::User => "user",
            Self::Group => "group",
            Self::Role => "role",
        })
    }
}

/// An identity on whose behalf an operation is performed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Principal {
    name: String,
    kind: PrincipalKind,
}

impl Principal {
    /// Create a principal of the given kind.
    pub fn new(name: impl Into<String>, kind: PrincipalKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Shorthand for a [`PrincipalKind::User`] principal.
    pub fn user(name: impl Into<String>) -> Self {
        Self::new(name, PrincipalKind::User)
    }

    /// Shorthand for a [`PrincipalKind::Role`] principal.
    pub fn role(name: impl Into<String>) -> Self {
        Self::new(name, PrincipalKind::Role)
    }

    /// Principal name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Principal kind.
    pub fn kind(&self) -> PrincipalKind {
        self.kind
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

// ---------------------------------------------------------------------------
// Actions and privileges
// ---------------------------------------------------------------------------

/// Operation being authorized.
///
/// Actions are independent: holding `Admin` does not imply `Read`. Any such
/// implication is up to the authorizer plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    /// Read data.
    Read,
    /// Write data.
    Write,
    /// Administer the resource (create, overwrite, delete).
    Admin,
    /// Execute the resource.
    Execute,
}

impl Action {
    /// Every action, in declaration order.
    pub const ALL: [Action; 4] = [Action::Read, Action::Write, Action::Admin, Action::Execute];
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::Admin => "ADMIN",
            Self::Execute => "EXECUTE",
        })
    }
}

/// A granted `(resource, action)` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Privilege {
    /// Resource the privilege applies to.
    pub authorizable: Authorizable,
    /// Action allowed on the resource.
    pub action: Action,
}

impl Privilege {
    /// Create a privilege.
    pub fn new(authorizable: Authorizable, action: Action) -> Self {
        Self {
            authorizable,
            action,
        }
    }
}

// ---------------------------------------------------------------------------
// Resource identifiers
// ---------------------------------------------------------------------------

/// Kind tag used for namespace authorizables.
pub const NAMESPACE_KIND: &str = "namespace";

/// Kind tag used for secure key authorizables.
pub const SECURE_KEY_KIND: &str = "secure_key";

/// Whether `name` is a valid namespace or key name: non-empty ASCII
/// letters, digits, `_` and `-`.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Typed, hierarchical identifier for a protected resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ResourceId {
    /// A namespace.
    Namespace(String),
    /// A secure key, scoped to exactly one namespace.
    SecuredKey {
        /// Owning namespace.
        namespace: String,
        /// Key name within the namespace.
        key: String,
    },
}

impl ResourceId {
    /// Identifier for a namespace.
    pub fn namespace(name: impl Into<String>) -> Self {
        Self::Namespace(name.into())
    }

    /// Identifier for a secure key inside `namespace`.
    pub fn secure_key(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self::SecuredKey {
            namespace: namespace.into(),
            key: key.into(),
        }
    }

    /// The namespace this resource lives in (a namespace is its own).
    pub fn namespace_of(&self) -> ResourceId {
        match self {
            Self::Namespace(name) => Self::Namespace(name.clone()),
            Self::SecuredKey { namespace, .. } => Self::Namespace(namespace.clone()),
        }
    }

    /// Project this identifier into its plugin-facing form.
    pub fn to_authorizable(&self) -> Authorizable {
        match self {
            Self::Namespace(name) => Authorizable::new(NAMESPACE_KIND, vec![name.clone()]),
            Self::SecuredKey { namespace, key } => {
                Authorizable::new(SECURE_KEY_KIND, vec![namespace.clone(), key.clone()])
            }
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_authorizable())
    }
}

/// Canonical, string-based projection of a [`ResourceId`].
///
/// This is the only resource representation that crosses the plugin
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Authorizable {
    kind: String,
    path: Vec<String>,
}

impl Authorizable {
    /// Build an authorizable from a kind tag and ordered path segments.
    pub fn new(kind: impl Into<String>, path: Vec<String>) -> Self {
        Self {
            kind: kind.into(),
            path,
        }
    }

    /// Resource kind tag.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Ordered path segments, outermost first.
    pub fn path(&self) -> &[String] {
        &self.path
    }
}

impl From<&ResourceId> for Authorizable {
    fn from(resource: &ResourceId) -> Self {
        resource.to_authorizable()
    }
}

impl fmt::Display for Authorizable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.path.join("/"))
    }
}
