//! Configuration loading and validation.
//!
//! Loads `keygate.toml` from `$KEYGATE_CONFIG_PATH`, the working directory,
//! or `~/.keygate/`, in that order. Environment variables override file
//! values; file values override defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::authz::cache::CacheConfig;
use crate::identity::Principal;

/// File name looked up in the working directory and in `~/.keygate/`.
pub const CONFIG_FILE_NAME: &str = "keygate.toml";

/// Principal name used when no master principal is configured and `$USER`
/// is unset.
pub const DEFAULT_MASTER_PRINCIPAL: &str = "keygate";

/// Upper bound for `security.authorization.cache_ttl_secs` (one day).
pub const MAX_CACHE_TTL_SECS: u64 = 86_400;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config at {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range. Rejected at startup.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ── Top-level config ────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Security and authorization settings.
    pub security: SecurityConfig,
    /// Bootstrap consistency wait bounds.
    pub bootstrap: BootstrapConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load with precedence env > file > defaults, then validate.
    ///
    /// An explicit `path` must exist. Without one, a missing file means
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or if
    /// the resulting values are invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// [`Config::load`] with a custom env resolver (for testing).
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn load_with(
        path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::discover(&env) {
                Some(found) => Self::from_file(&found)?,
                None => {
                    tracing::info!("no config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_overrides(&env);
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML string (no env overrides, no validation).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed input.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %path.display(), "loading config from file");
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// First existing candidate: `$KEYGATE_CONFIG_PATH`, `./keygate.toml`,
    /// `~/.keygate/keygate.toml`.
    fn discover(env: &impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
        if let Some(p) = env("KEYGATE_CONFIG_PATH") {
            return Some(PathBuf::from(p));
        }
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.is_file() {
            return Some(local);
        }
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".keygate").join(CONFIG_FILE_NAME))
            .filter(|p| p.is_file())
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function for testability (avoids unsafe `set_var` in tests).
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        let security = &mut self.security;
        override_parsed(&env, "KEYGATE_SECURITY_ENABLED", &mut security.enabled);
        if let Some(v) = env("KEYGATE_MASTER_PRINCIPAL") {
            security.master_principal = Some(v);
        }

        let authz = &mut security.authorization;
        override_parsed(&env, "KEYGATE_AUTHORIZATION_ENABLED", &mut authz.enabled);
        if let Some(v) = env("KEYGATE_AUTHORIZATION_EXTENSION") {
            authz.extension = Some(v);
        }
        override_parsed(&env, "KEYGATE_CACHE_MAX_ENTRIES", &mut authz.cache_max_entries);
        override_parsed(&env, "KEYGATE_CACHE_TTL_SECS", &mut authz.cache_ttl_secs);

        override_parsed(
            &env,
            "KEYGATE_BOOTSTRAP_TIMEOUT_SECS",
            &mut self.bootstrap.timeout_secs,
        );
        if let Some(v) = env("KEYGATE_LOG_LEVEL") {
            self.logging.level = v;
        }
    }

    /// Reject out-of-range values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let authz = &self.security.authorization;
        if authz.cache_max_entries < 0 {
            return Err(ConfigError::Invalid(format!(
                "security.authorization.cache_max_entries must be >= 0, got {}",
                authz.cache_max_entries
            )));
        }
        if authz.cache_max_entries > 0 && authz.cache_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "security.authorization.cache_ttl_secs must be > 0 when caching is enabled"
                    .to_owned(),
            ));
        }
        if authz.cache_ttl_secs > MAX_CACHE_TTL_SECS {
            return Err(ConfigError::Invalid(format!(
                "security.authorization.cache_ttl_secs must be <= {MAX_CACHE_TTL_SECS}, got {}",
                authz.cache_ttl_secs
            )));
        }
        if let Some(name) = &self.security.master_principal {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "security.master_principal must not be empty".to_owned(),
                ));
            }
        }
        if self.bootstrap.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "bootstrap.timeout_secs must be > 0".to_owned(),
            ));
        }
        if self.bootstrap.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "bootstrap.poll_interval_ms must be > 0".to_owned(),
            ));
        }
        Ok(())
    }
}

fn override_parsed<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    target: &mut T,
) {
    if let Some(v) = env(var) {
        match v.trim().parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!(var, value = %v, "ignoring invalid env override"),
        }
    }
}

// ── Security config ─────────────────────────────────────────────

/// Security settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Master switch; authorization is only active when this is on too.
    pub enabled: bool,
    /// Identity allowed to bypass checks during the bootstrap window.
    pub master_principal: Option<String>,
    /// Authorization plugin settings.
    pub authorization: AuthorizationConfig,
}

impl SecurityConfig {
    /// Whether requests are checked against the authorizer.
    pub fn authorization_enabled(&self) -> bool {
        self.enabled && self.authorization.enabled
    }

    /// The master principal: configured name, else `$USER`, else
    /// [`DEFAULT_MASTER_PRINCIPAL`].
    pub fn master_principal(&self) -> Principal {
        self.master_principal_with(|key| std::env::var(key).ok())
    }

    /// [`SecurityConfig::master_principal`] with a custom env resolver.
    pub fn master_principal_with(&self, env: impl Fn(&str) -> Option<String>) -> Principal {
        let name = self
            .master_principal
            .clone()
            .or_else(|| env("USER").filter(|u| !u.trim().is_empty()))
            .unwrap_or_else(|| DEFAULT_MASTER_PRINCIPAL.to_owned());
        Principal::user(name)
    }
}

/// Authorization plugin settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthorizationConfig {
    /// Whether authorization is enforced (requires `security.enabled`).
    pub enabled: bool,
    /// Registered name of the authorizer implementation to load.
    pub extension: Option<String>,
    /// Free-form properties handed to the authorizer factory.
    pub extension_properties: BTreeMap<String, String>,
    /// Decision cache bound; `0` disables caching. Negative is rejected.
    pub cache_max_entries: i64,
    /// Lifetime of a cached decision in seconds, at most [`MAX_CACHE_TTL_SECS`].
    pub cache_ttl_secs: u64,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            extension: None,
            extension_properties: BTreeMap::new(),
            cache_max_entries: default_cache_max_entries(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl AuthorizationConfig {
    /// Decision cache settings. Negative sizes (rejected by validation)
    /// map to a disabled cache.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_entries: usize::try_from(self.cache_max_entries).unwrap_or(0),
            ttl: Duration::from_secs(self.cache_ttl_secs),
        }
    }
}

// ── Bootstrap and logging ───────────────────────────────────────

/// Bounds for the bootstrap consistency wait.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Give up after this many seconds.
    pub timeout_secs: u64,
    /// Delay between condition checks, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_bootstrap_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl BootstrapConfig {
    /// Timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Log output settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for rolling JSON logs in `start` mode.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            dir: None,
        }
    }
}

// Default value functions for serde

fn default_cache_max_entries() -> i64 {
    10_000
}
fn default_cache_ttl_secs() -> u64 {
    600
}
fn default_bootstrap_timeout_secs() -> u64 {
    5
}
fn default_poll_interval_ms() -> u64 {
    50
}
