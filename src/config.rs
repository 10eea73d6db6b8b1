//! Connection configuration and scoped setting lookup.
//!
//! Settings come from a flat key/value map. A key may be scoped for the
//! writable primary (`rw_<key>`) or for a read replica (`ro_<key>`); the
//! scoped entry wins over the bare key, which wins over the caller's default.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{BinderyError, BinderyResult};

/// Environment variable prefix read by [`ConnectionConfig::from_env`].
pub const ENV_PREFIX: &str = "BINDERY_";

const DEFAULT_PORT: u16 = 3306;

/// Immutable flat map of setting name to value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionConfig {
    entries: HashMap<String, String>,
}

impl ConnectionConfig {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Collect `PREFIX_KEY=value` pairs as `key=value` (lowercased).
    pub fn from_vars<I>(vars: I, prefix: &str) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let entries = vars
            .into_iter()
            .filter_map(|(name, value)| {
                name.strip_prefix(prefix)
                    .filter(|key| !key.is_empty())
                    .map(|key| (key.to_ascii_lowercase(), value))
            })
            .collect();
        Self { entries }
    }

    /// Settings from `BINDERY_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars(), ENV_PREFIX)
    }

    /// Parse a TOML document. Nested tables flatten with `_`, so
    /// `[ro] host = "replica"` becomes `ro_host`.
    pub fn from_toml_str(input: &str) -> BinderyResult<Self> {
        let table: toml::Table = input
            .parse()
            .map_err(|e: toml::de::Error| BinderyError::Config(e.to_string()))?;
        let mut entries = HashMap::new();
        flatten_table("", &table, &mut entries)?;
        Ok(Self { entries })
    }

    pub fn load_file(path: impl AsRef<Path>) -> BinderyResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// `<config dir>/bindery/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("bindery").join("config.toml"))
    }

    /// Overlay `other` on top of this config; `other` wins on conflicts.
    pub fn merge(mut self, other: ConnectionConfig) -> Self {
        self.entries.extend(other.entries);
        self
    }

    /// Raw value for an exact key, without scope fallback.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn flatten_table(
    prefix: &str,
    table: &toml::Table,
    out: &mut HashMap<String, String>,
) -> BinderyResult<()> {
    for (key, value) in table {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}_{key}")
        };
        match value {
            toml::Value::String(s) => {
                out.insert(name, s.clone());
            }
            toml::Value::Integer(n) => {
                out.insert(name, n.to_string());
            }
            toml::Value::Float(n) => {
                out.insert(name, n.to_string());
            }
            toml::Value::Boolean(b) => {
                out.insert(name, b.to_string());
            }
            toml::Value::Table(inner) => flatten_table(&name, inner, out)?,
            other => {
                return Err(BinderyError::Config(format!(
                    "unsupported value for '{name}': {}",
                    other.type_str()
                )));
            }
        }
    }
    Ok(())
}

/// Scoped lookup over a [`ConnectionConfig`].
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    config: ConnectionConfig,
    replica_only: bool,
}

impl ConfigResolver {
    pub fn new(config: ConnectionConfig, replica_only: bool) -> Self {
        Self {
            config,
            replica_only,
        }
    }

    pub fn replica_only(&self) -> bool {
        self.replica_only
    }

    /// Scoped key, then bare key.
    pub fn get(&self, key: &str) -> Option<&str> {
        let scope = if self.replica_only { "ro" } else { "rw" };
        self.config
            .get(&format!("{scope}_{key}"))
            .or_else(|| self.config.get(key))
    }

    /// Scoped key, then bare key, then `default`.
    pub fn resolve(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    pub fn resolve_flag(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(value) => is_truthy(value),
            None => default,
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Everything needed to open the store connection and shape statements.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectSettings {
    pub database: String,
    pub host: String,
    pub user: String,
    pub password: String,
    pub port: u16,
    pub socket: Option<String>,
    /// Prepended to table names.
    pub prefix: String,
    /// Append the SQL text to statement error messages.
    pub query_on_error: bool,
    pub replica_only: bool,
}

impl ConnectSettings {
    pub fn resolve(resolver: &ConfigResolver) -> BinderyResult<Self> {
        let port = match resolver.get("port") {
            Some(raw) if !raw.trim().is_empty() => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| BinderyError::Config(format!("invalid port '{raw}': {e}")))?,
            _ => DEFAULT_PORT,
        };

        Ok(Self {
            database: resolver.resolve("database", ""),
            host: resolver.resolve("host", "localhost"),
            user: resolver.resolve("user", ""),
            password: resolver.resolve("password", ""),
            port,
            socket: resolver
                .get("socket")
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            prefix: resolver.resolve("prefix", ""),
            query_on_error: resolver.resolve_flag("query_on_error", false),
            replica_only: resolver.replica_only(),
        })
    }
}

impl fmt::Debug for ConnectSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectSettings")
            .field("database", &self.database)
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"***")
            .field("port", &self.port)
            .field("socket", &self.socket)
            .field("prefix", &self.prefix)
            .field("query_on_error", &self.query_on_error)
            .field("replica_only", &self.replica_only)
            .finish()
    }
}
