//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (REPOCACHE_*, nested keys split on `__`)
//! 2. TOML config file (if REPOCACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::{ConfigError, MAX_CACHE_MINUTES};

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (REPOCACHE_*)
/// 2. TOML config file (if REPOCACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Read-through cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Key registry persistence settings.
    #[serde(default)]
    pub registry: RegistryConfig,
}

/// Which cache backend the host wires up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Sqlite,
    Memory,
}

/// Read-through cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Global switch for cached reads.
    ///
    /// Set via REPOCACHE_CACHE__ENABLED.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Lifetime of a cached result in minutes.
    ///
    /// Set via REPOCACHE_CACHE__MINUTES.
    #[serde(default = "default_minutes")]
    pub minutes: u64,

    /// Cache backend to construct.
    #[serde(default)]
    pub backend: BackendKind,

    /// Path to the SQLite cache database (sqlite backend only).
    ///
    /// Set via REPOCACHE_CACHE__DB_PATH.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Per-method allow-list / deny-list.
    #[serde(default)]
    pub allowed: AllowedMethods,

    /// Invalidation on repository writes.
    #[serde(default)]
    pub clean: CleanConfig,

    /// Request parameters recognised by the cache layer.
    #[serde(default)]
    pub params: CacheParams,
}

/// Method allow-list / deny-list. When both are set the deny-list wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllowedMethods {
    #[serde(default)]
    pub only: Option<Vec<String>>,

    #[serde(default)]
    pub except: Option<Vec<String>>,
}

/// Invalidation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanConfig {
    /// Global switch for invalidation sweeps.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Per-action switches.
    #[serde(default)]
    pub on: CleanOn,
}

/// Per-action invalidation switches, keyed by action name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanOn {
    #[serde(default = "default_true")]
    pub creating: bool,
    #[serde(default = "default_true")]
    pub created: bool,
    #[serde(default = "default_true")]
    pub updating: bool,
    #[serde(default = "default_true")]
    pub updated: bool,
    #[serde(default = "default_true")]
    pub deleting: bool,
    #[serde(default = "default_true")]
    pub deleted: bool,
}

/// Request parameters recognised by the cache layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheParams {
    /// Query parameter that forces the direct path for one request.
    ///
    /// Set via REPOCACHE_CACHE__PARAMS__SKIP_CACHE.
    #[serde(default = "default_skip_cache_param")]
    pub skip_cache: String,
}

/// Which document store holds the key registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryStoreKind {
    /// A JSON file under `registry.dir`.
    #[default]
    File,
    /// The `documents` table of the SQLite cache database at `cache.db_path`.
    Sqlite,
}

/// Where the key registry document lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Document store backing the registry.
    ///
    /// Set via REPOCACHE_REGISTRY__STORE.
    #[serde(default)]
    pub store: RegistryStoreKind,

    /// Directory holding the registry document.
    ///
    /// Set via REPOCACHE_REGISTRY__DIR.
    #[serde(default = "default_registry_dir")]
    pub dir: PathBuf,

    /// File name of the registry document inside `dir`.
    #[serde(default = "default_registry_file")]
    pub file: String,
}

fn default_true() -> bool {
    true
}

fn default_minutes() -> u64 {
    30
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./repocache.sqlite")
}

fn default_skip_cache_param() -> String {
    "skipCache".into()
}

fn default_registry_dir() -> PathBuf {
    PathBuf::from("./storage/framework/cache")
}

fn default_registry_file() -> String {
    "repository-cache-keys.json".into()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            minutes: default_minutes(),
            backend: BackendKind::default(),
            db_path: default_db_path(),
            allowed: AllowedMethods::default(),
            clean: CleanConfig::default(),
            params: CacheParams::default(),
        }
    }
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self { enabled: true, on: CleanOn::default() }
    }
}

impl Default for CleanOn {
    fn default() -> Self {
        Self { creating: true, created: true, updating: true, updated: true, deleting: true, deleted: true }
    }
}

impl Default for CacheParams {
    fn default() -> Self {
        Self { skip_cache: default_skip_cache_param() }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { store: RegistryStoreKind::default(), dir: default_registry_dir(), file: default_registry_file() }
    }
}

impl AllowedMethods {
    /// Whether `method` passes the lists.
    pub fn allows(&self, method: &str) -> bool {
        method_allowed(self.only.as_deref(), self.except.as_deref(), method)
    }
}

/// The allow/deny rule shared by configuration and per-repository overrides.
///
/// A deny-list, when present, is the only list consulted.
pub fn method_allowed(only: Option<&[String]>, except: Option<&[String]>, method: &str) -> bool {
    if let Some(except) = except {
        return !except.iter().any(|m| m == method);
    }
    if let Some(only) = only {
        return only.iter().any(|m| m == method);
    }
    true
}

impl CacheConfig {
    /// Whether cached reads are on for `method`.
    pub fn allows(&self, method: &str) -> bool {
        self.enabled && self.allowed.allows(method)
    }
}

impl CleanConfig {
    /// Whether an invalidation sweep runs for the named action.
    ///
    /// Unknown action names are treated as enabled.
    pub fn enabled_for(&self, action: &str) -> bool {
        if !self.enabled {
            return false;
        }
        match action {
            "creating" => self.on.creating,
            "created" => self.on.created,
            "updating" => self.on.updating,
            "updated" => self.on.updated,
            "deleting" => self.on.deleting,
            "deleted" => self.on.deleted,
            _ => true,
        }
    }
}

impl RegistryConfig {
    /// Full path of the registry document.
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file)
    }
}

impl AppConfig {
    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `REPOCACHE_`
    /// 2. TOML file from `REPOCACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("REPOCACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        Self::extract(figment.merge(Self::env()))
    }

    fn env() -> Env {
        Env::prefixed("REPOCACHE_")
            .ignore(&["CONFIG_FILE"])
            .map(|key| key.as_str().to_lowercase().into())
            .split("__")
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.cache.enabled);
        assert_eq!(config.cache.minutes, 30);
        assert_eq!(config.cache.backend, BackendKind::Sqlite);
        assert_eq!(config.cache.db_path, PathBuf::from("./repocache.sqlite"));
        assert!(config.cache.allowed.only.is_none());
        assert!(config.cache.allowed.except.is_none());
        assert!(config.cache.clean.enabled);
        assert_eq!(config.cache.params.skip_cache, "skipCache");
        assert_eq!(config.registry.store, RegistryStoreKind::File);
        assert_eq!(
            config.registry.path(),
            PathBuf::from("./storage/framework/cache/repository-cache-keys.json")
        );
    }

    #[test]
    fn test_allows_all_by_default() {
        let config = CacheConfig::default();
        assert!(config.allows("all"));
        assert!(config.allows("paginate"));
    }

    #[test]
    fn test_allows_disabled() {
        let config = CacheConfig { enabled: false, ..Default::default() };
        assert!(!config.allows("all"));
    }

    #[test]
    fn test_allows_only_list() {
        let allowed = AllowedMethods { only: Some(vec!["all".into(), "find".into()]), except: None };
        assert!(allowed.allows("all"));
        assert!(allowed.allows("find"));
        assert!(!allowed.allows("paginate"));
    }

    #[test]
    fn test_allows_except_list() {
        let allowed = AllowedMethods { only: None, except: Some(vec!["paginate".into()]) };
        assert!(allowed.allows("all"));
        assert!(!allowed.allows("paginate"));
    }

    #[test]
    fn test_deny_list_wins_over_allow_list() {
        let allowed = AllowedMethods { only: Some(vec!["all".into()]), except: Some(vec!["all".into()]) };
        assert!(!allowed.allows("all"));
        // the allow-list is ignored entirely once a deny-list exists
        assert!(allowed.allows("find"));
    }

    #[test]
    fn test_clean_enabled_for() {
        let mut clean = CleanConfig::default();
        assert!(clean.enabled_for("created"));

        clean.on.deleting = false;
        assert!(!clean.enabled_for("deleting"));
        assert!(clean.enabled_for("deleted"));

        clean.enabled = false;
        assert!(!clean.enabled_for("created"));
    }

    #[test]
    fn test_load_from_env_and_toml() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "repocache.toml",
                r#"
                [cache]
                minutes = 10
                backend = "memory"

                [cache.allowed]
                only = ["all", "find"]
                "#,
            )?;
            jail.set_env("REPOCACHE_CONFIG_FILE", "repocache.toml");
            jail.set_env("REPOCACHE_CACHE__CLEAN__ON__DELETED", "false");
            jail.set_env("REPOCACHE_REGISTRY__FILE", "keys.json");
            jail.set_env("REPOCACHE_REGISTRY__STORE", "sqlite");

            let config = AppConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.cache.minutes, 10);
            assert_eq!(config.cache.backend, BackendKind::Memory);
            assert_eq!(config.cache.allowed.only.as_deref(), Some(&["all".to_string(), "find".to_string()][..]));
            assert!(!config.cache.clean.on.deleted);
            assert!(config.cache.clean.on.created);
            assert_eq!(config.registry.file, "keys.json");
            assert_eq!(config.registry.store, RegistryStoreKind::Sqlite);
            Ok(())
        });
    }
}
