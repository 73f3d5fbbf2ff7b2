//! Configuration for the breakglass engine.
//!
//! Loaded from a TOML file whose path is taken from `BREAKGLASS_CONFIG_PATH`
//! (default `./config.toml`). A `.env` file is honoured if present.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bg_model::Transition;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "BREAKGLASS_CONFIG_PATH";

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "./config.toml";

/// Upper bound for every configured duration: 365 days.
pub const MAX_DURATION_SECS: i64 = 365 * 24 * 60 * 60;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Identity provider connection.
    pub keycloak: KeycloakConfig,
    /// Approval token signing.
    pub approval: ApprovalConfig,
    /// Transition catalog.
    #[serde(default)]
    pub catalog: CatalogConfig,
    /// Identity provider session handling.
    #[serde(default)]
    pub session: SessionConfig,
    /// Grant expiry reconciliation.
    #[serde(default)]
    pub reaper: ReaperConfig,
    /// Admission reviews.
    #[serde(default)]
    pub review: ReviewConfig,
}

/// Identity provider connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeycloakConfig {
    /// Base URL of the identity provider.
    pub url: String,
    /// Service client id.
    pub client_id: String,
    /// Service client secret.
    pub client_secret: String,
    /// Realm the service client authenticates against.
    pub login_realm: String,
    /// Realm whose users and groups are managed.
    pub managed_realm: String,
}

/// Approval token signing keys and window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// PEM encoded RSA private key.
    pub private_key: String,
    /// PEM encoded RSA public key.
    pub public_key: String,
    /// Seconds a request token stays redeemable.
    #[serde(default = "default_request_window_secs")]
    pub request_window_secs: i64,
    /// Issuer stamped into and required from tokens.
    #[serde(default)]
    pub issuer: Option<String>,
}

/// Transition catalog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Seconds a discovered snapshot is served before rediscovery.
    #[serde(default = "default_staleness_secs")]
    pub staleness_secs: u64,
    /// Grant duration stamped on transitions found by naming convention.
    #[serde(default = "default_discovered_duration_secs")]
    pub discovered_duration_secs: i64,
    /// Members of these groups may take every global transition.
    #[serde(default)]
    pub global_breakglass_groups: Vec<String>,
    /// Statically configured transitions; these win over discovered ones.
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

/// Session refresh thresholds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds shaved off the access token lifetime.
    #[serde(default)]
    pub premature_access_threshold_secs: i64,
    /// Seconds shaved off the refresh token lifetime.
    #[serde(default)]
    pub premature_refresh_threshold_secs: i64,
}

/// Reaper settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperConfig {
    /// Seconds between sweeps.
    #[serde(default = "default_reaper_interval_secs")]
    pub interval_secs: u64,
}

/// What happens to a review whose validity has elapsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReviewRenewal {
    /// Extend a stale Pending record with a fresh validity. Decided records
    /// are never reopened; a new Pending one is appended instead.
    ReplaceInPlace,
    /// Keep the stale record and append a new Pending one.
    #[default]
    Append,
}

/// Admission review settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Seconds a review stays valid.
    #[serde(default = "default_review_validity_secs")]
    pub validity_secs: i64,
    /// Stale review policy.
    #[serde(default)]
    pub renewal: ReviewRenewal,
}

const fn default_request_window_secs() -> i64 {
    3600
}

const fn default_staleness_secs() -> u64 {
    3600
}

const fn default_discovered_duration_secs() -> i64 {
    7200
}

const fn default_reaper_interval_secs() -> u64 {
    60
}

const fn default_review_validity_secs() -> i64 {
    300
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            staleness_secs: default_staleness_secs(),
            discovered_duration_secs: default_discovered_duration_secs(),
            global_breakglass_groups: Vec::new(),
            transitions: Vec::new(),
        }
    }
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_reaper_interval_secs(),
        }
    }
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            validity_secs: default_review_validity_secs(),
            renewal: ReviewRenewal::default(),
        }
    }
}

impl CatalogConfig {
    /// Returns the staleness window.
    #[must_use]
    pub const fn staleness(&self) -> Duration {
        Duration::from_secs(self.staleness_secs)
    }
}

impl ReaperConfig {
    /// Returns the sweep interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Config {
    /// Loads configuration from the path in `BREAKGLASS_CONFIG_PATH`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load() -> ConfigResult<Self> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        Self::from_path(&path)
    }

    /// Loads configuration from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid configuration.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates semantic constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first violation.
    pub fn validate(&self) -> ConfigResult<()> {
        let kc = &self.keycloak;
        for (name, value) in [
            ("keycloak.url", &kc.url),
            ("keycloak.client_id", &kc.client_id),
            ("keycloak.login_realm", &kc.login_realm),
            ("keycloak.managed_realm", &kc.managed_realm),
            ("approval.private_key", &self.approval.private_key),
            ("approval.public_key", &self.approval.public_key),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{name} must not be empty")));
            }
        }

        check_duration("approval.request_window_secs", self.approval.request_window_secs)?;
        check_duration(
            "catalog.discovered_duration_secs",
            self.catalog.discovered_duration_secs,
        )?;
        check_duration("review.validity_secs", self.review.validity_secs)?;
        if self.reaper.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "reaper.interval_secs must be positive".to_string(),
            ));
        }

        for t in &self.catalog.transitions {
            if t.from.is_empty() || t.to.is_empty() {
                return Err(ConfigError::Invalid(
                    "transitions need both from and to".to_string(),
                ));
            }
            check_duration(&format!("transition {} -> {} duration", t.from, t.to), t.duration)?;
            if t.approval_groups.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "transition {} -> {} has no approval groups",
                    t.from, t.to
                )));
            }
        }

        Ok(())
    }
}

fn check_duration(name: &str, secs: i64) -> ConfigResult<()> {
    if secs <= 0 {
        return Err(ConfigError::Invalid(format!("{name} must be positive")));
    }
    if secs > MAX_DURATION_SECS {
        return Err(ConfigError::Invalid(format!(
            "{name} must not exceed {MAX_DURATION_SECS} seconds"
        )));
    }
    Ok(())
}
