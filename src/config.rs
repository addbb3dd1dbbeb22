//! Service configuration: `config.toml` with per-field defaults, then environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEV_JWT_SECRET: &str = "ooak-development-secret-change-me";

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct CrmConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_metrics_bind")]
    pub metrics_bind: String,
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
    /// Requests per client per minute
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,
    /// Notification creation requests per client per minute
    #[serde(default = "default_write_rate_limit")]
    pub notification_writes_per_minute: u32,
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}
fn default_metrics_bind() -> String {
    "127.0.0.1:9091".to_string()
}
fn default_max_concurrent_requests() -> usize {
    100
}
fn default_rate_limit() -> u32 {
    60
}
fn default_write_rate_limit() -> u32 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_bind: default_metrics_bind(),
            max_concurrent_requests: default_max_concurrent_requests(),
            rate_limit_per_minute: default_rate_limit(),
            notification_writes_per_minute: default_write_rate_limit(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default = "default_db_name")]
    pub database: String,
    #[serde(default = "default_db_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_db_host() -> String {
    "localhost".to_string()
}
fn default_db_port() -> u16 {
    5432
}
fn default_db_name() -> String {
    "ooak_future".to_string()
}
fn default_db_user() -> String {
    "postgres".to_string()
}
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    2
}
fn default_idle_timeout() -> u64 {
    30
}
fn default_connect_timeout() -> u64 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            database: default_db_name(),
            user: default_db_user(),
            password: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            idle_timeout_secs: default_idle_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl DatabaseConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default = "default_session_hours")]
    pub session_hours: i64,
    #[serde(default)]
    pub cookie_secure: bool,
}

fn default_session_hours() -> i64 {
    24
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            session_hours: default_session_hours(),
            cookie_secure: false,
        }
    }
}

impl AuthConfig {
    pub fn secret(&self) -> &str {
        self.jwt_secret.as_deref().unwrap_or(DEV_JWT_SECRET)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_enabled")]
    pub enabled: bool,
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

fn default_llm_enabled() -> bool {
    true
}
fn default_llm_endpoint() -> String {
    "http://127.0.0.1:11434".to_string()
}
fn default_llm_model() -> String {
    "llama3.1:8b".to_string()
}
fn default_llm_timeout() -> u64 {
    30
}
fn default_temperature() -> f64 {
    0.3
}
fn default_max_tokens() -> usize {
    1500
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: default_llm_enabled(),
            endpoint: default_llm_endpoint(),
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl CrmConfig {
    /// Apply environment overrides. `lookup` is `std::env::var` in production.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("POSTGRES_HOST") {
            self.database.host = v;
        }
        if let Some(v) = lookup("POSTGRES_PORT") {
            match v.parse() {
                Ok(port) => self.database.port = port,
                Err(_) => tracing::warn!("Ignoring invalid POSTGRES_PORT: {}", v),
            }
        }
        if let Some(v) = lookup("POSTGRES_DATABASE") {
            self.database.database = v;
        }
        if let Some(v) = lookup("POSTGRES_USER") {
            self.database.user = v;
        }
        if let Some(v) = lookup("POSTGRES_PASSWORD") {
            self.database.password = v;
        }
        if let Some(v) = lookup("JWT_SECRET") {
            self.auth.jwt_secret = Some(v);
        }
        if let Some(v) = lookup("LLM_ENDPOINT") {
            self.llm.endpoint = v;
        }
        if let Some(v) = lookup("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = lookup("OOAK_BIND") {
            self.server.bind = v;
        }
    }

    pub fn warn_insecure_defaults(&self) {
        if self.auth.jwt_secret.is_none() {
            tracing::warn!("JWT_SECRET not set, using the development secret");
        }
    }
}

/// Default config location: ~/.ooak/config.toml
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ooak")
        .join("config.toml")
}

/// Load configuration from `path`. A missing file yields defaults; a malformed one is an error.
pub fn load_config(path: &Path) -> anyhow::Result<CrmConfig> {
    if !path.exists() {
        tracing::debug!("No config at {}, using defaults", path.display());
        return Ok(CrmConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
    Ok(config)
}

/// Load from file then environment.
pub fn load_effective_config(path: &Path) -> anyhow::Result<CrmConfig> {
    let mut config = load_config(path)?;
    config.apply_env(|key| std::env::var(key).ok());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = load_config(&temp.path().join("config.toml")).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:3000");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.auth.session_hours, 24);
        assert_eq!(config.llm.model, "llama3.1:8b");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(
            &path,
            "[database]\nhost = \"db.internal\"\nmax_connections = 5\n\n[llm]\nenabled = false\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.database.port, 5432);
        assert!(!config.llm.enabled);
        assert_eq!(config.server.rate_limit_per_minute, 60);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[database\nhost = ").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("POSTGRES_HOST", "pg"),
            ("POSTGRES_PORT", "6543"),
            ("POSTGRES_DATABASE", "crm"),
            ("POSTGRES_USER", "crm_user"),
            ("POSTGRES_PASSWORD", "s3cret"),
            ("JWT_SECRET", "jwt"),
        ]
        .into_iter()
        .collect();

        let mut config = CrmConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.database.host, "pg");
        assert_eq!(config.database.port, 6543);
        assert_eq!(config.database.database, "crm");
        assert_eq!(config.database.user, "crm_user");
        assert_eq!(config.database.password, "s3cret");
        assert_eq!(config.auth.secret(), "jwt");
    }

    #[test]
    fn test_invalid_port_ignored() {
        let mut config = CrmConfig::default();
        config.apply_env(|k| (k == "POSTGRES_PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config.database.port, 5432);
    }

    #[test]
    fn test_dev_secret_fallback() {
        let config = CrmConfig::default();
        assert_eq!(config.auth.secret(), DEV_JWT_SECRET);
    }

    #[test]
    fn test_default_roundtrips_through_toml() {
        let rendered = toml::to_string_pretty(&CrmConfig::default()).unwrap();
        let parsed: CrmConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.server.metrics_bind, "127.0.0.1:9091");
    }
}
