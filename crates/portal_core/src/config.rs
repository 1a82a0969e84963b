//! Portal configuration: TOML file, `.env`, environment overrides.
//!
//! # Responsibility
//! - Parse `portal.toml` into typed sections with defaults for every field.
//! - Apply environment overrides and pick up the reasoning API key.
//! - Build the record sources and reasoning client settings from config.
//!
//! # Invariants
//! - A missing default config file yields the built-in defaults.
//! - An explicitly named config file must exist.
//! - `validate` runs before a config is handed out by `load`.

use crate::reasoning::ReasoningClientConfig;
use crate::source::{source_for_location, DomainSources, SourceResult};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "portal.toml";

const ENV_DATABASE_PATH: &str = "PORTAL_DATABASE_PATH";
const ENV_LOG_DIR: &str = "PORTAL_LOG_DIR";
const ENV_LOG_LEVEL: &str = "PORTAL_LOG_LEVEL";

/// Configuration load/validation failure.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, message: String },
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read config `{}`: {source}", path.display())
            }
            Self::Parse { path, message } => {
                write!(f, "invalid config `{}`: {message}", path.display())
            }
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { .. } | Self::Invalid(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub database_path: PathBuf,
    pub logging: LoggingConfig,
    pub sources: SourcesConfig,
    pub reasoning: ReasoningConfig,
    pub server: ServerConfig,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("unified_company.db"),
            logging: LoggingConfig::default(),
            sources: SourcesConfig::default(),
            reasoning: ReasoningConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: None,
            dir: PathBuf::from("logs"),
        }
    }
}

/// Locations of the four upstream feeds.
///
/// Each location is an `http(s)://` URL or a path to a JSON array file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub employees: String,
    pub projects: String,
    pub expenses: String,
    pub tasks: String,
    pub timeout_secs: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            employees: "http://127.0.0.1:8000/employees".to_string(),
            projects: "http://127.0.0.1:8001/projects".to_string(),
            expenses: "http://127.0.0.1:8001/expenses".to_string(),
            tasks: "http://127.0.0.1:8002/tasks".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o".to_string(),
            temperature: 0.0,
            timeout_secs: 60,
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl PortalConfig {
    /// Loads config from `path`, or from `portal.toml` when it exists.
    ///
    /// Reads `.env` first so its values take part in the overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn from_toml_str(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|err| err.to_string())
    }

    /// Applies `PORTAL_*` overrides and the API key from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(path) = non_blank(ENV_DATABASE_PATH) {
            self.database_path = PathBuf::from(path.trim());
        }
        if let Some(dir) = non_blank(ENV_LOG_DIR) {
            self.logging.dir = PathBuf::from(dir.trim());
        }
        if let Some(level) = non_blank(ENV_LOG_LEVEL) {
            self.logging.level = Some(level.trim().to_string());
        }
        if let Some(key) = non_blank(self.reasoning.api_key_env.trim()) {
            self.reasoning.api_key = Some(key.trim().to_string());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "database_path cannot be empty".to_string(),
            ));
        }
        if self.sources.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "sources.timeout_secs must be greater than zero".to_string(),
            ));
        }
        for (feed, location) in self.sources.locations() {
            if location.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "sources.{feed} cannot be empty"
                )));
            }
        }
        if self.reasoning.model.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "reasoning.model cannot be empty".to_string(),
            ));
        }
        if self.reasoning.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "reasoning.timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds one record source per feed.
    pub fn domain_sources(&self) -> SourceResult<DomainSources> {
        let timeout = Duration::from_secs(self.sources.timeout_secs);
        Ok(DomainSources {
            employees: source_for_location(&self.sources.employees, timeout)?,
            projects: source_for_location(&self.sources.projects, timeout)?,
            expenses: source_for_location(&self.sources.expenses, timeout)?,
            tasks: source_for_location(&self.sources.tasks, timeout)?,
        })
    }

    pub fn reasoning_client_config(&self) -> ReasoningClientConfig {
        ReasoningClientConfig {
            endpoint: self.reasoning.endpoint.clone(),
            api_key: self.reasoning.api_key.clone(),
            model: self.reasoning.model.clone(),
            temperature: self.reasoning.temperature,
            timeout: Duration::from_secs(self.reasoning.timeout_secs),
        }
    }
}

impl SourcesConfig {
    fn locations(&self) -> [(&'static str, &str); 4] {
        [
            ("employees", self.employees.as_str()),
            ("projects", self.projects.as_str()),
            ("expenses", self.expenses.as_str()),
            ("tasks", self.tasks.as_str()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, PortalConfig};
    use std::collections::HashMap;
    use std::io::Write;
    use std::path::{Path, PathBuf};

    #[test]
    fn empty_document_yields_defaults() {
        let config = PortalConfig::from_toml_str("").unwrap();
        assert_eq!(config, PortalConfig::default());
        assert_eq!(config.sources.employees, "http://127.0.0.1:8000/employees");
        assert_eq!(config.sources.timeout_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = PortalConfig::from_toml_str(
            r#"
            database_path = "/var/lib/portal/unified.db"

            [sources]
            tasks = "fixtures/tasks.json"
            timeout_secs = 5

            [reasoning]
            model = "local-model"
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/var/lib/portal/unified.db"));
        assert_eq!(config.sources.tasks, "fixtures/tasks.json");
        assert_eq!(config.sources.projects, "http://127.0.0.1:8001/projects");
        assert_eq!(config.sources.timeout_secs, 5);
        assert_eq!(config.reasoning.model, "local-model");
        assert_eq!(config.reasoning.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn api_key_is_never_read_from_file() {
        let config = PortalConfig::from_toml_str("[reasoning]\napi_key = \"sk-file\"\n").unwrap();
        assert_eq!(config.reasoning.api_key, None);
    }

    #[test]
    fn overrides_apply_non_blank_values() {
        let env = HashMap::from([
            ("PORTAL_DATABASE_PATH", "/tmp/override.db"),
            ("PORTAL_LOG_LEVEL", "  "),
            ("PORTAL_LOG_DIR", "/tmp/portal-logs"),
            ("OPENAI_API_KEY", " sk-test "),
        ]);
        let mut config = PortalConfig::default();
        config.apply_overrides(|key| env.get(key).map(|value| value.to_string()));

        assert_eq!(config.database_path, PathBuf::from("/tmp/override.db"));
        assert_eq!(config.logging.dir, PathBuf::from("/tmp/portal-logs"));
        assert_eq!(config.logging.level, None);
        assert_eq!(config.reasoning.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn api_key_env_name_is_configurable() {
        let mut config =
            PortalConfig::from_toml_str("[reasoning]\napi_key_env = \"PORTAL_LLM_KEY\"\n").unwrap();
        config.apply_overrides(|key| (key == "PORTAL_LLM_KEY").then(|| "sk-other".to_string()));
        assert_eq!(config.reasoning.api_key.as_deref(), Some("sk-other"));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = PortalConfig::default();
        config.sources.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = PortalConfig::default();
        config.sources.expenses = " ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sources.expenses"));

        let mut config = PortalConfig::default();
        config.database_path = PathBuf::new();
        assert!(config.validate().is_err());

        let mut config = PortalConfig::default();
        config.reasoning.model = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn file_loading_reports_path_on_errors() {
        let missing = PortalConfig::from_file(Path::new("/nonexistent/portal.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database_path = [1, 2]").unwrap();
        let err = PortalConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn reasoning_client_config_carries_timeout() {
        let mut config = PortalConfig::default();
        config.reasoning.timeout_secs = 7;
        let client = config.reasoning_client_config();
        assert_eq!(client.timeout.as_secs(), 7);
        assert_eq!(client.model, "gpt-4o");
    }
}
