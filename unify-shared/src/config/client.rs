//! Client configuration: layered defaults, file, environment and command line.

use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;
use url::Url;

const DEFAULT_API_URL: &str = "http://localhost:3000/";
const DEFAULT_SOCKET_URL: &str = "ws://localhost:3000/socket";
const DEFAULT_MATCH_WINDOW_MS: u64 = 8_000;
const DEFAULT_SEARCH_MIN_CHARS: usize = 2;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The YAML file did not parse.
    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yml::Error),

    /// The JSON file did not parse.
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// File extension is neither yaml nor json.
    #[error("Unsupported configuration format. Use 'yaml' or 'json'.")]
    UnsupportedFormat,

    /// A value failed validation.
    #[error("Invalid {key} value: {message}")]
    InvalidValue {
        /// Offending setting.
        key: &'static str,
        /// What is wrong with it.
        message: String,
    },
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err("expected 'text' or 'json'"),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Json => "json",
        })
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level filter (`RUST_LOG` takes precedence at runtime).
    pub level: String,
    /// Line format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Identity of the signed-in user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Identifier of the signed-in user.
    pub user_id: Option<String>,
    /// Bearer token issued at sign-in.
    pub token: Option<String>,
}

/// Tuning for the reconciliation core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    /// Maximum distance between an optimistic entry's local timestamp and the
    /// server echo's timestamp for the two to be reconciled.
    pub match_window_ms: u64,
    /// Minimum trimmed query length before a user search is issued.
    pub search_min_chars: usize,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            match_window_ms: DEFAULT_MATCH_WINDOW_MS,
            search_min_chars: DEFAULT_SEARCH_MIN_CHARS,
        }
    }
}

/// The main configuration structure for the Unify chat client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the REST backend; chat endpoints live under `chat/`.
    pub api_base_url: String,

    /// URL of the push-channel endpoint.
    pub socket_url: String,

    /// Signed-in identity.
    pub session: SessionConfig,

    /// Log output.
    pub logging: LoggingConfig,

    /// Reconciliation tuning.
    pub chat: ChatSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Config {
    /// Generates a default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            socket_url: DEFAULT_SOCKET_URL.to_string(),
            session: SessionConfig::default(),
            logging: LoggingConfig::default(),
            chat: ChatSettings::default(),
        }
    }

    /// Loads the configuration from a file, environment variables, or defaults.
    ///
    /// Precedence: explicit `session_override` values, then the file, then
    /// `UNIFY_*` environment variables (only for values the file left at
    /// their defaults), then built-in defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, an environment
    /// variable holds an invalid value, or the resolved configuration fails
    /// validation.
    pub fn load_config(
        config_path: Option<PathBuf>,
        session_override: SessionConfig,
    ) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) => Self::from_file(&path)?,
            None => Self::with_defaults(),
        };

        config.apply_env_overrides()?;

        if session_override.user_id.is_some() {
            config.session.user_id = session_override.user_id;
        }
        if session_override.token.is_some() {
            config.session.token = session_override.token;
        }

        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => Ok(serde_yml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            _ => Err(ConfigError::UnsupportedFormat),
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let defaults = Self::with_defaults();

        if self.api_base_url == defaults.api_base_url
            && let Ok(value) = env::var("UNIFY_API_URL")
        {
            self.api_base_url = value;
        }
        if self.socket_url == defaults.socket_url
            && let Ok(value) = env::var("UNIFY_SOCKET_URL")
        {
            self.socket_url = value;
        }
        if self.session.user_id.is_none()
            && let Ok(value) = env::var("UNIFY_USER_ID")
        {
            self.session.user_id = Some(value);
        }
        if self.session.token.is_none()
            && let Ok(value) = env::var("UNIFY_TOKEN")
        {
            self.session.token = Some(value);
        }
        if self.logging.level == defaults.logging.level
            && let Ok(value) = env::var("UNIFY_LOG_LEVEL")
        {
            self.logging.level = value;
        }
        if self.logging.format == defaults.logging.format
            && let Ok(value) = env::var("UNIFY_LOG_FORMAT")
        {
            self.logging.format =
                value
                    .parse()
                    .map_err(|message: &str| ConfigError::InvalidValue {
                        key: "UNIFY_LOG_FORMAT",
                        message: message.to_string(),
                    })?;
        }
        if self.chat.match_window_ms == defaults.chat.match_window_ms
            && let Ok(value) = env::var("UNIFY_MATCH_WINDOW_MS")
        {
            self.chat.match_window_ms =
                value.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "UNIFY_MATCH_WINDOW_MS",
                    message: "must be a whole number of milliseconds".to_string(),
                })?;
        }

        Ok(())
    }

    /// Validates the resolved configuration.
    ///
    /// # Errors
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let api = self.api_url()?;
        if !matches!(api.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue {
                key: "api_base_url",
                message: format!("unsupported scheme '{}'", api.scheme()),
            });
        }

        let socket = self.socket_url()?;
        if !matches!(socket.scheme(), "ws" | "wss") {
            return Err(ConfigError::InvalidValue {
                key: "socket_url",
                message: format!("unsupported scheme '{}'", socket.scheme()),
            });
        }

        if self.chat.match_window_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "match_window_ms",
                message: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Parsed REST base URL.
    ///
    /// # Errors
    /// Returns an error if the configured value is not a valid URL.
    pub fn api_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.api_base_url).map_err(|err| ConfigError::InvalidValue {
            key: "api_base_url",
            message: err.to_string(),
        })
    }

    /// Parsed push-channel URL.
    ///
    /// # Errors
    /// Returns an error if the configured value is not a valid URL.
    pub fn socket_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.socket_url).map_err(|err| ConfigError::InvalidValue {
            key: "socket_url",
            message: err.to_string(),
        })
    }

    /// Renders the configuration as YAML.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yml::to_string(self)?)
    }

    /// Renders the configuration as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Default location of the configuration file.
    #[must_use]
    pub fn default_path() -> PathBuf {
        BaseDirs::new().map_or_else(
            || PathBuf::from("./unify.yaml"),
            |dirs| dirs.config_dir().join("unify").join("config.yaml"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn cleanup_env_vars() {
        unsafe {
            env::remove_var("UNIFY_API_URL");
            env::remove_var("UNIFY_SOCKET_URL");
            env::remove_var("UNIFY_USER_ID");
            env::remove_var("UNIFY_TOKEN");
            env::remove_var("UNIFY_LOG_LEVEL");
            env::remove_var("UNIFY_LOG_FORMAT");
            env::remove_var("UNIFY_MATCH_WINDOW_MS");
        }
    }

    #[test]
    #[serial]
    fn test_load_config_with_defaults() {
        cleanup_env_vars();
        let config = Config::load_config(None, SessionConfig::default()).unwrap();

        assert_eq!(config, Config::with_defaults());
        assert_eq!(config.chat.match_window_ms, 8_000);
        assert_eq!(config.chat.search_min_chars, 2);
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    #[serial]
    fn test_load_config_with_environment_variables() {
        cleanup_env_vars();
        unsafe {
            env::set_var("UNIFY_API_URL", "https://api.unify.test/");
            env::set_var("UNIFY_SOCKET_URL", "wss://api.unify.test/socket");
            env::set_var("UNIFY_USER_ID", "u1");
            env::set_var("UNIFY_TOKEN", "secret");
            env::set_var("UNIFY_LOG_FORMAT", "json");
            env::set_var("UNIFY_MATCH_WINDOW_MS", "3000");
        }

        let config = Config::load_config(None, SessionConfig::default()).unwrap();

        assert_eq!(config.api_base_url, "https://api.unify.test/");
        assert_eq!(config.socket_url, "wss://api.unify.test/socket");
        assert_eq!(config.session.user_id.as_deref(), Some("u1"));
        assert_eq!(config.session.token.as_deref(), Some("secret"));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.chat.match_window_ms, 3000);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_session_override_precedence() {
        cleanup_env_vars();
        unsafe {
            env::set_var("UNIFY_TOKEN", "from-env");
        }

        let config = Config::load_config(
            None,
            SessionConfig {
                user_id: Some("cli-user".into()),
                token: Some("from-cli".into()),
            },
        )
        .unwrap();

        assert_eq!(config.session.token.as_deref(), Some("from-cli"));
        assert_eq!(config.session.user_id.as_deref(), Some("cli-user"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_invalid_match_window_environment() {
        cleanup_env_vars();
        unsafe {
            env::set_var("UNIFY_MATCH_WINDOW_MS", "soon");
        }

        let result = Config::load_config(None, SessionConfig::default());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid UNIFY_MATCH_WINDOW_MS")
        );

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_load_partial_yaml_file() -> Result<(), Box<dyn std::error::Error>> {
        cleanup_env_vars();
        let temp_dir = TempDir::new()?;
        let config_file = temp_dir.path().join("unify.yaml");
        fs::write(
            &config_file,
            r#"
api_base_url: "http://campus.local:4000/"
session:
  user_id: "65f0c0ffee"
chat:
  match_window_ms: 5000
"#,
        )?;

        let config = Config::load_config(Some(config_file), SessionConfig::default())?;

        assert_eq!(config.api_base_url, "http://campus.local:4000/");
        assert_eq!(config.socket_url, DEFAULT_SOCKET_URL);
        assert_eq!(config.session.user_id.as_deref(), Some("65f0c0ffee"));
        assert_eq!(config.chat.match_window_ms, 5000);
        assert_eq!(config.chat.search_min_chars, 2);
        Ok(())
    }

    #[test]
    #[serial]
    fn test_load_json_file() -> Result<(), Box<dyn std::error::Error>> {
        cleanup_env_vars();
        let temp_dir = TempDir::new()?;
        let config_file = temp_dir.path().join("unify.json");
        fs::write(&config_file, r#"{"logging": {"level": "debug"}}"#)?;

        let config = Config::load_config(Some(config_file), SessionConfig::default())?;

        assert_eq!(config.logging.level, "debug");
        Ok(())
    }

    #[test]
    fn test_unsupported_extension() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("unify.toml");
        fs::write(&config_file, "").unwrap();

        let result = Config::load_config(Some(config_file), SessionConfig::default());
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat)));
    }

    #[test]
    fn test_validate_rejects_bad_schemes_and_zero_window() {
        let mut config = Config::with_defaults();
        config.socket_url = "http://localhost:3000/socket".into();
        assert!(config.validate().unwrap_err().to_string().contains("socket_url"));

        let mut config = Config::with_defaults();
        config.api_base_url = "ftp://localhost/".into();
        assert!(config.validate().unwrap_err().to_string().contains("api_base_url"));

        let mut config = Config::with_defaults();
        config.chat.match_window_ms = 0;
        assert!(config.validate().unwrap_err().to_string().contains("match_window_ms"));
    }

    #[test]
    fn test_yaml_rendering_reloads() {
        let yaml = Config::with_defaults().to_yaml().unwrap();
        let parsed: Config = serde_yml::from_str(&yaml).unwrap();
        assert_eq!(parsed, Config::with_defaults());
    }
}
