//! Configuration loading
//!
//! Resolution order for the TOML file:
//! 1. Explicit path (command-line argument)
//! 2. `PQA_CONFIG` environment variable
//! 3. Platform config directory (`~/.config/pqa/config.toml` on Linux)
//! 4. Compiled defaults (missing file is a warning, not an error)
//!
//! Individual values may then be overridden from the command line / env by
//! the binary.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::assignment::DEFAULT_PROMPTS_PER_ANNOTATOR;
use crate::identity::AnnotatorRoster;
use crate::{Error, Result};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "PQA_CONFIG";

pub const DEFAULT_PORT: u16 = 5780;

/// Where submissions are stored durably
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum RemoteConfig {
    /// Local SQLite table; `database` defaults to `<data_folder>/annotations.db`
    Sqlite {
        #[serde(default)]
        database: Option<PathBuf>,
    },
    /// Google spreadsheet; the bearer token is read from `token_env`
    Sheets {
        spreadsheet_id: String,
        #[serde(default = "default_sheet_name")]
        sheet_name: String,
        #[serde(default = "default_token_env")]
        token_env: String,
    },
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig::Sqlite { database: None }
    }
}

fn default_sheet_name() -> String {
    "Sheet1".to_string()
}

fn default_token_env() -> String {
    "PQA_SHEETS_TOKEN".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Contents of `config.toml`; every field is optional in the file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub bind_address: String,
    pub port: u16,
    /// Recovery files and the SQLite database live here
    pub data_folder: Option<PathBuf>,
    pub fiction_path: PathBuf,
    pub nonfiction_path: PathBuf,
    pub annotator_ids: Vec<String>,
    pub prompts_per_annotator: usize,
    /// Shared secret for the admin view; unset disables it
    pub admin_secret: Option<String>,
    pub remote: RemoteConfig,
    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            data_folder: None,
            fiction_path: PathBuf::from("annotations_fic.json"),
            nonfiction_path: PathBuf::from("annotations_non.json"),
            annotator_ids: ["1", "2", "3", "4", "5"].map(String::from).to_vec(),
            prompts_per_annotator: DEFAULT_PROMPTS_PER_ANNOTATOR,
            admin_secret: None,
            remote: RemoteConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TomlConfig {
    /// Parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<AnnotatorRoster> {
        if self.prompts_per_annotator == 0 {
            return Err(Error::Config(
                "prompts_per_annotator must be at least 1".to_string(),
            ));
        }
        let roster = AnnotatorRoster::new(&self.annotator_ids)
            .map_err(|e| Error::Config(format!("annotator_ids: {}", e)))?;
        if roster.is_empty() {
            return Err(Error::Config("annotator_ids must not be empty".to_string()));
        }
        if matches!(&self.admin_secret, Some(secret) if secret.trim().is_empty()) {
            return Err(Error::Config("admin_secret must not be blank".to_string()));
        }
        Ok(roster)
    }

    pub fn data_folder(&self) -> PathBuf {
        self.data_folder.clone().unwrap_or_else(default_data_folder)
    }

    pub fn recovery_dir(&self) -> PathBuf {
        self.data_folder().join("recovery")
    }

    /// SQLite path when the remote backend is `sqlite`
    pub fn database_path(&self) -> Option<PathBuf> {
        match &self.remote {
            RemoteConfig::Sqlite { database } => Some(
                database
                    .clone()
                    .unwrap_or_else(|| self.data_folder().join("annotations.db")),
            ),
            RemoteConfig::Sheets { .. } => None,
        }
    }
}

/// Locates and loads the config file
pub struct ConfigResolver {
    explicit: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(explicit: Option<PathBuf>) -> Self {
        Self { explicit }
    }

    /// First candidate path by priority, if any
    pub fn config_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.explicit {
            return Some(path.clone());
        }
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }
        dirs::config_dir()
            .map(|d| d.join("pqa").join("config.toml"))
            .filter(|p| p.exists())
    }

    /// Load the config; a missing file falls back to defaults
    ///
    /// A file that exists but cannot be parsed is an error.
    pub fn resolve(&self) -> Result<TomlConfig> {
        match self.config_path() {
            Some(path) if path.exists() => {
                let config = TomlConfig::load(&path)?;
                info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            Some(path) => {
                warn!(
                    "Config file {} not found; using compiled defaults",
                    path.display()
                );
                Ok(TomlConfig::default())
            }
            None => {
                warn!("No config file found; using compiled defaults");
                Ok(TomlConfig::default())
            }
        }
    }
}

/// OS-dependent default data folder
pub fn default_data_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("pqa"))
        .unwrap_or_else(|| PathBuf::from("./pqa_data"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = TomlConfig::default();
        let roster = config.validate().unwrap();
        assert_eq!(roster.len(), 5);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.prompts_per_annotator, 2);
        assert!(config.admin_secret.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            port = 6000
            annotator_ids = ["1", "2"]

            [remote]
            backend = "sheets"
            spreadsheet_id = "abc"
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 6000);
        assert_eq!(config.bind_address, "127.0.0.1");
        assert_eq!(config.annotator_ids, vec!["1", "2"]);
        assert_eq!(
            config.remote,
            RemoteConfig::Sheets {
                spreadsheet_id: "abc".to_string(),
                sheet_name: "Sheet1".to_string(),
                token_env: "PQA_SHEETS_TOKEN".to_string(),
            }
        );
        assert!(config.database_path().is_none());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = TomlConfig {
            prompts_per_annotator: 0,
            ..TomlConfig::default()
        };
        assert!(config.validate().is_err());

        config.prompts_per_annotator = 2;
        config.annotator_ids = vec!["alice".to_string()];
        assert!(config.validate().is_err());

        config.annotator_ids = Vec::new();
        assert!(config.validate().is_err());

        config.annotator_ids = vec!["1".to_string()];
        config.admin_secret = Some("  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_resolver_priority() {
        let dir = TempDir::new().unwrap();
        let from_env = dir.path().join("env.toml");
        let explicit = dir.path().join("explicit.toml");
        std::fs::write(&from_env, "port = 7001\n").unwrap();
        std::fs::write(&explicit, "port = 7002\n").unwrap();

        std::env::set_var(CONFIG_ENV_VAR, &from_env);
        let config = ConfigResolver::new(None).resolve().unwrap();
        assert_eq!(config.port, 7001);

        let config = ConfigResolver::new(Some(explicit)).resolve().unwrap();
        assert_eq!(config.port, 7002);

        std::env::remove_var(CONFIG_ENV_VAR);
    }

    #[test]
    #[serial]
    fn test_resolver_missing_file_uses_defaults() {
        std::env::remove_var(CONFIG_ENV_VAR);
        let dir = TempDir::new().unwrap();
        let resolver = ConfigResolver::new(Some(dir.path().join("absent.toml")));
        assert_eq!(resolver.resolve().unwrap(), TomlConfig::default());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "port = \"not a number\"\n").unwrap();
        assert!(matches!(TomlConfig::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_derived_paths() {
        let config = TomlConfig {
            data_folder: Some(PathBuf::from("/srv/pqa")),
            ..TomlConfig::default()
        };
        assert_eq!(config.recovery_dir(), PathBuf::from("/srv/pqa/recovery"));
        assert_eq!(
            config.database_path(),
            Some(PathBuf::from("/srv/pqa/annotations.db"))
        );
    }
}
