use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which storage backend to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    File,
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: Backend,
    /// Project root for the file backend, database file for SQLite
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::File,
            path: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardDefaults {
    /// Columns created for a new project when the request names none
    pub default_columns: Vec<String>,
}

impl Default for BoardDefaults {
    fn default() -> Self {
        Self {
            default_columns: vec![
                "Todo".to_string(),
                "In Progress".to_string(),
                "Done".to_string(),
            ],
        }
    }
}

/// Library configuration, usually read from `kanban.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub board: BoardDefaults,
}

impl Config {
    pub const FILE_NAME: &'static str = "kanban.toml";

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Reads the config file, falling back to defaults when it is absent
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let contents = tokio::fs::read_to_string(path).await?;
        Self::from_toml_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.storage.backend, Backend::File);
        assert_eq!(config.board.default_columns.len(), 3);
    }

    #[test]
    fn test_parse_sqlite_backend() {
        let config = Config::from_toml_str(
            r#"
            [storage]
            backend = "sqlite"
            path = "/var/lib/kanban/board.db"

            [board]
            default_columns = ["Backlog", "Doing"]
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.backend, Backend::Sqlite);
        assert_eq!(config.storage.path, PathBuf::from("/var/lib/kanban/board.db"));
        assert_eq!(config.board.default_columns, vec!["Backlog", "Doing"]);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = Config::from_toml_str("[storage]\nbackend = \"file\"\npath = \"/tmp/x\"\n").unwrap();
        assert_eq!(config.board, BoardDefaults::default());
    }

    #[test]
    fn test_invalid_backend_is_config_error() {
        let err = Config::from_toml_str("[storage]\nbackend = \"postgres\"\npath = \"x\"\n")
            .unwrap_err();
        assert!(matches!(err, crate::error::KanbanError::ConfigError(_)));
    }

    #[tokio::test]
    async fn test_load_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load(temp_dir.path().join(Config::FILE_NAME))
            .await
            .unwrap();
        assert_eq!(config, Config::default());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(Config::FILE_NAME);
        tokio::fs::write(&path, "[board]\ndefault_columns = [\"One\"]\n")
            .await
            .unwrap();

        let config = Config::load(&path).await.unwrap();
        assert_eq!(config.board.default_columns, vec!["One"]);
        assert_eq!(config.storage, StorageConfig::default());
    }
}
