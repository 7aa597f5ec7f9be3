//! Startup configuration for cfa-engine
//!
//! Resolves the config file and root folder, then prepares the root folder
//! so the database can be opened.
//!
//! **Root folder priority:** CLI → `CFA_ROOT_FOLDER` → TOML → OS default.
//! **Config file priority:** CLI → `CFA_CONFIG` → `<config dir>/cfa/cfa.toml`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use cfa_common::config::{
    load_toml_config, resolve_config_path, RootFolderInitializer, RootFolderResolver, TomlConfig,
};
use cfa_common::Result;
use tracing::info;

use crate::ingestion::CoordinatorSettings;

/// Everything resolved before the database is opened
#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub toml: TomlConfig,
    pub config_path: PathBuf,
    pub root_folder: PathBuf,
    pub database_path: PathBuf,
}

impl StartupConfig {
    /// Resolve config and root folder; creates the root folder if missing
    pub fn resolve(cli_root: Option<PathBuf>, cli_config: Option<&Path>) -> Result<Self> {
        let config_path = resolve_config_path(cli_config);
        let toml = load_toml_config(&config_path)?;
        Self::prepare(cli_root, config_path, toml)
    }

    /// Resolve the root folder for an already-loaded config
    pub fn prepare(cli_root: Option<PathBuf>, config_path: PathBuf, toml: TomlConfig) -> Result<Self> {
        let root_folder = RootFolderResolver::new(cli_root, &toml).resolve();
        let initializer = RootFolderInitializer::new(root_folder.clone());
        initializer.ensure_directory_exists()?;
        let database_path = initializer.database_path();

        info!(
            config = %config_path.display(),
            root_folder = %root_folder.display(),
            "Configuration resolved"
        );

        Ok(Self {
            toml,
            config_path,
            root_folder,
            database_path,
        })
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings::from(&self.toml.engine)
    }

    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_secs(self.toml.engine.adapter_timeout_secs)
    }

    pub fn ingest_interval(&self) -> Duration {
        Duration::from_secs(self.toml.engine.ingest_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_with_explicit_paths() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("cfa.toml");
        std::fs::write(
            &config_path,
            "[engine]\ningest_interval_secs = 60\nadapter_timeout_secs = 3\n",
        )
        .unwrap();
        let root = temp_dir.path().join("root");

        let startup = StartupConfig::resolve(Some(root.clone()), Some(&config_path)).unwrap();

        assert!(root.is_dir());
        assert_eq!(startup.database_path, root.join("cfa.db"));
        assert_eq!(startup.ingest_interval(), Duration::from_secs(60));
        assert_eq!(startup.adapter_timeout(), Duration::from_secs(3));
        assert_eq!(startup.coordinator_settings().adapter_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_malformed_config_fails_startup() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("cfa.toml");
        std::fs::write(&config_path, "engine = [").unwrap();

        let result = StartupConfig::resolve(Some(temp_dir.path().join("root")), Some(&config_path));
        assert!(result.is_err());
    }
}
