use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use orchestrator::{ArgoClientConfig, ContainerSettings, OrchestratorConfig};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "scenario-studio.toml";
const DEFAULT_DB_NAME: &str = "scenario-studio.db";
const DEFAULT_CATALOG_NAME: &str = "catalog.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StudioConfig {
    pub database: DatabaseConfig,
    pub catalog: CatalogConfig,
    pub workflow: ArgoClientConfig,
    pub containers: ContainerSettings,
    pub orchestrator: OrchestratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DB_NAME),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CatalogConfig {
    /// JSON file listing organizations, workspaces, solutions, datasets, connectors and users.
    pub path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_CATALOG_NAME),
        }
    }
}

impl StudioConfig {
    /// Read `path`, falling back to defaults when the file does not exist.
    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(Self::default());
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Relative paths in the file are resolved against the directory holding it.
    pub fn resolve_paths(mut self, config_path: &Path) -> Self {
        let base = config_path.parent().unwrap_or_else(|| Path::new(""));
        if self.database.path.is_relative() {
            self.database.path = base.join(&self.database.path);
        }
        if self.catalog.path.is_relative() {
            self.catalog.path = base.join(&self.catalog.path);
        }
        self
    }

    pub fn database_url(&self) -> String {
        format!("sqlite:{}", self.database.path.display())
    }
}
