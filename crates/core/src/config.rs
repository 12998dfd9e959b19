//! Global config store (spec §4.1).
//!
//! Single JSON file under the user's config directory mapping absolute
//! project paths to `{collectionName, settings}`. Resolved the way the
//! teacher's desktop/setup crates resolve platform config paths — via the
//! `dirs` crate rather than hand-rolled `$HOME` handling.

use crate::error::{Error, Result};
use crate::project::{collection_name, Settings};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub collection_name: String,
    #[serde(default)]
    pub settings: PartialSettings,
}

/// Settings overrides layered on top of [`Settings::default`]. Every field
/// is optional so a project config only needs to name what it overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialSettings {
    pub vector_store_url: Option<String>,
    pub embeddings_url: Option<String>,
    pub embed_model: Option<String>,
    pub vector_size: Option<usize>,
    pub max_chunk_lines: Option<usize>,
    pub overlap_lines: Option<usize>,
    pub max_file_bytes: Option<u64>,
    pub top_k_default: Option<usize>,
    pub score_threshold: Option<f32>,
    pub port: Option<u16>,
}

impl PartialSettings {
    fn merge_onto(&self, mut base: Settings) -> Settings {
        if let Some(v) = &self.vector_store_url {
            base.vector_store_url = v.clone();
        }
        if let Some(v) = &self.embeddings_url {
            base.embeddings_url = v.clone();
        }
        if let Some(v) = &self.embed_model {
            base.embed_model = v.clone();
        }
        if let Some(v) = self.vector_size {
            base.vector_size = v;
        }
        if let Some(v) = self.max_chunk_lines {
            base.max_chunk_lines = v;
        }
        if let Some(v) = self.overlap_lines {
            base.overlap_lines = v;
        }
        if let Some(v) = self.max_file_bytes {
            base.max_file_bytes = v;
        }
        if let Some(v) = self.top_k_default {
            base.top_k_default = v;
        }
        if let Some(v) = self.score_threshold {
            base.score_threshold = v;
        }
        if let Some(v) = self.port {
            base.port = v;
        }
        base
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: Option<String>,
}

/// On-disk shape of the config file. `projects` used to be a JSON array in
/// older versions; [`GlobalConfig::load`] migrates that shape transparently.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Resolve `<config_dir>/semindex/config.json`.
pub fn config_path() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or_else(|| Error::configuration("could not determine user config directory"))?;
    Ok(dir.join("semindex").join("config.json"))
}

impl GlobalConfig {
    /// Load the config file, returning defaults if it does not exist.
    /// JSON parse errors propagate (spec §4.1 failure semantics).
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(GlobalConfig::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| Error::filesystem(path, e))?;
        let value: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| Error::configuration(format!("invalid config JSON: {e}")))?;
        Self::from_value(value)
    }

    /// Parse a config `Value`, migrating the legacy `projects: [...]` list
    /// shape (each element becomes `{path: {collectionName, settings}}`
    /// with a freshly computed `collectionName`).
    fn from_value(mut value: serde_json::Value) -> Result<Self> {
        if let Some(projects) = value.get("projects") {
            if projects.is_array() {
                let legacy: Vec<String> = serde_json::from_value(projects.clone())
                    .map_err(|e| Error::configuration(format!("invalid legacy projects list: {e}")))?;
                let mut migrated = serde_json::Map::new();
                for path in legacy {
                    let name = collection_name(Path::new(&path));
                    migrated.insert(
                        path,
                        serde_json::json!({ "collectionName": name, "settings": {} }),
                    );
                }
                value["projects"] = serde_json::Value::Object(migrated);
            }
        }
        serde_json::from_value(value)
            .map_err(|e| Error::configuration(format!("invalid config schema: {e}")))
    }

    /// Atomically persist the config to `path` (parent directories created
    /// as needed).
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::filesystem(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::configuration(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, json).map_err(|e| Error::filesystem(path, e))
    }

    /// Register `path`, computing its collection name if it is not already
    /// present. Idempotent: re-adding an already-registered path is a no-op.
    pub fn add_project(&mut self, path: &Path) -> &ProjectConfig {
        let key = path.to_string_lossy().to_string();
        self.projects.entry(key.clone()).or_insert_with(|| ProjectConfig {
            collection_name: collection_name(path),
            settings: PartialSettings::default(),
        });
        &self.projects[&key]
    }

    pub fn remove_project(&mut self, path: &Path) -> Option<ProjectConfig> {
        self.projects.remove(&path.to_string_lossy().to_string())
    }

    /// Merged defaults + overrides for a registered project, or `None` if
    /// the project is not registered.
    pub fn get_project_config(&self, path: &Path) -> Option<(String, Settings)> {
        let key = path.to_string_lossy().to_string();
        let cfg = self.projects.get(&key)?;
        Some((cfg.collection_name.clone(), cfg.settings.merge_onto(Settings::default())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let cfg = GlobalConfig::load(&path).unwrap();
        assert!(cfg.projects.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut cfg = GlobalConfig::default();
        cfg.add_project(Path::new("/tmp/proj"));
        cfg.save(&path).unwrap();

        let loaded = GlobalConfig::load(&path).unwrap();
        assert_eq!(loaded.projects.len(), 1);
        assert!(loaded.get_project_config(Path::new("/tmp/proj")).is_some());
    }

    #[test]
    fn add_project_is_idempotent() {
        let mut cfg = GlobalConfig::default();
        cfg.add_project(Path::new("/tmp/proj"));
        let name1 = cfg.projects["/tmp/proj"].collection_name.clone();
        cfg.add_project(Path::new("/tmp/proj"));
        let name2 = cfg.projects["/tmp/proj"].collection_name.clone();
        assert_eq!(name1, name2);
        assert_eq!(cfg.projects.len(), 1);
    }

    #[test]
    fn migrates_legacy_array_shape() {
        let value = serde_json::json!({ "projects": ["/tmp/a", "/tmp/b"] });
        let cfg = GlobalConfig::from_value(value).unwrap();
        assert_eq!(cfg.projects.len(), 2);
        assert!(cfg.get_project_config(Path::new("/tmp/a")).is_some());
    }

    #[test]
    fn invalid_json_propagates_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not valid json").unwrap();
        assert!(GlobalConfig::load(&path).is_err());
    }

    #[test]
    fn unknown_project_returns_none() {
        let cfg = GlobalConfig::default();
        assert!(cfg.get_project_config(Path::new("/nope")).is_none());
    }
}
