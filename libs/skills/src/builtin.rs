//! Built-in skill manifest loader
//!
//! Built-in manifests ship as JSON files named after their package id under
//! a resources directory resolved at startup. Parsed manifests are cached.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::sync::RwLock;

use crate::manifest::{ManifestError, SkillManifest};

/// Package id prefix reserved for bundled skills.
pub const BUILTIN_PREFIX: &str = "skill.builtin.";

/// Environment variable overriding the manifest directory.
pub const SKILLS_DIR_ENV: &str = "AXON_SKILLS_DIR";

const DEFAULT_SKILLS_DIR: &str = "resources/skills";

/// Builtin loader errors
#[derive(Debug, Error)]
pub enum BuiltinLoadError {
    /// Package id is not under the builtin prefix
    #[error("not a builtin package id: {0}")]
    NotBuiltin(String),

    /// No manifest file exists for the package id
    #[error("builtin manifest not found: {0}")]
    NotFound(PathBuf),

    /// Manifest file could not be read
    #[error("failed to read builtin manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Manifest file is not valid JSON for the schema
    #[error("failed to parse builtin manifest {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// Manifest parsed but failed validation
    #[error(transparent)]
    Invalid(#[from] ManifestError),
}

/// Loads and caches builtin skill manifests from disk.
pub struct BuiltinSkillLoader {
    dir: PathBuf,
    cache: RwLock<HashMap<String, SkillManifest>>,
}

impl BuiltinSkillLoader {
    /// Loader over an explicit directory.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Loader over `AXON_SKILLS_DIR`, defaulting to `resources/skills`.
    #[must_use]
    pub fn from_env() -> Self {
        let dir = std::env::var(SKILLS_DIR_ENV)
            .map_or_else(|_| PathBuf::from(DEFAULT_SKILLS_DIR), PathBuf::from);
        Self::new(dir)
    }

    /// Directory the loader reads from.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load a builtin manifest, consulting the cache first.
    pub async fn load(&self, package_id: &str) -> Result<SkillManifest, BuiltinLoadError> {
        if !package_id.starts_with(BUILTIN_PREFIX) {
            return Err(BuiltinLoadError::NotBuiltin(package_id.to_string()));
        }

        {
            let cache = self.cache.read().await;
            if let Some(manifest) = cache.get(package_id) {
                return Ok(manifest.clone());
            }
        }

        let path = self.dir.join(format!("{package_id}.json"));
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BuiltinLoadError::NotFound(path));
            }
            Err(e) => {
                return Err(BuiltinLoadError::Io { path, source: e });
            }
        };

        let manifest: SkillManifest =
            serde_json::from_str(&raw).map_err(|e| BuiltinLoadError::Parse {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        manifest.validate()?;

        let mut cache = self.cache.write().await;
        cache.insert(package_id.to_string(), manifest.clone());

        tracing::info!(package_id, path = %path.display(), "loaded builtin manifest");
        Ok(manifest)
    }

    /// Drop all cached manifests.
    pub async fn clear_cache(&self) {
        let mut cache = self.cache.write().await;
        cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_non_builtin_id_rejected() {
        let loader = BuiltinSkillLoader::new("resources/skills");
        let err = loader.load("skill.example.hello").await.unwrap_err();
        assert!(matches!(err, BuiltinLoadError::NotBuiltin(_)));
    }

    #[tokio::test]
    async fn test_missing_manifest_reported() {
        let loader = BuiltinSkillLoader::new(std::env::temp_dir().join("axon-no-such-dir"));
        let err = loader.load("skill.builtin.ghost").await.unwrap_err();
        assert!(matches!(err, BuiltinLoadError::NotFound(_)));
    }
}
