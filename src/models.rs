//! Model downloading and caching via hf-hub.

use crate::error::{AssistantError, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Manages downloading and caching of ML models.
pub struct ModelManager {
    cache_dir: PathBuf,
}

impl ModelManager {
    /// Create a new model manager.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be created.
    pub fn new(cache_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(cache_dir)?;
        info!("model cache directory: {}", cache_dir.display());

        Ok(Self {
            cache_dir: cache_dir.to_path_buf(),
        })
    }

    /// Directory the manager caches under.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Get the directory containing all cached files for a repository,
    /// downloading them if necessary.
    ///
    /// `hf-hub` stores files under a snapshot directory; models that load
    /// from a directory path (like Parakeet TDT) need that directory, so
    /// every file in the repo is fetched and the common parent returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the repo cannot be downloaded.
    pub fn get_repo_dir(&self, repo_id: &str) -> Result<PathBuf> {
        let api = hf_hub::api::sync::Api::new()
            .map_err(|e| AssistantError::Model(format!("failed to create HF API: {e}")))?;

        let repo = api.model(repo_id.to_owned());
        let repo_info = repo.info().map_err(|e| {
            AssistantError::Model(format!("failed to get repo info for {repo_id}: {e}"))
        })?;

        let mut snapshot_dir: Option<PathBuf> = None;
        for sibling in &repo_info.siblings {
            let file_path = repo.get(&sibling.rfilename).map_err(|e| {
                AssistantError::Model(format!(
                    "failed to download {} from {repo_id}: {e}",
                    sibling.rfilename
                ))
            })?;
            if snapshot_dir.is_none() {
                snapshot_dir = file_path.parent().map(Path::to_path_buf);
            }
        }

        snapshot_dir.ok_or_else(|| {
            AssistantError::Model(format!("could not determine repo directory for {repo_id}"))
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn new_creates_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("nested").join("models");
        let manager = ModelManager::new(&cache).unwrap();
        assert!(cache.is_dir());
        assert_eq!(manager.cache_dir(), cache);
    }
}
