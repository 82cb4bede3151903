//! Model downloading and caching via hf-hub.

use crate::error::{Result, VoxError};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::info;

/// Fetches and caches pretrained model files.
pub struct ModelManager;

impl ModelManager {
    /// Create a new model manager backed by the default hf-hub cache.
    pub fn new() -> Self {
        Self
    }

    /// Get the path to a cached model file, downloading it with a visible
    /// progress bar if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be downloaded.
    pub fn get_model_path(&self, repo_id: &str, filename: &str) -> Result<PathBuf> {
        // Already-cached files skip the progress bar entirely.
        let cache = hf_hub::Cache::default();
        if let Some(path) = cache.model(repo_id.to_owned()).get(filename) {
            info!("{repo_id}/{filename} [cached]");
            return Ok(path);
        }

        let api = hf_hub::api::sync::Api::new()
            .map_err(|e| VoxError::Model(format!("failed to create HF API: {e}")))?;

        let pb = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::with_template(
            "  {msg} [{bar:30}] {bytes}/{total_bytes} {bytes_per_sec} ETA {eta}",
        ) {
            pb.set_style(style);
        }
        pb.set_message(format!("{repo_id}/{filename}"));

        let repo = api.model(repo_id.to_owned());
        let path = repo.download_with_progress(filename, pb).map_err(|e| {
            VoxError::Model(format!("failed to download {filename} from {repo_id}: {e}"))
        })?;

        Ok(path)
    }

    /// Get the snapshot directory containing all cached files of a repo.
    ///
    /// Some engines expect a directory path rather than individual files.
    /// hf-hub stores files under a snapshot directory; resolving any file
    /// and taking its parent finds it.
    ///
    /// # Errors
    ///
    /// Returns an error if the repo directory cannot be determined.
    pub fn get_repo_dir(&self, repo_id: &str) -> Result<PathBuf> {
        let api = hf_hub::api::sync::Api::new()
            .map_err(|e| VoxError::Model(format!("failed to create HF API: {e}")))?;

        let repo = api.model(repo_id.to_owned());
        let repo_info = repo.info().map_err(|e| {
            VoxError::Model(format!("failed to get repo info for {repo_id}: {e}"))
        })?;

        if let Some(sibling) = repo_info.siblings.first() {
            let file_path = repo.get(&sibling.rfilename).map_err(|e| {
                VoxError::Model(format!(
                    "failed to download {} from {repo_id}: {e}",
                    sibling.rfilename
                ))
            })?;
            if let Some(parent) = file_path.parent() {
                return Ok(parent.to_path_buf());
            }
        }

        Err(VoxError::Model(format!(
            "could not determine repo directory for {repo_id}"
        )))
    }
}

impl Default for ModelManager {
    fn default() -> Self {
        Self::new()
    }
}
