//! Demo fixtures: loading prerecorded demos and generating new ones.
//!
//! A demo is a directory under the demo root holding a `config.yaml`
//! manifest (`name`, `query`, `audio`, two equal-length lists) and the
//! audio files the manifest names. [`Demo::load`] validates all of it;
//! [`DemoBuilder`] produces the tree.

use crate::audio;
use crate::error::{Result, VoxError};
use crate::pipeline::Synthesizer;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Manifest filename inside each demo directory.
const MANIFEST_NAME: &str = "config.yaml";

/// Default demo root, relative to the working directory.
pub const DEFAULT_DEMO_ROOT: &str = "demo";

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    name: String,
    query: Vec<String>,
    audio: Vec<String>,
}

/// A validated, loadable demo.
#[derive(Debug)]
pub struct Demo {
    /// Display name from the manifest.
    pub name: String,
    /// The textual queries, in playback order.
    pub queries: Vec<String>,
    /// Audio filenames, parallel to `queries`.
    pub audio: Vec<String>,
    dir: PathBuf,
}

impl Demo {
    /// Load and validate the demo `root/<id>`.
    ///
    /// Every referenced audio file is checked; the check forces all
    /// entries and reports every missing file at once.
    ///
    /// # Errors
    ///
    /// Returns [`VoxError::Demo`] if the directory layout, manifest, or
    /// referenced audio files are invalid.
    pub fn load(root: &Path, id: &str) -> Result<Self> {
        if !root.exists() {
            return Err(VoxError::Demo(format!(
                "demo root directory does not exist: {}",
                root.display()
            )));
        }
        let dir = root.join(id);
        if !dir.exists() {
            return Err(VoxError::Demo(format!(
                "demo `{id}` does not exist under {}",
                root.display()
            )));
        }
        let manifest_path = dir.join(MANIFEST_NAME);
        if !manifest_path.exists() {
            return Err(VoxError::Demo(format!(
                "no {MANIFEST_NAME} found in {}",
                dir.display()
            )));
        }

        let raw = std::fs::read_to_string(&manifest_path)?;
        let manifest: Manifest = serde_yaml::from_str(&raw).map_err(|e| {
            VoxError::Demo(format!("invalid manifest {}: {e}", manifest_path.display()))
        })?;

        if manifest.query.len() != manifest.audio.len() {
            return Err(VoxError::Demo(format!(
                "manifest lists {} queries but {} audio files",
                manifest.query.len(),
                manifest.audio.len()
            )));
        }

        let missing: Vec<&str> = manifest
            .audio
            .iter()
            .filter(|name| !dir.join(name.as_str()).exists())
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(VoxError::Demo(format!(
                "audio files listed in the manifest are missing: {}",
                missing.join(", ")
            )));
        }

        info!("demo `{}` is ready ({} queries)", manifest.name, manifest.query.len());

        Ok(Self {
            name: manifest.name,
            queries: manifest.query,
            audio: manifest.audio,
            dir,
        })
    }

    /// The audio files, joined against the demo directory, in order.
    pub fn audio_paths(&self) -> Vec<PathBuf> {
        self.audio.iter().map(|name| self.dir.join(name)).collect()
    }
}

/// Generates a demo directory: manifest plus one synthesized WAV per query.
#[derive(Debug)]
pub struct DemoBuilder {
    name: String,
    queries: Vec<String>,
    audio: Vec<String>,
    root: PathBuf,
}

impl DemoBuilder {
    /// Create a builder with audio names derived from the query order
    /// (`query_01.wav`, `query_02.wav`, ...).
    pub fn new(name: impl Into<String>, queries: Vec<String>) -> Self {
        let audio = (1..=queries.len())
            .map(|i| format!("query_{i:02}.wav"))
            .collect();
        Self {
            name: name.into(),
            queries,
            audio,
            root: PathBuf::from(DEFAULT_DEMO_ROOT),
        }
    }

    /// Build under `root` instead of the default demo root.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Use explicit audio filenames instead of the derived ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the name count does not match the query count.
    pub fn with_audio_names(mut self, names: Vec<String>) -> Result<Self> {
        if names.len() != self.queries.len() {
            return Err(VoxError::Demo(format!(
                "{} audio names provided for {} queries",
                names.len(),
                self.queries.len()
            )));
        }
        self.audio = names;
        Ok(self)
    }

    /// Write the demo tree, synthesizing one WAV per query.
    ///
    /// Directory creation is idempotent; existing audio files of the same
    /// name are overwritten. Returns the demo directory.
    ///
    /// # Errors
    ///
    /// Returns an error if synthesis or any write fails.
    pub async fn build(&self, synth: &mut dyn Synthesizer) -> Result<PathBuf> {
        let dir = self.root.join(&self.name);
        std::fs::create_dir_all(&dir)?;

        let manifest = Manifest {
            name: self.name.clone(),
            query: self.queries.clone(),
            audio: self.audio.clone(),
        };
        let yaml = serde_yaml::to_string(&manifest)
            .map_err(|e| VoxError::Demo(format!("cannot serialize manifest: {e}")))?;
        std::fs::write(dir.join(MANIFEST_NAME), yaml)?;

        for (query, audio_name) in self.queries.iter().zip(&self.audio) {
            let speech = synth.synthesize(query).await?;
            audio::write_wav_mono_16k(&dir.join(audio_name), &speech)?;
            info!("audio file {audio_name} is written");
        }

        Ok(dir)
    }
}
