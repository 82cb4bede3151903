//! Configuration loading and validation.
//!
//! The top-level `config.yaml` carries one section per subsystem
//! (`speech-to-text`, `text-to-speech`, `language-model`). Every required
//! key is checked against an explicit per-section schema before the
//! sections deserialize into typed structs, so a bad config fails before
//! any model is loaded and downstream code never re-checks key presence.

use crate::error::{Result, VoxError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Default configuration file path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

const ASR_SECTION: &str = "speech-to-text";
const TTS_SECTION: &str = "text-to-speech";
const LLM_SECTION: &str = "language-model";

const ASR_KEYS: &[&str] = &["model-id"];
const TTS_KEYS: &[&str] = &["model-id", "vocoder", "voice_path"];
const LLM_KEYS: &[&str] = &[
    "model-id",
    "device",
    "num_gpus",
    "max_gpu_memory",
    "load_8bit",
    "cpu_offloading",
    "temperature",
    "max_new_tokens",
];

/// Speech-to-text configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AsrConfig {
    /// HuggingFace model ID for the recognition model.
    #[serde(rename = "model-id")]
    pub model_id: String,
}

/// Text-to-speech configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TtsConfig {
    /// HuggingFace model ID for the acoustic model.
    #[serde(rename = "model-id")]
    pub model_id: String,
    /// HuggingFace model ID for the vocoder.
    pub vocoder: String,
    /// Path to the speaker embedding JSON file.
    pub voice_path: PathBuf,
}

/// Language model configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// Directory containing the model weights (GGUF).
    #[serde(rename = "model-id")]
    pub model_dir: PathBuf,
    /// Requested device: `cpu`, `cuda`, or `metal`.
    pub device: String,
    /// Requested GPU count.
    pub num_gpus: usize,
    /// Requested per-GPU memory cap (e.g. `"20GiB"`), or null.
    pub max_gpu_memory: Option<String>,
    /// Whether 8-bit loading was requested.
    pub load_8bit: bool,
    /// Whether CPU offloading was requested.
    pub cpu_offloading: bool,
    /// Sampling temperature.
    pub temperature: f64,
    /// Generation budget per reply, in tokens.
    pub max_new_tokens: usize,
    /// GGUF filename inside `model-id`. Defaults to the single `*.gguf`
    /// file found there.
    #[serde(rename = "gguf-file", default)]
    pub gguf_file: Option<String>,
}

impl LlmConfig {
    /// Resolve the GGUF weights filename inside the model directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured file is missing, or if no
    /// `gguf-file` is configured and the directory does not contain
    /// exactly one `*.gguf` file.
    pub fn resolve_gguf_file(&self) -> Result<String> {
        if let Some(name) = &self.gguf_file {
            if !self.model_dir.join(name).exists() {
                return Err(VoxError::Config(format!(
                    "gguf-file `{name}` not found in {}",
                    self.model_dir.display()
                )));
            }
            return Ok(name.clone());
        }

        let mut candidates: Vec<String> = std::fs::read_dir(&self.model_dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("gguf"))
            })
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        candidates.sort();

        match candidates.len() {
            0 => Err(VoxError::Config(format!(
                "no .gguf file found in {}",
                self.model_dir.display()
            ))),
            1 => Ok(candidates.remove(0)),
            n => Err(VoxError::Config(format!(
                "{n} .gguf files found in {}; set `gguf-file` to pick one",
                self.model_dir.display()
            ))),
        }
    }
}

/// Validated top-level configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Speech-to-text section.
    pub asr: AsrConfig,
    /// Text-to-speech section.
    pub tts: TtsConfig,
    /// Language model section.
    pub llm: LlmConfig,
}

impl Settings {
    /// Load and validate the configuration file.
    ///
    /// Validation is all-or-nothing: missing file, missing section,
    /// missing required key, or a dangling referenced path all fail here,
    /// before any model object is constructed.
    ///
    /// # Errors
    ///
    /// Returns [`VoxError::Config`] describing the first problem found.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(VoxError::Config(format!(
                "configuration file does not exist: {}",
                path.display()
            )));
        }

        let raw = std::fs::read_to_string(path)?;
        let root: serde_yaml::Value = serde_yaml::from_str(&raw)
            .map_err(|e| VoxError::Config(format!("cannot parse {}: {e}", path.display())))?;
        if !root.is_mapping() {
            return Err(VoxError::Config(format!(
                "{} is not a YAML mapping",
                path.display()
            )));
        }

        let asr: AsrConfig = section(&root, ASR_SECTION, ASR_KEYS)?;
        let tts: TtsConfig = section(&root, TTS_SECTION, TTS_KEYS)?;
        let llm: LlmConfig = section(&root, LLM_SECTION, LLM_KEYS)?;

        if !tts.voice_path.exists() {
            return Err(VoxError::Config(format!(
                "voice_path does not exist: {}",
                tts.voice_path.display()
            )));
        }
        if !llm.model_dir.exists() {
            return Err(VoxError::Config(format!(
                "language model directory does not exist: {}",
                llm.model_dir.display()
            )));
        }
        let gguf = llm.resolve_gguf_file()?;

        info!(
            "configuration loaded: asr={}, tts={}, llm={}/{gguf}",
            asr.model_id,
            tts.model_id,
            llm.model_dir.display()
        );

        Ok(Self { asr, tts, llm })
    }
}

/// Check one section's required key set, then deserialize it.
fn section<T: serde::de::DeserializeOwned>(
    root: &serde_yaml::Value,
    name: &str,
    required: &[&str],
) -> Result<T> {
    let value = root
        .get(name)
        .ok_or_else(|| VoxError::Config(format!("missing `{name}` section")))?;
    if !value.is_mapping() {
        return Err(VoxError::Config(format!(
            "`{name}` section is not a mapping"
        )));
    }

    let missing: Vec<&str> = required
        .iter()
        .filter(|key| value.get(**key).is_none())
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(VoxError::Config(format!(
            "`{name}` section is missing required keys: {}",
            missing.join(", ")
        )));
    }

    serde_yaml::from_value(value.clone())
        .map_err(|e| VoxError::Config(format!("invalid `{name}` section: {e}")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use tempfile::TempDir;

    /// Temp tree with a model directory (one GGUF inside) and a voice file,
    /// plus a line-oriented YAML renderer that can drop sections or keys.
    struct Fixture {
        dir: TempDir,
        voice: String,
        model_dir: String,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let model_dir = dir.path().join("vicuna-7b");
            std::fs::create_dir_all(&model_dir).unwrap();
            std::fs::write(model_dir.join("vicuna-7b.q4_k_m.gguf"), b"gguf").unwrap();
            let voice = dir.path().join("xvectors.json");
            std::fs::write(&voice, "[]").unwrap();

            Self {
                voice: voice.display().to_string(),
                model_dir: model_dir.display().to_string(),
                dir,
            }
        }

        fn sections(&self) -> Vec<(&'static str, Vec<(&'static str, String)>)> {
            vec![
                (
                    ASR_SECTION,
                    vec![("model-id", "istupakov/parakeet-tdt-0.6b-v3-onnx".into())],
                ),
                (
                    TTS_SECTION,
                    vec![
                        ("model-id", "onnx-community/speecht5_tts".into()),
                        ("vocoder", "onnx-community/speecht5_hifigan".into()),
                        ("voice_path", self.voice.clone()),
                    ],
                ),
                (
                    LLM_SECTION,
                    vec![
                        ("model-id", self.model_dir.clone()),
                        ("device", "cpu".into()),
                        ("num_gpus", "1".into()),
                        ("max_gpu_memory", "null".into()),
                        ("load_8bit", "false".into()),
                        ("cpu_offloading", "false".into()),
                        ("temperature", "0.7".into()),
                        ("max_new_tokens", "512".into()),
                    ],
                ),
            ]
        }

        fn yaml_without(&self, drop_section: Option<&str>, drop_key: Option<(&str, &str)>) -> String {
            let mut out = String::new();
            for (name, pairs) in self.sections() {
                if drop_section == Some(name) {
                    continue;
                }
                out.push_str(name);
                out.push_str(":\n");
                for (key, value) in pairs {
                    if drop_key == Some((name, key)) {
                        continue;
                    }
                    out.push_str(&format!("  {key}: {value}\n"));
                }
            }
            out
        }

        fn yaml(&self) -> String {
            self.yaml_without(None, None)
        }

        fn load(&self, yaml: &str) -> Result<Settings> {
            let path = self.dir.path().join("config.yaml");
            std::fs::write(&path, yaml).unwrap();
            Settings::load(&path)
        }
    }

    fn config_err(result: Result<Settings>) -> String {
        match result {
            Err(VoxError::Config(msg)) => msg,
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn valid_config_loads() {
        let fx = Fixture::new();
        let settings = fx.load(&fx.yaml()).unwrap();
        assert_eq!(settings.asr.model_id, "istupakov/parakeet-tdt-0.6b-v3-onnx");
        assert_eq!(settings.tts.vocoder, "onnx-community/speecht5_hifigan");
        assert_eq!(settings.llm.num_gpus, 1);
        assert_eq!(settings.llm.max_gpu_memory, None);
        assert_eq!(
            settings.llm.resolve_gguf_file().unwrap(),
            "vicuna-7b.q4_k_m.gguf"
        );
    }

    #[test]
    fn missing_file_fails() {
        let fx = Fixture::new();
        let msg = config_err(Settings::load(&fx.dir.path().join("nope.yaml")));
        assert!(msg.contains("does not exist"));
    }

    #[test]
    fn missing_sections_fail() {
        let fx = Fixture::new();
        for name in [ASR_SECTION, TTS_SECTION, LLM_SECTION] {
            let msg = config_err(fx.load(&fx.yaml_without(Some(name), None)));
            assert!(msg.contains(name), "error for `{name}`: {msg}");
        }
    }

    #[test]
    fn every_missing_required_key_fails() {
        let fx = Fixture::new();
        let sections: &[(&str, &[&str])] = &[
            (ASR_SECTION, ASR_KEYS),
            (TTS_SECTION, TTS_KEYS),
            (LLM_SECTION, LLM_KEYS),
        ];
        for (name, keys) in sections {
            for key in *keys {
                let msg = config_err(fx.load(&fx.yaml_without(None, Some((name, key)))));
                assert!(
                    msg.contains(name) && msg.contains(key),
                    "missing `{name}.{key}` should be reported, got: {msg}"
                );
            }
        }
    }

    #[test]
    fn null_max_gpu_memory_is_accepted() {
        let fx = Fixture::new();
        // The key must be present, but its value may be null.
        let settings = fx.load(&fx.yaml()).unwrap();
        assert!(settings.llm.max_gpu_memory.is_none());

        let yaml = fx.yaml().replace(
            "  max_gpu_memory: null\n",
            "  max_gpu_memory: 20GiB\n",
        );
        let settings = fx.load(&yaml).unwrap();
        assert_eq!(settings.llm.max_gpu_memory.as_deref(), Some("20GiB"));
    }

    #[test]
    fn dangling_voice_path_fails() {
        let fx = Fixture::new();
        let yaml = fx.yaml().replace(&fx.voice, "/no/such/xvectors.json");
        let msg = config_err(fx.load(&yaml));
        assert!(msg.contains("voice_path"));
    }

    #[test]
    fn dangling_model_dir_fails() {
        let fx = Fixture::new();
        let yaml = fx.yaml().replace(&fx.model_dir, "/no/such/model");
        let msg = config_err(fx.load(&yaml));
        assert!(msg.contains("language model directory"));
    }

    #[test]
    fn empty_model_dir_fails_gguf_resolution() {
        let fx = Fixture::new();
        let empty = fx.dir.path().join("empty-model");
        std::fs::create_dir_all(&empty).unwrap();
        let yaml = fx.yaml().replace(&fx.model_dir, &empty.display().to_string());
        let msg = config_err(fx.load(&yaml));
        assert!(msg.contains("no .gguf"));
    }

    #[test]
    fn ambiguous_gguf_requires_explicit_choice() {
        let fx = Fixture::new();
        std::fs::write(
            Path::new(&fx.model_dir).join("vicuna-7b.q8_0.gguf"),
            b"gguf",
        )
        .unwrap();

        let msg = config_err(fx.load(&fx.yaml()));
        assert!(msg.contains("gguf-file"));

        // The llm section is last, so appending the key lands inside it.
        let yaml = format!("{}  gguf-file: vicuna-7b.q8_0.gguf\n", fx.yaml());
        let settings = fx.load(&yaml).unwrap();
        assert_eq!(
            settings.llm.resolve_gguf_file().unwrap(),
            "vicuna-7b.q8_0.gguf"
        );
    }
}
