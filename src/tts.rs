//! Text-to-speech: acoustic model + vocoder ONNX inference.
//!
//! Two-stage synthesis: tokenize → acoustic model (token ids + speaker
//! embedding → mel spectrogram) → vocoder (spectrogram → 16 kHz waveform).
//! The speaker voice is a single fixed x-vector read from a JSON file at
//! load time; there is no per-call voice selection.

use crate::config::TtsConfig;
use crate::error::{Result, VoxError};
use crate::models::ModelManager;
use crate::pipeline;
use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// ONNX graph filename, shared by the acoustic and vocoder repos.
const MODEL_ONNX: &str = "model.onnx";
const TOKENIZER_JSON: &str = "tokenizer.json";

/// Mel bins per spectrogram frame emitted by the acoustic model.
const MEL_BINS: usize = 80;
/// Dimensionality of a speaker x-vector.
const XVECTOR_DIM: usize = 512;
/// Hard cap on input tokens per synthesis call.
const MAX_CONTEXT: usize = 600;

/// One entry of the voice embedding file: a JSON array of these, of which
/// only index 0 is used.
#[derive(Deserialize)]
struct VoiceEntry {
    xvector: Vec<f32>,
}

/// Speech synthesis engine.
///
/// Owns both ONNX sessions, the tokenizer, and the speaker embedding.
/// Not re-entrant.
pub struct Tts {
    acoustic: Session,
    vocoder: Session,
    tokenizer: tokenizers::Tokenizer,
    voice: Vec<f32>,
}

impl Tts {
    /// Download (if needed) and load the acoustic model, the vocoder, the
    /// tokenizer, and the speaker embedding.
    ///
    /// # Errors
    ///
    /// Returns an error if any model file cannot be fetched or loaded, or
    /// if the voice file is malformed.
    pub fn load(config: &TtsConfig) -> Result<Self> {
        let start = Instant::now();
        let manager = ModelManager::new();

        let acoustic_path = manager.get_model_path(&config.model_id, MODEL_ONNX)?;
        let tokenizer_path = manager.get_model_path(&config.model_id, TOKENIZER_JSON)?;
        let vocoder_path = manager.get_model_path(&config.vocoder, MODEL_ONNX)?;

        info!("loading acoustic model: {}", config.model_id);
        let acoustic = Session::builder()
            .and_then(|b| Ok(b.with_intra_threads(4)?))
            .and_then(|mut b| b.commit_from_file(&acoustic_path))
            .map_err(|e| VoxError::Tts(format!("failed to load acoustic model: {e}")))?;

        info!("loading vocoder: {}", config.vocoder);
        let vocoder = Session::builder()
            .and_then(|b| Ok(b.with_intra_threads(4)?))
            .and_then(|mut b| b.commit_from_file(&vocoder_path))
            .map_err(|e| VoxError::Tts(format!("failed to load vocoder: {e}")))?;

        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| VoxError::Tts(format!("failed to load tokenizer: {e}")))?;

        let voice = load_voice(&config.voice_path)?;

        info!("TTS ready in {:.1}s", start.elapsed().as_secs_f64());

        Ok(Self {
            acoustic,
            vocoder,
            tokenizer,
            voice,
        })
    }

    /// Synthesize text to mono f32 samples at 16 kHz.
    ///
    /// Empty input synthesizes to an empty buffer. Uses `block_in_place`
    /// since ONNX inference is synchronous.
    ///
    /// # Errors
    ///
    /// Returns an error if tokenization or inference fails.
    pub async fn synthesize(&mut self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }

        info!("synthesizing: \"{text}\"");
        let start = Instant::now();

        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| VoxError::Tts(format!("tokenization failed: {e}")))?;
        let token_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| i64::from(id)).collect();

        if token_ids.is_empty() {
            return Ok(Vec::new());
        }
        if token_ids.len() > MAX_CONTEXT {
            return Err(VoxError::Tts(format!(
                "input too long: {} tokens (max {MAX_CONTEXT})",
                token_ids.len()
            )));
        }

        let samples = tokio::task::block_in_place(|| self.run_inference(&token_ids))?;

        info!(
            "synthesized {} samples ({:.1}s audio) in {:.0}ms",
            samples.len(),
            samples.len() as f32 / crate::audio::SAMPLE_RATE as f32,
            start.elapsed().as_millis(),
        );

        Ok(samples)
    }

    /// Output sample rate (always 16 kHz).
    pub fn sample_rate(&self) -> u32 {
        crate::audio::SAMPLE_RATE
    }

    /// Run both ONNX stages for one input.
    fn run_inference(&mut self, token_ids: &[i64]) -> Result<Vec<f32>> {
        use ort::session::{SessionInputValue, SessionInputs};

        let seq_len = token_ids.len();

        let mel: Vec<f32> = {
            let input_ids = Tensor::from_array(([1_usize, seq_len], token_ids.to_vec()))
                .map_err(|e| VoxError::Tts(format!("failed to create input_ids tensor: {e}")))?;
            let speaker = Tensor::from_array(([1_usize, XVECTOR_DIM], self.voice.clone()))
                .map_err(|e| VoxError::Tts(format!("failed to create speaker tensor: {e}")))?;

            let mut feed: HashMap<String, SessionInputValue> = HashMap::new();
            feed.insert("input_ids".to_string(), input_ids.into());
            feed.insert("speaker_embeddings".to_string(), speaker.into());

            let outputs = self
                .acoustic
                .run(SessionInputs::from(feed))
                .map_err(|e| VoxError::Tts(format!("acoustic inference failed: {e}")))?;

            let (_shape, data) = outputs[0_usize]
                .try_extract_tensor::<f32>()
                .map_err(|e| VoxError::Tts(format!("failed to extract spectrogram: {e}")))?;
            data.to_vec()
        };

        if mel.is_empty() || mel.len() % MEL_BINS != 0 {
            return Err(VoxError::Tts(format!(
                "acoustic model returned a malformed spectrogram ({} values)",
                mel.len()
            )));
        }
        let frames = mel.len() / MEL_BINS;

        let spectrogram = Tensor::from_array(([frames, MEL_BINS], mel))
            .map_err(|e| VoxError::Tts(format!("failed to create spectrogram tensor: {e}")))?;

        let mut feed: HashMap<String, SessionInputValue> = HashMap::new();
        feed.insert("spectrogram".to_string(), spectrogram.into());

        let outputs = self
            .vocoder
            .run(SessionInputs::from(feed))
            .map_err(|e| VoxError::Tts(format!("vocoder inference failed: {e}")))?;

        let (_shape, waveform) = outputs[0_usize]
            .try_extract_tensor::<f32>()
            .map_err(|e| VoxError::Tts(format!("failed to extract waveform: {e}")))?;

        Ok(waveform.to_vec())
    }
}

/// Load the fixed speaker x-vector: index 0 of a JSON array of entries,
/// each carrying an `xvector` float array.
fn load_voice(path: &Path) -> Result<Vec<f32>> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        VoxError::Tts(format!("failed to read voice file {}: {e}", path.display()))
    })?;

    let entries: Vec<VoiceEntry> = serde_json::from_str(&raw)
        .map_err(|e| VoxError::Tts(format!("failed to parse voice file: {e}")))?;

    let first = entries
        .into_iter()
        .next()
        .ok_or_else(|| VoxError::Tts(format!("voice file {} is empty", path.display())))?;

    if first.xvector.len() != XVECTOR_DIM {
        return Err(VoxError::Tts(format!(
            "speaker x-vector has {} dims, expected {XVECTOR_DIM}",
            first.xvector.len()
        )));
    }

    info!("loaded speaker embedding from {}", path.display());
    Ok(first.xvector)
}

#[async_trait]
impl pipeline::Synthesizer for Tts {
    async fn synthesize(&mut self, text: &str) -> Result<Vec<f32>> {
        Tts::synthesize(self, text).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use tempfile::TempDir;

    fn write_voice(dir: &TempDir, json: &str) -> std::path::PathBuf {
        let path = dir.path().join("xvectors.json");
        std::fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn voice_file_uses_first_entry() {
        let dir = TempDir::new().unwrap();
        let first: Vec<String> = (0..XVECTOR_DIM).map(|i| format!("{}.0", i % 7)).collect();
        let second: Vec<String> = (0..XVECTOR_DIM).map(|_| "9.0".to_string()).collect();
        let json = format!(
            r#"[{{"xvector": [{}]}}, {{"xvector": [{}]}}]"#,
            first.join(","),
            second.join(",")
        );
        let voice = load_voice(&write_voice(&dir, &json)).unwrap();
        assert_eq!(voice.len(), XVECTOR_DIM);
        assert!((voice[1] - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn empty_voice_file_fails() {
        let dir = TempDir::new().unwrap();
        let err = load_voice(&write_voice(&dir, "[]")).unwrap_err();
        assert!(matches!(err, VoxError::Tts(_)));
    }

    #[test]
    fn wrong_xvector_dims_fail() {
        let dir = TempDir::new().unwrap();
        let err = load_voice(&write_voice(&dir, r#"[{"xvector": [1.0, 2.0]}]"#)).unwrap_err();
        match err {
            VoxError::Tts(msg) => assert!(msg.contains("2 dims")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
