//! Speech-to-text using NVIDIA Parakeet TDT.
//!
//! Wraps `parakeet-rs` batch transcription. Input must be mono 16 kHz
//! samples; callers resample first (see [`crate::audio`]).

use crate::audio::SAMPLE_RATE;
use crate::config::AsrConfig;
use crate::error::{Result, VoxError};
use crate::models::ModelManager;
use crate::pipeline;
use async_trait::async_trait;
use parakeet_rs::{ParakeetTDT, Transcriber as _};
use std::time::Instant;
use tracing::info;

/// Model files required by Parakeet TDT.
const ENCODER_ONNX: &str = "encoder-model.onnx";
const ENCODER_DATA: &str = "encoder-model.onnx.data";
const DECODER_ONNX: &str = "decoder_joint-model.onnx";
const VOCAB_TXT: &str = "vocab.txt";

/// Speech recognition engine.
///
/// The model load is a one-time blocking operation; a load failure is
/// fatal to the pipeline. Not re-entrant.
pub struct Asr {
    model: Option<ParakeetTDT>,
    model_id: String,
    model_manager: ModelManager,
}

impl Asr {
    /// Create a new recognition engine. The model is loaded lazily on
    /// first use, or eagerly via [`Self::ensure_loaded`].
    pub fn new(config: &AsrConfig) -> Self {
        Self {
            model: None,
            model_id: config.model_id.clone(),
            model_manager: ModelManager::new(),
        }
    }

    /// Eagerly load the model so the first turn has no hidden delay.
    ///
    /// # Errors
    ///
    /// Returns an error if model download or loading fails.
    pub fn ensure_loaded(&mut self) -> Result<()> {
        if self.model.is_none() {
            self.initialize()?;
        }
        Ok(())
    }

    /// Transcribe mono 16 kHz samples to text.
    ///
    /// # Errors
    ///
    /// Returns an error if model loading or transcription fails.
    pub fn transcribe(&mut self, samples: &[f32]) -> Result<String> {
        if self.model.is_none() {
            self.initialize()?;
        }

        let duration_s = samples.len() as f32 / SAMPLE_RATE as f32;
        info!("transcribing {duration_s:.1}s of audio");
        let start = Instant::now();

        let model = self
            .model
            .as_mut()
            .ok_or_else(|| VoxError::Stt("model not initialized".into()))?;

        let result = model
            .transcribe_samples(samples.to_vec(), SAMPLE_RATE, 1, None)
            .map_err(|e| VoxError::Stt(format!("transcription failed: {e}")))?;

        info!(
            "transcribed in {:.0}ms: \"{}\"",
            start.elapsed().as_millis(),
            result.text
        );

        Ok(result.text)
    }

    /// Download the model files and load Parakeet TDT.
    fn initialize(&mut self) -> Result<()> {
        info!("loading ASR model: {}", self.model_id);
        let start = Instant::now();

        for filename in [ENCODER_ONNX, ENCODER_DATA, DECODER_ONNX, VOCAB_TXT] {
            self.model_manager.get_model_path(&self.model_id, filename)?;
        }

        // ParakeetTDT::from_pretrained expects a directory with all files.
        let repo_dir = self.model_manager.get_repo_dir(&self.model_id)?;

        let model = ParakeetTDT::from_pretrained(&repo_dir, None)
            .map_err(|e| VoxError::Stt(format!("failed to load Parakeet TDT: {e}")))?;

        info!("ASR ready in {:.1}s", start.elapsed().as_secs_f64());
        self.model = Some(model);
        Ok(())
    }
}

#[async_trait]
impl pipeline::Transcriber for Asr {
    async fn transcribe(&mut self, samples: &[f32]) -> Result<String> {
        tokio::task::block_in_place(|| Asr::transcribe(self, samples))
    }
}
