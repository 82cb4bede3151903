//! Per-turn pipeline orchestration.
//!
//! The driver talks to the three model wrappers through the trait seams
//! here, so the loop can be exercised with fixed stand-ins in tests. One
//! turn is strictly sequential: decode → transcribe → reply → synthesize
//! → write. There is no overlap between stages and no concurrent turns.

use crate::audio;
use crate::error::{Result, VoxError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

/// Speech-to-text seam.
#[async_trait]
pub trait Transcriber {
    /// Transcribe mono 16 kHz samples to text.
    async fn transcribe(&mut self, samples: &[f32]) -> Result<String>;
}

/// Conversation seam.
#[async_trait]
pub trait Responder {
    /// Produce the assistant's reply to one user utterance.
    async fn reply(&mut self, user_text: &str) -> Result<String>;
}

/// Text-to-speech seam.
#[async_trait]
pub trait Synthesizer {
    /// Synthesize text to mono 16 kHz samples.
    async fn synthesize(&mut self, text: &str) -> Result<Vec<f32>>;
}

/// What one successful turn produced.
#[derive(Debug)]
pub struct TurnReport {
    /// What the user was heard to say.
    pub transcription: String,
    /// The assistant's textual reply.
    pub reply: String,
    /// The WAV file the spoken reply was written to.
    pub output: PathBuf,
}

/// Sequential audio-in → audio-out conversation pipeline.
pub struct ChatPipeline<A, E, S> {
    asr: A,
    engine: E,
    tts: S,
    output_dir: PathBuf,
    completed: usize,
}

impl<A, E, S> ChatPipeline<A, E, S>
where
    A: Transcriber,
    E: Responder,
    S: Synthesizer,
{
    /// Build a pipeline writing `answer_<n>.wav` files to the working
    /// directory.
    pub fn new(asr: A, engine: E, tts: S) -> Self {
        Self {
            asr,
            engine,
            tts,
            output_dir: PathBuf::from("."),
            completed: 0,
        }
    }

    /// Write output files under `dir` instead of the working directory.
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Number of turns that produced an output file.
    pub fn completed_turns(&self) -> usize {
        self.completed
    }

    /// Run one turn over the given audio file.
    ///
    /// The path is validated before any model is invoked: a missing file
    /// or a non-`.wav` extension is a [`VoxError::Path`] and does not
    /// consume an output number. The counter advances only after the
    /// answer file is written.
    ///
    /// # Errors
    ///
    /// Returns an error if validation, decoding, or any stage fails; the
    /// output counter is untouched in every error case.
    pub async fn process(&mut self, path: &Path) -> Result<TurnReport> {
        if !path.exists() {
            return Err(VoxError::Path(format!(
                "the path specified does not exist: {}",
                path.display()
            )));
        }
        if !path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
        {
            return Err(VoxError::Path(format!(
                "the file specified is not a .wav audio file: {}",
                path.display()
            )));
        }

        let samples = audio::load_wav_mono_16k(path)?;
        let transcription = self.asr.transcribe(&samples).await?;
        let reply = self.engine.reply(&transcription).await?;
        let speech = self.tts.synthesize(&reply).await?;

        let n = self.completed + 1;
        let output = self.output_dir.join(format!("answer_{n}.wav"));
        audio::write_wav_mono_16k(&output, &speech)?;
        self.completed = n;

        info!("{} has been saved", output.display());

        Ok(TurnReport {
            transcription,
            reply,
            output,
        })
    }
}
