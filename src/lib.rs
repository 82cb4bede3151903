//! Voxtalk: a voice-chat pipeline over pretrained models.
//!
//! Each turn runs a strictly sequential cascade:
//! WAV file → ASR → LLM → TTS → WAV file
//!
//! # Architecture
//!
//! - **Audio I/O**: WAV decode/encode and resampling to 16 kHz (`hound`,
//!   `rubato`)
//! - **ASR**: transcription using NVIDIA Parakeet (`parakeet-rs`)
//! - **LLM**: conversational replies from GGUF models via `mistralrs`,
//!   over an append-only turn transcript
//! - **TTS**: two-stage ONNX synthesis (acoustic model + vocoder) with a
//!   fixed speaker x-vector (`ort`)
//! - **Demos**: prerecorded query fixtures, validated on load and
//!   generated by the `voxtalk-demo` binary
//!
//! Every inference call is delegated wholesale to the pretrained models;
//! the code here is the validating glue around them.

pub mod audio;
pub mod config;
pub mod demo;
pub mod error;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod stt;
pub mod tts;

pub use config::Settings;
pub use error::{Result, VoxError};
pub use pipeline::{ChatPipeline, Responder, Synthesizer, Transcriber};
