//! Error types for the voxtalk pipeline.

/// Top-level error type for the voice-chat system.
#[derive(Debug, thiserror::Error)]
pub enum VoxError {
    /// Configuration error (missing file, section, key, or referenced path).
    #[error("config error: {0}")]
    Config(String),

    /// Demo directory or manifest error.
    #[error("demo error: {0}")]
    Demo(String),

    /// User-supplied audio path error (missing file or wrong extension).
    #[error("path error: {0}")]
    Path(String),

    /// WAV decode/encode or resampling error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text transcription error.
    #[error("STT error: {0}")]
    Stt(String),

    /// Language model produced no usable output or failed mid-stream.
    #[error("generation error: {0}")]
    Generation(String),

    /// Text-to-speech synthesis error.
    #[error("TTS error: {0}")]
    Tts(String),

    /// Model download or loading error.
    #[error("model error: {0}")]
    Model(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, VoxError>;
