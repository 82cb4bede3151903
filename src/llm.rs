//! Conversational language model inference.
//!
//! Wraps `mistralrs` GGUF inference behind a turn-based conversation
//! engine. The transcript is an append-only sequence of immutable turn
//! records; a reply appends a user turn plus an assistant placeholder,
//! streams the generation to completion, and either fills the placeholder
//! (by replacing the last record) or removes both candidate turns so a
//! failed generation leaves the transcript exactly as it was.

use crate::config::LlmConfig;
use crate::error::{Result, VoxError};
use crate::pipeline;
use async_trait::async_trait;
use mistralrs::{
    GgufModelBuilder, MemoryGpuConfig, Model, PagedAttentionMetaBuilder, RequestBuilder, Response,
    TextMessageRole, TextMessages,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Fixed system prompt rendered ahead of the conversation.
const SYSTEM_PROMPT: &str = "A chat between a curious user and an artificial intelligence \
     assistant. The assistant gives helpful, detailed, and polite answers to the user's \
     questions.";

/// Generation stops as soon as this appears in the accumulated output.
const STOP_STRING: &str = "</s>";

/// KV-cache sizing for paged attention on GPU devices.
const CONTEXT_SIZE_TOKENS: usize = 4096;

/// Maximum time to wait for the first token before giving up.
const FIRST_TOKEN_TIMEOUT: Duration = Duration::from_secs(120);

/// Speaker of one conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The human side of the conversation.
    User,
    /// The model side of the conversation.
    Assistant,
}

impl Role {
    /// Fixed role name as rendered into prompts and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    fn to_message_role(self) -> TextMessageRole {
        match self {
            Role::User => TextMessageRole::User,
            Role::Assistant => TextMessageRole::Assistant,
        }
    }
}

/// One immutable transcript record. The text is absent while the turn is
/// still a placeholder awaiting the assistant's reply.
#[derive(Debug, Clone)]
pub struct Turn {
    /// Who spoke.
    pub role: Role,
    /// What was said; `None` for a pending assistant placeholder.
    pub text: Option<String>,
}

/// Append-only conversation transcript.
///
/// Grows monotonically for the life of the engine; the only mutations are
/// appending a user/placeholder pair, replacing the placeholder with the
/// completed record, or removing the candidate pair after a failed
/// generation.
#[derive(Debug, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    /// All turns, in insertion order.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Append a user turn and an assistant placeholder.
    fn begin_exchange(&mut self, user_text: &str) {
        self.turns.push(Turn {
            role: Role::User,
            text: Some(user_text.to_owned()),
        });
        self.turns.push(Turn {
            role: Role::Assistant,
            text: None,
        });
    }

    /// Replace the trailing placeholder with the completed assistant turn.
    fn commit_reply(&mut self, text: &str) {
        debug_assert!(matches!(
            self.turns.last(),
            Some(Turn {
                role: Role::Assistant,
                text: None
            })
        ));
        if let Some(last) = self.turns.last_mut() {
            *last = Turn {
                role: Role::Assistant,
                text: Some(text.to_owned()),
            };
        }
    }

    /// Remove the candidate user/placeholder pair after a failed reply.
    fn abort_exchange(&mut self) {
        self.turns.truncate(self.turns.len().saturating_sub(2));
    }

    /// Completed turns only (the trailing placeholder renders as the
    /// generation prompt, not as a message).
    fn completed(&self) -> impl Iterator<Item = (&Role, &str)> {
        self.turns
            .iter()
            .filter_map(|turn| turn.text.as_deref().map(|text| (&turn.role, text)))
    }
}

/// Byte position at which the stop string begins, if present.
fn stop_position(text: &str, stop: &str) -> Option<usize> {
    if stop.is_empty() {
        return None;
    }
    text.find(stop)
}

/// Conversational engine over a local GGUF model.
pub struct Engine {
    model: Arc<Model>,
    transcript: Transcript,
    temperature: f64,
    max_new_tokens: usize,
}

impl Engine {
    /// Load the language model and fix the role template.
    ///
    /// Load options that the GGUF backend cannot honor are logged and
    /// ignored rather than failing; `device: cpu` disables paged
    /// attention, anything else enables it.
    ///
    /// # Errors
    ///
    /// Returns an error if the weights cannot be resolved or the model
    /// fails to build.
    pub async fn load(config: &LlmConfig) -> Result<Self> {
        let gguf_file = config.resolve_gguf_file()?;
        let model_dir = config.model_dir.display().to_string();
        info!("loading language model: {model_dir}/{gguf_file}");
        let start = Instant::now();

        if config.load_8bit {
            warn!("load_8bit requested, but GGUF weights are already quantized; ignoring");
        }
        if config.cpu_offloading {
            warn!("cpu_offloading is not supported by the GGUF backend; ignoring");
        }
        if config.num_gpus > 1 {
            warn!("num_gpus={} requested; only a single device is used", config.num_gpus);
        }
        if let Some(cap) = &config.max_gpu_memory {
            warn!("max_gpu_memory={cap} requested; GPU memory is sized by context instead");
        }

        let builder = GgufModelBuilder::new(&model_dir, vec![&gguf_file]).with_logging();

        let model = if config.device == "cpu" {
            builder
                .build()
                .await
                .map_err(|e| VoxError::Model(format!("model build failed: {e}")))?
        } else {
            builder
                .with_paged_attn(|| {
                    PagedAttentionMetaBuilder::default()
                        .with_gpu_memory(MemoryGpuConfig::ContextSize(CONTEXT_SIZE_TOKENS))
                        .build()
                })
                .map_err(|e| VoxError::Model(format!("paged attention config failed: {e}")))?
                .build()
                .await
                .map_err(|e| VoxError::Model(format!("model build failed: {e}")))?
        };

        info!("language model ready in {:.1}s", start.elapsed().as_secs_f64());

        Ok(Self {
            model: Arc::new(model),
            transcript: Transcript::default(),
            temperature: config.temperature,
            max_new_tokens: config.max_new_tokens,
        })
    }

    /// The conversation so far.
    pub fn transcript(&self) -> &[Turn] {
        self.transcript.turns()
    }

    /// Generate a reply to one user utterance.
    ///
    /// The user turn and an assistant placeholder are appended, the full
    /// conversation is rendered into the request, and the stream is
    /// collapsed into its final text (stopping early at the stop string).
    /// On success the placeholder is filled; on failure both candidate
    /// turns are removed.
    ///
    /// # Errors
    ///
    /// Returns [`VoxError::Generation`] if inference fails or the model
    /// produces no usable output. The transcript is unchanged in that
    /// case.
    pub async fn reply(&mut self, user_text: &str) -> Result<String> {
        self.transcript.begin_exchange(user_text);

        info!("generating reply to: {user_text}");
        let outcome = self.generate().await;

        match outcome {
            Ok(text) if !text.trim().is_empty() => {
                let text = text.trim().to_owned();
                self.transcript.commit_reply(&text);
                Ok(text)
            }
            Ok(_) => {
                self.transcript.abort_exchange();
                Err(VoxError::Generation("model produced no output".to_owned()))
            }
            Err(e) => {
                self.transcript.abort_exchange();
                Err(e)
            }
        }
    }

    /// Stream one bounded generation and collapse it to the final text.
    async fn generate(&self) -> Result<String> {
        let gen_start = Instant::now();

        let mut messages = TextMessages::new().add_message(TextMessageRole::System, SYSTEM_PROMPT);
        for (role, text) in self.transcript.completed() {
            messages = messages.add_message(role.to_message_role(), text);
        }

        let request = RequestBuilder::from(messages)
            .set_sampler_temperature(self.temperature)
            .set_sampler_max_len(self.max_new_tokens);

        let model = Arc::clone(&self.model);
        let mut stream = model
            .stream_chat_request(request)
            .await
            .map_err(|e| VoxError::Generation(format!("stream request failed: {e}")))?;

        let mut generated = String::new();
        let mut token_count: usize = 0;
        let mut first_token_received = false;

        loop {
            let response = if first_token_received {
                match stream.next().await {
                    Some(r) => r,
                    None => break,
                }
            } else {
                // Model warm-up can be slow on CPU, but not unbounded.
                match tokio::time::timeout(FIRST_TOKEN_TIMEOUT, stream.next()).await {
                    Ok(Some(r)) => r,
                    Ok(None) => break,
                    Err(_) => {
                        return Err(VoxError::Generation(
                            "first token timeout: model did not produce output in time"
                                .to_owned(),
                        ));
                    }
                }
            };

            match response {
                Response::Chunk(chunk) => {
                    if let Some(choice) = chunk.choices.first() {
                        let content = choice.delta.content.as_deref().unwrap_or_default();
                        if content.is_empty() {
                            continue;
                        }
                        first_token_received = true;
                        token_count += 1;
                        generated.push_str(content);
                        if let Some(pos) = stop_position(&generated, STOP_STRING) {
                            generated.truncate(pos);
                            break;
                        }
                    }
                }
                Response::Done(done) => {
                    if let Some(choice) = done.choices.first() {
                        let content = choice.message.content.as_deref().unwrap_or_default();
                        if !content.is_empty() {
                            generated.push_str(content);
                            if let Some(pos) = stop_position(&generated, STOP_STRING) {
                                generated.truncate(pos);
                            }
                        }
                    }
                    break;
                }
                Response::ModelError(msg, _) => {
                    return Err(VoxError::Generation(format!("model error: {msg}")));
                }
                Response::InternalError(e) => {
                    return Err(VoxError::Generation(format!("internal error: {e}")));
                }
                Response::ValidationError(e) => {
                    return Err(VoxError::Generation(format!("validation error: {e}")));
                }
                _ => {}
            }
        }

        info!(
            "generated {token_count} tokens in {:.1}s",
            gen_start.elapsed().as_secs_f64()
        );

        Ok(generated)
    }
}

#[async_trait]
impl pipeline::Responder for Engine {
    async fn reply(&mut self, user_text: &str) -> Result<String> {
        Engine::reply(self, user_text).await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn role_names_are_fixed() {
        assert_eq!(Role::User.as_str(), "user");
        assert_eq!(Role::Assistant.as_str(), "assistant");
    }

    #[test]
    fn begin_exchange_appends_user_and_placeholder() {
        let mut t = Transcript::default();
        t.begin_exchange("hello");

        assert_eq!(t.turns().len(), 2);
        assert_eq!(t.turns()[0].role, Role::User);
        assert_eq!(t.turns()[0].text.as_deref(), Some("hello"));
        assert_eq!(t.turns()[1].role, Role::Assistant);
        assert!(t.turns()[1].text.is_none());
    }

    #[test]
    fn commit_reply_fills_the_placeholder() {
        let mut t = Transcript::default();
        t.begin_exchange("hello");
        t.commit_reply("hi there");

        assert_eq!(t.turns().len(), 2);
        assert_eq!(t.turns()[1].text.as_deref(), Some("hi there"));
    }

    #[test]
    fn abort_exchange_restores_previous_state() {
        let mut t = Transcript::default();
        t.begin_exchange("first");
        t.commit_reply("reply one");
        t.begin_exchange("second");
        t.abort_exchange();

        assert_eq!(t.turns().len(), 2);
        assert_eq!(t.turns()[0].text.as_deref(), Some("first"));
        assert_eq!(t.turns()[1].text.as_deref(), Some("reply one"));
    }

    #[test]
    fn abort_on_empty_transcript_is_harmless() {
        let mut t = Transcript::default();
        t.abort_exchange();
        assert!(t.turns().is_empty());
    }

    #[test]
    fn completed_skips_the_placeholder() {
        let mut t = Transcript::default();
        t.begin_exchange("question");

        let rendered: Vec<_> = t.completed().collect();
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].1, "question");
    }

    #[test]
    fn stop_position_finds_the_stop_string() {
        assert_eq!(stop_position("an answer</s> trailing", "</s>"), Some(9));
        assert_eq!(stop_position("no stop here", "</s>"), None);
        assert_eq!(stop_position("text", ""), None);
    }

    #[test]
    fn stop_string_split_across_chunks_is_caught_on_accumulation() {
        // The stream appends deltas to one accumulated string, so a stop
        // string split across two chunks is found once both arrive.
        let mut acc = String::new();
        acc.push_str("final words</");
        assert_eq!(stop_position(&acc, "</s>"), None);
        acc.push_str("s> ignored tail");
        let pos = stop_position(&acc, "</s>").unwrap();
        acc.truncate(pos);
        assert_eq!(acc, "final words");
    }
}
