//! Interactive voice-chat driver.
//!
//! Loads the configuration and the three model wrappers, then loops:
//! pick an input (an audio file path, a prerecorded demo, or quit), run
//! the pipeline over each pending file, and write `answer_<n>.wav` per
//! successful turn. Per-turn problems are reported and the loop
//! continues; only startup failures are fatal.

use dialoguer::{Input, Select};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use voxtalk::VoxError;
use voxtalk::config::{DEFAULT_CONFIG_PATH, Settings};
use voxtalk::demo::{DEFAULT_DEMO_ROOT, Demo};
use voxtalk::llm::Engine;
use voxtalk::pipeline::ChatPipeline;
use voxtalk::stt::Asr;
use voxtalk::tts::Tts;

enum Selection {
    File,
    Demo,
    Quit,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Diagnostics go to stderr so piped stdout stays clean.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,hf_hub=warn,ort=warn")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("check") => check(&config_path(args.get(2))),
        Some("help" | "--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => run(&config_path(args.get(1))).await,
    }
}

fn config_path(arg: Option<&String>) -> PathBuf {
    arg.map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn print_usage() {
    println!("usage: voxtalk [config.yaml]");
    println!("       voxtalk check [config.yaml]   validate the config without loading models");
}

/// Validate the configuration and print what was parsed.
fn check(path: &Path) -> anyhow::Result<()> {
    let settings = Settings::load(path)?;
    println!("configuration OK: {}", path.display());
    println!("  speech-to-text: {}", settings.asr.model_id);
    println!(
        "  text-to-speech: {} + {} (voice: {})",
        settings.tts.model_id,
        settings.tts.vocoder,
        settings.tts.voice_path.display()
    );
    println!(
        "  language-model: {}/{} (device {}, temperature {}, max_new_tokens {})",
        settings.llm.model_dir.display(),
        settings.llm.resolve_gguf_file()?,
        settings.llm.device,
        settings.llm.temperature,
        settings.llm.max_new_tokens
    );
    Ok(())
}

async fn run(path: &Path) -> anyhow::Result<()> {
    println!("voxtalk v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load(path)?;

    let mut asr = Asr::new(&settings.asr);
    asr.ensure_loaded()?;
    let tts = Tts::load(&settings.tts)?;
    let engine = Engine::load(&settings.llm).await?;

    let mut pipeline = ChatPipeline::new(asr, engine, tts);
    let mut queue: VecDeque<PathBuf> = VecDeque::new();

    println!("\nTalking engine ready. Answers are written as answer_<n>.wav.\n");

    loop {
        if queue.is_empty() {
            match prompt_selection()? {
                Selection::Quit => break,
                Selection::File => {
                    let path: String = Input::new()
                        .with_prompt("Audio file path")
                        .interact_text()?;
                    queue.push_back(PathBuf::from(path.trim()));
                }
                Selection::Demo => {
                    let root = Path::new(DEFAULT_DEMO_ROOT);
                    if !root.exists() {
                        println!(
                            "Directory `{DEFAULT_DEMO_ROOT}` is not detected; create one or \
                             generate a demo with voxtalk-demo first."
                        );
                        continue;
                    }
                    let id: String = Input::new().with_prompt("Demo id").interact_text()?;
                    match Demo::load(root, id.trim()) {
                        Ok(demo) => queue.extend(demo.audio_paths()),
                        Err(e) => println!("{e}"),
                    }
                }
            }
            continue;
        }

        let Some(input) = queue.pop_front() else {
            continue;
        };
        match pipeline.process(&input).await {
            Ok(report) => println!("{} has been saved!", report.output.display()),
            Err(e @ VoxError::Path(_)) => println!("{e}"),
            Err(e) => println!("turn failed: {e}"),
        }
    }

    println!("Thank you for using voxtalk! See you!");
    Ok(())
}

fn prompt_selection() -> anyhow::Result<Selection> {
    let items = [
        "F: specify an audio file",
        "D: load a demo",
        "Q: quit",
    ];
    let choice = Select::new()
        .with_prompt("Select one way to chat")
        .items(&items)
        .default(0)
        .interact()?;

    Ok(match choice {
        0 => Selection::File,
        1 => Selection::Demo,
        _ => Selection::Quit,
    })
}
