//! Generate a demo fixture: a manifest plus one synthesized WAV per query.
//!
//! Only the text-to-speech stack is loaded; the language model and ASR
//! are not touched.

use std::path::PathBuf;
use voxtalk::config::{DEFAULT_CONFIG_PATH, Settings};
use voxtalk::demo::{DEFAULT_DEMO_ROOT, DemoBuilder};
use voxtalk::tts::Tts;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,hf_hub=warn,ort=warn")),
        )
        .init();

    let mut config_path = PathBuf::from(DEFAULT_CONFIG_PATH);
    let mut root = PathBuf::from(DEFAULT_DEMO_ROOT);
    let mut positional: Vec<String> = Vec::new();

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                config_path = args
                    .next()
                    .map(PathBuf::from)
                    .ok_or_else(|| anyhow::anyhow!("--config requires a path"))?;
            }
            "--root" => {
                root = args
                    .next()
                    .map(PathBuf::from)
                    .ok_or_else(|| anyhow::anyhow!("--root requires a directory"))?;
            }
            "help" | "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            _ => positional.push(arg),
        }
    }

    if positional.len() < 2 {
        print_usage();
        anyhow::bail!("a demo name and at least one query are required");
    }
    let name = positional.remove(0);
    let queries = positional;

    let settings = Settings::load(&config_path)?;
    let mut tts = Tts::load(&settings.tts)?;

    let dir = DemoBuilder::new(name, queries)
        .with_root(root)
        .build(&mut tts)
        .await?;

    println!("demo written to {}", dir.display());
    Ok(())
}

fn print_usage() {
    println!("usage: voxtalk-demo [--config <config.yaml>] [--root <dir>] <name> <query> [<query>...]");
    println!();
    println!("Synthesizes each query into <root>/<name>/query_NN.wav and writes");
    println!("the demo manifest next to them.");
}
