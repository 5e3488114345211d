//! CLI tool for synthesizing a batch of text chunks to WAV files.
//!
//! Runs the same pipeline as the server, once, and writes one WAV per chunk.
//!
//! Usage:
//!     cargo run --bin batch_synth -- --model-dir path/to/model \
//!         --text "ॐ गं गणपतये नमः" --text "हैलो"

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use parler_batch_tts::engine::config::DEFAULT_MODEL_ID;
use parler_batch_tts::{BatchHandler, Device, EngineConfig, SynthesisRequest};

/// Synthesize a batch of text chunks into per-chunk WAV files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Text chunk to synthesize; repeat the flag for a batch
    #[arg(short, long, required = true)]
    text: Vec<String>,

    /// Voice profile key
    #[arg(short, long, default_value = "aryan_default")]
    voice: String,

    /// Model directory (or Hub repo ID with the hub feature)
    #[arg(short, long, default_value = DEFAULT_MODEL_ID)]
    model_dir: String,

    /// Output directory for generated WAV files
    #[arg(short, long, default_value = "out")]
    output_dir: String,

    /// Token budget multiplier per word
    #[arg(long, default_value_t = 70)]
    tokens_per_word: u32,

    /// Sampling temperature
    #[arg(long, default_value_t = 1.0)]
    temperature: f32,

    /// Disable sampling (greedy decoding)
    #[arg(long)]
    no_sample: bool,

    /// Device for inference (cpu, cuda)
    #[arg(long, default_value = "cpu")]
    device: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let device: Device = args.device.parse()?;

    let config = EngineConfig::new(args.model_dir, device);
    let mut handler = BatchHandler::new(config);

    let request = SynthesisRequest {
        text_chunks: args.text,
        voice: args.voice,
        tokens_per_word: args.tokens_per_word,
        do_sample: !args.no_sample,
        temperature: args.temperature,
        ..SynthesisRequest::default()
    };

    let batch = handler.synthesize(&request)?;

    let output_dir = Path::new(&args.output_dir);
    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    for (i, buffer) in batch.buffers.iter().enumerate() {
        let path = output_dir.join(format!("chunk_{i:03}.wav"));
        buffer.save(&path)?;
        tracing::info!(
            chunk = i,
            samples = buffer.len(),
            seconds = buffer.duration() as f64,
            "wrote {}",
            path.display()
        );
    }

    tracing::info!(
        count = batch.buffers.len(),
        sample_rate = batch.sample_rate,
        elapsed_s = batch.duration.as_secs_f64(),
        "done"
    );
    Ok(())
}
