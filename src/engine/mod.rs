//! Synthesis engine adapter: session lifecycle and the combined batch call.
//!
//! The engine owns at most one [`EngineSession`], created lazily by
//! [`Engine::ensure_loaded`] and kept for the life of the process. All
//! requests funnel through [`Engine::generate`], which issues exactly one
//! combined forward pass per batch.

pub mod backend;
pub mod config;

use anyhow::{anyhow, Context, Result as AnyResult};
use ndarray::Array2;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::tokenizer::BatchTokenizer;
use backend::{BatchTokens, GenerationParams, OrtGenerator, SpeechGenerator};
use config::{Device, EngineConfig, ParsedModelConfig, Precision};

/// Minimum new tokens per generation on CUDA.
const MIN_NEW_TOKENS_CUDA: u32 = 20;

/// Minimum new tokens per generation on CPU.
const MIN_NEW_TOKENS_CPU: u32 = 30;

/// Short Devanagari probe pushed through both tokenizers during warmup.
const WARMUP_PROBE: &str = "हैलो";

/// Output of one combined generation call, demuxed downstream.
#[derive(Debug)]
pub struct GenerationResult {
    /// Combined waveform matrix `[batch, max_len]`, host owned.
    pub sequences: Array2<f32>,
    /// Valid sample count per batch item, input order.
    pub lengths: Vec<usize>,
    /// Wall clock spent inside the forward pass.
    pub duration: Duration,
    pub sample_rate: u32,
}

/// A loaded model: generator, tokenizers, and session metadata.
pub struct EngineSession {
    generator: Box<dyn SpeechGenerator>,
    text_tokenizer: BatchTokenizer,
    description_tokenizer: BatchTokenizer,
    sample_rate: u32,
    device: Device,
    precision: Precision,
    warmed: bool,
}

impl EngineSession {
    /// Assemble a session from already-built parts.
    ///
    /// Production goes through [`Engine::ensure_loaded`]; tests inject a
    /// scripted generator and mock tokenizers here.
    pub fn new(
        generator: Box<dyn SpeechGenerator>,
        text_tokenizer: BatchTokenizer,
        description_tokenizer: BatchTokenizer,
        sample_rate: u32,
        device: Device,
        precision: Precision,
    ) -> Self {
        Self {
            generator,
            text_tokenizer,
            description_tokenizer,
            sample_rate,
            device,
            precision,
            warmed: false,
        }
    }
}

/// Lazy, retry-on-failure holder of the process-wide [`EngineSession`].
pub struct Engine {
    config: EngineConfig,
    session: Option<EngineSession>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    /// Build an engine around an existing session, for tests.
    pub fn from_session(config: EngineConfig, session: EngineSession) -> Self {
        Self {
            config,
            session: Some(session),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_warmed(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.warmed)
    }

    /// Sample rate of the loaded model, if any.
    pub fn sample_rate(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.sample_rate)
    }

    /// Load the model session if it is not already loaded.
    ///
    /// The first call that reaches the engine decides the loaded model:
    /// `model_id` overrides the configured default, and later calls with a
    /// different ID are no-ops. On failure the session stays unset so the
    /// next call retries from scratch.
    pub fn ensure_loaded(&mut self, model_id: Option<&str>) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let model_id = model_id.unwrap_or(&self.config.model_id).to_string();
        let started = Instant::now();
        tracing::info!(model = %model_id, device = %self.config.device, "loading engine session");

        let session = self
            .build_session(&model_id)
            .map_err(|e| Error::EngineLoad(format!("{e:#}")))?;

        tracing::info!(
            model = %model_id,
            sample_rate = session.sample_rate,
            precision = %session.precision,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "engine session ready"
        );
        self.session = Some(session);
        Ok(())
    }

    fn build_session(&self, model_id: &str) -> AnyResult<EngineSession> {
        let model_dir = resolve_model_dir(model_id)?;
        let device = self.config.device;
        let precision = Precision::for_device(device);

        let config_path = model_dir.join("config.json");
        let sample_rate = if config_path.exists() {
            ParsedModelConfig::from_file(&config_path)?.sample_rate()
        } else {
            tracing::warn!(
                "no config.json in {}, assuming {} Hz",
                model_dir.display(),
                config::DEFAULT_SAMPLE_RATE
            );
            config::DEFAULT_SAMPLE_RATE
        };

        let text_tokenizer = BatchTokenizer::from_file(model_dir.join("tokenizer.json"))
            .context("text tokenizer")?;

        // Parler ships a separate description tokenizer; older exports reuse
        // the text one.
        let description_path = model_dir.join("description_tokenizer/tokenizer.json");
        let description_tokenizer = if description_path.exists() {
            BatchTokenizer::from_file(description_path).context("description tokenizer")?
        } else {
            BatchTokenizer::from_file(model_dir.join("tokenizer.json"))
                .context("description tokenizer (shared)")?
        };

        let onnx_path = find_onnx_model(&model_dir, precision)?;
        let generator = OrtGenerator::load(&onnx_path, device)?;

        Ok(EngineSession::new(
            Box::new(generator),
            text_tokenizer,
            description_tokenizer,
            sample_rate,
            device,
            precision,
        ))
    }

    /// Run the one-time warmup pass if it has not succeeded yet.
    ///
    /// Pushes the style description and a short Devanagari probe through
    /// both tokenizers. Failure is logged and swallowed; the warmed flag is
    /// set only on success so a later call retries.
    pub fn ensure_warmed(&mut self, style: &str) {
        let Some(session) = self.session.as_mut() else {
            tracing::warn!("warmup skipped: engine not loaded");
            return;
        };
        if session.warmed {
            return;
        }

        let outcome = session
            .description_tokenizer
            .encode(style)
            .and_then(|_| session.text_tokenizer.encode(WARMUP_PROBE));

        match outcome {
            Ok(_) => {
                tracing::info!("engine warmed");
                session.warmed = true;
            }
            Err(e) => {
                let err = Error::Warmup(format!("{e:#}"));
                tracing::warn!(error = %err, "warmup failed, will retry on next request");
            }
        }
    }

    /// Issue one combined generation call for the whole batch.
    ///
    /// Tokenizes the texts with left padding, repeats the style description
    /// across the batch, and hands both to the generator. All returned
    /// buffers are host owned.
    pub fn generate(
        &mut self,
        texts: &[String],
        style: &str,
        token_budget: u32,
        do_sample: bool,
        temperature: f32,
    ) -> Result<GenerationResult> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| Error::EngineLoad("engine session not loaded".into()))?;

        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let prompt = session
            .text_tokenizer
            .encode_batch_left_padded(&refs)
            .map_err(|e| Error::EngineGeneration(format!("{e:#}")))?;
        let description = session
            .description_tokenizer
            .encode_repeated(style, texts.len())
            .map_err(|e| Error::EngineGeneration(format!("{e:#}")))?;

        let min_new_tokens = match session.device {
            Device::Cuda => MIN_NEW_TOKENS_CUDA,
            Device::Cpu => MIN_NEW_TOKENS_CPU,
        };
        let params = GenerationParams {
            min_new_tokens,
            max_new_tokens: token_budget,
            do_sample,
            temperature,
        };
        tracing::debug!(
            batch = texts.len(),
            min_new_tokens,
            max_new_tokens = token_budget,
            do_sample,
            temperature,
            "running combined generation"
        );

        let batch = BatchTokens {
            description,
            prompt,
        };
        let started = Instant::now();
        let raw = session
            .generator
            .generate(&batch, &params)
            .map_err(|e| Error::EngineGeneration(format!("{e:#}")))?;
        let duration = started.elapsed();

        tracing::info!(
            batch = texts.len(),
            samples = raw.sequences.ncols(),
            elapsed_ms = duration.as_millis() as u64,
            "generation complete"
        );

        Ok(GenerationResult {
            sequences: raw.sequences,
            lengths: raw.lengths,
            duration,
            sample_rate: session.sample_rate,
        })
    }
}

/// Resolve a model ID to a local directory.
fn resolve_model_dir(model_id: &str) -> AnyResult<PathBuf> {
    let path = Path::new(model_id);
    if path.is_dir() {
        return Ok(path.to_path_buf());
    }

    #[cfg(feature = "hub")]
    {
        tracing::info!("'{}' is not a local directory, trying the Hub", model_id);
        return crate::hub::snapshot(model_id);
    }

    #[cfg(not(feature = "hub"))]
    anyhow::bail!(
        "model directory '{}' not found and hub support is disabled",
        model_id
    )
}

/// Pick the ONNX graph file for the requested precision.
///
/// Half precision prefers `model_fp16.onnx` but falls back to the full
/// precision export; as a last resort any `.onnx` file in the directory is
/// accepted.
fn find_onnx_model(model_dir: &Path, precision: Precision) -> AnyResult<PathBuf> {
    if precision == Precision::F16 {
        let fp16 = model_dir.join("model_fp16.onnx");
        if fp16.exists() {
            return Ok(fp16);
        }
        tracing::warn!("no model_fp16.onnx in {}, using f32 export", model_dir.display());
    }

    let full = model_dir.join("model.onnx");
    if full.exists() {
        return Ok(full);
    }

    for entry in std::fs::read_dir(model_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("onnx") {
            tracing::info!("using ONNX file: {}", path.display());
            return Ok(path);
        }
    }

    Err(anyhow!("no .onnx file found in {}", model_dir.display()))
}
