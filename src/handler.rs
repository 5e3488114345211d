//! Batch synthesis handler: the wire-facing records and the pipeline that
//! turns one request into one response.
//!
//! The pipeline is validate, resolve voice, budget, load and warm, one
//! combined generation call, demux, assemble. Any failure maps into the
//! typed taxonomy; the response postcondition is checked, not assumed.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::admission::{enforce_batch_limits, shared_token_budget};
use crate::audio::AudioBuffer;
use crate::demux::demux;
use crate::engine::config::EngineConfig;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::voice::{is_known_voice, resolve_style, DEFAULT_VOICE};
use crate::HANDLER_VERSION;

/// One synthesis request as it arrives on the wire.
///
/// Every field except `text_chunks` has a serde default, so a minimal
/// request is just the chunk list. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct SynthesisRequest {
    /// Text segments to synthesize, one buffer out per entry.
    #[serde(default)]
    pub text_chunks: Vec<String>,
    /// Voice profile key; unknown keys fall back to the default profile.
    #[serde(default = "default_voice")]
    pub voice: String,
    /// Model to load. Only honored by the first request to touch the engine.
    #[serde(default)]
    pub model_name: Option<String>,
    /// Token budget multiplier per whitespace word.
    #[serde(default = "default_tokens_per_word")]
    pub tokens_per_word: u32,
    #[serde(default = "default_do_sample")]
    pub do_sample: bool,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Requested batch ceiling, capped by the hard limit.
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
}

fn default_voice() -> String {
    DEFAULT_VOICE.to_string()
}

fn default_tokens_per_word() -> u32 {
    70
}

fn default_do_sample() -> bool {
    true
}

fn default_temperature() -> f32 {
    1.0
}

fn default_max_chunks() -> usize {
    20
}

impl Default for SynthesisRequest {
    fn default() -> Self {
        Self {
            text_chunks: Vec::new(),
            voice: default_voice(),
            model_name: None,
            tokens_per_word: default_tokens_per_word(),
            do_sample: default_do_sample(),
            temperature: default_temperature(),
            max_chunks: default_max_chunks(),
        }
    }
}

/// One successful synthesis response.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisResponse {
    /// Base64 over little-endian f32 samples, one entry per input chunk,
    /// input order.
    pub audio_buffers: Vec<String>,
    pub sampling_rate: u32,
    pub buffer_count: usize,
    pub processing_time_seconds: f64,
    pub chunks_processed: usize,
    pub handler_version: String,
}

/// Error payload; every failure the caller sees carries the version tag.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub handler_version: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            handler_version: HANDLER_VERSION.to_string(),
        }
    }
}

/// Demuxed result of one admitted batch, before wire encoding.
#[derive(Debug)]
pub struct SynthesizedBatch {
    /// One buffer per input chunk, input order.
    pub buffers: Vec<AudioBuffer>,
    pub sample_rate: u32,
    /// Wall clock spent inside the forward pass.
    pub duration: Duration,
}

/// Owns the engine and runs the batch pipeline.
pub struct BatchHandler {
    engine: Engine,
}

impl BatchHandler {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            engine: Engine::new(config),
        }
    }

    /// Wrap an already-built engine, for tests and tools that inject
    /// sessions.
    pub fn from_engine(engine: Engine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Run one request through the pipeline, stopping at raw buffers.
    ///
    /// The server encodes these for the wire; the CLI writes them to WAV
    /// directly.
    pub fn synthesize(&mut self, request: &SynthesisRequest) -> Result<SynthesizedBatch> {
        enforce_batch_limits(&request.text_chunks, request.max_chunks)?;
        let batch_size = request.text_chunks.len();

        if !is_known_voice(&request.voice) {
            tracing::warn!(
                voice = %request.voice,
                "unknown voice, falling back to {}",
                DEFAULT_VOICE
            );
        }
        let style = resolve_style(&request.voice);

        let budget = shared_token_budget(&request.text_chunks, request.tokens_per_word);
        tracing::debug!(batch = batch_size, budget, "admitted batch");

        self.engine.ensure_loaded(request.model_name.as_deref())?;
        self.engine.ensure_warmed(style);

        let result = self.engine.generate(
            &request.text_chunks,
            style,
            budget,
            request.do_sample,
            request.temperature,
        )?;
        let buffers = demux(&result, batch_size)?;

        if buffers.len() != batch_size {
            return Err(Error::EngineGeneration(format!(
                "assembled {} buffers for {} chunks",
                buffers.len(),
                batch_size
            )));
        }

        Ok(SynthesizedBatch {
            buffers,
            sample_rate: result.sample_rate,
            duration: result.duration,
        })
    }

    /// Run one request through the full pipeline and assemble the response.
    pub fn handle(&mut self, request: &SynthesisRequest) -> Result<SynthesisResponse> {
        let batch = self.synthesize(request)?;

        Ok(SynthesisResponse {
            audio_buffers: batch.buffers.iter().map(|b| b.to_base64()).collect(),
            sampling_rate: batch.sample_rate,
            buffer_count: batch.buffers.len(),
            processing_time_seconds: batch.duration.as_secs_f64(),
            chunks_processed: request.text_chunks.len(),
            handler_version: HANDLER_VERSION.to_string(),
        })
    }

    /// One-shot smoke test: a small Sanskrit batch through the full
    /// pipeline.
    pub fn self_test(&mut self) -> Result<SynthesisResponse> {
        let request = SynthesisRequest {
            text_chunks: vec![
                "ॐ गं गणपतये नमः".to_string(),
                "आपूर्यमाणमचलप्रतिष्ठं समुद्रम्".to_string(),
                "या निशा सर्वभूतानां तस्यां जागर्ति संयमी".to_string(),
            ],
            ..SynthesisRequest::default()
        };

        tracing::info!(chunks = request.text_chunks.len(), "running self test");
        let response = self.handle(&request)?;
        tracing::info!(
            buffers = response.buffer_count,
            sample_rate = response.sampling_rate,
            elapsed_s = response.processing_time_seconds,
            "self test passed"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backend::{BatchTokens, GenerationParams, RawGeneration, SpeechGenerator};
    use crate::engine::config::{Device, Precision};
    use crate::engine::EngineSession;
    use crate::tokenizer::{create_mock_tokenizer, BatchTokenizer};
    use ndarray::Array2;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct ScriptedGenerator {
        calls: Arc<AtomicUsize>,
        samples_per_item: usize,
        fail: bool,
    }

    impl SpeechGenerator for ScriptedGenerator {
        fn generate(
            &mut self,
            batch: &BatchTokens,
            _params: &GenerationParams,
        ) -> anyhow::Result<RawGeneration> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("scripted failure");
            }
            let b = batch.batch_size();
            let sequences = Array2::from_elem((b, self.samples_per_item), 0.25f32);
            Ok(RawGeneration {
                sequences,
                lengths: (0..b).map(|i| self.samples_per_item - i).collect(),
            })
        }
    }

    fn scripted_handler(calls: Arc<AtomicUsize>, fail: bool) -> BatchHandler {
        let session = EngineSession::new(
            Box::new(ScriptedGenerator {
                calls,
                samples_per_item: 8,
                fail,
            }),
            BatchTokenizer::from_tokenizer(create_mock_tokenizer()).unwrap(),
            BatchTokenizer::from_tokenizer(create_mock_tokenizer()).unwrap(),
            44100,
            Device::Cpu,
            Precision::F32,
        );
        BatchHandler::from_engine(Engine::from_session(EngineConfig::default(), session))
    }

    fn request(chunks: &[&str]) -> SynthesisRequest {
        SynthesisRequest {
            text_chunks: chunks.iter().map(|s| s.to_string()).collect(),
            ..SynthesisRequest::default()
        }
    }

    #[test]
    fn test_minimal_request_deserializes_with_defaults() {
        let req: SynthesisRequest =
            serde_json::from_str(r#"{"text_chunks": ["ॐ"]}"#).unwrap();
        assert_eq!(req.voice, "aryan_default");
        assert_eq!(req.tokens_per_word, 70);
        assert!(req.do_sample);
        assert_eq!(req.temperature, 1.0);
        assert_eq!(req.max_chunks, 20);
        assert!(req.model_name.is_none());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let req: SynthesisRequest =
            serde_json::from_str(r#"{"text_chunks": ["ॐ"], "future_flag": 7}"#).unwrap();
        assert_eq!(req.text_chunks.len(), 1);
    }

    #[test]
    fn test_handle_response_counts_and_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut handler = scripted_handler(calls.clone(), false);

        let response = handler.handle(&request(&["hello", "world", "hello world"])).unwrap();

        assert_eq!(response.buffer_count, 3);
        assert_eq!(response.chunks_processed, 3);
        assert_eq!(response.audio_buffers.len(), 3);
        assert_eq!(response.sampling_rate, 44100);
        assert_eq!(response.handler_version, HANDLER_VERSION);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Scripted lengths differ per row, so the buffers must too.
        let first = crate::audio::AudioBuffer::from_base64(&response.audio_buffers[0], 44100)
            .unwrap();
        let last = crate::audio::AudioBuffer::from_base64(&response.audio_buffers[2], 44100)
            .unwrap();
        assert_eq!(first.len(), 8);
        assert_eq!(last.len(), 6);
    }

    #[test]
    fn test_empty_batch_rejected_before_engine() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut handler = scripted_handler(calls.clone(), false);

        let err = handler.handle(&request(&[])).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_oversized_batch_rejected_before_engine() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut handler = scripted_handler(calls.clone(), false);

        let chunks: Vec<&str> = vec!["hello"; 21];
        let err = handler.handle(&request(&chunks)).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unknown_voice_falls_back_and_succeeds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut handler = scripted_handler(calls, false);

        let mut req = request(&["hello"]);
        req.voice = "robot_9000".to_string();
        let response = handler.handle(&req).unwrap();
        assert_eq!(response.buffer_count, 1);
    }

    #[test]
    fn test_generator_failure_maps_to_generation_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut handler = scripted_handler(calls, true);

        let err = handler.handle(&request(&["hello"])).unwrap_err();
        assert!(matches!(err, Error::EngineGeneration(_)));
    }

    #[test]
    fn test_synthesize_returns_raw_buffers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut handler = scripted_handler(calls, false);

        let batch = handler.synthesize(&request(&["hello", "world"])).unwrap();
        assert_eq!(batch.buffers.len(), 2);
        assert_eq!(batch.sample_rate, 44100);
        assert_eq!(batch.buffers[0].len(), 8);
        assert_eq!(batch.buffers[1].len(), 7);
    }

    #[test]
    fn test_self_test_runs_three_chunks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut handler = scripted_handler(calls.clone(), false);

        let response = handler.self_test().unwrap();
        assert_eq!(response.chunks_processed, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_error_body_carries_version() {
        let body = ErrorBody::new("boom");
        assert_eq!(body.error, "boom");
        assert_eq!(body.handler_version, HANDLER_VERSION);
    }
}
