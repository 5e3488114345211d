//! # parler-batch-tts
//!
//! Batched Sanskrit text-to-speech serving for
//! [Indic Parler-TTS](https://huggingface.co/ai4bharat/indic-parler-tts)
//! ONNX exports.
//!
//! ## Features
//!
//! - **Batched synthesis**: one combined engine invocation per request,
//!   demultiplexed back into per-chunk audio buffers in input order
//! - **Admission control**: batch size and chunk length limits enforced
//!   before any model work happens
//! - **Token budgeting**: per-batch generation budget estimated from word
//!   counts, shared across the batch
//! - **Voice profiles**: named style descriptions with a safe default
//!   fallback
//! - **Lazy model loading** with retry on failure and a one-time warmup
//! - **CPU and CUDA** execution via ONNX Runtime providers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use parler_batch_tts::{BatchHandler, EngineConfig, SynthesisRequest};
//!
//! let config = EngineConfig::new("path/to/model", "cpu".parse()?);
//! let mut handler = BatchHandler::new(config);
//!
//! let request = SynthesisRequest {
//!     text_chunks: vec!["ॐ गं गणपतये नमः".to_string()],
//!     ..SynthesisRequest::default()
//! };
//! let response = handler.handle(&request)?;
//! assert_eq!(response.buffer_count, 1);
//! ```
//!
//! ## Pipeline
//!
//! 1. **Admission**: reject empty, oversized, or overlong batches.
//! 2. **Budget**: `max` over per-chunk `word_count * tokens_per_word`,
//!    clamped to `[50, 2000]` new tokens.
//! 3. **Generate**: left-pad-tokenize text and style, run the ONNX graph
//!    once for the whole batch.
//! 4. **Demux**: slice each combined waveform row to its valid length.
//!
//! The neural forward pass lives entirely inside the exported ONNX graph;
//! this crate owns everything around it.

pub mod admission;
pub mod audio;
pub mod demux;
pub mod engine;
pub mod error;
pub mod handler;
#[cfg(feature = "hub")]
pub mod hub;
pub mod tokenizer;
pub mod voice;

pub use audio::AudioBuffer;
pub use engine::config::{Device, EngineConfig, Precision};
pub use engine::{Engine, EngineSession, GenerationResult};
pub use error::{Error, Result};
pub use handler::{
    BatchHandler, ErrorBody, SynthesisRequest, SynthesisResponse, SynthesizedBatch,
};

/// Version tag embedded in every response and the health probe.
pub const HANDLER_VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"), "-tts-batch");
