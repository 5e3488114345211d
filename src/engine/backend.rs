//! The neural collaborator seam: a trait for the combined forward pass and
//! its ONNX Runtime implementation.
//!
//! Everything above this file treats generation as a black box that takes
//! tokenized batches and returns a combined waveform matrix with per-item
//! valid lengths. The ONNX graph owns the weights, the architecture, and the
//! autoregressive loop.

use anyhow::{anyhow, Context, Result};
use ndarray::{Array2, Ix1, Ix2};
use ort::execution_providers::CPUExecutionProvider;
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

use crate::engine::config::Device;
use crate::tokenizer::PaddedBatch;

/// Tokenized inputs for one combined generation call.
///
/// `description` conditions the voice, `prompt` carries the text to speak.
/// Both are left padded; all four arrays share the batch dimension.
#[derive(Debug)]
pub struct BatchTokens {
    pub description: PaddedBatch,
    pub prompt: PaddedBatch,
}

impl BatchTokens {
    pub fn batch_size(&self) -> usize {
        self.prompt.ids.nrows()
    }
}

/// Sampling knobs forwarded to the graph.
#[derive(Debug, Clone, Copy)]
pub struct GenerationParams {
    pub min_new_tokens: u32,
    pub max_new_tokens: u32,
    pub do_sample: bool,
    pub temperature: f32,
}

/// Raw output of one combined forward pass.
///
/// `sequences` is `[batch, max_len]`; `lengths[i]` counts the valid samples
/// of row `i`. Both live in host memory owned by this struct.
#[derive(Debug)]
pub struct RawGeneration {
    pub sequences: Array2<f32>,
    pub lengths: Vec<usize>,
}

/// The forward-pass seam.
///
/// Implementations run one combined batch per call and must return
/// host-owned buffers; nothing device-resident may escape the call.
pub trait SpeechGenerator: Send {
    fn generate(&mut self, batch: &BatchTokens, params: &GenerationParams)
        -> Result<RawGeneration>;
}

/// [`SpeechGenerator`] backed by an ONNX Runtime session.
///
/// Expected graph interface:
///
/// | Name                    | Shape    | Type |
/// |-------------------------|----------|------|
/// | `input_ids`             | `[B, D]` | i64  |
/// | `attention_mask`        | `[B, D]` | i64  |
/// | `prompt_input_ids`      | `[B, P]` | i64  |
/// | `prompt_attention_mask` | `[B, P]` | i64  |
/// | `min_new_tokens`        | `[1]`    | i64  |
/// | `max_new_tokens`        | `[1]`    | i64  |
/// | `do_sample`             | `[1]`    | i64  |
/// | `temperature`           | `[1]`    | f32  |
/// | `sequences` (out)       | `[B, T]` | f32  |
/// | `audios_length` (out)   | `[B]`    | i64  |
pub struct OrtGenerator {
    session: Session,
}

impl OrtGenerator {
    /// Build a session over the exported graph at `onnx_path`.
    pub fn load(onnx_path: &Path, device: Device) -> Result<Self> {
        tracing::info!("building ONNX session from {}", onnx_path.display());

        let session = Self::session_builder(device)?
            .commit_from_file(onnx_path)
            .with_context(|| format!("failed to load ONNX graph {}", onnx_path.display()))?;

        Ok(Self { session })
    }

    #[cfg(feature = "cuda")]
    fn session_builder(device: Device) -> Result<ort::session::builder::SessionBuilder> {
        use ort::execution_providers::CUDAExecutionProvider;

        let providers = match device {
            Device::Cuda => vec![
                CUDAExecutionProvider::default().build(),
                CPUExecutionProvider::default().build(),
            ],
            Device::Cpu => vec![CPUExecutionProvider::default().build()],
        };
        Ok(Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_execution_providers(providers)?)
    }

    #[cfg(not(feature = "cuda"))]
    fn session_builder(device: Device) -> Result<ort::session::builder::SessionBuilder> {
        if device == Device::Cuda {
            anyhow::bail!("device 'cuda' requested but this build has no CUDA support; rebuild with --features cuda");
        }
        Ok(Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_execution_providers(vec![CPUExecutionProvider::default().build()])?)
    }
}

impl SpeechGenerator for OrtGenerator {
    fn generate(
        &mut self,
        batch: &BatchTokens,
        params: &GenerationParams,
    ) -> Result<RawGeneration> {
        let min_new = ndarray::arr1(&[params.min_new_tokens as i64]);
        let max_new = ndarray::arr1(&[params.max_new_tokens as i64]);
        let do_sample = ndarray::arr1(&[params.do_sample as i64]);
        let temperature = ndarray::arr1(&[params.temperature]);

        let inputs = inputs![
            "input_ids" => TensorRef::from_array_view(batch.description.ids.view())?,
            "attention_mask" => TensorRef::from_array_view(batch.description.mask.view())?,
            "prompt_input_ids" => TensorRef::from_array_view(batch.prompt.ids.view())?,
            "prompt_attention_mask" => TensorRef::from_array_view(batch.prompt.mask.view())?,
            "min_new_tokens" => TensorRef::from_array_view(min_new.view())?,
            "max_new_tokens" => TensorRef::from_array_view(max_new.view())?,
            "do_sample" => TensorRef::from_array_view(do_sample.view())?,
            "temperature" => TensorRef::from_array_view(temperature.view())?,
        ];

        let outputs = self.session.run(inputs)?;

        // Copy both outputs into host-owned storage before `outputs` drops.
        let sequences = outputs
            .iter()
            .find(|(name, _)| *name == "sequences")
            .ok_or_else(|| anyhow!("graph returned no 'sequences' output"))?
            .1
            .try_extract_array::<f32>()?
            .to_owned()
            .into_dimensionality::<Ix2>()
            .context("'sequences' output is not rank 2")?;

        let raw_lengths = outputs
            .iter()
            .find(|(name, _)| *name == "audios_length")
            .ok_or_else(|| anyhow!("graph returned no 'audios_length' output"))?
            .1
            .try_extract_array::<i64>()?
            .to_owned()
            .into_dimensionality::<Ix1>()
            .context("'audios_length' output is not rank 1")?;

        let lengths = raw_lengths
            .iter()
            .map(|&v| {
                usize::try_from(v).map_err(|_| anyhow!("negative audio length {} from graph", v))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RawGeneration { sequences, lengths })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_batch_size_follows_prompt_rows() {
        let batch = BatchTokens {
            description: PaddedBatch {
                ids: Array2::zeros((3, 5)),
                mask: Array2::zeros((3, 5)),
            },
            prompt: PaddedBatch {
                ids: Array2::zeros((3, 2)),
                mask: Array2::zeros((3, 2)),
            },
        };
        assert_eq!(batch.batch_size(), 3);
    }

    #[test]
    fn test_raw_generation_holds_host_data() {
        let raw = RawGeneration {
            sequences: array![[0.1f32, 0.2], [0.3, 0.4]],
            lengths: vec![2, 1],
        };
        assert_eq!(raw.sequences.nrows(), 2);
        assert_eq!(raw.lengths, vec![2, 1]);
    }
}
