//! Demultiplexes the combined generation output into per-chunk buffers.

use crate::audio::AudioBuffer;
use crate::engine::GenerationResult;
use crate::error::{Error, Result};

/// Split the combined waveform matrix into one [`AudioBuffer`] per chunk.
///
/// Row `i` is sliced to `lengths[i]` samples, dropping the shared padding
/// tail. The result preserves input order and always has exactly
/// `batch_size` buffers. Shape disagreements between the matrix and the
/// length vector mean the engine produced inconsistent output and fail with
/// [`Error::EngineGeneration`] rather than truncating silently.
pub fn demux(result: &GenerationResult, batch_size: usize) -> Result<Vec<AudioBuffer>> {
    if result.lengths.len() != batch_size {
        return Err(Error::EngineGeneration(format!(
            "engine returned {} lengths for a batch of {}",
            result.lengths.len(),
            batch_size
        )));
    }
    if result.sequences.nrows() != batch_size {
        return Err(Error::EngineGeneration(format!(
            "engine returned {} waveform rows for a batch of {}",
            result.sequences.nrows(),
            batch_size
        )));
    }

    let max_len = result.sequences.ncols();
    let mut buffers = Vec::with_capacity(batch_size);

    for (i, &len) in result.lengths.iter().enumerate() {
        if len > max_len {
            return Err(Error::EngineGeneration(format!(
                "chunk {i} claims {len} valid samples but rows hold only {max_len}"
            )));
        }
        let samples = result.sequences.row(i).slice(ndarray::s![..len]).to_vec();
        buffers.push(AudioBuffer::new(samples, result.sample_rate));
    }

    Ok(buffers)
}
