//! Audio buffers, WAV I/O, and wire-safe encoding.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;

/// Audio buffer holding raw waveform data.
///
/// This is the per-chunk output type of the pipeline. Samples are stored as
/// 32-bit floats in the range \[-1.0, 1.0\].
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    /// Mono audio samples in \[-1.0, 1.0\] range
    pub samples: Vec<f32>,
    /// Sample rate in Hz (44100 for the Indic Parler family)
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a new audio buffer
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Duration in seconds
    pub fn duration(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Encode the raw samples as base64 over little-endian f32 bytes.
    ///
    /// This is the wire format: the receiver reinterprets the decoded bytes
    /// as a float32 array at [`Self::sample_rate`].
    pub fn to_base64(&self) -> String {
        let mut bytes = Vec::with_capacity(self.samples.len() * 4);
        for sample in &self.samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        BASE64.encode(bytes)
    }

    /// Decode a base64 payload produced by [`Self::to_base64`].
    pub fn from_base64(data: &str, sample_rate: u32) -> Result<Self> {
        let bytes = BASE64.decode(data).context("invalid base64 audio payload")?;
        if bytes.len() % 4 != 0 {
            anyhow::bail!(
                "audio payload length {} is not a multiple of 4 bytes",
                bytes.len()
            );
        }
        let samples = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Ok(Self::new(samples, sample_rate))
    }

    /// Save to WAV file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_wav(path, &self.samples, self.sample_rate)
    }

    /// Load from WAV file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_wav(path)
    }
}

/// Load a WAV file into an AudioBuffer
pub fn load_wav<P: AsRef<Path>>(path: P) -> Result<AudioBuffer> {
    let path = path.as_ref();
    let reader = WavReader::open(path)
        .with_context(|| format!("failed to open WAV file: {}", path.display()))?;

    let spec = reader.spec();
    let sample_rate = spec.sample_rate;
    let channels = spec.channels as usize;

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let bits = spec.bits_per_sample;
            let max_val = (1 << (bits - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    // Convert to mono by averaging channels
    let mono_samples = if channels > 1 {
        samples
            .chunks(channels)
            .map(|chunk| chunk.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        samples
    };

    Ok(AudioBuffer::new(mono_samples, sample_rate))
}

/// Save samples to a WAV file
pub fn save_wav<P: AsRef<Path>>(path: P, samples: &[f32], sample_rate: u32) -> Result<()> {
    let path = path.as_ref();
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("failed to create WAV file: {}", path.display()))?;

    for &sample in samples {
        // Clamp to [-1.0, 1.0] and convert to i16
        let clamped = sample.clamp(-1.0, 1.0);
        let scaled = (clamped * 32767.0) as i16;
        writer.write_sample(scaled)?;
    }

    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_audio_buffer_new() {
        let samples = vec![0.1, 0.2, 0.3];
        let buffer = AudioBuffer::new(samples.clone(), 44100);
        assert_eq!(buffer.samples, samples);
        assert_eq!(buffer.sample_rate, 44100);
    }

    #[test]
    fn test_audio_buffer_duration() {
        let buffer = AudioBuffer::new(vec![0.0; 44100], 44100);
        assert!((buffer.duration() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_audio_buffer_len_and_empty() {
        let buffer = AudioBuffer::new(vec![0.0; 100], 44100);
        assert_eq!(buffer.len(), 100);
        assert!(!buffer.is_empty());

        let empty_buffer = AudioBuffer::new(vec![], 44100);
        assert_eq!(empty_buffer.len(), 0);
        assert!(empty_buffer.is_empty());
    }

    #[test]
    fn test_base64_roundtrip() {
        let original = AudioBuffer::new(vec![0.1, -0.5, 0.9, 0.0], 44100);
        let encoded = original.to_base64();
        let decoded = AudioBuffer::from_base64(&encoded, 44100).unwrap();
        assert_eq!(decoded.samples, original.samples);
        assert_eq!(decoded.sample_rate, 44100);
    }

    #[test]
    fn test_base64_length_is_four_bytes_per_sample() {
        let buffer = AudioBuffer::new(vec![0.25; 3], 44100);
        let encoded = buffer.to_base64();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        assert_eq!(bytes.len(), 12);
    }

    #[test]
    fn test_from_base64_rejects_ragged_payload() {
        // 2 raw bytes cannot hold any whole f32.
        let encoded = base64::engine::general_purpose::STANDARD.encode([1u8, 2u8]);
        assert!(AudioBuffer::from_base64(&encoded, 44100).is_err());
    }

    #[test]
    fn test_from_base64_rejects_garbage() {
        assert!(AudioBuffer::from_base64("not base64!!", 44100).is_err());
    }

    #[test]
    fn test_save_and_load_wav() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wav");

        let original = AudioBuffer::new(vec![0.1, 0.2, -0.3, 0.4, -0.5], 44100);
        original.save(&path).unwrap();

        let loaded = AudioBuffer::load(&path).unwrap();
        assert_eq!(loaded.sample_rate, 44100);
        assert_eq!(loaded.samples.len(), 5);

        for (a, b) in original.samples.iter().zip(loaded.samples.iter()) {
            assert!((a - b).abs() < 1e-4, "sample mismatch: {a} vs {b}");
        }
    }

    #[test]
    fn test_save_wav_function() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test2.wav");

        let samples = vec![0.0, 0.5, 1.0, -0.5, -1.0];
        save_wav(&path, &samples, 16000).unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = load_wav("/nonexistent/path/to/file.wav");
        assert!(result.is_err());
    }
}
