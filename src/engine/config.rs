//! Engine configuration: target device, numeric precision, model config.json.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Model ID loaded when a request names none.
pub const DEFAULT_MODEL_ID: &str = "ai4bharat/indic-parler-tts";

/// Sample rate assumed when the model ships no usable config.json.
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Execution device for the ONNX session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda,
}

impl FromStr for Device {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda),
            other => anyhow::bail!("unknown device '{}', expected 'cpu' or 'cuda'", other),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda => write!(f, "cuda"),
        }
    }
}

/// Numeric precision of the session weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    F32,
    F16,
}

impl Precision {
    /// Half precision on CUDA, full precision on CPU.
    pub fn for_device(device: Device) -> Self {
        match device {
            Device::Cuda => Precision::F16,
            Device::Cpu => Precision::F32,
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precision::F32 => write!(f, "f32"),
            Precision::F16 => write!(f, "f16"),
        }
    }
}

/// Static engine configuration fixed at process start.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Model directory or Hub repo ID used when requests name no model.
    pub model_id: String,
    pub device: Device,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            device: Device::Cpu,
        }
    }
}

impl EngineConfig {
    pub fn new(model_id: impl Into<String>, device: Device) -> Self {
        Self {
            model_id: model_id.into(),
            device,
        }
    }
}

/// The subset of the model's `config.json` the server cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct ParsedModelConfig {
    #[serde(default)]
    sampling_rate: Option<u32>,
    #[serde(default)]
    audio_encoder: Option<AudioEncoderConfig>,
}

#[derive(Debug, Clone, Deserialize)]
struct AudioEncoderConfig {
    #[serde(default)]
    sampling_rate: Option<u32>,
}

impl ParsedModelConfig {
    /// Parse `config.json` from a model directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Output sample rate: top-level field, then the audio encoder's, then
    /// [`DEFAULT_SAMPLE_RATE`].
    pub fn sample_rate(&self) -> u32 {
        self.sampling_rate
            .or_else(|| self.audio_encoder.as_ref().and_then(|a| a.sampling_rate))
            .unwrap_or(DEFAULT_SAMPLE_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_device_parse() {
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("CUDA".parse::<Device>().unwrap(), Device::Cuda);
        assert_eq!("gpu".parse::<Device>().unwrap(), Device::Cuda);
        assert!("tpu".parse::<Device>().is_err());
    }

    #[test]
    fn test_precision_policy() {
        assert_eq!(Precision::for_device(Device::Cuda), Precision::F16);
        assert_eq!(Precision::for_device(Device::Cpu), Precision::F32);
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.model_id, DEFAULT_MODEL_ID);
        assert_eq!(config.device, Device::Cpu);
    }

    #[test]
    fn test_sample_rate_top_level() {
        let config: ParsedModelConfig =
            serde_json::from_str(r#"{"sampling_rate": 24000}"#).unwrap();
        assert_eq!(config.sample_rate(), 24000);
    }

    #[test]
    fn test_sample_rate_from_audio_encoder() {
        let config: ParsedModelConfig =
            serde_json::from_str(r#"{"audio_encoder": {"sampling_rate": 44100}}"#).unwrap();
        assert_eq!(config.sample_rate(), 44100);
    }

    #[test]
    fn test_sample_rate_default_when_absent() {
        let config: ParsedModelConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.sample_rate(), DEFAULT_SAMPLE_RATE);
    }

    #[test]
    fn test_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{"sampling_rate": 44100, "model_type": "parler_tts"}}"#).unwrap();

        let config = ParsedModelConfig::from_file(&path).unwrap();
        assert_eq!(config.sample_rate(), 44100);
    }

    #[test]
    fn test_from_file_missing() {
        assert!(ParsedModelConfig::from_file("/nonexistent/config.json").is_err());
    }
}
