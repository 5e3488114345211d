//! HuggingFace Hub resolution for model IDs that are not local directories.
//!
//! Enable with the `hub` feature. Files land in the shared HuggingFace
//! cache; the snapshot directory they share is what the engine loads from.
//!
//! # Example
//!
//! ```rust,ignore
//! use parler_batch_tts::hub;
//!
//! let model_dir = hub::snapshot("ai4bharat/indic-parler-tts")?;
//! ```

use anyhow::{Context, Result};
use hf_hub::api::sync::Api;
use std::path::PathBuf;

/// Files every usable model snapshot must carry.
const REQUIRED_FILES: &[&str] = &["config.json", "tokenizer.json", "model.onnx"];

/// Files worth having but fine to miss.
const OPTIONAL_FILES: &[&str] = &["description_tokenizer/tokenizer.json", "model_fp16.onnx"];

/// Download a model snapshot and return the directory holding it.
///
/// Required files fail the resolution when absent; optional ones (the
/// separate description tokenizer, the half precision export) are fetched
/// opportunistically.
pub fn snapshot(model_id: &str) -> Result<PathBuf> {
    let api = Api::new().context("failed to create HuggingFace API")?;
    let repo = api.model(model_id.to_string());

    tracing::info!(model = %model_id, "downloading model snapshot");

    let mut anchor = None;
    for file in REQUIRED_FILES {
        let path = repo
            .get(file)
            .with_context(|| format!("failed to download {file} from '{model_id}'"))?;
        anchor.get_or_insert(path);
    }

    for file in OPTIONAL_FILES {
        if repo.get(file).is_err() {
            tracing::debug!(model = %model_id, file, "optional file not present");
        }
    }

    let anchor = anchor.context("snapshot resolved no files")?;
    let dir = anchor
        .parent()
        .context("downloaded file has no parent directory")?
        .to_path_buf();

    tracing::info!(model = %model_id, dir = %dir.display(), "snapshot ready");
    Ok(dir)
}
