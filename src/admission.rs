//! Admission control and token budgeting for batch requests.
//!
//! Every request passes through [`enforce_batch_limits`] before it can touch
//! the engine, and [`shared_token_budget`] decides how many new tokens the
//! single combined generation call may produce.

use crate::error::{Error, Result};

/// Ceiling on batch size that no request-supplied `max_chunks` can exceed.
pub const HARD_MAX_CHUNKS: usize = 50;

/// Maximum characters (Unicode scalars) per chunk. Inputs are Devanagari, so
/// counting scalars rather than bytes is the meaningful limit.
pub const MAX_CHUNK_CHARS: usize = 200;

/// Floor of the per-batch token budget.
pub const MIN_TOKEN_BUDGET: u32 = 50;

/// Ceiling of the per-batch token budget.
pub const MAX_TOKEN_BUDGET: u32 = 2000;

/// Reject batches the engine should never see.
///
/// Fails with [`Error::Validation`] when the batch is empty, larger than
/// `min(max_chunks, HARD_MAX_CHUNKS)`, contains a chunk that trims to
/// nothing, or contains a chunk longer than [`MAX_CHUNK_CHARS`] characters.
/// No side effects; on success the input is admitted unchanged.
pub fn enforce_batch_limits(chunks: &[String], max_chunks: usize) -> Result<()> {
    if chunks.is_empty() {
        return Err(Error::Validation(
            "text_chunks must be a non-empty list".into(),
        ));
    }

    let limit = max_chunks.min(HARD_MAX_CHUNKS);
    if chunks.len() > limit {
        return Err(Error::Validation(format!(
            "batch of {} chunks exceeds the limit of {}",
            chunks.len(),
            limit
        )));
    }

    for (i, chunk) in chunks.iter().enumerate() {
        if chunk.trim().is_empty() {
            return Err(Error::Validation(format!("chunk {i} is empty")));
        }
        let char_count = chunk.chars().count();
        if char_count > MAX_CHUNK_CHARS {
            return Err(Error::Validation(format!(
                "chunk {i} has {char_count} characters, maximum is {MAX_CHUNK_CHARS}"
            )));
        }
    }

    Ok(())
}

/// Estimate the token budget for one chunk.
///
/// Whitespace word count times `tokens_per_word`, clamped to
/// `[MIN_TOKEN_BUDGET, MAX_TOKEN_BUDGET]`.
pub fn estimate_tokens(text: &str, tokens_per_word: u32) -> u32 {
    let words = text.split_whitespace().count() as u32;
    words
        .saturating_mul(tokens_per_word)
        .clamp(MIN_TOKEN_BUDGET, MAX_TOKEN_BUDGET)
}

/// Token budget for a combined batch call: the maximum per-chunk estimate.
///
/// Short chunks over-allocate relative to their own needs. That is the
/// accepted cost of issuing one generation call for the whole batch; the
/// demuxer trims each item back to its valid length afterwards.
pub fn shared_token_budget(chunks: &[String], tokens_per_word: u32) -> u32 {
    chunks
        .iter()
        .map(|c| estimate_tokens(c, tokens_per_word))
        .max()
        .unwrap_or(MIN_TOKEN_BUDGET)
}
