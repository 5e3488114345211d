//! Left-padding batch tokenizer wrapper.
//!
//! Both the text prompts and the style description go through this wrapper.
//! Padding is always on the left so the causal decoder sees every real token
//! at the end of its row; the attention mask zeroes the padded prefix.

use anyhow::{anyhow, Result};
use ndarray::Array2;
use std::path::Path;
use tokenizers::Tokenizer;

/// Tokenizer wrapping HuggingFace `tokenizers` with manual left padding.
pub struct BatchTokenizer {
    tokenizer: Tokenizer,
    /// Padding token ID.
    pub pad_token_id: u32,
}

/// One tokenized batch: ids and mask, both `[batch, max_len]` i64.
#[derive(Debug)]
pub struct PaddedBatch {
    pub ids: Array2<i64>,
    pub mask: Array2<i64>,
}

impl BatchTokenizer {
    /// Load from a `tokenizer.json` file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let tokenizer = Tokenizer::from_file(path)
            .map_err(|e| anyhow!("failed to load tokenizer from {}: {}", path.display(), e))?;
        Self::from_tokenizer(tokenizer)
    }

    /// Wrap an existing `tokenizers::Tokenizer`.
    ///
    /// Useful for injecting custom configurations in tests.
    pub fn from_tokenizer(tokenizer: Tokenizer) -> Result<Self> {
        // Parler-style tokenizers call the pad token <pad>; fall back to the
        // common alternatives before giving up on 0.
        let pad_token_id = tokenizer
            .token_to_id("<pad>")
            .or_else(|| tokenizer.token_to_id("[PAD]"))
            .or_else(|| tokenizer.token_to_id("</s>"))
            .unwrap_or(0);

        Ok(Self {
            tokenizer,
            pad_token_id,
        })
    }

    /// Encode one text to token IDs.
    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow!("failed to encode text: {}", e))?;
        Ok(encoding.get_ids().to_vec())
    }

    /// Encode a batch with left padding to the longest row.
    ///
    /// Returns ids and mask of shape `[texts.len(), max_len]`. Padded
    /// positions hold `pad_token_id` with mask 0; real tokens are
    /// right-aligned with mask 1. An all-empty batch yields zero columns.
    pub fn encode_batch_left_padded(&self, texts: &[&str]) -> Result<PaddedBatch> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow!("failed to batch encode: {}", e))?;

        let rows: Vec<Vec<u32>> = encodings
            .into_iter()
            .map(|e| e.get_ids().to_vec())
            .collect();
        let max_len = rows.iter().map(Vec::len).max().unwrap_or(0);

        let mut ids = Array2::<i64>::from_elem((rows.len(), max_len), self.pad_token_id as i64);
        let mut mask = Array2::<i64>::zeros((rows.len(), max_len));

        for (i, row) in rows.iter().enumerate() {
            let offset = max_len - row.len();
            for (j, &id) in row.iter().enumerate() {
                ids[[i, offset + j]] = id as i64;
                mask[[i, offset + j]] = 1;
            }
        }

        Ok(PaddedBatch { ids, mask })
    }

    /// Encode the same text repeated `n` times, left padded.
    ///
    /// The combined generation call wants one description row per batch item;
    /// with identical rows the padding is trivially uniform.
    pub fn encode_repeated(&self, text: &str, n: usize) -> Result<PaddedBatch> {
        let texts = vec![text; n];
        self.encode_batch_left_padded(&texts)
    }

    /// Vocabulary size, including added tokens.
    pub fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }
}

impl std::fmt::Debug for BatchTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchTokenizer")
            .field("pad_token_id", &self.pad_token_id)
            .field("vocab_size", &self.vocab_size())
            .finish()
    }
}

/// Build a tiny whitespace BPE tokenizer for tests.
#[cfg(test)]
pub(crate) fn create_mock_tokenizer() -> Tokenizer {
    use tokenizers::models::bpe::BPE;
    use tokenizers::pre_tokenizers::whitespace::Whitespace;

    let vocab: [(&str, u32); 8] = [
        ("<pad>", 0),
        ("[UNK]", 1),
        ("hello", 2),
        ("world", 3),
        ("voice", 4),
        ("clear", 5),
        ("speaks", 6),
        ("slow", 7),
    ];

    let merges: Vec<(String, String)> = vec![];
    let bpe = BPE::builder()
        .vocab_and_merges(vocab.map(|(k, v)| (k.to_string(), v)), merges)
        .unk_token("[UNK]".to_string())
        .build()
        .unwrap();

    let mut tokenizer = Tokenizer::new(bpe);
    tokenizer.with_pre_tokenizer(Some(Whitespace));
    tokenizer
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_tokenizer() -> BatchTokenizer {
        BatchTokenizer::from_tokenizer(create_mock_tokenizer()).unwrap()
    }

    #[test]
    fn test_pad_token_resolution() {
        let tokenizer = create_test_tokenizer();
        assert_eq!(tokenizer.pad_token_id, 0); // <pad>
    }

    #[test]
    fn test_encode_known_words() {
        let tokenizer = create_test_tokenizer();
        let ids = tokenizer.encode("hello world").unwrap();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_left_padding_alignment() {
        let tokenizer = create_test_tokenizer();
        let batch = tokenizer
            .encode_batch_left_padded(&["hello", "hello world"])
            .unwrap();

        assert_eq!(batch.ids.dim(), (2, 2));
        assert_eq!(batch.mask.dim(), (2, 2));

        // Short row: pad on the left, real token right-aligned.
        assert_eq!(batch.ids[[0, 0]], 0);
        assert_eq!(batch.ids[[0, 1]], 2);
        assert_eq!(batch.mask[[0, 0]], 0);
        assert_eq!(batch.mask[[0, 1]], 1);

        // Long row: no padding.
        assert_eq!(batch.ids[[1, 0]], 2);
        assert_eq!(batch.ids[[1, 1]], 3);
        assert_eq!(batch.mask[[1, 0]], 1);
        assert_eq!(batch.mask[[1, 1]], 1);
    }

    #[test]
    fn test_encode_repeated_rows_identical() {
        let tokenizer = create_test_tokenizer();
        let batch = tokenizer.encode_repeated("clear voice", 3).unwrap();
        assert_eq!(batch.ids.dim(), (3, 2));
        for i in 1..3 {
            assert_eq!(batch.ids.row(i), batch.ids.row(0));
            assert_eq!(batch.mask.row(i), batch.mask.row(0));
        }
    }

    #[test]
    fn test_unknown_words_map_to_unk() {
        let tokenizer = create_test_tokenizer();
        let ids = tokenizer.encode("zzz").unwrap();
        assert_eq!(ids, vec![1]); // [UNK]
    }

    #[test]
    fn test_empty_batch() {
        let tokenizer = create_test_tokenizer();
        let batch = tokenizer.encode_batch_left_padded(&[]).unwrap();
        assert_eq!(batch.ids.dim(), (0, 0));
    }

    #[test]
    fn test_from_file_nonexistent() {
        assert!(BatchTokenizer::from_file("/nonexistent/tokenizer.json").is_err());
    }
}
