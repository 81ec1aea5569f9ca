//! Pre-encoded dataset loading and in-order batch production.
//!
//! The encoded file carries one token per line as
//! `<token_id> <pos_id> <label_id>`, with blank lines between sentences.
//! Batches are produced strictly in file order; shuffling is disallowed
//! for evaluation because prediction alignment assumes batch order equals
//! file order.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use candle_core::Tensor;
use kusari_core::{Batch, EvalConfig, KusariError, Result};

/// One encoded sentence: aligned id streams of equal length.
#[derive(Debug, Clone)]
pub struct EncodedSentence {
    pub token_ids: Vec<u32>,
    pub pos_ids: Vec<u32>,
    pub label_ids: Vec<u32>,
}

/// A fully loaded encoded dataset in file order.
#[derive(Debug, Clone)]
pub struct EncodedDataset {
    sentences: Vec<EncodedSentence>,
}

impl EncodedDataset {
    /// Load an encoded ids file. Any malformed line is fatal.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut sentences = Vec::new();
        let mut current = EncodedSentence {
            token_ids: Vec::new(),
            pos_ids: Vec::new(),
            label_ids: Vec::new(),
        };

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                if !current.token_ids.is_empty() {
                    sentences.push(std::mem::replace(
                        &mut current,
                        EncodedSentence {
                            token_ids: Vec::new(),
                            pos_ids: Vec::new(),
                            label_ids: Vec::new(),
                        },
                    ));
                }
                continue;
            }

            let mut cols = line.split_whitespace().map(str::parse::<u32>);
            match (cols.next(), cols.next(), cols.next(), cols.next()) {
                (Some(Ok(token)), Some(Ok(pos)), Some(Ok(label)), None) => {
                    current.token_ids.push(token);
                    current.pos_ids.push(pos);
                    current.label_ids.push(label);
                }
                _ => {
                    return Err(KusariError::InvalidConfig(format!(
                        "malformed encoded line {}: {line:?}",
                        idx + 1
                    )));
                }
            }
        }
        if !current.token_ids.is_empty() {
            sentences.push(current);
        }

        Ok(Self { sentences })
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    /// Produce padded batches in file order.
    ///
    /// Sentences longer than `seq_size` are truncated at the tail; the
    /// final partial batch is emitted as-is.
    pub fn batches<'a>(
        &'a self,
        config: &'a EvalConfig,
    ) -> impl Iterator<Item = Result<Batch>> + 'a {
        self.sentences
            .chunks(config.batch_size.max(1))
            .map(move |chunk| build_batch(chunk, config))
    }
}

fn build_batch(sentences: &[EncodedSentence], config: &EvalConfig) -> Result<Batch> {
    let batch = sentences.len();
    let seq = config.seq_size;

    let mut tokens = vec![config.pad_token_id; batch * seq];
    let mut poss = vec![0_u32; batch * seq];
    let mut labels = vec![config.pad_label_id; batch * seq];

    for (row, sentence) in sentences.iter().enumerate() {
        if sentence.pos_ids.len() != sentence.token_ids.len()
            || sentence.label_ids.len() != sentence.token_ids.len()
        {
            return Err(KusariError::ShapeMismatch(
                "feature streams of one sentence differ in length".into(),
            ));
        }
        let len = sentence.token_ids.len().min(seq);
        for t in 0..len {
            tokens[row * seq + t] = sentence.token_ids[t];
            poss[row * seq + t] = sentence.pos_ids[t];
            labels[row * seq + t] = sentence.label_ids[t];
        }
    }

    let dev = &config.device;
    Batch::new(
        Tensor::from_vec(tokens, (batch, seq), dev)?,
        Tensor::from_vec(poss, (batch, seq), dev)?,
        Tensor::from_vec(labels, (batch, seq), dev)?,
        config.pad_token_id,
    )
}
