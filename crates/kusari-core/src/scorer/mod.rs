//! # Tag Scorers
//!
//! The replaceable front end of the tagging pipeline: anything that maps a
//! batch of feature tensors to per-token, per-tag emission scores. The CRF
//! and the evaluator only ever see the emission tensor and the mask, so
//! the encoder behind this boundary can vary freely.

pub mod bert;
pub mod lexical;

use std::str::FromStr;

use candle_core::Tensor;

pub use bert::BertScorer;
pub use lexical::LexicalScorer;

use crate::batch::Batch;
use crate::error::{KusariError, Result};

/// Produces emission scores `[batch, seq_size, num_tags]` for a batch.
///
/// Scores at PAD positions are unused downstream but must be finite-safe
/// to compute; implementations must not fail on padded input.
pub trait TagScorer {
    /// Compute emission scores for every position and tag.
    fn emissions(&self, batch: &Batch) -> Result<Tensor>;

    /// Width of the tag dimension this scorer emits.
    fn num_tags(&self) -> usize;
}

/// Which embedding front end feeds the shared decoding back end.
///
/// Resolved once at startup; never re-dispatched per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingSource {
    /// Token + POS embedding lookup with a linear projection.
    Lexical,
    /// DistilBERT contextual backbone with a linear projection.
    Bert,
}

impl FromStr for EmbeddingSource {
    type Err = KusariError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "lexical" | "glove" => Ok(Self::Lexical),
            "bert" => Ok(Self::Bert),
            other => Err(KusariError::InvalidConfig(format!(
                "unknown embedding source {other:?}, expected \"lexical\" or \"bert\""
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_source_from_str() {
        assert_eq!(
            "lexical".parse::<EmbeddingSource>().unwrap(),
            EmbeddingSource::Lexical
        );
        assert_eq!(
            "bert".parse::<EmbeddingSource>().unwrap(),
            EmbeddingSource::Bert
        );
        assert!("elmo".parse::<EmbeddingSource>().is_err());
    }
}
