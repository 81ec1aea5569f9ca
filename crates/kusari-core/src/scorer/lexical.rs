//! Lexical tag scorer: pretrained token embeddings concatenated with a
//! learned POS embedding, projected to per-tag scores.

use candle_core::{D, Tensor};
use candle_nn::{Embedding, Linear, Module, VarBuilder};

use crate::batch::Batch;
use crate::config::EvalConfig;
use crate::error::{KusariError, Result};
use crate::scorer::TagScorer;

/// Embedding-lookup scorer over the token and POS id streams.
///
/// The PAD id maps to embedding row 0 like any other id; downstream
/// consumers mask those positions out.
pub struct LexicalScorer {
    embed_token: Embedding,
    embed_pos: Embedding,
    projection: Linear,
    num_tags: usize,
}

impl LexicalScorer {
    /// Load scorer weights from a checkpoint.
    pub fn load(vb: VarBuilder, config: &EvalConfig, num_tags: usize) -> Result<Self> {
        if config.token_vocab_size == 0 || config.pos_vocab_size == 0 {
            return Err(KusariError::InvalidConfig(
                "lexical scorer needs token_vocab_size and pos_vocab_size".into(),
            ));
        }

        let embed_token = candle_nn::embedding(
            config.token_vocab_size,
            config.token_emb_dim,
            vb.pp("embed_token"),
        )
        .map_err(|e| KusariError::ModelLoad(e.to_string()))?;
        let embed_pos = candle_nn::embedding(
            config.pos_vocab_size,
            config.pos_emb_dim,
            vb.pp("embed_pos"),
        )
        .map_err(|e| KusariError::ModelLoad(e.to_string()))?;
        let projection = candle_nn::linear(
            config.token_emb_dim + config.pos_emb_dim,
            num_tags,
            vb.pp("projection"),
        )
        .map_err(|e| KusariError::ModelLoad(e.to_string()))?;

        Ok(Self {
            embed_token,
            embed_pos,
            projection,
            num_tags,
        })
    }

    /// Build a scorer from explicit layers, mainly for tests.
    pub fn from_parts(
        embed_token: Embedding,
        embed_pos: Embedding,
        projection: Linear,
        num_tags: usize,
    ) -> Self {
        Self {
            embed_token,
            embed_pos,
            projection,
            num_tags,
        }
    }
}

impl TagScorer for LexicalScorer {
    fn emissions(&self, batch: &Batch) -> Result<Tensor> {
        let token_out = self.embed_token.forward(batch.token_ids())?;
        let pos_out = self.embed_pos.forward(batch.pos_ids())?;
        // [batch, seq_size, token_emb_dim + pos_emb_dim]
        let embedded = Tensor::cat(&[token_out, pos_out], D::Minus1)?;
        Ok(self.projection.forward(&embedded)?)
    }

    fn num_tags(&self) -> usize {
        self.num_tags
    }
}
