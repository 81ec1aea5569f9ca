//! Contextual tag scorer: DistilBERT backbone plus a linear emission head.
//!
//! The backbone is a black box mapping token ids to per-token vectors; only
//! the emission tensor crosses the scorer boundary.

use candle_core::Tensor;
use candle_nn::{Linear, Module, VarBuilder};
use candle_transformers::models::distilbert::{Config as BertConfig, DistilBertModel};

use crate::batch::Batch;
use crate::error::{KusariError, Result};
use crate::scorer::TagScorer;

// Default distilbert hidden dimension.
const HIDDEN_SIZE: usize = 768;

/// DistilBERT-backed emission scorer.
pub struct BertScorer {
    backbone: DistilBertModel,
    emission: Linear,
    num_tags: usize,
}

impl BertScorer {
    /// Load the backbone and emission head from a checkpoint.
    ///
    /// In Hugging Face sequence-classification checkpoints the emission
    /// head is named `classifier`.
    pub fn load(vb: VarBuilder, config: &BertConfig, num_tags: usize) -> Result<Self> {
        let backbone = DistilBertModel::load(vb.pp("distilbert"), config)
            .map_err(|e| KusariError::ModelLoad(e.to_string()))?;
        let emission = candle_nn::linear(HIDDEN_SIZE, num_tags, vb.pp("classifier"))
            .map_err(|e| KusariError::ModelLoad(e.to_string()))?;

        Ok(Self {
            backbone,
            emission,
            num_tags,
        })
    }
}

impl TagScorer for BertScorer {
    fn emissions(&self, batch: &Batch) -> Result<Tensor> {
        // The validity mask doubles as the attention mask.
        let attention_mask = batch.mask().to_dtype(batch.token_ids().dtype())?;
        let hidden = self.backbone.forward(batch.token_ids(), &attention_mask)?;
        Ok(self.emission.forward(&hidden)?)
    }

    fn num_tags(&self) -> usize {
        self.num_tags
    }
}
