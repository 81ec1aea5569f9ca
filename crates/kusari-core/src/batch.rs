//! # Padding and Masking Model
//!
//! Variable-length sequences are carried in fixed-width `[batch, seq_size]`
//! id tensors, padded at the tail with a reserved PAD id. Validity is
//! derived from the data: a position is real iff its token id differs from
//! the PAD id. Consumers must never treat masked-out emission scores as
//! meaningful.

use candle_core::Tensor;

use crate::error::{KusariError, Result};

/// One padded batch of aligned feature and label tensors.
///
/// All tensors share the `[batch, seq_size]` shape; this is checked at
/// construction and a mismatch is a fatal precondition violation.
#[derive(Debug, Clone)]
pub struct Batch {
    token_ids: Tensor,
    pos_ids: Tensor,
    label_ids: Tensor,
    mask: Tensor,
}

impl Batch {
    /// Build a batch from aligned id tensors, deriving the validity mask
    /// from the primary (token) stream.
    ///
    /// # Arguments
    /// * `token_ids` - U32 tensor `[batch, seq_size]`, PAD positions hold `pad_token_id`
    /// * `pos_ids` - U32 tensor `[batch, seq_size]`
    /// * `label_ids` - U32 tensor `[batch, seq_size]` of gold tag ids
    /// * `pad_token_id` - reserved id marking a non-real position
    pub fn new(
        token_ids: Tensor,
        pos_ids: Tensor,
        label_ids: Tensor,
        pad_token_id: u32,
    ) -> Result<Self> {
        let shape = token_ids.dims2()?;
        for (name, tensor) in [("pos_ids", &pos_ids), ("label_ids", &label_ids)] {
            let other = tensor.dims2()?;
            if other != shape {
                return Err(KusariError::ShapeMismatch(format!(
                    "{name} is {other:?}, token_ids is {shape:?}"
                )));
            }
        }

        // mask[i][j] = 1 iff token_ids[i][j] != PAD
        let pad = Tensor::full(pad_token_id, shape, token_ids.device())?;
        let mask = token_ids.ne(&pad)?;

        Ok(Self {
            token_ids,
            pos_ids,
            label_ids,
            mask,
        })
    }

    /// Number of sequences in the batch.
    pub fn batch_size(&self) -> Result<usize> {
        Ok(self.token_ids.dims2()?.0)
    }

    /// Common padded width of the batch.
    pub fn seq_size(&self) -> Result<usize> {
        Ok(self.token_ids.dims2()?.1)
    }

    /// Token id tensor `[batch, seq_size]`.
    pub fn token_ids(&self) -> &Tensor {
        &self.token_ids
    }

    /// POS id tensor `[batch, seq_size]`.
    pub fn pos_ids(&self) -> &Tensor {
        &self.pos_ids
    }

    /// Gold label id tensor `[batch, seq_size]`.
    pub fn label_ids(&self) -> &Tensor {
        &self.label_ids
    }

    /// Validity mask, U8 `[batch, seq_size]`, 1 where the token is real.
    pub fn mask(&self) -> &Tensor {
        &self.mask
    }

    /// Real (non-PAD) length of each sequence.
    ///
    /// Padding is tail-only by construction, so the mask of every row is a
    /// contiguous prefix of ones.
    pub fn seq_lens(&self) -> Result<Vec<usize>> {
        let sums = self
            .mask
            .to_dtype(candle_core::DType::U32)?
            .sum(1)?
            .to_vec1::<u32>()?;
        Ok(sums.into_iter().map(|n| n as usize).collect())
    }

    /// Gold tag ids per sequence with PAD positions stripped.
    pub fn gold_rows(&self) -> Result<Vec<Vec<u32>>> {
        let rows = self.label_ids.to_vec2::<u32>()?;
        let lens = self.seq_lens()?;
        Ok(rows
            .into_iter()
            .zip(lens)
            .map(|(mut row, len)| {
                row.truncate(len);
                row
            })
            .collect())
    }
}
