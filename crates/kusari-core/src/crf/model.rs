//! # Linear-Chain Conditional Random Field
//!
//! Sequence log-likelihood (forward algorithm in log space) and Viterbi
//! decoding over batched, masked emission scores. Tensors are batch-first:
//! emissions are `[batch, seq_size, num_tags]`, tags and mask are
//! `[batch, seq_size]`. PAD positions carry the dynamic-programming state
//! forward unchanged, so arbitrary emission values beyond a sequence's real
//! length can never influence the result.

use candle_core::{DType, Tensor};
use candle_nn::VarBuilder;
use serde::Deserialize;

use crate::error::{KusariError, Result};

/// Batch reduction applied to the per-sequence log-likelihood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    /// No reduction, one value per sequence.
    None,
    /// Sum over the batch.
    Sum,
    /// Mean over the batch.
    #[default]
    Mean,
    /// Sum divided by the number of real tokens.
    TokenMean,
}

/// Linear-chain CRF over a fixed tag set.
///
/// Owns the pairwise transition matrix and the start/end boundary score
/// vectors. All parameters are immutable during inference.
pub struct LinearChainCrf {
    num_tags: usize,
    start: Tensor,
    end: Tensor,
    transitions: Tensor,
}

impl LinearChainCrf {
    /// Build a CRF from explicit parameter tensors.
    ///
    /// # Arguments
    /// * `start` - `[num_tags]` scores for the first real tag of a sequence
    /// * `end` - `[num_tags]` scores for the last real tag of a sequence
    /// * `transitions` - `[num_tags, num_tags]`, `transitions[prev][cur]`
    pub fn from_tensors(start: Tensor, end: Tensor, transitions: Tensor) -> Result<Self> {
        let num_tags = start.dims1()?;
        if num_tags == 0 {
            return Err(KusariError::InvalidConfig(
                "CRF needs at least one tag".into(),
            ));
        }
        if end.dims1()? != num_tags || transitions.dims2()? != (num_tags, num_tags) {
            return Err(KusariError::ShapeMismatch(format!(
                "CRF parameters disagree on tag count: start {:?}, end {:?}, transitions {:?}",
                start.shape(),
                end.shape(),
                transitions.shape()
            )));
        }
        Ok(Self {
            num_tags,
            start,
            end,
            transitions,
        })
    }

    /// Load CRF parameters from a checkpoint.
    pub fn load(vb: VarBuilder, num_tags: usize) -> Result<Self> {
        let start = vb
            .get(num_tags, "crf.start_transitions")
            .map_err(|e| KusariError::ModelLoad(e.to_string()))?;
        let end = vb
            .get(num_tags, "crf.end_transitions")
            .map_err(|e| KusariError::ModelLoad(e.to_string()))?;
        let transitions = vb
            .get((num_tags, num_tags), "crf.transitions")
            .map_err(|e| KusariError::ModelLoad(e.to_string()))?;
        tracing::debug!(num_tags, "CRF parameters loaded");
        Self::from_tensors(start, end, transitions)
    }

    /// Number of distinct tags.
    pub fn num_tags(&self) -> usize {
        self.num_tags
    }

    fn validate(&self, emissions: &Tensor, tags: Option<&Tensor>, mask: &Tensor) -> Result<()> {
        let (batch, seq_size, tag_dim) = emissions.dims3()?;
        if tag_dim != self.num_tags {
            return Err(KusariError::ShapeMismatch(format!(
                "emissions have {tag_dim} tags, CRF has {}",
                self.num_tags
            )));
        }
        if mask.dims2()? != (batch, seq_size) {
            return Err(KusariError::ShapeMismatch(format!(
                "mask is {:?}, emissions are [{batch}, {seq_size}, ..]",
                mask.dims()
            )));
        }
        if let Some(tags) = tags {
            if tags.dims2()? != (batch, seq_size) {
                return Err(KusariError::ShapeMismatch(format!(
                    "tags are {:?}, emissions are [{batch}, {seq_size}, ..]",
                    tags.dims()
                )));
            }
        }
        Ok(())
    }

    /// Log of the normalized probability of the gold tag sequences.
    ///
    /// `score(y) - log Z`, where both terms run over masked positions only
    /// and the boundary scores attach to each sequence's first and last
    /// real position. Every sequence must contain at least one real token.
    pub fn log_likelihood(
        &self,
        emissions: &Tensor,
        tags: &Tensor,
        mask: &Tensor,
        reduction: Reduction,
    ) -> Result<Tensor> {
        self.validate(emissions, Some(tags), mask)?;

        let numerator = self.joint_score(emissions, tags, mask)?;
        let denominator = self.partition(emissions, mask)?;
        let llh = (numerator - denominator)?;

        match reduction {
            Reduction::None => Ok(llh),
            Reduction::Sum => Ok(llh.sum_all()?),
            Reduction::Mean => Ok(llh.mean_all()?),
            Reduction::TokenMean => {
                let tokens = mask.to_dtype(DType::F32)?.sum_all()?;
                Ok(llh.sum_all()?.broadcast_div(&tokens)?)
            }
        }
    }

    /// Score of the gold path per sequence, `[batch]`.
    fn joint_score(&self, emissions: &Tensor, tags: &Tensor, mask: &Tensor) -> Result<Tensor> {
        let (_, seq_size, _) = emissions.dims3()?;
        let lens = seq_lens(mask)?;
        if lens.iter().any(|&len| len == 0) {
            return Err(KusariError::ShapeMismatch(
                "log-likelihood requires at least one real token per sequence".into(),
            ));
        }

        let mask_f = mask.to_dtype(DType::F32)?;

        let first_tags = tags.narrow(1, 0, 1)?.squeeze(1)?;
        let mut score = select_rows(&self.start, &first_tags)?;
        score = (score + gather_cols(&step(emissions, 0)?, &first_tags)?)?;

        for t in 1..seq_size {
            let prev_tags = tags.narrow(1, t - 1, 1)?.squeeze(1)?;
            let cur_tags = tags.narrow(1, t, 1)?.squeeze(1)?;
            let mask_t = mask_f.narrow(1, t, 1)?.squeeze(1)?;

            let trans = gather_cols(&select_rows(&self.transitions, &prev_tags)?, &cur_tags)?;
            let emit = gather_cols(&step(emissions, t)?, &cur_tags)?;
            score = (score + ((trans + emit)? * mask_t)?)?;
        }

        // End scores attach at each sequence's last real position.
        let ends: Vec<u32> = lens.iter().map(|&len| (len - 1) as u32).collect();
        let seq_ends = Tensor::from_vec(ends, lens.len(), tags.device())?;
        let last_tags = gather_cols(tags, &seq_ends)?;
        Ok((score + select_rows(&self.end, &last_tags)?)?)
    }

    /// Partition function per sequence, `[batch]`, via the forward
    /// algorithm with log-sum-exp.
    fn partition(&self, emissions: &Tensor, mask: &Tensor) -> Result<Tensor> {
        let (_, seq_size, _) = emissions.dims3()?;

        // alpha: [batch, num_tags]
        let mut alpha = step(emissions, 0)?.broadcast_add(&self.start)?;

        for t in 1..seq_size {
            // [batch, prev, 1] + [prev, cur] + [batch, 1, cur]
            let next = alpha
                .unsqueeze(2)?
                .broadcast_add(&self.transitions)?
                .broadcast_add(&step(emissions, t)?.unsqueeze(1)?)?;
            let next = next.log_sum_exp(1)?;

            // Masked steps carry the previous alpha forward unchanged.
            let keep = mask
                .narrow(1, t, 1)?
                .broadcast_as(next.shape())?
                .contiguous()?;
            alpha = keep.where_cond(&next, &alpha)?;
        }

        alpha.broadcast_add(&self.end)?.log_sum_exp(1).map_err(Into::into)
    }

    /// Find the best tag sequence per batch row via Viterbi decoding.
    ///
    /// Returns one id per real (non-PAD) token; a fully masked row decodes
    /// to an empty sequence rather than raising.
    pub fn decode(&self, emissions: &Tensor, mask: &Tensor) -> Result<Vec<Vec<u32>>> {
        self.validate(emissions, None, mask)?;
        let (batch, seq_size, _) = emissions.dims3()?;
        let lens = seq_lens(mask)?;
        if seq_size == 0 {
            return Ok(vec![Vec::new(); batch]);
        }

        // delta: [batch, num_tags]; history[t-1]: argmax over prev per (row, cur)
        let mut delta = step(emissions, 0)?.broadcast_add(&self.start)?;
        let mut history: Vec<Vec<Vec<u32>>> = Vec::with_capacity(seq_size.saturating_sub(1));

        for t in 1..seq_size {
            let candidates = delta
                .unsqueeze(2)?
                .broadcast_add(&self.transitions)?
                .broadcast_add(&step(emissions, t)?.unsqueeze(1)?)?;
            let best = candidates.max(1)?;
            let backptr = candidates.argmax(1)?;

            let keep = mask
                .narrow(1, t, 1)?
                .broadcast_as(best.shape())?
                .contiguous()?;
            delta = keep.where_cond(&best, &delta)?;
            history.push(backptr.to_vec2::<u32>()?);
        }

        // delta is frozen at each row's last real position; add end scores.
        let final_scores = delta.broadcast_add(&self.end)?.to_vec2::<f32>()?;

        let mut decoded = Vec::with_capacity(batch);
        for (row, &len) in lens.iter().enumerate() {
            if len == 0 {
                decoded.push(Vec::new());
                continue;
            }

            let mut best_tag = argmax_f32(&final_scores[row]);
            let mut tags = Vec::with_capacity(len);
            tags.push(best_tag as u32);
            for backptr in history[..len - 1].iter().rev() {
                best_tag = backptr[row][best_tag] as usize;
                tags.push(best_tag as u32);
            }
            tags.reverse();
            decoded.push(tags);
        }

        Ok(decoded)
    }
}

/// Emission scores at one time step, `[batch, num_tags]`.
fn step(emissions: &Tensor, t: usize) -> Result<Tensor> {
    Ok(emissions.narrow(1, t, 1)?.squeeze(1)?)
}

/// Real length of each mask row.
fn seq_lens(mask: &Tensor) -> Result<Vec<usize>> {
    let sums = mask.to_dtype(DType::U32)?.sum(1)?.to_vec1::<u32>()?;
    Ok(sums.into_iter().map(|n| n as usize).collect())
}

/// `out[b] = src[b][idx[b]]` for a `[batch, n]` tensor and `[batch]` index.
fn gather_cols(src: &Tensor, idx: &Tensor) -> Result<Tensor> {
    Ok(src
        .contiguous()?
        .gather(&idx.unsqueeze(1)?.contiguous()?, 1)?
        .squeeze(1)?)
}

/// `out[b] = src[idx[b]]` for a `[n]` or `[n, m]` tensor and `[batch]` index.
fn select_rows(src: &Tensor, idx: &Tensor) -> Result<Tensor> {
    Ok(src.index_select(&idx.contiguous()?, 0)?)
}

fn argmax_f32(scores: &[f32]) -> usize {
    let mut best = 0;
    for (i, &score) in scores.iter().enumerate() {
        if score > scores[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    const NUM_TAGS: usize = 3;
    const EPSILON: f32 = 1e-4;

    fn fixture_crf() -> LinearChainCrf {
        let dev = Device::Cpu;
        let start = Tensor::new(&[0.2_f32, -0.1, 0.4], &dev).unwrap();
        let end = Tensor::new(&[-0.3_f32, 0.5, 0.1], &dev).unwrap();
        let transitions = Tensor::new(
            &[
                [0.1_f32, 0.6, -0.4],
                [-0.2, 0.3, 0.8],
                [0.5, -0.7, 0.2],
            ],
            &dev,
        )
        .unwrap();
        LinearChainCrf::from_tensors(start, end, transitions).unwrap()
    }

    fn emissions(rows: &[Vec<[f32; NUM_TAGS]>]) -> Tensor {
        let batch = rows.len();
        let seq = rows[0].len();
        let flat: Vec<f32> = rows.iter().flatten().flatten().copied().collect();
        Tensor::from_vec(flat, (batch, seq, NUM_TAGS), &Device::Cpu).unwrap()
    }

    fn mask(rows: &[Vec<u8>]) -> Tensor {
        let batch = rows.len();
        let seq = rows[0].len();
        let flat: Vec<u8> = rows.iter().flatten().copied().collect();
        Tensor::from_vec(flat, (batch, seq), &Device::Cpu).unwrap()
    }

    /// Hand-computed score of one complete tag path.
    fn path_score(crf: &LinearChainCrf, emit: &[[f32; NUM_TAGS]], path: &[usize]) -> f32 {
        let start = crf.start.to_vec1::<f32>().unwrap();
        let end = crf.end.to_vec1::<f32>().unwrap();
        let trans = crf.transitions.to_vec2::<f32>().unwrap();

        let mut score = start[path[0]] + emit[0][path[0]];
        for t in 1..path.len() {
            score += trans[path[t - 1]][path[t]] + emit[t][path[t]];
        }
        score + end[path[path.len() - 1]]
    }

    fn all_paths(len: usize) -> Vec<Vec<usize>> {
        let mut paths = vec![Vec::new()];
        for _ in 0..len {
            paths = paths
                .into_iter()
                .flat_map(|p| {
                    (0..NUM_TAGS).map(move |tag| {
                        let mut q = p.clone();
                        q.push(tag);
                        q
                    })
                })
                .collect();
        }
        paths
    }

    #[test]
    fn viterbi_matches_brute_force() {
        let crf = fixture_crf();
        let emit = vec![
            [1.3_f32, -0.2, 0.7],
            [0.1, 0.9, -1.1],
            [-0.5, 0.2, 0.6],
            [0.8, 0.3, -0.9],
        ];
        let em = emissions(&[emit.clone()]);
        let m = mask(&[vec![1, 1, 1, 1]]);

        let decoded = crf.decode(&em, &m).unwrap();
        let got: Vec<usize> = decoded[0].iter().map(|&t| t as usize).collect();
        let got_score = path_score(&crf, &emit, &got);

        for path in all_paths(4) {
            assert!(
                got_score >= path_score(&crf, &emit, &path) - EPSILON,
                "path {path:?} beats decoded {got:?}"
            );
        }
    }

    #[test]
    fn viterbi_respects_mask_length() {
        let crf = fixture_crf();
        let emit = vec![[0.4_f32, 1.2, -0.3], [0.9, -0.1, 0.2], [0.0, 0.0, 0.0]];
        let em = emissions(&[emit.clone()]);
        let m = mask(&[vec![1, 1, 0]]);

        let decoded = crf.decode(&em, &m).unwrap();
        assert_eq!(decoded[0].len(), 2);

        // Best over the real prefix only.
        let got: Vec<usize> = decoded[0].iter().map(|&t| t as usize).collect();
        let got_score = path_score(&crf, &emit[..2], &got);
        for path in all_paths(2) {
            assert!(got_score >= path_score(&crf, &emit[..2], &path) - EPSILON);
        }
    }

    #[test]
    fn decode_ignores_pad_region_content() {
        let crf = fixture_crf();
        let real = vec![[1.0_f32, -0.4, 0.2], [0.3, 0.8, -0.6]];

        let mut with_zeros = real.clone();
        with_zeros.push([0.0, 0.0, 0.0]);
        with_zeros.push([0.0, 0.0, 0.0]);

        let mut with_junk = real.clone();
        with_junk.push([1e30, -1e30, 42.0]);
        with_junk.push([f32::NAN, f32::NAN, f32::NAN]);

        let m = mask(&[vec![1, 1, 0, 0]]);
        let a = crf.decode(&emissions(&[with_zeros]), &m).unwrap();
        let b = crf.decode(&emissions(&[with_junk]), &m).unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 2);
    }

    #[test]
    fn fully_masked_sequence_decodes_empty() {
        let crf = fixture_crf();
        let em = emissions(&[
            vec![[0.1_f32, 0.2, 0.3], [0.4, 0.5, 0.6]],
            vec![[0.7, 0.8, 0.9], [1.0, 1.1, 1.2]],
        ]);
        let m = mask(&[vec![1, 1], vec![0, 0]]);

        let decoded = crf.decode(&em, &m).unwrap();
        assert_eq!(decoded[0].len(), 2);
        assert!(decoded[1].is_empty());
    }

    #[test]
    fn partition_matches_brute_force_sum() {
        let crf = fixture_crf();
        let emit = vec![[0.5_f32, -0.2, 0.9], [0.3, 1.1, -0.7], [-0.4, 0.6, 0.1]];
        let em = emissions(&[emit.clone()]);
        let m = mask(&[vec![1, 1, 1]]);

        let log_z = crf.partition(&em, &m).unwrap().to_vec1::<f32>().unwrap()[0];

        let brute: f64 = all_paths(3)
            .iter()
            .map(|path| (path_score(&crf, &emit, path) as f64).exp())
            .sum();
        assert!((log_z as f64 - brute.ln()).abs() < EPSILON as f64);
    }

    #[test]
    fn partition_uses_real_prefix_only() {
        let crf = fixture_crf();
        let emit = vec![[0.5_f32, -0.2, 0.9], [0.3, 1.1, -0.7], [9.0, 9.0, 9.0]];
        let em = emissions(&[emit.clone()]);
        let m = mask(&[vec![1, 1, 0]]);

        let log_z = crf.partition(&em, &m).unwrap().to_vec1::<f32>().unwrap()[0];

        let brute: f64 = all_paths(2)
            .iter()
            .map(|path| (path_score(&crf, &emit[..2], path) as f64).exp())
            .sum();
        assert!((log_z as f64 - brute.ln()).abs() < EPSILON as f64);
    }

    #[test]
    fn log_likelihood_is_normalized() {
        let crf = fixture_crf();
        let emit = vec![[0.2_f32, 0.7, -0.1], [1.0, -0.3, 0.4]];
        let em = emissions(&[emit.clone()]);
        let m = mask(&[vec![1, 1]]);

        // Summing exp(llh) over every possible gold path must give 1.
        let mut total = 0.0_f64;
        for path in all_paths(2) {
            let tags: Vec<u32> = path.iter().map(|&t| t as u32).collect();
            let tags = Tensor::from_vec(tags, (1, 2), &Device::Cpu).unwrap();
            let llh = crf
                .log_likelihood(&em, &tags, &m, Reduction::Sum)
                .unwrap()
                .to_scalar::<f32>()
                .unwrap();
            total += (llh as f64).exp();
        }
        assert!((total - 1.0).abs() < 1e-3);
    }

    #[test]
    fn log_likelihood_mean_reduces_batch() {
        let crf = fixture_crf();
        let emit_rows = vec![
            vec![[0.2_f32, 0.7, -0.1], [1.0, -0.3, 0.4]],
            vec![[0.6, -0.8, 0.3], [0.1, 0.5, 0.9]],
        ];
        let em = emissions(&emit_rows);
        let m = mask(&[vec![1, 1], vec![1, 1]]);
        let tags = Tensor::from_vec(vec![0_u32, 1, 2, 2], (2, 2), &Device::Cpu).unwrap();

        let per_seq = crf
            .log_likelihood(&em, &tags, &m, Reduction::None)
            .unwrap()
            .to_vec1::<f32>()
            .unwrap();
        let mean = crf
            .log_likelihood(&em, &tags, &m, Reduction::Mean)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        assert!((mean - (per_seq[0] + per_seq[1]) / 2.0).abs() < EPSILON);
    }

    #[test]
    fn shape_mismatch_is_fatal() {
        let crf = fixture_crf();
        let em = emissions(&[vec![[0.0_f32; NUM_TAGS]; 3]]);
        let m = mask(&[vec![1, 1]]);
        assert!(matches!(
            crf.decode(&em, &m),
            Err(KusariError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn zero_tags_rejected() {
        let dev = Device::Cpu;
        let empty = Tensor::zeros(0, DType::F32, &dev).unwrap();
        let trans = Tensor::zeros((0, 0), DType::F32, &dev).unwrap();
        assert!(LinearChainCrf::from_tensors(empty.clone(), empty, trans).is_err());
    }
}
