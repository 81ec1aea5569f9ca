//! # Evaluation Runner
//!
//! Drives one pass over the dataset: emission scoring, per-token or joint
//! decoding, ordered aggregation, and span-level scoring. A malformed
//! batch aborts the whole pass; totals and averages assume complete
//! coverage.

use std::time::Instant;

use candle_core::{DType, Tensor};
use kusari_core::{Batch, KusariError, LabelDict, LinearChainCrf, Result, TagScorer};
use serde::Serialize;
use tracing::info;

use crate::aggregate::Aggregator;
use crate::metrics::span_scores;

/// How emission scores become a tag sequence.
///
/// Chosen once at startup: independent per-token argmax or joint Viterbi
/// decoding under the CRF's transition model.
pub enum Decoder {
    Argmax,
    Crf(LinearChainCrf),
}

impl Decoder {
    /// Decode one batch of emissions under the mask.
    ///
    /// Every returned sequence has exactly one tag id per real token.
    pub fn decode(&self, emissions: &Tensor, mask: &Tensor) -> Result<Vec<Vec<u32>>> {
        match self {
            Decoder::Crf(crf) => crf.decode(emissions, mask),
            Decoder::Argmax => {
                let ids = emissions.argmax(2)?.to_vec2::<u32>()?;
                let lens = mask
                    .to_dtype(DType::U32)?
                    .sum(1)?
                    .to_vec1::<u32>()?;
                Ok(ids
                    .into_iter()
                    .zip(lens)
                    .map(|(mut row, len)| {
                        row.truncate(len as usize);
                        row
                    })
                    .collect())
            }
        }
    }
}

/// Metrics reported for one evaluation pass.
#[derive(Debug, Clone, Serialize)]
pub struct EvalReport {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub total_examples: usize,
    pub elapsed_ms: u128,
    /// Per-example average excluding first-batch warm-up; absent when no
    /// examples remain after the exclusion.
    pub avg_ms: Option<f64>,
}

/// Everything one pass produces: the report plus aligned tag strings.
pub struct EvalOutcome {
    pub report: EvalReport,
    pub gold_tags: Vec<Vec<String>>,
    pub pred_tags: Vec<Vec<String>>,
}

/// One evaluation pass over an ordered batch stream.
pub struct Evaluator<'a> {
    labels: &'a LabelDict,
    scorer: &'a dyn TagScorer,
    decoder: Decoder,
}

impl<'a> Evaluator<'a> {
    pub fn new(labels: &'a LabelDict, scorer: &'a dyn TagScorer, decoder: Decoder) -> Self {
        Self {
            labels,
            scorer,
            decoder,
        }
    }

    /// Consume batches in order and score the full dataset.
    pub fn run<I>(&self, batches: I) -> Result<EvalOutcome>
    where
        I: IntoIterator<Item = Result<Batch>>,
    {
        let mut aggregator = Aggregator::new();

        for batch in batches {
            let started = Instant::now();
            let batch = batch?;
            let emissions = self.scorer.emissions(&batch)?;
            let preds = self.decoder.decode(&emissions, batch.mask())?;
            let golds = batch.gold_rows()?;
            aggregator.push(preds, golds, started.elapsed())?;
        }

        let total_examples = aggregator.total_examples();
        let elapsed_ms = aggregator.elapsed_ms();
        let avg_ms = aggregator.average_ms();
        let (preds, golds) = aggregator.into_sequences();

        let pred_tags = self.to_tags(&preds)?;
        let gold_tags = self.to_tags(&golds)?;
        let scores = span_scores(&gold_tags, &pred_tags);

        info!(
            f1 = scores.f1,
            precision = scores.precision,
            recall = scores.recall,
            total_examples,
            "evaluation pass complete"
        );

        Ok(EvalOutcome {
            report: EvalReport {
                precision: scores.precision,
                recall: scores.recall,
                f1: scores.f1,
                total_examples,
                elapsed_ms,
                avg_ms,
            },
            gold_tags,
            pred_tags,
        })
    }

    fn to_tags(&self, sequences: &[Vec<u32>]) -> Result<Vec<Vec<String>>> {
        sequences
            .iter()
            .map(|seq| {
                seq.iter()
                    .map(|&id| {
                        self.labels.tag(id).map(str::to_string).ok_or_else(|| {
                            KusariError::InvalidConfig(format!(
                                "decoded tag id {id} is outside the label dictionary"
                            ))
                        })
                    })
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use kusari_core::EvalConfig;

    use crate::dataset::EncodedDataset;

    /// Scores each token one-hot by `token_id % num_tags`, making decoding
    /// a pure function of the input ids.
    struct StubScorer {
        num_tags: usize,
    }

    impl TagScorer for StubScorer {
        fn emissions(&self, batch: &Batch) -> Result<Tensor> {
            let tokens = batch.token_ids().to_vec2::<u32>().unwrap();
            let (rows, seq) = batch.token_ids().dims2()?;
            let mut flat = vec![0.0_f32; rows * seq * self.num_tags];
            for (i, row) in tokens.iter().enumerate() {
                for (j, &id) in row.iter().enumerate() {
                    let tag = id as usize % self.num_tags;
                    flat[(i * seq + j) * self.num_tags + tag] = 1.0;
                }
            }
            Ok(Tensor::from_vec(
                flat,
                (rows, seq, self.num_tags),
                &Device::Cpu,
            )?)
        }

        fn num_tags(&self) -> usize {
            self.num_tags
        }
    }

    fn write_labels() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("kusari-runner-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("label.txt");
        std::fs::write(&path, "O 0\nB-PER 1\nI-PER 2\n").unwrap();
        path
    }

    fn write_dataset(name: &str, body: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("kusari-runner-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    // Token id mod 3 is the predicted tag; gold column is the third value.
    const DATA: &str = "4 1 1\n5 1 2\n\n3 1 0\n7 1 1\n5 1 2\n\n6 1 0\n\n4 1 1\n6 1 0\n";

    fn run_with_batch_size(batch_size: usize) -> EvalOutcome {
        let labels = LabelDict::load(write_labels()).unwrap();
        let dataset = EncodedDataset::load(write_dataset("data.ids", DATA)).unwrap();
        let config = EvalConfig {
            seq_size: 4,
            batch_size,
            ..EvalConfig::default()
        };
        let scorer = StubScorer { num_tags: 3 };
        let evaluator = Evaluator::new(&labels, &scorer, Decoder::Argmax);
        evaluator.run(dataset.batches(&config)).unwrap()
    }

    #[test]
    fn argmax_predictions_follow_emissions() {
        let outcome = run_with_batch_size(4);
        assert_eq!(outcome.pred_tags[0], vec!["B-PER", "I-PER"]);
        assert_eq!(outcome.pred_tags[1], vec!["O", "B-PER", "I-PER"]);
        assert_eq!(outcome.pred_tags[2], vec!["O"]);
    }

    #[test]
    fn batch_size_does_not_change_results() {
        let one = run_with_batch_size(1);
        let four = run_with_batch_size(4);
        assert_eq!(one.pred_tags, four.pred_tags);
        assert_eq!(one.gold_tags, four.gold_tags);
        assert_eq!(one.report.f1, four.report.f1);
        assert_eq!(one.report.total_examples, four.report.total_examples);
    }

    #[test]
    fn gold_and_pred_lengths_match_per_sentence() {
        let outcome = run_with_batch_size(2);
        for (gold, pred) in outcome.gold_tags.iter().zip(&outcome.pred_tags) {
            assert_eq!(gold.len(), pred.len());
        }
    }

    #[test]
    fn crf_with_zero_transitions_matches_argmax() {
        let labels = LabelDict::load(write_labels()).unwrap();
        let dataset = EncodedDataset::load(write_dataset("crf.ids", DATA)).unwrap();
        let config = EvalConfig {
            seq_size: 4,
            batch_size: 2,
            ..EvalConfig::default()
        };
        let scorer = StubScorer { num_tags: 3 };

        let dev = Device::Cpu;
        let zeros = |shape: &[usize]| Tensor::zeros(shape, DType::F32, &dev).unwrap();
        let crf =
            LinearChainCrf::from_tensors(zeros(&[3]), zeros(&[3]), zeros(&[3, 3])).unwrap();

        let viterbi = Evaluator::new(&labels, &scorer, Decoder::Crf(crf))
            .run(dataset.batches(&config))
            .unwrap();
        let argmax = Evaluator::new(&labels, &scorer, Decoder::Argmax)
            .run(dataset.batches(&config))
            .unwrap();
        assert_eq!(viterbi.pred_tags, argmax.pred_tags);
    }

    #[test]
    fn malformed_batch_aborts_pass() {
        let labels = LabelDict::load(write_labels()).unwrap();
        let scorer = StubScorer { num_tags: 3 };
        let evaluator = Evaluator::new(&labels, &scorer, Decoder::Argmax);

        let batches = vec![Err(KusariError::ShapeMismatch("broken batch".into()))];
        assert!(evaluator.run(batches).is_err());
    }
}
