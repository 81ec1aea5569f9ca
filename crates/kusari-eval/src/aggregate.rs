//! # Batch Aggregator
//!
//! Accumulates per-batch decoded and gold label sequences into
//! full-dataset arrays in first-seen batch order, and tracks wall-clock
//! timing. Evaluation must run unshuffled so downstream alignment to the
//! raw input file holds.

use std::time::Duration;

use kusari_core::{KusariError, Result};

/// Ordered accumulator for one evaluation pass.
///
/// The first batch's elapsed time reflects one-time warm-up cost, so it
/// and its examples are excluded from the per-example average while still
/// counting toward the totals.
#[derive(Debug, Default)]
pub struct Aggregator {
    preds: Vec<Vec<u32>>,
    golds: Vec<Vec<u32>>,
    total_examples: usize,
    total_elapsed: Duration,
    warmup_elapsed: Duration,
    warmup_examples: usize,
    batches: usize,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one batch of decoded and gold sequences.
    ///
    /// Sequences are appended in the order given; callers must feed
    /// batches in file order.
    pub fn push(
        &mut self,
        preds: Vec<Vec<u32>>,
        golds: Vec<Vec<u32>>,
        elapsed: Duration,
    ) -> Result<()> {
        if preds.len() != golds.len() {
            return Err(KusariError::ShapeMismatch(format!(
                "batch has {} predictions but {} gold sequences",
                preds.len(),
                golds.len()
            )));
        }

        let examples = preds.len();
        if self.batches == 0 {
            self.warmup_elapsed = elapsed;
            self.warmup_examples = examples;
        }
        self.batches += 1;
        self.total_examples += examples;
        self.total_elapsed += elapsed;
        self.preds.extend(preds);
        self.golds.extend(golds);
        Ok(())
    }

    /// Total number of sequences seen, warm-up included.
    pub fn total_examples(&self) -> usize {
        self.total_examples
    }

    /// Total elapsed wall-clock time in milliseconds, warm-up included.
    pub fn elapsed_ms(&self) -> u128 {
        self.total_elapsed.as_millis()
    }

    /// Average per-example time in milliseconds, excluding the first
    /// batch's time and examples.
    ///
    /// `None` when no examples remain after the exclusion.
    pub fn average_ms(&self) -> Option<f64> {
        let examples = self.total_examples - self.warmup_examples;
        if examples == 0 {
            return None;
        }
        let elapsed = self.total_elapsed - self.warmup_elapsed;
        Some(elapsed.as_secs_f64() * 1000.0 / examples as f64)
    }

    /// Consume the aggregator, yielding (predictions, golds) in
    /// first-seen order.
    pub fn into_sequences(self) -> (Vec<Vec<u32>>, Vec<Vec<u32>>) {
        (self.preds, self.golds)
    }
}
