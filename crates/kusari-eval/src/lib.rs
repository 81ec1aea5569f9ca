//! # Kusari Eval
//!
//! Full-dataset evaluation for the Kusari sequence-labeling engine:
//! ordered batch aggregation with warm-up-aware timing, entity-span
//! precision/recall/F1, and prediction re-alignment to the original
//! CoNLL-style input file.
pub mod aggregate;
pub mod conll;
pub mod dataset;
pub mod metrics;
pub mod runner;

// Re-export primary API
pub use aggregate::Aggregator;
pub use dataset::{EncodedDataset, EncodedSentence};
pub use metrics::{Span, SpanScores, entity_spans, span_scores};
pub use runner::{Decoder, EvalOutcome, EvalReport, Evaluator};
