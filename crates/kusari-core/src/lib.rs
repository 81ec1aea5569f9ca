//! # Kusari Core
//!
//! The structured tagging core of the Kusari sequence-labeling engine:
//! padded/masked batches, pluggable emission scorers, and a linear-chain
//! CRF with masked forward and Viterbi dynamic programming.
//!
//! ## Quick Start
//!
//! ```rust
//! use candle_core::{Device, Tensor};
//! use kusari_core::crf::LinearChainCrf;
//!
//! let dev = Device::Cpu;
//! let start = Tensor::zeros(3, candle_core::DType::F32, &dev).unwrap();
//! let end = Tensor::zeros(3, candle_core::DType::F32, &dev).unwrap();
//! let trans = Tensor::zeros((3, 3), candle_core::DType::F32, &dev).unwrap();
//! let crf = LinearChainCrf::from_tensors(start, end, trans).unwrap();
//!
//! // One sequence of two real tokens inside a width-3 batch.
//! let emissions = Tensor::zeros((1, 3, 3), candle_core::DType::F32, &dev).unwrap();
//! let mask = Tensor::new(&[[1_u8, 1, 0]], &dev).unwrap();
//! let decoded = crf.decode(&emissions, &mask).unwrap();
//! assert_eq!(decoded[0].len(), 2);
//! ```
pub mod batch;
pub mod config;
pub mod crf;
pub mod error;
pub mod labels;
pub mod scorer;

// Re-export primary API
pub use batch::Batch;
pub use config::EvalConfig;
pub use crf::{LinearChainCrf, Reduction};
pub use error::{KusariError, Result};
pub use labels::LabelDict;
pub use scorer::{BertScorer, EmbeddingSource, LexicalScorer, TagScorer};
