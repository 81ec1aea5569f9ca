//! Evaluation configuration.
//!
//! One immutable value constructed at startup and passed by reference.
//! Device and thread count are plain fields, not ambient state.

use std::path::Path;

use candle_core::Device;
use serde::Deserialize;

use crate::crf::Reduction;
use crate::error::Result;

fn default_seq_size() -> usize {
    180
}

fn default_batch_size() -> usize {
    32
}

fn default_label() -> String {
    "O".to_string()
}

fn default_num_threads() -> usize {
    1
}

fn cpu_device() -> Device {
    Device::Cpu
}

/// Immutable evaluation-time configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EvalConfig {
    /// Fixed padded sequence width of every batch.
    #[serde(default = "default_seq_size")]
    pub seq_size: usize,

    /// Number of sequences per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Reserved id marking a padding position in the token stream.
    #[serde(default)]
    pub pad_token_id: u32,

    /// Reserved id marking a padding position in the label stream.
    #[serde(default)]
    pub pad_label_id: u32,

    /// Label written for tokens truncated out by `seq_size`.
    #[serde(default = "default_label")]
    pub default_label: String,

    /// Token vocabulary size for the lexical scorer.
    #[serde(default)]
    pub token_vocab_size: usize,

    /// Token embedding dimension for the lexical scorer.
    #[serde(default)]
    pub token_emb_dim: usize,

    /// POS vocabulary size for the lexical scorer.
    #[serde(default)]
    pub pos_vocab_size: usize,

    /// POS embedding dimension for the lexical scorer.
    #[serde(default)]
    pub pos_emb_dim: usize,

    /// Log-likelihood reduction across the batch.
    #[serde(default)]
    pub reduction: Reduction,

    /// Worker threads for batch production.
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,

    /// Compute device. Not part of the config file; set after loading.
    #[serde(skip, default = "cpu_device")]
    pub device: Device,
}

impl EvalConfig {
    /// Load a configuration from a JSON file.
    ///
    /// Missing fields fall back to defaults; a malformed file is a fatal
    /// configuration error.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: EvalConfig = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Replace the compute device.
    #[must_use]
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            seq_size: default_seq_size(),
            batch_size: default_batch_size(),
            pad_token_id: 0,
            pad_label_id: 0,
            default_label: default_label(),
            token_vocab_size: 0,
            token_emb_dim: 0,
            pos_vocab_size: 0,
            pos_emb_dim: 0,
            reduction: Reduction::default(),
            num_threads: default_num_threads(),
            device: Device::Cpu,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EvalConfig::default();
        assert_eq!(config.pad_token_id, 0);
        assert_eq!(config.default_label, "O");
        assert!(config.seq_size > 0);
    }

    #[test]
    fn deserializes_partial_json() {
        let config: EvalConfig =
            serde_json::from_str(r#"{"seq_size": 64, "batch_size": 8}"#).unwrap();
        assert_eq!(config.seq_size, 64);
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.default_label, "O");
    }

    #[test]
    fn rejects_malformed_json() {
        let parsed: std::result::Result<EvalConfig, _> = serde_json::from_str("{not json");
        assert!(parsed.is_err());
    }
}
