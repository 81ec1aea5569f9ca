//! Evaluation CLI
//!
//! Runs one unshuffled pass over an encoded test set, reports entity-span
//! metrics and timing, and writes predictions aligned to the original
//! column-format file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::distilbert::Config as BertConfig;
use clap::Parser;
use tracing::{info, warn};

use kusari_core::{
    BertScorer, EmbeddingSource, EvalConfig, LabelDict, LexicalScorer, LinearChainCrf, TagScorer,
};
use kusari_eval::conll;
use kusari_eval::dataset::EncodedDataset;
use kusari_eval::runner::{Decoder, Evaluator};

/// CLI arguments
#[derive(Parser)]
#[command(name = "evaluate")]
#[command(about = "Evaluate a sequence-labeling model on an encoded test set")]
#[command(version)]
struct Cli {
    /// Encoded test set (token/POS/label id columns)
    #[arg(long, default_value = "data/conll2003/test.txt.ids")]
    data_path: PathBuf,

    /// Original column-format test file for prediction alignment
    #[arg(long)]
    text_path: Option<PathBuf>,

    /// Label dictionary ("<tag> <id>" per line)
    #[arg(long, default_value = "data/conll2003/label.txt")]
    label_path: PathBuf,

    /// Prediction output file
    #[arg(long, default_value = "data/conll2003/pred.txt")]
    pred_path: PathBuf,

    /// Evaluation config JSON
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Model checkpoint (safetensors)
    #[arg(long, default_value = "model.safetensors")]
    model_path: PathBuf,

    /// DistilBERT config JSON, required with --emb-class bert
    #[arg(long)]
    bert_config: Option<PathBuf>,

    /// Embedding source: lexical | bert
    #[arg(long, default_value = "lexical")]
    emb_class: String,

    /// Decode jointly with the CRF instead of per-token argmax
    #[arg(long)]
    use_crf: bool,

    /// Compute device: cpu | cuda
    #[arg(long, default_value = "cpu")]
    device: String,

    /// Override the configured batch size
    #[arg(long)]
    batch_size: Option<usize>,
}

fn parse_device(name: &str) -> Result<Device> {
    match name {
        "cpu" => Ok(Device::Cpu),
        "cuda" => Device::new_cuda(0).context("cuda device unavailable"),
        other => anyhow::bail!("unknown device {other:?}, expected \"cpu\" or \"cuda\""),
    }
}

fn load_config(cli: &Cli) -> Result<EvalConfig> {
    let mut config = if cli.config.exists() {
        EvalConfig::from_file(&cli.config)
            .with_context(|| format!("loading config from {:?}", cli.config))?
    } else {
        warn!(path = ?cli.config, "config file missing, using defaults");
        EvalConfig::default()
    };
    if let Some(batch_size) = cli.batch_size {
        config.batch_size = batch_size;
    }
    Ok(config.with_device(parse_device(&cli.device)?))
}

fn build_scorer(
    cli: &Cli,
    vb: VarBuilder,
    config: &EvalConfig,
    num_tags: usize,
) -> Result<Box<dyn TagScorer>> {
    let source: EmbeddingSource = cli.emb_class.parse()?;
    match source {
        EmbeddingSource::Lexical => Ok(Box::new(LexicalScorer::load(vb, config, num_tags)?)),
        EmbeddingSource::Bert => {
            let path = cli
                .bert_config
                .as_ref()
                .context("--bert-config is required with --emb-class bert")?;
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading bert config {path:?}"))?;
            let bert_config: BertConfig =
                serde_json::from_str(&text).context("parsing bert config")?;
            Ok(Box::new(BertScorer::load(vb, &bert_config, num_tags)?))
        }
    }
}

fn write_aligned_predictions(cli: &Cli, config: &EvalConfig, pred_tags: &[Vec<String>]) {
    let Some(text_path) = &cli.text_path else {
        return;
    };

    // Metrics are already computed; an I/O failure here must not lose them.
    let result = conll::read_sentences(text_path).and_then(|sentences| {
        conll::write_predictions(&cli.pred_path, &sentences, pred_tags, &config.default_label)
    });
    match result {
        Ok(()) => info!(path = ?cli.pred_path, "predictions written"),
        Err(e) => warn!("failed to write predictions: {e}"),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    let labels = LabelDict::load(&cli.label_path)
        .with_context(|| format!("loading labels from {:?}", cli.label_path))?;
    let dataset = EncodedDataset::load(&cli.data_path)
        .with_context(|| format!("loading dataset from {:?}", cli.data_path))?;
    info!(
        sentences = dataset.len(),
        num_tags = labels.num_tags(),
        threads = config.num_threads,
        "test data loaded"
    );

    let vb = unsafe {
        VarBuilder::from_mmaped_safetensors(&[&cli.model_path], DType::F32, &config.device)
            .with_context(|| format!("loading checkpoint {:?}", cli.model_path))?
    };
    let scorer = build_scorer(&cli, vb.clone(), &config, labels.num_tags())?;
    let decoder = if cli.use_crf {
        Decoder::Crf(LinearChainCrf::load(vb, labels.num_tags())?)
    } else {
        Decoder::Argmax
    };
    info!("model loaded");

    let evaluator = Evaluator::new(&labels, scorer.as_ref(), decoder);
    let outcome = evaluator.run(dataset.batches(&config))?;

    write_aligned_predictions(&cli, &config, &outcome.pred_tags);

    println!("{}", serde_json::to_string_pretty(&outcome.report)?);
    Ok(())
}
