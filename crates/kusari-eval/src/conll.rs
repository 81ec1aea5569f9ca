//! # CoNLL Alignment
//!
//! Reads the original column-format input file independently of the
//! tensorized path and writes predictions back against it: every token
//! line gets the decoded tag appended as a new column, tokens truncated
//! out by the batching limit get a default label, and the output mirrors
//! the input line-for-line.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use kusari_core::{KusariError, Result};

/// Read a CoNLL-style file into raw token lines grouped by sentence.
///
/// Sentences are separated by blank lines; token lines are kept verbatim
/// so all original columns survive the round trip.
pub fn read_sentences<P: AsRef<Path>>(path: P) -> Result<Vec<Vec<String>>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut sentences = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            if !current.is_empty() {
                sentences.push(std::mem::take(&mut current));
            }
            continue;
        }
        current.push(line);
    }
    if !current.is_empty() {
        sentences.push(current);
    }

    Ok(sentences)
}

/// Write predictions aligned to the original token lines.
///
/// For sentence `i`, token `j` gets `predictions[i][j]` appended as a new
/// column; tokens beyond the prediction length (dropped by truncation)
/// get `default_label` so the output line count matches the input
/// exactly. A blank line separates sentences.
pub fn write_predictions<P: AsRef<Path>>(
    path: P,
    sentences: &[Vec<String>],
    predictions: &[Vec<String>],
    default_label: &str,
) -> Result<()> {
    if sentences.len() != predictions.len() {
        return Err(KusariError::ShapeMismatch(format!(
            "{} input sentences but {} predicted sequences",
            sentences.len(),
            predictions.len()
        )));
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    for (lines, tags) in sentences.iter().zip(predictions) {
        for (j, line) in lines.iter().enumerate() {
            let tag = tags.get(j).map(String::as_str).unwrap_or(default_label);
            writeln!(writer, "{line} {tag}")?;
        }
        writeln!(writer)?;
    }
    writer.flush()?;

    Ok(())
}
