//! # Span-Level Evaluation
//!
//! Entity-span extraction from BIO tag sequences and exact-match
//! precision/recall/F1. A predicted entity counts only if its
//! (sentence, start, end, type) matches a gold entity exactly; partial
//! overlaps score as both a false positive and a false negative.

use std::collections::HashSet;

use serde::Serialize;

/// A contiguous entity span over token positions, end exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Span {
    pub label: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prefix {
    Begin,
    Inside,
    Outside,
}

fn parse_tag(tag: &str) -> (Prefix, &str) {
    match tag.split_once('-') {
        Some(("B", ty)) => (Prefix::Begin, ty),
        Some(("I", ty)) => (Prefix::Inside, ty),
        _ => (Prefix::Outside, ""),
    }
}

fn starts_chunk(prev: (Prefix, &str), cur: (Prefix, &str)) -> bool {
    match cur.0 {
        Prefix::Begin => true,
        // Lenient mode: I after O, or after a different type, opens a chunk.
        Prefix::Inside => prev.0 == Prefix::Outside || prev.1 != cur.1,
        Prefix::Outside => false,
    }
}

fn ends_chunk(prev: (Prefix, &str), cur: (Prefix, &str)) -> bool {
    if prev.0 == Prefix::Outside {
        return false;
    }
    match cur.0 {
        Prefix::Begin | Prefix::Outside => true,
        Prefix::Inside => prev.1 != cur.1,
    }
}

/// Extract entity spans from one BIO tag sequence.
pub fn entity_spans<S: AsRef<str>>(tags: &[S]) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut prev = (Prefix::Outside, "");
    let mut begin = 0;

    for i in 0..=tags.len() {
        let cur = match tags.get(i) {
            Some(tag) => parse_tag(tag.as_ref()),
            None => (Prefix::Outside, ""),
        };

        if ends_chunk(prev, cur) {
            spans.push(Span {
                label: prev.1.to_string(),
                start: begin,
                end: i,
            });
        }
        if starts_chunk(prev, cur) {
            begin = i;
        }
        prev = cur;
    }

    spans
}

/// Entity-level precision, recall and F1 over a full dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpanScores {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub correct: usize,
    pub predicted: usize,
    pub gold: usize,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

/// Score predicted tag sequences against gold tag sequences.
///
/// Both slices are parallel per-sentence lists; sentence index is part of
/// the span identity, so identical spans in different sentences never
/// match each other.
pub fn span_scores<S: AsRef<str>>(golds: &[Vec<S>], preds: &[Vec<S>]) -> SpanScores {
    let collect = |seqs: &[Vec<S>]| -> HashSet<(usize, Span)> {
        seqs.iter()
            .enumerate()
            .flat_map(|(i, tags)| entity_spans(tags).into_iter().map(move |s| (i, s)))
            .collect()
    };

    let gold_set = collect(golds);
    let pred_set = collect(preds);
    let correct = gold_set.intersection(&pred_set).count();

    let precision = ratio(correct, pred_set.len());
    let recall = ratio(correct, gold_set.len());
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };

    SpanScores {
        precision,
        recall,
        f1,
        correct,
        predicted: pred_set.len(),
        gold: gold_set.len(),
    }
}
