use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

use crate::api_types::{ApiAnnotation, ApiEntity};
use crate::models::{AttributeBundle, Emotions, Vocabulary};
use crate::normalize::canonical_word;

/// Words shorter than this (in bytes) never enter a vocabulary.
pub const MIN_WORD_BYTES: usize = 3;

/// Outcome counters for folding one or more annotations into a vocabulary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub candidates: usize,
    pub inserted: usize,
    pub short: usize,
    pub duplicate: usize,
}

impl ParseStats {
    pub fn merge(&mut self, other: ParseStats) {
        self.candidates += other.candidates;
        self.inserted += other.inserted;
        self.short += other.short;
        self.duplicate += other.duplicate;
    }
}

/// Read and decode one annotation file.
pub fn load_annotation_file(path: &Path) -> Result<ApiAnnotation> {
    let raw = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let ann: ApiAnnotation =
        serde_json::from_slice(&raw).with_context(|| format!("decoding JSON for {}", path.display()))?;
    Ok(ann)
}

/// `entities` wins over `keywords`; neither means nothing to parse.
pub fn entity_list(ann: &ApiAnnotation) -> &[ApiEntity] {
    ann.entities
        .as_deref()
        .or(ann.keywords.as_deref())
        .unwrap_or(&[])
}

/// Attribute bundle shared by every token of one entity.
pub fn entity_bundle(entity: &ApiEntity) -> AttributeBundle {
    let relevance = coerce_f32(&entity.relevance);
    let sentiment = entity
        .sentiment
        .as_ref()
        .map(|s| coerce_f32(&s.score))
        .unwrap_or(0.0);
    let emotions = entity
        .emotion
        .as_ref()
        .map(|e| Emotions {
            anger: coerce_f32(&e.anger),
            disgust: coerce_f32(&e.disgust),
            fear: coerce_f32(&e.fear),
            joy: coerce_f32(&e.joy),
            sadness: coerce_f32(&e.sadness),
        })
        .unwrap_or_default();
    AttributeBundle::new(relevance, sentiment, emotions)
}

/// Every whitespace-separated token of every entity, normalized, each with
/// its parent entity's attributes. Order follows the document.
pub fn annotation_candidates(ann: &ApiAnnotation) -> Vec<(String, AttributeBundle)> {
    let mut out = Vec::new();
    for entity in entity_list(ann) {
        let Some(text) = entity.text.as_deref() else {
            continue;
        };
        let bundle = entity_bundle(entity);
        for token in text.split_whitespace() {
            out.push((canonical_word(token), bundle.clone()));
        }
    }
    out
}

/// Fold one annotation into `words`: short words are dropped and the first
/// occurrence of a word wins.
pub fn parse_annotation(ann: &ApiAnnotation, words: &mut Vocabulary) -> ParseStats {
    let mut stats = ParseStats::default();
    for (word, bundle) in annotation_candidates(ann) {
        stats.candidates += 1;
        if word.len() < MIN_WORD_BYTES {
            debug!("Short word discarded: {:?}", word);
            stats.short += 1;
        } else if words.contains_key(&word) {
            debug!("Duplicate word discarded: {}", word);
            stats.duplicate += 1;
        } else {
            words.insert(word, bundle);
            stats.inserted += 1;
        }
    }
    stats
}

/// Numbers pass through, numeric strings are parsed, anything else is 0.0.
pub fn coerce_f32(v: &Value) -> f32 {
    let x = match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if x.is_finite() { x as f32 } else { 0.0 }
}
