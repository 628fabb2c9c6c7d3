use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-word attributes carried over from the annotation that introduced the word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AttributeBundle {
    pub relevance: f32, // >= 0
    pub sentiment: f32, // [-1.0, 1.0]
    pub negative: f32,  // always -sentiment
    pub anger: f32,
    pub disgust: f32,
    pub fear: f32,
    pub joy: f32,
    pub sadness: f32,
    pub found: bool, // resolved in the pretrained table
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Emotions {
    pub anger: f32,
    pub disgust: f32,
    pub fear: f32,
    pub joy: f32,
    pub sadness: f32,
}

impl AttributeBundle {
    pub fn new(relevance: f32, sentiment: f32, emotions: Emotions) -> Self {
        Self {
            relevance,
            sentiment,
            negative: -sentiment,
            anger: emotions.anger,
            disgust: emotions.disgust,
            fear: emotions.fear,
            joy: emotions.joy,
            sadness: emotions.sadness,
            found: false,
        }
    }
}

/// Canonical word -> attributes, for one actor.
pub type Vocabulary = BTreeMap<String, AttributeBundle>;

/// One row of the cross-actor table.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct GlobalEntry {
    pub relevance: BTreeMap<String, f32>, // actor -> relevance
    pub found: bool,
}

impl GlobalEntry {
    pub fn shared(&self) -> usize {
        self.relevance.len()
    }
}

/// Words of every actor keyed once, with per-actor relevance.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct GlobalVocabulary {
    pub actors: Vec<String>, // processing order, used as column order
    pub entries: BTreeMap<String, GlobalEntry>,
}

/// Resolved words and their pretrained vectors, in table order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EmbeddingMatrix {
    pub words: Vec<String>,
    pub vectors: Vec<Vec<f32>>,
}

impl EmbeddingMatrix {
    pub fn push(&mut self, word: impl Into<String>, vector: Vec<f32>) {
        self.words.push(word.into());
        self.vectors.push(vector);
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn dim(&self) -> Option<usize> {
        self.vectors.first().map(Vec::len)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Centroid {
    pub label: String,
    pub vector: Vec<f32>,
}
