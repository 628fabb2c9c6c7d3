// src/viz_export.rs
//! Files handed to the embedding projector: TSV metadata and tensors, a
//! projector config and a JSON index of the run.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write as _;
use std::{fs, path::Path};

use crate::models::{EmbeddingMatrix, GlobalVocabulary, Vocabulary};
use crate::sprite::SPRITE_UNIT_SIZE;

pub const AGGREGATION: &str = "Aggregation";
pub const CENTROIDS: &str = "Centroids";
pub const PROJECTOR_CONFIG: &str = "projector_config.pbtxt";
pub const INDEX_FILE: &str = "footprints.index.json";

const ACTOR_HEADER: &str = "Word\tRelevance\tSentiment\t-Sentiment\tAnger\tDisgust\tFear\tJoy\tSadness";

pub fn metadata_file(name: &str) -> String {
    format!("{name}.tsv")
}

pub fn vectors_file(name: &str) -> String {
    format!("{name}.vectors.tsv")
}

pub fn sprite_file(name: &str) -> String {
    format!("{name}sprite.png")
}

/* -------------------------------------------------------------------------- */
/* TSV tables                                                                 */
/* -------------------------------------------------------------------------- */

/// Per-actor metadata: one row per matched word, in matrix order.
pub fn actor_metadata_tsv(words: &Vocabulary, matrix: &EmbeddingMatrix) -> String {
    let mut out = String::new();
    out.push_str(ACTOR_HEADER);
    out.push('\n');
    for word in &matrix.words {
        let Some(b) = words.get(word) else {
            continue;
        };
        let _ = writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            word, b.relevance, b.sentiment, b.negative, b.anger, b.disgust, b.fear, b.joy, b.sadness
        );
    }
    out
}

/// Cross-actor metadata: relevance per actor column (0 when the actor never
/// used the word) and the shared count.
pub fn aggregation_metadata_tsv(global: &GlobalVocabulary, matrix: &EmbeddingMatrix) -> String {
    let mut out = String::from("Word\t");
    for actor in &global.actors {
        out.push_str(actor);
        out.push('\t');
    }
    out.push_str("Shared\n");

    for word in &matrix.words {
        let Some(entry) = global.entries.get(word) else {
            continue;
        };
        out.push_str(word);
        out.push('\t');
        for actor in &global.actors {
            match entry.relevance.get(actor) {
                Some(r) => {
                    let _ = write!(out, "{}\t", r);
                }
                None => out.push_str("0\t"),
            }
        }
        let _ = writeln!(out, "{}", entry.shared());
    }
    out
}

/// Tab separated vectors, one row per matrix row.
pub fn vectors_tsv(matrix: &EmbeddingMatrix) -> String {
    let mut out = String::new();
    for v in &matrix.vectors {
        let row: Vec<String> = v.iter().map(|x| x.to_string()).collect();
        out.push_str(&row.join("\t"));
        out.push('\n');
    }
    out
}

/// Single-column metadata (no header) of row labels.
pub fn labels_tsv(labels: &[String]) -> String {
    let mut out = String::new();
    for l in labels {
        out.push_str(l);
        out.push('\n');
    }
    out
}

pub fn write_text(path: &Path, body: &str) -> Result<()> {
    fs::write(path, body).with_context(|| format!("writing {}", path.display()))
}

/* -------------------------------------------------------------------------- */
/* Projector config                                                           */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectorEmbedding {
    pub tensor_name: String,
    pub tensor_path: String,
    pub metadata_path: String,
    pub sprite_path: Option<String>,
}

impl ProjectorEmbedding {
    pub fn new(name: &str, sprite: bool) -> Self {
        Self {
            tensor_name: name.to_string(),
            tensor_path: vectors_file(name),
            metadata_path: metadata_file(name),
            sprite_path: sprite.then(|| sprite_file(name)),
        }
    }
}

/// Text-format `ProjectorConfig` understood by the TensorBoard projector.
pub fn projector_config(embeddings: &[ProjectorEmbedding]) -> String {
    let mut out = String::new();
    for e in embeddings {
        out.push_str("embeddings {\n");
        let _ = writeln!(out, "  tensor_name: {}", quoted(&e.tensor_name));
        let _ = writeln!(out, "  tensor_path: {}", quoted(&e.tensor_path));
        let _ = writeln!(out, "  metadata_path: {}", quoted(&e.metadata_path));
        if let Some(sprite) = &e.sprite_path {
            out.push_str("  sprite {\n");
            let _ = writeln!(out, "    image_path: {}", quoted(sprite));
            let _ = writeln!(out, "    single_image_dim: {}", SPRITE_UNIT_SIZE);
            let _ = writeln!(out, "    single_image_dim: {}", SPRITE_UNIT_SIZE);
            out.push_str("  }\n");
        }
        out.push_str("}\n");
    }
    out
}

fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/* -------------------------------------------------------------------------- */
/* Run index                                                                  */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone, Serialize)]
pub struct ActorIndex {
    pub name: String,
    pub documents: usize,
    pub skipped_documents: usize,
    pub vocabulary: usize,
    pub matched: usize,
    pub match_rate: f32,
    pub has_centroid: bool,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregationIndex {
    pub actors: Vec<String>,
    pub words: usize,
    pub matched: usize,
    pub match_rate: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunIndex {
    pub generated_at: String,
    pub version: u32,
    pub dimension: usize,
    pub actors: Vec<ActorIndex>,
    pub aggregation: Option<AggregationIndex>,
    pub centroids: Vec<String>,
}

pub fn write_json<P: AsRef<Path>, T: ?Sized + Serialize>(path: P, value: &T) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, serde_json::to_vec_pretty(value)?).with_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttributeBundle, Emotions, GlobalEntry};

    fn matrix(words: &[&str]) -> EmbeddingMatrix {
        let mut m = EmbeddingMatrix::default();
        for (i, w) in words.iter().enumerate() {
            m.push(*w, vec![i as f32, 0.5]);
        }
        m
    }

    #[test]
    fn actor_table_lists_matched_words_only() {
        let mut words = Vocabulary::new();
        let emotions = Emotions { anger: 0.1, disgust: 0.2, fear: 0.3, joy: 0.4, sadness: 0.5 };
        words.insert("tax".into(), AttributeBundle::new(0.8, -0.25, emotions));
        words.insert("taxes".into(), AttributeBundle::new(0.1, 0.0, Emotions::default()));
        let tsv = actor_metadata_tsv(&words, &matrix(&["tax"]));
        let lines: Vec<&str> = tsv.lines().collect();
        assert_eq!(lines[0], ACTOR_HEADER);
        assert_eq!(lines[1], "tax\t0.8\t-0.25\t0.25\t0.1\t0.2\t0.3\t0.4\t0.5");
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn aggregation_table_has_actor_columns() {
        let mut g = GlobalVocabulary {
            actors: vec!["A".into(), "B".into()],
            ..Default::default()
        };
        let mut tax = GlobalEntry::default();
        tax.relevance.insert("A".into(), 0.8);
        tax.relevance.insert("B".into(), 0.3);
        let mut growth = GlobalEntry::default();
        growth.relevance.insert("B".into(), 0.5);
        g.entries.insert("tax".into(), tax);
        g.entries.insert("growth".into(), growth);

        let tsv = aggregation_metadata_tsv(&g, &matrix(&["tax", "growth"]));
        assert_eq!(tsv, "Word\tA\tB\tShared\ntax\t0.8\t0.3\t2\ngrowth\t0\t0.5\t1\n");
    }

    #[test]
    fn vectors_and_labels() {
        assert_eq!(vectors_tsv(&matrix(&["a", "b"])), "0\t0.5\n1\t0.5\n");
        assert_eq!(labels_tsv(&["A".into(), "Aggregation".into()]), "A\nAggregation\n");
    }

    #[test]
    fn projector_config_entries() {
        let cfg = projector_config(&[
            ProjectorEmbedding::new("Smith", true),
            ProjectorEmbedding::new(CENTROIDS, false),
        ]);
        assert!(cfg.contains("tensor_path: \"Smith.vectors.tsv\""));
        assert!(cfg.contains("image_path: \"Smithsprite.png\""));
        assert!(cfg.contains("metadata_path: \"Centroids.tsv\""));
        assert_eq!(cfg.matches("embeddings {").count(), 2);
        assert_eq!(cfg.matches("sprite {").count(), 1);
    }

    #[test]
    fn quotes_are_escaped() {
        assert_eq!(quoted("O\"Brien"), "\"O\\\"Brien\"");
    }
}
