use tracing::{debug, warn};

use crate::annotations::{load_annotation_file, parse_annotation, ParseStats};
use crate::api_types::ApiAnnotation;
use crate::models::Vocabulary;
use std::path::Path;

/// Builds one actor's vocabulary from its documents, in the order given.
#[derive(Debug, Default)]
pub struct VocabularyAccumulator {
    words: Vocabulary,
    stats: ParseStats,
    documents: usize,
    skipped: usize,
}

impl VocabularyAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_document(&mut self, ann: &ApiAnnotation) {
        let stats = parse_annotation(ann, &mut self.words);
        self.stats.merge(stats);
        self.documents += 1;
    }

    /// Load and fold one file; unreadable or undecodable files are skipped.
    pub fn add_file(&mut self, path: &Path) {
        debug!("Parsing {}", path.display());
        match load_annotation_file(path) {
            Ok(ann) => self.add_document(&ann),
            Err(e) => {
                warn!("Skipping document - path={}, error={:#}", path.display(), e);
                self.skipped += 1;
            }
        }
    }

    pub fn stats(&self) -> ParseStats {
        self.stats
    }

    pub fn documents(&self) -> usize {
        self.documents
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Freeze the vocabulary.
    pub fn finish(self) -> Vocabulary {
        self.words
    }
}
