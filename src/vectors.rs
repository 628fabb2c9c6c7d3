use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, warn};
use unicode_normalization::{is_nfc, UnicodeNormalization};

use crate::models::{EmbeddingMatrix, GlobalVocabulary, Vocabulary};

/// Pretrained word vectors (GloVe text layout), rows kept in file order.
#[derive(Debug, Clone, Default)]
pub struct PretrainedTable {
    rows: Vec<(String, Vec<f32>)>,
    dim: usize,
}

impl PretrainedTable {
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_filtered(path, |_| true)
    }

    /// Load only the rows whose word passes `keep`.
    pub fn load_filtered<F>(path: &Path, keep: F) -> Result<Self>
    where
        F: Fn(&str) -> bool,
    {
        let start = std::time::Instant::now();
        let file = File::open(path).with_context(|| format!("opening pretrained table {}", path.display()))?;
        let table = Self::from_reader(BufReader::new(file), keep)
            .with_context(|| format!("reading pretrained table {}", path.display()))?;
        info!(
            "Pretrained table loaded - path={}, rows={}, dim={}, duration={:.2}s",
            path.display(),
            table.len(),
            table.dim,
            start.elapsed().as_secs_f32()
        );
        Ok(table)
    }

    pub fn from_reader<R, F>(reader: R, keep: F) -> Result<Self>
    where
        R: BufRead,
        F: Fn(&str) -> bool,
    {
        let mut table = PretrainedTable::default();
        let mut expected_dim: Option<usize> = None;
        let mut rejected = 0usize;

        for (lineno, raw) in reader.split(b'\n').enumerate() {
            let raw = raw?;
            let Ok(line) = std::str::from_utf8(&raw) else {
                warn!("Undecodable vector row skipped - line={}", lineno + 1);
                rejected += 1;
                continue;
            };
            let mut parts = line.split_whitespace();
            let Some(word) = parts.next() else {
                continue;
            };
            let parsed: Result<Vec<f32>, _> = parts.map(str::parse::<f32>).collect();
            let vector = match parsed {
                Ok(v) if !v.is_empty() => v,
                _ => {
                    warn!("Malformed vector row skipped - line={}, word={}", lineno + 1, word);
                    rejected += 1;
                    continue;
                }
            };
            // The first well-formed row fixes the dimension, filtered or not.
            let dim = *expected_dim.get_or_insert(vector.len());
            if vector.len() != dim {
                warn!(
                    "Vector row with wrong dimension skipped - line={}, word={}, dim={}, expected={}",
                    lineno + 1,
                    word,
                    vector.len(),
                    dim
                );
                rejected += 1;
                continue;
            }
            // Keys are compared in NFC, the same form annotation words take.
            let word = if is_nfc(word) { word.to_string() } else { word.nfc().collect() };
            if keep(&word) {
                table.rows.push((word, vector));
            }
        }

        if rejected > 0 {
            warn!("Pretrained table rows rejected: {}", rejected);
        }
        match expected_dim {
            Some(d) => table.dim = d,
            None => bail!("pretrained table has no usable rows"),
        }
        Ok(table)
    }

    #[cfg(test)]
    pub fn from_rows(rows: Vec<(String, Vec<f32>)>) -> Self {
        let dim = rows.first().map(|(_, v)| v.len()).unwrap_or(0);
        Self { rows, dim }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn rows(&self) -> impl Iterator<Item = (&str, &[f32])> {
        self.rows.iter().map(|(w, v)| (w.as_str(), v.as_slice()))
    }
}

/// A word-keyed table the matcher can resolve and flag.
pub trait Lexicon {
    fn contains_word(&self, word: &str) -> bool;
    fn set_found(&mut self, word: &str, found: bool);
    fn word_count(&self) -> usize;
    fn unfound_words(&self) -> Vec<String>;
    fn reset_found(&mut self);
}

impl Lexicon for Vocabulary {
    fn contains_word(&self, word: &str) -> bool {
        self.contains_key(word)
    }

    fn set_found(&mut self, word: &str, found: bool) {
        if let Some(b) = self.get_mut(word) {
            b.found = found;
        }
    }

    fn word_count(&self) -> usize {
        self.len()
    }

    fn unfound_words(&self) -> Vec<String> {
        self.iter().filter(|(_, b)| !b.found).map(|(w, _)| w.clone()).collect()
    }

    fn reset_found(&mut self) {
        for b in self.values_mut() {
            b.found = false;
        }
    }
}

impl Lexicon for GlobalVocabulary {
    fn contains_word(&self, word: &str) -> bool {
        self.entries.contains_key(word)
    }

    fn set_found(&mut self, word: &str, found: bool) {
        if let Some(e) = self.entries.get_mut(word) {
            e.found = found;
        }
    }

    fn word_count(&self) -> usize {
        self.entries.len()
    }

    fn unfound_words(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, e)| !e.found)
            .map(|(w, _)| w.clone())
            .collect()
    }

    fn reset_found(&mut self) {
        for e in self.entries.values_mut() {
            e.found = false;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchReport {
    pub matrix: EmbeddingMatrix,
    pub matched: usize,
    pub missing: usize,
}

/// Fraction of vocabulary words resolved; 0.0 for an empty vocabulary.
pub fn match_rate(matched: usize, missing: usize) -> f32 {
    let total = matched + missing;
    if total == 0 { 0.0 } else { matched as f32 / total as f32 }
}

impl MatchReport {
    pub fn match_rate(&self) -> f32 {
        match_rate(self.matched, self.missing)
    }
}

/// Resolve every lexicon word against the table by exact string equality.
///
/// Rows come out in table order; a word listed twice in the table only
/// takes its first row. Found flags are reset first so repeated runs agree.
pub fn match_vocabulary<L: Lexicon + ?Sized>(name: &str, table: &PretrainedTable, lexicon: &mut L) -> MatchReport {
    lexicon.reset_found();
    let mut matrix = EmbeddingMatrix::default();
    let mut seen: HashSet<&str> = HashSet::new();

    if lexicon.word_count() > 0 {
        for (word, vector) in table.rows() {
            if !lexicon.contains_word(word) {
                continue;
            }
            if !seen.insert(word) {
                debug!("Repeated table row ignored - name={}, word={}", name, word);
                continue;
            }
            matrix.push(word, vector.to_vec());
            lexicon.set_found(word, true);
        }
    }

    let unfound = lexicon.unfound_words();
    for w in &unfound {
        debug!("Word not found in pretrained table - name={}, word={}", name, w);
    }
    let report = MatchReport {
        matched: matrix.len(),
        missing: unfound.len(),
        matrix,
    };
    info!(
        "Words matched with pretrained table - name={}, matched={}, missing={}, rate={:.1}%",
        name,
        report.matched,
        report.missing,
        report.match_rate() * 100.0
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttributeBundle, GlobalEntry};
    use std::io::Cursor;

    fn table() -> PretrainedTable {
        PretrainedTable::from_rows(vec![
            ("the".into(), vec![0.0, 0.0]),
            ("tax".into(), vec![1.0, 2.0]),
            ("growth".into(), vec![3.0, 4.0]),
            ("tax".into(), vec![9.0, 9.0]),
            ("u.s.".into(), vec![5.0, 6.0]),
        ])
    }

    fn vocab(words: &[&str]) -> Vocabulary {
        words
            .iter()
            .map(|w| (w.to_string(), AttributeBundle::default()))
            .collect()
    }

    #[test]
    fn parses_glove_lines() {
        let text = "the 0.1 0.2 0.3\n\nwall -1 2.5 3e-1\nbroken 0.1 x 0.3\nshort 0.1 0.2\nlonely\n";
        let t = PretrainedTable::from_reader(Cursor::new(text), |_| true).unwrap();
        assert_eq!(t.dim(), 3);
        let words: Vec<&str> = t.rows().map(|(w, _)| w).collect();
        assert_eq!(words, vec!["the", "wall"]);
        assert_eq!(t.rows().nth(1).unwrap().1, &[-1.0, 2.5, 0.3]);
    }

    #[test]
    fn filtered_load_keeps_dimension_check() {
        let text = "a 1 2\nb 1 2 3\nc 4 5\n";
        let t = PretrainedTable::from_reader(Cursor::new(text), |w| w != "a").unwrap();
        assert_eq!(t.dim(), 2);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn undecodable_row_is_skipped() {
        let bytes: &[u8] = b"tax 1 2\ncaf\xe9 3 4\ngrowth 5 6\n";
        let t = PretrainedTable::from_reader(Cursor::new(bytes), |_| true).unwrap();
        let words: Vec<&str> = t.rows().map(|(w, _)| w).collect();
        assert_eq!(words, vec!["tax", "growth"]);
        assert_eq!(t.dim(), 2);
    }

    #[test]
    fn decomposed_table_word_matches_composed_key() {
        let text = "cafe\u{301} 1 2\n";
        let t = PretrainedTable::from_reader(Cursor::new(text), |_| true).unwrap();
        let key = crate::normalize::canonical_word("Cafe\u{301}");
        let mut v = vocab(&[key.as_str()]);
        let r = match_vocabulary("a", &t, &mut v);
        assert_eq!(r.matched, 1);
        assert_eq!(r.matrix.words, vec!["caf\u{e9}"]);
    }

    #[test]
    fn table_without_rows_is_an_error() {
        assert!(PretrainedTable::from_reader(Cursor::new("\n\n"), |_| true).is_err());
    }

    #[test]
    fn matches_exact_words_in_table_order() {
        let mut v = vocab(&["growth", "tax", "taxes", "u.s."]);
        let r = match_vocabulary("smith", &table(), &mut v);
        assert_eq!(r.matrix.words, vec!["tax", "growth", "u.s."]);
        assert_eq!(r.matrix.vectors[0], vec![1.0, 2.0]);
        assert_eq!((r.matched, r.missing), (3, 1));
        assert!(v["tax"].found);
        assert!(!v["taxes"].found);
        assert!((r.match_rate() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn empty_vocabulary_gives_empty_matrix() {
        let mut v = Vocabulary::new();
        let r = match_vocabulary("nobody", &table(), &mut v);
        assert!(r.matrix.is_empty());
        assert_eq!(r.match_rate(), 0.0);
    }

    #[test]
    fn matching_is_idempotent() {
        let t = table();
        let mut v = vocab(&["growth", "tax", "deficit"]);
        let first = match_vocabulary("a", &t, &mut v);
        let flags: Vec<bool> = v.values().map(|b| b.found).collect();
        let second = match_vocabulary("a", &t, &mut v);
        let flags_again: Vec<bool> = v.values().map(|b| b.found).collect();
        assert_eq!(first, second);
        assert_eq!(flags, flags_again);
    }

    #[test]
    fn stale_found_flag_is_cleared() {
        let mut v = vocab(&["deficit"]);
        v.get_mut("deficit").unwrap().found = true;
        match_vocabulary("a", &table(), &mut v);
        assert!(!v["deficit"].found);
    }

    #[test]
    fn matches_global_vocabulary() {
        let mut g = GlobalVocabulary::default();
        g.entries.insert("growth".into(), GlobalEntry::default());
        g.entries.insert("wall".into(), GlobalEntry::default());
        let r = match_vocabulary("Aggregation", &table(), &mut g);
        assert_eq!(r.matrix.words, vec!["growth"]);
        assert!(g.entries["growth"].found);
        assert_eq!(g.unfound_words(), vec!["wall"]);
    }
}
