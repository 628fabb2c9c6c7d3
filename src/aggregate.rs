use tracing::{debug, info};

use crate::models::{GlobalVocabulary, Vocabulary};

/// Merge per-actor vocabularies into one table keyed by word, holding each
/// actor's relevance for it.
///
/// Needs at least two actors; with fewer there is nothing to compare and
/// `None` is returned.
pub fn aggregate(actors: &[(&str, &Vocabulary)]) -> Option<GlobalVocabulary> {
    if actors.len() < 2 {
        debug!("Aggregation skipped - actors={}", actors.len());
        return None;
    }

    let mut global = GlobalVocabulary::default();
    for &(name, words) in actors {
        if !global.actors.iter().any(|a| a == name) {
            global.actors.push(name.to_string());
        }
        for (word, bundle) in words {
            global
                .entries
                .entry(word.clone())
                .or_default()
                .relevance
                .insert(name.to_string(), bundle.relevance);
        }
    }

    let shared = global.entries.values().filter(|e| e.shared() > 1).count();
    info!(
        "Aggregation built - actors={}, words={}, shared_by_several={}",
        global.actors.len(),
        global.entries.len(),
        shared
    );
    Some(global)
}
