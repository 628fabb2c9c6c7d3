//! Grouping annotation files by actor.
//!
//! File names follow `<actor><sep>[<page>].json`, where `<sep>` is optional
//! and one of `-`, `_` or a space, and `<page>` is a run of ASCII digits. A
//! plain `<actor>.json` is a single-page actor. Everything else is
//! ungroupable and reported as such, as are actors named like the
//! run-wide tables (`Aggregation`, `Centroids`).

use anyhow::{Context, Result};
use itertools::Itertools;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::viz_export::{AGGREGATION, CENTROIDS, INDEX_FILE};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GroupingError {
    #[error("ungroupable file name {name:?}: {reason}")]
    Ungroupable { name: String, reason: &'static str },
}

fn ungroupable(name: &str, reason: &'static str) -> GroupingError {
    GroupingError::Ungroupable {
        name: name.to_string(),
        reason,
    }
}

/// Actor identifier encoded in an annotation file name.
pub fn actor_key(filename: &str) -> Result<String, GroupingError> {
    let stem = filename
        .strip_suffix(".json")
        .ok_or_else(|| ungroupable(filename, "not a .json file"))?;

    let actor = match stem.strip_suffix(']') {
        Some(open) => {
            let (actor, page) = open
                .rsplit_once('[')
                .ok_or_else(|| ungroupable(filename, "unbalanced page brackets"))?;
            if page.is_empty() || !page.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ungroupable(filename, "page index is not a number"));
            }
            actor.trim_end_matches(['-', '_', ' '])
        }
        None => stem,
    };

    if actor.contains('[') || actor.contains(']') {
        return Err(ungroupable(filename, "unbalanced page brackets"));
    }
    let actor = actor.trim();
    if actor.is_empty() {
        return Err(ungroupable(filename, "empty actor name"));
    }
    if [AGGREGATION, CENTROIDS].iter().any(|r| actor.eq_ignore_ascii_case(r)) {
        return Err(ungroupable(filename, "actor name is reserved for a run-wide table"));
    }
    Ok(actor.to_string())
}

/// One actor and its documents, sorted by file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorFiles {
    pub actor: String,
    pub documents: Vec<PathBuf>,
}

/// Group paths by actor. Actors come out in lexicographic order; each
/// actor's documents are sorted by file name, then full path.
pub fn group_paths<I>(paths: I) -> Vec<ActorFiles>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    for path in paths {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            warn!("Skipping file with non UTF-8 name - path={}", path.display());
            continue;
        };
        match actor_key(name) {
            Ok(actor) => groups.entry(actor).or_default().push(path),
            Err(e) => warn!("Skipping file - path={}, error={}", path.display(), e),
        }
    }

    groups
        .into_iter()
        .map(|(actor, documents)| ActorFiles {
            actor,
            documents: documents
                .into_iter()
                .sorted_by(|a, b| a.file_name().cmp(&b.file_name()).then_with(|| a.cmp(b)))
                .collect(),
        })
        .collect()
}

/// Recursively find `.json` annotation files under `dir` and group them.
/// The `exclude` subtree (usually the output directory) is not entered,
/// however its path is spelled, and run index files are never read.
pub fn discover_actors(dir: &Path, exclude: Option<&Path>) -> Result<Vec<ActorFiles>> {
    std::fs::metadata(dir).with_context(|| format!("failed to inspect {}", dir.display()))?;
    let excluded: Option<PathBuf> = exclude.map(|x| std::fs::canonicalize(x).unwrap_or_else(|_| x.to_path_buf()));

    let files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_entry(|e| match &excluded {
            Some(x) if e.file_type().is_dir() => {
                e.path() != x.as_path() && std::fs::canonicalize(e.path()).map_or(true, |p| &p != x)
            }
            _ => true,
        })
        .filter_map(|e| match e {
            Ok(e) => Some(e),
            Err(err) => {
                warn!("Directory walk error: {}", err);
                None
            }
        })
        .filter(|e| e.file_type().is_file() && e.file_name() != INDEX_FILE)
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    debug!("Annotation files found: {}", files.len());

    let actors = group_paths(files);
    info!(
        "Actors discovered - dir={}, actors={}, documents={}",
        dir.display(),
        actors.len(),
        actors.iter().map(|a| a.documents.len()).sum::<usize>()
    );
    Ok(actors)
}
