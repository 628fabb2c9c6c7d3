use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::accumulate::VocabularyAccumulator;
use crate::aggregate::aggregate;
use crate::centroid::{centroid, mean_vector, CentroidSet};
use crate::grouping::{discover_actors, ActorFiles};
use crate::models::{Centroid, EmbeddingMatrix, Vocabulary};
use crate::sprite::write_sprite;
use crate::vectors::{match_rate, match_vocabulary, MatchReport, PretrainedTable};
use crate::viz_export::{
    actor_metadata_tsv, aggregation_metadata_tsv, labels_tsv, metadata_file, projector_config, sprite_file,
    vectors_file, vectors_tsv, write_json, write_text, ActorIndex, AggregationIndex, ProjectorEmbedding, RunIndex,
    AGGREGATION, CENTROIDS, INDEX_FILE, PROJECTOR_CONFIG,
};

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub input_dir: PathBuf,
    pub pretrained: PathBuf,
    pub output_dir: PathBuf,
    pub sprites: bool,
    pub full_table: bool, // load every pretrained row instead of only vocabulary words
}

/// Everything one actor contributes to a run.
#[derive(Debug, Clone)]
pub struct ActorFootprint {
    pub name: String,
    pub documents: usize,
    pub skipped_documents: usize,
    pub words: Vocabulary,
    pub matrix: EmbeddingMatrix,
    pub matched: usize,
    pub missing: usize,
    pub centroid: Option<Vec<f32>>,
}

/// State accumulated across a run, in processing order.
#[derive(Debug, Default)]
pub struct RunContext {
    pub footprints: Vec<ActorFootprint>,
    pub centroids: CentroidSet,
    pub aggregation: Option<AggregationIndex>,
    pub dimension: usize,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ordered (actor, vocabulary) pairs for the aggregator.
    pub fn vocabularies(&self) -> Vec<(&str, &Vocabulary)> {
        self.footprints.iter().map(|f| (f.name.as_str(), &f.words)).collect()
    }
}

/// Fold each actor's documents into its vocabulary.
pub fn build_vocabularies(actors: &[ActorFiles]) -> Vec<ActorFootprint> {
    actors
        .iter()
        .map(|a| {
            info!("Processing actor - name={}, documents={}", a.actor, a.documents.len());
            let mut acc = VocabularyAccumulator::new();
            for path in &a.documents {
                acc.add_file(path);
            }
            let stats = acc.stats();
            debug!(
                "Vocabulary built - name={}, candidates={}, inserted={}, short={}, duplicate={}",
                a.actor, stats.candidates, stats.inserted, stats.short, stats.duplicate
            );
            let documents = acc.documents();
            let skipped_documents = acc.skipped();
            ActorFootprint {
                name: a.actor.clone(),
                documents,
                skipped_documents,
                words: acc.finish(),
                matrix: EmbeddingMatrix::default(),
                matched: 0,
                missing: 0,
                centroid: None,
            }
        })
        .collect()
}

/// Match and reduce one footprint. An actor without any matched word keeps
/// no centroid.
pub fn resolve_footprint(fp: &mut ActorFootprint, table: &PretrainedTable) -> Result<()> {
    let MatchReport {
        matrix,
        matched,
        missing,
    } = match_vocabulary(&fp.name, table, &mut fp.words);
    fp.matched = matched;
    fp.missing = missing;
    fp.centroid = if matrix.is_empty() {
        warn!("No words matched, centroid skipped - name={}", fp.name);
        None
    } else {
        Some(mean_vector(&matrix).with_context(|| format!("centroid for {}", fp.name))?)
    };
    fp.matrix = matrix;
    Ok(())
}

/// Per-actor stage: match every vocabulary against the shared table, in
/// parallel, then record centroids in processing order.
pub fn resolve_actors(ctx: &mut RunContext, table: &PretrainedTable) -> Result<()> {
    ctx.footprints
        .par_iter_mut()
        .map(|fp| resolve_footprint(fp, table))
        .collect::<Result<Vec<()>>>()?;

    for fp in &ctx.footprints {
        if let Some(v) = &fp.centroid {
            ctx.centroids.push(Centroid {
                label: fp.name.clone(),
                vector: v.clone(),
            });
        }
    }
    Ok(())
}

/// Load the pretrained table, keeping only rows some actor can use unless
/// the full table was requested.
pub fn load_table(cfg: &RunConfig, footprints: &[ActorFootprint]) -> Result<PretrainedTable> {
    if cfg.full_table {
        return PretrainedTable::load(&cfg.pretrained);
    }
    let wanted: HashSet<&str> = footprints
        .iter()
        .flat_map(|f| f.words.keys().map(String::as_str))
        .collect();
    debug!("Filtering pretrained table to {} distinct words", wanted.len());
    PretrainedTable::load_filtered(&cfg.pretrained, |w| wanted.contains(w))
}

fn export_actor(cfg: &RunConfig, fp: &ActorFootprint) -> Result<Vec<String>> {
    let mut files = vec![metadata_file(&fp.name), vectors_file(&fp.name)];
    write_text(&cfg.output_dir.join(&files[0]), &actor_metadata_tsv(&fp.words, &fp.matrix))?;
    write_text(&cfg.output_dir.join(&files[1]), &vectors_tsv(&fp.matrix))?;
    if cfg.sprites {
        let sprite = sprite_file(&fp.name);
        write_sprite(&cfg.output_dir.join(&sprite), &fp.words, &fp.matrix)?;
        files.push(sprite);
    }
    Ok(files)
}

/// Cross-actor stage. Runs after every per-actor footprint is resolved.
pub fn resolve_aggregation(
    cfg: &RunConfig,
    ctx: &mut RunContext,
    table: &PretrainedTable,
    projector: &mut Vec<ProjectorEmbedding>,
) -> Result<()> {
    let Some(mut global) = aggregate(&ctx.vocabularies()) else {
        info!("Aggregation skipped - fewer than two actors");
        return Ok(());
    };

    let report = match_vocabulary(AGGREGATION, table, &mut global);
    write_text(
        &cfg.output_dir.join(metadata_file(AGGREGATION)),
        &aggregation_metadata_tsv(&global, &report.matrix),
    )?;
    write_text(&cfg.output_dir.join(vectors_file(AGGREGATION)), &vectors_tsv(&report.matrix))?;
    projector.push(ProjectorEmbedding::new(AGGREGATION, false));

    if report.matrix.is_empty() {
        warn!("No aggregated words matched, centroid skipped");
    } else {
        ctx.centroids.push(centroid(AGGREGATION, &report.matrix)?);
    }
    ctx.aggregation = Some(AggregationIndex {
        actors: global.actors.clone(),
        words: global.entries.len(),
        matched: report.matched,
        match_rate: report.match_rate(),
    });
    Ok(())
}

/// Centroid-of-centroids table; only meaningful with two or more.
pub fn export_centroids(cfg: &RunConfig, ctx: &RunContext, projector: &mut Vec<ProjectorEmbedding>) -> Result<()> {
    if ctx.centroids.len() < 2 {
        debug!("Centroid table skipped - centroids={}", ctx.centroids.len());
        return Ok(());
    }
    let matrix = ctx.centroids.to_matrix();
    write_text(&cfg.output_dir.join(metadata_file(CENTROIDS)), &labels_tsv(&ctx.centroids.labels()))?;
    write_text(&cfg.output_dir.join(vectors_file(CENTROIDS)), &vectors_tsv(&matrix))?;
    projector.push(ProjectorEmbedding::new(CENTROIDS, false));
    info!("Centroid table written - centroids={}", ctx.centroids.len());
    Ok(())
}

pub fn run(cfg: &RunConfig) -> Result<RunContext> {
    let pipeline_start = std::time::Instant::now();
    info!(
        "Pipeline started - input={}, pretrained={}, output={}",
        cfg.input_dir.display(),
        cfg.pretrained.display(),
        cfg.output_dir.display()
    );

    // 1) discover and group annotation files
    let actors = discover_actors(&cfg.input_dir, Some(&cfg.output_dir))?;
    if actors.is_empty() {
        bail!("No annotation files found under {}", cfg.input_dir.display());
    }

    // 2) vocabularies, one actor at a time in sorted order
    let vocab_start = std::time::Instant::now();
    let mut ctx = RunContext::new();
    ctx.footprints = build_vocabularies(&actors);
    info!(
        "Vocabularies built - actors={}, duration={:.2}s",
        ctx.footprints.len(),
        vocab_start.elapsed().as_secs_f32()
    );

    // 3) pretrained table, read once and shared
    let table = load_table(cfg, &ctx.footprints)?;
    ctx.dimension = table.dim();

    // 4) per-actor matching and centroids
    let match_start = std::time::Instant::now();
    resolve_actors(&mut ctx, &table)?;
    info!(
        "Actor footprints resolved - actors={}, centroids={}, duration={:.2}s",
        ctx.footprints.len(),
        ctx.centroids.len(),
        match_start.elapsed().as_secs_f32()
    );

    // 5) persist per-actor files
    std::fs::create_dir_all(&cfg.output_dir)
        .with_context(|| format!("create {}", cfg.output_dir.display()))?;
    let mut projector = Vec::new();
    let mut actor_index = Vec::with_capacity(ctx.footprints.len());
    for fp in &ctx.footprints {
        let files = export_actor(cfg, fp)?;
        projector.push(ProjectorEmbedding::new(&fp.name, cfg.sprites));
        actor_index.push(ActorIndex {
            name: fp.name.clone(),
            documents: fp.documents,
            skipped_documents: fp.skipped_documents,
            vocabulary: fp.words.len(),
            matched: fp.matched,
            match_rate: match_rate(fp.matched, fp.missing),
            has_centroid: fp.centroid.is_some(),
            files,
        });
    }

    // 6) cross-actor aggregation and the centroid table
    resolve_aggregation(cfg, &mut ctx, &table, &mut projector)?;
    export_centroids(cfg, &ctx, &mut projector)?;

    // 7) projector config and run index
    write_text(&cfg.output_dir.join(PROJECTOR_CONFIG), &projector_config(&projector))?;
    let index = RunIndex {
        generated_at: chrono::Utc::now().to_rfc3339(),
        version: 1,
        dimension: ctx.dimension,
        actors: actor_index,
        aggregation: ctx.aggregation.clone(),
        centroids: ctx.centroids.labels(),
    };
    write_json(cfg.output_dir.join(INDEX_FILE), &index)?;

    info!(
        "Pipeline completed successfully - total_duration={:.2}s, actors={}, centroids={}",
        pipeline_start.elapsed().as_secs_f32(),
        ctx.footprints.len(),
        ctx.centroids.len()
    );
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const GLOVE: &str = "\
the 0.0 0.0
tax 1.0 2.0
growth 3.0 4.0
jobs 5.0 6.0
wall 7.0 8.0
u.s. 2.0 2.0
";

    fn setup(files: &[(&str, &str)]) -> (tempfile::TempDir, RunConfig) {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("texts");
        fs::create_dir_all(&input).unwrap();
        for (name, body) in files {
            fs::write(input.join(name), body).unwrap();
        }
        let pretrained = dir.path().join("glove.txt");
        fs::write(&pretrained, GLOVE).unwrap();
        let cfg = RunConfig {
            output_dir: input.join("model"),
            input_dir: input,
            pretrained,
            sprites: true,
            full_table: false,
        };
        (dir, cfg)
    }

    #[test]
    fn end_to_end_two_actors() {
        let (_dir, cfg) = setup(&[
            ("A-[0].json", r#"{"entities":[{"text":"Tax","relevance":0.8,"sentiment":{"score":0.5}}]}"#),
            ("A-[1].json", r#"{"entities":[{"text":"tax jobs","relevance":0.1}]}"#),
            ("B-[0].json", r#"{"keywords":[{"text":"tax","relevance":0.3},{"text":"growth wall.","relevance":0.5}]}"#),
            ("B-[1].json", "not json"),
        ]);
        let ctx = run(&cfg).unwrap();

        assert_eq!(ctx.footprints.len(), 2);
        let a = &ctx.footprints[0];
        assert_eq!(a.name, "A");
        assert_eq!(a.words["tax"].relevance, 0.8);
        assert_eq!(a.matrix.words, vec!["tax", "jobs"]);
        assert_eq!(a.centroid.as_deref(), Some(&[3.0, 4.0][..]));

        let b = &ctx.footprints[1];
        assert_eq!(b.documents, 1);
        assert_eq!(b.skipped_documents, 1);
        assert_eq!(b.matrix.words, vec!["tax", "growth", "wall"]);

        assert_eq!(ctx.centroids.labels(), vec!["A", "B", AGGREGATION]);
        let agg = ctx.aggregation.as_ref().unwrap();
        assert_eq!(agg.words, 4);
        assert_eq!(agg.matched, 4);

        let out = &cfg.output_dir;
        let a_tsv = fs::read_to_string(out.join("A.tsv")).unwrap();
        assert!(a_tsv.lines().nth(1).unwrap().starts_with("tax\t0.8\t0.5\t-0.5"));
        let agg_tsv = fs::read_to_string(out.join("Aggregation.tsv")).unwrap();
        assert!(agg_tsv.starts_with("Word\tA\tB\tShared\n"));
        assert!(agg_tsv.contains("tax\t0.8\t0.3\t2\n"));
        assert!(agg_tsv.contains("growth\t0\t0.5\t1\n"));
        assert_eq!(
            fs::read_to_string(out.join("Centroids.tsv")).unwrap(),
            "A\nB\nAggregation\n"
        );
        assert!(out.join("Asprite.png").exists());
        let cfg_text = fs::read_to_string(out.join(PROJECTOR_CONFIG)).unwrap();
        assert_eq!(cfg_text.matches("embeddings {").count(), 4);

        let index: serde_json::Value =
            serde_json::from_slice(&fs::read(out.join(INDEX_FILE)).unwrap()).unwrap();
        assert_eq!(index["dimension"], 2);
        assert_eq!(index["actors"][1]["skipped_documents"], 1);
    }

    #[test]
    fn single_actor_skips_aggregation_and_centroid_table() {
        let (_dir, cfg) = setup(&[("Solo.json", r#"{"entities":[{"text":"growth"}]}"#)]);
        let ctx = run(&cfg).unwrap();
        assert!(ctx.aggregation.is_none());
        assert_eq!(ctx.centroids.len(), 1);
        assert!(!cfg.output_dir.join("Aggregation.tsv").exists());
        assert!(!cfg.output_dir.join("Centroids.tsv").exists());
    }

    #[test]
    fn actor_without_matches_has_no_centroid() {
        let (_dir, cfg) = setup(&[
            ("A-[0].json", r#"{"entities":[{"text":"tax"}]}"#),
            ("B-[0].json", r#"{"entities":[{"text":"zzzword"}]}"#),
        ]);
        let ctx = run(&cfg).unwrap();
        assert!(ctx.footprints[1].centroid.is_none());
        assert_eq!(ctx.footprints[1].missing, 1);
        assert_eq!(ctx.centroids.labels(), vec!["A", AGGREGATION]);
        let b_tsv = fs::read_to_string(cfg.output_dir.join("B.tsv")).unwrap();
        assert_eq!(b_tsv.lines().count(), 1);
    }

    #[test]
    fn rerun_ignores_previous_output_however_spelled() {
        let (_dir, mut cfg) = setup(&[
            ("A-[0].json", r#"{"entities":[{"text":"tax"}]}"#),
            ("B-[0].json", r#"{"entities":[{"text":"growth"}]}"#),
        ]);
        fs::create_dir_all(cfg.input_dir.join("sub")).unwrap();
        cfg.output_dir = cfg.input_dir.join("sub").join("..").join("model");

        run(&cfg).unwrap();
        assert!(cfg.input_dir.join("model").join(INDEX_FILE).exists());
        let again = run(&cfg).unwrap();
        let names: Vec<&str> = again.footprints.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(again.aggregation.unwrap().actors, vec!["A", "B"]);
    }

    #[test]
    fn empty_input_dir_is_an_error() {
        let (_dir, cfg) = setup(&[]);
        assert!(run(&cfg).is_err());
    }

    #[test]
    fn full_table_gives_same_matches() {
        let files = [
            ("A-[0].json", r#"{"entities":[{"text":"tax growth"}]}"#),
            ("B-[0].json", r#"{"entities":[{"text":"U.S. jobs"}]}"#),
        ];
        let (_d1, filtered) = setup(&files);
        let (_d2, mut full) = setup(&files);
        full.full_table = true;
        full.sprites = false;
        let a = run(&filtered).unwrap();
        let b = run(&full).unwrap();
        for (x, y) in a.footprints.iter().zip(&b.footprints) {
            assert_eq!(x.matrix, y.matrix);
        }
        assert_eq!(b.footprints[1].matrix.words, vec!["jobs", "u.s."]);
        assert!(!full.output_dir.join("Asprite.png").exists());
    }
}
