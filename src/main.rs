mod accumulate;
mod aggregate;
mod annotations;
mod api_types;
mod centroid;
mod grouping;
mod models;
mod normalize;
mod orchestrator;
mod sprite;
mod vectors;
mod viz_export;

use anyhow::Result;
use clap::Parser;
use orchestrator::{run, RunConfig};
use std::path::PathBuf;
use tracing::{debug, info};

/// Political footprints - per-actor vocabularies mapped into a pretrained word-vector space
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Project directory holding the annotation .json files (searched recursively)
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Pretrained word vector file, e.g. glove.6B.300d.txt
    #[arg(short, long)]
    pretrained: Option<PathBuf>,

    /// Output directory for projector files (default: "<dir>/model")
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Do not render sentiment sprites
    #[arg(long)]
    no_sprites: bool,

    /// Load the whole pretrained table instead of only the words in use
    #[arg(long)]
    full_table: bool,
}

/// CLI argument > environment variable.
fn arg_or_env(arg: Option<PathBuf>, var: &str) -> Option<PathBuf> {
    arg.or_else(|| std::env::var_os(var).map(PathBuf::from))
}

fn resolve_config(args: Args) -> Result<RunConfig> {
    let input_dir = arg_or_env(args.dir, "FOOTPRINT_DIR").ok_or_else(|| {
        anyhow::anyhow!(
            "no project directory given\n\
             Use --dir <dir> or set FOOTPRINT_DIR.\n\
             Usage: footprint_vectors -d <dir> -p <pretrained>"
        )
    })?;
    let pretrained = arg_or_env(args.pretrained, "FOOTPRINT_PRETRAINED").ok_or_else(|| {
        anyhow::anyhow!(
            "no pretrained vector file given\n\
             Use --pretrained <file> or set FOOTPRINT_PRETRAINED.\n\
             Usage: footprint_vectors -d <dir> -p <pretrained>"
        )
    })?;
    if !pretrained.is_file() {
        return Err(anyhow::anyhow!("pretrained vector file not found at {}", pretrained.display()));
    }
    let output_dir = arg_or_env(args.output_dir, "FOOTPRINT_OUTPUT_DIR").unwrap_or_else(|| input_dir.join("model"));

    Ok(RunConfig {
        input_dir,
        pretrained,
        output_dir,
        sprites: !args.no_sprites,
        full_table: args.full_table,
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(true)
        .init();

    info!("Starting footprint_vectors");

    let args = Args::parse();
    let cfg = resolve_config(args)?;
    debug!("Run config: {:?}", cfg);

    run(&cfg)?;
    Ok(())
}
