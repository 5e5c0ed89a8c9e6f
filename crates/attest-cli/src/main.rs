//! Attest CLI
//!
//! Command-line driver for corpus assembly:
//! - Ingesting raw assertion records into the embedded store
//! - Building the canonical corpus (`create`) and folding in new records
//!   (`supplement`), with checkpointed resume via `--continue`
//! - Inspecting the persisted corpus (`status`, `show`)

use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use attest_assembly::{AssemblyConfig, CorpusManager, Ontology, OntologyComparator};
use attest_model::{Evidence, RawRecord, ShallowHash};
use attest_store::{CorpusStore, FileStore, FsCheckpointStore};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "attest")]
#[command(
    author,
    version,
    about = "Attest: canonical knowledge-assertion corpus assembly"
)]
struct Cli {
    /// Directory holding the corpus log and checkpoints.
    #[arg(long, default_value = "./corpus", global = true)]
    data_dir: PathBuf,

    /// Verbose (debug-level) log output.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RunArgs {
    /// Records loaded and compared per batch. Larger runs faster but needs
    /// more memory.
    #[arg(short = 'b', long, default_value_t = 10_000)]
    batch_size: usize,

    /// Worker threads for pair comparison.
    #[arg(short = 'w', long, default_value_t = 1)]
    workers: usize,

    /// Resume an interrupted run from its checkpoints.
    #[arg(short = 'c', long = "continue")]
    continuing: bool,

    /// JSON is-a ontology consulted by the refinement comparator.
    #[arg(long)]
    ontology: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load raw records from a JSON-lines file into the store.
    Ingest {
        /// One `{"content": {...}, "evidence": {...}}` object per line.
        input: PathBuf,
    },

    /// Build the canonical corpus and refinement links from all raw records.
    Create {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Fold raw records not yet in the corpus into it.
    Supplement {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Summarize the persisted corpus.
    Status,

    /// Show one canonical record with its evidence and refinement links.
    Show {
        /// The record's shallow hash (may be negative).
        #[arg(allow_hyphen_values = true)]
        hash: i64,
    },
}

#[derive(Deserialize)]
struct IngestLine {
    content: serde_json::Value,
    evidence: Evidence,
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn open_manager(run: &RunArgs) -> Result<CorpusManager> {
    let ontology = match &run.ontology {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading ontology {}", path.display()))?;
            Ontology::from_json_str(&json)
                .with_context(|| format!("parsing ontology {}", path.display()))?
        }
        None => Ontology::new(),
    };
    let config = AssemblyConfig::default()
        .with_batch_size(run.batch_size)
        .with_workers(run.workers);
    Ok(CorpusManager::new(
        config,
        Box::new(OntologyComparator::new(ontology)),
    ))
}

fn cmd_ingest(data_dir: &PathBuf, input: &PathBuf) -> Result<()> {
    let store = FileStore::open(data_dir)?;
    let file = std::fs::File::open(input)
        .with_context(|| format!("opening {}", input.display()))?;
    let mut records = Vec::new();
    let mut bad_lines = 0usize;
    for (number, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<IngestLine>(&line) {
            Ok(parsed) => records.push(RawRecord::new(
                parsed.content.to_string(),
                parsed.evidence,
            )),
            Err(err) => {
                bad_lines += 1;
                tracing::warn!(line = number + 1, error = %err, "skipping malformed ingest line");
            }
        }
    }
    let total = records.len();
    let added = store.insert_raw_records(records)?;
    store.close()?;
    println!(
        "{} {} of {} records ({} malformed lines skipped)",
        "ingested".green().bold(),
        added,
        total,
        bad_lines
    );
    Ok(())
}

fn cmd_run(data_dir: &PathBuf, run: &RunArgs, supplement: bool) -> Result<()> {
    let manager = open_manager(run)?;
    let store = FileStore::open(data_dir)?;
    let checkpoints = FsCheckpointStore::open(data_dir.join("checkpoints"))?;

    let completed = if supplement {
        manager.supplement_corpus(&store, &store, &checkpoints, run.continuing)?
    } else {
        manager.create_corpus(&store, &store, &checkpoints, run.continuing)?
    };
    store.close()?;

    if completed {
        println!("{}", "run complete".green().bold());
        Ok(())
    } else {
        Err(anyhow!("run did not complete"))
    }
}

fn cmd_status(data_dir: &PathBuf) -> Result<()> {
    let store = FileStore::open(data_dir)?;
    let hashes = store.known_hashes()?;
    let links = store.existing_refinement_links()?;
    let linked = store.linked_record_ids()?;

    println!("{}", "corpus status".bold());
    println!("  canonical records: {}", hashes.len());
    println!("  evidence-linked raw records: {}", linked.len());
    println!("  refinement links: {}", links.len());
    match store.latest_update_time()? {
        Some(time) => println!("  last update: {}", time.to_rfc3339().cyan()),
        None => println!("  last update: {}", "never".yellow()),
    }
    Ok(())
}

fn cmd_show(data_dir: &PathBuf, hash: i64) -> Result<()> {
    let store = FileStore::open(data_dir)?;
    let hash = ShallowHash(hash);
    let record = store
        .canonical_record(hash)?
        .ok_or_else(|| anyhow!("no canonical record with hash {hash}"))?;

    println!("{} {}", "hash".bold(), record.hash);
    println!(
        "{}\n{}",
        "content".bold(),
        serde_json::to_string_pretty(&record.content)?
    );

    let evidence = store.evidence_for(hash)?;
    println!("{} ({})", "evidence records".bold(), evidence.len());
    for id in evidence {
        println!("  {id}");
    }

    let links = store.links_touching(hash)?;
    println!("{} ({})", "refinement links".bold(), links.len());
    for link in links {
        if link.general == hash {
            println!("  refined by {}", link.specific.to_string().cyan());
        } else {
            println!("  refines {}", link.general.to_string().cyan());
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match &cli.command {
        Commands::Ingest { input } => cmd_ingest(&cli.data_dir, input),
        Commands::Create { run } => cmd_run(&cli.data_dir, run, false),
        Commands::Supplement { run } => cmd_run(&cli.data_dir, run, true),
        Commands::Status => cmd_status(&cli.data_dir),
        Commands::Show { hash } => cmd_show(&cli.data_dir, *hash),
    }
}
