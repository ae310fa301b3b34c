//! Command-line interface for the wikt_graph library.
//!
//! Ingests source fetcher dumps into a SQLite word graph and reads it back.

use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{LevelFilter, error, info};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wikt_graph::{
    DEFAULT_TEXT_PREFIX_LEN, IngestOptions, SqliteStore, Store,
    error::Result,
    progress::{ProgressCallback, ProgressUpdate},
    source,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Word graph ingestion CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a custom database file (optional)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Set verbosity level (use -v, -vv, or -vvv for increasing verbosity)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest a source fetcher dump (JSON array or JSON lines, optionally .gz)
    Ingest {
        /// The dump file to read
        file: PathBuf,
        /// Characters of definition text used for definition ids
        #[arg(long, default_value_t = DEFAULT_TEXT_PREFIX_LEN)]
        text_prefix_len: usize,
        /// Build rows in parallel
        #[arg(long, default_value_t = false)]
        parallel: bool,
        /// Erase the stored graph before writing
        #[arg(long, default_value_t = false)]
        erase_first: bool,
    },
    /// Show stored definitions of a word
    Show {
        /// The word to show
        word: String,
    },
    /// Print row counts
    Stats,
    /// Erase all stored rows
    Erase,
}

/// Sets up logging based on verbosity level.
fn setup_logging(verbose: u8) {
    let log_level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter(None, log_level)
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .init();
}

/// Creates a progress callback drawing one bar per persistence pass.
fn create_progress_callback(
    multi_progress: MultiProgress,
    progress_bars: Arc<Mutex<HashMap<String, ProgressBar>>>,
) -> ProgressCallback {
    Box::new(move |update: ProgressUpdate| {
        let Ok(mut bars) = progress_bars.lock() else {
            return true;
        };

        if update.current_item == 0 && !bars.contains_key(&update.stage_description) {
            let pb = multi_progress.add(ProgressBar::new(update.total_items.unwrap_or(0)));
            if let Ok(style) = ProgressStyle::default_bar().template(
                "{prefix:>12.cyan.bold} [{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} ({percent}%) {msg}",
            ) {
                pb.set_style(style.progress_chars("##-"));
            }
            pb.set_prefix(update.stage_description.clone());
            pb.set_message(update.message.unwrap_or_default());
            pb.enable_steady_tick(Duration::from_millis(100));
            bars.insert(update.stage_description.clone(), pb);
        } else if let Some(pb) = bars.get(&update.stage_description) {
            pb.set_position(update.current_item);
            if let Some(msg) = update.message {
                pb.set_message(msg);
            }
            if let Some(total) = update.total_items {
                if update.current_item >= total {
                    pb.finish_and_clear();
                }
            }
        }
        true
    })
}

/// Main entry point for the CLI application.
fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let mut store = match SqliteStore::open_or_default(cli.db_path.as_deref()) {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open database: {}", e);
            eprintln!("{}", format!("Error: {}", e).red());
            std::process::exit(1);
        }
    };

    let outcome = match cli.command {
        Commands::Ingest {
            file,
            text_prefix_len,
            parallel,
            erase_first,
        } => {
            let options = IngestOptions {
                text_prefix_len,
                parallel,
                erase_first,
            };
            handle_ingest(&mut store, &file, &options)
        }
        Commands::Show { word } => handle_show(&store, &word),
        Commands::Stats => handle_stats(&store),
        Commands::Erase => {
            info!("Erasing database...");
            store
                .erase()
                .map(|_| println!("{}", "Database erased successfully.".green()))
        }
    };

    if let Err(e) = outcome {
        error!("Command failed: {}", e);
        eprintln!("{}", format!("Error: {}", e).red());
        std::process::exit(1);
    }
}

fn handle_ingest(store: &mut SqliteStore, file: &Path, options: &IngestOptions) -> Result<()> {
    let entries = source::read_entries(file)?;

    let multi_progress = MultiProgress::new();
    let progress_bars = Arc::new(Mutex::new(HashMap::<String, ProgressBar>::new()));
    let mut callback = create_progress_callback(multi_progress.clone(), progress_bars.clone());

    let result = wikt_graph::ingest(store, &entries, options, Some(&mut callback));

    if let Ok(bars) = progress_bars.lock() {
        for pb in bars.values() {
            pb.finish_and_clear();
        }
    }
    drop(multi_progress);
    std::io::stdout().flush().ok();

    let report = result?;
    println!(
        "{} {} entries read, {} dropped, {} malformed elements skipped",
        "Ingested:".bold(),
        report.assembly.entries,
        report.assembly.dropped_entries.to_string().yellow(),
        report.assembly.skipped_elements.to_string().yellow()
    );
    println!(
        "  words {}, definitions {}, appendix links {}, edges {} ({} already present)",
        report.persisted.words.to_string().green(),
        report.persisted.definitions.to_string().green(),
        report.persisted.appendix_links.to_string().green(),
        report.persisted.relationship_edges.to_string().green(),
        report.persisted.ignored.to_string().dimmed()
    );
    Ok(())
}

fn handle_show(store: &SqliteStore, word: &str) -> Result<()> {
    let definitions = store.lookup_definitions(word)?;
    if definitions.is_empty() {
        println!("No definitions found for '{}'.", word.yellow());
        return Ok(());
    }

    println!("\n{}", word.bold().cyan());
    for (i, def) in definitions.iter().enumerate() {
        println!(
            "  {} {}: {}",
            (i + 1).to_string().bold(),
            def.part_of_speech.italic(),
            def.text.trim()
        );
        let labels = store.appendix_labels(&def.id)?;
        if !labels.is_empty() {
            println!("        {}", labels.join(", ").dimmed());
        }

        let mut by_type: Vec<(String, Vec<String>)> = Vec::new();
        for related in store.related_words(&def.id)? {
            let shown = related
                .word
                .unwrap_or_else(|| format!("<{}>", related.word_id.get(..12).unwrap_or("?")));
            match by_type.iter_mut().find(|(t, _)| *t == related.relationship_type) {
                Some((_, words)) => words.push(shown),
                None => by_type.push((related.relationship_type, vec![shown])),
            }
        }
        for (rel_type, words) in by_type {
            println!("        {}: {}", rel_type.magenta(), words.join(", ").green());
        }
    }
    println!();
    Ok(())
}

fn handle_stats(store: &SqliteStore) -> Result<()> {
    let counts = store.table_counts()?;
    if let Some(path) = store.path() {
        println!("{} {}", "Database:".bold(), path.display());
    }
    println!("  words          {}", counts.words);
    println!("  definitions    {}", counts.definitions);
    println!("  appendix tags  {}", counts.appendix_tags);
    println!("  appendix links {}", counts.appendix_links);
    println!("  relationships  {}", counts.relationships);
    Ok(())
}
