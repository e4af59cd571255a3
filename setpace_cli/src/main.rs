mod commands;
mod runner;

use clap::{Parser, Subcommand};
use runner::{spawn_line_reader, Runner, TerminalCues};
use setpace_core::*;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "setpace")]
#[command(about = "Run training blocks with protocol pacing and set logging", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the user id
    #[arg(long, global = true)]
    user: Option<String>,

    /// Debug logging
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a block interactively, reading commands from stdin
    Run {
        /// Block plan file (.json or .toml)
        #[arg(long, conflicts_with = "demo", required_unless_present = "demo")]
        block: Option<PathBuf>,

        /// Run a built-in demo block
        #[arg(long)]
        demo: Option<String>,

        /// Finish without confirmation even if nothing was recorded
        #[arg(long)]
        yes: bool,
    },

    /// List the built-in demo blocks
    Blocks,

    /// Show the last weight used for an exercise in a given context
    LastWeight {
        #[arg(long)]
        exercise: String,

        #[arg(long, default_value = "freeform")]
        protocol: String,

        #[arg(long, default_value = "strength")]
        block_type: String,
    },

    /// Export committed sets to CSV
    Export {
        /// Output file (defaults to sets.csv in the data directory)
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        setpace_core::logging::init_with_level("debug");
    } else {
        setpace_core::logging::init();
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(data_dir) = cli.data_dir {
        config.data.data_dir = data_dir;
    }
    if let Some(user) = cli.user {
        config.user.id = user;
    }

    match cli.command {
        Commands::Run { block, demo, yes } => cmd_run(&config, block, demo, yes),
        Commands::Blocks => cmd_blocks(),
        Commands::LastWeight {
            exercise,
            protocol,
            block_type,
        } => cmd_last_weight(&config, &exercise, &protocol, &block_type),
        Commands::Export { out } => cmd_export(&config, out),
    }
}

fn cmd_run(
    config: &Config,
    block_path: Option<PathBuf>,
    demo: Option<String>,
    assume_yes: bool,
) -> Result<()> {
    let block = match (block_path, demo) {
        (Some(path), _) => load_block(&path)?,
        (None, Some(id)) => demo_block(&id)
            .ok_or_else(|| Error::Plan(format!("No demo block named '{}'", id)))?,
        (None, None) => return Err(Error::Plan("Pass --block or --demo".into())),
    };

    let store = FileHistoryStore::new(config.data.results_path(), config.data.adjustments_path());
    let recommendations = HistoryResolver::new(&store, &config.user.id).resolve_block(&block);

    let mut session = BlockSession::new(
        block,
        config.user.id.clone(),
        config.engine.clone(),
        Arc::new(SystemTimeSource::new()),
        Arc::new(TerminalCues),
    );
    session.attach_recommendations(recommendations);

    let lines = spawn_line_reader(BufReader::new(io::stdin()));
    let mut runner = Runner::new(io::stdout(), assume_yes, config.engine.poll_interval());
    let Some(result) = runner.run(session, lines)? else {
        return Ok(());
    };

    let mut sink = JsonlSink::new(config.data.results_path());
    if let Err(e) = sink.append(&result) {
        eprintln!("Failed to save result: {}", e);
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Err(e);
    }

    println!("\n✓ Block {} saved", result.block_id);
    println!("  Elapsed: {}s", result.elapsed_seconds);
    for (id, volume) in result
        .exercise_ids
        .iter()
        .zip(&result.reps_or_volume_per_exercise)
    {
        println!("  {}: {}", id, volume);
    }
    Ok(())
}

fn cmd_blocks() -> Result<()> {
    for block in demo_blocks() {
        println!(
            "{:<24} {:<9} {:<13} {}",
            block.id,
            block.protocol.as_str(),
            block.block_type.label(),
            block.name
        );
    }
    Ok(())
}

fn cmd_last_weight(config: &Config, exercise: &str, protocol: &str, block_type: &str) -> Result<()> {
    let store = FileHistoryStore::new(config.data.results_path(), config.data.adjustments_path());
    let context = LookupContext {
        protocol: Protocol::parse(protocol),
        block_type: BlockType::parse(block_type),
    };

    match store.last_weight_by_context(&config.user.id, exercise, &context)? {
        Some(found) => {
            let matched = match found.matched {
                ContextMatch::Exact => "exact",
                ContextMatch::Any => "any",
            };
            println!(
                "{}: {} ({} match, {})",
                exercise, found.weight, matched, found.context_label
            );
        }
        None => println!("No history for {}", exercise),
    }
    Ok(())
}

fn cmd_export(config: &Config, out: Option<PathBuf>) -> Result<()> {
    let csv_path = out.unwrap_or_else(|| config.data.sets_csv_path());
    let results_path = config.data.results_path();

    if !results_path.exists() {
        println!("No results found - nothing to export.");
        return Ok(());
    }

    let count = export_sets_csv(&results_path, &csv_path)?;
    println!("✓ Exported {} sets to CSV", count);
    println!("  CSV: {}", csv_path.display());
    Ok(())
}
