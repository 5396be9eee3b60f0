use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::Parser;
use shuttle_cli::{load_config, Scenario};
use shuttle_core::ShuttleConfig;
use tracing_subscriber::EnvFilter;

/// shuttle-sim - run a hub and its siblings in one process
#[derive(Parser, Debug)]
#[command(name = "shuttle-sim")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of sibling contexts next to the hub
    #[arg(long, default_value_t = 2)]
    siblings: u32,

    /// Siblings that start locked
    #[arg(long, value_delimiter = ',', default_values_t = [2])]
    locked: Vec<u32>,

    /// Leave locked siblings locked
    #[arg(long)]
    keep_locked: bool,

    /// Persist locker entries as JSON under this directory
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Hand off to each sibling only once
    #[arg(long)]
    dedupe: bool,
}

fn main() {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();

    let mut config = match &args.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
        None => ShuttleConfig::default(),
    };
    if args.dedupe {
        config.dedupe_unlock_events = true;
    }

    let scenario = Scenario {
        siblings: args.siblings,
        locked: args.locked.into_iter().collect::<BTreeSet<_>>(),
        unlock: !args.keep_locked,
        state_dir: args.state_dir,
        config,
    };

    match scenario.run() {
        Ok(notes) => {
            for note in notes {
                println!("[{}] {}", note.context, note.text);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
