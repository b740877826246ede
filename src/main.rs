use std::process::ExitCode;
use clap::Parser;
use log::{error, info};
use ringjournal::config::load_config;
use ringjournal::Journal;
use tokio::io::BufReader;

#[derive(Parser, Debug)]
#[command(name = "ringjournal", about = "Append stdin lines to a ring buffer journal")]
struct Args {
    /// Path to the TOML config file.
    #[arg(short, long)]
    config: Option<String>,
    /// Override the configured buffer capacity in bytes.
    #[arg(long)]
    capacity: Option<usize>,
    /// Record kind written for every line.
    #[arg(short, long, default_value_t = 1)]
    kind: u8,
}

fn get_config_path() -> String {
    if let Ok(home) = std::env::var("HOME") {
        format!("{}/.config/ringjournal/config.toml", home)
    } else {
        "/etc/ringjournal/config.toml".to_string()
    }
}

async fn run(args: Args, mut journal: Journal) -> Result<(), ringjournal::Error> {
    let stdin = BufReader::new(tokio::io::stdin());
    let ingested = journal.ingest(args.kind, stdin).await;
    if let Err(e) = &ingested {
        error!("Stopped reading stdin: {}", e);
    }
    // Flush what was appended even when reading failed.
    journal.close().await?;
    ingested.map(|n| info!("Appended {} records from stdin", n))
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    env_logger::init();

    let args = Args::parse();
    let config_path = args.config.clone().unwrap_or_else(get_config_path);
    let mut cfg = match load_config(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(1);
        }
    };
    if let Some(capacity) = args.capacity {
        cfg.capacity = capacity;
    }

    let journal = match Journal::from_config(cfg) {
        Ok(j) => j,
        Err(e) => {
            error!("Failed to initialize journal: {}", e);
            return ExitCode::from(e.to_status_code() as u8);
        }
    };
    info!("Journal of {} bytes ready, reading stdin", journal.buffer().size());

    if let Err(e) = run(args, journal).await {
        error!("Journal error: {}", e);
        return ExitCode::from(e.to_status_code() as u8);
    }

    ExitCode::SUCCESS
}
