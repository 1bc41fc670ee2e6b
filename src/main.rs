use clap::Parser;
use miette::{IntoDiagnostic, Result};
use rxflow::application::engine::Engine;
use rxflow::config::AppConfig;
use rxflow::domain::ports::Repositories;
use rxflow::infrastructure::{self, in_memory};
use rxflow::interfaces::csv::event_reader::EventReader;
use rxflow::interfaces::csv::order_writer::OrderWriter;
use rxflow::interfaces::replay;
use std::fs::File;
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Events CSV file to replay
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Configuration file. Defaults to rxflow.toml in the working directory.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn init_tracing(fallback_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(fallback_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

#[cfg(feature = "storage-rocksdb")]
fn open_repositories(db_path: Option<PathBuf>) -> Result<Repositories> {
    match db_path {
        Some(path) => {
            let store = infrastructure::rocksdb::RocksDbStore::open(path).into_diagnostic()?;
            Ok(store.repositories())
        }
        None => Ok(in_memory::repositories()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_repositories(db_path: Option<PathBuf>) -> Result<Repositories> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(in_memory::repositories())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    AppConfig::load_env_file();
    let config = AppConfig::load(cli.config.as_deref()).into_diagnostic()?;
    init_tracing(&config.log_level);

    let repos = open_repositories(cli.db_path)?;
    let transport = infrastructure::chat_transport(&config.chat).into_diagnostic()?;
    let courier = infrastructure::courier_client(&config.courier).into_diagnostic()?;
    let engine = Engine::new(repos, transport, courier, config.courier.timeout());

    for pharmacy in &config.pharmacies {
        engine
            .register_pharmacy(pharmacy.to_pharmacy())
            .await
            .into_diagnostic()?;
    }

    let file = File::open(cli.input).into_diagnostic()?;
    let reader = EventReader::new(file);
    for event in reader.events() {
        match event {
            Ok(event) => {
                if let Err(e) = replay::apply(&engine, event).await {
                    eprintln!("Error processing event: {}", e);
                }
            }
            Err(e) => {
                eprintln!("Error reading event: {}", e);
            }
        }
    }

    let summaries = replay::summaries(&engine).await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = OrderWriter::new(stdout.lock());
    writer.write_orders(summaries).into_diagnostic()?;

    Ok(())
}
