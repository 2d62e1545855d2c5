use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use sensor_bridge::DataManager;

#[derive(Parser)]
#[command(
    name = "sensor-bridge",
    version,
    about = "Sensor CSV ingest bridge for InfluxDB 2.x"
)]
struct Cli {
    /// Credentials file with url, token, org and bucket.
    #[arg(long, global = true, default_value = "config/credentials.yaml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the fixed diagnostic record.
    Demo,
    /// Import a headerless two-column CSV file.
    WriteCsv(WriteCsvArgs),
    /// Count records over a trailing window.
    Query(QueryArgs),
    /// Delete every record of a measurement.
    Delete(DeleteArgs),
}

#[derive(Args)]
struct WriteCsvArgs {
    #[arg(long)]
    file: PathBuf,
    #[arg(long)]
    measurement: String,
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[derive(Args)]
struct QueryArgs {
    #[arg(long, default_value = "1000d")]
    duration: String,
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[derive(Args)]
struct DeleteArgs {
    #[arg(long)]
    measurement: String,
}

fn init_tracing() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,sensor_bridge=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing()?;

    let mut manager = DataManager::from_file(&cli.config)?;
    match cli.command {
        Commands::Demo => manager.write_single_sample()?,
        Commands::WriteCsv(args) => {
            let imported = manager.write_csv(&args.file, &args.measurement, args.debug);
            println!("{imported}");
        }
        Commands::Query(args) => {
            let records = manager.query_range(&args.duration, args.debug)?;
            println!("{records}");
        }
        Commands::Delete(args) => {
            let deleted = manager.delete_measurement(&args.measurement)?;
            println!("{deleted}");
        }
    }
    manager.shutdown();
    Ok(())
}
