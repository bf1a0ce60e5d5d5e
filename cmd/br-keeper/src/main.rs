use clap::{Parser, Subcommand};
use pkg_constants::paths::DEFAULT_KEEPER_CONFIG;
use pkg_constants::safepoint::EXIT_GC_EXCEEDED;
use pkg_pd::{MemoryPd, PdClient};
use pkg_safepoint::check_gc_safe_point;
use pkg_types::config::{KeeperConfigFile, load_config_file};
use pkg_types::safepoint::make_safe_point_id;
use pkg_types::tso;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod simulate;

#[derive(Parser, Debug)]
#[command(name = "br-keeper", about = "Keep a backup snapshot safe from GC")]
struct Cli {
    /// Path to YAML config file
    #[arg(long, short, default_value = DEFAULT_KEEPER_CONFIG)]
    config: String,

    /// Log filter (overridden by RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a fresh service safe point id
    MakeId,
    /// Decode a TSO into physical time and logical counter
    ParseTs {
        /// Raw 64-bit timestamp
        ts: u64,
    },
    /// Check a backup TS against a GC safe point
    Check {
        /// Global GC safe point to compare against
        #[arg(long)]
        gc_safe_point: u64,
        /// Backup TS to protect
        #[arg(long)]
        ts: u64,
    },
    /// Run a keeper against an in-memory PD with a simulated GC worker
    Simulate(simulate::SimulateArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config file (returns defaults if file not found)
    let file_cfg: KeeperConfigFile = load_config_file(&cli.config)?;
    file_cfg.validate()?;

    let level = cli
        .log_level
        .clone()
        .or_else(|| file_cfg.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    info!("Config file: {}", cli.config);

    match cli.command {
        Commands::MakeId => {
            println!("{}", make_safe_point_id());
        }
        Commands::ParseTs { ts } => {
            let (time, logical) = tso::parse_ts(ts);
            println!("physical: {} ({} ms)", time.to_rfc3339(), tso::extract_physical(ts));
            println!("logical:  {}", logical);
        }
        Commands::Check { gc_safe_point, ts } => {
            let pd = MemoryPd::new();
            pd.update_gc_safe_point(gc_safe_point).await?;
            match check_gc_safe_point(&pd, ts).await {
                Ok(()) => println!("ok: TS {} is above GC safe point {}", ts, gc_safe_point),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(EXIT_GC_EXCEEDED);
                }
            }
        }
        Commands::Simulate(args) => {
            simulate::run(args, &file_cfg).await?;
        }
    }

    Ok(())
}
