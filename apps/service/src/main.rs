mod config;
mod database;
mod events;
mod handlers;
mod integrations;
mod monitoring;
mod orchestrator;
mod pool;
mod validation;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use logger::{LevelFilter, init_tracing, init_tracing_with_level};
use tracing::info;

use crate::config::Config;
use crate::database::models::NewMonitor;
use crate::integrations::IntegrationRepository;
use crate::monitoring::types::HttpMethod;
use crate::orchestrator::App;
use crate::validation::validate_new_monitor;

#[derive(Parser)]
#[command(name = "vigil", version, about = "Uptime and SSL certificate monitoring")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitoring engine until Ctrl-C (default)
    Run,
    /// Print the effective configuration
    Config,
    /// Manage stored monitors
    #[command(subcommand)]
    Monitor(MonitorCommands),
}

#[derive(Subcommand)]
enum MonitorCommands {
    /// Add a monitor
    Add(AddMonitor),
    /// List all monitors
    List,
    /// Remove a monitor and its history
    Remove { id: i64 },
}

#[derive(Args)]
struct AddMonitor {
    #[arg(long)]
    name: String,
    #[arg(long)]
    url: String,
    /// Uptime check interval in seconds
    #[arg(long, default_value_t = 60)]
    interval: u64,
    #[arg(long, default_value = "GET")]
    method: HttpMethod,
    #[arg(long)]
    no_follow_redirects: bool,
    #[arg(long)]
    allow_cache: bool,
    /// Enable the daily SSL certificate check
    #[arg(long)]
    ssl: bool,
    #[arg(long, default_value_t = 30)]
    ssl_expiry_threshold: u32,
    #[arg(long)]
    no_latency_history: bool,
    /// Integration ids in `type:name` form
    #[arg(long = "integration")]
    integrations: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if cli.verbose {
        init_tracing_with_level(LevelFilter::DEBUG);
    } else {
        init_tracing();
    }

    let config = Config::from_config(cli.config.as_ref()).context("Failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            info!("Starting vigil");
            App::bootstrap(config).await?.run_until_shutdown().await
        }
        Commands::Config => {
            println!("{config}");
            Ok(())
        }
        Commands::Monitor(command) => run_monitor_command(&config, command).await,
    }
}

/// Storage-level monitor management; a running service picks changes up on restart
async fn run_monitor_command(config: &Config, command: MonitorCommands) -> Result<()> {
    let database = App::open_database(config).await?;

    match command {
        MonitorCommands::Add(args) => {
            let integrations = IntegrationRepository::new(config.integrations.to_configs(), config.smtp.is_some())?;
            let mut new_monitor = NewMonitor::new(args.name, args.url);
            new_monitor.uptime_check_interval = args.interval;
            new_monitor.request_method = args.method;
            new_monitor.follow_redirects = !args.no_follow_redirects;
            new_monitor.force_no_cache = !args.allow_cache;
            new_monitor.ssl_check_enabled = args.ssl;
            new_monitor.ssl_expiry_threshold = args.ssl_expiry_threshold;
            new_monitor.latency_history_enabled = !args.no_latency_history;
            new_monitor.integrations = integrations.validate_integration_ids(&args.integrations)?;
            validate_new_monitor(&new_monitor).to_result()?;

            let monitor = database.insert_monitor(&new_monitor).await?;
            println!("Created monitor {} [{}] {}", monitor.id, monitor.name, monitor.url);
        }
        MonitorCommands::List => {
            for monitor in database.fetch_all().await? {
                let integrations: Vec<String> = monitor.integrations.iter().map(ToString::to_string).collect();
                println!(
                    "{:>5}  {:<24} {:<5} {:>6}s  enabled={} ssl={}  {}  [{}]",
                    monitor.id,
                    monitor.name,
                    monitor.request_method.as_str(),
                    monitor.uptime_check_interval,
                    monitor.enabled,
                    monitor.ssl_check_enabled,
                    monitor.url,
                    integrations.join(", ")
                );
            }
        }
        MonitorCommands::Remove { id } => {
            if !database.delete_monitor_by_id(id).await? {
                bail!("Monitor {id} not found");
            }
            println!("Removed monitor {id}");
        }
    }
    Ok(())
}
