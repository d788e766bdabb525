// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use hostwatch::{
    config::Config,
    models::{ScanDepth, Target},
    monitor::{LogGateway, Scheduler, check_target},
    probe::NetworkProber,
    scanner::{ScanService, SecurityScanner},
    storage::{FileScanStore, InMemoryStore, ScanStore},
};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Debug, Parser)]
#[command(version, about = "Monitors host reachability and runs security scans")]
struct Args {
    /// Path to the TOML configuration. Defaults are used when omitted.
    #[arg(short, long, env = "HOSTWATCH_CONFIG")]
    config: Option<PathBuf>,
    /// Prints more details while running.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Monitors all enabled targets until interrupted.
    Run,
    /// Checks a single target once and prints the aggregated status.
    Check {
        /// Id or name of a configured target.
        target: String,
    },
    /// Scans a single target and prints the scan record.
    Scan {
        /// Id or name of a configured target.
        target: String,
        #[arg(long)]
        quick: bool,
        /// Ports to scan in addition to the defaults, e.g. `8081,9443`.
        #[arg(long, value_delimiter = ',')]
        ports: Vec<u16>,
    },
}

fn find_target(config: &Config, needle: &str) -> Result<Target> {
    config
        .targets
        .iter()
        .find(|t| t.name == needle || t.id.to_string() == needle)
        .cloned()
        .ok_or_else(|| format!("no target with id or name '{needle}' configured").into())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn monitor(config: Config) -> Result<()> {
    let prober = Arc::new(NetworkProber::new(config.monitor.timeouts)?);
    let store = Arc::new(InMemoryStore::new(config.targets.clone()));
    let gateway = Arc::new(LogGateway::new(config.alerts.recipients.clone()));
    let handle = Scheduler::new(prober, store, gateway, &config.monitor, config.alerts).start();
    tracing::info!(targets = config.targets.len(), "Monitoring started");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    handle.stop().await?;
    Ok(())
}

async fn check(config: Config, target: &str) -> Result<()> {
    let target = find_target(&config, target)?;
    let prober = NetworkProber::new(config.monitor.timeouts)?;
    let status = check_target(&prober, &target).await?;
    print_json(&status)
}

async fn scan(config: Config, target: &str, quick: bool, ports: Vec<u16>) -> Result<()> {
    let target = find_target(&config, target)?;
    let store: Arc<dyn ScanStore> = match &config.storage.scan_dir {
        Some(dir) => Arc::new(FileScanStore::new(dir).await?),
        None => Arc::new(InMemoryStore::new(Vec::new())),
    };
    let mut options = config.scanner.options.clone();
    if quick {
        options.scan_depth = ScanDepth::Quick;
    }
    if !ports.is_empty() {
        options.custom_ports = ports;
    }
    let scanner = Arc::new(SecurityScanner::new(&config.scanner).await?);
    let service = ScanService::new(scanner, store, config.scanner.scan_timeout);
    let record = service.run_scan(target, options).await?;
    print_json(&record)
}

async fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.logging.clone().with_verbosity(args.verbose).init();
    match args.command {
        Command::Run => monitor(config).await,
        Command::Check { target } => check(config, &target).await,
        Command::Scan {
            target,
            quick,
            ports,
        } => scan(config, &target, quick, ports).await,
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(error) = run(args).await {
        tracing::error!(%error, "hostwatchd failed");
        eprintln!("{error}");
        std::process::exit(1);
    }
}
