// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SD-WAN Hub Route Audit CLI
//!
//! Finds edge-to-edge routes that gateways advertise but hubs are missing.
//!
//! # Usage
//!
//! ```bash
//! # Orchestrator and enterprise from the environment
//! VCO=vco.example.net ENT_ID=42 VCO_TOKEN=... velo-route-check
//!
//! # Only hubs whose name contains "igbn", fresh hub list
//! velo-route-check --config route-check.toml --hub-filter igbn --no-cache
//!
//! # Generate an example configuration
//! velo-route-check gen-config -o route-check.toml
//! ```

use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use velo_route_check::inventory::{filter_hubs_by_name, gateway_set};
use velo_route_check::report::{report_rows, write_missing_routes, write_routes_dump};
use velo_route_check::{
    collect_routes, compute_route_deltas, CheckConfig, GatewayResolver, HubCache, HubRecord,
    PortalClient, TargetKind, WsChannel,
};

/// SD-WAN Hub Route Audit
#[derive(Parser, Debug)]
#[command(name = "velo-route-check")]
#[command(about = "SD-WAN hub route audit - find gateway routes missing from hubs")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Orchestrator host name (overrides $VCO)
    #[arg(long)]
    vco: Option<String>,

    /// Enterprise id (overrides $ENT_ID)
    #[arg(long)]
    enterprise_id: Option<u64>,

    /// Only audit hubs whose name contains this string
    #[arg(long)]
    hub_filter: Option<String>,

    /// Segment queried on gateways
    #[arg(long)]
    segment_id: Option<i64>,

    /// Attempts per target before giving up
    #[arg(long)]
    max_tries: Option<u32>,

    /// Directory for the CSV report and route dump
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Ignore the cached hub list
    #[arg(long)]
    no_cache: bool,

    /// Skip writing routes_dump.json
    #[arg(long)]
    no_dump: bool,

    /// Skip TLS certificate verification
    #[arg(long)]
    insecure: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "route-check.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    init_logging(&args.log_level, args.log_file.as_deref())?;

    if let Some(cmd) = args.command {
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
        };
    }

    let config = build_config(&args)?;
    let token = config.token()?;

    run_check(&config, &token).await
}

fn init_logging(level: &str, log_file: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    Ok(())
}

fn build_config(args: &Args) -> Result<CheckConfig, velo_route_check::ConfigError> {
    let mut config = match args.config {
        Some(ref path) => CheckConfig::load(path)?,
        None => CheckConfig::default(),
    };

    config.apply_env()?;

    if let Some(ref vco) = args.vco {
        config.vco = vco.clone();
    }
    if let Some(enterprise_id) = args.enterprise_id {
        config.enterprise_id = enterprise_id;
    }
    if let Some(ref filter) = args.hub_filter {
        config.hub_name_filter = Some(filter.clone());
    }
    if let Some(segment_id) = args.segment_id {
        config.segment_id = segment_id;
    }
    if let Some(max_tries) = args.max_tries {
        config.max_tries = max_tries;
    }
    if let Some(ref dir) = args.output_dir {
        config.output_dir = dir.clone();
    }
    if args.no_cache {
        config.use_cache = false;
    }
    if args.no_dump {
        config.dump_all_routes = false;
    }
    if args.insecure {
        config.insecure_tls = true;
    }

    config.validate()?;
    Ok(config)
}

/// Hubs of the enterprise, from the cache when allowed.
async fn load_hubs(
    portal: &PortalClient,
    config: &CheckConfig,
) -> Result<Vec<HubRecord>, Box<dyn std::error::Error>> {
    let mut cache = HubCache::load(&config.cache_path);

    if config.use_cache {
        if let Some(hubs) = cache.hubs(config.enterprise_id) {
            info!("Using {} cached hubs from {}", hubs.len(), cache.path().display());
            return Ok(hubs.to_vec());
        }
    }

    let hubs = portal.hub_edges().await?;
    cache.store(config.enterprise_id, hubs.clone());
    if let Err(e) = cache.save() {
        warn!("Failed to write hub cache {}: {}", cache.path().display(), e);
    }

    Ok(hubs)
}

async fn run_check(config: &CheckConfig, token: &str) -> Result<(), Box<dyn std::error::Error>> {
    let portal = PortalClient::new(&config.vco, token, config.enterprise_id, config.insecure_tls)?;

    let enterprise_logical_id = portal.enterprise_logical_id().await?;
    info!("Enterprise logical ID: {}", enterprise_logical_id);

    let hubs = filter_hubs_by_name(
        load_hubs(&portal, config).await?,
        config.hub_name_filter.as_deref(),
    );
    if hubs.is_empty() {
        warn!("No hubs selected, nothing to check");
        return Ok(());
    }
    for hub in &hubs {
        info!("Hub: [{}] {}", hub.logical_id, hub.name);
    }

    let relevant = portal.relevant_gateways(&hubs).await?;
    let gateways = gateway_set(&relevant);
    info!("{} hubs peer with {} gateways", hubs.len(), gateways.len());

    let channel = WsChannel::connect(&config.vco, token, config.insecure_tls).await?;
    let (channel, collected, summary) = collect_routes(
        channel,
        config.session_options(),
        &hubs,
        &gateways,
        &enterprise_logical_id,
        config.segment_id,
    )
    .await?;
    if let Err(e) = channel.close().await {
        warn!("Websocket close failed: {}", e);
    }

    for (kind, label) in [(TargetKind::Edge, "hubs"), (TargetKind::Gateway, "gateways")] {
        let abandoned: Vec<&str> = summary.abandoned_ids(kind).collect();
        if !abandoned.is_empty() {
            warn!("No routes collected from {} {}: {:?}", abandoned.len(), label, abandoned);
        }
    }

    let report = compute_route_deltas(&hubs, &relevant, &collected);
    for cluster in report.incomplete_clusters() {
        warn!(
            "Cluster {} is missing route data from {:?}; its missing routes are unreliable",
            cluster.cluster_id, cluster.uncollected_members
        );
    }

    if report.missing.is_empty() {
        info!("No missing routes found");
    } else {
        info!("Found {} missing routes", report.missing.len());
    }

    let timestamp = chrono::Utc::now().timestamp();
    let rows = report_rows(&report, &hubs);
    let csv_path = write_missing_routes(&config.output_dir, timestamp, &rows)?;
    info!("Wrote results to {}", csv_path.display());

    if config.dump_all_routes {
        let dump_path = write_routes_dump(&config.output_dir, &report)?;
        info!("Wrote route dump to {}", dump_path.display());
    }

    Ok(())
}

fn cmd_gen_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::write(&output, CheckConfig::example_toml())?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    match CheckConfig::from_file(&config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Orchestrator: {}", config.vco);
            println!("Enterprise:   {}", config.enterprise_id);
            println!(
                "Hub filter:   {}",
                config.hub_name_filter.as_deref().unwrap_or("(all hubs)")
            );
            println!("Max tries:    {}", config.max_tries);
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}
