use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::signal;
use tracing::{info, warn};
use vela_api::ClusterConnection;
use vela_model::KINDS;
use vela_store::{ManagedStore, Namespaces, StoreConfig};

#[derive(Parser, Debug)]
#[command(name = "velactl", version, about = "Vela CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Namespaces to sync, comma separated ("" or "*" for all)
    #[arg(long = "ns", global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json, Yaml }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the supported kinds
    Kinds,
    /// List cached objects of a kind once synced
    Ls {
        /// Kind or resource name, e.g. "Pod" or "deployments"
        kind: String,
        /// Print full objects instead of summary rows
        #[arg(long = "full")]
        full: bool,
    },
    /// Watch a kind and print +/- changes
    Watch {
        /// Kind or resource name, e.g. "Pod" or "deployments"
        kind: String,
    },
    /// Workload counts and status breakdown
    Overview,
}

fn init_tracing() {
    let env = std::env::var("VELA_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("VELA_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid VELA_METRICS_ADDR; expected host:port");
        }
    }
}

fn emit<T: Serialize>(output: Output, value: &T) -> Result<()> {
    match output {
        Output::Yaml => print!("{}", serde_yaml::to_string(value)?),
        Output::Json | Output::Human => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

async fn connect(ns: &Namespaces) -> Result<ClusterConnection> {
    ClusterConnection::connect(StoreConfig::from_env().with_namespaces(ns.clone())).await
}

/// Start `store` and wait (bounded by VELA_WAIT_SECS) for its first full sync.
async fn wait_synced(store: &Arc<dyn ManagedStore>) -> bool {
    let wait_secs = std::env::var("VELA_WAIT_SECS").ok().and_then(|s| s.parse::<u64>().ok()).unwrap_or(8);
    let mut rx = store.subscribe();
    let deadline = Instant::now() + Duration::from_secs(wait_secs);
    loop {
        if rx.borrow_and_update().state.is_synced() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        let rem = deadline.duration_since(now).min(Duration::from_secs(2));
        match tokio::time::timeout(rem, rx.changed()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return false,
            Err(_) => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let ns = cli.namespace.as_deref().map(Namespaces::parse).unwrap_or_default();

    match cli.command {
        Commands::Kinds => {
            #[derive(Serialize)]
            struct Row { kind: &'static str, api: &'static str, namespaced: bool }
            let rows: Vec<_> =
                KINDS.iter().map(|k| Row { kind: k.kind, api: k.api_base, namespaced: k.namespaced }).collect();
            match cli.output {
                Output::Human => {
                    for r in &rows {
                        let scope = if r.namespaced { "namespaced" } else { "cluster" };
                        println!("{} • {} • {}", r.api, r.kind, scope);
                    }
                }
                out => emit(out, &rows)?,
            }
        }
        Commands::Ls { kind, full } => {
            info!(kind = %kind, ns = ?ns, "ls invoked");
            let conn = connect(&ns).await?;
            let store = conn.store_named(&kind)?;
            if !wait_synced(&store).await {
                warn!(kind = %kind, state = %store.state(), "store not synced; listing partial cache");
            }
            match (cli.output, full) {
                (Output::Human, _) => {
                    println!("{:<20} {:<40} {}", "NAMESPACE", "NAME", "AGE");
                    for row in store.summaries(&ns) {
                        let ns_col = row.namespace.as_deref().unwrap_or("-");
                        println!("{:<20} {:<40} {}", ns_col, row.name, row.age);
                    }
                }
                (out, true) => emit(out, &store.values(&ns))?,
                (out, false) => emit(out, &store.summaries(&ns))?,
            }
            conn.close();
        }
        Commands::Watch { kind } => {
            info!(kind = %kind, ns = ?ns, "watch invoked");
            let conn = connect(&ns).await?;
            let store = conn.store_named(&kind)?;
            let mut rx = store.subscribe();
            // uid -> (resourceVersion, ns/name)
            let mut seen: HashMap<String, (String, String)> = HashMap::new();
            loop {
                tokio::select! {
                    changed = rx.changed() => {
                        if changed.is_err() {
                            warn!("store signal closed; exiting watch loop");
                            break;
                        }
                        let current = rx.borrow_and_update().clone();
                        let rows = store.summaries(&ns);
                        let mut next = HashMap::with_capacity(rows.len());
                        for row in rows {
                            let key = match &row.namespace {
                                Some(n) => format!("{}/{}", n, row.name),
                                None => row.name.clone(),
                            };
                            if seen.get(&row.uid).map(|(rv, _)| rv) != Some(&row.resource_version) {
                                println!("+ {}", key);
                            }
                            next.insert(row.uid, (row.resource_version, key));
                        }
                        for (uid, (_, key)) in &seen {
                            if !next.contains_key(uid) {
                                println!("- {}", key);
                            }
                        }
                        seen = next;
                        if matches!(cli.output, Output::Human) {
                            eprintln!("epoch={} state={} objects={}", current.epoch, current.state, seen.len());
                        }
                    }
                    _ = signal::ctrl_c() => {
                        info!("Ctrl-C received; shutting down watch loop");
                        break;
                    }
                }
            }
            conn.close();
        }
        Commands::Overview => {
            info!(ns = ?ns, "overview invoked");
            let conn = connect(&ns).await?;
            for kind in ["Pod", "Deployment", "DaemonSet", "StatefulSet", "ReplicaSet", "Job"] {
                let store = conn.store_named(kind)?;
                if !wait_synced(&store).await {
                    warn!(kind, state = %store.state(), "store not synced; overview may be partial");
                }
            }
            let overview = conn.workloads_overview(&ns)?;
            match cli.output {
                Output::Human => {
                    println!("{:<12} {:>6}  {}", "KIND", "COUNT", "STATUS");
                    for row in &overview {
                        let statuses: Vec<_> = row.statuses.iter().map(|(p, n)| format!("{}={}", p, n)).collect();
                        println!("{:<12} {:>6}  {}", row.kind, row.count, statuses.join(" "));
                    }
                }
                out => emit(out, &overview)?,
            }
            conn.close();
        }
    }

    Ok(())
}
