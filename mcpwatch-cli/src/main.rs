// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! mcpwatch CLI
//!
//! Inspect configuration and drive the engine with synthetic traffic.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mcpwatch_core::{
    instrument, ClientInfo, Clock, ConnectionEvent, ConnectionEventKind, LogFormat, ManualClock,
    MonitorConfig, MonitoringSink, ToolCallEvent, ToolGroup, Window,
};
use mcpwatch_query::Monitor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const SEC_US: u64 = 1_000_000;

const USER_AGENTS: [&str; 6] = [
    "claude-code/1.0.43",
    "Cursor/0.48.2",
    "vscode-mcp/1.2.0",
    "windsurf/1.9.1",
    "mcp-inspector/0.14.0",
    "curl/8.5.0",
];

#[derive(Parser)]
#[command(name = "mcpwatch")]
#[command(about = "mcpwatch - MCP tool telemetry engine", long_about = None)]
struct Cli {
    /// Configuration file (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose mode
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration
    Config {
        /// Ignore MCPWATCH_* environment overrides
        #[arg(long)]
        no_env: bool,
    },

    /// Replay synthetic traffic on a simulated clock and print snapshots
    Simulate(SimulateArgs),

    /// Feed live traffic on the wall clock with the background reconciler
    Live {
        /// How long to run
        #[arg(long, default_value = "10")]
        duration_secs: u64,

        /// Tool calls per second
        #[arg(long, default_value = "50")]
        rate: u64,
    },
}

#[derive(Args, Debug, Clone)]
struct SimulateArgs {
    /// Tool calls to generate
    #[arg(default_value = "5000")]
    calls: usize,

    /// Simulated span of traffic in seconds
    #[arg(long, default_value = "3600")]
    span_secs: u64,

    /// Distinct sessions
    #[arg(long, default_value = "12")]
    sessions: usize,

    /// Fraction of calls that fail
    #[arg(long, default_value = "0.03")]
    error_rate: f64,

    /// Window to report (5m, 1h, 24h)
    #[arg(short, long, default_value = "1h")]
    window: String,

    /// Tool to include a detail snapshot for
    #[arg(long, default_value = "searchSpringDocs")]
    tool: String,

    /// RNG seed
    #[arg(long, default_value = "42")]
    seed: u64,
}

#[derive(Serialize)]
struct SimulationReport {
    overview: mcpwatch_query::OverviewSnapshot,
    groups: Vec<mcpwatch_query::GroupSnapshot>,
    clients: mcpwatch_query::ClientUsageSnapshot,
    detail: mcpwatch_query::ToolDetailSnapshot,
    engine: mcpwatch_query::EngineStats,
}

fn load_config(path: Option<&Path>, apply_env: bool) -> Result<MonitorConfig> {
    let mut config = match path {
        Some(p) => MonitorConfig::from_toml_file(p)
            .with_context(|| format!("Failed to load config from {:?}", p))?,
        None => MonitorConfig::default(),
    };
    if apply_env {
        config
            .apply_env_overrides()
            .context("Invalid MCPWATCH_* override")?;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn all_tools() -> Vec<&'static str> {
    ToolGroup::STATIC
        .iter()
        .flat_map(|g| g.tools().iter().copied())
        .collect()
}

/// Skewed pick: low indices are called far more often.
fn pick_tool<'a>(rng: &mut StdRng, tools: &[&'a str]) -> &'a str {
    let r: f64 = rng.gen();
    let idx = ((r * r * r) * tools.len() as f64) as usize;
    tools[idx.min(tools.len() - 1)]
}

fn latency_for(rng: &mut StdRng, tool: &str) -> u64 {
    let base = 5 + (tool.len() as u64 % 7) * 15;
    let jitter: f64 = rng.gen_range(0.0..1.0);
    // Occasional slow tail.
    let tail = if rng.gen_bool(0.02) { 400 } else { 0 };
    base + (jitter * base as f64) as u64 + tail
}

fn run_simulation(config: MonitorConfig, args: &SimulateArgs) -> Result<SimulationReport> {
    let window: Window = args.window.parse()?;
    let start_us = mcpwatch_core::SystemClock.now_us();
    let clock = Arc::new(ManualClock::new(start_us));
    let monitor = Monitor::with_clock(config, clock.clone())?;
    let mut rng = StdRng::seed_from_u64(args.seed);
    let tools = all_tools();
    let calls = args.calls;
    let span_secs = args.span_secs;
    let sessions = args.sessions.max(1);
    let error_rate = if args.error_rate.is_finite() {
        args.error_rate.clamp(0.0, 1.0)
    } else {
        0.0
    };

    for s in 0..sessions {
        let info = ClientInfo::new()
            .with(ClientInfo::USER_AGENT, USER_AGENTS[s % USER_AGENTS.len()])
            .with(ClientInfo::PROTOCOL, "HTTP/1.1");
        monitor.record_connection(
            ConnectionEvent::new(format!("sim-{}", s), ConnectionEventKind::Connected, start_us)
                .with_client_info(info)
                .with_protocol_version("2025-03-26"),
        );
    }

    let step_us = span_secs.saturating_mul(SEC_US) / calls.max(1) as u64;
    let reconcile_every = monitor.config().registry.reconcile_interval_secs * SEC_US;
    let mut last_reconcile = start_us;

    for i in 0..calls {
        clock.advance(Duration::from_micros(step_us));
        let now = clock.now_us();
        let name = pick_tool(&mut rng, &tools);
        let duration = latency_for(&mut rng, name);
        let session = format!("sim-{}", i % sessions);

        let event = if rng.gen_bool(error_rate) {
            ToolCallEvent::error(name, duration, now, "upstream documentation lookup failed")
        } else {
            ToolCallEvent::success(name, duration, now)
        };
        monitor.record_tool_event(event.with_session(session));

        if now - last_reconcile >= reconcile_every {
            monitor.reconcile_now();
            last_reconcile = now;
        }
    }

    // A handful of sessions drop cleanly; the rest are left to expiry.
    for s in (0..sessions).step_by(3) {
        monitor.record_connection(ConnectionEvent::new(
            format!("sim-{}", s),
            ConnectionEventKind::Disconnected,
            clock.now_us(),
        ));
    }

    info!(calls, span_secs, sessions, "simulation complete");

    Ok(SimulationReport {
        overview: monitor.get_overview(window),
        groups: monitor.tool_groups(window),
        clients: monitor.client_usage(),
        detail: monitor.get_tool_detail(&args.tool, window),
        engine: monitor.engine_stats(),
    })
}

/// Interval between live calls; never zero.
fn tick_period(rate: u64) -> Duration {
    Duration::from_micros(SEC_US / rate.max(1)).max(Duration::from_micros(1))
}

async fn run_live(config: MonitorConfig, duration_secs: u64, rate: u64) -> Result<()> {
    let monitor = Arc::new(Monitor::new(config)?);
    let reconciler = monitor.spawn_reconciler();
    let tools = all_tools();
    let mut rng = StdRng::from_entropy();

    monitor.record_connection_event(
        "live-0",
        ConnectionEventKind::Connected,
        &ClientInfo::new().with(ClientInfo::USER_AGENT, "mcpwatch-cli/0.1.0"),
        Some("2025-03-26"),
    );

    let mut ticker = tokio::time::interval(tick_period(rate));
    let deadline = tokio::time::Instant::now() + Duration::from_secs(duration_secs);
    let mut report = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let name = pick_tool(&mut rng, &tools);
                let fails = rng.gen_bool(0.03);
                let _: std::result::Result<(), String> = instrument(monitor.as_ref(), name, || {
                    if fails { Err("simulated failure".to_string()) } else { Ok(()) }
                });
            }
            _ = report.tick() => {
                let overview = monitor.get_overview(Window::FiveMin);
                println!(
                    "requests={} errors={} avg={:.2}ms p95={:.2}ms active={}",
                    overview.total_requests,
                    overview.errors,
                    overview.avg_latency_ms,
                    overview.p95_latency_ms,
                    overview.active_connections,
                );
            }
            _ = tokio::time::sleep_until(deadline) => break,
        }
    }

    monitor.record_connection_event(
        "live-0",
        ConnectionEventKind::Disconnected,
        &ClientInfo::new(),
        None,
    );
    let passes = reconciler.shutdown().await;
    info!(passes, "live run finished");
    print_json(&monitor.engine_stats())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let apply_env = !matches!(cli.command, Commands::Config { no_env: true });
    let mut config = load_config(cli.config.as_deref(), apply_env)?;
    if cli.verbose {
        config.log.filter = "debug".to_string();
    }
    if cli.json_logs {
        config.log.format = LogFormat::Json;
    }
    mcpwatch_telemetry::init_logging(&config.log)?;

    match cli.command {
        Commands::Config { .. } => {
            print!("{}", config.to_toml_string()?);
        }

        Commands::Simulate(args) => {
            let report = run_simulation(config, &args)?;
            print_json(&report)?;
        }

        Commands::Live {
            duration_secs,
            rate,
        } => {
            run_live(config, duration_secs, rate).await?;
        }
    }

    Ok(())
}
