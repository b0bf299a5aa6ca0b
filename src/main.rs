use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use rcc_arbiter::api::{run_api, ApiState};
use rcc_arbiter::arbiter::ArbiterService;
use rcc_arbiter::config::{
    ArbiterConfig, BinarySpec, BinaryTable, RestartConfig, DEFAULT_AUTH_KEY,
};
use rcc_arbiter::shutdown::shutdown_signal;

#[derive(Parser, Debug)]
#[command(name = "rcc-arbiter")]
#[command(version)]
#[command(about = "Spawns, tracks and restarts RCC game servers")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the arbiter and its control API
    Serve(ServeArgs),
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Address to bind the control API to
    #[arg(long, default_value = "0.0.0.0")]
    bind: IpAddr,

    /// Port for the control API
    #[arg(long, default_value = "3000")]
    port: u16,

    /// Shared secret expected in the pjx-arbiterauth header
    #[arg(long, env = "ARBITER_AUTH_KEY", default_value = DEFAULT_AUTH_KEY, hide_env_values = true)]
    auth_key: String,

    /// First port handed to game servers
    #[arg(long, default_value = "7000")]
    base_port: u16,

    /// Number of game ports available from --base-port
    #[arg(long, default_value = "1000")]
    port_capacity: u16,

    /// Game server binary per year, format "year=path" (repeatable).
    /// Example: --binary 2011=/opt/rcc/RCC2011
    #[arg(long = "binary", value_name = "YEAR=PATH")]
    binaries: Vec<String>,

    /// Start with an empty binary table instead of the stock RCC builds
    #[arg(long)]
    no_default_binaries: bool,

    /// Delay before restarting a crashed game server
    #[arg(long, default_value = "3000")]
    respawn_delay_ms: u64,

    /// Give up restarting a workload after this many restarts (unlimited if unset)
    #[arg(long)]
    max_restarts: Option<u32>,

    /// Time a game server gets to exit after SIGTERM before it is SIGKILLed
    #[arg(long, default_value = "5000")]
    stop_grace_ms: u64,

    /// How long to wait for game servers to exit on shutdown
    #[arg(long, default_value = "10")]
    shutdown_grace_secs: u64,
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_binaries(entries: &[String], mut table: BinaryTable) -> BinaryTable {
    for entry in entries {
        match entry.split_once('=') {
            Some((year, path)) if !path.trim().is_empty() => match year.trim().parse::<u32>() {
                Ok(year) => table.insert(year, BinarySpec::new(path.trim())),
                Err(_) => tracing::warn!(entry, "Invalid year in binary entry, ignoring"),
            },
            _ => tracing::warn!(entry, "Invalid binary format, expected year=path"),
        }
    }
    table
}

// =============================================================================
// Server Implementation
// =============================================================================

async fn run_server(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let defaults = if args.no_default_binaries {
        BinaryTable::default()
    } else {
        BinaryTable::revival_defaults()
    };
    let binaries = parse_binaries(&args.binaries, defaults);
    if binaries.is_empty() {
        return Err("No game server binaries configured (use --binary year=path)".into());
    }

    if args.auth_key == DEFAULT_AUTH_KEY {
        tracing::warn!(
            "Using the built-in auth key. Set --auth-key or ARBITER_AUTH_KEY for production deployments."
        );
    }

    let config = ArbiterConfig {
        listen_addr: SocketAddr::new(args.bind, args.port),
        base_port: args.base_port,
        port_capacity: args.port_capacity,
        auth_key: args.auth_key,
        binaries,
        restart: RestartConfig {
            respawn_delay_ms: args.respawn_delay_ms,
            max_restarts: args.max_restarts,
        },
        stop_grace_ms: args.stop_grace_ms,
    };

    tracing::info!(
        listen_addr = %config.listen_addr,
        base_port = config.base_port,
        port_capacity = config.port_capacity,
        years = ?config.binaries.variants(),
        respawn_delay_ms = config.restart.respawn_delay_ms,
        max_restarts = ?config.restart.max_restarts,
        "Starting game arbiter"
    );

    let shutdown = shutdown_signal();
    let arbiter = Arc::new(ArbiterService::new(&config));
    let state = ApiState::new(arbiter.clone(), config.auth_key.clone());

    let served = run_api(config.listen_addr, state, shutdown.clone()).await;

    arbiter
        .shutdown(Duration::from_secs(args.shutdown_grace_secs))
        .await;

    served?;
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Serve(serve_args) => {
            run_server(serve_args).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parse_binaries_adds_and_overrides() {
        let table = parse_binaries(
            &[
                "2011=/opt/rcc/RCC2011".to_string(),
                "2016 = /opt/rcc/RCC2016".to_string(),
            ],
            BinaryTable::revival_defaults(),
        );
        assert_eq!(
            table.get(2011).unwrap().path,
            PathBuf::from("/opt/rcc/RCC2011")
        );
        assert_eq!(
            table.get(2016).unwrap().path,
            PathBuf::from("/opt/rcc/RCC2016")
        );
        assert_eq!(table.variants(), vec![2008, 2011, 2015, 2016]);
    }

    #[test]
    fn parse_binaries_skips_malformed_entries() {
        let table = parse_binaries(
            &[
                "2011".to_string(),
                "abc=/opt/rcc".to_string(),
                "2012=".to_string(),
            ],
            BinaryTable::default(),
        );
        assert!(table.is_empty());
    }

    #[test]
    fn serve_args_defaults() {
        let args = Args::try_parse_from(["rcc-arbiter", "serve", "--no-default-binaries"]).unwrap();
        let Commands::Serve(serve) = args.command;
        assert_eq!(serve.port, 3000);
        assert_eq!(serve.base_port, 7000);
        assert_eq!(serve.respawn_delay_ms, 3000);
        assert!(serve.no_default_binaries);
        assert!(serve.max_restarts.is_none());
        assert_eq!(serve.stop_grace_ms, 5000);
    }
}
