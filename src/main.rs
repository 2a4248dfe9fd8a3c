//! CLI entry point: `serve` runs the HTTP + MCP server, `check` validates a
//! publisher config and exits without binding a socket.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use publisher::config::PublisherConfig;
use publisher::malloy::FakeMalloyRuntime;
use publisher::state::AppState;
use publisher::{http, mcp};

#[derive(Parser)]
#[command(name = "publisher-server", about = "Multi-tenant Malloy data-modeling publisher")]
struct Cli {
    #[arg(long, global = true)]
    verbose: bool,
    #[arg(long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP and MCP server.
    Serve {
        #[arg(long, env = "SERVER_ROOT", default_value = ".")]
        server_root: PathBuf,
        #[arg(long, env = "PUBLISHER_HOST", default_value = "localhost")]
        host: String,
        #[arg(long, env = "PUBLISHER_PORT", default_value_t = 4000)]
        port: u16,
    },
    /// Validate a publisher config and exit.
    Check {
        #[arg(long, env = "SERVER_ROOT", default_value = ".")]
        server_root: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    publisher::observability::init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Serve { server_root, host, port } => serve(server_root, host, port).await,
        Command::Check { server_root } => check(server_root),
    }
}

async fn serve(server_root: PathBuf, host: String, port: u16) -> anyhow::Result<()> {
    // The real Malloy compiler/runtime is out of scope (spec §1); this binds
    // the server to the deterministic fake so `serve` is runnable end to end
    // against the REST and MCP surfaces without vendoring the compiler.
    let runtime = Arc::new(FakeMalloyRuntime::new());
    let state = AppState::init(server_root, runtime)
        .await
        .map_err(|e| anyhow::anyhow!("failed to initialize catalog: {}", e.kind))?;

    if state.store.is_frozen() {
        tracing::info!("server configuration is frozen; mutating operations are disabled");
    }

    let app = http::router(state.clone()).merge(mcp::transport::router(state));

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .or_else(|_| format!("127.0.0.1:{port}").parse())
        .map_err(|e| anyhow::anyhow!("invalid bind address: {e}"))?;

    tracing::info!(%addr, "starting publisher server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn check(server_root: PathBuf) -> anyhow::Result<()> {
    let config = PublisherConfig::load(&server_root)?;
    println!(
        "config valid: {} project(s), frozenConfig={}",
        config.projects.len(),
        config.frozen_config
    );
    Ok(())
}
