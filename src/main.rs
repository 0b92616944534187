use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use pinserve::{CompressionLevels, ServerConfig, ServerState};
use tokio::net::TcpListener;
use tracing::{error, info};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Pretty,
    Compact,
    Json,
}

/// Serve a directory from memory: files are read, templated, and
/// precompressed once at startup, then handed out without touching disk.
#[derive(Debug, Parser)]
#[command(name = "pinserve", version, about)]
struct Args {
    /// Directory to serve
    #[arg(default_value = "public")]
    root: PathBuf,

    /// Port to listen on
    #[arg(short, long, default_value = "3000", env = "PORT")]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    host: String,

    /// Serve the root route for unmatched paths (client-side routing)
    #[arg(long, env = "SPA_MODE")]
    spa: bool,

    /// Re-check file mtimes on lookup and rebuild modified routes
    #[arg(long, env = "DEV_MODE")]
    dev: bool,

    /// Environment variable prefix exposed to templates, stripped from the
    /// variable name
    #[arg(long, default_value = "VITE_", env = "CONFIG_PREFIX")]
    config_prefix: String,

    /// Template CSS/JS/JSON assets in addition to HTML
    #[arg(long)]
    template_assets: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormat,
}

fn init_logging(format: LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.log_format);

    let config = ServerConfig {
        root: args.root,
        spa_mode: args.spa,
        dev_mode: args.dev,
        config_prefix: args.config_prefix,
        template_assets: args.template_assets,
        levels: CompressionLevels::default(),
    };

    let state = match ServerState::new(config) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!(error = %e, "startup failed");
            std::process::exit(1);
        }
    };

    if !state.builder.ctx.is_empty() {
        info!(prefix = %state.config.config_prefix, "template variables captured from environment");
    }

    let addr = format!("{}:{}", args.host, args.port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(address = %addr, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };

    info!(
        address = %addr,
        routes = state.cache.entry_count(),
        root = %state.config.root.display(),
        spa = state.config.spa_mode,
        dev = state.config.dev_mode,
        "serving preloaded file tree"
    );

    if let Err(e) = pinserve::server::run(state, listener).await {
        error!(error = %e, "server error");
        std::process::exit(1);
    }
}
