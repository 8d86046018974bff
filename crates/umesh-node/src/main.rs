use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use umesh_node::{Node, NodeConfig};

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "umesh-node", about = "umesh mesh network node")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/umesh/config.toml")]
    config: PathBuf,

    /// Log output format. Defaults to `RUST_LOG_FORMAT`, then text.
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match NodeConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load config from {}: {e}", cli.config.display());
            std::process::exit(1);
        }
    };

    let format = cli.log_format.unwrap_or_else(|| {
        if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    });
    match format {
        LogFormat::Json => umesh_node::logging::init_json(&config.logging.level),
        LogFormat::Text => umesh_node::logging::init(&config.logging.level),
    }

    let mut node = match Node::new(config) {
        Ok(node) => node,
        Err(e) => {
            tracing::error!("failed to create node: {e}");
            std::process::exit(1);
        }
    };
    let handle = node.shutdown_handle();

    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received SIGINT, shutting down");
        handle.shutdown();
    });

    if let Err(e) = node.start() {
        tracing::error!("failed to start node: {e}");
        std::process::exit(1);
    }

    if let Err(e) = node.run().await {
        tracing::error!("node stopped with error: {e}");
    }
    node.shutdown();
}
