use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ringstore_server::config::NodeConfig;
use ringstore_server::node::Node;
use ringstore_server::server::Server;

#[tokio::main]
async fn main() -> Result<()> {
    let config = NodeConfig::parse();

    // Bind before anything else so an ephemeral port (--port 0) is known
    // for the node id and the log file name.
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("binding {}:{}", config.host, config.port))?;
    let port = listener.local_addr()?.port();

    init_logging(&config, port)?;
    tracing::info!("Starting ringstore peer on {}:{port}", config.host);

    let node = Node::new(&config.host, port, config.replication_factor, config.consistency);
    match config.bootstrap() {
        Some((bootstrap_host, bootstrap_port)) => node.join(&bootstrap_host, bootstrap_port).await,
        None => tracing::info!(node_id = node.id(), "no bootstrap peer, creating a new ring"),
    }

    let server = Server::new(node.clone(), listener);
    let shutdown = server.shutdown_handle();
    let interrupted = node.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("caught interrupt, departing");
            interrupted.depart().await;
            shutdown.notify_one();
        }
    });

    server.run().await?;
    // Let any fire-and-forget sends from the departure finish before the
    // runtime goes away.
    node.drain().await;
    Ok(())
}

fn init_logging(config: &NodeConfig, port: u16) -> Result<()> {
    // JSON logs for production scraping (RINGSTORE_LOG_JSON=1),
    // human-readable otherwise.
    let json_logs = std::env::var("RINGSTORE_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env().add_directive("ringstore_server=info".parse()?);

    match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).with_context(|| format!("creating log dir {dir}"))?;
            let path = format!("{dir}/{port}.log");
            let file = std::fs::File::create(&path).with_context(|| format!("creating {path}"))?;
            let writer = Arc::new(file);
            if json_logs {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(writer)
                    .with_ansi(false)
                    .json()
                    .init();
            } else {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(writer)
                    .with_ansi(false)
                    .init();
            }
        }
        None => {
            if json_logs {
                tracing_subscriber::fmt().with_env_filter(filter).json().init();
            } else {
                tracing_subscriber::fmt().with_env_filter(filter).init();
            }
        }
    }
    Ok(())
}
