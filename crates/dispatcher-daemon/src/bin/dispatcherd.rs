use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use dispatcher::Registry;
use dispatcher_daemon::config::DaemonConfig;
use dispatcher_daemon::connection::{ConnectionManager, LogFailback};
use dispatcher_daemon::ingress::serve_ingress;
use dispatcher_daemon::tunnel::serve_tunnels;

#[derive(Parser, Debug)]
#[command(name = "dispatcherd")]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides `ingress.listen` from the config file.
    #[arg(long)]
    ingress: Option<String>,
    /// Overrides `tunnel.listen` from the config file.
    #[arg(long)]
    tunnel: Option<String>,
}

fn parse_addr(value: &str) -> io::Result<SocketAddr> {
    value.parse().map_err(|err| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid listen address {}: {}", value, err),
        )
    })
}

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => DaemonConfig::load(path)?,
        None => DaemonConfig::default(),
    };
    if let Some(ingress) = args.ingress {
        config.ingress.listen = ingress;
    }
    if let Some(tunnel) = args.tunnel {
        config.tunnel.listen = tunnel;
    }

    let ingress_addr = parse_addr(&config.ingress.listen)?;
    let tunnel_addr = parse_addr(&config.tunnel.listen)?;

    let registry = Arc::new(Registry::new(config.registry));
    let manager = Arc::new(ConnectionManager::new(registry.clone(), Arc::new(LogFailback)));

    let tunnels = TcpListener::bind(tunnel_addr).await?;
    let ingress = TcpListener::bind(ingress_addr).await?;
    log::info!(
        "dispatcherd: mailbox capacity {}, submit timeout {:?}",
        registry.capacity(),
        registry.submit_timeout()
    );
    log::info!("dispatcherd: tunnels on {}, ingress on {}", tunnel_addr, ingress_addr);

    tokio::select! {
        result = serve_tunnels(tunnels, manager.clone(), config.tunnel.hello_timeout()) => result?,
        result = serve_ingress(ingress, registry) => result?,
        result = tokio::signal::ctrl_c() => {
            result?;
            log::info!("dispatcherd: shutting down");
        }
    }

    for gateway in manager.connected().await {
        manager.disconnect(gateway.as_str()).await;
    }
    Ok(())
}
