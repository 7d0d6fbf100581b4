//! Catalog server daemon
//!
//! Opens every configured catalog, publishes the catalog table and serves
//! requests on a Unix socket until a client asks it to stop.

use anyhow::Context;
use clap::Parser;
use samcat::{CatalogError, CatalogServer, ExitCode, ServerConfig};
use std::fs;
use std::os::unix::net::UnixListener;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "catserver")]
#[command(about = "Media catalog server")]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = "/etc/opt/samcat/catalog.toml")]
    config: PathBuf,

    /// Override the catalog directory
    #[arg(short = 'd', long)]
    catalog_dir: Option<PathBuf>,

    /// Override the Unix socket path
    #[arg(short = 's', long)]
    socket: Option<PathBuf>,

    /// Override the number of entries added when a catalog grows
    #[arg(long)]
    table_increment: Option<u32>,
}

fn load_config(args: &Args) -> anyhow::Result<ServerConfig> {
    let mut config = ServerConfig::load(&args.config)
        .with_context(|| format!("loading {:?}", args.config))?;
    if let Some(dir) = &args.catalog_dir {
        config.catalog_dir = dir.clone();
    }
    if let Some(socket) = &args.socket {
        config.socket_path = Some(socket.clone());
    }
    if let Some(incr) = args.table_increment {
        config.table_increment = incr;
    }
    config.validate()?;
    Ok(config)
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(&args)?;
    let socket = config.socket_path();
    info!("Catalog directory: {:?}", config.catalog_dir);

    let mut server = CatalogServer::start(config)?;

    match fs::remove_file(&socket) {
        Ok(()) => info!("Removed stale socket {:?}", socket),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("removing {:?}", socket)),
    }
    let listener =
        UnixListener::bind(&socket).with_context(|| format!("binding {:?}", socket))?;
    info!("Listening on {:?}", socket);

    let served = server.serve_unix(&listener);
    server.shutdown()?;
    fs::remove_file(&socket).ok();
    served?;
    Ok(())
}

fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("Starting catalog server");

    match run(args) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!("Catalog server failed: {:#}", e);
            let code = e
                .downcast_ref::<CatalogError>()
                .map_or(ExitCode::Failure, CatalogError::exit_code);
            std::process::ExitCode::from(code.code() as u8)
        }
    }
}
