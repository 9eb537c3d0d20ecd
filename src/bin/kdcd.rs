use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use kdc::auth::server::{DEFAULT_WORKERS, serve};
use kdc::auth::{
    EchoHandler, KdcHandler, LineChannel, NonceCache, SecretStore, WorkerPool, client, crypto,
};
use kdc::config::{KdcConfig, ServiceConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Kdcd {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the key distribution center
    Kdc {
        #[arg(short, long, default_value = "config.json")]
        config: PathBuf,
    },
    /// Run the upper-casing echo service
    Echo {
        #[arg(short, long, default_value = "config.json")]
        config: PathBuf,
    },
    /// Obtain a ticket and send one message to a service
    Client {
        /// Authority address
        #[arg(long, default_value = "127.0.0.1:5000")]
        kdc: String,
        /// Service address
        #[arg(long)]
        addr: String,
        /// Principal identity
        #[arg(short, long)]
        user: String,
        /// Principal secret
        #[arg(short, long)]
        secret: String,
        /// Service identity
        #[arg(long, default_value = "echo")]
        service: String,
        /// Payload to send
        message: String,
    },
}

fn init_tracing(debug: bool) {
    let default = if debug { "kdc=trace,kdcd=trace" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn run_kdc(config: &Path) -> Result<()> {
    let config = KdcConfig::from_file(config)
        .with_context(|| format!("loading {}", config.display()))?;
    init_tracing(config.debug);

    let store = SecretStore::from_file(&config.secrets_file)?;
    info!(entries = store.len(), validity_secs = config.validity_period, "secrets loaded");

    let handler = KdcHandler::new(
        Arc::new(store),
        Arc::new(NonceCache::default()),
        config.validity_period,
    );
    let pool = WorkerPool::new(DEFAULT_WORKERS, Arc::new(handler), config.debug)?;
    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .with_context(|| format!("binding port {}", config.port))?;
    serve(&listener, &pool)?;
    Ok(())
}

fn run_echo(config: &Path) -> Result<()> {
    let config = ServiceConfig::from_file(config)
        .with_context(|| format!("loading {}", config.display()))?;
    init_tracing(config.debug);

    let master_key = crypto::derive_master_key(&config.service_name, &config.secret)?;
    let handler = EchoHandler::new(
        config.service_name.clone(),
        master_key,
        Arc::new(NonceCache::default()),
    );
    let pool = WorkerPool::new(DEFAULT_WORKERS, Arc::new(handler), config.debug)?;
    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .with_context(|| format!("binding port {}", config.port))?;
    info!(service = %config.service_name, "service starting");
    serve(&listener, &pool)?;
    Ok(())
}

fn run_client(kdc: &str, addr: &str, user: &str, secret: &str, service: &str, message: &str) -> Result<()> {
    init_tracing(false);
    let cache = Arc::new(NonceCache::default());

    let stream = TcpStream::connect(kdc).with_context(|| format!("connecting to {kdc}"))?;
    let mut channel = LineChannel::from_tcp(stream)?;
    let Some(credentials) = client::request_ticket(&mut channel, user, secret, service, Arc::clone(&cache))
    else {
        bail!("could not obtain a ticket for {service}");
    };
    drop(channel);

    let stream = TcpStream::connect(addr).with_context(|| format!("connecting to {addr}"))?;
    let mut channel = LineChannel::from_tcp(stream)?;
    let Some(reply) = client::call_service(
        &mut channel,
        &credentials,
        user,
        service,
        cache,
        message.as_bytes(),
    ) else {
        bail!("{service} did not answer");
    };

    println!("{}", String::from_utf8_lossy(&reply));
    Ok(())
}

fn main() -> Result<()> {
    match Kdcd::parse().command {
        Commands::Kdc { config } => run_kdc(&config),
        Commands::Echo { config } => run_echo(&config),
        Commands::Client {
            kdc,
            addr,
            user,
            secret,
            service,
            message,
        } => run_client(&kdc, &addr, &user, &secret, &service, &message),
    }
}
