use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use decisiond::authorization::{OriginPolicy, StaticCredentials};
use decisiond::configuration::Config;
use decisiond::storage;
use decisiond::web_interface::{ApiContext, WebServer};
use log::{error, info};

#[derive(Parser)]
#[command(name = "decisiond")]
#[command(version)]
#[command(about = "Alert and decision sharing API for intrusion detection sensors")]
struct Args {
    /// Path to the TOML configuration file
    config_file: PathBuf,

    /// Overrides `api.listen_address`
    #[arg(long, env = "DECISIOND_LISTEN_ADDRESS")]
    listen_address: Option<String>,

    /// Overrides `database.path`
    #[arg(long)]
    database_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    // RUST_LOG takes precedence over the default level
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_target(false)
        .init();

    let args = Args::parse();

    info!("Importing configuration from {}", args.config_file.display());
    let mut config = match Config::from_file(&args.config_file) {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to import configuration from file: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(listen_address) = args.listen_address {
        config.api.listen_address = listen_address;
    }
    if let Some(path) = args.database_path {
        config.database.path = Some(path);
    }
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }
    info!(
        "Configuration imported successfully, {} machines declared",
        config.machines.len()
    );

    let storage = match storage::open(&config.database).await {
        Ok(storage) => storage,
        Err(e) => {
            error!("Unable to open alert storage: {}", e);
            std::process::exit(1);
        }
    };
    let origin_policy = match OriginPolicy::new(&config.api.trusted_ips) {
        Ok(policy) => policy,
        Err(e) => {
            error!("Invalid trusted ip entry: {}", e);
            std::process::exit(1);
        }
    };
    let credentials = Arc::new(StaticCredentials::new(config.machines.clone()));

    let ctx = Arc::new(ApiContext::new(
        storage,
        credentials,
        origin_policy,
        config.api.max_body_bytes,
    ));
    let server = WebServer::new(ctx);
    if let Err(e) = server.start(&config.api.listen_address).await {
        error!("API server failed: {}", e);
        std::process::exit(1);
    }
    info!("decisiond stopped");
}
