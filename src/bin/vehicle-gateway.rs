use anyhow::Result;
use clap::Parser;
use tracing::info;
use vehicle_gateway::server;
use vehicle_gateway::utils::config_loader;
use vehicle_gateway::utils::logging;
use vehicle_gateway::utils::logging::LogLevel;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = "vehicle-gateway.yaml")]
    config: String,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Read args
    // -------------------------------

    let args = Args::parse();

    // -------------------------------
    // 2. Load YAML config, start logging
    // -------------------------------

    let service_config = config_loader::run(&args.config).await?;
    logging::run(&service_config, args.log_level).await?;

    // -------------------------------
    // 3. Load token record, serve login/callback/api routes
    // -------------------------------

    info!("Service starting...");
    server::server::start(&service_config).await
}
