//! Baribhara API gateway entry point.

use std::path::PathBuf;

use anyhow::Context;
use tracing::info;

use baribhara_gateway::{GatewayConfig, GatewayServer};
use baribhara_telemetry::init_logging;

/// Command-line arguments.
struct Args {
    /// Path to configuration file.
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = args.next().map(PathBuf::from);
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("baribhara-gateway {}", baribhara_gateway::VERSION);
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
        }

        Self { config }
    }
}

fn print_help() {
    println!(
        r"Baribhara API gateway

USAGE:
    baribhara-gateway [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML or JSON)
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT VARIABLES:
    GATEWAY_PORT                       Listen port (default: 8080)
    GATEWAY_MODE                       debug, release or test (default: debug)
    GATEWAY_REDIS_HOST                 Redis host (default: localhost)
    GATEWAY_REDIS_PORT                 Redis port (default: 6379)
    GATEWAY_REDIS_PASSWORD             Redis password
    GATEWAY_REDIS_DB                   Redis database (default: 0)
    GATEWAY_JWT_SECRET                 HMAC secret for bearer tokens
    GATEWAY_RATE_LIMIT_REQUESTS        Requests per window (default: 100)
    GATEWAY_RATE_LIMIT_WINDOW_SECS     Window length in seconds (default: 60)
    GATEWAY_UPSTREAM_TIMEOUT_SECS      Backend timeout in seconds (default: 30)
    GATEWAY_LOG_LEVEL                  Log filter (default: info)
    GATEWAY_SERVICE_<NAME>_HOST        Backend host, e.g. GATEWAY_SERVICE_USER_SERVICE_HOST
    GATEWAY_SERVICE_<NAME>_PORT        Backend port
    RUST_LOG                           Overrides the log filter

EXAMPLES:
    baribhara-gateway --config /etc/baribhara/gateway.toml
    GATEWAY_MODE=release GATEWAY_JWT_SECRET=s3cret baribhara-gateway
"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => GatewayConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => GatewayConfig::default(),
    }
    .with_env_overrides();
    config.validate()?;

    init_logging(&config.log_config()).context("initializing logging")?;

    info!(
        version = baribhara_gateway::VERSION,
        config = ?args.config,
        mode = %config.server.mode,
        port = config.server.port,
        "starting baribhara gateway"
    );

    let server = GatewayServer::new(config).context("building gateway")?;
    server.run().await?;
    Ok(())
}
