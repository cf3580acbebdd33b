use clap::Parser;
use fluxgate::config::Config;
use fluxgate::server::Server;
use tracing_subscriber::EnvFilter;

/// FluxGate — a distributed rate-limiting engine embedded in an HTTP service.
#[derive(Debug, Parser)]
#[command(name = "fluxgate-server", version = fluxgate::VERSION)]
struct Cli {
    /// Path (without extension) to an optional config file layered under
    /// built-in defaults and over `FLUXGATE_*` environment variables.
    #[arg(long, default_value = "config")]
    config: String,

    /// Overrides `bind_address` from the loaded config, for one-off runs
    /// (e.g. CI smoke tests) that don't want a config file edit.
    #[arg(long)]
    bind: Option<String>,

    /// Overrides `redis_url` from the loaded config.
    #[arg(long)]
    redis_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)?;
    if let Some(bind) = cli.bind {
        config.bind_address = bind;
    }
    if let Some(redis_url) = cli.redis_url {
        config.redis_url = redis_url;
    }
    fluxgate::config_validator::ConfigValidator::validate(&config)?;

    tracing::info!(version = fluxgate::VERSION, "starting fluxgate server");

    let server = Server::new(&config).await?;
    server.run().await?;

    Ok(())
}
