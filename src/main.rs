use anthropic_ollama_proxy::config::config_search_paths;
use anthropic_ollama_proxy::{build_router, AppState, OllamaClient, ProxyConfig, SharedLogger};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "anthropic-ollama-proxy",
    about = "Serve the Anthropic Messages API on top of an Ollama chat backend",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Backend base URL, e.g. http://localhost:11434 (overrides config)
    #[arg(long)]
    endpoint: Option<String>,

    /// Default backend model (overrides config)
    #[arg(long)]
    model: Option<String>,

    /// Request log file path
    #[arg(long, default_value = "anthropic-ollama-proxy.log")]
    log_file: PathBuf,

    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "anthropic_ollama_proxy=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    let mut config = ProxyConfig::find_and_load(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(endpoint) = cli.endpoint {
        config.backend.endpoint = endpoint;
    }
    if let Some(model) = cli.model {
        config.translation.model = model;
    }

    // Flags may have changed what the file said
    config.validate()?;

    let logger = SharedLogger::new(&cli.log_file)?;
    let backend = OllamaClient::new(&config.backend)?;

    info!("anthropic-ollama-proxy v{}", env!("CARGO_PKG_VERSION"));
    info!("  Backend:   {}", config.backend.endpoint);
    info!("  Model:     {}", config.translation.model);
    info!("  Mapped:    {} wire models", config.translation.models.len());
    info!("  Timeout:   {}s", config.backend.timeout_secs);
    info!("  Log file:  {}", cli.log_file.display());

    logger.info(
        "startup",
        format!(
            "Starting anthropic-ollama-proxy endpoint={} model={} port={}",
            config.backend.endpoint, config.translation.model, config.port
        ),
    );

    let port = config.port;
    let state = Arc::new(AppState {
        config,
        backend: Arc::new(backend),
        logger,
    });

    let app = build_router(state);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);
    info!("  ANTHROPIC_BASE_URL=http://localhost:{}", port);

    axum::serve(listener, app).await?;

    Ok(())
}
