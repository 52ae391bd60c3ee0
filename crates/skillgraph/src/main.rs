use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use skillgraph::core::{FileKeyStore, KeyStore, Keypair};
use skillgraph::issuer::{AcademicSeed, MemoryRecords, Provider};
use skillgraph::protocol::{HttpTransport, Transport};
use skillgraph::store::{MemoryStore, SqliteStore, Store};
use skillgraph::{App, ServiceConfig};

/// SkillGraph: verifiable skill graphs over a BAP/BPP network.
#[derive(Parser, Debug)]
#[command(name = "skillgraph", version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, default_value = "skillgraph.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the requester-side service
    Serve {
        /// Override the listen port
        #[arg(long)]
        port: Option<u16>,

        /// Also run the university provider in this process and trust it
        #[arg(long)]
        with_issuer: bool,
    },

    /// Run the university provider (BPP) on its own
    ServeIssuer {
        /// Override the listen port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Create a signing key if absent and print its public key
    Keygen {
        /// Key file; the service key path from config by default
        #[arg(long)]
        out: Option<PathBuf>,

        /// Use the issuer key path from config
        #[arg(long, conflicts_with = "out")]
        issuer: bool,
    },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new(
            "skillgraph=debug,skillgraph_protocol=debug,skillgraph_issuer=debug,skillgraph_store=debug,tower_http=debug",
        )
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("skillgraph=info,skillgraph_protocol=info,skillgraph_issuer=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(path: &Path) -> anyhow::Result<ServiceConfig> {
    let mut config = ServiceConfig::load(path)
        .with_context(|| format!("loading config from {}", path.display()))?;
    config.apply_env();
    config.validate()?;
    Ok(config)
}

fn open_store(config: &ServiceConfig) -> anyhow::Result<Arc<dyn Store>> {
    Ok(match &config.storage.sqlite_path {
        Some(path) => {
            info!(path = %path.display(), "opening sqlite store");
            Arc::new(
                SqliteStore::open(path)
                    .with_context(|| format!("opening database {}", path.display()))?,
            )
        }
        None => {
            info!("using in-memory store");
            Arc::new(MemoryStore::new())
        }
    })
}

fn load_key(path: &Path) -> anyhow::Result<Keypair> {
    FileKeyStore::new(path)
        .load_or_generate()
        .with_context(|| format!("loading key {}", path.display()))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli.config)?;
    match cli.command {
        Commands::Serve { port, with_issuer } => cmd_serve(config, port, with_issuer).await,
        Commands::ServeIssuer { port } => cmd_serve_issuer(config, port).await,
        Commands::Keygen { out, issuer } => {
            let path = match (out, issuer) {
                (Some(out), _) => out,
                (None, true) => config.issuer.key_path.clone(),
                (None, false) => config.keys.path.clone(),
            };
            cmd_keygen(&path)
        }
    }
}

async fn cmd_serve(
    mut config: ServiceConfig,
    port: Option<u16>,
    with_issuer: bool,
) -> anyhow::Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    let transport: Arc<dyn Transport> =
        Arc::new(HttpTransport::new(config.protocol.request_timeout()));

    let provider = if with_issuer {
        if config.protocol.bpp_uri.is_none() {
            config.protocol.bpp_uri = Some(config.issuer.public_uri.clone());
        }
        Some(Arc::new(build_provider(&config, transport.clone())?))
    } else {
        None
    };

    let store = open_store(&config)?;
    let keypair = load_key(&config.keys.path)?;
    let addr = format!("{}:{}", config.server.bind, config.server.port);

    let app = App::new(config, keypair, store, transport);
    let registered = app.register_configured_issuers().await?;
    info!(registered, "loaded trusted issuers");

    if let Some(provider) = provider {
        app.register_issuer(&provider.registry_entry()).await?;
        let issuer_addr = format!("{}:{}", app.config().issuer.bind, app.config().issuer.port);
        let issuer_router = skillgraph::issuer::build_router(provider).layer(TraceLayer::new_for_http());
        let listener = tokio::net::TcpListener::bind(&issuer_addr)
            .await
            .with_context(|| format!("binding {}", issuer_addr))?;
        info!(addr = %issuer_addr, "issuer listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, issuer_router).await {
                error!(error = %e, "issuer server stopped");
            }
        });
    }

    let jobs = app.spawn_jobs();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(%addr, bap_id = %app.config().protocol.bap_id, "service listening");
    println!("SkillGraph listening on http://{}", addr);

    axum::serve(listener, app.router())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    jobs.abort();
    info!("service stopped");
    Ok(())
}

async fn cmd_serve_issuer(mut config: ServiceConfig, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(port) = port {
        config.issuer.port = port;
    }
    let transport = Arc::new(HttpTransport::new(config.protocol.request_timeout()));
    let provider = Arc::new(build_provider(&config, transport)?);
    let entry = provider.registry_entry();
    let addr = format!("{}:{}", config.issuer.bind, config.issuer.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(%addr, provider_id = %entry.id, "issuer listening");
    println!("Issuer {} listening on http://{}", entry.id, addr);
    println!("  Public key: {}", entry.public_key);

    let router = skillgraph::issuer::build_router(provider).layer(TraceLayer::new_for_http());
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn cmd_keygen(path: &Path) -> anyhow::Result<()> {
    let keypair = load_key(path)?;
    println!("Key file:   {}", path.display());
    println!("Public key: {}", keypair.public_key().to_base64());
    Ok(())
}

fn build_provider(config: &ServiceConfig, transport: Arc<dyn Transport>) -> anyhow::Result<Provider> {
    let seed = match &config.issuer.seed_file {
        Some(path) => AcademicSeed::load(path)
            .with_context(|| format!("loading seed data {}", path.display()))?,
        None => AcademicSeed::demo(),
    };
    let keypair = load_key(&config.issuer.key_path)?;
    Ok(Provider::new(
        config.issuer.provider_config(),
        keypair,
        Arc::new(MemoryRecords::from_seed(seed)),
        transport,
    ))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutdown requested");
}
