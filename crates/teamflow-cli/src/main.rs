mod config;

use clap::{Parser, Subcommand};
use config::TeamflowConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use teamflow_agent::Toolbox;
use teamflow_feedback::FeedbackRouter;
use teamflow_gateway::{AuthConfig, GatewayServer, RateLimiter, Sanitizer};
use teamflow_orchestrator::{JsonlProgressLog, Orchestrator, TeamRouter};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "teamflow", about = "Teamflow: multi-team AI agent task backend")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "teamflow.toml")]
    config: PathBuf,

    /// Human-readable logs instead of JSON lines
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP/WebSocket gateway
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Classify a feedback sentence and print the change request
    Classify {
        /// The feedback text
        feedback: String,
    },
    /// List the built-in teams and their pipelines
    Teams,
}

fn init_tracing(pretty: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout is reserved for command output
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if pretty {
        builder.init();
    } else {
        builder.json().init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();
    init_tracing(cli.pretty);

    let mut config = TeamflowConfig::load(&cli.config).await?;
    config.apply_env(|name| std::env::var(name).ok());

    match cli.command {
        Commands::Serve { host, port } => serve(config, host, port).await?,
        Commands::Classify { feedback } => {
            let router = FeedbackRouter::new(config.feedback)?;
            let change = router.classify(&feedback);
            println!("{}", serde_json::to_string_pretty(&change)?);
        }
        Commands::Teams => {
            let router = TeamRouter::builtin(Toolbox::unconfigured());
            println!("Teams (default: {}):", router.default_team());
            for team in router.teams() {
                let summary = team.summary();
                println!(
                    "  {}: {} (~{}s)",
                    summary.name, summary.description, summary.estimated_secs
                );
                for step in &summary.steps {
                    println!(
                        "    {:<24} on failure: {:<22} timeout: {}s",
                        step.name, step.on_failure, step.timeout_secs
                    );
                }
            }
            println!("\nTotal: {} team(s)", router.teams().len());
        }
    }

    Ok(())
}

async fn serve(config: TeamflowConfig, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    info!("Starting Teamflow gateway on {host}:{port}");

    let toolbox = config.toolbox()?;
    let mut orchestrator = Orchestrator::new(toolbox, config.orchestrator_config())?;
    if let Some(path) = &config.progress_log.path {
        info!(path = %path.display(), "Progress log enabled");
        orchestrator = orchestrator.with_progress_log(Arc::new(JsonlProgressLog::new(path)));
    }
    let orchestrator = Arc::new(orchestrator);
    let _maintenance = orchestrator.spawn_maintenance(config.sweep_interval());

    let rate_limiter = Arc::new(RateLimiter::new(
        config.security.max_burst,
        config.security.max_requests_per_second,
    ));
    let _bucket_cleanup =
        rate_limiter.spawn_cleanup(config.sweep_interval(), config.bucket_idle());
    let auth_config = AuthConfig::new(config.security.api_keys.clone());
    if auth_config.is_enabled() {
        info!(keys = config.security.api_keys.len(), "API key auth enabled");
    }

    let app = GatewayServer::build_with_middleware(
        orchestrator,
        Sanitizer::new(config.security.max_message_length),
        Some(rate_limiter),
        auth_config,
    );

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Teamflow gateway listening on {addr}");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
