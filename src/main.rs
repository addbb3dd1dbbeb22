mod auth;
mod config;
mod crm;
mod error;
mod error_recovery;
mod llm;
mod models;
mod resource_limits;
mod server;
mod storage;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{default_config_path, load_effective_config, CrmConfig};
use crate::crm::task_rules::LeadEvent;
use crate::server::AppState;
use crate::storage::PgStorage;

#[derive(Parser)]
#[command(name = "ooak")]
#[command(about = "OOAK wedding-photography CRM service", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level filter (e.g. debug, info, warn, error). Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Config file (defaults to ~/.ooak/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and the Prometheus metrics listener
    Serve,

    /// Apply database migrations
    Migrate,

    /// Create an Administrator account for an existing employee
    CreateAdmin {
        #[arg(long)]
        employee_id: i64,
        /// Stored on the employee record before the account is created
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },

    /// Convert scheduled follow-ups into AI-classified tasks
    MigrateFollowups {
        /// Report what would be migrated without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Evaluate the lead task rules for one lead
    GenerateTasks {
        #[arg(long)]
        lead_id: i64,
        /// lead_assigned, quotation_created, quotation_sent or quotation_approved
        #[arg(long, default_value = "lead_assigned")]
        event: String,
        #[arg(long)]
        quotation_id: Option<i64>,
    },

    /// Check database connectivity; exits non-zero when unhealthy
    Health,

    /// Manage the service configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default config.toml
    Init,
    /// Show path to the config file
    Path,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    if let Commands::Config { action } = &cli.command {
        return handle_config(action, &config_path);
    }

    let config = load_effective_config(&config_path)?;
    let rt = runtime()?;
    rt.block_on(async move {
        match cli.command {
            Commands::Serve => handle_serve(config).await,
            Commands::Migrate => handle_migrate(&config).await,
            Commands::CreateAdmin {
                employee_id,
                email,
                username,
                password,
            } => handle_create_admin(&config, employee_id, email.as_deref(), &username, &password).await,
            Commands::MigrateFollowups { dry_run } => handle_migrate_followups(&config, dry_run).await,
            Commands::GenerateTasks {
                lead_id,
                event,
                quotation_id,
            } => handle_generate_tasks(&config, lead_id, &event, quotation_id).await,
            Commands::Health => handle_health(&config).await,
            Commands::Config { .. } => Ok(()),
        }
    })
}

/// JSON logs by default, human-readable text with OOAK_LOG_TEXT=1.
fn init_tracing(log_level: Option<&str>) {
    let text_logging = std::env::var("OOAK_LOG_TEXT")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);
    let env_filter = match log_level {
        Some(level) => tracing_subscriber::EnvFilter::new(format!("ooak={}", level)),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "ooak=info".into()),
    };

    if text_logging {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    }
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .thread_name("ooak-worker")
        .enable_all()
        .build()?)
}

async fn connect(config: &CrmConfig) -> anyhow::Result<PgStorage> {
    Ok(PgStorage::new(&config.database).await?)
}

/// Cancel `token` on SIGINT or SIGTERM.
fn spawn_signal_handler(token: CancellationToken) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("SIGTERM received, initiating graceful shutdown");
            }
            _ = sigint.recv() => {
                tracing::info!("SIGINT received, initiating graceful shutdown");
            }
        }
        token.cancel();
    });
    Ok(())
}

async fn handle_serve(config: CrmConfig) -> anyhow::Result<()> {
    tracing::info!("ooak starting (pid {})", std::process::id());
    config.warn_insecure_defaults();

    let storage = connect(&config).await?;
    storage.migrate().await?;

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone())?;

    let state = Arc::new(AppState::new(config, storage, shutdown)?);
    server::run_server(state).await
}

async fn handle_migrate(config: &CrmConfig) -> anyhow::Result<()> {
    let storage = connect(config).await?;
    storage.migrate().await?;
    println!("Migrations applied");
    Ok(())
}

async fn handle_create_admin(
    config: &CrmConfig,
    employee_id: i64,
    email: Option<&str>,
    username: &str,
    password: &str,
) -> anyhow::Result<()> {
    let storage = connect(config).await?;
    let account = storage
        .bootstrap_admin(employee_id, email, username, password)
        .await?;
    println!(
        "Created administrator account {} (id {}) for employee {}",
        account.username, account.id, account.employee_id
    );
    Ok(())
}

async fn handle_migrate_followups(config: &CrmConfig, dry_run: bool) -> anyhow::Result<()> {
    let storage = connect(config).await?;
    let report = storage.migrate_followups(dry_run).await?;
    println!("{}", report.render());
    if report.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

async fn handle_generate_tasks(
    config: &CrmConfig,
    lead_id: i64,
    event: &str,
    quotation_id: Option<i64>,
) -> anyhow::Result<()> {
    let event = LeadEvent::from_name(event)
        .ok_or_else(|| anyhow::anyhow!("Unknown lead event: {}", event))?;
    let storage = connect(config).await?;
    let ctx = storage.lead_context(lead_id, quotation_id).await?;
    let result = storage.run_task_rules(event, &ctx).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn handle_health(config: &CrmConfig) -> anyhow::Result<()> {
    let health = match connect(config).await {
        Ok(storage) => storage.database_health().await.map_err(anyhow::Error::from),
        Err(e) => Err(e),
    };
    match health {
        Ok(db) => {
            let report = serde_json::json!({ "status": "healthy", "database": db });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            let report = serde_json::json!({ "status": "unhealthy", "error": e.to_string() });
            println!("{}", serde_json::to_string_pretty(&report)?);
            std::process::exit(1);
        }
    }
}

fn handle_config(action: &ConfigAction, config_path: &std::path::Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Path => {
            println!("{}", config_path.display());
        }
        ConfigAction::Init => {
            if config_path.exists() {
                eprintln!("Config already exists: {}", config_path.display());
                return Ok(());
            }
            if let Some(dir) = config_path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            let rendered = toml::to_string_pretty(&CrmConfig::default())?;
            std::fs::write(config_path, format!("# ooak configuration\n\n{}", rendered))?;
            println!("Created: {}", config_path.display());
        }
    }
    Ok(())
}
