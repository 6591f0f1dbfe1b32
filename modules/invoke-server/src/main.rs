use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use invoke_common::Graph;
use invoke_core::file_config::load_config_or_default;
use invoke_core::{AppConfig, InvocationServices};
use invoke_nodes::AnyInvocation;
use invoke_server::{build_services, run_to_completion, AppServices};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "invoke-server", about = "Node graph invocation server")]
#[command(version)]
struct Cli {
    /// Path to config TOML file (overrides INVOKE_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the processor and run queued sessions until Ctrl-C
    Serve,

    /// Build every service from config and list what was wired
    Check,

    /// Run a graph file to completion and print the session as JSON
    Run {
        /// Graph JSON file
        graph: PathBuf,
    },

    /// Print the JSON Schema of all node types
    Schema,

    /// List the available node types
    Nodes,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("invoke=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let app_config = AppConfig::from_env()?;
    init_tracing(app_config.log_json);

    let cli = Cli::parse();

    match &cli.command {
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&AnyInvocation::schema())?);
            return Ok(());
        }
        Commands::Nodes => {
            print_nodes();
            return Ok(());
        }
        _ => {}
    }

    app_config.log_summary();
    let config_path = cli.config.unwrap_or_else(|| app_config.config_path.clone());
    tracing::info!(config = %config_path.display(), "Loading config");
    let file_config = load_config_or_default(&config_path)?;
    let app = build_services(&file_config, app_config.outputs_dir.as_deref()).await?;

    match cli.command {
        Commands::Serve => serve(&app).await,
        Commands::Check => {
            check(&app.services);
            Ok(())
        }
        Commands::Run { graph } => run(&app, graph).await,
        Commands::Schema | Commands::Nodes => Ok(()),
    }
}

fn print_nodes() {
    for info in AnyInvocation::catalog() {
        println!(
            "{:<20} {:<12} {:<8} [{}] {}",
            info.invocation_type,
            info.title,
            info.category,
            info.tags.join(", "),
            info.version
        );
    }
}

async fn serve(app: &AppServices) -> Result<()> {
    app.services
        .processor()
        .start(app.services.clone())
        .context("Failed to start invocation processor")?;
    tracing::info!("Invocation processor running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    tracing::info!("Shutting down");
    app.queue.close();
    app.services.processor().stop().await;
    Ok(())
}

fn check(services: &InvocationServices) {
    println!("Services:");
    for name in InvocationServices::SERVICE_NAMES {
        println!("  {name}");
    }

    let models = services.model_manager().list_models(None, None);
    println!("Models ({}):", models.len());
    for model in models {
        println!("  {} {} {}", model.base_model, model.model_type, model.model_name);
    }
}

async fn run(app: &AppServices, graph_path: PathBuf) -> Result<()> {
    let content = std::fs::read_to_string(&graph_path)
        .with_context(|| format!("Failed to read graph file: {}", graph_path.display()))?;
    let graph: Graph = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse graph file: {}", graph_path.display()))?;

    app.services
        .processor()
        .start(app.services.clone())
        .context("Failed to start invocation processor")?;
    let result = run_to_completion(app, graph).await;
    app.services.processor().stop().await;
    let state = result?;

    println!("{}", serde_json::to_string_pretty(&state)?);

    if state.has_error() {
        bail!("Session {} failed", state.id);
    }
    Ok(())
}
