mod config;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use db::{Catalog, InMemoryCatalog, SqliteScenarioRepository};
use events::EventBus;
use orchestrator::{ArgoWorkflowClient, FanOutOutcome, PipelineBuilder, ScenarioOrchestrator};
use scenario_core::{Scenario, ScenarioState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{StudioConfig, CONFIG_FILE};

#[derive(Parser)]
#[command(name = "scenario-studio")]
#[command(about = "Scenario hierarchies and simulation run pipelines", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file
    #[arg(short, long, default_value = CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Log filter, overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file and create the database
    Init,
    /// List the scenarios of a workspace as a tree
    List {
        #[arg(short, long)]
        organization: String,
        #[arg(short, long)]
        workspace: String,
        /// Only show scenarios in this run state (created, running, successful, failed, unknown)
        #[arg(long)]
        state: Option<ScenarioState>,
    },
    /// Print one scenario as JSON
    Show {
        #[arg(short, long)]
        organization: String,
        #[arg(short, long)]
        workspace: String,
        scenario_id: String,
    },
    /// Print the execution units of a scenario run as JSON
    Pipeline {
        #[arg(short, long)]
        organization: String,
        #[arg(short, long)]
        workspace: String,
        scenario_id: String,
    },
    /// Delete a scenario and attach its children to its parent
    Delete {
        #[arg(short, long)]
        organization: String,
        #[arg(short, long)]
        workspace: String,
        scenario_id: String,
        /// User performing the deletion; must own the scenario
        #[arg(long = "as")]
        caller: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    match cli.command {
        Commands::Init => init_project(&cli.config).await,
        Commands::List {
            organization,
            workspace,
            state,
        } => list(&cli.config, &organization, &workspace, state).await,
        Commands::Show {
            organization,
            workspace,
            scenario_id,
        } => show(&cli.config, &organization, &workspace, &scenario_id).await,
        Commands::Pipeline {
            organization,
            workspace,
            scenario_id,
        } => pipeline(&cli.config, &organization, &workspace, &scenario_id).await,
        Commands::Delete {
            organization,
            workspace,
            scenario_id,
            caller,
        } => delete(&cli.config, &organization, &workspace, &scenario_id, &caller).await,
    }
}

async fn init_project(config_path: &Path) -> Result<()> {
    if tokio::fs::try_exists(config_path).await.unwrap_or(false) {
        println!("Configuration already exists at {}", config_path.display());
    } else {
        StudioConfig::default().save(config_path).await?;
        println!("Wrote {}", config_path.display());
    }

    let config = StudioConfig::load(config_path)
        .await?
        .resolve_paths(config_path);
    let pool = db::create_pool(&config.database_url())
        .await
        .context("Failed to create database pool")?;
    db::run_migrations(&pool).await?;

    println!("Database ready at {}", config.database.path.display());
    if !tokio::fs::try_exists(&config.catalog.path).await.unwrap_or(false) {
        println!();
        println!(
            "No catalog found. Create {} with your organizations, workspaces and solutions.",
            config.catalog.path.display()
        );
    }
    Ok(())
}

async fn open_orchestrator(config_path: &Path) -> Result<ScenarioOrchestrator> {
    let config = StudioConfig::load(config_path)
        .await?
        .resolve_paths(config_path);

    tracing::info!(database = %config.database.path.display(), "Opening scenario store");
    let pool = db::create_pool(&config.database_url())
        .await
        .context("Failed to create database pool")?;
    db::run_migrations(&pool).await?;

    let catalog = InMemoryCatalog::from_json_file(&config.catalog.path)
        .await
        .with_context(|| format!("Failed to load catalog {}", config.catalog.path.display()))?;
    let workflows = ArgoWorkflowClient::new(&config.workflow)
        .context("Failed to create workflow status client")?;

    let catalog: Arc<dyn Catalog> = Arc::new(catalog);
    Ok(ScenarioOrchestrator::new(
        Arc::new(SqliteScenarioRepository::new(pool)),
        catalog,
        Arc::new(workflows),
        Arc::new(EventBus::new()),
        PipelineBuilder::new(config.containers),
    )
    .with_config(config.orchestrator))
}

async fn list(
    config_path: &Path,
    organization_id: &str,
    workspace_id: &str,
    state: Option<ScenarioState>,
) -> Result<()> {
    let orchestrator = open_orchestrator(config_path).await?;
    let scenarios = orchestrator
        .scenarios_tree(organization_id, workspace_id)
        .await?;

    if scenarios.is_empty() {
        println!("No scenarios in workspace {}.", workspace_id);
        return Ok(());
    }

    if let Some(state) = state {
        let matching: Vec<&Scenario> = scenarios.iter().filter(|s| s.state == state).collect();
        println!();
        println!("Scenarios {} ({}):", state.as_str(), matching.len());
        for scenario in matching {
            println!(
                "  {} {} {}",
                state_icon(scenario.state),
                scenario.name,
                format!("({})", scenario.id).dimmed()
            );
        }
        println!();
        return Ok(());
    }

    let mut children: BTreeMap<Option<&str>, Vec<&Scenario>> = BTreeMap::new();
    for scenario in &scenarios {
        let parent = scenario
            .parent_id
            .as_deref()
            .filter(|p| scenarios.iter().any(|s| s.id == *p));
        children.entry(parent).or_default().push(scenario);
    }

    println!();
    println!("Scenarios ({}):", scenarios.len());
    print_tree(&children, None, 1);
    println!();
    Ok(())
}

fn print_tree<'a>(
    children: &BTreeMap<Option<&'a str>, Vec<&'a Scenario>>,
    parent: Option<&'a str>,
    depth: usize,
) {
    let Some(level) = children.get(&parent) else {
        return;
    };
    for &scenario in level {
        println!(
            "{}{} {} {}",
            "  ".repeat(depth),
            state_icon(scenario.state),
            scenario.name,
            format!("({})", scenario.id).dimmed()
        );
        print_tree(children, Some(scenario.id.as_str()), depth + 1);
    }
}

fn state_icon(state: ScenarioState) -> colored::ColoredString {
    match state {
        ScenarioState::Created => "○".normal(),
        ScenarioState::Running => "◐".yellow(),
        ScenarioState::Successful => "●".green(),
        ScenarioState::Failed => "●".red(),
        ScenarioState::Unknown => "?".dimmed(),
    }
}

async fn show(
    config_path: &Path,
    organization_id: &str,
    workspace_id: &str,
    scenario_id: &str,
) -> Result<()> {
    let orchestrator = open_orchestrator(config_path).await?;
    let scenario = orchestrator
        .find_scenario(organization_id, workspace_id, scenario_id)
        .await?;
    println!("{}", serde_json::to_string_pretty(&scenario)?);
    Ok(())
}

async fn pipeline(
    config_path: &Path,
    organization_id: &str,
    workspace_id: &str,
    scenario_id: &str,
) -> Result<()> {
    let orchestrator = open_orchestrator(config_path).await?;
    let units = orchestrator
        .build_run_pipeline(organization_id, workspace_id, scenario_id)
        .await?;
    println!("{}", serde_json::to_string_pretty(&units)?);
    Ok(())
}

async fn delete(
    config_path: &Path,
    organization_id: &str,
    workspace_id: &str,
    scenario_id: &str,
    caller: &str,
) -> Result<()> {
    let orchestrator = open_orchestrator(config_path).await?;
    // The process exits right after, so reparenting must finish first.
    let outcome = orchestrator
        .delete_scenario(organization_id, workspace_id, scenario_id, caller, true)
        .await?;

    println!("Deleted {}", scenario_id);
    match outcome {
        FanOutOutcome::Completed(report) if !report.failures.is_empty() => {
            println!(
                "{} of {} children could not be reparented:",
                report.failures.len(),
                report.dispatched
            );
            for failure in &report.failures {
                println!("  {} {}: {}", "✗".red(), failure.target, failure.reason);
            }
        }
        FanOutOutcome::Completed(report) => println!("Reparented {} children", report.succeeded),
        FanOutOutcome::Detached { dispatched } => {
            println!("Reparenting {} children in the background", dispatched)
        }
        FanOutOutcome::Skipped { reason } => {
            println!("{} Children were not reparented: {}", "✗".red(), reason)
        }
    }
    Ok(())
}

fn init_tracing(log_level: Option<&str>) {
    let filter = match log_level {
        Some(level) => tracing_subscriber::EnvFilter::new(level),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "scenario_studio=info,orchestrator=info,db=info".into()),
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
