use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use lineagegraph_core::{Config, ParsedTree, RunReport, Severity};
use lineagegraph_engine::{LineageOrchestrator, LineageStores, RunRequest};
use lineagegraph_sql::{ParsedDocument, RefResolver};
use lineagegraph_store::{InMemoryStore, MockQueryHistory, MockSqlParser, StoreSnapshot};

const DEFAULT_CONFIG: &str = "lineagegraph.toml";

/// lineagegraph - Column-level lineage for SQL warehouses
#[derive(Parser)]
#[command(name = "lineagegraph")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: lineagegraph.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved references of a parse tree as JSON
    Refs {
        /// Parser output (JSON with a top-level `file` element)
        tree: PathBuf,
    },

    /// Build a lineage snapshot from a run request
    Build {
        /// Run request with pre-parsed trees
        #[arg(short, long)]
        request: PathBuf,

        /// Store state file, created if missing
        #[arg(short, long)]
        state: PathBuf,

        /// Output file for report.json
        #[arg(short, long, default_value = "report.json")]
        output: PathBuf,
    },

    /// Write a config file with default settings
    InitConfig {
        /// Target path
        #[arg(default_value = DEFAULT_CONFIG)]
        path: PathBuf,
    },
}

/// Run request file
///
/// The parser is not called from the CLI: each object's SQL must have its
/// tree under `parsed_trees`.
#[derive(Debug, Deserialize)]
struct RequestFile {
    #[serde(flatten)]
    request: RunRequest,

    /// Parse trees by SQL text
    #[serde(default)]
    parsed_trees: HashMap<String, ParsedTree>,

    /// Warehouse queries issued by the request's BI tool
    #[serde(default)]
    query_history: Vec<String>,
}

impl RequestFile {
    fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request {}", path.display()))?;

        serde_json::from_str(&json).with_context(|| format!("Invalid request {}", path.display()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Refs { tree } => refs_command(&tree),
        Commands::Build {
            request,
            state,
            output,
        } => {
            let config = load_config(cli.config.as_deref())?;
            build_command(config, &request, &state, &output).await
        }
        Commands::InitConfig { path } => init_config_command(&path),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => Config::from_file(Path::new(DEFAULT_CONFIG))?,
        None => {
            tracing::debug!("no config file found, using defaults");
            Config::default()
        }
    };

    tracing::debug!(dialect = %config.dialect, "config loaded");
    Ok(config)
}

/// Refs command - resolve one parse tree
fn refs_command(tree: &Path) -> Result<()> {
    let document = ParsedDocument::from_file(tree)
        .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", tree.display(), e))?;

    let refs = document
        .file()
        .map_err(anyhow::Error::from)
        .and_then(|file| RefResolver::resolve_all(file).map_err(anyhow::Error::from))
        .with_context(|| format!("Failed to resolve {}", tree.display()))?;

    println!("{}", serde_json::to_string_pretty(&refs)?);
    Ok(())
}

/// Build command - run the lineage pipeline against a file-backed store
async fn build_command(config: Config, request_path: &Path, state_path: &Path, output: &Path) -> Result<()> {
    let RequestFile {
        request,
        parsed_trees,
        query_history,
    } = RequestFile::from_file(request_path)?;

    let store = if state_path.exists() {
        InMemoryStore::from_snapshot(StoreSnapshot::from_file(state_path)?)
    } else {
        tracing::info!(state = %state_path.display(), "starting from an empty store");
        InMemoryStore::new()
    };

    let parser = MockSqlParser::from_trees(parsed_trees);
    let mut orchestrator = LineageOrchestrator::new(LineageStores::shared(store.clone()), Arc::new(parser), config);

    if let Some(bi_type) = request.bi_type {
        let history = MockQueryHistory::new();
        for query in query_history {
            history.add_entry(bi_type, query).await;
        }
        orchestrator = orchestrator.with_query_history(Arc::new(history));
    }

    let result = orchestrator.run(&request).await;

    // Failed runs leave an incomplete lineage that is kept as well
    store.snapshot().await.save_to_file(state_path)?;

    match result {
        Ok(report) => {
            report
                .save_to_file(output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            tracing::info!(report = %output.display(), "report saved");

            print_report_summary(&report);
            Ok(())
        }
        Err(failure) => {
            eprintln!("{} {}", "✗".red().bold(), failure);
            std::process::exit(1);
        }
    }
}

/// Init config command - write defaults
fn init_config_command(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(anyhow::anyhow!("{} already exists", path.display()));
    }

    Config::default().save_to_file(path)?;
    println!("{} {}", "Created".green(), path.display());
    Ok(())
}

/// Print report summary to stdout
fn print_report_summary(report: &RunReport) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Lineage Run Report".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("Version: {}", report.version);
    println!("Lineage: {}", report.lineage_id.green());
    println!();

    let summary = &report.summary;
    println!("{}", "Summary:".bold());
    println!("  Sources:          {}", summary.sources);
    println!("  Statements:       {}", summary.statements);
    println!(
        "  Materializations: {} created, {} updated",
        summary.materializations_created, summary.materializations_updated
    );
    println!("  Columns:          {}", summary.columns);
    println!("  Dependencies:     {}", summary.dependencies);
    println!("  Dashboards:       {}", summary.dashboards);

    if summary.skipped_dependencies > 0 {
        println!(
            "  Skipped:          {}",
            format!("{}", summary.skipped_dependencies).yellow()
        );
    }
    println!();

    if report.diagnostics.is_empty() {
        println!("{}", "✓ No diagnostics".green().bold());
    } else {
        println!("{}", "Diagnostics:".bold());
        for diag in &report.diagnostics {
            let severity_str = match diag.severity {
                Severity::Error => "ERROR".red().bold(),
                Severity::Warn => "WARN".yellow().bold(),
                Severity::Info => "INFO".cyan(),
            };

            println!("  [{}] {}: {}", severity_str, diag.code, diag.message);

            if let Some(relation) = &diag.relation_name {
                println!("    Relation: {}", relation);
            }
        }
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn request_file_with_trees() {
        let json = r#"{
            "organization_id": "org-1",
            "bi_type": "Mode",
            "objects": [{
                "relation_name": "db.s.a",
                "name": "a",
                "schema_name": "s",
                "database_name": "db",
                "sql": "SELECT 1"
            }],
            "parsed_trees": {"SELECT 1": {"file": {"statement": {}}}},
            "query_history": ["SELECT X FROM A"]
        }"#;

        let file: RequestFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.request.objects.len(), 1);
        assert!(file.parsed_trees.contains_key("SELECT 1"));
        assert_eq!(file.query_history.len(), 1);
    }
}
