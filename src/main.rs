//! Terrace CLI entrypoint.
//!
//! This is the main entrypoint for the terrace command-line tool.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use terrace::cli::{Cli, Commands, GraphFormat, OutputFormat, OutputFormatter};
use terrace::config::{find_config_file, Config, ConfigParser};
use terrace::engine::{CancelToken, Engine, EngineOptions};
use terrace::error::{Result, StateError, TerraceError};
use terrace::hooks::{CountHook, LoggingHook};
use terrace::plans::Plan;
use terrace::providers::{EchoProvider, Provider};
use terrace::state::State;

use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose, matches!(cli.output, OutputFormat::Json));

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system. JSON output gets JSON log lines.
fn init_logging(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Main async entry point. Returns whether the command succeeded.
async fn run(cli: Cli) -> Result<bool> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Apply {
            plan,
            config,
            state_out,
            parallelism,
        } => {
            cmd_apply(
                &plan,
                config.as_ref(),
                state_out.as_deref(),
                parallelism,
                &formatter,
            )
            .await
        }
        Commands::Graph {
            plan,
            config,
            format,
        } => cmd_graph(&plan, config.as_ref(), format, &formatter),
    }
}

/// Applies a saved plan.
async fn cmd_apply(
    plan_path: &Path,
    config_path: Option<&PathBuf>,
    state_out: Option<&Path>,
    parallelism: Option<usize>,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let (plan, config) = load_inputs(plan_path, config_path)?;

    let mut options = EngineOptions::from_env()?;
    if let Some(parallelism) = parallelism {
        options = options.with_parallelism(parallelism.max(1));
    }

    let counts = Arc::new(CountHook::new());
    let engine = build_engine(options, &plan)
        .with_hook(Arc::new(LoggingHook::new()))
        .with_hook(counts.clone());

    let cancel = CancelToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, waiting for running operations to finish");
                cancel.cancel();
            }
        }
    });

    let (state, diags) = engine.apply_with_cancel(&plan, &config, cancel).await;
    interrupt.abort();

    if let (Some(state), Some(path)) = (&state, state_out) {
        write_state(state, path)?;
    }

    eprintln!("{}", formatter.format_apply(state.as_ref(), &diags, counts.counts()));
    Ok(state.is_some() && !diags.has_errors())
}

/// Prints the apply graph of a saved plan.
fn cmd_graph(
    plan_path: &Path,
    config_path: Option<&PathBuf>,
    format: GraphFormat,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let (plan, config) = load_inputs(plan_path, config_path)?;
    let engine = build_engine(EngineOptions::default(), &plan);

    let (graph, diags) = engine.apply_graph_for_ui(&plan, &config);
    let Some(graph) = graph else {
        eprintln!("{}", formatter.format_failure(&diags));
        return Ok(false);
    };

    if !diags.is_empty() {
        eprintln!("{}", OutputFormatter::format_diagnostics(&diags));
    }
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", formatter.format_graph(&graph, format))?;
    Ok(true)
}

/// Creates an engine with an echo provider for every provider used by the plan.
fn build_engine(options: EngineOptions, plan: &Plan) -> Engine {
    let names: BTreeSet<&str> = plan
        .changes
        .resources
        .iter()
        .map(|change| change.provider.name.as_str())
        .collect();

    names.into_iter().fold(Engine::new(options), |engine, name| {
        debug!("Using echo provider for {}", name);
        engine.with_provider(name, Arc::new(|| Arc::new(EchoProvider::new()) as Arc<dyn Provider>))
    })
}

/// Loads the plan, then the configuration next to it (and its .env file).
fn load_inputs(plan_path: &Path, config_path: Option<&PathBuf>) -> Result<(Plan, Config)> {
    let plan = Plan::load_file(plan_path)?;

    let config_file = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(config_file.parent().unwrap_or_else(|| Path::new(".")));
    parser.load_dotenv()?;
    let config = parser.load_file(&config_file)?;

    Ok((plan, config))
}

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Writes the resulting state as JSON.
fn write_state(state: &State, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(state).map_err(|e| {
        TerraceError::State(StateError::SerializationError {
            message: e.to_string(),
        })
    })?;
    std::fs::write(path, content)?;
    info!("State written to {}", path.display());
    Ok(())
}
