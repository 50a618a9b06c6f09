use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use lowcoder_runtime::analyzer::{
    analyze_schema, compute_schema_hash, extract_data_dependencies, validate_schema,
};
use lowcoder_runtime::context::NamespaceKind;
use lowcoder_runtime::{
    config, EngineConfig, Error, InternalResult, RenderContext, RenderEngine, RenderOptions,
    Schema,
};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Engine configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a schema and print the result tree
    Render {
        #[command(flatten)]
        input: Input,

        /// Bypass the cache and keep debug information
        #[arg(long)]
        debug: bool,

        /// Attach performance counters to the result
        #[arg(long)]
        perf: bool,
    },
    /// Print tree statistics and data dependencies
    Analyze {
        #[arg(short, long)]
        schema: PathBuf,
    },
    /// Check structural validity; exits non-zero when invalid
    Validate {
        #[arg(short, long)]
        schema: PathBuf,
    },
    /// Mount a schema, fire one event and print the resulting state
    Dispatch {
        #[command(flatten)]
        input: Input,

        /// Event name, e.g. `click`
        #[arg(short, long)]
        event: String,

        /// Event payload as inline JSON
        #[arg(short, long, default_value = "null")]
        data: String,
    },
}

#[derive(Args)]
struct Input {
    /// Schema file (JSON)
    #[arg(short, long)]
    schema: PathBuf,

    /// Context file (JSON object with data/state/variables/params/query/user/tenant)
    #[arg(short, long)]
    context: Option<PathBuf>,
}

fn load_schema(path: &Path) -> InternalResult<Schema> {
    let json = std::fs::read_to_string(path)?;
    Ok(Schema::from_json(&json)?)
}

fn load_context(path: Option<&Path>) -> InternalResult<RenderContext> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)?;
            let value: Value = serde_json::from_str(&json)?;
            Ok(RenderContext::from_json(&value))
        }
        None => Ok(RenderContext::new()),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> InternalResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: &Cli) -> InternalResult<()> {
    let config: EngineConfig = match &cli.config {
        Some(path) => config::from_file(path)?,
        None => EngineConfig::default(),
    };

    match &cli.command {
        Command::Render { input, debug, perf } => {
            let schema = load_schema(&input.schema)?;
            let context = load_context(input.context.as_deref())?;
            let engine = RenderEngine::builder(config).build();
            let options = RenderOptions {
                debug: *debug || engine.config().default_options.debug,
                enable_performance_tracking: *perf
                    || engine.config().default_options.enable_performance_tracking,
            };
            let result = engine.render(&schema, &context, Some(options)).await?;
            print_json(result.as_ref())
        }
        Command::Analyze { schema } => {
            let schema = load_schema(schema)?;
            print_json(&json!({
                "schemaId": schema.id,
                "hash": compute_schema_hash(&schema),
                "analysis": analyze_schema(&schema),
                "dataDependencies": extract_data_dependencies(&schema),
            }))
        }
        Command::Validate { schema } => {
            let schema = load_schema(schema)?;
            let report = validate_schema(&schema);
            print_json(&report)?;
            report.into_result()?;
            Ok(())
        }
        Command::Dispatch { input, event, data } => {
            let schema = load_schema(&input.schema)?;
            let context = load_context(input.context.as_deref())?;
            let data: Value = serde_json::from_str(data)?;
            let engine = RenderEngine::builder(config).build();
            engine.mount(&schema)?;

            let report = engine.dispatch(event, data, &context).await;
            print_json(&json!({
                "report": report,
                "state": context.snapshot(NamespaceKind::State),
                "variables": context.snapshot(NamespaceKind::Variables),
            }))?;
            if report.is_success() {
                Ok(())
            } else {
                Err(Error::internal(format!(
                    "{} handler(s) failed for `{}`",
                    report.failures.len(),
                    event
                )))
            }
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
