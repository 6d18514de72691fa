//! stateflow - condition-guarded state machine runner.
//!
//! Loads a declarative machine definition (YAML or JSON), runs one
//! traversal against the supplied context data, and reports the state the
//! traversal halted in.

use clap::Parser as CliParser;
use stateflow_core::{EngineConfig, ExecutionContext, TracingObserver};
use stateflow_parser::{ActionRegistry, Parser};
use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, CliParser)]
#[command(
    name = "stateflow",
    version,
    about = "Run a condition-guarded state machine to completion"
)]
struct Args {
    /// Machine definition file (.yaml, .yml, or .json).
    machine: PathBuf,

    /// Initial context data as a JSON object.
    #[arg(long, default_value = "{}")]
    data: String,

    /// Log entered states and taken transitions.
    #[arg(long)]
    trace: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(state) => {
            println!("halted in state '{state}'");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<String, Box<dyn std::error::Error>> {
    let parser = Parser::new(ActionRegistry::with_builtins());

    let file = File::open(&args.machine)?;
    let spec = match args.machine.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => parser.parse_yaml(file)?,
        Some("json") => parser.parse_json(file)?,
        other => {
            return Err(format!("unsupported machine file extension: {other:?}").into());
        }
    };

    let data: serde_json::Value = serde_json::from_str(&args.data)?;
    let data = match data {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        _ => return Err("--data must be a JSON object".into()),
    };

    let mut config = EngineConfig::default();
    if args.trace {
        config.observer = Some(Arc::new(TracingObserver));
    }

    let engine = parser.build_with(&spec, config)?;
    let ctx = ExecutionContext::with_data(data);

    engine.start(&ctx)?;
    Ok(engine.current_state()?)
}
