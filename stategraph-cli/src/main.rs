//! `stategraph` binary: parse the command line, run the command, print its JSON report.

use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use stategraph::PartialState;
use stategraph_cli::{
    continue_with_config, history_with_config, load_config, resume_with_config,
    run_with_config, Demo, Error, RunOptions,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "stategraph")]
#[command(about = "Run demo state-graph workflows and inspect their checkpointed threads")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// SQLite file for checkpoints; without it threads live only for this process.
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<String>,

    /// Keep at most N checkpoints per thread.
    #[arg(long, global = true, value_name = "N")]
    max_checkpoints: Option<usize>,

    /// Per-node timeout in milliseconds.
    #[arg(long, global = true, value_name = "MS")]
    node_timeout_ms: Option<u64>,

    /// Step limit for one run.
    #[arg(long, global = true, value_name = "N")]
    max_steps: Option<usize>,

    /// Debug logs (node enter/exit, routing, checkpoints) on stderr.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a demo, or resume a suspended one with --resume.
    Run {
        /// Demo to run; optional with --resume, where the thread's own demo is used.
        #[arg(long, value_enum, required_unless_present = "resume")]
        demo: Option<Demo>,
        #[arg(long)]
        thread_id: Option<String>,
        /// Resume value for a suspended thread (JSON).
        #[arg(long, value_name = "JSON", conflicts_with = "input")]
        resume: Option<String>,
        /// Extra input keys for a fresh run (JSON object).
        #[arg(long, value_name = "JSON")]
        input: Option<String>,
    },
    /// Print a thread's checkpoints, newest first.
    History {
        #[arg(long)]
        thread_id: String,
    },
    /// Continue a thread from its latest checkpoint.
    Continue {
        #[arg(long)]
        thread_id: String,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_json(flag: &str, raw: &str) -> Result<Value, Error> {
    serde_json::from_str(raw).map_err(|e| format!("--{flag} is not valid JSON: {e}").into())
}

async fn execute(cli: Cli) -> Result<Value, Error> {
    let GlobalArgs {
        db,
        max_checkpoints,
        node_timeout_ms,
        max_steps,
        verbose,
    } = cli.global;
    let thread_id = match &cli.command {
        Command::Run { thread_id, .. } => thread_id.clone(),
        Command::History { thread_id } | Command::Continue { thread_id } => {
            Some(thread_id.clone())
        }
    };
    let config = load_config(&RunOptions {
        thread_id,
        db_path: db,
        max_checkpoints,
        node_timeout_ms,
        max_steps,
        verbose,
    })?;

    match cli.command {
        Command::Run {
            demo,
            resume: Some(raw),
            ..
        } => resume_with_config(&config, demo, parse_json("resume", &raw)?).await,
        Command::Run { demo, input, .. } => {
            let demo = demo.ok_or("--demo is required for a fresh run")?;
            let input = match input {
                Some(raw) => PartialState::from_value(parse_json("input", &raw)?)?,
                None => PartialState::new(),
            };
            run_with_config(&config, demo, input).await
        }
        Command::History { .. } => history_with_config(&config).await,
        Command::Continue { .. } => continue_with_config(&config).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    match execute(cli).await {
        Ok(report) => match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}
