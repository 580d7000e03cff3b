use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use futures_util::StreamExt;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use serde_json::json;
use std::sync::Arc;
use stepwise_core::config::{self, Config};
use stepwise_core::graph::{NodeKind, Snapshot, Workflow};
use stepwise_core::providers::{self, ScriptedProvider};
use stepwise_core::traits::{ChatResponse, Provider};
use stepwise_core::tools::{PLAN, RESPONSE};
use stepwise_core::{RunFailure, truncate_chars};
use tracing_subscriber::EnvFilter;

mod onboard;

const PREVIEW_CHARS: usize = 160;

#[derive(Parser)]
#[command(name = "stepwise")]
#[command(about = "stepwise - plan, execute and replan toward an objective", long_about = None)]
struct Cli {
    /// Log workflow transitions and tool calls to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    Onboard,
    Run {
        /// What the workflow should accomplish; prompted for when omitted
        objective: Option<String>,

        #[arg(long)]
        recursion_limit: Option<usize>,

        #[arg(long)]
        thread_id: Option<String>,

        /// Print each snapshot as one JSON line
        #[arg(long)]
        json: bool,

        /// Use a scripted provider instead of a real backend
        #[arg(long)]
        dry_run: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "stepwise_core=info,stepwise=info"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let command = cli.command.unwrap_or_else(|| {
        if !config::config_exists() {
            Commands::Onboard
        } else {
            Commands::Run {
                objective: None,
                recursion_limit: None,
                thread_id: None,
                json: false,
                dry_run: false,
            }
        }
    });

    match command {
        Commands::Onboard => {
            let onboard_config = onboard::run_onboard().map_err(|e| {
                eprintln!("{} Onboarding failed: {}", style("✗").red().bold(), e);
                anyhow::anyhow!("Onboarding failed: {}", e)
            })?;
            config::save_config(&onboard_config)?;
        }
        Commands::Run {
            objective,
            recursion_limit,
            thread_id,
            json,
            dry_run,
        } => {
            let config = if dry_run && !config::config_exists() {
                Config::default()
            } else {
                config::load_config()?
            };

            let objective = match objective {
                Some(objective) => objective,
                None => match read_objective()? {
                    Some(objective) => objective,
                    None => return Ok(()),
                },
            };

            let provider: Arc<dyn Provider> = if dry_run {
                Arc::new(dry_run_provider(&objective))
            } else {
                Arc::from(providers::create_provider(&config)?)
            };

            let workflow = Workflow::from_config(&config, provider)?;
            let mut run_config = workflow.run_config();
            if let Some(limit) = recursion_limit {
                run_config = run_config.with_recursion_limit(limit);
            }
            if let Some(thread_id) = thread_id {
                run_config = run_config.with_thread_id(thread_id);
            }

            if !json {
                println!(
                    "{} {}",
                    style("Objective:").bold(),
                    style(&objective).cyan()
                );
                println!();
            }

            let thread_id = run_config.thread_id.clone();
            let mut snapshots = workflow.run(objective, run_config);
            let mut last = None;
            let mut failed = None;
            while let Some(item) = snapshots.next().await {
                match item {
                    Ok(snapshot) => {
                        if json {
                            println!("{}", serde_json::to_string(&snapshot)?);
                        } else {
                            print_snapshot(&snapshot);
                        }
                        last = Some(snapshot);
                    }
                    Err(failure) => failed = Some(failure),
                }
            }
            drop(snapshots);
            workflow.release_memory(&thread_id);

            if let Some(failure) = failed {
                report_failure(&failure, json)?;
                anyhow::bail!("Workflow failed: {}", failure.error);
            }

            if !json && let Some(response) = last.and_then(|s| s.state.response) {
                println!();
                println!("{}", style("Response").green().bold());
                termimad::MadSkin::default().print_text(&response);
            }
        }
    }

    Ok(())
}

fn read_objective() -> Result<Option<String>> {
    let mut editor = DefaultEditor::new().context("Failed to start line editor")?;
    let history = config::get_history_path();
    let _ = editor.load_history(&history);

    println!("Enter an objective (Ctrl+D to exit):");
    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);
                if config::ensure_stepwise_dir().is_ok()
                    && let Err(e) = editor.save_history(&history)
                {
                    tracing::warn!(error = %e, "could not save history");
                }
                return Ok(Some(line.to_string()));
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => return Ok(None),
            Err(e) => return Err(e).context("Failed to read objective"),
        }
    }
}

fn print_snapshot(snapshot: &Snapshot) {
    let state = &snapshot.state;
    let header = format!("[{}] {}", snapshot.transition, snapshot.node);

    match snapshot.node {
        NodeKind::Planner => {
            println!("{}", style(header).cyan().bold());
            print_plan(&state.plan);
        }
        NodeKind::Executor => {
            println!("{}", style(header).yellow().bold());
            if let Some(past) = state.past_steps.last() {
                println!("  {} {}", style("step:").dim(), past.step);
                println!(
                    "  {} {}",
                    style("result:").dim(),
                    preview(&past.result)
                );
            }
        }
        NodeKind::Replanner => {
            println!("{}", style(header).magenta().bold());
            if state.has_response() {
                println!("  {} final response ready", style("→").green());
            } else {
                print_plan(&state.plan);
            }
        }
    }
    println!();
}

fn print_plan(plan: &[String]) {
    for (i, step) in plan.iter().enumerate() {
        println!("  {}. {}", i + 1, step);
    }
}

fn preview(text: &str) -> String {
    let single_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.chars().count() > PREVIEW_CHARS {
        format!("{}...", truncate_chars(&single_line, PREVIEW_CHARS))
    } else {
        single_line
    }
}

fn report_failure(failure: &RunFailure, json: bool) -> Result<()> {
    if json {
        let line = json!({
            "error": failure.error.to_string(),
            "last_snapshot": failure.last_snapshot,
        });
        println!("{}", serde_json::to_string(&line)?);
        return Ok(());
    }

    eprintln!("{} {}", style("✗").red().bold(), failure.error);
    match &failure.last_snapshot {
        Some(last) => {
            eprintln!(
                "{}",
                style(format!(
                    "Last committed state (transition {}, {}):",
                    last.transition, last.node
                ))
                .dim()
            );
            eprintln!("{}", serde_json::to_string_pretty(&last.state)?);
        }
        None => eprintln!("{}", style("No transition was committed.").dim()),
    }
    Ok(())
}

/// A three-transition run that never leaves the machine: one planned step,
/// a canned result, then a response.
fn dry_run_provider(objective: &str) -> ScriptedProvider {
    ScriptedProvider::new([
        ScriptedProvider::tool_call(PLAN, json!({ "steps": [format!("Research: {objective}")] })),
        ChatResponse::text(format!("(dry run) No research was performed for: {objective}")),
        ScriptedProvider::tool_call(
            RESPONSE,
            json!({ "response": format!("**Dry run complete.** The workflow ran end to end for `{objective}` without contacting a model.") }),
        ),
    ])
}
