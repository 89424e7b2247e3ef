use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use scout_core::config::AppConfig;
use scout_graph::{Engine, EventKind, ExecutionResult, GraphEvent};

#[derive(Parser)]
#[command(name = "scout", version, about = "Research assistant on a step-bounded workflow engine")]
struct Cli {
    /// Path to config file (falls back to environment variables when missing)
    #[arg(short, long, default_value = "scout.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive REPL mode
    Repl,
    /// Run a single prompt and exit
    Run {
        /// Print progress events and report text as they are produced
        #[arg(long)]
        stream: bool,
        /// Print the result (or, with --stream, every event) as JSON
        #[arg(long)]
        json: bool,
        /// The prompt; read from stdin when empty
        #[arg(trailing_var_arg = true)]
        prompt: Vec<String>,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, Copy)]
struct Output {
    stream: bool,
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Handle completions before config loading
    if let Some(Commands::Completions { shell }) = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "scout", &mut io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.filter)),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    if let Some(Commands::Config) = &cli.command {
        println!("{}", toml::to_string_pretty(&redacted(&config))?);
        return Ok(());
    }

    let engine = Engine::from_config(&config).context("failed to build research graph")?;
    info!(
        model = %config.model.model_id,
        max_steps = engine.settings().max_steps,
        nodes = engine.nodes().len(),
        "Engine ready"
    );
    let buffer = config.graph.event_buffer;

    match cli.command {
        Some(Commands::Run { stream, json, prompt }) => {
            let mut text = prompt.join(" ");
            if text.trim().is_empty() {
                // Read from stdin
                text = io::stdin()
                    .lock()
                    .lines()
                    .map_while(|l| l.ok())
                    .collect::<Vec<_>>()
                    .join("\n");
            }
            if text.trim().is_empty() {
                anyhow::bail!("empty prompt");
            }
            run_once(&engine, &text, Output { stream, json }, buffer).await?;
        }
        Some(Commands::Repl) | None => run_repl(&engine, &config, buffer).await?,
        Some(Commands::Config) | Some(Commands::Completions { .. }) => {
            unreachable!("handled before engine construction")
        }
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        AppConfig::load(path).with_context(|| format!("failed to load {}", path.display()))
    } else {
        AppConfig::from_env().with_context(|| {
            format!(
                "{} not found and the environment does not describe a usable model",
                path.display()
            )
        })
    }
}

fn mask(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    format!("{visible}***")
}

fn redacted(config: &AppConfig) -> AppConfig {
    let mut shown = config.clone();
    for model in std::iter::once(&mut shown.model).chain(shown.fallback_models.iter_mut()) {
        if let Some(key) = model.api_key.as_mut() {
            *key = mask(key);
        }
    }
    if let Some(ws) = shown.web_search.as_mut() {
        ws.api_key = mask(&ws.api_key);
    }
    shown
}

/// Run one prompt. Ctrl-C cancels the run; the partial result is still printed.
async fn run_once(engine: &Engine, input: &str, output: Output, buffer: usize) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling run");
                cancel.cancel();
            }
        })
    };

    let outcome = if output.stream {
        let (tx, rx) = mpsc::channel(buffer);
        let printer = tokio::spawn(print_events(rx, output.json));
        let outcome = engine.stream_execute(&cancel, input, tx).await;
        // The engine dropped its sender, so the printer drains and exits.
        printer.await.ok();
        outcome
    } else {
        engine.execute(&cancel, input).await
    };
    ctrl_c.abort();

    match outcome {
        Ok(result) => {
            print_result(&result, output)?;
            Ok(())
        }
        Err(failure) => {
            print_result(&failure.partial, output)?;
            Err(failure.into())
        }
    }
}

async fn print_events(mut rx: mpsc::Receiver<GraphEvent>, json: bool) {
    while let Some(event) = rx.recv().await {
        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "Failed to serialize event"),
            }
            continue;
        }
        match &event.kind {
            EventKind::Start => eprintln!("[start] run {}", event.run_id),
            EventKind::NodeStart => eprintln!("\n[{}] started", event.node),
            EventKind::StreamingChunk { chunk } => {
                print!("{chunk}");
                io::stdout().flush().ok();
            }
            EventKind::NodeComplete => eprintln!("\n[{}] done", event.node),
            EventKind::Error { message } => eprintln!("\n[{}] error: {}", event.node, message),
            EventKind::Complete => eprintln!("\n[complete]"),
        }
    }
}

fn print_result(result: &ExecutionResult, output: Output) -> anyhow::Result<()> {
    if output.json {
        // Streaming JSON mode already printed the final state in the last event.
        if !output.stream {
            println!("{}", serde_json::to_string_pretty(result)?);
        }
        return Ok(());
    }

    let state = &result.state;
    println!("\n{}", "=".repeat(60));
    println!("Time:   {:.2}s", result.elapsed_ms as f64 / 1000.0);
    println!("Steps:  {}", result.steps);
    println!("Path:   {}", result.path.join(" → "));
    if let Some(intent) = state.intent {
        println!("Intent: {intent}");
    }
    if !state.topic.is_empty() {
        println!("Topic:  {}", state.topic);
    }
    if !state.queries.is_empty() {
        println!("Queries:");
        for (i, query) in state.queries.iter().enumerate() {
            println!("  {}. {}", i + 1, query);
        }
    }
    if let Some(error) = &state.error {
        println!("Error:  {error}");
    }
    println!("{}", "=".repeat(60));
    // Streamed runs already showed the report text.
    if !output.stream && !state.report.is_empty() {
        println!("\n{}", state.report);
    }
    Ok(())
}

async fn run_repl(engine: &Engine, config: &AppConfig, buffer: usize) -> anyhow::Result<()> {
    println!("Scout v{}", env!("CARGO_PKG_VERSION"));
    println!("Model: {} ({})", config.model.model_id, config.model.provider);
    println!(
        "Search: {}",
        config
            .active_search()
            .map(|ws| ws.provider.as_str())
            .unwrap_or("simulated")
    );
    println!("Type 'stream' to toggle streaming, 'exit' to quit.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut stream = true;

    loop {
        print!("> ");
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break; // EOF
        }

        let input = input.trim();
        match input {
            "" => continue,
            "exit" | "quit" => {
                println!("Goodbye!");
                break;
            }
            "stream" => {
                stream = !stream;
                println!("Streaming {}", if stream { "on" } else { "off" });
                continue;
            }
            _ => {}
        }

        let output = Output { stream, json: false };
        if let Err(e) = run_once(engine, input, output, buffer).await {
            eprintln!("[error: {e}]");
        }
        println!();
    }

    Ok(())
}
