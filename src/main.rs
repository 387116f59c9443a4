use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use sitesmith::{
    Config, ContextStore, EventSink, GenerateRequest, ModelRegistry, StreamEvent,
    WebsiteGenerator,
};

#[derive(Parser)]
#[command(name = "sitesmith")]
#[command(about = "AI-assisted website scaffolding from a natural-language prompt", long_about = None)]
struct Cli {
    /// What to build, or how to change the current site
    prompt: Option<String>,

    /// Model backend to generate with
    #[arg(long, default_value = "groq")]
    model: String,

    /// Session id; consecutive runs against the same session modify the
    /// same site
    #[arg(long, default_value = "default")]
    session: String,

    /// Directory the generated files are written to
    #[arg(long, default_value = "site")]
    out: PathBuf,

    /// Export the session snapshot to a JSON file after the run
    #[arg(long)]
    export: Option<PathBuf>,

    /// Import a session snapshot from a JSON file before the run
    #[arg(long)]
    import: Option<PathBuf>,

    /// Discard the session's existing context first
    #[arg(long)]
    reset: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Prints status events on a spinner; terminal events are handled by the
/// caller once the request returns.
struct SpinnerSink {
    spinner: ProgressBar,
}

impl SpinnerSink {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}").expect("valid spinner template"),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(100));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl EventSink for SpinnerSink {
    fn emit(&self, event: StreamEvent) {
        if let StreamEvent::Status { message } = event {
            self.spinner.set_message(message);
        }
    }
}

fn session_file(session: &str) -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".sitesmith")
        .join("sessions")
        .join(format!("{}.json", session))
}

fn save_session(store: &ContextStore, session: &str) -> Result<()> {
    let snapshot = store.export_snapshot(session)?;
    let path = session_file(session);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, serde_json::to_string_pretty(&snapshot)?)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("sitesmith=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::load_or_default()?;
    let registry = Arc::new(ModelRegistry::from_config(&config));
    let store = Arc::new(ContextStore::new());

    // Rehydrate the session from a previous run, then any explicit import.
    let session_path = session_file(&cli.session);
    if session_path.exists() {
        let json = fs::read_to_string(&session_path)?;
        store
            .import_snapshot(&cli.session, &json)
            .with_context(|| format!("failed to load session {}", session_path.display()))?;
    }
    if let Some(path) = &cli.import {
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        store
            .import_snapshot(&cli.session, &json)
            .with_context(|| format!("failed to import {}", path.display()))?;
    }
    if cli.reset {
        store.reset(&cli.session);
    }
    // Persist import/reset even when no generation follows.
    if cli.prompt.is_none() && (cli.import.is_some() || cli.reset) {
        save_session(&store, &cli.session)?;
    }

    if let Some(prompt) = &cli.prompt {
        let generator = WebsiteGenerator::new(registry, Arc::clone(&store));
        let request = GenerateRequest {
            prompt: prompt.clone(),
            session_id: cli.session.clone(),
            reset_context: false,
            model: cli.model.clone(),
            context: None,
        };

        let cancel = CancellationToken::new();
        let ctrl_c_cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ctrl_c_cancel.cancel();
            }
        });

        let sink = SpinnerSink::new();
        let outcome = generator.process_request(&request, &sink, &cancel).await;
        sink.finish();

        let result = outcome?;
        if result.success {
            fs::create_dir_all(&cli.out)?;
            fs::write(cli.out.join("index.html"), &result.files.html)?;
            fs::write(cli.out.join("styles.css"), &result.files.css)?;
            fs::write(cli.out.join("index.js"), &result.files.js)?;
            save_session(&store, &cli.session)?;

            for change in &result.changes {
                println!("  - {}", change);
            }
            println!("{}", result.explanation);
            println!("Files written to {}", cli.out.display());
        } else {
            eprintln!("{}", result.explanation);
        }
    }

    if let Some(path) = &cli.export {
        let snapshot = store.export_snapshot(&cli.session)?;
        fs::write(path, serde_json::to_string_pretty(&snapshot)?)?;
        println!("Session exported to {}", path.display());
    }

    if cli.prompt.is_none() && cli.import.is_none() && cli.export.is_none() && !cli.reset {
        eprintln!("Nothing to do. Pass a prompt, --import, or --export. See --help.");
    }

    Ok(())
}
