use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::Parser;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use screenqueue::config::{self as cfg, QueueDocument, Settings, SourceConfig};
use screenqueue::executor::Runtime;
use screenqueue::sources;

/// screenqueue CLI
#[derive(Debug, Parser)]
#[command(
    name = screenqueue::PKG_NAME,
    version = screenqueue::PKG_VERSION,
    about = "Run screen-driven desktop automation queues described in JSON"
)]
struct Args {
    /// Run the queue in this JSON file once and exit
    #[arg(short = 'q', long = "queue", conflicts_with_all = ["stdin", "watch"])]
    queue: Option<PathBuf>,

    /// Keep running and execute newline-delimited queue documents from stdin
    #[arg(long = "stdin")]
    stdin: bool,

    /// Keep running and execute the queue file at this path whenever it appears or changes
    #[arg(long = "watch")]
    watch: Option<String>,

    /// Poll interval for --watch, in milliseconds
    #[arg(long = "poll-ms", requires = "watch")]
    poll_ms: Option<u64>,

    /// Delete the --watch file after reading it
    #[arg(long = "delete-on-success", requires = "watch")]
    delete_on_success: bool,

    /// Multiplier from image pixels to input coordinates (e.g. 0.5 on a 2x display)
    #[arg(long = "scale-factor")]
    scale_factor: Option<f32>,

    /// Default template-matching threshold (0..=1)
    #[arg(long = "threshold")]
    threshold: Option<f32>,

    /// Verbose logs and annotated match images
    #[arg(long = "debug")]
    debug: bool,

    /// Enable dry-run mode (log input actions instead of simulating them)
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// Record failing actions and keep going
    #[arg(long = "continue-on-error")]
    continue_on_error: bool,

    /// Attempts per action before it counts as failed
    #[arg(long = "max-retries")]
    max_retries: Option<u32>,

    /// Validate the whole --queue file (types, params, identifiers, references) and exit without
    /// running it. A normal run checks each action only when its turn comes.
    #[arg(long = "check", requires = "queue")]
    check: bool,

    /// Print the recorded results as JSON after a --queue run
    #[arg(long = "print-results", requires = "queue")]
    print_results: bool,

    /// Set log level (e.g., trace, debug, info, warn, error). Overrides RUST_LOG.
    #[arg(long = "log-level")]
    log_level: Option<String>,

    /// Print the JSON Schema for queue documents and exit
    #[arg(long = "print-schema")]
    print_schema: bool,
}

impl Args {
    /// Command-line flags win over settings carried by a queue document.
    fn apply_overrides(&self, mut settings: Settings) -> Settings {
        if let Some(scale_factor) = self.scale_factor {
            settings.scale_factor = scale_factor;
        }
        if let Some(threshold) = self.threshold {
            settings.threshold = threshold;
        }
        if let Some(max_retries) = self.max_retries {
            settings.max_retries = max_retries;
        }
        settings.debug |= self.debug;
        settings.dry_run |= self.dry_run;
        settings.continue_on_error |= self.continue_on_error;
        settings
    }

    fn source_configs(&self) -> Vec<SourceConfig> {
        let mut out = Vec::new();
        if self.stdin {
            out.push(SourceConfig::Stdin);
        }
        if let Some(path) = &self.watch {
            out.push(SourceConfig::File {
                path: path.clone(),
                poll_ms: self.poll_ms,
                delete_on_success: Some(self.delete_on_success),
            });
        }
        out
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match &args.log_level {
        Some(name) => Some(
            screenqueue::parse_level(name)
                .with_context(|| format!("Unknown log level '{name}'"))?,
        ),
        None if args.debug => Some(tracing::Level::DEBUG),
        None => None,
    };
    screenqueue::init_tracing(level);

    if args.print_schema {
        let schema = cfg::generate_schema();
        let json = serde_json::to_string_pretty(&schema)?;
        println!("{json}");
        return Ok(());
    }

    info!(
        version = screenqueue::PKG_VERSION,
        dry_run = args.dry_run,
        "Starting screenqueue"
    );

    match &args.queue {
        Some(path) => run_queue_file(&args, path).await,
        None => run_sources(&args).await,
    }
}

async fn run_queue_file(args: &Args, path: &Path) -> anyhow::Result<()> {
    let doc = cfg::load_from_path_async(path).await?;

    if args.check {
        cfg::validate_queue(&doc).with_context(|| format!("Queue {} failed validation", path.display()))?;
        println!("{}: {} actions, ok", path.display(), doc.actions.len());
        return Ok(());
    }

    let QueueDocument { settings, actions } = doc;
    let settings = args.apply_overrides(settings.unwrap_or_default());
    settings.check().context("Invalid settings")?;
    let mut runtime = Runtime::new(settings);

    let report = runtime
        .run_action_queue(&actions)
        .with_context(|| format!("Queue {} stopped", path.display()))?;

    for failure in &report.failures {
        warn!(
            index = failure.index,
            action_type = %failure.action_type,
            attempts = failure.attempts,
            error = %failure.error,
            "Action failed"
        );
    }
    if args.print_results {
        println!("{}", serde_json::to_string_pretty(runtime.results())?);
    }
    info!(
        executed = report.executed.len(),
        failed = report.failures.len(),
        "Queue finished"
    );
    if !report.is_success() {
        bail!("{} of {} actions failed", report.failures.len(), actions.len());
    }
    Ok(())
}

async fn run_sources(args: &Args) -> anyhow::Result<()> {
    let configs = args.source_configs();
    if configs.is_empty() {
        bail!("Nothing to run: pass --queue <file>, --stdin or --watch <file>");
    }

    let settings = args.apply_overrides(Settings::default());
    settings.check().context("Invalid settings")?;
    let mut runtime = Runtime::new(settings);

    let sources = sources::build_sources_from_config(&configs);
    let (tx, mut rx) = mpsc::channel::<Value>(16);
    let _handles = sources::spawn_all_sources(&sources, tx);

    tokio::select! {
        _ = async {
            while let Some(document) = rx.recv().await {
                if let Err(err) = handle_document(args, &mut runtime, document) {
                    error!("Failed to run queue document: {err:#}");
                }
            }
        } => {
            info!("All sources finished");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    info!("screenqueue exited");
    Ok(())
}

/// Run one queue document arriving from a source. Settings carried by the
/// document stay in effect for later documents.
fn handle_document(args: &Args, runtime: &mut Runtime, document: Value) -> anyhow::Result<()> {
    let doc = cfg::parse_queue_value(document)?;
    if let Some(settings) = doc.settings {
        runtime
            .apply_settings(args.apply_overrides(settings))
            .context("Invalid queue settings")?;
        debug!("Applied settings from queue document");
    }

    let report = runtime.run_action_queue(&doc.actions)?;
    info!(
        executed = report.executed.len(),
        failed = report.failures.len(),
        "Queue finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_file(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("queue.json");
        let queue = r#"[
            {"type": "delay", "params": {"duration": 0}},
            {"type": "send_text", "params": {"text": "{{later.result}}", "interpolate": true}},
            {"type": "delay", "params": {"duration": 0, "execute_identifier": "later"}}
        ]"#;
        std::fs::write(&path, queue).unwrap();
        path
    }

    #[tokio::test]
    async fn check_validates_the_whole_queue() {
        let dir = tempfile::tempdir().unwrap();
        let path = queue_file(&dir);
        let args = Args::try_parse_from(["screenqueue", "--queue", path.to_str().unwrap(), "--check"]).unwrap();
        let err = format!("{:#}", run_queue_file(&args, &path).await.unwrap_err());
        assert!(err.contains("failed validation"), "{err}");
    }

    #[tokio::test]
    async fn plain_run_dispatches_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let path = queue_file(&dir);
        let args = Args::try_parse_from(["screenqueue", "--queue", path.to_str().unwrap(), "--dry-run"]).unwrap();
        let err = format!("{:#}", run_queue_file(&args, &path).await.unwrap_err());
        assert!(err.contains("stopped"), "{err}");
        assert!(!err.contains("failed validation"), "{err}");
    }

    #[test]
    fn flags_override_document_settings() {
        let args = Args::try_parse_from(["screenqueue", "--max-retries", "4", "--threshold", "0.5"]).unwrap();
        let settings = args.apply_overrides(Settings::default());
        assert_eq!(settings.max_retries, 4);
        assert_eq!(settings.threshold, 0.5);
    }
}
