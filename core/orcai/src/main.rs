//! orcai: records an interactive shell session and turns it into an Ansible playbook.
//!
//! ## Subcommands
//!
//! - `start`: run the user's shell behind a PTY, capturing commands, scripts and file diffs
//! - `stop`: end the capture from inside the proxied shell
//! - `config`: interactive setup of the summarization endpoint
//! - `summarize`: re-send a transcript saved after a failed handoff

mod configure;
mod logging;
mod output;
mod stop;

use clap::{Args, Parser, Subcommand};
use orcai_core::{
    load_config, load_transcript, CaptureDriver, CaptureOutcome, CaptureSettings,
    ConfigOverrides, HttpSummarizer, NotifyBackend, OrcaiConfig, OrcaiError, Session,
    StoragePaths, Summarizer, SESSION_PID_ENV,
};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "orcai")]
#[command(about = "Turn a recorded shell session into an Ansible playbook")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    overrides: OverrideArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Per-invocation overrides of the stored configuration.
#[derive(Args)]
struct OverrideArgs {
    /// Override API endpoint
    #[arg(long, global = true)]
    api_endpoint: Option<String>,

    /// Override API key
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Override LLM model
    #[arg(long, global = true)]
    model: Option<String>,

    /// Override context length (max tokens of the reply)
    #[arg(long, global = true)]
    context_length: Option<u32>,
}

impl From<OverrideArgs> for ConfigOverrides {
    fn from(args: OverrideArgs) -> Self {
        ConfigOverrides {
            api_endpoint: args.api_endpoint,
            api_key: args.api_key,
            model: args.model,
            context_length: args.context_length,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Start capturing in a proxied shell; exit the shell or run `stop` to finish
    Start {
        /// Where to save the playbook (prompted for when omitted)
        #[arg(long, short, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Stop the capture this shell belongs to
    Stop,

    /// Configure the summarization endpoint
    Config,

    /// Send a saved transcript for summarization
    Summarize {
        /// Transcript JSON written by a failed handoff
        #[arg(value_name = "TRANSCRIPT")]
        transcript: PathBuf,

        /// Where to save the playbook (prompted for when omitted)
        #[arg(long, short, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let paths = match StoragePaths::from_home() {
        Ok(paths) => paths,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let _logging_guard = logging::init(&paths);

    let overrides = ConfigOverrides::from(cli.overrides);
    let result = match cli.command {
        Commands::Start { output } => start(&paths, overrides, output.as_deref()),
        Commands::Stop => stop(),
        Commands::Config => configure::run(&paths),
        Commands::Summarize { transcript, output } => {
            summarize(&paths, overrides, &transcript, output.as_deref())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "orcai failed");
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_effective_config(
    paths: &StoragePaths,
    overrides: ConfigOverrides,
) -> orcai_core::Result<OrcaiConfig> {
    Ok(load_config(paths.config_file())?.with_overrides(overrides))
}

fn start(
    paths: &StoragePaths,
    overrides: ConfigOverrides,
    target: Option<&Path>,
) -> orcai_core::Result<()> {
    if std::env::var_os(SESSION_PID_ENV).is_some() {
        println!("Capture is already running!");
        return Ok(());
    }

    let config = load_effective_config(paths, overrides)?;
    let missing = config.missing_fields();
    if !missing.is_empty() {
        eprintln!(
            "Note: {} not configured; the transcript will be saved instead of sent.",
            missing.join(", ")
        );
    }

    let settings = CaptureSettings::from_env(paths);
    eprintln!(
        "Starting capture in {} (exit the shell or run `orcai stop` to finish)...",
        settings.shell.display()
    );

    let session = Session::new(settings, Box::new(NotifyBackend));
    let driver = CaptureDriver::new(session, Box::new(HttpSummarizer::new(config)))
        .with_transcripts_dir(paths.transcripts_dir());

    let outcome = driver.run()?;
    eprintln!("Stopping capture ({})...", outcome.reason);
    report_outcome(outcome, target)
}

fn report_outcome(outcome: CaptureOutcome, target: Option<&Path>) -> orcai_core::Result<()> {
    match outcome.artifact {
        Ok(playbook) => deliver(&playbook, target),
        Err(e) => {
            eprintln!("{}", e);
            if let Some(saved) = outcome.saved_transcript {
                eprintln!(
                    "Transcript saved to {}; re-send it with `orcai summarize {}`.",
                    saved.display(),
                    saved.display()
                );
            }
            Ok(())
        }
    }
}

fn stop() -> orcai_core::Result<()> {
    match stop::run().map_err(|e| OrcaiError::io("Failed to signal capture", e))? {
        stop::StopOutcome::Signalled(_) => println!("Stopping capture..."),
        stop::StopOutcome::NoCapture => println!("No capture to stop!"),
    }
    Ok(())
}

fn summarize(
    paths: &StoragePaths,
    overrides: ConfigOverrides,
    transcript: &Path,
    target: Option<&Path>,
) -> orcai_core::Result<()> {
    let config = load_effective_config(paths, overrides)?;
    let report = load_transcript(transcript)?;

    match HttpSummarizer::new(config).summarize(&report) {
        Ok(playbook) => deliver(&playbook, target),
        Err(e) if e.is_handoff_failure() => {
            eprintln!("{}", e);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn deliver(playbook: &str, target: Option<&Path>) -> orcai_core::Result<()> {
    let stdin = io::stdin();
    let stderr = io::stderr();
    let stdout = io::stdout();
    let delivery = output::deliver(
        playbook,
        target,
        &mut stdin.lock(),
        &mut stderr.lock(),
        &mut stdout.lock(),
    )
    .map_err(|e| OrcaiError::io("Failed to write playbook", e))?;

    if let output::Delivery::Saved(path) = delivery {
        eprintln!("Playbook saved to {}.", path.display());
    }
    Ok(())
}
