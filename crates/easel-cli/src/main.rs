//! Easel CLI - browser action engine for AI image-generation front-ends
//!
//! Usage:
//!   easel run                     Run the engine dispatch loop
//!   easel task <action>           Post a task record to the engine mailbox
//!   easel meta <file>             Print the prompt embedded in an artifact

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use easel_core::{ExchangePaths, Mailbox, TaskAction, TaskRecord};
use easel_engine::{artifact, Supervisor};
use std::path::PathBuf;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "easel")]
#[command(author, version, about = "Browser action engine for AI image-generation front-ends")]
struct Cli {
    /// Exchange directory holding config.json, task.json and engine.log
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine dispatch loop (default)
    Run,

    /// Post a task record to the engine mailbox
    Task {
        /// Action name (launch, launch_headless, close_browser,
        /// upload_test, upload_test_redo, check_signin, scrape_gem_info,
        /// sand_box)
        action: TaskAction,

        /// Prompt text override
        #[arg(long)]
        subject: Option<String>,

        /// Reference image to attach (repeatable)
        #[arg(long = "attach")]
        attachments: Vec<PathBuf>,
    },

    /// Print the prompt embedded in a downloaded artifact
    Meta {
        /// Path to the PNG artifact
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let paths = ExchangePaths::new(cli.root.clone());

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let _guard = init_logging(&paths, cli.verbose)?;
            let mut supervisor = Supervisor::new(paths);
            supervisor.run().await;
            Ok(())
        }
        Commands::Task {
            action,
            subject,
            attachments,
        } => {
            let mut task = TaskRecord::new(action);
            task.subject = subject;
            task.attachments = attachments;
            Mailbox::new(paths.task())
                .post(&task)
                .context("failed to write task record")?;
            println!("Task '{}' posted.", task.action);
            Ok(())
        }
        Commands::Meta { file } => {
            let prompt = artifact::read_prompt(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            match prompt {
                Some(prompt) => println!("{}", prompt),
                None => println!("(no embedded prompt)"),
            }
            Ok(())
        }
    }
}

/// Initialize tracing to stdout plus the engine log file.
///
/// The log is recreated on every engine start; external consumers rely on
/// truncation happening only at restarts.
fn init_logging(
    paths: &ExchangePaths,
    verbose: bool,
) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_path = paths.log();
    let file = std::fs::File::create(&log_path)
        .with_context(|| format!("cannot create log file {}", log_path.display()))?;
    let (file_writer, guard) = tracing_appender::non_blocking(file);

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // No ANSI: the control surface parses the file line-by-line
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(file_writer.and(std::io::stdout))
        .init();

    Ok(guard)
}
