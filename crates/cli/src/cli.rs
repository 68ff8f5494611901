use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use ea_client::EraseMode;
use ea_domain::config::{Config, Priority};
use ea_domain::error::Error;

/// Exit code for a job the server processed but reported as failed.
pub const EXIT_JOB_FAILED: i32 = 2;
pub const EXIT_FAILURE: i32 = 1;

/// editor-cli: run image editor skills from the command line.
#[derive(Debug, Parser)]
#[command(name = "editor-cli", version, about)]
pub struct Cli {
    /// Path to the TOML config (an `[editor]` table).
    #[arg(long, default_value = "editor.toml")]
    pub config: PathBuf,

    /// `user:password` or an API key; overrides config and environment.
    #[arg(long)]
    pub credentials: Option<String>,

    /// Scheduling priority for submitted jobs.
    #[arg(long)]
    pub priority: Option<Priority>,

    /// Print results and logs as JSON.
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the remaining credits of the account.
    Credits,
    /// Remove the object described by a prompt.
    Erase {
        /// What to erase, e.g. "glass of water".
        #[arg(long)]
        prompt: String,
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, value_enum, default_value_t = EraseModeArg::Standard)]
        mode: EraseModeArg,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Cut out the object described by a prompt on a transparent background.
    Cutout {
        #[arg(long)]
        prompt: String,
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Upscale an image.
    Upscale {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any issues.
    Validate,
    /// Dump the resolved configuration (defaults and environment applied).
    Show,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum EraseModeArg {
    Express,
    Standard,
    Premium,
    Free,
}

impl From<EraseModeArg> for EraseMode {
    fn from(mode: EraseModeArg) -> Self {
        match mode {
            EraseModeArg::Express => EraseMode::Express,
            EraseModeArg::Standard => EraseMode::Standard,
            EraseModeArg::Premium => EraseMode::Premium,
            EraseModeArg::Free => EraseMode::Free,
        }
    }
}

/// Resolve the effective config: file (or defaults when missing), then
/// environment, then command-line overrides.
pub fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let path = cli.config.display().to_string();
    let mut config = if cli.config.exists() {
        Config::load(&path).map_err(|e| anyhow::anyhow!("loading {path}: {e}"))?
    } else {
        tracing::debug!(path, "config file not found, using defaults");
        Config::default()
    };

    config.editor.apply_env();
    if let Some(creds) = &cli.credentials {
        config.editor.credentials = Some(creds.clone());
    }
    if let Some(priority) = cli.priority {
        config.editor.priority = priority;
    }
    Ok(config)
}

/// Process exit code for an error returned by a command.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    let job_failed = err
        .chain()
        .any(|cause| cause.downcast_ref::<Error>().is_some_and(Error::is_job_failure));
    if job_failed {
        EXIT_JOB_FAILED
    } else {
        EXIT_FAILURE
    }
}
