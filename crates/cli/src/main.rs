mod cli;
mod commands;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ea_client::EditorContext;
use ea_domain::config::ConfigSeverity;

use crate::cli::{Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.json);

    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(cli::exit_code(&e));
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli::load_config(&cli)?;
    let config_path = cli.config.display().to_string();

    if let Command::Config(sub) = &cli.command {
        return match sub {
            ConfigCommand::Validate => {
                if commands::validate(&config, &config_path) {
                    Ok(())
                } else {
                    anyhow::bail!("invalid configuration")
                }
            }
            ConfigCommand::Show => commands::show(&config),
        };
    }

    for issue in config.validate() {
        match issue.severity {
            ConfigSeverity::Error => anyhow::bail!("{issue}"),
            ConfigSeverity::Warning => tracing::warn!("{issue}"),
        }
    }

    let ctx = EditorContext::new(config.editor)?;
    match cli.command {
        Command::Credits => commands::credits(&ctx, cli.json).await,
        Command::Erase {
            prompt,
            input,
            output,
            mode,
            seed,
        } => commands::erase(&ctx, prompt, &input, &output, mode.into(), seed, cli.json).await,
        Command::Cutout {
            prompt,
            input,
            output,
        } => commands::cutout(&ctx, prompt, &input, &output, cli.json).await,
        Command::Upscale { input, output } => {
            commands::upscale(&ctx, &input, &output, cli.json).await
        }
        Command::Config(_) => Ok(()),
    }
}

/// Logs go to stderr so stdout stays clean for results.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ea_client=info,ea_cli=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}
