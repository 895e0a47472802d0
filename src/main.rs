mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use meetscribe::config::Config;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let directive = if cli.verbose { "meetscribe=debug" } else { "meetscribe=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?),
        )
        .init();

    // These must work even when the existing config fails to parse.
    match &cli.command {
        Commands::InitConfig { force } => {
            return commands::init_config(cli.config.as_deref(), *force);
        }
        Commands::Evaluate {
            hypothesis,
            reference,
            output,
        } => return commands::evaluate(hypothesis, reference, output.as_deref()),
        _ => {}
    }

    let (config, loaded_from) = Config::load_with_path(cli.config.as_deref())?;
    if let Some(path) = &loaded_from {
        tracing::debug!("Loaded config from {}", path.display());
    }

    match cli.command {
        Commands::Run {
            audio,
            workdir,
            backend,
        } => commands::run(&config, &audio, workdir.as_deref(), backend.as_deref()),
        Commands::Status { workdir } => commands::show_status(&config, workdir.as_deref()),
        Commands::Record {
            replay,
            workdir,
            process,
            backend,
        } => commands::record(
            &config,
            replay.as_deref(),
            workdir.as_deref(),
            process,
            backend.as_deref(),
        ),
        Commands::InitConfig { .. } | Commands::Evaluate { .. } => {
            unreachable!("handled before config load")
        }
    }
}
