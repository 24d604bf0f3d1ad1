use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod cli;
mod info_cmds;
mod task_cmds;

use cli::{Cli, Commands, ConfigCommands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output_format = cli.format.clone();

    // The guard flushes the file writer on drop; it must outlive every log call.
    let (file_writer, log_guard) = match cli.log_dir.as_deref() {
        Some(dir) => {
            let (writer, guard) = acap_executor::logging::create_run_log_writer(dir)?;
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    // Initialize tracing (output to stderr, initialize only once)
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_writer.map(|writer| {
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
        }))
        .try_init()
        .ok();

    let config = acap_config::AgentCliConfig::load()?;

    let exit_code = match cli.command {
        Commands::Caps { provider } => {
            info_cmds::handle_caps(provider, &config, output_format)?;
            0
        }
        Commands::Prompt {
            target,
            kind,
            allowed_tools,
            json,
            required_keys,
            exact,
        } => {
            task_cmds::handle_prompt(
                target,
                kind,
                allowed_tools,
                json,
                required_keys,
                exact,
                &config,
                output_format,
            )
            .await?
        }
        Commands::Session {
            target,
            settings,
            stream_mode,
            show_thinking,
            no_run_log,
        } => {
            task_cmds::handle_session(
                target,
                settings,
                stream_mode,
                show_thinking,
                no_run_log,
                &config,
                output_format,
            )
            .await?
        }
        Commands::Logs { tail, dir } => {
            info_cmds::handle_logs(tail, dir, &config)?;
            0
        }
        Commands::Config { cmd } => {
            match cmd {
                ConfigCommands::Show => info_cmds::handle_config_show(&config, output_format)?,
                ConfigCommands::Template => {
                    print!("{}", acap_config::AgentCliConfig::default_template());
                }
                ConfigCommands::Path => {
                    println!("{}", acap_config::AgentCliConfig::config_path()?.display());
                }
            }
            0
        }
    };

    drop(log_guard);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}
