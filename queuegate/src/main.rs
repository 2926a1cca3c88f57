//! queuegate - API Gateway to SQS to Lambda stack synthesizer
//!
//! Declares an HTTP endpoint that forwards request bodies into a queue, drained
//! by a triggered function, and synthesizes it into a CloudFormation template,
//! an asset manifest and the packaged function code.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use queuegate_stack::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "queuegate")]
#[command(about = "Synthesize the API Gateway to SQS to Lambda stack", long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "queuegate.toml", env = "QUEUEGATE_CONFIG", global = true)]
    config: PathBuf,

    /// Stack name, overriding the configuration
    #[arg(long, env = "QUEUEGATE_STACK_NAME", global = true)]
    stack_name: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "QUEUEGATE_LOG_LEVEL", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the template, asset manifest and packaged assets
    Synth {
        /// Output directory
        #[arg(short, long, env = "QUEUEGATE_OUT_DIR")]
        out: Option<PathBuf>,

        /// Template format (json or yaml)
        #[arg(short, long)]
        format: Option<OutputFormat>,

        /// Print the template instead of writing the assembly
        #[arg(long)]
        stdout: bool,
    },
    /// Compare against a deployed template
    Diff {
        /// Template to compare against
        #[arg(long)]
        against: PathBuf,

        /// Exit with status 1 when there are differences
        #[arg(long)]
        fail: bool,
    },
    /// Synthesize and report validation errors without writing anything
    Validate,
    /// Print the deployment order, dependencies first
    Order,
    /// Write a starter configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    // Logs go to stderr so `synth --stdout` output stays clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("queuegate={}", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Command::Init { force } = args.command {
        commands::init(&args.config, force)?;
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = config::Config::load(&args.config)?;
    if let Some(name) = args.stack_name {
        config.stack.name = name;
    }
    info!(config = %args.config.display(), stack = %config.stack.name, "Loaded configuration");

    match args.command {
        Command::Synth {
            out,
            format,
            stdout,
        } => {
            if let Some(out) = out {
                config.output.dir = out;
            }
            if let Some(format) = format {
                config.output.format = format;
            }
            commands::synth(&config, stdout)?;
        }
        Command::Diff { against, fail } => {
            let changed = commands::diff(&config, &against)?;
            if fail && changed {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Validate => commands::validate(&config)?,
        Command::Order => commands::order(&config)?,
        // Written before the configuration is loaded
        Command::Init { .. } => {}
    }

    Ok(ExitCode::SUCCESS)
}
