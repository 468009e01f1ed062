use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use mobile::driver::{DEFAULT_INPUT, DEFAULT_OUTPUT};
use mobile::{check_and_convert, DriverConfig, Outcome};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Convert the trained MNIST model to Core ML")]
struct Args {
    /// Trained model to convert
    #[arg(long, default_value = DEFAULT_INPUT)]
    input: PathBuf,

    /// Output file for the Core ML package
    #[arg(long, default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Exit with status 2 when no trained model is found
    #[arg(long)]
    strict: bool,

    /// Log filter for diagnostics on stderr
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&args.log_level).context("invalid --log-level")?)
        .with_writer(std::io::stderr)
        .init();

    let config = DriverConfig {
        input: args.input,
        output: args.output,
    };
    let outcome = check_and_convert(&config, &mut std::io::stdout().lock())
        .with_context(|| format!("converting {}", config.input.display()))?;

    Ok(match outcome {
        Outcome::NoModel if args.strict => ExitCode::from(2),
        _ => ExitCode::SUCCESS,
    })
}
