mod commands;
mod helpers;

use clap::Parser;
use tracing_subscriber::EnvFilter;

pub fn run_from_env() -> i32 {
    init_tracing();
    let args: Vec<String> = std::env::args().collect();
    match run(args) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("decond-rs: {error:#}");
            1
        }
    }
}

pub fn run<I, S>(args: I) -> anyhow::Result<i32>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let args: Vec<String> = args.into_iter().map(Into::into).collect();
    let cli = match Cli::try_parse_from(&args) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{err}");
                return Ok(0);
            }
            _ => return Err(anyhow::anyhow!(err.to_string())),
        },
    };

    match cli.command {
        CliCommand::New(args) => commands::run_new(args)?,
        CliCommand::Extend(args) => commands::run_extend(args)?,
        CliCommand::Fit(args) => commands::run_fit(args)?,
        CliCommand::Report(args) => commands::run_report(args)?,
    }
    Ok(0)
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("decond=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser)]
#[command(
    name = "decond-rs",
    about = "Statistical aggregation of correlation samples into transport coefficients",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Create a new aggregate from correlation sample records
    New(commands::NewArgs),
    /// Merge further samples into a persisted aggregate
    Extend(commands::ExtendArgs),
    /// Recompute transport fits of a persisted aggregate
    Fit(commands::FitArgs),
    /// Print transport coefficients from a fitted aggregate
    Report(commands::ReportArgs),
}
