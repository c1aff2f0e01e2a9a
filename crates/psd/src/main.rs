//! psd: process scheduler daemon.
//!
//! Starts each configured command when its time window opens and kills it
//! when the window closes, optionally repeating it on an interval in between.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod daemon;
mod output;

use config::ConfigError;
use daemon::{Options, Outcome};

/// Exit status after an interrupt-driven shutdown.
const EXIT_INTERRUPTED: u8 = 130;
/// Exit status for an invalid configuration.
const EXIT_CONFIG: u8 = 2;

/// Parse boolean from environment variable, accepting common truthy values.
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true.
/// Accepts "0", "false", "no", "off", "" (case-insensitive) as false.
fn parse_bool_env(s: &str) -> Result<bool, String> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(format!(
            "invalid boolean value '{}', expected 1/true/yes/on or 0/false/no/off",
            s
        )),
    }
}

#[derive(Parser)]
#[command(name = "psd", version)]
#[command(about = "Run commands inside recurring time windows", long_about = None)]
struct Cli {
    /// Configuration document
    #[arg(env = "PSD_CONFIG", default_value = "psd.json")]
    config: PathBuf,

    /// On shutdown, wait for repeating jobs' last invocations to exit
    #[arg(
        long,
        env = "PSD_WAIT_REPEATED",
        value_parser = parse_bool_env,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    wait_repeated: Option<bool>,

    /// Append lifecycle events to this file as JSON lines
    #[arg(long, env = "PSD_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Disable colored console output
    #[arg(long)]
    no_color: bool,

    /// Tick period in milliseconds
    #[arg(long, default_value = "1000", value_parser = clap::value_parser!(u64).range(1..))]
    tick_ms: u64,

    /// Validate the configuration, print each job's first window and exit
    #[arg(long)]
    check: bool,
}

impl Cli {
    fn into_options(self) -> Options {
        let color = !self.no_color && std::io::stdout().is_terminal();
        Options {
            config_path: self.config,
            wait_repeated: self.wait_repeated,
            log_file: self.log_file,
            color,
            tick: Duration::from_millis(self.tick_ms),
            check: self.check,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "psd=info,psd_scheduler=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let options = Cli::parse().into_options();
    colored::control::set_override(options.color);

    match daemon::run(options).await {
        Ok(Outcome::Checked) => ExitCode::SUCCESS,
        Ok(Outcome::Interrupted) => ExitCode::from(EXIT_INTERRUPTED),
        Err(report) => {
            let code = if report.downcast_ref::<ConfigError>().is_some() {
                EXIT_CONFIG
            } else {
                1
            };
            eprintln!("{report:?}");
            ExitCode::from(code)
        }
    }
}
