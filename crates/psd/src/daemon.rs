//! Daemon wiring: configuration, sinks, scheduler and signal handling.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use miette::Result;
use tokio::sync::watch;
use tracing::{info, warn};

use psd_scheduler::{
    Clock, EventSink, OsLauncher, RecurrenceResolver, Scheduler, SchedulerConfig, SystemClock,
    TracingSink,
};

use crate::config::{self, Config, ConfigError};
use crate::output::{ConsoleSink, FanOut, LogFileSink};

/// Settings given on the command line.
#[derive(Debug, Clone)]
pub struct Options {
    pub config_path: PathBuf,
    /// Overrides the document's `wait_repeated` when set.
    pub wait_repeated: Option<bool>,
    /// Overrides the document's `log_file` when set.
    pub log_file: Option<PathBuf>,
    pub color: bool,
    pub tick: Duration,
    pub check: bool,
}

/// How the daemon ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// `--check` validated the configuration.
    Checked,
    /// Shut down after an interrupt.
    Interrupted,
}

pub async fn run(options: Options) -> Result<Outcome> {
    let config = config::load(&options.config_path)?;
    info!(
        path = %options.config_path.display(),
        jobs = config.jobs.len(),
        shell_default = config.is_shell,
        "loaded configuration"
    );

    if options.check {
        check(&config)?;
        return Ok(Outcome::Checked);
    }

    let wait_repeated = options.wait_repeated.unwrap_or(config.wait_repeated);
    let log_file = options.log_file.clone().or_else(|| config.log_file.clone());

    let mut sinks: Vec<Box<dyn EventSink>> =
        vec![Box::new(TracingSink), Box::new(ConsoleSink::new(options.color))];
    if let Some(path) = &log_file {
        let sink = LogFileSink::open(path)
            .map_err(|e| miette::miette!("cannot open log file {}: {}", path.display(), e))?;
        info!(path = %path.display(), "writing events to log file");
        sinks.push(Box::new(sink));
    }

    let mut scheduler = Scheduler::new(
        config.jobs,
        SchedulerConfig {
            tick: options.tick,
            wait_repeated,
        },
        Arc::new(OsLauncher),
        Arc::new(FanOut::new(sinks)),
        Arc::new(SystemClock),
    )
    .map_err(ConfigError::from)?;

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Handle shutdown signals
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for interrupt, shutting down");
        }
        info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    println!("[ Schedule started at {} ]", SystemClock.now().format("%Y-%m-%d %H:%M:%S"));
    scheduler.run(shutdown_rx).await;

    Ok(Outcome::Interrupted)
}

/// Resolve every job's first window and report it.
fn check(config: &Config) -> Result<(), ConfigError> {
    let now = SystemClock.now();
    for job in &config.jobs {
        let window = RecurrenceResolver::new(&job.name, job.schedule.clone(), now)
            .and_then(|mut resolver| resolver.first_window(now))?;
        info!(
            job = %job.name,
            opens = ?window.opens,
            closes = ?window.closes,
            repeat = ?job.repeat,
            "first window"
        );
    }
    info!(jobs = config.jobs.len(), "configuration is valid");
    Ok(())
}
