//! Portico
//!
//! A minimal login and session broker: starts the display server and a
//! private message bus, offers the local accounts on the console, and
//! hands the machine over to the chosen desktop session once the user
//! authenticates.

mod accounts;
mod auth;
mod broker;
mod cmd_check;
mod config;
mod frontend;
mod handoff;
mod logging;
mod orchestrator;
mod paths;
mod poller;
mod privilege;
mod secret;
mod sessions;
mod signals;
mod state;
mod transition;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

use crate::broker::Outcome;
use crate::config::Config;
use crate::frontend::ConsoleFrontend;
use crate::orchestrator::Orchestrator;
use crate::privilege::SystemPrivileges;
use crate::state::BrokerState;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How often the console wakes up without input to expire notifications
const TICK: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(name = "portico", version, about = "Minimal login and session broker")]
struct Cli {
    /// Config file (default: /etc/portico/config.toml)
    #[arg(long, global = true, env = "PORTICO_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter directive, e.g. `debug` or `portico=trace`
    #[arg(long, global = true)]
    log_filter: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the display server and message bus, then wait for a login
    Run,
    /// Show the accounts and sessions that would be offered
    Check {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("portico: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    let (config, source) = Config::load(cli.config.as_deref())?;
    match cli.command.unwrap_or(Command::Run) {
        Command::Check { json } => {
            cmd_check::run(&config, source.as_deref(), json)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Run => {
            let mut logging = logging::init_logging(&config.logging, cli.log_filter.as_deref())?;
            info!(
                component = "broker",
                event = "broker.starting",
                version = VERSION,
                run_id = %logging.run_id,
                config = %source
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "defaults".into()),
                "Starting Portico"
            );

            let result = run_broker(&config, &mut logging.guard);
            if let Err(err) = &result {
                error!(
                    component = "broker",
                    event = "broker.failed",
                    error = %format!("{err:#}"),
                    "Broker failed"
                );
            }
            result
        }
    }
}

fn run_broker(
    config: &Config,
    log_guard: &mut Option<WorkerGuard>,
) -> anyhow::Result<ExitCode> {
    let shutdown = signals::install().context("installing signal handlers")?;
    let gateway = auth::build_authenticator(&config.auth)?;

    let directory = accounts::open(&config.accounts);
    let identities = directory
        .identities(&config.accounts)
        .with_context(|| format!("reading accounts from {}", directory.source()))?;
    let session_options = sessions::discover(&config.sessions);
    info!(
        component = "broker",
        event = "broker.enumerated",
        identities = identities.len(),
        sessions = session_options.len(),
        "Enumerated accounts and sessions"
    );

    // Dropping the orchestrator on any early return tears everything down.
    let mut orchestrator = Orchestrator::new(config);
    orchestrator.start_message_bus()?;
    orchestrator.await_ready(orchestrator::BUS)?;
    info!(
        component = "broker",
        event = "broker.bus_ready",
        address = orchestrator.bus_address().unwrap_or(""),
        "Message bus ready"
    );
    orchestrator.start_display_server()?;
    orchestrator.await_ready(orchestrator::DISPLAY)?;

    let state = BrokerState::new(identities, session_options, config.broker.secret_capacity);
    let mut frontend = ConsoleFrontend::new(TICK);
    let outcome = broker::run_loop(
        state,
        &mut frontend,
        gateway.as_ref(),
        || shutdown.requested(),
    )
    .context("console frontend failed")?;

    match outcome {
        Outcome::Shutdown => {
            orchestrator.shutdown_all();
            info!(
                component = "broker",
                event = "broker.shutdown",
                "Shut down cleanly"
            );
            Ok(ExitCode::SUCCESS)
        }
        Outcome::Handoff(request) => {
            let err = match handoff::handoff(
                directory.as_ref(),
                &mut SystemPrivileges,
                &request,
                config,
                log_guard,
            ) {
                Ok(never) => match never {},
                Err(err) => err,
            };
            if err.privileges_touched() {
                // Credentials may already have changed, so the root-owned
                // children can no longer be stopped. Leave them running.
                std::mem::forget(orchestrator);
            }
            Err(anyhow::Error::new(err).context(format!(
                "starting session '{}' for {}",
                request.session.label, request.account
            )))
        }
    }
}
