//! `portico check`: show what the broker would offer, without starting
//! anything.

use std::path::{Path, PathBuf};

use anyhow::Context;
use console::style;
use portico_protocol::{Identity, SessionOption};
use serde::Serialize;

use crate::accounts;
use crate::config::Config;
use crate::paths;
use crate::sessions;

#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub config_path: Option<PathBuf>,
    pub log_dir: PathBuf,
    pub account_source: String,
    pub identities: Vec<Identity>,
    pub sessions: Vec<SessionOption>,
    pub display: String,
    pub display_socket: Option<PathBuf>,
    pub bus_run_dir: PathBuf,
    pub auth_backend: String,
    pub auth_service: String,
    pub auth_available: bool,
}

impl CheckReport {
    pub fn collect(config: &Config, config_path: Option<&Path>) -> anyhow::Result<Self> {
        let directory = accounts::open(&config.accounts);
        let identities = directory
            .identities(&config.accounts)
            .with_context(|| format!("reading accounts from {}", directory.source()))?;

        Ok(Self {
            config_path: config_path.map(Path::to_path_buf),
            log_dir: paths::resolve_log_dir(config.logging.dir.as_deref()),
            account_source: directory.source(),
            identities,
            sessions: sessions::discover(&config.sessions),
            display: config.display.display.clone(),
            display_socket: config.display.socket_path(),
            bus_run_dir: paths::bus_run_dir(&config.bus.run_dir, std::process::id()),
            auth_backend: format!("{:?}", config.auth.backend).to_lowercase(),
            auth_service: config.auth.service.clone(),
            auth_available: cfg!(feature = "pam"),
        })
    }
}

pub fn run(config: &Config, config_path: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let report = CheckReport::collect(config, config_path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!("  {}", style("Portico").bold().cyan());
    match &report.config_path {
        Some(path) => println!("  Config: {}", path.display()),
        None => println!("  Config: built-in defaults"),
    }
    println!("  Logs: {}", report.log_dir.display());
    println!();

    println!(
        "  {} (from {})",
        style("Accounts").bold(),
        report.account_source
    );
    if report.identities.is_empty() {
        println!("    {}", style("none eligible").yellow());
    }
    for identity in &report.identities {
        println!(
            "    {} {}",
            identity.label,
            style(format!("({}, uid {})", identity.account, identity.uid)).dim()
        );
    }
    println!();

    println!("  {}", style("Sessions").bold());
    for session in &report.sessions {
        println!(
            "    {} {}",
            session.label,
            style(format!("({}, {})", session.command, session.kind.as_xdg())).dim()
        );
    }
    println!();

    let socket = report
        .display_socket
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".into());
    println!("  Display: {} (socket {})", report.display, socket);
    println!("  Bus dir: {}", report.bus_run_dir.display());

    let availability = if report.auth_available {
        style("available").green()
    } else {
        style("not compiled in").red()
    };
    println!(
        "  Auth: {} service '{}' ({})",
        report.auth_backend, report.auth_service, availability
    );
    println!();

    Ok(())
}
