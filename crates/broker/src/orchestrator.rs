//! Supporting process lifecycle: private message bus and display server.
//!
//! The orchestrator exclusively owns its children. Each one carries the
//! probe used to decide it is usable. Teardown is synchronous: SIGTERM,
//! bounded wait, SIGKILL.

use std::fs::{DirBuilder, File, OpenOptions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{BusConfig, Config, DisplayConfig, ReadyPolicy};
use crate::paths;
use crate::poller;

pub const BUS: &str = "bus";
pub const DISPLAY: &str = "display";

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("failed to launch {name} ({command}): {source}")]
    Spawn {
        name: &'static str,
        command: String,
        source: io::Error,
    },

    #[error("{name} not ready after {attempts} attempts")]
    NotReady { name: String, attempts: u32 },

    #[error("{name} exited before becoming ready ({status})")]
    Exited { name: String, status: ExitStatus },

    #[error("invalid display identifier '{0}'")]
    InvalidDisplay(String),

    #[error("no managed process named {0}")]
    Unknown(String),

    #[error("{context}: {source}")]
    Io { context: String, source: io::Error },
}

/// How to tell a started process has become usable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessProbe {
    /// The file exists and holds a non-empty line
    AddressFile(PathBuf),
    /// A client connection to the Unix socket succeeds
    SocketConnect(PathBuf),
}

impl ReadinessProbe {
    pub fn check(&self) -> bool {
        match self {
            ReadinessProbe::AddressFile(path) => read_address(path).is_some(),
            ReadinessProbe::SocketConnect(path) => UnixStream::connect(path).is_ok(),
        }
    }
}

fn read_address(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let line = content.trim();
    (!line.is_empty()).then(|| line.to_string())
}

pub struct ManagedProcess {
    pub name: &'static str,
    child: Child,
    probe: ReadinessProbe,
    ready: ReadyPolicy,
}

impl ManagedProcess {
    #[cfg(test)]
    pub fn pid(&self) -> u32 {
        self.child.id()
    }
}

pub struct Orchestrator {
    display: DisplayConfig,
    bus: BusConfig,
    reap: ReadyPolicy,
    processes: Vec<ManagedProcess>,
    bus_dir: Option<PathBuf>,
    bus_address: Option<String>,
}

impl Orchestrator {
    pub fn new(config: &Config) -> Self {
        Self {
            display: config.display.clone(),
            bus: config.bus.clone(),
            reap: config.broker.reap,
            processes: Vec::new(),
            bus_dir: None,
            bus_address: None,
        }
    }

    /// Address printed by the message bus once it is ready.
    pub fn bus_address(&self) -> Option<&str> {
        self.bus_address.as_deref()
    }

    #[cfg(test)]
    pub fn bus_dir(&self) -> Option<&Path> {
        self.bus_dir.as_deref()
    }

    #[cfg(test)]
    pub fn processes(&self) -> &[ManagedProcess] {
        &self.processes
    }

    /// Launch the private message bus with its address redirected into a
    /// file in a per-run private directory.
    pub fn start_message_bus(&mut self) -> Result<(), OrchestratorError> {
        std::fs::create_dir_all(&self.bus.run_dir).map_err(|source| OrchestratorError::Io {
            context: format!("create run dir {}", self.bus.run_dir.display()),
            source,
        })?;
        let dir = paths::bus_run_dir(&self.bus.run_dir, std::process::id());
        // Never reuse a directory someone else created: an existing path is
        // an error and is not ours to remove on shutdown.
        create_private_dir(&dir).map_err(|source| OrchestratorError::Io {
            context: format!("create bus dir {}", dir.display()),
            source,
        })?;
        self.bus_dir = Some(dir.clone());

        let address_path = paths::bus_address_file(&dir);
        let address_file = create_private_file(&address_path).map_err(|source| {
            OrchestratorError::Io {
                context: format!("create address file {}", address_path.display()),
                source,
            }
        })?;

        let address = format!("unix:path={}", paths::bus_socket_path(&dir).display());
        let args: Vec<String> = self
            .bus
            .args
            .iter()
            .map(|arg| arg.replace("{address}", &address))
            .collect();

        let mut command = Command::new(&self.bus.command);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(address_file));
        let child = spawn(BUS, &self.bus.command, &mut command)?;

        self.processes.push(ManagedProcess {
            name: BUS,
            child,
            probe: ReadinessProbe::AddressFile(address_path),
            ready: self.bus.ready,
        });
        Ok(())
    }

    /// Launch the display server for the configured display.
    pub fn start_display_server(&mut self) -> Result<(), OrchestratorError> {
        let socket = self
            .display
            .socket_path()
            .ok_or_else(|| OrchestratorError::InvalidDisplay(self.display.display.clone()))?;
        let args: Vec<String> = self
            .display
            .args
            .iter()
            .map(|arg| arg.replace("{display}", &self.display.display))
            .collect();

        let mut command = Command::new(&self.display.command);
        command
            .args(&args)
            .env("DISPLAY", &self.display.display)
            .stdin(Stdio::null());
        if let Some(address) = &self.bus_address {
            command.env("DBUS_SESSION_BUS_ADDRESS", address);
        }
        let child = spawn(DISPLAY, &self.display.command, &mut command)?;

        self.processes.push(ManagedProcess {
            name: DISPLAY,
            child,
            probe: ReadinessProbe::SocketConnect(socket),
            ready: self.display.ready,
        });
        Ok(())
    }

    /// Poll the named process until its probe succeeds, it exits, or the
    /// budget runs out.
    pub fn await_ready(&mut self, name: &str) -> Result<(), OrchestratorError> {
        let process = self
            .processes
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| OrchestratorError::Unknown(name.to_string()))?;

        let ManagedProcess {
            child,
            probe,
            ready,
            ..
        } = process;
        let mut exited: Option<ExitStatus> = None;
        let became_ready = poller::wait_with_policy(
            || {
                if let Ok(Some(status)) = child.try_wait() {
                    exited = Some(status);
                    return true;
                }
                probe.check()
            },
            *ready,
        );

        if let Some(status) = exited {
            warn!(
                component = "orchestrator",
                event = "orchestrator.exited_early",
                process = name,
                status = %status,
                "Process exited before becoming ready"
            );
            return Err(OrchestratorError::Exited {
                name: name.to_string(),
                status,
            });
        }
        if !became_ready {
            warn!(
                component = "orchestrator",
                event = "orchestrator.not_ready",
                process = name,
                attempts = ready.attempts,
                "Process did not become ready"
            );
            return Err(OrchestratorError::NotReady {
                name: name.to_string(),
                attempts: ready.attempts,
            });
        }

        if let ReadinessProbe::AddressFile(path) = probe {
            self.bus_address = read_address(path);
        }
        info!(
            component = "orchestrator",
            event = "orchestrator.ready",
            process = name,
            "Process ready"
        );
        Ok(())
    }

    /// Stop every child (last started first) and remove the bus artifacts.
    /// Safe to call more than once.
    pub fn shutdown_all(&mut self) {
        while let Some(mut process) = self.processes.pop() {
            terminate(&mut process, self.reap);
        }
        if let Some(dir) = self.bus_dir.take() {
            if let Err(err) = std::fs::remove_dir_all(&dir) {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!(
                        component = "orchestrator",
                        event = "orchestrator.cleanup_failed",
                        path = %dir.display(),
                        error = %err,
                        "Failed to remove bus directory"
                    );
                }
            }
        }
        self.bus_address = None;
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.shutdown_all();
    }
}

fn create_private_dir(path: &Path) -> io::Result<()> {
    DirBuilder::new().mode(0o700).create(path)?;
    // The mode passed to mkdir is filtered by the umask.
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
}

fn create_private_file(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .custom_flags(libc::O_NOFOLLOW)
        .mode(0o600)
        .open(path)
}

fn spawn(name: &'static str, program: &str, command: &mut Command) -> Result<Child, OrchestratorError> {
    let child = command.spawn().map_err(|source| OrchestratorError::Spawn {
        name,
        command: program.to_string(),
        source,
    })?;
    info!(
        component = "orchestrator",
        event = "orchestrator.spawned",
        process = name,
        command = %program,
        pid = child.id(),
        "Started process"
    );
    Ok(child)
}

fn terminate(process: &mut ManagedProcess, reap: ReadyPolicy) {
    let pid = process.child.id();
    if let Ok(Some(status)) = process.child.try_wait() {
        debug!(
            component = "orchestrator",
            event = "orchestrator.already_exited",
            process = process.name,
            pid,
            status = %status,
            "Process already exited"
        );
        return;
    }

    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
    let child = &mut process.child;
    let exited = poller::wait_with_policy(|| matches!(child.try_wait(), Ok(Some(_))), reap);
    if exited {
        info!(
            component = "orchestrator",
            event = "orchestrator.terminated",
            process = process.name,
            pid,
            "Process terminated"
        );
        return;
    }

    warn!(
        component = "orchestrator",
        event = "orchestrator.killed",
        process = process.name,
        pid,
        "Process ignored SIGTERM, killing"
    );
    let _ = process.child.kill();
    let _ = process.child.wait();
}
