//! Handoff to the authenticated user's session.
//!
//! Resolves the account, prepares its runtime directory, drops privileges
//! and replaces this process with the user's login shell running the
//! session command. Returns only on failure.

use std::convert::Infallible;
use std::fs::DirBuilder;
use std::io;
use std::os::unix::fs::{chown, DirBuilderExt, PermissionsExt};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use portico_protocol::{SessionKind, SessionOption};
use thiserror::Error;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

use crate::accounts::{Account, AccountLookup};
use crate::config::Config;
use crate::paths;
use crate::privilege::{self, PrivilegeOps};
use crate::transition::HandoffRequest;

/// Re-exports the session's bus, sound and runtime locations, then replaces
/// the login shell with the session command passed as `$0`.
pub const LAUNCH_SCRIPT: &str = "export DBUS_SESSION_BUS_ADDRESS && export PULSE_RUNTIME_PATH \
     && export XDG_RUNTIME_DIR && exec $0";

#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("cannot resolve account {account}: {reason}")]
    Account { account: String, reason: String },

    #[error("cannot prepare runtime dir {path}: {source}")]
    RuntimeDir { path: PathBuf, source: io::Error },

    #[error("setgid({gid}) failed: {source}")]
    SetGid { gid: u32, source: io::Error },

    #[error("initgroups({account}) failed: {source}")]
    InitGroups { account: String, source: io::Error },

    #[error("setuid({uid}) failed: {source}")]
    SetUid { uid: u32, source: io::Error },

    #[error("failed to exec {program}: {source}")]
    Exec { program: PathBuf, source: io::Error },
}

impl HandoffError {
    /// True once process credentials may have changed. Nothing owned by
    /// root can be safely torn down from that point.
    pub fn privileges_touched(&self) -> bool {
        matches!(
            self,
            HandoffError::SetGid { .. }
                | HandoffError::InitGroups { .. }
                | HandoffError::SetUid { .. }
                | HandoffError::Exec { .. }
        )
    }
}

/// Everything needed to launch one session, computed before any
/// privilege change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPlan {
    pub account: Account,
    pub session: SessionOption,
    pub runtime_dir: PathBuf,
    pub env: Vec<(String, String)>,
    pub env_remove: Vec<String>,
}

impl SessionPlan {
    pub fn new(account: Account, session: SessionOption, display: &str, runtime_root: &Path) -> Self {
        let runtime_dir = paths::user_runtime_dir(runtime_root, account.uid);
        let bus = paths::user_bus_socket(&runtime_dir);
        let pulse = paths::user_pulse_dir(&runtime_dir);

        let mut env: Vec<(String, String)> = vec![
            ("HOME".into(), account.home.display().to_string()),
            ("SHELL".into(), account.shell.display().to_string()),
            ("USER".into(), account.name.clone()),
            ("LOGNAME".into(), account.name.clone()),
            ("DISPLAY".into(), display.to_string()),
            ("XDG_RUNTIME_DIR".into(), runtime_dir.display().to_string()),
            ("XDG_SESSION_TYPE".into(), session.kind.as_xdg().to_string()),
            ("XDG_SESSION_CLASS".into(), "user".into()),
            ("XDG_CURRENT_DESKTOP".into(), session.desktop.clone()),
            ("XDG_SESSION_DESKTOP".into(), session.desktop.clone()),
            (
                "DBUS_SESSION_BUS_ADDRESS".into(),
                format!("unix:path={}", bus.display()),
            ),
            ("PULSE_RUNTIME_PATH".into(), pulse.display().to_string()),
        ];
        let mut env_remove = Vec::new();
        if session.kind == SessionKind::X11 {
            env.push(("QT_QPA_PLATFORM".into(), "xcb".into()));
            env_remove.push("WAYLAND_DISPLAY".into());
        }

        Self {
            account,
            session,
            runtime_dir,
            env,
            env_remove,
        }
    }

    #[cfg(test)]
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// `<shell> -l -c "<launch script>" <command>` in the home directory.
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.account.shell);
        command
            .arg("-l")
            .arg("-c")
            .arg(LAUNCH_SCRIPT)
            .arg(&self.session.command)
            .current_dir(&self.account.home);
        for key in &self.env_remove {
            command.env_remove(key);
        }
        command.envs(self.env.iter().map(|(k, v)| (k, v)));
        command
    }
}

/// Create `dir` and its `pulse` subdirectory if absent, then make both
/// 0700 and owned by the account.
pub fn prepare_runtime_dir(dir: &Path, uid: u32, gid: u32) -> io::Result<()> {
    for path in [dir.to_path_buf(), paths::user_pulse_dir(dir)] {
        if !path.exists() {
            DirBuilder::new().recursive(true).mode(0o700).create(&path)?;
        }
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o700))?;
        chown(&path, Some(uid), Some(gid))?;
    }
    Ok(())
}

/// Launch the requested session as the authenticated account.
///
/// Errors for which `privileges_touched()` is false leave the process as it
/// was; the caller may tear down and exit. Any other error must end the
/// process without teardown.
///
/// `log_guard` is dropped just before exec so buffered log lines reach the
/// file; it is left in place on every earlier failure.
pub fn handoff(
    accounts: &dyn AccountLookup,
    privileges: &mut dyn PrivilegeOps,
    request: &HandoffRequest,
    config: &Config,
    log_guard: &mut Option<WorkerGuard>,
) -> Result<Infallible, HandoffError> {
    let account = match accounts.resolve(&request.account) {
        Ok(Some(account)) => account,
        Ok(None) => {
            return Err(HandoffError::Account {
                account: request.account.clone(),
                reason: "no such account".into(),
            })
        }
        Err(err) => {
            return Err(HandoffError::Account {
                account: request.account.clone(),
                reason: err.to_string(),
            })
        }
    };

    let plan = SessionPlan::new(
        account,
        request.session.clone(),
        &config.display.display,
        &config.sessions.runtime_root,
    );
    prepare_runtime_dir(&plan.runtime_dir, plan.account.uid, plan.account.gid).map_err(
        |source| HandoffError::RuntimeDir {
            path: plan.runtime_dir.clone(),
            source,
        },
    )?;

    privilege::drop_to(privileges, &plan.account)?;

    info!(
        component = "handoff",
        event = "handoff.exec",
        account = %plan.account.name,
        session = %plan.session.label,
        command = %plan.session.command,
        "Starting session"
    );
    drop(log_guard.take());
    let source = plan.command().exec();
    error!(
        component = "handoff",
        event = "handoff.exec_failed",
        shell = %plan.account.shell.display(),
        error = %source,
        "Session exec failed"
    );
    Err(HandoffError::Exec {
        program: plan.account.shell.clone(),
        source,
    })
}
