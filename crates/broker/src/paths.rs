//! Central path resolution for Portico files.
//!
//! All callsites use these helpers instead of joining path fragments inline,
//! so the on-disk layout is described in one place.

use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/portico/config.toml";
const SYSTEM_LOG_DIR: &str = "/var/log/portico";

/// Resolve the log directory.
///
/// Priority: `explicit` arg > `PORTICO_LOG_DIR` env > `/var/log/portico` when
/// running as root > per-user state dir.
pub fn resolve_log_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    if let Ok(env_val) = std::env::var("PORTICO_LOG_DIR") {
        if !env_val.trim().is_empty() {
            return PathBuf::from(env_val);
        }
    }
    if running_as_root() {
        return PathBuf::from(SYSTEM_LOG_DIR);
    }
    dirs::state_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("portico")
        .join("logs")
}

pub fn running_as_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Private per-run directory holding the message bus socket and address file.
pub fn bus_run_dir(run_root: &Path, pid: u32) -> PathBuf {
    run_root.join(format!("portico-{pid}"))
}

pub fn bus_socket_path(bus_dir: &Path) -> PathBuf {
    bus_dir.join("bus")
}

pub fn bus_address_file(bus_dir: &Path) -> PathBuf {
    bus_dir.join("bus-address")
}

/// Unix socket an X server listens on for display `:<number>`.
pub fn display_socket_path(socket_dir: &Path, display_number: u32) -> PathBuf {
    socket_dir.join(format!("X{display_number}"))
}

/// Per-user runtime state directory (`XDG_RUNTIME_DIR`).
pub fn user_runtime_dir(runtime_root: &Path, uid: u32) -> PathBuf {
    runtime_root.join(uid.to_string())
}

pub fn user_bus_socket(runtime_dir: &Path) -> PathBuf {
    runtime_dir.join("bus")
}

pub fn user_pulse_dir(runtime_dir: &Path) -> PathBuf {
    runtime_dir.join("pulse")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_log_dir_wins() {
        let dir = resolve_log_dir(Some(Path::new("/srv/logs")));
        assert_eq!(dir, PathBuf::from("/srv/logs"));
    }

    #[test]
    fn run_layout_is_scoped_by_pid() {
        let dir = bus_run_dir(Path::new("/tmp"), 4242);
        assert_eq!(dir, PathBuf::from("/tmp/portico-4242"));
        assert_eq!(bus_socket_path(&dir), PathBuf::from("/tmp/portico-4242/bus"));
        assert_eq!(
            bus_address_file(&dir),
            PathBuf::from("/tmp/portico-4242/bus-address")
        );
    }

    #[test]
    fn user_runtime_layout() {
        let runtime = user_runtime_dir(Path::new("/run/user"), 1000);
        assert_eq!(runtime, PathBuf::from("/run/user/1000"));
        assert_eq!(user_bus_socket(&runtime), PathBuf::from("/run/user/1000/bus"));
        assert_eq!(user_pulse_dir(&runtime), PathBuf::from("/run/user/1000/pulse"));
        assert_eq!(
            display_socket_path(Path::new("/tmp/.X11-unix"), 0),
            PathBuf::from("/tmp/.X11-unix/X0")
        );
    }
}
