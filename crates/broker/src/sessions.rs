//! Desktop session discovery.
//!
//! Probes a fixed, ordered catalogue of well-known session launchers for
//! presence in the search directory.

use std::path::Path;

use portico_protocol::{SessionKind, SessionOption};
use tracing::debug;

use crate::config::SessionsConfig;

struct Launcher {
    label: &'static str,
    command: &'static str,
    desktop: &'static str,
    kind: SessionKind,
}

const fn x11(label: &'static str, command: &'static str, desktop: &'static str) -> Launcher {
    Launcher {
        label,
        command,
        desktop,
        kind: SessionKind::X11,
    }
}

/// Each entry is a list of alternatives; the first present one wins.
const CATALOGUE: &[&[Launcher]] = &[
    &[x11("GNOME", "gnome-session", "GNOME")],
    &[
        x11("KDE Plasma", "startplasma-x11", "KDE"),
        x11("KDE", "startkde", "KDE"),
    ],
    &[x11("XFCE", "startxfce4", "XFCE")],
    &[x11("LXDE", "startlxde", "LXDE")],
    &[x11("LXQt", "startlxqt", "LXQt")],
    &[x11("MATE", "mate-session", "MATE")],
    &[x11("Cinnamon", "cinnamon-session", "X-Cinnamon")],
    &[x11("Enlightenment", "enlightenment_start", "Enlightenment")],
    &[x11("i3", "i3", "i3")],
    &[Launcher {
        label: "Sway",
        command: "sway",
        desktop: "sway",
        kind: SessionKind::Wayland,
    }],
    &[x11("Openbox", "openbox-session", "Openbox")],
    &[x11("Awesome", "awesome", "awesome")],
];

const FALLBACK: Launcher = x11("XTerm", "xterm", "XTerm");

impl Launcher {
    fn option(&self) -> SessionOption {
        SessionOption::new(self.label, self.command)
            .with_desktop(self.desktop)
            .with_kind(self.kind)
    }
}

/// Probe the catalogue, append configured extras, and fall back to XTerm
/// when nothing was found.
pub fn discover(config: &SessionsConfig) -> Vec<SessionOption> {
    let mut options = probe(&config.search_dir);
    options.extend(config.extra.iter().cloned());
    if options.is_empty() {
        debug!(
            component = "sessions",
            event = "sessions.fallback",
            search_dir = %config.search_dir.display(),
            "No desktop sessions found, offering XTerm"
        );
        options.push(FALLBACK.option());
    }
    options
}

fn probe(search_dir: &Path) -> Vec<SessionOption> {
    CATALOGUE
        .iter()
        .filter_map(|alternatives| {
            alternatives
                .iter()
                .find(|launcher| search_dir.join(launcher.command).exists())
        })
        .map(Launcher::option)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn bin_dir(commands: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for command in commands {
            std::fs::write(dir.path().join(command), "#!/bin/sh\n").unwrap();
        }
        dir
    }

    fn config(search_dir: PathBuf) -> SessionsConfig {
        SessionsConfig {
            search_dir,
            ..SessionsConfig::default()
        }
    }

    #[test]
    fn keeps_catalogue_order() {
        let dir = bin_dir(&["sway", "i3", "startxfce4"]);
        let options = discover(&config(dir.path().to_path_buf()));

        let labels: Vec<&str> = options.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["XFCE", "i3", "Sway"]);
        assert_eq!(options[2].kind, SessionKind::Wayland);
    }

    #[test]
    fn plasma_shadows_legacy_kde() {
        let dir = bin_dir(&["startkde", "startplasma-x11"]);
        let options = discover(&config(dir.path().to_path_buf()));

        assert_eq!(options.len(), 1);
        assert_eq!(options[0].command, "startplasma-x11");

        let dir = bin_dir(&["startkde"]);
        let options = discover(&config(dir.path().to_path_buf()));
        assert_eq!(options[0].label, "KDE");
    }

    #[test]
    fn falls_back_to_xterm() {
        let dir = bin_dir(&[]);
        let options = discover(&config(dir.path().to_path_buf()));

        assert_eq!(options, vec![SessionOption::new("XTerm", "xterm")]);
    }

    #[test]
    fn extras_suppress_fallback() {
        let dir = bin_dir(&[]);
        let mut cfg = config(dir.path().to_path_buf());
        cfg.extra.push(SessionOption::new("Kiosk", "/opt/kiosk/start"));

        let options = discover(&cfg);
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].label, "Kiosk");
    }
}
