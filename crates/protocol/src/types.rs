//! Core types shared across the protocol

use serde::{Deserialize, Serialize};

/// A user account eligible for session selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Login name, unique within the account directory
    pub account: String,
    /// Human-readable label; the account name when no description is set
    pub label: String,
    pub uid: u32,
}

impl Identity {
    pub fn new(account: impl Into<String>, label: impl Into<String>, uid: u32) -> Self {
        Self {
            account: account.into(),
            label: label.into(),
            uid,
        }
    }
}

/// Display protocol a session runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    #[default]
    X11,
    Wayland,
}

impl SessionKind {
    /// Value exported as `XDG_SESSION_TYPE`
    pub fn as_xdg(&self) -> &'static str {
        match self {
            SessionKind::X11 => "x11",
            SessionKind::Wayland => "wayland",
        }
    }
}

/// A named, launchable desktop-environment command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOption {
    pub label: String,
    pub command: String,
    /// Desktop name exported as `XDG_CURRENT_DESKTOP` / `XDG_SESSION_DESKTOP`
    pub desktop: String,
    #[serde(default)]
    pub kind: SessionKind,
}

impl SessionOption {
    /// An X11 session whose desktop name is its label.
    pub fn new(label: impl Into<String>, command: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            desktop: label.clone(),
            label,
            command: command.into(),
            kind: SessionKind::X11,
        }
    }

    pub fn with_desktop(mut self, desktop: impl Into<String>) -> Self {
        self.desktop = desktop.into();
        self
    }

    pub fn with_kind(mut self, kind: SessionKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Interactive region currently receiving key events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Focus {
    Secret,
    SessionControl,
}

/// Notification severity; at most one notification per kind is live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Error,
    Info,
}
