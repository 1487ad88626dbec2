//! Broker → rendering surface snapshot
//!
//! The renderer consumes a `BrokerView` read-only every frame. It never
//! sees the secret itself, only its length.

use serde::{Deserialize, Serialize};

use crate::types::*;

/// One row of the identity list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRow {
    pub account: String,
    pub label: String,
    pub selected: bool,
}

/// One entry of the session picker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRow {
    pub label: String,
    pub selected: bool,
}

/// A notification that is still within its display lifetime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveNotification {
    pub kind: NotificationKind,
    pub message: String,
}

/// Read-only snapshot of broker state for one frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerView {
    pub identities: Vec<IdentityRow>,
    pub selected_identity: Option<usize>,
    /// Number of characters typed; render as mask glyphs
    pub secret_len: usize,
    pub sessions: Vec<SessionRow>,
    pub selected_session: usize,
    pub picker_open: bool,
    pub focus: Option<Focus>,
    pub notifications: Vec<ActiveNotification>,
}

impl BrokerView {
    /// Whether the secret field and session control are on screen
    pub fn login_panel_visible(&self) -> bool {
        self.selected_identity.is_some()
    }

    /// Label of the selected session, if any session exists
    pub fn session_label(&self) -> Option<&str> {
        self.sessions
            .get(self.selected_session)
            .map(|row| row.label.as_str())
    }

    pub fn masked_secret(&self) -> String {
        "*".repeat(self.secret_len)
    }
}
