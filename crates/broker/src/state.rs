//! Broker state
//!
//! Owned exclusively by the event loop and moved through `transition()`.

use std::time::{Duration, Instant};

use portico_protocol::{
    ActiveNotification, BrokerView, Focus, Identity, IdentityRow, NotificationKind,
    SessionOption, SessionRow,
};

use crate::secret::SecretBuffer;

/// Display lifetime of a notification
pub const NOTIFICATION_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
    pub issued_at: Instant,
}

impl Notification {
    /// Active until `NOTIFICATION_TTL` has fully elapsed.
    pub fn is_active(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.issued_at) < NOTIFICATION_TTL
    }
}

#[derive(Debug)]
pub struct BrokerState {
    /// Enumerated once at startup
    pub identities: Vec<Identity>,
    /// Enumerated once at startup
    pub sessions: Vec<SessionOption>,
    pub selected_identity: Option<usize>,
    pub secret: SecretBuffer,
    pub selected_session: usize,
    pub picker_open: bool,
    pub focus: Option<Focus>,
    pub notifications: Vec<Notification>,
}

impl BrokerState {
    pub fn new(
        identities: Vec<Identity>,
        sessions: Vec<SessionOption>,
        secret_capacity: usize,
    ) -> Self {
        Self {
            identities,
            sessions,
            selected_identity: None,
            secret: SecretBuffer::with_capacity(secret_capacity),
            selected_session: 0,
            picker_open: false,
            focus: None,
            notifications: Vec::new(),
        }
    }

    pub fn selected_identity(&self) -> Option<&Identity> {
        self.selected_identity.and_then(|i| self.identities.get(i))
    }

    pub fn selected_session(&self) -> Option<&SessionOption> {
        self.sessions.get(self.selected_session)
    }

    /// Issue a notification, replacing any existing one of the same kind.
    pub fn notify(&mut self, kind: NotificationKind, message: impl Into<String>, now: Instant) {
        self.notifications.retain(|n| n.kind != kind);
        self.notifications.push(Notification {
            kind,
            message: message.into(),
            issued_at: now,
        });
    }

    /// Drop expired notifications. Returns true if any were removed.
    pub fn expire_notifications(&mut self, now: Instant) -> bool {
        let before = self.notifications.len();
        self.notifications.retain(|n| n.is_active(now));
        self.notifications.len() != before
    }

    pub fn active_notifications(&self, now: Instant) -> impl Iterator<Item = &Notification> {
        self.notifications.iter().filter(move |n| n.is_active(now))
    }

    /// Read-only snapshot for the rendering surface.
    pub fn view(&self, now: Instant) -> BrokerView {
        BrokerView {
            identities: self
                .identities
                .iter()
                .enumerate()
                .map(|(i, identity)| IdentityRow {
                    account: identity.account.clone(),
                    label: identity.label.clone(),
                    selected: self.selected_identity == Some(i),
                })
                .collect(),
            selected_identity: self.selected_identity,
            secret_len: self.secret.len(),
            sessions: self
                .sessions
                .iter()
                .enumerate()
                .map(|(i, option)| SessionRow {
                    label: option.label.clone(),
                    selected: self.selected_session == i,
                })
                .collect(),
            selected_session: self.selected_session,
            picker_open: self.picker_open,
            focus: self.focus,
            notifications: self
                .active_notifications(now)
                .map(|n| ActiveNotification {
                    kind: n.kind,
                    message: n.message.clone(),
                })
                .collect(),
        }
    }
}
