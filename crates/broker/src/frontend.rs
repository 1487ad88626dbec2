//! Text-console rendering surface and key input.
//!
//! Draws a `BrokerView` on the controlling terminal and turns key presses
//! into `InputEvent`s. Holds no broker state of its own apart from the
//! picker highlight.

use std::io;
use std::os::unix::io::AsRawFd;
use std::time::Duration;

use console::{style, Key, Term};
use portico_protocol::{BrokerView, Focus, InputEvent, NotificationKind};

use crate::secret::is_secret_char;

pub trait Frontend {
    fn render(&mut self, view: &BrokerView) -> io::Result<()>;

    /// Block until input arrives (or the tick elapses) and return the
    /// events it produced, in order. May return an empty batch.
    fn poll_events(&mut self, view: &BrokerView) -> io::Result<Vec<InputEvent>>;
}

// ---------------------------------------------------------------------------
// Key mapping
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct KeyMap {
    /// Picker row under the cursor while the picker is open
    highlight: usize,
}

impl KeyMap {
    pub fn highlight(&self) -> usize {
        self.highlight
    }

    pub fn map_key(&mut self, key: &Key, view: &BrokerView) -> Vec<InputEvent> {
        match key {
            Key::ArrowUp | Key::ArrowDown if view.picker_open => {
                let last = view.sessions.len().saturating_sub(1);
                self.highlight = match key {
                    Key::ArrowUp => self.highlight.saturating_sub(1),
                    _ => (self.highlight + 1).min(last),
                };
                Vec::new()
            }
            Key::ArrowUp | Key::ArrowDown => {
                if view.identities.is_empty() {
                    return Vec::new();
                }
                let last = view.identities.len() - 1;
                let index = match (key, view.selected_identity) {
                    (Key::ArrowUp, Some(i)) => i.saturating_sub(1),
                    (Key::ArrowUp, None) => last,
                    (_, Some(i)) => (i + 1).min(last),
                    (_, None) => 0,
                };
                vec![InputEvent::PickIdentity { index }]
            }
            Key::Tab => {
                if !view.picker_open {
                    self.highlight = view.selected_session;
                }
                vec![InputEvent::ToggleSessionPicker]
            }
            Key::Enter if view.picker_open => vec![InputEvent::PickSession {
                index: self.highlight,
            }],
            Key::Enter => match view.focus {
                None => vec![InputEvent::FocusSecretField],
                Some(Focus::Secret) => vec![InputEvent::KeySubmit],
                Some(Focus::SessionControl) => {
                    vec![InputEvent::FocusSecretField, InputEvent::KeySubmit]
                }
            },
            Key::Escape => vec![InputEvent::ClickOutside],
            Key::Backspace => vec![InputEvent::KeyBackspace],
            Key::Char(ch) if is_secret_char(*ch) => vec![InputEvent::KeyChar { ch: *ch }],
            _ => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Drawing
// ---------------------------------------------------------------------------

/// Screen contents for one frame, top to bottom.
pub fn render_lines(view: &BrokerView, highlight: usize) -> Vec<String> {
    let mut lines = vec![
        format!("  {}", style("Portico").bold().cyan()),
        String::new(),
    ];

    if view.identities.is_empty() {
        lines.push(format!("  {}", style("No accounts available").dim()));
    }
    for row in &view.identities {
        let entry = format!("{} ({})", row.label, row.account);
        if row.selected {
            lines.push(format!("  > {}", style(entry).bold()));
        } else {
            lines.push(format!("    {entry}"));
        }
    }

    if view.login_panel_visible() {
        lines.push(String::new());
        let cursor = if view.focus == Some(Focus::Secret) { "_" } else { "" };
        lines.push(format!(
            "  Password: {}{}",
            view.masked_secret(),
            style(cursor).dim()
        ));

        let session = view.session_label().unwrap_or("(none)");
        let marker = if view.focus == Some(Focus::SessionControl) {
            ">"
        } else {
            " "
        };
        lines.push(format!(
            "{marker} Session:  {}  {}",
            style(session).bold(),
            style("[Tab]").dim()
        ));

        if view.picker_open {
            for (i, row) in view.sessions.iter().enumerate() {
                let pointer = if i == highlight { "->" } else { "  " };
                lines.push(format!("      {pointer} {}", row.label));
            }
        }
    }

    if !view.notifications.is_empty() {
        lines.push(String::new());
    }
    for notification in &view.notifications {
        let text = match notification.kind {
            NotificationKind::Error => style(format!("! {}", notification.message)).red(),
            NotificationKind::Info => style(format!("* {}", notification.message)).green(),
        };
        lines.push(format!("  {text}"));
    }

    lines.push(String::new());
    lines.push(format!(
        "  {}",
        style("Up/Down: choose  Tab: session  Enter: confirm  Esc: cancel").dim()
    ));
    lines
}

// ---------------------------------------------------------------------------
// Console frontend
// ---------------------------------------------------------------------------

pub struct ConsoleFrontend {
    term: Term,
    keys: KeyMap,
    tick: Duration,
}

impl ConsoleFrontend {
    pub fn new(tick: Duration) -> Self {
        Self {
            term: Term::stdout(),
            keys: KeyMap::default(),
            tick,
        }
    }

    /// Wait up to one tick for input on the terminal.
    fn input_pending(&self) -> io::Result<bool> {
        let mut fd = libc::pollfd {
            fd: io::stdin().as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let timeout = self.tick.as_millis().min(i32::MAX as u128) as libc::c_int;
        match unsafe { libc::poll(&mut fd, 1, timeout) } {
            -1 => {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
            0 => Ok(false),
            _ => Ok(true),
        }
    }
}

impl Frontend for ConsoleFrontend {
    fn render(&mut self, view: &BrokerView) -> io::Result<()> {
        self.term.clear_screen()?;
        for line in render_lines(view, self.keys.highlight()) {
            self.term.write_line(&line)?;
        }
        Ok(())
    }

    fn poll_events(&mut self, view: &BrokerView) -> io::Result<Vec<InputEvent>> {
        if !self.input_pending()? {
            return Ok(Vec::new());
        }
        let key = match self.term.read_key() {
            Ok(key) => key,
            // interrupted by a termination signal
            Err(err) if err.kind() == io::ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };

        let before = self.keys.highlight();
        let events = self.keys.map_key(&key, view);
        if events.is_empty() && self.keys.highlight() != before {
            self.render(view)?;
        }
        Ok(events)
    }
}
