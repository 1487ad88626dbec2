//! Input source → broker events
//!
//! Frontends translate raw pointer and keyboard activity into these
//! discrete events. Hit-testing clicks against on-screen regions is the
//! frontend's job; `Layout::hit_test` is provided for that.

use serde::{Deserialize, Serialize};

/// Discrete input events consumed by the broker state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    // Selection
    PickIdentity { index: usize },
    FocusSecretField,
    ToggleSessionPicker,
    PickSession { index: usize },

    // Secret field editing
    KeyChar { ch: char },
    KeyBackspace,
    KeySubmit,

    ClickOutside,
}
