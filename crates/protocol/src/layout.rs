//! On-screen region geometry
//!
//! The broker core does not draw, but it owns the layout of the regions it
//! reacts to so every frontend hit-tests against the same geometry.

use serde::{Deserialize, Serialize};

use crate::input::InputEvent;
use crate::view::BrokerView;

const IDENTITY_X: i32 = 50;
const IDENTITY_TOP: i32 = 80;
const IDENTITY_PITCH: i32 = 90;
const AVATAR_SIZE: i32 = 60;
const IDENTITY_WIDTH: i32 = AVATAR_SIZE + 200;

const PANEL_WIDTH: i32 = 350;
const PANEL_HALF_WIDTH: i32 = PANEL_WIDTH / 2;
const SECRET_HEIGHT: i32 = 60;
const CONTROL_HEIGHT: i32 = 30;
const PICKER_ROW_HEIGHT: i32 = 30;

/// Axis-aligned rectangle in surface pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Edges are inclusive.
    pub fn contains(&self, px: i32, py: i32) -> bool {
        px >= self.x && px <= self.x + self.width && py >= self.y && py <= self.y + self.height
    }
}

/// Regions of one frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub identity_rows: Vec<Rect>,
    pub secret_field: Option<Rect>,
    pub session_control: Option<Rect>,
    /// Empty unless the picker is open
    pub picker_rows: Vec<Rect>,
}

impl Layout {
    pub fn compute(view: &BrokerView, width: i32, height: i32) -> Self {
        let identity_rows = (0..view.identities.len() as i32)
            .map(|i| {
                Rect::new(
                    IDENTITY_X,
                    IDENTITY_TOP + i * IDENTITY_PITCH,
                    IDENTITY_WIDTH,
                    AVATAR_SIZE,
                )
            })
            .collect();

        if !view.login_panel_visible() {
            return Self {
                identity_rows,
                secret_field: None,
                session_control: None,
                picker_rows: Vec::new(),
            };
        }

        let left = width / 2 - PANEL_HALF_WIDTH;
        let mid = height / 2;
        let picker_rows = if view.picker_open {
            (0..view.sessions.len() as i32)
                .map(|i| {
                    Rect::new(
                        left,
                        mid + 70 + i * PICKER_ROW_HEIGHT,
                        PANEL_WIDTH,
                        PICKER_ROW_HEIGHT,
                    )
                })
                .collect()
        } else {
            Vec::new()
        };

        Self {
            identity_rows,
            secret_field: Some(Rect::new(left, mid - 30, PANEL_WIDTH, SECRET_HEIGHT)),
            session_control: Some(Rect::new(left, mid + 40, PANEL_WIDTH, CONTROL_HEIGHT)),
            picker_rows,
        }
    }

    /// Map a pointer click to the event it triggers.
    ///
    /// Identity rows win over everything else, then the session control,
    /// then open picker rows, then the secret field.
    pub fn hit_test(&self, x: i32, y: i32) -> InputEvent {
        if let Some(index) = self.identity_rows.iter().position(|r| r.contains(x, y)) {
            return InputEvent::PickIdentity { index };
        }
        if self.session_control.is_some_and(|r| r.contains(x, y)) {
            return InputEvent::ToggleSessionPicker;
        }
        if let Some(index) = self.picker_rows.iter().position(|r| r.contains(x, y)) {
            return InputEvent::PickSession { index };
        }
        if self.secret_field.is_some_and(|r| r.contains(x, y)) {
            return InputEvent::FocusSecretField;
        }
        InputEvent::ClickOutside
    }
}
