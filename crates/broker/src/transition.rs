//! Pure state transition function
//!
//! All selection logic lives here as a synchronous function:
//! `transition(state, input, gateway, now) -> (state, effects)`.
//! No drawing, no process control, no clock reads, so it is fully unit-testable
//! without a display attached. The only outside call is the
//! authentication gateway on submit.

use std::time::Instant;

use portico_protocol::{Focus, InputEvent, NotificationKind, SessionOption};

use crate::auth::Authenticator;
use crate::state::BrokerState;

pub const INVALID_SECRET_MESSAGE: &str = "Invalid password";
pub const NO_SESSIONS_MESSAGE: &str = "No sessions available";

// ---------------------------------------------------------------------------
// Input: one variant per InputEvent, plus the clock tick
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    PickIdentity(usize),
    FocusSecretField,
    ToggleSessionPicker,
    PickSession(usize),
    KeyChar(char),
    KeyBackspace,
    KeySubmit,
    ClickOutside,
    /// Periodic wakeup; expires notifications
    Tick,
}

impl From<InputEvent> for Input {
    fn from(event: InputEvent) -> Self {
        match event {
            InputEvent::PickIdentity { index } => Input::PickIdentity(index),
            InputEvent::FocusSecretField => Input::FocusSecretField,
            InputEvent::ToggleSessionPicker => Input::ToggleSessionPicker,
            InputEvent::PickSession { index } => Input::PickSession(index),
            InputEvent::KeyChar { ch } => Input::KeyChar(ch),
            InputEvent::KeyBackspace => Input::KeyBackspace,
            InputEvent::KeySubmit => Input::KeySubmit,
            InputEvent::ClickOutside => Input::ClickOutside,
        }
    }
}

// ---------------------------------------------------------------------------
// Effects: what the event loop must do after a transition
// ---------------------------------------------------------------------------

/// An authenticated identity and the session it asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffRequest {
    pub account: String,
    pub session: SessionOption,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Visible state changed
    Redraw,
    /// Terminal for the broker: drop privileges and exec the session
    Handoff(HandoffRequest),
}

// ---------------------------------------------------------------------------
// transition(): the pure core
// ---------------------------------------------------------------------------

/// Apply one input to the broker state.
///
/// Inputs whose preconditions do not hold leave the state untouched and
/// produce no effects.
pub fn transition(
    mut state: BrokerState,
    input: Input,
    gateway: &dyn Authenticator,
    now: Instant,
) -> (BrokerState, Vec<Effect>) {
    let mut effects: Vec<Effect> = Vec::new();
    let identity_selected = state.selected_identity.is_some();

    match input {
        // -- Selection --------------------------------------------------------
        Input::PickIdentity(index) => {
            if index < state.identities.len() {
                state.selected_identity = Some(index);
                state.secret.clear();
                state.picker_open = false;
                state.focus = Some(Focus::Secret);
                effects.push(Effect::Redraw);
            }
        }

        Input::FocusSecretField => {
            if identity_selected && state.focus != Some(Focus::Secret) {
                state.focus = Some(Focus::Secret);
                effects.push(Effect::Redraw);
            }
        }

        Input::ToggleSessionPicker => {
            if identity_selected {
                state.picker_open = !state.picker_open;
                state.focus = Some(Focus::SessionControl);
                effects.push(Effect::Redraw);
            }
        }

        Input::PickSession(index) => {
            if state.picker_open && index < state.sessions.len() {
                state.selected_session = index;
                state.picker_open = false;
                effects.push(Effect::Redraw);
            }
        }

        Input::ClickOutside => {
            if state.focus.take().is_some() {
                effects.push(Effect::Redraw);
            }
        }

        // -- Secret field -----------------------------------------------------
        Input::KeyChar(ch) => {
            if state.focus == Some(Focus::Secret) && state.secret.push(ch) {
                effects.push(Effect::Redraw);
            }
        }

        Input::KeyBackspace => {
            if state.focus == Some(Focus::Secret) && state.secret.pop() {
                effects.push(Effect::Redraw);
            }
        }

        Input::KeySubmit => {
            if state.focus != Some(Focus::Secret) {
                return (state, effects);
            }
            let Some(identity) = state.selected_identity().cloned() else {
                return (state, effects);
            };

            let Some(session) = state.selected_session().cloned() else {
                state.secret.clear();
                state.notify(NotificationKind::Error, NO_SESSIONS_MESSAGE, now);
                effects.push(Effect::Redraw);
                return (state, effects);
            };

            let secret = state.secret.take();
            let accepted = gateway.authenticate(&identity.account, &secret);
            drop(secret);

            if accepted {
                state.notify(
                    NotificationKind::Info,
                    format!("Starting {}", session.label),
                    now,
                );
                effects.push(Effect::Redraw);
                effects.push(Effect::Handoff(HandoffRequest {
                    account: identity.account,
                    session,
                }));
            } else {
                state.notify(NotificationKind::Error, INVALID_SECRET_MESSAGE, now);
                effects.push(Effect::Redraw);
            }
        }

        Input::Tick => {
            if state.expire_notifications(now) {
                effects.push(Effect::Redraw);
            }
        }
    }

    (state, effects)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::time::Duration;

    use portico_protocol::Identity;

    use crate::state::NOTIFICATION_TTL;

    /// Gateway double that replays scripted verdicts and records calls.
    struct ScriptedGateway {
        verdicts: RefCell<Vec<bool>>,
        calls: RefCell<Vec<(String, String)>>,
    }

    impl ScriptedGateway {
        fn new(verdicts: &[bool]) -> Self {
            Self {
                verdicts: RefCell::new(verdicts.iter().rev().copied().collect()),
                calls: RefCell::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.borrow().clone()
        }
    }

    impl Authenticator for ScriptedGateway {
        fn authenticate(&self, account: &str, secret: &str) -> bool {
            self.calls
                .borrow_mut()
                .push((account.to_string(), secret.to_string()));
            self.verdicts.borrow_mut().pop().unwrap_or(false)
        }
    }

    fn test_state() -> BrokerState {
        BrokerState::new(
            vec![
                Identity::new("alice", "Alice", 1000),
                Identity::new("bob", "Bob", 1001),
                Identity::new("carol", "Carol", 1002),
            ],
            vec![
                SessionOption::new("i3", "i3"),
                SessionOption::new("XFCE", "startxfce4"),
            ],
            8,
        )
    }

    fn apply(
        state: BrokerState,
        inputs: &[Input],
        gateway: &dyn Authenticator,
        now: Instant,
    ) -> (BrokerState, Vec<Effect>) {
        inputs
            .iter()
            .fold((state, Vec::new()), |(state, mut all), input| {
                let (state, effects) = transition(state, input.clone(), gateway, now);
                all.extend(effects);
                (state, all)
            })
    }

    fn type_secret(secret: &str) -> Vec<Input> {
        secret.chars().map(Input::KeyChar).collect()
    }

    #[test]
    fn pick_identity_selects_exactly_one_and_resets() {
        let gateway = ScriptedGateway::new(&[]);
        let now = Instant::now();
        let mut inputs = vec![Input::PickIdentity(0)];
        inputs.extend(type_secret("abc"));
        inputs.push(Input::ToggleSessionPicker);
        inputs.push(Input::PickIdentity(2));
        inputs.push(Input::PickIdentity(7));

        let (state, _) = apply(test_state(), &inputs, &gateway, now);

        let view = state.view(now);
        assert_eq!(view.identities.iter().filter(|row| row.selected).count(), 1);
        assert!(view.identities[2].selected);
        assert!(state.secret.is_empty());
        assert!(!state.picker_open);
        assert_eq!(state.focus, Some(Focus::Secret));
    }

    #[test]
    fn any_pick_sequence_leaves_one_selected_and_empty_secret() {
        let gateway = ScriptedGateway::new(&[]);
        let now = Instant::now();
        for sequence in [vec![0, 1, 2], vec![2, 2, 0], vec![1], vec![0, 2, 1, 1]] {
            let mut inputs = Vec::new();
            for index in &sequence {
                inputs.push(Input::PickIdentity(*index));
                inputs.extend(type_secret("xy"));
            }
            inputs.push(Input::PickIdentity(*sequence.last().unwrap()));

            let (state, _) = apply(test_state(), &inputs, &gateway, now);
            let selected = state
                .view(now)
                .identities
                .iter()
                .filter(|row| row.selected)
                .count();
            assert_eq!(selected, 1, "sequence {sequence:?}");
            assert!(state.secret.is_empty(), "sequence {sequence:?}");
        }
    }

    #[test]
    fn submit_without_identity_is_noop() {
        let gateway = ScriptedGateway::new(&[true]);
        let now = Instant::now();
        let mut state = test_state();
        state.focus = Some(Focus::Secret);

        let (state, effects) = transition(state, Input::KeySubmit, &gateway, now);

        assert!(effects.is_empty());
        assert!(gateway.calls().is_empty());
        assert!(state.selected_identity.is_none());
        assert!(state.notifications.is_empty());
    }

    #[test]
    fn keys_ignored_without_secret_focus() {
        let gateway = ScriptedGateway::new(&[true]);
        let now = Instant::now();
        let inputs = vec![
            Input::PickIdentity(0),
            Input::ToggleSessionPicker,
            Input::KeyChar('a'),
            Input::KeySubmit,
        ];

        let (state, effects) = apply(test_state(), &inputs, &gateway, now);

        assert!(state.secret.is_empty());
        assert!(gateway.calls().is_empty());
        assert!(!effects.iter().any(|e| matches!(e, Effect::Handoff(_))));
    }

    #[test]
    fn secret_never_exceeds_capacity() {
        let gateway = ScriptedGateway::new(&[]);
        let now = Instant::now();
        let mut inputs = vec![Input::PickIdentity(1)];
        inputs.extend(type_secret(&"z".repeat(500)));

        let (state, _) = apply(test_state(), &inputs, &gateway, now);
        assert_eq!(state.secret.len(), 8);
    }

    #[test]
    fn backspace_removes_last_character() {
        let gateway = ScriptedGateway::new(&[true]);
        let now = Instant::now();
        let mut inputs = vec![Input::PickIdentity(0)];
        inputs.extend(type_secret("abcd"));
        inputs.push(Input::KeyBackspace);
        inputs.push(Input::KeySubmit);

        let _ = apply(test_state(), &inputs, &gateway, now);
        assert_eq!(
            gateway.calls(),
            vec![("alice".to_string(), "abc".to_string())]
        );
    }

    #[test]
    fn failed_submit_clears_secret_and_notifies() {
        let gateway = ScriptedGateway::new(&[false]);
        let now = Instant::now();
        let mut inputs = vec![Input::PickIdentity(0)];
        inputs.extend(type_secret("wrong"));
        inputs.push(Input::KeySubmit);

        let (state, effects) = apply(test_state(), &inputs, &gateway, now);

        assert!(state.secret.is_empty());
        let active: Vec<_> = state.active_notifications(now).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].kind, NotificationKind::Error);
        assert_eq!(active[0].message, INVALID_SECRET_MESSAGE);
        assert!(!effects.iter().any(|e| matches!(e, Effect::Handoff(_))));

        // a second submit without new keystrokes sends an empty secret
        let (_, _) = transition(state, Input::KeySubmit, &gateway, now);
        assert_eq!(gateway.calls()[1].1, "");
    }

    #[test]
    fn tick_expires_notifications() {
        let gateway = ScriptedGateway::new(&[false]);
        let issued = Instant::now();
        let inputs = vec![Input::PickIdentity(0), Input::KeySubmit];
        let (state, _) = apply(test_state(), &inputs, &gateway, issued);
        assert_eq!(state.active_notifications(issued).count(), 1);

        let later = issued + NOTIFICATION_TTL + Duration::from_millis(10);
        let (state, effects) = transition(state, Input::Tick, &gateway, later);
        assert_eq!(effects, vec![Effect::Redraw]);
        assert!(state.notifications.is_empty());

        let (_, effects) = transition(state, Input::Tick, &gateway, later);
        assert!(effects.is_empty());
    }

    #[test]
    fn double_toggle_keeps_visible_session() {
        let gateway = ScriptedGateway::new(&[]);
        let now = Instant::now();
        let (state, _) = apply(
            test_state(),
            &[
                Input::PickIdentity(0),
                Input::ToggleSessionPicker,
                Input::PickSession(1),
            ],
            &gateway,
            now,
        );
        assert_eq!(state.selected_session, 1);
        assert!(!state.picker_open);

        let (state, _) = transition(state, Input::ToggleSessionPicker, &gateway, now);
        assert!(state.picker_open);
        let (state, _) = transition(state, Input::ToggleSessionPicker, &gateway, now);
        assert!(!state.picker_open);
        assert_eq!(state.selected_session, 1);
        assert_eq!(state.focus, Some(Focus::SessionControl));
    }

    #[test]
    fn pick_session_requires_open_picker_and_valid_index() {
        let gateway = ScriptedGateway::new(&[]);
        let now = Instant::now();
        let (state, effects) = apply(
            test_state(),
            &[Input::PickIdentity(0), Input::PickSession(1)],
            &gateway,
            now,
        );
        assert_eq!(state.selected_session, 0);
        assert_eq!(effects, vec![Effect::Redraw]);

        let (state, _) = apply(
            state,
            &[Input::ToggleSessionPicker, Input::PickSession(9)],
            &gateway,
            now,
        );
        assert_eq!(state.selected_session, 0);
        assert!(state.picker_open);
    }

    #[test]
    fn toggle_and_focus_require_identity() {
        let gateway = ScriptedGateway::new(&[]);
        let now = Instant::now();
        let (state, effects) = apply(
            test_state(),
            &[Input::ToggleSessionPicker, Input::FocusSecretField],
            &gateway,
            now,
        );
        assert!(effects.is_empty());
        assert!(!state.picker_open);
        assert!(state.focus.is_none());
    }

    #[test]
    fn click_outside_clears_focus() {
        let gateway = ScriptedGateway::new(&[]);
        let now = Instant::now();
        let (state, _) = apply(
            test_state(),
            &[Input::PickIdentity(0), Input::ClickOutside, Input::KeyChar('q')],
            &gateway,
            now,
        );
        assert!(state.focus.is_none());
        assert!(state.secret.is_empty());

        let (state, effects) = transition(state, Input::ClickOutside, &gateway, now);
        assert!(effects.is_empty());

        let (state, _) = transition(state, Input::FocusSecretField, &gateway, now);
        assert_eq!(state.focus, Some(Focus::Secret));
    }

    #[test]
    fn submit_with_no_sessions_skips_gateway() {
        let gateway = ScriptedGateway::new(&[true]);
        let now = Instant::now();
        let state = BrokerState::new(vec![Identity::new("alice", "Alice", 1000)], vec![], 8);
        let mut inputs = vec![Input::PickIdentity(0)];
        inputs.extend(type_secret("pw"));
        inputs.push(Input::KeySubmit);

        let (state, effects) = apply(state, &inputs, &gateway, now);

        assert!(gateway.calls().is_empty());
        assert!(state.secret.is_empty());
        assert_eq!(
            state.active_notifications(now).next().map(|n| n.message.as_str()),
            Some(NO_SESSIONS_MESSAGE)
        );
        assert!(!effects.iter().any(|e| matches!(e, Effect::Handoff(_))));
    }

    #[test]
    fn reject_then_accept_hands_off_chosen_session() {
        let gateway = ScriptedGateway::new(&[false, true]);
        let now = Instant::now();
        let state = BrokerState::new(
            vec![Identity::new("alice", "alice", 1000)],
            vec![SessionOption::new("i3", "i3")],
            63,
        );

        let mut inputs = vec![Input::PickIdentity(0)];
        inputs.extend(type_secret("sss"));
        inputs.push(Input::KeySubmit);
        let (state, effects) = apply(state, &inputs, &gateway, now);

        assert!(state.secret.is_empty());
        assert_eq!(
            state.active_notifications(now).next().map(|n| n.message.as_str()),
            Some("Invalid password")
        );
        assert!(!effects.iter().any(|e| matches!(e, Effect::Handoff(_))));

        let mut inputs = type_secret("correct");
        inputs.push(Input::KeySubmit);
        let (state, effects) = apply(state, &inputs, &gateway, now);

        assert!(state.secret.is_empty());
        let handoff = effects.iter().find_map(|e| match e {
            Effect::Handoff(request) => Some(request.clone()),
            _ => None,
        });
        let request = handoff.expect("handoff requested");
        assert_eq!(request.account, "alice");
        assert_eq!(request.session.command, "i3");
        assert_eq!(
            gateway.calls(),
            vec![
                ("alice".to_string(), "sss".to_string()),
                ("alice".to_string(), "correct".to_string()),
            ]
        );
    }

    #[test]
    fn input_events_map_one_to_one() {
        assert_eq!(
            Input::from(InputEvent::PickIdentity { index: 3 }),
            Input::PickIdentity(3)
        );
        assert_eq!(
            Input::from(InputEvent::KeyChar { ch: 'k' }),
            Input::KeyChar('k')
        );
        assert_eq!(Input::from(InputEvent::ClickOutside), Input::ClickOutside);
    }
}
