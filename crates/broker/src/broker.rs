//! Broker event loop.
//!
//! Owns the `BrokerState`: drains the frontend's pending input, applies it
//! through `transition()`, redraws when something visible changed, and
//! stops on a termination request or a successful login.

use std::io;
use std::time::Instant;

use tracing::info;

use crate::auth::Authenticator;
use crate::frontend::Frontend;
use crate::state::BrokerState;
use crate::transition::{transition, Effect, HandoffRequest, Input};

#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Termination was requested before anyone logged in
    Shutdown,
    Handoff(HandoffRequest),
}

pub fn run_loop<S>(
    mut state: BrokerState,
    frontend: &mut dyn Frontend,
    gateway: &dyn Authenticator,
    should_stop: S,
) -> io::Result<Outcome>
where
    S: Fn() -> bool,
{
    frontend.render(&state.view(Instant::now()))?;

    loop {
        if should_stop() {
            info!(
                component = "broker",
                event = "broker.stop_requested",
                "Termination requested, leaving event loop"
            );
            return Ok(Outcome::Shutdown);
        }

        let events = frontend.poll_events(&state.view(Instant::now()))?;
        let mut redraw = false;

        for input in events
            .into_iter()
            .map(Input::from)
            .chain(std::iter::once(Input::Tick))
        {
            let (next, effects) = transition(state, input, gateway, Instant::now());
            state = next;

            for effect in effects {
                match effect {
                    Effect::Redraw => redraw = true,
                    Effect::Handoff(request) => {
                        frontend.render(&state.view(Instant::now()))?;
                        info!(
                            component = "broker",
                            event = "broker.handoff_requested",
                            account = %request.account,
                            session = %request.session.label,
                            "Login accepted"
                        );
                        return Ok(Outcome::Handoff(request));
                    }
                }
            }
        }

        if redraw {
            frontend.render(&state.view(Instant::now()))?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use portico_protocol::{BrokerView, Identity, InputEvent, SessionOption};

    /// Replays event batches, then raises the stop flag.
    struct ScriptedFrontend {
        batches: VecDeque<Vec<InputEvent>>,
        frames: Vec<BrokerView>,
        exhausted: Rc<Cell<bool>>,
    }

    impl ScriptedFrontend {
        fn new(batches: Vec<Vec<InputEvent>>) -> Self {
            Self {
                batches: batches.into(),
                frames: Vec::new(),
                exhausted: Rc::new(Cell::new(false)),
            }
        }
    }

    impl Frontend for ScriptedFrontend {
        fn render(&mut self, view: &BrokerView) -> io::Result<()> {
            self.frames.push(view.clone());
            Ok(())
        }

        fn poll_events(&mut self, _view: &BrokerView) -> io::Result<Vec<InputEvent>> {
            match self.batches.pop_front() {
                Some(batch) => Ok(batch),
                None => {
                    self.exhausted.set(true);
                    Ok(Vec::new())
                }
            }
        }
    }

    struct FixedSecret(&'static str);

    impl Authenticator for FixedSecret {
        fn authenticate(&self, _account: &str, secret: &str) -> bool {
            secret == self.0
        }
    }

    fn state() -> BrokerState {
        BrokerState::new(
            vec![Identity::new("alice", "alice", 1000)],
            vec![SessionOption::new("i3", "i3")],
            63,
        )
    }

    fn typed(secret: &str) -> Vec<InputEvent> {
        secret.chars().map(|ch| InputEvent::KeyChar { ch }).collect()
    }

    #[test]
    fn stops_when_requested() {
        let mut frontend = ScriptedFrontend::new(vec![]);
        let outcome = run_loop(state(), &mut frontend, &FixedSecret("pw"), || true).unwrap();

        assert_eq!(outcome, Outcome::Shutdown);
        assert_eq!(frontend.frames.len(), 1);
    }

    #[test]
    fn wrong_then_right_secret_hands_off() {
        let mut first = vec![InputEvent::PickIdentity { index: 0 }];
        first.extend(typed("abc"));
        first.push(InputEvent::KeySubmit);
        let mut second = typed("pw");
        second.push(InputEvent::KeySubmit);

        let mut frontend = ScriptedFrontend::new(vec![first, second]);
        let exhausted = Rc::clone(&frontend.exhausted);
        let outcome =
            run_loop(state(), &mut frontend, &FixedSecret("pw"), || exhausted.get()).unwrap();

        match outcome {
            Outcome::Handoff(request) => {
                assert_eq!(request.account, "alice");
                assert_eq!(request.session.command, "i3");
            }
            other => panic!("expected handoff, got {other:?}"),
        }

        let after_reject = &frontend.frames[1];
        assert_eq!(after_reject.secret_len, 0);
        assert_eq!(after_reject.notifications[0].message, "Invalid password");
        assert!(frontend.frames.iter().all(|f| f.secret_len <= 3));
    }

    #[test]
    fn redraws_only_on_change() {
        let mut frontend = ScriptedFrontend::new(vec![
            vec![InputEvent::KeyChar { ch: 'x' }],
            vec![InputEvent::PickIdentity { index: 0 }],
        ]);
        let exhausted = Rc::clone(&frontend.exhausted);
        let outcome =
            run_loop(state(), &mut frontend, &FixedSecret("pw"), || exhausted.get()).unwrap();

        assert_eq!(outcome, Outcome::Shutdown);
        // initial frame + the identity pick; the stray key changed nothing
        assert_eq!(frontend.frames.len(), 2);
        assert_eq!(frontend.frames[1].selected_identity, Some(0));
    }
}
