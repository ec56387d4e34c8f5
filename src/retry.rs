// src/retry.rs
//! Per-message retry and key rotation, as a pure state machine.
//!
//! The driver (see [`crate::session`]) feeds events in and performs the
//! returned [`Action`]; nothing here touches the network or the clock.

use crate::llm::gemini::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    Attempting { attempts: u32 },
    Succeeded,
    /// Empty reply: reported, budget untouched.
    Abandoned,
    Exhausted,
}

impl State {
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Succeeded | State::Abandoned | State::Exhausted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start,
    Completed(Outcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Issue a request with the active key.
    Send,
    /// Back off, optionally rotating first, then send again.
    Retry { rotate: bool },
    Deliver(String),
    ReportEmpty,
    /// Budget spent. `rotate` carries the rotation owed by the last failure.
    GiveUp { rotate: bool },
    /// Event not valid in the current state.
    Ignore,
}

fn rotates(outcome: &Outcome) -> bool {
    matches!(
        outcome,
        Outcome::QuotaExceeded | Outcome::InvalidCredentialOrModel { .. }
    )
}

pub fn transition(state: State, event: Event, budget: u32) -> (State, Action) {
    match (state, event) {
        (State::Idle, Event::Start) => (State::Attempting { attempts: 0 }, Action::Send),
        (State::Attempting { .. }, Event::Completed(Outcome::Success(text))) => {
            (State::Succeeded, Action::Deliver(text))
        }
        (State::Attempting { .. }, Event::Completed(Outcome::EmptyResponse)) => {
            (State::Abandoned, Action::ReportEmpty)
        }
        (State::Attempting { attempts }, Event::Completed(outcome)) => {
            let attempts = attempts + 1;
            let rotate = rotates(&outcome);
            if attempts < budget {
                (State::Attempting { attempts }, Action::Retry { rotate })
            } else {
                (State::Exhausted, Action::GiveUp { rotate })
            }
        }
        (state, _) => (state, Action::Ignore),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(outcomes: Vec<Outcome>, budget: u32) -> (State, Vec<Action>) {
        let (mut state, first) = transition(State::Idle, Event::Start, budget);
        let mut actions = vec![first];
        for outcome in outcomes {
            if state.is_terminal() {
                break;
            }
            let (next, action) = transition(state, Event::Completed(outcome), budget);
            state = next;
            actions.push(action);
        }
        (state, actions)
    }

    #[test]
    fn success_on_first_attempt() {
        let (state, actions) = run(vec![Outcome::Success("hi".into())], 4);
        assert_eq!(state, State::Succeeded);
        assert_eq!(actions, vec![Action::Send, Action::Deliver("hi".into())]);
    }

    #[test]
    fn quota_and_rejection_rotate_other_failures_do_not() {
        let (state, actions) = run(
            vec![
                Outcome::QuotaExceeded,
                Outcome::InvalidCredentialOrModel { status: 403 },
                Outcome::ProviderError(500),
                Outcome::TimedOut,
                Outcome::TransportError("reset".into()),
                Outcome::Success("ok".into()),
            ],
            10,
        );
        assert_eq!(state, State::Succeeded);
        assert_eq!(
            &actions[1..6],
            &[
                Action::Retry { rotate: true },
                Action::Retry { rotate: true },
                Action::Retry { rotate: false },
                Action::Retry { rotate: false },
                Action::Retry { rotate: false },
            ]
        );
    }

    #[test]
    fn exhausts_after_exactly_budget_attempts() {
        let (state, actions) = run(vec![Outcome::QuotaExceeded; 10], 4);
        assert_eq!(state, State::Exhausted);
        // Start + 4 completed attempts.
        assert_eq!(actions.len(), 5);
        assert_eq!(actions.last(), Some(&Action::GiveUp { rotate: true }));
    }

    #[test]
    fn empty_response_is_terminal_without_spending_budget() {
        let (state, actions) = run(vec![Outcome::EmptyResponse, Outcome::Success("x".into())], 1);
        assert_eq!(state, State::Abandoned);
        assert_eq!(actions, vec![Action::Send, Action::ReportEmpty]);
    }

    #[test]
    fn events_after_terminal_state_are_ignored() {
        let (state, action) = transition(State::Succeeded, Event::Completed(Outcome::TimedOut), 3);
        assert_eq!(state, State::Succeeded);
        assert_eq!(action, Action::Ignore);
        let (state, action) = transition(State::Attempting { attempts: 1 }, Event::Start, 3);
        assert_eq!(state, State::Attempting { attempts: 1 });
        assert_eq!(action, Action::Ignore);
    }
}
