//! Session state machine.
//!
//! Drives `connecting ↔ connected ↔ read_only`, with `expired_session`,
//! `authentication_failed`, and `closed` as terminal states. See spec §4.4
//! for the transition diagram.

use parking_lot::Mutex;
use tracing::debug;

use crate::completion::oneshot;
use crate::value::SessionState;

/// The transition a transport or the engine observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    /// The transport established a full read/write connection.
    ConnectSuccess,
    /// The transport connected, but only to a read-only replica.
    ConnectReadOnly,
    /// The ensemble rejected the session's credentials.
    AuthReject,
    /// The ensemble declared the session expired.
    Expire,
    /// The application called `close`.
    Close,
    /// The transport observed a disconnect and will attempt to reconnect.
    Disconnect,
}

/// Attempted transition out of a terminal state, or a transition not valid
/// from the current state (e.g. `Disconnect` while `Connecting`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IllegalTransition {
    /// The state the machine was in when the transition was attempted.
    pub from: SessionState,
    /// The transition that was rejected.
    pub attempted: Transition,
}

fn apply(from: SessionState, transition: Transition) -> Result<SessionState, IllegalTransition> {
    use SessionState::{AuthenticationFailed, Closed, Connected, Connecting, ExpiredSession, ReadOnly};
    use Transition::{AuthReject, Close, ConnectReadOnly, ConnectSuccess, Disconnect, Expire};

    let illegal = || IllegalTransition { from, attempted: transition };

    match (from, transition) {
        (_, Close) if !from.is_terminal() => Ok(Closed),
        (Connecting, ConnectSuccess) => Ok(Connected),
        (Connecting, ConnectReadOnly) => Ok(ReadOnly),
        (Connecting, AuthReject) => Ok(AuthenticationFailed),
        (Connecting, Expire) => Ok(ExpiredSession),
        (Connected | ReadOnly, Disconnect) => Ok(Connecting),
        (Connected | ReadOnly, Expire) => Ok(ExpiredSession),
        _ => Err(illegal()),
    }
}

/// Drives the session's connectivity state machine and fans transitions
/// out to one-shot subscribers.
pub struct SessionStateMachine {
    state: Mutex<SessionState>,
    subscribers: Mutex<Vec<crate::completion::CompletionSender<SessionState>>>,
}

impl SessionStateMachine {
    /// Creates a new state machine starting in `Connecting`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SessionState::Connecting),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// The current state.
    #[must_use]
    pub fn current(&self) -> SessionState {
        *self.state.lock()
    }

    /// Applies `transition`. On success, posts the new state to every
    /// current subscriber and returns it. The state lock is released
    /// before subscribers are notified, so a subscriber callback can never
    /// deadlock against a concurrent `transition` or `subscribe` call
    /// (spec §5: "subscriber callbacks fire after the lock is released to
    /// avoid inversion").
    ///
    /// # Errors
    ///
    /// Returns [`IllegalTransition`] if `transition` is not valid from the
    /// current state (in particular: never valid from a terminal state).
    pub fn transition(&self, transition: Transition) -> Result<SessionState, IllegalTransition> {
        let new_state = {
            let mut state = self.state.lock();
            let next = apply(*state, transition)?;
            *state = next;
            next
        };
        debug!(?transition, ?new_state, "session state transition");
        let subscribers = std::mem::take(&mut *self.subscribers.lock());
        for sub in subscribers {
            sub.send(new_state);
        }
        Ok(new_state)
    }

    /// Registers a one-shot subscriber for the next transition. To follow
    /// the machine continuously, a caller waits then re-subscribes.
    pub fn subscribe(&self) -> crate::completion::CompletionWaiter<SessionState> {
        let (tx, rx) = oneshot();
        self.subscribers.lock().push(tx);
        rx
    }
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_connect_then_disconnect_then_reconnect() {
        let sm = SessionStateMachine::new();
        assert_eq!(sm.current(), SessionState::Connecting);
        assert_eq!(sm.transition(Transition::ConnectSuccess).unwrap(), SessionState::Connected);
        assert_eq!(sm.transition(Transition::Disconnect).unwrap(), SessionState::Connecting);
        assert_eq!(sm.transition(Transition::ConnectReadOnly).unwrap(), SessionState::ReadOnly);
    }

    #[test]
    fn terminal_states_reject_further_transitions() {
        let sm = SessionStateMachine::new();
        sm.transition(Transition::Expire).unwrap();
        assert_eq!(sm.current(), SessionState::ExpiredSession);
        assert!(sm.transition(Transition::ConnectSuccess).is_err());
        assert!(sm.transition(Transition::Close).is_err());
    }

    #[test]
    fn close_is_valid_from_any_non_terminal_state() {
        let sm = SessionStateMachine::new();
        assert_eq!(sm.transition(Transition::Close).unwrap(), SessionState::Closed);

        let sm = SessionStateMachine::new();
        sm.transition(Transition::ConnectSuccess).unwrap();
        assert_eq!(sm.transition(Transition::Close).unwrap(), SessionState::Closed);
    }

    #[test]
    fn disconnect_while_connecting_is_illegal() {
        let sm = SessionStateMachine::new();
        assert!(sm.transition(Transition::Disconnect).is_err());
    }

    #[test]
    fn subscriber_is_notified_exactly_once_then_must_resubscribe() {
        let sm = SessionStateMachine::new();
        let sub = sm.subscribe();
        sm.transition(Transition::ConnectSuccess).unwrap();
        assert_eq!(sub.wait(), SessionState::Connected);

        let sub2 = sm.subscribe();
        sm.transition(Transition::Disconnect).unwrap();
        assert_eq!(sub2.wait(), SessionState::Connecting);
    }
}
