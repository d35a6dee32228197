// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Flow lifecycle state machine

use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;
use strum::{Display, EnumIter, EnumString};

/// Flow lifecycle states
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum OperationState {
    /// No flow running
    Idle,
    /// Flow executing on its background task
    Running,
    /// Flow blocked waiting for host input
    Paused,
    /// Host input accepted, flow about to continue
    Resuming,
    /// Cancellation requested, waiting for the flow to exit
    Cancelling,
}

impl OperationState {
    /// Check whether `to` is reachable from this state
    ///
    /// Self transitions are always permitted.
    pub fn can_transition(&self, to: OperationState) -> bool {
        use OperationState::*;

        if *self == to {
            return true;
        }

        matches!(
            (self, to),
            (Idle, Running)
                | (Running, Paused)
                | (Running, Cancelling)
                | (Running, Idle)
                | (Paused, Resuming)
                | (Paused, Cancelling)
                | (Paused, Running)
                | (Resuming, Running)
                | (Cancelling, Idle)
        )
    }
}

/// State change observer, called with `(old, new)`
pub type Observer = Arc<dyn Fn(OperationState, OperationState) + Send + Sync>;

/// Thread-safe flow state with change notification
///
/// Observers are invoked after the state lock is released so they may
/// query or transition the state machine themselves.
pub struct StateMachine {
    state: Mutex<OperationState>,
    observers: Mutex<Vec<Observer>>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(OperationState::Idle),
            observers: Mutex::new(vec![]),
        }
    }

    /// Fetch the current state
    pub fn state(&self) -> OperationState {
        *self.state.lock()
    }

    /// Register a state change observer
    pub fn subscribe(&self, f: impl Fn(OperationState, OperationState) + Send + Sync + 'static) {
        self.observers.lock().push(Arc::new(f));
    }

    /// Move to `to` if permitted from the current state
    pub fn transition(&self, to: OperationState) -> bool {
        let old = {
            let mut s = self.state.lock();
            let old = *s;

            if old == to {
                return true;
            }

            if !old.can_transition(to) {
                warn!("Rejected state transition {old} -> {to}");
                return false;
            }

            *s = to;
            old
        };

        self.notify(old, to);

        true
    }

    /// Move to `to` only if the current state is `from`
    pub fn transition_from(&self, from: OperationState, to: OperationState) -> bool {
        {
            let mut s = self.state.lock();

            if *s != from || !from.can_transition(to) {
                debug!("Skipping state transition {from} -> {to} (state: {})", *s);
                return false;
            }

            if from == to {
                return true;
            }

            *s = to;
        }

        self.notify(from, to);

        true
    }

    /// Force the state back to idle
    pub fn reset(&self) {
        let old = std::mem::replace(&mut *self.state.lock(), OperationState::Idle);

        if old != OperationState::Idle {
            self.notify(old, OperationState::Idle);
        }
    }

    fn notify(&self, old: OperationState, new: OperationState) {
        debug!("State transition {old} -> {new}");

        // Clone out so observers may subscribe or transition re-entrantly
        let observers = self.observers.lock().clone();
        for o in observers {
            o(old, new);
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use strum::IntoEnumIterator;

    use super::*;
    use OperationState::*;

    const TABLE: &[(OperationState, &[OperationState])] = &[
        (Idle, &[Running]),
        (Running, &[Paused, Cancelling, Idle]),
        (Paused, &[Resuming, Cancelling, Running]),
        (Resuming, &[Running]),
        (Cancelling, &[Idle]),
    ];

    fn force(m: &StateMachine, s: OperationState) {
        *m.state.lock() = s;
    }

    /// Every (from, to) pair succeeds iff listed or a self transition
    #[test]
    fn transition_table() {
        for (from, allowed) in TABLE {
            for to in OperationState::iter() {
                let m = StateMachine::new();
                force(&m, *from);

                let expected = *from == to || allowed.contains(&to);
                assert_eq!(m.transition(to), expected, "{from} -> {to}");

                let end = if expected { to } else { *from };
                assert_eq!(m.state(), end);
            }
        }
    }

    #[test]
    fn observers_see_changes_only() {
        let m = StateMachine::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        m.subscribe(move |old, new| {
            assert_ne!(old, new);
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(m.transition(Running));
        assert!(m.transition(Running));
        assert!(!m.transition(Resuming));
        assert!(m.transition(Paused));
        m.reset();
        m.reset();

        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(m.state(), Idle);
    }

    #[test]
    fn observer_may_reenter() {
        let m = Arc::new(StateMachine::new());

        let m1 = m.clone();
        m.subscribe(move |_old, new| {
            if new == Cancelling {
                m1.transition(Idle);
            }
        });

        m.transition(Running);
        m.transition(Cancelling);

        assert_eq!(m.state(), Idle);
    }

    #[test]
    fn conditional_transition() {
        let m = StateMachine::new();

        assert!(!m.transition_from(Paused, Resuming));
        assert!(m.transition_from(Idle, Running));
        assert!(!m.transition_from(Idle, Running));
        assert_eq!(m.state(), Running);
    }
}
