//! The transition engine.

use std::{fmt, sync::Arc};

use tokio::sync::{Mutex, watch};
use tokio_sm_core::{EventKind, Fault, NO_STATE, TransitionError};
use tracing::{debug, trace};

use crate::{
    registry::Registry,
    state::State,
    supervisor::{Hooks, Supervisor},
};

/// A selector-driven state machine.
///
/// Built once through [`StateMachine::builder`] and shared as an
/// `Arc<StateMachine>`; the registry and hooks cannot change afterwards.
/// [`start`](Self::start), [`advance`](Self::advance) and
/// [`emergency_switch`](Self::emergency_switch) are serialized, while
/// [`current_state`](Self::current_state) can be read from anywhere at any
/// time, including from inside callbacks.
///
/// # Callbacks and locking
///
/// Transitions hold the machine's locks while `on_leave`/`on_enter` and the
/// timeout hook run. A callback must therefore not await a transition on its
/// own machine. Once a callback has outlived its timeout the machine has
/// moved on and the lock is released, so such a late callback may drive the
/// machine; this is the only way callbacks and transitions interleave.
///
/// Transitions run in their own task. Dropping the future returned by
/// `start`, `advance` or `emergency_switch` detaches the transition; it still
/// runs to the end, so the new state gets its dwell watch and a late fault
/// still reaches the error hook.
pub struct StateMachine {
    registry: Registry,
    current: watch::Sender<Option<Arc<State>>>,
    supervisor: Supervisor,
    advance_lock: Mutex<()>,
    event_lock: Mutex<()>,
}

impl StateMachine {
    pub fn builder() -> StateMachineBuilder {
        StateMachineBuilder::default()
    }

    /// The state the machine currently occupies, or `None` before
    /// [`start`](Self::start) and after switching to an unknown id.
    pub fn current_state(&self) -> Option<Arc<State>> {
        self.current.borrow().clone()
    }

    /// Shorthand for the id of [`current_state`](Self::current_state).
    pub fn current_id(&self) -> Option<String> {
        self.current.borrow().as_ref().map(|state| state.id().to_owned())
    }

    pub fn is_started(&self) -> bool {
        self.current.borrow().is_some()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Observes every change of the current state.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<State>>> {
        self.current.subscribe()
    }

    /// Waits until the machine occupies `id`.
    pub async fn wait_for_state(&self, id: &str) -> Result<(), watch::error::RecvError> {
        let mut rx = self.current.subscribe();
        loop {
            let reached = rx
                .borrow_and_update()
                .as_ref()
                .is_some_and(|state| state.id() == id);
            if reached {
                return Ok(());
            }
            rx.changed().await?;
        }
    }

    /// Moves the machine into `id` from wherever it is.
    ///
    /// With `trigger_callbacks` unset no callback runs, so no callback guard
    /// is armed either. A dwell watch is still armed when `id` declares one.
    pub async fn start(
        self: &Arc<Self>,
        id: &str,
        trigger_callbacks: bool,
    ) -> Result<bool, TransitionError> {
        let id = id.to_owned();
        self.detached(move |machine| async move {
            let _advance = machine.advance_lock.lock().await;
            machine.switch(&id, trigger_callbacks).await
        })
        .await
    }

    /// Asks the current state's selector for the next state and moves there.
    ///
    /// Returns `Ok(false)` without side effects when the machine has not
    /// been started or when the selector declines; both mean "try again
    /// later", not failure.
    pub async fn advance(self: &Arc<Self>) -> Result<bool, TransitionError> {
        self.detached(|machine| async move {
            let _advance = machine.advance_lock.lock().await;

            let Some(current) = machine.current_state() else {
                return Ok(false);
            };
            match current.select_next() {
                Some(next) => machine.switch(&next, true).await,
                None => {
                    trace!(state = current.id(), "selector declined to advance");
                    Ok(false)
                }
            }
        })
        .await
    }

    /// Moves into `id` without consulting any selector.
    pub async fn emergency_switch(
        self: &Arc<Self>,
        id: &str,
        trigger_callbacks: bool,
    ) -> Result<bool, TransitionError> {
        let id = id.to_owned();
        self.detached(move |machine| async move {
            let _advance = machine.advance_lock.lock().await;
            debug!(to = %id, "emergency switch");
            machine.switch(&id, trigger_callbacks).await
        })
        .await
    }

    /// Runs a transition in its own task.
    ///
    /// Dropping the returned future detaches the transition instead of
    /// abandoning it between leave and enter: the pointer, the dwell watch
    /// and the error hook still end up consistent.
    async fn detached<F, Fut>(self: &Arc<Self>, transition: F) -> Result<bool, TransitionError>
    where
        F: FnOnce(Arc<Self>) -> Fut,
        Fut: Future<Output = Result<bool, TransitionError>> + Send + 'static,
    {
        match tokio::spawn(transition(Arc::clone(self))).await {
            Ok(result) => result,
            Err(err) => match err.try_into_panic() {
                Ok(payload) => std::panic::resume_unwind(payload),
                // runtime shutting down
                Err(_) => Ok(false),
            },
        }
    }

    /// Leave the current state, then enter `target`.
    ///
    /// A leave fault aborts with the current state untouched. An enter fault
    /// is reported after the new state has been published; there is no
    /// rollback.
    async fn switch(
        self: &Arc<Self>,
        target: &str,
        trigger_callbacks: bool,
    ) -> Result<bool, TransitionError> {
        if target == NO_STATE {
            return Ok(false);
        }

        let _events = self.event_lock.lock().await;
        self.supervisor.cancel_dwell();

        let from = self.current_state();
        if trigger_callbacks && let Some(from) = &from {
            self.supervisor
                .run_guarded(self, from, EventKind::Leave)
                .await
                .map_err(|fault| TransitionError::Leave {
                    state: from.id().to_owned(),
                    fault,
                })?;
        }
        let from_id = from.as_ref().map(|state| state.id().to_owned());

        let Some(next) = self.registry.get(target) else {
            debug!(from = ?from_id, to = target, "unknown state, machine is now stateless");
            self.current.send_replace(None);
            return Ok(false);
        };

        self.current.send_replace(Some(Arc::clone(&next)));
        debug!(from = ?from_id, to = next.id(), "state changed");

        let entered: Result<(), Fault> = if trigger_callbacks {
            self.supervisor
                .run_guarded(self, &next, EventKind::Enter)
                .await
        } else {
            Ok(())
        };

        self.supervisor.arm_dwell(self, &next);

        entered.map_err(|fault| TransitionError::Enter {
            state: next.id().to_owned(),
            fault,
        })?;
        Ok(true)
    }
}

impl fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut states: Vec<&str> = self.registry.ids().collect();
        states.sort_unstable();
        f.debug_struct("StateMachine")
            .field("current", &self.current_id())
            .field("states", &states)
            .finish_non_exhaustive()
    }
}

/// Collects states and hooks for a [`StateMachine`].
#[derive(Default)]
#[must_use]
pub struct StateMachineBuilder {
    registry: Registry,
    hooks: Hooks,
}

impl StateMachineBuilder {
    /// Registers `state`, replacing any earlier state with the same id.
    pub fn state(mut self, state: State) -> Self {
        self.registry.register(state);
        self
    }

    pub fn states(mut self, states: impl IntoIterator<Item = State>) -> Self {
        for state in states {
            self.registry.register(state);
        }
        self
    }

    /// Called when a callback guard or dwell watch expires. The callback
    /// itself keeps running.
    pub fn with_timeout_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Arc<StateMachine>, EventKind) + Send + Sync + 'static,
    {
        self.hooks.on_timeout = Some(Arc::new(handler));
        self
    }

    /// Called with every fault returned or raised by a callback.
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Fault, EventKind) + Send + Sync + 'static,
    {
        self.hooks.on_error = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> Arc<StateMachine> {
        let (current, _) = watch::channel(None);
        Arc::new(StateMachine {
            registry: self.registry,
            current,
            supervisor: Supervisor::new(self.hooks),
            advance_lock: Mutex::new(()),
            event_lock: Mutex::new(()),
        })
    }
}
