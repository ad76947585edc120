//! Watchdogs for callbacks and dwell time.
//!
//! Two kinds of timer live here:
//!
//! * the *callback guard* races one `on_enter`/`on_leave` invocation against
//!   its configured timeout;
//! * the *dwell watch* fires when the machine stays at a state longer than
//!   the state allows.
//!
//! Neither timer ever stops a callback. When a guard expires the callback
//! keeps running in its own task and may still touch the machine afterwards;
//! only the notification is affected by cancellation.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};

use tokio::{sync::oneshot, task::JoinError};
use tokio_sm_core::{EventKind, Fault};
use tracing::{trace, warn};

use crate::{machine::StateMachine, state::State};

/// Called when a callback guard or a dwell watch expires.
pub type TimeoutHandler = Arc<dyn Fn(&Arc<StateMachine>, EventKind) + Send + Sync>;

/// Called once for every fault captured from a callback.
pub type ErrorHandler = Arc<dyn Fn(&Fault, EventKind) + Send + Sync>;

/// Process-wide notification hooks, fixed when the machine is built.
#[derive(Clone, Default)]
pub(crate) struct Hooks {
    pub(crate) on_timeout: Option<TimeoutHandler>,
    pub(crate) on_error: Option<ErrorHandler>,
}

impl Hooks {
    fn timeout(&self, machine: &Arc<StateMachine>, kind: EventKind) {
        if let Some(handler) = &self.on_timeout {
            handler(machine, kind);
        }
    }

    fn error(&self, fault: &Fault, kind: EventKind) {
        if let Some(handler) = &self.on_error {
            handler(fault, kind);
        }
    }
}

#[derive(Default)]
struct DwellWatch {
    generation: u64,
    cancel: Option<oneshot::Sender<()>>,
}

pub(crate) struct Supervisor {
    hooks: Hooks,
    dwell: Arc<Mutex<DwellWatch>>,
}

impl Supervisor {
    pub(crate) fn new(hooks: Hooks) -> Self {
        Self {
            hooks,
            dwell: Arc::default(),
        }
    }

    /// Runs the `kind` callback of `state` in its own task.
    ///
    /// With a zero timeout the task is simply awaited. Otherwise, if the
    /// timeout elapses first, the timeout hook fires, the call reports
    /// success, and a detached task keeps waiting so that a late fault still
    /// reaches the error hook.
    pub(crate) async fn run_guarded(
        &self,
        machine: &Arc<StateMachine>,
        state: &State,
        kind: EventKind,
    ) -> Result<(), Fault> {
        let (callback, timeout) = match kind {
            EventKind::Enter => (state.on_enter(), state.enter_timeout()),
            EventKind::Leave => (state.on_leave(), state.leave_timeout()),
            EventKind::State => (None, Duration::ZERO),
        };
        let Some(callback) = callback else {
            return Ok(());
        };

        let mut task = tokio::spawn(callback(Arc::clone(machine)));

        if timeout.is_zero() {
            let outcome = flatten(task.await);
            return self.settle(state.id(), kind, outcome);
        }

        let waited = tokio::time::timeout(timeout, &mut task).await;
        if let Ok(joined) = waited {
            return self.settle(state.id(), kind, flatten(joined));
        }

        warn!(state = state.id(), %kind, ?timeout, "callback exceeded its timeout");
        self.hooks.timeout(machine, kind);

        let hooks = self.hooks.clone();
        let id = state.id().to_owned();
        tokio::spawn(async move {
            if let Err(fault) = flatten(task.await) {
                warn!(state = %id, %kind, %fault, "late callback fault");
                hooks.error(&fault, kind);
            }
        });
        Ok(())
    }

    fn settle(&self, id: &str, kind: EventKind, outcome: Result<(), Fault>) -> Result<(), Fault> {
        if let Err(fault) = &outcome {
            warn!(state = id, %kind, %fault, "callback failed");
            self.hooks.error(fault, kind);
        }
        outcome
    }

    /// Starts watching the occupancy of `state`. Any previous watch is
    /// invalidated.
    pub(crate) fn arm_dwell(&self, machine: &Arc<StateMachine>, state: &State) {
        let timeout = state.dwell_timeout();
        if timeout.is_zero() {
            return;
        }

        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let generation = {
            let mut watch = lock(&self.dwell);
            watch.generation = watch.generation.wrapping_add(1);
            watch.cancel = Some(cancel_tx);
            watch.generation
        };
        trace!(state = state.id(), generation, ?timeout, "dwell watch armed");

        let dwell = Arc::clone(&self.dwell);
        let hooks = self.hooks.clone();
        let machine: Weak<StateMachine> = Arc::downgrade(machine);
        let id = state.id().to_owned();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel_rx => {
                    trace!(state = %id, generation, "dwell watch cancelled");
                }
                _ = tokio::time::sleep(timeout) => {
                    let live = {
                        let mut watch = lock(&dwell);
                        let live = watch.generation == generation && watch.cancel.is_some();
                        if live {
                            watch.cancel = None;
                        }
                        live
                    };
                    if !live {
                        return;
                    }
                    let Some(machine) = machine.upgrade() else {
                        return;
                    };
                    warn!(state = %id, ?timeout, "dwell timeout");
                    hooks.timeout(&machine, EventKind::State);
                }
            }
        });
    }

    /// Stops the live dwell watch, if any. Returns whether one was live.
    pub(crate) fn cancel_dwell(&self) -> bool {
        lock(&self.dwell).cancel.take().is_some()
    }

    #[cfg(test)]
    fn dwell_live(&self) -> bool {
        lock(&self.dwell).cancel.is_some()
    }
}

fn lock(dwell: &Mutex<DwellWatch>) -> MutexGuard<'_, DwellWatch> {
    dwell.lock().unwrap_or_else(PoisonError::into_inner)
}

fn flatten(joined: Result<Result<(), Fault>, JoinError>) -> Result<(), Fault> {
    joined.unwrap_or_else(|err| Err(Fault::from(err)))
}
