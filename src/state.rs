//! State definitions and their builder.

use std::{fmt, future::Future, sync::Arc, time::Duration};

use tokio_sm_core::{BoxFuture, Fault, NO_STATE};

use crate::machine::StateMachine;

/// Enter/leave callback.
///
/// Receives the owning machine so it can look up
/// [`StateMachine::current_state`]. While `on_leave` runs that is still the
/// state being left; while `on_enter` runs it is already the new state.
pub type Callback =
    Arc<dyn Fn(Arc<StateMachine>) -> BoxFuture<'static, Result<(), Fault>> + Send + Sync>;

/// Picks the identity of the next state, or `None` to stay put.
pub type Selector = Arc<dyn Fn(&State) -> Option<String> + Send + Sync>;

/// A registered state. Immutable once built.
#[derive(Clone)]
pub struct State {
    id: String,
    on_enter: Option<Callback>,
    on_leave: Option<Callback>,
    selector: Option<Selector>,
    enter_timeout: Duration,
    leave_timeout: Duration,
    dwell_timeout: Duration,
}

impl State {
    /// Starts building a state with the given identity.
    pub fn builder(id: impl Into<String>) -> StateBuilder {
        StateBuilder {
            state: State {
                id: id.into(),
                on_enter: None,
                on_leave: None,
                selector: None,
                enter_timeout: Duration::ZERO,
                leave_timeout: Duration::ZERO,
                dwell_timeout: Duration::ZERO,
            },
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn on_enter(&self) -> Option<&Callback> {
        self.on_enter.as_ref()
    }

    pub fn on_leave(&self) -> Option<&Callback> {
        self.on_leave.as_ref()
    }

    pub fn enter_timeout(&self) -> Duration {
        self.enter_timeout
    }

    pub fn leave_timeout(&self) -> Duration {
        self.leave_timeout
    }

    pub fn dwell_timeout(&self) -> Duration {
        self.dwell_timeout
    }

    /// Runs the selector. A missing selector, `None` and [`NO_STATE`] all
    /// mean "cannot advance yet".
    pub fn select_next(&self) -> Option<String> {
        let selector = self.selector.as_ref()?;
        selector(self).filter(|id| id != NO_STATE)
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("id", &self.id)
            .field("on_enter", &self.on_enter.is_some())
            .field("on_leave", &self.on_leave.is_some())
            .field("selector", &self.selector.is_some())
            .field("enter_timeout", &self.enter_timeout)
            .field("leave_timeout", &self.leave_timeout)
            .field("dwell_timeout", &self.dwell_timeout)
            .finish()
    }
}

/// Builder for [`State`]. Every timeout defaults to zero, i.e. unguarded.
#[must_use]
pub struct StateBuilder {
    state: State,
}

impl StateBuilder {
    pub fn on_enter<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(Arc<StateMachine>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Fault>> + Send + 'static,
    {
        self.state.on_enter = Some(boxed(callback));
        self
    }

    pub fn on_leave<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(Arc<StateMachine>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Fault>> + Send + 'static,
    {
        self.state.on_leave = Some(boxed(callback));
        self
    }

    pub fn selector<F>(mut self, selector: F) -> Self
    where
        F: Fn(&State) -> Option<String> + Send + Sync + 'static,
    {
        self.state.selector = Some(Arc::new(selector));
        self
    }

    /// Shares an already boxed selector between several states.
    pub fn shared_selector(mut self, selector: Selector) -> Self {
        self.state.selector = Some(selector);
        self
    }

    /// How long `on_enter` may run before a timeout notification.
    pub fn enter_timeout(mut self, timeout: Duration) -> Self {
        self.state.enter_timeout = timeout;
        self
    }

    /// How long `on_leave` may run before a timeout notification.
    pub fn leave_timeout(mut self, timeout: Duration) -> Self {
        self.state.leave_timeout = timeout;
        self
    }

    /// How long the machine may stay in this state before a timeout
    /// notification.
    pub fn dwell_timeout(mut self, timeout: Duration) -> Self {
        self.state.dwell_timeout = timeout;
        self
    }

    pub fn build(self) -> State {
        self.state
    }
}

fn boxed<F, Fut>(callback: F) -> Callback
where
    F: Fn(Arc<StateMachine>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Fault>> + Send + 'static,
{
    Arc::new(move |machine: Arc<StateMachine>| Box::pin(callback(machine)) as BoxFuture<'static, _>)
}
