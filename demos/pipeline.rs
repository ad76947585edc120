//! Example: build pipeline driven by auto-advance, with watchdogs.
//!
//! Run with `RUST_LOG=tokio_sm=debug,pipeline=info` to see transitions.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use tokio_sm::{EventKind, Fault, State, StateMachine, states};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
pub struct Pipeline {
    checks_remaining: AtomicU32,
}

#[states(dwell(state = "waiting", timeout = "250ms"))]
impl Pipeline {
    #[on_enter(state = "checkout")]
    async fn checkout(&self, _machine: Arc<StateMachine>) -> Result<(), Fault> {
        tracing::info!("cloning repository");
        self.checks_remaining.store(3, Ordering::SeqCst);
        Ok(())
    }

    #[on_enter(state = "build", timeout = "100ms")]
    async fn build(&self, _machine: Arc<StateMachine>) -> Result<(), Fault> {
        tracing::info!("compiling");
        // Slower than its guard: reported, not cancelled.
        tokio::time::sleep(Duration::from_millis(150)).await;
        tracing::info!("compiled");
        Ok(())
    }

    #[on_leave(state = "build")]
    async fn archive(&self, machine: Arc<StateMachine>) -> Result<(), Fault> {
        tracing::info!(state = ?machine.current_id(), "archiving artifacts");
        Ok(())
    }

    #[on_enter(state = "done")]
    async fn done(&self, _machine: Arc<StateMachine>) -> Result<(), Fault> {
        tracing::info!("pipeline finished");
        Ok(())
    }

    #[selector(state = "checkout")]
    fn after_checkout(&self, _state: &State) -> Option<String> {
        Some("waiting".to_owned())
    }

    #[selector(state = "waiting")]
    fn when_checks_pass(&self, _state: &State) -> Option<String> {
        let remaining = self.checks_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            tracing::info!(remaining, "waiting for checks");
            self.checks_remaining.store(remaining - 1, Ordering::SeqCst);
            return None;
        }
        Some("build".to_owned())
    }

    #[selector(state = "build")]
    fn after_build(&self, _state: &State) -> Option<String> {
        Some("done".to_owned())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let pipeline = Arc::new(Pipeline::default());
    let machine = StateMachine::builder()
        .states(pipeline.states())
        .with_timeout_handler(|machine, kind| {
            tracing::warn!(state = ?machine.current_id(), %kind, "watchdog fired");
        })
        .with_error_handler(|fault, kind: EventKind| {
            tracing::error!(%fault, %kind, "callback failed");
        })
        .build();

    if let Err(err) = machine.start("checkout", true).await {
        tracing::error!(%err, "could not start pipeline");
        return;
    }

    match machine
        .auto_advance(Duration::from_millis(100), &["done"])
        .await
    {
        Ok(()) => tracing::info!(state = ?machine.current_id(), "stopped"),
        Err(err) => tracing::error!(%err, "pipeline aborted"),
    }
}
