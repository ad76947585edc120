//! Unattended polling until a terminal state.

use std::{sync::Arc, time::Duration};

use tokio::time::Instant;
use tokio_sm_core::TransitionError;
use tracing::{debug, trace};

use crate::machine::StateMachine;

impl StateMachine {
    /// Keeps calling [`advance`](Self::advance) until the machine reaches one
    /// of `terminal` or a callback fails.
    ///
    /// After a successful step the next one is attempted immediately. While
    /// the selector declines, attempts are spaced `period` apart, counting
    /// the time spent inside `advance` itself. Errors are fatal and
    /// returned as-is.
    pub async fn auto_advance(
        self: &Arc<Self>,
        period: Duration,
        terminal: &[&str],
    ) -> Result<(), TransitionError> {
        loop {
            let attempt = Instant::now();

            if self.advance().await? {
                let current = self.current_id();
                if let Some(id) = current.as_deref()
                    && terminal.contains(&id)
                {
                    debug!(state = id, "terminal state reached");
                    return Ok(());
                }
                continue;
            }

            let remaining = period.saturating_sub(attempt.elapsed());
            if !remaining.is_zero() {
                trace!(?remaining, "cannot advance yet");
                tokio::time::sleep(remaining).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use tokio_sm_core::Fault;

    use super::*;
    use crate::state::State;

    #[tokio::test(start_paused = true)]
    async fn waits_a_full_period_while_blocked() {
        let polls = Arc::new(AtomicUsize::new(0));
        let p = Arc::clone(&polls);
        let machine = StateMachine::builder()
            .state(
                State::builder("wait")
                    .selector(move |_| {
                        (p.fetch_add(1, Ordering::SeqCst) >= 3).then(|| "done".to_owned())
                    })
                    .build(),
            )
            .state(State::builder("done").build())
            .build();
        machine.start("wait", false).await.unwrap();

        let started = Instant::now();
        machine
            .auto_advance(Duration::from_millis(100), &["done"])
            .await
            .unwrap();

        assert_eq!(polls.load(Ordering::SeqCst), 4);
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert_eq!(machine.current_id().as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn stops_on_first_error() {
        let entered = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&entered);
        let machine = StateMachine::builder()
            .state(State::builder("a").selector(|_| Some("b".into())).build())
            .state(
                State::builder("b")
                    .selector(|_| Some("c".into()))
                    .on_enter(|_| async { Err(Fault::msg("broken")) })
                    .build(),
            )
            .state(
                State::builder("c")
                    .on_enter(move |_| {
                        log.lock().unwrap().push("c");
                        async { Ok(()) }
                    })
                    .build(),
            )
            .build();
        machine.start("a", false).await.unwrap();

        let err = machine
            .auto_advance(Duration::from_millis(10), &["c"])
            .await
            .unwrap_err();
        assert_eq!(err.state(), "b");
        assert!(entered.lock().unwrap().is_empty());
    }
}
