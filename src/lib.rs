//! # tokio-sm
//!
//! A selector-driven state machine for Tokio with watchdog timeouts.
//!
//! States are registered up front with optional `on_enter`/`on_leave`
//! callbacks, a selector that names the next state, and three optional
//! timeouts: one per callback and one for the time spent at the state. The
//! machine moves one transition at a time; callbacks run in their own tasks
//! and a timeout only notifies, it never cancels the callback.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use tokio_sm::{State, StateMachine};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), tokio_sm::TransitionError> {
//! let machine = StateMachine::builder()
//!     .state(
//!         State::builder("idle")
//!             .selector(|_| Some("working".into()))
//!             .build(),
//!     )
//!     .state(
//!         State::builder("working")
//!             .on_enter(|machine| async move {
//!                 println!("now in {:?}", machine.current_id());
//!                 Ok(())
//!             })
//!             .enter_timeout(Duration::from_secs(1))
//!             .build(),
//!     )
//!     .with_timeout_handler(|_, kind| eprintln!("{kind} timed out"))
//!     .build();
//!
//! machine.start("idle", true).await?;
//! machine
//!     .auto_advance(Duration::from_millis(10), &["working"])
//!     .await?;
//! assert_eq!(machine.current_id().as_deref(), Some("working"));
//! # Ok(())
//! # }
//! ```
//!
//! The [`states`] attribute builds the same definitions from an `impl`
//! block.

mod machine;
mod poller;
mod registry;
mod state;
mod supervisor;

pub use crate::machine::{StateMachine, StateMachineBuilder};
pub use crate::registry::Registry;
pub use crate::state::{Callback, Selector, State, StateBuilder};
pub use crate::supervisor::{ErrorHandler, TimeoutHandler};
#[doc(inline)]
pub use tokio_sm_core::{BoxFuture, EventKind, Fault, NO_STATE, TransitionError};
#[doc(inline)]
pub use tokio_sm_macros::states;
