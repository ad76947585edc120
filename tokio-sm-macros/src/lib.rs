//! Proc macro for declaring tokio-sm states from an impl block.

use darling::{FromMeta, ast::NestedMeta};
use proc_macro::TokenStream;
use syn::{ItemImpl, parse_macro_input};

mod attrs;
mod codegen;
mod validation;

/// Collects the state declarations of an impl block into a generated
/// `fn states(self: &Arc<Self>) -> Vec<tokio_sm::State>`.
///
/// Methods opt in with:
///
/// * `#[on_enter(state = "id", timeout = "1s")]` and
///   `#[on_leave(state = "id", timeout = "1s")]` on
///   `async fn(&self, machine: Arc<StateMachine>) -> Result<(), Fault>`;
///   `timeout` is optional.
/// * `#[selector(state = "id")]` on `fn(&self, state: &State) -> Option<String>`.
///
/// Each attribute may be repeated to bind one method to several states.
/// Dwell timeouts are declared on the macro itself:
/// `#[states(dwell(state = "id", timeout = "500ms"))]`. Durations use
/// `humantime` syntax and are checked at compile time.
///
/// ```ignore
/// use std::sync::Arc;
/// use tokio_sm::{Fault, State, StateMachine, states};
///
/// struct Door;
///
/// #[states(dwell(state = "open", timeout = "30s"))]
/// impl Door {
///     #[on_enter(state = "open", timeout = "2s")]
///     async fn opened(&self, _machine: Arc<StateMachine>) -> Result<(), Fault> {
///         Ok(())
///     }
///
///     #[selector(state = "open")]
///     fn close_next(&self, _state: &State) -> Option<String> {
///         Some("closed".to_owned())
///     }
/// }
///
/// let door = Arc::new(Door);
/// let machine = StateMachine::builder().states(door.states()).build();
/// assert!(machine.registry().contains("open"));
/// ```
#[proc_macro_attribute]
pub fn states(args: TokenStream, input: TokenStream) -> TokenStream {
    let input_impl = parse_macro_input!(input as ItemImpl);

    let meta = match NestedMeta::parse_meta_list(args.into()) {
        Ok(meta) => meta,
        Err(e) => return darling::Error::from(e).write_errors().into(),
    };
    let args = match attrs::StatesArgs::from_list(&meta) {
        Ok(args) => args,
        Err(e) => return e.write_errors().into(),
    };

    match generate_states(args, input_impl) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn generate_states(
    args: attrs::StatesArgs,
    input: ItemImpl,
) -> syn::Result<proc_macro2::TokenStream> {
    let structure = validation::StatesStructure::parse(args, input)?;
    Ok(codegen::generate(&structure))
}
