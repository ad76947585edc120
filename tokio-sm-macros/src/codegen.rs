//! Code generation for `#[states]`.

use std::time::Duration;

use proc_macro2::TokenStream;
use quote::quote;

use crate::validation::{StateDecl, StatesStructure};

/// Emits the cleaned impl block followed by the generated `states()`.
pub fn generate(structure: &StatesStructure) -> TokenStream {
    let item = &structure.item;
    let self_ty = &item.self_ty;
    let (impl_generics, _, where_clause) = item.generics.split_for_impl();

    let builders = structure
        .states
        .iter()
        .map(|(id, decl)| render_state(id, decl));

    quote! {
        #item

        impl #impl_generics #self_ty #where_clause {
            /// State definitions declared on this type, ordered by id.
            pub fn states(self: &::std::sync::Arc<Self>) -> ::std::vec::Vec<::tokio_sm::State> {
                ::std::vec![#(#builders),*]
            }
        }
    }
}

fn render_state(id: &str, decl: &StateDecl) -> TokenStream {
    let mut steps = Vec::new();

    if let Some(binding) = &decl.on_enter {
        let method = &binding.method;
        steps.push(quote! {
            let builder = {
                let this = ::std::sync::Arc::clone(self);
                builder.on_enter(move |machine| {
                    let this = ::std::sync::Arc::clone(&this);
                    async move { this.#method(machine).await }
                })
            };
        });
        if let Some(timeout) = binding.timeout {
            let timeout = render_duration(timeout);
            steps.push(quote! { let builder = builder.enter_timeout(#timeout); });
        }
    }

    if let Some(binding) = &decl.on_leave {
        let method = &binding.method;
        steps.push(quote! {
            let builder = {
                let this = ::std::sync::Arc::clone(self);
                builder.on_leave(move |machine| {
                    let this = ::std::sync::Arc::clone(&this);
                    async move { this.#method(machine).await }
                })
            };
        });
        if let Some(timeout) = binding.timeout {
            let timeout = render_duration(timeout);
            steps.push(quote! { let builder = builder.leave_timeout(#timeout); });
        }
    }

    if let Some(method) = &decl.selector {
        steps.push(quote! {
            let builder = {
                let this = ::std::sync::Arc::clone(self);
                builder.selector(move |state: &::tokio_sm::State| this.#method(state))
            };
        });
    }

    if let Some(timeout) = decl.dwell {
        let timeout = render_duration(timeout);
        steps.push(quote! { let builder = builder.dwell_timeout(#timeout); });
    }

    quote! {
        {
            let builder = ::tokio_sm::State::builder(#id);
            #(#steps)*
            builder.build()
        }
    }
}

fn render_duration(duration: Duration) -> TokenStream {
    let secs = duration.as_secs();
    let nanos = duration.subsec_nanos();
    quote! { ::std::time::Duration::new(#secs, #nanos) }
}
