//! Validation and collection of the state table.

use std::{collections::BTreeMap, time::Duration};

use darling::FromMeta;
use syn::{Error, Ident, ImplItem, ImplItemFn, ItemImpl, LitStr};

use crate::attrs::{self, CallbackAttr, SelectorAttr, StatesArgs};

/// A method bound to a state event.
#[derive(Debug, Clone)]
pub struct Binding {
    pub method: Ident,
    pub timeout: Option<Duration>,
}

/// Everything declared for one state id.
#[derive(Debug, Default)]
pub struct StateDecl {
    pub on_enter: Option<Binding>,
    pub on_leave: Option<Binding>,
    pub selector: Option<Ident>,
    pub dwell: Option<Duration>,
}

/// The parsed `#[states]` impl block.
#[derive(Debug)]
pub struct StatesStructure {
    /// The input impl block with the consumed attributes removed.
    pub item: ItemImpl,
    /// States keyed and ordered by id.
    pub states: BTreeMap<String, StateDecl>,
}

impl StatesStructure {
    pub fn parse(args: StatesArgs, mut item: ItemImpl) -> syn::Result<Self> {
        let mut states: BTreeMap<String, StateDecl> = BTreeMap::new();

        for entry in &item.items {
            if let ImplItem::Fn(method) = entry {
                if method.sig.ident == "states" {
                    return Err(Error::new_spanned(
                        &method.sig.ident,
                        "`states` is generated by #[states]; rename this method",
                    ));
                }
                collect_method(method, &mut states)?;
            }
        }

        for dwell in &args.dwell {
            let id = state_id(&dwell.state)?;
            let decl = states.entry(id.clone()).or_default();
            if decl.dwell.is_some() {
                return Err(Error::new(
                    dwell.state.span(),
                    format!("state `{id}` already has a dwell timeout"),
                ));
            }
            decl.dwell = Some(parse_duration(&dwell.timeout)?);
        }

        if states.is_empty() {
            return Err(Error::new_spanned(
                &item.self_ty,
                "#[states] found no #[on_enter], #[on_leave], #[selector] or dwell(...) declarations",
            ));
        }

        for entry in &mut item.items {
            if let ImplItem::Fn(method) = entry {
                method.attrs.retain(|attr| !attrs::is_state_attr(attr));
            }
        }

        Ok(Self { item, states })
    }
}

fn collect_method(
    method: &ImplItemFn,
    states: &mut BTreeMap<String, StateDecl>,
) -> syn::Result<()> {
    for attr in &method.attrs {
        let path = attr.path();
        if path.is_ident(attrs::ON_ENTER) || path.is_ident(attrs::ON_LEAVE) {
            let is_enter = path.is_ident(attrs::ON_ENTER);
            let parsed = CallbackAttr::from_meta(&attr.meta).map_err(into_syn)?;
            check_callback_signature(method)?;

            let id = state_id(&parsed.state)?;
            let timeout = parsed.timeout.as_ref().map(parse_duration).transpose()?;
            let decl = states.entry(id.clone()).or_default();
            let (slot, event) = if is_enter {
                (&mut decl.on_enter, attrs::ON_ENTER)
            } else {
                (&mut decl.on_leave, attrs::ON_LEAVE)
            };
            if slot.is_some() {
                return Err(Error::new_spanned(
                    attr,
                    format!("state `{id}` already has an {event} callback"),
                ));
            }
            *slot = Some(Binding {
                method: method.sig.ident.clone(),
                timeout,
            });
        } else if path.is_ident(attrs::SELECTOR) {
            let parsed = SelectorAttr::from_meta(&attr.meta).map_err(into_syn)?;
            check_selector_signature(method)?;

            let id = state_id(&parsed.state)?;
            let decl = states.entry(id.clone()).or_default();
            if decl.selector.is_some() {
                return Err(Error::new_spanned(
                    attr,
                    format!("state `{id}` already has a selector"),
                ));
            }
            decl.selector = Some(method.sig.ident.clone());
        }
    }
    Ok(())
}

fn check_callback_signature(method: &ImplItemFn) -> syn::Result<()> {
    let sig = &method.sig;
    if sig.asyncness.is_none() {
        return Err(Error::new_spanned(
            &sig.fn_token,
            "state callbacks must be `async fn`",
        ));
    }
    if sig.receiver().is_none() || sig.inputs.len() != 2 {
        return Err(Error::new_spanned(
            &sig.inputs,
            "expected `(&self, machine: Arc<StateMachine>)`",
        ));
    }
    Ok(())
}

fn check_selector_signature(method: &ImplItemFn) -> syn::Result<()> {
    let sig = &method.sig;
    if let Some(asyncness) = &sig.asyncness {
        return Err(Error::new_spanned(asyncness, "selectors must not be async"));
    }
    if sig.receiver().is_none() || sig.inputs.len() != 2 {
        return Err(Error::new_spanned(
            &sig.inputs,
            "expected `(&self, state: &State) -> Option<String>`",
        ));
    }
    Ok(())
}

fn state_id(lit: &LitStr) -> syn::Result<String> {
    let id = lit.value();
    if id.is_empty() {
        return Err(Error::new(
            lit.span(),
            "the empty string means \"no state\" and cannot be declared",
        ));
    }
    Ok(id)
}

fn parse_duration(lit: &LitStr) -> syn::Result<Duration> {
    humantime::parse_duration(&lit.value())
        .map_err(|err| Error::new(lit.span(), format!("invalid duration: {err}")))
}

fn into_syn(err: darling::Error) -> Error {
    Error::new(err.span(), err)
}
