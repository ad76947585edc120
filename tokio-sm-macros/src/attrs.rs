//! Attribute parsing for the `#[states]` macro.

use darling::FromMeta;
use syn::LitStr;

/// Arguments for the `#[states(...)]` attribute itself.
#[derive(Debug, Default, FromMeta)]
pub struct StatesArgs {
    /// `dwell(state = "id", timeout = "2s")`, repeatable.
    #[darling(multiple)]
    pub dwell: Vec<DwellAttr>,
}

/// One `dwell(...)` entry.
#[derive(Debug, FromMeta)]
pub struct DwellAttr {
    pub state: LitStr,
    /// Duration string (e.g., "500ms", "2s").
    pub timeout: LitStr,
}

/// Arguments for `#[on_enter(...)]` and `#[on_leave(...)]`.
#[derive(Debug, FromMeta)]
pub struct CallbackAttr {
    pub state: LitStr,
    /// Guard timeout; omitted means unguarded.
    #[darling(default)]
    pub timeout: Option<LitStr>,
}

/// Arguments for `#[selector(state = "id")]`.
#[derive(Debug, FromMeta)]
pub struct SelectorAttr {
    pub state: LitStr,
}

pub const ON_ENTER: &str = "on_enter";
pub const ON_LEAVE: &str = "on_leave";
pub const SELECTOR: &str = "selector";

/// Whether `attr` is one of the method attributes consumed by `#[states]`.
pub fn is_state_attr(attr: &syn::Attribute) -> bool {
    let path = attr.path();
    path.is_ident(ON_ENTER) || path.is_ident(ON_LEAVE) || path.is_ident(SELECTOR)
}
