//! Turning caught panics into faults.
//!
//! `catch_unwind` hands back only the payload; the location lives in the
//! panic hook. A process-wide hook records it in a thread-local, and the
//! catching side reads it back on the same thread right after the unwind.

use std::any::Any;
use std::cell::RefCell;
use std::panic;
use std::sync::Once;

use super::{Fault, Site};

thread_local! {
    static LAST_PANIC: RefCell<Option<Site>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Installs the location-recording hook once, chaining whatever hook was set
/// before it.
pub(crate) fn install_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if let Some(loc) = info.location() {
                LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(loc.into()));
            }
            previous(info);
        }));
    });
}

/// Builds a fault from a caught panic payload.
pub(crate) fn into_fault(payload: Box<dyn Any + Send>) -> Fault {
    let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_owned()
    };
    // The hook ran on this thread during the unwind we just caught. Taking
    // the slot keeps a stale site from leaking into a later payload.
    let site = LAST_PANIC.with(|slot| slot.borrow_mut().take());
    Fault::panicked(message, site)
}
