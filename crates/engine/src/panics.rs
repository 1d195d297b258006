//! Panic capture for step threads
//!
//! Bodies run on threads named [`STEP_THREAD_NAME`]. A process-wide hook
//! records where such a thread panicked (and a backtrace, when
//! `RUST_BACKTRACE` enables capture) instead of printing it; the runner picks
//! the record up after `catch_unwind` returns. Panics on other threads go to
//! the previously installed hook.

use spectree_common::CodeLocation;
use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::cell::RefCell;
use std::sync::Once;

pub(crate) const STEP_THREAD_NAME: &str = "spectree-step";

#[derive(Debug, Clone, Default)]
pub(crate) struct PanicDetails {
    pub location: Option<CodeLocation>,
    pub backtrace: Option<String>,
}

thread_local! {
    static LAST_PANIC: RefCell<Option<PanicDetails>> = const { RefCell::new(None) };
}

static INSTALL: Once = Once::new();

pub(crate) fn install_hook() {
    INSTALL.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if std::thread::current().name() != Some(STEP_THREAD_NAME) {
                previous(info);
                return;
            }
            let backtrace = Backtrace::capture();
            let backtrace = match backtrace.status() {
                BacktraceStatus::Captured => Some(backtrace.to_string()),
                _ => None,
            };
            let details = PanicDetails {
                location: info.location().map(CodeLocation::from),
                backtrace,
            };
            LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(details));
        }));
    });
}

/// Details recorded for the most recent panic on this thread
pub(crate) fn take_last() -> Option<PanicDetails> {
    LAST_PANIC.with(|slot| slot.borrow_mut().take())
}

/// Text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
