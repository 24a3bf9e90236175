//! Panic hook cooperation for recovery scopes.
//!
//! A panic recovered by [`super::attempt`] is an ordinary error result, so
//! the default hook's "thread panicked at" report would be noise. The hook
//! installed here stays quiet while the panicking thread is inside a
//! recovery scope, logs the panic at `trace` level and keeps the backtrace
//! of the panic site for the resulting error. Outside recovery scopes it
//! defers to whatever hook was installed before.

use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic::PanicHookInfo;
use std::sync::Once;

static INSTALL: Once = Once::new();

thread_local! {
    static DEPTH: Cell<usize> = const { Cell::new(0) };
    static LAST_TRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

/// Installs the hook once per process, chaining to the previous hook.
pub(crate) fn install() {
    INSTALL.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if in_recovery_scope() {
                record(info);
            } else {
                previous(info);
            }
        }));
    });
}

/// Whether the current thread is running inside `attempt`.
pub fn in_recovery_scope() -> bool {
    DEPTH.try_with(Cell::get).unwrap_or(0) > 0
}

fn record(info: &PanicHookInfo<'_>) {
    let location = info
        .location()
        .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));
    tracing::trace!(
        location = location.as_deref().unwrap_or("<unknown>"),
        "panic inside recovery scope"
    );
    let _ = LAST_TRACE.try_with(|slot| {
        if let Ok(mut slot) = slot.try_borrow_mut() {
            *slot = Some(Backtrace::capture());
        }
    });
}

/// The backtrace recorded for the most recent recovered panic on this
/// thread, or one captured now when the hook did not run (another hook was
/// installed after ours).
pub(crate) fn take_backtrace() -> Backtrace {
    LAST_TRACE
        .try_with(|slot| slot.try_borrow_mut().ok().and_then(|mut slot| slot.take()))
        .ok()
        .flatten()
        .unwrap_or_else(Backtrace::capture)
}

/// RAII marker for a recovery scope; scopes nest.
pub(crate) struct RecoveryScope {
    _private: (),
}

impl RecoveryScope {
    pub(crate) fn enter() -> Self {
        install();
        let _ = DEPTH.try_with(|depth| depth.set(depth.get() + 1));
        let _ = LAST_TRACE.try_with(|slot| {
            if let Ok(mut slot) = slot.try_borrow_mut() {
                *slot = None;
            }
        });
        Self { _private: () }
    }
}

impl Drop for RecoveryScope {
    fn drop(&mut self) {
        let _ = DEPTH.try_with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scopes_nest() {
        assert!(!in_recovery_scope());
        let outer = RecoveryScope::enter();
        {
            let _inner = RecoveryScope::enter();
            assert!(in_recovery_scope());
        }
        assert!(in_recovery_scope());
        drop(outer);
        assert!(!in_recovery_scope());
    }

    #[test]
    fn test_take_backtrace_without_panic_captures_now() {
        let _ = take_backtrace();
        assert!(LAST_TRACE.with(|slot| slot.borrow().is_none()));
    }
}
