//! Thread-local context tracking for crash reports.
//!
//! Records which phase `jsguard` is in and which file the current thread
//! is analyzing. Context is per thread (rayon workers each keep their own)
//! and restored by RAII guards; progress is a pair of global atomics.

use std::cell::RefCell;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

static FILES_PROCESSED: AtomicUsize = AtomicUsize::new(0);
static FILES_TOTAL: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static CURRENT_CONTEXT: RefCell<AnalysisContext> = const { RefCell::new(AnalysisContext::new()) };
}

/// Context snapshot for the current operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisContext {
    pub phase: Option<AnalysisPhase>,
    pub current_file: Option<PathBuf>,
}

impl AnalysisContext {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: None,
            current_file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisPhase {
    /// Loading `.jsguard.toml`
    Configuration,
    /// Walking the input paths for source files
    FileDiscovery,
    /// Parsing and scanning files
    Analysis,
    /// Printing diagnostics
    OutputGeneration,
}

impl std::fmt::Display for AnalysisPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration"),
            Self::FileDiscovery => write!(f, "file_discovery"),
            Self::Analysis => write!(f, "analysis"),
            Self::OutputGeneration => write!(f, "output_generation"),
        }
    }
}

/// RAII guard restoring the previous context on drop.
pub struct ContextGuard {
    previous: AnalysisContext,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let _ = CURRENT_CONTEXT.try_with(|ctx| {
            *ctx.borrow_mut() = self.previous.clone();
        });
    }
}

fn update(change: impl FnOnce(&mut AnalysisContext)) -> ContextGuard {
    CURRENT_CONTEXT.with(|ctx| {
        let previous = ctx.borrow().clone();
        change(&mut ctx.borrow_mut());
        ContextGuard { previous }
    })
}

#[must_use]
pub fn set_phase(phase: AnalysisPhase) -> ContextGuard {
    update(|ctx| ctx.phase = Some(phase))
}

#[must_use]
pub fn set_current_file(path: impl Into<PathBuf>) -> ContextGuard {
    let path = path.into();
    update(|ctx| ctx.current_file = Some(path))
}

pub fn set_progress(processed: usize, total: usize) {
    FILES_PROCESSED.store(processed, Ordering::Relaxed);
    FILES_TOTAL.store(total, Ordering::Relaxed);
}

/// Thread-safe; called from rayon workers.
pub fn increment_processed() {
    FILES_PROCESSED.fetch_add(1, Ordering::Relaxed);
}

#[must_use]
pub fn get_current_context() -> AnalysisContext {
    CURRENT_CONTEXT
        .try_with(|ctx| ctx.try_borrow().map(|c| c.clone()).unwrap_or_default())
        .unwrap_or_default()
}

#[must_use]
pub fn get_progress() -> (usize, usize) {
    (
        FILES_PROCESSED.load(Ordering::Relaxed),
        FILES_TOTAL.load(Ordering::Relaxed),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_guard_restores_previous() {
        let _phase = set_phase(AnalysisPhase::Analysis);
        {
            let _file = set_current_file("src/lib.rs");
            let ctx = get_current_context();
            assert_eq!(ctx.phase, Some(AnalysisPhase::Analysis));
            assert_eq!(ctx.current_file, Some(PathBuf::from("src/lib.rs")));
        }
        let ctx = get_current_context();
        assert_eq!(ctx.phase, Some(AnalysisPhase::Analysis));
        assert_eq!(ctx.current_file, None);
    }

    #[test]
    fn test_context_is_per_thread() {
        let _file = set_current_file("main.rs");
        let other = std::thread::spawn(get_current_context).join().unwrap();
        assert_eq!(other.current_file, None);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(AnalysisPhase::FileDiscovery.to_string(), "file_discovery");
    }
}
