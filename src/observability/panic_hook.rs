//! Crash reports for `jsguard`.
//!
//! An analyzer panic is a bug in `jsguard`, never a finding. The report
//! names the phase and the file being analyzed so it can be reproduced
//! with that one file.

use super::context::{get_current_context, get_progress, AnalysisContext};
use crate::catch;
use std::panic::PanicHookInfo;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Installs the crash report hook. Panics recovered by
/// [`catch::attempt`] are not reported.
pub fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if catch::in_recovery_scope() {
            previous(info);
        } else {
            print_crash_report(info);
        }
    }));
}

fn print_crash_report(info: &PanicHookInfo<'_>) {
    let context = get_current_context();
    let (processed, total) = get_progress();
    eprintln!();
    eprintln!("jsguard {VERSION} crashed");
    eprintln!("  panic: {}", extract_panic_message(info));
    if let Some(location) = info.location() {
        eprintln!(
            "  location: {}:{}:{}",
            location.file(),
            location.line(),
            location.column()
        );
    }
    print_context(&context, processed, total);
    if std::env::var("RUST_BACKTRACE").is_ok() {
        eprintln!("{}", std::backtrace::Backtrace::capture());
    } else {
        eprintln!("  run with RUST_BACKTRACE=1 for a stack trace");
    }
}

fn print_context(context: &AnalysisContext, processed: usize, total: usize) {
    match &context.phase {
        Some(phase) => eprintln!("  phase: {phase}"),
        None => eprintln!("  phase: (not set)"),
    }
    if let Some(file) = &context.current_file {
        eprintln!("  file: {}", file.display());
    }
    if total > 0 {
        eprintln!("  progress: {processed} / {total} files");
    }
}

fn extract_panic_message(info: &PanicHookInfo<'_>) -> String {
    if let Some(s) = info.payload().downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = info.payload().downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
