//! Static check for raw calls that bypass the recovery boundary.
//!
//! Every call into [`crate::raw`] that can panic must run inside
//! [`crate::catch::attempt`] (or go through the wrapper layer, which does
//! that). This module finds the ones that don't. It reads source text only;
//! nothing is compiled or executed.
//!
//! Each file moves through three states:
//!
//! - `NotFound`: `use` trees and paths are scanned for the raw module.
//!   A file that never names it goes straight to `Done` without any type
//!   resolution.
//! - `Scanning`: every call is classified. `binding::op(...)` is checked by
//!   name, `recv.op(...)` by the static type of `recv`, and both go through
//!   the same [`allowlist`].
//! - `Done`: diagnostics are final.
//!
//! ```rust
//! use safejs::guard::{analyze_source, GuardOptions};
//! use std::path::Path;
//!
//! let source = "use safejs::raw as js;\nfn f() { js::value_of(1); }";
//! let report = analyze_source(Path::new("f.rs"), source, &GuardOptions::default()).unwrap();
//! assert_eq!(
//!     report.diagnostics[0].to_string(),
//!     "f.rs:2:10: unsafe call to safejs::raw found: js::value_of(...)"
//! );
//! ```

pub mod allowlist;
mod diagnostic;
mod error;
mod imports;
mod source;
mod type_tracker;
mod visitor;

pub use allowlist::{is_safe, Allowlist, RAW_PATH};
pub use diagnostic::{Category, Diagnostic};
pub use error::GuardError;

use crate::observability::{increment_processed, set_current_file};
use imports::RawImports;
use rayon::prelude::*;
use serde::Serialize;
use source::SourceMap;
use std::path::{Path, PathBuf};
use syn::visit::Visit;
use type_tracker::TypeTracker;
use visitor::CallVisitor;

/// Recovery boundary functions recognized by default.
pub const RECOVERY_FUNCTIONS: [&str; 2] = ["attempt", "attempt_side_effect"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardOptions {
    /// Canonical paths of raw modules to check calls into.
    pub unsafe_paths: Vec<String>,
    /// Names of the recovery boundary functions in the sibling `catch`
    /// module.
    pub recovery_functions: Vec<String>,
    /// Report calls even inside recovery closures.
    pub strict: bool,
}

impl Default for GuardOptions {
    fn default() -> Self {
        Self {
            unsafe_paths: vec![RAW_PATH.to_string()],
            recovery_functions: RECOVERY_FUNCTIONS.iter().map(|f| f.to_string()).collect(),
            strict: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisState {
    NotFound,
    Scanning,
    Done,
}

/// Outcome of analyzing one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub diagnostics: Vec<Diagnostic>,
    /// False when the file never mentions a raw module and was skipped.
    pub scanned: bool,
}

/// Per-file analyzer.
pub struct Analyzer<'a> {
    path: &'a Path,
    source: &'a str,
    options: &'a GuardOptions,
    state: AnalysisState,
    scanned: bool,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Analyzer<'a> {
    pub fn new(path: &'a Path, source: &'a str, options: &'a GuardOptions) -> Self {
        Self {
            path,
            source,
            options,
            state: AnalysisState::NotFound,
            scanned: false,
            diagnostics: Vec::new(),
        }
    }

    pub fn state(&self) -> AnalysisState {
        self.state
    }

    fn transition(&mut self, next: AnalysisState) {
        tracing::trace!(
            path = %self.path.display(),
            from = ?self.state,
            to = ?next,
            "analyzer state"
        );
        self.state = next;
    }

    pub fn run(&mut self, file: &syn::File) {
        let map = SourceMap::new(self.source);
        for raw_path in &self.options.unsafe_paths {
            self.transition(AnalysisState::NotFound);
            let imports = RawImports::collect(file, raw_path, &self.options.recovery_functions);
            if !imports.is_active() {
                continue;
            }
            self.transition(AnalysisState::Scanning);
            self.scanned = true;

            let mut tracker = TypeTracker::new(&imports);
            tracker.index_items(&file.items);
            let mut visitor =
                CallVisitor::new(self.path, &imports, &map, tracker, self.options.strict);
            visitor.visit_file(file);
            self.diagnostics.extend(visitor.into_diagnostics());
        }
        if self.options.unsafe_paths.len() > 1 {
            self.diagnostics.sort_by_key(|d| (d.line, d.column));
        }
        self.transition(AnalysisState::Done);
    }

    pub fn finish(self) -> FileReport {
        FileReport {
            path: self.path.to_path_buf(),
            diagnostics: self.diagnostics,
            scanned: self.scanned,
        }
    }
}

/// Analyzes source text already in memory. `path` is only used for
/// reporting.
pub fn analyze_source(
    path: &Path,
    source: &str,
    options: &GuardOptions,
) -> Result<FileReport, GuardError> {
    let file = syn::parse_file(source).map_err(|err| GuardError::parse(path, &err))?;
    let mut analyzer = Analyzer::new(path, source, options);
    analyzer.run(&file);
    Ok(analyzer.finish())
}

pub fn analyze_file(path: &Path, options: &GuardOptions) -> Result<FileReport, GuardError> {
    let _span = tracing::debug_span!("analyze_file", path = %path.display()).entered();
    let _file = set_current_file(path);
    let source = std::fs::read_to_string(path).map_err(|source| GuardError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let report = analyze_source(path, &source, options)?;
    increment_processed();
    tracing::debug!(
        diagnostics = report.diagnostics.len(),
        scanned = report.scanned,
        "analyzed"
    );
    Ok(report)
}

/// Analyzes `files`, in parallel unless `parallel` is false. Reports come
/// back in the order of `files`; the first tool error aborts the run.
pub fn analyze_files(
    files: &[PathBuf],
    options: &GuardOptions,
    parallel: bool,
) -> Result<Vec<FileReport>, GuardError> {
    check_target_environment();
    if parallel {
        files
            .par_iter()
            .map(|path| analyze_file(path, options))
            .collect()
    } else {
        files
            .iter()
            .map(|path| analyze_file(path, options))
            .collect()
    }
}

/// Warns when `CARGO_BUILD_TARGET` does not name a wasm32 target. Code
/// behind `cfg(target_arch = "wasm32")` is analyzed either way, but a
/// non-wasm build usually means the raw calls under test never run.
pub fn check_target_environment() -> bool {
    match std::env::var("CARGO_BUILD_TARGET") {
        Ok(target) if target.starts_with("wasm32") => true,
        _ => {
            tracing::warn!("CARGO_BUILD_TARGET is not set to a wasm32 target, results may not match the deployed build");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn analyze(source: &str) -> FileReport {
        analyze_source(Path::new("foo.rs"), source, &GuardOptions::default()).unwrap()
    }

    #[test]
    fn test_state_machine_without_import() {
        let options = GuardOptions::default();
        let source = "fn main() { println!(\"hi\"); }";
        let file = syn::parse_file(source).unwrap();
        let mut analyzer = Analyzer::new(Path::new("a.rs"), source, &options);
        assert_eq!(analyzer.state(), AnalysisState::NotFound);
        analyzer.run(&file);
        assert_eq!(analyzer.state(), AnalysisState::Done);
        let report = analyzer.finish();
        assert!(!report.scanned);
        assert!(report.diagnostics.is_empty());
    }

    #[test]
    fn test_multiple_unsafe_calls_in_one_statement() {
        let report = analyze(indoc! {"
            use safejs::raw;
            fn f(a: raw::Value) {
                a.set(\"k\", raw::value_of(a.int()));
            }
        "});
        let messages: Vec<_> = report.diagnostics.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "unsafe method call on safejs::raw::Value found: a.set(...)",
                "unsafe call to safejs::raw found: raw::value_of(...)",
                "unsafe method call on safejs::raw::Value found: a.int(...)",
            ]
        );
    }

    #[test]
    fn test_custom_unsafe_path() {
        let options = GuardOptions {
            unsafe_paths: vec!["crate::raw".to_string()],
            ..GuardOptions::default()
        };
        let source = "use crate::raw;\nfn f() { raw::func_of(|_, _| raw::Native::Null); }";
        let report = analyze_source(Path::new("lib.rs"), source, &options).unwrap();
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(
            report.diagnostics[0].message,
            "unsafe call to crate::raw found: raw::func_of(...)"
        );
    }

    #[test]
    fn test_parse_error_is_a_tool_error() {
        let err = analyze_source(Path::new("bad.rs"), "fn (", &GuardOptions::default())
            .unwrap_err();
        assert!(matches!(err, GuardError::Parse { line: 1, .. }));
    }
}
