//! Diagnostic reporting for the Rye compiler.
//!
//! Rustc-style error lines on stderr, tied to a file and line. Diagnostics
//! are both printed as they are found and collected in a sink: checking
//! continues past a failed member so one run reports as much as possible,
//! and the error-test harness diffs the collected set against `// error`
//! markers in the source.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};

/// A source-location diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub file: String,
    pub line: u32,
    pub message: String,
}

/// Collects diagnostics for a compilation.
#[derive(Default)]
pub struct DiagnosticSink {
    diags: RefCell<Vec<Diagnostic>>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records and prints a diagnostic.
    pub fn report(&self, file: &str, line: u32, message: impl Into<String>) {
        let d = Diagnostic {
            file: file.to_string(),
            line,
            message: message.into(),
        };
        emit(&d);
        self.diags.borrow_mut().push(d);
    }

    /// Number of diagnostics reported so far.
    pub fn count(&self) -> usize {
        self.diags.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.diags.borrow().is_empty()
    }

    /// Snapshot of the collected diagnostics.
    pub fn take_all(&self) -> Vec<Diagnostic> {
        self.diags.borrow().clone()
    }

    /// Lines reported against the given file.
    pub fn lines_for(&self, file: &str) -> Vec<u32> {
        let mut lines: Vec<u32> = self
            .diags
            .borrow()
            .iter()
            .filter(|d| d.file == file)
            .map(|d| d.line)
            .collect();
        lines.sort_unstable();
        lines.dedup();
        lines
    }
}

/// Prints a diagnostic to stderr unless suppressed.
fn emit(d: &Diagnostic) {
    if !DIAGNOSTICS_ENABLED.load(Ordering::SeqCst) {
        return;
    }
    let red = "\x1b[31m";
    let reset = "\x1b[0m";
    eprintln!("{}error{}: {}", red, reset, d.message);
    eprintln!("  --> {}:{}", d.file, d.line);
}

static DIAGNOSTICS_ENABLED: AtomicBool = AtomicBool::new(true);

/// Temporarily suppresses diagnostic printing (the sink still collects).
/// Used by tests that assert on the collected set.
pub fn suppress() -> SuppressGuard {
    let prev = DIAGNOSTICS_ENABLED.swap(false, Ordering::SeqCst);
    SuppressGuard { prev }
}

/// RAII guard restoring diagnostic printing state.
pub struct SuppressGuard {
    prev: bool,
}

impl Drop for SuppressGuard {
    fn drop(&mut self) {
        DIAGNOSTICS_ENABLED.store(self.prev, Ordering::SeqCst);
    }
}

/// Lines of `source` tagged with a `// error` comment, 1-based. The tag
/// marks lines the error-test harness expects a diagnostic on.
pub fn expected_error_lines(source: &str) -> Vec<u32> {
    let mut lines = Vec::new();
    for (i, line) in source.lines().enumerate() {
        if line.contains("// error") {
            lines.push(i as u32 + 1);
        }
    }
    lines
}

/// Compares expected and reported lines for one file, printing a diff
/// report. Returns true when they match exactly.
pub fn error_test_report(file: &str, expected: &[u32], reported: &[u32]) -> bool {
    let missing: Vec<u32> = expected.iter().copied().filter(|l| !reported.contains(l)).collect();
    let unexpected: Vec<u32> = reported.iter().copied().filter(|l| !expected.contains(l)).collect();
    if missing.is_empty() && unexpected.is_empty() {
        eprintln!("{}: error test passed ({} expected errors)", file, expected.len());
        return true;
    }
    for l in &missing {
        eprintln!("{}:{}: expected an error here, none was reported", file, l);
    }
    for l in &unexpected {
        eprintln!("{}:{}: unexpected error reported", file, l);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_and_filters_lines() {
        let _guard = suppress();
        let sink = DiagnosticSink::new();
        sink.report("a.rye", 3, "first");
        sink.report("a.rye", 7, "second");
        sink.report("b.rye", 1, "other file");
        assert_eq!(sink.lines_for("a.rye"), vec![3, 7]);
        assert_eq!(sink.count(), 3);
    }

    #[test]
    fn finds_error_markers() {
        let src = "int x;\nPrint(x); // error\ny = 1; // error: detail\n";
        assert_eq!(expected_error_lines(src), vec![2, 3]);
    }

    #[test]
    fn error_test_diff() {
        let _guard = suppress();
        assert!(error_test_report("t.rye", &[2, 3], &[2, 3]));
        assert!(!error_test_report("t.rye", &[2], &[2, 5]));
    }
}
