//! Shared helpers for the compiler integration tests: run the front end
//! over an in-memory source and hand back the registry plus collected
//! diagnostics, or the emitted C++ text.

use ryec::diagnostics::{self, Diagnostic, DiagnosticSink};
use ryec::emit::{self, EmitOptions};
use ryec::sema::Program;
use ryec::{check, refcount, resolve};

/// Parses, resolves, checks, and analyzes `src` as a single file.
pub fn front_end(src: &str) -> (Program, Vec<Diagnostic>) {
    front_end_with(src, false)
}

pub fn front_end_with(src: &str, pessimistic: bool) -> (Program, Vec<Diagnostic>) {
    let _guard = diagnostics::suppress();
    let mut prog = Program::new();
    let sink = DiagnosticSink::new();
    let file = prog.add_file("test.rye".into(), src.into());
    match rye_parser::parse_module(src) {
        Ok(module) => {
            resolve::resolve_program(&mut prog, &[(file, module)], &sink);
            check::check_program(&prog, &sink);
            refcount::analyze(&prog, pessimistic);
        }
        Err(err) => {
            let line = prog.line_of(file, err.span.start);
            sink.report("test.rye", line, err.message);
        }
    }
    (prog, sink.take_all())
}

/// Front end plus emission; panics if the source has diagnostics.
pub fn emit(src: &str) -> String {
    let (prog, diags) = front_end(src);
    assert!(diags.is_empty(), "unexpected diagnostics: {:?}", diags);
    emit::emit_program(
        &prog,
        &EmitOptions {
            safe: true,
            debug: false,
            profile: false,
            crt_alloc: false,
            includes: Vec::new(),
        },
    )
}

/// Diagnostics whose message contains `needle`.
pub fn diags_containing<'a>(diags: &'a [Diagnostic], needle: &str) -> Vec<&'a Diagnostic> {
    diags.iter().filter(|d| d.message.contains(needle)).collect()
}
