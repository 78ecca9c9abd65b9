//! The Rye compiler core.
//!
//! Pipeline: parse every source file, resolve classes and members into
//! the registry, check each method body building its CFG, run the
//! destruction-set and reference-count analyses, then emit one C++
//! translation unit and (in native mode) hand it to the host toolchain.
//!
//! Diagnostics never abort a pass; the driver reports success as exit
//! code zero even when diagnostics were printed, matching the reference
//! behavior of the tool this compiler descends from.

pub mod builder;
pub mod builtins;
pub mod cfg;
pub mod check;
pub mod destroy;
pub mod diagnostics;
pub mod emit;
pub mod flow;
pub mod hir;
pub mod refcount;
pub mod resolve;
pub mod sema;
pub mod types;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use diagnostics::DiagnosticSink;
use sema::Program;

/// Compilation options for the Rye compiler.
///
/// Mirrors the CLI one to one so the compiler can also be driven
/// programmatically (the tests do).
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// `.rye` source files.
    pub sources: Vec<String>,
    /// `.cpp` files passed through to the emitted include list.
    pub includes: Vec<String>,
    /// Arguments after the `-` separator; accepted for interface
    /// compatibility.
    pub program_args: Vec<String>,
    /// Compile to a native executable (`-c`).
    pub compile_native: bool,
    /// Debug build (`-d`).
    pub debug: bool,
    /// Error-test mode (`-e`).
    pub error_test: bool,
    /// Output basename (`-o`).
    pub out_name: Option<String>,
    /// Reference-count profiling hooks (`-p`).
    pub profile: bool,
    /// Pessimistic reference counting (`-r`).
    pub pessimistic: bool,
    /// Skip runtime reference-count checks (`-u`).
    pub unsafe_mode: bool,
    /// Print the toolchain invocation (`-v`).
    pub verbose: bool,
    /// Stop after emitting C++ (`--cpp`).
    pub emit_only: bool,
    /// Use the platform allocator (`--crt`).
    pub crt_alloc: bool,
    /// Print computed destruction sets (`--typeset`).
    pub print_typesets: bool,
}

/// What a compilation produced.
#[derive(Debug, Default)]
pub struct CompileOutcome {
    pub diagnostics: usize,
    /// Set in error-test mode: whether reported lines matched the markers.
    pub error_test_passed: Option<bool>,
    pub cpp_path: Option<PathBuf>,
    pub exe_path: Option<PathBuf>,
}

/// Runs the whole pipeline. Source-level diagnostics are printed and
/// counted, not returned as errors; `Err` is reserved for I/O and
/// toolchain failures.
pub fn compile(options: &CompileOptions) -> Result<CompileOutcome> {
    let mut outcome = CompileOutcome::default();
    let mut prog = Program::new();
    let sink = DiagnosticSink::new();

    // Parse.
    let mut modules = Vec::new();
    for src in &options.sources {
        let text = std::fs::read_to_string(src).with_context(|| format!("reading {}", src))?;
        let file = prog.add_file(src.clone(), text);
        match rye_parser::parse_module(&prog.files[file].text) {
            Ok(module) => modules.push((file, module)),
            Err(err) => {
                let line = prog.line_of(file, err.span.start);
                sink.report(src, line, err.message);
            }
        }
    }

    // Resolve and check.
    resolve::resolve_program(&mut prog, &modules, &sink);
    check::check_program(&prog, &sink);
    if prog.main.get().is_none() && !options.sources.is_empty() {
        sink.report(&options.sources[0], 1, "program has no static Main method");
    }

    // Analyses.
    refcount::analyze(&prog, options.pessimistic);
    if options.print_typesets {
        print_typesets(&prog);
    }

    // Error-test mode: diff reported lines against `// error` markers.
    if options.error_test {
        let mut passed = true;
        for file in &prog.files {
            let expected = diagnostics::expected_error_lines(&file.text);
            let reported = sink.lines_for(&file.path);
            passed &= diagnostics::error_test_report(&file.path, &expected, &reported);
        }
        outcome.error_test_passed = Some(passed);
        outcome.diagnostics = sink.count();
        return Ok(outcome);
    }

    outcome.diagnostics = sink.count();
    if !sink.is_empty() {
        return Ok(outcome);
    }

    // Emission happens for `-c` and `--cpp`; otherwise the run was a
    // front-end check.
    if !options.compile_native && !options.emit_only {
        return Ok(outcome);
    }

    let out_base = match &options.out_name {
        Some(name) => name.clone(),
        None => default_out_name(&options.sources),
    };
    let emit_opts = emit::EmitOptions {
        safe: !options.unsafe_mode,
        debug: options.debug,
        profile: options.profile,
        crt_alloc: options.crt_alloc,
        includes: options.includes.clone(),
    };
    let cpp = emit::emit_program(&prog, &emit_opts);
    let cpp_path = PathBuf::from(format!("{}.cpp", out_base));
    std::fs::write(&cpp_path, cpp).with_context(|| format!("writing {}", cpp_path.display()))?;
    outcome.cpp_path = Some(cpp_path.clone());

    if options.emit_only {
        return Ok(outcome);
    }

    let exe_path = PathBuf::from(&out_base);
    builder::compile_native(
        &cpp_path,
        &exe_path,
        &builder::BuildOptions {
            debug: options.debug,
            verbose: options.verbose,
        },
    )?;
    outcome.exe_path = Some(exe_path);

    // The .cpp file is a transient artifact of native builds.
    let _ = std::fs::remove_file(&cpp_path);
    outcome.cpp_path = None;

    Ok(outcome)
}

fn default_out_name(sources: &[String]) -> String {
    sources
        .first()
        .map(|s| {
            Path::new(s)
                .file_stem()
                .and_then(|n| n.to_str())
                .unwrap_or("out")
                .to_string()
        })
        .unwrap_or_else(|| "out".to_string())
}

/// `--typeset`: prints the computed destruction sets per class and per
/// method.
fn print_typesets(prog: &Program) {
    for class in &prog.classes {
        if class.is_extern {
            continue;
        }
        let set = destroy::type_destroys(prog, class.id);
        println!("class {}: {}", class.name, set.display(prog));
        for &mid in &class.methods {
            let method = prog.method(mid);
            if method.cfg.borrow().is_none() {
                continue;
            }
            let set = destroy::method_destroys(prog, mid);
            println!("  {}.{}: {}", class.name, method.name, set.display(prog));
        }
    }
}
