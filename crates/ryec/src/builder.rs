//! Host C++ toolchain invocation.
//!
//! The emitted translation unit is handed to the system C++ compiler.
//! Stderr is captured to a temp file and surfaced verbatim on failure;
//! `-v` prints the exact command line before running it.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Settings for the native build step.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Disable optimization and keep debug info (`-d`).
    pub debug: bool,
    /// Print the toolchain invocation (`-v`).
    pub verbose: bool,
}

/// Directory holding `rye_runtime.h`. Overridable for odd layouts; the
/// default expects the bundled `runtime/` directory next to the compiler
/// or the current directory.
pub fn runtime_include_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("RYE_RUNTIME_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("runtime");
            if candidate.join("rye_runtime.h").exists() {
                return candidate;
            }
        }
    }
    PathBuf::from("runtime")
}

/// Compiles `cpp_path` into the executable `out_path`.
pub fn compile_native(cpp_path: &Path, out_path: &Path, opts: &BuildOptions) -> Result<()> {
    let cxx = std::env::var("RYE_CXX").unwrap_or_else(|_| "c++".to_string());
    let include_dir = runtime_include_dir();

    let mut cmd = Command::new(&cxx);
    cmd.arg("-std=c++14");
    if opts.debug {
        cmd.arg("-g").arg("-O0");
    } else {
        cmd.arg("-O2");
    }
    cmd.arg("-I").arg(&include_dir);
    cmd.arg("-o").arg(out_path);
    cmd.arg(cpp_path);

    if opts.verbose {
        eprintln!("{:?}", cmd);
    }

    let capture = tempfile::NamedTempFile::new().context("creating stderr capture file")?;
    let status = cmd
        .stderr(capture.reopen().context("reopening stderr capture")?)
        .status()
        .with_context(|| format!("running `{}`", cxx))?;

    if !status.success() {
        let mut text = String::new();
        let _ = capture.reopen().and_then(|mut f| f.read_to_string(&mut text));
        anyhow::bail!("C++ compilation failed:\n{}", text);
    }
    Ok(())
}
