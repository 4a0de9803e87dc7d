//! Speech synthesis engines.
//!
//! # Available Engines
//!
//! - `espeak` - espeak-ng command line, no timing
//! - `edge` - edge-tts command line, timing from its subtitle output
//! - `kokoro` - Kokoro TTS (ONNX format, espeak-ng required), timing from the
//!   model's duration output. Enable with the `kokoro` Cargo feature.

pub mod edge;
pub mod espeak;
#[cfg(feature = "kokoro")]
pub mod kokoro;

use std::io;
use std::path::Path;
use std::process::{Command, Output};

use crate::error::EngineError;

/// Run `<bin> --version` and map a missing binary to `DependencyMissing`.
pub(crate) fn check_binary(engine: &str, bin: &Path) -> Result<String, EngineError> {
    let output = Command::new(bin).arg("--version").output().map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            EngineError::missing(engine, format!("{} not found in PATH", bin.display()))
        } else {
            EngineError::missing(engine, format!("failed to run {}: {e}", bin.display()))
        }
    })?;

    if !output.status.success() {
        return Err(EngineError::missing(
            engine,
            format!("{} --version exited with {:?}", bin.display(), output.status.code()),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Turn a finished child process into a synthesis failure if it exited badly.
pub(crate) fn check_status(tool: &str, output: &Output) -> Result<(), EngineError> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(EngineError::SynthesisFailure(format!(
        "{tool} exited with code {:?}: {}",
        output.status.code(),
        stderr.trim()
    )))
}
