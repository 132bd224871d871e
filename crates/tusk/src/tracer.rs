//! Execution tracing hooks.
//!
//! The interpreter reports calls, includes and diagnostics through an
//! [`ExecTracer`]. The default is a no-op; [`StderrTracer`] prints events
//! for debugging embedded scripts. Hosts can install their own to collect
//! structured telemetry without touching the output buffer.

use crate::exception::DiagLevel;

pub trait ExecTracer {
    /// A user function, method or builtin is about to run.
    fn on_call(&mut self, name: &str) {
        let _ = name;
    }

    /// An `include`/`require` resolved to a path and is about to evaluate.
    fn on_include(&mut self, path: &str) {
        let _ = path;
    }

    /// A notice or warning was raised. Fires even when `@` suppresses the
    /// rendering into the output stream.
    fn on_diagnostic(&mut self, level: DiagLevel, message: &str, line: u32) {
        let _ = (level, message, line);
    }
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct NoopTracer;

impl ExecTracer for NoopTracer {}

/// Prints every event to stderr, one line each.
#[derive(Debug, Default)]
pub struct StderrTracer;

impl ExecTracer for StderrTracer {
    fn on_call(&mut self, name: &str) {
        eprintln!("call {name}");
    }

    fn on_include(&mut self, path: &str) {
        eprintln!("include {path}");
    }

    fn on_diagnostic(&mut self, level: DiagLevel, message: &str, line: u32) {
        eprintln!("{level}: {message} on line {line}");
    }
}

/// Records diagnostics for test assertions.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    pub calls: Vec<String>,
    pub diagnostics: Vec<(DiagLevel, String)>,
}

impl ExecTracer for RecordingTracer {
    fn on_call(&mut self, name: &str) {
        self.calls.push(name.to_owned());
    }

    fn on_diagnostic(&mut self, level: DiagLevel, message: &str, _line: u32) {
        self.diagnostics.push((level, message.to_owned()));
    }
}
