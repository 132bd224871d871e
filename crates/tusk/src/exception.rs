//! Non-local control flow and the native error taxonomy.
//!
//! Every evaluator function returns `RunResult<Value>`; the `Err` channel
//! carries a [`Signal`], the distinguished values that unwind interpret
//! frames: `return`, `break`/`continue` with levels, `goto`, thrown
//! exceptions and `exit`. Each signal is consumed at exactly one level and
//! none of them escapes the interpreter's public entry points.

use strum::{Display, EnumString, IntoStaticStr};

use crate::{parse::ParseError, value::Value};

/// Result alias used throughout the evaluator.
pub type RunResult<T> = Result<T, Signal>;

/// Non-local transfer propagating up through interpret frames.
#[derive(Debug, Clone)]
pub enum Signal {
    Return(Value),
    /// `break n`; loops decrement the level and re-raise while it is > 1.
    Break(u32),
    Continue(u32),
    /// `goto label`; consumed by the statement list that declares the label.
    Goto(String),
    Throw(Thrown),
    /// `exit`/`die` with its status code. Finally blocks still run.
    Exit(i32),
}

/// An in-flight exception: the throwable object plus its class name for
/// rendering without a heap lookup.
#[derive(Debug, Clone)]
pub struct Thrown {
    pub value: Value,
    pub class_name: String,
}

/// Engine-raised throwable classes.
///
/// Each variant names the class the corresponding object is constructed
/// from; the bootstrap class hierarchy defines them all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum ErrorKind {
    Error,
    TypeError,
    ValueError,
    ArgumentCountError,
    ArithmeticError,
    DivisionByZeroError,
    UnhandledMatchError,
    RuntimeException,
}

/// Diagnostic severities that render into the output stream rather than
/// unwinding. `@` suppresses these and only these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum DiagLevel {
    Notice,
    Warning,
    #[strum(serialize = "Deprecated")]
    Deprecated,
}

/// What the embedding host sees when evaluation cannot produce a value.
#[derive(Debug, Clone)]
pub enum FatalError {
    /// Source failed to parse; execution of the file never began.
    Parse(ParseError),
    /// A throwable reached the top of the stack uncaught.
    UncaughtThrow { class_name: String, message: String },
}

impl std::fmt::Display for FatalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "{err}"),
            Self::UncaughtThrow { class_name, message } => {
                write!(f, "Uncaught {class_name}: {message}")
            }
        }
    }
}

impl std::error::Error for FatalError {}
