#![doc = include_str!("../../../README.md")]

mod ast;
mod builtins;
mod exception;
mod globals;
mod heap;
mod interp;
mod lexer;
mod output;
mod parse;
mod scope;
mod token;
mod tracer;
mod types;
mod value;

pub use crate::{
    ast::{Expr, ExprKind, Program, Stmt, StmtKind},
    exception::{DiagLevel, ErrorKind, FatalError, RunResult, Signal},
    heap::ObjectId,
    interp::{Interpreter, RequestContext},
    lexer::{Lexer, tokenize},
    parse::{ParseError, parse},
    token::{Pos, Token, TokenKind},
    tracer::{ExecTracer, NoopTracer, RecordingTracer, StderrTracer},
    types::{ArrayKey, PhpArray},
    value::{Value, php_float_to_string},
};
