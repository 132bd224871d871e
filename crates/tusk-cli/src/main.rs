//! Command-line front-end: evaluate a file or inline code, print the
//! accumulated output, and mirror the script's outcome in the process exit
//! status.

use std::io::Write as _;
use std::process::ExitCode;

use tusk::{FatalError, Interpreter};

const USAGE: &str = "Usage: tusk <file.php>\n       tusk -r '<code>'\n       tusk --version";

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut interp = Interpreter::new();

    let result = match args.first().map(String::as_str) {
        None | Some("-h" | "--help") => {
            eprintln!("{USAGE}");
            return ExitCode::from(if args.is_empty() { 2 } else { 0 });
        }
        Some("--version" | "-v") => {
            println!("tusk {} (PHP 8 dialect)", env!("CARGO_PKG_VERSION"));
            return ExitCode::SUCCESS;
        }
        Some("-r") => match args.get(1) {
            Some(code) => interp.eval(&format!("<?php {code}")),
            None => {
                eprintln!("{USAGE}");
                return ExitCode::from(2);
            }
        },
        Some(path) => interp.eval_file(path),
    };

    interp.shutdown();
    let output = interp.take_output();
    let mut stdout = std::io::stdout().lock();
    let _ = stdout.write_all(&output);
    let _ = stdout.flush();

    match result {
        Ok(_) => match interp.exit_status() {
            Some(status) => ExitCode::from((status & 0xFF) as u8),
            None => ExitCode::SUCCESS,
        },
        Err(FatalError::Parse(_)) => ExitCode::from(2),
        Err(FatalError::UncaughtThrow { .. }) => ExitCode::from(1),
    }
}
