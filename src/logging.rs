//! Pretty-printing messages to the console
//!
//! This is for human-facing diagnostics only. The handful of stdout
//! strings the CLI contract pins down exactly (`Parser error on line
//! N: ...`, `Assembler error: ...`, `All ok`, the `.dataSize` widening
//! warning) are printed as plain text elsewhere so they stay
//! machine-checkable; colored output is reserved for messages no one
//! greps for.

use colored::Colorize;

/// Pretty-print an error message to the console
pub fn error(error_message: String) {
    let error_title = "error:".red().bold();
    eprintln!("{} {}", error_title, error_message);
}
