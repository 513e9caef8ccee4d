//! Converts ESET-VM2 assembly source into a bit-packed binary image,
//! in a two-pass manner: [`parser`] resolves labels and builds the
//! in-memory program, and [`emitter`] walks it to produce the final
//! bytes, patching forward label references once every instruction's
//! offset is known.
//!
//! The source has two sections, `.data` and `.code`, switched with the
//! `.data`/`.code` directives; `.dataSize <N>` declares the data
//! segment's size (widened with a warning if the actual data is
//! bigger). Comments start with `#` and run to end of line. See the
//! opcode table in [`isa`] for the full instruction set.

pub mod emitter;
pub mod isa;
pub mod lexer;
pub mod parser;

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

pub use emitter::{AssembleError, Emitter, MAGIC};
pub use parser::{ParseError, ParseErrorKind, Parser};

/// Everything that can go wrong while assembling a file: I/O, a fatal
/// parse error, or a fatal assemble (emit-time) error.
#[derive(Debug)]
pub enum Error {
    /// `last_line` is the last line the parser reached before the I/O
    /// failure, the way `compiler.py`'s `main` reports
    /// `parser.last_parsed_line_no` alongside an unexpected failure;
    /// `None` when the failure happened before parsing started (opening
    /// the input file) or after it finished (writing the output file).
    Io { source: io::Error, last_line: Option<usize> },
    Parse(ParseError),
    Assemble(AssembleError),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Io { source: err, last_line: None }
    }
}

impl From<AssembleError> for Error {
    fn from(err: AssembleError) -> Error {
        Error::Assemble(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io { source, last_line: Some(line) } => {
                write!(f, "I/O error after line {line}: {source}")
            }
            Error::Io { source, last_line: None } => write!(f, "{source}"),
            Error::Parse(err) => write!(f, "Parser error on line {}: {}", err.line, err.kind),
            Error::Assemble(err) => write!(f, "Assembler error: {err}"),
        }
    }
}

impl std::error::Error for Error {}

/// Assemble a file on disk into a binary image and write it to `output_path`.
pub fn assemble_file(input_path: &Path, output_path: &Path) -> Result<(), Error> {
    let image = assemble_path(input_path)?;
    fs::write(output_path, image)?;
    Ok(())
}

/// Assemble a file on disk into a binary image held in memory.
pub fn assemble_path(input_path: &Path) -> Result<Vec<u8>, Error> {
    let file = fs::File::open(input_path)?;
    let mut parser = Parser::new();
    run_parser(&mut parser, file)?;
    let program = parser.into_program();
    Ok(Emitter::new(&program).build()?)
}

/// Assemble source text into a binary image held in memory.
pub fn assemble(source: &str) -> Result<Vec<u8>, Error> {
    let mut parser = Parser::new();
    run_parser(&mut parser, source.as_bytes())?;
    let program = parser.into_program();
    Ok(Emitter::new(&program).build()?)
}

/// Runs `parser.analyse`, enriching an I/O failure with the line the
/// parser had reached, since the parser itself is about to be consumed.
fn run_parser<R: io::Read>(parser: &mut Parser, reader: R) -> Result<(), Error> {
    parser.analyse(reader).map_err(|outcome| match outcome {
        parser::ParseOutcome::Io(source) => {
            Error::Io { source, last_line: Some(parser.last_parsed_line_no()) }
        }
        parser::ParseOutcome::Parse(err) => Error::Parse(err),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn minimal_halt_program_has_magic_and_header() {
        let image = assemble(".code\nhlt\n").unwrap();
        assert_eq!(&image[0..8], MAGIC);
    }

    #[test]
    fn parser_error_message_matches_the_required_format() {
        let err = assemble(".code\nlbl:\nhlt\nlbl:\nhlt\n").unwrap_err();
        assert_eq!(err.to_string(), "Parser error on line 4: Duplicated label");
    }

    #[test]
    fn assembler_error_message_matches_the_required_format() {
        let err = assemble(".code\njump nowhere\n").unwrap_err();
        assert_eq!(err.to_string(), "Assembler error: Undefined code label nowhere");
    }
}
