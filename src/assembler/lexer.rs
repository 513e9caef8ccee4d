//! Turns a source file into a lazy sequence of `(line_number, raw_line,
//! tokens)`, the way `chip8vm`'s `preprocess`/`first_pass` walk
//! `source.lines()`, except here the stream is driven straight off a
//! `BufRead` so the input file handle stays scoped to the parse and is
//! never buffered into one giant `String`.

use std::io::{self, BufRead, BufReader, Lines, Read};

/// One non-empty, comment-stripped, tokenized line of source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexedLine {
    /// 1-based line number, preserved for error reporting.
    pub line_number: usize,
    /// The raw source line, comments and all.
    pub raw_line: String,
    /// Whitespace-separated tokens with the comment stripped.
    pub tokens: Vec<String>,
}

/// Lexes a source reader line by line. Purely lexical: it does not
/// interpret tokens, only strips comments and whitespace-splits.
pub struct Lexer<R> {
    lines: Lines<BufReader<R>>,
    line_number: usize,
}

impl<R: Read> Lexer<R> {
    pub fn new(reader: R) -> Self {
        Lexer { lines: BufReader::new(reader).lines(), line_number: 0 }
    }
}

impl<R: Read> Iterator for Lexer<R> {
    type Item = io::Result<LexedLine>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let raw_line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => return Some(Err(err)),
            };
            self.line_number += 1;

            let tokens = tokenize(&raw_line);
            if tokens.is_empty() {
                continue;
            }

            return Some(Ok(LexedLine { line_number: self.line_number, raw_line, tokens }));
        }
    }
}

fn tokenize(line: &str) -> Vec<String> {
    let without_comment = match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    };
    without_comment.split_whitespace().map(str::to_string).collect()
}
