//! Consumes the lexed token stream and builds the data section, code
//! section, and the two label maps, tracking the active section the
//! way the original tool's `ParseMode` does.

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::sync::OnceLock;

use regex::Regex;

use super::isa::{self, Width};
use super::lexer::Lexer;

/// A register argument: `(register_id, reference_width)`. When
/// `width` is `None` the argument is a register value; otherwise it
/// denotes `width[r<id>]`, an indirect memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterArg {
    pub id: u8,
    pub width: Option<Width>,
}

/// One decoded instruction argument. `Constant` and `Label` keep the
/// source text verbatim; both are resolved at emit time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
    Register(RegisterArg),
    Constant(String),
    Label(String),
}

/// A single parsed instruction: mnemonic plus its decoded arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub mnemonic: String,
    pub args: Vec<Argument>,
}

/// The parser's output: everything the emitter needs, read-only.
#[derive(Debug, Clone, Default)]
pub struct ParsedProgram {
    pub data_size: Option<u64>,
    pub data_section: Vec<u8>,
    pub data_labels: HashMap<String, u32>,
    pub code_section: Vec<Instruction>,
    pub code_labels: HashMap<String, usize>,
}

/// A fatal parse error, tagged with the 1-based source line it occurred on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: usize,
    pub kind: ParseErrorKind,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    BadToken,
    DoubleDataSize,
    DuplicatedLabel,
    LabelOutsideSection,
    BadOpcode { mnemonic: String },
    BadArgumentCount,
    BadRegister { token: String },
    BadRegisterTooBig,
    BadDataByte,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::BadToken => write!(f, "Bad token"),
            ParseErrorKind::DoubleDataSize => write!(f, "Double data size spotted"),
            ParseErrorKind::DuplicatedLabel => write!(f, "Duplicated label"),
            ParseErrorKind::LabelOutsideSection => write!(f, "Bad label"),
            ParseErrorKind::BadOpcode { mnemonic } => write!(f, "Bad opcode [{mnemonic}]"),
            ParseErrorKind::BadArgumentCount => write!(f, "Bad opcode argument count"),
            ParseErrorKind::BadRegister { token } => {
                write!(f, "Bad register argument type [{token}]")
            }
            ParseErrorKind::BadRegisterTooBig => write!(f, "Bad register argument type (too big)"),
            ParseErrorKind::BadDataByte => write!(f, "Bad value in line"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Data,
    Code,
}

/// Consumes a lexed source stream, accumulating parser state as it goes.
pub struct Parser {
    section: Option<Section>,
    data_size: Option<u64>,
    data_section: Vec<u8>,
    data_labels: HashMap<String, u32>,
    code_section: Vec<Instruction>,
    code_labels: HashMap<String, usize>,
    last_parsed_line_no: usize,
}

impl Parser {
    pub fn new() -> Self {
        Parser {
            section: None,
            data_size: None,
            data_section: Vec::new(),
            data_labels: HashMap::new(),
            code_section: Vec::new(),
            code_labels: HashMap::new(),
            last_parsed_line_no: 0,
        }
    }

    /// The line number of the last line analysed, the way `compiler.py`'s
    /// `main` reads `parser.last_parsed_line_no` after `analyse()` raises:
    /// used by the driver to report where parsing stopped when the
    /// failure is an I/O error rather than a `ParseError` (which already
    /// carries its own line).
    pub fn last_parsed_line_no(&self) -> usize {
        self.last_parsed_line_no
    }

    /// Run the lexer over `reader` and populate this parser's state.
    /// I/O errors propagate unwrapped; parse errors are returned tagged
    /// with the offending line.
    pub fn analyse<R: Read>(&mut self, reader: R) -> Result<(), ParseOutcome> {
        for lexed in Lexer::new(reader) {
            let lexed = lexed.map_err(ParseOutcome::Io)?;
            self.last_parsed_line_no = lexed.line_number;

            self.parse_line(&lexed.tokens).map_err(|kind| {
                ParseOutcome::Parse(ParseError { line: lexed.line_number, kind })
            })?;
        }
        Ok(())
    }

    /// Consume the parser, yielding its accumulated program. `data_size`
    /// is widened to the actual data length by the emitter, not here.
    pub fn into_program(self) -> ParsedProgram {
        ParsedProgram {
            data_size: self.data_size,
            data_section: self.data_section,
            data_labels: self.data_labels,
            code_section: self.code_section,
            code_labels: self.code_labels,
        }
    }

    fn parse_line(&mut self, tokens: &[String]) -> Result<(), ParseErrorKind> {
        if tokens[0].starts_with('.') {
            self.parse_directive(tokens)
        } else if tokens.len() == 1 && tokens[0].ends_with(':') {
            self.parse_label(&tokens[0])
        } else {
            match self.section {
                Some(Section::Code) => self.parse_instruction(tokens),
                Some(Section::Data) => self.parse_data(tokens),
                None => Err(ParseErrorKind::BadToken),
            }
        }
    }

    fn parse_directive(&mut self, tokens: &[String]) -> Result<(), ParseErrorKind> {
        match tokens[0].as_str() {
            ".dataSize" => {
                if self.data_size.is_some() {
                    return Err(ParseErrorKind::DoubleDataSize);
                }
                let n = tokens.get(1).ok_or(ParseErrorKind::BadToken)?;
                self.data_size = Some(n.parse().map_err(|_| ParseErrorKind::BadToken)?);
                Ok(())
            }
            ".code" => {
                self.section = Some(Section::Code);
                Ok(())
            }
            ".data" => {
                self.section = Some(Section::Data);
                Ok(())
            }
            _ => Err(ParseErrorKind::BadToken),
        }
    }

    fn parse_label(&mut self, token: &str) -> Result<(), ParseErrorKind> {
        let name = token.trim_end_matches(':').to_string();
        match self.section {
            Some(Section::Code) => {
                if self.code_labels.contains_key(&name) {
                    return Err(ParseErrorKind::DuplicatedLabel);
                }
                self.code_labels.insert(name, self.code_section.len());
                Ok(())
            }
            Some(Section::Data) => {
                if self.data_labels.contains_key(&name) {
                    return Err(ParseErrorKind::DuplicatedLabel);
                }
                self.data_labels.insert(name, self.data_section.len() as u32);
                Ok(())
            }
            None => Err(ParseErrorKind::LabelOutsideSection),
        }
    }

    fn parse_instruction(&mut self, tokens: &[String]) -> Result<(), ParseErrorKind> {
        let mnemonic = tokens[0].clone();
        let spec = isa::lookup(&mnemonic)
            .ok_or_else(|| ParseErrorKind::BadOpcode { mnemonic: mnemonic.clone() })?;

        let arg_strs = split_argument_list(&tokens[1..]);
        if arg_strs.len() != spec.args.len() {
            return Err(ParseErrorKind::BadArgumentCount);
        }

        let mut args = Vec::with_capacity(arg_strs.len());
        for (kind, raw) in spec.args.iter().zip(arg_strs.iter()) {
            args.push(match kind {
                isa::ArgKind::R => Argument::Register(parse_register(raw)?),
                isa::ArgKind::C => Argument::Constant(raw.clone()),
                isa::ArgKind::L => Argument::Label(raw.clone()),
            });
        }

        self.code_section.push(Instruction { mnemonic, args });
        Ok(())
    }

    fn parse_data(&mut self, tokens: &[String]) -> Result<(), ParseErrorKind> {
        for token in tokens {
            let value =
                u32::from_str_radix(token, 16).map_err(|_| ParseErrorKind::BadDataByte)?;
            if value > 255 {
                return Err(ParseErrorKind::BadDataByte);
            }
            self.data_section.push(value as u8);
        }
        Ok(())
    }
}

impl Default for Parser {
    fn default() -> Self {
        Parser::new()
    }
}

/// Everything `Parser::analyse` can fail with: an I/O error bubbled up
/// unwrapped, or a `ParseError` tagged with its source line.
#[derive(Debug)]
pub enum ParseOutcome {
    Io(std::io::Error),
    Parse(ParseError),
}

fn split_argument_list(rest: &[String]) -> Vec<String> {
    if rest.is_empty() {
        return Vec::new();
    }
    static COMMA: OnceLock<Regex> = OnceLock::new();
    let re = COMMA.get_or_init(|| Regex::new(r"\s*,\s*").unwrap());
    re.split(&rest.join(" ")).map(str::to_string).collect()
}

fn register_patterns() -> (&'static Regex, &'static Regex) {
    static VALUE: OnceLock<Regex> = OnceLock::new();
    static REFERENCE: OnceLock<Regex> = OnceLock::new();
    (
        VALUE.get_or_init(|| Regex::new(r"^r(?P<id>[0-9]+)").unwrap()),
        REFERENCE.get_or_init(|| {
            Regex::new(r"^(?P<width>byte|word|dword|qword)\s*\[\s*r(?P<id>[0-9]+)\s*\]").unwrap()
        }),
    )
}

fn parse_register(raw: &str) -> Result<RegisterArg, ParseErrorKind> {
    let raw = raw.trim();
    let (value_re, reference_re) = register_patterns();

    let (id_str, width) = if let Some(caps) = reference_re.captures(raw) {
        (caps["id"].to_string(), Width::from_name(&caps["width"]))
    } else if let Some(caps) = value_re.captures(raw) {
        (caps["id"].to_string(), None)
    } else {
        return Err(ParseErrorKind::BadRegister { token: raw.to_string() });
    };

    let id: u32 = id_str
        .parse()
        .map_err(|_| ParseErrorKind::BadRegister { token: raw.to_string() })?;
    if id > 16 {
        return Err(ParseErrorKind::BadRegisterTooBig);
    }

    Ok(RegisterArg { id: id as u8, width })
}
