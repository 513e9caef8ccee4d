//! Walks the parsed instruction list, emits a bit-accurate binary per
//! the fixed encoding table, resolves label references to byte
//! offsets (patching forward references once every instruction's
//! offset is known), and writes out the final image with its header.

use std::fmt;

use super::isa;
use super::parser::{Argument, ParsedProgram};

/// Magic bytes written at the start of every assembled image.
pub const MAGIC: &[u8; 8] = b"ESET-VM2";

/// A fatal error encountered while resolving or encoding the parsed
/// program. The only case the language spec names is an undefined
/// code label; a malformed constant literal is the emitter's own
/// addition, since numeric parsing is deferred to this stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssembleError {
    UndefinedLabel(String),
    BadConstant(String),
}

impl fmt::Display for AssembleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssembleError::UndefinedLabel(name) => write!(f, "Undefined code label {name}"),
            AssembleError::BadConstant(raw) => write!(f, "Bad constant literal [{raw}]"),
        }
    }
}

impl std::error::Error for AssembleError {}

/// An append-only sequence of bits, packed MSB-first into output bytes:
/// the first bit appended becomes the most-significant bit of its byte.
#[derive(Debug, Default)]
struct BitBuffer {
    bits: Vec<bool>,
}

impl BitBuffer {
    fn len(&self) -> usize {
        self.bits.len()
    }

    /// Emit a literal `'0'`/`'1'` bit string verbatim, in the order written.
    fn push_verbatim(&mut self, bits: &str) {
        self.bits.extend(bits.chars().map(|c| c == '1'));
    }

    /// Emit `value`'s low `width` bits least-significant-bit first,
    /// the natural binary representation, reversed.
    fn push_lsb_first(&mut self, value: u64, width: u32) {
        for i in 0..width {
            self.bits.push((value >> i) & 1 == 1);
        }
    }

    /// Overwrite `width` bits starting at `pos`, LSB-first, used to
    /// patch in a forward label reference once its target is known.
    fn patch_lsb_first(&mut self, pos: usize, value: u32, width: u32) {
        for i in 0..width {
            self.bits[pos + i as usize] = (value >> i) & 1 == 1;
        }
    }

    fn pad_to_byte(&mut self) {
        while self.bits.len() % 8 != 0 {
            self.bits.push(false);
        }
    }

    fn into_bytes(self) -> Vec<u8> {
        debug_assert_eq!(self.bits.len() % 8, 0);
        self.bits
            .chunks(8)
            .map(|chunk| {
                chunk.iter().enumerate().fold(0u8, |byte, (i, &bit)| {
                    if bit { byte | (1 << (7 - i)) } else { byte }
                })
            })
            .collect()
    }
}

/// A deferred overwrite: the bit position of a 32-bit placeholder and
/// the code-section index whose eventual byte offset belongs there.
struct Patch {
    bit_position: usize,
    target_index: usize,
}

pub struct Emitter<'p> {
    program: &'p ParsedProgram,
}

impl<'p> Emitter<'p> {
    pub fn new(program: &'p ParsedProgram) -> Self {
        Emitter { program }
    }

    /// Assemble the program into a complete binary image, header
    /// included.
    pub fn build(&self) -> Result<Vec<u8>, AssembleError> {
        let mut bits = BitBuffer::default();
        let mut instruction_offsets = Vec::with_capacity(self.program.code_section.len());
        let mut patches = Vec::new();

        for instruction in &self.program.code_section {
            instruction_offsets.push(bits.len());

            let spec = isa::lookup(&instruction.mnemonic)
                .expect("parser only ever records mnemonics present in the opcode table");
            bits.push_verbatim(spec.opcode_bits);

            for arg in &instruction.args {
                match arg {
                    Argument::Register(reg) => emit_register(&mut bits, reg.id, reg.width),
                    Argument::Constant(raw) => emit_constant(&mut bits, raw)?,
                    Argument::Label(name) => {
                        self.emit_label(&mut bits, name, &instruction_offsets, &mut patches)?
                    }
                }
            }
        }

        for patch in &patches {
            let address = byte_address(instruction_offsets[patch.target_index]);
            bits.patch_lsb_first(patch.bit_position, address, 32);
        }

        let mut data_size = self.program.data_size.unwrap_or(0);
        let actual = self.program.data_section.len() as u64;
        if actual > data_size {
            println!("Warning: bad .dataSize, was {data_size} but used {actual}, expanding");
            data_size = actual;
        }

        bits.pad_to_byte();
        let code_bytes = bits.into_bytes();

        let mut image = Vec::with_capacity(20 + code_bytes.len() + self.program.data_section.len());
        image.extend_from_slice(MAGIC);
        image.extend_from_slice(&(code_bytes.len() as u32).to_le_bytes());
        image.extend_from_slice(&(data_size as u32).to_le_bytes());
        image.extend_from_slice(&(self.program.data_section.len() as u32).to_le_bytes());
        image.extend_from_slice(&code_bytes);
        image.extend_from_slice(&self.program.data_section);

        Ok(image)
    }

    fn emit_label(
        &self,
        bits: &mut BitBuffer,
        name: &str,
        instruction_offsets: &[usize],
        patches: &mut Vec<Patch>,
    ) -> Result<(), AssembleError> {
        let target_index = *self
            .program
            .code_labels
            .get(name)
            .ok_or_else(|| AssembleError::UndefinedLabel(name.to_string()))?;

        if target_index < instruction_offsets.len() {
            let address = byte_address(instruction_offsets[target_index]);
            bits.push_lsb_first(address as u64, 32);
        } else {
            patches.push(Patch { bit_position: bits.len(), target_index });
            bits.push_lsb_first(0, 32);
        }
        Ok(())
    }
}

/// A code label's address is the byte offset of its target
/// instruction's first bit: the bit offset divided by 8, rounded up.
/// See DESIGN.md for why this implementation ceil-divides rather than
/// storing the raw bit count the reference tool does.
fn byte_address(bit_offset: usize) -> u32 {
    ((bit_offset + 7) / 8) as u32
}

fn emit_register(bits: &mut BitBuffer, id: u8, width: Option<isa::Width>) {
    match width {
        None => {
            bits.bits.push(false);
            bits.push_lsb_first(id as u64, 4);
        }
        Some(width) => {
            bits.bits.push(true);
            bits.push_lsb_first(width.code() as u64, 2);
            bits.push_lsb_first(id as u64, 4);
        }
    }
}

fn emit_constant(bits: &mut BitBuffer, raw: &str) -> Result<(), AssembleError> {
    let value = parse_integer_literal(raw)
        .ok_or_else(|| AssembleError::BadConstant(raw.to_string()))?;
    bits.push_lsb_first(value as u64, 64);
    Ok(())
}

/// Parses a decimal, `0x`, `0o`, or `0b` literal, with an optional
/// sign, into a 64-bit two's-complement value.
fn parse_integer_literal(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (negative, unsigned) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };

    let (radix, digits) = if let Some(d) = strip_prefix_ci(unsigned, "0x") {
        (16, d)
    } else if let Some(d) = strip_prefix_ci(unsigned, "0o") {
        (8, d)
    } else if let Some(d) = strip_prefix_ci(unsigned, "0b") {
        (2, d)
    } else {
        (10, unsigned)
    };

    let magnitude = u64::from_str_radix(digits, radix).ok()?;
    Some(if negative { (magnitude as i64).wrapping_neg() } else { magnitude as i64 })
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}
