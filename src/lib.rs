//! An assembler for the ESET-VM2 instruction set.
//!
//! Converts a human-readable assembly source (a `.data` section and a
//! `.code` section) into a bit-packed binary executable image, in two
//! passes: [`assembler::parser`] builds a symbol table and an in-memory
//! instruction list, and [`assembler::emitter`] walks that list to
//! produce the final bytes, patching forward label references once
//! every instruction's offset is known.

pub mod assembler;
pub mod logging;
