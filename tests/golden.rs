//! End-to-end assembling checks against whole programs, the way
//! `vasm`'s test module exercises complete instruction streams rather
//! than individual encoding steps.

use esetvm2_asm::assembler::{assemble, MAGIC};

fn code_len(image: &[u8]) -> u32 {
    u32::from_le_bytes(image[8..12].try_into().unwrap())
}

fn data_size(image: &[u8]) -> u32 {
    u32::from_le_bytes(image[12..16].try_into().unwrap())
}

fn data_initial_length(image: &[u8]) -> u32 {
    u32::from_le_bytes(image[16..20].try_into().unwrap())
}

/// Extracts `width` bits starting at `bit_offset` (MSB-first packing,
/// as the header declares), reassembling them LSB-first into a value,
/// the same convention the emitter uses for multi-bit numeric fields.
fn bits_lsb_first(code_bytes: &[u8], bit_offset: usize, width: usize) -> u64 {
    let mut value = 0u64;
    for i in 0..width {
        let bit_index = bit_offset + i;
        let byte = code_bytes[bit_index / 8];
        let bit = (byte >> (7 - (bit_index % 8))) & 1;
        value |= (bit as u64) << i;
    }
    value
}

#[test]
fn minimal_halt_program() {
    let image = assemble(".code\nhlt\n").unwrap();
    assert_eq!(&image[0..8], MAGIC);
    assert_eq!(code_len(&image), 1);
    assert_eq!(data_size(&image), 0);
    assert_eq!(data_initial_length(&image), 0);
    assert_eq!(image.len(), 21);
}

#[test]
fn forward_jump_resolves_to_the_halt_instructions_byte_offset() {
    let image = assemble(".code\njump end\nend:\nhlt\n").unwrap();
    assert_eq!(code_len(&image), 6);
    let code_bytes = &image[20..20 + code_len(&image) as usize];
    // jump's opcode is 5 bits, so its 32-bit operand starts at bit 5.
    let operand = bits_lsb_first(code_bytes, 5, 32);
    assert_eq!(operand, 5);
}

#[test]
fn data_section_widens_past_a_too_small_declared_size() {
    let image = assemble(".dataSize 2\n.data\nDE AD BE EF\n.code\nhlt\n").unwrap();
    assert_eq!(data_size(&image), 4);
    assert_eq!(data_initial_length(&image), 4);
    assert_eq!(&image[image.len() - 4..], &[0xDE, 0xAD, 0xBE, 0xEF]);
}

#[test]
fn constant_load_is_nine_bytes() {
    let image = assemble(".code\nloadConst 0x00000000000000FF, r0\n").unwrap();
    assert_eq!(code_len(&image), 9);
    let code_bytes = &image[20..20 + code_len(&image) as usize];
    // loadConst's opcode is 3 bits, so the 64-bit constant starts at bit 3.
    assert_eq!(bits_lsb_first(code_bytes, 3, 64), 0xFF);
    // the trailing 5-bit value-form register argument (r0) starts at bit 67.
    assert_eq!(bits_lsb_first(code_bytes, 67, 5), 0);
}

#[test]
fn reference_register_argument_round_trips_through_the_bit_buffer() {
    let image = assemble(".code\nmov dword[r3], r5\n").unwrap();
    assert_eq!(code_len(&image), 2);
}

#[test]
fn duplicate_label_fails_with_the_exact_line_and_message() {
    let err = assemble(".code\nlbl:\nhlt\nlbl:\nhlt\n").unwrap_err();
    assert_eq!(err.to_string(), "Parser error on line 4: Duplicated label");
}

#[test]
fn unknown_opcode_fails_with_a_parse_error() {
    let err = assemble(".code\nbogus r0\n").unwrap_err();
    assert!(err.to_string().starts_with("Parser error on line 1:"));
}

#[test]
fn register_id_over_sixteen_fails_with_a_parse_error() {
    let err = assemble(".code\nconsoleRead r17\n").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Parser error on line 1: Bad register argument type (too big)"
    );
}

#[test]
fn undefined_code_label_fails_at_assemble_time() {
    let err = assemble(".code\njump nowhere\n").unwrap_err();
    assert_eq!(err.to_string(), "Assembler error: Undefined code label nowhere");
}

#[test]
fn assembling_the_same_source_twice_is_deterministic() {
    let source = ".dataSize 1\n.data\nAA BB\n.code\njump end\nend:\nhlt\n";
    assert_eq!(assemble(source).unwrap(), assemble(source).unwrap());
}

#[test]
fn backward_jump_resolves_to_the_top_of_the_program() {
    let image = assemble(".code\ntop:\nhlt\njump top\n").unwrap();
    let code_bytes = &image[20..20 + code_len(&image) as usize];
    // hlt opcode (5 bits) then jump opcode (5 bits) then its 32-bit operand.
    let operand = bits_lsb_first(code_bytes, 10, 32);
    assert_eq!(operand, 0);
}
