//! Constant tables from RFC 7932.
//!
//! This module collects the format-defined tables shared by the decoder and
//! the encoder: insert/copy length codes, block-count codes, the
//! code-length-code machinery, distance short codes, and the
//! insert-and-copy command alphabet layout.
//!
//! # Alphabets
//!
//! Brotli uses three main prefix-code alphabets:
//! - **Literals**: 0-255
//! - **Insert-and-copy**: 0-703 (11 cells of 64 combining insert and copy
//!   length codes)
//! - **Distances**: 16 short codes + NDIRECT direct codes + postfix-coded
//!   long codes

use oxibrotli_core::bitstream::{BitReader, BitWriter};
use oxibrotli_core::error::Result;

/// Size of the literal alphabet.
pub const NUM_LITERAL_SYMBOLS: usize = 256;

/// Size of the insert-and-copy alphabet.
pub const NUM_COMMAND_SYMBOLS: usize = 704;

/// Number of distance short codes (ring-buffer substitutions).
pub const NUM_DISTANCE_SHORT_CODES: usize = 16;

/// Histogram width for the distance alphabet.
pub const NUM_DISTANCE_SYMBOLS: usize = 544;

/// Size of the block-count code alphabet.
pub const NUM_BLOCK_LENGTH_SYMBOLS: usize = 26;

/// Size of the code-length-code alphabet (0-15 plus repeat codes 16/17).
pub const CODE_LENGTH_CODES: usize = 18;

/// Repeat-previous code-length symbol (2 extra bits).
pub const REPEAT_PREVIOUS_CODE_LENGTH: u16 = 16;

/// Repeat-zero code-length symbol (3 extra bits).
pub const REPEAT_ZERO_CODE_LENGTH: u16 = 17;

/// Maximum prefix-code depth for symbol alphabets.
pub const MAX_HUFFMAN_DEPTH: u8 = 15;

/// Maximum prefix-code depth for the code-length-code alphabet.
pub const MAX_CODE_LENGTH_DEPTH: u8 = 5;

/// Base values for the 24 insert-length codes.
pub const INSERT_LENGTH_BASE: [u32; 24] = [
    0, 1, 2, 3, 4, 5, 6, 8, 10, 14, 18, 26, 34, 50, 66, 98, 130, 194, 322, 578, 1090, 2114, 6210,
    22594,
];

/// Extra-bit widths for the 24 insert-length codes.
pub const INSERT_LENGTH_EXTRA: [u32; 24] = [
    0, 0, 0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 7, 8, 9, 10, 12, 14, 24,
];

/// Base values for the 24 copy-length codes.
pub const COPY_LENGTH_BASE: [u32; 24] = [
    2, 3, 4, 5, 6, 7, 8, 9, 10, 12, 14, 18, 22, 30, 38, 54, 70, 102, 134, 198, 326, 582, 1094,
    2118,
];

/// Extra-bit widths for the 24 copy-length codes.
pub const COPY_LENGTH_EXTRA: [u32; 24] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 7, 8, 9, 10, 24,
];

/// Base values for the 26 block-count codes.
pub const BLOCK_LENGTH_BASE: [u32; 26] = [
    1, 5, 9, 13, 17, 25, 33, 41, 49, 65, 81, 97, 113, 145, 177, 209, 241, 305, 369, 497, 753, 1265,
    2289, 4337, 8433, 16625,
];

/// Extra-bit widths for the 26 block-count codes.
pub const BLOCK_LENGTH_EXTRA: [u32; 26] = [
    2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 6, 6, 7, 8, 9, 10, 11, 12, 13, 24,
];

/// Largest block count expressible by the final code.
pub const MAX_BLOCK_LENGTH: u32 = 16625 + (1 << 24) - 1;

/// Stream order of the code-length-code lengths.
pub const CODE_LENGTH_CODE_ORDER: [usize; 18] = [
    1, 2, 3, 4, 0, 5, 17, 6, 16, 7, 8, 9, 10, 11, 12, 13, 14, 15,
];

/// Decode table for the fixed prefix code over code-length-code lengths:
/// bit width per peeked 4-bit value.
pub const CODE_LENGTH_PREFIX_LENGTH: [u8; 16] = [2, 2, 2, 3, 2, 2, 2, 4, 2, 2, 2, 3, 2, 2, 2, 4];

/// Decode table for the fixed prefix code over code-length-code lengths:
/// decoded length per peeked 4-bit value.
pub const CODE_LENGTH_PREFIX_VALUE: [u8; 16] = [0, 4, 3, 2, 0, 4, 3, 1, 0, 4, 3, 2, 0, 4, 3, 5];

/// Encode table for the fixed prefix code over code-length-code lengths:
/// `(bits, width)` per length 0..=5, LSB-first.
pub const CODE_LENGTH_PREFIX_CODE: [(u64, u32); 6] =
    [(0b00, 2), (0b0111, 4), (0b011, 3), (0b10, 2), (0b01, 2), (0b1111, 4)];

/// Ring-slot selector per distance short code, added to the rotating index.
pub const DISTANCE_SHORT_CODE_INDEX_OFFSET: [u32; 16] =
    [3, 2, 1, 0, 3, 3, 3, 3, 3, 3, 2, 2, 2, 2, 2, 2];

/// Value adjustment per distance short code.
pub const DISTANCE_SHORT_CODE_VALUE_OFFSET: [i32; 16] =
    [0, 0, 0, 0, -1, 1, -2, 2, -3, 3, -1, 1, -2, 2, -3, 3];

/// Initial contents of the distance ring buffer. The write index starts at
/// zero, so the "last distance" is 4 and the "fourth-last" is 16.
pub const INITIAL_DISTANCE_RING: [i32; 4] = [16, 15, 11, 4];

/// The 11 cells of the insert-and-copy alphabet: high bits of the insert
/// code, high bits of the copy code, and whether the cell implies reuse of
/// the last distance (no distance symbol follows).
pub const COMMAND_CELLS: [(u16, u16, bool); 11] = [
    (0, 0, true),
    (0, 8, true),
    (0, 0, false),
    (0, 8, false),
    (8, 0, false),
    (8, 8, false),
    (0, 16, false),
    (16, 0, false),
    (8, 16, false),
    (16, 8, false),
    (16, 16, false),
];

/// One entry of the precomputed insert-and-copy lookup table.
#[derive(Debug, Clone, Copy)]
pub struct CommandDescriptor {
    /// Extra bits carried by the insert-length code.
    pub insert_extra: u8,
    /// Extra bits carried by the copy-length code.
    pub copy_extra: u8,
    /// Insert-length base value.
    pub insert_base: u32,
    /// Copy-length base value.
    pub copy_base: u32,
    /// Distance context (0-3), or negative when the command reuses the last
    /// distance and carries no distance symbol.
    pub distance_context: i8,
}

/// Precomputed per-symbol descriptors for the 704 insert-and-copy codes.
pub static COMMAND_LOOKUP: [CommandDescriptor; NUM_COMMAND_SYMBOLS] = build_command_lookup();

const fn build_command_lookup() -> [CommandDescriptor; NUM_COMMAND_SYMBOLS] {
    let mut table = [CommandDescriptor {
        insert_extra: 0,
        copy_extra: 0,
        insert_base: 0,
        copy_base: 0,
        distance_context: 0,
    }; NUM_COMMAND_SYMBOLS];
    let mut cmd = 0;
    while cmd < NUM_COMMAND_SYMBOLS {
        let cell = cmd >> 6;
        let (insert_high, copy_high, implicit) = COMMAND_CELLS[cell];
        let insert_code = insert_high as usize + ((cmd >> 3) & 7);
        let copy_code = copy_high as usize + (cmd & 7);
        let copy_base = COPY_LENGTH_BASE[copy_code];
        let context = if copy_base > 4 { 3 } else { copy_base as i8 - 2 };
        table[cmd] = CommandDescriptor {
            insert_extra: INSERT_LENGTH_EXTRA[insert_code] as u8,
            copy_extra: COPY_LENGTH_EXTRA[copy_code] as u8,
            insert_base: INSERT_LENGTH_BASE[insert_code],
            copy_base,
            distance_context: if implicit { context - 4 } else { context },
        };
        cmd += 1;
    }
    table
}

/// Combine an insert-length code and a copy-length code into an
/// insert-and-copy symbol.
///
/// `implicit_distance` selects the two cells whose commands reuse the last
/// distance; it is only valid for `insert_code < 8` and `copy_code < 16`.
pub fn combine_length_codes(insert_code: u16, copy_code: u16, implicit_distance: bool) -> u16 {
    let low = ((insert_code & 7) << 3) | (copy_code & 7);
    let cell: u16 = if implicit_distance {
        debug_assert!(insert_code < 8 && copy_code < 16);
        if copy_code < 8 { 0 } else { 1 }
    } else {
        match (insert_code >> 3, copy_code >> 3) {
            (0, 0) => 2,
            (0, 1) => 3,
            (1, 0) => 4,
            (1, 1) => 5,
            (0, 2) => 6,
            (2, 0) => 7,
            (1, 2) => 8,
            (2, 1) => 9,
            (2, 2) => 10,
            _ => unreachable!("length code out of range"),
        }
    };
    cell * 64 + low
}

/// Number of distance symbols for the given alphabet parameters.
///
/// `large_window` widens the long-code region from 48 to 62 half-buckets.
pub fn distance_alphabet_size(npostfix: u32, ndirect: u32, large_window: bool) -> usize {
    let long = if large_window { 62 } else { 48 };
    NUM_DISTANCE_SHORT_CODES + ndirect as usize + (long << npostfix)
}

/// Read a block-type count: the `varLenUint8 + 1` encoding used for
/// NBLTYPES and NTREES (1-bit flag, then a 3-bit width and that many extra
/// bits).
pub fn read_block_type_count(reader: &mut BitReader<'_>) -> Result<u32> {
    if reader.read_bit()? {
        let width = reader.read_bits(3)?;
        let extra = reader.read_bits(width)?;
        Ok((1 << width) + 1 + extra)
    } else {
        Ok(1)
    }
}

/// Write a block-type count in `varLenUint8 + 1` form. `count` must be in
/// `1..=256`.
pub fn write_block_type_count(writer: &mut BitWriter, count: u32) {
    debug_assert!((1..=256).contains(&count));
    if count == 1 {
        writer.write_bit(false);
    } else {
        let value = count - 1;
        let width = 31 - value.leading_zeros();
        writer.write_bit(true);
        writer.write_bits(width as u64, 3);
        writer.write_bits((value - (1 << width)) as u64, width);
    }
}

/// Find the block-count code for `length`, returning `(code, extra_bits)`.
pub fn block_length_code(length: u32) -> (usize, u32) {
    debug_assert!(length >= 1 && length <= MAX_BLOCK_LENGTH);
    let mut code = 0;
    while code + 1 < NUM_BLOCK_LENGTH_SYMBOLS && BLOCK_LENGTH_BASE[code + 1] <= length {
        code += 1;
    }
    (code, length - BLOCK_LENGTH_BASE[code])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_lookup_cells() {
        // Symbol 0: insert code 0, copy code 0, implicit distance.
        let d = &COMMAND_LOOKUP[0];
        assert_eq!(d.insert_base, 0);
        assert_eq!(d.copy_base, 2);
        assert!(d.distance_context < 0);

        // Symbol 128: first explicit-distance cell.
        let d = &COMMAND_LOOKUP[128];
        assert_eq!(d.insert_base, 0);
        assert_eq!(d.copy_base, 2);
        assert_eq!(d.distance_context, 0);

        // Symbol 703: insert code 23, copy code 23.
        let d = &COMMAND_LOOKUP[703];
        assert_eq!(d.insert_base, 22594);
        assert_eq!(d.insert_extra, 24);
        assert_eq!(d.copy_base, 2118);
        assert_eq!(d.copy_extra, 24);
        assert_eq!(d.distance_context, 3);
    }

    #[test]
    fn test_combine_length_codes_inverse() {
        for cmd in 0..NUM_COMMAND_SYMBOLS as u16 {
            let cell = (cmd >> 6) as usize;
            let (insert_high, copy_high, implicit) = COMMAND_CELLS[cell];
            let insert_code = insert_high + ((cmd >> 3) & 7);
            let copy_code = copy_high + (cmd & 7);
            assert_eq!(combine_length_codes(insert_code, copy_code, implicit), cmd);
        }
    }

    #[test]
    fn test_block_length_code_covers_bases() {
        for (code, &base) in BLOCK_LENGTH_BASE.iter().enumerate() {
            assert_eq!(block_length_code(base), (code, 0));
            let top = base + (1 << BLOCK_LENGTH_EXTRA[code]) - 1;
            assert_eq!(block_length_code(top), (code, top - base));
        }
    }

    #[test]
    fn test_block_type_count_roundtrip() {
        for count in [1u32, 2, 3, 4, 5, 9, 17, 33, 65, 129, 255, 256] {
            let mut writer = BitWriter::new();
            write_block_type_count(&mut writer, count);
            let bytes = writer.finish();
            let mut reader = BitReader::new(&bytes);
            assert_eq!(read_block_type_count(&mut reader).unwrap(), count);
        }
    }

    #[test]
    fn test_distance_alphabet_size() {
        assert_eq!(distance_alphabet_size(0, 0, false), 64);
        assert_eq!(distance_alphabet_size(1, 12, false), 124);
        assert_eq!(distance_alphabet_size(3, 120, false), 520);
    }
}
