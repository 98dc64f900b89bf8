//! Prefix-code decoding tables.
//!
//! Brotli decodes every prefix code through a two-level lookup: an 8-bit
//! root table (5-bit for code-length codes) whose entries either resolve a
//! symbol directly or point at a second-level subtable for codes longer
//! than the root width. A *tree group* packs several trees into one flat
//! `i32` array: the leading `n` entries hold per-tree root offsets, and
//! each table entry packs `(bits << 16) | symbol`, or for a root entry that
//! spills into a subtable, `((root_bits + sub_bits) << 16) | delta`.
//!
//! Construction walks the symbols in canonical code order (length
//! ascending, then insertion order within a length), replicating each entry
//! across the table positions that share its reversed-bit prefix.

use oxibrotli_core::bitstream::BitReader;
use oxibrotli_core::error::{BrotliError, Result};

/// Root-table width for symbol alphabets.
pub const HUFFMAN_TABLE_BITS: u32 = 8;

/// Root-table width for the code-length-code alphabet.
pub const CODE_LENGTH_TABLE_BITS: u32 = 5;

/// Longest prefix code.
pub const MAX_CODE_LENGTH: usize = 15;

/// Reusable sorted-symbol scratch, owned by the decoder to keep table
/// construction allocation-free across metablocks.
#[derive(Debug, Default)]
pub struct HuffmanScratch {
    sorted: Vec<u16>,
}

/// A group of prefix trees sharing one flat entry array.
#[derive(Debug)]
pub struct HuffmanTreeGroup {
    /// Flat storage. Entries `[0, n_trees)` are per-tree root offsets into
    /// the same array.
    codes: Vec<i32>,
    /// Number of trees in the group.
    n_trees: usize,
    /// Next free slot for table construction.
    next_free: usize,
}

impl HuffmanTreeGroup {
    /// Allocate a group of `n_trees` tables over an alphabet of
    /// `alphabet_size` symbols.
    pub fn new(n_trees: usize, alphabet_size: usize) -> Self {
        // Generous per-tree bound: a full root table plus two entries per
        // symbol covers the worst-case subtable spill.
        let per_tree = (1usize << HUFFMAN_TABLE_BITS) + 2 * alphabet_size;
        Self {
            codes: vec![0; n_trees + n_trees * per_tree],
            n_trees,
            next_free: n_trees,
        }
    }

    /// The flat entry array.
    #[inline]
    pub fn codes(&self) -> &[i32] {
        &self.codes
    }

    /// Build tree `tree_idx` of the group from per-symbol code lengths.
    pub fn build(
        &mut self,
        tree_idx: usize,
        lengths: &[u8],
        scratch: &mut HuffmanScratch,
    ) -> Result<()> {
        debug_assert!(tree_idx < self.n_trees);
        let used = build_table(
            &mut self.codes,
            self.next_free,
            HUFFMAN_TABLE_BITS,
            lengths,
            scratch,
        )?;
        self.codes[tree_idx] = self.next_free as i32;
        self.next_free += used;
        Ok(())
    }
}

/// Advance a reversed-bit canonical key to its successor of width `len`.
#[inline]
fn next_key(key: u32, len: u32) -> u32 {
    let mut step = 1u32 << (len - 1);
    while key & step != 0 {
        step >>= 1;
    }
    (key & step.wrapping_sub(1)) + step
}

/// Width of the subtable needed for the codes remaining at `len`.
fn next_table_bit_size(count: &[u16; MAX_CODE_LENGTH + 1], mut len: usize, root_bits: u32) -> u32 {
    let mut left = 1i32 << (len as u32 - root_bits);
    while len < MAX_CODE_LENGTH {
        left -= count[len] as i32;
        if left <= 0 {
            break;
        }
        len += 1;
        left <<= 1;
    }
    len as u32 - root_bits
}

/// Build one two-level decoding table at `table_off` inside `table`.
///
/// `lengths[symbol]` gives each symbol's code length (0 = unused). The code
/// space must be exactly filled unless only one symbol is present; callers
/// validate this while reading the code, so an inconsistency here is a
/// malformed-stream error. Returns the number of entries written.
pub fn build_table(
    table: &mut [i32],
    table_off: usize,
    root_bits: u32,
    lengths: &[u8],
    scratch: &mut HuffmanScratch,
) -> Result<usize> {
    let mut count = [0u16; MAX_CODE_LENGTH + 1];
    for &len in lengths {
        debug_assert!((len as usize) <= MAX_CODE_LENGTH);
        count[len as usize] += 1;
    }
    count[0] = 0;

    // Stable sort by length: bucket offsets, then one pass in symbol order.
    let mut offset = [0usize; MAX_CODE_LENGTH + 2];
    for len in 1..=MAX_CODE_LENGTH {
        offset[len + 1] = offset[len] + count[len] as usize;
    }
    let total = offset[MAX_CODE_LENGTH + 1];
    if total == 0 {
        return Err(BrotliError::malformed_huffman("prefix code with no symbols"));
    }

    let sorted = &mut scratch.sorted;
    sorted.clear();
    sorted.resize(total, 0);
    let mut cursor = offset;
    for (symbol, &len) in lengths.iter().enumerate() {
        if len > 0 {
            sorted[cursor[len as usize]] = symbol as u16;
            cursor[len as usize] += 1;
        }
    }

    let table_size = 1usize << root_bits;
    // Single-symbol tree: every root entry resolves the symbol in 0 bits.
    if total == 1 {
        let item = sorted[0] as i32;
        for slot in &mut table[table_off..table_off + table_size] {
            *slot = item;
        }
        return Ok(table_size);
    }

    let mut key = 0u32;
    let mut symbol = 0usize;

    // Codes no longer than the root width fill the root table directly.
    for len in 1..=root_bits {
        let step = 1usize << len;
        for _ in 0..count[len as usize] {
            let item = ((len as i32) << 16) | sorted[symbol] as i32;
            symbol += 1;
            let mut slot = key as usize;
            while slot < table_size {
                table[table_off + slot] = item;
                slot += step;
            }
            key = next_key(key, len);
        }
    }

    // Longer codes spill into second-level subtables.
    let mask = table_size as u32 - 1;
    let mut total_size = table_size;
    let mut low = u32::MAX;
    let mut sub_off = table_off;
    let mut sub_bits = 0u32;
    let mut sub_size = 0usize;
    let mut remaining = count;
    for len in (root_bits as usize + 1)..=MAX_CODE_LENGTH {
        let step = 1usize << (len as u32 - root_bits);
        while remaining[len] > 0 {
            // Subtable sizing counts the code being placed, so the count
            // decrement comes after this check.
            if key & mask != low {
                sub_off = table_off + total_size;
                sub_bits = next_table_bit_size(&remaining, len, root_bits);
                sub_size = 1 << sub_bits;
                total_size += sub_size;
                low = key & mask;
                table[table_off + low as usize] =
                    (((sub_bits + root_bits) as i32) << 16) | ((sub_off - table_off) as i32 - low as i32);
            }
            remaining[len] -= 1;
            let item = (((len as u32 - root_bits) as i32) << 16) | sorted[symbol] as i32;
            symbol += 1;
            let mut slot = (key >> root_bits) as usize;
            while slot < sub_size {
                table[sub_off + slot] = item;
                slot += step;
            }
            key = next_key(key, len as u32);
            if key == 0 && symbol < total {
                return Err(BrotliError::malformed_huffman("over-subscribed prefix code"));
            }
        }
    }
    Ok(total_size)
}

/// Decode one symbol from tree `tree_idx` of a packed group.
#[inline]
pub fn read_symbol(group: &[i32], tree_idx: usize, reader: &mut BitReader<'_>) -> Result<u32> {
    let val = reader.peek_bits(15);
    let mut offset = group[tree_idx] as usize + (val & ((1 << HUFFMAN_TABLE_BITS) - 1)) as usize;
    let entry = group[offset];
    let bits = (entry >> 16) as u32;
    let symbol = (entry & 0xFFFF) as u32;
    if bits <= HUFFMAN_TABLE_BITS {
        reader.skip_bits(bits)?;
        return Ok(symbol);
    }
    // Root entry points at a subtable; symbol field is the offset delta.
    offset += symbol as usize;
    let mask = (1u32 << bits) - 1;
    offset += ((val & mask) >> HUFFMAN_TABLE_BITS) as usize;
    let entry = group[offset];
    reader.skip_bits(HUFFMAN_TABLE_BITS + (entry >> 16) as u32)?;
    Ok((entry & 0xFFFF) as u32)
}

/// Build a standalone single tree (used for the code-length code, which has
/// its own root width).
pub fn build_single_table(
    root_bits: u32,
    lengths: &[u8],
    scratch: &mut HuffmanScratch,
) -> Result<Vec<i32>> {
    let per_tree = (1usize << root_bits) + 2 * lengths.len();
    let mut codes = vec![0i32; 1 + per_tree];
    build_table(&mut codes, 1, root_bits, lengths, scratch)?;
    codes[0] = 1;
    Ok(codes)
}

/// Decode one symbol through a standalone table built with a non-default
/// root width.
#[inline]
pub fn read_symbol_with_root(
    table: &[i32],
    root_bits: u32,
    reader: &mut BitReader<'_>,
) -> Result<u32> {
    let val = reader.peek_bits(15);
    let mut offset = table[0] as usize + (val & ((1 << root_bits) - 1)) as usize;
    let entry = table[offset];
    let bits = (entry >> 16) as u32;
    let symbol = (entry & 0xFFFF) as u32;
    if bits <= root_bits {
        reader.skip_bits(bits)?;
        return Ok(symbol);
    }
    offset += symbol as usize;
    let mask = (1u32 << bits) - 1;
    offset += ((val & mask) >> root_bits) as usize;
    let entry = table[offset];
    reader.skip_bits(root_bits + (entry >> 16) as u32)?;
    Ok((entry & 0xFFFF) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxibrotli_core::bitstream::BitWriter;

    fn canonical_codes(lengths: &[u8]) -> Vec<(u32, u32)> {
        // (code, len) per symbol, LSB-first (bit-reversed canonical).
        let mut bl_count = [0u32; MAX_CODE_LENGTH + 1];
        for &l in lengths {
            if l > 0 {
                bl_count[l as usize] += 1;
            }
        }
        let mut next = [0u32; MAX_CODE_LENGTH + 2];
        let mut code = 0;
        for bits in 1..=MAX_CODE_LENGTH {
            code = (code + bl_count[bits - 1]) << 1;
            next[bits] = code;
        }
        lengths
            .iter()
            .map(|&l| {
                if l == 0 {
                    return (0, 0);
                }
                let c = next[l as usize];
                next[l as usize] += 1;
                let mut rev = 0u32;
                for i in 0..l {
                    rev |= ((c >> i) & 1) << (l - 1 - i);
                }
                (rev, l as u32)
            })
            .collect()
    }

    #[test]
    fn test_root_only_codes() {
        // Lengths 1,2,3,3 over four symbols.
        let lengths = [1u8, 2, 3, 3];
        let mut scratch = HuffmanScratch::default();
        let mut group = HuffmanTreeGroup::new(1, 4);
        group.build(0, &lengths, &mut scratch).unwrap();

        let codes = canonical_codes(&lengths);
        let mut writer = BitWriter::new();
        for &sym in &[0usize, 3, 1, 2, 0] {
            let (code, len) = codes[sym];
            writer.write_bits(code as u64, len);
        }
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);
        for &sym in &[0u32, 3, 1, 2, 0] {
            assert_eq!(read_symbol(group.codes(), 0, &mut reader).unwrap(), sym);
        }
    }

    #[test]
    fn test_long_codes_use_subtables() {
        // A skewed tree with depths beyond the 8-bit root.
        let mut lengths = vec![0u8; 16];
        lengths[0] = 1;
        for (i, item) in lengths.iter_mut().enumerate().take(9).skip(1) {
            *item = (i + 1) as u8; // depths 2..=9
        }
        lengths[9] = 10;
        lengths[10] = 10;
        let mut scratch = HuffmanScratch::default();
        let mut group = HuffmanTreeGroup::new(1, 16);
        group.build(0, &lengths, &mut scratch).unwrap();

        let codes = canonical_codes(&lengths);
        let symbols = [0u32, 9, 10, 5, 0, 8];
        let mut writer = BitWriter::new();
        for &sym in &symbols {
            let (code, len) = codes[sym as usize];
            writer.write_bits(code as u64, len);
        }
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);
        for &sym in &symbols {
            assert_eq!(read_symbol(group.codes(), 0, &mut reader).unwrap(), sym);
        }
    }

    #[test]
    fn test_single_symbol_consumes_no_bits() {
        let mut lengths = vec![0u8; 256];
        lengths[42] = 1;
        let mut scratch = HuffmanScratch::default();
        let mut group = HuffmanTreeGroup::new(1, 256);
        group.build(0, &lengths, &mut scratch).unwrap();

        let bytes = [0xFFu8];
        let mut reader = BitReader::new(&bytes);
        for _ in 0..100 {
            assert_eq!(read_symbol(group.codes(), 0, &mut reader).unwrap(), 42);
        }
        assert_eq!(reader.bits_consumed(), 0);
    }

    #[test]
    fn test_code_length_root_width() {
        let mut lengths = vec![0u8; 18];
        lengths[0] = 2;
        lengths[4] = 1;
        lengths[17] = 2;
        let mut scratch = HuffmanScratch::default();
        let table = build_single_table(CODE_LENGTH_TABLE_BITS, &lengths, &mut scratch).unwrap();

        let codes = canonical_codes(&lengths);
        let mut writer = BitWriter::new();
        for &sym in &[4usize, 0, 17, 4] {
            let (code, len) = codes[sym];
            writer.write_bits(code as u64, len);
        }
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);
        for &sym in &[4u32, 0, 17, 4] {
            assert_eq!(
                read_symbol_with_root(&table, CODE_LENGTH_TABLE_BITS, &mut reader).unwrap(),
                sym
            );
        }
    }
}
