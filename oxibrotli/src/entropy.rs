//! Encoder-side prefix-code construction and serialization.
//!
//! Depth assignment uses a bottom-up node merge with a doubling count
//! floor: whenever the resulting tree exceeds the depth limit, small counts
//! are clamped upward and the tree rebuilt, trading a little entropy for a
//! bounded code length. Canonical codes are assigned in (length, symbol)
//! order and bit-reversed for the LSB-first stream.
//!
//! Serialization mirrors the decoder's prefix-code reader: simple codes for
//! up to four symbols, otherwise RLE-compressed code lengths under the
//! fixed code-length-code.

use crate::tables::{
    block_length_code, BLOCK_LENGTH_EXTRA, CODE_LENGTH_CODES, CODE_LENGTH_CODE_ORDER,
    CODE_LENGTH_PREFIX_CODE, MAX_CODE_LENGTH_DEPTH, MAX_HUFFMAN_DEPTH,
    REPEAT_PREVIOUS_CODE_LENGTH, REPEAT_ZERO_CODE_LENGTH,
};
use oxibrotli_core::bitstream::BitWriter;

/// Depth value the repeat-previous code falls back to before any explicit
/// length was coded.
const INITIAL_REPEATED_LENGTH: u8 = 8;

/// Assign depth-limited Huffman code lengths for `counts`.
///
/// `depths` must be `counts.len()` long; unused symbols get depth 0.
pub fn create_huffman_tree(counts: &[u32], tree_limit: u8, depths: &mut [u8]) {
    depths.fill(0);
    let mut count_limit = 1u32;
    loop {
        // Leaves, smallest weight first; ties broken by symbol for
        // deterministic output.
        let mut leaves: Vec<(u64, u16)> = counts
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c > 0)
            .map(|(s, &c)| (c.max(count_limit) as u64, s as u16))
            .collect();
        match leaves.len() {
            0 => return,
            1 => {
                depths[leaves[0].1 as usize] = 1;
                return;
            }
            _ => {}
        }
        leaves.sort_unstable();

        // Two-queue merge: leaves are pre-sorted, internal nodes are
        // produced in non-decreasing weight order.
        #[derive(Clone, Copy)]
        enum Node {
            Leaf(u16),
            Internal(usize, usize),
        }
        let mut arena: Vec<(u64, Node)> = Vec::with_capacity(2 * leaves.len());
        for &(w, s) in &leaves {
            arena.push((w, Node::Leaf(s)));
        }
        let mut leaf_cursor = 0usize;
        let mut internal: std::collections::VecDeque<usize> = std::collections::VecDeque::new();
        let mut take_min = |arena: &Vec<(u64, Node)>,
                            leaf_cursor: &mut usize,
                            internal: &mut std::collections::VecDeque<usize>|
         -> usize {
            let leaf_ok = *leaf_cursor < leaves.len();
            let int_ok = !internal.is_empty();
            if leaf_ok && (!int_ok || arena[*leaf_cursor].0 <= arena[*internal.front().unwrap()].0)
            {
                let idx = *leaf_cursor;
                *leaf_cursor += 1;
                idx
            } else {
                internal.pop_front().unwrap()
            }
        };
        let num_leaves = leaves.len();
        let mut produced = 0;
        let mut root = 0;
        while produced + 1 < num_leaves {
            let a = take_min(&arena, &mut leaf_cursor, &mut internal);
            let b = take_min(&arena, &mut leaf_cursor, &mut internal);
            let w = arena[a].0 + arena[b].0;
            arena.push((w, Node::Internal(a, b)));
            root = arena.len() - 1;
            internal.push_back(root);
            produced += 1;
        }

        // Iterative depth assignment.
        let mut max_depth = 0u8;
        let mut stack = vec![(root, 0u8)];
        while let Some((idx, depth)) = stack.pop() {
            match arena[idx].1 {
                Node::Leaf(symbol) => {
                    depths[symbol as usize] = depth;
                    max_depth = max_depth.max(depth);
                }
                Node::Internal(a, b) => {
                    stack.push((a, depth + 1));
                    stack.push((b, depth + 1));
                }
            }
        }

        if max_depth <= tree_limit {
            return;
        }
        count_limit *= 2;
    }
}

/// Canonical LSB-first codes for the given depths, in (length, symbol)
/// order, matching the order the decoder's table builder assumes.
pub fn convert_bit_depths_to_symbols(depths: &[u8]) -> Vec<u16> {
    let mut bl_count = [0u32; MAX_HUFFMAN_DEPTH as usize + 1];
    for &d in depths {
        if d > 0 {
            bl_count[d as usize] += 1;
        }
    }
    let mut next_code = [0u32; MAX_HUFFMAN_DEPTH as usize + 2];
    let mut code = 0u32;
    for bits in 1..=MAX_HUFFMAN_DEPTH as usize {
        code = (code + bl_count[bits - 1]) << 1;
        next_code[bits] = code;
    }
    depths
        .iter()
        .map(|&d| {
            if d == 0 {
                return 0;
            }
            let c = next_code[d as usize];
            next_code[d as usize] += 1;
            let mut reversed = 0u16;
            for i in 0..d {
                reversed |= (((c >> i) & 1) as u16) << (d - 1 - i);
            }
            reversed
        })
        .collect()
}

/// RLE-compress a depth sequence into code-length symbols plus their extra
/// bits, exactly invertible by the decoder's repeat accumulation.
pub fn write_huffman_tree(depths: &[u8], symbols: &mut Vec<u8>, extras: &mut Vec<u8>) {
    symbols.clear();
    extras.clear();

    let mut len = depths.len();
    while len > 0 && depths[len - 1] == 0 {
        len -= 1;
    }

    // Per-value RLE decisions, on long alphabets only.
    let (use_rle_nonzero, use_rle_zero) = if depths.len() > 50 {
        decide_rle_use(&depths[..len])
    } else {
        (false, false)
    };

    let mut previous_value = INITIAL_REPEATED_LENGTH;
    let mut i = 0usize;
    while i < len {
        let value = depths[i];
        let mut reps = 1usize;
        while i + reps < len && depths[i + reps] == value {
            reps += 1;
        }
        if value == 0 {
            if use_rle_zero && reps >= 3 {
                write_zero_repetitions(reps, symbols, extras);
            } else {
                for _ in 0..reps {
                    symbols.push(0);
                    extras.push(0);
                }
            }
        } else {
            if use_rle_nonzero && reps >= 4 || (previous_value == value && reps >= 3) {
                write_value_repetitions(previous_value, value, reps, symbols, extras);
            } else {
                for _ in 0..reps {
                    symbols.push(value);
                    extras.push(0);
                }
            }
            previous_value = value;
        }
        i += reps;
    }
}

fn decide_rle_use(depths: &[u8]) -> (bool, bool) {
    let mut total_zero = 0usize;
    let mut runs_zero = 0usize;
    let mut total_nonzero = 0usize;
    let mut runs_nonzero = 0usize;
    let mut i = 0;
    while i < depths.len() {
        let value = depths[i];
        let mut reps = 1;
        while i + reps < depths.len() && depths[i + reps] == value {
            reps += 1;
        }
        if value == 0 && reps >= 3 {
            total_zero += reps;
            runs_zero += 1;
        }
        if value != 0 && reps >= 4 {
            total_nonzero += reps;
            runs_nonzero += 1;
        }
        i += reps;
    }
    (
        total_nonzero > 2 * runs_nonzero,
        total_zero > 2 * runs_zero,
    )
}

/// Emit a run of `reps` copies of a non-zero `value` through repeat-16
/// codes. Consecutive repeat codes compound base-4, so the run length is
/// decomposed into base-4 digits emitted most-significant first.
fn write_value_repetitions(
    previous_value: u8,
    value: u8,
    mut reps: usize,
    symbols: &mut Vec<u8>,
    extras: &mut Vec<u8>,
) {
    if previous_value != value {
        symbols.push(value);
        extras.push(0);
        reps -= 1;
    }
    if reps < 3 {
        for _ in 0..reps {
            symbols.push(value);
            extras.push(0);
        }
        return;
    }
    reps -= 3;
    let start = symbols.len();
    loop {
        symbols.push(REPEAT_PREVIOUS_CODE_LENGTH as u8);
        extras.push((reps & 0x3) as u8);
        reps >>= 2;
        if reps == 0 {
            break;
        }
        reps -= 1;
    }
    symbols[start..].reverse();
    extras[start..].reverse();
}

/// Emit a run of `reps` zeros through repeat-17 codes (base-8 digits).
fn write_zero_repetitions(mut reps: usize, symbols: &mut Vec<u8>, extras: &mut Vec<u8>) {
    if reps < 3 {
        for _ in 0..reps {
            symbols.push(0);
            extras.push(0);
        }
        return;
    }
    reps -= 3;
    let start = symbols.len();
    loop {
        symbols.push(REPEAT_ZERO_CODE_LENGTH as u8);
        extras.push((reps & 0x7) as u8);
        reps >>= 3;
        if reps == 0 {
            break;
        }
        reps -= 1;
    }
    symbols[start..].reverse();
    extras[start..].reverse();
}

/// Serialize a complex prefix code: the code-length-code header under the
/// fixed code, then the RLE symbol sequence.
fn store_complex_huffman_tree(depths: &[u8], writer: &mut BitWriter) {
    let mut tree_symbols = Vec::new();
    let mut tree_extras = Vec::new();
    write_huffman_tree(depths, &mut tree_symbols, &mut tree_extras);

    let mut histogram = [0u32; CODE_LENGTH_CODES];
    for &s in &tree_symbols {
        histogram[s as usize] += 1;
    }
    let num_codes = histogram.iter().filter(|&&c| c > 0).count();

    let mut cl_depths = [0u8; CODE_LENGTH_CODES];
    create_huffman_tree(&histogram, MAX_CODE_LENGTH_DEPTH, &mut cl_depths);
    let mut cl_codes = convert_bit_depths_to_symbols(&cl_depths);

    // HSKIP: leading zero-length entries in storage order. The value 1
    // selects a simple code, so a single leading zero is written out.
    let mut skip = 0usize;
    while skip < 3 && cl_depths[CODE_LENGTH_CODE_ORDER[skip]] == 0 {
        skip += 1;
    }
    if skip == 1 {
        skip = 0;
    }
    writer.write_bits(skip as u64, 2);

    // Code-length-code lengths under the fixed code; the decoder stops as
    // soon as the code space fills, so emission stops at the same point.
    let mut space = 32i32;
    for &order in CODE_LENGTH_CODE_ORDER.iter().skip(skip) {
        let depth = cl_depths[order] as usize;
        let (bits, width) = CODE_LENGTH_PREFIX_CODE[depth];
        writer.write_bits(bits, width);
        if depth != 0 {
            space -= 32 >> depth;
            if space <= 0 {
                break;
            }
        }
    }

    // A single-symbol code-length code decodes in zero bits.
    if num_codes == 1 {
        cl_depths.fill(0);
        cl_codes.fill(0);
    }

    for (&symbol, &extra) in tree_symbols.iter().zip(&tree_extras) {
        let s = symbol as usize;
        writer.write_bits(cl_codes[s] as u64, cl_depths[s] as u32);
        if symbol == REPEAT_PREVIOUS_CODE_LENGTH as u8 {
            writer.write_bits(extra as u64, 2);
        } else if symbol == REPEAT_ZERO_CODE_LENGTH as u8 {
            writer.write_bits(extra as u64, 3);
        }
    }
}

/// Width in bits of the symbols of an alphabet (for simple-code symbol
/// fields).
fn alphabet_width(alphabet_size: usize) -> u32 {
    32 - (alphabet_size as u32 - 1).leading_zeros()
}

/// Build a depth-limited prefix code for `histogram` and serialize it,
/// returning `(depths, codes)` for payload emission.
///
/// Up to four used symbols produce a simple code with its fixed depth
/// patterns; anything larger produces a complex code.
pub fn build_and_store_huffman_tree(
    histogram: &[u32],
    writer: &mut BitWriter,
) -> (Vec<u8>, Vec<u16>) {
    let alphabet_size = histogram.len();
    let mut used: Vec<(u32, u16)> = histogram
        .iter()
        .enumerate()
        .filter(|&(_, &c)| c > 0)
        .map(|(s, &c)| (c, s as u16))
        .collect();

    let mut depths = vec![0u8; alphabet_size];
    if used.len() <= 4 {
        // Highest count first; ties by symbol for determinism.
        used.sort_unstable_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        let width = alphabet_width(alphabet_size);
        writer.write_bits(1, 2); // simple code
        match used.len() {
            0 => {
                writer.write_bits(0, 2);
                writer.write_bits(0, width);
            }
            1 => {
                writer.write_bits(0, 2);
                writer.write_bits(used[0].1 as u64, width);
                // Depth stays 0: the single symbol costs no payload bits.
            }
            2 => {
                writer.write_bits(1, 2);
                let (a, b) = (used[0].1.min(used[1].1), used[0].1.max(used[1].1));
                writer.write_bits(a as u64, width);
                writer.write_bits(b as u64, width);
                depths[a as usize] = 1;
                depths[b as usize] = 1;
            }
            3 => {
                writer.write_bits(2, 2);
                let first = used[0].1;
                let (a, b) = (used[1].1.min(used[2].1), used[1].1.max(used[2].1));
                writer.write_bits(first as u64, width);
                writer.write_bits(a as u64, width);
                writer.write_bits(b as u64, width);
                depths[first as usize] = 1;
                depths[a as usize] = 2;
                depths[b as usize] = 2;
            }
            _ => {
                writer.write_bits(3, 2);
                // Skewed counts favor the 1/2/3/3 shape over flat 2-bit
                // codes.
                let skewed = used[0].0 > used[1].0 + used[2].0 + used[3].0;
                if skewed {
                    let first = used[0].1;
                    let second = used[1].1;
                    let (a, b) = (used[2].1.min(used[3].1), used[2].1.max(used[3].1));
                    writer.write_bits(first as u64, width);
                    writer.write_bits(second as u64, width);
                    writer.write_bits(a as u64, width);
                    writer.write_bits(b as u64, width);
                    writer.write_bit(true);
                    depths[first as usize] = 1;
                    depths[second as usize] = 2;
                    depths[a as usize] = 3;
                    depths[b as usize] = 3;
                } else {
                    let mut sorted: Vec<u16> = used.iter().map(|&(_, s)| s).collect();
                    sorted.sort_unstable();
                    for &s in &sorted {
                        writer.write_bits(s as u64, width);
                        depths[s as usize] = 2;
                    }
                    writer.write_bit(false);
                }
            }
        }
    } else {
        create_huffman_tree(histogram, MAX_HUFFMAN_DEPTH, &mut depths);
        store_complex_huffman_tree(&depths, writer);
    }
    let codes = convert_bit_depths_to_symbols(&depths);
    (depths, codes)
}

/// Write a block-count value through its prefix code.
pub fn write_block_length(
    length: u32,
    depths: &[u8],
    codes: &[u16],
    writer: &mut BitWriter,
) {
    let (code, extra) = block_length_code(length);
    writer.write_bits(codes[code] as u64, depths[code] as u32);
    writer.write_bits(extra as u64, BLOCK_LENGTH_EXTRA[code]);
}

/// Histogram a block-count value the way [`write_block_length`] will emit
/// it.
pub fn count_block_length(length: u32, histogram: &mut [u32]) {
    let (code, _) = block_length_code(length);
    histogram[code] += 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The decoder's repeat accumulation, used to verify the writer.
    fn expand(symbols: &[u8], extras: &[u8], alphabet: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut prev_nonzero = INITIAL_REPEATED_LENGTH;
        let mut repeat_symbol = 0u8;
        let mut repeat_total = 0usize;
        for (&s, &e) in symbols.iter().zip(extras) {
            match s {
                0..=15 => {
                    out.push(s);
                    if s != 0 {
                        prev_nonzero = s;
                    }
                    repeat_symbol = 0;
                }
                16 | 17 => {
                    let shift = if s == 16 { 2 } else { 3 };
                    let new_total = if repeat_symbol == s {
                        ((repeat_total - 2) << shift) + 3 + e as usize
                    } else {
                        3 + e as usize
                    };
                    let delta = if repeat_symbol == s {
                        new_total - repeat_total
                    } else {
                        new_total
                    };
                    repeat_symbol = s;
                    repeat_total = new_total;
                    let value = if s == 16 { prev_nonzero } else { 0 };
                    for _ in 0..delta {
                        out.push(value);
                    }
                }
                _ => unreachable!(),
            }
        }
        assert!(out.len() <= alphabet);
        out.resize(alphabet, 0);
        out
    }

    #[test]
    fn test_create_tree_kraft_complete() {
        let counts = [10u32, 5, 3, 2, 1, 1, 0, 7];
        let mut depths = vec![0u8; counts.len()];
        create_huffman_tree(&counts, 15, &mut depths);
        let kraft: u32 = depths
            .iter()
            .filter(|&&d| d > 0)
            .map(|&d| 1u32 << (15 - d))
            .sum();
        assert_eq!(kraft, 1 << 15);
    }

    #[test]
    fn test_create_tree_respects_limit() {
        // Fibonacci-ish counts force deep trees without a limit.
        let counts: Vec<u32> = (0..20).map(|i| 1u32 << i.min(20)).collect();
        let mut depths = vec![0u8; counts.len()];
        create_huffman_tree(&counts, 7, &mut depths);
        assert!(depths.iter().all(|&d| d <= 7));
        let kraft: u32 = depths
            .iter()
            .filter(|&&d| d > 0)
            .map(|&d| 1u32 << (15 - d))
            .sum();
        assert_eq!(kraft, 1 << 15);
    }

    #[test]
    fn test_canonical_codes_are_prefix_free() {
        let depths = [3u8, 3, 3, 3, 3, 2, 4, 4];
        let codes = convert_bit_depths_to_symbols(&depths);
        for i in 0..depths.len() {
            for j in 0..depths.len() {
                if i == j {
                    continue;
                }
                let short = depths[i].min(depths[j]) as u32;
                let mask = (1u16 << short) - 1;
                // LSB-first codes: a shared low-bit prefix of the shorter
                // length would be ambiguous.
                assert!(
                    (codes[i] & mask) != (codes[j] & mask)
                        || depths[i] == depths[j],
                    "codes {i} and {j} collide"
                );
            }
        }
    }

    #[test]
    fn test_rle_writer_roundtrip() {
        // Runs of every flavor: zeros, repeated values, mixed tails.
        let mut cases: Vec<Vec<u8>> = vec![
            vec![8; 256],
            vec![3; 8],
            vec![0, 0, 0, 5, 5, 5, 5, 5, 0, 0, 0, 0, 0, 0, 0, 2],
            vec![1, 2, 3, 4, 5, 0, 0, 0, 0, 7],
        ];
        for reps in [1usize, 2, 3, 4, 6, 7, 10, 11, 20, 59, 64, 100, 300] {
            let mut v = vec![4u8; reps];
            v.push(5);
            cases.push(v);
            let mut v = vec![0u8; reps];
            v.push(9);
            cases.push(v);
        }
        for case in cases {
            let alphabet = case.len().max(64);
            let mut padded = case.clone();
            padded.resize(alphabet, 0);
            let mut symbols = Vec::new();
            let mut extras = Vec::new();
            write_huffman_tree(&padded, &mut symbols, &mut extras);
            assert_eq!(
                expand(&symbols, &extras, alphabet),
                padded,
                "case {case:?}"
            );
        }
    }
}
