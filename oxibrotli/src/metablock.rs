//! Metablock assembly and serialization.
//!
//! Takes a command sequence and writes one complete metablock: header,
//! block-split codes, distance parameters, context modes and maps, prefix
//! codes, then the command stream itself. Symbol histograms are gathered
//! from the exact streams the writer later walks, so the trees always match
//! their payload.
//!
//! Small or low-quality metablocks use the trivial layout: single block
//! types, no context modeling, one tree per alphabet.

use crate::block_splitter::{split_block, BlockSplit};
use crate::cluster::cluster_histograms;
use crate::command::{copy_length_code, insert_length_code, Command};
use crate::context::{distance_context, literal_context, ContextMode};
use crate::entropy::{
    build_and_store_huffman_tree, count_block_length, write_block_length,
};
use crate::histogram::Histogram;
use crate::tables::{
    distance_alphabet_size, write_block_type_count, COPY_LENGTH_BASE, COPY_LENGTH_EXTRA,
    INSERT_LENGTH_BASE, INSERT_LENGTH_EXTRA, NUM_COMMAND_SYMBOLS, NUM_LITERAL_SYMBOLS,
};
use oxibrotli_core::bitstream::BitWriter;
use oxibrotli_core::error::{BrotliError, Result};

/// Quality-independent parameters the serializer needs.
#[derive(Debug, Clone, Copy)]
pub struct MetablockParams {
    /// Encoder quality (0-11).
    pub quality: u32,
    /// NPOSTFIX for the distance alphabet.
    pub npostfix: u32,
    /// NDIRECT for the distance alphabet.
    pub ndirect: u32,
}

/// The streams a command sequence expands into.
struct Streams {
    literals: Vec<u8>,
    literal_contexts: Vec<u8>,
    cmd_symbols: Vec<u16>,
    dist_symbols: Vec<u16>,
    dist_extra: Vec<(u32, u32)>,
    dist_contexts: Vec<u8>,
    mlen: usize,
}

fn byte_before(data: &[u8], pos: usize, back: usize, prev1: u8, prev2: u8) -> u8 {
    if pos >= back {
        data[pos - back]
    } else if back - pos == 1 {
        prev1
    } else {
        prev2
    }
}

fn build_streams(
    data: &[u8],
    from: usize,
    commands: &[Command],
    mode: ContextMode,
    prev1: u8,
    prev2: u8,
) -> Streams {
    let mut streams = Streams {
        literals: Vec::new(),
        literal_contexts: Vec::new(),
        cmd_symbols: Vec::with_capacity(commands.len()),
        dist_symbols: Vec::new(),
        dist_extra: Vec::new(),
        dist_contexts: Vec::new(),
        mlen: 0,
    };
    let mut pos = from;
    for cmd in commands {
        streams.cmd_symbols.push(cmd.cmd_prefix);
        for i in 0..cmd.insert_len as usize {
            let g = pos + i;
            streams.literals.push(data[g]);
            let p1 = byte_before(data, g, 1, prev1, prev2);
            let p2 = byte_before(data, g, 2, prev1, prev2);
            streams
                .literal_contexts
                .push(literal_context(mode, p1, p2) as u8);
        }
        pos += cmd.insert_len as usize;
        if cmd.has_explicit_distance() {
            streams.dist_symbols.push(cmd.distance_symbol());
            streams
                .dist_extra
                .push((cmd.distance_extra_bits(), cmd.dist_extra));
            streams.dist_contexts.push(distance_context(cmd.copy_len) as u8);
        }
        pos += cmd.copy_len as usize;
    }
    streams.mlen = pos - from;
    streams
}

/// Pick the literal context mode by scanning the slab: UTF-8-looking data
/// models well on the text tables, everything else on signed magnitudes.
fn choose_context_mode(data: &[u8]) -> ContextMode {
    if data.is_empty() {
        return ContextMode::Utf8;
    }
    let mut i = 0usize;
    let mut utf8_like = 0usize;
    let mut chars = 0usize;
    while i < data.len() {
        let b = data[i];
        chars += 1;
        if b < 0x80 {
            utf8_like += 1;
            i += 1;
        } else if b >= 0xC0 && i + 1 < data.len() && (data[i + 1] & 0xC0) == 0x80 {
            utf8_like += 1;
            i += if b >= 0xE0 { 3 } else { 2 };
        } else {
            i += 1;
        }
    }
    if utf8_like * 4 >= chars * 3 {
        ContextMode::Utf8
    } else {
        ContextMode::Signed
    }
}

/// Write the metablock length header: MNIBBLES then MLEN - 1.
fn write_metablock_length(writer: &mut BitWriter, mlen: usize) -> Result<()> {
    debug_assert!(mlen >= 1);
    if mlen > 1 << 24 {
        return Err(BrotliError::api_misuse("metablock longer than 16 MiB"));
    }
    let value = (mlen - 1) as u64;
    let nibbles = if value < 1 << 16 {
        4
    } else if value < 1 << 20 {
        5
    } else {
        6
    };
    writer.write_bits(nibbles as u64 - 4, 2);
    writer.write_bits(value, 4 * nibbles);
    Ok(())
}

/// Emit an empty last metablock (`ISLAST` + `ISEMPTY`).
pub fn store_empty_last_metablock(writer: &mut BitWriter) {
    writer.write_bit(true);
    writer.write_bit(true);
}

/// Emit one uncompressed metablock. Never flagged last: ISUNCOMPRESSED
/// only exists on non-last metablocks.
pub fn store_uncompressed_metablock(writer: &mut BitWriter, data: &[u8]) -> Result<()> {
    debug_assert!(!data.is_empty());
    writer.write_bit(false); // ISLAST
    write_metablock_length(writer, data.len())?;
    writer.write_bit(true); // ISUNCOMPRESSED
    writer.align_to_byte();
    writer.write_bytes(data);
    Ok(())
}

/// Block-type code state, mirroring the decoder's previous/next rules.
struct TypeCodeCalculator {
    cur: u32,
    prev: u32,
    num_types: u32,
}

impl TypeCodeCalculator {
    fn new(num_types: u32) -> Self {
        Self {
            cur: 0,
            prev: 1,
            num_types,
        }
    }

    fn code_for(&mut self, next_type: u32) -> u32 {
        let code = if next_type == self.prev {
            0
        } else if next_type == (self.cur + 1) % self.num_types {
            1
        } else {
            next_type + 2
        };
        self.prev = self.cur;
        self.cur = next_type;
        code
    }
}

/// Serialized per-stream block-split code plus the cursor used while
/// emitting payload symbols.
struct BlockSplitCode {
    split: BlockSplit,
    type_depths: Vec<u8>,
    type_codes: Vec<u16>,
    length_depths: Vec<u8>,
    length_codes: Vec<u16>,
    run_idx: usize,
    remaining: u32,
    cur_type: u32,
    calculator: TypeCodeCalculator,
}

impl BlockSplitCode {
    /// Count, build and write the split's type and length codes, and the
    /// first block length.
    fn build_and_store(split: BlockSplit, writer: &mut BitWriter) -> Self {
        let num_types = split.num_types as u32;
        write_block_type_count(writer, num_types);
        if num_types < 2 {
            return Self {
                split,
                type_depths: Vec::new(),
                type_codes: Vec::new(),
                length_depths: Vec::new(),
                length_codes: Vec::new(),
                run_idx: 0,
                remaining: u32::MAX,
                cur_type: 0,
                calculator: TypeCodeCalculator::new(1),
            };
        }

        let mut type_hist = vec![0u32; num_types as usize + 2];
        let mut length_hist = vec![0u32; crate::tables::NUM_BLOCK_LENGTH_SYMBOLS];
        let mut calc = TypeCodeCalculator::new(num_types);
        for (i, (ty, len)) in split.runs().enumerate() {
            if i > 0 {
                type_hist[calc.code_for(ty as u32) as usize] += 1;
            }
            count_block_length(len, &mut length_hist);
        }

        let (type_depths, type_codes) = build_and_store_huffman_tree(&type_hist, writer);
        let (length_depths, length_codes) = build_and_store_huffman_tree(&length_hist, writer);
        write_block_length(split.lengths[0], &length_depths, &length_codes, writer);

        let first_len = split.lengths[0];
        Self {
            split,
            type_depths,
            type_codes,
            length_depths,
            length_codes,
            run_idx: 0,
            remaining: first_len,
            cur_type: 0,
            calculator: TypeCodeCalculator::new(num_types),
        }
    }

    /// Account one payload symbol; emits a block-switch command when the
    /// current run is exhausted.
    fn tick(&mut self, writer: &mut BitWriter) {
        if self.split.num_types < 2 {
            return;
        }
        if self.remaining == 0 {
            self.run_idx += 1;
            let ty = self.split.types[self.run_idx] as u32;
            let len = self.split.lengths[self.run_idx];
            let code = self.calculator.code_for(ty);
            writer.write_bits(
                self.type_codes[code as usize] as u64,
                self.type_depths[code as usize] as u32,
            );
            write_block_length(len, &self.length_depths, &self.length_codes, writer);
            self.cur_type = ty;
            self.remaining = len;
        }
        self.remaining -= 1;
    }
}

/// Forward move-to-front transform (the decoder applies the inverse).
fn move_to_front_transform(map: &mut [u8]) {
    let mut mtf: Vec<u8> = (0..=255u8).collect();
    for value in map.iter_mut() {
        let idx = mtf.iter().position(|&v| v == *value).unwrap();
        let v = mtf.remove(idx);
        mtf.insert(0, v);
        *value = idx as u8;
    }
}

/// Encode one context map: cluster count, optional zero-RLE, the symbol
/// tree, the RLE symbols, and the IMTF flag.
fn encode_context_map(writer: &mut BitWriter, map: &[u8], num_clusters: u32) {
    write_block_type_count(writer, num_clusters);
    if num_clusters < 2 {
        return;
    }

    let mut transformed = map.to_vec();
    move_to_front_transform(&mut transformed);

    // Zero runs decide the RLE parameter.
    let mut longest_run = 0usize;
    let mut run = 0usize;
    for &v in &transformed {
        if v == 0 {
            run += 1;
            longest_run = longest_run.max(run);
        } else {
            run = 0;
        }
    }
    let rle_max: u32 = if longest_run >= 2 {
        (usize::BITS - 1 - longest_run.leading_zeros()).min(16)
    } else {
        0
    };

    // Symbol stream: runs of zeros become run-length codes, other values
    // shift past the run-length alphabet.
    let mut symbols: Vec<(u16, u32, u32)> = Vec::new();
    let mut i = 0usize;
    while i < transformed.len() {
        let v = transformed[i];
        if v == 0 {
            let mut reps = 1usize;
            while i + reps < transformed.len() && transformed[i + reps] == 0 {
                reps += 1;
            }
            i += reps;
            let mut left = reps;
            while left > 0 {
                if left == 1 || rle_max == 0 {
                    symbols.push((0, 0, 0));
                    left -= 1;
                } else {
                    let k = (usize::BITS - 1 - left.leading_zeros()).min(rle_max);
                    let take = left.min((1 << (k + 1)) - 1);
                    symbols.push((k as u16, k, (take - (1 << k)) as u32));
                    left -= take;
                }
            }
        } else {
            symbols.push((v as u16 + rle_max as u16, 0, 0));
            i += 1;
        }
    }

    writer.write_bit(rle_max > 0);
    if rle_max > 0 {
        writer.write_bits(rle_max as u64 - 1, 4);
    }

    let mut histogram = vec![0u32; num_clusters as usize + rle_max as usize];
    for &(s, _, _) in &symbols {
        histogram[s as usize] += 1;
    }
    let (depths, codes) = build_and_store_huffman_tree(&histogram, writer);
    for &(s, nbits, extra) in &symbols {
        writer.write_bits(codes[s as usize] as u64, depths[s as usize] as u32);
        writer.write_bits(extra as u64, nbits);
    }
    writer.write_bit(true); // inverse MTF
}

/// Per-index block type lookup built from a split.
fn expand_types(split: &BlockSplit, len: usize) -> Vec<u8> {
    let mut types = Vec::with_capacity(len);
    for (ty, run_len) in split.runs() {
        for _ in 0..run_len {
            types.push(ty);
        }
    }
    debug_assert_eq!(types.len(), len);
    types
}

/// Serialize one compressed metablock for `commands` over
/// `data[from..from + mlen]`.
///
/// `prev1`/`prev2` are the two output bytes preceding the slab (zero at
/// stream start); they seed the literal context.
#[allow(clippy::too_many_arguments)]
pub fn store_metablock(
    writer: &mut BitWriter,
    data: &[u8],
    from: usize,
    commands: &[Command],
    is_last: bool,
    prev1: u8,
    prev2: u8,
    params: MetablockParams,
) -> Result<()> {
    let trivial = {
        let mlen: usize = commands.iter().map(|c| c.num_bytes() as usize).sum();
        mlen < 128 || params.quality < 5 || commands.len() < 6
    };
    let mode = if trivial {
        ContextMode::Lsb6
    } else {
        // The mode decision only needs a prefix sample of the slab.
        let scan_end = data.len().min(from + (1 << 16));
        choose_context_mode(&data[from..scan_end])
    };
    let streams = build_streams(data, from, commands, mode, prev1, prev2);

    writer.write_bit(is_last);
    if is_last && streams.mlen == 0 {
        writer.write_bit(true);
        return Ok(());
    }
    if is_last {
        writer.write_bit(false); // ISEMPTY
    }
    write_metablock_length(writer, streams.mlen)?;
    if !is_last {
        writer.write_bit(false); // ISUNCOMPRESSED
    }

    let dist_alphabet = distance_alphabet_size(params.npostfix, params.ndirect, false);
    let iterations = if params.quality >= 10 { 10 } else { 3 };

    // Block splits for the three streams.
    let (lit_split, cmd_split, dist_split) = if trivial {
        (
            BlockSplit::single(streams.literals.len()),
            BlockSplit::single(streams.cmd_symbols.len()),
            BlockSplit::single(streams.dist_symbols.len()),
        )
    } else {
        let lit16: Vec<u16> = streams.literals.iter().map(|&b| b as u16).collect();
        (
            split_block(&lit16, NUM_LITERAL_SYMBOLS, 70, 12, iterations),
            split_block(&streams.cmd_symbols, NUM_COMMAND_SYMBOLS, 40, 64, iterations),
            split_block(&streams.dist_symbols, dist_alphabet, 40, 64, iterations),
        )
    };

    let num_lit_types = lit_split.num_types;
    let num_dist_types = dist_split.num_types;
    let lit_types = expand_types(&lit_split, streams.literals.len());
    let cmd_types = expand_types(&cmd_split, streams.cmd_symbols.len());
    let dist_types = expand_types(&dist_split, streams.dist_symbols.len());

    // Literal context clustering: per (block type, context) histograms
    // collapse into the transmitted tree set.
    let (lit_map, lit_histograms) = if trivial {
        let mut h = Histogram::new(NUM_LITERAL_SYMBOLS);
        for &b in &streams.literals {
            h.add(b as usize);
        }
        (vec![0u8; 64], vec![h])
    } else {
        let mut ctx_hists: Vec<Histogram> = (0..num_lit_types * 64)
            .map(|_| Histogram::new(NUM_LITERAL_SYMBOLS))
            .collect();
        for (i, &b) in streams.literals.iter().enumerate() {
            let slot = lit_types[i] as usize * 64 + streams.literal_contexts[i] as usize;
            ctx_hists[slot].add(b as usize);
        }
        let (clusters, map) = cluster_histograms(ctx_hists, 64);
        (map, clusters)
    };

    let (dist_map, dist_histograms) = if trivial {
        let mut h = Histogram::new(dist_alphabet);
        for &s in &streams.dist_symbols {
            h.add(s as usize);
        }
        (vec![0u8; 4], vec![h])
    } else {
        let mut ctx_hists: Vec<Histogram> = (0..num_dist_types * 4)
            .map(|_| Histogram::new(dist_alphabet))
            .collect();
        for (i, &s) in streams.dist_symbols.iter().enumerate() {
            let slot = dist_types[i] as usize * 4 + streams.dist_contexts[i] as usize;
            ctx_hists[slot].add(s as usize);
        }
        let (clusters, map) = cluster_histograms(ctx_hists, 64);
        (map, clusters)
    };

    // Command histograms, one per block type.
    let mut cmd_histograms: Vec<Histogram> = (0..cmd_split.num_types)
        .map(|_| Histogram::new(NUM_COMMAND_SYMBOLS))
        .collect();
    for (i, &s) in streams.cmd_symbols.iter().enumerate() {
        cmd_histograms[cmd_types[i] as usize].add(s as usize);
    }

    // 1. Block-split codes.
    let mut lit_blocks = BlockSplitCode::build_and_store(lit_split, writer);
    let mut cmd_blocks = BlockSplitCode::build_and_store(cmd_split, writer);
    let mut dist_blocks = BlockSplitCode::build_and_store(dist_split, writer);

    // 2. Distance parameters and context modes.
    writer.write_bits(params.npostfix as u64, 2);
    writer.write_bits((params.ndirect >> params.npostfix) as u64, 4);
    for _ in 0..num_lit_types {
        writer.write_bits(mode.to_bits() as u64, 2);
    }

    // 3. Context maps.
    encode_context_map(writer, &lit_map, lit_histograms.len() as u32);
    encode_context_map(writer, &dist_map, dist_histograms.len() as u32);

    // 4. Prefix codes.
    let lit_trees: Vec<(Vec<u8>, Vec<u16>)> = lit_histograms
        .iter()
        .map(|h| build_and_store_huffman_tree(&h.counts, writer))
        .collect();
    let cmd_trees: Vec<(Vec<u8>, Vec<u16>)> = cmd_histograms
        .iter()
        .map(|h| build_and_store_huffman_tree(&h.counts, writer))
        .collect();
    let dist_trees: Vec<(Vec<u8>, Vec<u16>)> = dist_histograms
        .iter()
        .map(|h| build_and_store_huffman_tree(&h.counts, writer))
        .collect();

    // 5. The command stream.
    let mut lit_i = 0usize;
    let mut dist_i = 0usize;
    for cmd in commands {
        cmd_blocks.tick(writer);
        let (depths, codes) = &cmd_trees[cmd_blocks.cur_type as usize];
        let symbol = cmd.cmd_prefix as usize;
        writer.write_bits(codes[symbol] as u64, depths[symbol] as u32);

        let icode = insert_length_code(cmd.insert_len) as usize;
        writer.write_bits(
            (cmd.insert_len - INSERT_LENGTH_BASE[icode]) as u64,
            INSERT_LENGTH_EXTRA[icode],
        );
        let ccode = copy_length_code(cmd.copy_len_code) as usize;
        writer.write_bits(
            (cmd.copy_len_code - COPY_LENGTH_BASE[ccode]) as u64,
            COPY_LENGTH_EXTRA[ccode],
        );

        for _ in 0..cmd.insert_len {
            lit_blocks.tick(writer);
            let tree = lit_map
                [lit_blocks.cur_type as usize * 64 + streams.literal_contexts[lit_i] as usize]
                as usize;
            let (depths, codes) = &lit_trees[tree];
            let byte = streams.literals[lit_i] as usize;
            writer.write_bits(codes[byte] as u64, depths[byte] as u32);
            lit_i += 1;
        }

        if cmd.has_explicit_distance() {
            dist_blocks.tick(writer);
            let tree = dist_map
                [dist_blocks.cur_type as usize * 4 + streams.dist_contexts[dist_i] as usize]
                as usize;
            let (depths, codes) = &dist_trees[tree];
            let symbol = streams.dist_symbols[dist_i] as usize;
            writer.write_bits(codes[symbol] as u64, depths[symbol] as u32);
            let (nbits, extra) = streams.dist_extra[dist_i];
            writer.write_bits(extra as u64, nbits);
            dist_i += 1;
        }
    }
    debug_assert_eq!(lit_i, streams.literals.len());
    debug_assert_eq!(dist_i, streams.dist_symbols.len());
    Ok(())
}
