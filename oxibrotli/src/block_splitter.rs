//! Block splitting for the literal, command and distance streams.
//!
//! A block split partitions one symbol stream into typed runs so each type
//! can carry its own entropy codes. The search follows the classic shape:
//! seed a handful of histograms from sampled strides, refine them with more
//! samples, assign every symbol to its cheapest histogram with a Viterbi
//! pass that charges for switching, rebuild histograms from the assignment,
//! iterate, and finally cluster the resulting runs down to the type count
//! actually worth transmitting.

use crate::cluster::cluster_histograms;
use crate::histogram::Histogram;

/// Base bit-cost charged for a block switch.
const BLOCK_SWITCH_COST: f64 = 28.1;

/// Symbol stream prefix over which the switch penalty ramps up.
const SWITCH_COST_RAMP: usize = 2000;

/// Streams shorter than this are never split.
const MIN_LENGTH_FOR_SPLITTING: usize = 128;

/// Hard format limit on block types per stream.
const MAX_BLOCK_TYPES: usize = 256;

/// A run-length partition of one symbol stream.
#[derive(Debug, Clone)]
pub struct BlockSplit {
    /// Number of distinct block types.
    pub num_types: usize,
    /// Type of each run.
    pub types: Vec<u8>,
    /// Length of each run; sums to the stream length.
    pub lengths: Vec<u32>,
}

impl BlockSplit {
    /// A trivial split: one type covering the whole stream.
    pub fn single(len: usize) -> Self {
        if len == 0 {
            return Self {
                num_types: 1,
                types: Vec::new(),
                lengths: Vec::new(),
            };
        }
        Self {
            num_types: 1,
            types: vec![0],
            lengths: vec![len as u32],
        }
    }

    /// Iterate `(type, length)` runs.
    pub fn runs(&self) -> impl Iterator<Item = (u8, u32)> + '_ {
        self.types.iter().copied().zip(self.lengths.iter().copied())
    }
}

/// Small deterministic generator for sampling positions.
#[derive(Debug)]
struct SplitRng(u64);

impl SplitRng {
    fn next(&mut self, bound: usize) -> usize {
        // xorshift64*
        self.0 ^= self.0 >> 12;
        self.0 ^= self.0 << 25;
        self.0 ^= self.0 >> 27;
        (self.0.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 33) as usize % bound.max(1)
    }
}

fn sample_into(histogram: &mut Histogram, symbols: &[u16], start: usize, stride: usize) {
    let end = (start + stride).min(symbols.len());
    for &s in &symbols[start..end] {
        histogram.add(s as usize);
    }
}

/// Per-histogram, per-symbol insert costs in bits.
fn insert_costs(histograms: &[Histogram], alphabet: usize) -> Vec<f32> {
    let mut costs = vec![0f32; histograms.len() * alphabet];
    for (h, hist) in histograms.iter().enumerate() {
        let total = hist.total.max(1) as f64;
        let base = &mut costs[h * alphabet..(h + 1) * alphabet];
        for (s, slot) in base.iter_mut().enumerate() {
            let count = hist.counts[s] as f64;
            *slot = (-((count + 0.25) / (total + 0.25 * alphabet as f64)).log2()) as f32;
        }
    }
    costs
}

/// One Viterbi labeling pass; returns per-symbol block ids and the number
/// of runs.
fn find_blocks(
    symbols: &[u16],
    alphabet: usize,
    histograms: &[Histogram],
    block_ids: &mut [u8],
) -> usize {
    let num_hist = histograms.len();
    if num_hist < 2 {
        block_ids.fill(0);
        return 1;
    }
    let costs = insert_costs(histograms, alphabet);
    let mut acc = vec![0f64; num_hist];
    // One bit per (position, histogram): whether the optimal path entered
    // this histogram by switching here.
    let words_per_pos = num_hist.div_ceil(64);
    let mut switches = vec![0u64; symbols.len() * words_per_pos];

    for (pos, &sym) in symbols.iter().enumerate() {
        let ramp = pos.min(SWITCH_COST_RAMP) as f64 / SWITCH_COST_RAMP as f64;
        let switch_cost = BLOCK_SWITCH_COST * (0.3 + 0.7 * ramp);
        let mut min_cost = f64::INFINITY;
        let mut min_id = 0u8;
        for h in 0..num_hist {
            acc[h] += costs[h * alphabet + sym as usize] as f64;
            if acc[h] < min_cost {
                min_cost = acc[h];
                min_id = h as u8;
            }
        }
        block_ids[pos] = min_id;
        for h in 0..num_hist {
            acc[h] -= min_cost;
            if acc[h] >= switch_cost {
                acc[h] = switch_cost;
                switches[pos * words_per_pos + h / 64] |= 1u64 << (h % 64);
            }
        }
    }

    // Backward smoothing: stay in the current block unless it was entered
    // by a switch.
    let mut num_runs = 1;
    let mut cur = block_ids[symbols.len() - 1];
    for pos in (0..symbols.len() - 1).rev() {
        let entered =
            switches[(pos + 1) * words_per_pos + (cur as usize) / 64] & (1u64 << (cur as usize % 64));
        if entered != 0 && block_ids[pos] != cur {
            cur = block_ids[pos];
            num_runs += 1;
        }
        block_ids[pos] = cur;
    }
    num_runs
}

/// Rebuild one histogram per block id from the actual assignment.
fn rebuild_histograms(
    symbols: &[u16],
    alphabet: usize,
    num_hist: usize,
    block_ids: &[u8],
) -> Vec<Histogram> {
    let mut histograms: Vec<Histogram> = (0..num_hist).map(|_| Histogram::new(alphabet)).collect();
    for (&sym, &id) in symbols.iter().zip(block_ids) {
        histograms[id as usize].add(sym as usize);
    }
    histograms
}

/// Split one symbol stream into typed blocks.
///
/// `stride` is the sampling granularity, `max_types` caps the histogram
/// seed count, and `iterations` is the number of refine/label rounds (ten
/// at the highest qualities).
pub fn split_block(
    symbols: &[u16],
    alphabet: usize,
    stride: usize,
    max_types: usize,
    iterations: usize,
) -> BlockSplit {
    let len = symbols.len();
    if len < MIN_LENGTH_FOR_SPLITTING {
        return BlockSplit::single(len);
    }

    let num_hist = (len / stride + 1).min(64).min(max_types);
    if num_hist < 2 {
        return BlockSplit::single(len);
    }

    // Seed histograms from spread-out strides.
    let mut rng = SplitRng(0x6a09_e667_f3bc_c908);
    let mut histograms: Vec<Histogram> = (0..num_hist).map(|_| Histogram::new(alphabet)).collect();
    for (i, hist) in histograms.iter_mut().enumerate() {
        let base = i * len / num_hist;
        sample_into(hist, symbols, base, stride);
    }
    // Refinement samples, round-robin over histograms.
    let refine_rounds = (len / stride).min(256);
    for round in 0..refine_rounds {
        let pos = rng.next(len.saturating_sub(stride) + 1);
        sample_into(&mut histograms[round % num_hist], symbols, pos, stride);
    }

    let mut block_ids = vec![0u8; len];
    for _ in 0..iterations {
        find_blocks(symbols, alphabet, &histograms, &mut block_ids);
        histograms = rebuild_histograms(symbols, alphabet, num_hist, &block_ids);
    }
    find_blocks(symbols, alphabet, &histograms, &mut block_ids);

    // Collapse the labeling into runs.
    let mut run_ids = Vec::new();
    let mut run_lengths: Vec<u32> = Vec::new();
    for &id in block_ids.iter() {
        match run_ids.last() {
            Some(&last) if last == id => *run_lengths.last_mut().unwrap() += 1,
            _ => {
                run_ids.push(id);
                run_lengths.push(1);
            }
        }
    }

    // Cluster the per-id histograms (at most 64) into the final type set;
    // runs inherit their id's cluster.
    let id_histograms = rebuild_histograms(symbols, alphabet, num_hist, &block_ids);
    let (_, id_types) = cluster_histograms(id_histograms, MAX_BLOCK_TYPES);

    // Renumber types by first appearance and merge adjacent same-type runs.
    let mut order = vec![u8::MAX; num_hist];
    let mut next_type = 0u8;
    let mut types = Vec::new();
    let mut lengths: Vec<u32> = Vec::new();
    for (i, &id) in run_ids.iter().enumerate() {
        let cluster = id_types[id as usize];
        if order[cluster as usize] == u8::MAX {
            order[cluster as usize] = next_type;
            next_type += 1;
        }
        let ty = order[cluster as usize];
        match types.last() {
            Some(&last) if last == ty => *lengths.last_mut().unwrap() += run_lengths[i],
            _ => {
                types.push(ty);
                lengths.push(run_lengths[i]);
            }
        }
    }

    BlockSplit {
        num_types: next_type as usize,
        types,
        lengths,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_stream_single_type() {
        let symbols: Vec<u16> = (0..100).map(|i| (i % 7) as u16).collect();
        let split = split_block(&symbols, 64, 40, 64, 3);
        assert_eq!(split.num_types, 1);
        assert_eq!(split.lengths.iter().sum::<u32>() as usize, symbols.len());
    }

    #[test]
    fn test_lengths_cover_stream() {
        let mut symbols = Vec::new();
        for i in 0..3000u32 {
            symbols.push((i % 13) as u16);
        }
        let split = split_block(&symbols, 64, 40, 64, 3);
        assert_eq!(split.lengths.iter().sum::<u32>() as usize, symbols.len());
        assert_eq!(split.types.len(), split.lengths.len());
        assert!(split.num_types >= 1 && split.num_types <= MAX_BLOCK_TYPES);
        for &t in &split.types {
            assert!((t as usize) < split.num_types);
        }
    }

    #[test]
    fn test_two_phase_stream_gets_split() {
        // First half draws from one alphabet region, second half from
        // another; the split should notice.
        let mut symbols = Vec::new();
        let mut rng = SplitRng(42);
        for _ in 0..4000 {
            symbols.push(rng.next(8) as u16);
        }
        for _ in 0..4000 {
            symbols.push(200 + rng.next(8) as u16);
        }
        let split = split_block(&symbols, 256, 70, 64, 3);
        assert!(split.num_types >= 2, "expected a split, got {split:?}");
        assert_eq!(split.lengths.iter().sum::<u32>() as usize, symbols.len());
    }

    #[test]
    fn test_uniform_stream_stays_single() {
        let symbols = vec![7u16; 5000];
        let split = split_block(&symbols, 64, 40, 64, 3);
        assert_eq!(split.num_types, 1);
    }
}
