//! Entropy-cost-aware command selection (qualities 10-11).
//!
//! Instead of taking the greedy best match, the Zopfli pass runs a
//! shortest-path search over per-position nodes where edge weights are
//! estimated bit costs: a node update means "a command ending here would be
//! cheaper via this start, match and length". Candidate commands come from
//! the binary-tree hasher and from the distance cache carried on each
//! node's path.
//!
//! Quality 10 runs one pass with literal-frequency costs; quality 11 reruns
//! the search with costs measured from the first pass's commands.

use crate::backref::{command_for_match, DistanceParams};
use crate::command::{
    copy_length_code, encode_distance, insert_length_code, Command, DistanceRing,
};
use crate::hash::{Match, TreeHasher};
use crate::histogram::Histogram;
use crate::tables::{
    combine_length_codes, COPY_LENGTH_EXTRA, INSERT_LENGTH_EXTRA, NUM_COMMAND_SYMBOLS,
    NUM_DISTANCE_SYMBOLS,
};

/// Matches at least this long terminate the candidate sweep (and trigger
/// the long-copy skip).
fn max_zopfli_len(quality: u32) -> usize {
    if quality <= 10 {
        150
    } else {
        325
    }
}

/// Start positions evaluated per node update round.
fn max_zopfli_candidates(quality: u32) -> usize {
    if quality <= 10 {
        1
    } else {
        5
    }
}

/// Cost of an unseen symbol in a measured model.
const UNSEEN_SYMBOL_COST: f32 = 30.0;

/// One DP node: the cheapest known command ending at this position.
#[derive(Debug, Clone, Copy)]
struct ZopfliNode {
    cost: f32,
    insert_len: u32,
    copy_len: u32,
    distance: u32,
    /// Short code + 1 when the distance came from the cache; 0 otherwise.
    short_code: u8,
}

impl ZopfliNode {
    const UNREACHABLE: ZopfliNode = ZopfliNode {
        cost: f32::INFINITY,
        insert_len: 0,
        copy_len: 0,
        distance: 0,
        short_code: 0,
    };
}

/// Bit-cost model for the DP.
#[derive(Debug)]
struct CostModel {
    /// Cumulative literal cost: `literal_costs[i]` covers the first `i`
    /// slab bytes.
    literal_costs: Vec<f32>,
    cost_cmd: Vec<f32>,
    cost_dist: Vec<f32>,
}

impl CostModel {
    /// First-pass model: measured literal frequencies, synthetic command
    /// and distance costs that mildly prefer small symbols.
    fn from_literals(data: &[u8], from: usize, to: usize) -> Self {
        let mut counts = [0u32; 256];
        for &b in &data[from..to] {
            counts[b as usize] += 1;
        }
        let total = (to - from).max(1) as f32;
        let mut byte_cost = [0f32; 256];
        for (b, &c) in counts.iter().enumerate() {
            // Add-half smoothing keeps rare bytes finite.
            let p = (c as f32 + 0.5) / (total + 128.0);
            byte_cost[b] = -p.log2();
        }
        let mut literal_costs = Vec::with_capacity(to - from + 1);
        literal_costs.push(0.0);
        let mut acc = 0.0f32;
        for &b in &data[from..to] {
            acc += byte_cost[b as usize];
            literal_costs.push(acc);
        }
        let cost_cmd = (0..NUM_COMMAND_SYMBOLS)
            .map(|i| (11.0 + i as f32).log2())
            .collect();
        let cost_dist = (0..NUM_DISTANCE_SYMBOLS)
            .map(|i| (20.0 + i as f32).log2())
            .collect();
        Self {
            literal_costs,
            cost_cmd,
            cost_dist,
        }
    }

    /// Second-pass model: costs measured from a previous pass's commands.
    fn from_path(
        data: &[u8],
        from: usize,
        to: usize,
        path: &[PathStep],
        params: DistanceParams,
        initial_ring: DistanceRing,
    ) -> Self {
        let mut literal_hist = Histogram::new(256);
        let mut cmd_hist = Histogram::new(NUM_COMMAND_SYMBOLS);
        let mut dist_hist = Histogram::new(NUM_DISTANCE_SYMBOLS);

        let mut ring = initial_ring;
        let mut pos = from;
        for step in path {
            for i in 0..step.insert_len as usize {
                literal_hist.add(data[pos + i] as usize);
            }
            pos += step.insert_len as usize;
            let cmd = command_for_match(
                step.insert_len,
                step.copy_len,
                step.distance as usize,
                params,
                &mut ring,
            );
            cmd_hist.add(cmd.cmd_prefix as usize);
            if cmd.has_explicit_distance() {
                dist_hist.add(cmd.distance_symbol() as usize);
            }
            pos += step.copy_len as usize;
        }
        for &b in &data[pos..to] {
            literal_hist.add(b as usize);
        }

        let measured = |hist: &Histogram| -> Vec<f32> {
            let total = hist.total.max(1) as f32;
            hist.counts
                .iter()
                .map(|&c| {
                    if c == 0 {
                        UNSEEN_SYMBOL_COST
                    } else {
                        -((c as f32) / total).log2()
                    }
                })
                .collect()
        };

        let byte_cost = measured(&literal_hist);
        let mut literal_costs = Vec::with_capacity(to - from + 1);
        literal_costs.push(0.0);
        let mut acc = 0.0f32;
        for &b in &data[from..to] {
            acc += byte_cost[b as usize];
            literal_costs.push(acc);
        }
        Self {
            literal_costs,
            cost_cmd: measured(&cmd_hist),
            cost_dist: measured(&dist_hist),
        }
    }

    /// Literal cost of slab range `[a, b)`.
    #[inline]
    fn literal_range(&self, a: usize, b: usize) -> f32 {
        self.literal_costs[b] - self.literal_costs[a]
    }

    /// Estimated bits for a whole command.
    fn command_cost(&self, insert_len: u32, copy_len: u32, dist: &DistanceCost) -> f32 {
        let icode = insert_length_code(insert_len);
        let ccode = copy_length_code(copy_len);
        let implicit = matches!(dist, DistanceCost::Implicit) && icode < 8 && ccode < 16;
        let symbol = combine_length_codes(icode, ccode, implicit);
        let mut cost = self.cost_cmd[symbol as usize]
            + INSERT_LENGTH_EXTRA[icode as usize] as f32
            + COPY_LENGTH_EXTRA[ccode as usize] as f32;
        match *dist {
            DistanceCost::Implicit => {
                if !implicit {
                    cost += self.cost_dist[0];
                }
            }
            DistanceCost::Short(code) => cost += self.cost_dist[code as usize],
            DistanceCost::Fresh(symbol, nbits) => {
                cost += self.cost_dist[symbol as usize] + nbits as f32;
            }
        }
        cost
    }
}

#[derive(Debug)]
enum DistanceCost {
    Implicit,
    Short(u16),
    Fresh(u16, u32),
}

/// One command of a backtracked path.
#[derive(Debug, Clone, Copy)]
struct PathStep {
    insert_len: u32,
    copy_len: u32,
    distance: u32,
}

/// Bounded queue of candidate command starts, cheapest-versus-literals
/// first; earlier positions win ties.
#[derive(Debug)]
struct StartPosQueue {
    entries: Vec<(f32, usize)>,
}

impl StartPosQueue {
    const CAPACITY: usize = 8;

    fn new() -> Self {
        Self {
            entries: Vec::with_capacity(Self::CAPACITY),
        }
    }

    fn push(&mut self, cost_diff: f32, pos: usize) {
        let idx = self
            .entries
            .partition_point(|&(c, p)| c < cost_diff || (c == cost_diff && p < pos));
        self.entries.insert(idx, (cost_diff, pos));
        self.entries.truncate(Self::CAPACITY);
    }

    fn starts(&self, limit: usize) -> impl Iterator<Item = usize> + '_ {
        self.entries.iter().take(limit).map(|&(_, p)| p)
    }
}

/// Run the shortest-path search over `data[from..to]`.
fn compute_shortest_path(
    data: &[u8],
    from: usize,
    to: usize,
    max_backward_cap: usize,
    params: DistanceParams,
    quality: u32,
    model: &CostModel,
    hasher: &mut TreeHasher,
    initial_ring: DistanceRing,
) -> Vec<PathStep> {
    let n = to - from;
    let mut nodes = vec![ZopfliNode::UNREACHABLE; n + 1];
    nodes[0].cost = 0.0;
    let mut caches = vec![initial_ring; n + 1];

    let zopfli_len = max_zopfli_len(quality);
    let candidates = max_zopfli_candidates(quality);
    let mut queue = StartPosQueue::new();
    let mut matches: Vec<Match> = Vec::new();

    let mut i = 0usize;
    while i + 2 <= n {
        let pos = from + i;
        if nodes[i].cost.is_finite() {
            queue.push(nodes[i].cost - model.literal_costs[i], i);
        }

        let max_length = n - i;
        let max_backward = max_backward_cap.min(pos);
        hasher.find_all_matches(data, pos, max_length, max_backward, &mut matches);
        let longest = matches.last().map_or(0, |m| m.len);

        // Over-long matches dominate everything; keep only the longest and
        // skip the positions it covers.
        let skip = longest > zopfli_len;
        if skip {
            matches.drain(..matches.len() - 1);
        }

        for (slot, s) in queue.starts(candidates).enumerate() {
            debug_assert!(s <= i);
            let base = nodes[s].cost + model.literal_range(s, i);
            let insert_len = (i - s) as u32;
            let mut best_len = 1usize;

            // Distance-cache candidates on this path.
            let cache = caches[s];
            for code in 0..16usize {
                let d = cache.substitute(code);
                if d <= 0 || d as usize > max_backward {
                    continue;
                }
                let d = d as usize;
                let len = crate::hash::find_match_length(data, pos - d, pos, max_length);
                if len <= best_len {
                    continue;
                }
                let dist_cost = if code == 0 {
                    DistanceCost::Implicit
                } else {
                    DistanceCost::Short(code as u16)
                };
                for l in (best_len.max(1) + 1)..=len {
                    let cost =
                        base + model.command_cost(insert_len, l as u32, &dist_cost);
                    relax(
                        &mut nodes,
                        &mut caches,
                        i + l,
                        cost,
                        insert_len,
                        l as u32,
                        d as u32,
                        code as u8 + 1,
                        &cache,
                    );
                }
                best_len = len;
            }

            // Hasher matches, for the two best starts only.
            if slot < 2 {
                let mut min_len = best_len + 1;
                for m in &matches {
                    if m.len < min_len {
                        continue;
                    }
                    let (symbol, nbits, _) =
                        encode_distance(m.distance as u32, params.npostfix, params.ndirect);
                    let dist_cost = DistanceCost::Fresh(symbol, nbits);
                    for l in min_len..=m.len {
                        let cost = base + model.command_cost(insert_len, l as u32, &dist_cost);
                        relax(
                            &mut nodes,
                            &mut caches,
                            i + l,
                            cost,
                            insert_len,
                            l as u32,
                            m.distance as u32,
                            0,
                            &cache,
                        );
                    }
                    min_len = m.len + 1;
                }
            }
        }

        if skip && longest > 1 {
            // Keep the hasher populated across the skipped span.
            let stop = (i + longest).min(n.saturating_sub(2));
            let mut j = i + 1;
            while j < stop {
                hasher.store(data, from + j);
                j += 1;
            }
            i += longest - 1;
        }
        i += 1;
    }

    // Cheapest way to finish: a command path to some end plus a literal
    // tail.
    let mut best_end = 0usize;
    let mut best_cost = f32::INFINITY;
    for (e, node) in nodes.iter().enumerate() {
        if !node.cost.is_finite() {
            continue;
        }
        let total = node.cost + model.literal_range(e, n);
        if total < best_cost {
            best_cost = total;
            best_end = e;
        }
    }

    let mut path = Vec::new();
    let mut e = best_end;
    while e > 0 {
        let node = nodes[e];
        path.push(PathStep {
            insert_len: node.insert_len,
            copy_len: node.copy_len,
            distance: node.distance,
        });
        e -= (node.insert_len + node.copy_len) as usize;
    }
    path.reverse();
    path
}

#[allow(clippy::too_many_arguments)]
#[inline]
fn relax(
    nodes: &mut [ZopfliNode],
    caches: &mut [DistanceRing],
    target: usize,
    cost: f32,
    insert_len: u32,
    copy_len: u32,
    distance: u32,
    short_code: u8,
    cache: &DistanceRing,
) {
    if cost < nodes[target].cost {
        nodes[target] = ZopfliNode {
            cost,
            insert_len,
            copy_len,
            distance,
            short_code,
        };
        // Ring update mirrors the decoder: short code 0 reuses without
        // recording; everything else records the distance.
        let mut updated = *cache;
        if short_code != 1 {
            updated.push(distance as i32);
        }
        caches[target] = updated;
    }
}

/// Emit the final command sequence for a path, updating the live ring.
fn emit_path(
    path: &[PathStep],
    slab_len: usize,
    params: DistanceParams,
    ring: &mut DistanceRing,
) -> Vec<Command> {
    let mut commands = Vec::with_capacity(path.len() + 1);
    let mut covered = 0usize;
    for step in path {
        commands.push(command_for_match(
            step.insert_len,
            step.copy_len,
            step.distance as usize,
            params,
            ring,
        ));
        covered += (step.insert_len + step.copy_len) as usize;
    }
    if covered < slab_len {
        commands.push(Command::insert_only((slab_len - covered) as u32));
    }
    commands
}

/// Produce commands for `data[from..to]` with the Zopfli search.
///
/// Quality 11 runs the search twice, remeasuring costs in between.
pub fn zopfli_create_commands(
    data: &[u8],
    from: usize,
    to: usize,
    max_backward_cap: usize,
    params: DistanceParams,
    quality: u32,
    ring: &mut DistanceRing,
) -> Vec<Command> {
    if from == to {
        return Vec::new();
    }
    let model = CostModel::from_literals(data, from, to);
    let mut hasher = TreeHasher::new(to - from);
    let path = compute_shortest_path(
        data,
        from,
        to,
        max_backward_cap,
        params,
        quality,
        &model,
        &mut hasher,
        *ring,
    );

    let path = if quality >= 11 && to - from >= 64 {
        let model = CostModel::from_path(data, from, to, &path, params, *ring);
        let mut hasher = TreeHasher::new(to - from);
        compute_shortest_path(
            data,
            from,
            to,
            max_backward_cap,
            params,
            quality,
            &model,
            &mut hasher,
            *ring,
        )
    } else {
        path
    };

    emit_path(&path, to - from, params, ring)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> DistanceParams {
        DistanceParams {
            npostfix: 0,
            ndirect: 0,
        }
    }

    fn total_bytes(commands: &[Command]) -> usize {
        commands.iter().map(|c| c.num_bytes() as usize).sum()
    }

    #[test]
    fn test_path_covers_input() {
        let mut data = Vec::new();
        for i in 0..400u32 {
            data.push((i % 251) as u8);
        }
        data.extend_from_within(0..200);
        let mut ring = DistanceRing::new();
        let commands =
            zopfli_create_commands(&data, 0, data.len(), 1 << 20, params(), 10, &mut ring);
        assert_eq!(total_bytes(&commands), data.len());
        assert!(commands.iter().any(|c| c.copy_len > 0));
    }

    #[test]
    fn test_two_pass_covers_input() {
        let mut data = Vec::new();
        for _ in 0..40 {
            data.extend_from_slice(b"the quick brown fox jumps over the lazy dog. ");
        }
        let mut ring = DistanceRing::new();
        let commands =
            zopfli_create_commands(&data, 0, data.len(), 1 << 20, params(), 11, &mut ring);
        assert_eq!(total_bytes(&commands), data.len());
        let copied: usize = commands.iter().map(|c| c.copy_len as usize).sum();
        assert!(copied * 2 > data.len(), "repeats should be copied");
    }

    #[test]
    fn test_incompressible_input_is_literals() {
        let mut state = 0x9E37_79B9u32;
        let data: Vec<u8> = (0..128)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state >> 24) as u8
            })
            .collect();
        let mut ring = DistanceRing::new();
        let commands =
            zopfli_create_commands(&data, 0, data.len(), 1 << 20, params(), 10, &mut ring);
        assert_eq!(total_bytes(&commands), data.len());
    }

    #[test]
    fn test_long_repeat_uses_skip() {
        let data = vec![b'z'; 4096];
        let mut ring = DistanceRing::new();
        let commands =
            zopfli_create_commands(&data, 0, data.len(), 1 << 20, params(), 10, &mut ring);
        assert_eq!(total_bytes(&commands), data.len());
        // A distance-1 run compresses to very few commands.
        assert!(commands.len() < 64);
    }
}
