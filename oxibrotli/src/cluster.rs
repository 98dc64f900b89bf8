//! Agglomerative histogram clustering.
//!
//! Block types and literal/distance contexts start with one histogram each;
//! merging histograms whose union codes almost as cheaply as the parts
//! shrinks the number of prefix codes (and context-map clusters) the
//! metablock has to transmit. Candidate merges live in a bounded list
//! ordered by cost improvement; after each merge, pairs touching the merged
//! clusters are retired and fresh candidates against the union are added.

use crate::histogram::Histogram;

/// A candidate merge of two clusters, keyed by the cost delta of merging.
#[derive(Debug, Clone, Copy, PartialEq)]
struct MergePair {
    cost_diff: f64,
    a: usize,
    b: usize,
}

/// Cost of coding `a` and `b` together, given their separate cached costs.
fn merge_cost(a: &Histogram, b: &Histogram, cost_a: f64, cost_b: f64) -> f64 {
    let mut merged = a.clone();
    merged.add_histogram(b);
    merged.bit_cost() - cost_a - cost_b
}

/// Greedily merge `histograms` down to at most `max_clusters`, and beyond
/// that while a merge still reduces the estimated cost.
///
/// Returns the surviving cluster histograms and, for each input index, the
/// cluster it was assigned to.
pub fn cluster_histograms(
    histograms: Vec<Histogram>,
    max_clusters: usize,
) -> (Vec<Histogram>, Vec<u8>) {
    debug_assert!(max_clusters >= 1);
    let n = histograms.len();
    let mut clusters = histograms;
    let mut assignment: Vec<usize> = (0..n).collect();
    let mut alive: Vec<bool> = vec![true; n];

    // Empty histograms cost nothing to merge; collapsing them first keeps
    // them out of the pair bookkeeping entirely.
    let mut first_empty = None;
    for i in 0..n {
        if clusters[i].is_empty() {
            match first_empty {
                None => first_empty = Some(i),
                Some(e) => {
                    alive[i] = false;
                    assignment[i] = e;
                }
            }
        }
    }

    let mut cost: Vec<f64> = clusters.iter().map(Histogram::bit_cost).collect();
    let live: Vec<usize> = (0..n).filter(|&i| alive[i]).collect();
    let mut alive_count = live.len();

    // Candidate-pair budget; the hard cap bounds both memory and the
    // reseed work for very fragmented inputs.
    let max_pairs = (64 * alive_count)
        .max(alive_count * alive_count / 2)
        .min(1 << 16);

    let seed =
        |clusters: &[Histogram], cost: &[f64], alive: &[bool], pairs: &mut Vec<MergePair>| {
            pairs.clear();
            let live: Vec<usize> = (0..clusters.len()).filter(|&i| alive[i]).collect();
            'seed: for (x, &i) in live.iter().enumerate() {
                for &j in &live[x + 1..] {
                    pairs.push(MergePair {
                        cost_diff: merge_cost(&clusters[i], &clusters[j], cost[i], cost[j]),
                        a: i,
                        b: j,
                    });
                    if pairs.len() >= max_pairs {
                        break 'seed;
                    }
                }
            }
        };

    let mut pairs: Vec<MergePair> = Vec::new();
    seed(&clusters, &cost, &alive, &mut pairs);

    while alive_count > 1 {
        if pairs.is_empty() {
            // The truncated candidate list ran dry; reseed from the
            // surviving clusters.
            seed(&clusters, &cost, &alive, &mut pairs);
            if pairs.is_empty() {
                break;
            }
        }
        let best = pairs
            .iter()
            .copied()
            .min_by(|p, q| p.cost_diff.partial_cmp(&q.cost_diff).unwrap());
        let Some(best) = best else {
            break;
        };
        if alive_count <= max_clusters && best.cost_diff > 0.0 {
            break;
        }

        let (a, b) = (best.a, best.b);
        let other = clusters[b].clone();
        clusters[a].add_histogram(&other);
        cost[a] = clusters[a].bit_cost();
        alive[b] = false;
        alive_count -= 1;
        for slot in assignment.iter_mut() {
            if *slot == b {
                *slot = a;
            }
        }

        pairs.retain(|p| p.a != a && p.b != a && p.a != b && p.b != b);
        for j in 0..n {
            if j != a && alive[j] && pairs.len() < max_pairs {
                pairs.push(MergePair {
                    cost_diff: merge_cost(&clusters[a], &clusters[j], cost[a], cost[j]),
                    a,
                    b: j,
                });
            }
        }
    }

    // Compact the surviving clusters and renumber assignments.
    let mut remap = vec![u8::MAX; n];
    let mut result = Vec::new();
    for i in 0..n {
        if alive[i] {
            remap[i] = result.len() as u8;
            result.push(clusters[i].clone());
        }
    }
    let map = assignment.iter().map(|&slot| remap[slot]).collect();
    (result, map)
}
