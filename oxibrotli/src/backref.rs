//! Greedy backward-reference construction (qualities 1-9).
//!
//! Scans the input with the quality-selected hasher, emitting a command per
//! accepted match and folding unmatched bytes into the next command's
//! literal run. A one-position lazy probe defers a match when the next
//! position hides a longer one.
//!
//! The distance ring is simulated with exactly the decoder's update rules,
//! so short-code substitutions always resolve to the same distances on both
//! sides.

use crate::command::{encode_distance, find_short_code, Command, DistanceRing};
use crate::hash::Hasher;

/// Distance-coding parameters fixed for a stream.
#[derive(Debug, Clone, Copy)]
pub struct DistanceParams {
    /// NPOSTFIX (0-3).
    pub npostfix: u32,
    /// NDIRECT (multiple of `1 << npostfix`, 0-120).
    pub ndirect: u32,
}

/// Build the command for one accepted match and update the simulated ring.
pub fn command_for_match(
    insert_len: u32,
    copy_len: u32,
    distance: usize,
    params: DistanceParams,
    ring: &mut DistanceRing,
) -> Command {
    match find_short_code(distance as i64, ring) {
        Some(0) => {
            // Last-distance reuse: prefer the implicit cell; the explicit
            // fallback emits short code 0. Neither updates the ring.
            Command::new(insert_len, copy_len, 0, 0, 0, true)
        }
        Some(code) => {
            // Short codes 1-15 re-emit a cached distance and do update the
            // ring.
            ring.push(distance as i32);
            Command::new(insert_len, copy_len, code, 0, 0, false)
        }
        None => {
            let (symbol, nbits, extra) = encode_distance(distance as u32, params.npostfix, params.ndirect);
            ring.push(distance as i32);
            Command::new(insert_len, copy_len, symbol, nbits, extra, false)
        }
    }
}

/// Greedily turn `data[from..to]` into commands.
///
/// `max_backward_cap` is the window limit (`2^lgwin - 16`); candidate
/// distances are additionally capped by the position so every match is
/// verifiable inside `data`.
pub fn create_backward_references(
    data: &[u8],
    from: usize,
    to: usize,
    max_backward_cap: usize,
    params: DistanceParams,
    hasher: &mut Hasher,
    ring: &mut DistanceRing,
) -> Vec<Command> {
    let mut commands = Vec::new();
    let mut pos = from;
    let mut insert_len = 0u32;

    while pos + 4 <= to {
        let max_length = to - pos;
        let max_backward = max_backward_cap.min(pos);
        let Some(m) = hasher.find_longest_match(data, pos, max_length, max_backward, ring) else {
            hasher.store(data, pos);
            insert_len += 1;
            pos += 1;
            continue;
        };

        // Lazy probe: a longer match one byte later wins the byte as a
        // literal.
        if pos + 1 + 4 <= to {
            hasher.store(data, pos);
            let next = hasher.find_longest_match(
                data,
                pos + 1,
                max_length - 1,
                max_backward_cap.min(pos + 1),
                ring,
            );
            if let Some(next) = next {
                if next.len > m.len {
                    insert_len += 1;
                    pos += 1;
                    let cmd =
                        command_for_match(insert_len, next.len as u32, next.distance, params, ring);
                    commands.push(cmd);
                    hasher.store_range(data, pos + 1, (pos + next.len).min(to));
                    pos += next.len;
                    insert_len = 0;
                    continue;
                }
            }
            let cmd = command_for_match(insert_len, m.len as u32, m.distance, params, ring);
            commands.push(cmd);
            hasher.store_range(data, pos + 1, (pos + m.len).min(to));
            pos += m.len;
            insert_len = 0;
        } else {
            let cmd = command_for_match(insert_len, m.len as u32, m.distance, params, ring);
            commands.push(cmd);
            hasher.store_range(data, pos, (pos + m.len).min(to));
            pos += m.len;
            insert_len = 0;
        }
    }

    insert_len += (to - pos) as u32;
    if insert_len > 0 {
        commands.push(Command::insert_only(insert_len));
    }
    commands
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
    fn test_all_literals() {
        let data = b"abcdefgh";
        let mut hasher = Hasher::for_quality(5, data.len());
        let mut ring = DistanceRing::new();
        let commands =
            create_backward_references(data, 0, data.len(), 1 << 18, params(), &mut hasher, &mut ring);
        assert_eq!(total_bytes(&commands), data.len());
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].copy_len, 0);
        assert_eq!(commands[0].insert_len, 8);
    }

    #[test]
    fn test_repeats_become_copies() {
        let mut data = Vec::new();
        for _ in 0..64 {
            data.extend_from_slice(b"compressiblecompressible");
        }
        let mut hasher = Hasher::for_quality(5, data.len());
        let mut ring = DistanceRing::new();
        let commands = create_backward_references(
            &data,
            0,
            data.len(),
            1 << 18,
            params(),
            &mut hasher,
            &mut ring,
        );
        assert_eq!(total_bytes(&commands), data.len());
        assert!(
            commands.iter().any(|c| c.copy_len > 0),
            "repetitive input should produce copies"
        );
        // The copies dominate the literal count.
        let copied: usize = commands.iter().map(|c| c.copy_len as usize).sum();
        assert!(copied * 2 > data.len());
    }

    #[test]
    fn test_reused_distance_takes_cheap_code() {
        // Period-8 repetitions force the same distance repeatedly; after
        // the first copy the rest should reuse it via short codes or the
        // implicit cell.
        let mut data = Vec::new();
        for _ in 0..32 {
            data.extend_from_slice(b"abcdefgh");
        }
        let mut hasher = Hasher::for_quality(9, data.len());
        let mut ring = DistanceRing::new();
        let commands = create_backward_references(
            &data,
            0,
            data.len(),
            1 << 18,
            params(),
            &mut hasher,
            &mut ring,
        );
        assert_eq!(total_bytes(&commands), data.len());
        let reusing = commands
            .iter()
            .filter(|c| c.copy_len > 0 && (c.cmd_prefix < 128 || c.distance_symbol() < 16))
            .count();
        assert!(reusing >= 1, "expected cached-distance commands");
    }

    #[test]
    fn test_byte_accounting_on_random_sizes() {
        let mut state = 0x2545_F491u32;
        for size in [0usize, 1, 3, 4, 5, 7, 64, 255, 1021] {
            let data: Vec<u8> = (0..size)
                .map(|_| {
                    state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                    (state >> 24) as u8
                })
                .collect();
            let mut hasher = Hasher::for_quality(4, data.len());
            let mut ring = DistanceRing::new();
            let commands = create_backward_references(
                &data,
                0,
                data.len(),
                1 << 18,
                params(),
                &mut hasher,
                &mut ring,
            );
            assert_eq!(total_bytes(&commands), size);
        }
    }
}
