//! Snowflake ID generation (§4.4, §8).
//!
//! 64 bits: `(ms-since-epoch << 22) | (node << 12) | step`. A single
//! generator owns its `time`/`step` counters behind a `Mutex`; concurrent
//! `generate()` calls serialize on that lock, matching §5's "Snowflake
//! generator state mutations are atomic; external observers always see a
//! consistent `(time, step)` pair."

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

const NODE_BITS: u64 = 10;
const STEP_BITS: u64 = 12;
const STEP_MASK: u64 = (1 << STEP_BITS) - 1;
const NODE_SHIFT: u64 = STEP_BITS;
const TIME_SHIFT: u64 = STEP_BITS + NODE_BITS;
const MAX_NODE: i16 = (1 << NODE_BITS) - 1;

/// Default epoch: 2020-01-01T00:00:00Z, in milliseconds since Unix epoch.
/// Configurable per [`SnowflakeGenerator::with_epoch`].
pub const DEFAULT_EPOCH_MS: u64 = 1_577_836_800_000;

struct State {
    time: u64,
    step: u64,
}

/// A monotonic 64-bit ID generator seeded with a cluster-unique node ID
/// (§4.4). `node` fits in 10 bits (`0..1024`, per the signed-16-bit storage
/// decision in SPEC_FULL.md §9).
pub struct SnowflakeGenerator {
    node: i16,
    epoch_ms: u64,
    state: Mutex<State>,
}

impl SnowflakeGenerator {
    pub fn new(node: i16) -> Self {
        Self::with_epoch(node, DEFAULT_EPOCH_MS)
    }

    pub fn with_epoch(node: i16, epoch_ms: u64) -> Self {
        assert!((0..=MAX_NODE).contains(&node), "snowflake node id out of 10-bit range: {node}");
        Self { node, epoch_ms, state: Mutex::new(State { time: 0, step: 0 }) }
    }

    pub fn node(&self) -> i16 {
        self.node
    }

    fn now_ms() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before Unix epoch").as_millis() as u64
    }

    /// Generate the next ID. Spins (yielding the thread) while waiting for
    /// wall-clock time to catch up after a same-millisecond step overflow or
    /// a backward clock jump (§4.4, §5 suspension point (e)).
    pub fn generate(&self) -> u64 {
        let mut state = self.state.lock().expect("snowflake generator lock poisoned");
        let mut now = Self::now_ms();

        if now < state.time {
            // Clock moved backward: spin until it catches back up.
            while now < state.time {
                std::thread::yield_now();
                now = Self::now_ms();
            }
        }

        if now == state.time {
            state.step = (state.step + 1) & STEP_MASK;
            if state.step == 0 {
                // Step space exhausted within this millisecond: spin for the next one.
                while now <= state.time {
                    std::thread::yield_now();
                    now = Self::now_ms();
                }
                state.time = now;
            }
        } else {
            state.time = now;
            state.step = 0;
        }

        let ts = state.time.saturating_sub(self.epoch_ms);
        (ts << TIME_SHIFT) | ((self.node as u64) << NODE_SHIFT) | state.step
    }

    /// Generate the next ID rendered as base-36, used for request trace IDs
    /// (§4.3).
    pub fn generate_base36(&self) -> String {
        to_base36(self.generate())
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while value > 0 {
        buf.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).expect("base36 digits are always valid utf8")
}

/// Extract the node field embedded in a generated ID (testable property,
/// §8: `(id >> 12) & 0x3FF == node`).
pub fn node_of(id: u64) -> i16 {
    ((id >> NODE_SHIFT) & ((1 << NODE_BITS) - 1)) as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn node_bits_round_trip() {
        let gen = SnowflakeGenerator::new(513);
        let id = gen.generate();
        assert_eq!((id >> NODE_SHIFT) & ((1 << NODE_BITS) - 1), 513);
    }

    #[test]
    fn successive_ids_strictly_increase() {
        let gen = SnowflakeGenerator::new(1);
        let mut prev = gen.generate();
        for _ in 0..1000 {
            let next = gen.generate();
            assert!(next > prev, "{next} should be greater than {prev}");
            prev = next;
        }
    }

    #[test]
    fn concurrent_generation_is_collision_free() {
        let gen = Arc::new(SnowflakeGenerator::new(7));
        let mut handles = Vec::new();
        for _ in 0..10 {
            let gen = gen.clone();
            handles.push(std::thread::spawn(move || {
                (0..1000).map(|_| gen.generate()).collect::<Vec<_>>()
            }));
        }
        let mut all = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(all.insert(id), "duplicate snowflake id generated: {id}");
            }
        }
        assert_eq!(all.len(), 10_000);
    }

    #[test]
    fn base36_matches_expected_digits() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(36 * 36 + 35), "zz");
    }

    #[test]
    fn node_of_extracts_embedded_node() {
        let gen = SnowflakeGenerator::new(42);
        let id = gen.generate();
        assert_eq!(node_of(id), 42);
    }
}
