// Ambient configuration (SPEC_FULL §10): not a Non-goal violation — spec.md
// excludes a full CLI/workload-generator surface, not a plain config value
// type with a default. Derives serde like nearly everything in the teacher
// workspace does; the `rbv` binary is the one that knows how to load this
// from a TOML file (or fall back to `Default`), keeping file I/O out of the
// library crates.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunConfig {
    /// Number of lanes: each lane is one primary thread paired with one
    /// validator thread (spec §2's "Replica Role", §4.5's lane).
    pub n_threads: usize,
    /// Operations per lane.
    pub operation_count: usize,
    /// Back-pressure window, per spec §4.5 and SPEC_FULL §9: a primary
    /// lane stalls once it's more than `window_per_thread * n_threads`
    /// operations ahead of its validator.
    pub window_per_thread: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            n_threads: 4,
            operation_count: 256,
            window_per_thread: 16,
        }
    }
}

impl RunConfig {
    /// The absolute back-pressure window (spec §8 scenario 6's `W`).
    pub fn window(&self) -> u64 {
        self.window_per_thread * self.n_threads as u64
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn default_window_matches_spec_example() {
        let cfg = RunConfig::default();
        assert_eq!(cfg.window(), 16 * 4);
    }
}
