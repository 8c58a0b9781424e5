// Demo wiring: load a `RunConfig`, build a small deterministic operation
// stream per lane, and hand both to `rbv_harness::run`. This crate is not
// itself part of the RBV core (spec §1's components are the five
// `rbv-*` library crates); it plays the role the teacher's own top-level
// `submerge` binary plays for its workspace — the thing a user actually
// runs, wiring library crates together.
//
// Workload generation proper (Zipf key selection, value synthesis,
// sleep-paced rate limiting) is one of spec §1's named external
// collaborators and stays out of scope here too: `build_lanes` below is
// deliberately the simplest possible deterministic generator, just enough
// to exercise every operation kind `rbv_harness::Operation` knows about
// across more than one lane.

use rbv_base::{err, Result};
use rbv_harness::{Operation, RunConfig};

/// Load a `RunConfig` from a TOML file at `path`, or fall back to
/// `RunConfig::default()` if `path` is `None`. A missing or malformed file
/// at a given path is an error; the "no path given" case is not.
pub fn load_config(path: Option<&str>) -> Result<RunConfig> {
    match path {
        None => Ok(RunConfig::default()),
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| err(format!("reading config {path}: {e}")))?;
            toml::from_str(&text).map_err(|e| err(format!("parsing config {path}: {e}")))
        }
    }
}

fn key(i: u64) -> Vec<u8> {
    i.to_be_bytes().to_vec()
}

/// One lane's deterministic operation stream: round-robins insert / get /
/// delete-key over a small, lane-local key space so every operation kind,
/// and both the optimistic-read and ordered-mutex paths, get exercised.
/// `salt` keeps different lanes from hammering the same keys (each lane
/// drives its own pair of independent trees anyway, so this isn't required
/// for correctness, just for a more interesting demo run).
fn lane_ops(operation_count: usize, salt: u64) -> Vec<Operation> {
    const KEY_SPACE: u64 = 64;
    (0..operation_count)
        .map(|i| {
            let i = i as u64;
            let k = key(salt * KEY_SPACE + (i % KEY_SPACE));
            match i % 3 {
                0 => Operation::Insert(k, key(i)),
                1 => Operation::Get(k),
                _ => Operation::DeleteKey(k),
            }
        })
        .collect()
}

/// Build `config.n_threads` lanes, each `config.operation_count` operations
/// long, per `lane_ops`.
pub fn build_lanes(config: &RunConfig) -> Vec<Vec<Operation>> {
    (0..config.n_threads)
        .map(|lane| lane_ops(config.operation_count, lane as u64))
        .collect()
}
