mod hash;
mod sequencer;

pub use hash::{Combine, HashChain, HashEntry, LiveDigestFeed};
pub use sequencer::Sequencer;
