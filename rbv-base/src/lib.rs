mod error;

pub use error::{divergence, err, DivergenceKind, DivergenceReport, Error, Result};
