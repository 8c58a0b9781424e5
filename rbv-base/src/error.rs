// We want a few things here:
// 1. A way to create a new error with a backtrace
// 2. A way to centralize setting a breakpoint to trap any error in the system fairly soon
//    after it's created (or at least when it's propagated from a library we use back to us)
// 3. Same but for logging / emitting error messages into the tracing/logging system

use std::borrow::Cow;
use backtrace_error::DynBacktraceError;
use tracing::error;

#[cfg(test)]
use test_log::test;

#[derive(Debug)]
#[allow(dead_code)]
pub struct Error(DynBacktraceError);
pub type Result<T> = std::result::Result<T, Error>;

struct SimpleErr(Cow<'static, str>);
impl std::fmt::Debug for SimpleErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::fmt::Display for SimpleErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for SimpleErr {
    fn description(&self) -> &str {
        &self.0
    }
}

impl<E: std::error::Error + Send + Sync + 'static> From<E> for Error {
    fn from(err: E) -> Error {
        Error::new(err)
    }
}

impl Error {
    pub fn new<E: std::error::Error + Send + Sync + 'static>(err: E) -> Error {
        error!(target: "rbv", "{:?}", err);
        let dbe = DynBacktraceError::from(err);
        Error(dbe)
    }
}

pub fn err(msg: impl Into<Cow<'static, str>>) -> Error {
    let err = SimpleErr(msg.into());
    Error::new(err)
}

/// Which of spec §7's fatal replay-divergence classes a `DivergenceReport`
/// is reporting.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DivergenceKind {
    /// Class 3: the locally computed digest disagreed with the expected
    /// one, at a checkpoint or at `finalize`.
    DigestMismatch,
    /// Class 4: the validator observed the shared order counter already
    /// past the timestamp it was waiting for.
    TimestampRegression,
}

/// Diagnostic for a fatal, unrecoverable replay divergence (spec §7 classes
/// 3-4). Never retried; the caller's only correct move is to surface this
/// and stop.
#[derive(Debug, Clone)]
pub struct DivergenceReport {
    pub kind: DivergenceKind,
    pub lane: u64,
    pub cursor: usize,
    pub expected: u64,
    pub observed: u64,
}

impl std::fmt::Display for DivergenceReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let what = match self.kind {
            DivergenceKind::DigestMismatch => "digest mismatch",
            DivergenceKind::TimestampRegression => "timestamp regression",
        };
        write!(
            f,
            "replay divergence ({what}) on lane {} at cursor {}: expected {}, observed {}",
            self.lane, self.cursor, self.expected, self.observed
        )
    }
}
impl std::error::Error for DivergenceReport {}

/// Construct the `Error` for a digest mismatch, logging it at `error` level
/// the same way every other `Error` is logged.
pub fn divergence(report: DivergenceReport) -> Error {
    Error::new(report)
}

#[test]
fn test_error() {
    let _err = err("test error");
}

#[test]
fn test_divergence_display() {
    let report = DivergenceReport {
        kind: DivergenceKind::DigestMismatch,
        lane: 3,
        cursor: 7,
        expected: 42,
        observed: 43,
    };
    let msg = format!("{report}");
    assert!(msg.contains("lane 3"));
    assert!(msg.contains("cursor 7"));
}
