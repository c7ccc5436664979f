use thiserror::Error;

use crate::types::{Direction, TransferReport};

pub type SossResult<T> = Result<T, SossError>;

#[derive(Debug, Error)]
pub enum SossError {
    /// Missing or invalid configuration/credentials. Fatal before any transfer.
    #[error("config error: {0}")]
    Config(String),

    #[error("no targets to {0}")]
    NoTargets(Direction),

    /// A remote key/prefix or local path matched nothing.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("transfer cancelled")]
    Cancelled,

    /// At least one item of a batch failed; the report lists every outcome.
    #[error("{} of {} {} transfers failed", .0.failed.len(), .0.total(), .0.direction)]
    PartialFailure(Box<TransferReport>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SossError {
    /// The batch report, when the error came from a partially failed batch
    pub fn report(&self) -> Option<&TransferReport> {
        match self {
            SossError::PartialFailure(report) => Some(report),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FailureKind, TransferFailure, TransferOutcome};

    #[test]
    fn test_partial_failure_message() {
        let mut report = TransferReport::new(Direction::Upload);
        report.succeeded.push(TransferOutcome {
            source: "a.txt".into(),
            destination: "p/a.txt".into(),
            bytes: 3,
        });
        report.failed.push(TransferFailure {
            target: "b.txt".into(),
            kind: FailureKind::Io,
            message: "gone".into(),
        });

        let err = SossError::PartialFailure(Box::new(report));
        assert_eq!(err.to_string(), "1 of 2 upload transfers failed");
        assert_eq!(err.report().map(|r| r.failed.len()), Some(1));
    }

    #[test]
    fn test_no_targets_message() {
        assert_eq!(
            SossError::NoTargets(Direction::Download).to_string(),
            "no targets to download"
        );
    }
}
