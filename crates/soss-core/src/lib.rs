//! soss-core: shared types, configuration schema, and error taxonomy

pub mod config;
pub mod error;
pub mod types;

pub use error::{SossError, SossResult};
pub use types::{
    Direction, FailureKind, File, StorageObject, TransferFailure, TransferOutcome, TransferReport,
};
