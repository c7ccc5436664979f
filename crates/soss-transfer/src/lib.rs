//! soss-transfer: batch upload/download of encrypted files
//!
//! Files are read, optionally compressed, sealed with AES-256-GCM and stored
//! under a key derived from their path; downloads reverse every step and write
//! atomically under an output directory.

pub mod engine;
pub mod paths;
pub mod pipeline;

pub use engine::{
    classify, DownloadRequest, Orchestrator, ProgressFn, TransferOptions, TransferTask,
    UploadRequest,
};
