//! Transfer orchestrator: batch upload and download over a bounded task pool
//!
//! A batch runs in four stages:
//!   - validate: reject an empty target list, drop duplicate targets
//!   - enumerate: expand targets into one [`TransferTask`] per file/object
//!   - execute: run each task on a `Semaphore`-bounded `JoinSet`
//!   - aggregate: wait for every task and fold the results into a report
//!
//! Setup failures abort the batch with an error. A failing item is logged and
//! recorded in the [`TransferReport`]; its siblings keep running.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use secrecy::SecretString;
use soss_core::config::TransferConfig;
use soss_core::{
    Direction, FailureKind, SossError, SossResult, StorageObject, TransferFailure,
    TransferOutcome, TransferReport,
};
use soss_crypto::{CipherCache, CipherError, ContentCipher};
use soss_storage::RemoteStore;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::paths;
use crate::pipeline;

/// Progress callback type (items_done, items_total, target)
pub type ProgressFn = Arc<dyn Fn(u64, u64, &str) + Send + Sync>;

/// Batch parameters shared by every task of an orchestrator.
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Maximum tasks in flight
    pub concurrency: usize,
    /// Compress before encrypting on upload; decompress after decrypting on download
    pub compress: bool,
    pub compression_level: i32,
    /// Glob patterns matched against file and directory names during walks
    pub exclude_patterns: Vec<String>,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self::from(&TransferConfig::default())
    }
}

impl From<&TransferConfig> for TransferOptions {
    fn from(cfg: &TransferConfig) -> Self {
        Self {
            concurrency: cfg.effective_workers(),
            compress: cfg.compress,
            compression_level: cfg.compression_level,
            exclude_patterns: cfg.exclude_patterns.clone(),
        }
    }
}

pub struct UploadRequest {
    pub passphrase: SecretString,
    /// Key prefix every uploaded object is placed under
    pub prefix: String,
    /// Local files and directories
    pub targets: Vec<PathBuf>,
}

pub struct DownloadRequest {
    pub passphrase: SecretString,
    /// Local directory objects are written under, at `output_dir/<key>`
    pub output_dir: PathBuf,
    /// Object keys or key prefixes
    pub targets: Vec<String>,
}

/// One unit of work: a single file or object.
#[derive(Debug, Clone)]
pub enum TransferTask {
    Upload {
        source: PathBuf,
        /// Key directory the file lands in; the store appends the file name
        prefix: String,
    },
    Download {
        object: StorageObject,
        output_dir: PathBuf,
    },
}

impl TransferTask {
    /// Human-readable name used in logs and failure records.
    pub fn target(&self) -> String {
        match self {
            TransferTask::Upload { source, .. } => source.display().to_string(),
            TransferTask::Download { object, .. } => object.key.clone(),
        }
    }
}

pub struct Orchestrator {
    store: RemoteStore,
    options: TransferOptions,
    ciphers: Mutex<CipherCache>,
    cancel: CancellationToken,
    progress: Option<ProgressFn>,
}

impl Orchestrator {
    pub fn new(store: RemoteStore, options: TransferOptions) -> Self {
        Self {
            store,
            options,
            ciphers: Mutex::new(CipherCache::new()),
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn store(&self) -> &RemoteStore {
        &self.store
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    /// Token that stops dispatching new tasks once cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Encrypt and upload every file reachable from `req.targets`.
    pub async fn upload(&self, req: UploadRequest) -> SossResult<TransferReport> {
        let targets = dedup(req.targets);
        if targets.is_empty() {
            return Err(SossError::NoTargets(Direction::Upload));
        }

        let tasks = self.plan_upload(&req.prefix, &targets).await?;
        info!(tasks = tasks.len(), prefix = %req.prefix, "upload batch planned");

        let report = self.execute(Direction::Upload, &req.passphrase, tasks).await;
        finish(report)
    }

    /// Download and decrypt every object under each of `req.targets`.
    pub async fn download(&self, req: DownloadRequest) -> SossResult<TransferReport> {
        let targets = dedup(req.targets);
        if targets.is_empty() {
            return Err(SossError::NoTargets(Direction::Download));
        }

        let tasks = self.plan_download(&req.output_dir, &targets).await?;
        info!(
            tasks = tasks.len(),
            output_dir = %req.output_dir.display(),
            "download batch planned"
        );

        let report = self
            .execute(Direction::Download, &req.passphrase, tasks)
            .await;
        finish(report)
    }

    /// Expand local targets into upload tasks. A missing target is fatal.
    ///
    /// Each object key is claimed by the first file that maps to it; a later
    /// file with the same key (e.g. `a/x.txt` and `b/x.txt` named directly)
    /// is skipped with a warning.
    pub async fn plan_upload(
        &self,
        prefix: &str,
        targets: &[PathBuf],
    ) -> SossResult<Vec<TransferTask>> {
        let mut seen = HashSet::new();
        let mut claimed: HashMap<String, PathBuf> = HashMap::new();
        let mut tasks = Vec::new();

        for target in targets {
            let meta = match tokio::fs::metadata(target).await {
                Ok(meta) => meta,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(SossError::NotFound(target.display().to_string()));
                }
                Err(e) => return Err(SossError::Io(e)),
            };

            let (files, root) = if meta.is_dir() {
                let files = pipeline::collect_files(target, &self.options.exclude_patterns)?;
                (files, Some(target.as_path()))
            } else {
                (vec![target.clone()], None)
            };

            for source in files {
                if !seen.insert(source.clone()) {
                    continue;
                }
                let key = paths::object_key(prefix, &source, root);
                if let Some(first) = claimed.get(&key) {
                    warn!(
                        key = %key,
                        path = %source.display(),
                        first = %first.display(),
                        "skipping file: object key already taken by another target"
                    );
                    continue;
                }
                claimed.insert(key, source.clone());

                let prefix = paths::upload_prefix(prefix, &source, root);
                tasks.push(TransferTask::Upload { source, prefix });
            }
        }

        Ok(tasks)
    }

    /// Expand remote keys into download tasks. A key matching no object is
    /// fatal; objects reached through overlapping keys are fetched once.
    pub async fn plan_download(
        &self,
        output_dir: &Path,
        targets: &[String],
    ) -> SossResult<Vec<TransferTask>> {
        let mut seen = HashSet::new();
        let mut tasks = Vec::new();

        for target in targets {
            let objects = self.store.list(target).await?;
            if objects.is_empty() {
                return Err(SossError::NotFound(format!(
                    "no objects under {target:?} in bucket {}",
                    self.store.bucket()
                )));
            }
            debug!(target = %target, count = objects.len(), "listed download target");

            for object in objects {
                if seen.insert(object.key.clone()) {
                    tasks.push(TransferTask::Download {
                        object,
                        output_dir: output_dir.to_path_buf(),
                    });
                }
            }
        }

        Ok(tasks)
    }

    /// Run `tasks` on the bounded pool and wait for all of them.
    ///
    /// Never fails as a whole: every task ends up in the report, either
    /// succeeded or failed with a classified [`FailureKind`].
    pub async fn execute(
        &self,
        direction: Direction,
        passphrase: &SecretString,
        tasks: Vec<TransferTask>,
    ) -> TransferReport {
        let mut report = TransferReport::new(direction);
        if tasks.is_empty() {
            return report;
        }

        let cipher = self.cipher(passphrase);
        let total = tasks.len() as u64;
        let done = Arc::new(AtomicU64::new(0));
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut set: JoinSet<(String, Result<TransferOutcome>)> = JoinSet::new();
        let mut names: HashMap<tokio::task::Id, String> = HashMap::new();

        for task in tasks {
            let target = task.target();

            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                debug!(target = %target, "not dispatched: batch cancelled");
                report.failed.push(TransferFailure {
                    target,
                    kind: FailureKind::Cancelled,
                    message: SossError::Cancelled.to_string(),
                });
                continue;
            };

            let store = self.store.clone();
            let cipher = Arc::clone(&cipher);
            let options = self.options.clone();
            let cancel = self.cancel.clone();
            let progress = self.progress.clone();
            let done = Arc::clone(&done);
            let name = target.clone();

            let handle = set.spawn(async move {
                let _permit = permit;
                let result = if cancel.is_cancelled() {
                    Err(SossError::Cancelled.into())
                } else {
                    run_task(&store, &cipher, &options, &task).await
                };

                let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(cb) = &progress {
                    cb(n, total, name.as_str());
                }
                (name, result)
            });
            names.insert(handle.id(), target);
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => report.succeeded.push(outcome),
                Ok((target, Err(e))) => {
                    let kind = classify(&e);
                    warn!(target = %target, kind = %kind, "{direction} failed: {e:#}");
                    report.failed.push(TransferFailure {
                        target,
                        kind,
                        message: format!("{e:#}"),
                    });
                }
                Err(join_err) => {
                    let target = names
                        .get(&join_err.id())
                        .cloned()
                        .unwrap_or_else(|| "<unknown>".into());
                    let kind = if join_err.is_panic() {
                        FailureKind::Panicked
                    } else {
                        FailureKind::Cancelled
                    };
                    warn!(target = %target, kind = %kind, "{direction} task aborted: {join_err}");
                    report.failed.push(TransferFailure {
                        target,
                        kind,
                        message: join_err.to_string(),
                    });
                }
            }
        }

        report.succeeded.sort_by(|a, b| a.source.cmp(&b.source));
        report.failed.sort_by(|a, b| a.target.cmp(&b.target));

        info!(
            direction = %direction,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            bytes = report.bytes(),
            "batch complete"
        );
        report
    }

    fn cipher(&self, passphrase: &SecretString) -> Arc<ContentCipher> {
        let mut cache = self.ciphers.lock().unwrap_or_else(|e| e.into_inner());
        cache.get(passphrase)
    }
}

async fn run_task(
    store: &RemoteStore,
    cipher: &ContentCipher,
    options: &TransferOptions,
    task: &TransferTask,
) -> Result<TransferOutcome> {
    match task {
        TransferTask::Upload { source, prefix } => {
            upload_one(store, cipher, options, source, prefix).await
        }
        TransferTask::Download { object, output_dir } => {
            download_one(store, cipher, options.compress, object, output_dir).await
        }
    }
}

/// read → compress (optional) → encrypt → store
async fn upload_one(
    store: &RemoteStore,
    cipher: &ContentCipher,
    options: &TransferOptions,
    source: &Path,
    prefix: &str,
) -> Result<TransferOutcome> {
    let mut file = pipeline::read_file(source).await?;
    let bytes = file.len() as u64;

    if options.compress {
        pipeline::compress(&mut file, options.compression_level)?;
    }
    pipeline::encrypt(&mut file, cipher)?;

    let object = store.upload(prefix, &file).await?;
    info!(
        path = %source.display(),
        key = %object.key,
        bytes,
        stored = object.size,
        "uploaded"
    );

    Ok(TransferOutcome {
        source: source.display().to_string(),
        destination: object.key,
        bytes,
    })
}

/// fetch → decrypt → decompress (if compressed) → atomic local write
async fn download_one(
    store: &RemoteStore,
    cipher: &ContentCipher,
    compressed: bool,
    object: &StorageObject,
    output_dir: &Path,
) -> Result<TransferOutcome> {
    let destination = paths::local_path(output_dir, &object.key)?;

    let mut file = store.download(object, &destination, compressed).await?;
    pipeline::decrypt(&mut file, cipher)?;
    if file.is_compressed() {
        pipeline::decompress(&mut file)?;
    }
    let bytes = pipeline::write_file(&file).await?;

    info!(
        key = %object.key,
        path = %destination.display(),
        bytes,
        "downloaded"
    );

    Ok(TransferOutcome {
        source: object.key.clone(),
        destination: destination.display().to_string(),
        bytes,
    })
}

/// Map a task error onto the kind reported to the user.
///
/// Authentication failures are kept apart from I/O so a wrong passphrase is
/// never mistaken for a transport problem.
pub fn classify(err: &anyhow::Error) -> FailureKind {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<CipherError>() {
            return match e {
                CipherError::AuthenticationFailure => FailureKind::Authentication,
                CipherError::MalformedCiphertext { .. } => FailureKind::MalformedCiphertext,
                CipherError::Encrypt => FailureKind::Other,
            };
        }
        if cause.downcast_ref::<soss_compress::CompressError>().is_some() {
            return FailureKind::Compression;
        }
        if let Some(e) = cause.downcast_ref::<SossError>() {
            return match e {
                SossError::Storage(_) => FailureKind::Storage,
                SossError::Cancelled => FailureKind::Cancelled,
                SossError::Io(_) => FailureKind::Io,
                _ => FailureKind::Other,
            };
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return FailureKind::Io;
        }
    }
    FailureKind::Other
}

/// A report with any failed item becomes a `PartialFailure`.
fn finish(report: TransferReport) -> SossResult<TransferReport> {
    if report.is_success() {
        Ok(report)
    } else {
        Err(SossError::PartialFailure(Box::new(report)))
    }
}

/// Drop repeated targets, keeping the first occurrence of each.
fn dedup<T: Clone + Eq + std::hash::Hash>(targets: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::new();
    targets
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}
