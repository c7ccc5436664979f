use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// A unit of transfer: a local path plus its content in some transform state.
///
/// `encrypted` and `compressed` always describe `content`. The only way to
/// change the content is [`File::replace_content`], which sets both flags in
/// the same call. For an encrypted file, `compressed` describes the plaintext
/// beneath the seal.
#[derive(Clone, PartialEq, Eq)]
pub struct File {
    path: PathBuf,
    content: Vec<u8>,
    encrypted: bool,
    compressed: bool,
}

impl File {
    /// Raw bytes as read from disk
    pub fn plain(path: impl Into<PathBuf>, content: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            content,
            encrypted: false,
            compressed: false,
        }
    }

    /// Encrypted bytes as fetched from the object store
    pub fn sealed(path: impl Into<PathBuf>, content: Vec<u8>, compressed: bool) -> Self {
        Self {
            path: path.into(),
            content,
            encrypted: true,
            compressed,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Swap in transformed content together with the state it is in.
    pub fn replace_content(&mut self, content: Vec<u8>, encrypted: bool, compressed: bool) {
        self.content = content;
        self.encrypted = encrypted;
        self.compressed = compressed;
    }

    pub fn into_content(self) -> Vec<u8> {
        self.content
    }
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File")
            .field("path", &self.path)
            .field("len", &self.content.len())
            .field("encrypted", &self.encrypted)
            .field("compressed", &self.compressed)
            .finish()
    }
}

/// Remote counterpart of a [`File`]. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageObject {
    pub bucket: String,
    /// Slash-delimited object key
    pub key: String,
    pub size: u64,
    /// Content type reported by the store (may be empty)
    pub content_type: String,
    /// Integrity tag reported by the store (may be empty)
    pub etag: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Upload,
    Download,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upload => f.write_str("upload"),
            Direction::Download => f.write_str("download"),
        }
    }
}

/// Why a single item of a batch failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Local filesystem fault
    Io,
    /// Object store fault for this item
    Storage,
    /// Ciphertext failed its integrity check (wrong key or tampering)
    Authentication,
    /// Blob too short to hold a nonce
    MalformedCiphertext,
    Compression,
    /// The batch was cancelled before this item started
    Cancelled,
    /// The worker task panicked
    Panicked,
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Io => "io",
            FailureKind::Storage => "storage",
            FailureKind::Authentication => "authentication",
            FailureKind::MalformedCiphertext => "malformed-ciphertext",
            FailureKind::Compression => "compression",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Panicked => "panicked",
            FailureKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// A successfully transferred item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    /// Local path (upload) or object key (download)
    pub source: String,
    /// Object key (upload) or local path (download)
    pub destination: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFailure {
    /// Local path (upload) or object key (download)
    pub target: String,
    pub kind: FailureKind,
    pub message: String,
}

/// Per-item outcomes of one upload or download batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReport {
    pub direction: Direction,
    pub succeeded: Vec<TransferOutcome>,
    pub failed: Vec<TransferFailure>,
}

impl TransferReport {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn bytes(&self) -> u64 {
        self.succeeded.iter().map(|o| o.bytes).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_file_flags() {
        let file = File::plain("a/b.txt", b"hello".to_vec());
        assert!(!file.is_encrypted());
        assert!(!file.is_compressed());
        assert_eq!(file.len(), 5);
        assert_eq!(file.path(), Path::new("a/b.txt"));
    }

    #[test]
    fn test_replace_content_updates_flags() {
        let mut file = File::plain("x", b"abc".to_vec());
        file.replace_content(vec![1, 2, 3, 4], true, true);
        assert!(file.is_encrypted());
        assert!(file.is_compressed());
        assert_eq!(file.content(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_debug_hides_content() {
        let file = File::plain("secret.txt", b"top secret".to_vec());
        let dbg = format!("{file:?}");
        assert!(!dbg.contains("top secret"));
        assert!(dbg.contains("len: 10"));
    }

    #[test]
    fn test_report_totals() {
        let mut report = TransferReport::new(Direction::Download);
        assert!(report.is_success());
        report.succeeded.push(TransferOutcome {
            source: "k1".into(),
            destination: "out/k1".into(),
            bytes: 10,
        });
        report.succeeded.push(TransferOutcome {
            source: "k2".into(),
            destination: "out/k2".into(),
            bytes: 5,
        });
        assert_eq!(report.total(), 2);
        assert_eq!(report.bytes(), 15);
    }
}
