//! `RemoteStore`: list, upload and download objects in one bucket

use std::path::Path;

use opendal::{ErrorKind, Operator};
use soss_core::config::StorageConfig;
use soss_core::{File, SossError, SossResult, StorageObject};

use crate::operator::{build_operator, Credentials};

/// A bucket reached through an OpenDAL operator.
///
/// Cheap to clone: clones share the underlying operator.
#[derive(Clone, Debug)]
pub struct RemoteStore {
    op: Operator,
    bucket: String,
}

impl RemoteStore {
    pub fn new(op: Operator, bucket: impl Into<String>) -> Self {
        Self {
            op,
            bucket: bucket.into(),
        }
    }

    /// Connect to the bucket named in `storage` with `creds`.
    pub fn connect(storage: &StorageConfig, creds: &Credentials) -> SossResult<Self> {
        let op = build_operator(storage, creds)?;
        Ok(Self::new(op, storage.bucket.clone()))
    }

    /// In-process bucket backed by `opendal::services::Memory`.
    pub fn memory(bucket: impl Into<String>) -> SossResult<Self> {
        let op = Operator::new(opendal::services::Memory::default())
            .map_err(|e| SossError::Storage(format!("creating memory operator: {e}")))?
            .finish();
        Ok(Self::new(op, bucket))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    pub async fn check_health(&self) -> SossResult<()> {
        crate::health::check_health(&self.op).await
    }

    /// Every object whose key starts with `prefix`.
    ///
    /// Plain string-prefix semantics, as S3 applies them: `tester/x` matches
    /// `tester/x.txt` and `tester/xy/z.txt`. Directory markers are skipped. An
    /// empty result is not an error here.
    pub async fn list(&self, prefix: &str) -> SossResult<Vec<StorageObject>> {
        let prefix = prefix.trim_start_matches('/');
        let dir = match prefix.rfind('/') {
            Some(idx) => &prefix[..=idx],
            None => "/",
        };

        let entries = match self.op.list_with(dir).recursive(true).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SossError::Storage(format!("listing {prefix:?}: {e}"))),
        };

        let mut objects: Vec<StorageObject> = entries
            .into_iter()
            .filter(|entry| entry.metadata().is_file() && !entry.path().ends_with('/'))
            .filter(|entry| entry.path().starts_with(prefix))
            .map(|entry| {
                let meta = entry.metadata();
                StorageObject {
                    bucket: self.bucket.clone(),
                    key: entry.path().to_string(),
                    size: meta.content_length(),
                    content_type: meta.content_type().unwrap_or_default().to_string(),
                    etag: meta.etag().unwrap_or_default().to_string(),
                }
            })
            .collect();
        objects.sort_by(|a, b| a.key.cmp(&b.key));

        tracing::debug!(prefix, count = objects.len(), "listed objects");
        Ok(objects)
    }

    /// Store `file` under `prefix/<basename>` and read back its metadata.
    pub async fn upload(&self, prefix: &str, file: &File) -> SossResult<StorageObject> {
        let name = file
            .path()
            .file_name()
            .ok_or_else(|| {
                SossError::InvalidKey(format!("{} has no file name", file.path().display()))
            })?
            .to_string_lossy();
        let key = object_key(prefix, &name);

        self.op
            .write(&key, file.content().to_vec())
            .await
            .map_err(|e| SossError::Storage(format!("writing {key}: {e}")))?;

        let meta = self
            .op
            .stat(&key)
            .await
            .map_err(|e| SossError::Storage(format!("stat {key}: {e}")))?;

        tracing::debug!(key = %key, bytes = file.len(), "object written");
        Ok(StorageObject {
            bucket: self.bucket.clone(),
            size: meta.content_length(),
            content_type: meta.content_type().unwrap_or_default().to_string(),
            etag: meta.etag().unwrap_or_default().to_string(),
            key,
        })
    }

    /// Fetch `object` into a sealed [`File`] destined for `destination`.
    ///
    /// Nothing is written locally; the caller opens and persists the content.
    pub async fn download(
        &self,
        object: &StorageObject,
        destination: &Path,
        compressed: bool,
    ) -> SossResult<File> {
        let content = self
            .op
            .read(&object.key)
            .await
            .map_err(|e| SossError::Storage(format!("reading {}: {e}", object.key)))?
            .to_vec();

        tracing::debug!(key = %object.key, bytes = content.len(), "object read");
        Ok(File::sealed(destination, content, compressed))
    }
}

/// `prefix/name`, with no doubled or leading separator.
fn object_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded(keys: &[&str]) -> RemoteStore {
        let store = RemoteStore::memory("test-bucket").unwrap();
        for key in keys {
            store
                .operator()
                .write(key, format!("content of {key}").into_bytes())
                .await
                .unwrap();
        }
        store
    }

    fn keys(objects: &[StorageObject]) -> Vec<&str> {
        objects.iter().map(|o| o.key.as_str()).collect()
    }

    #[test]
    fn test_object_key() {
        assert_eq!(object_key("", "a.txt"), "a.txt");
        assert_eq!(object_key("p", "a.txt"), "p/a.txt");
        assert_eq!(object_key("p/", "a.txt"), "p/a.txt");
        assert_eq!(object_key("/p/q/", "a.txt"), "p/q/a.txt");
    }

    #[tokio::test]
    async fn test_list_directory_prefix() {
        let store = seeded(&["tester/a.txt", "tester/sub/b.txt", "other/c.txt"]).await;
        let objects = store.list("tester/").await.unwrap();
        assert_eq!(keys(&objects), vec!["tester/a.txt", "tester/sub/b.txt"]);
        assert!(objects.iter().all(|o| o.bucket == "test-bucket"));
    }

    #[tokio::test]
    async fn test_list_partial_name_prefix() {
        let store = seeded(&["tester/xa.txt", "tester/xy/z.txt", "tester/y.txt"]).await;
        let objects = store.list("tester/x").await.unwrap();
        assert_eq!(keys(&objects), vec!["tester/xa.txt", "tester/xy/z.txt"]);
    }

    #[tokio::test]
    async fn test_list_root_prefix() {
        let store = seeded(&["top.txt", "dir/nested.txt"]).await;
        let objects = store.list("").await.unwrap();
        assert_eq!(keys(&objects), vec!["dir/nested.txt", "top.txt"]);

        let objects = store.list("to").await.unwrap();
        assert_eq!(keys(&objects), vec!["top.txt"]);
    }

    #[tokio::test]
    async fn test_list_missing_prefix_is_empty() {
        let store = seeded(&["tester/a.txt"]).await;
        assert!(store.list("nothing/here/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_uses_prefix_and_basename() {
        let store = RemoteStore::memory("b").unwrap();
        let file = File::plain("/some/local/dir/report.bin", b"sealed bytes".to_vec());

        let object = store.upload("backups/2024/", &file).await.unwrap();
        assert_eq!(object.key, "backups/2024/report.bin");
        assert_eq!(object.bucket, "b");
        assert_eq!(object.size, 12);

        let stored = store.operator().read("backups/2024/report.bin").await.unwrap();
        assert_eq!(stored.to_vec(), b"sealed bytes");
    }

    #[tokio::test]
    async fn test_download_returns_sealed_file() {
        let store = seeded(&["k/v.txt"]).await;
        let object = store.list("k/").await.unwrap().remove(0);

        let file = store
            .download(&object, Path::new("out/k/v.txt"), true)
            .await
            .unwrap();
        assert_eq!(file.path(), Path::new("out/k/v.txt"));
        assert_eq!(file.content(), b"content of k/v.txt");
        assert!(file.is_encrypted());
        assert!(file.is_compressed());
    }

    #[tokio::test]
    async fn test_download_missing_object_is_storage_error() {
        let store = RemoteStore::memory("b").unwrap();
        let object = StorageObject {
            bucket: "b".into(),
            key: "ghost.txt".into(),
            size: 0,
            content_type: String::new(),
            etag: String::new(),
        };
        let err = store
            .download(&object, Path::new("ghost.txt"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, SossError::Storage(_)));
    }
}
