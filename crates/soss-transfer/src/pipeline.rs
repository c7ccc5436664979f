//! Per-file transform stages and local filesystem I/O
//!
//! Upload: [`read_file`] → [`compress`] (optional) → [`encrypt`].
//! Download: [`decrypt`] → [`decompress`] (if compressed) → [`write_file`].
//! Each stage checks the [`File`] state flags before touching its content.

use anyhow::{bail, Context, Result};
use soss_crypto::ContentCipher;
use soss_core::File;
use std::path::{Path, PathBuf};

pub async fn read_file(path: &Path) -> Result<File> {
    let content = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading file: {}", path.display()))?;
    Ok(File::plain(path, content))
}

pub fn compress(file: &mut File, level: i32) -> Result<()> {
    if file.is_encrypted() || file.is_compressed() {
        bail!("{} is not plain content", file.path().display());
    }
    let compressed = soss_compress::compress(file.content(), level)
        .with_context(|| format!("compressing {}", file.path().display()))?;
    file.replace_content(compressed, false, true);
    Ok(())
}

pub fn encrypt(file: &mut File, cipher: &ContentCipher) -> Result<()> {
    if file.is_encrypted() {
        bail!("{} is already encrypted", file.path().display());
    }
    let sealed = cipher
        .encrypt(file.content())
        .with_context(|| format!("encrypting {}", file.path().display()))?;
    let compressed = file.is_compressed();
    file.replace_content(sealed, true, compressed);
    Ok(())
}

pub fn decrypt(file: &mut File, cipher: &ContentCipher) -> Result<()> {
    if !file.is_encrypted() {
        bail!("{} is not encrypted", file.path().display());
    }
    let opened = cipher
        .decrypt(file.content())
        .with_context(|| format!("decrypting {}", file.path().display()))?;
    let compressed = file.is_compressed();
    file.replace_content(opened, false, compressed);
    Ok(())
}

pub fn decompress(file: &mut File) -> Result<()> {
    if file.is_encrypted() || !file.is_compressed() {
        bail!("{} is not decrypted compressed content", file.path().display());
    }
    let plain = soss_compress::decompress(file.content())
        .with_context(|| format!("decompressing {}", file.path().display()))?;
    file.replace_content(plain, false, false);
    Ok(())
}

/// Atomically write plain content to the file's path, creating parent
/// directories. Returns the number of bytes written.
pub async fn write_file(file: &File) -> Result<u64> {
    if file.is_encrypted() || file.is_compressed() {
        bail!("refusing to write transformed content to {}", file.path().display());
    }
    let path = file.path();

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating dir: {}", parent.display()))?;
    }

    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, file.content())
        .await
        .with_context(|| format!("writing tmp: {}", tmp.display()))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e).with_context(|| format!("renaming to: {}", path.display()));
    }

    Ok(file.len() as u64)
}

/// `dir/.name.soss_tmp`, next to the target so the rename stays on one filesystem
fn tmp_path(path: &Path) -> PathBuf {
    let name = path.file_name().unwrap_or_default().to_string_lossy();
    path.with_file_name(format!(".{name}.soss_tmp"))
}

/// Collect all regular files under `root` recursively, skipping any file or
/// directory whose name matches an exclude pattern.
pub fn collect_files(root: &Path, exclude_patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let exclude_matchers: Vec<glob::Pattern> = exclude_patterns
        .iter()
        .filter_map(|p| match glob::Pattern::new(p) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                tracing::warn!(pattern = %p, "ignoring invalid exclude pattern: {e}");
                None
            }
        })
        .collect();
    collect_files_inner(root, &mut files, &exclude_matchers)?;
    files.sort(); // deterministic order
    Ok(files)
}

fn collect_files_inner(
    dir: &Path,
    out: &mut Vec<PathBuf>,
    excludes: &[glob::Pattern],
) -> Result<()> {
    for entry in
        std::fs::read_dir(dir).with_context(|| format!("reading dir: {}", dir.display()))?
    {
        let entry = entry.context("reading dir entry")?;
        let path = entry.path();
        let meta = entry.metadata().context("stat dir entry")?;

        let name = entry.file_name();
        if excludes.iter().any(|p| p.matches(&name.to_string_lossy())) {
            continue;
        }

        if meta.is_dir() {
            collect_files_inner(&path, out, excludes)?;
        } else if meta.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn cipher() -> ContentCipher {
        ContentCipher::new(&SecretString::from("pipeline"))
    }

    #[test]
    fn test_upload_then_download_stages() {
        let c = cipher();
        let original = b"stage by stage".repeat(50);
        let mut file = File::plain("f.txt", original.clone());

        compress(&mut file, 3).unwrap();
        assert!(file.is_compressed() && !file.is_encrypted());
        encrypt(&mut file, &c).unwrap();
        assert!(file.is_compressed() && file.is_encrypted());

        decrypt(&mut file, &c).unwrap();
        assert!(file.is_compressed() && !file.is_encrypted());
        decompress(&mut file).unwrap();
        assert!(!file.is_compressed() && !file.is_encrypted());
        assert_eq!(file.content(), original.as_slice());
    }

    #[test]
    fn test_stage_order_is_enforced() {
        let c = cipher();
        let mut file = File::plain("f.txt", b"x".to_vec());
        assert!(decrypt(&mut file, &c).is_err());
        assert!(decompress(&mut file).is_err());

        encrypt(&mut file, &c).unwrap();
        assert!(encrypt(&mut file, &c).is_err(), "double encryption");
        assert!(compress(&mut file, 3).is_err(), "compress after seal");
    }

    #[test]
    fn test_decrypt_wrong_key_keeps_cipher_error() {
        let mut file = File::plain("f.txt", b"secret".to_vec());
        encrypt(&mut file, &cipher()).unwrap();

        let other = ContentCipher::new(&SecretString::from("other"));
        let err = decrypt(&mut file, &other).unwrap_err();
        assert_eq!(
            err.downcast_ref::<soss_crypto::CipherError>(),
            Some(&soss_crypto::CipherError::AuthenticationFailure)
        );
        assert!(file.is_encrypted(), "failed decrypt leaves content sealed");
    }

    #[tokio::test]
    async fn test_write_file_creates_parents() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a/b/c.txt");
        let written = write_file(&File::plain(&path, b"data".to_vec())).await.unwrap();
        assert_eq!(written, 4);
        assert_eq!(std::fs::read(&path).unwrap(), b"data");
        assert!(!tmp.path().join("a/b/.c.txt.soss_tmp").exists());
    }

    #[tokio::test]
    async fn test_write_file_refuses_sealed_content() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sealed.bin");
        let file = File::sealed(&path, vec![0u8; 40], false);
        assert!(write_file(&file).await.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_read_missing_file_is_io_error() {
        let err = read_file(Path::new("/definitely/not/here.txt")).await.unwrap_err();
        assert!(err.downcast_ref::<std::io::Error>().is_some());
    }

    #[test]
    fn test_collect_files_recursive_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("b/nested")).unwrap();
        std::fs::write(tmp.path().join("b/nested/z.txt"), "z").unwrap();
        std::fs::write(tmp.path().join("a.txt"), "a").unwrap();
        std::fs::write(tmp.path().join(".hidden"), "h").unwrap();

        let files = collect_files(tmp.path(), &[]).unwrap();
        let rel: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(tmp.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            rel,
            vec![
                PathBuf::from(".hidden"),
                PathBuf::from("a.txt"),
                PathBuf::from("b/nested/z.txt"),
            ]
        );
    }

    #[test]
    fn test_collect_files_excludes() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("skipdir")).unwrap();
        std::fs::write(tmp.path().join("skipdir/inner.txt"), "x").unwrap();
        std::fs::write(tmp.path().join("keep.txt"), "k").unwrap();
        std::fs::write(tmp.path().join("drop.log"), "d").unwrap();

        let files = collect_files(tmp.path(), &["*.log".into(), "skipdir".into()]).unwrap();
        assert_eq!(files, vec![tmp.path().join("keep.txt")]);
    }
}
