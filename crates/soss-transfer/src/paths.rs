//! Local path ⇄ object key mapping
//!
//! Upload keys are built from a user prefix, the file's directory relative to
//! the walked root, and the file name: `prefix/relative_dir/basename`. On
//! download a key is appended under the output directory as-is.

use std::path::{Component, Path, PathBuf};

use soss_core::{SossError, SossResult};

/// Lexically resolve `.` and `..` without touching the filesystem.
///
/// A `..` that cannot pop a normal component is kept, so relative paths that
/// climb above their start still compare consistently.
fn normalize(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out.iter().collect()
}

/// `file` relative to `root`.
///
/// Both paths are normalized first and compared component by component, so
/// `root = "uploads"` strips `uploads/aa/b.txt` but not `uploads2/b.txt`. A
/// file outside `root` is returned unchanged.
pub fn trim_directory(file: &Path, root: &Path) -> PathBuf {
    let normalized_file = normalize(file);
    let normalized_root = normalize(root);
    match normalized_file.strip_prefix(&normalized_root) {
        Ok(rest) => rest.to_path_buf(),
        Err(_) => file.to_path_buf(),
    }
}

/// Normal components of `path` as strings; root, prefix, `.` and `..` are dropped.
fn key_segments(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

fn prefix_segments(prefix: &str) -> impl Iterator<Item = &str> {
    prefix.split('/').filter(|s| !s.is_empty())
}

/// The key directory an upload of `file` lands in: `prefix/relative_dir`.
///
/// `root` is the directory the file was discovered under; `None` means the
/// file was named directly and maps straight under `prefix`.
pub fn upload_prefix(prefix: &str, file: &Path, root: Option<&Path>) -> String {
    let mut segments: Vec<String> = prefix_segments(prefix).map(str::to_owned).collect();

    if let Some(root) = root {
        let relative = trim_directory(file, root);
        if let Some(dir) = relative.parent() {
            segments.extend(key_segments(dir));
        }
    }

    segments.join("/")
}

/// Full object key for `file`: [`upload_prefix`] plus the file name.
pub fn object_key(prefix: &str, file: &Path, root: Option<&Path>) -> String {
    let dir = upload_prefix(prefix, file, root);
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if dir.is_empty() {
        name
    } else {
        format!("{dir}/{name}")
    }
}

/// Where the object `key` is written under `output_dir`.
///
/// Keys that would climb out of `output_dir` are rejected.
pub fn local_path(output_dir: &Path, key: &str) -> SossResult<PathBuf> {
    let mut path = output_dir.to_path_buf();
    let mut pushed = false;
    for segment in key.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(SossError::InvalidKey(key.to_string())),
            s => {
                path.push(s);
                pushed = true;
            }
        }
    }
    if !pushed {
        return Err(SossError::InvalidKey(key.to_string()));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_trim_directory_strips_root() {
        assert_eq!(
            trim_directory(Path::new("uploads/aa/bb/cc.txt"), Path::new("uploads")),
            PathBuf::from("aa/bb/cc.txt")
        );
        assert_eq!(
            trim_directory(Path::new("./uploads/xx.txt"), Path::new("uploads/")),
            PathBuf::from("xx.txt")
        );
    }

    #[test]
    fn test_trim_directory_is_component_wise() {
        assert_eq!(
            trim_directory(Path::new("uploads2/b.txt"), Path::new("uploads")),
            PathBuf::from("uploads2/b.txt")
        );
    }

    #[test]
    fn test_trim_directory_resolves_dots() {
        assert_eq!(
            trim_directory(Path::new("a/b/../c/d.txt"), Path::new("a/c")),
            PathBuf::from("d.txt")
        );
    }

    #[test]
    fn test_upload_prefix_walked_file() {
        let root = Path::new("uploads");
        assert_eq!(
            upload_prefix("tester/", Path::new("uploads/aa/bb/cc.txt"), Some(root)),
            "tester/aa/bb"
        );
        assert_eq!(
            upload_prefix("tester/", Path::new("uploads/xx.txt"), Some(root)),
            "tester"
        );
    }

    #[test]
    fn test_upload_prefix_direct_file() {
        assert_eq!(
            upload_prefix("p", Path::new("/abs/dir/file.txt"), None),
            "p"
        );
        assert_eq!(upload_prefix("", Path::new("file.txt"), None), "");
    }

    #[test]
    fn test_object_key_drops_empty_segments() {
        let root = Path::new("/data");
        assert_eq!(
            object_key("//a//b/", Path::new("/data/x/y.txt"), Some(root)),
            "a/b/x/y.txt"
        );
        assert_eq!(object_key("", Path::new("/data/y.txt"), Some(root)), "y.txt");
    }

    #[test]
    fn test_object_key_outside_root_stays_in_tree() {
        let key = object_key("p", Path::new("/elsewhere/../f/g.txt"), Some(Path::new("/data")));
        assert_eq!(key, "p/elsewhere/f/g.txt");
        assert!(!key.contains(".."));
    }

    #[test]
    fn test_local_path_appends_key() {
        assert_eq!(
            local_path(Path::new("downloads"), "tester/aa/bb/cc.txt").unwrap(),
            PathBuf::from("downloads/tester/aa/bb/cc.txt")
        );
        assert_eq!(
            local_path(Path::new("out"), "/lead//double.txt").unwrap(),
            PathBuf::from("out/lead/double.txt")
        );
    }

    #[test]
    fn test_local_path_rejects_escape() {
        let err = local_path(Path::new("out"), "a/../../etc/passwd").unwrap_err();
        assert!(matches!(err, SossError::InvalidKey(_)));
    }

    #[test]
    fn test_local_path_rejects_empty_key() {
        assert!(matches!(
            local_path(Path::new("out"), "/"),
            Err(SossError::InvalidKey(_))
        ));
    }

    proptest! {
        #[test]
        fn local_path_never_escapes_output_dir(key in "[a-z./]{0,40}") {
            if let Ok(path) = local_path(Path::new("out"), &key) {
                prop_assert!(path.starts_with("out"));
                prop_assert!(!path.components().any(|c| c == Component::ParentDir));
            }
        }

        #[test]
        fn walked_keys_have_no_empty_segments(
            prefix in "[a-z/]{0,12}",
            dirs in proptest::collection::vec("[a-z]{1,6}", 0..4),
        ) {
            let root = Path::new("root");
            let mut file = root.to_path_buf();
            for d in &dirs {
                file.push(d);
            }
            file.push("f.txt");

            let key = object_key(&prefix, &file, Some(root));
            prop_assert!(!key.starts_with('/'));
            prop_assert!(!key.contains("//"));
            prop_assert!(key.ends_with("f.txt"));
        }
    }
}
