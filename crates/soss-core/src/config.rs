use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{SossError, SossResult};

/// Top-level configuration (loaded from ~/.soss/config.yaml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SossConfig {
    pub storage: StorageConfig,
    pub transfer: TransferConfig,
    pub secret: SecretConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// S3-compatible endpoint URL
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Default bucket name
    pub bucket: String,
    /// Reject plaintext HTTP endpoints instead of warning
    pub enforce_tls: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Concurrent transfer tasks (0 = twice the CPU count)
    pub workers: usize,
    /// Compress content before encryption
    pub compress: bool,
    /// zstd level used when compressing
    pub compression_level: i32,
    /// Glob patterns matched against file and directory names during walks
    pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretConfig {
    /// Secret file location (default: ~/.soss/.secret)
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".into(),
            region: "us-east-1".into(),
            bucket: "soss".into(),
            enforce_tls: false,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            compress: false,
            compression_level: 3,
            exclude_patterns: Vec::new(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl TransferConfig {
    /// Resolve `workers`, falling back to twice the available parallelism
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get() * 2)
            .unwrap_or(8)
    }
}

/// On-disk layout: the sectioned [`SossConfig`] plus the flat keys older
/// releases wrote at the top level (`endpoint`, `bucket`, `client_type`).
#[derive(Deserialize)]
struct ConfigFile {
    #[serde(flatten)]
    config: SossConfig,
    endpoint: Option<String>,
    bucket: Option<String>,
    client_type: Option<String>,
}

impl ConfigFile {
    /// Fold legacy top-level keys into `storage`. They override the section.
    fn into_config(self) -> SossConfig {
        let mut config = self.config;
        if let Some(endpoint) = self.endpoint {
            tracing::warn!(
                endpoint = %endpoint,
                "top-level `endpoint` is deprecated, move it to `storage.endpoint`"
            );
            config.storage.endpoint = endpoint;
        }
        if let Some(bucket) = self.bucket {
            tracing::warn!(
                bucket = %bucket,
                "top-level `bucket` is deprecated, move it to `storage.bucket`"
            );
            config.storage.bucket = bucket;
        }
        if let Some(client_type) = self.client_type {
            tracing::debug!(client_type = %client_type, "ignoring legacy client_type");
        }
        config
    }
}

impl SossConfig {
    /// Load configuration from `path`. A missing file yields defaults.
    ///
    /// Files ending in `.toml` are parsed as TOML, everything else as YAML.
    pub fn load(path: &Path) -> SossResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| SossError::Config(format!("reading {}: {e}", path.display())))?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> SossResult<Self> {
        let is_toml = path.extension().is_some_and(|ext| ext == "toml");
        let file: ConfigFile = if is_toml {
            toml::from_str(content)
                .map_err(|e| SossError::Config(format!("parsing {}: {e}", path.display())))?
        } else if content.trim().is_empty() {
            return Ok(Self::default());
        } else {
            serde_yml::from_str(content)
                .map_err(|e| SossError::Config(format!("parsing {}: {e}", path.display())))?
        };
        Ok(file.into_config())
    }
}

/// The current user's home directory, from `HOME` (or `USERPROFILE`)
pub fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Per-user state directory: ~/.soss
pub fn soss_dir() -> PathBuf {
    home_dir().join(".soss")
}

pub fn default_config_path() -> PathBuf {
    soss_dir().join("config.yaml")
}

/// Expand `~` in path to the user's home directory
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home_dir().join(rest),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_yaml_config() {
        let yaml = r#"
storage:
  endpoint: https://s3.example.com
  region: eu-west-1
  bucket: archive
  enforce_tls: true
transfer:
  workers: 6
  compress: true
  compression_level: 9
  exclude_patterns: ["*.tmp", ".git"]
secret:
  path: /tmp/soss-secret
log:
  level: debug
  format: json
"#;
        let config = SossConfig::parse(yaml, Path::new("config.yaml")).unwrap();

        assert_eq!(config.storage.endpoint, "https://s3.example.com");
        assert_eq!(config.storage.region, "eu-west-1");
        assert_eq!(config.storage.bucket, "archive");
        assert!(config.storage.enforce_tls);
        assert_eq!(config.transfer.workers, 6);
        assert!(config.transfer.compress);
        assert_eq!(config.transfer.compression_level, 9);
        assert_eq!(config.transfer.exclude_patterns, vec!["*.tmp", ".git"]);
        assert_eq!(config.secret.path, Some(PathBuf::from("/tmp/soss-secret")));
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.format, "json");
    }

    #[test]
    fn test_parse_partial_yaml_config() {
        let yaml = "storage:\n  bucket: photos\n";
        let config = SossConfig::parse(yaml, Path::new("c.yml")).unwrap();

        // Overridden
        assert_eq!(config.storage.bucket, "photos");
        // Defaults
        assert_eq!(config.storage.region, "us-east-1");
        assert_eq!(config.transfer.compression_level, 3);
        assert!(!config.transfer.compress);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_parse_toml_config() {
        let toml_str = r#"
[storage]
endpoint = "http://127.0.0.1:9000"
bucket = "dev"

[transfer]
compress = true
"#;
        let config = SossConfig::parse(toml_str, Path::new("soss.toml")).unwrap();
        assert_eq!(config.storage.endpoint, "http://127.0.0.1:9000");
        assert_eq!(config.storage.bucket, "dev");
        assert!(config.transfer.compress);
    }

    #[test]
    fn test_parse_legacy_flat_yaml_config() {
        let yaml = r#"
client_type: oss
endpoint: oss-cn-hangzhou.aliyuncs.com
bucket: team-archive
"#;
        let config = SossConfig::parse(yaml, Path::new("config.yaml")).unwrap();
        assert_eq!(config.storage.endpoint, "oss-cn-hangzhou.aliyuncs.com");
        assert_eq!(config.storage.bucket, "team-archive");
        assert_eq!(config.storage.region, "us-east-1");
    }

    #[test]
    fn test_legacy_keys_override_storage_section() {
        let yaml = r#"
bucket: legacy
storage:
  bucket: sectioned
  region: eu-west-1
"#;
        let config = SossConfig::parse(yaml, Path::new("config.yaml")).unwrap();
        assert_eq!(config.storage.bucket, "legacy");
        assert_eq!(config.storage.region, "eu-west-1");
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = SossConfig::parse("", Path::new("config.yaml")).unwrap();
        assert_eq!(config.storage.bucket, "soss");
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let err = SossConfig::parse("storage: [unclosed", Path::new("config.yaml")).unwrap_err();
        assert!(matches!(err, SossError::Config(_)));
    }

    #[test]
    fn test_load_missing_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SossConfig::load(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.storage.bucket, "soss");
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "transfer:\n  workers: 3\n").unwrap();
        let config = SossConfig::load(&path).unwrap();
        assert_eq!(config.transfer.workers, 3);
        assert_eq!(config.transfer.effective_workers(), 3);
    }

    #[test]
    fn test_effective_workers_default() {
        let cfg = TransferConfig::default();
        assert!(cfg.effective_workers() >= 2);
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = expand_tilde(Path::new("~/data/file"));
        assert!(expanded.ends_with("data/file"));
        assert!(!expanded.starts_with("~"));
        assert_eq!(expand_tilde(Path::new("/abs")), PathBuf::from("/abs"));
    }
}
