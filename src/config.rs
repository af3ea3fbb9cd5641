use std::fs;
use std::io::Write;
use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::domain::{ChecksumBackend, DEFAULT_MAX_ATTEMPTS};
use crate::error::SyncError;
use crate::fetcher::FailedAttemptPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "ncbi16s-sync.json";

/// On-disk settings. Every field is optional; missing ones fall back to
/// command-line values or built-in defaults.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_failed_attempts: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_backend: Option<ChecksumBackend>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub database_dir: Option<Utf8PathBuf>,
    pub log_dir: Option<Utf8PathBuf>,
    pub max_attempts: Option<u32>,
    pub keep_failed_attempts: Option<bool>,
    pub checksum_backend: Option<ChecksumBackend>,
}

#[derive(Debug, Clone)]
pub struct Defaults {
    pub database_dir: Utf8PathBuf,
    pub log_dir: Utf8PathBuf,
}

impl Defaults {
    pub fn from_home() -> Result<Self, SyncError> {
        let home = BaseDirs::new()
            .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.home_dir().to_path_buf()).ok())
            .ok_or_else(|| SyncError::Filesystem("unable to resolve home directory".to_string()))?;
        Ok(Self {
            database_dir: home.join("16S"),
            log_dir: home.join("16SLogs"),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub database_dir: Utf8PathBuf,
    pub log_dir: Utf8PathBuf,
    pub max_attempts: u32,
    pub failed_attempts: FailedAttemptPolicy,
    pub checksum_backend: ChecksumBackend,
    /// Warnings raised while resolving, logged once logging is up.
    pub notes: Vec<String>,
}

impl ResolvedConfig {
    pub fn to_config(&self) -> Config {
        Config {
            database_dir: Some(self.database_dir.to_string()),
            log_dir: Some(self.log_dir.to_string()),
            max_attempts: Some(self.max_attempts),
            keep_failed_attempts: Some(self.failed_attempts == FailedAttemptPolicy::Keep),
            checksum_backend: Some(self.checksum_backend),
        }
    }

    pub fn ensure_dirs(&self) -> Result<(), SyncError> {
        for dir in [&self.database_dir, &self.log_dir] {
            fs::create_dir_all(dir.as_std_path())
                .map_err(|err| SyncError::Filesystem(format!("invalid directory {dir}: {err}")))?;
        }
        Ok(())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Resolves settings from flags, the config file and defaults (in that
    /// order) and writes the result back so later runs pick it up.
    pub fn resolve(
        path: Option<&str>,
        overrides: ConfigOverrides,
        defaults: &Defaults,
    ) -> Result<ResolvedConfig, SyncError> {
        let config_path = Utf8PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        let mut notes = Vec::new();

        let config = if !config_path.as_std_path().exists() {
            notes.push(format!("no config file found, creating {config_path}"));
            Config::default()
        } else {
            match Self::load(&config_path) {
                Ok(config) => config,
                Err(SyncError::InvalidConfig { message, .. })
                    if overrides.database_dir.is_some() && overrides.log_dir.is_some() =>
                {
                    notes.push(format!(
                        "invalid config file {config_path} ({message}), repairing it from arguments"
                    ));
                    Config::default()
                }
                Err(err) => return Err(err),
            }
        };

        let mut resolved = Self::resolve_config(config, overrides, defaults);
        resolved.notes.extend(notes);
        Self::persist(&config_path, &resolved.to_config())?;
        Ok(resolved)
    }

    pub fn load(path: &Utf8Path) -> Result<Config, SyncError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| SyncError::ConfigRead(PathBuf::from(path.as_str())))?;
        serde_json::from_str(&content).map_err(|err| SyncError::InvalidConfig {
            path: PathBuf::from(path.as_str()),
            message: err.to_string(),
        })
    }

    pub fn resolve_config(
        config: Config,
        overrides: ConfigOverrides,
        defaults: &Defaults,
    ) -> ResolvedConfig {
        let database_dir = overrides
            .database_dir
            .or_else(|| config.database_dir.map(Utf8PathBuf::from))
            .unwrap_or_else(|| defaults.database_dir.clone());
        let log_dir = overrides
            .log_dir
            .or_else(|| config.log_dir.map(Utf8PathBuf::from))
            .unwrap_or_else(|| defaults.log_dir.clone());
        let max_attempts = overrides
            .max_attempts
            .or(config.max_attempts)
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);
        let keep = overrides
            .keep_failed_attempts
            .or(config.keep_failed_attempts)
            .unwrap_or(true);
        let checksum_backend = overrides
            .checksum_backend
            .or(config.checksum_backend)
            .unwrap_or_default();

        ResolvedConfig {
            database_dir,
            log_dir,
            max_attempts,
            failed_attempts: if keep {
                FailedAttemptPolicy::Keep
            } else {
                FailedAttemptPolicy::Discard
            },
            checksum_backend,
            notes: Vec::new(),
        }
    }

    pub fn persist(path: &Utf8Path, config: &Config) -> Result<(), SyncError> {
        let write_error = |_: std::io::Error| SyncError::ConfigWrite(PathBuf::from(path.as_str()));
        let content = serde_json::to_vec_pretty(config)
            .map_err(|err| SyncError::Filesystem(err.to_string()))?;
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or(Utf8Path::new("."));
        let mut temp = tempfile::Builder::new()
            .prefix("ncbi16s-sync-config")
            .tempfile_in(parent.as_std_path())
            .map_err(write_error)?;
        temp.write_all(&content).map_err(write_error)?;
        temp.persist(path.as_std_path())
            .map_err(|err| write_error(err.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Defaults {
        Defaults {
            database_dir: Utf8PathBuf::from("/home/u/16S"),
            log_dir: Utf8PathBuf::from("/home/u/16SLogs"),
        }
    }

    #[test]
    fn empty_config_uses_defaults() {
        let resolved =
            ConfigLoader::resolve_config(Config::default(), ConfigOverrides::default(), &defaults());
        assert_eq!(resolved.database_dir, Utf8PathBuf::from("/home/u/16S"));
        assert_eq!(resolved.log_dir, Utf8PathBuf::from("/home/u/16SLogs"));
        assert_eq!(resolved.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(resolved.failed_attempts, FailedAttemptPolicy::Keep);
        assert_eq!(resolved.checksum_backend, ChecksumBackend::Builtin);
    }

    #[test]
    fn flags_beat_file_beat_defaults() {
        let config = Config {
            database_dir: Some("/srv/16S".to_string()),
            log_dir: Some("/srv/logs".to_string()),
            max_attempts: Some(2),
            keep_failed_attempts: Some(false),
            checksum_backend: Some(ChecksumBackend::Md5sum),
        };
        let overrides = ConfigOverrides {
            database_dir: Some(Utf8PathBuf::from("/flag/16S")),
            max_attempts: Some(9),
            ..ConfigOverrides::default()
        };
        let resolved = ConfigLoader::resolve_config(config, overrides, &defaults());
        assert_eq!(resolved.database_dir, Utf8PathBuf::from("/flag/16S"));
        assert_eq!(resolved.log_dir, Utf8PathBuf::from("/srv/logs"));
        assert_eq!(resolved.max_attempts, 9);
        assert_eq!(resolved.failed_attempts, FailedAttemptPolicy::Discard);
        assert_eq!(resolved.checksum_backend, ChecksumBackend::Md5sum);
    }
}
