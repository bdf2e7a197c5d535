//! Storage adapter that persists each record to its own JSON file

use super::StorageAdapter;
use crate::app_name::AppName;
use crate::error::StorageError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// Stores every record as `<dir>/<key>.json`
///
/// Uses platform-specific conventions when built from an [`AppName`]:
/// - Linux: `$XDG_CONFIG_HOME/<app>/store` or `~/.config/<app>/store`
/// - macOS: `~/Library/Application Support/<app>/store`
/// - Windows: `%APPDATA%\<app>\store`
#[derive(Clone, Debug)]
pub struct FileStorage {
    dir: PathBuf,
    namespace: String,
}

impl FileStorage {
    /// Storage under the application's config-local directory
    ///
    /// Falls back to `./store` when no home directory can be determined.
    pub fn new(app_name: &AppName) -> Self {
        let dir = directories::ProjectDirs::from(
            app_name.qualifier.as_str(),
            app_name.organization.as_str(),
            app_name.application.as_str(),
        )
        .map(|dirs| dirs.config_local_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
        .join("store");

        Self::at(dir)
    }

    /// Storage in an explicit directory
    ///
    /// Every spelling of the same directory (relative or absolute, with `.`,
    /// `..` or a trailing separator) shares one namespace.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let namespace = format!("file:{}", normalize(&dir).display());
        Self { dir, namespace }
    }

    /// Directory holding the record files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File path for a record, rejecting keys that would escape the directory
    pub fn record_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let mut components = Path::new(key).components();
        let single_name = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );

        if !single_name || key.contains(['/', '\\', '\0']) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        Ok(self.dir.join(format!("{}.json", key)))
    }
}

/// Absolute, lexically normalized form of `dir`
fn normalize(dir: &Path) -> PathBuf {
    let absolute = std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf());

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

#[async_trait]
impl StorageAdapter for FileStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.record_path(key)?;

        match fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.record_path(key)?;
        let io_error = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };

        fs::create_dir_all(&self.dir).await.map_err(io_error)?;
        fs::write(&path, value).await.map_err(io_error)
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }
}
