//! Local machine implementation of the [`Node`] trait.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use async_trait::async_trait;
use flate2::read::GzDecoder;
use tar::Archive;
use tracing::debug;

use super::{CommandOutput, Node};
use crate::{Error, Result};

/// The machine this process runs on.
///
/// Environment lookups go through an override map first, so callers can
/// inject node-level variables (the way a node's configured environment
/// would behave) without touching the process environment.
#[derive(Debug, Clone, Default)]
pub struct LocalNode {
    name: String,
    labels: Vec<String>,
    env_overrides: HashMap<String, String>,
}

impl LocalNode {
    /// Create a local node with a display name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: Vec::new(),
            env_overrides: HashMap::new(),
        }
    }

    /// Attach labels that installers can match against.
    #[must_use]
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    /// Inject a node-level environment variable, shadowing the process
    /// environment.
    #[must_use]
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_overrides.insert(name.into(), value.into());
        self
    }
}

#[async_trait]
impl Node for LocalNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn is_remote(&self) -> bool {
        false
    }

    fn env(&self, name: &str) -> Option<String> {
        self.env_overrides
            .get(name)
            .cloned()
            .or_else(|| std::env::var(name).ok())
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(tokio::fs::try_exists(path).await?)
    }

    async fn is_executable_file(&self, path: &Path) -> Result<bool> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err.into()),
        };
        if !metadata.is_file() {
            return Ok(false);
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            Ok(metadata.permissions().mode() & 0o111 != 0)
        }
        #[cfg(not(unix))]
        {
            Ok(true)
        }
    }

    async fn is_non_empty_dir(&self, path: &Path) -> Result<bool> {
        match tokio::fs::read_dir(path).await {
            Ok(mut entries) => Ok(entries.next_entry().await?.is_some()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) if err.kind() == std::io::ErrorKind::NotADirectory => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn mkdirs(&self, path: &Path) -> Result<()> {
        Ok(tokio::fs::create_dir_all(path).await?)
    }

    async fn delete_contents(&self, path: &Path) -> Result<()> {
        let mut entries = tokio::fs::read_dir(path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let entry_path = entry.path();
            if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(&entry_path).await?;
            } else {
                tokio::fs::remove_file(&entry_path).await?;
            }
        }
        Ok(())
    }

    async fn last_modified_millis(&self, path: &Path) -> Result<Option<i64>> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let modified = metadata.modified()?;
        let millis = modified
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        Ok(Some(millis))
    }

    async fn touch(&self, path: &Path, mtime_millis: i64) -> Result<()> {
        let path = path.to_path_buf();
        spawn_blocking(move || {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;
            let mtime = UNIX_EPOCH + Duration::from_millis(mtime_millis.max(0) as u64);
            file.set_modified(mtime)?;
            Ok(())
        })
        .await
    }

    async fn run(&self, command: &[String], cwd: &Path) -> Result<CommandOutput> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| Error::configuration("command line is empty"))?;
        debug!(%program, cwd = %cwd.display(), "Running command on local node");
        let output = tokio::process::Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(std::process::Stdio::null())
            .output()
            .await?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            status: output.status.code().unwrap_or(-1),
        })
    }

    async fn unpack_zip(&self, archive: &[u8], dest: &Path) -> Result<()> {
        let data = archive.to_vec();
        let dest = dest.to_path_buf();
        spawn_blocking(move || extract_zip(&data, &dest)).await
    }

    async fn unpack_tar_gz(&self, archive: &[u8], dest: &Path) -> Result<()> {
        let data = archive.to_vec();
        let dest = dest.to_path_buf();
        spawn_blocking(move || {
            std::fs::create_dir_all(&dest)?;
            let decoder = GzDecoder::new(Cursor::new(data));
            let mut archive = Archive::new(decoder);
            archive.unpack(&dest)?;
            Ok(())
        })
        .await
    }

    async fn set_executable_recursive(&self, dest: &Path) -> Result<()> {
        #[cfg(unix)]
        {
            let dest = dest.to_path_buf();
            spawn_blocking(move || {
                use std::os::unix::fs::PermissionsExt;
                for entry in walkdir::WalkDir::new(&dest) {
                    let entry = entry.map_err(|e| Error::Io(std::io::Error::other(e)))?;
                    if entry.file_type().is_file() {
                        let mut perms = entry.metadata().map(|m| m.permissions()).map_err(
                            |e| Error::Io(std::io::Error::other(e)),
                        )?;
                        perms.set_mode(perms.mode() | 0o111);
                        std::fs::set_permissions(entry.path(), perms)?;
                    }
                }
                Ok(())
            })
            .await
        }
        #[cfg(not(unix))]
        {
            let _ = dest;
            Ok(())
        }
    }
}

async fn spawn_blocking<T: Send + 'static>(
    work: impl FnOnce() -> Result<T> + Send + 'static,
) -> Result<T> {
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
}

fn extract_zip(data: &[u8], dest: &Path) -> Result<()> {
    let cursor = Cursor::new(data);
    let mut archive = zip::ZipArchive::new(cursor)
        .map_err(|e| Error::Io(std::io::Error::other(format!("failed to open zip: {e}"))))?;
    std::fs::create_dir_all(dest)?;
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(|e| {
            Error::Io(std::io::Error::other(format!("failed to read zip entry: {e}")))
        })?;
        let out_path: PathBuf = match file.enclosed_name() {
            Some(path) => dest.join(path),
            None => continue,
        };
        if file.is_dir() {
            std::fs::create_dir_all(&out_path)?;
        } else {
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut content = Vec::new();
            file.read_to_end(&mut content)?;
            std::fs::write(&out_path, &content)?;

            #[cfg(unix)]
            if let Some(mode) = file.unix_mode() {
                use std::os::unix::fs::PermissionsExt;
                let mut perms = std::fs::metadata(&out_path)?.permissions();
                perms.set_mode(mode);
                std::fs::set_permissions(&out_path, perms)?;
            }
        }
    }
    Ok(())
}
