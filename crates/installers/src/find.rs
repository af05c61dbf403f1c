//! Installers that locate an already-present tool, or fail.
//!
//! Neither of these has side effects: they only prove the tool is
//! there (and optionally that its version is acceptable) and report
//! where its home directory is.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use toolchest_core::{Error, Node, Result, VersionSpec};

use crate::{InstallContext, Installer, label_applies};

/// Locates an executable by searching the node's `PATH`, or fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindOnPath {
    /// Node label this installer is restricted to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Name of the executable to look for.
    pub executable_name: String,
    /// Tool home relative to the directory the executable was found in.
    /// Unset or "." means that directory itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_path: Option<String>,
    /// Optional version gate applied to whatever was found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionSpec>,
}

impl FindOnPath {
    /// Create an installer that looks for `executable_name` on `PATH`.
    #[must_use]
    pub fn new(executable_name: impl Into<String>) -> Self {
        Self {
            label: None,
            executable_name: executable_name.into(),
            relative_path: None,
            version: None,
        }
    }

    async fn find_on_path(&self, node: &dyn Node) -> Result<PathBuf> {
        let path_value = node.env("PATH").unwrap_or_default();
        for dir in std::env::split_paths(&path_value) {
            let candidate = dir.join(&self.executable_name);
            if node.is_executable_file(&candidate).await? {
                debug!(executable = %self.executable_name, found = %candidate.display(), "Found executable on PATH");
                return Ok(candidate);
            }
        }
        Err(Error::NotOnPath {
            executable: self.executable_name.clone(),
            path: path_value,
        })
    }
}

#[async_trait]
impl Installer for FindOnPath {
    fn display_name(&self) -> String {
        "Find on search path".to_string()
    }

    fn applies_to(&self, node: &dyn Node) -> bool {
        label_applies(self.label.as_deref(), node)
    }

    async fn install(&self, ctx: &InstallContext<'_>) -> Result<PathBuf> {
        let executable = self.find_on_path(ctx.node()).await?;
        let home = home_of(&executable, self.relative_path.as_deref())?;
        if let Some(spec) = &self.version {
            check_installed_version(ctx, &self.executable_name, &home, spec).await?;
        }
        Ok(home)
    }
}

/// Checks that a tool is already installed at a fixed path, or fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindInDir {
    /// Node label this installer is restricted to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Full path of the executable to check for.
    pub executable_path: String,
    /// Tool home relative to the executable's directory. Unset or "."
    /// means that directory itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_path: Option<String>,
    /// Optional version gate applied to whatever was found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionSpec>,
}

impl FindInDir {
    /// Create an installer that checks for an executable at a fixed path.
    #[must_use]
    pub fn new(executable_path: impl Into<String>) -> Self {
        Self {
            label: None,
            executable_path: executable_path.into(),
            relative_path: None,
            version: None,
        }
    }
}

#[async_trait]
impl Installer for FindInDir {
    fn display_name(&self) -> String {
        "Find in given directory".to_string()
    }

    fn applies_to(&self, node: &dyn Node) -> bool {
        label_applies(self.label.as_deref(), node)
    }

    async fn install(&self, ctx: &InstallContext<'_>) -> Result<PathBuf> {
        let executable = PathBuf::from(&self.executable_path);
        if !ctx.node().is_executable_file(&executable).await? {
            return Err(Error::NotFound {
                path: self.executable_path.clone(),
            });
        }
        let home = home_of(&executable, self.relative_path.as_deref())?;
        if let Some(spec) = &self.version {
            check_installed_version(ctx, &self.executable_path, &home, spec).await?;
        }
        Ok(home)
    }
}

/// The tool home for a located executable: its parent directory, or a
/// configured path relative to it.
fn home_of(executable: &Path, relative_path: Option<&str>) -> Result<PathBuf> {
    let parent = executable.parent().ok_or_else(|| {
        Error::configuration(format!(
            "executable found at '{}' has no parent folder",
            executable.display()
        ))
    })?;
    match relative_path {
        None | Some(".") => Ok(parent.to_path_buf()),
        Some(relative) => Ok(parent.join(relative)),
    }
}

/// Run the version command in the tool home, extract the version and
/// check it against the configured bounds.
pub(crate) async fn check_installed_version(
    ctx: &InstallContext<'_>,
    executable: &str,
    home: &Path,
    spec: &VersionSpec,
) -> Result<()> {
    let output = ctx.node().run(spec.command(), home).await?;
    let detected = spec.parse(&output.stdout);
    if spec.check(detected.as_deref()) != Ordering::Equal {
        return Err(Error::WrongVersion {
            executable: executable.to_string(),
            found_at: home.display().to_string(),
            detected,
            min: spec.min().map(String::from),
            max: spec.max().map(String::from),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use toolchest_core::LocalNode;

    #[cfg(unix)]
    fn make_executable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn git_version_spec(min: &str, max: Option<&str>) -> VersionSpec {
        VersionSpec::new(
            vec![
                "sh".into(),
                "-c".into(),
                "echo git version 2.39.5".into(),
            ],
            "git version ([0-9.]*)",
            Some(min.to_string()),
            max.map(String::from),
        )
        .unwrap()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_find_on_path_locates_executable() {
        let temp = TempDir::new().unwrap();
        let bin = temp.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let exe = bin.join("mytool");
        std::fs::write(&exe, b"#!/bin/sh\n").unwrap();
        make_executable(&exe);

        let node = LocalNode::new("n").with_env("PATH", bin.display().to_string());
        let ctx = InstallContext::new("mytool", &node, temp.path().join("home"));
        let installer = FindOnPath::new("mytool");
        assert_eq!(installer.install(&ctx).await.unwrap(), bin);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_find_on_path_relative_path() {
        let temp = TempDir::new().unwrap();
        let bin = temp.path().join("opt/tool/bin");
        std::fs::create_dir_all(&bin).unwrap();
        let exe = bin.join("mytool");
        std::fs::write(&exe, b"#!/bin/sh\n").unwrap();
        make_executable(&exe);

        let node = LocalNode::new("n").with_env("PATH", bin.display().to_string());
        let ctx = InstallContext::new("mytool", &node, temp.path().join("home"));
        let mut installer = FindOnPath::new("mytool");
        installer.relative_path = Some("..".into());
        assert_eq!(installer.install(&ctx).await.unwrap(), bin.join(".."));
    }

    #[tokio::test]
    async fn test_find_on_path_reports_searched_path() {
        let temp = TempDir::new().unwrap();
        let node = LocalNode::new("n").with_env("PATH", "/nonexistent-toolchest-dir");
        let ctx = InstallContext::new("mytool", &node, temp.path());
        let err = FindOnPath::new("mytool").install(&ctx).await.unwrap_err();
        match err {
            Error::NotOnPath { executable, path } => {
                assert_eq!(executable, "mytool");
                assert_eq!(path, "/nonexistent-toolchest-dir");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_find_in_dir_locates_executable() {
        let temp = TempDir::new().unwrap();
        let exe = temp.path().join("mytool");
        std::fs::write(&exe, b"#!/bin/sh\n").unwrap();
        make_executable(&exe);

        let node = LocalNode::new("n");
        let ctx = InstallContext::new("mytool", &node, temp.path().join("home"));
        let installer = FindInDir::new(exe.display().to_string());
        assert_eq!(installer.install(&ctx).await.unwrap(), temp.path());
    }

    #[tokio::test]
    async fn test_find_in_dir_missing_executable() {
        let temp = TempDir::new().unwrap();
        let node = LocalNode::new("n");
        let ctx = InstallContext::new("mytool", &node, temp.path());
        let missing = temp.path().join("absent").display().to_string();
        let err = FindInDir::new(missing.clone()).install(&ctx).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { path } if path == missing));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_version_gate_accepts_in_range() {
        let temp = TempDir::new().unwrap();
        let exe = temp.path().join("git");
        std::fs::write(&exe, b"#!/bin/sh\n").unwrap();
        make_executable(&exe);

        let node = LocalNode::new("n");
        let ctx = InstallContext::new("git", &node, temp.path().join("home"));
        let mut installer = FindInDir::new(exe.display().to_string());
        installer.version = Some(git_version_spec("2.0", Some("3.0")));
        assert_eq!(installer.install(&ctx).await.unwrap(), temp.path());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_version_gate_rejects_out_of_range() {
        let temp = TempDir::new().unwrap();
        let exe = temp.path().join("git");
        std::fs::write(&exe, b"#!/bin/sh\n").unwrap();
        make_executable(&exe);

        let node = LocalNode::new("n");
        let ctx = InstallContext::new("git", &node, temp.path().join("home"));
        let mut installer = FindInDir::new(exe.display().to_string());
        installer.version = Some(git_version_spec("3.0", None));
        let err = installer.install(&ctx).await.unwrap_err();
        match err {
            Error::WrongVersion { detected, min, .. } => {
                assert_eq!(detected.as_deref(), Some("2.39.5"));
                assert_eq!(min.as_deref(), Some("3.0"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_label_applicability() {
        let plain = LocalNode::new("n");
        let labelled =
            LocalNode::new("n").with_labels(vec!["linux".to_string(), "docker".to_string()]);

        let mut installer = FindOnPath::new("mytool");
        assert!(installer.applies_to(&plain));

        installer.label = Some("linux".into());
        assert!(!installer.applies_to(&plain));
        assert!(installer.applies_to(&labelled));
    }
}
