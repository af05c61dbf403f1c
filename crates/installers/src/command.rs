//! Installers that point somewhere or run something.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use toolchest_core::{Error, Node, Result, expand};

use crate::{InstallContext, Installer, label_applies};

/// Declares a tool available from a shared directory. Performs no
/// action beyond resolving and validating the configured path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedDirectory {
    /// Node label this installer is restricted to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// The tool home, relative to the preferred location. May reference
    /// node environment variables as `${VAR}`.
    pub tool_home: String,
}

impl SharedDirectory {
    /// Create an installer pointing at `tool_home`.
    #[must_use]
    pub fn new(tool_home: impl Into<String>) -> Self {
        Self {
            label: None,
            tool_home: tool_home.into(),
        }
    }
}

#[async_trait]
impl Installer for SharedDirectory {
    fn display_name(&self) -> String {
        "Shared directory".to_string()
    }

    fn applies_to(&self, node: &dyn Node) -> bool {
        label_applies(self.label.as_deref(), node)
    }

    async fn install(&self, ctx: &InstallContext<'_>) -> Result<PathBuf> {
        let expanded = ctx.expand_node_variables(&self.tool_home);
        expand::ensure_fully_expanded("tool home", &expanded)?;
        Ok(ctx.tool_home().join(expanded))
    }
}

/// Declines to install, optionally failing the resolution.
///
/// Used to tell users a tool cannot be provided here (for example on an
/// unsupported platform) instead of failing with an obscure error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stub {
    /// Node label this installer is restricted to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Message shown to the user; a generic one is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When true the installer fails after logging the message;
    /// otherwise it succeeds with the (untouched) preferred location.
    #[serde(default)]
    pub fail_install: bool,
}

impl Stub {
    /// Create a stub with the given message that fails the install.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            label: None,
            message: Some(message.into()),
            fail_install: true,
        }
    }
}

#[async_trait]
impl Installer for Stub {
    fn display_name(&self) -> String {
        "Stub installer".to_string()
    }

    fn applies_to(&self, node: &dyn Node) -> bool {
        label_applies(self.label.as_deref(), node)
    }

    async fn install(&self, ctx: &InstallContext<'_>) -> Result<PathBuf> {
        let message = format!(
            "[{}] - {}",
            ctx.tool_name(),
            self.message
                .as_deref()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or("the tool is not available on this node")
        );
        ctx.log_line(&message);
        if self.fail_install {
            return Err(Error::unsupported(message));
        }
        Ok(ctx.tool_home().to_path_buf())
    }
}

/// Installs a tool by running a shell command in the preferred location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCommand {
    /// Node label this installer is restricted to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// The shell command line to run.
    pub command: String,
    /// The tool home relative to the preferred location, `${VAR}`
    /// references allowed. Unset means the preferred location itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_home: Option<String>,
    /// When true, unresolved `${VAR}` references in `tool_home` are a
    /// configuration error instead of being kept verbatim.
    #[serde(default)]
    pub fail_on_unresolved: bool,
}

impl RunCommand {
    /// Create an installer that runs `command` in the preferred location.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            label: None,
            command: command.into(),
            tool_home: None,
            fail_on_unresolved: false,
        }
    }
}

#[async_trait]
impl Installer for RunCommand {
    fn display_name(&self) -> String {
        "Run command".to_string()
    }

    fn applies_to(&self, node: &dyn Node) -> bool {
        label_applies(self.label.as_deref(), node)
    }

    async fn install(&self, ctx: &InstallContext<'_>) -> Result<PathBuf> {
        let home = match &self.tool_home {
            None => ctx.tool_home().to_path_buf(),
            Some(tool_home) => {
                let expanded = ctx.expand_node_variables(tool_home);
                if self.fail_on_unresolved {
                    expand::ensure_fully_expanded("tool home", &expanded)?;
                }
                ctx.tool_home().join(expanded)
            }
        };
        let dir = ctx.tool_home();
        ctx.node().mkdirs(dir).await?;
        debug!(command = %self.command, dir = %dir.display(), "Running install command");
        let output = ctx
            .node()
            .run(
                &["sh".to_string(), "-c".to_string(), self.command.clone()],
                dir,
            )
            .await?;
        for line in output.stdout.lines() {
            ctx.log_line(line);
        }
        if output.status != 0 {
            return Err(Error::Command {
                command: self.command.clone(),
                status: output.status,
            });
        }
        Ok(home)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use toolchest_core::{LocalNode, MemoryLog};

    #[tokio::test]
    async fn test_shared_directory_expands_and_joins() {
        let temp = TempDir::new().unwrap();
        let node = LocalNode::new("n").with_env("TOOL_ARCH", "x86_64");
        let ctx = InstallContext::new("mytool", &node, temp.path());
        let installer = SharedDirectory::new("shared/${TOOL_ARCH}");
        assert_eq!(
            installer.install(&ctx).await.unwrap(),
            temp.path().join("shared/x86_64")
        );
    }

    #[tokio::test]
    async fn test_shared_directory_rejects_unresolved_variables() {
        let temp = TempDir::new().unwrap();
        let node = LocalNode::new("n");
        let ctx = InstallContext::new("mytool", &node, temp.path());
        let installer = SharedDirectory::new("shared/${NO_SUCH_TOOLCHEST_VAR}");
        let err = installer.install(&ctx).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_stub_logs_and_succeeds_by_default() {
        let temp = TempDir::new().unwrap();
        let node = LocalNode::new("n");
        let log = MemoryLog::new();
        let ctx = InstallContext::new("mytool", &node, temp.path()).with_log(&log);
        let installer = Stub {
            label: None,
            message: Some("only available on the CI fleet".into()),
            fail_install: false,
        };
        assert_eq!(installer.install(&ctx).await.unwrap(), temp.path());
        assert_eq!(
            log.lines(),
            vec!["[mytool] - only available on the CI fleet".to_string()]
        );
    }

    #[tokio::test]
    async fn test_stub_can_fail_the_install() {
        let temp = TempDir::new().unwrap();
        let node = LocalNode::new("n");
        let ctx = InstallContext::new("mytool", &node, temp.path());
        let err = Stub::failing("not here").install(&ctx).await.unwrap_err();
        assert!(matches!(err, Error::Unsupported { .. }));
        assert_eq!(err.to_string(), "[mytool] - not here");
    }

    #[tokio::test]
    async fn test_run_command_creates_dir_and_returns_home() {
        let temp = TempDir::new().unwrap();
        let home = temp.path().join("tool");
        let node = LocalNode::new("n");
        let log = MemoryLog::new();
        let ctx = InstallContext::new("mytool", &node, &home).with_log(&log);
        let mut installer = RunCommand::new("echo unpacking; mkdir -p bin");
        installer.tool_home = Some("bin".into());
        let result = installer.install(&ctx).await.unwrap();
        assert_eq!(result, home.join("bin"));
        assert!(home.join("bin").is_dir());
        assert_eq!(log.lines(), vec!["unpacking".to_string()]);
    }

    #[tokio::test]
    async fn test_run_command_surfaces_exit_status() {
        let temp = TempDir::new().unwrap();
        let node = LocalNode::new("n");
        let ctx = InstallContext::new("mytool", &node, temp.path());
        let err = RunCommand::new("exit 7").install(&ctx).await.unwrap_err();
        assert!(matches!(err, Error::Command { status: 7, .. }));
    }
}
