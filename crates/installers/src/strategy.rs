//! The closed set of installer strategies, as configuration data.
//!
//! Hosts configure resolution as a tree of these variants (typically a
//! top-level [`AnyOfInstaller`] over several leaves) and hand the tree
//! to the resolution call. The enum is internally tagged, so a whole
//! tree reads naturally from JSON or TOML.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use toolchest_core::{Node, Result};

use crate::anyof::AnyOfInstaller;
use crate::command::{RunCommand, SharedDirectory, Stub};
use crate::download::DownloadAndUnpack;
use crate::find::{FindInDir, FindOnPath};
use crate::{InstallContext, Installer};

/// One configured way of resolving a tool's location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Strategy {
    /// Search the node's `PATH` for an executable.
    FindOnPath(FindOnPath),
    /// Check a fixed path for an executable.
    FindInDir(FindInDir),
    /// Point at a shared directory; no action performed.
    SharedDirectory(SharedDirectory),
    /// Decline with a message, optionally failing.
    Stub(Stub),
    /// Download a zip/tar.gz archive and unpack it.
    DownloadAndUnpack(DownloadAndUnpack),
    /// Run an install command on the node.
    RunCommand(RunCommand),
    /// Try an ordered list of strategies with retries.
    AnyOf(AnyOfInstaller),
}

impl Strategy {
    fn as_installer(&self) -> &dyn Installer {
        match self {
            Strategy::FindOnPath(installer) => installer,
            Strategy::FindInDir(installer) => installer,
            Strategy::SharedDirectory(installer) => installer,
            Strategy::Stub(installer) => installer,
            Strategy::DownloadAndUnpack(installer) => installer,
            Strategy::RunCommand(installer) => installer,
            Strategy::AnyOf(installer) => installer,
        }
    }
}

#[async_trait]
impl Installer for Strategy {
    fn display_name(&self) -> String {
        self.as_installer().display_name()
    }

    fn applies_to(&self, node: &dyn Node) -> bool {
        self.as_installer().applies_to(node)
    }

    async fn install(&self, ctx: &InstallContext<'_>) -> Result<PathBuf> {
        self.as_installer().install(ctx).await
    }
}

impl From<FindOnPath> for Strategy {
    fn from(installer: FindOnPath) -> Self {
        Strategy::FindOnPath(installer)
    }
}

impl From<FindInDir> for Strategy {
    fn from(installer: FindInDir) -> Self {
        Strategy::FindInDir(installer)
    }
}

impl From<SharedDirectory> for Strategy {
    fn from(installer: SharedDirectory) -> Self {
        Strategy::SharedDirectory(installer)
    }
}

impl From<Stub> for Strategy {
    fn from(installer: Stub) -> Self {
        Strategy::Stub(installer)
    }
}

impl From<DownloadAndUnpack> for Strategy {
    fn from(installer: DownloadAndUnpack) -> Self {
        Strategy::DownloadAndUnpack(installer)
    }
}

impl From<RunCommand> for Strategy {
    fn from(installer: RunCommand) -> Self {
        Strategy::RunCommand(installer)
    }
}

impl From<AnyOfInstaller> for Strategy {
    fn from(installer: AnyOfInstaller) -> Self {
        Strategy::AnyOf(installer)
    }
}
