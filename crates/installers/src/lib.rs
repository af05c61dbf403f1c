//! Installer strategies for toolchest.
//!
//! A [`Strategy`] is one self-contained way to resolve a tool's home
//! directory on a node: find it on the search path, find it at a fixed
//! location, point at a shared directory, download and unpack an
//! archive, run an install command, decline with a message, or try an
//! ordered list of the above with retries ([`AnyOfInstaller`]).
//!
//! Strategies are plain configuration: build them once (or deserialize
//! a whole tree), then call [`Installer::install`] against a node as
//! often as needed.

pub mod anyof;
pub mod command;
pub mod download;
pub mod find;
pub mod strategy;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use toolchest_core::{CredentialResolver, InstallLog, Node, Result, expand};

pub use anyof::{AnyOfInstaller, RetryPolicy};
pub use command::{RunCommand, SharedDirectory, Stub};
pub use download::{ConditionalFetcher, DownloadAndUnpack};
pub use find::{FindInDir, FindOnPath};
pub use strategy::Strategy;

/// One way of resolving a tool's location on a node.
///
/// `applies_to` is the cheap applicability filter (label matching);
/// `install` does the actual work and either returns the tool home
/// directory or a precise, typed error.
#[async_trait]
pub trait Installer: Send + Sync {
    /// Human-readable name, used in attempt commentary.
    fn display_name(&self) -> String;

    /// Whether this installer is relevant for the given node.
    fn applies_to(&self, node: &dyn Node) -> bool;

    /// Resolve the tool home on the node, installing if necessary.
    async fn install(&self, ctx: &InstallContext<'_>) -> Result<PathBuf>;
}

/// Everything an installer needs to know about one resolution run.
///
/// Collaborators are injected explicitly: the node being installed on,
/// the directory designated for this tool on that node, an optional
/// credential resolver, and an optional commentary sink.
pub struct InstallContext<'a> {
    tool_name: &'a str,
    node: &'a dyn Node,
    tool_home: PathBuf,
    credentials: Option<&'a dyn CredentialResolver>,
    log: Option<&'a dyn InstallLog>,
}

impl<'a> InstallContext<'a> {
    /// Create a context for resolving `tool_name` on `node`, with
    /// `tool_home` as the preferred installation directory.
    pub fn new(tool_name: &'a str, node: &'a dyn Node, tool_home: impl Into<PathBuf>) -> Self {
        Self {
            tool_name,
            node,
            tool_home: tool_home.into(),
            credentials: None,
            log: None,
        }
    }

    /// Attach a credential resolver.
    #[must_use]
    pub fn with_credentials(mut self, credentials: &'a dyn CredentialResolver) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Attach a commentary sink.
    #[must_use]
    pub fn with_log(mut self, log: &'a dyn InstallLog) -> Self {
        self.log = Some(log);
        self
    }

    /// The tool being resolved.
    #[must_use]
    pub fn tool_name(&self) -> &str {
        self.tool_name
    }

    /// The node being resolved against.
    #[must_use]
    pub fn node(&self) -> &dyn Node {
        self.node
    }

    /// The preferred installation directory for this tool on this node.
    #[must_use]
    pub fn tool_home(&self) -> &Path {
        &self.tool_home
    }

    /// The credential resolver, if one was attached.
    #[must_use]
    pub fn credentials(&self) -> Option<&dyn CredentialResolver> {
        self.credentials
    }

    /// The commentary sink, if one was attached.
    #[must_use]
    pub fn log(&self) -> Option<&dyn InstallLog> {
        self.log
    }

    /// Append one commentary line; silent without a sink.
    pub fn log_line(&self, line: impl AsRef<str>) {
        if let Some(log) = self.log {
            log.println(line.as_ref());
        }
    }

    /// Expand `${VAR}` references using the node's environment.
    #[must_use]
    pub fn expand_node_variables(&self, value: &str) -> String {
        expand::expand_variables(value, |name| self.node.env(name))
    }
}

/// Label-based applicability shared by all leaf installers: no label
/// means "applies everywhere", otherwise the node must carry it.
pub(crate) fn label_applies(label: Option<&str>, node: &dyn Node) -> bool {
    match label {
        None => true,
        Some(label) => node.labels().iter().any(|l| l == label),
    }
}
