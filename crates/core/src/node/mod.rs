//! The node capability abstraction.
//!
//! A [`Node`] is the machine a tool gets resolved or installed on. The
//! trait is the narrow waist between installer logic and the target
//! filesystem/process world: path checks, directory maintenance, the
//! cache-marker timestamp primitives, command execution with captured
//! stdout, and archive unpacking. Remote execution, if needed, lives
//! behind an implementation of this trait; the installers never care.

mod local;

use std::path::Path;

use async_trait::async_trait;

use crate::Result;

pub use local::LocalNode;

/// Captured result of running a command on a node.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Everything the command wrote to stdout, as UTF-8 (lossy).
    pub stdout: String,
    /// The exit status; non-zero means failure.
    pub status: i32,
}

/// Capabilities an execution node must provide.
#[async_trait]
pub trait Node: Send + Sync {
    /// Display name of the node, used in commentary only.
    fn name(&self) -> &str;

    /// Labels attached to this node; installers match against these.
    fn labels(&self) -> &[String];

    /// Whether this node is reached over a transport rather than being
    /// the local machine.
    fn is_remote(&self) -> bool;

    /// Look up an environment variable as seen by this node.
    fn env(&self, name: &str) -> Option<String>;

    /// Whether a path exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Whether a path is a regular file with execute permission.
    async fn is_executable_file(&self, path: &Path) -> Result<bool>;

    /// Whether a path is a directory containing at least one entry.
    async fn is_non_empty_dir(&self, path: &Path) -> Result<bool>;

    /// Create a directory and all missing parents.
    async fn mkdirs(&self, path: &Path) -> Result<()>;

    /// Remove everything inside a directory, keeping the directory.
    async fn delete_contents(&self, path: &Path) -> Result<()>;

    /// Modification time of a path in epoch millis, `None` if absent.
    async fn last_modified_millis(&self, path: &Path) -> Result<Option<i64>>;

    /// Create the file if needed and set its modification time.
    async fn touch(&self, path: &Path, mtime_millis: i64) -> Result<()>;

    /// Run a command in a working directory, capturing stdout.
    async fn run(&self, command: &[String], cwd: &Path) -> Result<CommandOutput>;

    /// Unpack a zip archive into a directory.
    async fn unpack_zip(&self, archive: &[u8], dest: &Path) -> Result<()>;

    /// Unpack a gzip-compressed tar archive into a directory.
    async fn unpack_tar_gz(&self, archive: &[u8], dest: &Path) -> Result<()>;

    /// Mark every file under a directory executable. No-op on
    /// platforms without an executable bit.
    async fn set_executable_recursive(&self, dest: &Path) -> Result<()>;
}
