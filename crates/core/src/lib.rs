//! Core types and utilities for toolchest.
//!
//! This crate holds everything the installer strategies build on:
//! the error taxonomy, version comparison and range checking, the
//! node capability abstraction (with a local implementation), the
//! credential lookup contract, the install commentary sink, and
//! environment variable expansion.

pub mod credentials;
pub mod expand;
pub mod log;
pub mod node;
pub mod version;

use thiserror::Error;

pub use credentials::{Credential, CredentialResolver, StaticCredentialResolver};
pub use log::{InstallLog, MemoryLog, TracingLog};
pub use node::{CommandOutput, LocalNode, Node};
pub use version::VersionSpec;

/// Main error type for toolchest operations.
///
/// `Http` and `Network` are deliberately distinct: `Http` means the
/// server answered and we did not like the answer (status code and the
/// identity used are preserved so callers can special-case 401/403/404),
/// while `Network` means the server could not be reached at all.
#[derive(Error, Debug)]
pub enum Error {
    /// An executable was looked for at a fixed path and was not there.
    #[error("executable '{path}' not found")]
    NotFound {
        /// The path that was checked.
        path: String,
    },

    /// An executable was searched for on PATH and was not found.
    #[error("executable '{executable}' not found on PATH, {path}")]
    NotOnPath {
        /// Name of the executable searched for.
        executable: String,
        /// The PATH value that was searched.
        path: String,
    },

    /// A tool was found but its version is outside the configured range.
    #[error("{}", wrong_version_text(.executable, .found_at, .detected, .min, .max))]
    WrongVersion {
        /// The executable that was version-checked.
        executable: String,
        /// Directory the tool was found in.
        found_at: String,
        /// The version that was detected, if any could be parsed.
        detected: Option<String>,
        /// Minimum acceptable version, if configured.
        min: Option<String>,
        /// Maximum acceptable version, if configured.
        max: Option<String>,
    },

    /// The server was reachable but its response was unacceptable.
    #[error("{}", http_failure_text(.url, .username, .reason))]
    Http {
        /// The URL that was requested.
        url: String,
        /// Username the request was authenticated as, if any.
        username: Option<String>,
        /// HTTP status code, when the failure was a status code.
        status: Option<u16>,
        /// Human-readable reason.
        reason: String,
    },

    /// The server could not be reached at all.
    #[error("failed to reach {url}: {message}")]
    Network {
        /// The URL that was requested.
        url: String,
        /// Transport-level error description.
        message: String,
    },

    /// A downloaded archive could not be unpacked.
    #[error("{}", unpack_failure_text(.url, .bytes_read, .expected_len))]
    Unpack {
        /// The URL the archive came from.
        url: String,
        /// Number of body bytes actually read.
        bytes_read: u64,
        /// Expected content length from the response, when known.
        expected_len: Option<u64>,
        /// The underlying unpack error.
        #[source]
        source: Box<Error>,
    },

    /// An install command exited with a non-zero status.
    #[error("command '{command}' returned status {status}")]
    Command {
        /// The command line that was run.
        command: String,
        /// Its exit status.
        status: i32,
    },

    /// Installation was declined on purpose (e.g. unsupported platform).
    #[error("{message}")]
    Unsupported {
        /// The configured message.
        message: String,
    },

    /// Invalid configuration (bad pattern, inverted range, unknown
    /// credentials id, malformed URL, unresolved variables).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Every attempt of every applicable installer failed.
    #[error("none of the configured installers succeeded")]
    AllInstallersFailed {
        /// The last error encountered, `None` if no installer applied.
        #[source]
        source: Option<Box<Error>>,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    /// Create an HTTP failure carrying a status code.
    #[must_use]
    pub fn http_status(url: impl Into<String>, username: Option<&str>, status: u16) -> Self {
        Error::Http {
            url: url.into(),
            username: username.map(String::from),
            status: Some(status),
            reason: status.to_string(),
        }
    }

    /// Create an HTTP failure for an unacceptable response (e.g. a
    /// missing or invalid header) that has no status code of its own.
    #[must_use]
    pub fn http_response(
        url: impl Into<String>,
        username: Option<&str>,
        reason: impl Into<String>,
    ) -> Self {
        Error::Http {
            url: url.into(),
            username: username.map(String::from),
            status: None,
            reason: reason.into(),
        }
    }

    /// Create a network failure.
    #[must_use]
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Network {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported-installation error.
    #[must_use]
    pub fn unsupported(message: impl Into<String>) -> Self {
        Error::Unsupported {
            message: message.into(),
        }
    }
}

fn wrong_version_text(
    executable: &str,
    found_at: &str,
    detected: &Option<String>,
    min: &Option<String>,
    max: &Option<String>,
) -> String {
    let mut text = format!(
        "executable '{}' at {} is version \"{}\" but we require",
        executable,
        found_at,
        detected.as_deref().unwrap_or("unknown")
    );
    if let Some(min) = min {
        text.push_str(&format!(" >= \"{min}\""));
    }
    if min.is_some() && max.is_some() {
        text.push_str(" and");
    }
    if let Some(max) = max {
        text.push_str(&format!(" <= \"{max}\""));
    }
    text
}

fn http_failure_text(url: &str, username: &Option<String>, reason: &str) -> String {
    match username {
        Some(user) => format!("authenticated HTTP GET of {url} as {user} failed, {reason}"),
        None => format!("anonymous HTTP GET of {url} failed, {reason}"),
    }
}

fn unpack_failure_text(url: &str, bytes_read: &u64, expected_len: &Option<u64>) -> String {
    match expected_len {
        Some(expected) => {
            format!("failed to unpack {url}, read {bytes_read} of {expected} expected bytes")
        }
        None => format!("failed to unpack {url}, read {bytes_read} bytes"),
    }
}

/// Result type alias for toolchest operations.
pub type Result<T> = std::result::Result<T, Error>;
