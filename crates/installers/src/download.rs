//! Conditional, authenticated download-and-unpack.
//!
//! The fetcher downloads a zip/tar.gz archive and unpacks it into a
//! target directory, but only when the remote copy is newer than what a
//! cache marker says was fetched last time. One conditional request is
//! all the protocol there is: `If-Modified-Since` out, `Last-Modified`
//! back, anything else is either a skip, a fallback to the existing
//! contents, or a typed failure.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{StatusCode, Url, header};
use serde::{Deserialize, Serialize};
use tracing::debug;

use toolchest_core::{Credential, Error, InstallLog, Node, Result};

use crate::{InstallContext, Installer, label_applies};

/// Name of the cache marker kept inside the target directory. Its
/// modification time records the remote `Last-Modified` of the archive
/// that was last unpacked successfully.
const MARKER_FILE: &str = ".timestamp";

/// Performs the conditional HTTP exchange and unpacks the body.
pub struct ConditionalFetcher {
    client: reqwest::Client,
}

impl Default for ConditionalFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionalFetcher {
    /// Create a fetcher with a default client.
    ///
    /// # Panics
    ///
    /// `reqwest::Client::builder().build()` only fails when the TLS
    /// backend cannot initialize, which with default settings indicates
    /// a broken environment rather than a recoverable condition.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("toolchest")
                .build()
                .expect("failed to create HTTP client - TLS backend initialization failed"),
        }
    }

    /// Validate that the URL answers acceptably with the given
    /// credentials, without transferring or unpacking anything.
    ///
    /// Issues a metadata-only request; status interpretation is the
    /// same as for a real download, so a 401/403/404 surfaces as the
    /// same typed error a download would produce.
    pub async fn probe(&self, url: &Url, credential: Option<&Credential>) -> Result<()> {
        self.exchange(None, url, credential, None, false, None)
            .await
            .map(|_| ())
    }

    /// Download and unpack `url` into `dest` on `node` if the remote
    /// copy is newer than `local_ts_millis` says.
    ///
    /// Returns the remote last-modified time in epoch millis when a
    /// download actually happened, `None` when there was nothing to do.
    /// In the nothing-to-do case the target directory is left
    /// untouched. The caller owns persisting the returned timestamp
    /// into the cache marker once any post-processing succeeded.
    pub async fn download_and_unpack(
        &self,
        node: &dyn Node,
        url: &Url,
        credential: Option<&Credential>,
        local_ts_millis: Option<i64>,
        dest: &Path,
        fallback_to_existing: bool,
        log: Option<&dyn InstallLog>,
    ) -> Result<Option<i64>> {
        self.exchange(
            Some((node, dest)),
            url,
            credential,
            local_ts_millis,
            fallback_to_existing,
            log,
        )
        .await
    }

    async fn exchange(
        &self,
        target: Option<(&dyn Node, &Path)>,
        url: &Url,
        credential: Option<&Credential>,
        local_ts_millis: Option<i64>,
        fallback_to_existing: bool,
        log: Option<&dyn InstallLog>,
    ) -> Result<Option<i64>> {
        let mut request = match target {
            // Metadata-only probe: no body transfer.
            None => self.client.head(url.clone()),
            Some(_) => self.client.get(url.clone()),
        };
        if let Some(credential) = credential {
            // Preemptive basic auth: do not wait for a 401 challenge.
            request = request.basic_auth(credential.username(), Some(credential.password()));
        }
        if let Some(local) = local_ts_millis {
            request = request.header(header::IF_MODIFIED_SINCE, format_http_date(local));
        }
        let username = credential.map(Credential::username);

        let response = request
            .send()
            .await
            .map_err(|e| Error::network(url.as_str(), e.to_string()))?;
        let status = response.status();
        debug!(%url, status = status.as_u16(), "Conditional fetch response");

        let remote_ts_millis = if status == StatusCode::NOT_MODIFIED {
            None
        } else if status == StatusCode::OK {
            let value = response
                .headers()
                .get(header::LAST_MODIFIED)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| {
                    Error::http_response(
                        url.as_str(),
                        username,
                        "due to missing Last-Modified header value",
                    )
                })?;
            let remote = parse_http_date(value).ok_or_else(|| {
                Error::http_response(
                    url.as_str(),
                    username,
                    format!("due to invalid Last-Modified header value, \"{value}\""),
                )
            })?;
            match local_ts_millis {
                // Only a strictly newer remote copy is worth fetching.
                Some(local) if remote <= local => None,
                _ => Some(remote),
            }
        } else if fallback_to_existing && existing_installation_available(target).await? {
            if let Some(log) = log {
                log.println(&format!(
                    "Download of {url} failed with HTTP {}; using the existing installation instead",
                    status.as_u16()
                ));
            }
            None
        } else {
            return Err(Error::http_status(url.as_str(), username, status.as_u16()));
        };

        let Some((node, dest)) = target else {
            return Ok(remote_ts_millis);
        };
        match remote_ts_millis {
            None => {
                if let Some(log) = log {
                    log.println(&format!(
                        "Skipped downloading {url} to {} on {}: contents are up to date",
                        dest.display(),
                        node.name()
                    ));
                }
                Ok(None)
            }
            Some(millis) => {
                do_download(node, dest, url, username, response, log).await?;
                Ok(Some(millis))
            }
        }
    }
}

/// The fallback-to-existing rule only softens interpretable HTTP
/// failures, and only when there is something on disk to fall back to.
async fn existing_installation_available(target: Option<(&dyn Node, &Path)>) -> Result<bool> {
    match target {
        Some((node, dest)) => node.is_non_empty_dir(dest).await,
        None => Ok(false),
    }
}

async fn do_download(
    node: &dyn Node,
    dest: &Path,
    url: &Url,
    username: Option<&str>,
    response: reqwest::Response,
    log: Option<&dyn InstallLog>,
) -> Result<()> {
    if node.exists(dest).await? {
        node.delete_contents(dest).await?;
        if let Some(log) = log {
            log.println(&match username {
                None => format!(
                    "Downloading newer {url} to {} on {}",
                    dest.display(),
                    node.name()
                ),
                Some(user) => format!(
                    "Downloading newer {url} as {user} to {} on {}",
                    dest.display(),
                    node.name()
                ),
            });
        }
    } else {
        node.mkdirs(dest).await?;
        if let Some(log) = log {
            log.println(&match username {
                None => format!(
                    "Downloading {url} to new folder {} on {}",
                    dest.display(),
                    node.name()
                ),
                Some(user) => format!(
                    "Downloading {url} as {user} to new folder {} on {}",
                    dest.display(),
                    node.name()
                ),
            });
        }
    }

    let expected_len = response.content_length();
    let body = response
        .bytes()
        .await
        .map_err(|e| Error::network(url.as_str(), e.to_string()))?;
    let unpack_result = if url.path().ends_with(".zip") {
        node.unpack_zip(&body, dest).await
    } else {
        node.unpack_tar_gz(&body, dest).await
    };
    unpack_result.map_err(|e| Error::Unpack {
        url: url.to_string(),
        bytes_read: body.len() as u64,
        expected_len,
        source: Box::new(e),
    })
}

/// Format epoch millis as an RFC 7231 HTTP date.
fn format_http_date(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or_default()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Parse an HTTP date header value to epoch millis.
fn parse_http_date(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// Downloads a zip or tar.gz archive and unpacks it as the tool home.
///
/// If the tool is already present it is only re-downloaded when the
/// remote copy is newer than the recorded last fetch. Supports HTTP
/// basic authentication through a configured credentials id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadAndUnpack {
    /// Node label this installer is restricted to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// URL of the zip/tar.gz archive.
    pub url: String,
    /// Id of the credentials to download with, if authentication is
    /// needed. An id that the resolver does not know is a
    /// configuration error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_id: Option<String>,
    /// Subdirectory within the archive where the tool's binaries live.
    /// Unset when the binaries are at the archive root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdir: Option<String>,
    /// Soft-succeed with the existing installation when the server
    /// answers with an unexpected status.
    #[serde(default)]
    pub fallback_to_existing: bool,
}

impl DownloadAndUnpack {
    /// Create an installer downloading from `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            label: None,
            url: url.into(),
            credentials_id: None,
            subdir: None,
            fallback_to_existing: false,
        }
    }

    async fn resolve_credential(
        &self,
        ctx: &InstallContext<'_>,
        host: Option<&str>,
    ) -> Result<Option<Credential>> {
        let Some(id) = &self.credentials_id else {
            return Ok(None);
        };
        let Some(resolver) = ctx.credentials() else {
            return Err(Error::configuration(format!(
                "credentials id '{id}' is configured but no credential resolver is available"
            )));
        };
        match resolver.lookup(id, host).await? {
            Some(credential) => Ok(Some(credential)),
            None => Err(Error::configuration(format!(
                "invalid credentials id '{id}'"
            ))),
        }
    }
}

#[async_trait]
impl Installer for DownloadAndUnpack {
    fn display_name(&self) -> String {
        "Authenticated download and unpack".to_string()
    }

    fn applies_to(&self, node: &dyn Node) -> bool {
        label_applies(self.label.as_deref(), node)
    }

    async fn install(&self, ctx: &InstallContext<'_>) -> Result<PathBuf> {
        let url = Url::parse(&self.url)
            .map_err(|e| Error::configuration(format!("malformed URL '{}': {e}", self.url)))?;
        let credential = self.resolve_credential(ctx, url.host_str()).await?;
        let dir = ctx.tool_home().to_path_buf();
        let marker = dir.join(MARKER_FILE);
        let local_ts = ctx.node().last_modified_millis(&marker).await?;

        let fetcher = ConditionalFetcher::new();
        let remote_ts = download_with_controller_retry(
            &fetcher,
            ctx,
            &url,
            credential.as_ref(),
            local_ts,
            &dir,
            self.fallback_to_existing,
        )
        .await?;

        if let Some(ts) = remote_ts {
            // Executable bits first; the marker only becomes current
            // once the directory is fully usable.
            ctx.node().set_executable_recursive(&dir).await?;
            ctx.node().touch(&marker, ts).await?;
        }
        match &self.subdir {
            None => Ok(dir),
            Some(subdir) => Ok(dir.join(subdir)),
        }
    }
}

/// On a remote node a transfer can fail for reasons that have nothing
/// to do with the URL (the node's own connectivity); those get one
/// retry driven from the controller side. An answered HTTP rejection
/// is final either way - the server would say the same thing again.
async fn download_with_controller_retry(
    fetcher: &ConditionalFetcher,
    ctx: &InstallContext<'_>,
    url: &Url,
    credential: Option<&Credential>,
    local_ts: Option<i64>,
    dir: &Path,
    fallback_to_existing: bool,
) -> Result<Option<i64>> {
    if ctx.node().is_remote() {
        match fetcher
            .download_and_unpack(
                ctx.node(),
                url,
                credential,
                local_ts,
                dir,
                fallback_to_existing,
                ctx.log(),
            )
            .await
        {
            Ok(ts) => return Ok(ts),
            Err(err @ Error::Http { .. }) => return Err(err),
            Err(err) => {
                ctx.log_line(format!(
                    "Failed to download {url} on {}; will retry from the controller: {err}",
                    ctx.node().name()
                ));
            }
        }
    }
    fetcher
        .download_and_unpack(
            ctx.node(),
            url,
            credential,
            local_ts,
            dir,
            fallback_to_existing,
            ctx.log(),
        )
        .await
}
