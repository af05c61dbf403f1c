//! "Any of" fallback orchestration.
//!
//! Tries an ordered list of installers until one succeeds, with a
//! per-installer attempt budget and a whole-list pass budget. Every
//! failed attempt produces exactly one commentary line; the final
//! failure wraps the last underlying error unchanged so callers can
//! still inspect its type.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use toolchest_core::{Error, Node, Result};

use crate::{InstallContext, Installer, Strategy};

fn default_attempts() -> u32 {
    1
}

/// Retry budgets for an [`AnyOfInstaller`].
///
/// Values of zero are treated as one: the orchestrator never rejects a
/// policy and never retries zero times.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_attempts")]
    attempts_per_installer: u32,
    #[serde(default = "default_attempts")]
    attempts_of_whole_list: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts_per_installer: 1,
            attempts_of_whole_list: 1,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given budgets.
    #[must_use]
    pub fn new(attempts_per_installer: u32, attempts_of_whole_list: u32) -> Self {
        Self {
            attempts_per_installer,
            attempts_of_whole_list,
        }
    }

    /// Times each installer is attempted before moving to the next.
    /// Always at least one.
    #[must_use]
    pub fn attempts_per_installer(&self) -> u32 {
        self.attempts_per_installer.max(1)
    }

    /// Times the whole list is attempted. Always at least one.
    #[must_use]
    pub fn attempts_of_whole_list(&self) -> u32 {
        self.attempts_of_whole_list.max(1)
    }
}

/// Installs a tool using any of the configured installers. The
/// installation is deemed a success upon any success, ignoring any
/// earlier failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnyOfInstaller {
    /// The ordered list of installers to attempt. Must not be empty
    /// for this installer to be useful.
    pub installers: Vec<Strategy>,
    /// Retry budgets.
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl AnyOfInstaller {
    /// Create an orchestrator over the given installers with the
    /// default single-attempt policy.
    #[must_use]
    pub fn new(installers: Vec<Strategy>) -> Self {
        Self {
            installers,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl Installer for AnyOfInstaller {
    fn display_name(&self) -> String {
        "Any of".to_string()
    }

    /// The orchestrator has no applicability of its own; it applies
    /// wherever any of its installers does.
    fn applies_to(&self, node: &dyn Node) -> bool {
        self.installers
            .iter()
            .any(|installer| installer.applies_to(node))
    }

    async fn install(&self, ctx: &InstallContext<'_>) -> Result<PathBuf> {
        run_with_retries(&self.installers, self.retry, ctx).await
    }
}

/// The orchestration loop, generic so it can be exercised with
/// scripted installers.
pub(crate) async fn run_with_retries<I: Installer>(
    installers: &[I],
    retry: RetryPolicy,
    ctx: &InstallContext<'_>,
) -> Result<PathBuf> {
    let configured_count = installers.len();
    // Applicability is decided once, up front; positions are 1-based
    // indexes into the full configured list so commentary stays stable
    // no matter how many installers were filtered out.
    let applicable: Vec<(usize, &I, String)> = installers
        .iter()
        .enumerate()
        .filter(|(_, installer)| installer.applies_to(ctx.node()))
        .map(|(index, installer)| (index + 1, installer, installer.display_name()))
        .collect();

    let passes = retry.attempts_of_whole_list();
    let attempts = retry.attempts_per_installer();
    let mut last_error: Option<Error> = None;
    for pass in 1..=passes {
        for (position, installer, name) in &applicable {
            for attempt in 1..=attempts {
                match installer.install(ctx).await {
                    Ok(home) => return Ok(home),
                    Err(err) => {
                        ctx.log_line(format_attempt_failure(&AttemptFailure {
                            error: &err,
                            pass,
                            passes,
                            position: *position,
                            configured_count,
                            name,
                            attempt,
                            attempts,
                        }));
                        last_error = Some(err);
                    }
                }
            }
        }
    }
    Err(Error::AllInstallersFailed {
        source: last_error.map(Box::new),
    })
}

struct AttemptFailure<'a> {
    error: &'a Error,
    pass: u32,
    passes: u32,
    position: usize,
    configured_count: usize,
    name: &'a str,
    attempt: u32,
    attempts: u32,
}

/// One formatting function for the whole phrasing matrix: each of the
/// three dimensions is mentioned only when it is ambiguous, so a plain
/// single-shot failure never reads "pass 1 of 1, attempt 1 of 1".
fn format_attempt_failure(failure: &AttemptFailure<'_>) -> String {
    let mention_pass = failure.passes > 1;
    let mention_position = failure.configured_count > 1;
    let mention_attempt = failure.attempts > 1;

    let mut line = String::new();
    if mention_pass {
        line.push_str(&format!("Pass {} of {}: ", failure.pass, failure.passes));
    }
    let installer_word = if mention_pass { "installer" } else { "Installer" };
    if mention_position {
        line.push_str(&format!(
            "{} {} of {} ({})",
            installer_word, failure.position, failure.configured_count, failure.name
        ));
    } else {
        line.push_str(&format!("{} '{}'", installer_word, failure.name));
    }
    if mention_attempt {
        line.push_str(&format!(
            ", attempt {} of {}",
            failure.attempt, failure.attempts
        ));
    }
    line.push_str(&format!(" failed: {}", failure.error));
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use toolchest_core::{LocalNode, MemoryLog};

    /// An installer that fails a scripted number of times, then
    /// succeeds, counting every invocation.
    struct Scripted {
        name: &'static str,
        applicable: bool,
        failures_before_success: usize,
        calls: AtomicUsize,
        home: PathBuf,
    }

    impl Scripted {
        fn new(name: &'static str, failures_before_success: usize, home: &Path) -> Self {
            Self {
                name,
                applicable: true,
                failures_before_success,
                calls: AtomicUsize::new(0),
                home: home.to_path_buf(),
            }
        }

        fn always_failing(name: &'static str) -> Self {
            Self::new(name, usize::MAX, Path::new("/unused"))
        }

        fn inapplicable(name: &'static str) -> Self {
            let mut scripted = Self::always_failing(name);
            scripted.applicable = false;
            scripted
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Installer for Scripted {
        fn display_name(&self) -> String {
            self.name.to_string()
        }

        fn applies_to(&self, _node: &dyn Node) -> bool {
            self.applicable
        }

        async fn install(&self, _ctx: &InstallContext<'_>) -> Result<PathBuf> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err(Error::unsupported(format!(
                    "scripted failure {}",
                    call + 1
                )))
            } else {
                Ok(self.home.clone())
            }
        }
    }

    #[tokio::test]
    async fn test_single_failing_installer_one_attempt() {
        let temp = TempDir::new().unwrap();
        let node = LocalNode::new("n");
        let log = MemoryLog::new();
        let ctx = InstallContext::new("mytool", &node, temp.path()).with_log(&log);

        let installers = vec![Scripted::always_failing("flaky")];
        let err = run_with_retries(&installers, RetryPolicy::default(), &ctx)
            .await
            .unwrap_err();

        assert_eq!(installers[0].calls(), 1);
        match &err {
            Error::AllInstallersFailed { source } => {
                assert_eq!(
                    source.as_ref().map(ToString::to_string).as_deref(),
                    Some("scripted failure 1")
                );
            }
            other => panic!("unexpected error: {other}"),
        }
        // Nothing is ambiguous, so the line mentions none of the
        // pass/position/attempt dimensions.
        assert_eq!(
            log.lines(),
            vec!["Installer 'flaky' failed: scripted failure 1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_inapplicable_installer_is_never_invoked() {
        let temp = TempDir::new().unwrap();
        let home = temp.path().join("home");
        let node = LocalNode::new("n");
        let log = MemoryLog::new();
        let ctx = InstallContext::new("mytool", &node, temp.path()).with_log(&log);

        let installers = vec![
            Scripted::inapplicable("wrong-platform"),
            Scripted::new("works", 0, &home),
        ];
        let result = run_with_retries(&installers, RetryPolicy::default(), &ctx)
            .await
            .unwrap();

        assert_eq!(result, home);
        assert_eq!(installers[0].calls(), 0);
        assert_eq!(installers[1].calls(), 1);
        assert!(log.lines().is_empty());
    }

    #[tokio::test]
    async fn test_success_short_circuits_everything() {
        let temp = TempDir::new().unwrap();
        let home = temp.path().join("home");
        let node = LocalNode::new("n");
        let ctx = InstallContext::new("mytool", &node, temp.path());

        let installers = vec![
            Scripted::new("first", 0, &home),
            Scripted::always_failing("never-reached"),
        ];
        let result = run_with_retries(&installers, RetryPolicy::new(3, 2), &ctx)
            .await
            .unwrap();

        assert_eq!(result, home);
        assert_eq!(installers[0].calls(), 1);
        assert_eq!(installers[1].calls(), 0);
    }

    #[tokio::test]
    async fn test_two_passes_three_attempts_flaky_installer() {
        let temp = TempDir::new().unwrap();
        let home = temp.path().join("home");
        let node = LocalNode::new("n");
        let log = MemoryLog::new();
        let ctx = InstallContext::new("mytool", &node, temp.path()).with_log(&log);

        // Fails 4 times, succeeds on the 5th call: pass 2, attempt 2.
        let installers = vec![Scripted::new("flaky", 4, &home)];
        let result = run_with_retries(&installers, RetryPolicy::new(3, 2), &ctx)
            .await
            .unwrap();

        assert_eq!(result, home);
        assert_eq!(installers[0].calls(), 5);
        let lines = log.lines();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            "Pass 1 of 2: installer 'flaky', attempt 1 of 3 failed: scripted failure 1"
        );
        assert_eq!(
            lines[3],
            "Pass 2 of 2: installer 'flaky', attempt 1 of 3 failed: scripted failure 4"
        );
    }

    #[tokio::test]
    async fn test_positions_use_the_configured_list() {
        let temp = TempDir::new().unwrap();
        let node = LocalNode::new("n");
        let log = MemoryLog::new();
        let ctx = InstallContext::new("mytool", &node, temp.path()).with_log(&log);

        let installers = vec![
            Scripted::inapplicable("skipped"),
            Scripted::always_failing("second"),
            Scripted::always_failing("third"),
        ];
        let err = run_with_retries(&installers, RetryPolicy::default(), &ctx)
            .await
            .unwrap_err();

        let lines = log.lines();
        assert_eq!(
            lines,
            vec![
                "Installer 2 of 3 (second) failed: scripted failure 1".to_string(),
                "Installer 3 of 3 (third) failed: scripted failure 1".to_string(),
            ]
        );
        // The wrapped cause is the last error encountered.
        match err {
            Error::AllInstallersFailed { source } => assert!(source.is_some()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_zero_applicable_installers() {
        let temp = TempDir::new().unwrap();
        let node = LocalNode::new("n");
        let ctx = InstallContext::new("mytool", &node, temp.path());

        let installers = vec![Scripted::inapplicable("nope")];
        let err = run_with_retries(&installers, RetryPolicy::default(), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::AllInstallersFailed { source: None }
        ));
    }

    #[tokio::test]
    async fn test_invocation_budget_is_exact_on_exhaustion() {
        let temp = TempDir::new().unwrap();
        let node = LocalNode::new("n");
        let ctx = InstallContext::new("mytool", &node, temp.path());

        let installers = vec![
            Scripted::always_failing("a"),
            Scripted::always_failing("b"),
        ];
        let err = run_with_retries(&installers, RetryPolicy::new(3, 2), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AllInstallersFailed { .. }));
        // 2 passes x 2 installers x 3 attempts
        assert_eq!(installers[0].calls(), 6);
        assert_eq!(installers[1].calls(), 6);
    }

    #[test]
    fn test_retry_policy_normalizes_zero_up() {
        let policy = RetryPolicy::new(0, 0);
        assert_eq!(policy.attempts_per_installer(), 1);
        assert_eq!(policy.attempts_of_whole_list(), 1);
    }

    #[test]
    fn test_format_matrix_covers_all_combinations() {
        let error = Error::unsupported("boom");
        let mut seen = std::collections::HashSet::new();
        for (passes, configured, attempts) in [
            (1, 1, 1),
            (1, 1, 3),
            (1, 2, 1),
            (1, 2, 3),
            (2, 1, 1),
            (2, 1, 3),
            (2, 2, 1),
            (2, 2, 3),
        ] {
            let line = format_attempt_failure(&AttemptFailure {
                error: &error,
                pass: 1,
                passes,
                position: 1,
                configured_count: configured,
                name: "x",
                attempt: 1,
                attempts,
            });
            assert!(line.ends_with("failed: boom"), "{line}");
            assert_eq!(line.contains("Pass"), passes > 1, "{line}");
            assert_eq!(line.contains("1 of 2 (x)"), configured > 1, "{line}");
            assert_eq!(line.contains("attempt"), attempts > 1, "{line}");
            seen.insert(line);
        }
        // All eight phrasings are distinct.
        assert_eq!(seen.len(), 8);
    }
}
