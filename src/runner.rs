//! An injectable seam for external command execution, so the macOS
//! lifecycle (and, in tests, the Linux lifecycle's best-effort cleanup) can
//! be driven without touching a real process table.

use std::process::Stdio;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Runs one external command and returns its combined stdout+stderr, plus
/// an error if the process could not be spawned, exited non-zero, or the
/// cancellation token fired before it completed.
///
/// Mirrors the shape of a single-method Go interface: one call, one
/// combined byte result, an optional error. Kept narrow so tests can
/// substitute a table-driven mock instead of spawning real processes.
pub trait ProcessRunner: Send + Sync {
    async fn combined_output(&self, command: &str, args: &[String], cancel: &CancellationToken) -> (Vec<u8>, Option<std::io::Error>);
}

/// Spawns a real OS process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    #[instrument(skip(self, cancel), fields(command = %command, argc = args.len()))]
    async fn combined_output(&self, command: &str, args: &[String], cancel: &CancellationToken) -> (Vec<u8>, Option<std::io::Error>) {
        let child = Command::new(command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(err) => return (Vec::new(), Some(err)),
        };

        let output = tokio::select! {
            output = child.wait_with_output() => output,
            () = cancel.cancelled() => return (Vec::new(), Some(std::io::Error::other("operation cancelled"))),
        };

        match output {
            Ok(output) => {
                let mut combined = output.stdout;
                combined.extend_from_slice(&output.stderr);
                if output.status.success() {
                    (combined, None)
                } else {
                    let code = output.status.code().map_or_else(|| "signal".to_owned(), |c| c.to_string());
                    (combined, Some(std::io::Error::other(format!("exit status {code}"))))
                }
            }
            Err(err) => (Vec::new(), Some(err)),
        }
    }
}

/// A key for [`MockRunner`]'s table: `"<cmd> [<args...>]"`.
pub fn mock_key(command: &str, args: &[String]) -> String {
    format!("{command} [{}]", args.join(" "))
}

#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use tokio_util::sync::CancellationToken;

    use super::{mock_key, ProcessRunner};

    /// A table-driven [`ProcessRunner`] keyed by [`mock_key`]. Missing keys
    /// produce a "no expectation" error, surfacing test setup mistakes
    /// loudly rather than silently succeeding.
    #[derive(Debug, Default)]
    pub struct MockRunner {
        responses: Mutex<HashMap<String, (Vec<u8>, Option<String>)>>,
        invocations: Mutex<Vec<String>>,
    }

    impl MockRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn expect(&self, command: &str, args: &[&str], output: &[u8], error: Option<&str>) {
            let args: Vec<String> = args.iter().map(|a| (*a).to_owned()).collect();
            let key = mock_key(command, &args);
            self.responses
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(key, (output.to_vec(), error.map(str::to_owned)));
        }

        /// The invocation keys observed so far, in call order. Used to
        /// assert on submission order for sequential (macOS) bulk
        /// operations.
        pub fn invocations(&self) -> Vec<String> {
            self.invocations
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone()
        }
    }

    impl ProcessRunner for MockRunner {
        async fn combined_output(&self, command: &str, args: &[String], cancel: &CancellationToken) -> (Vec<u8>, Option<std::io::Error>) {
            if cancel.is_cancelled() {
                return (Vec::new(), Some(std::io::Error::other("operation cancelled")));
            }

            let key = mock_key(command, args);
            self.invocations
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(key.clone());

            match self.responses.lock().unwrap_or_else(std::sync::PoisonError::into_inner).get(&key) {
                Some((output, error)) => (output.clone(), error.clone().map(std::io::Error::other)),
                None => (Vec::new(), Some(std::io::Error::other(format!("no mock expectation for {key:?}")))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::mock::MockRunner;
    use super::*;

    #[tokio::test]
    async fn mock_runner_replays_expected_output() {
        let runner = MockRunner::new();
        runner.expect("launchctl", &["print", "gui/501/x"], b"state = running", None);

        let (out, err) = runner.combined_output("launchctl", &["print".to_owned(), "gui/501/x".to_owned()], &CancellationToken::new()).await;
        assert!(err.is_none());
        assert_eq!(out, b"state = running");
    }

    #[tokio::test]
    async fn mock_runner_records_invocation_order() {
        let runner = MockRunner::new();
        runner.expect("launchctl", &["stop", "c"], b"", None);
        runner.expect("launchctl", &["stop", "b"], b"", None);

        let _ = runner.combined_output("launchctl", &["stop".to_owned(), "c".to_owned()], &CancellationToken::new()).await;
        let _ = runner.combined_output("launchctl", &["stop".to_owned(), "b".to_owned()], &CancellationToken::new()).await;

        assert_eq!(runner.invocations(), vec!["launchctl [stop c]", "launchctl [stop b]"]);
    }

    #[tokio::test]
    async fn missing_expectation_surfaces_as_error() {
        let runner = MockRunner::new();
        let (_, err) = runner.combined_output("launchctl", &["print".to_owned(), "missing".to_owned()], &CancellationToken::new()).await;
        assert!(err.is_some());
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits_before_lookup() {
        let runner = MockRunner::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (_, err) = runner.combined_output("launchctl", &["print".to_owned(), "x".to_owned()], &cancel).await;
        assert!(err.is_some());
        assert!(runner.invocations().is_empty());
    }
}
