//! Drives launchd through `launchctl`, with legacy-subcommand fallbacks,
//! plus a container-VM preflight check before start and restart.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::contracts::{BulkResult, Lifecycle, ServiceStatus};
use crate::error::Error;
use crate::runner::ProcessRunner;

use super::launchctl;
use super::options::MacosOptions;
use super::plist::sanitized_label;

#[derive(Debug, Clone, Copy)]
enum Verb {
    Start,
    Stop,
    Restart,
}

fn status_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^\s*state\s*=\s*(?P<state>\S+)|^\s*pid\s*=\s*(?P<pid>\d+)")
            .unwrap_or_else(|e| unreachable!("static launchctl status pattern must compile: {e}"))
    })
}

/// Talks to `launchctl` through the injected [`ProcessRunner`]. No
/// connection or handle is retained between calls.
pub struct MacosLifecycle<R: ProcessRunner> {
    runner: R,
    options: MacosOptions,
}

impl<R: ProcessRunner> MacosLifecycle<R> {
    pub fn new(runner: R, options: MacosOptions) -> Self {
        Self { runner, options }
    }

    fn label(&self, name: &str) -> String {
        sanitized_label(&self.options, name)
    }

    fn plist_path(&self, label: &str) -> String {
        self.options.plist_dir.join(format!("{label}.plist")).display().to_string()
    }

    async fn run(&self, args: Vec<String>, cancel: &CancellationToken) -> (Vec<u8>, Option<std::io::Error>) {
        let (command, args) = launchctl::build(&self.options, args);
        self.runner.combined_output(&command, &args, cancel).await
    }

    /// Queries `podman machine`'s state via a format-string introspection.
    /// Only called before start/restart, where an unready VM is the most
    /// common cause of a confusing downstream failure.
    async fn preflight(&self, service: &str, cancel: &CancellationToken) -> Result<(), Error> {
        let (output, err) = self
            .runner
            .combined_output(
                &self.options.podman_path,
                &["machine".to_owned(), "inspect".to_owned(), "--format".to_owned(), "{{.State}}".to_owned()],
                cancel,
            )
            .await;
        if err.is_some() {
            return Err(Error::PlatformUnavailable(format!(
                "could not query the container VM state for {service}; is `podman machine` initialized?"
            )));
        }

        let state = String::from_utf8_lossy(&output).trim().to_owned();
        if state != "running" {
            return Err(Error::PlatformUnavailable(format!(
                "container VM for {service} is {state}, not running; start it with `podman machine start`"
            )));
        }
        Ok(())
    }

    async fn is_loaded(&self, label: &str, cancel: &CancellationToken) -> bool {
        let domain_id = self.options.domain_id();
        let (_, err) = self.run(launchctl::print_service_args(&domain_id, label), cancel).await;
        err.is_none()
    }

    async fn bootstrap_with_fallback(&self, service: &str, plist_path: &str, cancel: &CancellationToken) -> Result<(), Error> {
        let domain_id = self.options.domain_id();
        let (_, err) = self.run(launchctl::bootstrap_args(&domain_id, plist_path), cancel).await;
        if err.is_none() {
            return Ok(());
        }

        let (_, legacy_err) = self.run(launchctl::legacy_load_args(plist_path), cancel).await;
        if let Some(legacy_err) = legacy_err {
            return Err(Error::command_failed(service, format!("launchctl load -w {plist_path}"), legacy_err));
        }
        Ok(())
    }

    async fn enable_best_effort(&self, service: &str, label: &str, cancel: &CancellationToken) {
        let domain_id = self.options.domain_id();
        let (_, err) = self.run(launchctl::enable_args(&domain_id, label), cancel).await;
        if let Some(err) = err {
            warn!(service, label, error = %err, "launchctl enable failed, continuing");
        }
    }

    async fn kickstart_with_fallback(&self, service: &str, label: &str, cancel: &CancellationToken) -> Result<(), Error> {
        let domain_id = self.options.domain_id();
        let (_, err) = self.run(launchctl::kickstart_args(&domain_id, label, true), cancel).await;
        if err.is_none() {
            return Ok(());
        }

        let (_, legacy_err) = self.run(launchctl::legacy_start_args(label), cancel).await;
        if let Some(legacy_err) = legacy_err {
            return Err(Error::command_failed(service, format!("launchctl start {label}"), legacy_err));
        }
        Ok(())
    }

    async fn do_start(&self, service: &str, cancel: &CancellationToken) -> Result<(), Error> {
        let label = self.label(service);
        let plist_path = self.plist_path(&label);

        if !self.is_loaded(&label, cancel).await {
            self.bootstrap_with_fallback(service, &plist_path, cancel).await?;
        }
        self.enable_best_effort(service, &label, cancel).await;
        self.kickstart_with_fallback(service, &label, cancel).await
    }

    async fn do_stop(&self, service: &str, cancel: &CancellationToken) -> Result<(), Error> {
        let label = self.label(service);
        let domain_id = self.options.domain_id();

        let (_, err) = self.run(launchctl::bootout_args(&domain_id, &label), cancel).await;
        if err.is_none() {
            return Ok(());
        }

        let (_, stop_err) = self.run(launchctl::legacy_stop_args(&label), cancel).await;
        if let Some(stop_err) = stop_err {
            warn!(service, label, error = %stop_err, "launchctl stop failed, falling back to unload");
        }

        let plist_path = self.plist_path(&label);
        let (_, unload_err) = self.run(launchctl::legacy_unload_args(&plist_path), cancel).await;
        if let Some(unload_err) = unload_err {
            return Err(Error::command_failed(service, format!("launchctl unload -w {plist_path}"), unload_err));
        }
        Ok(())
    }

    async fn do_restart(&self, service: &str, cancel: &CancellationToken) -> Result<(), Error> {
        self.preflight(service, cancel).await?;

        let label = self.label(service);
        let plist_path = self.plist_path(&label);
        let domain_id = self.options.domain_id();

        if self.is_loaded(&label, cancel).await {
            let (_, err) = self.run(launchctl::bootout_args(&domain_id, &label), cancel).await;
            if let Some(err) = err {
                warn!(service, label, error = %err, "launchctl bootout failed during restart, continuing");
            }
        }

        self.bootstrap_with_fallback(service, &plist_path, cancel).await?;
        self.enable_best_effort(service, &label, cancel).await;
        self.kickstart_with_fallback(service, &label, cancel).await
    }

    /// Runs sequentially, never concurrently: launchd serializes well on a
    /// single domain, and `stop_many` depends on the reverse-of-input
    /// ordering. Once `cancel` fires, every name not yet attempted is
    /// recorded as [`Error::Cancelled`] rather than silently dropped.
    async fn bulk(&self, names: &[String], verb: Verb, cancel: &CancellationToken) -> BulkResult {
        let mut results = BTreeMap::new();
        let ordered: Vec<&String> = if matches!(verb, Verb::Stop) { names.iter().rev().collect() } else { names.iter().collect() };

        for name in ordered {
            if cancel.is_cancelled() {
                results.insert(name.clone(), Some(Error::Cancelled { service: name.clone() }));
                continue;
            }

            let outcome = match verb {
                Verb::Start => self.start(name, cancel).await,
                Verb::Stop => self.stop(name, cancel).await,
                Verb::Restart => self.restart(name, cancel).await,
            };
            if let Err(err) = &outcome {
                error!(service = %name, error = %err, "bulk operation failed for service");
            }
            results.insert(name.clone(), outcome.err());
        }
        results
    }
}

impl<R: ProcessRunner> Lifecycle for MacosLifecycle<R> {
    fn name(&self) -> &str {
        "macos"
    }

    /// No-op: launchd has no unit cache to reload.
    async fn reload(&self, _cancel: &CancellationToken) -> Result<(), Error> {
        Ok(())
    }

    async fn start(&self, name: &str, cancel: &CancellationToken) -> Result<(), Error> {
        self.preflight(name, cancel).await?;
        self.do_start(name, cancel).await
    }

    async fn stop(&self, name: &str, cancel: &CancellationToken) -> Result<(), Error> {
        self.do_stop(name, cancel).await
    }

    async fn restart(&self, name: &str, cancel: &CancellationToken) -> Result<(), Error> {
        self.do_restart(name, cancel).await
    }

    async fn status(&self, name: &str, cancel: &CancellationToken) -> Result<ServiceStatus, Error> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled { service: name.to_owned() });
        }

        let label = self.label(name);
        let domain_id = self.options.domain_id();
        let (output, err) = self.run(launchctl::print_service_args(&domain_id, &label), cancel).await;

        let text = if err.is_none() {
            String::from_utf8_lossy(&output).into_owned()
        } else {
            let (listing, listing_err) = self.run(launchctl::print_domain_args(&domain_id), cancel).await;
            if listing_err.is_some() {
                return Err(Error::PlatformUnavailable(format!("launchctl print failed for {label}, and domain listing also failed")));
            }
            let listing_text = String::from_utf8_lossy(&listing);
            match listing_text.lines().find(|line| line.contains(&label)) {
                Some(line) => line.to_owned(),
                None => {
                    return Ok(ServiceStatus {
                        name: name.to_owned(),
                        state: "not found".to_owned(),
                        ..ServiceStatus::default()
                    });
                }
            }
        };

        let mut status = ServiceStatus {
            name: name.to_owned(),
            state: "unknown".to_owned(),
            ..ServiceStatus::default()
        };
        for captures in status_pattern().captures_iter(&text) {
            if let Some(state) = captures.name("state") {
                status.state = state.as_str().to_owned();
                status.active = state.as_str() == "running";
            }
            if let Some(pid) = captures.name("pid") {
                status.pid = pid.as_str().parse().ok();
            }
        }
        Ok(status)
    }

    async fn start_many(&self, names: &[String], cancel: &CancellationToken) -> BulkResult {
        self.bulk(names, Verb::Start, cancel).await
    }

    async fn stop_many(&self, names: &[String], cancel: &CancellationToken) -> BulkResult {
        self.bulk(names, Verb::Stop, cancel).await
    }

    async fn restart_many(&self, names: &[String], cancel: &CancellationToken) -> BulkResult {
        self.bulk(names, Verb::Restart, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::mock::MockRunner;

    fn options() -> MacosOptions {
        MacosOptions {
            prefix: "com.example.svcplane".to_owned(),
            podman_path: "/opt/homebrew/bin/podman".to_owned(),
            logs_dir: std::path::PathBuf::from("/tmp/logs"),
            plist_dir: std::path::PathBuf::from("/tmp/plists"),
            system_scope: false,
            uid: Some(501),
        }
    }

    fn running_vm(runner: &MockRunner) {
        runner.expect("/opt/homebrew/bin/podman", &["machine", "inspect", "--format", "{{.State}}"], b"running", None);
    }

    #[tokio::test]
    async fn start_bootstraps_enables_and_kickstarts_when_unloaded() {
        let runner = MockRunner::new();
        running_vm(&runner);
        runner.expect("launchctl", &["print", "gui/501/com.example.svcplane.web"], b"", Some("not found"));
        runner.expect("launchctl", &["bootstrap", "gui/501", "/tmp/plists/com.example.svcplane.web.plist"], b"", None);
        runner.expect("launchctl", &["enable", "gui/501/com.example.svcplane.web"], b"", None);
        runner.expect("launchctl", &["kickstart", "-k", "gui/501/com.example.svcplane.web"], b"", None);

        let lifecycle = MacosLifecycle::new(runner, options());
        lifecycle.start("web", &CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn start_fails_when_vm_not_running() {
        let runner = MockRunner::new();
        runner.expect("/opt/homebrew/bin/podman", &["machine", "inspect", "--format", "{{.State}}"], b"stopped", None);

        let lifecycle = MacosLifecycle::new(runner, options());
        let err = lifecycle.start("web", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::PlatformUnavailable(_)));
    }

    #[tokio::test]
    async fn stop_many_invokes_in_reverse_input_order() {
        let runner = MockRunner::new();
        for label in ["c", "b", "a"] {
            runner.expect("launchctl", &["bootout", &format!("gui/501/com.example.svcplane.{label}")], b"", None);
        }

        let lifecycle = MacosLifecycle::new(runner, options());
        let names = vec!["a".to_owned(), "b".to_owned(), "c".to_owned()];
        let results = lifecycle.stop_many(&names, &CancellationToken::new()).await;

        assert!(results.values().all(Option::is_none));
        let invocations = lifecycle.runner.invocations();
        assert_eq!(
            invocations,
            vec![
                "launchctl [bootout gui/501/com.example.svcplane.c]",
                "launchctl [bootout gui/501/com.example.svcplane.b]",
                "launchctl [bootout gui/501/com.example.svcplane.a]",
            ]
        );
    }

    #[tokio::test]
    async fn status_parses_state_and_pid_from_print_output() {
        let runner = MockRunner::new();
        runner.expect(
            "launchctl",
            &["print", "gui/501/com.example.svcplane.web"],
            b"com.example.svcplane.web = {\n\tstate = running\n\tpid = 4821\n}\n",
            None,
        );

        let lifecycle = MacosLifecycle::new(runner, options());
        let status = lifecycle.status("web", &CancellationToken::new()).await.unwrap();
        assert!(status.active);
        assert_eq!(status.state, "running");
        assert_eq!(status.pid, Some(4821));
    }

    #[tokio::test]
    async fn status_falls_back_to_domain_listing_on_print_failure() {
        let runner = MockRunner::new();
        runner.expect("launchctl", &["print", "gui/501/com.example.svcplane.web"], b"", Some("not found"));
        runner.expect("launchctl", &["print", "gui/501"], b"1234\t0\tcom.example.svcplane.web\n", None);

        let lifecycle = MacosLifecycle::new(runner, options());
        let status = lifecycle.status("web", &CancellationToken::new()).await.unwrap();
        assert_eq!(status.name, "web");
    }

    #[tokio::test]
    async fn cancelled_before_bulk_start_populates_every_entry() {
        let lifecycle = MacosLifecycle::new(MockRunner::new(), options());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let names = vec!["a".to_owned(), "b".to_owned()];
        let results = lifecycle.start_many(&names, &cancel).await;

        for name in &names {
            assert!(matches!(results.get(name).unwrap(), Some(Error::Cancelled { .. })));
        }
        assert!(lifecycle.runner.invocations().is_empty());
    }
}
