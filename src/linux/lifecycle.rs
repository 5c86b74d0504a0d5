//! Drives systemd's user (default) or system bus: reload, single-service
//! start/stop/restart with activation waiting, status introspection, and
//! the parallel bulk operations. Bus calls go through the [`Bus`] trait so
//! tests can substitute a scripted stand-in instead of dialing a live
//! daemon.

use std::collections::BTreeMap;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, instrument, warn};
use zbus::zvariant::OwnedObjectPath;

use crate::contracts::{BulkResult, Lifecycle, ServiceStatus};
use crate::error::Error;
use crate::runner::{ProcessRunner, SystemRunner};

use super::dbus::{Bus, Verb, ZbusBus};

const ACTIVATING_POLL: Duration = Duration::from_secs(10);
const ACTIVATING_START_POLL: Duration = Duration::from_secs(60);
const GENERATION_BACKOFF_INITIAL: Duration = Duration::from_millis(50);
const DEFAULT_GENERATION_DEADLINE: Duration = Duration::from_secs(5);
const DEFAULT_JOB_DEADLINE: Duration = Duration::from_secs(30);

/// Talks to `org.freedesktop.systemd1` through an injected [`Bus`]. Every
/// bus call opens, uses, and releases its own connection; no state is
/// retained between calls besides configuration.
#[derive(Debug)]
pub struct LinuxLifecycle<R: ProcessRunner = SystemRunner, B: Bus = ZbusBus> {
    runner: R,
    bus: B,
    generation_deadline: Duration,
    job_deadline: Duration,
}

impl Default for LinuxLifecycle<SystemRunner, ZbusBus> {
    fn default() -> Self {
        Self {
            runner: SystemRunner,
            bus: ZbusBus::default(),
            generation_deadline: DEFAULT_GENERATION_DEADLINE,
            job_deadline: DEFAULT_JOB_DEADLINE,
        }
    }
}

impl<R: ProcessRunner> LinuxLifecycle<R, ZbusBus> {
    pub fn new(runner: R, system_scope: bool) -> Self {
        Self {
            runner,
            bus: ZbusBus { system_scope },
            generation_deadline: DEFAULT_GENERATION_DEADLINE,
            job_deadline: DEFAULT_JOB_DEADLINE,
        }
    }
}

impl<R: ProcessRunner, B: Bus> LinuxLifecycle<R, B> {
    /// Substitutes a scripted [`Bus`] for the real one. Used by tests that
    /// need to drive the activation-wait and generation-backoff paths
    /// without a live bus.
    #[cfg(any(test, feature = "test-util"))]
    pub fn with_bus(runner: R, bus: B) -> Self {
        Self {
            runner,
            bus,
            generation_deadline: DEFAULT_GENERATION_DEADLINE,
            job_deadline: DEFAULT_JOB_DEADLINE,
        }
    }

    #[must_use]
    pub fn with_generation_deadline(mut self, deadline: Duration) -> Self {
        self.generation_deadline = deadline;
        self
    }

    #[must_use]
    pub fn with_job_deadline(mut self, deadline: Duration) -> Self {
        self.job_deadline = deadline;
        self
    }

    #[instrument(skip(self, cancel), fields(service = %service, verb = verb.as_str()))]
    async fn submit_and_wait(&self, service: &str, verb: Verb, cancel: &CancellationToken) -> Result<(), Error> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled { service: service.to_owned() });
        }

        let result = self.bus.submit_and_await(service, verb, self.job_deadline, cancel).await?;
        if result == "done" {
            return Ok(());
        }

        let unit_path = self.bus.get_unit(service).await?;
        self.wait_for_activation(&unit_path, service, cancel).await
    }

    async fn wait_for_activation(&self, path: &OwnedObjectPath, service: &str, cancel: &CancellationToken) -> Result<(), Error> {
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled { service: service.to_owned() });
            }

            let state = self.bus.unit_state(path, service).await?;
            if state.active_state == "active" {
                return Ok(());
            }

            if state.active_state == "activating" {
                let delay = if state.sub_state.as_deref() == Some("start") { ACTIVATING_START_POLL } else { ACTIVATING_POLL };
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = cancel.cancelled() => return Err(Error::Cancelled { service: service.to_owned() }),
                }
                continue;
            }

            let service_state = self.bus.service_state(path, service).await?;
            return Err(Error::ActivationFailure {
                service: service.to_owned(),
                state: state.active_state,
                result: service_state.result,
                exit_code: service_state.exit_code,
            });
        }
    }

    async fn wait_for_unit_generation(&self, service: &str, cancel: &CancellationToken) -> Result<(), Error> {
        let mut delay = GENERATION_BACKOFF_INITIAL;
        let deadline = Instant::now() + self.generation_deadline;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled { service: service.to_owned() });
            }
            if self.bus.get_unit(service).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::GenerationTimeout {
                    service: service.to_owned(),
                    deadline_ms: u64::try_from(self.generation_deadline.as_millis()).unwrap_or(u64::MAX),
                });
            }
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel.cancelled() => return Err(Error::Cancelled { service: service.to_owned() }),
            }
            delay *= 2;
        }
    }

    /// Best-effort; never surfaces a failure. The rootless port-forwarder
    /// helper is matched by name and killed by PID, which is validated as a
    /// positive integer before use.
    async fn cleanup_orphaned_port_forwarder(&self, service: &str, cancel: &CancellationToken) {
        let pattern = format!("rootlessport.*{service}");
        let (output, err) = self.runner.combined_output("pgrep", &["-f".to_owned(), pattern], cancel).await;
        if err.is_some() {
            return;
        }

        for line in String::from_utf8_lossy(&output).lines() {
            let Ok(pid) = line.trim().parse::<u32>() else { continue };
            if pid == 0 {
                continue;
            }
            let (_, kill_err) = self.runner.combined_output("kill", &[pid.to_string()], cancel).await;
            if let Some(kill_err) = kill_err {
                warn!(service, pid, error = %kill_err, "failed to terminate orphaned port-forwarder");
            }
        }
    }

    async fn bulk(&self, names: &[String], verb: Verb, reverse: bool, cancel: &CancellationToken) -> BulkResult {
        for name in names {
            self.cleanup_orphaned_port_forwarder(name, cancel).await;
        }

        let results = Mutex::new(BTreeMap::<String, Option<Error>>::new());

        let mut runnable: Vec<&String> = if reverse { names.iter().rev().collect() } else { names.iter().collect() };

        if matches!(verb, Verb::Restart) {
            let mut still_runnable = Vec::with_capacity(runnable.len());
            for name in runnable {
                match self.wait_for_unit_generation(name, cancel).await {
                    Ok(()) => still_runnable.push(name),
                    Err(err) => {
                        error!(service = %name, error = %err, "bulk operation failed for service");
                        results.lock().await.insert(name.clone(), Some(err));
                    }
                }
            }
            runnable = still_runnable;
        }

        join_all(runnable.into_iter().map(|name| {
            let results = &results;
            async move {
                let outcome = match verb {
                    Verb::Start => self.start(name, cancel).await,
                    Verb::Stop => self.stop(name, cancel).await,
                    Verb::Restart => self.restart(name, cancel).await,
                };
                if let Err(err) = &outcome {
                    error!(service = %name, error = %err, "bulk operation failed for service");
                }
                results.lock().await.insert(name.clone(), outcome.err());
            }
        }))
        .await;

        results.into_inner()
    }
}

fn microseconds_to_rfc3339(usec: u64) -> Option<String> {
    if usec == 0 {
        return None;
    }
    let millis = i64::try_from(usec / 1000).ok()?;
    chrono::DateTime::from_timestamp_millis(millis).map(|dt| dt.to_rfc3339())
}

impl<R: ProcessRunner, B: Bus> Lifecycle for LinuxLifecycle<R, B> {
    fn name(&self) -> &str {
        "linux"
    }

    async fn reload(&self, cancel: &CancellationToken) -> Result<(), Error> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled {
                service: "systemd-manager".to_owned(),
            });
        }
        self.bus.reload("systemd-manager").await
    }

    async fn start(&self, name: &str, cancel: &CancellationToken) -> Result<(), Error> {
        self.submit_and_wait(name, Verb::Start, cancel).await
    }

    async fn stop(&self, name: &str, cancel: &CancellationToken) -> Result<(), Error> {
        self.submit_and_wait(name, Verb::Stop, cancel).await
    }

    async fn restart(&self, name: &str, cancel: &CancellationToken) -> Result<(), Error> {
        self.submit_and_wait(name, Verb::Restart, cancel).await
    }

    #[instrument(skip(self, cancel), fields(service = %name))]
    async fn status(&self, name: &str, cancel: &CancellationToken) -> Result<ServiceStatus, Error> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled { service: name.to_owned() });
        }

        let path = self.bus.get_unit(name).await?;
        let state = self.bus.unit_state(&path, name).await?;
        let service_state = self.bus.service_state(&path, name).await?;

        Ok(ServiceStatus {
            name: name.to_owned(),
            active: state.active_state == "active",
            since_iso8601: microseconds_to_rfc3339(state.active_enter_timestamp_usec),
            state: state.active_state,
            sub_state: state.sub_state,
            description: state.description,
            pid: service_state.pid,
            error: None,
        })
    }

    async fn start_many(&self, names: &[String], cancel: &CancellationToken) -> BulkResult {
        self.bulk(names, Verb::Start, false, cancel).await
    }

    async fn stop_many(&self, names: &[String], cancel: &CancellationToken) -> BulkResult {
        self.bulk(names, Verb::Stop, true, cancel).await
    }

    async fn restart_many(&self, names: &[String], cancel: &CancellationToken) -> BulkResult {
        self.bulk(names, Verb::Restart, false, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linux::dbus::mock::MockBus;
    use crate::linux::dbus::{ServiceState, UnitState};
    use crate::runner::mock::MockRunner;

    #[test]
    fn microseconds_to_rfc3339_zero_is_none() {
        assert_eq!(microseconds_to_rfc3339(0), None);
    }

    #[test]
    fn microseconds_to_rfc3339_formats_known_instant() {
        let rendered = microseconds_to_rfc3339(1_700_000_000_000_000).unwrap();
        assert!(rendered.starts_with("2023-11-14T"));
    }

    #[tokio::test]
    async fn s5_activation_failure_surfaces_state_result_and_exit_code() {
        let bus = MockBus {
            job_result: "failed".to_owned(),
            unit_generated: true,
            unit_state: UnitState {
                active_state: "failed".to_owned(),
                ..UnitState::default()
            },
            service_state: ServiceState {
                result: "exit-code".to_owned(),
                exit_code: Some(137),
                ..ServiceState::default()
            },
            ..MockBus::default()
        };
        let lifecycle = LinuxLifecycle::with_bus(MockRunner::new(), bus);

        let err = lifecycle.start("x", &CancellationToken::new()).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("state=failed"));
        assert!(message.contains("result=exit-code"));
        assert!(message.contains("exit_code=137"));
    }

    #[tokio::test]
    async fn s6_restart_many_reports_generation_timeout() {
        let bus = MockBus {
            job_result: "done".to_owned(),
            unit_generated: false,
            ..MockBus::default()
        };
        let runner = MockRunner::new();
        runner.expect("pgrep", &["-f", "rootlessport.*x"], b"", Some("no match"));
        let lifecycle = LinuxLifecycle::with_bus(runner, bus).with_generation_deadline(Duration::from_millis(100));

        let results = lifecycle.restart_many(&["x".to_owned()], &CancellationToken::new()).await;
        let err = results.get("x").unwrap().as_ref().unwrap();
        assert!(err.to_string().contains("failed to be generated"));
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits_start_before_any_bus_call() {
        let lifecycle = LinuxLifecycle::with_bus(MockRunner::new(), MockBus::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = lifecycle.start("x", &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
    }
}
