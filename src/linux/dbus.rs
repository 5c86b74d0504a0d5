//! Async proxies for the subset of systemd's D-Bus API the lifecycle driver
//! needs, plus a [`Bus`] trait abstracting over them so the lifecycle can be
//! exercised against a scripted substitute instead of a live daemon.

use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use zbus::proxy;
use zbus::zvariant::OwnedObjectPath;

use crate::error::{ControlPlaneCause, Error};

#[proxy(
    interface = "org.freedesktop.systemd1.Manager",
    default_service = "org.freedesktop.systemd1",
    default_path = "/org/freedesktop/systemd1"
)]
pub trait Manager {
    fn reload(&self) -> zbus::Result<()>;

    fn start_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;
    fn stop_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;
    fn restart_unit(&self, name: &str, mode: &str) -> zbus::Result<OwnedObjectPath>;

    fn get_unit(&self, name: &str) -> zbus::Result<OwnedObjectPath>;

    #[zbus(signal)]
    fn job_removed(&self, id: u32, job: OwnedObjectPath, unit: String, result: String) -> zbus::Result<()>;
}

/// Generic unit properties: `ActiveState`/`SubState`/`Description`/
/// `ActiveEnterTimestamp` apply to every unit type, not just services.
#[proxy(interface = "org.freedesktop.systemd1.Unit", default_service = "org.freedesktop.systemd1")]
pub trait Unit {
    #[zbus(property)]
    fn active_state(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn sub_state(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn description(&self) -> zbus::Result<String>;

    /// Microseconds since the epoch; zero if the unit has never been active.
    #[zbus(property)]
    fn active_enter_timestamp(&self) -> zbus::Result<u64>;
}

/// Service-specific properties, read after a terminal non-active state to
/// build an [`crate::error::Error::ActivationFailure`].
#[proxy(interface = "org.freedesktop.systemd1.Service", default_service = "org.freedesktop.systemd1")]
pub trait Service {
    #[zbus(property)]
    fn result(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn exec_main_status(&self) -> zbus::Result<i32>;

    #[zbus(property)]
    fn main_pid(&self) -> zbus::Result<u32>;
}

/// The job submitted by a single start/stop/restart call.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Verb {
    Start,
    Stop,
    Restart,
}

impl Verb {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }
}

/// A unit's generic state as of one bus read.
#[derive(Debug, Clone, Default)]
pub struct UnitState {
    pub active_state: String,
    pub sub_state: Option<String>,
    pub description: Option<String>,
    pub active_enter_timestamp_usec: u64,
}

/// Service-specific state, read to diagnose a terminal non-active unit or to
/// report a running service's PID.
#[derive(Debug, Clone, Default)]
pub struct ServiceState {
    pub result: String,
    pub exit_code: Option<i32>,
    pub pid: Option<u32>,
}

/// Abstracts the systemd bus surface the lifecycle driver needs. The real
/// implementation ([`ZbusBus`]) dials the session or system bus per call;
/// tests substitute [`mock::MockBus`] to exercise activation failures and
/// generation timeouts without a live daemon.
pub trait Bus: Send + Sync {
    async fn reload(&self, service: &str) -> Result<(), Error>;

    /// Submits a start/stop/restart job and waits for its `JobRemoved`
    /// result, bounded by `deadline` and `cancel`. Subscribes to the
    /// `JobRemoved` signal stream before submitting the job so a job that
    /// completes between submission and subscription can never be missed.
    async fn submit_and_await(&self, service: &str, verb: Verb, deadline: Duration, cancel: &CancellationToken) -> Result<String, Error>;

    async fn get_unit(&self, service: &str) -> Result<OwnedObjectPath, Error>;

    async fn unit_state(&self, path: &OwnedObjectPath, service: &str) -> Result<UnitState, Error>;

    async fn service_state(&self, path: &OwnedObjectPath, service: &str) -> Result<ServiceState, Error>;
}

/// Dials the session (default) or system bus fresh for every call; no
/// connection or proxy is retained between operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZbusBus {
    pub system_scope: bool,
}

impl ZbusBus {
    async fn connect(&self, service: &str) -> Result<zbus::Connection, Error> {
        let connection = if self.system_scope { zbus::Connection::system().await } else { zbus::Connection::session().await };
        connection.map_err(|err| Error::ControlPlane {
            service: service.to_owned(),
            source: ControlPlaneCause::Connect(err.to_string()),
        })
    }

    async fn manager<'c>(&self, conn: &'c zbus::Connection, service: &str) -> Result<ManagerProxy<'c>, Error> {
        ManagerProxy::new(conn).await.map_err(|err| Error::ControlPlane {
            service: service.to_owned(),
            source: ControlPlaneCause::Connect(err.to_string()),
        })
    }

    async fn unit_proxy<'c>(&self, conn: &'c zbus::Connection, path: OwnedObjectPath, service: &str) -> Result<UnitProxy<'c>, Error> {
        let builder = UnitProxy::builder(conn).path(path).map_err(|err| Error::ControlPlane {
            service: service.to_owned(),
            source: ControlPlaneCause::Connect(err.to_string()),
        })?;
        builder.build().await.map_err(|err| Error::ControlPlane {
            service: service.to_owned(),
            source: ControlPlaneCause::Connect(err.to_string()),
        })
    }

    async fn service_proxy<'c>(&self, conn: &'c zbus::Connection, path: OwnedObjectPath, service: &str) -> Result<ServiceProxy<'c>, Error> {
        let builder = ServiceProxy::builder(conn).path(path).map_err(|err| Error::ControlPlane {
            service: service.to_owned(),
            source: ControlPlaneCause::Connect(err.to_string()),
        })?;
        builder.build().await.map_err(|err| Error::ControlPlane {
            service: service.to_owned(),
            source: ControlPlaneCause::Connect(err.to_string()),
        })
    }
}

impl Bus for ZbusBus {
    async fn reload(&self, service: &str) -> Result<(), Error> {
        let conn = self.connect(service).await?;
        let manager = self.manager(&conn, service).await?;
        manager.reload().await.map_err(|err| Error::ControlPlane {
            service: service.to_owned(),
            source: ControlPlaneCause::Call(err.to_string()),
        })
    }

    async fn submit_and_await(&self, service: &str, verb: Verb, deadline: Duration, cancel: &CancellationToken) -> Result<String, Error> {
        let conn = self.connect(service).await?;
        let manager = self.manager(&conn, service).await?;

        let mut stream = manager.receive_job_removed().await.map_err(|err| Error::ControlPlane {
            service: service.to_owned(),
            source: ControlPlaneCause::Call(err.to_string()),
        })?;

        let job = match verb {
            Verb::Start => manager.start_unit(service, "replace").await,
            Verb::Stop => manager.stop_unit(service, "replace").await,
            Verb::Restart => manager.restart_unit(service, "replace").await,
        }
        .map_err(|err| Error::ControlPlane {
            service: service.to_owned(),
            source: ControlPlaneCause::Call(err.to_string()),
        })?;

        let sleep = tokio::time::sleep(deadline);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                signal = stream.next() => {
                    let Some(signal) = signal else {
                        return Err(Error::ControlPlane {
                            service: service.to_owned(),
                            source: ControlPlaneCause::Call(
                                "job-removed signal stream closed before the submitted job completed".to_owned(),
                            ),
                        });
                    };
                    let args = signal.args().map_err(|err| Error::ControlPlane {
                        service: service.to_owned(),
                        source: ControlPlaneCause::Call(err.to_string()),
                    })?;
                    if *args.job() == job {
                        return Ok(args.result().clone());
                    }
                }
                () = &mut sleep => {
                    return Err(Error::ControlPlane {
                        service: service.to_owned(),
                        source: ControlPlaneCause::Call(format!("job-removed signal not observed within {}ms", deadline.as_millis())),
                    });
                }
                () = cancel.cancelled() => return Err(Error::Cancelled { service: service.to_owned() }),
            }
        }
    }

    async fn get_unit(&self, service: &str) -> Result<OwnedObjectPath, Error> {
        let conn = self.connect(service).await?;
        let manager = self.manager(&conn, service).await?;
        manager.get_unit(service).await.map_err(|err| Error::ControlPlane {
            service: service.to_owned(),
            source: ControlPlaneCause::Call(err.to_string()),
        })
    }

    async fn unit_state(&self, path: &OwnedObjectPath, service: &str) -> Result<UnitState, Error> {
        let conn = self.connect(service).await?;
        let unit = self.unit_proxy(&conn, path.clone(), service).await?;
        let active_state = unit.active_state().await.map_err(|err| Error::ControlPlane {
            service: service.to_owned(),
            source: ControlPlaneCause::Call(err.to_string()),
        })?;
        Ok(UnitState {
            active_state,
            sub_state: unit.sub_state().await.ok(),
            description: unit.description().await.ok().filter(|d| !d.is_empty()),
            active_enter_timestamp_usec: unit.active_enter_timestamp().await.unwrap_or(0),
        })
    }

    async fn service_state(&self, path: &OwnedObjectPath, service: &str) -> Result<ServiceState, Error> {
        let conn = self.connect(service).await?;
        let service_proxy = self.service_proxy(&conn, path.clone(), service).await?;
        Ok(ServiceState {
            result: service_proxy.result().await.unwrap_or_default(),
            exit_code: service_proxy.exec_main_status().await.ok().filter(|code| *code != 0),
            pid: service_proxy.main_pid().await.ok().filter(|pid| *pid != 0),
        })
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;
    use zbus::zvariant::{ObjectPath, OwnedObjectPath};

    use super::{Bus, ServiceState, UnitState, Verb};
    use crate::error::Error;

    fn stub_path() -> OwnedObjectPath {
        OwnedObjectPath::from(ObjectPath::try_from("/org/freedesktop/systemd1/unit/mock").expect("static object path is valid"))
    }

    /// A scripted stand-in for [`Bus`]: every field is the canned answer one
    /// call site returns, so a single instance can drive a full
    /// submit-wait-activate-or-fail sequence without a live daemon.
    #[derive(Debug, Default)]
    pub struct MockBus {
        pub job_result: String,
        pub unit_generated: bool,
        pub unit_state: UnitState,
        pub service_state: ServiceState,
    }

    impl Bus for MockBus {
        async fn reload(&self, _service: &str) -> Result<(), Error> {
            Ok(())
        }

        async fn submit_and_await(&self, _service: &str, _verb: Verb, _deadline: Duration, _cancel: &CancellationToken) -> Result<String, Error> {
            Ok(self.job_result.clone())
        }

        async fn get_unit(&self, service: &str) -> Result<OwnedObjectPath, Error> {
            if self.unit_generated {
                Ok(stub_path())
            } else {
                Err(Error::PlatformUnavailable(format!("unit {service} not yet generated")))
            }
        }

        async fn unit_state(&self, _path: &OwnedObjectPath, _service: &str) -> Result<UnitState, Error> {
            Ok(self.unit_state.clone())
        }

        async fn service_state(&self, _path: &OwnedObjectPath, _service: &str) -> Result<ServiceState, Error> {
            Ok(self.service_state.clone())
        }
    }
}
