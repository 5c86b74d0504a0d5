use std::net::IpAddr;
use std::path::PathBuf;

use indexmap::IndexMap;
use smart_default::SmartDefault;

/// The runtime payload of a [`super::Spec`]: everything needed to invoke
/// the container runtime for one service.
#[derive(Debug, Clone, PartialEq, SmartDefault)]
pub struct Container {
    /// The container's image, or an embedded build. Exactly one of image
    /// or build must be set; enforced by [`super::validate`].
    pub source: Source,

    pub entrypoint: Option<String>,
    pub command: Option<String>,
    pub args: Vec<String>,

    /// Unordered; sorted by key at render time.
    pub environment: IndexMap<String, String>,
    /// Ordered; preserved at render time.
    pub env_files: Vec<PathBuf>,

    /// Ordered.
    pub ports: Vec<Port>,
    /// Ordered.
    pub mounts: Vec<Mount>,
    /// Ordered.
    pub secrets: Vec<Secret>,

    pub healthcheck: Option<Healthcheck>,
    pub resources: Resources,
    pub security: Security,
    pub logging: Logging,
    pub network_mode: NetworkMode,

    #[default(RestartPolicy::No)]
    pub restart_policy: RestartPolicy,

    pub hostname: Option<String>,
    pub container_name: Option<String>,
    pub working_dir: Option<PathBuf>,
    pub user: Option<String>,
    pub group: Option<String>,

    pub init: bool,
    pub read_only_rootfs: bool,

    /// Ordered raw `target[:options]` tmpfs entries.
    pub tmpfs: Vec<String>,
    /// Ordered raw ulimit entries.
    pub ulimits: Vec<String>,
    /// Unordered; sorted by key at render time.
    pub sysctls: IndexMap<String, String>,

    /// Namespace mode strings. `user_ns` is rendered natively; the other
    /// three flow through the passthrough channel on the Linux adapter.
    pub user_ns: Option<String>,
    pub pid_ns: Option<String>,
    pub ipc_ns: Option<String>,
    pub cgroup_ns: Option<String>,

    /// Ordered.
    pub devices: Vec<Device>,
    /// Ordered raw `--device-cgroup-rule` entries.
    pub device_cgroup_rules: Vec<String>,

    pub stop_signal: Option<String>,
    pub stop_grace_period_secs: Option<u64>,

    /// Unordered `host -> ip`; sorted by host at render time.
    pub extra_hosts: IndexMap<String, String>,
    /// Unordered; sorted by value at render time.
    pub dns_servers: Vec<IpAddr>,
    /// Unordered; sorted at render time.
    pub dns_search: Vec<String>,
    /// Unordered; sorted at render time.
    pub dns_options: Vec<String>,

    /// Free-form arguments appended verbatim, in order, to the end of the
    /// argument vector (before the image).
    pub podman_args: Vec<String>,
}

/// Exactly one of `Image` or `Build` is present on a valid [`Container`].
#[derive(Debug, Clone, PartialEq, SmartDefault)]
pub enum Source {
    #[default]
    Image(String),
    Build(Build),
}

impl Source {
    /// The image reference to use for `Image=` on the Linux adapter and
    /// for the argument builder's image positional argument. For a build
    /// source this is the first tag, which is what the build must produce.
    pub fn image_ref(&self) -> Option<&str> {
        match self {
            Self::Image(image) => Some(image),
            Self::Build(build) => build.tags.first().map(String::as_str),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Build {
    pub context: PathBuf,
    pub containerfile: Option<PathBuf>,
    /// Ordered; the Linux renderer sorts these into `ImageTag=` lines.
    pub tags: Vec<String>,
    /// Unordered; mapped through `Environment=` on the Linux renderer.
    pub build_args: IndexMap<String, String>,
    /// Ordered; flows through the passthrough channel.
    pub cache_from: Vec<String>,
    /// Ordered; flows through the passthrough channel.
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    pub host_address: Option<String>,
    pub host_port: u16,
    pub container_port: u16,
    pub protocol: Protocol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MountType {
    #[default]
    Bind,
    Volume,
    Tmpfs,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BindOptions {
    pub propagation: Option<String>,
    pub selinux_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TmpfsOptions {
    pub size: Option<String>,
    pub mode: Option<String>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Mount {
    pub source: String,
    pub target: String,
    pub kind: MountType,
    pub readonly: bool,
    /// Custom options, in input order; appended after the fixed
    /// ro/propagation/selinux prefix for bind mounts.
    pub options: Vec<String>,
    pub bind_options: Option<BindOptions>,
    pub tmpfs_options: Option<TmpfsOptions>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SecretKind {
    #[default]
    Mount,
    Env,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Secret {
    pub source: String,
    pub target: Option<String>,
    pub kind: SecretKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Healthcheck {
    /// Must be non-empty when the healthcheck itself is present.
    pub test: Vec<String>,
    pub interval: Option<String>,
    pub timeout: Option<String>,
    pub retries: u32,
    pub start_period: Option<String>,
    pub start_interval: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Resources {
    /// Native: `Memory=`.
    pub memory: Option<u64>,
    /// Native: shared memory size.
    pub shm_size: Option<u64>,
    /// Passthrough residue.
    pub memory_reservation: Option<u64>,
    /// Passthrough residue.
    pub memory_swap: Option<i64>,
    /// Passthrough residue.
    pub cpu_shares: Option<u64>,
    /// Passthrough residue.
    pub cpu_quota: Option<i64>,
    /// Passthrough residue.
    pub cpu_period: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Security {
    /// Unordered; sorted at render time.
    pub cap_add: Vec<String>,
    /// Unordered; sorted at render time.
    pub cap_drop: Vec<String>,
    /// Raw SELinux label (e.g. `type:container_t,level:s0`), decomposed
    /// into discrete `SecurityLabelType=`/`SecurityLabelLevel=` directives
    /// by the Linux renderer.
    pub selinux_label: Option<String>,
    /// Passthrough; ordered.
    pub group_add: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Logging {
    pub driver: Option<String>,
    /// Unordered; sorted at render time.
    pub options: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NetworkMode {
    /// E.g. `"bridge"`, `"host"`, `"none"`, `"container:<name>"`. Empty
    /// means the runtime default.
    pub mode: String,
    pub aliases: Vec<String>,
    /// Per-service network attachments (by `Network` name).
    pub networks: Vec<String>,
}

impl NetworkMode {
    /// Returns `true` if this mode shares the host's network namespace,
    /// in which case per-service network attachments are invalid.
    pub fn is_host_equivalent(&self) -> bool {
        self.mode.eq_ignore_ascii_case("host")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartPolicy {
    #[default]
    No,
    Always,
    OnFailure,
    UnlessStopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Device {
    pub host_path: String,
    pub container_path: Option<String>,
    pub permissions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalDependency {
    pub project: String,
    pub service: String,
    pub optional: bool,
    pub exists_in_runtime: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_mode_is_host_equivalent() {
        let mode = NetworkMode {
            mode: "Host".to_owned(),
            ..NetworkMode::default()
        };
        assert!(mode.is_host_equivalent());
    }

    #[test]
    fn bridge_mode_is_not_host_equivalent() {
        let mode = NetworkMode {
            mode: "bridge".to_owned(),
            ..NetworkMode::default()
        };
        assert!(!mode.is_host_equivalent());
    }

    #[test]
    fn build_source_image_ref_is_first_tag() {
        let source = Source::Build(Build {
            tags: vec!["app:latest".to_owned(), "app:1.0".to_owned()],
            ..Build::default()
        });
        assert_eq!(source.image_ref(), Some("app:latest"));
    }
}
