//! Translates a validated [`Spec`] into the Linux supervisor's quadlet unit
//! files: one `.container` always, one `.volume` per non-external volume,
//! one `.network` per network, and one `.build` when the container embeds
//! a build.

use std::collections::BTreeSet;

use crate::argv::native_residue;
use crate::contracts::{Artifact, ChangeStatus, RenderResult, Renderer};
use crate::domain::container::{MountType, SecretKind, Source};
use crate::domain::{Network, Spec, Volume};
use crate::error::{Error, RenderCause};
use crate::hash::{combined_hash, content_hash};

use super::units::{BuildSection, ContainerSection, InstallSection, NetworkSection, ServiceSection, UnitSection, VolumeSection};
use super::writer;

const MANAGED_BY: &str = "managed-by=svcplane";
const KNOWN_SUFFIXES: &[&str] = &[".network", ".volume", ".pod", ".kube", ".build", ".image", ".artifact", ".service"];

/// Appends `.service` unless `name` already ends in a recognized resource
/// suffix.
fn dependency_token(name: &str) -> String {
    if KNOWN_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
        name.to_owned()
    } else {
        format!("{name}.service")
    }
}

fn section(content: String, output: &mut String) {
    if output.is_empty() {
        output.push_str(&content);
    } else {
        output.push('\n');
        output.push_str(&content);
    }
}

fn join_unit(sections: Vec<String>) -> String {
    let mut output = String::new();
    for part in sections {
        if part.trim().is_empty() {
            continue;
        }
        section(part, &mut output);
    }
    output
}

fn tmpfs_token(mount: &crate::domain::container::Mount) -> String {
    let Some(options) = &mount.tmpfs_options else {
        return mount.target.clone();
    };
    let mut parts = Vec::new();
    if let Some(size) = &options.size {
        parts.push(format!("size={size}"));
    }
    if let Some(mode) = &options.mode {
        parts.push(format!("mode={mode}"));
    }
    if let Some(uid) = options.uid.filter(|uid| *uid != 0) {
        parts.push(format!("uid={uid}"));
    }
    if let Some(gid) = options.gid.filter(|gid| *gid != 0) {
        parts.push(format!("gid={gid}"));
    }
    if parts.is_empty() {
        mount.target.clone()
    } else {
        format!("{}:{}", mount.target, parts.join(","))
    }
}

fn restart_policy_str(policy: crate::domain::container::RestartPolicy) -> &'static str {
    use crate::domain::container::RestartPolicy;
    match policy {
        RestartPolicy::No => "no",
        RestartPolicy::Always | RestartPolicy::UnlessStopped => "always",
        RestartPolicy::OnFailure => "on-failure",
    }
}

fn artifact(path: String, content: String, mode: u32) -> Artifact {
    let bytes = content.into_bytes();
    let content_hash = content_hash(&bytes);
    Artifact { path, content: bytes, mode, content_hash }
}

fn unit_section_for_container(spec: &Spec) -> UnitSection {
    let container = &spec.container;
    let mut unit = UnitSection {
        description: spec.description.clone().unwrap_or_default(),
        ..UnitSection::default()
    };

    let wants_network_online = !container.ports.is_empty()
        || !container.network_mode.mode.is_empty()
        || !container.network_mode.networks.is_empty();
    if wants_network_online {
        unit.after.push("network-online.target".to_owned());
        unit.wants.push("network-online.target".to_owned());
    }

    let mut mount_sources: BTreeSet<&str> = BTreeSet::new();
    for mount in &container.mounts {
        if mount.kind == MountType::Bind && !mount.source.is_empty() {
            mount_sources.insert(&mount.source);
        }
    }
    unit.requires_mounts_for = mount_sources.into_iter().map(ToOwned::to_owned).collect();

    let mut deps: Vec<_> = spec.depends_on.clone();
    deps.sort_unstable();
    for dep in &deps {
        let token = dependency_token(dep);
        unit.after.push(token.clone());
        unit.requires.push(token);
    }

    for dep in &spec.external_deps {
        let token = dependency_token(&format!("{}_{}", dep.project, dep.service));
        unit.after.push(token.clone());
        if !dep.optional {
            unit.requires.push(token);
        }
    }

    unit
}

fn service_section_for(name: &str, container: &crate::domain::Container) -> ServiceSection {
    let mut service = ServiceSection {
        restart: restart_policy_str(container.restart_policy).to_owned(),
        ..ServiceSection::default()
    };
    if let Some(grace) = container.stop_grace_period_secs.filter(|g| *g > 0) {
        service.stop_timeout_sec = u32::try_from(grace).unwrap_or(u32::MAX);
    }
    if name.contains("-init-") {
        service.unit_type = "oneshot".to_owned();
        service.remain_after_exit = true;
    }
    service
}

fn container_section_for(spec: &Spec) -> ContainerSection {
    let container = &spec.container;
    let has_build = matches!(container.source, Source::Build(_));

    let mut section = ContainerSection {
        label: vec![MANAGED_BY.to_owned()],
        image: if has_build {
            format!("{}.build", spec.name)
        } else {
            container.source.image_ref().unwrap_or_default().to_owned()
        },
        container_name: container.container_name.clone().unwrap_or_default(),
        host_name: container.hostname.clone().unwrap_or_default(),
        ..ContainerSection::default()
    };

    let mut env: Vec<_> = container.environment.iter().collect();
    env.sort_unstable_by_key(|(k, _)| (*k).clone());
    section.environment = env.into_iter().map(|(k, v)| format!("{k}={v}")).collect();
    section.environment_file = container.env_files.iter().map(|p| p.display().to_string()).collect();

    for port in &container.ports {
        let address = port.host_address.as_deref().map_or_else(String::new, |a| format!("{a}:"));
        let suffix = if port.protocol == crate::domain::container::Protocol::Tcp {
            String::new()
        } else {
            format!("/{}", port.protocol.as_str())
        };
        section.publish_port.push(format!("{address}{}:{}{suffix}", port.host_port, port.container_port));
    }

    for mount in &container.mounts {
        match mount.kind {
            MountType::Bind => {
                let mut options = Vec::new();
                if mount.readonly {
                    options.push("ro".to_owned());
                }
                if let Some(bind) = &mount.bind_options {
                    if let Some(propagation) = &bind.propagation {
                        options.push(propagation.clone());
                    }
                    if let Some(label) = &bind.selinux_label {
                        options.push(label.clone());
                    }
                }
                options.extend(mount.options.iter().cloned());
                if options.is_empty() {
                    section.volume.push(format!("{}:{}", mount.source, mount.target));
                } else {
                    section.volume.push(format!("{}:{}:{}", mount.source, mount.target, options.join(",")));
                }
            }
            MountType::Volume => {
                let mut options = Vec::new();
                if mount.readonly {
                    options.push("ro".to_owned());
                }
                options.extend(mount.options.iter().cloned());
                if options.is_empty() {
                    section.volume.push(format!("{}.volume:{}", mount.source, mount.target));
                } else {
                    section.volume.push(format!("{}.volume:{}:{}", mount.source, mount.target, options.join(",")));
                }
            }
            MountType::Tmpfs => {}
        }
    }

    if !container.network_mode.mode.is_empty() {
        section.network.push(container.network_mode.mode.clone());
    }
    let mut networks: Vec<_> = container.network_mode.networks.clone();
    networks.sort_unstable();
    for network in networks {
        section.network.push(format!("{network}.network"));
    }
    section.network_alias = container.network_mode.aliases.clone();

    let mut dns: Vec<_> = container.dns_servers.iter().map(ToString::to_string).collect();
    dns.sort_unstable();
    section.dns = dns;
    section.dns_search = {
        let mut v = container.dns_search.clone();
        v.sort_unstable();
        v
    };
    section.dns_option = {
        let mut v = container.dns_options.clone();
        v.sort_unstable();
        v
    };

    for device in &container.devices {
        let mut token = device.host_path.clone();
        if let Some(container_path) = &device.container_path {
            token.push(':');
            token.push_str(container_path);
            if let Some(permissions) = &device.permissions {
                token.push(':');
                token.push_str(permissions);
            }
        }
        section.add_device.push(token);
    }

    section.entrypoint = container.entrypoint.clone().unwrap_or_default();
    let mut exec_parts = Vec::new();
    if let Some(command) = &container.command {
        exec_parts.push(command.clone());
    }
    exec_parts.extend(container.args.iter().cloned());
    section.exec = exec_parts.join(" ");
    section.user = container.user.clone().unwrap_or_default();
    section.group = container.group.clone().unwrap_or_default();
    section.working_dir = container.working_dir.as_ref().map(|p| p.display().to_string()).unwrap_or_default();
    section.init = container.init;
    section.user_ns = container.user_ns.clone().unwrap_or_default();

    if let Some(healthcheck) = &container.healthcheck {
        section.health_cmd = healthcheck.test.join(" ");
        section.health_interval = healthcheck.interval.clone().unwrap_or_default();
        section.health_timeout = healthcheck.timeout.clone().unwrap_or_default();
        section.health_retries = healthcheck.retries;
        section.health_start_period = healthcheck.start_period.clone().unwrap_or_default();
        section.health_startup_interval = healthcheck.start_interval.clone().unwrap_or_default();
    }

    section.memory = container.resources.memory.unwrap_or_default();
    section.shm_size = container.resources.shm_size.unwrap_or_default();

    section.add_capability = {
        let mut v = container.security.cap_add.clone();
        v.sort_unstable();
        v
    };
    section.drop_capability = {
        let mut v = container.security.cap_drop.clone();
        v.sort_unstable();
        v
    };
    section.read_only = container.read_only_rootfs;
    if let Some(label) = &container.security.selinux_label {
        for part in label.split(',') {
            if let Some(value) = part.strip_prefix("type:") {
                section.security_label_type = value.to_owned();
            } else if let Some(value) = part.strip_prefix("level:") {
                section.security_label_level = value.to_owned();
            }
        }
    }

    section.log_driver = container.logging.driver.clone().unwrap_or_default();
    let mut log_opt: Vec<_> = container.logging.options.iter().collect();
    log_opt.sort_unstable_by_key(|(k, _)| (*k).clone());
    section.log_opt = log_opt.into_iter().map(|(k, v)| format!("{k}={v}")).collect();

    let mut secrets = container.secrets.clone();
    secrets.sort_by(|a, b| a.source.cmp(&b.source));
    section.secret = secrets
        .into_iter()
        .map(|secret| match (secret.kind, secret.target) {
            (SecretKind::Env, Some(target)) => format!("{},type=env,target={target}", secret.source),
            (SecretKind::Env, None) => format!("{},type=env", secret.source),
            (SecretKind::Mount, Some(target)) => format!("{},target={target}", secret.source),
            (SecretKind::Mount, None) => secret.source,
        })
        .collect();

    section.podman_args = passthrough_line(container);

    section
}

/// Everything from 4.B's native residue plus the Linux-only passthrough
/// items (extra hosts, stop signal, PID/IPC/cgroup namespace modes,
/// group-adds), joined into one `PodmanArgs=` line.
fn passthrough_line(container: &crate::domain::Container) -> String {
    let mut tokens = native_residue(container);

    for mount in container.mounts.iter().filter(|m| m.kind == MountType::Tmpfs) {
        tokens.push("--tmpfs".to_owned());
        tokens.push(tmpfs_token(mount));
    }
    for tmpfs in &container.tmpfs {
        tokens.push("--tmpfs".to_owned());
        tokens.push(tmpfs.clone());
    }
    for ulimit in &container.ulimits {
        tokens.push("--ulimit".to_owned());
        tokens.push(ulimit.clone());
    }
    for rule in &container.device_cgroup_rules {
        tokens.push("--device-cgroup-rule".to_owned());
        tokens.push(rule.clone());
    }
    let mut sysctls: Vec<_> = container.sysctls.iter().collect();
    sysctls.sort_unstable_by_key(|(k, _)| (*k).clone());
    for (key, value) in sysctls {
        tokens.push("--sysctl".to_owned());
        tokens.push(format!("{key}={value}"));
    }

    let mut hosts: Vec<_> = container.extra_hosts.iter().collect();
    hosts.sort_unstable_by_key(|(host, _)| (*host).clone());
    for (host, ip) in hosts {
        tokens.push("--add-host".to_owned());
        tokens.push(format!("{host}:{ip}"));
    }

    if let Some(signal) = &container.stop_signal {
        let stripped = signal.strip_prefix("SIG").unwrap_or(signal);
        tokens.push("--stop-signal".to_owned());
        tokens.push(stripped.to_owned());
    }

    if let Some(pid_ns) = &container.pid_ns {
        tokens.push("--pid".to_owned());
        tokens.push(pid_ns.clone());
    }
    if let Some(ipc_ns) = &container.ipc_ns {
        tokens.push("--ipc".to_owned());
        tokens.push(ipc_ns.clone());
    }
    if let Some(cgroup_ns) = &container.cgroup_ns {
        tokens.push("--cgroupns".to_owned());
        tokens.push(cgroup_ns.clone());
    }
    for group in &container.security.group_add {
        tokens.push("--group-add".to_owned());
        tokens.push(group.clone());
    }

    shlex::try_join(tokens.iter().map(String::as_str)).unwrap_or_default()
}

fn render_container_artifact(spec: &Spec) -> Result<Artifact, Error> {
    let unit = unit_section_for_container(spec);
    let container = container_section_for(spec);
    let service = service_section_for(&spec.name, &spec.container);
    let install = InstallSection::default();

    let rendered = [
        writer::to_string(unit),
        writer::to_string(container),
        writer::to_string(service),
        writer::to_string(install),
    ]
    .into_iter()
    .collect::<Result<Vec<_>, _>>()
    .map_err(|e| Error::Render {
        service: spec.name.clone(),
        source: RenderCause::Writer(e.to_string()),
    })?;

    Ok(artifact(format!("{}.container", spec.name), join_unit(rendered), 0o644))
}

fn render_build_artifact(spec: &Spec) -> Option<Result<Artifact, Error>> {
    let Source::Build(build) = &spec.container.source else {
        return None;
    };

    let unit = UnitSection {
        description: spec.description.clone().unwrap_or_default(),
        ..UnitSection::default()
    };

    let mut tags = build.tags.clone();
    tags.sort_unstable();

    let mut env: Vec<_> = build.build_args.iter().collect();
    env.sort_unstable_by_key(|(k, _)| (*k).clone());

    let mut residue = build.cache_from.clone();
    residue.extend(build.extra_args.iter().cloned());

    let section = BuildSection {
        working_directory: build.context.display().to_string(),
        file: build.containerfile.as_ref().map(|p| p.display().to_string()).unwrap_or_default(),
        image_tag: tags,
        environment: env.into_iter().map(|(k, v)| format!("{k}={v}")).collect(),
        podman_args: shlex::try_join(residue.iter().map(String::as_str)).unwrap_or_default(),
    };
    let install = InstallSection::default();

    let rendered = [writer::to_string(unit), writer::to_string(section), writer::to_string(install)]
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| Error::Render {
            service: spec.name.clone(),
            source: RenderCause::Writer(e.to_string()),
        });

    Some(rendered.map(|parts| artifact(format!("{}-build.build", spec.name), join_unit(parts), 0o644)))
}

fn render_volume_artifact(volume: &Volume) -> Option<Result<Artifact, Error>> {
    if volume.external {
        return None;
    }

    let unit = UnitSection {
        description: format!("{} volume", volume.name),
        ..UnitSection::default()
    };

    let mut opt: Vec<_> = volume.options.iter().collect();
    opt.sort_unstable_by_key(|(k, _)| (*k).clone());
    let mut label = vec![MANAGED_BY.to_owned()];
    let mut labels: Vec<_> = volume.labels.iter().collect();
    labels.sort_unstable_by_key(|(k, _)| (*k).clone());
    label.extend(labels.into_iter().map(|(k, v)| format!("{k}={v}")));

    let section = VolumeSection {
        label,
        volume_name: volume.name.clone(),
        driver: volume.driver.clone().filter(|d| d != "local").unwrap_or_default(),
        opt: opt.into_iter().map(|(k, v)| format!("{k}={v}")).collect(),
    };
    let install = InstallSection::default();

    let rendered = [writer::to_string(unit), writer::to_string(section), writer::to_string(install)]
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| Error::Render {
            service: volume.name.clone(),
            source: RenderCause::Writer(e.to_string()),
        });

    Some(rendered.map(|parts| artifact(format!("{}.volume", volume.name), join_unit(parts), 0o644)))
}

fn render_network_artifact(network: &Network) -> Result<Artifact, Error> {
    let unit = UnitSection {
        description: format!("{} network", network.name),
        ..UnitSection::default()
    };

    let mut label = vec![MANAGED_BY.to_owned()];
    let mut labels: Vec<_> = network.labels.iter().collect();
    labels.sort_unstable_by_key(|(k, _)| (*k).clone());
    label.extend(labels.into_iter().map(|(k, v)| format!("{k}={v}")));

    let section = if network.external {
        NetworkSection {
            label,
            network_name: network.name.clone(),
            ..NetworkSection::default()
        }
    } else {
        let mut opt: Vec<_> = network.options.iter().collect();
        opt.sort_unstable_by_key(|(k, _)| (*k).clone());

        let first_config = network.ipam.as_ref().and_then(|ipam| ipam.configs.first());
        NetworkSection {
            label,
            network_name: network.name.clone(),
            driver: network.driver.clone().filter(|d| d != "bridge").unwrap_or_default(),
            opt: opt.into_iter().map(|(k, v)| format!("{k}={v}")).collect(),
            subnet: first_config.and_then(|c| c.subnet).map(|s| s.to_string()).unwrap_or_default(),
            gateway: first_config.and_then(|c| c.gateway).map(|g| g.to_string()).unwrap_or_default(),
            ip_range: first_config.and_then(|c| c.ip_range).map(|r| r.to_string()).unwrap_or_default(),
        }
    };
    let install = InstallSection::default();

    let rendered = [writer::to_string(unit), writer::to_string(section), writer::to_string(install)]
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| Error::Render {
            service: network.name.clone(),
            source: RenderCause::Writer(e.to_string()),
        })?;

    Ok(artifact(format!("{}.network", network.name), join_unit(rendered), 0o644))
}

/// Renders every artifact for one spec and the per-service combined hash.
pub fn render_spec(spec: &Spec) -> Result<(Vec<Artifact>, ChangeStatus), Error> {
    let mut artifacts = vec![render_container_artifact(spec)?];

    if let Some(build) = render_build_artifact(spec) {
        artifacts.push(build?);
    }
    for volume in &spec.volumes {
        if let Some(rendered) = render_volume_artifact(volume) {
            artifacts.push(rendered?);
        }
    }
    for network in &spec.networks {
        artifacts.push(render_network_artifact(network)?);
    }

    let hashes: Vec<&str> = artifacts.iter().map(|a| a.content_hash.as_str()).collect();
    let combined = combined_hash(hashes);
    let paths = artifacts.iter().map(|a| a.path.clone()).collect();

    Ok((
        artifacts,
        ChangeStatus {
            changed: false,
            artifact_paths: paths,
            combined_hash: combined,
        },
    ))
}

/// Implements [`Renderer`] for the Linux adapter. Carries no state of its
/// own; every call is a pure function of its input specs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxRenderer;

impl Renderer for LinuxRenderer {
    fn name(&self) -> &str {
        "linux"
    }

    fn render(&self, specs: &[Spec]) -> Result<RenderResult, Error> {
        let mut result = RenderResult::default();
        for spec in specs {
            let (artifacts, change_status) = render_spec(spec)?;
            result.artifacts.extend(artifacts);
            result.service_changes.insert(spec.name.clone(), change_status);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::container::{Container, Port, Protocol, RestartPolicy};

    fn web_spec() -> Spec {
        Spec {
            name: "web".to_owned(),
            container: Container {
                source: Source::Image("nginx:latest".to_owned()),
                restart_policy: RestartPolicy::Always,
                ..Container::default()
            },
            ..Spec::default()
        }
    }

    #[test]
    fn s1_minimal_linux_container() {
        let (artifacts, _) = render_spec(&web_spec()).unwrap();
        assert_eq!(artifacts.len(), 1);
        let content = String::from_utf8(artifacts[0].content.clone()).unwrap();
        assert_eq!(artifacts[0].path, "web.container");
        assert!(content.contains("[Unit]"));
        assert!(content.contains("[Container]"));
        assert!(content.contains("Image=nginx:latest"));
        assert!(content.contains("[Service]"));
        assert!(content.contains("Restart=always"));
        assert!(content.contains("TimeoutStartSec=900"));
        assert!(content.contains("[Install]"));
        assert!(content.contains("WantedBy=default.target"));
        assert!(!content.contains("network-online.target"));
    }

    #[test]
    fn s2_ports_force_network_online_and_omit_tcp_suffix() {
        let mut spec = web_spec();
        spec.container.ports.push(Port {
            host_address: None,
            host_port: 8080,
            container_port: 80,
            protocol: Protocol::Tcp,
        });
        let (artifacts, _) = render_spec(&spec).unwrap();
        let content = String::from_utf8(artifacts[0].content.clone()).unwrap();
        assert_eq!(content.matches("After=network-online.target").count(), 1);
        assert_eq!(content.matches("Wants=network-online.target").count(), 1);
        assert!(content.contains("PublishPort=8080:80"));
        assert!(!content.contains("PublishPort=8080:80/tcp"));
    }

    #[test]
    fn dependency_suffix_preservation() {
        assert_eq!(dependency_token("db"), "db.service");
        assert_eq!(dependency_token("cache.volume"), "cache.volume");
    }

    #[test]
    fn optional_external_dep_requires_after_only() {
        let mut spec = web_spec();
        spec.external_deps = vec![crate::domain::ExternalDependency {
            project: "mon".to_owned(),
            service: "prom".to_owned(),
            optional: true,
            exists_in_runtime: true,
        }];
        let unit = unit_section_for_container(&spec);
        assert!(unit.after.contains(&"mon_prom.service".to_owned()));
        assert!(!unit.requires.contains(&"mon_prom.service".to_owned()));
    }

    #[test]
    fn render_determinism_is_byte_identical_across_runs() {
        let spec = web_spec();
        let (first, first_status) = render_spec(&spec).unwrap();
        let (second, second_status) = render_spec(&spec).unwrap();
        assert_eq!(first, second);
        assert_eq!(first_status, second_status);
    }

    #[test]
    fn readonly_volume_mount_preserves_ro_suffix() {
        let mut spec = web_spec();
        spec.container.mounts.push(crate::domain::container::Mount {
            source: "data".to_owned(),
            target: "/var/lib/data".to_owned(),
            kind: MountType::Volume,
            readonly: true,
            ..crate::domain::container::Mount::default()
        });
        let (artifacts, _) = render_spec(&spec).unwrap();
        let content = String::from_utf8(artifacts[0].content.clone()).unwrap();
        assert!(content.contains("Volume=data.volume:/var/lib/data:ro"));
    }

    #[test]
    fn external_volume_produces_no_artifact() {
        let mut spec = web_spec();
        spec.volumes.push(Volume {
            name: "data".to_owned(),
            external: true,
            ..Volume::default()
        });
        let (artifacts, _) = render_spec(&spec).unwrap();
        assert_eq!(artifacts.len(), 1);
    }

    #[test]
    fn external_network_short_circuits_configuration() {
        let mut spec = web_spec();
        spec.networks.push(Network {
            name: "edge".to_owned(),
            external: true,
            driver: Some("macvlan".to_owned()),
            ..Network::default()
        });
        let (artifacts, _) = render_spec(&spec).unwrap();
        let network_artifact = artifacts.iter().find(|a| a.path == "edge.network").unwrap();
        let content = String::from_utf8(network_artifact.content.clone()).unwrap();
        assert!(!content.contains("Driver="));
    }
}
