//! The two argument-builder entry points described for the container
//! runtime: a complete `run` invocation for a managed foreground process,
//! and the residue of flags the Linux renderer's native DSL cannot express.

use crate::domain::container::{Container, MountType, Source};

fn push_flag(args: &mut Vec<String>, flag: &str, value: impl Into<String>) {
    args.push(flag.to_owned());
    args.push(value.into());
}

fn push_bare(args: &mut Vec<String>, flag: &str) {
    args.push(flag.to_owned());
}

fn push_sorted_pairs<'a>(args: &mut Vec<String>, flag: &str, pairs: impl Iterator<Item = (&'a str, &'a str)>) {
    let mut sorted: Vec<_> = pairs.collect();
    sorted.sort_unstable_by_key(|(key, _)| *key);
    for (key, value) in sorted {
        push_flag(args, flag, format!("{key}={value}"));
    }
}

fn push_sorted_values<'a>(args: &mut Vec<String>, flag: &str, values: impl Iterator<Item = &'a String>) {
    let mut sorted: Vec<_> = values.collect();
    sorted.sort_unstable();
    for value in sorted {
        push_flag(args, flag, value.clone());
    }
}

fn mount_token(mount: &crate::domain::container::Mount) -> String {
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
        format!("{}:{}", mount.source, mount.target)
    } else {
        format!("{}:{}:{}", mount.source, mount.target, options.join(","))
    }
}

fn tmpfs_mount_token(mount: &crate::domain::container::Mount) -> String {
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

fn push_common_flags(args: &mut Vec<String>, container: &Container) {
    push_sorted_pairs(args, "--env", container.environment.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    for file in &container.env_files {
        push_flag(args, "--env-file", file.display().to_string());
    }

    for port in &container.ports {
        let address = port.host_address.as_deref().map_or_else(String::new, |a| format!("{a}:"));
        push_flag(
            args,
            "--publish",
            format!("{address}{}:{}/{}", port.host_port, port.container_port, port.protocol.as_str()),
        );
    }

    for mount in &container.mounts {
        match mount.kind {
            MountType::Bind | MountType::Volume => push_flag(args, "--volume", mount_token(mount)),
            MountType::Tmpfs => push_flag(args, "--tmpfs", tmpfs_mount_token(mount)),
        }
    }

    for secret in &container.secrets {
        use crate::domain::container::SecretKind;
        let value = match (&secret.kind, &secret.target) {
            (SecretKind::Env, Some(target)) => format!("{},type=env,target={target}", secret.source),
            (SecretKind::Env, None) => format!("{},type=env", secret.source),
            (SecretKind::Mount, Some(target)) => format!("{},target={target}", secret.source),
            (SecretKind::Mount, None) => secret.source.clone(),
        };
        push_flag(args, "--secret", value);
    }

    if let Some(healthcheck) = &container.healthcheck {
        if !healthcheck.test.is_empty() {
            push_flag(args, "--health-cmd", healthcheck.test.join(" "));
        }
        if let Some(interval) = &healthcheck.interval {
            push_flag(args, "--health-interval", interval.clone());
        }
        if let Some(timeout) = &healthcheck.timeout {
            push_flag(args, "--health-timeout", timeout.clone());
        }
        if healthcheck.retries > 0 {
            push_flag(args, "--health-retries", healthcheck.retries.to_string());
        }
        if let Some(start_period) = &healthcheck.start_period {
            push_flag(args, "--health-start-period", start_period.clone());
        }
        if let Some(start_interval) = &healthcheck.start_interval {
            push_flag(args, "--health-start-interval", start_interval.clone());
        }
    }

    push_sorted_values(args, "--cap-add", container.security.cap_add.iter());
    push_sorted_values(args, "--cap-drop", container.security.cap_drop.iter());
    if let Some(label) = &container.security.selinux_label {
        push_flag(args, "--security-opt", format!("label={label}"));
    }
    for group in &container.security.group_add {
        push_flag(args, "--group-add", group.clone());
    }

    if let Some(driver) = &container.logging.driver {
        push_flag(args, "--log-driver", driver.clone());
    }
    push_sorted_pairs(args, "--log-opt", container.logging.options.iter().map(|(k, v)| (k.as_str(), v.as_str())));

    if !container.network_mode.mode.is_empty() {
        push_flag(args, "--network", container.network_mode.mode.clone());
    }
    let mut networks: Vec<_> = container.network_mode.networks.iter().collect();
    networks.sort_unstable();
    for network in networks {
        push_flag(args, "--network", network.clone());
    }
    for alias in &container.network_mode.aliases {
        push_flag(args, "--network-alias", alias.clone());
    }

    let mut dns: Vec<_> = container.dns_servers.iter().map(ToString::to_string).collect();
    dns.sort_unstable();
    for server in dns {
        push_flag(args, "--dns", server);
    }
    push_sorted_values(args, "--dns-search", container.dns_search.iter());
    push_sorted_values(args, "--dns-option", container.dns_options.iter());

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
        push_flag(args, "--device", token);
    }
    for rule in &container.device_cgroup_rules {
        push_flag(args, "--device-cgroup-rule", rule.clone());
    }

    let mut hosts: Vec<_> = container.extra_hosts.iter().collect();
    hosts.sort_unstable_by_key(|(host, _)| (*host).clone());
    for (host, ip) in hosts {
        push_flag(args, "--add-host", format!("{host}:{ip}"));
    }

    if let Some(user_ns) = &container.user_ns {
        push_flag(args, "--userns", user_ns.clone());
    }
    if let Some(pid_ns) = &container.pid_ns {
        push_flag(args, "--pid", pid_ns.clone());
    }
    if let Some(ipc_ns) = &container.ipc_ns {
        push_flag(args, "--ipc", ipc_ns.clone());
    }
    if let Some(cgroup_ns) = &container.cgroup_ns {
        push_flag(args, "--cgroupns", cgroup_ns.clone());
    }

    if let Some(signal) = &container.stop_signal {
        push_flag(args, "--stop-signal", signal.clone());
    }
    if let Some(grace) = container.stop_grace_period_secs {
        push_flag(args, "--stop-timeout", grace.to_string());
    }

    if container.init {
        push_bare(args, "--init");
    }
    if container.read_only_rootfs {
        push_bare(args, "--read-only");
    }

    if let Some(hostname) = &container.hostname {
        push_flag(args, "--hostname", hostname.clone());
    }
    match (&container.user, &container.group) {
        (Some(user), Some(group)) => push_flag(args, "--user", format!("{user}:{group}")),
        (Some(user), None) => push_flag(args, "--user", user.clone()),
        (None, _) => {}
    }
    if let Some(working_dir) = &container.working_dir {
        push_flag(args, "--workdir", working_dir.display().to_string());
    }

    for ulimit in &container.ulimits {
        push_flag(args, "--ulimit", ulimit.clone());
    }
    for tmpfs in &container.tmpfs {
        push_flag(args, "--tmpfs", tmpfs.clone());
    }
}

/// The complete `run --rm --name <id> …` argument vector for a managed
/// foreground process (no detach). Consumed by the macOS renderer, whose
/// launchd plist has no native equivalent of any container-runtime flag.
pub fn full_run(name: &str, container: &Container) -> Vec<String> {
    let mut args = vec!["run".to_owned(), "--rm".to_owned()];
    let container_name = container.container_name.clone().unwrap_or_else(|| name.to_owned());
    push_flag(&mut args, "--name", container_name);

    push_common_flags(&mut args, container);

    if let Some(memory) = container.resources.memory {
        push_flag(&mut args, "--memory", memory.to_string());
    }
    if let Some(shm_size) = container.resources.shm_size {
        push_flag(&mut args, "--shm-size", shm_size.to_string());
    }
    push_resource_residue(&mut args, container);

    if let Some(entrypoint) = &container.entrypoint {
        push_flag(&mut args, "--entrypoint", entrypoint.clone());
    }

    for extra in &container.podman_args {
        args.push(extra.clone());
    }

    if let Some(image) = container.source.image_ref() {
        args.push(image.to_owned());
    }
    if let Some(command) = &container.command {
        args.push(command.clone());
    }
    args.extend(container.args.iter().cloned());

    args
}

fn push_resource_residue(args: &mut Vec<String>, container: &Container) {
    if let Some(reservation) = container.resources.memory_reservation {
        push_flag(args, "--memory-reservation", reservation.to_string());
    }
    if let Some(swap) = container.resources.memory_swap {
        push_flag(args, "--memory-swap", swap.to_string());
    }
    if let Some(shares) = container.resources.cpu_shares {
        push_flag(args, "--cpu-shares", shares.to_string());
    }
    if let Some(quota) = container.resources.cpu_quota {
        push_flag(args, "--cpu-quota", quota.to_string());
    }
    if let Some(period) = container.resources.cpu_period {
        push_flag(args, "--cpu-period", period.to_string());
    }
}

/// The flags the Linux supervisor's native DSL cannot express: residue
/// CPU/memory knobs plus the caller's free-form passthrough args. Consumed
/// by the Linux renderer's `PodmanArgs=` line.
pub fn native_residue(container: &Container) -> Vec<String> {
    let mut args = Vec::new();
    push_resource_residue(&mut args, container);
    args.extend(container.podman_args.iter().cloned());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::container::{Protocol, Resources};
    use indexmap::IndexMap;

    fn base_container() -> Container {
        Container {
            source: Source::Image("nginx:latest".to_owned()),
            ..Container::default()
        }
    }

    #[test]
    fn full_run_starts_with_run_rm_name() {
        let argv = full_run("web", &base_container());
        assert_eq!(&argv[..4], &["run", "--rm", "--name", "web"]);
    }

    #[test]
    fn full_run_appends_image_last() {
        let argv = full_run("web", &base_container());
        assert_eq!(argv.last().map(String::as_str), Some("nginx:latest"));
    }

    #[test]
    fn environment_is_sorted_regardless_of_insertion_order() {
        let mut first = IndexMap::new();
        first.insert("B".to_owned(), "2".to_owned());
        first.insert("A".to_owned(), "1".to_owned());

        let mut second = IndexMap::new();
        second.insert("A".to_owned(), "1".to_owned());
        second.insert("B".to_owned(), "2".to_owned());

        let mut one = base_container();
        one.environment = first;
        let mut two = base_container();
        two.environment = second;

        assert_eq!(full_run("web", &one), full_run("web", &two));
    }

    #[test]
    fn port_protocol_suffix_always_present_in_full_run() {
        let mut container = base_container();
        container.ports.push(crate::domain::container::Port {
            host_address: None,
            host_port: 8080,
            container_port: 80,
            protocol: Protocol::Tcp,
        });
        let argv = full_run("web", &container);
        let index = argv.iter().position(|a| a == "--publish").unwrap();
        assert_eq!(argv[index + 1], "8080:80/tcp");
    }

    #[test]
    fn native_residue_excludes_native_memory_and_shm() {
        let mut container = base_container();
        container.resources = Resources {
            memory: Some(512),
            shm_size: Some(64),
            memory_reservation: Some(256),
            ..Resources::default()
        };
        let residue = native_residue(&container);
        assert!(residue.contains(&"--memory-reservation".to_owned()));
        assert!(!residue.contains(&"--memory".to_owned()));
        assert!(!residue.contains(&"--shm-size".to_owned()));
    }

    #[test]
    fn native_residue_preserves_podman_args_order() {
        let mut container = base_container();
        container.podman_args = vec!["--foo".to_owned(), "--bar".to_owned()];
        let residue = native_residue(&container);
        assert_eq!(residue, vec!["--foo".to_owned(), "--bar".to_owned()]);
    }
}
