use std::collections::HashSet;

use indexmap::IndexMap;

use super::container::{Container, ExternalDependency, Source};
use super::network::Network;
use super::validate::{is_valid_name, Collector, ValidationError};
use super::volume::Volume;

/// A platform-agnostic description of one containerized service, plus the
/// named resources and dependency edges it needs. This is the sole input to
/// both adapters' render passes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Spec {
    pub name: String,
    pub description: Option<String>,
    pub container: Container,
    pub volumes: Vec<Volume>,
    pub networks: Vec<Network>,
    /// Intra-project dependency names; each must name another `Spec` in the
    /// same project, never itself.
    pub depends_on: Vec<String>,
    pub external_deps: Vec<ExternalDependency>,
    /// Unordered; sorted by key at render time.
    pub annotations: IndexMap<String, String>,
}

impl Spec {
    /// Validates every structural constraint on this spec and its nested
    /// resources, collecting every failure rather than stopping at the
    /// first. Returns `Ok(())` only if nothing was found wrong.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Collector::default();
        self.collect_errors(&mut errors);
        errors.into_result()
    }

    fn collect_errors(&self, errors: &mut super::validate::Collector) {
        if self.name.is_empty() {
            errors.push("Name", "must not be empty");
        } else if !is_valid_name(&self.name) {
            errors.push("Name", format!("{:?} is not a legal resource name", self.name));
        }

        match &self.container.source {
            Source::Image(image) if image.is_empty() => {
                errors.push("Container.Image", "must not be empty when set");
            }
            Source::Build(build) if build.context.as_os_str().is_empty() => {
                errors.push("Container.Build.Context", "must not be empty");
            }
            Source::Image(_) | Source::Build(_) => {}
        }

        if self.container.network_mode.is_host_equivalent() && !self.container.network_mode.networks.is_empty() {
            errors.push(
                "Container.NetworkMode.Networks",
                "must be empty when the network mode is host-equivalent",
            );
        }

        if let Some(healthcheck) = &self.container.healthcheck {
            if healthcheck.test.is_empty() {
                errors.push("Container.Healthcheck.Test", "must not be empty when a healthcheck is set");
            }
        }

        let mut seen_ports = HashSet::new();
        for (index, port) in self.container.ports.iter().enumerate() {
            let key = (port.host_address.clone(), port.host_port, port.protocol);
            if !seen_ports.insert(key) {
                errors.push(
                    format!("Container.Ports[{index}]"),
                    format!("duplicate host binding {}:{}/{}", port.host_address.as_deref().unwrap_or("*"), port.host_port, port.protocol.as_str()),
                );
            }
        }

        let mut seen_targets = HashSet::new();
        for (index, mount) in self.container.mounts.iter().enumerate() {
            if mount.source.is_empty() {
                errors.push(format!("Container.Mounts[{index}].Source"), "must not be empty");
            }
            if mount.target.is_empty() {
                errors.push(format!("Container.Mounts[{index}].Target"), "must not be empty");
            } else if !seen_targets.insert(mount.target.clone()) {
                errors.push(format!("Container.Mounts[{index}].Target"), format!("duplicate mount target {:?}", mount.target));
            }
        }

        for (index, secret) in self.container.secrets.iter().enumerate() {
            if secret.source.is_empty() {
                errors.push(format!("Container.Secrets[{index}].Source"), "must not be empty");
            }
        }

        let mut seen_volumes = HashSet::new();
        for (index, volume) in self.volumes.iter().enumerate() {
            if !is_valid_name(&volume.name) {
                errors.push(format!("Volumes[{index}].Name"), format!("{:?} is not a legal resource name", volume.name));
            } else if !seen_volumes.insert(volume.name.clone()) {
                errors.push(format!("Volumes[{index}].Name"), format!("duplicate volume name {:?}", volume.name));
            }
        }

        let mut seen_networks = HashSet::new();
        for (index, network) in self.networks.iter().enumerate() {
            if !is_valid_name(&network.name) {
                errors.push(format!("Networks[{index}].Name"), format!("{:?} is not a legal resource name", network.name));
            } else if !seen_networks.insert(network.name.clone()) {
                errors.push(format!("Networks[{index}].Name"), format!("duplicate network name {:?}", network.name));
            }
        }

        for network_name in &self.container.network_mode.networks {
            if !seen_networks.contains(network_name) {
                errors.push(
                    "Container.NetworkMode.Networks",
                    format!("references undeclared network {network_name:?}"),
                );
            }
        }

        for (index, dep) in self.depends_on.iter().enumerate() {
            if dep == &self.name {
                errors.push(format!("DependsOn[{index}]"), "a spec must not depend on itself");
            }
        }

        for (index, dep) in self.external_deps.iter().enumerate() {
            if dep.project.is_empty() {
                errors.push(format!("ExternalDeps[{index}].Project"), "must not be empty");
            }
            if dep.service.is_empty() {
                errors.push(format!("ExternalDeps[{index}].Service"), "must not be empty");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::container::{Port, Protocol};

    fn valid_spec() -> Spec {
        Spec {
            name: "web".to_owned(),
            container: Container {
                source: Source::Image("nginx:latest".to_owned()),
                ..Container::default()
            },
            ..Spec::default()
        }
    }

    #[test]
    fn minimal_valid_spec_passes() {
        assert!(valid_spec().validate().is_ok());
    }

    #[test]
    fn empty_name_is_rejected() {
        let mut spec = valid_spec();
        spec.name = String::new();
        let err = spec.validate().unwrap_err();
        assert!(err.errors.iter().any(|e| e.path == "Name"));
    }

    #[test]
    fn duplicate_port_bindings_are_all_reported() {
        let mut spec = valid_spec();
        let port = Port {
            host_address: None,
            host_port: 8080,
            container_port: 80,
            protocol: Protocol::Tcp,
        };
        spec.container.ports = vec![port.clone(), port];
        let err = spec.validate().unwrap_err();
        assert_eq!(err.errors.len(), 1);
    }

    #[test]
    fn host_network_mode_rejects_per_service_networks() {
        let mut spec = valid_spec();
        spec.container.network_mode.mode = "host".to_owned();
        spec.container.network_mode.networks = vec!["extra".to_owned()];
        let err = spec.validate().unwrap_err();
        assert!(err.errors.iter().any(|e| e.path == "Container.NetworkMode.Networks"));
    }

    #[test]
    fn self_dependency_is_rejected() {
        let mut spec = valid_spec();
        spec.depends_on = vec!["web".to_owned()];
        let err = spec.validate().unwrap_err();
        assert!(err.errors.iter().any(|e| e.path == "DependsOn[0]"));
    }

    #[test]
    fn multiple_problems_are_all_collected_together() {
        let mut spec = valid_spec();
        spec.name = String::new();
        spec.depends_on = vec![String::new()];
        spec.container.healthcheck = Some(super::super::container::Healthcheck::default());
        let err = spec.validate().unwrap_err();
        assert!(err.errors.len() >= 2);
    }
}
