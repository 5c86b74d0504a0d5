use serde::Serialize;
use smart_default::SmartDefault;

/// The `[Container]` section. Field declaration order is emission order;
/// see the module-level renderer for how a [`crate::domain::Container`] is
/// translated into one of these.
#[derive(Debug, Clone, SmartDefault, Serialize)]
#[serde(rename = "Container", rename_all = "PascalCase")]
pub struct ContainerSection {
    pub label: Vec<String>,
    pub image: String,
    pub container_name: String,
    pub host_name: String,

    pub environment: Vec<String>,
    pub environment_file: Vec<String>,

    pub publish_port: Vec<String>,
    pub volume: Vec<String>,

    pub network: Vec<String>,
    pub network_alias: Vec<String>,

    pub dns: Vec<String>,
    pub dns_search: Vec<String>,
    pub dns_option: Vec<String>,

    pub add_device: Vec<String>,

    pub entrypoint: String,
    pub exec: String,
    pub user: String,
    pub group: String,
    pub working_dir: String,
    pub init: bool,
    pub user_ns: String,

    pub health_cmd: String,
    pub health_interval: String,
    pub health_timeout: String,
    pub health_retries: u32,
    pub health_start_period: String,
    pub health_startup_interval: String,

    pub memory: u64,
    pub shm_size: u64,

    pub add_capability: Vec<String>,
    pub drop_capability: Vec<String>,
    pub read_only: bool,
    pub security_label_type: String,
    pub security_label_level: String,

    pub log_driver: String,
    pub log_opt: Vec<String>,

    pub secret: Vec<String>,

    pub podman_args: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linux::writer;

    #[test]
    fn minimal_section_emits_only_image() {
        let section = ContainerSection {
            image: "nginx:latest".to_owned(),
            ..ContainerSection::default()
        };
        assert_eq!(writer::to_string(section).unwrap(), "[Container]\nImage=nginx:latest\n");
    }
}
