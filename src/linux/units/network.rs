use serde::Serialize;
use smart_default::SmartDefault;

/// The `[Network]` section. For an `external` network the renderer emits
/// only `label`/`network_name`, leaving every other field at its default
/// (and thus unwritten).
#[derive(Debug, Clone, SmartDefault, Serialize)]
#[serde(rename = "Network", rename_all = "PascalCase")]
pub struct NetworkSection {
    pub label: Vec<String>,
    pub network_name: String,
    pub driver: String,
    pub opt: Vec<String>,
    pub subnet: String,
    pub gateway: String,
    pub ip_range: String,
}
