use serde::Serialize;
use smart_default::SmartDefault;

/// The `[Volume]` section.
#[derive(Debug, Clone, SmartDefault, Serialize)]
#[serde(rename = "Volume", rename_all = "PascalCase")]
pub struct VolumeSection {
    pub label: Vec<String>,
    pub volume_name: String,
    pub driver: String,
    pub opt: Vec<String>,
}
