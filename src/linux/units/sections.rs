//! The `[Unit]`, `[Service]`, and `[Install]` sections shared by all four
//! unit classes.

use serde::Serialize;
use smart_default::SmartDefault;

#[derive(Debug, Clone, SmartDefault, Serialize)]
#[serde(rename = "Unit", rename_all = "PascalCase")]
pub struct UnitSection {
    pub description: String,
    pub after: Vec<String>,
    pub wants: Vec<String>,
    pub requires: Vec<String>,
    pub requires_mounts_for: Vec<String>,
}

#[derive(Debug, Clone, SmartDefault, Serialize)]
#[serde(rename = "Service", rename_all = "PascalCase")]
pub struct ServiceSection {
    pub restart: String,
    #[default(900)]
    pub timeout_start_sec: u32,
    pub stop_timeout_sec: u32,
    #[serde(rename = "Type")]
    pub unit_type: String,
    pub remain_after_exit: bool,
}

#[derive(Debug, Clone, SmartDefault, Serialize)]
#[serde(rename = "Install", rename_all = "PascalCase")]
pub struct InstallSection {
    #[default(String::from("default.target"))]
    pub wanted_by: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linux::writer;

    #[test]
    fn install_section_defaults_to_default_target() {
        let section = InstallSection::default();
        assert_eq!(writer::to_string(section).unwrap(), "[Install]\nWantedBy=default.target\n");
    }
}
