use serde::Serialize;
use smart_default::SmartDefault;

/// The `[Build]` section, emitted only when a container has an embedded
/// build.
#[derive(Debug, Clone, SmartDefault, Serialize)]
#[serde(rename = "Build", rename_all = "PascalCase")]
pub struct BuildSection {
    pub working_directory: String,
    pub file: String,
    pub image_tag: Vec<String>,
    pub environment: Vec<String>,
    pub podman_args: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linux::writer;

    #[test]
    fn tags_are_emitted_in_given_order() {
        let section = BuildSection {
            working_directory: "/srv/app".to_owned(),
            image_tag: vec!["app:latest".to_owned(), "app:1.0".to_owned()],
            ..BuildSection::default()
        };
        let rendered = writer::to_string(section).unwrap();
        assert_eq!(rendered, "[Build]\nWorkingDirectory=/srv/app\nImageTag=app:latest\nImageTag=app:1.0\n");
    }
}
