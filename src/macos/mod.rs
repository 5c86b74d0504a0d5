//! launchd property-list renderer and `launchctl` lifecycle driver.

mod launchctl;
mod lifecycle;
mod options;
mod plist;

pub use lifecycle::MacosLifecycle;
pub use options::MacosOptions;

use crate::contracts::{ChangeStatus, RenderResult, Renderer};
use crate::domain::Spec;
use crate::error::Error;
use crate::hash::combined_hash;

/// Renders each spec's plist independently; per-service artifacts never
/// interact, so there is nothing analogous to the Linux renderer's
/// build/volume/network fan-out.
pub struct MacosRenderer {
    options: MacosOptions,
}

impl MacosRenderer {
    pub fn new(options: MacosOptions) -> Self {
        Self { options }
    }
}

impl Renderer for MacosRenderer {
    fn name(&self) -> &str {
        "macos"
    }

    fn render(&self, specs: &[Spec]) -> Result<RenderResult, Error> {
        let mut result = RenderResult::default();

        for spec in specs {
            let artifact = plist::render_plist(spec, &self.options);
            let status = ChangeStatus {
                changed: false,
                artifact_paths: vec![artifact.path.clone()],
                combined_hash: combined_hash([artifact.content_hash.as_str()]),
            };
            result.service_changes.insert(spec.name.clone(), status);
            result.artifacts.push(artifact);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::container::{Container, Source};

    fn options() -> MacosOptions {
        MacosOptions {
            prefix: "com.example.svcplane".to_owned(),
            podman_path: "/opt/homebrew/bin/podman".to_owned(),
            logs_dir: std::path::PathBuf::from("/tmp/logs"),
            plist_dir: std::path::PathBuf::from("/tmp/plists"),
            system_scope: false,
            uid: Some(501),
        }
    }

    #[test]
    fn render_emits_one_plist_artifact_per_spec() {
        let spec = Spec {
            name: "app".to_owned(),
            container: Container {
                source: Source::Image("nginx:latest".to_owned()),
                ..Container::default()
            },
            ..Spec::default()
        };

        let result = MacosRenderer::new(options()).render(std::slice::from_ref(&spec)).unwrap();
        assert_eq!(result.artifacts.len(), 1);
        assert_eq!(result.artifacts[0].path, "com.example.svcplane.app.plist");
        assert!(result.service_changes.contains_key("app"));
    }
}
