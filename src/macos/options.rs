//! Per-platform configuration the macOS renderer and lifecycle need beyond
//! what a [`crate::domain::Spec`] carries: the launchd label prefix, the
//! resolved container-runtime binary, log/plist placement, and the
//! daemon-vs-agent scope.

use std::env;
use std::path::{Path, PathBuf};

use crate::domain::validate::{FieldError, ValidationError};

/// Common package-manager install locations checked after `$PATH` comes up
/// empty.
const FALLBACK_PODMAN_LOCATIONS: &[&str] = &["/opt/homebrew/bin/podman", "/usr/local/bin/podman", "/opt/local/bin/podman"];

/// Constructor-validated options for the macOS adapter. There is no shared
/// base type with the Linux side; each platform's options stay narrow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacosOptions {
    /// Reverse-DNS style label prefix, e.g. `"com.example.svcplane"`.
    pub prefix: String,
    /// Absolute path to the `podman` binary. Left empty to have
    /// [`Self::resolve`] search `$PATH`.
    pub podman_path: String,
    pub logs_dir: PathBuf,
    pub plist_dir: PathBuf,
    /// `true` for a system-wide `LaunchDaemon`, `false` for a per-user
    /// `LaunchAgent`.
    pub system_scope: bool,
    /// Required when `system_scope` is `false`; used to build `gui/<uid>`.
    pub uid: Option<u32>,
}

impl MacosOptions {
    /// Fills in whichever fields the caller left unset with platform
    /// defaults, then validates the result.
    pub fn resolve(mut self) -> Result<Self, ValidationError> {
        if self.podman_path.is_empty() {
            self.podman_path = resolve_podman_path().ok_or_else(|| {
                single("Options.PodmanPath", "could not find a `podman` binary on PATH or in common install locations")
            })?;
        }
        if self.plist_dir.as_os_str().is_empty() {
            self.plist_dir = default_plist_dir(self.system_scope);
        }
        if self.logs_dir.as_os_str().is_empty() {
            self.logs_dir = default_logs_dir(self.system_scope, &self.prefix);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.prefix.is_empty() {
            return Err(single("Options.Prefix", "must not be empty"));
        }
        if !self.system_scope && self.uid.is_none() {
            return Err(single("Options.Uid", "required in user scope to build the gui/<uid> domain id"));
        }
        Ok(())
    }

    /// The launchd scope identifier: `system`, or `gui/<uid>`.
    pub fn domain_id(&self) -> String {
        if self.system_scope {
            "system".to_owned()
        } else {
            format!("gui/{}", self.uid.unwrap_or_default())
        }
    }
}

fn single(path: &str, message: &str) -> ValidationError {
    ValidationError {
        errors: vec![FieldError {
            path: path.to_owned(),
            message: message.to_owned(),
        }],
    }
}

fn resolve_podman_path() -> Option<String> {
    if let Some(path_var) = env::var_os("PATH") {
        for dir in env::split_paths(&path_var) {
            let candidate = dir.join("podman");
            if candidate.is_file() {
                return Some(candidate.display().to_string());
            }
        }
    }
    FALLBACK_PODMAN_LOCATIONS.iter().map(Path::new).find(|path| path.is_file()).map(|path| path.display().to_string())
}

fn home_dir() -> PathBuf {
    env::var_os("HOME").map_or_else(|| PathBuf::from("/"), PathBuf::from)
}

fn default_plist_dir(system_scope: bool) -> PathBuf {
    if system_scope {
        PathBuf::from("/Library/LaunchDaemons")
    } else {
        home_dir().join("Library/LaunchAgents")
    }
}

fn default_logs_dir(system_scope: bool, app: &str) -> PathBuf {
    if system_scope {
        PathBuf::from("/var/log").join(app)
    } else {
        home_dir().join("Library/Logs").join(app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> MacosOptions {
        MacosOptions {
            prefix: "com.example.svcplane".to_owned(),
            podman_path: "/opt/homebrew/bin/podman".to_owned(),
            logs_dir: PathBuf::new(),
            plist_dir: PathBuf::new(),
            system_scope: false,
            uid: Some(501),
        }
    }

    #[test]
    fn user_scope_domain_id() {
        assert_eq!(base().domain_id(), "gui/501");
    }

    #[test]
    fn system_scope_domain_id() {
        let mut options = base();
        options.system_scope = true;
        options.uid = None;
        assert_eq!(options.domain_id(), "system");
    }

    #[test]
    fn user_scope_without_uid_fails_validation() {
        let mut options = base();
        options.uid = None;
        assert!(options.validate().is_err());
    }

    #[test]
    fn empty_prefix_fails_validation() {
        let mut options = base();
        options.prefix = String::new();
        assert!(options.validate().is_err());
    }

    #[test]
    fn resolve_fills_in_default_directories() {
        let options = base().resolve().unwrap();
        assert!(options.plist_dir.ends_with("Library/LaunchAgents"));
        assert!(options.logs_dir.ends_with("com.example.svcplane"));
    }
}
