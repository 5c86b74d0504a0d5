//! Argument-vector construction for the `launchctl` control surface. Command
//! execution itself stays in [`super::lifecycle`], which owns the injected
//! [`crate::runner::ProcessRunner`]; this module only builds argv.

use super::options::MacosOptions;

/// Prefixes the invocation with a privilege-elevation command for system
/// scope. User-scope services never need elevation.
pub fn build(options: &MacosOptions, args: Vec<String>) -> (String, Vec<String>) {
    if options.system_scope {
        let mut elevated = vec!["launchctl".to_owned()];
        elevated.extend(args);
        ("sudo".to_owned(), elevated)
    } else {
        ("launchctl".to_owned(), args)
    }
}

pub fn bootstrap_args(domain_id: &str, plist_path: &str) -> Vec<String> {
    vec!["bootstrap".to_owned(), domain_id.to_owned(), plist_path.to_owned()]
}

pub fn bootout_args(domain_id: &str, label: &str) -> Vec<String> {
    vec!["bootout".to_owned(), format!("{domain_id}/{label}")]
}

pub fn enable_args(domain_id: &str, label: &str) -> Vec<String> {
    vec!["enable".to_owned(), format!("{domain_id}/{label}")]
}

pub fn kickstart_args(domain_id: &str, label: &str, hard_restart: bool) -> Vec<String> {
    let mut args = vec!["kickstart".to_owned()];
    if hard_restart {
        args.push("-k".to_owned());
    }
    args.push(format!("{domain_id}/{label}"));
    args
}

pub fn print_service_args(domain_id: &str, label: &str) -> Vec<String> {
    vec!["print".to_owned(), format!("{domain_id}/{label}")]
}

pub fn print_domain_args(domain_id: &str) -> Vec<String> {
    vec!["print".to_owned(), domain_id.to_owned()]
}

pub fn legacy_load_args(plist_path: &str) -> Vec<String> {
    vec!["load".to_owned(), "-w".to_owned(), plist_path.to_owned()]
}

pub fn legacy_unload_args(plist_path: &str) -> Vec<String> {
    vec!["unload".to_owned(), "-w".to_owned(), plist_path.to_owned()]
}

pub fn legacy_start_args(label: &str) -> Vec<String> {
    vec!["start".to_owned(), label.to_owned()]
}

pub fn legacy_stop_args(label: &str) -> Vec<String> {
    vec!["stop".to_owned(), label.to_owned()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_options() -> MacosOptions {
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
    fn user_scope_runs_launchctl_directly() {
        let (command, args) = build(&user_options(), bootstrap_args("gui/501", "/tmp/x.plist"));
        assert_eq!(command, "launchctl");
        assert_eq!(args, vec!["bootstrap", "gui/501", "/tmp/x.plist"]);
    }

    #[test]
    fn system_scope_elevates_with_sudo() {
        let mut options = user_options();
        options.system_scope = true;
        let (command, args) = build(&options, bootout_args("system", "com.example.svcplane.web"));
        assert_eq!(command, "sudo");
        assert_eq!(args, vec!["launchctl", "bootout", "system/com.example.svcplane.web"]);
    }

    #[test]
    fn kickstart_hard_restart_includes_k_flag() {
        let args = kickstart_args("gui/501", "com.example.svcplane.web", true);
        assert_eq!(args, vec!["kickstart", "-k", "gui/501/com.example.svcplane.web"]);
    }
}
