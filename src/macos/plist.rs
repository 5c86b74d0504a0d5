//! Hand-written XML property-list emitter. launchd's configuration domain
//! is tiny — scalars, arrays of strings, a string map, and one
//! boolean-or-dict key — so a fixed key order and a few escaping helpers
//! are simpler and more deterministic than a general plist encoder.

use crate::contracts::Artifact;
use crate::domain::container::RestartPolicy;
use crate::domain::validate::sanitize_name;
use crate::domain::Spec;
use crate::hash::content_hash;

use super::options::MacosOptions;

const HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n\
<plist version=\"1.0\">\n";

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

fn indent(level: usize) -> String {
    "    ".repeat(level)
}

fn string_entry(level: usize, key: &str, value: &str) -> String {
    format!("{i}<key>{k}</key>\n{i}<string>{v}</string>\n", i = indent(level), k = escape(key), v = escape(value))
}

fn bool_entry(level: usize, key: &str, value: bool) -> String {
    format!("{i}<key>{k}</key>\n{i}<{tag}/>\n", i = indent(level), k = escape(key), tag = if value { "true" } else { "false" })
}

fn integer_entry(level: usize, key: &str, value: i64) -> String {
    format!("{i}<key>{k}</key>\n{i}<integer>{value}</integer>\n", i = indent(level), k = escape(key))
}

fn string_array_entry(level: usize, key: &str, values: &[String]) -> Option<String> {
    if values.is_empty() {
        return None;
    }
    let mut out = format!("{i}<key>{k}</key>\n{i}<array>\n", i = indent(level), k = escape(key));
    for value in values {
        out.push_str(&format!("{}<string>{}</string>\n", indent(level + 1), escape(value)));
    }
    out.push_str(&format!("{}</array>\n", indent(level)));
    Some(out)
}

fn string_dict_entry(level: usize, key: &str, pairs: &[(String, String)]) -> Option<String> {
    if pairs.is_empty() {
        return None;
    }
    let mut out = format!("{i}<key>{k}</key>\n{i}<dict>\n", i = indent(level), k = escape(key));
    for (pair_key, pair_value) in pairs {
        out.push_str(&string_entry(level + 1, pair_key, pair_value));
    }
    out.push_str(&format!("{}</dict>\n", indent(level)));
    Some(out)
}

/// `no` -> `false`; `always`/`unless-stopped` -> `true`; `on-failure` ->
/// `{SuccessfulExit: false}` (restart only on non-zero exit). See spec.md
/// section 9's open question on the analogous Linux mapping: the platform
/// has no direct equivalent of `unless-stopped`, so it folds into `always`
/// here just as it does on the Linux side.
fn keep_alive_entry(level: usize, policy: RestartPolicy) -> String {
    match policy {
        RestartPolicy::No => bool_entry(level, "KeepAlive", false),
        RestartPolicy::Always | RestartPolicy::UnlessStopped => bool_entry(level, "KeepAlive", true),
        RestartPolicy::OnFailure => {
            let mut out = format!("{i}<key>KeepAlive</key>\n{i}<dict>\n", i = indent(level));
            out.push_str(&bool_entry(level + 1, "SuccessfulExit", false));
            out.push_str(&format!("{}</dict>\n", indent(level)));
            out
        }
    }
}

/// `<prefix>.<name>`, both run through the same sanitizer used for
/// resource names elsewhere in the domain.
pub fn sanitized_label(options: &MacosOptions, name: &str) -> String {
    format!("{}.{}", options.prefix, sanitize_name(name))
}

fn depends_on(options: &MacosOptions, spec: &Spec) -> Vec<String> {
    let mut labels: Vec<String> = spec.depends_on.iter().map(|dep| sanitized_label(options, dep)).collect();

    for dep in &spec.external_deps {
        if dep.optional && !dep.exists_in_runtime {
            continue;
        }
        labels.push(format!("{}.{}.{}", options.prefix, sanitize_name(&dep.project), sanitize_name(&dep.service)));
    }

    labels.sort();
    labels.dedup();
    labels
}

/// Renders the one `<label>.plist` artifact for `spec`.
pub fn render_plist(spec: &Spec, options: &MacosOptions) -> Artifact {
    let label = sanitized_label(options, &spec.name);
    let mut body = String::new();

    body.push_str(&string_entry(1, "Label", &label));

    let mut argv = vec![options.podman_path.clone()];
    argv.extend(crate::argv::full_run(&spec.name, &spec.container));
    if let Some(entry) = string_array_entry(1, "ProgramArguments", &argv) {
        body.push_str(&entry);
    }

    let mut env_pairs: Vec<(String, String)> = spec.container.environment.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    env_pairs.sort_by(|(a, _), (b, _)| a.cmp(b));
    if let Some(entry) = string_dict_entry(1, "EnvironmentVariables", &env_pairs) {
        body.push_str(&entry);
    }

    if let Some(working_dir) = &spec.container.working_dir {
        body.push_str(&string_entry(1, "WorkingDirectory", &working_dir.display().to_string()));
    }
    if options.system_scope {
        if let Some(user) = &spec.container.user {
            body.push_str(&string_entry(1, "UserName", user));
        }
        if let Some(group) = &spec.container.group {
            body.push_str(&string_entry(1, "GroupName", group));
        }
    }

    body.push_str(&bool_entry(1, "RunAtLoad", true));
    body.push_str(&keep_alive_entry(1, spec.container.restart_policy));

    body.push_str(&string_entry(1, "StandardOutPath", &format!("{}/{label}.out.log", options.logs_dir.display())));
    body.push_str(&string_entry(1, "StandardErrorPath", &format!("{}/{label}.err.log", options.logs_dir.display())));

    body.push_str(&integer_entry(1, "ThrottleInterval", 30));
    body.push_str(&bool_entry(1, "AbandonProcessGroup", false));
    body.push_str(&string_entry(1, "ProcessType", "Background"));

    if let Some(entry) = string_array_entry(1, "DependsOn", &depends_on(options, spec)) {
        body.push_str(&entry);
    }

    let content = format!("{HEADER}<dict>\n{body}</dict>\n</plist>\n");

    Artifact {
        path: format!("{label}.plist"),
        content_hash: content_hash(content.as_bytes()),
        content: content.into_bytes(),
        mode: 0o644,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::container::{Container, ExternalDependency, Source};

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

    fn base_spec() -> Spec {
        Spec {
            name: "app".to_owned(),
            container: Container {
                source: Source::Image("nginx:latest".to_owned()),
                ..Container::default()
            },
            ..Spec::default()
        }
    }

    #[test]
    fn label_is_prefix_dot_sanitized_name() {
        let artifact = render_plist(&base_spec(), &options());
        assert_eq!(artifact.path, "com.example.svcplane.app.plist");
    }

    #[test]
    fn program_arguments_lead_with_podman_path() {
        let artifact = render_plist(&base_spec(), &options());
        let xml = String::from_utf8(artifact.content).unwrap();
        let program_args_at = xml.find("ProgramArguments").unwrap();
        let after = &xml[program_args_at..];
        assert!(after.contains("<string>/opt/homebrew/bin/podman</string>"));
    }

    #[test]
    fn s3_optional_absent_external_dep_is_filtered_out() {
        let mut spec = base_spec();
        spec.name = "app".to_owned();
        spec.external_deps = vec![ExternalDependency {
            project: "mon".to_owned(),
            service: "prom".to_owned(),
            optional: true,
            exists_in_runtime: false,
        }];
        let artifact = render_plist(&spec, &options());
        let xml = String::from_utf8(artifact.content).unwrap();
        assert!(!xml.contains("DependsOn"));
    }

    #[test]
    fn s4_on_failure_restart_maps_to_successful_exit_dict() {
        let mut spec = base_spec();
        spec.container.restart_policy = RestartPolicy::OnFailure;
        let artifact = render_plist(&spec, &options());
        let xml = String::from_utf8(artifact.content).unwrap();
        assert!(xml.contains("<key>KeepAlive</key>\n    <dict>\n        <key>SuccessfulExit</key>\n        <false/>\n    </dict>\n"));
    }

    #[test]
    fn required_external_dep_is_kept_and_sorted_with_intra_project_deps() {
        let mut spec = base_spec();
        spec.depends_on = vec!["db".to_owned()];
        spec.external_deps = vec![ExternalDependency {
            project: "mon".to_owned(),
            service: "prom".to_owned(),
            optional: false,
            exists_in_runtime: false,
        }];
        let artifact = render_plist(&spec, &options());
        let xml = String::from_utf8(artifact.content).unwrap();
        assert!(xml.contains("com.example.svcplane.db"));
        assert!(xml.contains("com.example.svcplane.mon.prom"));
    }

    #[test]
    fn render_is_deterministic() {
        let first = render_plist(&base_spec(), &options());
        let second = render_plist(&base_spec(), &options());
        assert_eq!(first.content, second.content);
        assert_eq!(first.content_hash, second.content_hash);
    }
}
