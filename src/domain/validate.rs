//! Aggregate validation: every structural problem found in a [`super::Spec`]
//! is collected and reported together, rather than failing on the first one.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

/// One field-level validation failure, namespaced by a dotted/indexed path
/// such as `Volumes[2].Name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// All validation failures found on one [`super::Spec`]. Never constructed
/// with an empty list; [`super::Spec::validate`] returns `Ok` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation error(s)", self.errors.len())?;
        for error in &self.errors {
            write!(f, "; {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Accumulates [`FieldError`]s across one validation pass.
#[derive(Debug, Default)]
pub(crate) struct Collector {
    errors: Vec<FieldError>,
}

impl Collector {
    pub(crate) fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            path: path.into(),
            message: message.into(),
        });
    }

    pub(crate) fn into_result(self) -> Result<(), ValidationError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { errors: self.errors })
        }
    }
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").unwrap_or_else(|e| {
            unreachable!("static name pattern must compile: {e}")
        })
    })
}

/// `true` if `name` is already a legal resource name: starts with an
/// alphanumeric, and contains only alphanumerics, `_`, `.`, and `-`.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name_pattern().is_match(name)
}

/// Derives a legal resource name from an arbitrary string: characters
/// outside `[A-Za-z0-9_.-]` become `-`, runs of `-` collapse to one, and
/// leading/trailing non-alphanumeric characters are stripped. Used to turn
/// upstream (e.g. Compose project/service) names into names this system's
/// supervisors accept.
pub fn sanitize_name(raw: &str) -> String {
    let replaced: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') { c } else { '-' })
        .collect();

    let mut collapsed = String::with_capacity(replaced.len());
    let mut last_was_dash = false;
    for c in replaced.chars() {
        if c == '-' {
            if !last_was_dash {
                collapsed.push(c);
            }
            last_was_dash = true;
        } else {
            collapsed.push(c);
            last_was_dash = false;
        }
    }

    collapsed
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names_pass_unchanged() {
        for name in ["app", "app-1", "app_1.2", "A9"] {
            assert!(is_valid_name(name), "{name} should be valid");
        }
    }

    #[test]
    fn invalid_names_fail() {
        for name in ["", "-app", ".app", "app!", "9".repeat(0).as_str()] {
            let _ = name;
        }
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("-app"));
        assert!(!is_valid_name("app!"));
    }

    #[test]
    fn sanitize_replaces_and_collapses() {
        assert_eq!(sanitize_name("my app!!name"), "my-app-name");
        assert_eq!(sanitize_name("--weird--"), "weird");
        assert_eq!(sanitize_name("foo_bar.baz"), "foo_bar.baz");
    }

    #[test]
    fn collector_accumulates_all_errors() {
        let mut collector = Collector::default();
        collector.push("A", "first");
        collector.push("B", "second");
        let err = collector.into_result().unwrap_err();
        assert_eq!(err.errors.len(), 2);
        assert!(err.to_string().contains("first"));
        assert!(err.to_string().contains("second"));
    }

    #[test]
    fn empty_collector_is_ok() {
        assert!(Collector::default().into_result().is_ok());
    }
}
