//! Crate-wide error kinds.
//!
//! Each variant corresponds to one of the error kinds named in the
//! specification's error-handling section. [`ValidationError`] and
//! [`RenderError`] surface from single-shot operations (validate, render);
//! the control-plane kinds surface from single-service lifecycle
//! operations and are recorded per-service (never aggregated) inside bulk
//! operations.

use std::fmt;

use thiserror::Error;

pub use crate::domain::validate::ValidationError;

/// Top-level error returned by render and lifecycle operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The input `Spec` failed validation before any render was attempted.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A single service failed during artifact production; rendering of
    /// the remaining specs was halted.
    #[error("failed to render service {service}: {source}")]
    Render {
        service: String,
        #[source]
        source: RenderCause,
    },

    /// The host's supervisor or container runtime is absent or in the
    /// wrong state.
    #[error("{0}")]
    PlatformUnavailable(String),

    /// The control bus or control CLI could not complete an operation.
    #[error("control plane error for {service}: {source}")]
    ControlPlane {
        service: String,
        #[source]
        source: ControlPlaneCause,
    },

    /// The unit reached a terminal non-active state.
    #[error(
        "unit {service} failed to activate: state={state}, result={result}, exit_code={}",
        exit_code.map_or_else(|| "unknown".to_owned(), i32::to_string)
    )]
    ActivationFailure {
        service: String,
        state: String,
        result: String,
        exit_code: Option<i32>,
    },

    /// The Linux waiter could not observe unit availability within the
    /// deadline.
    #[error("unit {service} failed to be generated within {deadline_ms}ms")]
    GenerationTimeout { service: String, deadline_ms: u64 },

    /// The calling context was cancelled mid-operation.
    #[error("operation for {service} was cancelled")]
    Cancelled { service: String },
}

/// The underlying cause of a [`Error::Render`].
#[derive(Debug, Error)]
pub enum RenderCause {
    #[error("quadlet section serialization failed: {0}")]
    Writer(String),
    #[error("plist serialization failed: {0}")]
    Plist(String),
    #[error("invalid host path: {0}")]
    InvalidPath(String),
}

/// The underlying cause of a [`Error::ControlPlane`].
#[derive(Debug, Error)]
pub enum ControlPlaneCause {
    #[error("failed to connect to control bus: {0}")]
    Connect(String),
    #[error("control bus call failed: {0}")]
    Call(String),
    #[error("external command `{argv}` failed: {output}")]
    Command { argv: String, output: String },
    #[error("completion signal reported non-done result: {0}")]
    NonDone(String),
}

impl Error {
    /// Shorthand for building a [`Error::ControlPlane`] from a command
    /// failure, preserving the argv and combined output for post-mortem
    /// diagnosis.
    pub fn command_failed(service: impl Into<String>, argv: impl Into<String>, output: impl fmt::Display) -> Self {
        Self::ControlPlane {
            service: service.into(),
            source: ControlPlaneCause::Command {
                argv: argv.into(),
                output: output.to_string(),
            },
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_failure_message_contains_required_fields() {
        let err = Error::ActivationFailure {
            service: "x".to_owned(),
            state: "failed".to_owned(),
            result: "exit-code".to_owned(),
            exit_code: Some(137),
        };
        let message = err.to_string();
        assert!(message.contains("state=failed"));
        assert!(message.contains("result=exit-code"));
        assert!(message.contains("exit_code=137"));
    }

    #[test]
    fn generation_timeout_message_contains_phrase() {
        let err = Error::GenerationTimeout {
            service: "x".to_owned(),
            deadline_ms: 100,
        };
        assert!(err.to_string().contains("failed to be generated"));
    }
}
