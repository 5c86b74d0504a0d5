//! Renders a platform-agnostic description of containerized services into
//! artifacts for a host's native service supervisor, and drives that
//! supervisor's lifecycle API to realize the declared state.
//!
//! This crate is the core of a two-adapter system: a Linux adapter that
//! targets a journaled init's container-unit generator and D-Bus control
//! bus, and a macOS adapter that targets a per-user daemon's property-list
//! configuration and CLI control surface. Both adapters consume the same
//! validated [`domain::Spec`] and the same [`argv`] argument builder, and
//! both implement the platform-neutral [`contracts::Renderer`] and
//! [`contracts::Lifecycle`] traits.
//!
//! Compose-file parsing, persisted artifact storage, and CLI dispatch are
//! not part of this crate; callers hand it an already-validated [`domain::
//! Spec`] and consume the [`contracts::RenderResult`] or error map it
//! returns.

pub mod argv;
pub mod contracts;
pub mod domain;
pub mod error;
pub mod hash;
#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "macos")]
pub mod macos;
pub mod runner;

pub use contracts::{Artifact, ChangeStatus, Lifecycle, RenderResult, Renderer, ServiceStatus};
pub use domain::Spec;
pub use error::Error;
