//! Platform-neutral interfaces and records shared by both adapters.
//!
//! Neither adapter subclasses a common base type; each implements these two
//! traits directly. Prefer this capability-based split over a shared
//! supertype so each platform's options stay narrow and adapter-specific.

use std::collections::BTreeMap;

use tokio_util::sync::CancellationToken;

use crate::domain::Spec;
use crate::error::Error;

/// One file a renderer produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Relative to a directory the caller (the artifact store) owns.
    pub path: String,
    pub content: Vec<u8>,
    /// Unix file permission bits, e.g. `0o644`.
    pub mode: u32,
    /// Hex-encoded SHA-256 of `content`.
    pub content_hash: String,
}

/// Per-service summary of one render pass. `changed` is always `false`;
/// change detection is left to the artifact store comparing hashes across
/// runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeStatus {
    pub changed: bool,
    pub artifact_paths: Vec<String>,
    pub combined_hash: String,
}

/// The accumulated output of one `render` call across all input specs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderResult {
    pub artifacts: Vec<Artifact>,
    pub service_changes: BTreeMap<String, ChangeStatus>,
}

/// A lifecycle status snapshot for one service.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServiceStatus {
    pub name: String,
    pub active: bool,
    pub state: String,
    pub sub_state: Option<String>,
    pub description: Option<String>,
    pub pid: Option<u32>,
    pub since_iso8601: Option<String>,
    pub error: Option<String>,
}

/// Per-service result map returned by bulk lifecycle operations. Always
/// populated, one entry per requested name, even when every operation
/// succeeded (in which case the value is `None`).
pub type BulkResult = BTreeMap<String, Option<Error>>;

/// Implemented by the Linux and macOS renderers: turns a validated batch of
/// specs into artifacts ready for the artifact store to persist.
pub trait Renderer {
    /// A short identifier for logging and diagnostics, e.g. `"linux"`.
    fn name(&self) -> &str;

    /// Renders every spec. A failure on one service halts rendering of the
    /// remaining specs and surfaces as [`Error::Render`].
    fn render(&self, specs: &[Spec]) -> Result<RenderResult, Error>;
}

/// Implemented by the Linux and macOS lifecycles: drives the host
/// supervisor's control surface. Every method opens, uses, and releases its
/// own connection; no per-service state is retained between calls.
///
/// Only one implementation is ever compiled for a given target, so this
/// trait is used generically rather than as a trait object.
pub trait Lifecycle {
    fn name(&self) -> &str;

    /// Reloads the supervisor's unit cache. A no-op on macOS.
    async fn reload(&self, cancel: &CancellationToken) -> Result<(), Error>;

    async fn start(&self, name: &str, cancel: &CancellationToken) -> Result<(), Error>;
    async fn stop(&self, name: &str, cancel: &CancellationToken) -> Result<(), Error>;
    async fn restart(&self, name: &str, cancel: &CancellationToken) -> Result<(), Error>;
    async fn status(&self, name: &str, cancel: &CancellationToken) -> Result<ServiceStatus, Error>;

    async fn start_many(&self, names: &[String], cancel: &CancellationToken) -> BulkResult;
    async fn stop_many(&self, names: &[String], cancel: &CancellationToken) -> BulkResult;
    async fn restart_many(&self, names: &[String], cancel: &CancellationToken) -> BulkResult;
}
