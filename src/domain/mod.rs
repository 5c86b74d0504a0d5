//! The shared domain model: a platform-agnostic description of a
//! containerized service, derived upstream from a Compose-style input.
//!
//! Every type here is immutable after construction. A [`Spec`] is created,
//! validated once via [`Spec::validate`], consumed by one render pass, and
//! discarded; lifecycle drivers hold no reference to it at all.

mod container;
mod network;
mod spec;
pub mod validate;
mod volume;

pub use container::{
    BindOptions, Build, Container, Device, ExternalDependency, Healthcheck, Logging, Mount,
    MountType, NetworkMode, Port, Protocol, Resources, RestartPolicy, Secret, SecretKind, Security,
    Source, TmpfsOptions,
};
pub use network::{Ipam, IpamConfig, Network};
pub use spec::Spec;
pub use volume::Volume;
