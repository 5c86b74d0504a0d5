//! Section structs for each of the four unit classes this renderer emits.
//! Each derives [`serde::Serialize`] against [`super::writer`], field
//! declaration order doubling as emission order.

mod build;
mod container;
mod network;
mod sections;
mod volume;

pub use build::BuildSection;
pub use container::ContainerSection;
pub use network::NetworkSection;
pub use sections::{InstallSection, ServiceSection, UnitSection};
pub use volume::VolumeSection;
