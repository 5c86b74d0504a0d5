//! Podman Quadlet renderer and systemd D-Bus lifecycle driver.

mod dbus;
mod lifecycle;
mod render;
mod units;
mod writer;

pub use lifecycle::LinuxLifecycle;
pub use render::LinuxRenderer;
