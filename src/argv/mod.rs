//! Translates a [`crate::domain::Container`] into container-runtime
//! argument vectors. Pure, deterministic, and platform-agnostic: neither
//! entry point performs I/O or consults process state.

mod builder;

pub use builder::{full_run, native_residue};
