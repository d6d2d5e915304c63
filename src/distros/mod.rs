//! Distribution abstraction and the installation pipeline.
//!
//! Each supported family implements [`pipeline::Distribution`] on top of the
//! [`base::BaseDetection`] and [`manual::ManualPackageInstaller`] mixins and
//! registers its ids with [`registry::DistroRegistry`].

pub mod arch;
pub mod base;
pub mod configure;
pub mod context;
pub mod debian;
pub mod fedora;
pub mod host;
pub mod manual;
pub mod nixos;
pub mod opensuse;
pub mod osinfo;
pub mod pipeline;
pub mod privilege;
pub mod progress;
pub mod registry;
pub mod repos;
pub mod runner;
pub mod selfheal;
pub mod types;
pub mod ubuntu;

#[cfg(test)]
pub mod testing;

pub use pipeline::Distribution;
pub use registry::DistroRegistry;
