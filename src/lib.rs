//! An encrypted container virtual file system: a single host file holding a
//! complete hierarchical file system, with every byte authenticated and
//! encrypted at rest.
//!
//! The [`engine`] module ties the pieces together behind the [`engine::Ivfs`]
//! trait; [`factory::Factory`] is the usual entry point for opening or
//! creating a container.

pub mod crypto;
pub mod engine;
pub mod entry;
pub mod error;
pub mod factory;
pub mod file;
pub mod header;
pub mod host;
pub mod hsm;
pub mod metadata;
pub mod path;
pub mod resource;

pub use engine::{ContainerEngine, EngineOptions, FileInfo, Ivfs, SecurityLevel};
pub use error::{ErrorKind, Result};
pub use factory::Factory;
pub use file::{ContainerFile, FileMode, SeekWhence};
pub use resource::{ResourceLimits, ResourceUsage};
