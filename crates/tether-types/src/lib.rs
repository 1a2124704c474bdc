//! Type registry for Tether.
//!
//! Managed modules describe their classes, structs, enums and interfaces in
//! a `{module}.metadata.json` file. The registry parses those files, builds
//! native type objects for them as soon as their base types exist, and
//! answers name lookups with managed types first and native types second.

pub mod entry;
pub mod error;
pub mod metadata;
pub mod pending;
pub mod registry;

pub use entry::{EntryOrigin, EntryState, TypeDescriptorEntry};
pub use error::RegistryError;
pub use metadata::{METADATA_SUFFIX, ModuleMetadata, module_name};
pub use pending::PendingClassSet;
pub use registry::{ModuleLoad, TypeEvent, TypeRegistry};
