//! Shared model for Tether.
//!
//! Tether lets a managed, garbage-collected environment define types that a
//! native reflection framework treats as its own. This crate holds the pieces
//! every other Tether crate agrees on: handle and identity types, type
//! metadata records, the editor graph model, and the traits through which
//! Tether talks to both runtimes.

pub mod error;
pub mod framework;
pub mod graph;
pub mod handle;
pub mod memory;
pub mod types;

pub use error::FrameworkError;
pub use framework::{ManagedRuntime, ObjectDeleteListener, ReloadHost, TypeIndex};
pub use handle::{HandleKind, ManagedHandle, ManagedMethodHandle, ManagedTypeHandle, NativeObjectId};
pub use memory::MemoryFramework;
pub use types::{
    MemberDescriptor, MemberKind, NativeTypeId, NativeTypeInfo, TypeDescriptor, TypeKind,
    TypeMetadataRecord, TypeReference,
};
