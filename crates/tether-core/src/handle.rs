use std::fmt;
use std::num::NonZeroUsize;

/// Whether a managed handle keeps its target alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    /// Roots the managed object; the collector may not reclaim it.
    Strong,
    /// Observes the managed object without rooting it.
    Weak,
}

impl HandleKind {
    /// Wire discriminator passed across the managed boundary.
    pub fn as_raw(self) -> u8 {
        match self {
            HandleKind::Strong => 0,
            HandleKind::Weak => 1,
        }
    }
}

/// Opaque reference to a garbage-collected object in the managed environment.
///
/// The managed side hands these out as pointer-sized integers where `0` means
/// "no object". That sentinel never survives into a `ManagedHandle`: use
/// [`ManagedHandle::from_raw`] at the boundary and get an `Option` back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ManagedHandle {
    raw: NonZeroUsize,
    kind: HandleKind,
}

impl ManagedHandle {
    pub fn from_raw(raw: usize, kind: HandleKind) -> Option<Self> {
        NonZeroUsize::new(raw).map(|raw| Self { raw, kind })
    }

    pub fn raw(&self) -> usize {
        self.raw.get()
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    pub fn is_strong(&self) -> bool {
        self.kind == HandleKind::Strong
    }
}

impl fmt::Display for ManagedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            HandleKind::Strong => "strong",
            HandleKind::Weak => "weak",
        };
        write!(f, "{kind}:{:#x}", self.raw)
    }
}

/// Stable identity of a native object.
///
/// Only ever used as a lookup key. It is derived from the object's address
/// and is never dereferenced, so it stays valid as a key even after the
/// object itself is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeObjectId(NonZeroUsize);

impl NativeObjectId {
    pub const fn new(addr: NonZeroUsize) -> Self {
        Self(addr)
    }

    pub fn from_addr(addr: usize) -> Option<Self> {
        NonZeroUsize::new(addr).map(Self)
    }

    pub fn from_ptr<T>(ptr: *const T) -> Option<Self> {
        Self::from_addr(ptr as usize)
    }

    pub fn addr(&self) -> usize {
        self.0.get()
    }
}

impl fmt::Display for NativeObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Runtime-provided handle to a managed type (e.g. a `System.Type` GC handle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ManagedTypeHandle(NonZeroUsize);

impl ManagedTypeHandle {
    pub fn from_raw(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(Self)
    }

    pub fn raw(&self) -> usize {
        self.0.get()
    }
}

/// Runtime-provided handle to a managed method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ManagedMethodHandle(NonZeroUsize);

impl ManagedMethodHandle {
    pub fn from_raw(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(Self)
    }

    pub fn raw(&self) -> usize {
        self.0.get()
    }
}
