//! The managed callback table.
//!
//! During bootstrap the managed entry point receives a pointer to a
//! zeroed [`ManagedCallbacks`] and fills in one function pointer per
//! operation. From then on the table is read-only. Every callback reports
//! failure through a sentinel (`0` handles, non-zero status codes) and never
//! unwinds into native code.

use std::ffi::{CStr, CString, c_char, c_void};

use tether_core::{
    FrameworkError, HandleKind, ManagedHandle, ManagedMethodHandle, ManagedRuntime,
    ManagedTypeHandle, NativeObjectId,
};

use crate::error::HostError;

/// Layout version both sides must agree on.
pub const MANAGED_CALLBACKS_VERSION: u32 = 1;

const EXCEPTION_BUFFER_LEN: usize = 1024;

/// Returns a strong GC handle to the new instance, or `0`.
pub type CreateManagedObjectFn =
    unsafe extern "C" fn(native: *const c_void, type_handle: usize) -> usize;

/// UTF-8, NUL-terminated arguments. `assembly` may be null. Returns a type
/// handle or `0`.
pub type LookupManagedTypeFn = unsafe extern "C" fn(
    assembly: *const c_char,
    namespace: *const c_char,
    name: *const c_char,
) -> usize;

pub type LookupManagedMethodFn =
    unsafe extern "C" fn(type_handle: usize, name: *const c_char) -> usize;

/// Returns `0` on success. On failure the managed exception message is
/// written NUL-terminated into `exception` (at most `exception_len` bytes).
pub type InvokeManagedMethodFn = unsafe extern "C" fn(
    target: usize,
    method: usize,
    exception: *mut c_char,
    exception_len: usize,
) -> i32;

pub type FreeHandleFn = unsafe extern "C" fn(handle: usize, kind: u8);

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct ManagedCallbacks {
    pub version: u32,
    pub create_managed_object: Option<CreateManagedObjectFn>,
    pub lookup_managed_type: Option<LookupManagedTypeFn>,
    pub lookup_managed_method: Option<LookupManagedMethodFn>,
    pub invoke_managed_method: Option<InvokeManagedMethodFn>,
    pub free_handle: Option<FreeHandleFn>,
}

impl ManagedCallbacks {
    /// Name of the first callback the managed side left unset.
    pub fn first_missing(&self) -> Option<&'static str> {
        if self.create_managed_object.is_none() {
            Some("create_managed_object")
        } else if self.lookup_managed_type.is_none() {
            Some("lookup_managed_type")
        } else if self.lookup_managed_method.is_none() {
            Some("lookup_managed_method")
        } else if self.invoke_managed_method.is_none() {
            Some("invoke_managed_method")
        } else if self.free_handle.is_none() {
            Some("free_handle")
        } else {
            None
        }
    }
}

/// [`ManagedRuntime`] backed by a filled-in callback table.
#[derive(Debug)]
pub struct CallbackRuntime {
    table: ManagedCallbacks,
}

impl CallbackRuntime {
    /// Validate a table the managed side has just filled.
    pub fn new(table: ManagedCallbacks) -> Result<Self, HostError> {
        if table.version != MANAGED_CALLBACKS_VERSION {
            return Err(HostError::CallbackVersion {
                expected: MANAGED_CALLBACKS_VERSION,
                actual: table.version,
            });
        }
        if let Some(missing) = table.first_missing() {
            return Err(HostError::MissingExport(missing));
        }
        Ok(Self { table })
    }

    pub fn table(&self) -> &ManagedCallbacks {
        &self.table
    }
}

impl ManagedRuntime for CallbackRuntime {
    fn lookup_type(
        &self,
        assembly: Option<&str>,
        namespace: &str,
        name: &str,
    ) -> Option<ManagedTypeHandle> {
        let lookup = self.table.lookup_managed_type?;
        let assembly = match assembly {
            Some(assembly) => Some(CString::new(assembly).ok()?),
            None => None,
        };
        let namespace = CString::new(namespace).ok()?;
        let name = CString::new(name).ok()?;
        let assembly_ptr = assembly.as_ref().map_or(std::ptr::null(), |a| a.as_ptr());

        // SAFETY: every pointer is a live NUL-terminated string for the call.
        let raw = unsafe { lookup(assembly_ptr, namespace.as_ptr(), name.as_ptr()) };
        let handle = ManagedTypeHandle::from_raw(raw);
        if handle.is_none() {
            tracing::debug!(namespace = ?namespace, name = ?name, "Managed type not found");
        }
        handle
    }

    fn create_object(
        &self,
        native: NativeObjectId,
        type_handle: ManagedTypeHandle,
    ) -> Option<ManagedHandle> {
        let create = self.table.create_managed_object?;
        // SAFETY: the native address is only stored by the managed side as
        // an identity, never dereferenced there.
        let raw = unsafe { create(native.addr() as *const c_void, type_handle.raw()) };
        ManagedHandle::from_raw(raw, HandleKind::Strong)
    }

    fn release_handle(&self, handle: ManagedHandle) {
        if let Some(free) = self.table.free_handle {
            // SAFETY: handle came from this runtime and is released once.
            unsafe { free(handle.raw(), handle.kind().as_raw()) };
        }
    }

    fn lookup_method(
        &self,
        type_handle: ManagedTypeHandle,
        name: &str,
    ) -> Option<ManagedMethodHandle> {
        let lookup = self.table.lookup_managed_method?;
        let name = CString::new(name).ok()?;
        // SAFETY: `name` outlives the call.
        let raw = unsafe { lookup(type_handle.raw(), name.as_ptr()) };
        ManagedMethodHandle::from_raw(raw)
    }

    fn invoke_method(
        &self,
        target: ManagedHandle,
        method: ManagedMethodHandle,
    ) -> Result<(), FrameworkError> {
        let Some(invoke) = self.table.invoke_managed_method else {
            return Err(FrameworkError::ManagedException(
                "invoke callback is not registered".into(),
            ));
        };

        let mut exception = [0u8; EXCEPTION_BUFFER_LEN];
        // SAFETY: the buffer is writable for its whole length.
        let status = unsafe {
            invoke(
                target.raw(),
                method.raw(),
                exception.as_mut_ptr().cast::<c_char>(),
                exception.len(),
            )
        };
        if status == 0 {
            return Ok(());
        }

        let message = CStr::from_bytes_until_nul(&exception)
            .map(|m| m.to_string_lossy().into_owned())
            .unwrap_or_else(|_| String::from_utf8_lossy(&exception).into_owned());
        Err(FrameworkError::ManagedException(if message.is_empty() {
            format!("managed call failed with status {status}")
        } else {
            message
        }))
    }
}
