//! Managed host bootstrap through `hostfxr`.
//!
//! The sequence is the one the .NET hosting layer documents for native
//! hosts: load `hostfxr`, initialize a host context, ask it for the
//! `load_assembly_and_get_function_pointer` delegate, and use that to call
//! the managed entry point, which fills in the callback table.

use std::ffi::{OsStr, c_void};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::{Arc, OnceLock};

use libloading::Library;
use semver::Version;

use crate::callbacks::{CallbackRuntime, ManagedCallbacks};
use crate::config::{HostConfig, HostMode};
use crate::error::HostError;

#[cfg(windows)]
pub type CharT = u16;
#[cfg(not(windows))]
pub type CharT = std::ffi::c_char;

type HostContext = *mut c_void;

#[repr(C)]
struct InitializeParameters {
    size: usize,
    host_path: *const CharT,
    dotnet_root: *const CharT,
}

type InitForCommandLineFn = unsafe extern "C" fn(
    argc: i32,
    argv: *const *const CharT,
    parameters: *const InitializeParameters,
    context: *mut HostContext,
) -> i32;

type InitForRuntimeConfigFn = unsafe extern "C" fn(
    runtime_config_path: *const CharT,
    parameters: *const InitializeParameters,
    context: *mut HostContext,
) -> i32;

type GetRuntimeDelegateFn =
    unsafe extern "C" fn(context: HostContext, kind: i32, delegate: *mut *mut c_void) -> i32;

type CloseFn = unsafe extern "C" fn(context: HostContext) -> i32;

type LoadAssemblyAndGetFunctionPointerFn = unsafe extern "C" fn(
    assembly_path: *const CharT,
    type_name: *const CharT,
    method_name: *const CharT,
    delegate_type_name: *const CharT,
    reserved: *mut c_void,
    delegate: *mut *mut c_void,
) -> i32;

type InitializeRuntimeHostFn =
    unsafe extern "C" fn(plugins_dir: *const CharT, callbacks: *mut ManagedCallbacks) -> i32;

/// `hdt_load_assembly_and_get_function_pointer`
const DELEGATE_LOAD_ASSEMBLY_AND_GET_FUNCTION_POINTER: i32 = 5;

/// Passed as the delegate type name for `[UnmanagedCallersOnly]` methods.
const UNMANAGED_CALLERS_ONLY_METHOD: *const CharT = usize::MAX as *const CharT;

/// The four `hostfxr` exports Tether uses, plus the library keeping them
/// valid.
struct HostFxr {
    initialize_for_dotnet_command_line: InitForCommandLineFn,
    initialize_for_runtime_config: InitForRuntimeConfigFn,
    get_runtime_delegate: GetRuntimeDelegateFn,
    close: CloseFn,
    _library: Library,
}

impl HostFxr {
    fn load(path: &Path) -> Result<Self, HostError> {
        // SAFETY: hostfxr has no library initializers with preconditions.
        let library = unsafe { Library::new(path)? };
        // SAFETY: each type matches the documented hostfxr signature.
        unsafe {
            Ok(Self {
                initialize_for_dotnet_command_line: export(
                    &library,
                    "hostfxr_initialize_for_dotnet_command_line",
                )?,
                initialize_for_runtime_config: export(
                    &library,
                    "hostfxr_initialize_for_runtime_config",
                )?,
                get_runtime_delegate: export(&library, "hostfxr_get_runtime_delegate")?,
                close: export(&library, "hostfxr_close")?,
                _library: library,
            })
        }
    }

    fn init_command_line(
        &self,
        assembly: &Path,
        dotnet_root: Option<&Path>,
    ) -> Result<HostContext, HostError> {
        let assembly = host_string(assembly.as_os_str())?;
        let root = dotnet_root.map(|r| host_string(r.as_os_str())).transpose()?;
        let parameters = InitializeParameters {
            size: std::mem::size_of::<InitializeParameters>(),
            host_path: ptr::null(),
            dotnet_root: root.as_ref().map_or(ptr::null(), |r| r.as_ptr()),
        };
        let argv = [assembly.as_ptr()];
        let mut context: HostContext = ptr::null_mut();

        // SAFETY: argv and parameters outlive the call.
        let status = unsafe {
            (self.initialize_for_dotnet_command_line)(1, argv.as_ptr(), &parameters, &mut context)
        };
        self.check_init("hostfxr_initialize_for_dotnet_command_line", status, context)
    }

    fn init_runtime_config(&self, runtime_config: &Path) -> Result<HostContext, HostError> {
        let config = host_string(runtime_config.as_os_str())?;
        let mut context: HostContext = ptr::null_mut();

        // SAFETY: `config` outlives the call.
        let status = unsafe {
            (self.initialize_for_runtime_config)(config.as_ptr(), ptr::null(), &mut context)
        };
        self.check_init("hostfxr_initialize_for_runtime_config", status, context)
    }

    fn check_init(
        &self,
        call: &'static str,
        status: i32,
        context: HostContext,
    ) -> Result<HostContext, HostError> {
        // Non-negative statuses are success codes; a context may still be
        // handed back alongside a failure and must be closed.
        if status < 0 || context.is_null() {
            if !context.is_null() {
                // SAFETY: context was produced by this hostfxr.
                unsafe { (self.close)(context) };
            }
            return Err(HostError::HostCall { call, status });
        }
        Ok(context)
    }

    fn load_assembly_delegate(
        &self,
        context: HostContext,
    ) -> Result<LoadAssemblyAndGetFunctionPointerFn, HostError> {
        let mut delegate: *mut c_void = ptr::null_mut();
        // SAFETY: context is live; delegate is a valid out pointer.
        let status = unsafe {
            (self.get_runtime_delegate)(
                context,
                DELEGATE_LOAD_ASSEMBLY_AND_GET_FUNCTION_POINTER,
                &mut delegate,
            )
        };
        if status != 0 || delegate.is_null() {
            return Err(HostError::HostCall {
                call: "hostfxr_get_runtime_delegate",
                status,
            });
        }
        // SAFETY: the runtime returns a function of exactly this signature for
        // the requested delegate kind.
        Ok(unsafe {
            std::mem::transmute::<*mut c_void, LoadAssemblyAndGetFunctionPointerFn>(delegate)
        })
    }
}

/// Resolve an export by name, copying the function pointer out.
///
/// # Safety
/// `T` must match the export's real signature.
unsafe fn export<T: Copy>(library: &Library, name: &'static str) -> Result<T, HostError> {
    // SAFETY: forwarded to the caller.
    let symbol = unsafe { library.get::<T>(name.as_bytes()) }
        .map_err(|_| HostError::MissingExport(name))?;
    Ok(*symbol)
}

/// NUL-terminated string in hostfxr's native character type.
#[cfg(windows)]
fn host_string(value: &OsStr) -> Result<Vec<CharT>, HostError> {
    use std::os::windows::ffi::OsStrExt;
    let wide: Vec<u16> = value.encode_wide().collect();
    if wide.contains(&0) {
        return Err(HostError::InvalidPath(value.to_string_lossy().into_owned()));
    }
    Ok(wide.into_iter().chain(std::iter::once(0)).collect())
}

#[cfg(not(windows))]
fn host_string(value: &OsStr) -> Result<Vec<CharT>, HostError> {
    use std::os::unix::ffi::OsStrExt;
    let bytes = value.as_bytes();
    if bytes.contains(&0) {
        return Err(HostError::InvalidPath(value.to_string_lossy().into_owned()));
    }
    Ok(bytes
        .iter()
        .map(|b| *b as CharT)
        .chain(std::iter::once(0))
        .collect())
}

/// Everything the loader needs from the host configuration, with the
/// runtime root already resolved.
#[derive(Debug, Clone)]
pub struct HostSettings {
    pub mode: HostMode,
    pub dotnet_root: PathBuf,
    pub managed_dir: PathBuf,
    pub assembly_path: PathBuf,
    pub runtime_config: PathBuf,
    /// Assembly-qualified entry type, `"Namespace.Type, Assembly"`.
    pub entry_type: String,
    pub entry_method: String,
}

impl HostSettings {
    pub fn from_config(config: &HostConfig) -> Self {
        Self {
            mode: config.mode,
            dotnet_root: config.resolve_dotnet_root(),
            managed_dir: config.managed_dir.clone(),
            assembly_path: config.assembly_path(),
            runtime_config: config.runtime_config_path(),
            entry_type: format!("{}, {}", config.entry_type, config.assembly_name()),
            entry_method: config.entry_method.clone(),
        }
    }
}

/// Find the `hostfxr` library for the configured deployment mode.
///
/// Self-contained builds ship it next to the managed assemblies. Framework
/// dependent builds use the highest version under
/// `<dotnet_root>/host/fxr/`.
pub fn locate_hostfxr(settings: &HostSettings) -> Result<PathBuf, HostError> {
    let file_name = libloading::library_filename("hostfxr");
    let path = match settings.mode {
        HostMode::SelfContained => settings.managed_dir.join(&file_name),
        HostMode::FrameworkDependent => {
            let fxr_dir = settings.dotnet_root.join("host").join("fxr");
            highest_version_dir(&fxr_dir)?.join(&file_name)
        }
    };
    if !path.is_file() {
        return Err(HostError::LibraryNotFound(path.display().to_string()));
    }
    Ok(path)
}

fn highest_version_dir(dir: &Path) -> Result<PathBuf, HostError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| HostError::LibraryNotFound(format!("{}: {e}", dir.display())))?;

    let mut best: Option<(Version, PathBuf)> = None;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(version) = entry
            .file_name()
            .to_str()
            .and_then(|name| Version::parse(name).ok())
        else {
            continue;
        };
        if best.as_ref().is_none_or(|(current, _)| version > *current) {
            best = Some((version, path));
        }
    }

    best.map(|(_, path)| path).ok_or_else(|| {
        HostError::LibraryNotFound(format!("no hostfxr versions under {}", dir.display()))
    })
}

struct LoadedHost {
    api: HostFxr,
    context: HostContext,
}

enum HostState {
    Uninitialized,
    Ready(LoadedHost),
    ShutDown,
}

/// Owns the `hostfxr` library and host context for the process.
pub struct HostLoader {
    settings: HostSettings,
    state: HostState,
    runtime: OnceLock<Arc<CallbackRuntime>>,
}

impl HostLoader {
    pub fn new(config: &HostConfig) -> Self {
        Self::with_settings(HostSettings::from_config(config))
    }

    pub fn with_settings(settings: HostSettings) -> Self {
        Self {
            settings,
            state: HostState::Uninitialized,
            runtime: OnceLock::new(),
        }
    }

    pub fn settings(&self) -> &HostSettings {
        &self.settings
    }

    pub fn locate_hostfxr(&self) -> Result<PathBuf, HostError> {
        locate_hostfxr(&self.settings)
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, HostState::Ready(_))
    }

    /// The managed runtime, once [`initialize`](Self::initialize) succeeded
    /// and until shutdown.
    pub fn runtime(&self) -> Option<Arc<CallbackRuntime>> {
        match self.state {
            HostState::Ready(_) => self.runtime.get().cloned(),
            _ => None,
        }
    }

    /// Bootstrap the managed runtime. Calling this again after success
    /// returns the same runtime; a failure leaves the loader uninitialized.
    pub fn initialize(&mut self) -> Result<Arc<CallbackRuntime>, HostError> {
        match self.state {
            HostState::Ready(_) => {
                if let Some(runtime) = self.runtime.get() {
                    return Ok(runtime.clone());
                }
            }
            HostState::ShutDown => return Err(HostError::ShutDown),
            HostState::Uninitialized => {}
        }

        let library_path = self.locate_hostfxr()?;
        tracing::info!(path = %library_path.display(), mode = ?self.settings.mode, "Loading hostfxr");
        let api = HostFxr::load(&library_path)?;

        let context = match self.settings.mode {
            HostMode::SelfContained => {
                api.init_command_line(&self.settings.assembly_path, Some(&self.settings.managed_dir))?
            }
            HostMode::FrameworkDependent => api.init_runtime_config(&self.settings.runtime_config)?,
        };

        let table = match self.attach_managed(&api, context) {
            Ok(table) => table,
            Err(e) => {
                // SAFETY: context came from this hostfxr and is closed once.
                unsafe { (api.close)(context) };
                return Err(e);
            }
        };
        let runtime = match CallbackRuntime::new(table) {
            Ok(runtime) => Arc::new(runtime),
            Err(e) => {
                // SAFETY: as above.
                unsafe { (api.close)(context) };
                return Err(e);
            }
        };

        let runtime = self.runtime.get_or_init(|| runtime).clone();
        self.state = HostState::Ready(LoadedHost { api, context });
        tracing::info!(entry = %self.settings.entry_type, "Managed host initialized");
        Ok(runtime)
    }

    /// Call the managed entry point and let it fill the callback table.
    fn attach_managed(
        &self,
        api: &HostFxr,
        context: HostContext,
    ) -> Result<ManagedCallbacks, HostError> {
        let load_assembly = api.load_assembly_delegate(context)?;

        let assembly = host_string(self.settings.assembly_path.as_os_str())?;
        let type_name = host_string(OsStr::new(&self.settings.entry_type))?;
        let method_name = host_string(OsStr::new(&self.settings.entry_method))?;
        let mut entry: *mut c_void = ptr::null_mut();

        // SAFETY: all strings outlive the call; entry is a valid out pointer.
        let status = unsafe {
            load_assembly(
                assembly.as_ptr(),
                type_name.as_ptr(),
                method_name.as_ptr(),
                UNMANAGED_CALLERS_ONLY_METHOD,
                ptr::null_mut(),
                &mut entry,
            )
        };
        if status != 0 || entry.is_null() {
            return Err(HostError::EntryPointNotFound(format!(
                "{}::{} (status {status:#x})",
                self.settings.entry_type, self.settings.entry_method
            )));
        }
        // SAFETY: the entry point is declared with this signature on the
        // managed side.
        let entry = unsafe { std::mem::transmute::<*mut c_void, InitializeRuntimeHostFn>(entry) };

        let plugins_dir = host_string(self.settings.managed_dir.as_os_str())?;
        let mut table = ManagedCallbacks::default();
        // SAFETY: table is a valid, writable ManagedCallbacks.
        let status = unsafe { entry(plugins_dir.as_ptr(), &mut table) };
        if status != 0 {
            return Err(HostError::ManagedInitFailed(status));
        }
        Ok(table)
    }

    /// Close the host context and unload `hostfxr`. Only the first call
    /// after a successful initialization does anything.
    pub fn shutdown(&mut self) {
        match std::mem::replace(&mut self.state, HostState::ShutDown) {
            HostState::Ready(host) => {
                // SAFETY: context is live and closed exactly once.
                let status = unsafe { (host.api.close)(host.context) };
                if status < 0 {
                    tracing::warn!(status, "hostfxr_close reported failure");
                }
                tracing::info!("Managed host shut down");
            }
            HostState::Uninitialized => {
                self.state = HostState::Uninitialized;
                tracing::debug!("Shutdown requested before host initialization");
            }
            HostState::ShutDown => {}
        }
    }
}

impl Drop for HostLoader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(mode: HostMode, dotnet_root: &Path, managed_dir: &Path) -> HostSettings {
        HostSettings {
            mode,
            dotnet_root: dotnet_root.to_path_buf(),
            managed_dir: managed_dir.to_path_buf(),
            assembly_path: managed_dir.join("Tether.Plugins.dll"),
            runtime_config: managed_dir.join("Tether.Plugins.runtimeconfig.json"),
            entry_type: "Tether.Plugins.Main, Tether.Plugins".into(),
            entry_method: "InitializeRuntimeHost".into(),
        }
    }

    #[test]
    fn picks_highest_fxr_version() {
        let root = tempfile::tempdir().unwrap();
        let fxr = root.path().join("host").join("fxr");
        for version in ["6.0.25", "8.0.1", "8.0.10", "not-a-version"] {
            std::fs::create_dir_all(fxr.join(version)).unwrap();
        }
        let file_name = libloading::library_filename("hostfxr");
        std::fs::write(fxr.join("8.0.10").join(&file_name), b"").unwrap();

        let found = locate_hostfxr(&settings(
            HostMode::FrameworkDependent,
            root.path(),
            root.path(),
        ))
        .unwrap();
        assert_eq!(found, fxr.join("8.0.10").join(file_name));
    }

    #[test]
    fn missing_library_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let err = locate_hostfxr(&settings(HostMode::FrameworkDependent, root.path(), root.path()))
            .unwrap_err();
        assert!(matches!(err, HostError::LibraryNotFound(_)));

        let err = locate_hostfxr(&settings(HostMode::SelfContained, root.path(), root.path()))
            .unwrap_err();
        assert!(matches!(err, HostError::LibraryNotFound(_)));
    }

    #[test]
    fn failed_initialize_leaves_loader_uninitialized() {
        let root = tempfile::tempdir().unwrap();
        let mut loader =
            HostLoader::with_settings(settings(HostMode::SelfContained, root.path(), root.path()));

        assert!(loader.initialize().is_err());
        assert!(!loader.is_initialized());
        assert!(loader.runtime().is_none());
        // A later attempt is still allowed.
        assert!(matches!(loader.initialize(), Err(HostError::LibraryNotFound(_))));
    }

    #[test]
    fn shutdown_without_initialize_is_a_no_op() {
        let root = tempfile::tempdir().unwrap();
        let mut loader =
            HostLoader::with_settings(settings(HostMode::SelfContained, root.path(), root.path()));
        loader.shutdown();
        loader.shutdown();
        assert!(!loader.is_initialized());
        assert!(matches!(loader.initialize(), Err(HostError::LibraryNotFound(_))));
    }

    #[cfg(not(windows))]
    #[test]
    fn host_strings_are_nul_terminated() {
        let s = host_string(OsStr::new("abc")).unwrap();
        assert_eq!(s.len(), 4);
        assert_eq!(s[3], 0);
        assert!(host_string(OsStr::new("a\0b")).is_err());
    }
}
