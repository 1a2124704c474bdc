use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::RuntimeError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TetherConfig {
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub modules: ModulesConfig,
    #[serde(default)]
    pub hot_reload: HotReloadConfig,
    #[serde(default)]
    pub types: TypesConfig,
}

/// How the managed runtime is shipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostMode {
    /// Uses a shared runtime installed under `dotnet_root`.
    #[default]
    FrameworkDependent,
    /// The runtime ships next to the managed assemblies.
    SelfContained,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    #[serde(default)]
    pub mode: HostMode,
    pub dotnet_root: Option<PathBuf>,
    #[serde(default = "default_managed_dir")]
    pub managed_dir: PathBuf,
    #[serde(default = "default_assembly")]
    pub assembly: String,
    #[serde(default = "default_entry_type")]
    pub entry_type: String,
    #[serde(default = "default_entry_method")]
    pub entry_method: String,
    /// Defaults to `<assembly>.runtimeconfig.json` in `managed_dir`.
    pub runtime_config: Option<PathBuf>,
}

fn default_managed_dir() -> PathBuf {
    tether_home().join("managed")
}
fn default_assembly() -> String {
    "Tether.Plugins.dll".into()
}
fn default_entry_type() -> String {
    "Tether.Plugins.Main".into()
}
fn default_entry_method() -> String {
    "InitializeRuntimeHost".into()
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            mode: HostMode::default(),
            dotnet_root: None,
            managed_dir: default_managed_dir(),
            assembly: default_assembly(),
            entry_type: default_entry_type(),
            entry_method: default_entry_method(),
            runtime_config: None,
        }
    }
}

impl HostConfig {
    /// Configured root, then `DOTNET_ROOT`, then `~/.dotnet`, then the
    /// platform install location.
    pub fn resolve_dotnet_root(&self) -> PathBuf {
        if let Some(root) = &self.dotnet_root {
            return root.clone();
        }
        if let Some(root) = std::env::var_os("DOTNET_ROOT").filter(|r| !r.is_empty()) {
            return PathBuf::from(root);
        }
        if let Some(user) = dirs::home_dir().map(|h| h.join(".dotnet"))
            && user.is_dir()
        {
            return user;
        }
        platform_dotnet_root()
    }

    pub fn assembly_path(&self) -> PathBuf {
        self.managed_dir.join(&self.assembly)
    }

    /// Assembly name without extension, as used in qualified type names.
    pub fn assembly_name(&self) -> &str {
        self.assembly
            .strip_suffix(".dll")
            .unwrap_or(&self.assembly)
    }

    pub fn runtime_config_path(&self) -> PathBuf {
        match &self.runtime_config {
            Some(path) => path.clone(),
            None => self
                .managed_dir
                .join(format!("{}.runtimeconfig.json", self.assembly_name())),
        }
    }
}

#[cfg(windows)]
fn platform_dotnet_root() -> PathBuf {
    PathBuf::from(r"C:\Program Files\dotnet")
}

#[cfg(target_os = "macos")]
fn platform_dotnet_root() -> PathBuf {
    PathBuf::from("/usr/local/share/dotnet")
}

#[cfg(not(any(windows, target_os = "macos")))]
fn platform_dotnet_root() -> PathBuf {
    PathBuf::from("/usr/share/dotnet")
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModulesConfig {
    #[serde(default = "default_metadata_dir")]
    pub metadata_dir: PathBuf,
}

fn default_metadata_dir() -> PathBuf {
    tether_home().join("modules")
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            metadata_dir: default_metadata_dir(),
        }
    }
}

/// What triggers a hot-reload pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HotReloadMethod {
    #[default]
    OnScriptSave,
    OnModuleChange,
    OnEditorFocus,
    Off,
}

impl HotReloadMethod {
    /// Whether changes are picked up from filesystem events as they happen.
    pub fn watches_files(self) -> bool {
        matches!(self, HotReloadMethod::OnScriptSave | HotReloadMethod::OnModuleChange)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HotReloadConfig {
    #[serde(default)]
    pub method: HotReloadMethod,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    250
}

impl Default for HotReloadConfig {
    fn default() -> Self {
        Self {
            method: HotReloadMethod::default(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TypesConfig {
    /// Show managed types as `"<Name> (Managed)"` in editor tooling.
    #[serde(default)]
    pub suffix_generated_types: bool,
}

impl TetherConfig {
    pub fn default_path() -> PathBuf {
        tether_home().join("config.toml")
    }

    pub fn from_file(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| RuntimeError::Config(format!("Failed to parse {}: {e}", path.display())))
    }

    /// Load `path`, or the default config file if it exists, or defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, RuntimeError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = Self::default_path();
                if default.is_file() {
                    Self::from_file(&default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

fn tether_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tether")
}
