use std::path::PathBuf;

use sha2::{Digest, Sha256};
use tether_types::METADATA_SUFFIX;

use crate::error::RuntimeError;

/// Directory of module metadata files written by the managed build.
///
/// ```text
/// {base_dir}/
///   {module}.metadata.json
/// ```
pub struct ModuleStorage {
    base_dir: PathBuf,
}

impl ModuleStorage {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &std::path::Path {
        &self.base_dir
    }

    pub fn init(&self) -> Result<(), RuntimeError> {
        std::fs::create_dir_all(&self.base_dir)?;
        Ok(())
    }

    pub fn metadata_path(&self, module: &str) -> PathBuf {
        self.base_dir.join(format!("{module}{METADATA_SUFFIX}"))
    }

    pub fn contains(&self, module: &str) -> bool {
        self.metadata_path(module).is_file()
    }

    /// Names of every module with a metadata file, sorted.
    pub fn list_modules(&self) -> Result<Vec<String>, RuntimeError> {
        let mut modules = Vec::new();
        if !self.base_dir.exists() {
            return Ok(modules);
        }
        for entry in std::fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(module) = name.strip_suffix(METADATA_SUFFIX) {
                modules.push(module.to_string());
            }
        }
        modules.sort();
        Ok(modules)
    }

    /// SHA-256 hex of a module's metadata file.
    pub fn fingerprint(&self, module: &str) -> Result<String, RuntimeError> {
        let path = self.metadata_path(module);
        let bytes = std::fs::read(&path)
            .map_err(|_| RuntimeError::ModuleNotFound(module.to_string()))?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }
}
