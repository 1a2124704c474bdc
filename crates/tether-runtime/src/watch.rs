use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, channel};
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tether_types::module_name;

use crate::error::RuntimeError;

/// Watches a metadata directory and reports which modules changed.
pub struct ModuleWatcher {
    _watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
    root: PathBuf,
}

impl ModuleWatcher {
    pub fn new(root: &Path) -> Result<Self, RuntimeError> {
        if !root.is_dir() {
            return Err(RuntimeError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a directory", root.display()),
            )));
        }

        let (tx, rx) = channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })?;
        watcher.configure(
            NotifyConfig::default()
                .with_compare_contents(false)
                .with_poll_interval(Duration::from_millis(300)),
        )?;
        watcher.watch(root, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %root.display(), "Watching module metadata");
        Ok(Self {
            _watcher: watcher,
            rx,
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Modules whose metadata file was created, modified or removed since the
    /// last call. Never blocks.
    pub fn drain_changes(&mut self) -> BTreeSet<String> {
        let mut modules = BTreeSet::new();
        while let Ok(event) = self.rx.try_recv() {
            match event {
                Ok(event) => {
                    if !is_relevant(&event.kind) {
                        continue;
                    }
                    modules.extend(event.paths.iter().filter_map(|path| metadata_module(path)));
                }
                Err(e) => tracing::warn!(error = %e, "Module watcher error"),
            }
        }
        modules
    }
}

fn metadata_module(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    file_name
        .ends_with(tether_types::METADATA_SUFFIX)
        .then(|| module_name(path))
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Create(_)
            | EventKind::Remove(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange};

    #[test]
    fn only_metadata_files_map_to_modules() {
        assert_eq!(
            metadata_module(Path::new("/m/Game.metadata.json")),
            Some("Game".to_string())
        );
        assert_eq!(metadata_module(Path::new("/m/Game.dll")), None);
    }

    #[test]
    fn access_events_are_ignored() {
        assert!(is_relevant(&EventKind::Create(CreateKind::File)));
        assert!(is_relevant(&EventKind::Modify(ModifyKind::Data(DataChange::Content))));
        assert!(!is_relevant(&EventKind::Access(notify::event::AccessKind::Any)));
    }

    #[test]
    fn rejects_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ModuleWatcher::new(&dir.path().join("absent")).is_err());
    }
}
