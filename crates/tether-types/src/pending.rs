use std::collections::{BTreeMap, BTreeSet};

/// Managed classes that could not be built yet, keyed by the name of the
/// parent they are waiting on.
#[derive(Debug, Default, Clone)]
pub struct PendingClassSet {
    waiting: BTreeMap<String, BTreeSet<String>>,
}

impl PendingClassSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, parent: impl Into<String>, class: impl Into<String>) {
        self.waiting
            .entry(parent.into())
            .or_default()
            .insert(class.into());
    }

    /// Remove and return every class waiting on `parent`.
    pub fn take(&mut self, parent: &str) -> BTreeSet<String> {
        self.waiting.remove(parent).unwrap_or_default()
    }

    /// Forget `class` wherever it is waiting.
    pub fn remove_waiter(&mut self, class: &str) {
        self.waiting.retain(|_, waiters| {
            waiters.remove(class);
            !waiters.is_empty()
        });
    }

    pub fn waiting_on(&self, parent: &str) -> Option<&BTreeSet<String>> {
        self.waiting.get(parent)
    }

    pub fn is_waiting(&self, class: &str) -> bool {
        self.waiting.values().any(|waiters| waiters.contains(class))
    }

    pub fn parents(&self) -> impl Iterator<Item = &String> {
        self.waiting.keys()
    }

    /// `(class, parent)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.waiting
            .iter()
            .flat_map(|(parent, waiters)| waiters.iter().map(move |class| (class, parent)))
    }

    pub fn len(&self) -> usize {
        self.waiting.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}
