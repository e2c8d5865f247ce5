// histo-core/src/catalog.rs
use std::collections::HashSet;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use histo_common::model::{CatalogEntry, EntryStatus, VersionKey};
use tracing::debug;

const PLACEHOLDER_TAG: &str = "placeholder";
const INSTALLED_TAG: &str = "installed";

#[derive(Debug, Default)]
struct CatalogState {
    entries: Vec<CatalogEntry>,
    favorites: HashSet<VersionKey>,
    selected: Option<VersionKey>,
    /// Rows the engine added only to show an install in progress.
    placeholders: HashSet<VersionKey>,
}

/// The local version list. Favorite and selection state is keyed by
/// [`VersionKey`], so replacing a row never loses it.
#[derive(Debug, Default)]
pub struct Catalog {
    state: RwLock<CatalogState>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<CatalogEntry>) -> Self {
        Self {
            state: RwLock::new(CatalogState {
                entries,
                ..CatalogState::default()
            }),
        }
    }

    pub fn entries(&self) -> Vec<CatalogEntry> {
        self.read().entries.clone()
    }

    pub fn entry(&self, key: &VersionKey) -> Option<CatalogEntry> {
        self.read().entries.iter().find(|e| &e.key == key).cloned()
    }

    pub fn installed(&self) -> Vec<CatalogEntry> {
        self.read()
            .entries
            .iter()
            .filter(|e| e.is_installed())
            .cloned()
            .collect()
    }

    pub fn set_favorite(&self, key: &VersionKey, favorite: bool) {
        let mut state = self.write();
        if favorite {
            state.favorites.insert(key.clone());
        } else {
            state.favorites.remove(key);
        }
    }

    pub fn is_favorite(&self, key: &VersionKey) -> bool {
        self.read().favorites.contains(key)
    }

    pub fn select(&self, key: Option<VersionKey>) {
        self.write().selected = key;
    }

    pub fn selected(&self) -> Option<VersionKey> {
        self.read().selected.clone()
    }

    /// Shows `key` as installing, adding a placeholder row if the catalog
    /// does not list it.
    pub fn mark_installing(&self, key: &VersionKey) {
        let mut state = self.write();
        match state.entries.iter_mut().find(|e| &e.key == key) {
            Some(entry) => {
                if entry.status == EntryStatus::Available {
                    entry.status = EntryStatus::Installing;
                }
            }
            None => {
                debug!("[{}] Adding placeholder catalog row", key);
                let mut placeholder =
                    CatalogEntry::new(key.clone(), key.folder(), EntryStatus::Installing);
                placeholder.source_tag = Some(PLACEHOLDER_TAG.to_string());
                state.entries.push(placeholder);
                state.placeholders.insert(key.clone());
            }
        }
    }

    /// Undoes [`Catalog::mark_installing`] after a failed or cancelled install.
    pub fn clear_installing(&self, key: &VersionKey) {
        let mut state = self.write();
        if state.placeholders.remove(key) {
            state
                .entries
                .retain(|e| !(&e.key == key && e.status == EntryStatus::Installing));
            return;
        }
        for entry in state.entries.iter_mut().filter(|e| &e.key == key) {
            if entry.status == EntryStatus::Installing {
                entry.status = EntryStatus::Available;
            }
        }
    }

    /// Leaves exactly one installed row for `key`, taking `fresh` when the
    /// worker supplied it and promoting the local row otherwise. The row keeps
    /// the position of the first row it replaces.
    pub fn merge_installed(&self, key: &VersionKey, fresh: Option<CatalogEntry>) -> CatalogEntry {
        let mut guard = self.write();
        let state = &mut *guard;
        let position = state.entries.iter().position(|e| &e.key == key);
        let existing = position.map(|i| state.entries[i].clone());

        let mut merged = match (fresh, existing) {
            (Some(fresh), Some(existing)) => CatalogEntry {
                size_hint: fresh.size_hint.or(existing.size_hint),
                ..fresh
            },
            (Some(fresh), None) => fresh,
            (None, Some(existing)) => existing,
            (None, None) => CatalogEntry::new(key.clone(), key.folder(), EntryStatus::Installed),
        };
        merged.key = key.clone();
        merged.status = EntryStatus::Installed;
        if merged.source_tag.is_none() || merged.source_tag.as_deref() == Some(PLACEHOLDER_TAG) {
            merged.source_tag = Some(INSTALLED_TAG.to_string());
        }

        state.entries.retain(|e| &e.key != key);
        state.placeholders.remove(key);
        let len = state.entries.len();
        match position {
            Some(i) => state.entries.insert(i.min(len), merged.clone()),
            None => state.entries.push(merged.clone()),
        }
        merged
    }

    /// Merges a worker snapshot's installed set.
    pub fn absorb_installed(&self, installed: &[CatalogEntry]) {
        for entry in installed {
            self.merge_installed(&entry.key, Some(entry.clone()));
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, CatalogState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CatalogState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(folder: &str) -> VersionKey {
        VersionKey::new("Release", folder).unwrap()
    }

    fn available(folder: &str) -> CatalogEntry {
        CatalogEntry::new(key(folder), folder, EntryStatus::Available)
    }

    #[test]
    fn placeholder_added_and_removed() {
        let catalog = Catalog::new();
        catalog.mark_installing(&key("1.0"));
        let row = catalog.entry(&key("1.0")).unwrap();
        assert_eq!(row.status, EntryStatus::Installing);
        assert_eq!(row.source_tag.as_deref(), Some(PLACEHOLDER_TAG));

        catalog.clear_installing(&key("1.0"));
        assert!(catalog.entry(&key("1.0")).is_none());
    }

    #[test]
    fn cleared_install_returns_to_available() {
        let catalog = Catalog::with_entries(vec![available("1.0")]);
        catalog.mark_installing(&key("1.0"));
        catalog.clear_installing(&key("1.0"));
        assert_eq!(
            catalog.entry(&key("1.0")).unwrap().status,
            EntryStatus::Available
        );
    }

    #[test]
    fn merge_replaces_rows_in_place_and_keeps_user_state() {
        let catalog =
            Catalog::with_entries(vec![available("0.9"), available("1.0"), available("1.1")]);
        catalog.set_favorite(&key("1.0"), true);
        catalog.select(Some(key("1.0")));
        catalog.mark_installing(&key("1.0"));

        let mut fresh = CatalogEntry::new(key("1.0"), "Release 1.0", EntryStatus::Installed);
        fresh.size_hint = Some(2048);
        let merged = catalog.merge_installed(&key("1.0"), Some(fresh));

        assert_eq!(merged.display, "Release 1.0");
        let entries = catalog.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].key, key("1.0"));
        assert_eq!(entries[1].status, EntryStatus::Installed);
        assert_eq!(entries[1].size_hint, Some(2048));
        assert!(catalog.is_favorite(&key("1.0")));
        assert_eq!(catalog.selected(), Some(key("1.0")));
    }

    #[test]
    fn merge_without_fresh_entry_promotes_placeholder() {
        let catalog = Catalog::new();
        catalog.mark_installing(&key("1.2.5"));
        let merged = catalog.merge_installed(&key("1.2.5"), None);

        assert_eq!(merged.status, EntryStatus::Installed);
        assert_eq!(merged.display, "1.2.5");
        assert_eq!(merged.source_tag.as_deref(), Some(INSTALLED_TAG));
        assert_eq!(catalog.installed().len(), 1);

        // A later clear does not remove the promoted row.
        catalog.clear_installing(&key("1.2.5"));
        assert!(catalog.entry(&key("1.2.5")).is_some());
    }

    #[test]
    fn absorbing_twice_leaves_one_row() {
        let catalog = Catalog::with_entries(vec![available("1.0")]);
        let installed = vec![CatalogEntry::new(key("1.0"), "1.0", EntryStatus::Installed)];
        catalog.absorb_installed(&installed);
        catalog.absorb_installed(&installed);

        let rows: Vec<_> = catalog
            .entries()
            .into_iter()
            .filter(|e| e.key == key("1.0"))
            .collect();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_installed());
    }
}
