use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use piidash_types::{SortSpec, UiFilterState};
use tracing::{debug, warn};

use crate::blob::BlobStore;
use crate::observable::{Observable, Subject};

/// Key the UI state blob is stored under unless configured otherwise.
pub const DEFAULT_STORAGE_KEY: &str = "users-ui";

/// Operator-controlled search/filter/sort state.
///
/// Every operation writes the full resulting state to the blob store
/// (last write wins). Subscribers are only notified when the state changed.
#[derive(Clone)]
pub struct UiFilterStore {
    state: Subject<UiFilterState>,
    search: Observable<String>,
    selected_pii_types: Observable<Vec<String>>,
    sort: Observable<Option<SortSpec>>,
    blobs: Arc<dyn BlobStore>,
    key: String,
    /// Bumped under the state lock on every operation.
    revision: Arc<AtomicU64>,
    /// Revision of the last blob written.
    persisted: Arc<Mutex<u64>>,
}

impl UiFilterStore {
    /// Restore from the blob under `key`, or start empty when it is missing
    /// or unreadable.
    pub fn new(blobs: Arc<dyn BlobStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let initial = load_state(blobs.as_ref(), &key);
        let state = Subject::new(initial);
        let source = state.observable();
        Self {
            search: source.select(|s: &UiFilterState| s.search.clone()),
            selected_pii_types: source.select(|s: &UiFilterState| s.selected_pii_types.clone()),
            sort: source.select(|s: &UiFilterState| s.sort),
            state,
            blobs,
            key,
            revision: Arc::new(AtomicU64::new(0)),
            persisted: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_default_key(blobs: Arc<dyn BlobStore>) -> Self {
        Self::new(blobs, DEFAULT_STORAGE_KEY)
    }

    /// Store the trimmed, lower-cased text. `None` clears the search.
    pub fn set_search(&self, text: Option<&str>) {
        let search = UiFilterState::normalize_search(text);
        self.apply("set_search", |s| s.search = search);
    }

    /// Add (`enabled`) or remove a PII category from the filter set.
    pub fn toggle_category_filter(&self, name: &str, enabled: bool) {
        self.apply("toggle_category_filter", |s| {
            let present = s.selected_pii_types.iter().any(|t| t == name);
            if enabled && !present {
                s.selected_pii_types.push(name.to_string());
            } else if !enabled && present {
                s.selected_pii_types.retain(|t| t != name);
            }
        });
    }

    pub fn set_sort(&self, sort: Option<SortSpec>) {
        self.apply("set_sort", |s| s.sort = sort);
    }

    pub fn clear_filters(&self) {
        self.apply("clear_filters", |s| *s = UiFilterState::default());
    }

    pub fn snapshot(&self) -> UiFilterState {
        self.state.get()
    }

    pub fn state(&self) -> Observable<UiFilterState> {
        self.state.observable()
    }

    pub fn search(&self) -> Observable<String> {
        self.search.clone()
    }

    pub fn selected_pii_types(&self) -> Observable<Vec<String>> {
        self.selected_pii_types.clone()
    }

    pub fn sort(&self) -> Observable<Option<SortSpec>> {
        self.sort.clone()
    }

    pub fn storage_key(&self) -> &str {
        &self.key
    }

    // Read-modify-write happens under the state lock, so concurrent operations
    // (a debounced search firing next to a toggle) never overwrite each other.
    fn apply(&self, op: &str, f: impl FnOnce(&mut UiFilterState)) {
        let mut revision = 0;
        let mut changed = false;
        let next = self.state.update(|state| {
            revision = self.revision.fetch_add(1, Ordering::Relaxed) + 1;
            let before = state.clone();
            f(state);
            changed = *state != before;
            changed
        });
        if changed {
            debug!(op, revision, state = ?next, "ui state changed");
        }
        self.persist(&next, revision);
    }

    fn persist(&self, state: &UiFilterState, revision: u64) {
        let mut persisted = self.persisted.lock().unwrap_or_else(PoisonError::into_inner);
        // A newer state already reached the blob store.
        if *persisted > revision {
            return;
        }
        let blob = match serde_json::to_string(state) {
            Ok(blob) => blob,
            Err(e) => {
                warn!(error = %e, "could not serialize ui state");
                return;
            }
        };
        match self.blobs.set(&self.key, &blob) {
            Ok(()) => *persisted = revision,
            Err(e) => warn!(key = %self.key, error = %e, "could not persist ui state"),
        }
    }
}

fn load_state(blobs: &dyn BlobStore, key: &str) -> UiFilterState {
    let blob = match blobs.get(key) {
        Ok(Some(blob)) => blob,
        Ok(None) => return UiFilterState::default(),
        Err(e) => {
            warn!(key, error = %e, "could not read persisted ui state");
            return UiFilterState::default();
        }
    };
    match serde_json::from_str::<UiFilterState>(&blob) {
        Ok(mut state) => {
            // Best effort: the blob may have been edited by hand.
            state.search = UiFilterState::normalize_search(Some(&state.search));
            let mut seen = Vec::with_capacity(state.selected_pii_types.len());
            state.selected_pii_types.retain(|t| {
                if seen.contains(t) {
                    false
                } else {
                    seen.push(t.clone());
                    true
                }
            });
            state
        }
        Err(e) => {
            warn!(key, error = %e, "discarding unreadable ui state");
            UiFilterState::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::SessionBlobStore;
    use piidash_types::SortColumn;
    use std::sync::Mutex;

    fn fresh() -> (UiFilterStore, Arc<SessionBlobStore>) {
        let blobs = Arc::new(SessionBlobStore::new());
        (UiFilterStore::with_default_key(blobs.clone()), blobs)
    }

    fn persisted(blobs: &SessionBlobStore) -> serde_json::Value {
        let blob = blobs.get(DEFAULT_STORAGE_KEY).unwrap().unwrap();
        serde_json::from_str(&blob).unwrap()
    }

    #[test]
    fn initial_selectors_are_empty() {
        let (store, _) = fresh();
        assert_eq!(store.search().get(), "");
        assert!(store.selected_pii_types().get().is_empty());
        assert_eq!(store.sort().get(), None);
    }

    #[test]
    fn set_search_trims_and_lowercases() {
        let (store, _) = fresh();
        store.set_search(Some("  AlIce  "));
        assert_eq!(store.search().get(), "alice");
        store.set_search(Some("   "));
        assert_eq!(store.search().get(), "");
        store.set_search(Some("x"));
        store.set_search(None);
        assert_eq!(store.search().get(), "");
    }

    #[test]
    fn toggle_adds_dedupes_and_removes() {
        let (store, _) = fresh();
        store.toggle_category_filter("email", true);
        assert_eq!(store.selected_pii_types().get(), vec!["email"]);
        store.toggle_category_filter("email", true);
        assert_eq!(store.selected_pii_types().get(), vec!["email"]);
        store.toggle_category_filter("phone", true);
        assert_eq!(store.selected_pii_types().get(), vec!["email", "phone"]);
        store.toggle_category_filter("email", false);
        assert_eq!(store.selected_pii_types().get(), vec!["phone"]);
        store.toggle_category_filter("does-not-exist", false);
        assert_eq!(store.selected_pii_types().get(), vec!["phone"]);
    }

    #[test]
    fn repeated_toggle_does_not_renotify() {
        let (store, _) = fresh();
        let emissions = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&emissions);
        let _sub = store.state().listen(move |_| *counter.lock().unwrap() += 1);
        store.toggle_category_filter("email", true);
        store.toggle_category_filter("email", true);
        assert_eq!(*emissions.lock().unwrap(), 1);
    }

    #[test]
    fn set_sort_replaces_and_clears() {
        let (store, _) = fresh();
        let by_name = SortSpec::asc(SortColumn::Name);
        store.set_sort(Some(by_name));
        assert_eq!(store.sort().get(), Some(by_name));
        let by_count = SortSpec::desc(SortColumn::DataSourcesCount);
        store.set_sort(Some(by_count));
        assert_eq!(store.sort().get(), Some(by_count));
        store.set_sort(None);
        assert_eq!(store.sort().get(), None);
    }

    #[test]
    fn every_operation_persists_full_state() {
        let (store, blobs) = fresh();
        store.set_search(Some("bob"));
        store.toggle_category_filter("email", true);
        store.set_sort(Some(SortSpec::asc(SortColumn::Name)));
        assert_eq!(
            persisted(&blobs),
            serde_json::json!({
                "search": "bob",
                "selectedPiiTypes": ["email"],
                "sort": {"column": "name", "direction": "asc"}
            })
        );

        store.clear_filters();
        assert!(store.snapshot().is_empty());
        assert_eq!(
            persisted(&blobs),
            serde_json::json!({"search": "", "selectedPiiTypes": [], "sort": null})
        );
    }

    #[test]
    fn no_op_still_writes_blob() {
        let (store, blobs) = fresh();
        store.toggle_category_filter("missing", false);
        assert_eq!(
            persisted(&blobs),
            serde_json::json!({"search": "", "selectedPiiTypes": [], "sort": null})
        );
    }

    #[test]
    fn concurrent_search_and_toggles_all_survive() {
        for _ in 0..20 {
            let (store, blobs) = fresh();
            std::thread::scope(|scope| {
                let searcher = store.clone();
                scope.spawn(move || {
                    for i in 0..50 {
                        searcher.set_search(Some(&format!("Q{i}")));
                    }
                });
                let toggler = store.clone();
                scope.spawn(move || {
                    for i in 0..50 {
                        toggler.toggle_category_filter(&format!("c{i}"), true);
                    }
                });
            });

            let state = store.snapshot();
            assert_eq!(state.search, "q49");
            assert_eq!(state.selected_pii_types.len(), 50);
            assert_eq!(store.search().get(), "q49");
            assert_eq!(store.selected_pii_types().get(), state.selected_pii_types);

            let blob = blobs.get(DEFAULT_STORAGE_KEY).unwrap().unwrap();
            let saved: UiFilterState = serde_json::from_str(&blob).unwrap();
            assert_eq!(saved, state);
        }
    }

    #[test]
    fn restores_prior_session_state() {
        let blobs = Arc::new(SessionBlobStore::new());
        {
            let store = UiFilterStore::with_default_key(blobs.clone());
            store.set_search(Some("Ann"));
            store.toggle_category_filter("phone", true);
        }
        let restored = UiFilterStore::with_default_key(blobs);
        assert_eq!(restored.search().get(), "ann");
        assert_eq!(restored.selected_pii_types().get(), vec!["phone"]);
    }

    #[test]
    fn unreadable_blob_falls_back_to_defaults() {
        let blobs = Arc::new(SessionBlobStore::new());
        blobs.set(DEFAULT_STORAGE_KEY, "{\"search\": 5").unwrap();
        let store = UiFilterStore::with_default_key(blobs);
        assert!(store.snapshot().is_empty());
    }
}
