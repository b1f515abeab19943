use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

pub mod normalize;
pub mod ui;

pub use ui::{SortColumn, SortDirection, SortSpec, UiFilterState};

/// Primary key of a user record in the entity store.
pub type UserId = i64;

/// Data-source kinds that contribute to `User::data_sources_count`.
pub const CANONICAL_SOURCE_KINDS: [&str; 4] = ["documents", "databases", "emails", "chats"];

/// Group name used by the detail view for a flat data-source list.
pub const ALL_DATA_SOURCES: &str = "All data sources";

/// Ordered mapping from a name to a list of string values.
///
/// Keeps the key order of the source record, which is the order the detail
/// view renders groups in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListMap {
    entries: Vec<(String, Vec<String>)>,
}

impl ListMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite `key`. An overwrite keeps the original position.
    pub fn insert(&mut self, key: impl Into<String>, values: Vec<String>) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = values,
            None => self.entries.push((key, values)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of the lengths of every list.
    pub fn total_items(&self) -> usize {
        self.entries.iter().map(|(_, v)| v.len()).sum()
    }

    /// Entries whose list is non-empty, cloned out in key order.
    pub fn non_empty_entries(&self) -> Vec<(String, Vec<String>)> {
        self.entries
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .cloned()
            .collect()
    }
}

impl<K: Into<String>> FromIterator<(K, Vec<String>)> for ListMap {
    fn from_iter<I: IntoIterator<Item = (K, Vec<String>)>>(iter: I) -> Self {
        let mut map = ListMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl Serialize for ListMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// PII category name → values.
pub type PiiMap = ListMap;

/// Provenance of a user's data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DataSources {
    /// Source kind (documents, databases, ...) → identifiers.
    Grouped(ListMap),
    /// Legacy flat list of identifiers.
    Flat(Vec<String>),
}

impl DataSources {
    /// Sum of the canonical kinds' lengths. A flat list has no kinds and counts 0.
    pub fn canonical_count(&self) -> u64 {
        match self {
            DataSources::Grouped(groups) => CANONICAL_SOURCE_KINDS
                .iter()
                .map(|kind| groups.get(kind).map_or(0, |v| v.len() as u64))
                .sum(),
            DataSources::Flat(_) => 0,
        }
    }
}

/// A user record as held by the entity store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub name: Option<String>,
    pub pii: Option<PiiMap>,
    #[serde(rename = "dataSources")]
    pub data_sources: Option<DataSources>,
    /// Attached once at ingest; downstream code reads it, never recomputes it.
    #[serde(rename = "_dataSourcesCount")]
    pub data_sources_count: u64,
}

impl User {
    /// Build a record and attach its data-source count.
    pub fn new(
        id: UserId,
        name: Option<String>,
        pii: Option<PiiMap>,
        data_sources: Option<DataSources>,
    ) -> Self {
        let data_sources_count = data_sources.as_ref().map_or(0, DataSources::canonical_count);
        Self {
            id,
            name,
            pii,
            data_sources,
            data_sources_count,
        }
    }

    pub fn has_pii_type(&self, category: &str) -> bool {
        self.pii.as_ref().is_some_and(|p| p.contains_key(category))
    }

    pub fn pii_item_count(&self) -> usize {
        self.pii.as_ref().map_or(0, ListMap::total_items)
    }
}

/// Result of looking an entity up in a store that may not have loaded yet.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Lookup<T> {
    /// Nothing resolved yet.
    #[default]
    Pending,
    /// Resolved, and no entity has this id.
    Missing,
    Found(T),
}

impl<T> Lookup<T> {
    pub fn found(&self) -> Option<&T> {
        match self {
            Lookup::Found(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Lookup::Pending)
    }
}
