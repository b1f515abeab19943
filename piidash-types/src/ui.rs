use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Column the dashboard rows can be ordered by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortColumn {
    #[serde(rename = "id")]
    Id,
    #[serde(rename = "name")]
    Name,
    #[serde(rename = "pii")]
    Pii,
    #[serde(rename = "dataSources")]
    DataSources,
    /// Synthetic column backed by `User::data_sources_count`.
    #[serde(rename = "dataSourcesCount")]
    DataSourcesCount,
}

impl SortColumn {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortColumn::Id => "id",
            SortColumn::Name => "name",
            SortColumn::Pii => "pii",
            SortColumn::DataSources => "dataSources",
            SortColumn::DataSourcesCount => "dataSourcesCount",
        }
    }
}

impl fmt::Display for SortColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(SortColumn::Id),
            "name" => Ok(SortColumn::Name),
            "pii" => Ok(SortColumn::Pii),
            "dataSources" | "data_sources" => Ok(SortColumn::DataSources),
            "dataSourcesCount" | "data_sources_count" => Ok(SortColumn::DataSourcesCount),
            other => Err(format!("unknown sort column: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortSpec {
    pub column: SortColumn,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(column: SortColumn) -> Self {
        Self {
            column,
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: SortColumn) -> Self {
        Self {
            column,
            direction: SortDirection::Desc,
        }
    }
}

/// Operator-controlled dashboard state. This is also the persisted blob shape:
/// `{"search": "...", "selectedPiiTypes": [...], "sort": {...} | null}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiFilterState {
    pub search: String,
    /// Insertion-ordered, no duplicates.
    #[serde(rename = "selectedPiiTypes")]
    pub selected_pii_types: Vec<String>,
    pub sort: Option<SortSpec>,
}

impl UiFilterState {
    /// Trimmed, lower-cased search text; `None` becomes empty.
    pub fn normalize_search(text: Option<&str>) -> String {
        text.map(|t| t.trim().to_lowercase()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.search.is_empty() && self.selected_pii_types.is_empty() && self.sort.is_none()
    }
}
