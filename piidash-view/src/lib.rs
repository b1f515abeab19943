//! Derived view state for the dashboard and detail pages.

pub mod dashboard;
pub use dashboard::{apply_filters, apply_sort, compute_stats, DashboardStats, DashboardViewModel};

pub mod debounce;
pub use debounce::{Debouncer, SEARCH_DEBOUNCE};

pub mod detail;
pub use detail::{data_source_groups, pii_entries, Group, UserDetailViewModel};
