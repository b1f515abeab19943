use std::cmp::Ordering;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use piidash_store::{UiFilterStore, UserEntityStore, UserList};
use piidash_types::{SortColumn, SortDirection, SortSpec, User};
use serde::Serialize;
use tracing::debug;

use crate::debounce::{Debouncer, SEARCH_DEBOUNCE};

/// Aggregates over the filtered rows.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: usize,
    pub total_pii_items: usize,
    /// Rounded to two decimals; 0 when there are no rows.
    pub avg_data_sources_per_user: f64,
}

/// Inputs that decide whether `filtered` has to be recomputed.
#[derive(Clone, Debug, PartialEq, Eq)]
struct FilterKey {
    users: usize,
    search: String,
    selected: String,
    column: Option<SortColumn>,
    direction: Option<SortDirection>,
}

struct Memo<K, V> {
    key: K,
    value: Arc<V>,
}

/// View model behind the users dashboard: filtered/sorted rows, stats, and
/// the operator actions that feed the UI store.
pub struct DashboardViewModel {
    users: UserEntityStore,
    ui: UiFilterStore,
    rows_memo: Mutex<Option<Memo<FilterKey, Vec<Arc<User>>>>>,
    stats_memo: Mutex<Option<Memo<String, DashboardStats>>>,
    search_debounce: Debouncer,
}

impl DashboardViewModel {
    pub fn new(users: UserEntityStore, ui: UiFilterStore) -> Self {
        Self::with_debounce(users, ui, SEARCH_DEBOUNCE)
    }

    pub fn with_debounce(users: UserEntityStore, ui: UiFilterStore, delay: Duration) -> Self {
        Self {
            users,
            ui,
            rows_memo: Mutex::new(None),
            stats_memo: Mutex::new(None),
            search_debounce: Debouncer::new(delay),
        }
    }

    /// Rows after search, PII filter and sort.
    ///
    /// Returns the same `Arc` as the previous call while the user count and
    /// the UI state are unchanged, so callers can skip work with `Arc::ptr_eq`.
    pub fn filtered(&self) -> UserList {
        let users = self.users.all().get();
        let ui = self.ui.snapshot();
        let key = FilterKey {
            users: users.len(),
            search: ui.search.clone(),
            selected: ui.selected_pii_types.join(","),
            column: ui.sort.map(|s| s.column),
            direction: ui.sort.map(|s| s.direction),
        };

        let mut memo = self.rows_memo.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(m) = memo.as_ref().filter(|m| m.key == key) {
            return Arc::clone(&m.value);
        }

        let mut rows = apply_filters(&users, &ui.search, &ui.selected_pii_types);
        if let Some(sort) = ui.sort {
            apply_sort(&mut rows, sort);
        }
        debug!(rows = rows.len(), of = users.len(), "recomputed dashboard rows");
        let rows = Arc::new(rows);
        *memo = Some(Memo {
            key,
            value: Arc::clone(&rows),
        });
        rows
    }

    /// Stats over `filtered()`, memoized on the filtered ids.
    pub fn stats(&self) -> Arc<DashboardStats> {
        let rows = self.filtered();
        let ids: Vec<String> = rows.iter().map(|u| u.id.to_string()).collect();
        let key = format!("{}-{}", rows.len(), ids.join(","));

        let mut memo = self.stats_memo.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(m) = memo.as_ref().filter(|m| m.key == key) {
            return Arc::clone(&m.value);
        }
        let stats = Arc::new(compute_stats(&rows));
        *memo = Some(Memo {
            key,
            value: Arc::clone(&stats),
        });
        stats
    }

    /// PII categories available as filter options.
    pub fn pii_types(&self) -> Vec<String> {
        self.users.pii_types().get()
    }

    pub fn search(&self) -> String {
        self.ui.search().get()
    }

    pub fn selected_pii_types(&self) -> Vec<String> {
        self.ui.selected_pii_types().get()
    }

    pub fn sort(&self) -> Option<SortSpec> {
        self.ui.sort().get()
    }

    /// Apply `text` as the search after the debounce delay; a later call
    /// within the delay replaces it.
    ///
    /// Debouncing needs a tokio runtime. Without one the search is applied
    /// at once and this returns false.
    pub fn on_search_debounced(&self, text: &str) -> bool {
        let ui = self.ui.clone();
        let text = text.to_string();
        self.search_debounce.schedule(move || ui.set_search(Some(&text)))
    }

    pub fn has_pending_search(&self) -> bool {
        self.search_debounce.is_pending()
    }

    pub fn on_toggle_pii_type(&self, name: &str, checked: bool) {
        self.ui.toggle_category_filter(name, checked);
    }

    /// Sort by `column` ascending, or flip the direction if it is already
    /// the sort column.
    pub fn on_sort(&self, column: SortColumn) {
        let next = match self.ui.sort().get() {
            Some(current) if current.column == column => SortSpec {
                column,
                direction: current.direction.flipped(),
            },
            _ => SortSpec::asc(column),
        };
        self.ui.set_sort(Some(next));
    }

    pub fn on_clear_filters(&self) {
        self.search_debounce.cancel();
        self.ui.clear_filters();
    }
}

/// Keep users whose name contains `search` (already lower-cased) and whose
/// PII has every selected category as a key.
pub fn apply_filters(users: &[Arc<User>], search: &str, selected: &[String]) -> Vec<Arc<User>> {
    users
        .iter()
        .filter(|u| {
            if !search.is_empty() {
                let Some(name) = &u.name else { return false };
                if !name.to_lowercase().contains(search) {
                    return false;
                }
            }
            selected.iter().all(|category| u.has_pii_type(category))
        })
        .cloned()
        .collect()
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SortValue<'a> {
    Number(i64),
    Count(u64),
    Text(&'a str),
    /// A composite attribute: present values do not order among themselves.
    Present,
}

fn sort_value(user: &User, column: SortColumn) -> Option<SortValue<'_>> {
    match column {
        SortColumn::Id => Some(SortValue::Number(user.id)),
        SortColumn::Name => user.name.as_deref().map(SortValue::Text),
        SortColumn::Pii => user.pii.as_ref().map(|_| SortValue::Present),
        SortColumn::DataSources => user.data_sources.as_ref().map(|_| SortValue::Present),
        SortColumn::DataSourcesCount => Some(SortValue::Count(user.data_sources_count)),
    }
}

/// Stable sort on one column. Missing values go last in both directions.
pub fn apply_sort(rows: &mut [Arc<User>], sort: SortSpec) {
    rows.sort_by(|a, b| {
        match (sort_value(a, sort.column), sort_value(b, sort.column)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(x), Some(y)) => {
                let ord = x.cmp(&y);
                match sort.direction {
                    SortDirection::Asc => ord,
                    SortDirection::Desc => ord.reverse(),
                }
            }
        }
    });
}

pub fn compute_stats(rows: &[Arc<User>]) -> DashboardStats {
    let total_users = rows.len();
    let total_pii_items = rows.iter().map(|u| u.pii_item_count()).sum();
    let total_sources: u64 = rows.iter().map(|u| u.data_sources_count).sum();
    let avg_data_sources_per_user = if total_users > 0 {
        round_cents(total_sources as f64 / total_users as f64)
    } else {
        0.0
    };
    DashboardStats {
        total_users,
        total_pii_items,
        avg_data_sources_per_user,
    }
}

/// Two-decimal rounding of a non-negative value, decided on its exact binary
/// expansion: 2.675 is stored just below the half and rounds down, while an
/// exact half such as 0.125 rounds up.
fn round_cents(x: f64) -> f64 {
    let exact = format!("{x:.60}");
    let exact_half = exact
        .split_once('.')
        .map(|(_, frac)| frac.as_bytes())
        .is_some_and(|frac| frac[2] == b'5' && frac[3..].iter().all(|&b| b == b'0'));
    if exact_half {
        return (x * 100.0).ceil() / 100.0;
    }
    format!("{x:.2}").parse().unwrap_or(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use piidash_store::SessionBlobStore;
    use piidash_types::{DataSources, ListMap, PiiMap};

    fn named(id: i64, name: Option<&str>) -> Arc<User> {
        Arc::new(User::new(id, name.map(str::to_string), None, None))
    }

    fn names(rows: &[Arc<User>]) -> Vec<Option<&str>> {
        rows.iter().map(|u| u.name.as_deref()).collect()
    }

    fn with_pii(id: i64, name: &str, pii: &[(&str, usize)], docs: usize) -> User {
        let pii: PiiMap = pii
            .iter()
            .map(|(k, n)| (*k, (0..*n).map(|i| format!("{k}{i}")).collect::<Vec<_>>()))
            .collect();
        let sources: ListMap = [("documents", (0..docs).map(|i| format!("d{i}")).collect::<Vec<_>>())]
            .into_iter()
            .collect();
        User::new(id, Some(name.into()), Some(pii), Some(DataSources::Grouped(sources)))
    }

    fn view_model() -> DashboardViewModel {
        let users = UserEntityStore::new();
        let ui = UiFilterStore::with_default_key(Arc::new(SessionBlobStore::new()));
        DashboardViewModel::new(users, ui)
    }

    #[test]
    fn null_names_sort_last_in_both_directions() {
        let base = vec![named(1, Some("b")), named(2, None), named(3, Some("a"))];

        let mut asc = base.clone();
        apply_sort(&mut asc, SortSpec::asc(SortColumn::Name));
        assert_eq!(names(&asc), vec![Some("a"), Some("b"), None]);

        let mut desc = base;
        apply_sort(&mut desc, SortSpec::desc(SortColumn::Name));
        assert_eq!(names(&desc), vec![Some("b"), Some("a"), None]);
    }

    #[test]
    fn sort_is_stable_for_ties_and_missing_values() {
        let mut rows = vec![
            named(1, None),
            named(2, Some("x")),
            named(3, None),
            named(4, Some("x")),
        ];
        apply_sort(&mut rows, SortSpec::desc(SortColumn::Name));
        assert_eq!(rows.iter().map(|u| u.id).collect::<Vec<_>>(), vec![2, 4, 1, 3]);
    }

    #[test]
    fn sorts_numerically_by_data_source_count() {
        let mut rows: Vec<Arc<User>> = [(1, 10), (2, 9), (3, 100)]
            .into_iter()
            .map(|(id, docs)| Arc::new(with_pii(id, "u", &[], docs)))
            .collect();
        apply_sort(&mut rows, SortSpec::asc(SortColumn::DataSourcesCount));
        assert_eq!(rows.iter().map(|u| u.id).collect::<Vec<_>>(), vec![2, 1, 3]);
    }

    #[test]
    fn search_requires_a_name() {
        let rows = vec![named(1, Some("Alice")), named(2, None), named(3, Some("Bob"))];
        let hits = apply_filters(&rows, "ali", &[]);
        assert_eq!(names(&hits), vec![Some("Alice")]);
        assert_eq!(apply_filters(&rows, "", &[]).len(), 3);
    }

    #[test]
    fn category_filter_needs_every_key_even_if_empty() {
        let users: Vec<Arc<User>> = vec![
            Arc::new(with_pii(1, "a", &[("email", 1), ("phone", 0)], 0)),
            Arc::new(with_pii(2, "b", &[("email", 2)], 0)),
            Arc::new(with_pii(3, "c", &[("phone", 1)], 0)),
            named(4, Some("d")),
        ];
        let email = apply_filters(&users, "", &["email".to_string()]);
        let both = apply_filters(&users, "", &["email".to_string(), "phone".to_string()]);
        assert_eq!(email.iter().map(|u| u.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(both.iter().map(|u| u.id).collect::<Vec<_>>(), vec![1]);
        assert!(both.iter().all(|u| email.iter().any(|e| e.id == u.id)));
    }

    #[test]
    fn stats_on_empty_rows_are_zero() {
        assert_eq!(
            compute_stats(&[]),
            DashboardStats {
                total_users: 0,
                total_pii_items: 0,
                avg_data_sources_per_user: 0.0,
            }
        );
    }

    #[test]
    fn stats_round_average_to_two_decimals() {
        let rows: Vec<Arc<User>> = vec![
            Arc::new(with_pii(1, "a", &[("email", 2), ("phone", 1)], 1)),
            Arc::new(with_pii(2, "b", &[("email", 0)], 1)),
            Arc::new(with_pii(3, "c", &[], 0)),
        ];
        let stats = compute_stats(&rows);
        assert_eq!(stats.total_users, 3);
        assert_eq!(stats.total_pii_items, 3);
        assert_eq!(stats.avg_data_sources_per_user, 0.67);
    }

    #[test]
    fn average_rounds_on_the_stored_binary_value() {
        assert_eq!(round_cents(107.0 / 40.0), 2.67);
        assert_eq!(round_cents(1.0 / 8.0), 0.13);
        assert_eq!(round_cents(2.0 / 3.0), 0.67);
        assert_eq!(round_cents(3.0), 3.0);

        let rows: Vec<Arc<User>> = (0..40)
            .map(|id| Arc::new(with_pii(id, "u", &[], if id < 27 { 3 } else { 2 })))
            .collect();
        // 27 * 3 + 13 * 2 = 107 sources over 40 users.
        assert_eq!(compute_stats(&rows).avg_data_sources_per_user, 2.67);
    }

    #[test]
    fn stats_serialize_with_dashboard_names() {
        let json = serde_json::to_value(compute_stats(&[])).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"totalUsers": 0, "totalPiiItems": 0, "avgDataSourcesPerUser": 0.0})
        );
    }

    #[test]
    fn filtered_and_stats_are_memoized_by_reference() {
        let vm = view_model();
        vm.users.set_all(vec![with_pii(1, "Ann", &[("email", 1)], 2)]);

        let first = vm.filtered();
        let again = vm.filtered();
        assert!(Arc::ptr_eq(&first, &again));

        let s1 = vm.stats();
        let s2 = vm.stats();
        assert!(Arc::ptr_eq(&s1, &s2));

        vm.on_toggle_pii_type("email", true);
        let after = vm.filtered();
        assert!(!Arc::ptr_eq(&first, &after));
        // Same rows, same ids: the stats memo still holds.
        assert!(Arc::ptr_eq(&s1, &vm.stats()));
    }

    #[test]
    fn debounced_search_outside_runtime_applies_at_once() {
        let vm = view_model();
        assert!(!vm.on_search_debounced("  Ann "));
        assert_eq!(vm.search(), "ann");
        assert!(!vm.has_pending_search());
    }

    #[test]
    fn on_sort_toggles_direction_per_column() {
        let vm = view_model();
        vm.on_sort(SortColumn::Name);
        assert_eq!(vm.sort(), Some(SortSpec::asc(SortColumn::Name)));
        vm.on_sort(SortColumn::Name);
        assert_eq!(vm.sort(), Some(SortSpec::desc(SortColumn::Name)));
        vm.on_sort(SortColumn::DataSourcesCount);
        assert_eq!(vm.sort(), Some(SortSpec::asc(SortColumn::DataSourcesCount)));
    }

    #[test]
    fn sort_after_filter_through_view_model() {
        let vm = view_model();
        vm.users.set_all(vec![
            with_pii(1, "Carol", &[("email", 1)], 3),
            with_pii(2, "alice", &[("email", 1)], 1),
            with_pii(3, "Bob", &[], 2),
        ]);
        vm.on_toggle_pii_type("email", true);
        vm.on_sort(SortColumn::Name);
        let rows = vm.filtered();
        // Byte order: upper-case sorts before lower-case.
        assert_eq!(rows.iter().map(|u| u.id).collect::<Vec<_>>(), vec![1, 2]);
        vm.on_sort(SortColumn::DataSourcesCount);
        let rows = vm.filtered();
        assert_eq!(rows.iter().map(|u| u.id).collect::<Vec<_>>(), vec![2, 1]);
    }
}
