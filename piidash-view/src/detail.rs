use std::sync::{Arc, Mutex, PoisonError};

use piidash_store::{Observable, Subject, Subscription, UserCollection, UserEntityStore};
use piidash_types::normalize::id_from_text;
use piidash_types::{DataSources, Lookup, User, ALL_DATA_SOURCES};
use tracing::debug;

pub type Group = (String, Vec<String>);

#[derive(Default)]
struct Route {
    id: Option<String>,
    lookup: Option<Subscription>,
}

/// View model behind the single-user detail page.
///
/// The route id arrives asynchronously. Until a non-empty id has been seen,
/// and while the store has not loaded, `person` is `Lookup::Pending`.
pub struct UserDetailViewModel {
    users: UserEntityStore,
    person: Subject<Lookup<Arc<User>>>,
    route: Mutex<Route>,
}

impl UserDetailViewModel {
    pub fn new(users: UserEntityStore) -> Self {
        Self {
            users,
            person: Subject::new(Lookup::Pending),
            route: Mutex::new(Route::default()),
        }
    }

    /// Feed the route parameter. Absent, empty, and repeated ids are ignored.
    pub fn set_route_id(&self, id: Option<&str>) {
        let Some(id) = id.filter(|id| !id.is_empty()) else { return };

        let previous = {
            let mut route = self.route.lock().unwrap_or_else(PoisonError::into_inner);
            if route.id.as_deref() == Some(id) {
                return;
            }
            route.id = Some(id.to_string());
            route.lookup.take()
        };
        // Switch: the old lookup stops before the new one starts.
        drop(previous);

        debug!(id, "detail lookup");
        let person = self.person.clone();
        let subscription = lookup_for(&self.users, id).subscribe(move |found| person.next(found.clone()));

        let mut route = self.route.lock().unwrap_or_else(PoisonError::into_inner);
        // A newer id may have arrived while subscribing.
        if route.id.as_deref() == Some(id) {
            route.lookup = Some(subscription);
        }
    }

    pub fn route_id(&self) -> Option<String> {
        self.route
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .id
            .clone()
    }

    pub fn person(&self) -> Lookup<Arc<User>> {
        self.person.get()
    }

    pub fn person_changes(&self) -> Observable<Lookup<Arc<User>>> {
        self.person.observable()
    }

    /// PII categories with at least one value.
    pub fn pii_entries(&self) -> Vec<Group> {
        self.person().found().map(|u| pii_entries(u)).unwrap_or_default()
    }

    /// Non-empty data-source groups.
    pub fn data_source_groups(&self) -> Vec<Group> {
        self.person().found().map(|u| data_source_groups(u)).unwrap_or_default()
    }
}

// Route ids are strings; one that is not a whole number can never match a key.
fn lookup_for(users: &UserEntityStore, id: &str) -> Observable<Lookup<Arc<User>>> {
    match id_from_text(id) {
        Some(id) => users.get_by_id(id),
        None => users.collection().select(|c: &UserCollection| {
            if c.is_loaded() {
                Lookup::Missing
            } else {
                Lookup::Pending
            }
        }),
    }
}

pub fn pii_entries(user: &User) -> Vec<Group> {
    user.pii
        .as_ref()
        .map(|pii| pii.non_empty_entries())
        .unwrap_or_default()
}

/// A flat list becomes one "All data sources" group; a grouped mapping keeps
/// its non-empty groups in order.
pub fn data_source_groups(user: &User) -> Vec<Group> {
    match &user.data_sources {
        Some(DataSources::Flat(items)) if !items.is_empty() => {
            vec![(ALL_DATA_SOURCES.to_string(), items.clone())]
        }
        Some(DataSources::Flat(_)) | None => Vec::new(),
        Some(DataSources::Grouped(groups)) => groups.non_empty_entries(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use piidash_types::ListMap;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn with_sources(sources: Option<DataSources>) -> User {
        User::new(1, Some("Ann".into()), None, sources)
    }

    #[test]
    fn flat_sources_form_one_group() {
        let user = with_sources(Some(DataSources::Flat(strings(&["a", "b"]))));
        assert_eq!(
            data_source_groups(&user),
            vec![("All data sources".to_string(), strings(&["a", "b"]))]
        );
        let empty = with_sources(Some(DataSources::Flat(Vec::new())));
        assert!(data_source_groups(&empty).is_empty());
    }

    #[test]
    fn grouped_sources_skip_empty_groups() {
        let groups: ListMap = [
            ("documents", strings(&["d1"])),
            ("emails", Vec::new()),
            ("chats", strings(&["c1", "c2"])),
        ]
        .into_iter()
        .collect();
        let user = with_sources(Some(DataSources::Grouped(groups)));
        assert_eq!(
            data_source_groups(&user),
            vec![
                ("documents".to_string(), strings(&["d1"])),
                ("chats".to_string(), strings(&["c1", "c2"])),
            ]
        );
        assert!(data_source_groups(&with_sources(None)).is_empty());
    }

    #[test]
    fn non_list_group_is_left_out() {
        let user = piidash_types::normalize::user_from_value(&serde_json::json!({
            "id": 1,
            "dataSources": {"documents": "x", "chats": ["c"]}
        }))
        .unwrap();
        assert_eq!(data_source_groups(&user), vec![("chats".to_string(), strings(&["c"]))]);
        assert_eq!(user.data_sources_count, 1);
    }

    #[test]
    fn pii_entries_keep_non_empty_lists() {
        let pii: ListMap = [("email", strings(&["a@x"])), ("phone", Vec::new())]
            .into_iter()
            .collect();
        let user = User::new(1, None, Some(pii), None);
        assert_eq!(pii_entries(&user), vec![("email".to_string(), strings(&["a@x"]))]);
        assert!(pii_entries(&User::new(2, None, None, None)).is_empty());
    }
}
