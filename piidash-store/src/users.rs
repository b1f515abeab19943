use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use piidash_types::{Lookup, User, UserId};
use tracing::debug;

use crate::observable::{Observable, Subject};

pub type UserList = Arc<Vec<Arc<User>>>;

/// Snapshot of the entity collection.
///
/// `loaded` stays false until the first `set_all`, which is how lookups tell
/// "still loading" apart from "no such user".
#[derive(Clone, Debug, Default)]
pub struct UserCollection {
    users: UserList,
    index: Arc<HashMap<UserId, usize>>,
    loaded: bool,
}

impl UserCollection {
    fn from_records(records: Vec<User>) -> Self {
        let mut users: Vec<Arc<User>> = Vec::with_capacity(records.len());
        let mut index = HashMap::with_capacity(records.len());
        for user in records {
            match index.get(&user.id) {
                // Last record wins, first position is kept.
                Some(&pos) => users[pos] = Arc::new(user),
                None => {
                    index.insert(user.id, users.len());
                    users.push(Arc::new(user));
                }
            }
        }
        Self {
            users: Arc::new(users),
            index: Arc::new(index),
            loaded: true,
        }
    }

    pub fn users(&self) -> &UserList {
        &self.users
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn lookup(&self, id: UserId) -> Lookup<Arc<User>> {
        if !self.loaded {
            return Lookup::Pending;
        }
        match self.index.get(&id) {
            Some(&pos) => Lookup::Found(Arc::clone(&self.users[pos])),
            None => Lookup::Missing,
        }
    }
}

/// Entity store for user records, keyed by id.
///
/// The collection is only ever replaced as a whole.
#[derive(Clone)]
pub struct UserEntityStore {
    state: Subject<UserCollection>,
    all: Observable<UserList>,
    count: Observable<usize>,
    pii_types: Observable<Vec<String>>,
}

impl UserEntityStore {
    pub fn new() -> Self {
        let state = Subject::new(UserCollection::default());
        let source = state.observable();
        let all = source.map(|c: &UserCollection| Arc::clone(&c.users));
        let count = source.select(UserCollection::len);
        let pii_types = source.select(|c: &UserCollection| pii_types(&c.users));
        Self {
            state,
            all,
            count,
            pii_types,
        }
    }

    /// Replace the whole collection. Subscribers observe exactly one transition.
    pub fn set_all(&self, records: Vec<User>) {
        let next = UserCollection::from_records(records);
        debug!(users = next.len(), "replacing user collection");
        self.state.next(next);
    }

    pub fn all(&self) -> Observable<UserList> {
        self.all.clone()
    }

    pub fn count(&self) -> Observable<usize> {
        self.count.clone()
    }

    /// Sorted, de-duplicated PII category names across the collection.
    pub fn pii_types(&self) -> Observable<Vec<String>> {
        self.pii_types.clone()
    }

    /// `Pending` until the first `set_all`, then `Found` or `Missing`.
    pub fn get_by_id(&self, id: UserId) -> Observable<Lookup<Arc<User>>> {
        self.state.observable().select(move |c: &UserCollection| c.lookup(id))
    }

    /// The whole collection as an observable, for lookups that are not by id.
    pub fn collection(&self) -> Observable<UserCollection> {
        self.state.observable()
    }

    pub fn snapshot(&self) -> UserCollection {
        self.state.get()
    }

    pub fn len(&self) -> usize {
        self.state.get().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lookup(&self, id: UserId) -> Lookup<Arc<User>> {
        self.state.get().lookup(id)
    }

    pub fn is_loaded(&self) -> bool {
        self.state.get().is_loaded()
    }
}

impl Default for UserEntityStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Union of every user's PII category names, sorted and de-duplicated.
pub fn pii_types(users: &[Arc<User>]) -> Vec<String> {
    let mut names = BTreeSet::new();
    for user in users {
        if let Some(pii) = &user.pii {
            names.extend(pii.keys());
        }
    }
    names.into_iter().map(str::to_string).collect()
}
