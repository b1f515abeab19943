//! State stores for the dashboard: the user entity store, the UI filter
//! store, and the observable and blob-store primitives they are built on.

pub mod blob;
pub use blob::{BlobError, BlobStore, FileBlobStore, SessionBlobStore};

pub mod observable;
pub use observable::{Observable, Subject, Subscription};

pub mod users;
pub use users::{pii_types, UserCollection, UserEntityStore, UserList};

pub mod ui;
pub use ui::{UiFilterStore, DEFAULT_STORAGE_KEY};
