use std::sync::Arc;

use piidash_ingest::{load_users, HttpUserSource, JsonFileUserSource, UserSource};
use piidash_store::{BlobStore, FileBlobStore, SessionBlobStore, UiFilterStore, UserEntityStore};
use piidash_view::{DashboardViewModel, UserDetailViewModel};
use tracing::info;

pub mod config;
pub use config::DashboardConfig;

/// Wires the stores, the users source and the view models together.
pub struct Dashboard {
    pub users: UserEntityStore,
    pub ui: UiFilterStore,
    pub view: DashboardViewModel,
    source: Arc<dyn UserSource>,
}

impl Dashboard {
    pub fn new(
        users: UserEntityStore,
        ui: UiFilterStore,
        source: Arc<dyn UserSource>,
        config: &DashboardConfig,
    ) -> Self {
        let view = DashboardViewModel::with_debounce(
            users.clone(),
            ui.clone(),
            config.search_debounce(),
        );
        Self {
            users,
            ui,
            view,
            source,
        }
    }

    pub fn from_config(config: &DashboardConfig) -> Self {
        let blobs: Arc<dyn BlobStore> = match &config.session_file {
            Some(path) => Arc::new(FileBlobStore::new(path)),
            None => Arc::new(SessionBlobStore::new()),
        };
        let source: Arc<dyn UserSource> = match &config.users_file {
            Some(path) => Arc::new(JsonFileUserSource::new(path)),
            None => Arc::new(HttpUserSource::new(config.users_url.clone())),
        };
        info!(source = %source.describe(), storage_key = %config.storage_key, "dashboard configured");

        let ui = UiFilterStore::new(blobs, config.storage_key.clone());
        Self::new(UserEntityStore::new(), ui, source, config)
    }

    /// Fetch users from the configured source into the entity store.
    pub async fn load(&self) -> anyhow::Result<usize> {
        let committed = load_users(self.source.as_ref(), &self.users).await?;
        Ok(committed)
    }

    /// Detail view model for one route id, bound to this dashboard's store.
    pub fn detail(&self, id: &str) -> UserDetailViewModel {
        let detail = UserDetailViewModel::new(self.users.clone());
        detail.set_route_id(Some(id));
        detail
    }
}
