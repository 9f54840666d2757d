//! Everything an effect may touch, passed in explicitly.

use std::rc::Rc;

use normcache::{MemoryStorage, Persistor};

use crate::cache::AppCache;
use crate::config::AppConfig;
use crate::mutations::MutationClient;
use crate::types::User;

pub trait Connectivity {
    /// `None` when the platform can't tell yet.
    fn is_connected(&self) -> Option<bool>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    My,
    Experience(String),
    Login,
}

pub trait Navigator {
    fn navigate(&self, route: Route);

    /// Bring the element with this id (usually a form banner) into view.
    fn scroll_into_view(&self, element_id: &str);
}

pub trait UserSession {
    fn store_user(&self, user: &User);
}

#[derive(Clone)]
pub struct Env {
    pub config: Rc<AppConfig>,
    pub cache: AppCache,
    pub persistor: Persistor,
    pub client: Rc<dyn MutationClient>,
    pub connectivity: Rc<dyn Connectivity>,
    pub navigator: Rc<dyn Navigator>,
    pub session: Rc<dyn UserSession>,
}

impl std::fmt::Debug for Env {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Env")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl Env {
    /// An environment whose snapshots stay in memory.
    pub fn in_memory(
        config: AppConfig,
        client: Rc<dyn MutationClient>,
        connectivity: Rc<dyn Connectivity>,
        navigator: Rc<dyn Navigator>,
        session: Rc<dyn UserSession>,
    ) -> Self {
        Self {
            cache: AppCache::new(&config),
            config: Rc::new(config),
            persistor: Persistor::new(Rc::new(MemoryStorage::new())),
            client,
            connectivity,
            navigator,
            session,
        }
    }

    /// An environment whose snapshots go to the origin private file system.
    #[cfg(feature = "opfs")]
    pub async fn in_opfs(
        config: AppConfig,
        client: Rc<dyn MutationClient>,
        connectivity: Rc<dyn Connectivity>,
        navigator: Rc<dyn Navigator>,
        session: Rc<dyn UserSession>,
    ) -> Result<Self, normcache::StorageError> {
        let storage = normcache::opfs::OpfsStorage::new(&config.snapshot_file_name)
            .await
            .inspect_err(|e| log::error!("Error opening cache storage: {e:?}"))?;
        Ok(Self {
            persistor: Persistor::new(Rc::new(storage)),
            ..Self::in_memory(config, client, connectivity, navigator, session)
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connectivity.is_connected().unwrap_or(false)
    }

    /// Failures are logged, never surfaced: the in-memory cache is still right.
    pub async fn persist_cache(&self) {
        let _ = self
            .persistor
            .persist(self.cache.store())
            .await
            .inspect_err(|e| log::error!("Error persisting cache: {e:?}"));
    }

    pub async fn restore_cache(&self) -> bool {
        self.persistor
            .restore(self.cache.store())
            .await
            .inspect_err(|e| log::error!("Error restoring cache: {e:?}"))
            .unwrap_or(false)
    }
}
