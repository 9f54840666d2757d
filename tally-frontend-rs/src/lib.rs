#![deny(clippy::string_slice)]

pub mod cache;
pub mod config;
pub mod context;
#[cfg(feature = "remote")]
pub mod graphql;
pub mod machines;
pub mod mutations;
pub mod offline_ids;
pub mod offline_resolvers;
pub mod reconcile;
pub mod types;
pub mod unsynced_ledger;
mod utils;

use std::sync::LazyLock;

pub use cache::{AppCache, CacheTx};
pub use config::{AppConfig, ConfigError};
pub use context::{Connectivity, Env, Navigator, Route, UserSession};
#[cfg(feature = "remote")]
pub use graphql::GraphqlClient;
pub use mutations::{MutationClient, TransportError};
pub use unsynced_ledger::{LedgerCleanup, LedgerEntry, UnsyncedChanges};

// putting this inside LOGGER prevents us from accidentally initializing the logger more than once
static LOGGER: LazyLock<()> = LazyLock::new(|| {
    utils::set_panic_hook();

    #[cfg(target_arch = "wasm32")]
    wasm_logger::init(wasm_logger::Config::default());

    #[cfg(not(target_arch = "wasm32"))]
    {
        // tests call this from many threads; whoever loses the race keeps the winner's logger
        let _ = env_logger::try_init();
    }

    log::info!("Logging initialized");
});

/// Set up logging and the panic hook. Safe to call any number of times.
#[cfg_attr(target_arch = "wasm32", wasm_bindgen::prelude::wasm_bindgen)]
pub fn init_logging() {
    LazyLock::force(&LOGGER);
}
