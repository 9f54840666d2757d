use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration")]
    Parse(#[source] serde_json::Error),

    #[error("page size for {0} must be at least 1")]
    ZeroPageSize(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    pub graphql_url: String,
    /// How many experiences the standing mini list query asks for.
    pub mini_list_page_size: u32,
    /// The one entries window every experience fragment is read and written with.
    pub entries_page_size: u32,
    pub snapshot_file_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let graphql_url = if cfg!(feature = "local-backend") {
            "http://localhost:4000/graphql"
        } else {
            "https://api.tally.app/graphql"
        };

        Self {
            graphql_url: graphql_url.to_string(),
            mini_list_page_size: 20,
            entries_page_size: 20_000,
            snapshot_file_name: "tally-cache".to_string(),
        }
    }
}

impl AppConfig {
    /// Missing keys fall back to their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(ConfigError::Parse)?;
        if config.mini_list_page_size == 0 {
            return Err(ConfigError::ZeroPageSize("miniListPageSize"));
        }
        if config.entries_page_size == 0 {
            return Err(ConfigError::ZeroPageSize("entriesPageSize"));
        }
        Ok(config)
    }

    pub fn entries_pagination(&self) -> serde_json::Value {
        json!({ "pagination": { "first": self.entries_page_size } })
    }

    pub fn mini_list_arguments(&self) -> serde_json::Value {
        json!({ "input": { "pagination": { "first": self.mini_list_page_size } } })
    }
}
