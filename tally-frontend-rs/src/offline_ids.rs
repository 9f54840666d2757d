//! Client-made ids for things the server hasn't seen yet.
//!
//! An offline id is the prefix followed by a seed. Ids derived from a parent
//! (`{parent}--{index}`) inherit the prefix when the parent is already offline.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

pub const OFFLINE_ID_PREFIX: &str = "offline-";

#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
pub fn is_offline_id(id: &str) -> bool {
    id.starts_with(OFFLINE_ID_PREFIX)
}

#[cfg_attr(target_arch = "wasm32", wasm_bindgen)]
pub fn make_offline_id(seed: &str) -> String {
    if is_offline_id(seed) {
        seed.to_string()
    } else {
        format!("{OFFLINE_ID_PREFIX}{seed}")
    }
}

/// Seeded with the current time in milliseconds.
pub fn new_offline_id() -> String {
    make_offline_id(&crate::utils::now_millis())
}

pub fn make_offline_entry_id(experience_id: &str, index: usize) -> String {
    make_offline_id(&format!("{experience_id}--{index}"))
}

pub fn make_offline_data_object_id(entry_id: &str, index: usize) -> String {
    format!("{entry_id}--{index}")
}

pub fn make_offline_definition_id(experience_id: &str, index: usize) -> String {
    make_offline_id(&format!("{experience_id}--definition--{index}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn making_an_offline_id_is_idempotent() {
        for seed in ["", "1", "abc", "offline-", "offline-1", "offlin", "1-offline-"] {
            let id = make_offline_id(seed);
            assert!(is_offline_id(&id), "{id}");
            assert_eq!(make_offline_id(&id), id);
            assert!(!id.starts_with("offline-offline-") || seed.starts_with("offline-offline-"));
        }
    }

    #[test]
    fn server_ids_are_not_offline() {
        assert!(!is_offline_id("1"));
        assert!(!is_offline_id("x-offline-1"));
    }

    #[test]
    fn derived_ids() {
        assert_eq!(make_offline_entry_id("1", 2), "offline-1--2");
        assert_eq!(make_offline_entry_id("offline-9", 0), "offline-9--0");
        assert_eq!(make_offline_data_object_id("offline-1--2", 0), "offline-1--2--0");
        assert_eq!(make_offline_definition_id("offline-9", 1), "offline-9--definition--1");
    }

    #[test]
    fn fresh_ids_are_offline() {
        assert!(is_offline_id(&new_offline_id()));
    }
}
