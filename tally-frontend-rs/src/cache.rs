//! Typed reads and writes over the normalized cache.
//!
//! Everything goes through a [`CacheTx`], so a multi-step update of the mini
//! list, an experience and the ledger commits in one step and listeners hear
//! about it once.

use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use normcache::{Draft, ListenerKey, Store, entity_key, field_key};

use crate::config::AppConfig;
use crate::types::{Experience, ExperienceConnection, ExperienceEdge, ExperienceMini};
use crate::unsynced_ledger::{LedgerEntry, UnsyncedLedger};

pub const MINI_LIST_FIELD: &str = "getExperiences";
const EXPERIENCE_TYPENAME: &str = "Experience";

#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldKeys {
    /// The canonical entries window of an experience.
    entries: String,
    mini_list: String,
}

impl FieldKeys {
    fn new(config: &AppConfig) -> Self {
        Self {
            entries: field_key("entries", &config.entries_pagination()),
            mini_list: field_key(MINI_LIST_FIELD, &config.mini_list_arguments()),
        }
    }
}

/// Cheap to clone; clones share the store.
#[derive(Debug, Clone)]
pub struct AppCache {
    store: Rc<Store>,
    keys: Rc<FieldKeys>,
}

impl AppCache {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_store(config, Store::new())
    }

    pub fn with_store(config: &AppConfig, store: Store) -> Self {
        Self {
            store: Rc::new(store),
            keys: Rc::new(FieldKeys::new(config)),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn transaction<R>(&self, f: impl FnOnce(&mut CacheTx<'_>) -> R) -> R {
        self.store.transaction(|draft| {
            let mut tx = CacheTx {
                draft,
                keys: &self.keys,
            };
            f(&mut tx)
        })
    }

    pub fn read_experience(&self, id: &str) -> Option<Experience> {
        self.transaction(|tx| tx.read_experience(id))
    }

    pub fn write_experience(&self, experience: &Experience) {
        self.transaction(|tx| tx.write_experience(experience))
    }

    pub fn read_mini_list(&self) -> Option<ExperienceConnection> {
        self.transaction(|tx| tx.read_mini_list())
    }

    pub fn write_mini_list(&self, list: &ExperienceConnection) {
        self.transaction(|tx| tx.write_mini_list(list))
    }

    pub fn insert_at_top(&self, experience: &Experience, force: bool) {
        self.transaction(|tx| tx.insert_at_top(experience, force))
    }

    pub fn insert_many_at_top(&self, experiences: &[Experience]) {
        self.transaction(|tx| tx.insert_many_at_top(experiences))
    }

    pub fn float_to_top(&self, experience: &Experience) {
        self.transaction(|tx| tx.float_to_top(experience))
    }

    pub fn float_many_to_top(&self, ranks: &HashMap<String, usize>) {
        self.transaction(|tx| tx.float_many_to_top(ranks))
    }

    pub fn replace_or_remove(&self, changes: &HashMap<String, Option<Experience>>) {
        self.transaction(|tx| tx.replace_or_remove(changes))
    }

    pub fn purge<S: AsRef<str>>(&self, ids: &[S]) -> Vec<String> {
        self.transaction(|tx| tx.purge(ids))
    }

    pub fn purge_experiences<S: AsRef<str>>(&self, ids: &[S]) {
        self.transaction(|tx| tx.purge_experiences(ids))
    }

    pub fn ledger_entry(&self, id: &str) -> Option<LedgerEntry> {
        self.transaction(|tx| tx.ledger().get(id))
    }

    /// `listener` gets the keys of every entity a commit touched.
    pub fn subscribe(&self, listener: impl FnMut(&BTreeSet<String>) + 'static) -> ListenerKey {
        self.store.register_listener(listener)
    }

    pub fn unsubscribe(&self, key: ListenerKey) {
        self.store.unregister_listener(key)
    }
}

pub struct CacheTx<'a> {
    draft: &'a mut Draft,
    keys: &'a FieldKeys,
}

impl CacheTx<'_> {
    pub fn ledger(&mut self) -> UnsyncedLedger<'_> {
        UnsyncedLedger::new(self.draft)
    }

    /// `None` if the experience is missing or was never written with the
    /// canonical entries window.
    pub fn read_experience(&self, id: &str) -> Option<Experience> {
        let mut value = self
            .draft
            .read_fragment(&entity_key(EXPERIENCE_TYPENAME, id))?;
        let object = value.as_object_mut()?;
        let entries = object.remove(&self.keys.entries)?;
        object.insert("entries".to_string(), entries);

        serde_json::from_value(value)
            .inspect_err(|e| log::warn!("Cached experience {id} is incomplete: {e}"))
            .ok()
    }

    pub fn write_experience(&mut self, experience: &Experience) {
        let mut value = match serde_json::to_value(experience) {
            Ok(value) => value,
            Err(e) => {
                log::error!("Failed to encode experience {}: {e}", experience.id);
                return;
            }
        };

        if let Some(object) = value.as_object_mut() {
            if let Some(entries) = object.remove("entries") {
                object.insert(self.keys.entries.clone(), entries);
            }
        }

        self.draft.write_fragment(&value);
    }

    pub fn read_mini_list(&self) -> Option<ExperienceConnection> {
        let value = self.draft.read_root_field(&self.keys.mini_list)?;
        serde_json::from_value(value)
            .inspect_err(|e| log::warn!("Cached experiences list is unreadable: {e}"))
            .ok()
    }

    pub fn write_mini_list(&mut self, list: &ExperienceConnection) {
        match serde_json::to_value(list) {
            Ok(value) => self.draft.write_root_field(&self.keys.mini_list, &value),
            Err(e) => log::error!("Failed to encode experiences list: {e}"),
        }
    }

    /// Without `force`, does nothing until the list has been fetched once.
    pub fn insert_at_top(&mut self, experience: &Experience, force: bool) {
        let list = match self.read_mini_list() {
            Some(list) => list,
            None if force => ExperienceConnection::default(),
            None => return,
        };
        self.prepend(list, std::slice::from_ref(experience));
    }

    /// Does nothing until the list has been fetched once.
    pub fn insert_many_at_top(&mut self, experiences: &[Experience]) {
        if experiences.is_empty() {
            return;
        }
        if let Some(list) = self.read_mini_list() {
            self.prepend(list, experiences);
        }
    }

    /// Move the experience's edge to the front, or insert it there.
    pub fn float_to_top(&mut self, experience: &Experience) {
        let Some(mut list) = self.read_mini_list() else {
            return;
        };

        let edge = match list.edges.iter().position(|e| e.node.id == experience.id) {
            Some(index) => {
                let mut edge = list.edges.remove(index);
                edge.node = ExperienceMini::from(experience);
                edge
            }
            None => new_edge(experience),
        };
        list.edges.insert(0, edge);
        self.write_mini_list(&list);
    }

    /// Stable sort by rank; edges without a rank go after every ranked one.
    pub fn float_many_to_top(&mut self, ranks: &HashMap<String, usize>) {
        let Some(mut list) = self.read_mini_list() else {
            return;
        };

        let unranked = list.edges.len() + 1;
        list.edges
            .sort_by_key(|edge| ranks.get(&edge.node.id).copied().unwrap_or(unranked));
        self.write_mini_list(&list);
    }

    /// `Some` replaces the edge's node, `None` drops the edge, ids not in
    /// `changes` are kept.
    pub fn replace_or_remove(&mut self, changes: &HashMap<String, Option<Experience>>) {
        let Some(mut list) = self.read_mini_list() else {
            return;
        };

        list.edges = list
            .edges
            .into_iter()
            .filter_map(|mut edge| match changes.get(&edge.node.id) {
                None => Some(edge),
                Some(None) => None,
                Some(Some(experience)) => {
                    edge.node = ExperienceMini::from(experience);
                    Some(edge)
                }
            })
            .collect();
        self.write_mini_list(&list);
    }

    /// Evict every entity whose key contains one of `ids`.
    pub fn purge<S: AsRef<str>>(&mut self, ids: &[S]) -> Vec<String> {
        let evicted = self
            .draft
            .evict_where(|key| ids.iter().any(|id| key.contains(id.as_ref())));
        log::debug!("Purged {} cache entries", evicted.len());
        evicted
    }

    /// Remove experiences from the list, the cache and the ledger.
    pub fn purge_experiences<S: AsRef<str>>(&mut self, ids: &[S]) {
        let removals: HashMap<String, Option<Experience>> = ids
            .iter()
            .map(|id| (id.as_ref().to_string(), None))
            .collect();
        self.replace_or_remove(&removals);
        self.purge(ids);
        self.ledger().remove_many(ids);
    }

    fn prepend(&mut self, mut list: ExperienceConnection, experiences: &[Experience]) {
        list.edges
            .retain(|edge| !experiences.iter().any(|e| e.id == edge.node.id));
        list.edges
            .splice(0..0, experiences.iter().map(new_edge));
        self.write_mini_list(&list);
    }
}

fn new_edge(experience: &Experience) -> ExperienceEdge {
    ExperienceEdge {
        cursor: String::new(),
        node: ExperienceMini::from(experience),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataDefinition, DataObject, DataTypes, Entry, EntryConnectionEdge};
    use chrono::{TimeZone, Utc};
    use std::cell::RefCell;

    fn at(hour: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 5, 8, hour, 0, 0).unwrap()
    }

    fn experience(id: &str) -> Experience {
        let mut experience = Experience::new(
            id,
            format!("Experience {id}"),
            vec![DataDefinition::new(format!("{id}-d1"), "count", DataTypes::Integer)],
            at(1),
        );
        let entry = Entry::new(
            format!("{id}-e1"),
            id,
            vec![DataObject::new(
                format!("{id}-o1"),
                format!("{id}-d1"),
                DataTypes::Integer.encode_data("3"),
                at(2),
            )],
            at(2),
        );
        experience.entries.edges.push(EntryConnectionEdge::new(entry));
        experience
    }

    fn list_ids(cache: &AppCache) -> Vec<String> {
        cache
            .read_mini_list()
            .map(|list| list.edges.into_iter().map(|e| e.node.id).collect())
            .unwrap_or_default()
    }

    fn cache_with_list(ids: &[&str]) -> AppCache {
        let cache = AppCache::new(&AppConfig::default());
        let experiences: Vec<Experience> = ids.iter().map(|id| experience(id)).collect();
        cache.insert_at_top(&experiences[0], true);
        cache.insert_many_at_top(&experiences[1..]);
        cache
    }

    #[test]
    fn fragments_read_back_unchanged() {
        let cache = AppCache::new(&AppConfig::default());
        cache.write_experience(&experience("1"));
        assert_eq!(cache.read_experience("1"), Some(experience("1")));
    }

    #[test]
    fn a_different_entries_window_reads_nothing() {
        let config = AppConfig::default();
        let store = Store::new();
        let writer = AppCache::with_store(&config, store);
        writer.write_experience(&experience("1"));

        let other = AppConfig {
            entries_page_size: 10,
            ..config
        };
        let reader = AppCache::with_store(&other, Store::from_entities(writer.store().snapshot()));
        assert_eq!(reader.read_experience("1"), None);
    }

    #[test]
    fn unfetched_lists_are_left_alone_unless_forced() {
        let cache = AppCache::new(&AppConfig::default());
        cache.insert_at_top(&experience("1"), false);
        assert_eq!(cache.read_mini_list(), None);

        cache.insert_at_top(&experience("1"), true);
        assert_eq!(list_ids(&cache), vec!["1"]);
    }

    #[test]
    fn inserting_many_keeps_their_order() {
        let cache = cache_with_list(&["1"]);
        cache.insert_many_at_top(&[experience("2"), experience("3")]);
        assert_eq!(list_ids(&cache), vec!["2", "3", "1"]);
    }

    #[test]
    fn floating_moves_or_inserts_at_the_front() {
        let cache = cache_with_list(&["1", "2", "3"]);
        assert_eq!(list_ids(&cache), vec!["2", "3", "1"]);

        cache.float_to_top(&experience("1"));
        assert_eq!(list_ids(&cache), vec!["1", "2", "3"]);

        cache.float_to_top(&experience("4"));
        assert_eq!(list_ids(&cache), vec!["4", "1", "2", "3"]);
    }

    #[test]
    fn floating_many_is_a_stable_sort() {
        let cache = cache_with_list(&["a", "b", "c", "d"]);
        assert_eq!(list_ids(&cache), vec!["b", "c", "d", "a"]);

        cache.float_many_to_top(&HashMap::from([("d".to_string(), 0), ("a".to_string(), 1)]));
        assert_eq!(list_ids(&cache), vec!["d", "a", "b", "c"]);
    }

    #[test]
    fn replace_or_remove_edges() {
        let cache = cache_with_list(&["1", "2", "3"]);
        let mut renamed = experience("3");
        renamed.title = "Renamed".to_string();

        cache.replace_or_remove(&HashMap::from([
            ("2".to_string(), None),
            ("3".to_string(), Some(renamed)),
        ]));

        let list = cache.read_mini_list().unwrap();
        let titles: Vec<&str> = list.edges.iter().map(|e| e.node.title.as_str()).collect();
        assert_eq!(titles, vec!["Renamed", "Experience 1"]);
    }

    #[test]
    fn the_list_and_fragments_share_entities() {
        let cache = cache_with_list(&["1"]);
        cache.write_experience(&experience("1"));

        let mut renamed = experience("1");
        renamed.title = "Renamed".to_string();
        cache.write_experience(&renamed);

        assert_eq!(cache.read_mini_list().unwrap().edges[0].node.title, "Renamed");
    }

    #[test]
    fn purging_experiences_clears_everything_about_them() {
        let cache = cache_with_list(&["x1", "y2"]);
        cache.write_experience(&experience("x1"));
        cache.write_experience(&experience("y2"));
        cache.transaction(|tx| tx.ledger().put("x1", LedgerEntry::NewOffline));

        cache.purge_experiences(&["x1"]);

        assert_eq!(list_ids(&cache), vec!["y2"]);
        assert_eq!(cache.read_experience("x1"), None);
        assert!(!cache.store().contains_key("Entry:x1-e1"));
        assert_eq!(cache.read_experience("y2"), Some(experience("y2")));
        assert_eq!(cache.ledger_entry("x1"), None);
    }

    #[test]
    fn purge_matches_substrings_of_keys() {
        let cache = AppCache::new(&AppConfig::default());
        cache.write_experience(&experience("1"));
        cache.write_experience(&experience("2"));

        let mut evicted = cache.purge(&["1"]);
        evicted.sort();

        // "Entry:2-e1" and friends contain "1" too
        assert!(evicted.contains(&"Experience:1".to_string()));
        assert!(evicted.contains(&"Entry:2-e1".to_string()));
        assert!(!evicted.contains(&"Experience:2".to_string()));
    }

    #[test]
    fn a_transaction_notifies_subscribers_once() {
        let cache = cache_with_list(&["1"]);
        let calls = Rc::new(RefCell::new(0));
        let seen = Rc::clone(&calls);
        let key = cache.subscribe(move |_| *seen.borrow_mut() += 1);

        cache.transaction(|tx| {
            tx.write_experience(&experience("2"));
            tx.insert_at_top(&experience("2"), false);
            tx.ledger().put("2", LedgerEntry::NewOffline);
        });
        assert_eq!(*calls.borrow(), 1);

        cache.unsubscribe(key);
        cache.float_to_top(&experience("1"));
        assert_eq!(*calls.borrow(), 1);
    }
}
