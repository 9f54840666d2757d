use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use serde_json::{Map, Value};
use slotmap::SlotMap;

use crate::normalize::{self, Entity};

/// Key of the entity holding query results.
pub const ROOT_QUERY: &str = "ROOT_QUERY";

pub type Entities = im::HashMap<String, Entity>;

slotmap::new_key_type! {
    pub struct ListenerKey;
}

type Listener = Rc<RefCell<dyn FnMut(&BTreeSet<String>)>>;

/// The cache itself. Single-threaded: interior mutability through `RefCell`,
/// and no borrow is ever held across a call into user code.
#[derive(Default)]
pub struct Store {
    entities: RefCell<Entities>,
    listeners: RefCell<SlotMap<ListenerKey, Listener>>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("entities", &self.entities.borrow().len())
            .field("listeners", &self.listeners.borrow().len())
            .finish()
    }
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entities(entities: Entities) -> Self {
        Self {
            entities: RefCell::new(entities),
            listeners: RefCell::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entities.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.borrow().is_empty()
    }

    /// A copy of the current entity map. Cheap: `im` shares structure.
    pub fn snapshot(&self) -> Entities {
        self.entities.borrow().clone()
    }

    /// Swap in a whole entity map (used when restoring from disk). Every key
    /// of both the old and the new map is reported to listeners.
    pub fn replace(&self, entities: Entities) {
        let touched = {
            let mut current = self.entities.borrow_mut();
            let touched: BTreeSet<String> =
                current.keys().chain(entities.keys()).cloned().collect();
            *current = entities;
            touched
        };
        self.notify(&touched);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entities.borrow().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entities.borrow().keys().cloned().collect()
    }

    pub fn read_fragment(&self, key: &str) -> Option<Value> {
        normalize::resolve_entity(&self.entities.borrow(), key)
    }

    pub fn read_root_field(&self, field: &str) -> Option<Value> {
        read_root_field(&self.entities.borrow(), field)
    }

    /// Run `f` against a draft of the cache and commit the result in one step.
    /// Listeners are called once, after the commit, if anything was written.
    /// Transactions do not nest: a commit made inside `f` is overwritten by the outer one.
    pub fn transaction<R>(&self, f: impl FnOnce(&mut Draft) -> R) -> R {
        let mut draft = Draft {
            entities: self.snapshot(),
            touched: BTreeSet::new(),
        };

        let result = f(&mut draft);

        let Draft { entities, touched } = draft;
        if !touched.is_empty() {
            *self.entities.borrow_mut() = entities;
            self.notify(&touched);
        }

        result
    }

    pub fn write_fragment(&self, value: &Value) -> Option<String> {
        self.transaction(|draft| draft.write_fragment(value))
    }

    pub fn write_root_field(&self, field: &str, value: &Value) {
        self.transaction(|draft| draft.write_root_field(field, value))
    }

    pub fn evict_where(&self, predicate: impl Fn(&str) -> bool) -> Vec<String> {
        self.transaction(|draft| draft.evict_where(predicate))
    }

    /// Called with the touched keys after every commit that wrote something.
    ///
    /// A listener may read and write the store and (un)register listeners. A
    /// commit made from inside a listener notifies every other listener right
    /// away; the listener that made it is not called again for that commit.
    pub fn register_listener(
        &self,
        listener: impl FnMut(&BTreeSet<String>) + 'static,
    ) -> ListenerKey {
        let listener: Listener = Rc::new(RefCell::new(listener));
        self.listeners.borrow_mut().insert(listener)
    }

    pub fn unregister_listener(&self, key: ListenerKey) {
        self.listeners.borrow_mut().remove(key);
    }

    fn notify(&self, touched: &BTreeSet<String>) {
        if touched.is_empty() {
            return;
        }
        let listeners: Vec<(ListenerKey, Listener)> = self
            .listeners
            .borrow()
            .iter()
            .map(|(key, listener)| (key, Rc::clone(listener)))
            .collect();

        for (key, listener) in listeners {
            if !self.listeners.borrow().contains_key(key) {
                continue;
            }
            // Already borrowed: this commit came from inside that listener.
            let Ok(mut listener) = listener.try_borrow_mut() else {
                continue;
            };
            (&mut *listener)(touched);
        }
    }
}

/// A writable copy of the cache. Nothing written here is visible to other
/// readers until [`Store::transaction`] commits it.
#[derive(Debug, Clone)]
pub struct Draft {
    entities: Entities,
    touched: BTreeSet<String>,
}

impl Draft {
    pub fn entity(&self, key: &str) -> Option<&Entity> {
        self.entities.get(key)
    }

    pub fn read_fragment(&self, key: &str) -> Option<Value> {
        normalize::resolve_entity(&self.entities, key)
    }

    pub fn read_root_field(&self, field: &str) -> Option<Value> {
        read_root_field(&self.entities, field)
    }

    /// Normalize `value` into the draft. Returns the key of `value` itself if it is an entity.
    pub fn write_fragment(&mut self, value: &Value) -> Option<String> {
        let mut out = Vec::new();
        let normalized = normalize::normalize(value, &mut out);
        for (key, fields) in out {
            self.merge_entity(key, fields);
        }
        normalize::ref_key(&normalized).map(str::to_string)
    }

    pub fn write_root_field(&mut self, field: &str, value: &Value) {
        let mut out = Vec::new();
        let normalized = normalize::normalize(value, &mut out);
        for (key, fields) in out {
            self.merge_entity(key, fields);
        }

        let mut root = Map::new();
        root.insert(field.to_string(), normalized);
        self.merge_entity(ROOT_QUERY.to_string(), root);
    }

    pub fn remove_root_field(&mut self, field: &str) -> bool {
        let Some(mut root) = self.entities.get(ROOT_QUERY).cloned() else {
            return false;
        };
        if root.remove(field).is_none() {
            return false;
        }
        self.entities.insert(ROOT_QUERY.to_string(), root);
        self.touched.insert(ROOT_QUERY.to_string());
        true
    }

    /// Remove every entity whose key matches. `ROOT_QUERY` is never evicted.
    pub fn evict_where(&mut self, predicate: impl Fn(&str) -> bool) -> Vec<String> {
        let doomed: Vec<String> = self
            .entities
            .keys()
            .filter(|key| key.as_str() != ROOT_QUERY && predicate(key))
            .cloned()
            .collect();

        for key in &doomed {
            self.entities.remove(key);
            self.touched.insert(key.clone());
        }

        doomed
    }

    fn merge_entity(&mut self, key: String, fields: Entity) {
        let mut entity = self.entities.get(&key).cloned().unwrap_or_default();
        entity.extend(fields);
        self.entities.insert(key.clone(), entity);
        self.touched.insert(key);
    }
}

fn read_root_field(entities: &Entities, field: &str) -> Option<Value> {
    let value = entities.get(ROOT_QUERY)?.get(field)?;
    normalize::resolve(entities, value)
}
