//! Splitting JSON values into entities and stitching them back together.

use serde_json::{Map, Value};

use crate::store::Entities;

pub type Entity = Map<String, Value>;

pub const TYPENAME: &str = "__typename";
pub const REF: &str = "__ref";

// Entity graphs written by this crate are trees, but snapshots come from disk.
const MAX_DEPTH: usize = 32;

pub fn entity_key(typename: &str, id: &str) -> String {
    format!("{typename}:{id}")
}

/// Storage key of a field that takes arguments, e.g. `entries({"pagination":{"first":10}})`.
pub fn field_key(field: &str, args: &Value) -> String {
    format!("{field}({args})")
}

pub fn identify(object: &Map<String, Value>) -> Option<String> {
    let typename = object.get(TYPENAME)?.as_str()?;
    let id = object.get("id")?.as_str()?;
    Some(entity_key(typename, id))
}

pub fn ref_key(value: &Value) -> Option<&str> {
    let object = value.as_object()?;
    if object.len() != 1 {
        return None;
    }
    object.get(REF)?.as_str()
}

pub fn reference(key: &str) -> Value {
    let mut object = Map::new();
    object.insert(REF.to_string(), Value::String(key.to_string()));
    Value::Object(object)
}

/// Replace every entity inside `value` by a reference, pushing the entities
/// (themselves normalized) onto `out`. Nested entities are pushed before their parents.
pub(crate) fn normalize(value: &Value, out: &mut Vec<(String, Entity)>) -> Value {
    match value {
        Value::Object(object) => {
            let fields: Entity = object
                .iter()
                .map(|(name, field)| (name.clone(), normalize(field, out)))
                .collect();

            match identify(object) {
                Some(key) => {
                    out.push((key.clone(), fields));
                    reference(&key)
                }
                None => Value::Object(fields),
            }
        }
        Value::Array(items) => Value::Array(items.iter().map(|item| normalize(item, out)).collect()),
        other => other.clone(),
    }
}

/// Inverse of [`normalize`]. Returns `None` if a reference in a field position
/// points at a missing entity. Dangling references inside lists are dropped,
/// so a list survives the eviction of one of its members.
pub(crate) fn resolve(entities: &Entities, value: &Value) -> Option<Value> {
    resolve_at_depth(entities, value, 0)
}

pub(crate) fn resolve_entity(entities: &Entities, key: &str) -> Option<Value> {
    resolve_at_depth(entities, &reference(key), 0)
}

fn resolve_at_depth(entities: &Entities, value: &Value, depth: usize) -> Option<Value> {
    if depth > MAX_DEPTH {
        log::warn!("Gave up resolving a cache value nested more than {MAX_DEPTH} levels deep");
        return None;
    }

    if let Some(key) = ref_key(value) {
        let entity = entities.get(key)?;
        return resolve_object(entities, entity, depth + 1);
    }

    match value {
        Value::Object(object) => resolve_object(entities, object, depth + 1),
        Value::Array(items) => Some(Value::Array(
            items
                .iter()
                .filter_map(|item| resolve_at_depth(entities, item, depth + 1))
                .collect(),
        )),
        other => Some(other.clone()),
    }
}

fn resolve_object(entities: &Entities, object: &Entity, depth: usize) -> Option<Value> {
    let mut resolved = Map::new();
    for (name, field) in object {
        resolved.insert(name.clone(), resolve_at_depth(entities, field, depth)?);
    }
    Some(Value::Object(resolved))
}
