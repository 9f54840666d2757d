//! Stand-ins for the server while offline. They write what the server would
//! have answered, so callers can't tell the two paths apart.

use chrono::{DateTime, Utc};

use crate::cache::AppCache;
use crate::mutations::{
    CreateDataDefinition, CreateDataObject, CreateEntryInput, CreateExperienceInput,
};
use crate::offline_ids::{
    is_offline_id, make_offline_data_object_id, make_offline_definition_id,
    make_offline_entry_id, make_offline_id, new_offline_id,
};
use crate::types::{DataDefinition, DataObject, Entry, EntryConnectionEdge, Experience};
use crate::unsynced_ledger::{LedgerEntry, UnsyncedChanges};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflineEntry {
    pub entry: Entry,
    /// The experience as written, with `entry` at the top of its entries.
    pub experience: Experience,
}

pub fn create_offline_experience(cache: &AppCache, input: &CreateExperienceInput) -> Experience {
    let now = Utc::now();
    let id = input
        .client_id
        .as_deref()
        .map_or_else(new_offline_id, make_offline_id);
    let inserted_at = input.inserted_at.unwrap_or(now);

    let data_definitions = input
        .data_definitions
        .iter()
        .enumerate()
        .map(|(index, definition)| {
            let definition_id = make_offline_definition_id(&id, index);
            DataDefinition {
                client_id: Some(definition_id.clone()),
                ..DataDefinition::new(definition_id, &definition.name, definition.type_)
            }
        })
        .collect();

    let mut experience = Experience {
        description: input.description.clone(),
        client_id: Some(id.clone()),
        updated_at: input.updated_at.unwrap_or(inserted_at),
        ..Experience::new(&id, &input.title, data_definitions, inserted_at)
    };

    experience.entries.edges = input
        .entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let entry_id = make_offline_entry_id(&id, index);
            EntryConnectionEdge::new(offline_entry(&entry_id, &id, &entry.data_objects, now))
        })
        .collect();

    cache.transaction(|tx| {
        tx.ledger().put(&id, LedgerEntry::NewOffline);
        tx.write_experience(&experience);
        tx.insert_at_top(&experience, true);
    });

    log::info!("Created offline experience {id}");
    experience
}

/// `None` if the experience is not cached.
pub fn create_offline_entry(
    cache: &AppCache,
    experience_id: &str,
    data_objects: &[CreateDataObject],
) -> Option<OfflineEntry> {
    cache.transaction(|tx| {
        let Some(mut experience) = tx.read_experience(experience_id) else {
            log::warn!("Cannot create an offline entry for uncached experience {experience_id}");
            return None;
        };

        let mut index = experience.entries.edges.len();
        let mut entry_id = make_offline_entry_id(experience_id, index);
        while experience.entries.edges.iter().any(|e| e.node.id == entry_id) {
            index += 1;
            entry_id = make_offline_entry_id(experience_id, index);
        }

        let entry = offline_entry(&entry_id, experience_id, data_objects, Utc::now());
        experience
            .entries
            .edges
            .insert(0, EntryConnectionEdge::new(entry.clone()));

        // an offline experience is already wholly unsynced
        if !is_offline_id(experience_id) {
            let row = match tx.ledger().get(experience_id) {
                Some(LedgerEntry::NewOffline) => LedgerEntry::NewOffline,
                Some(LedgerEntry::Unsynced(mut changes)) => {
                    changes.merge(UnsyncedChanges::new_entries());
                    LedgerEntry::Unsynced(changes)
                }
                None => LedgerEntry::Unsynced(UnsyncedChanges::new_entries()),
            };
            tx.ledger().put(experience_id, row);
        }

        tx.write_experience(&experience);
        tx.float_to_top(&experience);

        log::info!("Created offline entry {entry_id} for experience {experience_id}");
        Some(OfflineEntry { entry, experience })
    })
}

fn offline_entry(
    entry_id: &str,
    experience_id: &str,
    data_objects: &[CreateDataObject],
    now: DateTime<Utc>,
) -> Entry {
    let data_objects = data_objects
        .iter()
        .enumerate()
        .map(|(index, data_object)| {
            let id = make_offline_data_object_id(entry_id, index);
            let inserted_at = data_object.inserted_at.unwrap_or(now);
            DataObject {
                client_id: Some(id.clone()),
                updated_at: data_object.updated_at.unwrap_or(inserted_at),
                ..DataObject::new(id, &data_object.definition_id, &data_object.data, inserted_at)
            }
        })
        .collect();

    Entry {
        client_id: Some(entry_id.to_string()),
        ..Entry::new(entry_id, experience_id, data_objects, now)
    }
}

/// Everything the server needs to create a cached offline experience, entries
/// included, in the order they are cached.
pub fn promotion_input(experience: &Experience) -> CreateExperienceInput {
    CreateExperienceInput {
        title: experience.title.clone(),
        description: experience.description.clone(),
        client_id: Some(experience.id.clone()),
        inserted_at: Some(experience.inserted_at),
        updated_at: Some(experience.updated_at),
        data_definitions: experience
            .data_definitions
            .iter()
            .map(|definition| CreateDataDefinition {
                name: definition.name.clone(),
                type_: definition.type_,
                client_id: Some(definition.id.clone()),
            })
            .collect(),
        entries: experience
            .entries
            .edges
            .iter()
            .map(|edge| CreateEntryInput {
                experience_id: None,
                client_id: Some(edge.node.id.clone()),
                inserted_at: Some(edge.node.inserted_at),
                updated_at: Some(edge.node.updated_at),
                data_objects: edge
                    .node
                    .data_objects
                    .iter()
                    .map(|data_object| CreateDataObject {
                        definition_id: data_object.definition_id.clone(),
                        data: data_object.data.clone(),
                        client_id: Some(data_object.id.clone()),
                        inserted_at: Some(data_object.inserted_at),
                        updated_at: Some(data_object.updated_at),
                    })
                    .collect(),
            })
            .collect(),
    }
}
