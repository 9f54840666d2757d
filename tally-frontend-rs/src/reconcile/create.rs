use std::collections::{BTreeSet, HashMap};

use crate::cache::{AppCache, CacheTx};
use crate::mutations::{CreateEntryErrors, CreateExperienceOutcome};
use crate::offline_ids::{make_offline_data_object_id, make_offline_entry_id};
use crate::types::{DataObject, Entry, EntryConnectionEdge, Experience};
use crate::unsynced_ledger::{LedgerEntry, UnsyncedChanges};

/// Apply a `createExperiences` response. Returns the experiences that were
/// written, in response order.
pub fn reconcile_create_experiences(
    cache: &AppCache,
    outcomes: &[CreateExperienceOutcome],
) -> Vec<Experience> {
    cache.transaction(|tx| {
        let mut created = Vec::new();

        for outcome in outcomes {
            match outcome {
                CreateExperienceOutcome::ExperienceSuccess {
                    experience,
                    entries_errors,
                } => {
                    let errors = entries_errors.as_deref().unwrap_or_default();
                    created.push(reconcile_success(tx, experience, errors));
                }
                CreateExperienceOutcome::CreateExperienceErrors { errors } => {
                    log::info!(
                        "Experience at index {} was not created: {errors:?}",
                        errors.meta.index
                    );
                }
                CreateExperienceOutcome::Unknown => {
                    log::warn!("Skipping create experience outcome of unknown type");
                }
            }
        }

        tx.insert_many_at_top(&created);
        created
    })
}

fn reconcile_success(
    tx: &mut CacheTx<'_>,
    experience: &Experience,
    entries_errors: &[CreateEntryErrors],
) -> Experience {
    let offline = experience
        .client_id
        .as_deref()
        .filter(|client_id| *client_id != experience.id)
        .and_then(|client_id| tx.read_experience(client_id));

    let Some(offline) = offline else {
        tx.write_experience(experience);
        return experience.clone();
    };

    let errored: BTreeSet<usize> = entries_errors
        .iter()
        .map(|errors| errors.errors.meta.index)
        .collect();

    let mut promoted = experience.clone();
    if !errored.is_empty() {
        promoted.entries.edges = merge_entries(&offline, experience, &errored);
    }

    // the offline lineage goes away before the promoted experience is written,
    // since re-derived offline ids may contain the old offline id
    tx.ledger().remove(&offline.id);
    tx.replace_or_remove(&HashMap::from([(offline.id.clone(), None)]));
    tx.purge(&[offline.id.as_str()]);

    if !errored.is_empty() {
        tx.ledger()
            .put(&promoted.id, LedgerEntry::Unsynced(UnsyncedChanges::new_entries()));
    }

    log::info!(
        "Promoted offline experience {} to {} ({} entries still offline)",
        offline.id,
        promoted.id,
        errored.len()
    );

    tx.write_experience(&promoted);
    promoted
}

/// Offline entries in their original order: errored ones stay offline under
/// the new experience id, the rest take the server's entries in turn.
fn merge_entries(
    offline: &Experience,
    server: &Experience,
    errored: &BTreeSet<usize>,
) -> Vec<EntryConnectionEdge> {
    // offline definition id -> server definition id
    let definition_ids: HashMap<&str, &str> = server
        .data_definitions
        .iter()
        .filter_map(|definition| Some((definition.client_id.as_deref()?, definition.id.as_str())))
        .collect();

    let mut synced = server.entries.edges.iter();

    let merged = offline
        .entries
        .edges
        .iter()
        .enumerate()
        .map(|(index, edge)| {
            if errored.contains(&index) {
                return still_offline(&server.id, index, &edge.node, &definition_ids);
            }
            match synced.next() {
                Some(server_edge) => server_edge.clone(),
                None => {
                    log::warn!(
                        "Server returned too few entries for experience {}, keeping entry {index} offline",
                        server.id
                    );
                    still_offline(&server.id, index, &edge.node, &definition_ids)
                }
            }
        })
        .collect();

    let unused = synced.count();
    if unused > 0 {
        log::warn!(
            "Ignoring {unused} unexpected entries returned for experience {}",
            server.id
        );
    }

    merged
}

fn still_offline(
    experience_id: &str,
    index: usize,
    entry: &Entry,
    definition_ids: &HashMap<&str, &str>,
) -> EntryConnectionEdge {
    let entry_id = make_offline_entry_id(experience_id, index);

    let data_objects = entry
        .data_objects
        .iter()
        .enumerate()
        .map(|(index, data_object)| {
            let id = make_offline_data_object_id(&entry_id, index);
            let definition_id = definition_ids
                .get(data_object.definition_id.as_str())
                .map_or_else(|| data_object.definition_id.clone(), |id| id.to_string());
            DataObject {
                id: id.clone(),
                client_id: Some(id),
                definition_id,
                ..data_object.clone()
            }
        })
        .collect();

    EntryConnectionEdge::new(Entry {
        id: entry_id.clone(),
        client_id: Some(entry_id),
        experience_id: experience_id.to_string(),
        data_objects,
        ..entry.clone()
    })
}
