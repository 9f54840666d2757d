use crate::cache::{AppCache, CacheTx};
use crate::mutations::{
    CreateEntryOutcome, DataObjectOutcome, DefinitionOutcome, OwnFieldsOutcome,
    UpdateEntryOutcome, UpdateExperienceOutcome, UpdateExperiencesOutcome, UpdatedExperience,
};
use crate::types::{EntryConnectionEdge, Experience};
use crate::unsynced_ledger::LedgerCleanup;

/// Wraps [`reconcile_update_experiences`] for callers that want to know when it finished.
pub fn update_experiences_reconciler(
    on_done: impl FnOnce(),
) -> impl FnOnce(&AppCache, &UpdateExperiencesOutcome) {
    move |cache, outcome| {
        reconcile_update_experiences(cache, outcome);
        on_done();
    }
}

/// Apply an `updateExperiences` response. Returns the ids of the experiences
/// that were reconciled.
pub fn reconcile_update_experiences(
    cache: &AppCache,
    outcome: &UpdateExperiencesOutcome,
) -> Vec<String> {
    let UpdateExperiencesOutcome::UpdateExperiencesSomeSuccess { experiences } = outcome else {
        log::info!("Nothing to reconcile from update: {outcome:?}");
        return Vec::new();
    };

    experiences
        .iter()
        .filter_map(|outcome| match outcome {
            UpdateExperienceOutcome::UpdateExperienceSomeSuccess { experience } => {
                cache.transaction(|tx| reconcile_experience(tx, experience))
            }
            UpdateExperienceOutcome::UpdateExperienceErrors { errors } => {
                log::info!("Experience {} was not updated: {}", errors.experience_id, errors.error);
                None
            }
            UpdateExperienceOutcome::Unknown => {
                log::warn!("Skipping update experience outcome of unknown type");
                None
            }
        })
        .collect()
}

fn reconcile_experience(tx: &mut CacheTx<'_>, updated: &UpdatedExperience) -> Option<String> {
    let Some(mut experience) = tx.read_experience(&updated.experience_id) else {
        log::debug!(
            "Experience {} is not cached, nothing to reconcile",
            updated.experience_id
        );
        return None;
    };

    let cleanup = LedgerCleanup {
        own_fields: apply_own_fields(&mut experience, updated.own_fields.as_ref()),
        definitions: apply_definitions(
            &mut experience,
            updated.updated_definitions.as_deref().unwrap_or_default(),
        ),
        new_entries: apply_new_entries(
            &mut experience,
            updated.new_entries.as_deref().unwrap_or_default(),
        ),
        modified_entries: apply_updated_entries(
            &mut experience,
            updated.updated_entries.as_deref().unwrap_or_default(),
        ),
    };

    if let Some(updated_at) = updated.updated_at {
        experience.updated_at = updated_at;
    }

    tx.ledger().subtract(&experience.id, &cleanup);
    tx.write_experience(&experience);
    Some(experience.id)
}

fn apply_own_fields(experience: &mut Experience, outcome: Option<&OwnFieldsOutcome>) -> bool {
    match outcome {
        Some(OwnFieldsOutcome::ExperienceOwnFieldsSuccess { data }) => {
            experience.title = data.title.clone();
            experience.description = data.description.clone();
            true
        }
        _ => false,
    }
}

/// Ids of the definitions the server accepted.
fn apply_definitions(experience: &mut Experience, outcomes: &[DefinitionOutcome]) -> Vec<String> {
    outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            DefinitionOutcome::DefinitionSuccess { definition } => Some(definition),
            _ => None,
        })
        .map(|definition| {
            match experience
                .data_definitions
                .iter_mut()
                .find(|d| d.id == definition.id)
            {
                Some(cached) => *cached = definition.clone(),
                None => log::warn!("Updated definition {} is not cached", definition.id),
            }
            definition.id.clone()
        })
        .collect()
}

/// Whether the offline entries this experience had are now all on the server.
fn apply_new_entries(experience: &mut Experience, outcomes: &[CreateEntryOutcome]) -> bool {
    let mut offline_synced = false;
    let mut sync_failed = false;

    for outcome in outcomes {
        match outcome {
            CreateEntryOutcome::CreateEntrySuccess { entry } => match &entry.client_id {
                Some(client_id) => {
                    offline_synced = true;
                    // assumes the offline entry's id is the client id the server echoes back
                    match experience
                        .entries
                        .edges
                        .iter_mut()
                        .find(|edge| &edge.node.id == client_id)
                    {
                        Some(edge) => edge.node = entry.clone(),
                        None => log::warn!("Synced entry {client_id} is not cached, skipping"),
                    }
                }
                None => experience
                    .entries
                    .edges
                    .insert(0, EntryConnectionEdge::new(entry.clone())),
            },
            CreateEntryOutcome::CreateEntryErrors { errors } => {
                if errors.meta.client_id.is_some() || errors.client_id.is_some() {
                    sync_failed = true;
                }
            }
            CreateEntryOutcome::Unknown => {}
        }
    }

    !sync_failed && offline_synced
}

fn apply_updated_entries(
    experience: &mut Experience,
    outcomes: &[UpdateEntryOutcome],
) -> Vec<(String, Vec<String>)> {
    let mut cleaned = Vec::new();

    for outcome in outcomes {
        let UpdateEntryOutcome::UpdateEntrySomeSuccess { entry: updated } = outcome else {
            continue;
        };

        let accepted: Vec<_> = updated
            .data_objects
            .iter()
            .filter_map(|outcome| match outcome {
                DataObjectOutcome::DataObjectSuccess { data_object } => Some(data_object),
                _ => None,
            })
            .collect();

        if accepted.is_empty() {
            continue;
        }

        match experience
            .entries
            .edges
            .iter_mut()
            .find(|edge| edge.node.id == updated.entry_id)
        {
            Some(edge) => {
                for data_object in &accepted {
                    if let Some(cached) = edge
                        .node
                        .data_objects
                        .iter_mut()
                        .find(|d| d.id == data_object.id)
                    {
                        cached.data = data_object.data.clone();
                    }
                }
            }
            None => log::warn!("Updated entry {} is not cached", updated.entry_id),
        }

        cleaned.push((
            updated.entry_id.clone(),
            accepted.iter().map(|d| d.id.clone()).collect(),
        ));
    }

    cleaned
}
