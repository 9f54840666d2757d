//! The form for defining a new experience: a title, an optional description
//! and an ordered list of definition rows.

use std::collections::HashMap;

use im::Vector;

use crate::context::{Env, Route};
use crate::machines::{
    ALREADY_TAKEN, Checked, Dispatch, EffectHandler, FORM_CONTAINS_ERRORS, FieldState,
    GENERIC_ERROR, Machine, Submission, Validity, check_text, length_errors, nothing_to_save,
    settle,
};
use crate::mutations::{
    CreateDataDefinition, CreateExperienceError, CreateExperienceInput, CreateExperienceOutcome,
};
use crate::offline_resolvers::create_offline_experience;
use crate::reconcile::reconcile_create_experiences;
use crate::types::DataTypes;

pub const NOTIFICATION_ID: &str = "new-experience-submit-notification";
const MIN_TITLE_LENGTH: usize = 2;
const MIN_NAME_LENGTH: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionRow {
    /// Stable across reorders; not a server id.
    pub id: u32,
    pub name: FieldState<String>,
    pub type_: FieldState<Option<DataTypes>>,
}

impl DefinitionRow {
    fn new(id: u32) -> Self {
        Self {
            id,
            name: FieldState::Unchanged,
            type_: FieldState::Unchanged,
        }
    }

    fn is_touched(&self) -> bool {
        self.name.is_changed() || self.type_.is_changed()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExperienceState {
    pub title: FieldState<String>,
    pub description: FieldState<String>,
    pub definitions: Vector<DefinitionRow>,
    pub submission: Submission,
    next_row_id: u32,
    /// Row ids in the order their definitions were last submitted, so errors
    /// the server reports by index find their row.
    submitted_rows: Vector<u32>,
    effects: Vec<NewExperienceEffect>,
}

impl Default for NewExperienceState {
    fn default() -> Self {
        Self {
            title: FieldState::Unchanged,
            description: FieldState::Unchanged,
            definitions: Vector::unit(DefinitionRow::new(0)),
            submission: Submission::Inactive,
            next_row_id: 1,
            submitted_rows: Vector::new(),
            effects: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewExperienceAction {
    SetTitle(String),
    SetDescription(String),
    AddDefinition,
    RemoveDefinition(u32),
    MoveDefinition { row: u32, to: usize },
    SetDefinitionName { row: u32, name: String },
    SetDefinitionType { row: u32, type_: DataTypes },
    Submit,
    ServerErrors(CreateExperienceError),
    CommonError(String),
    CloseSubmitNotification,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewExperienceEffect {
    ScrollToNotification,
    CreateExperience(CreateExperienceInput),
}

impl Machine for NewExperienceState {
    type Action = NewExperienceAction;
    type Effect = NewExperienceEffect;

    fn reduce(&self, action: NewExperienceAction) -> Self {
        let mut next = self.clone();
        next.effects.clear();

        match action {
            NewExperienceAction::SetTitle(title) => next.title = FieldState::changed(title),
            NewExperienceAction::SetDescription(description) => {
                next.description = FieldState::changed(description)
            }
            NewExperienceAction::AddDefinition => {
                next.definitions.push_back(DefinitionRow::new(next.next_row_id));
                next.next_row_id += 1;
            }
            NewExperienceAction::RemoveDefinition(row) => {
                // the form always keeps one row
                if next.definitions.len() > 1 {
                    next.definitions.retain(|r| r.id != row);
                }
            }
            NewExperienceAction::MoveDefinition { row, to } => {
                if let Some(from) = next.definitions.iter().position(|r| r.id == row) {
                    let moved = next.definitions.remove(from);
                    let to = to.min(next.definitions.len());
                    next.definitions.insert(to, moved);
                }
            }
            NewExperienceAction::SetDefinitionName { row, name } => {
                if let Some(r) = next.row_mut(row) {
                    r.name = FieldState::changed(name);
                }
            }
            NewExperienceAction::SetDefinitionType { row, type_ } => {
                if let Some(r) = next.row_mut(row) {
                    r.type_ = FieldState::changed(Some(type_));
                }
            }
            NewExperienceAction::Submit => next.submit(),
            NewExperienceAction::ServerErrors(errors) => next.project_server_errors(errors),
            NewExperienceAction::CommonError(message) => {
                next.submission = Submission::CommonErrors(message);
                next.effects.push(NewExperienceEffect::ScrollToNotification);
            }
            NewExperienceAction::CloseSubmitNotification => {
                next.submission = Submission::Inactive
            }
            NewExperienceAction::Reset => next = NewExperienceState::default(),
        }

        next
    }

    fn effects(&self) -> &[NewExperienceEffect] {
        &self.effects
    }
}

impl NewExperienceState {
    fn row_mut(&mut self, row: u32) -> Option<&mut DefinitionRow> {
        self.definitions.iter_mut().find(|r| r.id == row)
    }

    fn submit(&mut self) {
        let any_row_touched = self.definitions.iter().any(DefinitionRow::is_touched);
        if !self.title.is_changed() && !self.description.is_changed() && !any_row_touched {
            nothing_to_save(
                &mut self.submission,
                &mut self.effects,
                NewExperienceEffect::ScrollToNotification,
            );
            return;
        }

        let mut invalid = false;

        let title = match check_text(&mut self.title, "title", true, |value| {
            length_errors(value, MIN_TITLE_LENGTH)
        }) {
            Checked::Valid(title) => title.trim().to_string(),
            _ => {
                invalid = true;
                String::new()
            }
        };

        let description = match check_text(&mut self.description, "description", false, |_| {
            vec![]
        }) {
            Checked::Valid(description) if !description.trim().is_empty() => {
                Some(description.trim().to_string())
            }
            _ => None,
        };

        // untouched rows are left out, unless every row is untouched, in which
        // case the first one must be filled in
        let mut submitted = Vec::new();
        for (index, row) in self.definitions.iter_mut().enumerate() {
            if !(row.is_touched() || (!any_row_touched && index == 0)) {
                continue;
            }
            match check_row(row) {
                Some(definition) => submitted.push((row.id, definition)),
                None => invalid = true,
            }
        }

        invalid |= self.mark_duplicate_names(&submitted);

        self.submitted_rows = submitted.iter().map(|(row, _)| *row).collect();

        let submit = (!invalid).then(|| {
            NewExperienceEffect::CreateExperience(CreateExperienceInput {
                title,
                description,
                data_definitions: submitted.into_iter().map(|(_, d)| d).collect(),
                client_id: None,
                inserted_at: None,
                updated_at: None,
                entries: vec![],
            })
        });

        settle(
            &mut self.submission,
            &mut self.effects,
            submit,
            NewExperienceEffect::ScrollToNotification,
        );
    }

    /// Every row sharing a name with another gets an error. Returns whether any did.
    fn mark_duplicate_names(&mut self, submitted: &[(u32, CreateDataDefinition)]) -> bool {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for (_, definition) in submitted {
            *counts.entry(definition.name.to_lowercase()).or_default() += 1;
        }

        let duplicates: Vec<u32> = submitted
            .iter()
            .filter(|(_, d)| counts.get(&d.name.to_lowercase()).copied().unwrap_or(0) > 1)
            .map(|(row, _)| *row)
            .collect();

        for row in &duplicates {
            if let Some(r) = self.row_mut(*row) {
                let name = r.name.value().cloned().unwrap_or_default();
                r.name.invalidate(name, vec![("name".to_string(), ALREADY_TAKEN.to_string())]);
            }
        }

        !duplicates.is_empty()
    }

    fn project_server_errors(&mut self, errors: CreateExperienceError) {
        let mut projected = false;

        if let Some(message) = errors.title {
            self.title
                .invalidate(String::new(), vec![("title".to_string(), message)]);
            projected = true;
        }

        for error in errors.data_definitions.unwrap_or_default() {
            let Some(row) = self.submitted_rows.get(error.index).copied() else {
                log::warn!("Server reported an error for unknown definition {}", error.index);
                continue;
            };
            let Some(r) = self.row_mut(row) else {
                continue;
            };
            if let Some(message) = error.name {
                r.name.invalidate(String::new(), vec![("name".to_string(), message)]);
                projected = true;
            }
            if let Some(message) = error.type_ {
                r.type_.invalidate(None, vec![("type".to_string(), message)]);
                projected = true;
            }
        }

        let banner = if projected {
            FORM_CONTAINS_ERRORS.to_string()
        } else {
            errors.error.unwrap_or_else(|| GENERIC_ERROR.to_string())
        };
        self.submission = Submission::CommonErrors(banner);
        self.effects.push(NewExperienceEffect::ScrollToNotification);
    }
}

fn check_row(row: &mut DefinitionRow) -> Option<CreateDataDefinition> {
    let name = check_text(&mut row.name, "name", true, |value| {
        length_errors(value, MIN_NAME_LENGTH)
    });

    let type_ = match row.type_.value().copied().flatten() {
        Some(type_) => {
            row.type_ = FieldState::Changed {
                value: Some(type_),
                validity: Validity::Valid,
            };
            Some(type_)
        }
        None => {
            row.type_
                .invalidate(None, vec![("type".to_string(), "is required".to_string())]);
            None
        }
    };

    match (name, type_) {
        (Checked::Valid(name), Some(type_)) => Some(CreateDataDefinition {
            name: name.trim().to_string(),
            type_,
            client_id: None,
        }),
        _ => None,
    }
}

pub struct NewExperienceEffects {
    pub env: Env,
}

impl NewExperienceEffects {
    async fn created(&self, experience_id: String) {
        self.env.persist_cache().await;
        self.env.navigator.navigate(Route::Experience(experience_id));
    }
}

impl EffectHandler<NewExperienceState> for NewExperienceEffects {
    async fn run(&self, effect: NewExperienceEffect, dispatch: &Dispatch<NewExperienceAction>) {
        match effect {
            NewExperienceEffect::ScrollToNotification => {
                self.env.navigator.scroll_into_view(NOTIFICATION_ID);
            }
            NewExperienceEffect::CreateExperience(input) if !self.env.is_connected() => {
                let experience = create_offline_experience(&self.env.cache, &input);
                self.created(experience.id).await;
            }
            NewExperienceEffect::CreateExperience(input) => {
                let response = self
                    .env
                    .client
                    .create_experiences(vec![input], self.env.config.entries_pagination())
                    .await;

                match response {
                    Ok(Some(outcomes)) => match outcomes.first() {
                        Some(CreateExperienceOutcome::ExperienceSuccess { .. }) => {
                            let created = reconcile_create_experiences(&self.env.cache, &outcomes);
                            match created.into_iter().next() {
                                Some(experience) => self.created(experience.id).await,
                                None => dispatch
                                    .send(NewExperienceAction::CommonError(GENERIC_ERROR.to_string())),
                            }
                        }
                        Some(CreateExperienceOutcome::CreateExperienceErrors { errors }) => {
                            dispatch.send(NewExperienceAction::ServerErrors(errors.clone()));
                        }
                        Some(CreateExperienceOutcome::Unknown) | None => {
                            dispatch.send(NewExperienceAction::CommonError(GENERIC_ERROR.to_string()));
                        }
                    },
                    Ok(None) => {
                        dispatch.send(NewExperienceAction::CommonError(GENERIC_ERROR.to_string()));
                    }
                    Err(e) => {
                        log::error!("Creating experience failed: {e}");
                        dispatch.send(NewExperienceAction::CommonError(e.to_string()));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machines::NOTHING_TO_SAVE;
    use crate::mutations::{CreateExperienceErrorMeta, DefinitionError};

    fn titled() -> NewExperienceState {
        NewExperienceState::default().reduce(NewExperienceAction::SetTitle("Sleep".to_string()))
    }

    fn with_rows(names: &[&str]) -> NewExperienceState {
        let mut state = titled();
        for (index, name) in names.iter().enumerate() {
            if index > 0 {
                state = state.reduce(NewExperienceAction::AddDefinition);
            }
            let row = state.definitions[index].id;
            state = state
                .reduce(NewExperienceAction::SetDefinitionName {
                    row,
                    name: name.to_string(),
                })
                .reduce(NewExperienceAction::SetDefinitionType {
                    row,
                    type_: DataTypes::Integer,
                });
        }
        state
    }

    fn submitted_input(state: &NewExperienceState) -> &CreateExperienceInput {
        match state.effects() {
            [NewExperienceEffect::CreateExperience(input)] => input,
            other => panic!("expected a create effect, got {other:?}"),
        }
    }

    #[test]
    fn nothing_changed_only_warns() {
        let state = NewExperienceState::default().reduce(NewExperienceAction::Submit);
        assert_eq!(state.submission, Submission::Warning(NOTHING_TO_SAVE.to_string()));
        assert_eq!(state.effects(), &[NewExperienceEffect::ScrollToNotification]);
    }

    #[test]
    fn the_first_row_is_required_when_none_was_touched() {
        let state = titled().reduce(NewExperienceAction::Submit);
        assert_eq!(state.submission, Submission::CommonErrors(FORM_CONTAINS_ERRORS.to_string()));
        assert!(state.definitions[0].name.is_invalid());
        assert!(state.definitions[0].type_.is_invalid());
    }

    #[test]
    fn untouched_extra_rows_are_skipped() {
        let state = with_rows(&["hours"])
            .reduce(NewExperienceAction::AddDefinition)
            .reduce(NewExperienceAction::Submit);

        assert_eq!(state.submission, Submission::Active);
        let input = submitted_input(&state);
        assert_eq!(input.title, "Sleep");
        assert_eq!(input.data_definitions.len(), 1);
        assert_eq!(state.definitions[1].name, FieldState::Unchanged);
    }

    #[test]
    fn duplicate_names_mark_every_row() {
        let state = with_rows(&["hours", "Hours", "quality"]).reduce(NewExperienceAction::Submit);

        let taken_errors = vec![("name".to_string(), ALREADY_TAKEN.to_string())];
        let taken = Some(&taken_errors);
        assert_eq!(state.definitions[0].name.errors(), taken);
        assert_eq!(state.definitions[1].name.errors(), taken);
        assert!(!state.definitions[2].name.is_invalid());
        assert_eq!(state.submission, Submission::CommonErrors(FORM_CONTAINS_ERRORS.to_string()));
    }

    #[test]
    fn a_single_row_is_never_its_own_duplicate() {
        let state = with_rows(&["hours"]).reduce(NewExperienceAction::Submit);
        assert!(!state.definitions[0].name.is_invalid());
        assert_eq!(state.submission, Submission::Active);
    }

    #[test]
    fn rows_move_and_the_last_one_stays() {
        let state = with_rows(&["a1", "b2", "c3"]);
        let last = state.definitions[2].id;
        let moved = state.reduce(NewExperienceAction::MoveDefinition { row: last, to: 0 });
        let names: Vec<_> = moved
            .definitions
            .iter()
            .map(|r| r.name.value().cloned().unwrap_or_default())
            .collect();
        assert_eq!(names, vec!["c3", "a1", "b2"]);

        let only = NewExperienceState::default();
        let row = only.definitions[0].id;
        assert_eq!(only.reduce(NewExperienceAction::RemoveDefinition(row)).definitions.len(), 1);
    }

    #[test]
    fn server_errors_find_their_rows_after_a_reorder() {
        let state = with_rows(&["a1", "b2"]);
        let second = state.definitions[1].id;
        let state = state
            .reduce(NewExperienceAction::Submit)
            .reduce(NewExperienceAction::MoveDefinition { row: second, to: 0 })
            .reduce(NewExperienceAction::ServerErrors(CreateExperienceError {
                meta: CreateExperienceErrorMeta { index: 0 },
                data_definitions: Some(vec![DefinitionError {
                    index: 1,
                    name: Some("is reserved".to_string()),
                    type_: None,
                }]),
                ..Default::default()
            }));

        // index 1 of the submission was "b2", now shown first
        assert!(state.definitions[0].name.is_invalid());
        assert!(!state.definitions[1].name.is_invalid());
        assert_eq!(state.submission, Submission::CommonErrors(FORM_CONTAINS_ERRORS.to_string()));
    }
}
