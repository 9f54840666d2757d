//! The form for adding an entry to an experience.
//!
//! Where the entry goes depends on connectivity and on the experience itself:
//! offline it is written locally; online, an experience the server already
//! knows gets the entry through `updateExperiences`, while an offline
//! experience is first created on the server along with all its entries.

use std::rc::Rc;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use im::{HashMap, Vector};

use crate::context::{Env, Route};
use crate::machines::{
    Dispatch, EffectHandler, FORM_CONTAINS_ERRORS, FieldState, GENERIC_ERROR, Machine,
    Submission, Validity, nothing_to_save, settle,
};
use crate::mutations::{
    CreateDataObject, CreateEntryError, CreateEntryInput, CreateEntryOutcome,
    CreateExperienceOutcome, UpdateExperienceInput, UpdateExperienceOutcome,
    UpdateExperiencesOutcome,
};
use crate::offline_ids::is_offline_id;
use crate::offline_resolvers::{create_offline_entry, promotion_input};
use crate::reconcile::{reconcile_create_experiences, update_experiences_reconciler};
use crate::types::{DataDefinition, DataTypes, Entry, Experience};

pub const NOTIFICATION_ID: &str = "new-entry-submit-notification";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    Text(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
}

impl FormValue {
    /// Empty text, except today for dates and now for date-times.
    pub fn default_for(type_: DataTypes, now: DateTime<Utc>) -> Self {
        match type_ {
            DataTypes::Date => FormValue::Date(now.date_naive()),
            DataTypes::Datetime => FormValue::DateTime(now),
            _ => FormValue::Text(String::new()),
        }
    }
}

/// The `data` of a data object. Empty numbers count as zero.
pub fn to_data_json(type_: DataTypes, value: &FormValue) -> Result<String, String> {
    let text = match (type_, value) {
        (DataTypes::SingleLineText | DataTypes::MultiLineText, FormValue::Text(text)) => {
            text.clone()
        }
        (DataTypes::Integer, FormValue::Text(text)) => {
            let text = or_zero(text);
            text.parse::<i64>()
                .map_err(|_| "is not a whole number".to_string())?;
            text.to_string()
        }
        (DataTypes::Decimal, FormValue::Text(text)) => {
            let text = or_zero(text);
            match text.parse::<f64>() {
                Ok(number) if number.is_finite() => text.to_string(),
                _ => return Err("is not a number".to_string()),
            }
        }
        (DataTypes::Date, FormValue::Date(date)) => date.format("%Y-%m-%d").to_string(),
        (DataTypes::Datetime, FormValue::DateTime(datetime)) => {
            datetime.to_rfc3339_opts(SecondsFormat::Millis, true)
        }
        _ => return Err("has the wrong kind of value".to_string()),
    };

    Ok(type_.encode_data(&text))
}

fn or_zero(text: &str) -> &str {
    match text.trim() {
        "" => "0",
        trimmed => trimmed,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntryState {
    pub experience_id: String,
    pub definitions: Vector<DataDefinition>,
    /// Keyed by definition id.
    pub fields: HashMap<String, FieldState<FormValue>>,
    defaults: HashMap<String, FormValue>,
    pub submission: Submission,
    effects: Vec<NewEntryEffect>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewEntryAction {
    SetValue {
        definition_id: String,
        value: FormValue,
    },
    Submit,
    ServerErrors(CreateEntryError),
    CommonError(String),
    CloseSubmitNotification,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewEntryEffect {
    ScrollToNotification,
    CreateEntry {
        experience_id: String,
        data_objects: Vec<CreateDataObject>,
    },
}

impl NewEntryState {
    pub fn new(experience: &Experience, now: DateTime<Utc>) -> Self {
        let defaults = experience
            .data_definitions
            .iter()
            .map(|d| (d.id.clone(), FormValue::default_for(d.type_, now)))
            .collect();
        let fields = experience
            .data_definitions
            .iter()
            .map(|d| (d.id.clone(), FieldState::Unchanged))
            .collect();

        Self {
            experience_id: experience.id.clone(),
            definitions: experience.data_definitions.iter().cloned().collect(),
            fields,
            defaults,
            submission: Submission::Inactive,
            effects: Vec::new(),
        }
    }

    /// What the field shows: its value, or the default if untouched.
    pub fn value(&self, definition_id: &str) -> Option<FormValue> {
        self.fields
            .get(definition_id)
            .and_then(|f| f.value().cloned())
            .or_else(|| self.defaults.get(definition_id).cloned())
    }

    fn field(&self, definition_id: &str) -> FieldState<FormValue> {
        self.fields.get(definition_id).cloned().unwrap_or_default()
    }

    fn submit(&mut self) {
        if !self.fields.values().any(FieldState::is_changed) {
            nothing_to_save(
                &mut self.submission,
                &mut self.effects,
                NewEntryEffect::ScrollToNotification,
            );
            return;
        }

        let mut data_objects = Vec::new();
        let mut invalid = false;

        for definition in self.definitions.clone() {
            let value = self
                .value(&definition.id)
                .unwrap_or_else(|| FormValue::Text(String::new()));
            let mut field = self.field(&definition.id);

            match to_data_json(definition.type_, &value) {
                Ok(data) => {
                    if field.is_changed() {
                        field = FieldState::Changed {
                            value,
                            validity: Validity::Valid,
                        };
                    }
                    data_objects.push(CreateDataObject::new(&definition.id, data));
                }
                Err(message) => {
                    field.invalidate(value, vec![(definition.name.clone(), message)]);
                    invalid = true;
                }
            }

            self.fields.insert(definition.id, field);
        }

        let submit = (!invalid).then(|| NewEntryEffect::CreateEntry {
            experience_id: self.experience_id.clone(),
            data_objects,
        });

        settle(
            &mut self.submission,
            &mut self.effects,
            submit,
            NewEntryEffect::ScrollToNotification,
        );
    }

    /// Data object errors carry the index of the data object, which is the
    /// index of its definition in the form.
    fn project_server_errors(&mut self, errors: CreateEntryError) {
        let mut projected = false;

        for error in errors.data_objects.unwrap_or_default() {
            let Some(definition) = self.definitions.get(error.meta.index).cloned() else {
                log::warn!("Server reported an error for unknown data object {}", error.meta.index);
                continue;
            };
            let messages = error.messages();
            if messages.is_empty() {
                continue;
            }

            let fallback = self
                .value(&definition.id)
                .unwrap_or_else(|| FormValue::Text(String::new()));
            let mut field = self.field(&definition.id);
            field.invalidate(fallback, messages);
            self.fields.insert(definition.id, field);
            projected = true;
        }

        let banner = if projected {
            FORM_CONTAINS_ERRORS.to_string()
        } else {
            errors.error.unwrap_or_else(|| GENERIC_ERROR.to_string())
        };
        self.submission = Submission::CommonErrors(banner);
        self.effects.push(NewEntryEffect::ScrollToNotification);
    }
}

impl Machine for NewEntryState {
    type Action = NewEntryAction;
    type Effect = NewEntryEffect;

    fn reduce(&self, action: NewEntryAction) -> Self {
        let mut next = self.clone();
        next.effects.clear();

        match action {
            NewEntryAction::SetValue {
                definition_id,
                value,
            } => {
                if next.fields.contains_key(&definition_id) {
                    next.fields.insert(definition_id, FieldState::changed(value));
                } else {
                    log::warn!("Ignoring value for unknown definition {definition_id}");
                }
            }
            NewEntryAction::Submit => next.submit(),
            NewEntryAction::ServerErrors(errors) => next.project_server_errors(errors),
            NewEntryAction::CommonError(message) => {
                next.submission = Submission::CommonErrors(message);
                next.effects.push(NewEntryEffect::ScrollToNotification);
            }
            NewEntryAction::CloseSubmitNotification => next.submission = Submission::Inactive,
            NewEntryAction::Reset => {
                next.fields = next
                    .fields
                    .keys()
                    .map(|id| (id.clone(), FieldState::Unchanged))
                    .collect();
                next.submission = Submission::Inactive;
            }
        }

        next
    }

    fn effects(&self) -> &[NewEntryEffect] {
        &self.effects
    }
}

pub struct NewEntryEffects {
    pub env: Env,
    /// Tells the experience screen that it has a new entry.
    pub on_entry_created: Rc<dyn Fn(&Entry)>,
}

impl NewEntryEffects {
    pub fn new(env: Env, on_entry_created: impl Fn(&Entry) + 'static) -> Self {
        Self {
            env,
            on_entry_created: Rc::new(on_entry_created),
        }
    }

    async fn created(&self, entry: &Entry) {
        self.env.persist_cache().await;
        (self.on_entry_created)(entry);
        self.env
            .navigator
            .navigate(Route::Experience(entry.experience_id.clone()));
    }

    async fn create_offline(
        &self,
        experience_id: &str,
        data_objects: &[CreateDataObject],
        dispatch: &Dispatch<NewEntryAction>,
    ) {
        match create_offline_entry(&self.env.cache, experience_id, data_objects) {
            Some(created) => self.created(&created.entry).await,
            None => dispatch.send(NewEntryAction::CommonError(GENERIC_ERROR.to_string())),
        }
    }

    /// The entry is saved offline first, so a failed promotion loses nothing.
    async fn promote(
        &self,
        experience_id: &str,
        data_objects: &[CreateDataObject],
        dispatch: &Dispatch<NewEntryAction>,
    ) {
        let Some(offline) = create_offline_entry(&self.env.cache, experience_id, data_objects)
        else {
            dispatch.send(NewEntryAction::CommonError(GENERIC_ERROR.to_string()));
            return;
        };
        self.env.persist_cache().await;

        let response = self
            .env
            .client
            .create_experiences(
                vec![promotion_input(&offline.experience)],
                self.env.config.entries_pagination(),
            )
            .await;

        let outcomes = match response {
            Ok(Some(outcomes)) => outcomes,
            Ok(None) => {
                dispatch.send(NewEntryAction::CommonError(GENERIC_ERROR.to_string()));
                return;
            }
            Err(e) => {
                log::error!("Promoting experience {experience_id} failed: {e}");
                dispatch.send(NewEntryAction::CommonError(e.to_string()));
                return;
            }
        };

        match outcomes.first() {
            Some(CreateExperienceOutcome::ExperienceSuccess { .. }) => {
                let created = reconcile_create_experiences(&self.env.cache, &outcomes);
                let entry = created
                    .first()
                    .and_then(|experience| experience.entries.edges.first())
                    .map(|edge| edge.node.clone());
                match entry {
                    Some(entry) => self.created(&entry).await,
                    None => dispatch.send(NewEntryAction::CommonError(GENERIC_ERROR.to_string())),
                }
            }
            Some(CreateExperienceOutcome::CreateExperienceErrors { errors }) => {
                let message = errors
                    .error
                    .clone()
                    .unwrap_or_else(|| GENERIC_ERROR.to_string());
                dispatch.send(NewEntryAction::CommonError(message));
            }
            Some(CreateExperienceOutcome::Unknown) | None => {
                dispatch.send(NewEntryAction::CommonError(GENERIC_ERROR.to_string()));
            }
        }
    }

    async fn create_online(
        &self,
        experience_id: &str,
        data_objects: Vec<CreateDataObject>,
        dispatch: &Dispatch<NewEntryAction>,
    ) {
        let input = UpdateExperienceInput {
            experience_id: experience_id.to_string(),
            add_entries: vec![CreateEntryInput {
                experience_id: Some(experience_id.to_string()),
                data_objects,
                client_id: None,
                inserted_at: None,
                updated_at: None,
            }],
            ..Default::default()
        };

        let outcome = match self.env.client.update_experiences(vec![input]).await {
            Ok(Some(outcome)) => outcome,
            Ok(None) => {
                dispatch.send(NewEntryAction::CommonError(GENERIC_ERROR.to_string()));
                return;
            }
            Err(e) => {
                log::error!("Adding entry to experience {experience_id} failed: {e}");
                dispatch.send(NewEntryAction::CommonError(e.to_string()));
                return;
            }
        };

        match first_new_entry(&outcome) {
            Ok(entry) => {
                let cache = &self.env.cache;
                let reconcile = update_experiences_reconciler(|| {
                    if let Some(experience) = cache.read_experience(experience_id) {
                        cache.float_to_top(&experience);
                    }
                });
                reconcile(cache, &outcome);
                self.created(&entry).await;
            }
            Err(action) => dispatch.send(action),
        }
    }
}

/// The entry the server created, or the action explaining why it didn't.
fn first_new_entry(outcome: &UpdateExperiencesOutcome) -> Result<Entry, NewEntryAction> {
    let generic = || NewEntryAction::CommonError(GENERIC_ERROR.to_string());

    let experiences = match outcome {
        UpdateExperiencesOutcome::UpdateExperiencesSomeSuccess { experiences } => experiences,
        UpdateExperiencesOutcome::UpdateExperiencesAllFail { error } => {
            return Err(NewEntryAction::CommonError(error.clone()));
        }
        UpdateExperiencesOutcome::Unknown => return Err(generic()),
    };

    let experience = match experiences.first() {
        Some(UpdateExperienceOutcome::UpdateExperienceSomeSuccess { experience }) => experience,
        Some(UpdateExperienceOutcome::UpdateExperienceErrors { errors }) => {
            return Err(NewEntryAction::CommonError(errors.error.clone()));
        }
        Some(UpdateExperienceOutcome::Unknown) | None => return Err(generic()),
    };

    match experience.new_entries.as_deref().and_then(<[_]>::first) {
        Some(CreateEntryOutcome::CreateEntrySuccess { entry }) => Ok(entry.clone()),
        Some(CreateEntryOutcome::CreateEntryErrors { errors }) => {
            Err(NewEntryAction::ServerErrors(errors.clone()))
        }
        Some(CreateEntryOutcome::Unknown) | None => Err(generic()),
    }
}

impl EffectHandler<NewEntryState> for NewEntryEffects {
    async fn run(&self, effect: NewEntryEffect, dispatch: &Dispatch<NewEntryAction>) {
        match effect {
            NewEntryEffect::ScrollToNotification => {
                self.env.navigator.scroll_into_view(NOTIFICATION_ID);
            }
            NewEntryEffect::CreateEntry {
                experience_id,
                data_objects,
            } => {
                if !self.env.is_connected() {
                    self.create_offline(&experience_id, &data_objects, dispatch)
                        .await;
                } else if is_offline_id(&experience_id) {
                    self.promote(&experience_id, &data_objects, dispatch).await;
                } else {
                    self.create_online(&experience_id, data_objects, dispatch)
                        .await;
                }
            }
        }
    }
}
