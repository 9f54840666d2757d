//! The network side of every mutation: inputs, the tagged outcome unions the
//! server answers with, and the [`MutationClient`] seam.
//!
//! Every union decodes unexpected tags into an `Unknown` variant so a response
//! the client doesn't understand can be skipped instead of failing the whole call.

use chrono::{DateTime, Utc};
use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};

use crate::types::{DataDefinition, DataObject, DataTypes, Entry, Experience, User};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("{0}")]
    Network(String),

    #[error("server answered with HTTP {0}")]
    Http(u16),

    #[error("could not decode server response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub first: u32,
}

// -- inputs --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDataDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: DataTypes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDataObject {
    pub definition_id: String,
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inserted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CreateDataObject {
    pub fn new(definition_id: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            definition_id: definition_id.into(),
            data: data.into(),
            client_id: None,
            inserted_at: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntryInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience_id: Option<String>,
    pub data_objects: Vec<CreateDataObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inserted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExperienceInput {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub data_definitions: Vec<CreateDataDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inserted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<CreateEntryInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnFieldsInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDefinitionInput {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<DataTypes>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDataObjectInput {
    pub id: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEntryInput {
    pub entry_id: String,
    pub data_objects: Vec<UpdateDataObjectInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateExperienceInput {
    pub experience_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub own_fields: Option<OwnFieldsInput>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub update_definitions: Vec<UpdateDefinitionInput>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_entries: Vec<CreateEntryInput>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub update_entries: Vec<UpdateEntryInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserInput {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
    pub source: Option<String>,
}

// -- create experiences --

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateEntryErrorMeta {
    pub experience_id: Option<String>,
    pub index: usize,
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataObjectErrorMeta {
    pub index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataObjectError {
    pub meta: DataObjectErrorMeta,
    pub definition: Option<String>,
    pub definition_id: Option<String>,
    pub client_id: Option<String>,
    pub data: Option<String>,
}

impl DataObjectError {
    /// `(label, message)` pairs for every populated field.
    pub fn messages(&self) -> Vec<(String, String)> {
        [
            ("definition", &self.definition),
            ("definitionId", &self.definition_id),
            ("clientId", &self.client_id),
            ("data", &self.data),
        ]
        .into_iter()
        .filter_map(|(label, message)| Some((label.to_string(), message.clone()?)))
        .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateEntryError {
    pub meta: CreateEntryErrorMeta,
    pub error: Option<String>,
    pub client_id: Option<String>,
    pub experience_id: Option<String>,
    pub data_objects: Option<Vec<DataObjectError>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEntryErrors {
    #[serde(default)]
    pub errors: CreateEntryError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DefinitionError {
    pub index: usize,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub type_: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateExperienceErrorMeta {
    pub index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateExperienceError {
    pub meta: CreateExperienceErrorMeta,
    pub title: Option<String>,
    pub user: Option<String>,
    pub client_id: Option<String>,
    pub error: Option<String>,
    pub data_definitions: Option<Vec<DefinitionError>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "__typename", rename_all_fields = "camelCase")]
pub enum CreateExperienceOutcome {
    ExperienceSuccess {
        experience: Experience,
        #[serde(default)]
        entries_errors: Option<Vec<CreateEntryErrors>>,
    },
    CreateExperienceErrors {
        #[serde(default)]
        errors: CreateExperienceError,
    },
    #[serde(other)]
    Unknown,
}

// -- update experiences --

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnFields {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OwnFieldsError {
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "__typename", rename_all_fields = "camelCase")]
pub enum OwnFieldsOutcome {
    ExperienceOwnFieldsSuccess { data: OwnFields },
    UpdateExperienceOwnFieldsErrors {
        #[serde(default)]
        errors: OwnFieldsError,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DefinitionUpdateError {
    pub id: String,
    pub name: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "__typename", rename_all_fields = "camelCase")]
pub enum DefinitionOutcome {
    DefinitionSuccess { definition: DataDefinition },
    DefinitionErrors {
        #[serde(default)]
        errors: DefinitionUpdateError,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "__typename", rename_all_fields = "camelCase")]
pub enum CreateEntryOutcome {
    CreateEntrySuccess { entry: Entry },
    CreateEntryErrors {
        #[serde(default)]
        errors: CreateEntryError,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataObjectUpdateError {
    pub id: String,
    pub data: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "__typename", rename_all_fields = "camelCase")]
pub enum DataObjectOutcome {
    DataObjectSuccess { data_object: DataObject },
    DataObjectErrors {
        #[serde(default)]
        errors: DataObjectUpdateError,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedEntry {
    pub entry_id: String,
    #[serde(default)]
    pub data_objects: Vec<DataObjectOutcome>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateEntryError {
    pub entry_id: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "__typename", rename_all_fields = "camelCase")]
pub enum UpdateEntryOutcome {
    UpdateEntrySomeSuccess { entry: UpdatedEntry },
    UpdateEntryErrors {
        #[serde(default)]
        errors: UpdateEntryError,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedExperience {
    pub experience_id: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub own_fields: Option<OwnFieldsOutcome>,
    #[serde(default)]
    pub updated_definitions: Option<Vec<DefinitionOutcome>>,
    #[serde(default)]
    pub new_entries: Option<Vec<CreateEntryOutcome>>,
    #[serde(default)]
    pub updated_entries: Option<Vec<UpdateEntryOutcome>>,
}

impl UpdatedExperience {
    pub fn new(experience_id: impl Into<String>) -> Self {
        Self {
            experience_id: experience_id.into(),
            updated_at: None,
            own_fields: None,
            updated_definitions: None,
            new_entries: None,
            updated_entries: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateExperienceError {
    pub experience_id: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "__typename", rename_all_fields = "camelCase")]
pub enum UpdateExperienceOutcome {
    UpdateExperienceSomeSuccess { experience: UpdatedExperience },
    UpdateExperienceErrors {
        #[serde(default)]
        errors: UpdateExperienceError,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "__typename", rename_all_fields = "camelCase")]
pub enum UpdateExperiencesOutcome {
    UpdateExperiencesSomeSuccess {
        experiences: Vec<UpdateExperienceOutcome>,
    },
    UpdateExperiencesAllFail {
        error: String,
    },
    #[serde(other)]
    Unknown,
}

// -- auth --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "__typename", rename_all_fields = "camelCase")]
pub enum LoginOutcome {
    UserSuccess { user: User },
    LoginError { error: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterUserError {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "__typename", rename_all_fields = "camelCase")]
pub enum RegisterUserOutcome {
    UserSuccess { user: User },
    RegisterUserErrors {
        #[serde(default)]
        errors: RegisterUserError,
    },
    #[serde(other)]
    Unknown,
}

/// The server as the core sees it. `Ok(None)` means the call went through but
/// the payload was missing.
pub trait MutationClient {
    fn create_experiences(
        &self,
        inputs: Vec<CreateExperienceInput>,
        entries_pagination: serde_json::Value,
    ) -> LocalBoxFuture<'_, Result<Option<Vec<CreateExperienceOutcome>>, TransportError>>;

    fn update_experiences(
        &self,
        inputs: Vec<UpdateExperienceInput>,
    ) -> LocalBoxFuture<'_, Result<Option<UpdateExperiencesOutcome>, TransportError>>;

    fn login(
        &self,
        input: LoginInput,
    ) -> LocalBoxFuture<'_, Result<Option<LoginOutcome>, TransportError>>;

    fn register_user(
        &self,
        input: RegisterUserInput,
    ) -> LocalBoxFuture<'_, Result<Option<RegisterUserOutcome>, TransportError>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_typenames_decode_as_unknown() {
        let outcome: CreateExperienceOutcome =
            serde_json::from_value(json!({ "__typename": "SomethingNew", "x": 1 })).unwrap();
        assert_eq!(outcome, CreateExperienceOutcome::Unknown);

        let outcome: UpdateExperiencesOutcome =
            serde_json::from_value(json!({ "__typename": "UpdateExperiencesAllFail", "error": "no" }))
                .unwrap();
        assert!(matches!(outcome, UpdateExperiencesOutcome::UpdateExperiencesAllFail { .. }));
    }

    #[test]
    fn entry_errors_carry_their_index() {
        let outcome: CreateEntryOutcome = serde_json::from_value(json!({
            "__typename": "CreateEntryErrors",
            "errors": {
                "meta": { "experienceId": "1", "index": 0, "clientId": "offline-1--0" },
                "dataObjects": [{ "meta": { "index": 0 }, "data": "is invalid" }],
            }
        }))
        .unwrap();

        let CreateEntryOutcome::CreateEntryErrors { errors } = outcome else {
            panic!("expected CreateEntryErrors");
        };
        assert_eq!(errors.meta.client_id.as_deref(), Some("offline-1--0"));
        let data_objects = errors.data_objects.unwrap_or_default();
        assert_eq!(data_objects[0].messages(), vec![("data".to_string(), "is invalid".to_string())]);
    }

    #[test]
    fn partial_failures_still_decode() {
        let outcome: UpdateExperiencesOutcome = serde_json::from_value(json!({
            "__typename": "UpdateExperiencesSomeSuccess",
            "experiences": [{
                "__typename": "UpdateExperienceSomeSuccess",
                "experience": {
                    "experienceId": "1",
                    "ownFields": { "__typename": "UpdateExperienceOwnFieldsErrors" },
                    "updatedDefinitions": [{ "__typename": "DefinitionErrors" }],
                    "newEntries": [{
                        "__typename": "CreateEntrySuccess",
                        "entry": {
                            "id": "e1",
                            "experienceId": "1",
                            "clientId": "e1",
                            "insertedAt": "2020-05-08T10:30:00Z",
                            "updatedAt": "2020-05-08T10:30:00Z",
                            "dataObjects": [],
                        },
                    }],
                },
            }],
        }))
        .unwrap();

        let UpdateExperiencesOutcome::UpdateExperiencesSomeSuccess { experiences } = outcome else {
            panic!("expected UpdateExperiencesSomeSuccess");
        };
        let UpdateExperienceOutcome::UpdateExperienceSomeSuccess { experience } = &experiences[0]
        else {
            panic!("expected UpdateExperienceSomeSuccess");
        };
        assert_eq!(
            experience.own_fields,
            Some(OwnFieldsOutcome::UpdateExperienceOwnFieldsErrors {
                errors: OwnFieldsError::default()
            })
        );
        assert_eq!(
            experience.updated_definitions,
            Some(vec![DefinitionOutcome::DefinitionErrors {
                errors: DefinitionUpdateError::default()
            }])
        );
        let new_entries = experience.new_entries.clone().unwrap_or_default();
        assert!(matches!(
            &new_entries[0],
            CreateEntryOutcome::CreateEntrySuccess { entry } if entry.id == "e1"
        ));
    }

    #[test]
    fn empty_update_lists_are_not_sent() {
        let input = UpdateExperienceInput {
            experience_id: "1".to_string(),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&input).unwrap(), json!({ "experienceId": "1" }));
    }
}
