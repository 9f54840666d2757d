//! [`MutationClient`] over HTTP.

use futures::FutureExt as _;
use futures::future::LocalBoxFuture;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::mutations::{
    CreateExperienceInput, CreateExperienceOutcome, LoginInput, LoginOutcome, MutationClient,
    RegisterUserInput, RegisterUserOutcome, TransportError, UpdateExperienceInput,
    UpdateExperiencesOutcome,
};

const EXPERIENCE_FIELDS: &str = "
  fragment DataDefinitionFields on DataDefinition {
    __typename id name type clientId
  }
  fragment DataObjectFields on DataObject {
    __typename id definitionId data clientId insertedAt updatedAt
  }
  fragment EntryFields on Entry {
    __typename id experienceId clientId insertedAt updatedAt
    dataObjects { ...DataObjectFields }
  }
  fragment EntryErrorFields on CreateEntryErrors {
    errors {
      meta { experienceId index clientId }
      error clientId experienceId
      dataObjects { meta { index } definition definitionId clientId data }
    }
  }
";

const CREATE_EXPERIENCES: &str = "
  mutation CreateExperiences($input: [CreateExperienceInput!]!, $pagination: PaginationInput!) {
    createExperiences(input: $input) {
      __typename
      ... on ExperienceSuccess {
        experience {
          __typename id title description clientId insertedAt updatedAt
          dataDefinitions { ...DataDefinitionFields }
          entries(pagination: $pagination) {
            pageInfo { hasNextPage hasPreviousPage }
            edges { cursor node { ...EntryFields } }
          }
        }
        entriesErrors { ...EntryErrorFields }
      }
      ... on CreateExperienceErrors {
        errors { meta { index } title user clientId error dataDefinitions { index name type } }
      }
    }
  }
";

const UPDATE_EXPERIENCES: &str = "
  mutation UpdateExperiences($input: [UpdateExperienceInput!]!) {
    updateExperiences(input: $input) {
      __typename
      ... on UpdateExperiencesAllFail { error }
      ... on UpdateExperiencesSomeSuccess {
        experiences {
          __typename
          ... on UpdateExperienceErrors { errors { experienceId error } }
          ... on UpdateExperienceSomeSuccess {
            experience {
              experienceId updatedAt
              ownFields {
                __typename
                ... on ExperienceOwnFieldsSuccess { data { title description } }
                ... on UpdateExperienceOwnFieldsErrors { errors { title } }
              }
              updatedDefinitions {
                __typename
                ... on DefinitionSuccess { definition { ...DataDefinitionFields } }
                ... on DefinitionErrors { errors { id name error } }
              }
              newEntries {
                __typename
                ... on CreateEntrySuccess { entry { ...EntryFields } }
                ...EntryErrorFields
              }
              updatedEntries {
                __typename
                ... on UpdateEntrySomeSuccess {
                  entry {
                    entryId
                    dataObjects {
                      __typename
                      ... on DataObjectSuccess { dataObject { ...DataObjectFields } }
                      ... on DataObjectErrors { errors { id data error } }
                    }
                  }
                }
                ... on UpdateEntryErrors { errors { entryId error } }
              }
            }
          }
        }
      }
    }
  }
";

const LOGIN: &str = "
  mutation Login($input: LoginUserInput!) {
    login(input: $input) {
      __typename
      ... on UserSuccess { user { __typename id email jwt } }
      ... on LoginError { error }
    }
  }
";

const REGISTER_USER: &str = "
  mutation RegisterUser($input: RegisterUserInput!) {
    registerUser(input: $input) {
      __typename
      ... on UserSuccess { user { __typename id email jwt } }
      ... on RegisterUserErrors { errors { name email password passwordConfirmation } }
    }
  }
";

#[derive(Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<serde_json::Map<String, Value>>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Clone)]
pub struct GraphqlClient {
    url: String,
    token: Option<String>,
}

impl GraphqlClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
        }
    }

    pub fn with_token(self, token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..self
        }
    }

    /// Send one operation and decode the named field of `data`. A missing or
    /// null field is `Ok(None)`.
    async fn run<T: DeserializeOwned>(
        &self,
        document: String,
        variables: Value,
        field: &str,
    ) -> Result<Option<T>, TransportError> {
        let client = fetch_happen::Client;
        let token = self.token.as_deref().unwrap_or("anonymous");
        let response = client
            .post(&self.url)
            .json(&json!({ "query": document, "variables": variables }))
            .map_err(|e| TransportError::Network(format!("{e:?}")))?
            .header("Authorization", format!("Bearer {token}"))
            .send()
            .await
            .map_err(|e| TransportError::Network(format!("{e:?}")))?;

        if !response.ok() {
            return Err(TransportError::Http(u16::from(response.status())));
        }

        let body: GraphqlResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Decode(format!("{e:?}")))?;

        if let Some(error) = body.errors.first() {
            log::warn!("{field} returned {} error(s)", body.errors.len());
            if body.data.is_none() {
                return Err(TransportError::Network(error.message.clone()));
            }
        }

        match body.data.and_then(|mut data| data.remove(field)) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| TransportError::Decode(e.to_string())),
        }
    }
}

fn with_fragments(operation: &str) -> String {
    format!("{operation}\n{EXPERIENCE_FIELDS}")
}

impl MutationClient for GraphqlClient {
    fn create_experiences(
        &self,
        inputs: Vec<CreateExperienceInput>,
        entries_pagination: Value,
    ) -> LocalBoxFuture<'_, Result<Option<Vec<CreateExperienceOutcome>>, TransportError>> {
        // `entries_pagination` is `{"pagination": ...}`, the same arguments the cache keys by
        let mut variables = json!({ "input": inputs });
        if let (Some(object), Value::Object(pagination)) =
            (variables.as_object_mut(), entries_pagination)
        {
            object.extend(pagination);
        }
        self.run(with_fragments(CREATE_EXPERIENCES), variables, "createExperiences")
            .boxed_local()
    }

    fn update_experiences(
        &self,
        inputs: Vec<UpdateExperienceInput>,
    ) -> LocalBoxFuture<'_, Result<Option<UpdateExperiencesOutcome>, TransportError>> {
        self.run(
            with_fragments(UPDATE_EXPERIENCES),
            json!({ "input": inputs }),
            "updateExperiences",
        )
        .boxed_local()
    }

    fn login(
        &self,
        input: LoginInput,
    ) -> LocalBoxFuture<'_, Result<Option<LoginOutcome>, TransportError>> {
        self.run(LOGIN.to_string(), json!({ "input": input }), "login")
            .boxed_local()
    }

    fn register_user(
        &self,
        input: RegisterUserInput,
    ) -> LocalBoxFuture<'_, Result<Option<RegisterUserOutcome>, TransportError>> {
        self.run(REGISTER_USER.to_string(), json!({ "input": input }), "registerUser")
            .boxed_local()
    }
}
