//! Entities as the server sends them. Field names follow the GraphQL payloads,
//! and every entity carries its `__typename` so the cache can normalize it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn experience_typename() -> String {
    "Experience".to_string()
}

fn definition_typename() -> String {
    "DataDefinition".to_string()
}

fn entry_typename() -> String {
    "Entry".to_string()
}

fn data_object_typename() -> String {
    "DataObject".to_string()
}

fn user_typename() -> String {
    "User".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataTypes {
    SingleLineText,
    MultiLineText,
    Integer,
    Decimal,
    Date,
    Datetime,
}

impl DataTypes {
    /// The key a data object's `data` JSON is stored under.
    pub fn data_key(self) -> &'static str {
        match self {
            DataTypes::SingleLineText => "single_line_text",
            DataTypes::MultiLineText => "multi_line_text",
            DataTypes::Integer => "integer",
            DataTypes::Decimal => "decimal",
            DataTypes::Date => "date",
            DataTypes::Datetime => "datetime",
        }
    }

    /// `{"integer":"1"}` and friends.
    pub fn encode_data(self, value: &str) -> String {
        let mut object = serde_json::Map::new();
        object.insert(
            self.data_key().to_string(),
            serde_json::Value::String(value.to_string()),
        );
        serde_json::Value::Object(object).to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataDefinition {
    #[serde(rename = "__typename", default = "definition_typename")]
    pub typename: String,
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub type_: DataTypes,
    #[serde(default)]
    pub client_id: Option<String>,
}

impl DataDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, type_: DataTypes) -> Self {
        Self {
            typename: definition_typename(),
            id: id.into(),
            name: name.into(),
            type_,
            client_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataObject {
    #[serde(rename = "__typename", default = "data_object_typename")]
    pub typename: String,
    pub id: String,
    pub definition_id: String,
    /// JSON text, see [`DataTypes::encode_data`].
    pub data: String,
    #[serde(default)]
    pub client_id: Option<String>,
    pub inserted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DataObject {
    pub fn new(
        id: impl Into<String>,
        definition_id: impl Into<String>,
        data: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            typename: data_object_typename(),
            id: id.into(),
            definition_id: definition_id.into(),
            data: data.into(),
            client_id: None,
            inserted_at: timestamp,
            updated_at: timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    #[serde(rename = "__typename", default = "entry_typename")]
    pub typename: String,
    pub id: String,
    pub experience_id: String,
    #[serde(default)]
    pub client_id: Option<String>,
    pub inserted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub data_objects: Vec<DataObject>,
}

impl Entry {
    pub fn new(
        id: impl Into<String>,
        experience_id: impl Into<String>,
        data_objects: Vec<DataObject>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            typename: entry_typename(),
            id: id.into(),
            experience_id: experience_id.into(),
            client_id: None,
            inserted_at: timestamp,
            updated_at: timestamp,
            data_objects,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryConnectionEdge {
    pub cursor: String,
    pub node: Entry,
}

impl EntryConnectionEdge {
    pub fn new(node: Entry) -> Self {
        Self {
            cursor: String::new(),
            node,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryConnection {
    pub page_info: PageInfo,
    pub edges: Vec<EntryConnectionEdge>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experience {
    #[serde(rename = "__typename", default = "experience_typename")]
    pub typename: String,
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    pub inserted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub data_definitions: Vec<DataDefinition>,
    pub entries: EntryConnection,
}

impl Experience {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        data_definitions: Vec<DataDefinition>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            typename: experience_typename(),
            id: id.into(),
            title: title.into(),
            description: None,
            client_id: None,
            inserted_at: timestamp,
            updated_at: timestamp,
            data_definitions,
            entries: EntryConnection::default(),
        }
    }

    pub fn definition(&self, id: &str) -> Option<&DataDefinition> {
        self.data_definitions.iter().find(|d| d.id == id)
    }
}

/// What the mini list shows. Normalizes into the same cache entity as the
/// full [`Experience`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceMini {
    #[serde(rename = "__typename", default = "experience_typename")]
    pub typename: String,
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    pub inserted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Experience> for ExperienceMini {
    fn from(experience: &Experience) -> Self {
        Self {
            typename: experience.typename.clone(),
            id: experience.id.clone(),
            title: experience.title.clone(),
            description: experience.description.clone(),
            client_id: experience.client_id.clone(),
            inserted_at: experience.inserted_at,
            updated_at: experience.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperienceEdge {
    pub cursor: String,
    pub node: ExperienceMini,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceConnection {
    pub page_info: PageInfo,
    pub edges: Vec<ExperienceEdge>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "__typename", default = "user_typename")]
    pub typename: String,
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub jwt: Option<String>,
}
