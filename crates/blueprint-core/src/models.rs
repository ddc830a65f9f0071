use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A document as stored in Appwrite.
///
/// Keys beginning with `$` (`$collectionId`, `$permissions`, `$createdAt`,
/// ...) are system attributes; everything else is user content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "$id")]
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Returns the user-defined attributes, dropping every `$` attribute.
    pub fn user_fields(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .filter(|(k, _)| !k.starts_with('$'))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Builds the mirrored search representation of this document.
    pub fn to_search_record(&self) -> SearchRecord {
        SearchRecord {
            id: self.id.clone(),
            fields: self.user_fields(),
        }
    }
}

/// A document as mirrored into a search index. Primary key is `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// One page of a document listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentPage {
    /// Total matching documents across all pages.
    pub total: u64,
    pub documents: Vec<Document>,
}

/// Receipt of an index write that has finished processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReceipt {
    pub task_uid: u32,
}

/// Document count and indexing flag for one index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub number_of_documents: u64,
    pub is_indexing: bool,
}

/// Search engine liveness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineHealth {
    pub status: String,
    pub version: Option<String>,
}

/// A catalog the scanner pulls mods from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModSource {
    CurseForge,
    Modrinth,
}

impl ModSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModSource::CurseForge => "CurseForge",
            ModSource::Modrinth => "Modrinth",
        }
    }
}

impl fmt::Display for ModSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized mod record, as stored in the `addons` collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Addon {
    pub curseforge_id: Option<String>,
    pub modrinth_id: Option<String>,
    pub name: String,
    pub description: String,
    pub slug: String,
    pub sources: Vec<String>,
    pub icon: String,
    pub created_at: String,
    pub updated_at: String,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub downloads: u64,
    pub curseforge_raw: Option<String>,
    pub modrinth_raw: Option<String>,
    pub minecraft_versions: Vec<String>,
    pub loaders: Vec<String>,
    pub body: String,
}

impl Addon {
    /// Reads an addon back out of a stored document, ignoring system fields.
    pub fn from_document(doc: &Document) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(doc.user_fields()))
    }

    /// Serializes into the attribute map Appwrite expects.
    pub fn to_data(&self) -> Result<Map<String, Value>, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }
}

/// A page of Appwrite users.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPage {
    pub total: u64,
    pub users: Vec<Value>,
}

/// Membership of a user in a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    #[serde(rename = "$id")]
    pub id: String,
    pub user_id: String,
    pub team_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
}
