//! Appwrite database event parsing.
//!
//! Event names follow
//! `databases.<db>.collections.<collection>.documents.<document>.<action>`.
//! Appwrite delivers them in a few shapes depending on how the function is
//! triggered; [`parse_event`] accepts all of them.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::models::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Create,
    Update,
    Delete,
}

impl FromStr for EventAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(EventAction::Create),
            "update" => Ok(EventAction::Update),
            "delete" => Ok(EventAction::Delete),
            other => Err(AppError::InvalidEvent(format!("Unknown action: {other}"))),
        }
    }
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventAction::Create => "create",
            EventAction::Update => "update",
            EventAction::Delete => "delete",
        })
    }
}

/// A parsed document event.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEvent {
    pub database_id: String,
    pub collection_id: String,
    pub document_id: String,
    pub action: EventAction,
    /// The document as delivered with the event, if any.
    pub payload: Option<Map<String, Value>>,
}

impl DocumentEvent {
    /// The payload as a [`Document`]. Create and update events require one.
    pub fn document(&self) -> Result<Document, AppError> {
        let payload = self
            .payload
            .as_ref()
            .filter(|p| p.get("$id").and_then(Value::as_str).is_some())
            .ok_or_else(|| {
                AppError::InvalidEvent(format!("{} event missing document payload", self.action))
            })?;
        Ok(serde_json::from_value(Value::Object(payload.clone()))?)
    }
}

/// Splits an event name into its database, collection, document and action.
pub fn parse_event_name(name: &str) -> Result<(String, String, String, EventAction), AppError> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() < 7 || parts[0] != "databases" {
        return Err(AppError::InvalidEvent(format!("Invalid event format: {name}")));
    }
    let action = parts[6].parse()?;
    Ok((
        parts[1].to_string(),
        parts[3].to_string(),
        parts[5].to_string(),
        action,
    ))
}

/// Picks the most specific name from an `events` array: the first one that
/// carries no wildcard segment.
fn pick_event_name(events: &[Value]) -> Option<&str> {
    let names: Vec<&str> = events.iter().filter_map(Value::as_str).collect();
    names
        .iter()
        .find(|n| !n.split('.').any(|seg| seg == "*"))
        .or_else(|| names.first())
        .copied()
}

/// Interprets an incoming request as a document event.
///
/// Accepted shapes, in order of precedence:
/// 1. an `x-appwrite-event` header, with the document as the body
/// 2. `{ "events": [...], "payload": {...} }` (payload defaults to the body)
/// 3. `{ "event": "...", ...document }`
/// 4. a bare document with `$collectionId` and `$databaseId`, treated as an
///    update
pub fn parse_event(body: &Value, header_event: Option<&str>) -> Result<DocumentEvent, AppError> {
    let object = body.as_object();

    let (name, payload) = if let Some(name) = header_event.filter(|h| !h.is_empty()) {
        (name.to_string(), object.cloned())
    } else if let Some(events) = object.and_then(|o| o.get("events")).and_then(Value::as_array) {
        let name = pick_event_name(events)
            .ok_or_else(|| AppError::InvalidEvent("events array is empty".to_string()))?;
        let payload = object
            .and_then(|o| o.get("payload"))
            .and_then(Value::as_object)
            .cloned()
            .or_else(|| object.cloned());
        (name.to_string(), payload)
    } else if let Some(name) = object.and_then(|o| o.get("event")).and_then(Value::as_str) {
        (name.to_string(), object.cloned())
    } else if let Some(doc) = object.filter(|o| {
        o.get("$collectionId").is_some() && o.get("$databaseId").is_some()
    }) {
        let text = |key: &str| {
            doc.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        return Ok(DocumentEvent {
            database_id: text("$databaseId"),
            collection_id: text("$collectionId"),
            document_id: text("$id"),
            action: EventAction::Update,
            payload: Some(doc.clone()),
        });
    } else {
        let keys: Vec<&String> = object.map(|o| o.keys().collect()).unwrap_or_default();
        return Err(AppError::InvalidEvent(format!(
            "Unable to parse event structure, got keys {keys:?}"
        )));
    };

    let (database_id, collection_id, document_id, action) = parse_event_name(&name)?;
    Ok(DocumentEvent {
        database_id,
        collection_id,
        document_id,
        action,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_event_name() {
        let (db, coll, doc, action) =
            parse_event_name("databases.main.collections.addons.documents.abc.create").unwrap();
        assert_eq!(db, "main");
        assert_eq!(coll, "addons");
        assert_eq!(doc, "abc");
        assert_eq!(action, EventAction::Create);
    }

    #[test]
    fn test_short_event_name_is_rejected() {
        let err = parse_event_name("databases.main.collections.addons.documents.abc").unwrap_err();
        assert!(matches!(err, AppError::InvalidEvent(_)));
        assert!(parse_event_name("").is_err());
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        let err =
            parse_event_name("databases.main.collections.addons.documents.abc.upsert").unwrap_err();
        assert_eq!(err.to_string(), "Invalid event: Unknown action: upsert");
    }

    #[test]
    fn test_events_array_with_payload() {
        let body = json!({
            "events": [
                "databases.*.collections.*.documents.*.update",
                "databases.main.collections.blogs.documents.b1.update"
            ],
            "payload": {"$id": "b1", "title": "Hello"}
        });
        let event = parse_event(&body, None).unwrap();
        assert_eq!(event.collection_id, "blogs");
        assert_eq!(event.document_id, "b1");
        assert_eq!(event.action, EventAction::Update);
        assert_eq!(event.document().unwrap().id, "b1");
    }

    #[test]
    fn test_event_string_with_inline_document() {
        let body = json!({
            "event": "databases.main.collections.schematics.documents.s9.delete",
            "$id": "s9"
        });
        let event = parse_event(&body, None).unwrap();
        assert_eq!(event.action, EventAction::Delete);
        assert_eq!(event.collection_id, "schematics");
    }

    #[test]
    fn test_bare_document_defaults_to_update() {
        let body = json!({
            "$id": "a1",
            "$collectionId": "addons",
            "$databaseId": "main",
            "name": "Create"
        });
        let event = parse_event(&body, None).unwrap();
        assert_eq!(event.action, EventAction::Update);
        assert_eq!(event.database_id, "main");
        assert_eq!(event.document_id, "a1");
    }

    #[test]
    fn test_header_event_takes_precedence() {
        let body = json!({"$id": "t1", "name": "tag"});
        let event = parse_event(
            &body,
            Some("databases.main.collections.blog_tags.documents.t1.create"),
        )
        .unwrap();
        assert_eq!(event.collection_id, "blog_tags");
        assert_eq!(event.action, EventAction::Create);
    }

    #[test]
    fn test_unrecognized_body() {
        let err = parse_event(&json!({"hello": "world"}), None).unwrap_err();
        assert!(err.to_string().contains("Unable to parse event structure"));
        assert!(parse_event(&json!(null), None).is_err());
    }

    #[test]
    fn test_create_without_payload_id_fails() {
        let body = json!({
            "events": ["databases.main.collections.blogs.documents.b1.create"],
            "payload": {"title": "no id"}
        });
        let event = parse_event(&body, None).unwrap();
        let err = event.document().unwrap_err();
        assert!(err.to_string().contains("create event missing document payload"));
    }
}
