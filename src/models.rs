//! Core data models exchanged with the note service.
//!
//! These types mirror the service's objects (notes, notebooks, tags,
//! resources) and the request shapes used for listing. They serialise to the
//! camelCase JSON used by the HTTP gateway; byte fields travel as base64.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One entry of a metadata listing page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteSummary {
    pub guid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook_guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<i64>,
}

/// A page of note metadata together with the total number of matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotesMetadataList {
    pub start_index: usize,
    pub total_notes: usize,
    #[serde(default)]
    pub notes: Vec<NoteSummary>,
}

/// Sort order for listings and searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoteSortOrder {
    Created,
    Updated,
    Relevance,
    Title,
}

impl FromStr for NoteSortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "created" => Ok(NoteSortOrder::Created),
            "updated" => Ok(NoteSortOrder::Updated),
            "relevance" => Ok(NoteSortOrder::Relevance),
            "title" => Ok(NoteSortOrder::Title),
            other => Err(format!(
                "unknown note order '{}'; expected created, updated, relevance or title",
                other
            )),
        }
    }
}

/// Which notes a listing should return. The default matches every note.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook_guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_guids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<NoteSortOrder>,
    #[serde(default)]
    pub ascending: bool,
}

/// Which optional fields a listing should fill in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotesMetadataResultSpec {
    #[serde(default)]
    pub include_title: bool,
    #[serde(default)]
    pub include_notebook_guid: bool,
    #[serde(default)]
    pub include_updated: bool,
}

impl NotesMetadataResultSpec {
    pub fn titles_only() -> Self {
        Self {
            include_title: true,
            ..Self::default()
        }
    }
}

/// A note as stored by the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteNote {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook_guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_guids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_names: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<Resource>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<i64>,
}

impl RemoteNote {
    pub fn resource_count(&self) -> usize {
        self.resources.as_ref().map_or(0, Vec::len)
    }
}

/// A binary attachment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_guid: Option<String>,
    pub mime: String,
    pub data: ResourceData,
    #[serde(default)]
    pub attributes: ResourceAttributes,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceData {
    #[serde(default, with = "base64_opt", skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<u8>>,
    #[serde(default)]
    pub size: usize,
    #[serde(default, with = "base64_bytes")]
    pub body_hash: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, rename = "sourceURL", skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default)]
    pub attachment: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notebook {
    pub guid: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default)]
    pub default_notebook: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub guid: String,
    pub name: String,
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

mod base64_opt {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => serializer.serialize_some(&STANDARD.encode(b)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_bytes_travel_as_base64() {
        let resource = Resource {
            mime: "text/plain".into(),
            data: ResourceData {
                body: Some(b"hello".to_vec()),
                size: 5,
                body_hash: vec![0x5d, 0x41],
            },
            attributes: ResourceAttributes {
                file_name: Some("a.txt".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let json = serde_json::to_value(&resource).unwrap();
        assert_eq!(json["data"]["body"], "aGVsbG8=");
        assert_eq!(json["data"]["bodyHash"], "XUE=");
        assert_eq!(json["attributes"]["fileName"], "a.txt");

        let back: Resource = serde_json::from_value(json).unwrap();
        assert_eq!(back, resource);
    }

    #[test]
    fn missing_optional_fields_deserialize() {
        let note: RemoteNote = serde_json::from_str(r#"{"guid":"g1","title":"T"}"#).unwrap();
        assert_eq!(note.guid.as_deref(), Some("g1"));
        assert!(note.content.is_none());
        assert_eq!(note.resource_count(), 0);
    }

    #[test]
    fn sort_order_parses_case_insensitively() {
        assert_eq!("Updated".parse::<NoteSortOrder>(), Ok(NoteSortOrder::Updated));
        assert!("size".parse::<NoteSortOrder>().is_err());
    }

    #[test]
    fn filter_serializes_order_in_wire_case() {
        let filter = NoteFilter {
            order: Some(NoteSortOrder::Created),
            ..Default::default()
        };
        let json = serde_json::to_value(&filter).unwrap();
        assert_eq!(json["order"], "CREATED");
        assert!(json.get("words").is_none());
    }
}
