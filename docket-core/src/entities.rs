//! Domain record descriptors shared between the model layer and the caches.

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of domain record managed by the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelType {
    Client,
    Template,
    Document,
}

impl ModelType {
    /// All model types, in declaration order.
    pub const ALL: [ModelType; 3] = [ModelType::Client, ModelType::Template, ModelType::Document];

    /// Upper-case tag used in logs and on disk.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Client => "CLIENT",
            ModelType::Template => "TEMPLATE",
            ModelType::Document => "DOCUMENT",
        }
    }

    /// TTL cache namespace holding records of this type.
    pub fn namespace(&self) -> &'static str {
        match self {
            ModelType::Client => "clients",
            ModelType::Template => "templates",
            ModelType::Document => "documents",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lightweight summary of a domain record.
///
/// Produced by a type-specific summarizer over the full record. Unique per
/// `(model_type, id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub id: String,
    pub display_name: String,
    pub model_type: ModelType,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Free-form one-line description shown in list views.
    pub summary: String,
    /// Stamped by the lazy loader whenever the record is loaded or read.
    pub last_accessed: Option<Timestamp>,
}

impl ModelMetadata {
    /// Create metadata with `created_at == updated_at` and no access stamp.
    pub fn new(
        model_type: ModelType,
        id: impl Into<String>,
        display_name: impl Into<String>,
        summary: impl Into<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            model_type,
            created_at,
            updated_at: created_at,
            summary: summary.into(),
            last_accessed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_model_type_serde_matches_display() {
        for ty in ModelType::ALL {
            let json = serde_json::to_string(&ty).unwrap();
            assert_eq!(json, format!("\"{}\"", ty));
            let back: ModelType = serde_json::from_str(&json).unwrap();
            assert_eq!(back, ty);
        }
    }

    #[test]
    fn test_model_type_namespaces_are_distinct() {
        let mut names: Vec<_> = ModelType::ALL.iter().map(|t| t.namespace()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), ModelType::ALL.len());
    }

    #[test]
    fn test_metadata_new() {
        let now = Utc::now();
        let meta = ModelMetadata::new(ModelType::Client, "c1", "Acme", "3 documents", now);
        assert_eq!(meta.id, "c1");
        assert_eq!(meta.created_at, meta.updated_at);
        assert!(meta.last_accessed.is_none());
    }
}
