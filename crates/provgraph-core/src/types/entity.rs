//! Canonical entities.

use super::{EntityId, EntityType, ProvGraphError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A canonical, typed node in the graph.
///
/// `id` is owned by the external resolution process; the engine never
/// rewrites or deduplicates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    #[serde(rename = "type", alias = "entity_type", alias = "node_type")]
    pub entity_type: EntityType,
    pub name: String,
    /// Ontology name to code (UMLS, HGNC, RxNorm, ...).
    #[serde(default)]
    pub external_ids: BTreeMap<String, String>,
    #[serde(default)]
    pub synonyms: BTreeSet<String>,
    /// Open bag for type-specific attributes.
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
    /// Precomputed embedding for similarity search.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f64>>,
}

impl Entity {
    #[must_use]
    pub fn new(id: impl Into<String>, entity_type: EntityType, name: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(id),
            entity_type,
            name: name.into(),
            external_ids: BTreeMap::new(),
            synonyms: BTreeSet::new(),
            properties: BTreeMap::new(),
            embedding: None,
        }
    }

    #[must_use]
    pub fn with_external_id(mut self, ontology: &str, code: &str) -> Self {
        self.external_ids
            .insert(ontology.to_string(), code.to_string());
        self
    }

    #[must_use]
    pub fn with_synonym(mut self, synonym: &str) -> Self {
        self.synonyms.insert(synonym.to_string());
        self
    }

    /// An embedding, when present, must be a non-empty vector of finite numbers.
    pub fn check_embedding(&self) -> Result<(), ProvGraphError> {
        match &self.embedding {
            Some(v) if v.is_empty() || v.iter().any(|x| !x.is_finite()) => {
                Err(ProvGraphError::DataIntegrity(format!(
                    "entity '{}' has an empty or non-finite embedding",
                    self.id
                )))
            }
            _ => Ok(()),
        }
    }

    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f64>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    #[must_use]
    pub fn with_property(mut self, key: &str, value: serde_json::Value) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entity_json_accepts_type_aliases() {
        let e: Entity = serde_json::from_value(json!({
            "id": "drug:tamoxifen",
            "node_type": "DRUG",
            "name": "tamoxifen",
            "synonyms": ["Nolvadex"]
        }))
        .expect("parse");
        assert_eq!(e.entity_type, EntityType::Drug);
        assert!(e.synonyms.contains("Nolvadex"));
        assert!(e.properties.is_empty());
        assert!(e.embedding.is_none());
    }

    #[test]
    fn embedding_is_optional_on_the_wire() {
        let e: Entity = serde_json::from_value(json!({
            "id": "drug:a", "type": "drug", "name": "A", "embedding": [0.5, -1.0]
        }))
        .expect("parse");
        assert_eq!(e.embedding, Some(vec![0.5, -1.0]));

        let bare = serde_json::to_value(Entity::new("drug:b", EntityType::Drug, "B"))
            .expect("serialize");
        assert!(bare.get("embedding").is_none());
    }

    #[test]
    fn empty_embedding_is_an_integrity_fault() {
        let empty = Entity::new("drug:a", EntityType::Drug, "A").with_embedding(Vec::new());
        assert!(matches!(
            empty.check_embedding(),
            Err(ProvGraphError::DataIntegrity(_))
        ));
        let nan = Entity::new("drug:a", EntityType::Drug, "A").with_embedding(vec![f64::NAN]);
        assert!(nan.check_embedding().is_err());
        assert!(Entity::new("drug:a", EntityType::Drug, "A").check_embedding().is_ok());
    }

    #[test]
    fn builder_sets_bags() {
        let e = Entity::new("gene:brca1", EntityType::Gene, "BRCA1")
            .with_external_id("HGNC", "1100")
            .with_property("chromosome", json!("17"));
        assert_eq!(e.external_ids.get("HGNC").map(String::as_str), Some("1100"));
        assert_eq!(e.properties.get("chromosome"), Some(&json!("17")));
    }
}
