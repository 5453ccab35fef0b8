//! In-memory content store seeded from a TOML file.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::application::repos::{ContentStore, RepoError};
use crate::cache::{rw_read, rw_write};
use crate::domain::ContentId;
use crate::domain::entities::{AccessRule, ContentDocument, DomainRoute};
use crate::domain::error::DomainError;

use super::error::InfraError;

const SOURCE: &str = "infra::content_store";

/// Seed file layout: `[[documents]]`, `[[access_rules]]` and `[[domains]]` tables.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ContentSeed {
    pub documents: Vec<ContentDocument>,
    pub access_rules: Vec<AccessRule>,
    pub domains: Vec<DomainRoute>,
}

#[derive(Default)]
struct StoreState {
    documents: HashMap<ContentId, ContentDocument>,
    access_rules: Vec<AccessRule>,
    domains: HashMap<String, DomainRoute>,
}

#[derive(Default)]
pub struct InMemoryContentStore {
    state: RwLock<StoreState>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: ContentSeed) -> Result<Self, DomainError> {
        let store = Self::new();
        for doc in seed.documents {
            store.upsert(doc)?;
        }
        {
            let mut state = rw_write(&store.state, SOURCE, "from_seed");
            state.access_rules = seed.access_rules;
            for route in seed.domains {
                state.domains.insert(route.host.to_ascii_lowercase(), route);
            }
        }
        Ok(store)
    }

    pub fn parse_seed(text: &str) -> Result<ContentSeed, toml::de::Error> {
        toml::from_str(text)
    }

    pub async fn load_seed_file(path: &Path) -> Result<Self, InfraError> {
        let text = tokio::fs::read_to_string(path).await?;
        let seed =
            Self::parse_seed(&text).map_err(|err| InfraError::seed(path, err.to_string()))?;
        let documents = seed.documents.len();
        let store =
            Self::from_seed(seed).map_err(|err| InfraError::seed(path, err.to_string()))?;
        info!(path = %path.display(), documents, "Content store seeded");
        Ok(store)
    }

    pub fn upsert(&self, doc: ContentDocument) -> Result<(), DomainError> {
        doc.validate()?;
        rw_write(&self.state, SOURCE, "upsert")
            .documents
            .insert(doc.id, doc);
        Ok(())
    }

    pub fn delete(&self, id: ContentId) -> Option<ContentDocument> {
        rw_write(&self.state, SOURCE, "delete").documents.remove(&id)
    }

    pub fn len(&self) -> usize {
        rw_read(&self.state, SOURCE, "len").documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ContentStore for InMemoryContentStore {
    fn find_by_id(&self, id: ContentId) -> Result<Option<ContentDocument>, RepoError> {
        Ok(rw_read(&self.state, SOURCE, "find_by_id")
            .documents
            .get(&id)
            .cloned())
    }

    fn find_by_key(&self, key: Uuid) -> Result<Option<ContentDocument>, RepoError> {
        Ok(rw_read(&self.state, SOURCE, "find_by_key")
            .documents
            .values()
            .find(|doc| doc.key == key)
            .cloned())
    }

    fn children_of(&self, id: ContentId) -> Result<Vec<ContentDocument>, RepoError> {
        Ok(rw_read(&self.state, SOURCE, "children_of")
            .documents
            .values()
            .filter(|doc| doc.parent_id == Some(id))
            .cloned()
            .collect())
    }

    fn access_rules_for(&self, id: ContentId) -> Result<Vec<AccessRule>, RepoError> {
        let state = rw_read(&self.state, SOURCE, "access_rules_for");
        let mut ancestry = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current {
            if ancestry.contains(&node) {
                return Err(RepoError::InvalidInput {
                    message: format!("content {id} has a cyclic ancestry"),
                });
            }
            ancestry.push(node);
            current = state.documents.get(&node).and_then(|doc| doc.parent_id);
        }

        Ok(state
            .access_rules
            .iter()
            .filter(|rule| ancestry.contains(&rule.protected_node_id))
            .cloned()
            .collect())
    }

    fn find_domain(&self, host: &str) -> Result<Option<DomainRoute>, RepoError> {
        Ok(rw_read(&self.state, SOURCE, "find_domain")
            .domains
            .get(&host.to_ascii_lowercase())
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const SEED: &str = r#"
[[documents]]
id = 1
key = "00000000-0000-0000-0000-000000000001"
name = "Home"
url_segment = "home"
published = true

[[documents]]
id = 2
key = "00000000-0000-0000-0000-000000000002"
parent_id = 1
name = "About"
url_segment = "about"
sort_order = 1
published = true

[[access_rules]]
id = "00000000-0000-0000-0000-0000000000aa"
protected_node_id = 1
allowed_groups = ["members"]

[[domains]]
host = "Example.org"
root_id = 1
"#;

    #[test]
    fn seed_parses_and_indexes() {
        let seed = InMemoryContentStore::parse_seed(SEED).expect("seed parses");
        let store = InMemoryContentStore::from_seed(seed).expect("seed is valid");

        assert_eq!(store.len(), 2);
        assert_eq!(store.children_of(1).expect("children").len(), 1);
        assert_eq!(
            store
                .find_by_key(Uuid::from_u128(2))
                .expect("lookup")
                .map(|d| d.name),
            Some("About".to_string())
        );
        assert_eq!(
            store.find_domain("example.ORG").expect("lookup").map(|r| r.root_id),
            Some(1)
        );
    }

    #[test]
    fn access_rules_are_inherited_from_ancestors() {
        let seed = InMemoryContentStore::parse_seed(SEED).expect("seed parses");
        let store = InMemoryContentStore::from_seed(seed).expect("seed is valid");

        assert_eq!(store.access_rules_for(2).expect("rules").len(), 1);
        assert!(store.access_rules_for(99).expect("rules").is_empty());
    }

    #[test]
    fn upsert_rejects_invalid_documents() {
        let store = InMemoryContentStore::new();
        let mut doc = ContentDocument {
            id: 0,
            key: Uuid::new_v4(),
            parent_id: None,
            level: 1,
            sort_order: 0,
            name: "Nameless".to_string(),
            url_segment: String::new(),
            template_id: None,
            published: false,
            version: 0,
        };
        assert!(store.upsert(doc.clone()).is_err());

        doc.id = 4;
        store.upsert(doc).expect("valid document");
        assert!(store.delete(4).is_some());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn demo_seed_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/seed.toml");
        let store = InMemoryContentStore::load_seed_file(&path)
            .await
            .expect("demo seed loads");

        assert_eq!(store.len(), 3);
        assert_eq!(store.access_rules_for(1052).expect("rules").len(), 1);
        assert!(store.access_rules_for(1051).expect("rules").is_empty());
    }

    #[tokio::test]
    async fn load_seed_file_reports_path_on_error() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, "[[documents]]\nid = \"not a number\"").expect("write");

        let err = InMemoryContentStore::load_seed_file(file.path())
            .await
            .err()
            .expect("invalid seed");
        assert!(matches!(err, InfraError::Seed { .. }));
    }
}
