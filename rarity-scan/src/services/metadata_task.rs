//! Per-item metadata fetch
//!
//! Resolves an item's document URI, fetches it through the gateway and turns
//! it into an [`ItemRecord`]. A document without an `attributes` list is a
//! permissive skip: the fetch succeeds with no record.

use std::sync::Arc;

use serde_json::Value;

use super::collection_source::CollectionSource;
use super::content_fetcher::{ContentFetcher, IpfsGateway};
use crate::error::FetchError;
use crate::models::{value_key, AttributeInstance, AttributeMap, ItemRecord, TRAIT_COUNT_KEY};

/// Fetches one item's descriptive record
pub struct MetadataTask {
    source: Arc<dyn CollectionSource>,
    fetcher: Arc<dyn ContentFetcher>,
    gateway: IpfsGateway,
}

impl MetadataTask {
    pub fn new(
        source: Arc<dyn CollectionSource>,
        fetcher: Arc<dyn ContentFetcher>,
        gateway: IpfsGateway,
    ) -> Self {
        Self {
            source,
            fetcher,
            gateway,
        }
    }

    /// `Ok(None)` when the document carries no attribute list
    pub async fn fetch_one(&self, id: u64) -> Result<Option<ItemRecord>, FetchError> {
        let uri = self.source.token_uri(id).await?;
        let url = self.gateway.resolve(&uri);
        let document = self.fetcher.fetch_json(&url).await?;

        let record = build_record(id, &document);
        if record.is_none() {
            tracing::debug!(id, uri = %url, "Metadata has no attribute list");
        }
        Ok(record)
    }
}

/// Build an item record from a metadata document.
///
/// Entries without `trait_type` are ignored and a repeated `trait_type` keeps
/// its last value. The synthetic [`TRAIT_COUNT_KEY`] attribute is appended with
/// the number of distinct real attributes.
pub fn build_record(id: u64, document: &Value) -> Option<ItemRecord> {
    let entries = document.get("attributes")?.as_array()?;

    let mut attributes = AttributeMap::new();
    for entry in entries {
        let trait_type = match entry.get("trait_type") {
            Some(Value::Null) | None => {
                tracing::debug!(id, entry = %entry, "Attribute without trait_type ignored");
                continue;
            }
            Some(name) => value_key(name),
        };
        if trait_type == TRAIT_COUNT_KEY {
            tracing::debug!(id, "Source attribute collides with the trait count key, ignored");
            continue;
        }

        let value = entry.get("value").cloned().unwrap_or(Value::Null);
        attributes.insert(trait_type, AttributeInstance::new(value));
    }

    let real_count = attributes.len();
    attributes.insert(TRAIT_COUNT_KEY.to_string(), AttributeInstance::new(real_count));

    Some(ItemRecord {
        id,
        name: text_field(document, "name"),
        image: text_field(document, "image"),
        attributes,
    })
}

fn text_field(document: &Value, field: &str) -> String {
    match document.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct IpfsSource;

    #[async_trait]
    impl CollectionSource for IpfsSource {
        async fn total_supply(&self) -> Result<u64, FetchError> {
            Ok(1)
        }

        async fn token_uri(&self, id: u64) -> Result<String, FetchError> {
            Ok(format!("ipfs://QmHash/{}.json", id))
        }
    }

    #[derive(Default)]
    struct RecordingFetcher {
        uris: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ContentFetcher for RecordingFetcher {
        async fn fetch_json(&self, uri: &str) -> Result<Value, FetchError> {
            self.uris.lock().unwrap().push(uri.to_string());
            Ok(json!({ "name": "one", "attributes": [{ "trait_type": "Hat", "value": "Cap" }] }))
        }
    }

    #[tokio::test]
    async fn test_fetch_one_requests_gateway_url() {
        let fetcher = Arc::new(RecordingFetcher::default());
        let gateway = IpfsGateway::new("https://gw.test/ipfs/").unwrap();
        let task = MetadataTask::new(Arc::new(IpfsSource), fetcher.clone(), gateway);

        let record = task.fetch_one(1).await.unwrap().unwrap();

        assert_eq!(record.id, 1);
        assert_eq!(record.attributes["Hat"].value, json!("Cap"));
        assert_eq!(
            *fetcher.uris.lock().unwrap(),
            vec!["https://gw.test/ipfs/QmHash/1.json".to_string()]
        );
    }

    #[test]
    fn test_build_record_adds_trait_count() {
        let document = json!({
            "name": "Ape #3",
            "image": "ipfs://QmImg/3.png",
            "attributes": [
                { "trait_type": "Background", "value": "Blue" },
                { "trait_type": "Level", "value": 4 }
            ]
        });

        let record = build_record(3, &document).unwrap();
        assert_eq!(record.id, 3);
        assert_eq!(record.name, "Ape #3");
        assert_eq!(record.image, "ipfs://QmImg/3.png");

        let keys: Vec<&str> = record.attributes.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Background", "Level", TRAIT_COUNT_KEY]);
        assert_eq!(record.attributes["Level"].value, json!(4));
        assert_eq!(record.attributes[TRAIT_COUNT_KEY].value, json!(2));
        assert_eq!(record.real_attribute_count(), 2);
    }

    #[test]
    fn test_non_list_attributes_is_skip() {
        assert!(build_record(1, &json!({ "name": "x" })).is_none());
        assert!(build_record(1, &json!({ "attributes": { "a": 1 } })).is_none());
        assert!(build_record(1, &json!({ "attributes": null })).is_none());
    }

    #[test]
    fn test_empty_attribute_list_still_counts() {
        let record = build_record(9, &json!({ "name": "Plain", "attributes": [] })).unwrap();
        assert_eq!(record.attributes.len(), 1);
        assert_eq!(record.attributes[TRAIT_COUNT_KEY].value, json!(0));
        assert_eq!(record.image, "");
    }

    #[test]
    fn test_duplicate_and_untyped_entries() {
        let document = json!({
            "attributes": [
                { "trait_type": "Hat", "value": "Cap" },
                { "value": "orphan" },
                { "trait_type": "Hat", "value": "Crown" }
            ]
        });

        let record = build_record(2, &document).unwrap();
        assert_eq!(record.real_attribute_count(), 1);
        assert_eq!(record.attributes["Hat"].value, json!("Crown"));
        assert_eq!(record.attributes[TRAIT_COUNT_KEY].value, json!(1));
    }
}
