//! [`ContentStore`] over Firestore documents.
//!
//! Uniqueness is carried by document ids: a source record lives at
//! `sha256(url)` and a result record at its `md5`, so a second create for the
//! same key is rejected by Firestore itself. Finds are equality queries,
//! which Firestore serves from its automatic single-field indexes.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use vrddt_models::{fields, RecordId, ResultVideoRecord, SourceVideoRecord};

use super::client::{FirestoreClient, FirestoreConfig};
use super::types::{CollectionSelector, Document, Filter, StructuredQuery, ToFirestoreValue, Value};
use crate::error::{StoreError, StoreResult};
use crate::retry::with_retry;
use crate::selector::Selector;
use crate::store::ContentStore;

/// Page size for delete-by-selector.
const DELETE_BATCH: usize = 500;

pub struct FirestoreStore {
    client: FirestoreClient,
    source_collection: String,
    result_collection: String,
}

impl FirestoreStore {
    pub async fn new(
        config: FirestoreConfig,
        source_collection: &str,
        result_collection: &str,
    ) -> StoreResult<Self> {
        Ok(Self::with_client(
            FirestoreClient::new(config).await?,
            source_collection,
            result_collection,
        ))
    }

    pub fn with_client(client: FirestoreClient, source_collection: &str, result_collection: &str) -> Self {
        Self {
            client,
            source_collection: source_collection.to_string(),
            result_collection: result_collection.to_string(),
        }
    }

    async fn query(&self, collection: &str, selector: &Selector, limit: usize) -> StoreResult<Vec<Document>> {
        let query = build_query(collection, selector, limit);
        with_retry(&self.client.config().retry, "run_query", || {
            self.client.run_query(query.clone())
        })
        .await
    }

    async fn delete_matching(&self, collection: &str, selector: &Selector) -> StoreResult<u64> {
        let mut removed = 0u64;
        loop {
            let docs = self.query(collection, selector, DELETE_BATCH).await?;
            let batch = docs.len();
            for doc in &docs {
                if let Some(doc_id) = doc.doc_id() {
                    self.client.delete_document(collection, doc_id).await?;
                    removed += 1;
                }
            }
            if batch < DELETE_BATCH {
                break;
            }
        }
        debug!(collection = %collection, removed, "Deleted records matching {}", selector);
        Ok(removed)
    }
}

/// Document id for a source record.
pub(crate) fn source_doc_id(url: &str) -> String {
    format!("{:x}", Sha256::digest(url.as_bytes()))
}

fn build_query(collection: &str, selector: &Selector, limit: usize) -> StructuredQuery {
    let filters = selector
        .iter()
        .map(|(field, value)| Filter::equal(field, value.to_firestore_value()))
        .collect();

    StructuredQuery {
        from: vec![CollectionSelector {
            collection_id: collection.to_string(),
        }],
        r#where: Filter::and(filters),
        limit: Some(limit.min(i32::MAX as usize) as i32),
    }
}

// =============================================================================
// Record conversion
// =============================================================================

fn source_to_fields(record: &SourceVideoRecord) -> HashMap<String, Value> {
    let mut map = HashMap::new();
    map.insert(fields::ID.to_string(), record.id.as_str().to_firestore_value());
    map.insert(fields::URL.to_string(), record.url.to_firestore_value());
    map.insert(fields::AUDIO_URL.to_string(), record.audio_url.to_firestore_value());
    map.insert(fields::VIDEO_URL.to_string(), record.video_url.to_firestore_value());
    map.insert(fields::TITLE.to_string(), record.title.to_firestore_value());
    if let Some(result_id) = record.result_ref() {
        map.insert(
            fields::RESULT_VIDEO_ID.to_string(),
            result_id.as_str().to_firestore_value(),
        );
    }
    map.insert(fields::CREATED_AT.to_string(), record.created_at.to_firestore_value());
    map.insert(fields::UPDATED_AT.to_string(), record.updated_at.to_firestore_value());
    map
}

fn result_to_fields(record: &ResultVideoRecord) -> HashMap<String, Value> {
    let mut map = HashMap::new();
    map.insert(fields::ID.to_string(), record.id.as_str().to_firestore_value());
    map.insert(fields::CONTENT_HASH.to_string(), record.content_hash.to_firestore_value());
    map.insert(fields::URL.to_string(), record.url.to_firestore_value());
    map.insert(fields::CREATED_AT.to_string(), record.created_at.to_firestore_value());
    map.insert(fields::UPDATED_AT.to_string(), record.updated_at.to_firestore_value());
    map
}

fn required_id(doc: &Document) -> StoreResult<RecordId> {
    doc.get::<String>(fields::ID)
        .filter(|id| !id.is_empty())
        .map(RecordId::from)
        .ok_or_else(|| {
            StoreError::InvalidRecord(format!(
                "document {} has no id",
                doc.name.as_deref().unwrap_or("?")
            ))
        })
}

fn timestamp(doc: &Document, field: &str) -> DateTime<Utc> {
    doc.get::<DateTime<Utc>>(field).unwrap_or_else(Utc::now)
}

fn string(doc: &Document, field: &str) -> String {
    doc.get::<String>(field).unwrap_or_default()
}

fn source_from_document(doc: &Document) -> StoreResult<SourceVideoRecord> {
    Ok(SourceVideoRecord {
        id: required_id(doc)?,
        url: string(doc, fields::URL),
        audio_url: string(doc, fields::AUDIO_URL),
        video_url: string(doc, fields::VIDEO_URL),
        title: string(doc, fields::TITLE),
        result_video_id: doc
            .get::<String>(fields::RESULT_VIDEO_ID)
            .filter(|id| !id.is_empty())
            .map(RecordId::from),
        created_at: timestamp(doc, fields::CREATED_AT),
        updated_at: timestamp(doc, fields::UPDATED_AT),
    })
}

fn result_from_document(doc: &Document) -> StoreResult<ResultVideoRecord> {
    Ok(ResultVideoRecord {
        id: required_id(doc)?,
        content_hash: string(doc, fields::CONTENT_HASH),
        url: string(doc, fields::URL),
        created_at: timestamp(doc, fields::CREATED_AT),
        updated_at: timestamp(doc, fields::UPDATED_AT),
    })
}

#[async_trait]
impl ContentStore for FirestoreStore {
    async fn init(&self) -> StoreResult<()> {
        for collection in [&self.source_collection, &self.result_collection] {
            self.query(collection, &Selector::new(), 1).await?;
        }
        info!(
            sources = %self.source_collection,
            results = %self.result_collection,
            "Firestore content store ready"
        );
        Ok(())
    }

    async fn cleanup(&self) -> StoreResult<()> {
        debug!("Firestore content store released");
        Ok(())
    }

    async fn create_source_video(&self, record: &SourceVideoRecord) -> StoreResult<()> {
        record
            .validate()
            .map_err(|e| StoreError::InvalidRecord(e.to_string()))?;
        self.client
            .create_document(
                &self.source_collection,
                &source_doc_id(&record.url),
                source_to_fields(record),
            )
            .await
            .map_err(|e| match e {
                StoreError::AlreadyExists(_) => {
                    StoreError::already_exists(format!("source url {}", record.url))
                }
                other => other,
            })?;
        Ok(())
    }

    async fn find_source_video(&self, selector: &Selector) -> StoreResult<SourceVideoRecord> {
        let docs = self.query(&self.source_collection, selector, 1).await?;
        match docs.first() {
            Some(doc) => source_from_document(doc),
            None => Err(StoreError::not_found(format!("source video {}", selector))),
        }
    }

    async fn find_source_videos(
        &self,
        selector: &Selector,
        limit: usize,
    ) -> StoreResult<Vec<SourceVideoRecord>> {
        self.query(&self.source_collection, selector, limit)
            .await?
            .iter()
            .map(source_from_document)
            .collect()
    }

    async fn delete_source_videos(&self, selector: &Selector) -> StoreResult<u64> {
        self.delete_matching(&self.source_collection, selector).await
    }

    async fn create_result_video(&self, record: &ResultVideoRecord) -> StoreResult<()> {
        record
            .validate()
            .map_err(|e| StoreError::InvalidRecord(e.to_string()))?;
        self.client
            .create_document(
                &self.result_collection,
                &record.content_hash,
                result_to_fields(record),
            )
            .await
            .map_err(|e| match e {
                StoreError::AlreadyExists(_) => {
                    StoreError::already_exists(format!("result md5 {}", record.content_hash))
                }
                other => other,
            })?;
        Ok(())
    }

    async fn find_result_video(&self, selector: &Selector) -> StoreResult<ResultVideoRecord> {
        let docs = self.query(&self.result_collection, selector, 1).await?;
        match docs.first() {
            Some(doc) => result_from_document(doc),
            None => Err(StoreError::not_found(format!("result video {}", selector))),
        }
    }

    async fn find_result_videos(
        &self,
        selector: &Selector,
        limit: usize,
    ) -> StoreResult<Vec<ResultVideoRecord>> {
        self.query(&self.result_collection, selector, limit)
            .await?
            .iter()
            .map(result_from_document)
            .collect()
    }

    async fn delete_result_videos(&self, selector: &Selector) -> StoreResult<u64> {
        self.delete_matching(&self.result_collection, selector).await
    }
}
