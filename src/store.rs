//! Vector store collaborator: upsert / filtered query / delete.
//!
//! The store is a black box to the pipeline — it accepts flat records of
//! `{id, text, ...metadata}` and supports equality filters over metadata
//! fields. The Pinecone HTTP client below targets an index with integrated
//! text embedding; tests substitute an in-memory store.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::{GrantRagError, Result};
use crate::ingest::enrich::ChunkMetadata;

/// Records per upsert call.
pub const UPSERT_BATCH: usize = 96;
/// Ids per delete call.
pub const DELETE_BATCH: usize = 96;
/// Per-record text ceiling enforced before upsert.
pub const MAX_CHUNK_TEXT_LEN: usize = 20_000;
/// Result cap for filtered metadata scans (sync bookkeeping queries).
pub const QUERY_TOP_K: usize = 1000;

/// One retrievable unit: text plus denormalized metadata.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A match returned from a filtered query.
#[derive(Debug, Clone)]
pub struct StoredMatch {
    pub id: String,
    pub metadata: Option<ChunkMetadata>,
}

/// Equality filter over metadata fields, e.g. `{"source_file_id": "abc"}`.
pub type Filter = Value;

/// Build a single-field equality filter.
pub fn eq_filter(key: &str, value: &str) -> Filter {
    json!({ key: value })
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, records: Vec<ChunkRecord>) -> Result<()>;

    async fn query_by_filter(
        &self,
        filter: Filter,
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<StoredMatch>>;

    async fn delete_by_ids(&self, ids: Vec<String>) -> Result<()>;

    async fn delete_by_filter(&self, filter: Filter) -> Result<()>;
}

/// Truncate chunk text to the store's per-record limit at a char boundary.
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    let mut end = max_len;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Pinecone client for an index with integrated text embedding.
pub struct PineconeStore {
    client: Client,
    index_host: String,
    namespace: String,
    api_key: String,
}

impl PineconeStore {
    pub fn new(index_host: String, namespace: String, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(GrantRagError::Http)?;
        Ok(Self {
            client,
            index_host: index_host.trim_end_matches('/').to_string(),
            namespace,
            api_key,
        })
    }

    async fn check(&self, response: reqwest::Response, op: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_string());
            return Err(GrantRagError::Store(format!("{} failed: {} {}", op, status, body)));
        }
        Ok(response)
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    async fn upsert(&self, records: Vec<ChunkRecord>) -> Result<()> {
        for batch in records.chunks(UPSERT_BATCH) {
            // NDJSON: one record object per line, metadata flattened alongside id/text
            let mut body = String::new();
            for record in batch {
                let mut line = serde_json::to_value(&record.metadata)
                    .map_err(|e| GrantRagError::Store(format!("serialize metadata: {}", e)))?;
                let object = line
                    .as_object_mut()
                    .ok_or_else(|| GrantRagError::Store("metadata is not an object".into()))?;
                object.insert("_id".to_string(), json!(record.id));
                object.insert("text".to_string(), json!(record.text));
                body.push_str(&line.to_string());
                body.push('\n');
            }

            let response = self
                .client
                .post(format!(
                    "{}/records/namespaces/{}/upsert",
                    self.index_host, self.namespace
                ))
                .header("Api-Key", &self.api_key)
                .header("Content-Type", "application/x-ndjson")
                .body(body)
                .send()
                .await
                .map_err(GrantRagError::Http)?;
            self.check(response, "upsert").await?;
        }
        Ok(())
    }

    async fn query_by_filter(
        &self,
        filter: Filter,
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<StoredMatch>> {
        // Metadata-only scan: neutral query text, the filter does the work.
        let request = json!({
            "query": {
                "inputs": { "text": " " },
                "top_k": top_k,
                "filter": filter,
            },
        });

        let response = self
            .client
            .post(format!(
                "{}/records/namespaces/{}/search",
                self.index_host, self.namespace
            ))
            .header("Api-Key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(GrantRagError::Http)?;
        let response = self.check(response, "query").await?;

        let body: Value = response.json().await.map_err(GrantRagError::Http)?;
        let hits = body
            .pointer("/result/hits")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut matches = Vec::with_capacity(hits.len());
        for hit in hits {
            let id = hit
                .get("_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let metadata = if include_metadata {
                hit.get("fields")
                    .cloned()
                    .and_then(|fields| serde_json::from_value(fields).ok())
            } else {
                None
            };
            matches.push(StoredMatch { id, metadata });
        }
        Ok(matches)
    }

    async fn delete_by_ids(&self, ids: Vec<String>) -> Result<()> {
        for batch in ids.chunks(DELETE_BATCH) {
            let request = json!({ "ids": batch, "namespace": self.namespace });
            let response = self
                .client
                .post(format!("{}/vectors/delete", self.index_host))
                .header("Api-Key", &self.api_key)
                .json(&request)
                .send()
                .await
                .map_err(GrantRagError::Http)?;
            self.check(response, "delete").await?;
        }
        Ok(())
    }

    async fn delete_by_filter(&self, filter: Filter) -> Result<()> {
        let request = json!({ "filter": filter, "namespace": self.namespace });
        let response = self
            .client
            .post(format!("{}/vectors/delete", self.index_host))
            .header("Api-Key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(GrantRagError::Http)?;
        self.check(response, "delete").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text_short() {
        assert_eq!(truncate_text("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_text_long() {
        let long = "a".repeat(MAX_CHUNK_TEXT_LEN + 100);
        let truncated = truncate_text(&long, MAX_CHUNK_TEXT_LEN);
        assert_eq!(truncated.len(), MAX_CHUNK_TEXT_LEN);
    }

    #[test]
    fn test_truncate_text_char_boundary() {
        // 'é' is two bytes; truncating at byte 2 must back off to a boundary
        let text = "aéé";
        let truncated = truncate_text(text, 2);
        assert_eq!(truncated, "a");
    }

    #[test]
    fn test_eq_filter() {
        let filter = eq_filter("source_file_id", "f-1");
        assert_eq!(filter["source_file_id"], "f-1");
    }
}
