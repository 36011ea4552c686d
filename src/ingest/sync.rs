//! Sync-state tracking: skip unchanged files, replace stale chunks.
//!
//! The sole change signal is exact equality of the source-reported
//! last-modified timestamp — there is no content hashing. A source that
//! reuses timestamps or rewrites them without content changes will under- or
//! over-trigger reprocessing; this is a documented limitation. Every query
//! failure resolves toward reprocessing, never toward skipping.

use crate::store::{eq_filter, StoredMatch, VectorStore, QUERY_TOP_K};

use serde_json::json;

/// Highest sync generation recorded across all chunks; 0 on first run or
/// when the store cannot be queried.
pub async fn latest_generation(store: &dyn VectorStore) -> u64 {
    match store.query_by_filter(json!({}), QUERY_TOP_K, true).await {
        Ok(matches) => matches
            .iter()
            .filter_map(|m| m.metadata.as_ref())
            .map(|m| m.sync_generation)
            .max()
            .unwrap_or(0),
        Err(e) => {
            log::warn!("Generation lookup failed, assuming 0: {}", e);
            0
        }
    }
}

/// All chunks recorded for one source file.
pub async fn chunks_for_source_file(
    store: &dyn VectorStore,
    source_file_id: &str,
) -> crate::error::Result<Vec<StoredMatch>> {
    store
        .query_by_filter(eq_filter("source_file_id", source_file_id), QUERY_TOP_K, true)
        .await
}

/// True only if chunks exist for the file AND every recorded last-modified
/// timestamp exactly equals the current one. Mismatch, absence, or query
/// failure all mean "reprocess".
pub async fn should_skip(
    store: &dyn VectorStore,
    source_file_id: &str,
    source_modified_time: &str,
) -> bool {
    let matches = match chunks_for_source_file(store, source_file_id).await {
        Ok(matches) => matches,
        Err(e) => {
            log::warn!("Skip-check query failed for {}, reprocessing: {}", source_file_id, e);
            return false;
        }
    };

    !matches.is_empty()
        && matches.iter().all(|m| {
            m.metadata
                .as_ref()
                .is_some_and(|md| md.source_modified_time == source_modified_time)
        })
}

/// Delete all chunks tied to a source file, in batches. Returns how many
/// chunk ids were deleted.
pub async fn delete_chunks_for_source_file(
    store: &dyn VectorStore,
    source_file_id: &str,
) -> crate::error::Result<usize> {
    let matches = chunks_for_source_file(store, source_file_id).await?;
    if matches.is_empty() {
        return Ok(0);
    }

    let ids: Vec<String> = matches.into_iter().map(|m| m.id).collect();
    let count = ids.len();
    store.delete_by_ids(ids).await?;
    Ok(count)
}
