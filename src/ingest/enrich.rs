//! Metadata enrichment: the pure merge that turns a segment into the flat
//! record stored with every chunk.
//!
//! Registry fields, document fields, chunk fields, and sync-tracking fields
//! all land in one denormalized record so the retrieval side can filter on
//! any of them without joins. No I/O, no failure modes beyond defaulting.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use super::segment::Segment;
use super::ExtractedDocument;
use crate::registry::RegistryRecord;

static CHUNK_COUNTER: AtomicU64 = AtomicU64::new(0);

static DOC_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b20[2-3]\d\b").unwrap());

/// Globally unique, stable chunk id: millisecond timestamp plus a
/// process-wide counter. Supports delete-by-id on re-ingestion.
pub fn next_chunk_id() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let counter = CHUNK_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("chunk-{}-{}", millis, counter)
}

/// Sync-tracking fields shared by every chunk of one file in one run.
#[derive(Debug, Clone)]
pub struct SyncFields {
    pub source_file_id: String,
    pub source_modified_time: String,
    pub ingested_at: String,
    pub sync_generation: u64,
}

/// The flat metadata record attached to every chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkMetadata {
    // Registry-derived
    pub reference_number: String,
    pub grantee_name: String,
    pub country: String,
    pub program_officer: String,
    pub cohort: String,
    pub portfolio_type: String,
    pub intervention_areas: String,
    pub grant_amount: Option<f64>,
    pub lives_impacted: Option<f64>,
    pub income_gain: Option<f64>,
    pub active: bool,

    // Document-level
    pub document_type: String,
    pub document_date: String,
    pub file_name: String,
    pub web_view_link: String,

    // Chunk-level
    pub chunk_index: usize,
    pub section_type: String,
    pub section_heading: String,

    // Sync-tracking
    pub source_file_id: String,
    pub source_modified_time: String,
    pub ingested_at: String,
    pub sync_generation: u64,
}

/// Merge per-document identity, the resolved registry record (or defaults if
/// none resolved), and per-segment output into the final metadata record.
pub fn enrich(
    doc: &ExtractedDocument,
    record: Option<&RegistryRecord>,
    chunk_index: usize,
    segment: &Segment,
    sync: &SyncFields,
) -> ChunkMetadata {
    // Registry fields win over filename-derived guesses when a record resolved
    let reference_number = record
        .map(|r| r.reference_number.clone())
        .or_else(|| doc.parsed.reference_number.clone())
        .unwrap_or_default();
    let grantee_name = record
        .map(|r| r.grantee_name.clone())
        .or_else(|| doc.parsed.grantee_name.clone())
        .unwrap_or_default();

    ChunkMetadata {
        reference_number,
        grantee_name,
        country: record.map(|r| r.country.clone()).unwrap_or_default(),
        program_officer: record.map(|r| r.program_officer.clone()).unwrap_or_default(),
        cohort: record.map(|r| r.cohort.clone()).unwrap_or_default(),
        portfolio_type: record.map(|r| r.portfolio_type.clone()).unwrap_or_default(),
        intervention_areas: record
            .map(|r| r.intervention_areas.clone())
            .unwrap_or_default(),
        grant_amount: record.and_then(|r| r.grant_amount),
        lives_impacted: record.and_then(|r| r.lives_impacted),
        income_gain: record.and_then(|r| r.income_gain),
        active: record.map(|r| r.active).unwrap_or(false),

        document_type: doc
            .document_type
            .map(|t| t.as_str().to_string())
            .unwrap_or_default(),
        document_date: document_date(&doc.source.name),
        file_name: doc.source.name.clone(),
        web_view_link: doc.source.web_view_link.clone().unwrap_or_default(),

        chunk_index,
        section_type: segment.section_type.clone(),
        section_heading: segment.heading.clone(),

        source_file_id: sync.source_file_id.clone(),
        source_modified_time: sync.source_modified_time.clone(),
        ingested_at: sync.ingested_at.clone(),
        sync_generation: sync.sync_generation,
    }
}

/// Best-guess document date: the first standalone 2020s/2030s year in the
/// filename, empty when none is present.
fn document_date(file_name: &str) -> String {
    let spaced = file_name.replace(['_', '-', '.'], " ");
    DOC_YEAR
        .find(&spaced)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}
