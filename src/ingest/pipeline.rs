//! Ingestion orchestrator: enumerate → classify → resolve → skip-or-process
//! → extract → segment → enrich → replace → upsert.
//!
//! Files and folders are processed strictly sequentially with a small pacing
//! delay between file operations in live mode — a deliberate backpressure
//! choice for external API rate limits. A single file's or folder's failure
//! never aborts the run; it is recorded and the run moves on. Only a
//! registry-load failure is fatal at the run level.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use super::segment::{segment_document, SegmentOptions};
use super::sync;
use super::{enrich, extract, next_chunk_id, parse_filename, DocumentType, ExtractedDocument, SyncFields};
use crate::config::{FolderConfig, IngestConfig};
use crate::drive::{DriveClient, SourceDocument};
use crate::error::Result;
use crate::llm::TextGenerator;
use crate::registry::{RegistryCache, RegistryRecord};
use crate::resolve::resolve;
use crate::store::{truncate_text, ChunkRecord, VectorStore, MAX_CHUNK_TEXT_LEN, QUERY_TOP_K};

/// Run configuration, driven by CLI flags.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Run every step except the final delete/upsert calls.
    pub dry_run: bool,
    /// Allow LLM-assisted transcript segmentation when a generator is wired.
    pub use_llm: bool,
    /// Restrict the run to one configured folder id.
    pub folder_id: Option<String>,
    /// Bypass the skip check unconditionally.
    pub force: bool,
    /// Classify and resolve only; no extraction, no writes.
    pub list_only: bool,
    /// After the run, delete chunks whose source file no longer exists.
    pub purge_missing: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            use_llm: true,
            folder_id: None,
            force: false,
            list_only: false,
            purge_missing: false,
        }
    }
}

/// One recovered per-file or per-folder failure.
#[derive(Debug, Clone)]
pub struct FileError {
    pub file: String,
    pub error: String,
}

/// Aggregate outcome of one run. The single source of truth: callers must
/// inspect the error and unmatched lists, since a run that returns Ok may
/// still contain partial failures.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub files_seen: usize,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub chunks_created: usize,
    pub chunks_purged: usize,
    pub sync_generation: u64,
    pub errors: Vec<FileError>,
    /// Files for which no registry record resolved; needs manual review.
    pub unmatched: Vec<String>,
}

enum FileOutcome {
    Processed(usize),
    Skipped,
}

pub struct Pipeline {
    drive: Arc<dyn DriveClient>,
    store: Arc<dyn VectorStore>,
    registry: RegistryCache,
    llm: Option<Arc<dyn TextGenerator>>,
    folders: Vec<FolderConfig>,
    tuning: IngestConfig,
}

impl Pipeline {
    pub fn new(
        drive: Arc<dyn DriveClient>,
        store: Arc<dyn VectorStore>,
        registry: RegistryCache,
        llm: Option<Arc<dyn TextGenerator>>,
        folders: Vec<FolderConfig>,
        tuning: IngestConfig,
    ) -> Self {
        Self {
            drive,
            store,
            registry,
            llm,
            folders,
            tuning,
        }
    }

    /// Drive one ingestion run end to end.
    pub async fn run(&self, opts: &IngestOptions) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        // Registry unavailability is the one fatal error; surface what we
        // have before propagating.
        let records = match self.registry.records().await {
            Ok(records) => records,
            Err(e) => {
                log::error!("Registry load failed, aborting run: {}", e);
                log_summary(&report);
                return Err(e);
            }
        };

        report.sync_generation = sync::latest_generation(self.store.as_ref()).await + 1;
        log::info!(
            "Starting ingestion run (generation {}, dry_run={}, force={}, list_only={})",
            report.sync_generation,
            opts.dry_run,
            opts.force,
            opts.list_only
        );

        let folders: Vec<&FolderConfig> = self
            .folders
            .iter()
            .filter(|f| opts.folder_id.as_ref().map(|id| *id == f.id).unwrap_or(true))
            .collect();
        if folders.is_empty() {
            log::warn!("No configured folders match the requested folder id");
        }

        let mut seen_file_ids: HashSet<String> = HashSet::new();

        for folder in folders {
            let files = match self.drive.list_files_recursive(&folder.id).await {
                Ok(files) => files,
                Err(e) => {
                    log::error!("Listing failed for folder '{}': {}", folder.label, e);
                    report.errors.push(FileError {
                        file: folder.label.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            log::info!("Folder '{}': {} files", folder.label, files.len());
            for file in files {
                report.files_seen += 1;
                seen_file_ids.insert(file.id.clone());

                match self
                    .process_file(&file, folder, &records, report.sync_generation, opts, &mut report)
                    .await
                {
                    Ok(FileOutcome::Processed(chunks)) => {
                        report.files_processed += 1;
                        report.chunks_created += chunks;
                    }
                    Ok(FileOutcome::Skipped) => report.files_skipped += 1,
                    Err(e) => {
                        log::error!("Failed to ingest {}: {}", file.name, e);
                        report.errors.push(FileError {
                            file: file.name.clone(),
                            error: e.to_string(),
                        });
                    }
                }

                // Pacing between file operations in live mode
                if !opts.dry_run && !opts.list_only && self.tuning.pacing_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(self.tuning.pacing_ms)).await;
                }
            }
        }

        if opts.purge_missing {
            match self.purge_missing(&seen_file_ids, opts).await {
                Ok(purged) => report.chunks_purged = purged,
                Err(e) => {
                    log::error!("Purge of missing files failed: {}", e);
                    report.errors.push(FileError {
                        file: "<purge>".to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        log_summary(&report);
        Ok(report)
    }

    async fn process_file(
        &self,
        file: &SourceDocument,
        folder: &FolderConfig,
        records: &[RegistryRecord],
        generation: u64,
        opts: &IngestOptions,
        report: &mut IngestReport,
    ) -> Result<FileOutcome> {
        if !extract::is_supported(&file.mime_type) {
            log::debug!("Skipping unsupported media type {} ({})", file.name, file.mime_type);
            return Ok(FileOutcome::Skipped);
        }

        let parsed = parse_filename(&file.name);
        let document_type = parsed.document_type.or_else(|| {
            folder
                .default_document_type
                .as_deref()
                .and_then(DocumentType::parse)
        });
        if parsed.document_type.is_none() {
            log::debug!(
                "No document type inferred from '{}', folder default: {:?}",
                file.name,
                folder.default_document_type
            );
        }

        let record = resolve(
            parsed.reference_number.as_deref(),
            parsed.grantee_name.as_deref(),
            records,
        );
        if record.is_none() {
            log::warn!("No registry record matched '{}'", file.name);
            report.unmatched.push(file.name.clone());
        }

        if opts.list_only {
            log::info!(
                "{} → type={:?} ref={:?} grantee={:?} matched={}",
                file.name,
                document_type.map(|t| t.as_str()),
                parsed.reference_number,
                parsed.grantee_name,
                record.is_some()
            );
            return Ok(FileOutcome::Processed(0));
        }

        if !opts.force && sync::should_skip(self.store.as_ref(), &file.id, &file.modified_time).await
        {
            log::debug!("Unchanged, skipping {}", file.name);
            return Ok(FileOutcome::Skipped);
        }

        let text = extract::extract_text(self.drive.as_ref(), file).await?;
        if text.trim().len() < extract::MIN_TEXT_LEN {
            log::warn!(
                "Extracted only {} chars from {}, skipping",
                text.trim().len(),
                file.name
            );
            return Ok(FileOutcome::Skipped);
        }

        let doc = ExtractedDocument {
            source: file.clone(),
            text,
            parsed,
            document_type,
        };

        let llm = if opts.use_llm { self.llm.as_deref() } else { None };
        let segment_opts = SegmentOptions {
            chunk_chars: self.tuning.chunk_chars,
            transcript_chunk_chars: self.tuning.transcript_chunk_chars,
        };
        let segments = segment_document(doc.document_type, &doc.text, llm, &segment_opts).await;
        if segments.is_empty() {
            log::warn!("Segmentation produced no chunks for {}", file.name);
            return Ok(FileOutcome::Skipped);
        }

        let sync_fields = SyncFields {
            source_file_id: file.id.clone(),
            source_modified_time: file.modified_time.clone(),
            ingested_at: chrono::Utc::now().to_rfc3339(),
            sync_generation: generation,
        };

        let chunks: Vec<ChunkRecord> = segments
            .iter()
            .enumerate()
            .map(|(index, segment)| ChunkRecord {
                id: next_chunk_id(),
                text: truncate_text(&segment.text, MAX_CHUNK_TEXT_LEN),
                metadata: enrich(&doc, record, index, segment, &sync_fields),
            })
            .collect();
        let chunk_count = chunks.len();

        if opts.dry_run {
            log::info!("[dry-run] {} → {} chunks (no writes)", file.name, chunk_count);
            return Ok(FileOutcome::Processed(chunk_count));
        }

        // Replace-then-upsert: stale chunks must be gone before new ones land
        let deleted = sync::delete_chunks_for_source_file(self.store.as_ref(), &file.id).await?;
        if deleted > 0 {
            log::info!("Replaced {} stale chunks for {}", deleted, file.name);
        }
        self.store.upsert(chunks).await?;
        log::info!("{} → {} chunks", file.name, chunk_count);

        Ok(FileOutcome::Processed(chunk_count))
    }

    /// Delete chunks whose source file no longer appears in any listed
    /// folder. Only meaningful for full runs — a folder-restricted run has
    /// not seen the other folders' files.
    async fn purge_missing(&self, seen_file_ids: &HashSet<String>, opts: &IngestOptions) -> Result<usize> {
        if opts.folder_id.is_some() {
            log::warn!("Skipping purge: run was restricted to one folder");
            return Ok(0);
        }

        let all = self
            .store
            .query_by_filter(json!({}), QUERY_TOP_K, true)
            .await?;
        let stale_ids: Vec<String> = all
            .into_iter()
            .filter(|m| {
                m.metadata
                    .as_ref()
                    .map(|md| !seen_file_ids.contains(&md.source_file_id))
                    .unwrap_or(false)
            })
            .map(|m| m.id)
            .collect();

        if stale_ids.is_empty() {
            return Ok(0);
        }
        let count = stale_ids.len();
        if opts.dry_run || opts.list_only {
            log::info!("[dry-run] Would purge {} chunks for missing files", count);
            return Ok(0);
        }

        self.store.delete_by_ids(stale_ids).await?;
        log::info!("Purged {} chunks for files no longer in the source", count);
        Ok(count)
    }
}

fn log_summary(report: &IngestReport) {
    log::info!("=== Ingestion run complete ===");
    log::info!("Files seen: {}", report.files_seen);
    log::info!(
        "Processed: {}, skipped: {}, chunks created: {}",
        report.files_processed,
        report.files_skipped,
        report.chunks_created
    );
    if report.chunks_purged > 0 {
        log::info!("Chunks purged: {}", report.chunks_purged);
    }
    if !report.unmatched.is_empty() {
        log::warn!(
            "{} file(s) without a registry match (manual review): {:?}",
            report.unmatched.len(),
            report.unmatched
        );
    }
    if !report.errors.is_empty() {
        log::warn!("{} error(s) recorded during the run", report.errors.len());
        for error in &report.errors {
            log::warn!("  {}: {}", error.file, error.error);
        }
    }
}
