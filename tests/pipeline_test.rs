//! End-to-end ingestion runs against in-memory collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use grantrag::config::{FolderConfig, IngestConfig};
use grantrag::drive::{DriveClient, SourceDocument};
use grantrag::error::{GrantRagError, Result};
use grantrag::ingest::{ChunkMetadata, IngestOptions, Pipeline};
use grantrag::registry::{RegistryCache, RegistryClient, RegistryRecord};
use grantrag::store::{ChunkRecord, Filter, StoredMatch, VectorStore};

const GRANT_DESCRIPTION_TEXT: &str = "\
Project Summary
Acme Org builds solar-powered irrigation kits for smallholder farmers in rural Kenya, and this grant supports scaling to two new counties.

Budget
The total requested funding is 50,000 USD over twelve months, covering equipment, logistics, and field staff salaries.
";

struct MockDrive {
    // folder id → file listing
    folders: Mutex<HashMap<String, Vec<SourceDocument>>>,
    contents: HashMap<String, Vec<u8>>,
    failing_folders: Vec<String>,
}

impl MockDrive {
    fn new() -> Self {
        Self {
            folders: Mutex::new(HashMap::new()),
            contents: HashMap::new(),
            failing_folders: Vec::new(),
        }
    }

    fn add_text_file(&mut self, folder_id: &str, file_id: &str, name: &str, text: &str) {
        self.folders
            .lock()
            .unwrap()
            .entry(folder_id.to_string())
            .or_default()
            .push(SourceDocument {
                id: file_id.to_string(),
                name: name.to_string(),
                mime_type: "text/plain".to_string(),
                modified_time: "2025-06-01T00:00:00Z".to_string(),
                size: Some(text.len() as i64),
                web_view_link: Some(format!("https://drive.example.com/{}", file_id)),
            });
        self.contents.insert(file_id.to_string(), text.as_bytes().to_vec());
    }

    fn set_modified_time(&self, file_id: &str, modified_time: &str) {
        for files in self.folders.lock().unwrap().values_mut() {
            for file in files.iter_mut() {
                if file.id == file_id {
                    file.modified_time = modified_time.to_string();
                }
            }
        }
    }
}

#[async_trait]
impl DriveClient for MockDrive {
    async fn list_files_recursive(&self, folder_id: &str) -> Result<Vec<SourceDocument>> {
        if self.failing_folders.iter().any(|id| id == folder_id) {
            return Err(GrantRagError::Drive("folder listing failed".to_string()));
        }
        Ok(self
            .folders
            .lock()
            .unwrap()
            .get(folder_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        self.contents
            .get(file_id)
            .cloned()
            .ok_or_else(|| GrantRagError::Drive(format!("no content for {}", file_id)))
    }

    async fn export_plain_text(&self, file_id: &str) -> Result<String> {
        self.download(file_id)
            .await
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[derive(Default)]
struct MemoryStore {
    records: Mutex<Vec<ChunkRecord>>,
    upsert_calls: AtomicUsize,
}

impl MemoryStore {
    fn chunks(&self) -> Vec<ChunkRecord> {
        self.records.lock().unwrap().clone()
    }

    fn metadata(&self) -> Vec<ChunkMetadata> {
        self.chunks().into_iter().map(|c| c.metadata).collect()
    }
}

fn matches_filter(metadata: &ChunkMetadata, filter: &Filter) -> bool {
    let value = serde_json::to_value(metadata).unwrap();
    filter
        .as_object()
        .map(|object| object.iter().all(|(k, v)| value.get(k) == Some(v)))
        .unwrap_or(true)
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn upsert(&self, records: Vec<ChunkRecord>) -> Result<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        self.records.lock().unwrap().extend(records);
        Ok(())
    }

    async fn query_by_filter(
        &self,
        filter: Filter,
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<StoredMatch>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| matches_filter(&r.metadata, &filter))
            .take(top_k)
            .map(|r| StoredMatch {
                id: r.id.clone(),
                metadata: include_metadata.then(|| r.metadata.clone()),
            })
            .collect())
    }

    async fn delete_by_ids(&self, ids: Vec<String>) -> Result<()> {
        self.records.lock().unwrap().retain(|r| !ids.contains(&r.id));
        Ok(())
    }

    async fn delete_by_filter(&self, filter: Filter) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .retain(|r| !matches_filter(&r.metadata, &filter));
        Ok(())
    }
}

struct StaticRegistry {
    records: Vec<RegistryRecord>,
    fail: bool,
}

#[async_trait]
impl RegistryClient for StaticRegistry {
    async fn fetch_all_records(&self) -> Result<Vec<RegistryRecord>> {
        if self.fail {
            return Err(GrantRagError::Registry("spreadsheet unavailable".to_string()));
        }
        Ok(self.records.clone())
    }
}

fn acme_record() -> RegistryRecord {
    RegistryRecord {
        reference_number: "2024010B".to_string(),
        grantee_name: "Acme Org".to_string(),
        country: "Kenya".to_string(),
        program_officer: "J. Doe".to_string(),
        grant_amount: Some(50_000.0),
        active: true,
        ..Default::default()
    }
}

fn folder(id: &str, label: &str) -> FolderConfig {
    FolderConfig {
        id: id.to_string(),
        label: label.to_string(),
        default_document_type: None,
    }
}

fn tuning() -> IngestConfig {
    IngestConfig {
        pacing_ms: 0,
        ..Default::default()
    }
}

fn pipeline(
    drive: Arc<MockDrive>,
    store: Arc<MemoryStore>,
    records: Vec<RegistryRecord>,
    folders: Vec<FolderConfig>,
) -> Pipeline {
    let registry = RegistryCache::new(Arc::new(StaticRegistry { records, fail: false }));
    Pipeline::new(drive, store, registry, None, folders, tuning())
}

#[tokio::test]
async fn test_grant_description_end_to_end() {
    let mut drive = MockDrive::new();
    drive.add_text_file(
        "folder-1",
        "file-1",
        "2024010B_Acme_Org_Grant_Description.txt",
        GRANT_DESCRIPTION_TEXT,
    );
    let store = Arc::new(MemoryStore::default());
    let pipeline = pipeline(
        Arc::new(drive),
        store.clone(),
        vec![acme_record()],
        vec![folder("folder-1", "Grant Descriptions")],
    );

    let report = pipeline.run(&IngestOptions::default()).await.unwrap();

    assert_eq!(report.files_seen, 1);
    assert_eq!(report.files_processed, 1);
    assert_eq!(report.files_skipped, 0);
    assert_eq!(report.chunks_created, 2);
    assert!(report.errors.is_empty());
    assert!(report.unmatched.is_empty());
    assert_eq!(report.sync_generation, 1);

    let metadata = store.metadata();
    assert_eq!(metadata.len(), 2);
    let section_types: Vec<&str> = metadata.iter().map(|m| m.section_type.as_str()).collect();
    assert!(section_types.contains(&"project_summary"));
    assert!(section_types.contains(&"budget"));
    for (i, m) in metadata.iter().enumerate() {
        assert_eq!(m.reference_number, "2024010B");
        assert_eq!(m.grantee_name, "Acme Org");
        assert_eq!(m.country, "Kenya");
        assert_eq!(m.grant_amount, Some(50_000.0));
        assert_eq!(m.document_type, "grant_description");
        assert_eq!(m.source_file_id, "file-1");
        assert_eq!(m.source_modified_time, "2025-06-01T00:00:00Z");
        assert_eq!(m.sync_generation, 1);
        assert_eq!(m.chunk_index, i);
        assert!(!m.ingested_at.is_empty());
    }
}

#[tokio::test]
async fn test_unchanged_file_skipped_on_rerun() {
    let mut drive = MockDrive::new();
    drive.add_text_file(
        "folder-1",
        "file-1",
        "2024010B_Acme_Org_Grant_Description.txt",
        GRANT_DESCRIPTION_TEXT,
    );
    let drive = Arc::new(drive);
    let store = Arc::new(MemoryStore::default());
    let pipeline = pipeline(
        drive,
        store.clone(),
        vec![acme_record()],
        vec![folder("folder-1", "Grant Descriptions")],
    );

    pipeline.run(&IngestOptions::default()).await.unwrap();
    let first_ids: Vec<String> = store.chunks().into_iter().map(|c| c.id).collect();

    let report = pipeline.run(&IngestOptions::default()).await.unwrap();

    assert_eq!(report.files_processed, 0);
    assert_eq!(report.files_skipped, 1);
    assert_eq!(report.chunks_created, 0);

    // Untouched: same ids, no duplicates
    let second_ids: Vec<String> = store.chunks().into_iter().map(|c| c.id).collect();
    assert_eq!(first_ids, second_ids);
}

#[tokio::test]
async fn test_changed_file_replaces_without_accumulation() {
    let mut drive = MockDrive::new();
    drive.add_text_file(
        "folder-1",
        "file-1",
        "2024010B_Acme_Org_Grant_Description.txt",
        GRANT_DESCRIPTION_TEXT,
    );
    let drive = Arc::new(drive);
    let store = Arc::new(MemoryStore::default());
    let pipeline = pipeline(
        drive.clone(),
        store.clone(),
        vec![acme_record()],
        vec![folder("folder-1", "Grant Descriptions")],
    );

    pipeline.run(&IngestOptions::default()).await.unwrap();
    drive.set_modified_time("file-1", "2025-07-15T00:00:00Z");

    let report = pipeline.run(&IngestOptions::default()).await.unwrap();

    assert_eq!(report.files_processed, 1);
    assert_eq!(report.chunks_created, 2);

    let metadata = store.metadata();
    assert_eq!(metadata.len(), 2, "stale chunks must not accumulate");
    assert!(metadata
        .iter()
        .all(|m| m.source_modified_time == "2025-07-15T00:00:00Z"));
    assert!(metadata.iter().all(|m| m.sync_generation == 2));
}

#[tokio::test]
async fn test_force_reingests_unchanged_file() {
    let mut drive = MockDrive::new();
    drive.add_text_file(
        "folder-1",
        "file-1",
        "2024010B_Acme_Org_Grant_Description.txt",
        GRANT_DESCRIPTION_TEXT,
    );
    let store = Arc::new(MemoryStore::default());
    let pipeline = pipeline(
        Arc::new(drive),
        store.clone(),
        vec![acme_record()],
        vec![folder("folder-1", "Grant Descriptions")],
    );

    pipeline.run(&IngestOptions::default()).await.unwrap();
    let opts = IngestOptions {
        force: true,
        ..Default::default()
    };
    let report = pipeline.run(&opts).await.unwrap();

    assert_eq!(report.files_processed, 1);
    assert_eq!(store.chunks().len(), 2);
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let mut drive = MockDrive::new();
    drive.add_text_file(
        "folder-1",
        "file-1",
        "2024010B_Acme_Org_Grant_Description.txt",
        GRANT_DESCRIPTION_TEXT,
    );
    let store = Arc::new(MemoryStore::default());
    let pipeline = pipeline(
        Arc::new(drive),
        store.clone(),
        vec![acme_record()],
        vec![folder("folder-1", "Grant Descriptions")],
    );

    let opts = IngestOptions {
        dry_run: true,
        ..Default::default()
    };
    let report = pipeline.run(&opts).await.unwrap();

    assert_eq!(report.files_processed, 1);
    assert_eq!(report.chunks_created, 2);
    assert!(store.chunks().is_empty());
    assert_eq!(store.upsert_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_list_only_classifies_without_extraction() {
    let mut drive = MockDrive::new();
    drive.add_text_file(
        "folder-1",
        "file-1",
        "2024010B_Acme_Org_Grant_Description.txt",
        GRANT_DESCRIPTION_TEXT,
    );
    let store = Arc::new(MemoryStore::default());
    let pipeline = pipeline(
        Arc::new(drive),
        store.clone(),
        vec![acme_record()],
        vec![folder("folder-1", "Grant Descriptions")],
    );

    let opts = IngestOptions {
        list_only: true,
        ..Default::default()
    };
    let report = pipeline.run(&opts).await.unwrap();

    assert_eq!(report.files_processed, 1);
    assert_eq!(report.chunks_created, 0);
    assert!(store.chunks().is_empty());
}

#[tokio::test]
async fn test_unmatched_file_still_ingested_with_filename_fields() {
    let mut drive = MockDrive::new();
    drive.add_text_file(
        "folder-1",
        "file-1",
        "2024010B_Acme_Org_Grant_Description.txt",
        GRANT_DESCRIPTION_TEXT,
    );
    let store = Arc::new(MemoryStore::default());
    // Registry knows nothing about this grant
    let pipeline = pipeline(
        Arc::new(drive),
        store.clone(),
        Vec::new(),
        vec![folder("folder-1", "Grant Descriptions")],
    );

    let report = pipeline.run(&IngestOptions::default()).await.unwrap();

    assert_eq!(report.files_processed, 1);
    assert_eq!(report.unmatched.len(), 1);
    assert!(report.unmatched[0].contains("Acme_Org"));

    let metadata = store.metadata();
    assert_eq!(metadata.len(), 2);
    assert!(metadata.iter().all(|m| m.reference_number == "2024010B"));
    assert!(metadata.iter().all(|m| m.grantee_name == "Acme Org"));
    assert!(metadata.iter().all(|m| m.country.is_empty()));
}

#[tokio::test]
async fn test_folder_listing_failure_does_not_abort_run() {
    let mut drive = MockDrive::new();
    drive.add_text_file(
        "folder-2",
        "file-2",
        "2024010B_Acme_Org_Grant_Description.txt",
        GRANT_DESCRIPTION_TEXT,
    );
    drive.failing_folders.push("folder-1".to_string());
    let store = Arc::new(MemoryStore::default());
    let pipeline = pipeline(
        Arc::new(drive),
        store.clone(),
        vec![acme_record()],
        vec![
            folder("folder-1", "Broken Folder"),
            folder("folder-2", "Grant Descriptions"),
        ],
    );

    let report = pipeline.run(&IngestOptions::default()).await.unwrap();

    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].file, "Broken Folder");
    assert_eq!(report.files_processed, 1);
    assert_eq!(store.chunks().len(), 2);
}

#[tokio::test]
async fn test_registry_failure_aborts_run() {
    let mut drive = MockDrive::new();
    drive.add_text_file(
        "folder-1",
        "file-1",
        "2024010B_Acme_Org_Grant_Description.txt",
        GRANT_DESCRIPTION_TEXT,
    );
    let store = Arc::new(MemoryStore::default());
    let registry = RegistryCache::new(Arc::new(StaticRegistry {
        records: Vec::new(),
        fail: true,
    }));
    let pipeline = Pipeline::new(
        Arc::new(drive),
        store.clone(),
        registry,
        None,
        vec![folder("folder-1", "Grant Descriptions")],
        tuning(),
    );

    let result = pipeline.run(&IngestOptions::default()).await;

    assert!(result.is_err());
    assert!(store.chunks().is_empty());
}

#[tokio::test]
async fn test_short_extraction_is_skipped() {
    let mut drive = MockDrive::new();
    drive.add_text_file("folder-1", "file-1", "2024010B_Acme_Org_Grant_Description.txt", "too short");
    let store = Arc::new(MemoryStore::default());
    let pipeline = pipeline(
        Arc::new(drive),
        store.clone(),
        vec![acme_record()],
        vec![folder("folder-1", "Grant Descriptions")],
    );

    let report = pipeline.run(&IngestOptions::default()).await.unwrap();

    assert_eq!(report.files_processed, 0);
    assert_eq!(report.files_skipped, 1);
    assert!(report.errors.is_empty());
    assert!(store.chunks().is_empty());
}

#[tokio::test]
async fn test_purge_missing_removes_orphaned_chunks() {
    let mut drive = MockDrive::new();
    drive.add_text_file(
        "folder-1",
        "file-1",
        "2024010B_Acme_Org_Grant_Description.txt",
        GRANT_DESCRIPTION_TEXT,
    );
    let store = Arc::new(MemoryStore::default());

    // A chunk left over from a file that no longer exists on the drive
    store
        .upsert(vec![ChunkRecord {
            id: "orphan-1".to_string(),
            text: "stale chunk".to_string(),
            metadata: ChunkMetadata {
                source_file_id: "deleted-file".to_string(),
                source_modified_time: "2024-01-01T00:00:00Z".to_string(),
                sync_generation: 1,
                ..Default::default()
            },
        }])
        .await
        .unwrap();

    let pipeline = pipeline(
        Arc::new(drive),
        store.clone(),
        vec![acme_record()],
        vec![folder("folder-1", "Grant Descriptions")],
    );

    let opts = IngestOptions {
        purge_missing: true,
        ..Default::default()
    };
    let report = pipeline.run(&opts).await.unwrap();

    assert_eq!(report.chunks_purged, 1);
    let metadata = store.metadata();
    assert_eq!(metadata.len(), 2);
    assert!(metadata.iter().all(|m| m.source_file_id == "file-1"));
}

#[tokio::test]
async fn test_purge_missing_skipped_for_folder_restricted_run() {
    let mut drive = MockDrive::new();
    drive.add_text_file(
        "folder-1",
        "file-1",
        "2024010B_Acme_Org_Grant_Description.txt",
        GRANT_DESCRIPTION_TEXT,
    );
    let store = Arc::new(MemoryStore::default());
    store
        .upsert(vec![ChunkRecord {
            id: "orphan-1".to_string(),
            text: "stale chunk".to_string(),
            metadata: ChunkMetadata {
                source_file_id: "deleted-file".to_string(),
                ..Default::default()
            },
        }])
        .await
        .unwrap();

    let pipeline = pipeline(
        Arc::new(drive),
        store.clone(),
        vec![acme_record()],
        vec![folder("folder-1", "Grant Descriptions")],
    );

    let opts = IngestOptions {
        purge_missing: true,
        folder_id: Some("folder-1".to_string()),
        ..Default::default()
    };
    let report = pipeline.run(&opts).await.unwrap();

    assert_eq!(report.chunks_purged, 0);
    assert!(store.metadata().iter().any(|m| m.source_file_id == "deleted-file"));
}
