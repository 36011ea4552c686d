pub mod classify;
pub mod enrich;
pub mod extract;
pub mod pipeline;
pub mod segment;
pub mod sync;

pub use classify::{parse_filename, ParsedFilename};
pub use enrich::{enrich, next_chunk_id, ChunkMetadata, SyncFields};
pub use extract::extract_text;
pub use pipeline::{FileError, IngestOptions, IngestReport, Pipeline};
pub use segment::{segment_document, Segment};

use crate::drive::SourceDocument;

/// The five document types the pipeline knows how to segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentType {
    GrantDescription,
    ImpactSurvey,
    MidpointSurvey,
    MidpointCheckinTranscript,
    CloseoutTranscript,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::GrantDescription => "grant_description",
            DocumentType::ImpactSurvey => "impact_survey",
            DocumentType::MidpointSurvey => "midpoint_survey",
            DocumentType::MidpointCheckinTranscript => "midpoint_checkin_transcript",
            DocumentType::CloseoutTranscript => "closeout_transcript",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "grant_description" => Some(DocumentType::GrantDescription),
            "impact_survey" => Some(DocumentType::ImpactSurvey),
            "midpoint_survey" => Some(DocumentType::MidpointSurvey),
            "midpoint_checkin_transcript" => Some(DocumentType::MidpointCheckinTranscript),
            "closeout_transcript" => Some(DocumentType::CloseoutTranscript),
            _ => None,
        }
    }
}

/// Transient value carrying one file through the pipeline: source metadata,
/// extracted text, and the identity established for it. Never persisted.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub source: SourceDocument,
    pub text: String,
    pub parsed: ParsedFilename,
    /// Inferred type, with the folder's default applied when inference failed.
    pub document_type: Option<DocumentType>,
}
