//! Segmentation engine: one strategy per document type, each with a fallback
//! to generic fixed-size paragraph grouping.
//!
//! Chunk sizing is a soft character budget — a paragraph is never split.
//! Paragraphs accumulate until adding the next would exceed the budget; a
//! single over-budget paragraph forms its own chunk verbatim.

pub mod grant_description;
pub mod survey;
pub mod transcript;

use super::DocumentType;
use crate::llm::TextGenerator;

/// Section tags below this length are dropped as splitting noise.
pub const MIN_SEGMENT_LEN: usize = 20;
/// Soft budget for section-style chunks.
pub const DEFAULT_CHUNK_BUDGET: usize = 2000;
/// Soft budget for transcript/survey paragraph grouping.
pub const TRANSCRIPT_CHUNK_BUDGET: usize = 1500;

/// Closed vocabulary of section tags, per document type.
pub mod section {
    pub const FULL_DOCUMENT: &str = "full_document";

    // grant_description
    pub const PROJECT_SUMMARY: &str = "project_summary";
    pub const SCOPE_OF_WORK: &str = "scope_of_work";
    pub const PARTNERSHIPS: &str = "partnerships";
    pub const TECHNOLOGY: &str = "technology";
    pub const TIMELINE: &str = "timeline";
    pub const OUTCOMES: &str = "outcomes";
    pub const MEASUREMENT: &str = "measurement";
    pub const BUDGET: &str = "budget";

    // impact_survey
    pub const BREADTH_SCALE: &str = "breadth_scale";
    pub const DEPTH_OUTCOMES: &str = "depth_outcomes";
    pub const LEARNINGS: &str = "learnings";
    pub const CHALLENGES: &str = "challenges";
    pub const FUTURE_PLANS: &str = "future_plans";
    pub const FEEDBACK: &str = "feedback";
    pub const FINANCIAL: &str = "financial";

    // midpoint_survey
    pub const STAGE: &str = "stage";
    pub const PROGRESS: &str = "progress";
    pub const EARLY_SIGNALS: &str = "early_signals";

    // transcripts
    pub const PIVOTS: &str = "pivots";
    pub const DATA_MEASUREMENT: &str = "data_measurement";
    pub const ORG_CHANGES: &str = "org_changes";
    pub const SUPPORT_REQUESTS: &str = "support_requests";
    pub const NOTABLE_QUOTES: &str = "notable_quotes";
    pub const TRANSCRIPT_SUMMARY: &str = "transcript_summary";
}

/// One semantically tagged slice of a document, pre-enrichment.
#[derive(Debug, Clone)]
pub struct Segment {
    pub section_type: String,
    pub heading: String,
    pub text: String,
}

impl Segment {
    pub fn new(section_type: &str, heading: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            section_type: section_type.to_string(),
            heading: heading.into(),
            text: text.into(),
        }
    }
}

/// A deterministic segmentation strategy.
pub trait Segmenter: Send + Sync {
    fn segment(&self, text: &str) -> Vec<Segment>;
}

/// Generic fixed-size paragraph grouping; the universal fallback.
pub struct FixedSizeSegmenter {
    pub budget: usize,
}

impl Segmenter for FixedSizeSegmenter {
    fn segment(&self, text: &str) -> Vec<Segment> {
        group_paragraphs(text, self.budget)
            .into_iter()
            .map(|block| Segment::new(section::FULL_DOCUMENT, "Full document", block))
            .collect()
    }
}

/// Split text into paragraphs on blank lines and group them into blocks of at
/// most `budget` characters, never splitting a paragraph. Text with no
/// paragraph boundaries comes back as a single block.
pub fn group_paragraphs(text: &str, budget: usize) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n");
    let paragraphs: Vec<&str> = normalized
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let mut blocks = Vec::new();
    let mut current = String::new();
    for paragraph in paragraphs {
        if current.is_empty() {
            current = paragraph.to_string();
        } else if current.len() + 2 + paragraph.len() > budget {
            blocks.push(current);
            current = paragraph.to_string();
        } else {
            current.push_str("\n\n");
            current.push_str(paragraph);
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

/// Tuning knobs passed down from configuration.
#[derive(Debug, Clone)]
pub struct SegmentOptions {
    pub chunk_chars: usize,
    pub transcript_chunk_chars: usize,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            chunk_chars: DEFAULT_CHUNK_BUDGET,
            transcript_chunk_chars: TRANSCRIPT_CHUNK_BUDGET,
        }
    }
}

/// Dispatch to the type-specific strategy and apply the noise floor.
///
/// `llm` is only consulted for transcript types; everything else is fully
/// deterministic. Non-empty input always yields at least one segment.
pub async fn segment_document(
    doc_type: Option<DocumentType>,
    text: &str,
    llm: Option<&dyn TextGenerator>,
    opts: &SegmentOptions,
) -> Vec<Segment> {
    let raw = match doc_type {
        Some(DocumentType::GrantDescription) => {
            grant_description::segment(text, opts.chunk_chars)
        }
        Some(DocumentType::ImpactSurvey) => {
            survey::segment_impact(text, opts.transcript_chunk_chars)
        }
        Some(DocumentType::MidpointSurvey) => survey::segment_midpoint(text),
        Some(DocumentType::MidpointCheckinTranscript)
        | Some(DocumentType::CloseoutTranscript) => {
            transcript::segment_transcript(text, llm, opts.transcript_chunk_chars).await
        }
        None => FixedSizeSegmenter { budget: opts.chunk_chars }.segment(text),
    };

    let mut segments: Vec<Segment> = raw
        .into_iter()
        .filter(|s| s.text.trim().len() >= MIN_SEGMENT_LEN)
        .collect();

    // The noise floor must never leave non-trivial input with zero chunks
    if segments.is_empty() && text.trim().len() >= MIN_SEGMENT_LEN {
        segments.push(Segment::new(
            section::FULL_DOCUMENT,
            "Full document",
            text.trim(),
        ));
    }
    segments
}
