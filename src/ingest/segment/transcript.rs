//! Call-transcript segmentation.
//!
//! Two modes: the default groups paragraphs into fixed-size blocks under a
//! generic "progress" tag; the LLM-assisted mode asks a text-generation
//! collaborator to find where the substantive discussion starts and ends,
//! split the middle into topic blocks from a fixed label set, and write a
//! short summary. Any LLM failure — missing credential, malformed output,
//! transport error — falls back silently to the default mode for that
//! document. The LLM path must never fail the pipeline.

use serde::Deserialize;

use super::{group_paragraphs, section, Segment, Segmenter};
use crate::llm::TextGenerator;

/// Topic labels the LLM may assign; anything else is coerced to "progress".
pub const TRANSCRIPT_LABELS: [&str; 8] = [
    section::PROGRESS,
    section::CHALLENGES,
    section::PIVOTS,
    section::DATA_MEASUREMENT,
    section::ORG_CHANGES,
    section::FUTURE_PLANS,
    section::SUPPORT_REQUESTS,
    section::NOTABLE_QUOTES,
];

/// Input ceiling for the LLM call; longer transcripts are truncated.
pub const LLM_INPUT_CEILING: usize = 48_000;

pub struct TranscriptSegmenter {
    pub budget: usize,
}

impl Segmenter for TranscriptSegmenter {
    fn segment(&self, text: &str) -> Vec<Segment> {
        segment_deterministic(text, self.budget)
    }
}

/// Default mode: fixed-size paragraph blocks tagged "progress".
pub fn segment_deterministic(text: &str, budget: usize) -> Vec<Segment> {
    group_paragraphs(text, budget)
        .into_iter()
        .map(|block| Segment::new(section::PROGRESS, "Discussion", block))
        .collect()
}

/// Segment a transcript, using the LLM when one is available.
pub async fn segment_transcript(
    text: &str,
    llm: Option<&dyn TextGenerator>,
    budget: usize,
) -> Vec<Segment> {
    let Some(llm) = llm else {
        return segment_deterministic(text, budget);
    };

    let prompt = build_prompt(text);
    match llm.generate(&prompt).await {
        Ok(raw) => match parse_llm_output(&raw) {
            Some(segments) => segments,
            None => {
                log::warn!("LLM segmentation output did not parse, falling back");
                segment_deterministic(text, budget)
            }
        },
        Err(e) => {
            log::warn!("LLM segmentation call failed, falling back: {}", e);
            segment_deterministic(text, budget)
        }
    }
}

fn build_prompt(text: &str) -> String {
    let (body, truncated) = truncate_input(text);
    let note = if truncated {
        "\n\nNote: the transcript was truncated to fit the input limit."
    } else {
        ""
    };
    format!(
        "You are given the transcript of a grant check-in call. Identify where the \
substantive discussion starts and ends, ignoring greetings and scheduling talk. \
Split the middle into topic blocks, each labeled with exactly one of: {labels}. \
Then write a 2-3 sentence summary of the call.\n\n\
Respond with JSON only, no prose, in this shape:\n\
{{\"segments\": [{{\"label\": \"progress\", \"heading\": \"short title\", \"text\": \"...\"}}], \"summary\": \"...\"}}\n\n\
Transcript:\n{body}{note}",
        labels = TRANSCRIPT_LABELS.join(", "),
        body = body,
        note = note,
    )
}

/// Cut at a char boundary under the ceiling; reports whether anything was cut.
fn truncate_input(text: &str) -> (&str, bool) {
    if text.len() <= LLM_INPUT_CEILING {
        return (text, false);
    }
    let mut end = LLM_INPUT_CEILING;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    (&text[..end], true)
}

#[derive(Deserialize)]
struct LlmSegmentation {
    segments: Vec<LlmSegment>,
    summary: Option<String>,
}

#[derive(Deserialize)]
struct LlmSegment {
    label: String,
    heading: Option<String>,
    text: String,
}

/// Parse the model's JSON reply into segments; `None` triggers the fallback.
fn parse_llm_output(raw: &str) -> Option<Vec<Segment>> {
    let cleaned = strip_code_fences(raw);
    let parsed: LlmSegmentation = serde_json::from_str(cleaned).ok()?;
    if parsed.segments.is_empty() {
        return None;
    }

    let mut segments: Vec<Segment> = parsed
        .segments
        .into_iter()
        .map(|s| {
            let label = if TRANSCRIPT_LABELS.contains(&s.label.as_str()) {
                s.label
            } else {
                log::warn!("LLM returned unknown label '{}', coercing to progress", s.label);
                section::PROGRESS.to_string()
            };
            let heading = s.heading.unwrap_or_else(|| humanize_label(&label));
            Segment {
                section_type: label,
                heading,
                text: s.text,
            }
        })
        .collect();

    if let Some(summary) = parsed.summary.filter(|s| !s.trim().is_empty()) {
        segments.push(Segment::new(
            section::TRANSCRIPT_SUMMARY,
            "Call summary",
            summary,
        ));
    }
    Some(segments)
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open.strip_suffix("```").unwrap_or(without_open).trim()
}

fn humanize_label(label: &str) -> String {
    let mut out = label.replace('_', " ");
    if let Some(first) = out.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    out
}
