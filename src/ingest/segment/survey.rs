//! Survey segmentation: split at question markers and tag each Q&A block.
//!
//! Impact surveys classify blocks by question-text keywords; midpoint surveys
//! assign tags positionally (first answer describes the venture's stage, the
//! second its progress, and so on).

use once_cell::sync::Lazy;
use regex::Regex;

use super::{section, FixedSizeSegmenter, Segment, Segmenter};

// Lines starting a new Q&A block: "Q3.", "Question 2", "4)", or a markdown heading
static QUESTION_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:q\d*[\s.:)]|question\s+\d+|\d{1,2}[.)]\s|#{1,6}\s)").unwrap()
});

// Ordered keyword patterns over the question text
static QUESTION_TAGS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (
            r"(?i)how many|reach|scale|breadth|customers|users|households",
            section::BREADTH_SCALE,
        ),
        (r"(?i)income|outcome|impact|depth|change", section::DEPTH_OUTCOMES),
        (r"(?i)learn|insight|lesson", section::LEARNINGS),
        (r"(?i)challenge|obstacle|barrier|difficult", section::CHALLENGES),
        (r"(?i)next year|future|plan|going forward", section::FUTURE_PLANS),
        (r"(?i)feedback|suggest|advice|improve", section::FEEDBACK),
        (
            r"(?i)revenue|budget|financial|funding|spend|cost",
            section::FINANCIAL,
        ),
    ]
    .into_iter()
    .map(|(pattern, tag)| (Regex::new(pattern).unwrap(), tag))
    .collect()
});

// Positional tags for midpoint surveys
const MIDPOINT_TAGS: [&str; 4] = [
    section::STAGE,
    section::PROGRESS,
    section::EARLY_SIGNALS,
    section::CHALLENGES,
];

const MAX_MIDPOINT_QUESTIONS: usize = 6;

pub struct ImpactSurveySegmenter {
    pub budget: usize,
}

impl Segmenter for ImpactSurveySegmenter {
    fn segment(&self, text: &str) -> Vec<Segment> {
        segment_impact(text, self.budget)
    }
}

pub struct MidpointSurveySegmenter;

impl Segmenter for MidpointSurveySegmenter {
    fn segment(&self, text: &str) -> Vec<Segment> {
        segment_midpoint(text)
    }
}

/// Split at question markers: each pair is (question line, full block text).
/// Text before the first marker (form headers, metadata) is dropped.
pub fn split_questions(text: &str) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for line in text.lines() {
        if QUESTION_MARKER.is_match(line) {
            pairs.push((line.trim().to_string(), format!("{}\n", line.trim())));
        } else if let Some((_, block)) = pairs.last_mut() {
            block.push_str(line);
            block.push('\n');
        }
    }
    for (_, block) in pairs.iter_mut() {
        *block = block.trim().to_string();
    }
    pairs
}

pub fn segment_impact(text: &str, budget: usize) -> Vec<Segment> {
    let pairs = split_questions(text);
    if pairs.len() <= 1 {
        log::debug!("Found {} Q&A pairs, using fixed-size fallback", pairs.len());
        return FixedSizeSegmenter { budget }.segment(text);
    }

    pairs
        .into_iter()
        .map(|(question, block)| {
            Segment::new(classify_question(&question), truncate_heading(&question), block)
        })
        .collect()
}

pub fn segment_midpoint(text: &str) -> Vec<Segment> {
    let pairs = split_questions(text);
    if pairs.len() <= 1 || pairs.len() > MAX_MIDPOINT_QUESTIONS {
        log::debug!(
            "Midpoint survey with {} Q&A pairs stored as a single chunk",
            pairs.len()
        );
        return vec![Segment::new(
            section::FULL_DOCUMENT,
            "Full document",
            text.trim(),
        )];
    }

    pairs
        .into_iter()
        .enumerate()
        .map(|(index, (question, block))| {
            let tag = MIDPOINT_TAGS[index.min(MIDPOINT_TAGS.len() - 1)];
            Segment::new(tag, truncate_heading(&question), block)
        })
        .collect()
}

fn classify_question(question: &str) -> &'static str {
    QUESTION_TAGS
        .iter()
        .find(|(pattern, _)| pattern.is_match(question))
        .map(|(_, tag)| *tag)
        .unwrap_or(section::LEARNINGS)
}

fn truncate_heading(question: &str) -> String {
    let trimmed = question.trim();
    if trimmed.len() <= 100 {
        return trimmed.to_string();
    }
    let mut end = 100;
    while end > 0 && !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}
