//! Grant description segmentation: heading detection and section naming.
//!
//! A heading-like line is short, all-caps, numbered, or markdown-style. Each
//! named section is classified against keyword patterns; if fewer than two
//! sections are detected the document falls back to fixed-size grouping.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{section, FixedSizeSegmenter, Segment, Segmenter};

static NUMBERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,2}[.):]\s+\S").unwrap());

// Ordered: first matching pattern names the section
static HEADING_TAGS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)summary|overview|about|background", section::PROJECT_SUMMARY),
        (
            r"(?i)scope|work|activit|objective|deliverable",
            section::SCOPE_OF_WORK,
        ),
        (r"(?i)partner", section::PARTNERSHIPS),
        (r"(?i)technolog|technical|product|innovation", section::TECHNOLOGY),
        (r"(?i)timeline|schedule|milestone|workplan|phase", section::TIMELINE),
        (r"(?i)outcome|impact|result|goal", section::OUTCOMES),
        (r"(?i)measure|monitor|evaluat|metric|data", section::MEASUREMENT),
        (r"(?i)budget|cost|funding|financ", section::BUDGET),
    ]
    .into_iter()
    .map(|(pattern, tag)| (Regex::new(pattern).unwrap(), tag))
    .collect()
});

pub struct GrantDescriptionSegmenter {
    pub budget: usize,
}

impl Segmenter for GrantDescriptionSegmenter {
    fn segment(&self, text: &str) -> Vec<Segment> {
        segment(text, self.budget)
    }
}

pub fn segment(text: &str, budget: usize) -> Vec<Segment> {
    let mut sections: Vec<(String, String)> = Vec::new();
    let mut preamble = String::new();

    for line in text.lines() {
        if let Some(heading) = heading_text(line) {
            sections.push((heading, String::new()));
        } else if let Some((_, body)) = sections.last_mut() {
            body.push_str(line);
            body.push('\n');
        } else {
            preamble.push_str(line);
            preamble.push('\n');
        }
    }

    if sections.len() < 2 {
        log::debug!("Fewer than 2 sections detected, using fixed-size fallback");
        return FixedSizeSegmenter { budget }.segment(text);
    }

    let mut segments = Vec::new();
    if preamble.trim().len() >= super::MIN_SEGMENT_LEN {
        segments.push(Segment::new(
            section::PROJECT_SUMMARY,
            "Introduction",
            preamble.trim(),
        ));
    }
    for (heading, body) in sections {
        segments.push(Segment::new(
            classify_heading(&heading),
            heading.clone(),
            body.trim(),
        ));
    }
    segments
}

/// If the line looks like a heading, return its cleaned text.
fn heading_text(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.len() > 80 {
        return None;
    }

    // Markdown heading
    if let Some(stripped) = trimmed.strip_prefix('#') {
        let title = stripped.trim_start_matches('#').trim();
        if !title.is_empty() {
            return Some(title.to_string());
        }
        return None;
    }

    // Numbered heading: "3. Timeline" / "2) Budget"
    if NUMBERED.is_match(trimmed) {
        let title = trimmed
            .splitn(2, |c: char| c == '.' || c == ')' || c == ':')
            .nth(1)
            .unwrap_or("")
            .trim();
        if !title.is_empty() {
            return Some(title.to_string());
        }
        return None;
    }

    let has_letters = trimmed.chars().any(|c| c.is_alphabetic());
    if !has_letters {
        return None;
    }

    // All-caps heading
    if trimmed
        .chars()
        .filter(|c| c.is_alphabetic())
        .all(|c| c.is_uppercase())
    {
        return Some(trimmed.trim_end_matches(':').trim().to_string());
    }

    // Short title-case line without sentence punctuation
    let words: Vec<&str> = trimmed.trim_end_matches(':').split_whitespace().collect();
    let capitalized = words
        .iter()
        .filter(|w| w.chars().next().is_some_and(|c| c.is_uppercase()))
        .count();
    if trimmed.len() <= 48
        && !words.is_empty()
        && words.len() <= 6
        && !trimmed.ends_with(['.', ',', ';', '!', '?'])
        && capitalized * 2 > words.len()
    {
        return Some(trimmed.trim_end_matches(':').trim().to_string());
    }

    None
}

fn classify_heading(heading: &str) -> &'static str {
    HEADING_TAGS
        .iter()
        .find(|(pattern, _)| pattern.is_match(heading))
        .map(|(_, tag)| *tag)
        .unwrap_or(section::PROJECT_SUMMARY)
}
