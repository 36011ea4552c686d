//! Filename classifier: reference number, document type, and grantee name.
//!
//! Best-effort heuristics over unreliable filenames. Never fails; fields that
//! cannot be inferred come back as `None` and the orchestrator logs them for
//! manual review.

use once_cell::sync::Lazy;
use regex::Regex;

use super::DocumentType;

/// Identity derived from a filename. Produced fresh on every classification.
#[derive(Debug, Clone, Default)]
pub struct ParsedFilename {
    pub reference_number: Option<String>,
    pub document_type: Option<DocumentType>,
    pub grantee_name: Option<String>,
}

// Seven digits starting 202x-203x, optionally one uppercase suffix letter.
// Digit-run boundaries are checked separately since the regex crate has no
// lookarounds.
static REFERENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"20[2-3]\d{4}[A-Z]?").unwrap());

// Ordered, most specific first. A bare "survey" is the last resort so that
// "Annual Impact Report Survey" classifies as impact_survey via the earlier
// pattern, not the catch-all.
static TYPE_PATTERNS: Lazy<Vec<(Regex, DocumentType)>> = Lazy::new(|| {
    [
        (r"(?i)grant[\s_-]*desc", DocumentType::GrantDescription),
        (r"(?i)mid[\s_-]*point[\s_-]*survey", DocumentType::MidpointSurvey),
        (
            r"(?i)mid[\s_-]*point[\s_-]*check|check[\s_-]*in",
            DocumentType::MidpointCheckinTranscript,
        ),
        (
            r"(?i)close[\s_-]*out|exit[\s_-]*interview|final[\s_-]*call",
            DocumentType::CloseoutTranscript,
        ),
        (
            r"(?i)impact[\s_-]*(report|survey)|annual[\s_-]*survey|end[\s_-]*line",
            DocumentType::ImpactSurvey,
        ),
        (r"(?i)survey", DocumentType::ImpactSurvey),
    ]
    .into_iter()
    .map(|(pattern, doc_type)| (Regex::new(pattern).unwrap(), doc_type))
    .collect()
});

// Keyword phrases stripped when deriving a grantee name from the filename
static NAME_NOISE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)grant[\s_-]*description|grant[\s_-]*desc|impact[\s_-]*report|impact[\s_-]*survey|annual[\s_-]*survey|mid[\s_-]*point|check[\s_-]*in|close[\s_-]*out|exit[\s_-]*interview|final[\s_-]*call|end[\s_-]*line|transcript|survey|report|call",
    )
    .unwrap()
});

static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b20[2-3]\d\b").unwrap());

/// Parse a filename into its best-guess identity. Infallible.
pub fn parse_filename(filename: &str) -> ParsedFilename {
    let reference_number = extract_reference_number(filename);
    let document_type = infer_document_type(filename);
    let grantee_name = extract_grantee_name(filename, reference_number.as_deref());

    ParsedFilename {
        reference_number,
        document_type,
        grantee_name,
    }
}

/// First `20[2-3]\d{4}` run with an optional uppercase suffix, requiring a
/// non-digit (or boundary) immediately before and after the digit run so we
/// never match inside a longer number.
fn extract_reference_number(filename: &str) -> Option<String> {
    let bytes = filename.as_bytes();
    for candidate in REFERENCE.find_iter(filename) {
        let start = candidate.start();
        if start > 0 && bytes[start - 1].is_ascii_digit() {
            continue;
        }
        // The digit run is always 7 bytes; an 8th byte would be the suffix letter
        let digits_end = start + 7;
        if digits_end < bytes.len() && bytes[digits_end].is_ascii_digit() {
            continue;
        }
        return Some(candidate.as_str().to_string());
    }
    None
}

/// Ordered keyword matching, first pattern that hits wins.
fn infer_document_type(filename: &str) -> Option<DocumentType> {
    TYPE_PATTERNS
        .iter()
        .find(|(pattern, _)| pattern.is_match(filename))
        .map(|(_, doc_type)| *doc_type)
}

/// Strip extension, reference number, type keywords, and years; whatever
/// survives separator collapsing is the best-guess grantee name.
fn extract_grantee_name(filename: &str, reference_number: Option<&str>) -> Option<String> {
    let stem = match filename.rfind('.') {
        Some(dot) if dot > 0 => &filename[..dot],
        _ => filename,
    };

    let mut name = stem.to_string();
    if let Some(reference) = reference_number {
        name = name.replace(reference, " ");
    }
    name = NAME_NOISE.replace_all(&name, " ").to_string();

    // Collapse separators before stripping years so word boundaries line up
    let collapsed = name
        .split(|c: char| c == '_' || c == '-' || c == '.' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let cleaned = YEAR
        .replace_all(&collapsed, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if cleaned.trim().len() < 3 {
        None
    } else {
        Some(cleaned.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_number_basic() {
        let parsed = parse_filename("2024010_Acme_Grant_Description.pdf");
        assert_eq!(parsed.reference_number.as_deref(), Some("2024010"));
    }

    #[test]
    fn test_reference_number_with_suffix() {
        let parsed = parse_filename("2024010B_Acme_Org_Grant_Description.pdf");
        assert_eq!(parsed.reference_number.as_deref(), Some("2024010B"));
    }

    #[test]
    fn test_reference_number_rejects_longer_digit_runs() {
        // 8-digit run: the would-be match is followed by another digit
        assert_eq!(extract_reference_number("doc_20240101234.pdf"), None);
        // preceded by a digit
        assert_eq!(extract_reference_number("12024010_notes.pdf"), None);
    }

    #[test]
    fn test_reference_number_absent() {
        let parsed = parse_filename("Acme_Org_notes.pdf");
        assert_eq!(parsed.reference_number, None);
    }

    #[test]
    fn test_reference_number_recovers_after_bad_candidate() {
        // First candidate fails the boundary check, a later one is valid
        let found = extract_reference_number("v20240101234_2025001_notes.pdf");
        assert_eq!(found.as_deref(), Some("2025001"));
    }

    #[test]
    fn test_document_type_precedence() {
        // Contains both "impact report" and the "survey" catch-all;
        // the more specific pattern listed earlier wins
        let parsed = parse_filename("2025001_Org_Annual_Impact_Report.pdf");
        assert_eq!(parsed.document_type, Some(DocumentType::ImpactSurvey));

        let parsed = parse_filename("2025001_Org_Midpoint_Survey.docx");
        assert_eq!(parsed.document_type, Some(DocumentType::MidpointSurvey));
    }

    #[test]
    fn test_document_type_each_variant() {
        let cases = [
            ("2024010_Acme_Grant_Description.pdf", DocumentType::GrantDescription),
            ("2024010_Acme_Impact_Survey.pdf", DocumentType::ImpactSurvey),
            ("2024010_Acme_Midpoint_Survey.pdf", DocumentType::MidpointSurvey),
            ("2024010_Acme_Midpoint_Checkin_Transcript.txt", DocumentType::MidpointCheckinTranscript),
            ("2024010_Acme_Closeout_Call.txt", DocumentType::CloseoutTranscript),
        ];
        for (filename, expected) in cases {
            assert_eq!(
                parse_filename(filename).document_type,
                Some(expected),
                "failed for {}",
                filename
            );
        }
    }

    #[test]
    fn test_document_type_unknown() {
        assert_eq!(parse_filename("2024010_Acme_Budget.xlsx").document_type, None);
    }

    #[test]
    fn test_grantee_name_extraction() {
        let parsed = parse_filename("2024010B_Acme_Org_Grant_Description.pdf");
        assert_eq!(parsed.grantee_name.as_deref(), Some("Acme Org"));
    }

    #[test]
    fn test_grantee_name_strips_years() {
        let parsed = parse_filename("Solar_Sister_2025_Impact_Report.pdf");
        assert_eq!(parsed.grantee_name.as_deref(), Some("Solar Sister"));
    }

    #[test]
    fn test_grantee_name_too_short_is_none() {
        let parsed = parse_filename("2024010_Grant_Description.pdf");
        assert_eq!(parsed.grantee_name, None);
    }

    #[test]
    fn test_never_panics_on_weird_input() {
        for filename in ["", ".", "...", "___", "カタログ_2025001.pdf"] {
            let _ = parse_filename(filename);
        }
    }
}
