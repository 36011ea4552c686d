//! Identity resolver: match a parsed filename identity to a registry record.
//!
//! Three rules in order, first hit wins: exact reference-number match,
//! bidirectional substring containment on the normalized grantee name, then
//! word-overlap scoring with a 0.5 threshold. A miss is not an error — the
//! caller records the file for manual review and keeps going.

/// Minimum fraction of query words that must appear in a record's name.
const WORD_OVERLAP_THRESHOLD: f64 = 0.5;

use crate::registry::RegistryRecord;

/// Resolve a registry record from a nullable reference number and grantee name.
pub fn resolve<'a>(
    reference_number: Option<&str>,
    grantee_name: Option<&str>,
    records: &'a [RegistryRecord],
) -> Option<&'a RegistryRecord> {
    // Rule 1: exact reference-number match
    if let Some(reference) = reference_number {
        if let Some(record) = records.iter().find(|r| r.reference_number == reference) {
            return Some(record);
        }
    }

    let name = grantee_name?.trim().to_lowercase();
    if name.len() < 3 {
        return None;
    }

    // Rule 2: bidirectional substring containment
    for record in records {
        let record_name = record.grantee_name.trim().to_lowercase();
        if record_name.len() < 3 {
            continue;
        }
        if record_name.contains(&name) || name.contains(&record_name) {
            return Some(record);
        }
    }

    // Rule 3: word-overlap scoring, ties keep the first encountered
    let query_words: Vec<&str> = name.split_whitespace().filter(|w| w.len() > 2).collect();
    if query_words.is_empty() {
        return None;
    }

    let mut best: Option<(&RegistryRecord, f64)> = None;
    for record in records {
        let record_name = record.grantee_name.to_lowercase();
        let contained = query_words
            .iter()
            .filter(|w| record_name.contains(**w))
            .count();
        let score = contained as f64 / query_words.len() as f64;
        if score >= WORD_OVERLAP_THRESHOLD {
            match best {
                Some((_, best_score)) if best_score >= score => {}
                _ => best = Some((record, score)),
            }
        }
    }

    best.map(|(record, _)| record)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(reference: &str, name: &str) -> RegistryRecord {
        RegistryRecord {
            reference_number: reference.to_string(),
            grantee_name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_exact_reference_match() {
        let records = vec![record("2024010B", "Acme Org"), record("2025001", "Solar Sister")];
        let found = resolve(Some("2025001"), None, &records).unwrap();
        assert_eq!(found.grantee_name, "Solar Sister");
    }

    #[test]
    fn test_reference_miss_falls_through_to_name() {
        let records = vec![record("2024010B", "Acme Org")];
        let found = resolve(Some("2099999"), Some("acme org"), &records).unwrap();
        assert_eq!(found.reference_number, "2024010B");
    }

    #[test]
    fn test_substring_containment_both_directions() {
        let records = vec![record("2025001", "Solar Sister")];
        // query contained in record name
        assert!(resolve(None, Some("solar"), &records).is_some());
        // record name contained in query
        assert!(resolve(None, Some("the solar sister program"), &records).is_some());
    }

    #[test]
    fn test_fuzzy_resolution_succeeds() {
        let records = vec![record("2025001", "Solar Sister"), record("2025002", "Toolkit Africa")];
        let found = resolve(None, Some("solar sisterhood program"), &records);
        assert_eq!(found.unwrap().grantee_name, "Solar Sister");

        let miss = resolve(None, Some("xyz"), &records);
        assert!(miss.is_none());
    }

    #[test]
    fn test_word_overlap_threshold() {
        let records = vec![
            record("2025001", "Solar Sister Uganda Initiative"),
            record("2025002", "Toolkit Africa"),
        ];
        // No substring containment either way; 2 of 3 query words appear
        let found = resolve(None, Some("solar uganda group"), &records).unwrap();
        assert_eq!(found.reference_number, "2025001");

        // 1 of 3 words is below the 0.5 threshold
        let miss = resolve(None, Some("solar frontier group"), &records);
        assert!(miss.is_none());
    }

    #[test]
    fn test_short_name_rejected() {
        let records = vec![record("2025001", "Solar Sister")];
        assert!(resolve(None, Some("so"), &records).is_none());
        assert!(resolve(None, Some("  "), &records).is_none());
    }

    #[test]
    fn test_no_identity_returns_none() {
        let records = vec![record("2025001", "Solar Sister")];
        assert!(resolve(None, None, &records).is_none());
    }

    #[test]
    fn test_tie_keeps_first() {
        let records = vec![record("1", "Water Works Kenya"), record("2", "Water Works Uganda")];
        let found = resolve(None, Some("water works"), &records).unwrap();
        assert_eq!(found.reference_number, "1");
    }
}
