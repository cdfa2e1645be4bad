#![forbid(unsafe_code)]

use unicode_normalization::UnicodeNormalization;

/// Canonical form used on both sides of the verification verdict: NFKC,
/// lowercase, whitespace runs collapsed to a single space, trimmed.
/// Applying it twice yields the same string.
pub fn canonical_text(input: &str) -> String {
    input
        .nfkc()
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Conservative verdict policy: the canonical extracted text must contain the
/// canonical subject name as a contiguous substring. No fuzzy matching; OCR
/// noise that breaks contiguity yields a rejection.
pub fn subject_mentioned(extracted_text: &str, subject_name: &str) -> bool {
    let haystack = canonical_text(extracted_text);
    let needle = canonical_text(subject_name);
    if needle.is_empty() {
        return false;
    }
    haystack.contains(&needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_text_is_idempotent() {
        for raw in [
            "  Paracetamol   500mg ",
            "PARACETAMOL\t500MG\ntwice daily",
            "Ｐａｒａｃｅｔａｍｏｌ ５００ｍｇ",
            "",
        ] {
            let once = canonical_text(raw);
            assert_eq!(canonical_text(&once), once);
        }
    }

    #[test]
    fn case_and_whitespace_variation_matches() {
        let text = "...the patient is prescribed  PARACETAMOL 500MG twice daily...";
        assert!(subject_mentioned(text, "Paracetamol 500mg"));
    }

    #[test]
    fn fullwidth_digits_fold_to_ascii() {
        assert!(subject_mentioned(
            "prescribed Ｐａｒａｃｅｔａｍｏｌ ５００ｍｇ daily",
            "Paracetamol 500mg"
        ));
    }

    #[test]
    fn different_medicine_does_not_match() {
        assert!(!subject_mentioned("Paracetamol 500mg, twice daily", "Amoxicillin"));
    }

    #[test]
    fn broken_contiguity_does_not_match() {
        assert!(!subject_mentioned(
            "Paracetamol (generic) 500mg",
            "Paracetamol 500mg"
        ));
    }

    #[test]
    fn empty_subject_never_matches() {
        assert!(!subject_mentioned("anything at all", "   "));
    }
}
