use crate::model::{is_sentinel, ComparisonOutcome, OutcomeKind};

/// Classify one XML/store value pair.
///
/// Total and deterministic. Rules are checked in order: any sentinel is
/// `ERROR`; both blank is `BOTH_NULL`; blank XML is `XML_NULL`; blank store
/// value is `DB_NULL`; trimmed exact equality is `MATCH`; everything else is
/// `MISMATCH`. No case folding or numeric coercion.
pub fn classify(xml: Option<&str>, db: Option<&str>) -> ComparisonOutcome {
    let xml_t = xml.map(str::trim).filter(|s| !s.is_empty());
    let db_t = db.map(str::trim).filter(|s| !s.is_empty());

    let sentinel = [xml_t, db_t].into_iter().flatten().find(|v| is_sentinel(v));

    let (kind, note) = match (xml_t, db_t) {
        _ if sentinel.is_some() => (OutcomeKind::Error, sentinel.map(str::to_string)),
        (None, None) => (OutcomeKind::BothNull, None),
        (None, Some(_)) => (OutcomeKind::XmlNull, None),
        (Some(_), None) => (OutcomeKind::DbNull, None),
        (Some(x), Some(d)) if x == d => (OutcomeKind::Match, None),
        (Some(_), Some(_)) => (OutcomeKind::Mismatch, None),
    };

    ComparisonOutcome {
        kind,
        xml_value: xml_t.map(str::to_string),
        db_value: db_t.map(str::to_string),
        note,
    }
}

/// `ERROR` outcome for a failure that happened before any comparison.
pub fn classify_error(db_sentinel: &str, note: impl Into<String>) -> ComparisonOutcome {
    ComparisonOutcome {
        kind: OutcomeKind::Error,
        xml_value: None,
        db_value: Some(db_sentinel.to_string()),
        note: Some(note.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CAMPO_NO_EXISTE, ERROR_PARSE, ERROR_QUERY, ERROR_XPATH};
    use proptest::prelude::*;

    #[test]
    fn exact_match_after_trim() {
        let out = classify(Some(" 100.00 "), Some("100.00"));
        assert_eq!(out.kind, OutcomeKind::Match);
        assert_eq!(out.xml_value.as_deref(), Some("100.00"));
    }

    #[test]
    fn no_case_folding() {
        assert_eq!(classify(Some("abc"), Some("ABC")).kind, OutcomeKind::Mismatch);
    }

    #[test]
    fn no_numeric_coercion() {
        assert_eq!(classify(Some("100"), Some("100.00")).kind, OutcomeKind::Mismatch);
    }

    #[test]
    fn blanks() {
        assert_eq!(classify(None, None).kind, OutcomeKind::BothNull);
        assert_eq!(classify(Some("  "), Some("")).kind, OutcomeKind::BothNull);
        assert_eq!(classify(None, Some("x")).kind, OutcomeKind::XmlNull);
        assert_eq!(classify(Some("x"), None).kind, OutcomeKind::DbNull);
    }

    #[test]
    fn sentinel_wins_over_everything() {
        assert_eq!(classify(Some("x"), Some(CAMPO_NO_EXISTE)).kind, OutcomeKind::Error);
        assert_eq!(classify(None, Some(ERROR_QUERY)).kind, OutcomeKind::Error);
        assert_eq!(classify(Some(ERROR_XPATH), None).kind, OutcomeKind::Error);
        let out = classify(Some(ERROR_PARSE), Some(ERROR_PARSE));
        assert_eq!(out.kind, OutcomeKind::Error);
        assert_eq!(out.note.as_deref(), Some(ERROR_PARSE));
    }

    #[test]
    fn error_outcome_carries_note() {
        let out = classify_error(ERROR_PARSE, "unexpected end of file");
        assert_eq!(out.kind, OutcomeKind::Error);
        assert_eq!(out.db_value.as_deref(), Some(ERROR_PARSE));
        assert_eq!(out.note.as_deref(), Some("unexpected end of file"));
    }

    fn value() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            Just(None),
            Just(Some(String::new())),
            Just(Some(ERROR_QUERY.to_string())),
            Just(Some(CAMPO_NO_EXISTE.to_string())),
            "[ a-zA-Z0-9.]{0,12}".prop_map(Some),
        ]
    }

    proptest! {
        #[test]
        fn classify_is_deterministic(x in value(), d in value()) {
            let a = classify(x.as_deref(), d.as_deref());
            let b = classify(x.as_deref(), d.as_deref());
            prop_assert_eq!(a, b);
        }

        #[test]
        fn match_is_symmetric(x in value(), d in value()) {
            let a = classify(x.as_deref(), d.as_deref()).kind;
            let b = classify(d.as_deref(), x.as_deref()).kind;
            prop_assert_eq!(a == OutcomeKind::Match, b == OutcomeKind::Match);
        }

        #[test]
        fn identical_non_blank_values_match(s in "[a-zA-Z0-9][a-zA-Z0-9 ]{0,10}") {
            prop_assert_eq!(classify(Some(&s), Some(&s)).kind, OutcomeKind::Match);
        }
    }
}
