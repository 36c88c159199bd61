//! Field name and value normalization.

use crate::config::Synonym;
use crate::model::is_sentinel;

/// Digits kept after the decimal point for coordinates.
pub const COORDINATE_DECIMALS: usize = 7;

/// Known naming mismatches between mapping sources and store columns.
///
/// `(entity, name as written in mapping sources, store column)`. Entity `*`
/// applies to every entity. Names are compared after space→underscore
/// replacement, ignoring ASCII case.
const SYNONYMS: &[(&str, &str, &str)] = &[
    ("*", "cod_postal", "codigo_postal"),
    ("*", "num_documento", "numero_documento"),
    ("*", "fecha_nac", "fecha_nacimiento"),
    ("*", "lat", "latitud"),
    ("*", "lon", "longitud"),
    ("*", "lng", "longitud"),
];

/// Column names treated as geographic coordinates.
const COORDINATE_COLUMNS: &[&str] = &["latitud", "longitud", "latitude", "longitude", "lat", "lon", "lng"];

#[derive(Debug, Clone, Default)]
pub struct FieldNormalizer {
    /// Config-declared synonyms, checked before the static table.
    synonyms: Vec<Synonym>,
    coordinate_columns: Vec<String>,
}

impl FieldNormalizer {
    pub fn new(synonyms: &[Synonym], coordinate_columns: &[String]) -> Self {
        Self {
            synonyms: synonyms.to_vec(),
            coordinate_columns: coordinate_columns.to_vec(),
        }
    }

    /// Spaces become underscores, then the synonym tables apply. Case is
    /// preserved.
    pub fn normalize_field_name(&self, entity: &str, name: &str) -> String {
        let name = name.trim().replace(' ', "_");

        let configured = self
            .synonyms
            .iter()
            .map(|s| (s.entity.as_str(), s.from.as_str(), s.to.as_str()));
        let builtin = SYNONYMS.iter().copied();

        for (syn_entity, from, to) in configured.chain(builtin) {
            let entity_applies = syn_entity == "*" || syn_entity.eq_ignore_ascii_case(entity.trim());
            if entity_applies && from.replace(' ', "_").eq_ignore_ascii_case(&name) {
                return to.to_string();
            }
        }
        name
    }

    pub fn is_coordinate_column(&self, column: &str) -> bool {
        COORDINATE_COLUMNS
            .iter()
            .copied()
            .chain(self.coordinate_columns.iter().map(String::as_str))
            .any(|c| c.eq_ignore_ascii_case(column.trim()))
    }
}

/// Reformat a numeric coordinate to exactly [`COORDINATE_DECIMALS`] digits
/// after the decimal point, rounding half away from zero.
///
/// Sentinels, blank and non-numeric input are returned unchanged. The
/// function is idempotent.
pub fn normalize_coordinate(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() || is_sentinel(trimmed) {
        return value.to_string();
    }
    if let Some(formatted) = round_decimal_str(trimmed, COORDINATE_DECIMALS) {
        return formatted;
    }
    // Exponent notation and the like: go through f64.
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => format!("{:.*}", COORDINATE_DECIMALS, v),
        _ => value.to_string(),
    }
}

/// Round a plain decimal string (`[+-]digits[.digits]`) without going through
/// binary floating point. Returns `None` for anything else.
fn round_decimal_str(s: &str, decimals: usize) -> Option<String> {
    let (negative, unsigned) = match s.as_bytes().first().copied()? {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, f),
        None => (unsigned, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit()) || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    // All kept digits, least significant last.
    let mut digits: Vec<u8> = int_part
        .bytes()
        .chain(frac_part.bytes().chain(std::iter::repeat(b'0')).take(decimals))
        .map(|b| b - b'0')
        .collect();

    let round_up = frac_part.as_bytes().get(decimals).is_some_and(|&b| b >= b'5');
    if round_up {
        let mut i = digits.len();
        loop {
            if i == 0 {
                digits.insert(0, 1);
                break;
            }
            i -= 1;
            if digits[i] == 9 {
                digits[i] = 0;
            } else {
                digits[i] += 1;
                break;
            }
        }
    }

    let split = digits.len() - decimals;
    let int_digits: String = digits[..split].iter().map(|d| char::from(b'0' + d)).collect();
    let frac_digits: String = digits[split..].iter().map(|d| char::from(b'0' + d)).collect();
    let int_digits = match int_digits.trim_start_matches('0') {
        "" => "0",
        trimmed => trimmed,
    };

    let sign = if negative { "-" } else { "" };
    Some(format!("{sign}{int_digits}.{frac_digits}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn coordinate_boundaries() {
        assert_eq!(normalize_coordinate("36.4084"), "36.4084000");
        assert_eq!(normalize_coordinate("36.40840001"), "36.4084000");
        assert_eq!(normalize_coordinate("-89.01134567"), "-89.0113457");
        assert_eq!(normalize_coordinate("-3"), "-3.0000000");
        assert_eq!(normalize_coordinate(".5"), "0.5000000");
    }

    #[test]
    fn coordinate_rounds_half_away_from_zero() {
        assert_eq!(normalize_coordinate("0.00000005"), "0.0000001");
        assert_eq!(normalize_coordinate("-0.00000005"), "-0.0000001");
        assert_eq!(normalize_coordinate("9.99999995"), "10.0000000");
        assert_eq!(normalize_coordinate("-99.99999999"), "-100.0000000");
    }

    #[test]
    fn coordinate_passthrough() {
        assert_eq!(normalize_coordinate("ERROR_XPATH"), "ERROR_XPATH");
        assert_eq!(normalize_coordinate("CAMPO_NO_EXISTE"), "CAMPO_NO_EXISTE");
        assert_eq!(normalize_coordinate(""), "");
        assert_eq!(normalize_coordinate("N 36°"), "N 36°");
        assert_eq!(normalize_coordinate("nan"), "nan");
        let none: Option<&str> = None;
        assert_eq!(none.map(normalize_coordinate), None);
    }

    #[test]
    fn coordinate_exponent_goes_through_float() {
        assert_eq!(normalize_coordinate("1.5e1"), "15.0000000");
    }

    #[test]
    fn field_name_spaces_and_synonyms() {
        let n = FieldNormalizer::default();
        assert_eq!(n.normalize_field_name("invoice", "Total Amount"), "Total_Amount");
        assert_eq!(n.normalize_field_name("customer", "Cod Postal"), "codigo_postal");
        assert_eq!(n.normalize_field_name("customer", "lat"), "latitud");
    }

    #[test]
    fn configured_synonym_is_entity_specific() {
        let n = FieldNormalizer::new(
            &[Synonym {
                entity: "invoice".into(),
                from: "total".into(),
                to: "amount".into(),
            }],
            &[],
        );
        assert_eq!(n.normalize_field_name("invoice", "total"), "amount");
        assert_eq!(n.normalize_field_name("customer", "total"), "total");
    }

    #[test]
    fn coordinate_columns() {
        let n = FieldNormalizer::new(&[], &["geo_x".to_string()]);
        assert!(n.is_coordinate_column("Latitud"));
        assert!(n.is_coordinate_column("GEO_X"));
        assert!(!n.is_coordinate_column("amount"));
    }

    proptest! {
        #[test]
        fn coordinate_is_idempotent(v in -180.0f64..180.0, digits in 0usize..12) {
            let s = format!("{v:.digits$}");
            let once = normalize_coordinate(&s);
            prop_assert_eq!(normalize_coordinate(&once), once);
        }

        #[test]
        fn coordinate_idempotent_on_arbitrary_text(s in "\\PC{0,16}") {
            let once = normalize_coordinate(&s);
            prop_assert_eq!(normalize_coordinate(&once), once);
        }
    }
}
