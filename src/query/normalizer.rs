//! Scalar values and their user-facing text.

use std::fmt;

/// A single value read from a one-row, one-column result.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    /// SQL NULL, e.g. `SUM` over zero rows.
    Null,
    /// A value that fits a signed 64-bit integer.
    Integer(i64),
    /// Any other number (numeric, real, double precision) exactly as the
    /// engine printed it.
    Decimal(String),
    /// Anything else (text, boolean, date, ...) exactly as the engine
    /// printed it.
    Text(String),
}

impl ScalarValue {
    /// Classify a text-protocol cell. `None` is SQL NULL.
    pub fn from_text(cell: Option<&str>) -> Self {
        let Some(raw) = cell else {
            return ScalarValue::Null;
        };
        if let Ok(n) = raw.parse::<i64>() {
            return ScalarValue::Integer(n);
        }
        if is_number(raw) {
            return ScalarValue::Decimal(raw.to_string());
        }
        ScalarValue::Text(raw.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => f.write_str("NULL"),
            ScalarValue::Integer(n) => write!(f, "{}", n),
            ScalarValue::Decimal(s) | ScalarValue::Text(s) => f.write_str(s),
        }
    }
}

/// PostgreSQL numeric text: optional sign, digits with an optional point,
/// optional exponent, or one of the special values.
fn is_number(s: &str) -> bool {
    if matches!(s, "NaN" | "Infinity" | "-Infinity") {
        return true;
    }
    let body = s.strip_prefix(['-', '+']).unwrap_or(s);
    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(pos) => (&body[..pos], Some(&body[pos + 1..])),
        None => (body, None),
    };

    let mut digits = 0;
    let mut points = 0;
    for c in mantissa.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => points += 1,
            _ => return false,
        }
    }
    if digits == 0 || points > 1 {
        return false;
    }

    match exponent {
        None => true,
        Some(exp) => {
            let exp = exp.strip_prefix(['-', '+']).unwrap_or(exp);
            !exp.is_empty() && exp.chars().all(|c| c.is_ascii_digit())
        }
    }
}

/// Turn a scalar into the answer shown to the user.
///
/// NULL becomes `"0"`: an aggregate over no matching rows reads as zero.
pub fn normalize(value: &ScalarValue) -> String {
    match value {
        ScalarValue::Null => "0".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_is_zero() {
        assert_eq!(normalize(&ScalarValue::Null), "0");
        assert_eq!(normalize(&ScalarValue::from_text(None)), "0");
    }

    #[test]
    fn test_integers_have_no_grouping() {
        assert_eq!(normalize(&ScalarValue::Integer(1234567)), "1234567");
        assert_eq!(normalize(&ScalarValue::Integer(-5)), "-5");
        assert_eq!(normalize(&ScalarValue::from_text(Some("0"))), "0");
    }

    #[test]
    fn test_classification() {
        assert_eq!(
            ScalarValue::from_text(Some("42")),
            ScalarValue::Integer(42)
        );
        // Larger than i64, still a number: keep the engine's digits.
        assert_eq!(
            ScalarValue::from_text(Some("123456789012345678901234")),
            ScalarValue::Decimal("123456789012345678901234".to_string())
        );
        assert_eq!(
            ScalarValue::from_text(Some("12.50")),
            ScalarValue::Decimal("12.50".to_string())
        );
        assert_eq!(
            ScalarValue::from_text(Some("1.5e-07")),
            ScalarValue::Decimal("1.5e-07".to_string())
        );
        assert_eq!(
            ScalarValue::from_text(Some("NaN")),
            ScalarValue::Decimal("NaN".to_string())
        );
        assert_eq!(
            ScalarValue::from_text(Some("t")),
            ScalarValue::Text("t".to_string())
        );
        assert_eq!(
            ScalarValue::from_text(Some("2025-11-28")),
            ScalarValue::Text("2025-11-28".to_string())
        );
        assert_eq!(
            ScalarValue::from_text(Some("")),
            ScalarValue::Text(String::new())
        );
    }

    #[test]
    fn test_floats_keep_engine_precision() {
        let value = ScalarValue::from_text(Some("3.3333333333333335"));
        assert_eq!(normalize(&value), "3.3333333333333335");
        let value = ScalarValue::from_text(Some("10.0000000000000000"));
        assert_eq!(normalize(&value), "10.0000000000000000");
    }
}
