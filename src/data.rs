//! Loosely typed cell values.
//!
//! Raw spreadsheet cells arrive as text. [`infer_value()`] assigns each one a
//! [`Value`] once at load time, and scoring code works over the coarse
//! [`ValueKind`] tags instead of the concrete variant.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Cell content used by grids and tables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Date(NaiveDate),
    Missing,
}

/// Closed set of type tags used by header scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValueKind {
    Text,
    Integer,
    Real,
    Missing,
    Other,
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Text(_) => ValueKind::Text,
            Value::Integer(_) => ValueKind::Integer,
            Value::Real(_) => ValueKind::Real,
            Value::Missing => ValueKind::Missing,
            Value::Boolean(_) | Value::Date(_) => ValueKind::Other,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Value::Text(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Real(_))
    }

    /// Total string form. Used for key comparison and header coercion.
    pub fn as_display(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Real(f) => {
                if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
            Value::Boolean(b) => b.to_string(),
            Value::Date(d) => d.format(ISO_DATE_FORMAT).to_string(),
            Value::Missing => String::new(),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

pub fn parse_naive_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, ISO_DATE_FORMAT).ok()
}

const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

/// Assigns a typed value to one raw cell.
///
/// A cell is typed only when the typed value displays as exactly the raw
/// text, so `as_display` always reproduces the source cell. `"007"`,
/// `"1.0"`, `"TRUE"` and integers past `i64` stay text.
pub fn infer_value(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Missing;
    }
    let typed = if let Ok(parsed) = raw.parse::<i64>() {
        Some(Value::Integer(parsed))
    } else if let Ok(parsed) = raw.parse::<f64>()
        && parsed.is_finite()
    {
        Some(Value::Real(parsed))
    } else if let Ok(parsed) = raw.parse::<bool>() {
        Some(Value::Boolean(parsed))
    } else {
        parse_naive_date(raw).map(Value::Date)
    };
    match typed {
        Some(value) if value.as_display() == raw => value,
        _ => Value::Text(raw.to_string()),
    }
}

pub fn infer_row(raw: &[String]) -> Vec<Value> {
    raw.iter().map(|cell| infer_value(cell)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn infer_value_assigns_kinds() {
        assert_eq!(infer_value(""), Value::Missing);
        assert_eq!(infer_value("   "), Value::Missing);
        assert_eq!(infer_value("42"), Value::Integer(42));
        assert_eq!(infer_value("-3"), Value::Integer(-3));
        assert_eq!(infer_value("4.5"), Value::Real(4.5));
        assert_eq!(infer_value("true"), Value::Boolean(true));
        assert_eq!(
            infer_value("2024-05-06"),
            Value::Date(NaiveDate::from_ymd_opt(2024, 5, 6).unwrap())
        );
        assert_eq!(infer_value("Order ID"), Value::text("Order ID"));
    }

    #[test]
    fn text_keeps_surrounding_whitespace() {
        assert_eq!(infer_value(" name "), Value::text(" name "));
        assert_eq!(infer_value(" 5"), Value::text(" 5"));
    }

    #[test]
    fn leading_zeros_stay_text() {
        assert_eq!(infer_value("007"), Value::text("007"));
        assert_eq!(infer_value("00123").as_display(), "00123");
        assert_eq!(infer_value("+5"), Value::text("+5"));
    }

    #[test]
    fn integers_past_i64_stay_text() {
        let raw = "12345678901234567891";
        assert_eq!(infer_value(raw), Value::text(raw));
        assert_ne!(
            infer_value(raw).as_display(),
            infer_value("12345678901234567890").as_display()
        );
    }

    #[test]
    fn non_canonical_numbers_stay_text() {
        assert_eq!(infer_value("1.0"), Value::text("1.0"));
        assert_eq!(infer_value("1e3"), Value::text("1e3"));
        assert_eq!(infer_value("TRUE"), Value::text("TRUE"));
        assert_eq!(infer_value("06/05/2024"), Value::text("06/05/2024"));
    }

    #[test]
    fn nan_and_infinity_stay_text() {
        assert_eq!(infer_value("NaN").kind(), ValueKind::Text);
        assert_eq!(infer_value("inf").kind(), ValueKind::Text);
    }

    #[test]
    fn boolean_and_date_are_other_kind() {
        assert_eq!(Value::Boolean(false).kind(), ValueKind::Other);
        assert_eq!(infer_value("2024-06-05").kind(), ValueKind::Other);
    }

    #[test]
    fn whole_reals_display_like_integers() {
        assert_eq!(Value::Real(1.0).as_display(), "1");
        assert_eq!(Value::Integer(1).as_display(), "1");
        assert_eq!(Value::Real(2.25).as_display(), "2.25");
        assert_eq!(Value::Missing.as_display(), "");
    }

    proptest! {
        #[test]
        fn inferred_cells_display_as_their_source_text(raw in "[ 0-9a-zA-Z.+eE/:-]{1,24}") {
            prop_assume!(!raw.trim().is_empty());
            prop_assert_eq!(infer_value(&raw).as_display(), raw);
        }
    }
}
