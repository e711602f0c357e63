// AqpDB
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Raw cell values and fully qualified attribute references.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A single raw cell as it arrives from a source table.
///
/// Integers and floats compare by exact numeric value, so `Int(5)` equals
/// `Float(5.0)` and both hash identically. Join keys and dependency maps rely on this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Value::Text(_))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Parses a literal the way it appears in a condition or a CSV cell.
    ///
    /// `NULL` (any case) and the empty string become `Null`, single-quoted strings
    /// lose their quotes, anything that parses as a number becomes numeric.
    pub fn parse_literal(raw: &str) -> Value {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
            return Value::Null;
        }
        if trimmed.len() >= 2 && trimmed.starts_with('\'') && trimmed.ends_with('\'') {
            return Value::Text(trimmed[1..trimmed.len() - 1].replace("''", "'"));
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return Value::Float(f);
        }
        Value::Text(trimmed.to_string())
    }

    /// Renders the value as an SQL literal.
    pub fn to_sql(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }

    /// The integer a float stands for exactly, if any.
    fn exact_int(f: f64) -> Option<i64> {
        // 2^63 is exact as an f64; i64::MAX is not.
        const BOUND: f64 = 9_223_372_036_854_775_808.0;
        (f.fract() == 0.0 && (-BOUND..BOUND).contains(&f)).then_some(f as i64)
    }

    fn canonical_bits(f: f64) -> u64 {
        if f == 0.0 {
            0.0_f64.to_bits()
        } else if f.is_nan() {
            f64::NAN.to_bits()
        } else {
            f.to_bits()
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(i), Value::Float(f)) | (Value::Float(f), Value::Int(i)) => Value::exact_int(*f) == Some(*i),
            (Value::Float(a), Value::Float(b)) => Value::canonical_bits(*a) == Value::canonical_bits(*b),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => 0u8.hash(state),
            Value::Text(s) => {
                1u8.hash(state);
                s.hash(state);
            }
            Value::Int(i) => {
                2u8.hash(state);
                i.hash(state);
            }
            Value::Float(f) => match Value::exact_int(*f) {
                Some(i) => {
                    2u8.hash(state);
                    i.hash(state);
                }
                None => {
                    3u8.hash(state);
                    Value::canonical_bits(*f).hash(state);
                }
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Builds the `table.attribute` name used for every column after scoping.
pub fn qualify(table: &str, attribute: &str) -> String {
    format!("{table}.{attribute}")
}

/// Splits a qualified name at the first dot. Multiplier attributes contain dots
/// themselves (`customers.mul_orders.customer_id`), so only the first one separates the table.
pub fn split_qualified(name: &str) -> Option<(&str, &str)> {
    name.split_once('.')
}

/// A `(table, attribute)` pair, used for multiplier lists and group-by fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributeRef {
    pub table: String,
    pub attribute: String,
}

impl AttributeRef {
    pub fn new(table: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            attribute: attribute.into(),
        }
    }

    pub fn qualified(&self) -> String {
        qualify(&self.table, &self.attribute)
    }
}

impl fmt::Display for AttributeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.attribute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_numeric_values_compare_by_magnitude() {
        assert_eq!(Value::Int(5), Value::Float(5.0));
        assert_ne!(Value::Int(5), Value::Text("5".to_string()));

        let mut set = HashSet::new();
        set.insert(Value::Int(5));
        assert!(set.contains(&Value::Float(5.0)));
        assert!(!set.contains(&Value::Null));
    }

    #[test]
    fn test_large_integers_compare_exactly() {
        let big = 1_i64 << 53;
        let float = Value::Float(big as f64);
        assert_eq!(Value::Int(big), float);
        assert_ne!(Value::Int(big + 1), float);
        assert_ne!(Value::Int(big), Value::Int(big + 1));
        assert_ne!(Value::Int(i64::MAX), Value::Float(i64::MAX as f64));
        assert_ne!(Value::Int(5), Value::Float(5.5));
        assert_eq!(Value::Int(0), Value::Float(-0.0));

        let mut set = HashSet::new();
        set.insert(Value::Int(big + 1));
        assert!(!set.contains(&float));
        assert!(set.contains(&Value::Int(big + 1)));
        set.insert(Value::Float(-0.0));
        assert!(set.contains(&Value::Int(0)));
    }

    #[test]
    fn test_parse_literal() {
        assert_eq!(Value::parse_literal(" 42 "), Value::Int(42));
        assert_eq!(Value::parse_literal("4.5"), Value::Float(4.5));
        assert_eq!(Value::parse_literal("'EUROPE'"), Value::Text("EUROPE".to_string()));
        assert_eq!(Value::parse_literal("ASIA"), Value::Text("ASIA".to_string()));
        assert!(Value::parse_literal("null").is_null());
        assert!(Value::parse_literal("").is_null());
    }

    #[test]
    fn test_sql_rendering_escapes_quotes() {
        assert_eq!(Value::Text("O'Brien".to_string()).to_sql(), "'O''Brien'");
        assert_eq!(Value::Int(-3).to_sql(), "-3");
        assert_eq!(Value::Null.to_sql(), "NULL");
    }

    #[test]
    fn test_split_qualified_keeps_dotted_attribute() {
        assert_eq!(split_qualified("customers.mul_orders.customer_id"), Some(("customers", "mul_orders.customer_id")));
        assert_eq!(split_qualified("plain"), None);
        assert_eq!(AttributeRef::new("orders", "id").qualified(), "orders.id");
    }
}
