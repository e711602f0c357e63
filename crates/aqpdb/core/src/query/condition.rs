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

use aqpdb_common::{AttributeRef, Value, qualify};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use super::{QueryError, QueryResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    IsNull,
    IsNotNull,
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::In => "IN",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
        }
    }
}

// Longer symbols first so `<=` is not read as `<`.
const SYMBOLS: [(&str, Operator); 7] = [
    ("<=", Operator::Le),
    (">=", Operator::Ge),
    ("!=", Operator::NotEq),
    ("<>", Operator::NotEq),
    ("=", Operator::Eq),
    ("<", Operator::Lt),
    (">", Operator::Gt),
];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Literal {
    /// Operand of `IS NULL` / `IS NOT NULL`.
    Absent,
    Single(Value),
    List(Vec<Value>),
}

/// A filter predicate `table.attribute <op> literal`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Condition {
    pub table: String,
    pub attribute: String,
    pub operator: Operator,
    pub literal: Literal,
}

impl Condition {
    pub fn new(table: impl Into<String>, attribute: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            table: table.into(),
            attribute: attribute.into(),
            operator,
            literal: Literal::Single(value.into()),
        }
    }

    pub fn is_in(table: impl Into<String>, attribute: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            table: table.into(),
            attribute: attribute.into(),
            operator: Operator::In,
            literal: Literal::List(values),
        }
    }

    pub fn is_null(table: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            attribute: attribute.into(),
            operator: Operator::IsNull,
            literal: Literal::Absent,
        }
    }

    pub fn is_not_null(table: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            operator: Operator::IsNotNull,
            ..Self::is_null(table, attribute)
        }
    }

    /// Parses `attribute <op> value` scoped to `table`, e.g. `customer_id=5`, `region IN ('EU', 'US')`
    /// or `age IS NOT NULL`. String literals are single-quoted.
    pub fn parse(table: &str, text: &str) -> QueryResult<Self> {
        let invalid = |reason: &str| QueryError::InvalidCondition {
            condition: text.to_string(),
            reason: reason.to_string(),
        };

        let text = text.trim();
        let split = text.find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.')).unwrap_or(text.len());
        let (attribute, rest) = text.split_at(split);
        if attribute.is_empty() {
            return Err(invalid("missing attribute"));
        }
        let rest = rest.trim_start();
        let upper = rest.to_ascii_uppercase();

        if upper == "IS NULL" {
            return Ok(Self::is_null(table, attribute));
        }
        if upper == "IS NOT NULL" {
            return Ok(Self::is_not_null(table, attribute));
        }
        if upper.starts_with("IN") && rest[2..].trim_start().starts_with('(') {
            let list = rest[2..].trim();
            let inner = list.strip_prefix('(').and_then(|l| l.strip_suffix(')')).ok_or_else(|| invalid("unterminated IN list"))?;
            let values = split_list(inner).into_iter().map(Value::parse_literal).collect();
            return Ok(Self::is_in(table, attribute, values));
        }

        let (symbol, operator) = SYMBOLS.iter().find(|(symbol, _)| rest.starts_with(symbol)).ok_or_else(|| invalid("unknown operator"))?;
        let operand = rest[symbol.len()..].trim();
        if operand.is_empty() {
            return Err(invalid("missing value"));
        }
        Ok(Self::new(table, attribute, *operator, Value::parse_literal(operand)))
    }

    pub fn attribute_ref(&self) -> AttributeRef {
        AttributeRef::new(&self.table, &self.attribute)
    }

    pub fn qualified_attribute(&self) -> String {
        qualify(&self.table, &self.attribute)
    }

    /// Whether the condition is scoped to this table attribute.
    pub fn is_on(&self, attribute: &AttributeRef) -> bool {
        self.table == attribute.table && self.attribute == attribute.attribute
    }

    /// Evaluates the predicate against one value with SQL semantics: comparisons with `NULL` fail.
    pub fn evaluate(&self, value: &Value) -> bool {
        match (&self.operator, &self.literal) {
            (Operator::IsNull, _) => value.is_null(),
            (Operator::IsNotNull, _) => !value.is_null(),
            _ if value.is_null() => false,
            (Operator::In, Literal::List(values)) => values.contains(value),
            (operator, Literal::Single(literal)) => match compare(value, literal) {
                Some(ordering) => match operator {
                    Operator::Eq => ordering == Ordering::Equal,
                    Operator::NotEq => ordering != Ordering::Equal,
                    Operator::Lt => ordering == Ordering::Less,
                    Operator::Le => ordering != Ordering::Greater,
                    Operator::Gt => ordering == Ordering::Greater,
                    Operator::Ge => ordering != Ordering::Less,
                    _ => false,
                },
                None => false,
            },
            _ => false,
        }
    }
}

/// Splits an `IN` list on the commas outside single-quoted literals.
fn split_list(inner: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quoted = false;
    let mut start = 0;
    for (idx, c) in inner.char_indices() {
        match c {
            '\'' => quoted = !quoted,
            ',' if !quoted => {
                parts.push(&inner[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&inner[start..]);
    parts
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    if let (Value::Int(l), Value::Int(r)) = (left, right) {
        return Some(l.cmp(r));
    }
    match (left.as_text(), right.as_text()) {
        (Some(l), Some(r)) => Some(l.cmp(r)),
        (None, None) => left.as_f64()?.partial_cmp(&right.as_f64()?),
        _ => None,
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} {}", self.table, self.attribute, self.operator.symbol())?;
        match &self.literal {
            Literal::Absent => Ok(()),
            Literal::Single(value) => write!(f, " {}", value.to_sql()),
            Literal::List(values) => {
                let rendered: Vec<String> = values.iter().map(Value::to_sql).collect();
                write!(f, " ({})", rendered.join(", "))
            }
        }
    }
}
