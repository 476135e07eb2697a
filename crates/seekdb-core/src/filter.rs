//! Metadata and document filters.
//!
//! Filters arrive as JSON in the seekdb/Chroma style:
//!
//! ```text
//! {"Brand": "SAMSUNG"}                         shorthand for $eq
//! {"Price": {"$gte": 1000, "$lt": 2000}}       several operators are AND-ed
//! {"$or": [{"Brand": "REDMI"}, {"Ratings": {"$gt": 4.3}}]}
//! ```
//!
//! Document filters match against the record's document text:
//! `{"$contains": "battery"}`, `{"$not_contains": "refurbished"}`, and
//! `$and` / `$or` combinations of those.

use anyhow::{anyhow, bail, Result};
use serde_json::Value;
use std::cmp::Ordering;

use crate::models::Metadata;

/// Comparison applied to a single metadata key.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
}

impl Comparison {
    fn parse(op: &str, value: &Value) -> Result<Self> {
        let list = || -> Result<Vec<Value>> {
            value
                .as_array()
                .cloned()
                .ok_or_else(|| anyhow!("Operator {} requires an array, got {}", op, value))
        };
        Ok(match op {
            "$eq" => Comparison::Eq(scalar(op, value)?),
            "$ne" => Comparison::Ne(scalar(op, value)?),
            "$gt" => Comparison::Gt(scalar(op, value)?),
            "$gte" => Comparison::Gte(scalar(op, value)?),
            "$lt" => Comparison::Lt(scalar(op, value)?),
            "$lte" => Comparison::Lte(scalar(op, value)?),
            "$in" => Comparison::In(list()?),
            "$nin" => Comparison::Nin(list()?),
            other => bail!(
                "Unknown filter operator: '{}'. Supported: $eq, $ne, $gt, $gte, $lt, $lte, $in, $nin",
                other
            ),
        })
    }

    /// Operator name as written in filter JSON.
    pub fn operator(&self) -> &'static str {
        match self {
            Comparison::Eq(_) => "$eq",
            Comparison::Ne(_) => "$ne",
            Comparison::Gt(_) => "$gt",
            Comparison::Gte(_) => "$gte",
            Comparison::Lt(_) => "$lt",
            Comparison::Lte(_) => "$lte",
            Comparison::In(_) => "$in",
            Comparison::Nin(_) => "$nin",
        }
    }

    fn matches(&self, actual: Option<&Value>) -> bool {
        let Some(actual) = actual else {
            return matches!(self, Comparison::Ne(_) | Comparison::Nin(_));
        };
        match self {
            Comparison::Eq(v) => values_equal(actual, v),
            Comparison::Ne(v) => !values_equal(actual, v),
            Comparison::Gt(v) => compare(actual, v) == Some(Ordering::Greater),
            Comparison::Gte(v) => matches!(
                compare(actual, v),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Comparison::Lt(v) => compare(actual, v) == Some(Ordering::Less),
            Comparison::Lte(v) => {
                matches!(compare(actual, v), Some(Ordering::Less | Ordering::Equal))
            }
            Comparison::In(vs) => vs.iter().any(|v| values_equal(actual, v)),
            Comparison::Nin(vs) => !vs.iter().any(|v| values_equal(actual, v)),
        }
    }
}

fn scalar(op: &str, value: &Value) -> Result<Value> {
    match value {
        Value::Array(_) | Value::Object(_) => {
            bail!("Operator {} requires a scalar value, got {}", op, value)
        }
        other => Ok(other.clone()),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// A parsed metadata (`where`) filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Field { key: String, op: Comparison },
}

impl Filter {
    /// Parse a `where` filter from JSON.
    pub fn parse(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| anyhow!("Filter must be a JSON object, got {}", value))?;
        if obj.is_empty() {
            bail!("Filter must not be empty");
        }

        let mut clauses = Vec::new();
        for (key, val) in obj {
            match key.as_str() {
                "$and" | "$or" => {
                    let items = val
                        .as_array()
                        .ok_or_else(|| anyhow!("{} requires an array of filters", key))?;
                    if items.is_empty() {
                        bail!("{} requires at least one filter", key);
                    }
                    let parsed = items.iter().map(Filter::parse).collect::<Result<Vec<_>>>()?;
                    clauses.push(if key == "$and" {
                        Filter::And(parsed)
                    } else {
                        Filter::Or(parsed)
                    });
                }
                k if k.starts_with('$') => bail!("Unknown logical operator: '{}'", k),
                field => clauses.extend(Self::parse_field(field, val)?),
            }
        }

        Ok(if clauses.len() == 1 {
            clauses.remove(0)
        } else {
            Filter::And(clauses)
        })
    }

    /// Parse a `--where` argument.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| anyhow!("Invalid JSON in --where: {}", e))?;
        Self::parse(&value)
    }

    fn parse_field(key: &str, val: &Value) -> Result<Vec<Filter>> {
        match val {
            Value::Object(ops) => {
                if ops.is_empty() {
                    bail!("Filter for '{}' has no operators", key);
                }
                ops.iter()
                    .map(|(op, v)| {
                        Ok(Filter::Field {
                            key: key.to_string(),
                            op: Comparison::parse(op, v)?,
                        })
                    })
                    .collect()
            }
            other => Ok(vec![Filter::Field {
                key: key.to_string(),
                op: Comparison::Eq(scalar("$eq", other)?),
            }]),
        }
    }

    /// Evaluate the filter against a record's metadata.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            Filter::And(fs) => fs.iter().all(|f| f.matches(metadata)),
            Filter::Or(fs) => fs.iter().any(|f| f.matches(metadata)),
            Filter::Field { key, op } => op.matches(metadata.get(key)),
        }
    }
}

/// A parsed document (`where_document`) filter.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentFilter {
    Contains(String),
    NotContains(String),
    And(Vec<DocumentFilter>),
    Or(Vec<DocumentFilter>),
}

impl DocumentFilter {
    pub fn contains(text: impl Into<String>) -> Self {
        DocumentFilter::Contains(text.into())
    }

    pub fn parse(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| anyhow!("Document filter must be a JSON object, got {}", value))?;
        let mut entries = obj.iter();
        let (op, val) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => bail!("Document filter must have exactly one operator"),
        };
        let text = || -> Result<String> {
            val.as_str()
                .map(str::to_string)
                .ok_or_else(|| anyhow!("{} requires a string", op))
        };
        Ok(match op.as_str() {
            "$contains" => DocumentFilter::Contains(text()?),
            "$not_contains" => DocumentFilter::NotContains(text()?),
            "$and" | "$or" => {
                let items = val
                    .as_array()
                    .ok_or_else(|| anyhow!("{} requires an array of filters", op))?;
                if items.is_empty() {
                    bail!("{} requires at least one filter", op);
                }
                let parsed = items
                    .iter()
                    .map(DocumentFilter::parse)
                    .collect::<Result<Vec<_>>>()?;
                if op == "$and" {
                    DocumentFilter::And(parsed)
                } else {
                    DocumentFilter::Or(parsed)
                }
            }
            other => bail!(
                "Unknown document filter operator: '{}'. Supported: $contains, $not_contains, $and, $or",
                other
            ),
        })
    }

    /// Evaluate against a record's document. Records without a document
    /// only satisfy `$not_contains`.
    pub fn matches(&self, document: Option<&str>) -> bool {
        match self {
            DocumentFilter::Contains(needle) => document.map_or(false, |d| contains_terms(d, needle)),
            DocumentFilter::NotContains(needle) => {
                !document.map_or(false, |d| contains_terms(d, needle))
            }
            DocumentFilter::And(fs) => fs.iter().all(|f| f.matches(document)),
            DocumentFilter::Or(fs) => fs.iter().any(|f| f.matches(document)),
        }
    }

    /// Search terms that drive full-text ranking.
    pub fn positive_terms(&self) -> Vec<String> {
        match self {
            DocumentFilter::Contains(needle) => tokenize(needle),
            DocumentFilter::NotContains(_) => Vec::new(),
            DocumentFilter::And(fs) | DocumentFilter::Or(fs) => {
                fs.iter().flat_map(|f| f.positive_terms()).collect()
            }
        }
    }
}

/// Lowercased whitespace-separated terms.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// True when every term of `needle` occurs in `haystack`, ignoring case.
pub fn contains_terms(haystack: &str, needle: &str) -> bool {
    let haystack = haystack.to_lowercase();
    let terms = tokenize(needle);
    !terms.is_empty() && terms.iter().all(|t| haystack.contains(t.as_str()))
}
