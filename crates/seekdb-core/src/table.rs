//! Flatten query results into rows for export.
//!
//! Each hit of the first query becomes one row: `id`, then `distance`
//! when the result carries distances, then `document` when the hit has
//! non-empty document text, then one column per metadata key. Columns
//! are the union over all rows in first-seen order; cells a row does
//! not have are `null`.

use serde_json::{Map, Value};

use crate::models::{GetResult, QueryResult};

/// Rectangular view of a result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Flatten the first query of a nested result.
    pub fn from_query_result(result: &QueryResult) -> Self {
        let Some(ids) = result.ids.first() else {
            return Table::default();
        };
        let distances = result.distances.as_ref().and_then(|d| d.first());
        let documents = result.documents.as_ref().and_then(|d| d.first());
        let metadatas = result.metadatas.as_ref().and_then(|m| m.first());

        let rows = ids.iter().enumerate().map(|(i, id)| {
            let mut row = Map::new();
            row.insert("id".into(), Value::String(id.clone()));
            if let Some(d) = distances.and_then(|d| d.get(i)) {
                row.insert("distance".into(), Value::from(*d));
            }
            if let Some(Some(doc)) = documents.and_then(|d| d.get(i)) {
                if !doc.is_empty() {
                    row.insert("document".into(), Value::String(doc.clone()));
                }
            }
            if let Some(Some(meta)) = metadatas.and_then(|m| m.get(i)) {
                for (k, v) in meta {
                    row.insert(k.clone(), v.clone());
                }
            }
            row
        });
        Self::from_rows(rows)
    }

    /// Flatten a flat `get` result.
    pub fn from_get_result(result: &GetResult) -> Self {
        Self::from_query_result(&result.clone().into_query_result())
    }

    fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = Map<String, Value>>,
    {
        let rows: Vec<Map<String, Value>> = rows.into_iter().collect();
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        let rows = rows
            .into_iter()
            .map(|mut row| {
                columns
                    .iter()
                    .map(|c| row.remove(c).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Table { columns, rows }
    }
}
