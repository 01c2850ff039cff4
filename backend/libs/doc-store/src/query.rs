//! Collection queries: equality/range filters, ordering and limits.
//!
//! Queries are evaluated in process by every backend so that ordering
//! semantics are identical regardless of where documents live.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::path::CollectionPath;
use crate::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    ArrayContains,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: CollectionPath,
    pub filters: Vec<Filter>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<usize>,
}

/// Result set of a query at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySnapshot {
    pub documents: Vec<Document>,
    pub read_time: DateTime<Utc>,
}

impl Query {
    pub fn new(collection: CollectionPath) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Eq, value)
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a document belongs to the result set, ignoring the limit.
    pub fn matches(&self, doc: &Document) -> bool {
        doc.path.parent() == self.collection
            && self.filters.iter().all(|filter| {
                let value = doc.data.get(&filter.field).unwrap_or(&Value::Null);
                filter_matches(filter, value)
            })
    }

    /// Filter, sort and truncate a candidate set.
    ///
    /// Missing fields order as `null`; ties fall back to the document path so
    /// snapshots are deterministic.
    pub fn apply(&self, candidates: Vec<Document>) -> Vec<Document> {
        let mut docs: Vec<Document> = candidates
            .into_iter()
            .filter(|doc| self.matches(doc))
            .collect();

        docs.sort_by(|a, b| {
            for order in &self.order_by {
                let left = a.data.get(&order.field).unwrap_or(&Value::Null);
                let right = b.data.get(&order.field).unwrap_or(&Value::Null);
                let ordering = compare_values(left, right);
                let ordering = match order.direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            a.path.cmp(&b.path)
        });

        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
        docs
    }
}

fn filter_matches(filter: &Filter, value: &Value) -> bool {
    match filter.op {
        FilterOp::Eq => compare_values(value, &filter.value) == Ordering::Equal,
        FilterOp::Ne => compare_values(value, &filter.value) != Ordering::Equal,
        FilterOp::Lt => same_kind(value, &filter.value) && compare_values(value, &filter.value) == Ordering::Less,
        FilterOp::Le => same_kind(value, &filter.value) && compare_values(value, &filter.value) != Ordering::Greater,
        FilterOp::Gt => same_kind(value, &filter.value) && compare_values(value, &filter.value) == Ordering::Greater,
        FilterOp::Ge => same_kind(value, &filter.value) && compare_values(value, &filter.value) != Ordering::Less,
        FilterOp::ArrayContains => value
            .as_array()
            .map(|items| items.iter().any(|item| compare_values(item, &filter.value) == Ordering::Equal))
            .unwrap_or(false),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn same_kind(a: &Value, b: &Value) -> bool {
    type_rank(a) == type_rank(b)
}

/// Total order over JSON values: null < bool < number < string < array < object.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (left, right) in x.iter().zip(y.iter()) {
                let ordering = compare_values(left, right);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}
