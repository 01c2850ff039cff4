//! Staged writes and how they transform a document.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::error::{StoreError, StoreResult};
use crate::path::DocPath;

/// JSON object stored as a document body.
pub type Fields = Map<String, Value>;

/// Field transform applied at commit time against the committed value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldTransform {
    /// Add `by` to an integer field; a missing or non-integer field counts as 0.
    Increment { field: String, by: i64 },
    /// Set the field to the commit timestamp (RFC 3339, UTC).
    ServerTimestamp { field: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Fails with `AlreadyExists` if the document is present.
    Create { path: DocPath, data: Fields },
    /// Creates or fully replaces the document.
    Set { path: DocPath, data: Fields },
    /// Merges top-level fields; fails with `NotFound` if the document is absent.
    Update {
        path: DocPath,
        fields: Fields,
        transforms: Vec<FieldTransform>,
    },
    /// Removes the document; deleting an absent document is a no-op.
    Delete { path: DocPath },
}

impl Write {
    pub fn path(&self) -> &DocPath {
        match self {
            Write::Create { path, .. }
            | Write::Set { path, .. }
            | Write::Update { path, .. }
            | Write::Delete { path } => path,
        }
    }
}

/// Body of a document as it will look after commit.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedDoc {
    pub data: Fields,
    pub create_time: DateTime<Utc>,
}

pub(crate) fn timestamp_value(now: DateTime<Utc>) -> Value {
    Value::String(now.to_rfc3339_opts(SecondsFormat::Micros, true))
}

/// Apply one write to the current body of its document.
pub fn apply(write: &Write, current: Option<&Fields>, now: DateTime<Utc>) -> StoreResult<Option<Fields>> {
    match write {
        Write::Create { path, data } => {
            if current.is_some() {
                return Err(StoreError::AlreadyExists(path.to_string()));
            }
            Ok(Some(data.clone()))
        }
        Write::Set { data, .. } => Ok(Some(data.clone())),
        Write::Update {
            path,
            fields,
            transforms,
        } => {
            let mut next = current
                .cloned()
                .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
            for (key, value) in fields {
                next.insert(key.clone(), value.clone());
            }
            for transform in transforms {
                match transform {
                    FieldTransform::Increment { field, by } => {
                        let base = next.get(field).and_then(Value::as_i64).unwrap_or(0);
                        let value = base.checked_add(*by).ok_or_else(|| {
                            StoreError::InvalidTransaction(format!(
                                "increment of '{}' on {} overflows",
                                field, path
                            ))
                        })?;
                        next.insert(field.clone(), Value::from(value));
                    }
                    FieldTransform::ServerTimestamp { field } => {
                        next.insert(field.clone(), timestamp_value(now));
                    }
                }
            }
            Ok(Some(next))
        }
        Write::Delete { .. } => Ok(None),
    }
}

/// Stage a batch of writes in order, later writes seeing earlier ones.
///
/// `lookup` returns the committed body and create time of a document. Any
/// failing write fails the whole batch before anything is applied.
pub fn stage<F>(
    writes: &[Write],
    now: DateTime<Utc>,
    mut lookup: F,
) -> StoreResult<BTreeMap<DocPath, Option<StagedDoc>>>
where
    F: FnMut(&DocPath) -> Option<StagedDoc>,
{
    let mut staged: BTreeMap<DocPath, Option<StagedDoc>> = BTreeMap::new();

    for write in writes {
        let path = write.path();
        let current = match staged.get(path) {
            Some(entry) => entry.clone(),
            None => lookup(path),
        };
        let create_time = current.as_ref().map(|doc| doc.create_time).unwrap_or(now);
        let next = apply(write, current.as_ref().map(|doc| &doc.data), now)?;
        staged.insert(
            path.clone(),
            next.map(|data| StagedDoc { data, create_time }),
        );
    }

    Ok(staged)
}
