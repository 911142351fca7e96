//! Record snapshots and identifier types.
//!
//! A [`RecordSnapshot`] is an opaque key/value view of one entity version,
//! supplied by the record-write path for the duration of one dispatch call.
//! The engine never mutates it. A snapshot without a `recordVersion` column
//! is a tombstone: it models a record that does not yet (or no longer)
//! exists, such as the old side of a creation event, and resolves to an
//! empty audience under every rule.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::EngineError;

/// Column carrying the snapshot's version marker.
const RECORD_VERSION_COLUMN: &str = "recordVersion";

// ---------------------------------------------------------------------------
// Identifier newtypes
// ---------------------------------------------------------------------------

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw identifier string.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

id_type! {
    /// Opaque identifier of a stored record.
    RecordId
}

id_type! {
    /// Opaque identity of a user eligible to receive push notifications.
    ///
    /// Equality is stable, so recipient sets support cheap union and
    /// difference at the audience sizes involved (tens to low hundreds).
    RecipientId
}

id_type! {
    /// Opaque identifier of a role in the permission store.
    RoleId
}

// ---------------------------------------------------------------------------
// RecordSnapshot
// ---------------------------------------------------------------------------

/// Semi-structured view of one entity version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordSnapshot {
    columns: Map<String, Value>,
}

impl RecordSnapshot {
    /// Creates a snapshot at the given record version with no other columns.
    #[must_use]
    pub fn new(record_version: i64) -> Self {
        let mut columns = Map::new();
        columns.insert(RECORD_VERSION_COLUMN.to_owned(), record_version.into());
        Self { columns }
    }

    /// Creates a tombstone: a snapshot with no version marker, resolving to
    /// an empty audience under every rule.
    #[must_use]
    pub fn tombstone() -> Self {
        Self {
            columns: Map::new(),
        }
    }

    /// Wraps an existing column map.
    #[must_use]
    pub fn from_columns(columns: Map<String, Value>) -> Self {
        Self { columns }
    }

    /// Adds a column, replacing any previous value. Builder-style.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.insert(column.into(), value.into());
        self
    }

    /// Returns the snapshot's version marker, `None` for tombstones.
    #[must_use]
    pub fn record_version(&self) -> Option<i64> {
        self.columns.get(RECORD_VERSION_COLUMN).and_then(Value::as_i64)
    }

    /// Returns the record's identifier.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the `id` column is absent or not a
    /// string.
    pub fn id(&self) -> Result<RecordId, EngineError> {
        match self.columns.get("id") {
            None => Err(EngineError::MissingColumn { column: "id".into() }),
            Some(Value::String(id)) => Ok(RecordId::new(id.clone())),
            Some(other) => Err(EngineError::MalformedColumn {
                column: "id".into(),
                detail: format!("expected string, got {other}"),
            }),
        }
    }

    /// Returns a raw column value, if present.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// Reads a boolean column. A null value reads as `false`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the column is absent or not a
    /// boolean.
    pub fn bool_field(&self, column: &str) -> Result<bool, EngineError> {
        match self.columns.get(column) {
            None => Err(EngineError::MissingColumn {
                column: column.into(),
            }),
            Some(Value::Null) => Ok(false),
            Some(Value::Bool(value)) => Ok(*value),
            Some(other) => Err(EngineError::MalformedColumn {
                column: column.into(),
                detail: format!("expected boolean, got {other}"),
            }),
        }
    }

    /// Reads a nullable record-reference column.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the column is absent or not a
    /// string.
    pub fn ref_field(&self, column: &str) -> Result<Option<RecordId>, EngineError> {
        self.nullable_str(column).map(|id| id.map(RecordId::new))
    }

    /// Reads a nullable user-link column.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the column is absent or not a
    /// string.
    pub fn link_field(&self, column: &str) -> Result<Option<RecipientId>, EngineError> {
        self.nullable_str(column).map(|id| id.map(RecipientId::new))
    }

    /// Reads a user-link list column. Null entries are skipped; a null
    /// column reads as empty.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the column is absent, not a list,
    /// or contains non-string entries.
    pub fn links_field(&self, column: &str) -> Result<Vec<RecipientId>, EngineError> {
        match self.columns.get(column) {
            None => Err(EngineError::MissingColumn {
                column: column.into(),
            }),
            Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(entries)) => {
                let mut links = Vec::with_capacity(entries.len());
                for entry in entries {
                    match entry {
                        Value::Null => {}
                        Value::String(id) => links.push(RecipientId::new(id.clone())),
                        other => {
                            return Err(EngineError::MalformedColumn {
                                column: column.into(),
                                detail: format!("expected string entry, got {other}"),
                            })
                        }
                    }
                }
                Ok(links)
            }
            Some(other) => Err(EngineError::MalformedColumn {
                column: column.into(),
                detail: format!("expected list, got {other}"),
            }),
        }
    }

    fn nullable_str(&self, column: &str) -> Result<Option<String>, EngineError> {
        match self.columns.get(column) {
            None => Err(EngineError::MissingColumn {
                column: column.into(),
            }),
            Some(Value::Null) => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.clone())),
            Some(other) => Err(EngineError::MalformedColumn {
                column: column.into(),
                detail: format!("expected string, got {other}"),
            }),
        }
    }
}
