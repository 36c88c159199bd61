//! Record lookup with the store failure policy.
//!
//! [`RecordStore`] is the seam to the database; [`RecordLocator`] decides
//! what a failed query turns into. Schema errors become
//! [`CAMPO_NO_EXISTE`] without a retry. Anything else resets the cursor
//! (reconnecting if the reset itself fails) and retries once. A second
//! failure becomes [`ERROR_QUERY`]. Only a failed reconnect is fatal.

use std::collections::HashMap;
use std::fmt;

use crate::error::AuditError;
use crate::model::{RecordColumns, StoredRecord, CAMPO_NO_EXISTE, ERROR_QUERY};
use crate::observe::RunObserver;
use crate::query::{FilterContext, ParameterizedQuery, QueryBuilder};

const SCHEMA_ERROR_MARKERS: &[&str] = &["does not exist", "no such column", "no such table", "column"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The query named a column or table the store does not have.
    pub fn is_schema_error(&self) -> bool {
        let msg = self.message.to_lowercase();
        SCHEMA_ERROR_MARKERS.iter().any(|m| msg.contains(m))
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for StoreError {}

/// Read access to the relational store.
pub trait RecordStore {
    /// Run `query` and return its first row, if any.
    fn fetch_one(&mut self, query: &ParameterizedQuery) -> Result<Option<RecordColumns>, StoreError>;

    /// Drop any aborted statement state so the next query starts clean.
    fn reset_cursor(&mut self) -> Result<(), StoreError>;

    /// Close and reopen the underlying connection.
    fn reconnect(&mut self) -> Result<(), StoreError>;
}

impl<S: RecordStore + ?Sized> RecordStore for &mut S {
    fn fetch_one(&mut self, query: &ParameterizedQuery) -> Result<Option<RecordColumns>, StoreError> {
        (**self).fetch_one(query)
    }

    fn reset_cursor(&mut self) -> Result<(), StoreError> {
        (**self).reset_cursor()
    }

    fn reconnect(&mut self) -> Result<(), StoreError> {
        (**self).reconnect()
    }
}

/// Outcome of one lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    /// The located row, `None` when nothing matched or the query failed.
    pub record: Option<StoredRecord>,
    /// The column value, or a sentinel when the query failed.
    pub value: Option<String>,
    pub note: Option<String>,
}

pub struct RecordLocator<'a, S: RecordStore + ?Sized> {
    store: &'a mut S,
    builder: &'a QueryBuilder,
    observer: &'a dyn RunObserver,
    memo: HashMap<ParameterizedQuery, Option<RecordColumns>>,
}

impl<'a, S: RecordStore + ?Sized> RecordLocator<'a, S> {
    pub fn new(store: &'a mut S, builder: &'a QueryBuilder, observer: &'a dyn RunObserver) -> Self {
        Self {
            store,
            builder,
            observer,
            memo: HashMap::new(),
        }
    }

    /// Forget memoized rows. Called at every document boundary.
    pub fn clear_memo(&mut self) {
        self.memo.clear();
    }

    pub fn memo_len(&self) -> usize {
        self.memo.len()
    }

    pub fn locate(&mut self, entity: &str, column: &str, ctx: &FilterContext) -> Result<Lookup, AuditError> {
        let query = self.builder.build(entity, column, ctx);

        if let Some(row) = self.memo.get(&query) {
            return Ok(found(entity, column, row.clone(), &query));
        }

        let first = match self.store.fetch_one(&query) {
            Ok(row) => {
                self.memo.insert(query.clone(), row.clone());
                return Ok(found(entity, column, row, &query));
            }
            Err(e) => e,
        };

        if first.is_schema_error() {
            self.observer.query_failed(&query, &first, false);
            return Ok(failed(CAMPO_NO_EXISTE, &first));
        }

        self.observer.query_failed(&query, &first, true);
        self.recover()?;

        match self.store.fetch_one(&query) {
            Ok(row) => {
                self.memo.insert(query.clone(), row.clone());
                Ok(found(entity, column, row, &query))
            }
            Err(second) => {
                self.observer.query_failed(&query, &second, false);
                let sentinel = if second.is_schema_error() {
                    CAMPO_NO_EXISTE
                } else {
                    ERROR_QUERY
                };
                Ok(failed(sentinel, &second))
            }
        }
    }

    fn recover(&mut self) -> Result<(), AuditError> {
        match self.store.reset_cursor() {
            Ok(()) => {
                self.observer.connection_reset(false);
                Ok(())
            }
            Err(reset_err) => {
                self.store.reconnect().map_err(|e| {
                    AuditError::Connection(format!("reset failed ({reset_err}); reconnect failed: {e}"))
                })?;
                self.observer.connection_reset(true);
                Ok(())
            }
        }
    }
}

fn found(entity: &str, column: &str, row: Option<RecordColumns>, query: &ParameterizedQuery) -> Lookup {
    match row {
        Some(columns) => {
            let record = StoredRecord {
                entity: entity.to_string(),
                columns,
                query_used: query.to_string(),
            };
            Lookup {
                value: record.value(column).map(str::to_string),
                record: Some(record),
                note: None,
            }
        }
        None => Lookup {
            record: None,
            value: None,
            note: Some("no matching record".into()),
        },
    }
}

fn failed(sentinel: &str, error: &StoreError) -> Lookup {
    Lookup {
        record: None,
        value: Some(sentinel.to_string()),
        note: Some(error.message.clone()),
    }
}
