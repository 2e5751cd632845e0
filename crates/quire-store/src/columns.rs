//! Column conversion helpers shared by the row mappers.

use chrono::{DateTime, Utc};
use quire_shared::{ApprovalStatus, GlobalUserId};
use rusqlite::types::Type;

use crate::error::StoreError;

fn conversion<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

/// Current time in the RFC-3339 form stored in every timestamp column.
pub(crate) fn now() -> (DateTime<Utc>, String) {
    let now = Utc::now();
    (now, now.to_rfc3339())
}

pub(crate) fn ts(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion(idx, e))
}

pub(crate) fn opt_ts(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| ts(idx, s)).transpose()
}

pub(crate) fn global_id(idx: usize, raw: String) -> rusqlite::Result<GlobalUserId> {
    GlobalUserId::parse(&raw).map_err(|e| conversion(idx, e))
}

pub(crate) fn approval(idx: usize, raw: String) -> rusqlite::Result<ApprovalStatus> {
    ApprovalStatus::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown approval value '{raw}'").into(),
        )
    })
}

/// Map "no rows" to [`StoreError::NotFound`].
pub(crate) fn not_found(e: rusqlite::Error) -> StoreError {
    match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
        other => StoreError::Sqlite(other),
    }
}
