//! Entity <-> remote row translation
//!
//! Handles column renames, timestamp and boolean coercion, and nullable
//! defaults. Business fields round-trip losslessly.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::models::{
    Entity, EntityKind, Event, Family, Genus, Location, Mount, Plant, Source, Species, Substrate,
    SyncMeta,
};

use super::{RemoteError, RemoteRow};

/// Remote naming for an entity kind.
pub trait RemoteSchema: EntityKind {
    /// `(local field, remote column)` pairs for columns named differently remotely
    const RENAMES: &'static [(&'static str, &'static str)] = &[];

    /// Remote column for a local business field
    fn remote_column(field: &str) -> &str {
        Self::RENAMES
            .iter()
            .find(|(local, _)| *local == field)
            .map_or(field, |(_, remote)| remote)
    }

    /// Local business field for a remote column
    fn local_field(column: &str) -> &str {
        Self::RENAMES
            .iter()
            .find(|(_, remote)| *remote == column)
            .map_or(column, |(local, _)| local)
    }
}

impl RemoteSchema for Family {}
impl RemoteSchema for Genus {}
impl RemoteSchema for Species {}
impl RemoteSchema for Location {}
impl RemoteSchema for Mount {}
impl RemoteSchema for Substrate {}

impl RemoteSchema for Plant {
    const RENAMES: &'static [(&'static str, &'static str)] = &[("acquired_on", "acquisition_date")];
}

impl RemoteSchema for Event {
    const RENAMES: &'static [(&'static str, &'static str)] =
        &[("kind", "event_type"), ("occurred_on", "event_date")];
}

impl RemoteSchema for Source {
    const RENAMES: &'static [(&'static str, &'static str)] = &[("website", "url")];
}

const RESERVED_COLUMNS: [&str; 6] = [
    "id",
    "user_id",
    "is_active",
    "is_favorite",
    "created_at",
    "updated_at",
];

/// Build the remote row for an entity. Sync metadata never leaves the device.
pub fn to_remote_row<T: RemoteSchema>(entity: &Entity<T>) -> Result<RemoteRow, RemoteError> {
    let Value::Object(data) = serde_json::to_value(&entity.data).map_err(schema_error)? else {
        return Err(RemoteError::SchemaMismatch(format!(
            "{} business fields must serialize to an object",
            T::TABLE
        )));
    };

    let mut row = Map::with_capacity(data.len() + RESERVED_COLUMNS.len());
    for (field, value) in data {
        row.insert(T::remote_column(&field).to_string(), value);
    }
    row.insert("id".to_string(), Value::String(entity.id.as_str()));
    row.insert(
        "user_id".to_string(),
        entity.user_id.clone().map_or(Value::Null, Value::String),
    );
    row.insert("is_active".to_string(), Value::Bool(entity.is_active));
    row.insert("is_favorite".to_string(), Value::Bool(entity.is_favorite));
    row.insert(
        "created_at".to_string(),
        Value::String(timestamp_to_remote(entity.created_at)?),
    );
    row.insert(
        "updated_at".to_string(),
        Value::String(timestamp_to_remote(entity.updated_at)?),
    );
    Ok(row)
}

/// Parse a remote row into an entity with empty sync metadata.
pub fn from_remote_row<T: RemoteSchema>(mut row: RemoteRow) -> Result<Entity<T>, RemoteError> {
    let id = match row.remove("id") {
        Some(Value::String(id)) => id
            .parse()
            .map_err(|error| RemoteError::SchemaMismatch(format!("invalid id {id}: {error}")))?,
        other => return Err(missing_column(T::TABLE, "id", other.as_ref())),
    };
    let user_id = match row.remove("user_id") {
        None | Some(Value::Null) => None,
        Some(Value::String(user_id)) => Some(user_id),
        Some(other) => return Err(missing_column(T::TABLE, "user_id", Some(&other))),
    };
    let is_active = take_bool(&mut row, T::TABLE, "is_active", true)?;
    let is_favorite = take_bool(&mut row, T::TABLE, "is_favorite", false)?;
    let updated_at = take_timestamp(&mut row, T::TABLE, "updated_at")?
        .ok_or_else(|| missing_column(T::TABLE, "updated_at", None))?;
    let created_at = take_timestamp(&mut row, T::TABLE, "created_at")?.unwrap_or(updated_at);

    let mut data = Map::with_capacity(row.len());
    for (column, value) in row {
        if value.is_null() {
            continue;
        }
        data.insert(T::local_field(&column).to_string(), value);
    }
    let data: T = serde_json::from_value(Value::Object(data)).map_err(|error| {
        RemoteError::SchemaMismatch(format!("{} row does not match model: {error}", T::TABLE))
    })?;

    Ok(Entity {
        id,
        user_id,
        is_active,
        is_favorite,
        created_at,
        updated_at,
        data,
        sync: SyncMeta::default(),
    })
}

/// Format Unix ms as RFC 3339 with millisecond precision.
pub(crate) fn timestamp_to_remote(millis: i64) -> Result<String, RemoteError> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|timestamp| timestamp.to_rfc3339_opts(SecondsFormat::Millis, true))
        .ok_or_else(|| RemoteError::SchemaMismatch(format!("timestamp out of range: {millis}")))
}

/// Parse a remote timestamp (RFC 3339, naive ISO as UTC, or Unix ms).
pub(crate) fn timestamp_from_remote(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .map(|timestamp| timestamp.timestamp_millis())
            .or_else(|_| {
                NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                    .map(|timestamp| timestamp.and_utc().timestamp_millis())
            })
            .ok(),
        _ => None,
    }
}

fn take_timestamp(
    row: &mut RemoteRow,
    table: &str,
    column: &str,
) -> Result<Option<i64>, RemoteError> {
    match row.remove(column) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => timestamp_from_remote(&value)
            .map(Some)
            .ok_or_else(|| missing_column(table, column, Some(&value))),
    }
}

fn take_bool(
    row: &mut RemoteRow,
    table: &str,
    column: &str,
    default: bool,
) -> Result<bool, RemoteError> {
    match row.remove(column) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(value)) => Ok(value),
        Some(Value::Number(number)) if number.as_i64() == Some(0) => Ok(false),
        Some(Value::Number(number)) if number.as_i64() == Some(1) => Ok(true),
        Some(Value::String(text)) if text == "true" => Ok(true),
        Some(Value::String(text)) if text == "false" => Ok(false),
        Some(other) => Err(missing_column(table, column, Some(&other))),
    }
}

fn missing_column(table: &str, column: &str, found: Option<&Value>) -> RemoteError {
    match found {
        None => RemoteError::SchemaMismatch(format!("{table} row is missing column {column}")),
        Some(value) => {
            RemoteError::SchemaMismatch(format!("{table}.{column} has unexpected value {value}"))
        }
    }
}

#[allow(clippy::needless_pass_by_value)]
fn schema_error(error: serde_json::Error) -> RemoteError {
    RemoteError::SchemaMismatch(error.to_string())
}
