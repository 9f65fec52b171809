//! Translation of a [`SearchQuery`] into parameterized SQL.
//!
//! Conditions are built with `?` markers and numbered into `$n` placeholders
//! at the end; values are always bound, never inlined.

use sqlx::Arguments;
use sqlx::postgres::PgArguments;
use warden_core::error::DomainError;
use warden_core::query::{Columns, Field, Filter, FilterValue, Operation, SearchQuery};

/// Projection for full event rows.
pub const SELECT_EVENTS: &str = "SELECT id, creation_date, event_type, event_sequence, \
     previous_sequence, event_data, editor_service, editor_user, resource_owner, \
     aggregate_type, aggregate_id, aggregate_version FROM eventstore.events";

/// Projection for the highest matching sequence.
pub const SELECT_MAX_SEQUENCE: &str = "SELECT MAX(event_sequence) FROM eventstore.events";

/// A query ready to execute: SQL text plus the values for its placeholders,
/// in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// SQL with `$1..$n` placeholders.
    pub sql: String,
    /// One value per placeholder.
    pub values: Vec<FilterValue>,
}

/// Column a field is stored in.
#[must_use]
pub fn column(field: Field) -> &'static str {
    match field {
        Field::AggregateType => "aggregate_type",
        Field::AggregateId => "aggregate_id",
        Field::EventType => "event_type",
        Field::ResourceOwner => "resource_owner",
        Field::LatestSequence => "event_sequence",
        Field::EditorService => "editor_service",
        Field::EditorUser => "editor_user",
        Field::CreationDate => "creation_date",
    }
}

/// SQL comparison for an operation.
#[must_use]
pub fn operator(operation: Operation) -> &'static str {
    match operation {
        Operation::Equals => "=",
        Operation::Greater => ">",
        Operation::Less => "<",
        Operation::In => "= ANY",
    }
}

/// The `WHERE` fragment for one filter, or `None` if the combination is not
/// supported.
#[must_use]
pub fn condition(filter: &Filter) -> Option<String> {
    if !filter.is_supported() {
        return None;
    }
    let column = column(filter.field());
    let operator = operator(filter.operation());
    Some(match filter.operation() {
        Operation::In => format!("{column} {operator}(?)"),
        _ => format!("{column} {operator} ?"),
    })
}

/// Replaces each `?` with `$1`, `$2`, ... in order.
#[must_use]
pub fn number_placeholders(sql: &str) -> String {
    let mut numbered = String::with_capacity(sql.len() + 8);
    let mut next = 0;
    for c in sql.chars() {
        if c == '?' {
            next += 1;
            numbered.push('$');
            numbered.push_str(&next.to_string());
        } else {
            numbered.push(c);
        }
    }
    numbered
}

/// Validates `query` and renders it.
///
/// # Errors
///
/// Returns `DomainError::PreconditionFailed` if the query is invalid, or
/// `DomainError::InvalidArgument` if its row limit does not fit a `BIGINT`.
pub fn prepare(query: &SearchQuery) -> Result<Statement, DomainError> {
    query.validate()?;

    let conditions = query
        .filters()
        .iter()
        .map(|filter| {
            condition(filter).ok_or_else(|| {
                DomainError::PreconditionFailed(format!("unsupported filter {filter:?}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut sql = String::from(match query.result_columns() {
        Columns::Event => SELECT_EVENTS,
        Columns::MaxSequence => SELECT_MAX_SEQUENCE,
    });
    sql.push_str(" WHERE ");
    sql.push_str(&conditions.join(" AND "));

    if query.result_columns() == Columns::Event {
        sql.push_str(" ORDER BY event_sequence");
        if query.is_desc() {
            sql.push_str(" DESC");
        }
        if query.row_limit() > 0 {
            let limit = i64::try_from(query.row_limit()).map_err(|_| {
                DomainError::InvalidArgument(format!("limit {} out of range", query.row_limit()))
            })?;
            sql.push_str(&format!(" LIMIT {limit}"));
        }
    }

    Ok(Statement {
        sql: number_placeholders(&sql),
        values: query.filters().iter().map(|f| f.value().clone()).collect(),
    })
}

/// Encodes placeholder values for the driver.
///
/// # Errors
///
/// Returns `DomainError::InvalidArgument` if a sequence does not fit a
/// `BIGINT`, or `DomainError::Internal` if encoding fails.
pub(crate) fn arguments(values: &[FilterValue]) -> Result<PgArguments, DomainError> {
    let mut args = PgArguments::default();
    for value in values {
        let added = match value {
            FilterValue::Text(text) => args.add(text.clone()),
            FilterValue::TextList(list) => args.add(list.clone()),
            FilterValue::Sequence(sequence) => {
                let sequence = i64::try_from(*sequence).map_err(|_| {
                    DomainError::InvalidArgument(format!("sequence {sequence} out of range"))
                })?;
                args.add(sequence)
            }
            FilterValue::Timestamp(timestamp) => args.add(*timestamp),
        };
        added.map_err(|e| DomainError::Internal(format!("cannot bind {value:?}: {e}")))?;
    }
    Ok(args)
}
