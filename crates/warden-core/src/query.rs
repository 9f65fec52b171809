//! Declarative search queries over the log.
//!
//! A [`SearchQuery`] is a conjunction of [`Filter`]s plus a result shape,
//! ordering, row limit and consistency mode. Queries never carry SQL; the
//! repository translates them.

use chrono::{DateTime, Utc};

use crate::error::DomainError;
use crate::event::{AggregateType, Event, EventType, Sequence};

/// Event attribute a filter constrains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// `aggregate_type`
    AggregateType,
    /// `aggregate_id`
    AggregateId,
    /// `event_type`
    EventType,
    /// `resource_owner`
    ResourceOwner,
    /// The global sequence, used for bookmarks.
    LatestSequence,
    /// `editor_service`
    EditorService,
    /// `editor_user`
    EditorUser,
    /// `creation_date`
    CreationDate,
}

impl Field {
    /// Returns `true` for fields compared as strings.
    #[must_use]
    pub fn is_textual(self) -> bool {
        !matches!(self, Self::LatestSequence | Self::CreationDate)
    }
}

/// Comparison a filter applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Equality.
    Equals,
    /// Strictly greater than.
    Greater,
    /// Strictly less than.
    Less,
    /// Membership in a list.
    In,
}

/// Right-hand side of a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    /// A single string.
    Text(String),
    /// A list of strings, for `In`.
    TextList(Vec<String>),
    /// A sequence number.
    Sequence(Sequence),
    /// A point in time.
    Timestamp(DateTime<Utc>),
}

impl FilterValue {
    fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::TextList(list) => list.is_empty() || list.iter().any(String::is_empty),
            Self::Sequence(_) | Self::Timestamp(_) => false,
        }
    }
}

/// A single `{field, operation, value}` predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    field: Field,
    operation: Operation,
    value: FilterValue,
}

impl Filter {
    /// Creates a filter. Use [`Filter::validate`] to check it.
    #[must_use]
    pub fn new(field: Field, operation: Operation, value: FilterValue) -> Self {
        Self {
            field,
            operation,
            value,
        }
    }

    /// The constrained field.
    #[must_use]
    pub fn field(&self) -> Field {
        self.field
    }

    /// The comparison.
    #[must_use]
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// The right-hand side.
    #[must_use]
    pub fn value(&self) -> &FilterValue {
        &self.value
    }

    /// Returns `true` if the field/operation/value combination is one the
    /// log can evaluate.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        match (self.field, self.operation, &self.value) {
            (field, Operation::Equals, FilterValue::Text(_))
            | (field, Operation::In, FilterValue::TextList(_)) => field.is_textual(),
            (
                Field::LatestSequence,
                Operation::Equals | Operation::Greater | Operation::Less,
                FilterValue::Sequence(_),
            )
            | (
                Field::CreationDate,
                Operation::Equals | Operation::Greater | Operation::Less,
                FilterValue::Timestamp(_),
            ) => true,
            _ => false,
        }
    }

    /// Checks the filter has a value and a supported combination.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::PreconditionFailed` otherwise.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.value.is_empty() {
            return Err(DomainError::PreconditionFailed(format!(
                "filter on {:?} has no value",
                self.field
            )));
        }
        if !self.is_supported() {
            return Err(DomainError::PreconditionFailed(format!(
                "operation {:?} not supported on {:?} with {:?}",
                self.operation, self.field, self.value
            )));
        }
        Ok(())
    }

    /// Evaluates the filter against an event in memory.
    ///
    /// Unsupported combinations never match.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        if !self.is_supported() {
            return false;
        }
        match &self.value {
            FilterValue::Text(expected) => text_of(self.field, event) == Some(expected.as_str()),
            FilterValue::TextList(list) => {
                text_of(self.field, event).is_some_and(|actual| list.iter().any(|v| v == actual))
            }
            FilterValue::Sequence(bound) => compare(self.operation, &event.sequence, bound),
            FilterValue::Timestamp(bound) => event
                .creation_date
                .as_ref()
                .is_some_and(|actual| compare(self.operation, actual, bound)),
        }
    }
}

fn text_of(field: Field, event: &Event) -> Option<&str> {
    match field {
        Field::AggregateType => Some(event.aggregate_type.as_str()),
        Field::AggregateId => Some(&event.aggregate_id),
        Field::EventType => Some(event.event_type.as_str()),
        Field::ResourceOwner => Some(&event.resource_owner),
        Field::EditorService => Some(&event.editor_service),
        Field::EditorUser => Some(&event.editor_user),
        Field::LatestSequence | Field::CreationDate => None,
    }
}

fn compare<T: Ord>(operation: Operation, actual: &T, bound: &T) -> bool {
    match operation {
        Operation::Equals => actual == bound,
        Operation::Greater => actual > bound,
        Operation::Less => actual < bound,
        Operation::In => false,
    }
}

/// Result shape of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Columns {
    /// Full event rows.
    #[default]
    Event,
    /// Only the maximum matching sequence.
    MaxSequence,
}

/// A declarative read predicate.
///
/// ```
/// use warden_core::query::SearchQuery;
///
/// let query = SearchQuery::new()
///     .aggregate_type_filter(["user"])
///     .latest_sequence_filter(41)
///     .limit(100);
/// assert!(query.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    columns: Columns,
    filters: Vec<Filter>,
    desc: bool,
    limit: u64,
    precondition_mode: bool,
}

fn text_filter<I, S>(field: Field, values: I) -> Filter
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut values: Vec<String> = values.into_iter().map(Into::into).collect();
    if values.len() == 1 {
        Filter::new(field, Operation::Equals, FilterValue::Text(values.remove(0)))
    } else {
        Filter::new(field, Operation::In, FilterValue::TextList(values))
    }
}

impl SearchQuery {
    /// An empty, ascending, unlimited query over full events.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the result shape.
    #[must_use]
    pub fn columns(mut self, columns: Columns) -> Self {
        self.columns = columns;
        self
    }

    /// Limits the number of returned rows; zero means unlimited.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Orders results by descending sequence.
    #[must_use]
    pub fn order_desc(mut self) -> Self {
        self.desc = true;
        self
    }

    /// Orders results by ascending sequence (the default).
    #[must_use]
    pub fn order_asc(mut self) -> Self {
        self.desc = false;
        self
    }

    /// Marks the query as a precondition read, which must observe the latest
    /// committed state instead of a snapshot.
    #[must_use]
    pub fn for_precondition(mut self) -> Self {
        self.precondition_mode = true;
        self
    }

    /// Adds an arbitrary filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Restricts to the given aggregate types.
    #[must_use]
    pub fn aggregate_type_filter<I, T>(self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<AggregateType>,
    {
        let names = types.into_iter().map(|t| {
            let t: AggregateType = t.into();
            t.as_str().to_owned()
        });
        self.with_filter(text_filter(Field::AggregateType, names))
    }

    /// Restricts to the given aggregate ids.
    #[must_use]
    pub fn aggregate_id_filter<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_filter(text_filter(Field::AggregateId, ids))
    }

    /// Restricts to the given event types.
    #[must_use]
    pub fn event_type_filter<I, T>(self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<EventType>,
    {
        let names = types.into_iter().map(|t| {
            let t: EventType = t.into();
            t.as_str().to_owned()
        });
        self.with_filter(text_filter(Field::EventType, names))
    }

    /// Restricts to one resource owner.
    #[must_use]
    pub fn resource_owner_filter(self, owner: impl Into<String>) -> Self {
        self.with_filter(text_filter(Field::ResourceOwner, [owner]))
    }

    /// Restricts to one editor service.
    #[must_use]
    pub fn editor_service_filter(self, service: impl Into<String>) -> Self {
        self.with_filter(text_filter(Field::EditorService, [service]))
    }

    /// Restricts to one editor user.
    #[must_use]
    pub fn editor_user_filter(self, user: impl Into<String>) -> Self {
        self.with_filter(text_filter(Field::EditorUser, [user]))
    }

    /// Restricts to events past a bookmark.
    ///
    /// A zero bookmark adds nothing. Call after [`SearchQuery::order_desc`]
    /// to get events before the bookmark instead.
    #[must_use]
    pub fn latest_sequence_filter(self, sequence: Sequence) -> Self {
        if sequence == 0 {
            return self;
        }
        let operation = if self.desc {
            Operation::Less
        } else {
            Operation::Greater
        };
        self.with_filter(Filter::new(
            Field::LatestSequence,
            operation,
            FilterValue::Sequence(sequence),
        ))
    }

    /// Restricts to events created after `date`.
    #[must_use]
    pub fn creation_date_newer_filter(self, date: DateTime<Utc>) -> Self {
        self.with_filter(Filter::new(
            Field::CreationDate,
            Operation::Greater,
            FilterValue::Timestamp(date),
        ))
    }

    /// The result shape.
    #[must_use]
    pub fn result_columns(&self) -> Columns {
        self.columns
    }

    /// The filters, in insertion order.
    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Whether results are ordered by descending sequence.
    #[must_use]
    pub fn is_desc(&self) -> bool {
        self.desc
    }

    /// The row limit; zero means unlimited.
    #[must_use]
    pub fn row_limit(&self) -> u64 {
        self.limit
    }

    /// Whether this is a strongly consistent precondition read.
    #[must_use]
    pub fn is_precondition_mode(&self) -> bool {
        self.precondition_mode
    }

    /// The bookmark carried by a `Greater` sequence filter, or zero.
    #[must_use]
    pub fn processed_sequence(&self) -> Sequence {
        self.filters
            .iter()
            .filter(|f| f.field == Field::LatestSequence && f.operation == Operation::Greater)
            .filter_map(|f| match f.value {
                FilterValue::Sequence(sequence) => Some(sequence),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// A copy of this query without sequence filters, reshaped to return the
    /// maximum sequence. Used to ask "how far has the log advanced for these
    /// events".
    #[must_use]
    pub fn to_max_sequence_query(&self) -> Self {
        Self {
            columns: Columns::MaxSequence,
            filters: self
                .filters
                .iter()
                .filter(|f| f.field != Field::LatestSequence)
                .cloned()
                .collect(),
            desc: false,
            limit: 0,
            precondition_mode: self.precondition_mode,
        }
    }

    /// Checks the query before it reaches storage.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::PreconditionFailed` if the query has no
    /// filters, no aggregate-type filter, or an invalid filter.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.filters.is_empty() {
            return Err(DomainError::PreconditionFailed(
                "search query has no filters".into(),
            ));
        }
        if !self
            .filters
            .iter()
            .any(|f| f.field == Field::AggregateType)
        {
            return Err(DomainError::PreconditionFailed(
                "search query has no aggregate types".into(),
            ));
        }
        self.filters.iter().try_for_each(Filter::validate)
    }

    /// Evaluates every filter against an event in memory.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        self.filters.iter().all(|f| f.matches(event))
    }
}
