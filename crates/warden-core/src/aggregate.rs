//! Aggregates: staging objects for one entity's pending writes.

use serde::Serialize;

use crate::error::DomainError;
use crate::event::{AggregateType, Event, EventType, Sequence, Version};
use crate::query::SearchQuery;

/// Validation run against the events a precondition query returns.
///
/// A plain function rather than a closure: everything it needs arrives in
/// the slice, so it can be tested on its own.
pub type PreconditionCheck = fn(&[Event]) -> Result<(), DomainError>;

/// Read-before-write check evaluated in the write transaction.
#[derive(Debug, Clone)]
pub struct Precondition {
    /// Events to load before writing.
    pub query: SearchQuery,
    /// Rejects the write by returning an error.
    pub check: PreconditionCheck,
}

impl Precondition {
    /// Runs the check against the loaded events, mapping any rejection to
    /// `PreconditionFailed`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::PreconditionFailed` if the check rejects.
    pub fn evaluate(&self, events: &[Event]) -> Result<(), DomainError> {
        (self.check)(events).map_err(|err| match err {
            DomainError::PreconditionFailed(_) => err,
            other => DomainError::PreconditionFailed(other.to_string()),
        })
    }
}

/// Who is writing: the acting user and the organisation that owns the data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorContext {
    /// Acting user id.
    pub user: String,
    /// Owning organisation id.
    pub resource_owner: String,
}

/// Creates aggregates stamped with one service name.
#[derive(Debug, Clone)]
pub struct AggregateCreator {
    editor_service: String,
}

impl AggregateCreator {
    /// Creates a factory for the given editor service.
    #[must_use]
    pub fn new(editor_service: impl Into<String>) -> Self {
        Self {
            editor_service: editor_service.into(),
        }
    }

    /// Creates an aggregate carrying this service and the editor's identity.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidArgument` if `version` is malformed.
    pub fn new_aggregate(
        &self,
        editor: &EditorContext,
        id: impl Into<String>,
        aggregate_type: impl Into<AggregateType>,
        version: &str,
        latest_sequence: Sequence,
    ) -> Result<Aggregate, DomainError> {
        Ok(Aggregate::new(id, aggregate_type, version, latest_sequence)?
            .with_editor_service(self.editor_service.clone())
            .with_editor_user(editor.user.clone())
            .with_resource_owner(editor.resource_owner.clone()))
    }
}

/// One entity's in-flight event batch.
///
/// Identity fields must be set before the first event is appended: each
/// appended event copies them.
#[derive(Debug, Clone)]
pub struct Aggregate {
    id: String,
    aggregate_type: AggregateType,
    version: Version,
    latest_sequence: Sequence,
    editor_service: String,
    editor_user: String,
    resource_owner: String,
    events: Vec<Event>,
    precondition: Option<Precondition>,
}

impl Aggregate {
    /// Creates an aggregate that believes `latest_sequence` is current.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidArgument` if `version` is malformed.
    pub fn new(
        id: impl Into<String>,
        aggregate_type: impl Into<AggregateType>,
        version: &str,
        latest_sequence: Sequence,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            id: id.into(),
            aggregate_type: aggregate_type.into(),
            version: Version::parse(version)?,
            latest_sequence,
            editor_service: String::new(),
            editor_user: String::new(),
            resource_owner: String::new(),
            events: Vec::new(),
            precondition: None,
        })
    }

    /// Sets the editor service.
    #[must_use]
    pub fn with_editor_service(mut self, editor_service: impl Into<String>) -> Self {
        self.editor_service = editor_service.into();
        self
    }

    /// Overrides the editor user.
    #[must_use]
    pub fn with_editor_user(mut self, editor_user: impl Into<String>) -> Self {
        self.editor_user = editor_user.into();
        self
    }

    /// Overrides the resource owner.
    #[must_use]
    pub fn with_resource_owner(mut self, resource_owner: impl Into<String>) -> Self {
        self.resource_owner = resource_owner.into();
        self
    }

    /// Appends an event with a serializable payload.
    ///
    /// The payload must serialize to a JSON object; `null` (e.g. `&()`)
    /// stores no payload.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidArgument` if `event_type` is empty or the
    /// payload cannot be serialized to an object.
    pub fn append_event(
        &mut self,
        event_type: impl Into<EventType>,
        payload: &impl Serialize,
    ) -> Result<&mut Self, DomainError> {
        let event_type = event_type.into();
        if event_type.is_empty() {
            return Err(DomainError::InvalidArgument("no event type".into()));
        }
        let value = serde_json::to_value(payload).map_err(|e| {
            DomainError::InvalidArgument(format!("payload of {event_type} not serializable: {e}"))
        })?;
        let data = match value {
            serde_json::Value::Null => None,
            serde_json::Value::Object(_) => Some(serde_json::to_vec(&value).map_err(|e| {
                DomainError::InvalidArgument(format!(
                    "payload of {event_type} not serializable: {e}"
                ))
            })?),
            _ => {
                return Err(DomainError::InvalidArgument(format!(
                    "payload of {event_type} is not a JSON object"
                )));
            }
        };
        self.push_event(event_type, data);
        Ok(self)
    }

    /// Appends an event whose payload is already serialized. The bytes are
    /// stored unchanged; an empty slice stores no payload.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidArgument` if `event_type` is empty or the
    /// bytes are not a JSON object.
    pub fn append_raw_event(
        &mut self,
        event_type: impl Into<EventType>,
        data: Vec<u8>,
    ) -> Result<&mut Self, DomainError> {
        let event_type = event_type.into();
        if event_type.is_empty() {
            return Err(DomainError::InvalidArgument("no event type".into()));
        }
        if data.is_empty() {
            self.push_event(event_type, None);
            return Ok(self);
        }
        match serde_json::from_slice::<serde_json::Value>(&data) {
            Ok(serde_json::Value::Object(_)) => {
                self.push_event(event_type, Some(data));
                Ok(self)
            }
            Ok(_) => Err(DomainError::InvalidArgument(format!(
                "payload of {event_type} is not a JSON object"
            ))),
            Err(e) => Err(DomainError::InvalidArgument(format!(
                "payload of {event_type} is not valid JSON: {e}"
            ))),
        }
    }

    fn push_event(&mut self, event_type: EventType, data: Option<Vec<u8>>) {
        self.events.push(Event {
            id: None,
            creation_date: None,
            event_type,
            sequence: 0,
            previous_sequence: self.latest_sequence,
            data,
            editor_service: self.editor_service.clone(),
            editor_user: self.editor_user.clone(),
            resource_owner: self.resource_owner.clone(),
            aggregate_type: self.aggregate_type.clone(),
            aggregate_id: self.id.clone(),
            aggregate_version: self.version.clone(),
        });
    }

    /// Attaches a check evaluated against `query`'s results inside the write
    /// transaction. The query is switched to precondition mode.
    pub fn set_precondition(&mut self, query: SearchQuery, check: PreconditionCheck) -> &mut Self {
        self.precondition = Some(Precondition {
            query: query.for_precondition(),
            check,
        });
        self
    }

    /// Checks the aggregate and its events are complete.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::PreconditionFailed` naming the first problem.
    pub fn validate(&self) -> Result<(), DomainError> {
        let missing = if self.id.is_empty() {
            Some("id")
        } else if self.aggregate_type.is_empty() {
            Some("type")
        } else if self.editor_service.is_empty() {
            Some("editor service")
        } else if self.editor_user.is_empty() {
            Some("editor user")
        } else if self.resource_owner.is_empty() {
            Some("resource owner")
        } else {
            None
        };
        if let Some(field) = missing {
            return Err(DomainError::PreconditionFailed(format!(
                "aggregate {field} not set"
            )));
        }
        if let Some(precondition) = &self.precondition {
            precondition.query.validate().map_err(|e| {
                DomainError::PreconditionFailed(format!("invalid precondition: {e}"))
            })?;
        }
        self.events.iter().try_for_each(Event::validate)
    }

    /// Aggregate id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Aggregate type.
    #[must_use]
    pub fn aggregate_type(&self) -> &AggregateType {
        &self.aggregate_type
    }

    /// Aggregate version.
    #[must_use]
    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Sequence this aggregate believes is current.
    #[must_use]
    pub fn latest_sequence(&self) -> Sequence {
        self.latest_sequence
    }

    /// Pending events, in append order.
    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Pending events, for the store to write back assigned fields.
    pub fn events_mut(&mut self) -> &mut [Event] {
        &mut self.events
    }

    /// The attached precondition, if any.
    #[must_use]
    pub fn precondition(&self) -> Option<&Precondition> {
        self.precondition.as_ref()
    }
}
