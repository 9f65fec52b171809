//! Event records stored in the log.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Global position of an event in the log.
///
/// Zero means "nothing committed yet"; committed events start at one.
pub type Sequence = u64;

/// Type tag of an event, e.g. `user.added`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(String);

impl EventType {
    /// Wraps a type tag.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the tag is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for EventType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Type of the aggregate an event belongs to, e.g. `user` or `org`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateType(String);

impl AggregateType {
    /// Wraps an aggregate type name.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the type name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the type name is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for AggregateType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for AggregateType {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for AggregateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    // The pattern is a literal; compilation cannot fail.
    Regex::new(r"^v[0-9]+(\.[0-9]+){0,2}$").expect("version pattern is a valid regex")
});

/// Schema version of an aggregate, e.g. `v1` or `v2.1.0`.
///
/// A `Version` can only be constructed through [`Version::parse`], so every
/// instance matches `^v[0-9]+(\.[0-9]+){0,2}$`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(String);

impl Version {
    /// Parses and validates a version string.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidArgument` if the string does not match
    /// the version pattern.
    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if VERSION_PATTERN.is_match(&value) {
            Ok(Self(value))
        } else {
            Err(DomainError::InvalidArgument(format!(
                "version is not semver: {value:?}"
            )))
        }
    }

    /// Returns the version as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Version {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One immutable fact in the log.
///
/// `id`, `creation_date` and `sequence` are assigned by the store when the
/// event is committed; before that they are `None`/zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Store-assigned identifier.
    pub id: Option<Uuid>,
    /// Store-assigned commit timestamp.
    pub creation_date: Option<DateTime<Utc>>,
    /// Type tag.
    pub event_type: EventType,
    /// Global position, zero until committed.
    pub sequence: Sequence,
    /// Sequence the aggregate was at when this event was created.
    pub previous_sequence: Sequence,
    /// Serialized JSON payload, if any.
    pub data: Option<Vec<u8>>,
    /// Service that issued the write.
    pub editor_service: String,
    /// User that issued the write.
    pub editor_user: String,
    /// Organisation owning the aggregate.
    pub resource_owner: String,
    /// Aggregate type.
    pub aggregate_type: AggregateType,
    /// Aggregate identifier.
    pub aggregate_id: String,
    /// Aggregate schema version.
    pub aggregate_version: Version,
}

impl Event {
    /// Decodes the payload into `T`. A missing payload decodes as JSON `null`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Internal` if the payload does not decode into `T`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, DomainError> {
        let bytes = self.data.as_deref().unwrap_or(b"null");
        serde_json::from_slice(bytes).map_err(|e| {
            DomainError::Internal(format!(
                "payload of event {} (sequence {}) is not decodable: {e}",
                self.event_type, self.sequence
            ))
        })
    }

    /// Checks that the event carries everything the store requires.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::PreconditionFailed` naming the first missing field.
    pub fn validate(&self) -> Result<(), DomainError> {
        let missing = if self.event_type.is_empty() {
            Some("type")
        } else if self.aggregate_id.is_empty() {
            Some("aggregate id")
        } else if self.aggregate_type.is_empty() {
            Some("aggregate type")
        } else if self.editor_service.is_empty() {
            Some("editor service")
        } else if self.editor_user.is_empty() {
            Some("editor user")
        } else if self.resource_owner.is_empty() {
            Some("resource owner")
        } else {
            None
        };

        match missing {
            Some(field) => Err(DomainError::PreconditionFailed(format!(
                "event {field} not set"
            ))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> Event {
        Event {
            id: None,
            creation_date: None,
            event_type: EventType::new("user.added"),
            sequence: 0,
            previous_sequence: 0,
            data: Some(br#"{"name":"ada"}"#.to_vec()),
            editor_service: "admin-api".into(),
            editor_user: "u-1".into(),
            resource_owner: "org-1".into(),
            aggregate_type: AggregateType::new("user"),
            aggregate_id: "42".into(),
            aggregate_version: Version::parse("v1").unwrap(),
        }
    }

    #[test]
    fn test_version_accepts_one_to_three_components() {
        for valid in ["v1", "v1.0", "v2.10.3", "v0"] {
            assert!(Version::parse(valid).is_ok(), "{valid} should be valid");
        }
    }

    #[test]
    fn test_version_rejects_malformed_strings() {
        for invalid in ["", "1.0", "v", "v1.", "v1.2.3.4", "V1", "v1-beta", " v1"] {
            let err = Version::parse(invalid).unwrap_err();
            assert!(err.is_invalid_argument(), "{invalid:?} gave {err:?}");
        }
    }

    #[test]
    fn test_version_deserialization_validates() {
        let ok: Result<Version, _> = serde_json::from_str("\"v3.1\"");
        let bad: Result<Version, _> = serde_json::from_str("\"3.1\"");

        assert_eq!(ok.unwrap().as_str(), "v3.1");
        assert!(bad.is_err());
    }

    #[test]
    fn test_validate_accepts_complete_event() {
        assert!(sample_event().validate().is_ok());
    }

    #[test]
    fn test_validate_reports_missing_editor_user() {
        let mut event = sample_event();
        event.editor_user.clear();

        let err = event.validate().unwrap_err();

        assert_eq!(
            err,
            DomainError::PreconditionFailed("event editor user not set".into())
        );
    }

    #[test]
    fn test_validate_reports_missing_type_first() {
        let mut event = sample_event();
        event.event_type = EventType::default();
        event.resource_owner.clear();

        let err = event.validate().unwrap_err();

        assert_eq!(err, DomainError::PreconditionFailed("event type not set".into()));
    }

    #[test]
    fn test_data_as_decodes_payload() {
        #[derive(Deserialize)]
        struct Added {
            name: String,
        }

        let added: Added = sample_event().data_as().unwrap();

        assert_eq!(added.name, "ada");
    }

    #[test]
    fn test_data_as_reports_internal_on_mismatch() {
        let err = sample_event().data_as::<Vec<u32>>().unwrap_err();

        assert!(err.is_internal());
    }

    #[test]
    fn test_data_as_treats_missing_payload_as_null() {
        let mut event = sample_event();
        event.data = None;

        let decoded: Option<serde_json::Value> = event.data_as().unwrap();

        assert!(decoded.is_none());
    }
}
