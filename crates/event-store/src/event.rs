use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::StreamId;
use crate::codec::{self, CodecError};

/// Version number of a stream, used for optimistic concurrency control.
///
/// Versions start at 1 for the first event and increment by 1 for each
/// subsequent event on a stream. Version 0 denotes an empty stream.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the initial version (0) of an empty stream.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the first version (1) for the first event.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the version reached after appending `count` events.
    pub fn advance(&self, count: usize) -> Self {
        Self(self.0 + count as i64)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// Position of an event in the global journal.
///
/// Sequences are assigned at persist time, are strictly increasing in
/// commit order and are shared by every stream in the store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Sequence(i64);

impl Sequence {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// The cursor that precedes every event.
    pub fn start() -> Self {
        Self(0)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Sequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Sequence {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// An immutable event as it sits in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedEvent {
    /// The type of the stream (e.g., "Order", "Inventory").
    pub stream_type: String,

    /// The entity this event belongs to.
    pub stream_id: StreamId,

    /// The version of the stream after this event.
    pub version: Version,

    /// The position of this event in the global journal.
    pub sequence: Sequence,

    /// When the event was persisted.
    pub created_at: DateTime<Utc>,

    /// The encoded event payload.
    pub body: Vec<u8>,
}

impl PersistedEvent {
    /// Decodes the body into a concrete event type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        codec::decode(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_ordering() {
        let v1 = Version::new(1);
        let v2 = Version::new(2);
        assert!(v1 < v2);
        assert_eq!(v1.next(), v2);
    }

    #[test]
    fn version_initial_and_first() {
        assert_eq!(Version::initial().as_i64(), 0);
        assert_eq!(Version::first().as_i64(), 1);
        assert_eq!(Version::initial().next(), Version::first());
    }

    #[test]
    fn version_advance_by_batch() {
        assert_eq!(Version::new(3).advance(2), Version::new(5));
        assert_eq!(Version::new(3).advance(0), Version::new(3));
    }

    #[test]
    fn sequence_starts_before_first_event() {
        assert_eq!(Sequence::start().as_i64(), 0);
        assert_eq!(Sequence::start().next(), Sequence::new(1));
    }

    #[test]
    fn persisted_event_decodes_body() {
        let event = PersistedEvent {
            stream_type: "Inventory".to_string(),
            stream_id: StreamId::new("product1"),
            version: Version::first(),
            sequence: Sequence::new(7),
            created_at: Utc::now(),
            body: br#"{"amount":12}"#.to_vec(),
        };
        let value: serde_json::Value = event.decode().unwrap();
        assert_eq!(value, serde_json::json!({"amount": 12}));
    }
}
