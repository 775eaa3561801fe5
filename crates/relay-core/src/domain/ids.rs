//! Domain identifiers (strongly-typed IDs).
//!
//! ULID-backed so IDs sort by creation time and can be generated on any node
//! without coordination. A phantom-type marker keeps the ID spaces distinct at
//! compile time: an `EnvelopeId` can never be passed where a `CycleId` is
//! expected.

use std::fmt;
use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Marker trait for ID spaces. Provides the `Display` prefix.
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic ULID-backed identifier.
///
/// `T` is a zero-sized marker; it costs nothing at runtime and exists only so
/// the compiler rejects mixed-up ID types.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// Generate a fresh ID whose timestamp half comes from `now`.
    ///
    /// Taking the timestamp as a parameter (instead of reading the system
    /// clock here) keeps generation deterministic under a test clock.
    pub fn generate(now: DateTime<Utc>) -> Self {
        let ulid = Ulid::from_parts(now.timestamp_millis() as u64, rand::random());
        Self::from_ulid(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Marker for envelope IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Envelope {}

impl IdMarker for Envelope {
    fn prefix() -> &'static str {
        "env-"
    }
}

/// Marker for scheduling-cycle IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Cycle {}

impl IdMarker for Cycle {
    fn prefix() -> &'static str {
        "cycle-"
    }
}

/// Identifier of one sent envelope (delivery metadata).
pub type EnvelopeId = Id<Envelope>;

/// Identifier of one scheduling cycle.
pub type CycleId = Id<Cycle>;

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let ulid = Ulid::new();

        let env = EnvelopeId::from_ulid(ulid);
        let cycle = CycleId::from_ulid(ulid);

        assert_eq!(env.as_ulid(), ulid);
        assert_eq!(cycle.as_ulid(), ulid);

        assert!(env.to_string().starts_with("env-"));
        assert!(cycle.to_string().starts_with("cycle-"));

        // The whole point: you can't accidentally mix these types.
        // (Compile-time property, kept as a comment.)
        // let _: EnvelopeId = cycle; // <- does not compile
    }

    #[test]
    fn generated_ids_sort_by_timestamp() {
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 1).unwrap();

        let id1 = EnvelopeId::generate(t1);
        let id2 = EnvelopeId::generate(t2);

        assert!(id1 < id2);
    }

    #[test]
    fn generated_ids_are_unique_for_equal_timestamps() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        let id1 = CycleId::generate(t);
        let id2 = CycleId::generate(t);

        // Same timestamp half, different random half.
        assert_ne!(id1, id2);
    }

    #[test]
    fn ids_survive_serde_roundtrip() {
        let id = EnvelopeId::from_ulid(Ulid::new());

        let serialized = serde_json::to_string(&id).unwrap();
        let deserialized: EnvelopeId = serde_json::from_str(&serialized).unwrap();

        assert_eq!(id, deserialized);
    }
}
