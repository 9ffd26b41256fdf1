//! Core types for the phonebook access server
//!
//! Newtypes for remote identities and session handles, the connection and
//! authorization state enums, and the version counter model shared between
//! the coordinator and its persistence collaborator.

use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::PbapError;

// ----------------------------------------------------------------------------
// Remote Identity
// ----------------------------------------------------------------------------

/// Bluetooth device address of a remote peer (6 bytes, most significant first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RemoteId([u8; 6]);

impl RemoteId {
    /// Create a new RemoteId from 6 bytes
    pub fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for RemoteId {
    type Err = PbapError;

    /// Accepts `AA:BB:CC:DD:EE:FF`, `AA-BB-CC-DD-EE-FF` or bare hex.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let clean: String = s.chars().filter(|c| *c != ':' && *c != '-').collect();
        let bytes = hex::decode(&clean)
            .map_err(|_| PbapError::invalid_input(format!("invalid hex in device address: {s}")))?;

        if bytes.len() != 6 {
            return Err(PbapError::invalid_input(format!(
                "device address must be 6 bytes, got {}",
                bytes.len()
            )));
        }

        let mut id = [0u8; 6];
        id.copy_from_slice(&bytes);
        Ok(Self(id))
    }
}

// ----------------------------------------------------------------------------
// Session Handle
// ----------------------------------------------------------------------------

/// Opaque handle to a transport session owned by the session layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionHandle(u64);

impl SessionHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond timestamp since Unix epoch
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as u64)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

/// Source of wall-clock timestamps, injectable for tests
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Standard library implementation of TimeSource
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

// ----------------------------------------------------------------------------
// Connection and Authorization State
// ----------------------------------------------------------------------------

/// Connection state as reported on the query surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Stored phonebook access decision for a remote device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessPermission {
    Allowed,
    Rejected,
    Unknown,
}

/// Kind of access a confirmation prompt asks about
///
/// The prompt collaborator is shared between profiles; only `Phonebook`
/// replies are addressed to this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessRequestKind {
    Phonebook,
    MessageAccess,
    SimAccess,
}

/// Outcome of an authorization request; `Pending` until one of the others
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthorizationOutcome {
    Pending,
    Allowed,
    Rejected,
    TimedOut,
    Cancelled,
}

impl AuthorizationOutcome {
    /// Whether the session should be admitted for this outcome
    pub fn admits(&self) -> bool {
        matches!(self, AuthorizationOutcome::Allowed)
    }
}

// ----------------------------------------------------------------------------
// Contact Store Aggregates
// ----------------------------------------------------------------------------

/// Identifier of a contact row in the contact store
pub type ContactId = u64;

/// Per-contact aggregate read from the contact store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub id: ContactId,
    /// Last modification time reported by the store
    pub last_updated: Timestamp,
    /// Number of populated data fields
    pub total_fields: u32,
    /// Number of populated name / phone / email / address fields
    pub service_fields: u32,
    /// Opaque digest of the field contents; changes iff a field changed
    pub digest: u64,
}

/// Summary used to detect changes between two contact snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContactSummary {
    pub last_updated: Timestamp,
    pub total_fields: u32,
    pub service_fields: u32,
    pub digest: u64,
}

impl From<&ContactRecord> for ContactSummary {
    fn from(record: &ContactRecord) -> Self {
        Self {
            last_updated: record.last_updated,
            total_fields: record.total_fields,
            service_fields: record.service_fields,
            digest: record.digest,
        }
    }
}

/// Baseline of the contact store as last observed by the version tracker
pub type ContactIndex = BTreeMap<ContactId, ContactSummary>;

/// Field totals across the whole contact store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FieldCounts {
    pub total_fields: u64,
    pub total_service_fields: u64,
    pub total_contacts: u64,
}

impl FieldCounts {
    pub fn from_index(index: &ContactIndex) -> Self {
        index.values().fold(
            Self {
                total_contacts: index.len() as u64,
                ..Self::default()
            },
            |mut acc, summary| {
                acc.total_fields += u64::from(summary.total_fields);
                acc.total_service_fields += u64::from(summary.service_fields);
                acc
            },
        )
    }
}

// ----------------------------------------------------------------------------
// Version Counters
// ----------------------------------------------------------------------------

/// Two-level change version of the local contact store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionCounters {
    /// Advances only on rollover
    pub primary: u64,
    /// Advances on every detected contact-store change
    pub secondary: u64,
    /// Identity of the contact database these counters describe
    pub db_identifier: uuid::Uuid,
    /// Time of the last change reflected in the counters
    pub last_updated: Timestamp,
    pub field_counts: FieldCounts,
}

impl VersionCounters {
    /// Fresh counters for a database that has never been persisted
    pub fn fresh(now: Timestamp) -> Self {
        Self {
            primary: 0,
            secondary: 0,
            db_identifier: uuid::Uuid::new_v4(),
            last_updated: now,
            field_counts: FieldCounts::default(),
        }
    }

    /// Secondary → 0, primary + 1
    pub fn rollover(&mut self) {
        self.primary = self.primary.wrapping_add(1);
        self.secondary = 0;
    }
}

// ----------------------------------------------------------------------------
// Local Identity
// ----------------------------------------------------------------------------

/// Phone number and display name of the local device
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LocalIdentity {
    pub phone_number: Option<String>,
    pub phone_name: String,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_id_display_and_parse() {
        let remote = RemoteId::new([0x00, 0x1A, 0x7D, 0xDA, 0x71, 0x13]);
        assert_eq!(remote.to_string(), "00:1A:7D:DA:71:13");

        let parsed: RemoteId = "00:1a:7d:da:71:13".parse().unwrap();
        assert_eq!(parsed, remote);

        let bare: RemoteId = "001A7DDA7113".parse().unwrap();
        assert_eq!(bare, remote);
    }

    #[test]
    fn test_remote_id_rejects_bad_input() {
        assert!("00:1A:7D".parse::<RemoteId>().is_err());
        assert!("zz:1A:7D:DA:71:13".parse::<RemoteId>().is_err());
    }

    #[test]
    fn test_rollover_resets_secondary() {
        let mut counters = VersionCounters::fresh(Timestamp::new(1_000));
        counters.primary = 4;
        counters.secondary = 17;

        counters.rollover();

        assert_eq!(counters.primary, 5);
        assert_eq!(counters.secondary, 0);
    }

    #[test]
    fn test_field_counts_from_index() {
        let mut index = ContactIndex::new();
        index.insert(
            1,
            ContactSummary {
                last_updated: Timestamp::new(10),
                total_fields: 5,
                service_fields: 3,
                digest: 1,
            },
        );
        index.insert(
            2,
            ContactSummary {
                last_updated: Timestamp::new(20),
                total_fields: 2,
                service_fields: 1,
                digest: 2,
            },
        );

        let counts = FieldCounts::from_index(&index);
        assert_eq!(counts.total_contacts, 2);
        assert_eq!(counts.total_fields, 7);
        assert_eq!(counts.total_service_fields, 4);
    }

    #[test]
    fn test_outcome_admission() {
        assert!(AuthorizationOutcome::Allowed.admits());
        assert!(!AuthorizationOutcome::TimedOut.admits());
    }
}
