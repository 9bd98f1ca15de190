//! Core types for request records.

use crate::kind::RequestKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Opaque identifier of a request record (assigned by the store).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn new(id: impl Into<String>) -> Self {
        RequestId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({})", self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of the user who owns a request.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or_default();
        Timestamp(micros)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Remote status of a request record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Arrived,
    Started,
    Completed,
    Cancelled,
}

const VALID_TRANSITIONS: &[(RequestStatus, RequestStatus)] = &[
    (RequestStatus::Pending, RequestStatus::Accepted),
    (RequestStatus::Pending, RequestStatus::Cancelled),
    (RequestStatus::Accepted, RequestStatus::Arrived),
    (RequestStatus::Accepted, RequestStatus::Cancelled),
    (RequestStatus::Arrived, RequestStatus::Started),
    (RequestStatus::Arrived, RequestStatus::Cancelled),
    (RequestStatus::Started, RequestStatus::Completed),
    (RequestStatus::Started, RequestStatus::Cancelled),
];

impl RequestStatus {
    pub const ALL: [RequestStatus; 6] = [
        RequestStatus::Pending,
        RequestStatus::Accepted,
        RequestStatus::Arrived,
        RequestStatus::Started,
        RequestStatus::Completed,
        RequestStatus::Cancelled,
    ];

    /// `completed` and `cancelled` accept no further writes.
    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Cancelled)
    }

    /// Whether a record may move from `self` to `next`. Rewriting the
    /// current status is allowed and has no effect.
    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        self == next || VALID_TRANSITIONS.contains(&(self, next))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Arrived => "arrived",
            RequestStatus::Started => "started",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pickup point, destination or intermediate stop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub address: String,
    pub lat: f64,
    pub lng: f64,
}

impl Place {
    pub fn new(address: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            address: address.into(),
            lat,
            lng,
        }
    }
}

/// A single request record as stored in the shared collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    /// Unique identifier (assigned by store).
    pub id: RequestId,

    /// Request kind tag plus kind-specific fields.
    #[serde(flatten)]
    pub kind: RequestKind,

    pub status: RequestStatus,

    pub pickup: Place,

    pub destination: Place,

    /// Intermediate waypoints, in travel order.
    #[serde(default)]
    pub stops: Vec<Place>,

    pub vehicle_or_mode: String,

    pub price: f64,

    pub user_id: UserId,

    pub user_name: String,

    /// Set by the remote side once a driver claims the request.
    #[serde(default)]
    pub driver_id: Option<String>,

    pub created_at: Timestamp,
}

impl RequestRecord {
    /// A driver has claimed the request and moved it to `accepted`.
    ///
    /// A status flip without driver attribution does not count.
    pub fn is_accepted(&self) -> bool {
        self.driver_id.is_some() && self.status == RequestStatus::Accepted
    }
}

/// Acceptance predicate over a possibly absent snapshot.
pub fn is_accepted(record: Option<&RequestRecord>) -> bool {
    record.is_some_and(RequestRecord::is_accepted)
}

/// Input for creating a new record (before id/status assigned).
#[derive(Clone, Debug, PartialEq)]
pub struct RequestInput {
    pub kind: RequestKind,
    pub pickup: Place,
    pub destination: Place,
    pub stops: Vec<Place>,
    pub vehicle_or_mode: String,
    pub price: f64,
    pub user_id: UserId,
    pub user_name: String,
}

impl RequestInput {
    /// Materialize a pending record under an assigned id.
    pub fn into_record(self, id: RequestId, created_at: Timestamp) -> RequestRecord {
        RequestRecord {
            id,
            kind: self.kind,
            status: RequestStatus::Pending,
            pickup: self.pickup,
            destination: self.destination,
            stops: self.stops,
            vehicle_or_mode: self.vehicle_or_mode,
            price: self.price,
            user_id: self.user_id,
            user_name: self.user_name,
            driver_id: None,
            created_at,
        }
    }
}

/// Atomic write from the dispatch side: status and driver attribution land
/// together or not at all.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DispatchUpdate {
    pub status: Option<RequestStatus>,
    pub driver_id: Option<String>,
}

impl DispatchUpdate {
    /// Driver claims the request.
    pub fn accept(driver_id: impl Into<String>) -> Self {
        Self {
            status: Some(RequestStatus::Accepted),
            driver_id: Some(driver_id.into()),
        }
    }

    /// Status change only.
    pub fn status(status: RequestStatus) -> Self {
        Self {
            status: Some(status),
            driver_id: None,
        }
    }
}
