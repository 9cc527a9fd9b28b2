use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::UnixTimeMs;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("invalid coordinate: lat={0}, lng={1}")]
    InvalidCoordinate(f64, f64),
    #[error("invalid accuracy: {0}")]
    InvalidAccuracy(f64),
}

/// A single geolocation fix as reported by the device.
///
/// Accuracy is optional: some platforms report a fix without an error
/// radius, and such a reading is still usable for an alert.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationReading {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_m: Option<f64>,
}

impl LocationReading {
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_m: None,
        }
    }

    #[must_use]
    pub const fn with_accuracy(mut self, accuracy_m: f64) -> Self {
        self.accuracy_m = Some(accuracy_m);
        self
    }

    pub fn coordinate(&self) -> Result<Coordinate, ValidationError> {
        Coordinate::new(self.latitude, self.longitude)
    }

    /// Accuracy only if it is a usable number.
    #[must_use]
    pub fn usable_accuracy(&self) -> Option<f64> {
        self.accuracy_m.filter(|a| a.is_finite() && *a >= 0.0)
    }
}

/// Validated lat/lng: finite and within range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Coordinate {
    lat: f64,
    lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Result<Self, ValidationError> {
        if !lat.is_finite()
            || !lng.is_finite()
            || !(-90.0..=90.0).contains(&lat)
            || !(-180.0..=180.0).contains(&lng)
        {
            return Err(ValidationError::InvalidCoordinate(lat, lng));
        }
        Ok(Self { lat, lng })
    }

    #[must_use]
    pub const fn lat(&self) -> f64 {
        self.lat
    }

    #[must_use]
    pub const fn lng(&self) -> f64 {
        self.lng
    }
}

impl PartialEq for Coordinate {
    fn eq(&self, other: &Self) -> bool {
        self.lat.to_bits() == other.lat.to_bits() && self.lng.to_bits() == other.lng.to_bits()
    }
}

impl Eq for Coordinate {}

/// Body of the alert-creation request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertRequest {
    pub latitude: f64,
    pub longitude: f64,
}

impl AlertRequest {
    #[must_use]
    pub const fn from_coordinate(coordinate: Coordinate) -> Self {
        Self {
            latitude: coordinate.lat(),
            longitude: coordinate.lng(),
        }
    }

    pub fn from_reading(reading: &LocationReading) -> Result<Self, ValidationError> {
        reading.coordinate().map(Self::from_coordinate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(pub i64);

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical alert status.
///
/// The panic endpoints speak `pending/handling/resolved`; the bulk admin
/// endpoints speak `pending/responded/resolved/cancelled`. `responded` is
/// read as [`AlertStatus::Handling`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    #[default]
    Pending,
    #[serde(alias = "responded")]
    Handling,
    Resolved,
    Cancelled,
}

impl AlertStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Handling => "handling",
            Self::Resolved => "resolved",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Cancelled)
    }

    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Pending => "Waiting for a responder",
            Self::Handling => "A responder is on it",
            Self::Resolved => "Resolved",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status vocabulary of the bulk admin endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAlertStatus {
    Pending,
    Responded,
    Resolved,
    Cancelled,
}

impl From<BulkAlertStatus> for AlertStatus {
    fn from(status: BulkAlertStatus) -> Self {
        match status {
            BulkAlertStatus::Pending => Self::Pending,
            BulkAlertStatus::Responded => Self::Handling,
            BulkAlertStatus::Resolved => Self::Resolved,
            BulkAlertStatus::Cancelled => Self::Cancelled,
        }
    }
}

impl From<AlertStatus> for BulkAlertStatus {
    fn from(status: AlertStatus) -> Self {
        match status {
            AlertStatus::Pending => Self::Pending,
            AlertStatus::Handling => Self::Responded,
            AlertStatus::Resolved => Self::Resolved,
            AlertStatus::Cancelled => Self::Cancelled,
        }
    }
}

/// Statuses a volunteer or admin may move an alert into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusUpdate {
    Handling,
    Resolved,
}

impl From<StatusUpdate> for AlertStatus {
    fn from(update: StatusUpdate) -> Self {
        match update {
            StatusUpdate::Handling => Self::Handling,
            StatusUpdate::Resolved => Self::Resolved,
        }
    }
}

/// Alert as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: AlertId,
    pub status: AlertStatus,
    pub created_at: UnixTimeMs,
}

/// Locally cached copy of the most recent successful alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastAlert {
    pub id: AlertId,
    pub status: AlertStatus,
    pub sent_at: UnixTimeMs,
    pub location: LocationReading,
}

impl LastAlert {
    #[must_use]
    pub fn from_record(record: &AlertRecord, location: LocationReading) -> Self {
        Self {
            id: record.id,
            status: record.status,
            sent_at: record.created_at,
            location,
        }
    }
}

/// Advisory only: a degraded fix is surfaced to the user but never blocks
/// an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccuracyAdvisory {
    Good,
    Degraded,
    #[default]
    Unknown,
}

impl AccuracyAdvisory {
    #[must_use]
    pub fn assess(reading: Option<&LocationReading>, degraded_above_m: f64) -> Self {
        match reading.and_then(LocationReading::usable_accuracy) {
            Some(accuracy) if accuracy > degraded_above_m => Self::Degraded,
            Some(_) => Self::Good,
            None => Self::Unknown,
        }
    }

    #[must_use]
    pub const fn is_degraded(self) -> bool {
        matches!(self, Self::Degraded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    #[default]
    Unknown,
    Requesting,
    Granted,
    Denied,
}

impl PermissionState {
    #[must_use]
    pub const fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }

    #[must_use]
    pub const fn from_granted(granted: bool) -> Self {
        if granted {
            Self::Granted
        } else {
            Self::Denied
        }
    }
}
