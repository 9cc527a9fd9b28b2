//! Client core for the campus panic button.
//!
//! A real emergency alert leaves this crate at most once per confirmed
//! user intent: a first press opens a short confirmation window, a second
//! press opens the consent gate, consent starts a countdown that cannot be
//! cancelled, and the countdown ends in exactly one submission. Shells
//! (mobile, web) drive [`PanicButton`] with user input and render
//! [`PanicView`]; the outside world is reached only through the traits in
//! [`capabilities`] and [`backend`].

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod model;
pub mod panic;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use backend::{AlertBackend, HttpAlertBackend};
pub use config::{ConfigError, PanicConfig};
pub use error::{ErrorSeverity, PanicError, Recovery};
pub use model::{
    AccuracyAdvisory, AlertId, AlertRecord, AlertRequest, AlertStatus, BulkAlertStatus,
    Coordinate, LastAlert, LocationReading, PermissionState, StatusUpdate, ValidationError,
};
pub use panic::{
    ButtonPhase, CancelOutcome, LastAlertSummary, PanicButton, PanicDeps, PanicEvent, PanicView,
    PressOutcome, SubmissionOutcome,
};

pub const CONFIRM_WINDOW: Duration = Duration::from_secs(3);
pub const COUNTDOWN_TICKS: u8 = 3;
pub const COUNTDOWN_TICK_INTERVAL: Duration = Duration::from_secs(1);
pub const DEGRADED_ACCURACY_M: f64 = 1000.0;
pub const LOCATION_TIMEOUT: Duration = Duration::from_secs(10);
pub const SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);
pub const READING_MAX_AGE: Duration = Duration::from_secs(120);
pub const LAST_ALERT_KEY: &str = "last_panic_alert";
pub const DEFAULT_ALERT_PATH: &str = "/panic";
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

#[must_use]
pub fn get_current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Explicit timestamp unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnixTimeMs(pub u64);

impl UnixTimeMs {
    #[must_use]
    pub fn now() -> Self {
        Self(get_current_time_ms())
    }

    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn elapsed_since(self, earlier: Self) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

#[must_use]
pub fn format_time_ago(timestamp_ms: u64, now_ms: u64) -> String {
    if timestamp_ms > now_ms {
        // Device clock behind the server's.
        return "Just now".into();
    }

    let diff_secs = now_ms.saturating_sub(timestamp_ms) / 1000;

    if diff_secs < 5 {
        return "Just now".into();
    }
    if diff_secs < 60 {
        return format!("{diff_secs}s ago");
    }

    let diff_mins = diff_secs / 60;
    if diff_mins < 60 {
        return format!("{diff_mins}m ago");
    }

    let diff_hours = diff_mins / 60;
    if diff_hours < 24 {
        return format!("{diff_hours}h ago");
    }

    let diff_days = diff_hours / 24;
    if diff_days < 7 {
        return format!("{diff_days}d ago");
    }
    if diff_days < 30 {
        return format!("{}w ago", diff_days / 7);
    }
    if diff_days < 365 {
        return format!("{}mo ago", diff_days / 30);
    }

    format!("{}y ago", diff_days / 365)
}
