use serde::Serialize;

use crate::error::PanicError;
use crate::model::{AlertId, AlertRecord, LastAlert};

/// Where the button currently is in the alert lifecycle.
///
/// Only one of these is ever live, so combinations like "confirming while
/// sending" cannot be represented.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ButtonPhase {
    #[default]
    Idle,
    /// First press registered; a second press inside the window escalates.
    Confirming,
    /// Consent gate is open; `consent` mirrors the checkbox.
    TermsPending { consent: bool },
    /// Countdown running; cannot be cancelled.
    Counting { remaining: u8 },
    Submitting,
    Success { alert: LastAlert },
    Failed { error: PanicError },
}

impl ButtonPhase {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Confirming => "confirming",
            Self::TermsPending { .. } => "terms_pending",
            Self::Counting { .. } => "counting",
            Self::Submitting => "submitting",
            Self::Success { .. } => "success",
            Self::Failed { .. } => "failed",
        }
    }

    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Success or failure: waiting for the user to acknowledge.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::Failed { .. })
    }

    #[must_use]
    pub const fn is_cancellable(&self) -> bool {
        matches!(self, Self::Confirming | Self::TermsPending { .. })
    }
}

/// Notifications for the shell (haptics, toasts, analytics).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PanicEvent {
    PermissionPrompted { granted: bool },
    Confirming,
    ConfirmationExpired,
    TermsOpened,
    CountdownTick { remaining: u8 },
    DegradedAccuracy { accuracy_m: f64 },
    AlertSent { id: AlertId },
    AlertFailed { error: PanicError },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressOutcome {
    /// Permission was missing; the user was prompted and the phase is unchanged.
    PermissionRequested { granted: bool },
    /// No cached or fresh fix; the phase is unchanged.
    LocationUnavailable,
    Confirming,
    /// Arrived while the first press was still locating; counts as the
    /// confirming press once the fix lands.
    Queued,
    TermsOpened,
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// The countdown has started.
    Locked,
    Ignored,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionOutcome {
    Sent(AlertRecord),
    Failed(PanicError),
    /// Another submission holds the in-flight latch; nothing was done.
    AlreadyInFlight,
    /// Not in a phase that submits.
    Ignored,
}

impl SubmissionOutcome {
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        matches!(self, Self::Sent(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_pre_countdown_phases_cancel() {
        assert!(ButtonPhase::Confirming.is_cancellable());
        assert!(ButtonPhase::TermsPending { consent: true }.is_cancellable());
        assert!(!ButtonPhase::Counting { remaining: 2 }.is_cancellable());
        assert!(!ButtonPhase::Submitting.is_cancellable());
        assert!(!ButtonPhase::Idle.is_cancellable());
    }

    #[test]
    fn phase_serializes_with_tag() {
        let json = serde_json::to_value(ButtonPhase::Counting { remaining: 2 }).unwrap();
        assert_eq!(json, json!({ "phase": "counting", "remaining": 2 }));

        let json = serde_json::to_value(ButtonPhase::Failed {
            error: PanicError::NoLocation,
        })
        .unwrap();
        assert_eq!(
            json,
            json!({ "phase": "failed", "error": { "kind": "no_location" } })
        );
    }
}
