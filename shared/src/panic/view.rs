use serde::Serialize;

use crate::error::{PanicError, Recovery};
use crate::model::{AccuracyAdvisory, LastAlert, LocationReading, PermissionState};
use crate::panic::ButtonPhase;
use crate::format_time_ago;

/// Everything a shell needs to render the button.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanicView {
    pub phase: ButtonPhase,
    pub headline: String,
    pub detail: Option<String>,
    pub countdown: Option<u8>,
    pub press_enabled: bool,
    pub cancel_enabled: bool,
    pub consent_checked: bool,
    pub accuracy: AccuracyAdvisory,
    pub accuracy_m: Option<f64>,
    pub recovery: Option<Recovery>,
    pub last_alert: Option<LastAlertSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastAlertSummary {
    pub id: i64,
    pub status: String,
    pub sent: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl LastAlertSummary {
    fn new(alert: &LastAlert, now_ms: u64) -> Self {
        Self {
            id: alert.id.0,
            status: alert.status.display_name().to_string(),
            sent: format_time_ago(alert.sent_at.as_millis(), now_ms),
            latitude: alert.location.latitude,
            longitude: alert.location.longitude,
        }
    }
}

pub(crate) struct ViewInputs<'a> {
    pub phase: &'a ButtonPhase,
    pub permission: PermissionState,
    pub advisory: AccuracyAdvisory,
    pub reading: Option<&'a LocationReading>,
    pub last_alert: Option<&'a LastAlert>,
    pub now_ms: u64,
}

const APPROXIMATE: &str = "Your location is approximate. You can still send an alert.";

pub(crate) fn build(inputs: &ViewInputs<'_>) -> PanicView {
    let (headline, mut detail, recovery) = match inputs.phase {
        ButtonPhase::Idle if inputs.permission == PermissionState::Denied => {
            let error = PanicError::PermissionDenied;
            (
                "Location needed".to_string(),
                Some(error.user_facing_message()),
                Some(error.recovery()),
            )
        }
        ButtonPhase::Idle => ("Press for emergency".to_string(), None, None),
        ButtonPhase::Confirming => (
            "Press again to confirm".to_string(),
            Some("Tap the button once more to continue.".to_string()),
            None,
        ),
        ButtonPhase::TermsPending { .. } => (
            "Confirm emergency alert".to_string(),
            Some(
                "Misuse of the panic button may be subject to disciplinary action. \
                 Tick the box to agree before sending."
                    .to_string(),
            ),
            None,
        ),
        ButtonPhase::Counting { remaining } => (
            format!("Sending in {remaining}..."),
            Some("The alert cannot be cancelled.".to_string()),
            None,
        ),
        ButtonPhase::Submitting => ("Sending alert...".to_string(), None, None),
        ButtonPhase::Success { alert } => (
            "Alert sent".to_string(),
            Some(format!(
                "Help is on the way. Alert #{} is {}.",
                alert.id,
                alert.status.display_name().to_lowercase()
            )),
            None,
        ),
        ButtonPhase::Failed { error } => (
            "Alert not sent".to_string(),
            Some(error.user_facing_message()),
            Some(error.recovery()),
        ),
    };

    let pre_submission = matches!(
        inputs.phase,
        ButtonPhase::Idle | ButtonPhase::Confirming | ButtonPhase::TermsPending { .. }
    );
    if pre_submission && inputs.advisory.is_degraded() {
        detail = Some(match detail {
            Some(text) => format!("{text} {APPROXIMATE}"),
            None => APPROXIMATE.to_string(),
        });
    }

    PanicView {
        phase: inputs.phase.clone(),
        headline,
        detail,
        countdown: match inputs.phase {
            ButtonPhase::Counting { remaining } => Some(*remaining),
            _ => None,
        },
        press_enabled: matches!(inputs.phase, ButtonPhase::Idle | ButtonPhase::Confirming),
        cancel_enabled: inputs.phase.is_cancellable(),
        consent_checked: matches!(inputs.phase, ButtonPhase::TermsPending { consent: true }),
        accuracy: inputs.advisory,
        accuracy_m: inputs.reading.and_then(LocationReading::usable_accuracy),
        recovery,
        last_alert: inputs
            .last_alert
            .map(|alert| LastAlertSummary::new(alert, inputs.now_ms)),
    }
}
