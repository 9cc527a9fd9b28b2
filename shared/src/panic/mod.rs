//! The panic button state machine.
//!
//! `Idle -> Confirming -> TermsPending -> Counting(n) -> Submitting -> Success | Failed`
//!
//! Timers are [`ScheduledTask`]s owned by the machine; every phase change
//! drops the current one and bumps an epoch so a callback that already
//! fired cannot act on a newer phase. Submission runs as a detached task
//! behind an in-flight latch and is applied only while the button is
//! mounted.

mod guard;
mod last_alert;
mod phase;
mod schedule;
mod view;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::time::{timeout, Instant};
use tracing::{debug, info, instrument, warn};

use crate::backend::AlertBackend;
use crate::capabilities::{CredentialSource, KeyValueStore, KvError, LocationProvider};
use crate::config::{ConfigError, PanicConfig};
use crate::error::PanicError;
use crate::model::{
    AccuracyAdvisory, AlertRecord, AlertRequest, LastAlert, LocationReading, PermissionState,
};
use crate::EVENT_CHANNEL_CAPACITY;

use self::guard::InFlight;
use self::last_alert::LastAlertCache;
use self::schedule::ScheduledTask;
use self::view::ViewInputs;

pub use self::phase::{ButtonPhase, CancelOutcome, PanicEvent, PressOutcome, SubmissionOutcome};
pub use self::view::{LastAlertSummary, PanicView};

/// Collaborators injected into [`PanicButton`].
pub struct PanicDeps {
    pub location: Arc<dyn LocationProvider>,
    pub backend: Arc<dyn AlertBackend>,
    pub credentials: Arc<dyn CredentialSource>,
    pub store: Arc<dyn KeyValueStore>,
}

#[derive(Default)]
struct MachineState {
    phase: ButtonPhase,
    epoch: u64,
    timer: Option<ScheduledTask>,
    confirm_deadline: Option<Instant>,
    permission: PermissionState,
    reading: Option<LocationReading>,
    reading_at: Option<Instant>,
    /// Set while a first press awaits permission or a fix.
    locating_since: Option<Instant>,
    queued_press: bool,
    advisory: AccuracyAdvisory,
    last_alert: Option<LastAlert>,
}

struct Inner {
    config: PanicConfig,
    location: Arc<dyn LocationProvider>,
    backend: Arc<dyn AlertBackend>,
    credentials: Arc<dyn CredentialSource>,
    cache: LastAlertCache,
    state: Mutex<MachineState>,
    in_flight: InFlight,
    mounted: AtomicBool,
    phase_tx: watch::Sender<ButtonPhase>,
    events: broadcast::Sender<PanicEvent>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, MachineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::Acquire)
    }

    /// Every phase change cancels the pending timer and invalidates its epoch.
    fn transition(&self, state: &mut MachineState, next: ButtonPhase) {
        debug!(from = state.phase.name(), to = next.name(), "phase transition");
        state.timer = None;
        state.confirm_deadline = None;
        state.epoch = state.epoch.wrapping_add(1);
        state.phase = next.clone();
        self.phase_tx.send_replace(next);
    }

    fn emit(&self, event: PanicEvent) {
        // No subscribers is not an error.
        self.events.send(event).ok();
    }

    fn schedule(
        self: &Arc<Self>,
        state: &mut MachineState,
        name: &'static str,
        delay: Duration,
        fire: fn(&Arc<Inner>, u64),
    ) {
        let weak: Weak<Inner> = Arc::downgrade(self);
        let epoch = state.epoch;
        state.timer = Some(ScheduledTask::spawn(name, async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                fire(&inner, epoch);
            }
        }));
    }

    fn expire_confirmation(self: &Arc<Self>, epoch: u64) {
        let mut guard = self.state();
        let state = &mut *guard;
        if state.epoch == epoch && state.phase == ButtonPhase::Confirming {
            self.expire(state);
        }
    }

    fn expire(&self, state: &mut MachineState) {
        debug!("confirmation window elapsed");
        self.transition(state, ButtonPhase::Idle);
        self.emit(PanicEvent::ConfirmationExpired);
    }

    fn tick(self: &Arc<Self>, epoch: u64) {
        let mut guard = self.state();
        let state = &mut *guard;
        if state.epoch != epoch {
            return;
        }
        let ButtonPhase::Counting { remaining } = state.phase else {
            return;
        };

        let remaining = remaining.saturating_sub(1);
        self.emit(PanicEvent::CountdownTick { remaining });
        if remaining > 0 {
            self.transition(state, ButtonPhase::Counting { remaining });
            self.schedule(state, "countdown_tick", self.config.tick_interval, Self::tick);
            return;
        }

        self.transition(state, ButtonPhase::Submitting);
        drop(guard);

        // Detached: runs to completion even if the button is unmounted.
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.run_submission().await;
        });
    }

    async fn fresh_fix(&self) -> Option<LocationReading> {
        match timeout(self.config.location_timeout, self.location.current_location()).await {
            Ok(Ok(reading)) => {
                let mut state = self.state();
                state.reading = Some(reading);
                state.reading_at = Some(Instant::now());
                state.advisory =
                    AccuracyAdvisory::assess(Some(&reading), self.config.degraded_accuracy_m);
                Some(reading)
            }
            Ok(Err(e)) => {
                warn!("fresh location fix failed: {e}");
                None
            }
            Err(_) => {
                warn!(
                    timeout_ms = u64::try_from(self.config.location_timeout.as_millis())
                        .unwrap_or(u64::MAX),
                    "fresh location fix timed out"
                );
                None
            }
        }
    }

    #[instrument(skip(self))]
    async fn run_submission(&self) -> SubmissionOutcome {
        let Some(_latch) = self.in_flight.try_acquire() else {
            debug!("submission already in flight");
            return SubmissionOutcome::AlreadyInFlight;
        };
        let result = self.submit_once().await;
        self.finish(result)
    }

    /// Platform cache first, then the fix captured at press while it is
    /// younger than `reading_max_age`.
    fn cached_reading(&self) -> Option<LocationReading> {
        if let Some(reading) = self.location.last_reading().filter(has_coordinate) {
            info!("submitting with platform-cached location");
            return Some(reading);
        }

        let state = self.state();
        let (reading, captured_at) = state.reading.zip(state.reading_at)?;
        let age = captured_at.elapsed();
        let age_ms = u64::try_from(age.as_millis()).unwrap_or(u64::MAX);
        if age > self.config.reading_max_age || !has_coordinate(&reading) {
            debug!(age_ms, "press-time location not reusable");
            return None;
        }
        info!(age_ms, "submitting with location captured at press");
        Some(reading)
    }

    async fn submit_once(&self) -> Result<(AlertRecord, LastAlert), PanicError> {
        let reading = match self.fresh_fix().await.filter(has_coordinate) {
            Some(reading) => reading,
            None => self.cached_reading().ok_or(PanicError::NoLocation)?,
        };

        let request = AlertRequest::from_reading(&reading).map_err(|_| PanicError::NoLocation)?;
        let credential = self
            .credentials
            .bearer_token()
            .await
            .ok_or(PanicError::Unauthenticated)?;

        debug!(
            latitude = request.latitude,
            longitude = request.longitude,
            "submitting alert"
        );
        let record = self.backend.submit(&request, &credential).await?;

        let alert = LastAlert::from_record(&record, reading);
        if let Err(e) = self.cache.save(&alert).await {
            warn!(alert_id = %record.id, "alert sent but last-alert cache write failed: {e}");
        }
        Ok((record, alert))
    }

    fn finish(&self, result: Result<(AlertRecord, LastAlert), PanicError>) -> SubmissionOutcome {
        let mut guard = self.state();
        let state = &mut *guard;

        let (next, event, outcome) = match result {
            Ok((record, alert)) => {
                info!(alert_id = %record.id, status = %record.status, "panic alert sent");
                state.last_alert = Some(alert.clone());
                (
                    ButtonPhase::Success { alert },
                    PanicEvent::AlertSent { id: record.id },
                    SubmissionOutcome::Sent(record),
                )
            }
            Err(error) => {
                warn!(code = error.code(), "panic alert failed: {error}");
                (
                    ButtonPhase::Failed {
                        error: error.clone(),
                    },
                    PanicEvent::AlertFailed {
                        error: error.clone(),
                    },
                    SubmissionOutcome::Failed(error),
                )
            }
        };

        if !self.is_mounted() {
            debug!("button unmounted; submission result not applied");
            return outcome;
        }
        if state.phase == ButtonPhase::Submitting {
            self.transition(state, next);
        }
        self.emit(event);
        outcome
    }
}

fn has_coordinate(reading: &LocationReading) -> bool {
    reading.coordinate().is_ok()
}

/// Controller for one on-screen panic button.
///
/// Must be used from within a Tokio runtime: timers and the submission
/// are spawned tasks. Dropping the button unmounts it.
pub struct PanicButton {
    inner: Arc<Inner>,
}

impl PanicButton {
    pub fn new(config: PanicConfig, deps: PanicDeps) -> Result<Self, ConfigError> {
        config.validate()?;
        let cache = LastAlertCache::new(deps.store, &config.last_alert_key).map_err(|e| {
            ConfigError::Invalid {
                name: "last_alert_key",
                reason: e.to_string(),
            }
        })?;
        let (phase_tx, _) = watch::channel(ButtonPhase::Idle);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                location: deps.location,
                backend: deps.backend,
                credentials: deps.credentials,
                cache,
                state: Mutex::new(MachineState::default()),
                in_flight: InFlight::default(),
                mounted: AtomicBool::new(true),
                phase_tx,
                events,
            }),
        })
    }

    /// Primary user input.
    ///
    /// From `Idle` this checks permission and location, then opens the
    /// confirmation window. A second press inside the window opens the
    /// consent gate; one that lands while the first is still locating is
    /// queued and applied when the fix arrives. Everywhere else it is
    /// ignored.
    #[instrument(skip(self))]
    pub async fn press(&self) -> PressOutcome {
        let inner = &self.inner;
        if !inner.is_mounted() {
            return PressOutcome::Ignored;
        }

        {
            let mut guard = inner.state();
            let state = &mut *guard;
            match state.phase {
                ButtonPhase::Idle => {
                    if let Some(since) = state.locating_since {
                        if state.queued_press || since + inner.config.confirm_window <= Instant::now()
                        {
                            debug!("press ignored: still locating");
                            return PressOutcome::Ignored;
                        }
                        state.queued_press = true;
                        debug!("second press queued while locating");
                        return PressOutcome::Queued;
                    }
                }
                ButtonPhase::Confirming => {
                    if state
                        .confirm_deadline
                        .is_some_and(|deadline| Instant::now() < deadline)
                    {
                        inner.transition(state, ButtonPhase::TermsPending { consent: false });
                        inner.emit(PanicEvent::TermsOpened);
                        return PressOutcome::TermsOpened;
                    }
                    // Window elapsed but the timer has not run yet.
                    inner.expire(state);
                }
                _ => {
                    debug!(phase = state.phase.name(), "press ignored");
                    return PressOutcome::Ignored;
                }
            }
            state.locating_since = Some(Instant::now());
            state.queued_press = false;
        }

        let located = self.locate().await;

        let mut guard = inner.state();
        let state = &mut *guard;
        state.locating_since = None;
        let queued = std::mem::take(&mut state.queued_press);
        let reading = match located {
            Ok(reading) => reading,
            Err(outcome) => return outcome,
        };
        if !state.phase.is_idle() || !inner.is_mounted() {
            return PressOutcome::Ignored;
        }
        state.reading = Some(reading);
        state.reading_at = Some(Instant::now());
        state.advisory = AccuracyAdvisory::assess(Some(&reading), inner.config.degraded_accuracy_m);

        inner.transition(state, ButtonPhase::Confirming);
        state.confirm_deadline = Some(Instant::now() + inner.config.confirm_window);
        inner.schedule(
            state,
            "confirm_window",
            inner.config.confirm_window,
            Inner::expire_confirmation,
        );
        inner.emit(PanicEvent::Confirming);
        if let Some(accuracy_m) = reading
            .usable_accuracy()
            .filter(|_| state.advisory.is_degraded())
        {
            inner.emit(PanicEvent::DegradedAccuracy { accuracy_m });
        }

        if queued {
            inner.transition(state, ButtonPhase::TermsPending { consent: false });
            inner.emit(PanicEvent::TermsOpened);
            return PressOutcome::TermsOpened;
        }
        PressOutcome::Confirming
    }

    /// Permission and a usable fix for a first press. The error is the
    /// press outcome to report.
    async fn locate(&self) -> Result<LocationReading, PressOutcome> {
        let inner = &self.inner;
        if !inner.location.has_permission().await {
            inner.state().permission = PermissionState::Requesting;
            let granted = inner.location.request_permission().await;
            inner.state().permission = PermissionState::from_granted(granted);
            inner.emit(PanicEvent::PermissionPrompted { granted });
            info!(granted, "location permission prompted");
            return Err(PressOutcome::PermissionRequested { granted });
        }
        inner.state().permission = PermissionState::Granted;

        if let Some(reading) = inner.location.last_reading().filter(has_coordinate) {
            return Ok(reading);
        }
        inner.fresh_fix().await.ok_or_else(|| {
            warn!("press refused: no location available");
            PressOutcome::LocationUnavailable
        })
    }

    /// Mirrors the consent checkbox. Returns `false` outside the consent gate.
    pub fn set_consent(&self, checked: bool) -> bool {
        let mut guard = self.inner.state();
        let state = &mut *guard;
        if !matches!(state.phase, ButtonPhase::TermsPending { .. }) {
            return false;
        }
        self.inner
            .transition(state, ButtonPhase::TermsPending { consent: checked });
        true
    }

    /// Starts the countdown. A no-op unless consent is checked.
    pub fn accept(&self) -> bool {
        let inner = &self.inner;
        if !inner.is_mounted() {
            return false;
        }
        let mut guard = inner.state();
        let state = &mut *guard;
        if state.phase != (ButtonPhase::TermsPending { consent: true }) {
            debug!(phase = state.phase.name(), "accept ignored");
            return false;
        }

        let ticks = inner.config.countdown_ticks;
        inner.transition(state, ButtonPhase::Counting { remaining: ticks });
        inner.schedule(state, "countdown_tick", inner.config.tick_interval, Inner::tick);
        inner.emit(PanicEvent::CountdownTick { remaining: ticks });
        info!(ticks, "countdown started");
        true
    }

    pub fn cancel(&self) -> CancelOutcome {
        let mut guard = self.inner.state();
        let state = &mut *guard;
        match state.phase {
            ButtonPhase::Confirming | ButtonPhase::TermsPending { .. } => {
                self.inner.transition(state, ButtonPhase::Idle);
                CancelOutcome::Cancelled
            }
            ButtonPhase::Counting { .. } => {
                debug!("cancel refused: countdown running");
                CancelOutcome::Locked
            }
            _ => CancelOutcome::Ignored,
        }
    }

    /// The countdown's completion path. Reachable twice only through
    /// re-entrancy; the in-flight latch admits a single submission.
    pub(crate) async fn complete_countdown(&self) -> SubmissionOutcome {
        {
            let mut guard = self.inner.state();
            let state = &mut *guard;
            match state.phase {
                ButtonPhase::Counting { .. } => {
                    self.inner.transition(state, ButtonPhase::Submitting);
                }
                ButtonPhase::Submitting => {}
                _ => return SubmissionOutcome::Ignored,
            }
        }
        self.inner.run_submission().await
    }

    /// Leaves `Success` after the user has seen it.
    pub fn acknowledge(&self) -> bool {
        self.reset_if(|phase| matches!(phase, ButtonPhase::Success { .. }))
    }

    /// Leaves `Failed`; the user may press again.
    pub fn dismiss(&self) -> bool {
        self.reset_if(|phase| matches!(phase, ButtonPhase::Failed { .. }))
    }

    fn reset_if(&self, applies: impl FnOnce(&ButtonPhase) -> bool) -> bool {
        let mut guard = self.inner.state();
        let state = &mut *guard;
        if !applies(&state.phase) {
            return false;
        }
        self.inner.transition(state, ButtonPhase::Idle);
        true
    }

    /// Re-prompts for location permission.
    pub async fn retry_permission(&self) -> bool {
        self.inner.state().permission = PermissionState::Requesting;
        let granted = self.inner.location.request_permission().await;
        self.inner.state().permission = PermissionState::from_granted(granted);
        self.inner.emit(PanicEvent::PermissionPrompted { granted });
        granted
    }

    /// Loads the persisted last alert, if any, into the view.
    pub async fn restore_last_alert(&self) -> Result<Option<LastAlert>, KvError> {
        let restored = self.inner.cache.load().await?;
        let mut state = self.inner.state();
        if state.last_alert.is_none() {
            state.last_alert.clone_from(&restored);
        }
        Ok(restored)
    }

    /// Cancels every timer and stops applying results. Idempotent.
    pub fn unmount(&self) {
        if !self.inner.mounted.swap(false, Ordering::AcqRel) {
            return;
        }
        let mut state = self.inner.state();
        state.timer = None;
        state.confirm_deadline = None;
        state.queued_press = false;
        state.epoch = state.epoch.wrapping_add(1);
        debug!(phase = state.phase.name(), "panic button unmounted");
    }

    #[must_use]
    pub fn phase(&self) -> ButtonPhase {
        self.inner.state().phase.clone()
    }

    #[must_use]
    pub fn permission(&self) -> PermissionState {
        self.inner.state().permission
    }

    #[must_use]
    pub fn advisory(&self) -> AccuracyAdvisory {
        self.inner.state().advisory
    }

    #[must_use]
    pub fn last_alert(&self) -> Option<LastAlert> {
        self.inner.state().last_alert.clone()
    }

    #[must_use]
    pub fn is_submitting(&self) -> bool {
        self.inner.in_flight.is_set()
    }

    #[must_use]
    pub fn subscribe_phase(&self) -> watch::Receiver<ButtonPhase> {
        self.inner.phase_tx.subscribe()
    }

    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<PanicEvent> {
        self.inner.events.subscribe()
    }

    #[must_use]
    pub fn view(&self, now_ms: u64) -> PanicView {
        let state = self.inner.state();
        view::build(&ViewInputs {
            phase: &state.phase,
            permission: state.permission,
            advisory: state.advisory,
            reading: state.reading.as_ref(),
            last_alert: state.last_alert.as_ref(),
            now_ms,
        })
    }
}

impl Drop for PanicButton {
    fn drop(&mut self) {
        self.unmount();
    }
}
