#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::broadcast;

use panic_shared::capabilities::{
    HttpRequest, HttpResponse, HttpResult, HttpTransport, LocationError, LocationProvider,
    MemoryKvStore, SessionCredentials,
};
use panic_shared::{
    ButtonPhase, HttpAlertBackend, LocationReading, PanicButton, PanicConfig, PanicDeps,
    PanicEvent,
};

pub const TOKEN: &str = "test-jwt";

#[derive(Debug, Clone, Copy)]
pub enum FreshFix {
    Reading(LocationReading),
    /// Succeeds after the given delay.
    Slow(LocationReading, Duration),
    Fails,
    Hangs,
}

pub struct FakeLocation {
    permitted: AtomicBool,
    grant_on_request: bool,
    fresh: Mutex<FreshFix>,
    last: Mutex<Option<LocationReading>>,
    permission_requests: AtomicUsize,
}

impl FakeLocation {
    /// Permission granted, fresh fixes succeed, the platform holds `reading`.
    pub fn granted(reading: LocationReading) -> Self {
        Self {
            permitted: AtomicBool::new(true),
            grant_on_request: true,
            fresh: Mutex::new(FreshFix::Reading(reading)),
            last: Mutex::new(Some(reading)),
            permission_requests: AtomicUsize::new(0),
        }
    }

    pub fn denied() -> Self {
        Self {
            permitted: AtomicBool::new(false),
            grant_on_request: false,
            fresh: Mutex::new(FreshFix::Fails),
            last: Mutex::new(None),
            permission_requests: AtomicUsize::new(0),
        }
    }

    pub fn with_fresh(self, fresh: FreshFix) -> Self {
        *self.fresh.lock().unwrap() = fresh;
        self
    }

    pub fn with_last(self, last: Option<LocationReading>) -> Self {
        *self.last.lock().unwrap() = last;
        self
    }

    /// Both fresh and cached fixes fail from now on.
    pub fn lose_signal(&self) {
        *self.fresh.lock().unwrap() = FreshFix::Fails;
        *self.last.lock().unwrap() = None;
    }

    pub fn permission_requests(&self) -> usize {
        self.permission_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationProvider for FakeLocation {
    async fn has_permission(&self) -> bool {
        self.permitted.load(Ordering::SeqCst)
    }

    async fn request_permission(&self) -> bool {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        self.permitted.store(self.grant_on_request, Ordering::SeqCst);
        self.grant_on_request
    }

    async fn current_location(&self) -> Result<LocationReading, LocationError> {
        let fresh = *self.fresh.lock().unwrap();
        match fresh {
            FreshFix::Reading(reading) => Ok(reading),
            FreshFix::Slow(reading, delay) => {
                tokio::time::sleep(delay).await;
                Ok(reading)
            }
            FreshFix::Fails => Err(LocationError::Unavailable("no satellites".into())),
            FreshFix::Hangs => std::future::pending().await,
        }
    }

    fn last_reading(&self) -> Option<LocationReading> {
        *self.last.lock().unwrap()
    }
}

pub struct RecordingTransport {
    reply: HttpResult,
    delay: Option<Duration>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl RecordingTransport {
    pub fn replying(reply: HttpResult) -> Arc<Self> {
        Arc::new(Self {
            reply,
            delay: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn delayed(reply: HttpResult, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply,
            delay: Some(delay),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for RecordingTransport {
    async fn execute(&self, request: HttpRequest) -> HttpResult {
        self.requests.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply.clone()
    }
}

pub fn created(id: i64) -> HttpResult {
    Ok(HttpResponse::json_body(
        201,
        &json!({ "message": "Panic alert sent", "panic": { "id": id, "status": "pending" } }),
    ))
}

pub fn reading(latitude: f64, longitude: f64, accuracy_m: f64) -> LocationReading {
    LocationReading::new(latitude, longitude).with_accuracy(accuracy_m)
}

pub struct Harness {
    pub button: PanicButton,
    pub location: Arc<FakeLocation>,
    pub transport: Arc<RecordingTransport>,
    pub store: Arc<MemoryKvStore>,
    pub credentials: Arc<SessionCredentials>,
}

pub fn harness(location: FakeLocation, transport: Arc<RecordingTransport>) -> Harness {
    harness_with_store(location, transport, Arc::new(MemoryKvStore::new()))
}

pub fn harness_with_store(
    location: FakeLocation,
    transport: Arc<RecordingTransport>,
    store: Arc<MemoryKvStore>,
) -> Harness {
    let location = Arc::new(location);
    let credentials = Arc::new(SessionCredentials::signed_in(TOKEN));
    let config = PanicConfig::default();
    let backend = HttpAlertBackend::new(transport.clone(), &config).expect("default config");

    let button = PanicButton::new(
        config,
        PanicDeps {
            location: location.clone(),
            backend: Arc::new(backend),
            credentials: credentials.clone(),
            store: store.clone(),
        },
    )
    .expect("default config");

    Harness {
        button,
        location,
        transport,
        store,
        credentials,
    }
}

/// Two presses, consent, accept.
pub async fn start_countdown(button: &PanicButton) {
    assert!(matches!(
        button.press().await,
        panic_shared::PressOutcome::Confirming
    ));
    assert!(matches!(
        button.press().await,
        panic_shared::PressOutcome::TermsOpened
    ));
    assert!(button.set_consent(true));
    assert!(button.accept());
}

/// Waits (on the paused clock) until the submission has been applied.
pub async fn terminal(button: &PanicButton) -> ButtonPhase {
    let mut phase = button.subscribe_phase();
    let current = phase
        .wait_for(ButtonPhase::is_terminal)
        .await
        .expect("phase channel closed");
    (*current).clone()
}

pub fn drain(events: &mut broadcast::Receiver<PanicEvent>) -> Vec<PanicEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}
