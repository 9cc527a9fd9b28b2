//! Client for the campus alert endpoints.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::capabilities::{HttpError, HttpRequest, HttpResult, HttpTransport, ValidatedUrl};
use crate::config::{ConfigError, PanicConfig};
use crate::error::PanicError;
use crate::model::{AlertId, AlertRecord, AlertRequest, AlertStatus, StatusUpdate};
use crate::UnixTimeMs;

/// Remote endpoint that records alerts.
///
/// Callers issue at most one `submit` per confirmed user intent; the
/// server is not assumed to deduplicate.
#[async_trait]
pub trait AlertBackend: Send + Sync {
    async fn submit(
        &self,
        request: &AlertRequest,
        credential: &SecretString,
    ) -> Result<AlertRecord, PanicError>;

    /// Volunteer/admin surfaces move an alert to `handling` or `resolved`.
    async fn update_status(
        &self,
        id: AlertId,
        update: StatusUpdate,
        notes: Option<&str>,
        credential: &SecretString,
    ) -> Result<AlertRecord, PanicError>;
}

#[derive(Debug, Deserialize)]
struct PanicEnvelope {
    #[serde(default)]
    message: Option<String>,
    panic: Option<WirePanic>,
}

#[derive(Debug, Deserialize)]
struct WirePanic {
    id: i64,
    status: AlertStatus,
    #[serde(default, alias = "createdAt")]
    created_at: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct StatusUpdateBody<'a> {
    status: StatusUpdate,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
}

pub struct HttpAlertBackend {
    transport: Arc<dyn HttpTransport>,
    alert_url: String,
    timeout: Duration,
    allow_private_hosts: bool,
}

impl HttpAlertBackend {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &PanicConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            transport,
            alert_url: config.alert_url(),
            timeout: config.request_timeout,
            allow_private_hosts: config.allow_private_hosts,
        })
    }

    fn url(&self, suffix: &str) -> Result<ValidatedUrl, PanicError> {
        ValidatedUrl::with_policy(format!("{}{suffix}", self.alert_url), self.allow_private_hosts)
            .map_err(request_error)
    }

    fn authorize(
        &self,
        request: HttpRequest,
        credential: &SecretString,
    ) -> Result<HttpRequest, PanicError> {
        request
            .with_timeout(self.timeout)
            .and_then(|r| r.with_header("Accept", "application/json"))
            .and_then(|r| {
                r.with_header(
                    "Authorization",
                    format!("Bearer {}", credential.expose_secret()),
                )
            })
            .map_err(request_error)
    }
}

#[async_trait]
impl AlertBackend for HttpAlertBackend {
    #[instrument(skip_all)]
    async fn submit(
        &self,
        request: &AlertRequest,
        credential: &SecretString,
    ) -> Result<AlertRecord, PanicError> {
        let http = self
            .authorize(HttpRequest::post(self.url("")?), credential)?
            .with_json(request)
            .map_err(request_error)?;
        let request_id = http.request_id().to_string();

        let record = interpret(self.transport.execute(http).await)?;
        info!(%request_id, alert_id = %record.id, status = %record.status, "alert created");
        Ok(record)
    }

    #[instrument(skip(self, notes, credential))]
    async fn update_status(
        &self,
        id: AlertId,
        update: StatusUpdate,
        notes: Option<&str>,
        credential: &SecretString,
    ) -> Result<AlertRecord, PanicError> {
        let http = self
            .authorize(HttpRequest::put(self.url(&format!("/{id}/status"))?), credential)?
            .with_json(&StatusUpdateBody {
                status: update,
                notes,
            })
            .map_err(request_error)?;

        let record = interpret(self.transport.execute(http).await)?;
        info!(alert_id = %record.id, status = %record.status, "alert status updated");
        Ok(record)
    }
}

fn request_error(error: HttpError) -> PanicError {
    warn!("could not build alert request: {error}");
    PanicError::network(format!("could not build request: {error}"))
}

/// Maps a transport result onto the client error taxonomy.
fn interpret(result: HttpResult) -> Result<AlertRecord, PanicError> {
    let response = match result {
        Ok(response) => response,
        Err(HttpError::InvalidResponse { reason, .. }) => {
            return Err(PanicError::invalid_response(reason));
        }
        Err(e) => {
            warn!("alert transport failure: {e}");
            return Err(PanicError::network(e.to_string()));
        }
    };

    if response.status() == 401 {
        warn!(request_id = %response.request_id(), "alert rejected: session expired");
        return Err(PanicError::Unauthenticated);
    }

    if !response.is_success() {
        let message = response
            .json::<ApiErrorBody>()
            .ok()
            .and_then(|body| body.message);
        warn!(
            request_id = %response.request_id(),
            status = response.status(),
            "alert rejected: {}",
            message.as_deref().unwrap_or("<no message>")
        );
        return Err(PanicError::server(response.status(), message));
    }

    let envelope: PanicEnvelope = response
        .json()
        .map_err(|e| PanicError::invalid_response(e.to_string()))?;
    let Some(panic) = envelope.panic else {
        return Err(PanicError::invalid_response(format!(
            "response has no alert record (message: {})",
            envelope.message.as_deref().unwrap_or("<none>")
        )));
    };

    // Epoch milliseconds are kept; any other timestamp shape is stamped on receipt.
    let created_at = panic
        .created_at
        .as_ref()
        .and_then(serde_json::Value::as_u64)
        .map_or_else(UnixTimeMs::now, UnixTimeMs);

    Ok(AlertRecord {
        id: AlertId(panic.id),
        status: panic.status,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{HttpHeaders, HttpMethod, HttpResponse};
    use serde_json::json;
    use std::sync::Mutex;

    struct CannedTransport {
        reply: Mutex<Option<HttpResult>>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl CannedTransport {
        fn replying(reply: HttpResult) -> Arc<Self> {
            Arc::new(Self {
                reply: Mutex::new(Some(reply)),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl HttpTransport for CannedTransport {
        async fn execute(&self, request: HttpRequest) -> HttpResult {
            self.seen.lock().unwrap().push(request);
            self.reply
                .lock()
                .unwrap()
                .take()
                .expect("transport called more than once")
        }
    }

    fn backend(transport: Arc<CannedTransport>) -> HttpAlertBackend {
        HttpAlertBackend::new(transport, &PanicConfig::default()).unwrap()
    }

    fn token() -> SecretString {
        SecretString::new("jwt-123".into())
    }

    fn request() -> AlertRequest {
        AlertRequest {
            latitude: -7.05,
            longitude: 110.43,
        }
    }

    #[tokio::test]
    async fn submit_posts_coordinates_with_bearer() {
        let transport = CannedTransport::replying(Ok(HttpResponse::json_body(
            201,
            &json!({ "message": "Panic sent", "panic": { "id": 42, "status": "pending" } }),
        )));
        let record = backend(transport.clone())
            .submit(&request(), &token())
            .await
            .unwrap();

        assert_eq!(record.id, AlertId(42));
        assert_eq!(record.status, AlertStatus::Pending);

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let sent = &seen[0];
        assert_eq!(sent.method(), HttpMethod::Post);
        assert_eq!(sent.url().as_str(), "https://api.example.edu/api/panic");
        assert_eq!(sent.header("authorization"), Some("Bearer jwt-123"));
        let body: serde_json::Value = serde_json::from_slice(sent.body().unwrap()).unwrap();
        assert_eq!(body, json!({ "latitude": -7.05, "longitude": 110.43 }));
    }

    #[tokio::test]
    async fn numeric_created_at_is_kept() {
        let transport = CannedTransport::replying(Ok(HttpResponse::json_body(
            201,
            &json!({ "panic": { "id": 7, "status": "pending", "createdAt": 1_700_000_000_000u64 } }),
        )));
        let record = backend(transport).submit(&request(), &token()).await.unwrap();
        assert_eq!(record.created_at, UnixTimeMs(1_700_000_000_000));
    }

    #[tokio::test]
    async fn status_401_is_unauthenticated() {
        let transport = CannedTransport::replying(Ok(HttpResponse::json_body(
            401,
            &json!({ "message": "Token expired" }),
        )));
        let err = backend(transport).submit(&request(), &token()).await.unwrap_err();
        assert_eq!(err, PanicError::Unauthenticated);
    }

    #[tokio::test]
    async fn status_500_is_server_error() {
        let transport = CannedTransport::replying(Ok(HttpResponse::json_body(
            500,
            &json!({ "message": "Database unavailable" }),
        )));
        let err = backend(transport).submit(&request(), &token()).await.unwrap_err();
        assert_eq!(
            err,
            PanicError::server(500, Some("Database unavailable".into()))
        );
    }

    #[tokio::test]
    async fn other_rejections_carry_backend_message() {
        let transport = CannedTransport::replying(Ok(HttpResponse::json_body(
            422,
            &json!({ "message": "Invalid coordinates" }),
        )));
        let err = backend(transport).submit(&request(), &token()).await.unwrap_err();
        assert!(matches!(err, PanicError::ServerError { status: 422, message: Some(ref m) } if m == "Invalid coordinates"));
    }

    #[tokio::test]
    async fn non_json_success_is_invalid_response() {
        let transport = CannedTransport::replying(Ok(HttpResponse::new(
            200,
            HttpHeaders::new(),
            b"<html>gateway</html>".to_vec(),
            "req".into(),
            3,
        )));
        let err = backend(transport).submit(&request(), &token()).await.unwrap_err();
        assert!(matches!(err, PanicError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn missing_panic_object_is_invalid_response() {
        let transport = CannedTransport::replying(Ok(HttpResponse::json_body(
            201,
            &json!({ "message": "ok" }),
        )));
        let err = backend(transport).submit(&request(), &token()).await.unwrap_err();
        assert!(matches!(err, PanicError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn transport_failure_is_network_error() {
        let transport = CannedTransport::replying(Err(HttpError::ConnectionError {
            host: "api.example.edu".into(),
            message: "connection refused".into(),
        }));
        let err = backend(transport).submit(&request(), &token()).await.unwrap_err();
        assert!(matches!(err, PanicError::NetworkError { .. }));
    }

    #[tokio::test]
    async fn update_status_puts_to_status_path() {
        let transport = CannedTransport::replying(Ok(HttpResponse::json_body(
            200,
            &json!({ "message": "updated", "panic": { "id": 42, "status": "handling" } }),
        )));
        let record = backend(transport.clone())
            .update_status(AlertId(42), StatusUpdate::Handling, Some("On my way"), &token())
            .await
            .unwrap();
        assert_eq!(record.status, AlertStatus::Handling);

        let seen = transport.seen.lock().unwrap();
        let sent = &seen[0];
        assert_eq!(sent.method(), HttpMethod::Put);
        assert_eq!(sent.url().as_str(), "https://api.example.edu/api/panic/42/status");
        let body: serde_json::Value = serde_json::from_slice(sent.body().unwrap()).unwrap();
        assert_eq!(body, json!({ "status": "handling", "notes": "On my way" }));
    }

    #[tokio::test]
    async fn update_status_omits_empty_notes() {
        let transport = CannedTransport::replying(Ok(HttpResponse::json_body(
            200,
            &json!({ "panic": { "id": 3, "status": "resolved" } }),
        )));
        backend(transport.clone())
            .update_status(AlertId(3), StatusUpdate::Resolved, None, &token())
            .await
            .unwrap();

        let seen = transport.seen.lock().unwrap();
        let body: serde_json::Value = serde_json::from_slice(seen[0].body().unwrap()).unwrap();
        assert_eq!(body, json!({ "status": "resolved" }));
    }
}
