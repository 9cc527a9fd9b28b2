use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

use crate::model::LocationReading;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("location unavailable: {0}")]
    Unavailable(String),

    #[error("location request timed out")]
    Timeout,
}

/// Device geolocation as seen by the panic core.
///
/// Every method may suspend (OS permission prompt, hardware fix). Failure
/// is reported as an error value, never by panicking, so the caller can
/// fall back to [`LocationProvider::last_reading`].
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn has_permission(&self) -> bool;

    /// Prompt the user; resolves to whether permission was granted.
    async fn request_permission(&self) -> bool;

    async fn current_location(&self) -> Result<LocationReading, LocationError>;

    /// Last reading the platform already holds, possibly stale.
    fn last_reading(&self) -> Option<LocationReading>;
}

/// Remembers the last successful fix of the wrapped provider.
pub struct CachedLocation<P> {
    inner: P,
    last: Mutex<Option<LocationReading>>,
}

impl<P: LocationProvider> CachedLocation<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            last: Mutex::new(None),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    fn remember(&self, reading: LocationReading) {
        if let Ok(mut last) = self.last.lock() {
            *last = Some(reading);
        }
    }
}

#[async_trait]
impl<P: LocationProvider> LocationProvider for CachedLocation<P> {
    async fn has_permission(&self) -> bool {
        self.inner.has_permission().await
    }

    async fn request_permission(&self) -> bool {
        self.inner.request_permission().await
    }

    async fn current_location(&self) -> Result<LocationReading, LocationError> {
        let result = self.inner.current_location().await;
        match &result {
            Ok(reading) => self.remember(*reading),
            Err(e) => debug!("fresh fix failed, cache untouched: {e}"),
        }
        result
    }

    fn last_reading(&self) -> Option<LocationReading> {
        self.last
            .lock()
            .ok()
            .and_then(|last| *last)
            .or_else(|| self.inner.last_reading())
    }
}

#[async_trait]
impl<P: LocationProvider + ?Sized> LocationProvider for Arc<P> {
    async fn has_permission(&self) -> bool {
        (**self).has_permission().await
    }

    async fn request_permission(&self) -> bool {
        (**self).request_permission().await
    }

    async fn current_location(&self) -> Result<LocationReading, LocationError> {
        (**self).current_location().await
    }

    fn last_reading(&self) -> Option<LocationReading> {
        (**self).last_reading()
    }
}
