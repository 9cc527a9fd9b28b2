//! Seams between the panic core and the platform.
//!
//! Each capability is a trait the shell (or a test) implements; the core
//! never touches a socket, a GPS chip or local storage directly.

mod credentials;
mod http;
mod kv;
mod location;

pub use self::credentials::{CredentialSource, SessionCredentials};
pub use self::http::{
    HttpError, HttpHeaders, HttpMethod, HttpRequest, HttpResponse, HttpResult, HttpTransport,
    ValidatedUrl, MAX_TIMEOUT_MS,
};
pub use self::kv::{
    KeyNamespace, KeyValueStore, KvError, KvKey, MemoryKvStore, TypedKvStore, MAX_VALUE_SIZE,
};
pub use self::location::{CachedLocation, LocationError, LocationProvider};

#[cfg(feature = "native-http")]
pub use self::http::ReqwestTransport;

#[cfg(not(target_arch = "wasm32"))]
pub use self::kv::SqliteKvStore;

