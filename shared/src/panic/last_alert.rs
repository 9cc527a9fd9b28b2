use std::sync::Arc;

use tracing::debug;

use crate::capabilities::{KeyNamespace, KeyValueStore, KvError, KvKey, TypedKvStore};
use crate::model::LastAlert;

/// The single persisted artifact: the most recent successful alert.
pub(crate) struct LastAlertCache {
    store: TypedKvStore<LastAlert>,
    key: String,
}

impl LastAlertCache {
    pub(crate) fn new(store: Arc<dyn KeyValueStore>, key: &str) -> Result<Self, KvError> {
        KvKey::new(KeyNamespace::Cache, key)?;
        Ok(Self {
            store: TypedKvStore::new(store, KeyNamespace::Cache),
            key: key.to_string(),
        })
    }

    pub(crate) async fn load(&self) -> Result<Option<LastAlert>, KvError> {
        self.store.get(&self.key).await
    }

    /// Overwrites whatever was stored before.
    pub(crate) async fn save(&self, alert: &LastAlert) -> Result<(), KvError> {
        self.store.set(&self.key, alert).await?;
        debug!(alert_id = %alert.id, "last alert cached");
        Ok(())
    }
}
