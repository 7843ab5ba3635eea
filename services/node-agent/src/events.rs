//! Event recording to the state store.
//!
//! Events are observations, not state: sync correctness never depends on a
//! write landing. Each record is appended under the container's event
//! directory; the store assigns the child index.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use stevedore_manifest::Event;

use crate::store::StateStore;

/// Events are retained for two days.
const EVENT_TTL_SECS: u64 = 60 * 60 * 48;

pub struct EventRecorder {
    store: Arc<dyn StateStore>,
}

impl EventRecorder {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Stamp and append one event under `/events/<container-name>/`.
    pub async fn log_event(&self, event: &Event) -> Result<()> {
        let mut record = event.clone();
        record.timestamp = Utc::now().timestamp();
        let data = serde_json::to_string(&record)?;
        let dir = format!("/events/{}", record.container.name);
        self.store
            .create_in_order(&dir, &data, Some(EVENT_TTL_SECS))
            .await?;
        Ok(())
    }
}
