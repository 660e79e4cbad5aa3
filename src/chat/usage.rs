//! Usage recording. Persistence failures are logged and swallowed; a chat
//! response is never failed over telemetry.

use std::sync::Arc;

use tracing::warn;

use crate::store::UserStore;

#[derive(Clone)]
pub struct UsageRecorder {
    store: Arc<UserStore>,
}

impl UsageRecorder {
    pub fn new(store: Arc<UserStore>) -> Self {
        Self { store }
    }

    /// Called exactly once per terminal outcome of a chat request.
    pub async fn record(&self, user_id: &str, key_id: &str, tokens_used: u64, error_increment: u64) {
        if let Err(e) = self
            .store
            .record_usage(user_id, key_id, tokens_used, error_increment)
            .await
        {
            warn!(user_id, key_id, "failed to persist usage stats: {e}");
        }
    }
}
