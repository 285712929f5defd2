//! Fire-and-forget webhook notices
//!
//! Delivery failures are logged and swallowed; the loop never waits on the
//! network.

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Body posted to the configured webhook when a restriction is imposed
#[derive(Debug, Clone, Serialize)]
pub struct ImposeNotice {
    pub entity_id: String,
    pub reason: String,
    pub duration: String,
    pub offline: bool,
}

/// Post an impose notice in the background.
pub fn send_impose_notice(url: String, notice: ImposeNotice) {
    tokio::spawn(async move {
        let body = match serde_json::to_string(&notice) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Failed to encode impose notice");
                return;
            }
        };

        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "Failed to build webhook client");
                return;
            }
        };

        match client
            .post(&url)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                debug!(status = %response.status(), "Impose notice delivered");
            }
            Ok(response) => {
                warn!(status = %response.status(), "Impose notice rejected");
            }
            Err(e) => {
                warn!(error = %e, "Impose notice failed");
            }
        }
    });
}
