use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::api::parser::{extract_field, STATUS};
use crate::api::DiveCloudApi;
use crate::error::Result;
use crate::shutdown::until_cancelled;

/// Status DiveCloud reports once a test instance has finished and mailed its report.
pub const TERMINAL_STATUS: &str = "Emailed";

/// Polls a test instance until it reaches [`TERMINAL_STATUS`].
pub struct PollLoop {
    interval: Duration,
}

impl PollLoop {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Returns the full payload of the first poll reporting the terminal
    /// status. Any failed request or unreadable status ends the loop.
    pub async fn run(
        &self,
        api: &DiveCloudApi,
        test_id: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        tracing::info!(
            url = %api.test_instance_url(test_id),
            interval_secs = self.interval.as_secs(),
            "Polling for results"
        );

        let mut attempt = 0u32;
        loop {
            attempt += 1;

            let payload = until_cancelled(cancel, "Polling", api.test_instance(test_id)).await?;
            let status = extract_field(&payload, STATUS)?;

            tracing::debug!(attempt, status = %status, "Polled test instance");

            if status == TERMINAL_STATUS {
                tracing::info!(attempt, "Test instance finished");
                return Ok(payload);
            }

            until_cancelled(cancel, "Polling", async {
                tokio::time::sleep(self.interval).await;
                Ok(())
            })
            .await?;
        }
    }
}
