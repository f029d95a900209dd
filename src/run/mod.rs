pub mod outcome;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::api::parser::{extract_field, OUTCOME, TEST_ID};
use crate::api::{DiveCloudApi, ReqwestCaller};
use crate::artifact::ArtifactWriter;
use crate::callback::{CallbackEndpoint, CallbackListener, ListenOutcome};
use crate::config::{AppConfig, RunConfig};
use crate::error::{AppError, Result};
use crate::poll::PollLoop;
use crate::shutdown::until_cancelled;

pub use outcome::{RunOutcome, RunReport};
use outcome::RunTrail;

/// Value of the `outcome` field for a passing test.
pub const PASS: &str = "Pass";

/// How the result of the run is delivered back to us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryMode {
    Webhook(CallbackEndpoint),
    Polling,
}

impl DeliveryMode {
    fn resolve(callback_url: Option<&str>, trail: &mut RunTrail) -> Self {
        trail.info("Checking return URL...");
        let Some(raw) = callback_url else {
            trail.info("No return URL given. Polling DiveCloud for results.");
            return DeliveryMode::Polling;
        };

        match CallbackEndpoint::parse(raw) {
            Ok(endpoint) => {
                trail.info("Return URL OK");
                DeliveryMode::Webhook(endpoint)
            }
            Err(e) => {
                trail.warn(format!(
                    "The return URL given is invalid ({e}). Polling DiveCloud instead."
                ));
                DeliveryMode::Polling
            }
        }
    }
}

/// Map the final payload to a verdict.
pub fn interpret(payload: &str) -> RunOutcome {
    if payload.trim().is_empty() {
        return AppError::NoResult.into();
    }

    match extract_field(payload, OUTCOME) {
        Ok(value) if value == PASS => RunOutcome::Passed,
        Ok(value) => RunOutcome::Failed { reason: value },
        Err(e) => e.into(),
    }
}

/// Wrap a step failure in its step-specific error, leaving cancellations alone.
fn step_failed(wrap: fn(Box<AppError>) -> AppError) -> impl FnOnce(AppError) -> AppError {
    move |e| match e {
        AppError::Cancelled(_) => e,
        other => wrap(Box::new(other)),
    }
}

enum Awaited {
    Payload(String),
    NoCallback,
}

/// Drives one plan run from trigger to verdict.
pub struct RunOrchestrator {
    api: DiveCloudApi,
    run: RunConfig,
    artifact: ArtifactWriter,
}

impl RunOrchestrator {
    pub fn new(api: DiveCloudApi, run: RunConfig, artifact: ArtifactWriter) -> Self {
        Self { api, run, artifact }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let caller = ReqwestCaller::new(Duration::from_secs(config.api.request_timeout_secs))?;
        let api = DiveCloudApi::new(
            Arc::new(caller),
            &config.api.base_url,
            config.api.api_key.clone(),
        );

        Ok(Self::new(
            api,
            config.run.clone(),
            ArtifactWriter::new(config.results_path()),
        ))
    }

    /// Trigger the plan and wait for its verdict. Never panics on I/O faults;
    /// every failure ends up in the returned report.
    pub async fn run(&self, cancel: &CancellationToken) -> RunReport {
        let span = tracing::info_span!("plan_run", plan_id = %self.run.plan_id);
        self.run_inner(cancel).instrument(span).await
    }

    async fn run_inner(&self, cancel: &CancellationToken) -> RunReport {
        let started_at = Utc::now();
        let mut trail = RunTrail::default();

        let mode = DeliveryMode::resolve(self.run.callback_url(), &mut trail);

        let outcome = match self.obtain_result(&mode, &mut trail, cancel).await {
            Ok(Awaited::Payload(payload)) => self.conclude(&payload, &mut trail).await,
            Ok(Awaited::NoCallback) => {
                let reason = "No callback received - timing out. \
                              Please check on your test at DiveCloud"
                    .to_string();
                trail.warn(reason.clone());
                RunOutcome::Unknown { reason }
            }
            Err(e) => {
                trail.error(e.to_string());
                e.into()
            }
        };

        RunReport {
            outcome,
            mode,
            test_id: trail.test_id,
            artifact: trail.artifact,
            started_at,
            finished_at: Utc::now(),
            log: trail.lines,
        }
    }

    async fn obtain_result(
        &self,
        mode: &DeliveryMode,
        trail: &mut RunTrail,
        cancel: &CancellationToken,
    ) -> Result<Awaited> {
        match mode {
            DeliveryMode::Webhook(endpoint) => {
                // Bound before registering so an early callback is queued, not refused
                let listener = CallbackListener::bind(&self.run.listen_host, endpoint.port).await?;

                let callback_url = endpoint.url();
                trail.info(format!("Registering URL: {callback_url}"));
                trail.info(format!("Connecting to...{}", self.api.hooks_url()));
                until_cancelled(
                    cancel,
                    "Registration",
                    self.api.register_hook(&self.run.plan_id, &callback_url),
                )
                .await
                .map_err(step_failed(AppError::RegistrationFailed))?;

                let body = self.trigger(trail, cancel).await?;
                match extract_field(&body, TEST_ID) {
                    Ok(test_id) => {
                        trail.info(format!("Test ID: {test_id}"));
                        trail.test_id = Some(test_id);
                    }
                    Err(e) => trail.warn(format!("Could not get a test ID: {e}")),
                }

                trail.info(format!("Listening on port {}...", endpoint.port));
                match listener.listen(self.run.listen_timeout(), cancel).await? {
                    ListenOutcome::Received(payload) => Ok(Awaited::Payload(payload)),
                    ListenOutcome::TimedOut => Ok(Awaited::NoCallback),
                }
            }
            DeliveryMode::Polling => {
                let body = self.trigger(trail, cancel).await?;
                let test_id = extract_field(&body, TEST_ID).map_err(|e| {
                    AppError::MalformedPayload(format!("Could not get a test ID: {e}"))
                })?;
                trail.info(format!("Test ID: {test_id}"));
                trail.test_id = Some(test_id.clone());

                trail.info(format!(
                    "Polling for results at: {}",
                    self.api.test_instance_url(&test_id)
                ));
                let payload = PollLoop::new(self.run.poll_interval())
                    .run(&self.api, &test_id, cancel)
                    .await?;
                Ok(Awaited::Payload(payload))
            }
        }
    }

    async fn trigger(&self, trail: &mut RunTrail, cancel: &CancellationToken) -> Result<String> {
        trail.info(format!("Triggering: {}", self.api.trigger_url(&self.run.plan_id)));
        until_cancelled(
            cancel,
            "Trigger",
            self.api.trigger_plan(&self.run.plan_id, &self.run.creds_pass),
        )
        .await
        .map_err(step_failed(AppError::TriggerFailed))
    }

    async fn conclude(&self, payload: &str, trail: &mut RunTrail) -> RunOutcome {
        let outcome = interpret(payload);
        match &outcome {
            RunOutcome::Passed => {
                trail.info("DiveCloud test passed");
                match self.artifact.write(payload).await {
                    Ok(path) => {
                        trail.artifact = Some(path);
                        trail.info("Report ready");
                        outcome
                    }
                    Err(e) => {
                        let reason = e.to_string();
                        trail.error(reason.clone());
                        trail.warn(
                            "The DiveCloud test passed but its result could not be saved; \
                             marking the run as failed",
                        );
                        RunOutcome::Failed { reason }
                    }
                }
            }
            RunOutcome::Failed { reason } => {
                trail.warn(format!("DiveCloud test failed: {reason}"));
                outcome
            }
            RunOutcome::Unknown { reason } | RunOutcome::Error { detail: reason, .. } => {
                trail.error(reason.clone());
                outcome
            }
        }
    }
}
