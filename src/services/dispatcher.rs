use crate::adapters::feedback::FeedbackNotifier;
use crate::adapters::push::{ApnsNotification, ApnsResponse, PushClient, PushError};
use crate::adapters::stats::CounterStore;
use crate::config::LogConfig;
use crate::domain::{Classification, DispatchOutcome, LogPushEntry, Platform, PushStatus};
use crate::services::limiter::ConcurrencyLimiter;
use futures::future::join_all;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::Instrument;

#[derive(Clone)]
pub(crate) struct Metrics {
    pub(crate) sent_total: Counter<u64>,
    pub(crate) errors_total: Counter<u64>,
    pub(crate) retries_total: Counter<u64>,
}

impl Metrics {
    #[must_use]
    pub(crate) fn new() -> Self {
        let meter = global::meter("apns-dispatch");
        Self {
            sent_total: meter
                .u64_counter("push_sent_total")
                .with_description("Total notifications accepted by the provider")
                .build(),
            errors_total: meter
                .u64_counter("push_errors_total")
                .with_description("Total failed notification attempts")
                .build(),
            retries_total: meter
                .u64_counter("push_retries_total")
                .with_description("Total tokens re-driven in a retry round")
                .build(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

/// Per-round inputs shared by every worker of the round.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub round: u32,
    /// Message text recorded in log entries.
    pub message: String,
    /// Collect failure entries for the caller instead of posting them to the webhook.
    pub sync: bool,
}

/// Everything one round produced, in token order.
#[derive(Debug, Default)]
pub struct RoundReport {
    pub outcomes: Vec<DispatchOutcome>,
    /// Failure entries buffered for a synchronous caller.
    pub failures: Vec<LogPushEntry>,
}

impl RoundReport {
    /// Tokens whose attempt failed retryably, in submission order.
    #[must_use]
    pub fn retry_tokens(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| o.classification == Classification::RetryableFailure)
            .map(|o| o.token.clone())
            .collect()
    }

    #[must_use]
    pub fn count(&self, classification: Classification) -> usize {
        self.outcomes.iter().filter(|o| o.classification == classification).count()
    }
}

/// Fans a token list out to one worker per token and joins them.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    store: Arc<dyn CounterStore>,
    feedback: Option<FeedbackNotifier>,
    pending_feedback: Arc<Mutex<JoinSet<()>>>,
    log: LogConfig,
    metrics: Metrics,
}

impl Dispatcher {
    #[must_use]
    pub fn new(store: Arc<dyn CounterStore>, feedback: Option<FeedbackNotifier>, log: LogConfig) -> Self {
        Self { store, feedback, pending_feedback: Arc::default(), log, metrics: Metrics::new() }
    }

    /// Waits up to `timeout` for feedback calls still in flight. Calls that
    /// have not finished by then are aborted. Returns how many were aborted.
    pub async fn drain_feedback(&self, timeout: Duration) -> usize {
        let mut pending = std::mem::take(&mut *self.pending_feedback.lock().unwrap_or_else(PoisonError::into_inner));
        if pending.is_empty() {
            return 0;
        }

        tracing::debug!(pending = pending.len(), "Waiting for feedback calls");
        let drained = tokio::time::timeout(timeout, async {
            while pending.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            let aborted = pending.len();
            tracing::warn!(aborted, "Timeout waiting for feedback calls to finish");
            pending.shutdown().await;
            return aborted;
        }
        0
    }

    pub(crate) fn record_retries(&self, tokens: usize) {
        self.metrics.retries_total.add(u64::try_from(tokens).unwrap_or(u64::MAX), &[]);
    }

    /// Runs one round. Returns once every worker has finished.
    #[tracing::instrument(skip_all, fields(round = ctx.round, tokens = tokens.len()))]
    pub async fn dispatch(
        &self,
        template: &ApnsNotification,
        tokens: &[String],
        client: &Arc<dyn PushClient>,
        limiter: &ConcurrencyLimiter,
        ctx: &DispatchContext,
    ) -> RoundReport {
        let handles: Vec<_> = tokens
            .iter()
            .map(|token| {
                // Each worker owns its copy of the notification.
                let mut notification = template.clone();
                notification.device_token.clone_from(token);

                let worker = self.clone();
                let client = Arc::clone(client);
                let limiter = limiter.clone();
                let ctx = ctx.clone();
                tokio::spawn(
                    async move { worker.attempt(notification, client, limiter, ctx).await }
                        .instrument(tracing::debug_span!("dispatch_push")),
                )
            })
            .collect();

        let mut report = RoundReport::default();
        for (token, joined) in tokens.iter().zip(join_all(handles).await) {
            match joined {
                Ok((outcome, failure)) => {
                    report.outcomes.push(outcome);
                    report.failures.extend(failure);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Push worker did not complete");
                    self.metrics.errors_total.add(1, &[KeyValue::new("reason", "worker_aborted")]);
                    if let Err(e) = self.store.add_error(Platform::Ios, 1).await {
                        tracing::warn!(error = %e, "Failed to record push error");
                    }
                    report.outcomes.push(DispatchOutcome {
                        token: token.clone(),
                        classification: Classification::RetryableFailure,
                        error_detail: Some(e.to_string()),
                        status_code: None,
                    });
                }
            }
        }

        tracing::debug!(
            sent = report.count(Classification::Success),
            retryable = report.count(Classification::RetryableFailure),
            permanent = report.count(Classification::PermanentFailure),
            "Dispatch round complete"
        );
        report
    }

    async fn attempt(
        self,
        notification: ApnsNotification,
        client: Arc<dyn PushClient>,
        limiter: ConcurrencyLimiter,
        ctx: DispatchContext,
    ) -> (DispatchOutcome, Option<LogPushEntry>) {
        let result = match limiter.acquire().await {
            Ok(_slot) => client.push(&notification).await,
            Err(e) => Err(PushError::Other(e.into())),
        };

        let outcome = classify(&notification.device_token, result);
        let failure = self.record(&outcome, &ctx).await;
        (outcome, failure)
    }

    async fn record(&self, outcome: &DispatchOutcome, ctx: &DispatchContext) -> Option<LogPushEntry> {
        let status = if outcome.classification.is_success() { PushStatus::Succeeded } else { PushStatus::Failed };
        let entry = LogPushEntry::new(
            status,
            Platform::Ios,
            &outcome.token,
            &ctx.message,
            outcome.error_detail.clone(),
            &self.log,
        );

        if outcome.classification.is_success() {
            tracing::info!(token = %entry.token, apns_status = ?outcome.status_code, "Push notification sent");
            self.metrics.sent_total.add(1, &[]);
            if let Err(e) = self.store.add_success(Platform::Ios, 1).await {
                tracing::warn!(error = %e, "Failed to record push success");
            }
            return None;
        }

        tracing::error!(
            token = %entry.token,
            apns_status = ?outcome.status_code,
            classification = ?outcome.classification,
            error = entry.error.as_deref().unwrap_or_default(),
            "Push notification failed"
        );
        let reason = outcome.status_code.map_or_else(|| "no_response".to_string(), |code| code.to_string());
        self.metrics.errors_total.add(1, &[KeyValue::new("reason", reason)]);
        if let Err(e) = self.store.add_error(Platform::Ios, 1).await {
            tracing::warn!(error = %e, "Failed to record push error");
        }

        if ctx.sync {
            return Some(entry);
        }

        if let Some(feedback) = &self.feedback {
            let feedback = feedback.clone();
            let mut pending = self.pending_feedback.lock().unwrap_or_else(PoisonError::into_inner);
            while pending.try_join_next().is_some() {}
            pending.spawn(
                async move {
                    if let Err(e) = feedback.dispatch(&entry).await {
                        tracing::warn!(error = %e, "Failed to deliver push feedback");
                    }
                }
                .instrument(tracing::debug_span!("push_feedback")),
            );
        }
        None
    }
}

/// Maps a provider call result onto success, retryable or permanent failure.
///
/// Only a 200 is a success. Server-class statuses and calls that never got a
/// response are retryable; everything else is permanent.
#[must_use]
pub fn classify(token: &str, result: Result<ApnsResponse, PushError>) -> DispatchOutcome {
    let (classification, error_detail, status_code) = match result {
        Ok(response) if response.is_sent() => (Classification::Success, None, Some(response.status_code)),
        Ok(response) => {
            let classification = if response.status_code >= 500 {
                Classification::RetryableFailure
            } else {
                Classification::PermanentFailure
            };
            let detail = if response.reason.is_empty() {
                format!("status {}", response.status_code)
            } else {
                response.reason
            };
            (classification, Some(detail), Some(response.status_code))
        }
        Err(e @ PushError::Signing(_)) => (Classification::PermanentFailure, Some(e.to_string()), None),
        Err(e) => (Classification::RetryableFailure, Some(e.to_string()), None),
    };

    DispatchOutcome { token: token.to_string(), classification, error_detail, status_code }
}
