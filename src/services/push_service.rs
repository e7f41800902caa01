use crate::adapters::feedback::FeedbackNotifier;
use crate::adapters::push::ApnsNotification;
use crate::adapters::stats::CounterStore;
use crate::config::Config;
use crate::domain::{Classification, LogPushEntry, PushRequest};
use crate::error::DispatchError;
use crate::services::client_factory::ClientSource;
use crate::services::dispatcher::{DispatchContext, Dispatcher};
use crate::services::notification_builder;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Retry budget for a request. A request value of zero or less means the
/// deployment default; a positive value is capped by the deployment maximum.
#[must_use]
pub fn effective_retry_cap(request_retry: i32, max_retry: u32) -> u32 {
    match u32::try_from(request_retry) {
        Ok(retry) if retry > 0 => retry.min(max_retry),
        _ => max_retry,
    }
}

/// Summary of a whole request across all rounds.
#[derive(Debug, Default, Serialize)]
pub struct PushReport {
    pub rounds: u32,
    pub sent: usize,
    pub permanent_failures: usize,
    /// Tokens still failing retryably when the loop ended.
    pub remaining: Vec<String>,
    /// Failure entries returned to a synchronous caller.
    pub logs: Vec<LogPushEntry>,
    /// Set when a later round could not obtain a client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_error: Option<String>,
}

/// Drives a request through dispatch rounds until nothing is retryable or the
/// budget is spent.
#[derive(Debug, Clone)]
pub struct PushService {
    config: Arc<Config>,
    clients: Arc<dyn ClientSource>,
    dispatcher: Dispatcher,
    store: Arc<dyn CounterStore>,
}

impl PushService {
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        clients: Arc<dyn ClientSource>,
        store: Arc<dyn CounterStore>,
        feedback: Option<FeedbackNotifier>,
    ) -> Self {
        let dispatcher = Dispatcher::new(Arc::clone(&store), feedback, config.log.clone());
        Self { config, clients, dispatcher, store }
    }

    /// Synchronous mode only holds when the queue hands results back in-process.
    #[must_use]
    pub fn sync_enabled(&self) -> bool {
        self.config.core.sync && self.config.queue.engine.is_local()
    }

    /// Waits for feedback webhook calls spawned by earlier requests.
    /// Returns the number of calls abandoned after `timeout`.
    pub async fn drain_feedback(&self, timeout: Duration) -> usize {
        self.dispatcher.drain_feedback(timeout).await
    }

    fn template(&self, req: &PushRequest) -> ApnsNotification {
        let mut notification = notification_builder::build(req);
        if notification.topic.is_none() {
            notification.topic = self.config.ios.topic.clone().filter(|t| !t.is_empty());
        }
        notification
    }

    /// Delivers a request to every token, re-driving retryable failures.
    ///
    /// # Errors
    /// Returns `DispatchError` when the request is invalid, the provider is
    /// disabled, or the credentials are unusable. Per-token failures never
    /// surface here; they are counted and logged.
    #[tracing::instrument(skip_all, fields(tokens = req.tokens.len()), err)]
    pub async fn push_to_ios(&self, req: &PushRequest) -> Result<PushReport, DispatchError> {
        req.validate()?;

        let cap = effective_retry_cap(req.retry, self.config.ios.max_retry);
        let sync = self.sync_enabled();
        if self.config.core.sync && !sync {
            tracing::debug!(queue = ?self.config.queue.engine, "Synchronous mode disabled for a non-local queue");
        }

        let total = i64::try_from(req.tokens.len()).unwrap_or(i64::MAX);
        if let Err(e) = self.store.add_total(total).await {
            tracing::warn!(error = %e, "Failed to record push total");
        }

        let mut report = PushReport::default();
        let mut tokens = req.tokens.clone();

        for round in 0..=cap {
            let client = match self.clients.resolve(req).await {
                Ok(client) => client,
                Err(e) if round == 0 => {
                    tracing::error!(error = %e, "APNs provider unavailable");
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!(error = %e, round, "APNs provider unavailable, abandoning retries");
                    report.provider_error = Some(e.to_string());
                    break;
                }
            };

            let template = self.template(req);
            let ctx = DispatchContext { round, message: req.message.clone(), sync };
            let round_report = self.dispatcher.dispatch(&template, &tokens, &client, &self.clients.limiter(), &ctx).await;

            report.rounds += 1;
            report.sent += round_report.count(Classification::Success);
            report.permanent_failures += round_report.count(Classification::PermanentFailure);
            tokens = round_report.retry_tokens();
            report.logs.extend(round_report.failures);

            if tokens.is_empty() {
                break;
            }
            if round < cap {
                tracing::info!(round = round + 1, tokens = tokens.len(), "Retrying failed pushes");
                self.dispatcher.record_retries(tokens.len());
            }
        }

        if !tokens.is_empty() {
            tracing::warn!(tokens = tokens.len(), rounds = report.rounds, "Retry budget exhausted");
        }
        report.remaining = tokens;
        Ok(report)
    }
}
