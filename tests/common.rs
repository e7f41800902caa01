#![allow(dead_code)]

use apns_dispatch::adapters::push::{ApnsNotification, ApnsResponse, PushClient, PushError};
use apns_dispatch::config::Config;
use apns_dispatch::domain::PushRequest;
use apns_dispatch::error::DispatchError;
use apns_dispatch::services::{ClientSource, ConcurrencyLimiter};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

static INIT: Once = Once::new();

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("apns_dispatch=debug".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}

/// One scripted provider answer.
#[derive(Debug, Clone)]
pub enum Step {
    Status(u16, &'static str),
    NoResponse,
}

/// A `PushClient` that answers from a per-token script, one step per attempt.
/// Tokens without a script (or past its end) are accepted.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    scripts: HashMap<String, Vec<Step>>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    seen: Mutex<Vec<ApnsNotification>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, token: &str, steps: Vec<Step>) -> Self {
        self.scripts.insert(token.to_string(), steps);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self, token: &str) -> usize {
        self.calls.lock().unwrap().get(token).copied().unwrap_or_default()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<ApnsNotification> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushClient for ScriptedClient {
    async fn push(&self, notification: &ApnsNotification) -> Result<ApnsResponse, PushError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(notification.device_token.clone()).or_default();
            *count += 1;
            *count - 1
        };
        self.seen.lock().unwrap().push(notification.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.scripts.get(&notification.device_token).and_then(|steps| steps.get(attempt)) {
            None => Ok(ApnsResponse::accepted()),
            Some(Step::Status(200, _)) => Ok(ApnsResponse::accepted()),
            Some(Step::Status(code, reason)) => Ok(ApnsResponse::rejected(*code, *reason)),
            Some(Step::NoResponse) => Err(PushError::Other(anyhow::anyhow!("connection reset by peer"))),
        }
    }
}

/// Hands out the same client every round; optionally stops resolving after
/// a number of successful resolutions.
#[derive(Debug)]
pub struct StaticClientSource {
    client: Arc<ScriptedClient>,
    limiter: ConcurrencyLimiter,
    resolves: AtomicUsize,
    fail_after: Option<usize>,
}

impl StaticClientSource {
    pub fn new(client: Arc<ScriptedClient>, capacity: usize) -> Self {
        Self { client, limiter: ConcurrencyLimiter::new(capacity), resolves: AtomicUsize::new(0), fail_after: None }
    }

    pub fn failing_after(mut self, resolves: usize) -> Self {
        self.fail_after = Some(resolves);
        self
    }

    pub fn resolves(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClientSource for StaticClientSource {
    async fn resolve(&self, _req: &PushRequest) -> Result<Arc<dyn PushClient>, DispatchError> {
        let previous = self.resolves.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.is_some_and(|limit| previous >= limit) {
            return Err(DispatchError::ProviderDisabled);
        }
        Ok(Arc::clone(&self.client) as Arc<dyn PushClient>)
    }

    fn limiter(&self) -> ConcurrencyLimiter {
        self.limiter.clone()
    }
}

pub fn get_test_config(max_retry: u32) -> Config {
    let mut config = Config::default();
    config.ios.enabled = true;
    config.ios.max_retry = max_retry;
    config
}

pub fn tokens(names: &[&str]) -> Vec<String> {
    names.iter().map(ToString::to_string).collect()
}
