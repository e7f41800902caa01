mod common;

use apns_dispatch::adapters::push::PushClient;
use apns_dispatch::adapters::stats::{CounterStore, MemoryStore};
use apns_dispatch::config::{IosConfig, LogConfig};
use apns_dispatch::domain::{Classification, Platform, PushRequest};
use apns_dispatch::error::DispatchError;
use apns_dispatch::services::{
    ApnsClientFactory, ConcurrencyLimiter, DispatchContext, Dispatcher, PushService, notification_builder,
};
use common::{ScriptedClient, StaticClientSource, Step};
use std::sync::Arc;
use std::time::Duration;

fn service(
    config: apns_dispatch::config::Config,
    source: Arc<StaticClientSource>,
    store: Arc<MemoryStore>,
) -> PushService {
    PushService::new(Arc::new(config), source, store, None)
}

#[tokio::test]
async fn test_server_errors_retry_client_errors_do_not() {
    common::setup_tracing();
    let client = Arc::new(
        ScriptedClient::new()
            .script("token-a", vec![Step::Status(503, "ServiceUnavailable"), Step::Status(200, "")])
            .script("token-b", vec![Step::Status(400, "BadDeviceToken")]),
    );
    let source = Arc::new(StaticClientSource::new(Arc::clone(&client), 10));
    let store = Arc::new(MemoryStore::new());
    let service = service(common::get_test_config(3), Arc::clone(&source), Arc::clone(&store));

    let req = PushRequest::ios(common::tokens(&["token-a", "token-b", "token-c"]), "hello");
    let report = service.push_to_ios(&req).await.expect("dispatch");

    assert_eq!(report.rounds, 2, "only token-a is re-driven, once");
    assert_eq!(report.sent, 2);
    assert_eq!(report.permanent_failures, 1);
    assert!(report.remaining.is_empty());

    assert_eq!(client.calls("token-a"), 2);
    assert_eq!(client.calls("token-b"), 1);
    assert_eq!(client.calls("token-c"), 1);
    assert_eq!(source.resolves(), 2, "client is re-resolved every round");

    assert_eq!(store.total_count().await.unwrap(), 3);
    assert_eq!(store.success_count(Platform::Ios).await.unwrap(), 2);
    assert_eq!(store.error_count(Platform::Ios).await.unwrap(), 2);
}

#[tokio::test]
async fn test_rounds_bounded_by_effective_cap() {
    common::setup_tracing();

    // (request retry, deployment max retry, expected attempts)
    for (retry, max_retry, attempts) in [(0, 3, 4), (1, 3, 2), (5, 2, 3), (0, 0, 1), (2, 0, 1)] {
        let client = Arc::new(ScriptedClient::new().script("stuck", vec![Step::Status(500, "InternalServerError"); 10]));
        let source = Arc::new(StaticClientSource::new(Arc::clone(&client), 4));
        let store = Arc::new(MemoryStore::new());
        let service = service(common::get_test_config(max_retry), source, Arc::clone(&store));

        let mut req = PushRequest::ios(common::tokens(&["stuck"]), "hello");
        req.retry = retry;
        let report = service.push_to_ios(&req).await.expect("dispatch");

        assert_eq!(client.calls("stuck"), attempts, "retry={retry} max_retry={max_retry}");
        assert_eq!(report.rounds as usize, attempts);
        assert_eq!(report.remaining, common::tokens(&["stuck"]));
        assert_eq!(store.error_count(Platform::Ios).await.unwrap(), attempts as i64);
    }
}

#[tokio::test]
async fn test_missing_response_is_retried() {
    common::setup_tracing();
    let client = Arc::new(ScriptedClient::new().script("flaky", vec![Step::NoResponse, Step::NoResponse]));
    let source = Arc::new(StaticClientSource::new(Arc::clone(&client), 4));
    let store = Arc::new(MemoryStore::new());
    let service = service(common::get_test_config(2), source, Arc::clone(&store));

    let report = service.push_to_ios(&PushRequest::ios(common::tokens(&["flaky"]), "hi")).await.expect("dispatch");

    assert_eq!(client.calls("flaky"), 3);
    assert_eq!(report.sent, 1);
    assert!(report.remaining.is_empty());
}

#[tokio::test]
async fn test_worker_completions_match_tokens() {
    common::setup_tracing();
    let client = Arc::new(ScriptedClient::new().script("dup", vec![Step::Status(503, ""), Step::Status(502, "")]));
    let store = Arc::new(MemoryStore::new());
    let dispatcher = Dispatcher::new(Arc::clone(&store) as Arc<dyn CounterStore>, None, LogConfig::default());

    let mut tokens: Vec<String> = (0..48).map(|i| format!("token-{i}")).collect();
    tokens.push("dup".to_string());
    tokens.push("dup".to_string());

    let template = notification_builder::build(&PushRequest::ios(tokens.clone(), "hi"));
    let ctx = DispatchContext { round: 0, message: "hi".to_string(), sync: false };
    let push_client: Arc<dyn PushClient> = Arc::clone(&client) as Arc<dyn PushClient>;
    let report = dispatcher.dispatch(&template, &tokens, &push_client, &ConcurrencyLimiter::new(8), &ctx).await;

    assert_eq!(report.outcomes.len(), tokens.len());
    let order: Vec<&str> = report.outcomes.iter().map(|o| o.token.as_str()).collect();
    assert_eq!(order, tokens.iter().map(String::as_str).collect::<Vec<_>>());
    assert_eq!(report.retry_tokens(), common::tokens(&["dup", "dup"]));
    assert_eq!(report.count(Classification::Success), 48);
    assert_eq!(client.total_calls(), 50);

    let stamped: std::collections::HashSet<String> = client.seen().into_iter().map(|n| n.device_token).collect();
    assert_eq!(stamped.len(), 49, "each worker stamps its own token");
}

#[tokio::test]
async fn test_limiter_bounds_in_flight_calls() {
    common::setup_tracing();
    let client = Arc::new(ScriptedClient::new().with_delay(Duration::from_millis(20)));
    let source = Arc::new(StaticClientSource::new(Arc::clone(&client), 3));
    let service = service(common::get_test_config(0), source, Arc::new(MemoryStore::new()));

    let tokens: Vec<String> = (0..30).map(|i| format!("token-{i}")).collect();
    let report = service.push_to_ios(&PushRequest::ios(tokens, "hi")).await.expect("dispatch");

    assert_eq!(report.sent, 30);
    assert!(client.max_in_flight() <= 3, "saw {} concurrent calls", client.max_in_flight());
    assert!(client.max_in_flight() >= 1);
}

#[tokio::test]
async fn test_provider_failure_in_later_round_stops_retries() {
    common::setup_tracing();
    let client = Arc::new(ScriptedClient::new().script("token-a", vec![Step::Status(503, "")]));
    let source = Arc::new(StaticClientSource::new(Arc::clone(&client), 4).failing_after(1));
    let service = service(common::get_test_config(3), source, Arc::new(MemoryStore::new()));

    let report =
        service.push_to_ios(&PushRequest::ios(common::tokens(&["token-a", "token-b"]), "hi")).await.expect("dispatch");

    assert_eq!(report.rounds, 1);
    assert_eq!(report.sent, 1);
    assert_eq!(report.remaining, common::tokens(&["token-a"]));
    assert!(report.provider_error.is_some());
    assert_eq!(client.calls("token-a"), 1);
}

#[tokio::test]
async fn test_disabled_provider_aborts_before_any_attempt() {
    common::setup_tracing();
    let store = Arc::new(MemoryStore::new());
    let config = common::get_test_config(3);
    let factory = Arc::new(ApnsClientFactory::new(IosConfig::default(), None));
    let service = PushService::new(Arc::new(config), factory, Arc::clone(&store) as Arc<dyn CounterStore>, None);

    let res = service.push_to_ios(&PushRequest::ios(common::tokens(&["token-a"]), "hi")).await;
    assert!(matches!(res, Err(DispatchError::ProviderDisabled)));
    assert_eq!(store.success_count(Platform::Ios).await.unwrap(), 0);
    assert_eq!(store.error_count(Platform::Ios).await.unwrap(), 0);
}

#[tokio::test]
async fn test_credential_error_aborts_request() {
    common::setup_tracing();
    let mut config = common::get_test_config(3);
    config.ios.key_path = "/etc/apns/key.der".to_string();
    let factory = Arc::new(ApnsClientFactory::new(config.ios.clone(), None));
    let service = PushService::new(Arc::new(config), factory, Arc::new(MemoryStore::new()), None);

    let res = service.push_to_ios(&PushRequest::ios(common::tokens(&["token-a"]), "hi")).await;
    assert!(matches!(res, Err(DispatchError::Credentials(_))));
}

#[tokio::test]
async fn test_invalid_request_is_rejected() {
    common::setup_tracing();
    let client = Arc::new(ScriptedClient::new());
    let source = Arc::new(StaticClientSource::new(Arc::clone(&client), 4));
    let service = service(common::get_test_config(0), Arc::clone(&source), Arc::new(MemoryStore::new()));

    let res = service.push_to_ios(&PushRequest::ios(Vec::new(), "hi")).await;
    assert!(matches!(res, Err(DispatchError::InvalidRequest(_))));
    assert_eq!(source.resolves(), 0);
}

#[tokio::test]
async fn test_default_topic_applied_when_request_has_none() {
    common::setup_tracing();
    let client = Arc::new(ScriptedClient::new());
    let source = Arc::new(StaticClientSource::new(Arc::clone(&client), 4));
    let mut config = common::get_test_config(0);
    config.ios.topic = Some("com.example.default".to_string());
    let service = service(config, source, Arc::new(MemoryStore::new()));

    let mut req = PushRequest::ios(common::tokens(&["a", "b"]), "hi");
    service.push_to_ios(&req).await.expect("dispatch");
    req.topic = "com.example.override".to_string();
    req.tokens = common::tokens(&["c"]);
    service.push_to_ios(&req).await.expect("dispatch");

    let topics: Vec<Option<String>> = client.seen().into_iter().map(|n| n.topic).collect();
    assert_eq!(topics.iter().filter(|t| t.as_deref() == Some("com.example.default")).count(), 2);
    assert_eq!(topics.iter().filter(|t| t.as_deref() == Some("com.example.override")).count(), 1);
}
