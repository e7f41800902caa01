#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

use anyhow::Context;
use apns_dispatch::adapters::feedback::FeedbackNotifier;
use apns_dispatch::adapters::stats;
use apns_dispatch::config::Config;
use apns_dispatch::domain::PushRequest;
use apns_dispatch::services::{ApnsClientFactory, AppStatus, PushService};
use apns_dispatch::telemetry;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: Config,

    /// JSON push request to dispatch
    #[arg(long, env = "APNS_DISPATCH_REQUEST")]
    request: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Arc::new(cli.config);
    let telemetry_guard = telemetry::init_telemetry(&config.telemetry)?;

    let boot_span = tracing::info_span!("boot");
    let (service, store) = async {
        let store = stats::open(&config.stat).await?;
        let feedback = FeedbackNotifier::from_config(&config.core)?;
        let clients = Arc::new(ApnsClientFactory::new(config.ios.clone(), config.core.http_proxy.clone()));
        let service = PushService::new(Arc::clone(&config), clients, Arc::clone(&store), feedback);
        Ok::<_, anyhow::Error>((service, store))
    }
    .instrument(boot_span)
    .await?;

    let raw = tokio::fs::read(&cli.request)
        .await
        .with_context(|| format!("failed to read push request {}", cli.request.display()))?;
    let request: PushRequest = serde_json::from_slice(&raw).context("failed to parse push request")?;

    let result = service.push_to_ios(&request).await;
    match &result {
        Ok(report) => tracing::info!(
            rounds = report.rounds,
            sent = report.sent,
            permanent_failures = report.permanent_failures,
            remaining = report.remaining.len(),
            report = %serde_json::to_string(report)?,
            "Push request finished"
        ),
        Err(e) => tracing::error!(error = %e, "Push request rejected"),
    }

    let status = AppStatus::collect(store.as_ref()).await?;
    tracing::info!(status = %serde_json::to_string(&status)?, "Push counters");

    if service.drain_feedback(Duration::from_secs(config.core.shutdown_timeout_secs)).await == 0 {
        tracing::info!("Background tasks finished.");
    }

    telemetry_guard.shutdown();
    result.map(|_| ()).map_err(Into::into)
}
