pub mod client_factory;
pub mod dispatcher;
pub mod limiter;
pub mod notification_builder;
pub mod push_service;
pub mod status;

pub use client_factory::{ApnsClientFactory, ClientSource, ResolvedCredentials};
pub use dispatcher::{DispatchContext, Dispatcher, RoundReport, classify};
pub use limiter::{ConcurrencyLimiter, LimiterSlot};
pub use push_service::{PushReport, PushService, effective_retry_cap};
pub use status::{AppStatus, PlatformStatus};
