use clap::{Args, Parser, ValueEnum};

#[derive(Clone, Debug, Default, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub core: CoreConfig,

    #[command(flatten)]
    pub ios: IosConfig,

    #[command(flatten)]
    pub stat: StatConfig,

    #[command(flatten)]
    pub queue: QueueConfig,

    #[command(flatten)]
    pub log: LogConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct CoreConfig {
    /// Block the caller and return failure logs inline (only honored with a local queue)
    #[arg(long = "sync", env = "APNS_DISPATCH_SYNC", default_value_t = false)]
    pub sync: bool,

    /// Webhook that receives failed push log entries
    #[arg(long, env = "APNS_DISPATCH_FEEDBACK_URL")]
    pub feedback_url: Option<String>,

    /// Timeout for a single feedback webhook call
    #[arg(long, env = "APNS_DISPATCH_FEEDBACK_TIMEOUT_SECS", default_value_t = 10)]
    pub feedback_timeout_secs: u64,

    /// HTTP/S proxy used to reach the push provider
    #[arg(long, env = "APNS_DISPATCH_HTTP_PROXY")]
    pub http_proxy: Option<String>,

    /// How long to wait for pending feedback calls before exiting
    #[arg(long, env = "APNS_DISPATCH_SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self { sync: false, feedback_url: None, feedback_timeout_secs: 10, http_proxy: None, shutdown_timeout_secs: 5 }
    }
}

#[derive(Clone, Debug, Args)]
pub struct IosConfig {
    /// Enable the APNs provider
    #[arg(long = "ios-enabled", env = "APNS_DISPATCH_IOS_ENABLED", default_value_t = false)]
    pub enabled: bool,

    /// Path to a .p12, .pem or .p8 key file
    #[arg(long = "ios-key-path", env = "APNS_DISPATCH_IOS_KEY_PATH", default_value = "")]
    pub key_path: String,

    /// Base64 encoded key material, used when no key path is set
    #[arg(long = "ios-key-base64", env = "APNS_DISPATCH_IOS_KEY_BASE64", default_value = "")]
    pub key_base64: String,

    /// Key type of the base64 material (p12, pem or p8)
    #[arg(long = "ios-key-type", env = "APNS_DISPATCH_IOS_KEY_TYPE", default_value = "pem")]
    pub key_type: String,

    /// Password protecting a .p12 archive
    #[arg(long = "ios-password", env = "APNS_DISPATCH_IOS_PASSWORD", default_value = "")]
    pub password: String,

    /// Key ID for token based (.p8) authentication
    #[arg(long = "ios-key-id", env = "APNS_DISPATCH_IOS_KEY_ID", default_value = "")]
    pub key_id: String,

    /// Team ID for token based (.p8) authentication
    #[arg(long = "ios-team-id", env = "APNS_DISPATCH_IOS_TEAM_ID", default_value = "")]
    pub team_id: String,

    /// Default apns-topic when the request carries none
    #[arg(long = "ios-topic", env = "APNS_DISPATCH_IOS_TOPIC")]
    pub topic: Option<String>,

    /// Use the production gateway instead of the sandbox
    #[arg(long = "ios-production", env = "APNS_DISPATCH_IOS_PRODUCTION", default_value_t = false)]
    pub production: bool,

    /// Maximum number of retry rounds for retryable failures
    #[arg(long = "ios-max-retry", env = "APNS_DISPATCH_IOS_MAX_RETRY", default_value_t = 0)]
    pub max_retry: u32,

    /// Maximum number of provider calls in flight at once
    #[arg(long = "ios-max-concurrent-pushes", env = "APNS_DISPATCH_IOS_MAX_CONCURRENT_PUSHES", default_value_t = 100)]
    pub max_concurrent_pushes: usize,

    /// Per-request timeout for provider calls
    #[arg(long = "ios-request-timeout-secs", env = "APNS_DISPATCH_IOS_REQUEST_TIMEOUT_SECS", default_value_t = 60)]
    pub request_timeout_secs: u64,

    /// Maximum number of distinct credential sets kept as live clients
    #[arg(long = "ios-client-cache-size", env = "APNS_DISPATCH_IOS_CLIENT_CACHE_SIZE", default_value_t = 32)]
    pub client_cache_size: usize,
}

impl Default for IosConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            key_path: String::new(),
            key_base64: String::new(),
            key_type: "pem".to_string(),
            password: String::new(),
            key_id: String::new(),
            team_id: String::new(),
            topic: None,
            production: false,
            max_retry: 0,
            max_concurrent_pushes: 100,
            request_timeout_secs: 60,
            client_cache_size: 32,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum StatEngine {
    #[default]
    Memory,
    Redis,
}

#[derive(Clone, Debug, Args)]
pub struct StatConfig {
    /// Counter storage backend
    #[arg(id = "stat_engine", long = "stat-engine", env = "APNS_DISPATCH_STAT_ENGINE", value_enum, default_value_t = StatEngine::Memory)]
    pub engine: StatEngine,

    /// Redis URL for the redis counter backend
    #[arg(long = "stat-redis-url", env = "APNS_DISPATCH_STAT_REDIS_URL", default_value = "redis://localhost:6379")]
    pub redis_url: String,

    /// Prefix applied to every counter key
    #[arg(long = "stat-key-prefix", env = "APNS_DISPATCH_STAT_KEY_PREFIX", default_value = "apns-dispatch")]
    pub key_prefix: String,

    /// Minimum backoff when connecting to the counter backend
    #[arg(long = "stat-min-backoff-secs", env = "APNS_DISPATCH_STAT_MIN_BACKOFF_SECS", default_value_t = 1)]
    pub min_backoff_secs: u64,

    /// Maximum backoff when connecting to the counter backend
    #[arg(long = "stat-max-backoff-secs", env = "APNS_DISPATCH_STAT_MAX_BACKOFF_SECS", default_value_t = 10)]
    pub max_backoff_secs: u64,

    /// Number of connection attempts before giving up
    #[arg(long = "stat-max-connect-attempts", env = "APNS_DISPATCH_STAT_MAX_CONNECT_ATTEMPTS", default_value_t = 5)]
    pub max_connect_attempts: usize,
}

impl Default for StatConfig {
    fn default() -> Self {
        Self {
            engine: StatEngine::Memory,
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "apns-dispatch".to_string(),
            min_backoff_secs: 1,
            max_backoff_secs: 10,
            max_connect_attempts: 5,
        }
    }
}

/// Queue engine feeding requests into the dispatcher.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum QueueEngine {
    #[default]
    Local,
    Nsq,
    Nats,
    Redis,
}

impl QueueEngine {
    /// Only an in-process queue can hand results back to a blocking caller.
    #[must_use]
    pub const fn is_local(self) -> bool {
        matches!(self, Self::Local)
    }
}

#[derive(Clone, Debug, Default, Args)]
pub struct QueueConfig {
    /// Queue engine that delivers push requests
    #[arg(id = "queue_engine", long = "queue-engine", env = "APNS_DISPATCH_QUEUE_ENGINE", value_enum, default_value_t = QueueEngine::Local)]
    pub engine: QueueEngine,
}

#[derive(Clone, Debug, Default, Args)]
pub struct LogConfig {
    /// Mask device tokens in push log entries
    #[arg(long = "log-hide-token", env = "APNS_DISPATCH_LOG_HIDE_TOKEN", default_value_t = false)]
    pub hide_token: bool,

    /// Drop message text from push log entries
    #[arg(long = "log-hide-messages", env = "APNS_DISPATCH_LOG_HIDE_MESSAGES", default_value_t = false)]
    pub hide_messages: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Default, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long = "log-format", env = "APNS_DISPATCH_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OTLP collector endpoint; tracing and metrics export is disabled when unset
    #[arg(long = "otlp-endpoint", env = "APNS_DISPATCH_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}
