use clap::{Args, Parser, ValueEnum};
use ipnetwork::IpNetwork;
use std::path::PathBuf;

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub fcm: FcmConfig,

    #[command(flatten)]
    pub rate_limit: RateLimitConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "RELAY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Maximum time a single request may take before the server answers 503
    #[arg(long, env = "RELAY_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Grace period for in-flight requests on shutdown
    #[arg(long, env = "RELAY_SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,

    /// Maximum accepted registration body size in bytes
    #[arg(long, env = "RELAY_MAX_BODY_BYTES", default_value_t = 1_048_576)]
    pub max_body_bytes: usize,

    /// Maximum buffered push delivery size in bytes. Larger deliveries are acked and dropped.
    #[arg(long, env = "RELAY_MAX_PUSH_BODY_BYTES", default_value_t = 16 * 1024 * 1024)]
    pub max_push_body_bytes: usize,
}

#[derive(Clone, Debug, Args)]
pub struct FcmConfig {
    /// Google Cloud project that owns the Firebase app
    #[arg(long, env = "GOOGLE_CLOUD_PROJECT")]
    pub project_id: Option<String>,

    /// Path to a service account key file. Falls back to the metadata server when unset.
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    pub credentials_file: Option<PathBuf>,

    /// Base URL of the FCM HTTP v1 API (override for emulators)
    #[arg(long, env = "RELAY_FCM_BASE_URL", default_value = "https://fcm.googleapis.com")]
    pub base_url: String,

    /// Host of the GCE metadata server used for ambient credentials
    #[arg(long, env = "GCE_METADATA_HOST", default_value = "metadata.google.internal")]
    pub metadata_host: String,

    /// Timeout for each call to FCM or the credential endpoints
    #[arg(long, env = "RELAY_FCM_TIMEOUT_SECS", default_value_t = 10)]
    pub timeout_secs: u64,

    /// Number of concurrent per-token sends during a multicast
    #[arg(long, env = "RELAY_FCM_MULTICAST_CONCURRENCY", default_value_t = 16)]
    pub multicast_concurrency: usize,
}

#[derive(Clone, Debug, Args)]
pub struct RateLimitConfig {
    /// Requests per second allowed per client on the registration endpoint
    #[arg(long, env = "RELAY_REGISTER_RATE_LIMIT_PER_SECOND", default_value_t = 5)]
    pub register_per_second: u32,

    /// Burst allowance on the registration endpoint
    #[arg(long, env = "RELAY_REGISTER_RATE_LIMIT_BURST", default_value_t = 10)]
    pub register_burst: u32,

    /// Comma-separated list of CIDRs to trust for X-Forwarded-For IP extraction
    #[arg(
        long,
        env = "RELAY_TRUSTED_PROXIES",
        default_value = "10.0.0.0/8,172.16.0.0/12,192.168.0.0/16,127.0.0.1/32",
        value_delimiter = ','
    )]
    pub trusted_proxies: Vec<IpNetwork>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long, env = "RELAY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OTLP collector endpoint (gRPC). Exporters are disabled when unset.
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}
