/// URL of the PostgreSQL database holding tasks
pub const DB_URL: &str = "DATABASE_URL";
/// Log filter directives, in [tracing_subscriber::EnvFilter] syntax
pub const LOG_LEVEL: &str = "LOG_LEVEL";
/// Address the HTTP server binds to. Defaults to [defaults::LISTEN_ADDR].
pub const LISTEN_ADDR: &str = "LISTEN_ADDR";

/// OpenTelemetry span export URL, usually a collector sidecar at http://localhost:4317
pub const OTEL_SPAN_EXPORT_URL: &str = "OTEL_SPAN_EXPORT_URL";
/// OpenTelemetry metrics export URL, usually a collector sidecar at http://localhost:4317
pub const OTEL_METRIC_EXPORT_URL: &str = "OTEL_METRIC_EXPORT_URL";

/// API key for the identity provider
pub const AUTH_API_KEY: &str = "AUTH_API_KEY";
/// Base URL of the identity provider's REST API. Defaults to [defaults::AUTH_BASE_URL].
pub const AUTH_BASE_URL: &str = "AUTH_BASE_URL";

/// API key for the language model used to suggest priorities
pub const SUGGESTION_API_KEY: &str = "SUGGESTION_API_KEY";
/// Defaults to [defaults::SUGGESTION_BASE_URL]
pub const SUGGESTION_BASE_URL: &str = "SUGGESTION_BASE_URL";
/// Defaults to [defaults::SUGGESTION_MODEL]
pub const SUGGESTION_MODEL: &str = "SUGGESTION_MODEL";

pub mod defaults {
    pub const LISTEN_ADDR: &str = "0.0.0.0:8080";
    pub const AUTH_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";
    pub const SUGGESTION_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
    pub const SUGGESTION_MODEL: &str = "gemini-2.0-flash";
}

#[cfg(any(test, feature = "integration_test"))]
pub mod test {
    /// Base URL of a PostgreSQL server for integration tests, without a database name in the path
    pub const TEST_DB_URL: &str = "TEST_DB_URL";
}
