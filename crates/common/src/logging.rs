use crate::config::Environment;
use tracing::Subscriber;
use tracing_subscriber::{
    EnvFilter,
    fmt::MakeWriter,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

/// Build the subscriber for an environment: pretty output for development and
/// JSON lines for production, both behind `env_filter` and an OpenTelemetry
/// layer that forwards spans to whatever tracer provider is installed.
pub fn build_subscriber<W>(
    environment: Environment,
    env_filter: EnvFilter,
    writer: W,
) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_opentelemetry::layer());

    match environment {
        Environment::Production => Box::new(
            registry.with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_level(true)
                    .with_writer(writer),
            ),
        ),
        Environment::Development => Box::new(
            registry.with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_ansi(true)
                    .with_writer(writer),
            ),
        ),
    }
}

/// Install the stdout subscriber for `environment` as the global default.
///
/// Uses RUST_LOG for filtering (defaults to "info" if not set). Fails if a
/// global subscriber is already installed.
pub fn try_setup_logging(environment: Environment) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    build_subscriber(environment, env_filter, std::io::stdout).try_init()
}

/// Install a subscriber that writes through the test harness capture.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "debug".into());

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
