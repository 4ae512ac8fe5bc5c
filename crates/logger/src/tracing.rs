use std::env::var;

use tracing::{Subscriber, level_filters::LevelFilter, warn};
use tracing_subscriber::{
    Layer, filter::EnvFilter, fmt::MakeWriter, layer::SubscriberExt, registry::LookupSpan,
    util::SubscriberInitExt,
};

/// Install the global subscriber with `info` as the default level.
pub fn init() {
    initialize_tracing(LevelFilter::INFO);
}

/// Install the global subscriber with a custom default level.
///
/// `RUST_LOG` still wins over `level` when it is set.
pub fn init_with_level(level: LevelFilter) {
    initialize_tracing(level);
}

fn initialize_tracing(level: LevelFilter) {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let log_format = var("RUST_LOG_FORMAT").unwrap_or_default();

    let log_layer = match log_format.as_str() {
        "json" => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(false)
            .with_filter(env_filter)
            .boxed(),
        _ => compact_layer(std::io::stdout).with_filter(env_filter).boxed(),
    };

    // A second init (tests, embedding) keeps the first subscriber.
    if tracing_subscriber::registry().with(log_layer).try_init().is_err() {
        warn!("Tracing subscriber already installed, keeping the existing one");
    }
}

/// Compact, time-less text layout
fn compact_layer<S, W>(make_writer: W) -> impl Layer<S> + Send + Sync + 'static
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer().compact().without_time().with_writer(make_writer)
}
