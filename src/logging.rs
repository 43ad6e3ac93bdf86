use tracing_appender::non_blocking::WorkerGuard;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::consts::{APPLICATION_NAME, VERSION};

/// `RUST_LOG` wins over `level` when set.
///
/// The returned guard flushes the JSON writer on drop, keep it alive in main.
pub fn init_logger(level: &str, json: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    if !json {
        tracing_subscriber::fmt().with_env_filter(filter).try_init().map_err(|e| anyhow::anyhow!(e))?;
        return Ok(None);
    }

    // Redirect the logs from log library to tracing's subscribers.
    LogTracer::init()?;

    let app_name = format!("{APPLICATION_NAME}-{VERSION}");

    // Non-blocking stdout writer
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    let bunyan_formatting_layer = BunyanFormattingLayer::new(app_name, non_blocking_writer);
    let subscriber = Registry::default()
        .with(filter)
        .with(JsonStorageLayer)
        .with(bunyan_formatting_layer);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(Some(guard))
}
