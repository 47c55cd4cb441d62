use eyre::Result;
use std::{backtrace::Backtrace, panic};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber, filtered by `RUST_LOG` (default `info`),
/// and a panic hook that reports panics as one log line.
pub fn initialize_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().compact())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init()?;

    panic::set_hook(Box::new(|info| {
        let payload = info.payload();
        let message = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
            .unwrap_or("<non-string panic payload>");
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_default();
        let backtrace = format!("{:?}", Backtrace::capture()).replace('\n', " | ");

        tracing::error!(%location, %backtrace, "panic: {message}");
    }));

    Ok(())
}
