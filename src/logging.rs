use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the non-blocking file writer's background thread alive. Dropping it
/// flushes pending lines, so `main` must hold it for the process lifetime.
pub struct LogGuard(Option<WorkerGuard>);

/// Stdout logging always; a daily-rolling file sink in addition when
/// `LOG_DIR` points somewhere writable.
pub fn init_tracing(log_level: &str) -> LogGuard {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout = fmt::layer().with_target(true);
    let registry = tracing_subscriber::registry().with(filter).with(stdout);

    match file_sink() {
        Some((writer, guard)) => {
            registry
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .init();
            LogGuard(Some(guard))
        }
        None => {
            registry.init();
            LogGuard(None)
        }
    }
}

fn file_sink() -> Option<(NonBlocking, WorkerGuard)> {
    let dir = std::env::var("LOG_DIR")
        .ok()
        .filter(|d| !d.trim().is_empty())?;
    if let Err(err) = std::fs::create_dir_all(&dir) {
        // Tracing is not up yet, so this goes straight to stderr.
        eprintln!("cannot create log directory {dir}: {err}");
        return None;
    }
    Some(tracing_appender::non_blocking(rolling::daily(
        &dir,
        "wordquiz.log",
    )))
}
