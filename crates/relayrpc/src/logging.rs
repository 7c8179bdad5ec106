use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Crates whose events follow `--log-level`. Everything else is capped at warn.
const RELAYRPC_TARGETS: [&str; 5] = [
    "relayrpc",
    "relayrpc_transport",
    "relayrpc_frame",
    "relayrpc_codec",
    "relayrpc_peer",
];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

fn targets(level: LogLevel) -> Targets {
    let level = level.as_filter();
    RELAYRPC_TARGETS.iter().fold(
        Targets::new().with_default(level.min(LevelFilter::WARN)),
        |targets, target| targets.with_target(*target, level),
    )
}

/// Install the stderr subscriber. Stdout stays reserved for command output.
///
/// At debug and trace the event target is printed, so frame, codec and
/// connection events can be told apart.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let show_target = level.as_filter() >= LevelFilter::DEBUG;
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(show_target);

    let _ = match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(layer.with_filter(targets(level)))
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(layer.json().with_filter(targets(level)))
            .try_init(),
    };
}

#[cfg(test)]
mod tests {
    use tracing::Level;

    use super::*;

    #[test]
    fn relayrpc_crates_follow_the_requested_level() {
        let filter = targets(LogLevel::Debug);
        assert!(filter.would_enable("relayrpc_peer::connection", &Level::DEBUG));
        assert!(filter.would_enable("relayrpc", &Level::DEBUG));
        assert!(!filter.would_enable("relayrpc_frame::codec", &Level::TRACE));
    }

    #[test]
    fn dependencies_are_capped_at_warn() {
        let filter = targets(LogLevel::Trace);
        assert!(filter.would_enable("tokio_util::codec", &Level::WARN));
        assert!(!filter.would_enable("tokio_util::codec", &Level::INFO));

        let quiet = targets(LogLevel::Error);
        assert!(!quiet.would_enable("tokio_util::codec", &Level::WARN));
    }
}
