use tracing::{error, info};

/// Where user-facing feedback goes.
///
/// Implementations are fire-and-forget: the core never waits on delivery and
/// never inspects a result. The chat adapter sends each call as a message to
/// the channel the command came from.
pub trait NotificationSink: Send + Sync {
    fn status(&self, text: &str);
    fn success(&self, text: &str);
    fn error(&self, text: &str);
}

/// Sink that only writes to the log. Used for guilds that have no channel to
/// announce in yet.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn status(&self, text: &str) {
        info!("📣 {}", text);
    }

    fn success(&self, text: &str) {
        info!("✅ {}", text);
    }

    fn error(&self, text: &str) {
        error!("❌ {}", text);
    }
}
